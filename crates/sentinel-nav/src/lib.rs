pub mod doctor;
pub mod executor;
pub mod failsafe;
pub mod geo;
pub mod geofence;
