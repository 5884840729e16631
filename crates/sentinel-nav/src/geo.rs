use serde::{Deserialize, Serialize};

use sentinel_proto::mission::Position;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Horizontal distance between two positions.
pub fn distance_m(a: &Position, b: &Position) -> f64 {
    haversine_m(a.lat, a.lon, b.lat, b.lon)
}

// Local east/north plane around `origin` (equirectangular, fine over the few
// hundred metres the avoidance and arrival logic work with).
pub fn to_local(origin: &Position, p: &Position) -> (f64, f64) {
    let east = (p.lon - origin.lon).to_radians() * EARTH_RADIUS_M * origin.lat.to_radians().cos();
    let north = (p.lat - origin.lat).to_radians() * EARTH_RADIUS_M;
    (east, north)
}

pub fn from_local(origin: &Position, east: f64, north: f64, alt_m: f32) -> Position {
    let lat = origin.lat + (north / EARTH_RADIUS_M).to_degrees();
    let lon = origin.lon + (east / (EARTH_RADIUS_M * origin.lat.to_radians().cos())).to_degrees();
    Position { lat, lon, alt_m }
}

/// Compass bearing (0 = north, clockwise) from `a` to `b`, in degrees.
pub fn bearing_deg(a: &Position, b: &Position) -> f64 {
    let (e, n) = to_local(a, b);
    let deg = e.atan2(n).to_degrees();
    if deg < 0.0 { deg + 360.0 } else { deg }
}

// Ray casting polygon test
pub fn point_in_polygon(poly: &[Point], lat: f64, lon: f64) -> bool {
    let mut inside = false;
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let xi = poly[i].lon;
        let yi = poly[i].lat;
        let xj = poly[j].lon;
        let yj = poly[j].lat;
        let intersect = ((yi > lat) != (yj > lat))
            && (lon < (xj - xi) * (lat - yi) / (yj - yi + 1e-12) + xi);
        if intersect {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64) -> Position {
        Position { lat, lon, alt_m: 0.0 }
    }

    #[test]
    fn local_projection_round_trips() {
        let o = pos(47.0, 8.0);
        let p = from_local(&o, 120.0, -80.0, 15.0);
        let (e, n) = to_local(&o, &p);
        assert!((e - 120.0).abs() < 1e-6);
        assert!((n + 80.0).abs() < 1e-6);
        assert!((distance_m(&o, &p) - (120.0f64.hypot(80.0))).abs() < 0.5);
    }

    #[test]
    fn bearing_is_compass_style() {
        let o = pos(47.0, 8.0);
        assert!((bearing_deg(&o, &from_local(&o, 0.0, 100.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!((bearing_deg(&o, &from_local(&o, 100.0, 0.0, 0.0)) - 90.0).abs() < 1e-6);
        assert!((bearing_deg(&o, &from_local(&o, -100.0, 0.0, 0.0)) - 270.0).abs() < 1e-6);
    }

    #[test]
    fn polygon_contains_center_only() {
        let square = [
            Point { lat: 0.0, lon: 0.0 },
            Point { lat: 0.0, lon: 1.0 },
            Point { lat: 1.0, lon: 1.0 },
            Point { lat: 1.0, lon: 0.0 },
        ];
        assert!(point_in_polygon(&square, 0.5, 0.5));
        assert!(!point_in_polygon(&square, 1.5, 0.5));
        assert!(!point_in_polygon(&square[..2], 0.5, 0.5));
    }

    #[test]
    fn concave_notch_is_outside() {
        // L shape: the upper-right quadrant of the unit square is cut away.
        let l = [
            Point { lat: 0.0, lon: 0.0 },
            Point { lat: 0.0, lon: 1.0 },
            Point { lat: 0.5, lon: 1.0 },
            Point { lat: 0.5, lon: 0.5 },
            Point { lat: 1.0, lon: 0.5 },
            Point { lat: 1.0, lon: 0.0 },
        ];
        assert!(point_in_polygon(&l, 0.25, 0.75));
        assert!(point_in_polygon(&l, 0.75, 0.25));
        assert!(!point_in_polygon(&l, 0.75, 0.75));
    }
}
