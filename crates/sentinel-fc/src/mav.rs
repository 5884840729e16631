use mavlink::common::{
    MavAutopilot, MavCmd, MavDataStream, MavFrame, MavMessage, MavModeFlag, MavState, MavType, COMMAND_INT_DATA,
    COMMAND_LONG_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, REQUEST_DATA_STREAM_DATA,
};
use std::time::Instant;

use sentinel_proto::vehicle::{Battery, NavCommand, SensedState};

// MAV_DO_REPOSITION_FLAGS_CHANGE_MODE: let the autopilot switch to guided.
const REPOSITION_CHANGE_MODE: f32 = 1.0;

pub fn companion_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn command_long(target_sys: u8, target_comp: u8, command: MavCmd, p: [f32; 7]) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system: target_sys,
        target_component: target_comp,
        command,
        confirmation: 0,
        param1: p[0],
        param2: p[1],
        param3: p[2],
        param4: p[3],
        param5: p[4],
        param6: p[5],
        param7: p[6],
    })
}

/// One-to-one translation of a navigation intent onto the common dialect.
pub fn command_message(cmd: &NavCommand, target_sys: u8, target_comp: u8) -> MavMessage {
    match *cmd {
        NavCommand::Navigate { target, speed_mps } => MavMessage::COMMAND_INT(COMMAND_INT_DATA {
            target_system: target_sys,
            target_component: target_comp,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            command: MavCmd::MAV_CMD_DO_REPOSITION,
            current: 0,
            autocontinue: 0,
            param1: speed_mps,
            param2: REPOSITION_CHANGE_MODE,
            param3: 0.0,
            // keep current yaw behaviour
            param4: f32::NAN,
            x: (target.lat * 1e7).round() as i32,
            y: (target.lon * 1e7).round() as i32,
            z: target.alt_m,
        }),
        NavCommand::Hold => command_long(target_sys, target_comp, MavCmd::MAV_CMD_NAV_LOITER_UNLIM, [0.0; 7]),
        NavCommand::Return => command_long(target_sys, target_comp, MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH, [0.0; 7]),
        // lat/lon zero: land at the current position
        NavCommand::Land => command_long(target_sys, target_comp, MavCmd::MAV_CMD_NAV_LAND, [0.0; 7]),
        NavCommand::Arm => {
            command_long(target_sys, target_comp, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        }
        NavCommand::Takeoff { alt_m } => {
            command_long(target_sys, target_comp, MavCmd::MAV_CMD_NAV_TAKEOFF, [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, alt_m])
        }
    }
}

/// Start POSITION (GLOBAL_POSITION_INT) and EXTENDED_STATUS (SYS_STATUS)
/// streams. ArduPilot on a serial port often sends neither until asked.
pub fn stream_requests(rate_hz: u16, target_sys: u8, target_comp: u8) -> Vec<MavMessage> {
    [MavDataStream::MAV_DATA_STREAM_POSITION, MavDataStream::MAV_DATA_STREAM_EXTENDED_STATUS]
        .into_iter()
        .map(|stream| {
            MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
                req_message_rate: rate_hz,
                target_system: target_sys,
                target_component: target_comp,
                req_stream_id: stream as u8,
                start_stop: 1,
            })
        })
        .collect()
}

/// SYS_STATUS battery fields with their "unknown" sentinels mapped to None.
pub fn battery_from_raw(voltage_mv: u16, current_ca: i16, remaining_pct: i8) -> Battery {
    Battery {
        // voltage_battery is in millivolts
        voltage: (voltage_mv != u16::MAX).then(|| voltage_mv as f32 / 1000.0),
        // current_battery is in centiamps, -1 means invalid
        current: (current_ca != -1).then(|| current_ca as f32 / 100.0),
        remaining: (0..=100).contains(&remaining_pct).then_some(remaining_pct as u8),
    }
}

pub fn apply_position(state: &mut SensedState, p: &GLOBAL_POSITION_INT_DATA, now: Instant) {
    state.position.lat = p.lat as f64 / 1e7;
    state.position.lon = p.lon as f64 / 1e7;
    // relative_alt in mm above home
    state.position.alt_m = p.relative_alt as f32 / 1000.0;
    if p.hdg != u16::MAX {
        state.heading_deg = p.hdg as f32 / 100.0;
    }
    state.ground_speed_mps = (p.vx as f32).hypot(p.vy as f32) / 100.0;
    state.updated_at = Some(now);
}

/// Heartbeats from other companions/GCS share the link; only the
/// autopilot's count.
pub fn is_autopilot_heartbeat(sys_id: u8, target_sys: u8, hb: &HEARTBEAT_DATA) -> bool {
    sys_id == target_sys && hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
}

/// Folds one inbound message into the sensed state. Returns true if
/// anything the rest of the system reads changed.
pub fn apply_message(state: &mut SensedState, sys_id: u8, target_sys: u8, msg: &MavMessage, now: Instant) -> bool {
    match msg {
        MavMessage::HEARTBEAT(hb) if is_autopilot_heartbeat(sys_id, target_sys, hb) => {
            state.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            state.custom_mode = hb.custom_mode;
            true
        }
        MavMessage::GLOBAL_POSITION_INT(p) if sys_id == target_sys => {
            apply_position(state, p, now);
            true
        }
        MavMessage::SYS_STATUS(s) if sys_id == target_sys => {
            state.battery = battery_from_raw(s.voltage_battery, s.current_battery, s.battery_remaining);
            true
        }
        _ => false,
    }
}
