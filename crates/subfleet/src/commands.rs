//! Builders for every outbound payload the station transmits. Each returns a
//! typed message ready for the link; the caller stamps the station header.

use mavlink::common::{self, MavCmd, MavMessage};

use crate::session::ManualSetpoint;

/// Base mode ArduSub expects alongside a custom mode: stabilize + manual
/// input + armed, with the custom-mode bit set.
const SET_MODE_BASE: f32 = 209.0;

const MOTOR_TEST_THROTTLE_PWM: f32 = 1.0;
const MOTOR_TEST_ORDER_DEFAULT: f32 = 0.0;

fn command_long(
    target_system: u8,
    target_component: u8,
    command: MavCmd,
    params: [f32; 7],
) -> MavMessage {
    MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
        target_system,
        target_component,
        command,
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    })
}

pub(crate) fn arm_disarm(target_system: u8, target_component: u8, arm: bool) -> MavMessage {
    let param1 = if arm { 1.0 } else { 0.0 };
    command_long(
        target_system,
        target_component,
        MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        [param1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    )
}

pub(crate) fn set_mode(
    target_system: u8,
    target_component: u8,
    custom_mode: u32,
) -> MavMessage {
    command_long(
        target_system,
        target_component,
        MavCmd::MAV_CMD_DO_SET_MODE,
        [SET_MODE_BASE, custom_mode as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
    )
}

pub(crate) fn set_servo(
    target_system: u8,
    target_component: u8,
    servo_no: f32,
    pwm: f32,
) -> MavMessage {
    command_long(
        target_system,
        target_component,
        MavCmd::MAV_CMD_DO_SET_SERVO,
        [servo_no, pwm, 0.0, 0.0, 0.0, 0.0, 0.0],
    )
}

/// DO_MOTOR_TEST with the throttle expressed as raw PWM; 10 s per motor,
/// 8 motors in the default order.
pub(crate) fn motor_test(
    target_system: u8,
    target_component: u8,
    motor_no: f32,
    pwm: f32,
) -> MavMessage {
    command_long(
        target_system,
        target_component,
        MavCmd::MAV_CMD_DO_MOTOR_TEST,
        [
            motor_no - 1.0,
            MOTOR_TEST_THROTTLE_PWM,
            pwm,
            10.0,
            8.0,
            MOTOR_TEST_ORDER_DEFAULT,
            0.0,
        ],
    )
}

pub(crate) fn rc_channels_override(
    target_system: u8,
    target_component: u8,
    channels: [u16; 8],
) -> MavMessage {
    MavMessage::RC_CHANNELS_OVERRIDE(common::RC_CHANNELS_OVERRIDE_DATA {
        chan1_raw: channels[0],
        chan2_raw: channels[1],
        chan3_raw: channels[2],
        chan4_raw: channels[3],
        chan5_raw: channels[4],
        chan6_raw: channels[5],
        chan7_raw: channels[6],
        chan8_raw: channels[7],
        target_system,
        target_component,
        ..Default::default()
    })
}

pub(crate) fn manual_control(target: u8, setpoint: &ManualSetpoint) -> MavMessage {
    MavMessage::MANUAL_CONTROL(common::MANUAL_CONTROL_DATA {
        x: setpoint.x,
        y: setpoint.y,
        z: setpoint.z,
        r: setpoint.r,
        buttons: setpoint.buttons,
        target,
        ..Default::default()
    })
}

pub(crate) fn request_data_stream(
    target_system: u8,
    target_component: u8,
    stream_id: u8,
    rate_hz: u16,
) -> MavMessage {
    MavMessage::REQUEST_DATA_STREAM(common::REQUEST_DATA_STREAM_DATA {
        req_message_rate: rate_hz,
        target_system,
        target_component,
        req_stream_id: stream_id,
        start_stop: 1,
    })
}

pub(crate) fn param_request_list(target_system: u8, target_component: u8) -> MavMessage {
    MavMessage::PARAM_REQUEST_LIST(common::PARAM_REQUEST_LIST_DATA {
        target_system,
        target_component,
    })
}

pub(crate) fn param_request_read(
    target_system: u8,
    target_component: u8,
    param_index: u16,
) -> MavMessage {
    MavMessage::PARAM_REQUEST_READ(common::PARAM_REQUEST_READ_DATA {
        param_index: param_index as i16,
        target_system,
        target_component,
        param_id: [0u8; 16].into(),
    })
}

/// The station's own presence beacon.
pub(crate) fn station_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: common::MavType::MAV_TYPE_GCS,
        autopilot: common::MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: common::MavModeFlag::empty(),
        system_status: common::MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_and_disarm_flip_param1() {
        let MavMessage::COMMAND_LONG(armed) = arm_disarm(1, 1, true) else {
            panic!("expected COMMAND_LONG");
        };
        assert_eq!(armed.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
        assert_eq!(armed.param1, 1.0);
        assert_eq!(armed.target_system, 1);

        let MavMessage::COMMAND_LONG(disarmed) = arm_disarm(1, 1, false) else {
            panic!("expected COMMAND_LONG");
        };
        assert_eq!(disarmed.param1, 0.0);
    }

    #[test]
    fn set_servo_carries_servo_and_pwm() {
        let MavMessage::COMMAND_LONG(cmd) = set_servo(1, 1, 9.0, 1500.0) else {
            panic!("expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_DO_SET_SERVO);
        assert_eq!(cmd.param1, 9.0);
        assert_eq!(cmd.param2, 1500.0);
    }

    #[test]
    fn motor_test_uses_pwm_throttle_and_zero_based_motor() {
        let MavMessage::COMMAND_LONG(cmd) = motor_test(1, 1, 3.0, 1600.0) else {
            panic!("expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_DO_MOTOR_TEST);
        assert_eq!(cmd.param1, 2.0);
        assert_eq!(cmd.param2, MOTOR_TEST_THROTTLE_PWM);
        assert_eq!(cmd.param3, 1600.0);
        assert_eq!(cmd.param4, 10.0);
        assert_eq!(cmd.param5, 8.0);
        assert_eq!(cmd.param6, MOTOR_TEST_ORDER_DEFAULT);
    }

    #[test]
    fn set_mode_encodes_ardusub_base_mode() {
        let MavMessage::COMMAND_LONG(cmd) = set_mode(1, 1, 2) else {
            panic!("expected COMMAND_LONG");
        };
        assert_eq!(cmd.command, MavCmd::MAV_CMD_DO_SET_MODE);
        assert_eq!(cmd.param1, 209.0);
        assert_eq!(cmd.param2, 2.0);
        assert_eq!(cmd.target_system, 1);
    }

    #[test]
    fn rc_override_maps_all_eight_channels() {
        let channels = [1100, 1200, 1300, 1400, 1500, 1600, 1700, 1800];
        let MavMessage::RC_CHANNELS_OVERRIDE(data) = rc_channels_override(2, 1, channels) else {
            panic!("expected RC_CHANNELS_OVERRIDE");
        };
        assert_eq!(data.chan1_raw, 1100);
        assert_eq!(data.chan8_raw, 1800);
        assert_eq!(data.target_system, 2);
    }

    #[test]
    fn manual_control_copies_the_setpoint() {
        let setpoint = ManualSetpoint {
            x: 500,
            y: -500,
            z: 100,
            r: 0,
            buttons: 0x0001,
        };
        let MavMessage::MANUAL_CONTROL(data) = manual_control(1, &setpoint) else {
            panic!("expected MANUAL_CONTROL");
        };
        assert_eq!(data.x, 500);
        assert_eq!(data.y, -500);
        assert_eq!(data.z, 100);
        assert_eq!(data.buttons, 0x0001);
        assert_eq!(data.target, 1);
    }

    #[test]
    fn stream_request_starts_the_stream() {
        let MavMessage::REQUEST_DATA_STREAM(data) = request_data_stream(1, 1, 6, 3) else {
            panic!("expected REQUEST_DATA_STREAM");
        };
        assert_eq!(data.req_stream_id, 6);
        assert_eq!(data.req_message_rate, 3);
        assert_eq!(data.start_stop, 1);
    }
}
