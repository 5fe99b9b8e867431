use mavlink::common::{MavModeFlag, MavSeverity, MavState};
use serde::{Deserialize, Serialize};

use crate::modes;
use crate::params::text_field;
use crate::session::MessageSet;

/// Denormalized, consumer-facing view of one vehicle's latest telemetry.
///
/// Built from the raw message set by the snapshot publisher and handed to the
/// embedder as an owned clone, so it stays stable while aggregation continues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub armed: bool,
    pub custom_mode: u32,
    pub mode_name: String,
    pub system_status: SystemStatus,

    pub roll_rad: Option<f32>,
    pub pitch_rad: Option<f32>,
    pub yaw_rad: Option<f32>,

    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    pub altitude_m: Option<f64>,
    /// Positive going down; ArduSub reports depth as negative altitude.
    pub depth_m: Option<f64>,
    pub heading_deg: Option<f64>,
    pub groundspeed_mps: Option<f64>,
    pub climb_mps: Option<f64>,
    pub throttle_pct: Option<u16>,

    pub battery_voltage_v: Option<f64>,
    pub battery_current_a: Option<f64>,
    pub battery_remaining_pct: Option<i8>,

    pub gps_fix_type: Option<GpsFixType>,
    pub satellites_visible: Option<u8>,

    pub rc_channels: Option<[u16; 8]>,

    pub pressure_abs_hpa: Option<f64>,
    pub water_temperature_c: Option<f64>,

    pub last_statustext: Option<String>,
}

impl VehicleSnapshot {
    pub(crate) fn from_messages(set: &MessageSet) -> Self {
        let mut snapshot = VehicleSnapshot::default();

        if let Some(hb) = &set.heartbeat {
            snapshot.armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            snapshot.custom_mode = hb.custom_mode;
            snapshot.mode_name = modes::mode_name(hb.custom_mode);
            snapshot.system_status = SystemStatus::from_mav(hb.system_status);
        }

        if let Some(att) = &set.attitude {
            snapshot.roll_rad = Some(att.roll);
            snapshot.pitch_rad = Some(att.pitch);
            snapshot.yaw_rad = Some(att.yaw);
        }

        if let Some(pos) = &set.global_position {
            snapshot.latitude_deg = Some(pos.lat as f64 / 1e7);
            snapshot.longitude_deg = Some(pos.lon as f64 / 1e7);
            snapshot.altitude_m = Some(pos.relative_alt as f64 / 1000.0);
            snapshot.depth_m = Some(-(pos.relative_alt as f64) / 1000.0);
            if pos.hdg != u16::MAX {
                snapshot.heading_deg = Some(pos.hdg as f64 / 100.0);
            }
        }

        if let Some(hud) = &set.vfr_hud {
            snapshot.groundspeed_mps = Some(hud.groundspeed as f64);
            snapshot.climb_mps = Some(hud.climb as f64);
            snapshot.throttle_pct = Some(hud.throttle);
            if snapshot.heading_deg.is_none() {
                snapshot.heading_deg = Some(hud.heading as f64);
            }
        }

        if let Some(status) = &set.sys_status {
            snapshot.battery_voltage_v = Some(status.voltage_battery as f64 / 1000.0);
            if status.current_battery >= 0 {
                snapshot.battery_current_a = Some(status.current_battery as f64 / 100.0);
            }
            if status.battery_remaining >= 0 {
                snapshot.battery_remaining_pct = Some(status.battery_remaining);
            }
        }

        if let Some(gps) = &set.gps_raw {
            snapshot.gps_fix_type = Some(GpsFixType::from_raw(gps.fix_type as u8));
            if gps.satellites_visible != u8::MAX {
                snapshot.satellites_visible = Some(gps.satellites_visible);
            }
        }

        if let Some(rc) = &set.rc_channels {
            snapshot.rc_channels = Some([
                rc.chan1_raw,
                rc.chan2_raw,
                rc.chan3_raw,
                rc.chan4_raw,
                rc.chan5_raw,
                rc.chan6_raw,
                rc.chan7_raw,
                rc.chan8_raw,
            ]);
        }

        if let Some(pressure) = &set.scaled_pressure2 {
            snapshot.pressure_abs_hpa = Some(pressure.press_abs as f64);
            snapshot.water_temperature_c = Some(pressure.temperature as f64 / 100.0);
        } else if let Some(pressure) = &set.scaled_pressure {
            snapshot.pressure_abs_hpa = Some(pressure.press_abs as f64);
            snapshot.water_temperature_c = Some(pressure.temperature as f64 / 100.0);
        }

        if let Some(text) = &set.statustext {
            snapshot.last_statustext = Some(text_field(&text.text[..]));
        }

        snapshot
    }
}

/// STATUSTEXT delivered to the embedder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTextEvent {
    pub severity: StatusSeverity,
    pub text: String,
}

/// NAMED_VALUE_FLOAT delivered to the embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValueEvent {
    pub name: String,
    pub value: f32,
    pub time_boot_ms: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSeverity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    #[default]
    Info,
    Debug,
}

impl StatusSeverity {
    pub(crate) fn from_mav(severity: MavSeverity) -> Self {
        match severity {
            MavSeverity::MAV_SEVERITY_EMERGENCY => StatusSeverity::Emergency,
            MavSeverity::MAV_SEVERITY_ALERT => StatusSeverity::Alert,
            MavSeverity::MAV_SEVERITY_CRITICAL => StatusSeverity::Critical,
            MavSeverity::MAV_SEVERITY_ERROR => StatusSeverity::Error,
            MavSeverity::MAV_SEVERITY_WARNING => StatusSeverity::Warning,
            MavSeverity::MAV_SEVERITY_NOTICE => StatusSeverity::Notice,
            MavSeverity::MAV_SEVERITY_INFO => StatusSeverity::Info,
            MavSeverity::MAV_SEVERITY_DEBUG => StatusSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Unknown,
    Boot,
    Calibrating,
    Standby,
    Active,
    Critical,
    Emergency,
    Poweroff,
}

impl SystemStatus {
    pub(crate) fn from_mav(status: MavState) -> Self {
        match status {
            MavState::MAV_STATE_BOOT => SystemStatus::Boot,
            MavState::MAV_STATE_CALIBRATING => SystemStatus::Calibrating,
            MavState::MAV_STATE_STANDBY => SystemStatus::Standby,
            MavState::MAV_STATE_ACTIVE => SystemStatus::Active,
            MavState::MAV_STATE_CRITICAL => SystemStatus::Critical,
            MavState::MAV_STATE_EMERGENCY => SystemStatus::Emergency,
            MavState::MAV_STATE_POWEROFF => SystemStatus::Poweroff,
            _ => SystemStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsFixType {
    #[default]
    NoFix,
    Fix2d,
    Fix3d,
    Dgps,
    RtkFloat,
    RtkFixed,
}

impl GpsFixType {
    pub(crate) fn from_raw(fix_type: u8) -> Self {
        match fix_type {
            2 => GpsFixType::Fix2d,
            3 => GpsFixType::Fix3d,
            4 => GpsFixType::Dgps,
            5 => GpsFixType::RtkFloat,
            6 => GpsFixType::RtkFixed,
            _ => GpsFixType::NoFix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common;

    #[test]
    fn empty_message_set_yields_default_snapshot() {
        let snapshot = VehicleSnapshot::from_messages(&MessageSet::default());
        assert_eq!(snapshot, VehicleSnapshot::default());
    }

    #[test]
    fn heartbeat_and_position_are_denormalized() {
        let mut set = MessageSet::default();
        set.heartbeat = Some(common::HEARTBEAT_DATA {
            custom_mode: 2,
            mavtype: common::MavType::MAV_TYPE_SUBMARINE,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: common::MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED,
            system_status: common::MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        });
        set.global_position = Some(common::GLOBAL_POSITION_INT_DATA {
            time_boot_ms: 1000,
            lat: 473_977_420,
            lon: 85_455_940,
            alt: 0,
            relative_alt: -12_500,
            vx: 0,
            vy: 0,
            vz: 0,
            hdg: 9000,
        });

        let snapshot = VehicleSnapshot::from_messages(&set);
        assert!(snapshot.armed);
        assert_eq!(snapshot.mode_name, "ALT_HOLD");
        assert_eq!(snapshot.system_status, SystemStatus::Active);
        assert_eq!(snapshot.latitude_deg, Some(47.397742));
        assert_eq!(snapshot.depth_m, Some(12.5));
        assert_eq!(snapshot.heading_deg, Some(90.0));
    }

    #[test]
    fn battery_sentinels_are_filtered() {
        let mut set = MessageSet::default();
        set.sys_status = Some(common::SYS_STATUS_DATA {
            load: 120,
            voltage_battery: 12_600,
            current_battery: -1,
            battery_remaining: -1,
            ..Default::default()
        });

        let snapshot = VehicleSnapshot::from_messages(&set);
        assert_eq!(snapshot.battery_voltage_v, Some(12.6));
        assert_eq!(snapshot.battery_current_a, None);
        assert_eq!(snapshot.battery_remaining_pct, None);
    }

    #[test]
    fn external_pressure_sensor_wins_over_internal() {
        let mut set = MessageSet::default();
        set.scaled_pressure = Some(common::SCALED_PRESSURE_DATA {
            press_abs: 1013.0,
            temperature: 3100,
            ..Default::default()
        });
        set.scaled_pressure2 = Some(common::SCALED_PRESSURE2_DATA {
            press_abs: 1250.0,
            temperature: 1500,
            ..Default::default()
        });

        let snapshot = VehicleSnapshot::from_messages(&set);
        assert_eq!(snapshot.pressure_abs_hpa, Some(1250.0));
        assert_eq!(snapshot.water_temperature_c, Some(15.0));
    }
}
