use serde::{Deserialize, Serialize};

/// A selectable ArduSub flight mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightMode {
    pub custom_mode: u32,
    pub name: String,
}

const SUB_MODES: &[(u32, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (7, "CIRCLE"),
    (9, "SURFACE"),
    (16, "POSHOLD"),
    (19, "MANUAL"),
    (20, "MOTOR_DETECT"),
    (21, "SURFTRAK"),
];

pub(crate) fn mode_name(custom_mode: u32) -> String {
    for &(num, name) in SUB_MODES {
        if num == custom_mode {
            return name.to_string();
        }
    }
    format!("UNKNOWN({custom_mode})")
}

pub(crate) fn mode_number(name: &str) -> Option<u32> {
    let wanted = name.trim().to_ascii_uppercase();
    SUB_MODES
        .iter()
        .find(|(_, mode)| *mode == wanted)
        .map(|&(num, _)| num)
}

/// Every mode the controller can request on an ArduSub vehicle.
pub fn available_modes() -> Vec<FlightMode> {
    SUB_MODES
        .iter()
        .map(|&(custom_mode, name)| FlightMode {
            custom_mode,
            name: name.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modes_resolve_both_ways() {
        assert_eq!(mode_name(0), "STABILIZE");
        assert_eq!(mode_name(9), "SURFACE");
        assert_eq!(mode_number("guided"), Some(4));
        assert_eq!(mode_number("ALT_HOLD"), Some(2));
    }

    #[test]
    fn unknown_modes_are_explicit() {
        assert_eq!(mode_name(42), "UNKNOWN(42)");
        assert_eq!(mode_number("FLY_BY_WIRE_A"), None);
    }

    #[test]
    fn mode_listing_is_complete() {
        let modes = available_modes();
        assert_eq!(modes.len(), SUB_MODES.len());
        assert!(modes.iter().any(|m| m.name == "MANUAL" && m.custom_mode == 19));
    }
}
