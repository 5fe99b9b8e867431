use mavlink::common::{MavMessage, MavModeFlag};
use mavlink::MavHeader;
use std::time::Instant;
use tracing::trace;

use crate::params::text_field;
use crate::session::{Session, VehicleStatus};
use crate::snapshot::{NamedValueEvent, StatusSeverity, StatusTextEvent};

/// Work handed from the aggregator to the session's event router.
#[derive(Debug)]
pub(crate) enum RouterEvent {
    Statustext(StatusTextEvent),
    NamedValueFloat(NamedValueEvent),
    Message(MavMessage),
}

/// Folds one inbound message into the session. Runs on the transport reader
/// task; the only writer of the session's MessageSet and ParamTable.
pub(crate) fn ingest(session: &Session, _header: &MavHeader, message: &MavMessage) {
    let recognized = update_message_set(session, message);

    match message {
        MavMessage::STATUSTEXT(data) => {
            let event = StatusTextEvent {
                severity: StatusSeverity::from_mav(data.severity),
                text: text_field(&data.text[..]),
            };
            let _ = session.events_tx.send(RouterEvent::Statustext(event));
        }
        MavMessage::NAMED_VALUE_FLOAT(data) => {
            let event = NamedValueEvent {
                name: text_field(&data.name[..]),
                value: data.value,
                time_boot_ms: data.time_boot_ms,
            };
            let _ = session.events_tx.send(RouterEvent::NamedValueFloat(event));
        }
        MavMessage::PARAM_VALUE(data) => {
            session.params.write().unwrap().record(data);
            session.param_notify.notify_one();
        }
        MavMessage::HEARTBEAT(data) => {
            let armed = data.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            sync_armed_state(session, armed);
        }
        _ => {}
    }

    if recognized {
        let _ = session
            .events_tx
            .send(RouterEvent::Message(message.clone()));
    } else {
        trace!(system_id = session.system_id, "unhandled message kind");
    }
}

/// Stores the payload in its MessageSet slot. Returns false for message
/// kinds the controller does not track.
fn update_message_set(session: &Session, message: &MavMessage) -> bool {
    let mut set = session.messages.write().unwrap();
    match message {
        MavMessage::HEARTBEAT(data) => {
            set.heartbeat = Some(data.clone());
            set.last_heartbeat = Some(Instant::now());
        }
        MavMessage::SYS_STATUS(data) => set.sys_status = Some(data.clone()),
        MavMessage::ATTITUDE(data) => set.attitude = Some(data.clone()),
        MavMessage::GPS_RAW_INT(data) => set.gps_raw = Some(data.clone()),
        MavMessage::GLOBAL_POSITION_INT(data) => set.global_position = Some(data.clone()),
        MavMessage::VFR_HUD(data) => set.vfr_hud = Some(data.clone()),
        MavMessage::BATTERY_STATUS(data) => set.battery = Some(data.clone()),
        MavMessage::RC_CHANNELS(data) => set.rc_channels = Some(data.clone()),
        MavMessage::SCALED_PRESSURE(data) => set.scaled_pressure = Some(data.clone()),
        MavMessage::SCALED_PRESSURE2(data) => set.scaled_pressure2 = Some(data.clone()),
        MavMessage::POWER_STATUS(data) => set.power_status = Some(data.clone()),
        MavMessage::SERVO_OUTPUT_RAW(data) => set.servo_output = Some(data.clone()),
        MavMessage::STATUSTEXT(data) => set.statustext = Some(data.clone()),
        MavMessage::NAMED_VALUE_FLOAT(data) => set.named_value_float = Some(data.clone()),
        MavMessage::PARAM_VALUE(_) => {}
        _ => return false,
    }
    true
}

/// Mirrors the armed bit reported by the vehicle. Only the Disarmed↔Armed
/// edge is walked; an Initiating session instead finishes admission once its
/// parameter set is complete.
fn sync_armed_state(session: &Session, armed: bool) {
    match session.status() {
        VehicleStatus::Initiating => {
            if session.params.read().unwrap().is_complete() {
                session.note_params_complete();
            }
        }
        VehicleStatus::Disarmed if armed => {
            session.try_transition(VehicleStatus::Armed);
        }
        VehicleStatus::Armed if !armed => {
            session.try_transition(VehicleStatus::Disarmed);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common;
    use tokio_util::sync::CancellationToken;

    fn header(system_id: u8) -> MavHeader {
        MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        }
    }

    fn heartbeat(armed: bool) -> MavMessage {
        let base_mode = if armed {
            MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
        } else {
            MavModeFlag::empty()
        };
        MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: common::MavType::MAV_TYPE_SUBMARINE,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: common::MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn statustext(text: &str) -> MavMessage {
        let mut buf = [0u8; 50];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        MavMessage::STATUSTEXT(common::STATUSTEXT_DATA {
            severity: common::MavSeverity::MAV_SEVERITY_NOTICE,
            text: buf.into(),
            ..Default::default()
        })
    }

    fn param_value(index: u16, count: u16) -> MavMessage {
        MavMessage::PARAM_VALUE(common::PARAM_VALUE_DATA {
            param_value: 1.0,
            param_count: count,
            param_index: index,
            param_id: [0u8; 16].into(),
            param_type: common::MavParamType::MAV_PARAM_TYPE_REAL32,
        })
    }

    #[tokio::test]
    async fn heartbeat_fills_slot_and_routes_whole_message() {
        let (session, mut events) = Session::new(1, 1, CancellationToken::new());
        ingest(&session, &header(1), &heartbeat(false));

        let set = session.messages.read().unwrap();
        assert!(set.heartbeat.is_some());
        assert!(set.last_heartbeat.is_some());
        drop(set);

        match events.recv().await {
            Some(RouterEvent::Message(MavMessage::HEARTBEAT(_))) => {}
            other => panic!("expected whole-message event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn statustext_emits_text_event_and_whole_message() {
        let (session, mut events) = Session::new(1, 1, CancellationToken::new());
        ingest(&session, &header(1), &statustext("depth hold engaged"));

        match events.recv().await {
            Some(RouterEvent::Statustext(event)) => {
                assert_eq!(event.text, "depth hold engaged");
                assert_eq!(event.severity, StatusSeverity::Notice);
            }
            other => panic!("expected statustext event, got {other:?}"),
        }
        assert!(matches!(
            events.recv().await,
            Some(RouterEvent::Message(MavMessage::STATUSTEXT(_)))
        ));
    }

    #[tokio::test]
    async fn param_values_complete_the_initiating_session() {
        let (session, _events) = Session::new(1, 1, CancellationToken::new());
        session.try_transition(VehicleStatus::Initiating);

        for index in 0..3 {
            ingest(&session, &header(1), &param_value(index, 3));
        }
        assert!(session.params.read().unwrap().is_complete());

        // the next heartbeat completes admission
        ingest(&session, &header(1), &heartbeat(false));
        assert_eq!(session.status(), VehicleStatus::Disarmed);
    }

    #[tokio::test]
    async fn heartbeat_mirrors_the_armed_bit() {
        let (session, _events) = Session::new(1, 1, CancellationToken::new());
        session.try_transition(VehicleStatus::Initiating);
        session.try_transition(VehicleStatus::Disarmed);

        ingest(&session, &header(1), &heartbeat(true));
        assert_eq!(session.status(), VehicleStatus::Armed);

        ingest(&session, &header(1), &heartbeat(false));
        assert_eq!(session.status(), VehicleStatus::Disarmed);
    }
}
