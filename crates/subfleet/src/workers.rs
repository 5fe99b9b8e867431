//! The per-vehicle worker set: manual-control pump, stream subscriber,
//! parameter harvester, event router and snapshot publisher. Workers share
//! nothing with each other beyond the session they serve, observe the session
//! cancel token at every tick, and never hold a lock across a link send.

use mavlink::common::MavMessage;
use mavlink::MavHeader;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::aggregator::RouterEvent;
use crate::commands;
use crate::config::StationConfig;
use crate::db::Database;
use crate::link::MavLink;
use crate::params::{HarvestMachine, HarvestPhase, HarvestPolicy};
use crate::session::{Session, VehicleStatus};
use crate::snapshot::VehicleSnapshot;

/// Pump cadence; also paces the once-a-second station heartbeat, which must
/// stay well under ArduSub's ground-station timeout.
const MANUAL_CONTROL_PERIOD: Duration = Duration::from_millis(40);
const TICKS_PER_HEARTBEAT: u32 = 25;

const STREAM_REQUEST_PERIOD: Duration = Duration::from_secs(1);
const SNAPSHOT_PERIOD: Duration = Duration::from_secs(1);

/// Indexed PARAM_REQUEST_READ fan-out per retry round.
const PARAM_READ_BATCH: usize = 64;

pub(crate) struct VehicleWorkers {
    pub link: Arc<dyn MavLink>,
    pub station: StationConfig,
    pub streams: Vec<(u8, u16)>,
    pub db: Option<Database>,
}

impl VehicleWorkers {
    /// Spawns the five workers of one admitted vehicle onto the tracker.
    pub(crate) fn spawn(
        self,
        tracker: &TaskTracker,
        session: Arc<Session>,
        events_rx: mpsc::UnboundedReceiver<RouterEvent>,
    ) {
        tracker.spawn(param_harvester(
            session.clone(),
            self.link.clone(),
            self.station,
        ));
        tracker.spawn(stream_subscriber(
            session.clone(),
            self.link.clone(),
            self.station,
            self.streams,
        ));
        tracker.spawn(manual_control_pump(
            session.clone(),
            self.link.clone(),
            self.station,
        ));
        tracker.spawn(event_router(session.clone(), events_rx));
        tracker.spawn(snapshot_publisher(session, self.db));
    }
}

fn station_header(station: &StationConfig) -> MavHeader {
    MavHeader {
        system_id: station.system_id,
        component_id: station.component_id,
        sequence: 0,
    }
}

async fn send(
    link: &dyn MavLink,
    station: &StationConfig,
    target_system: u8,
    message: MavMessage,
) {
    if let Err(err) = link
        .send_to(target_system, &station_header(station), &message)
        .await
    {
        debug!(target_system, "link send failed: {err}");
    }
}

// ---------------------------------------------------------------------------
// Manual-control pump
// ---------------------------------------------------------------------------

/// Transmits the stored setpoint at a fixed rate while the vehicle is armed
/// and beats the station heartbeat once a second regardless of arm state.
async fn manual_control_pump(
    session: Arc<Session>,
    link: Arc<dyn MavLink>,
    station: StationConfig,
) {
    let mut ticks: u32 = 0;
    let mut interval = tokio::time::interval(MANUAL_CONTROL_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        if ticks % TICKS_PER_HEARTBEAT == 0 {
            send(
                link.as_ref(),
                &station,
                session.system_id,
                commands::station_heartbeat(),
            )
            .await;
        }
        ticks = ticks.wrapping_add(1);

        if session.status() != VehicleStatus::Armed {
            continue;
        }

        let setpoint = session.manual_setpoint();
        send(
            link.as_ref(),
            &station,
            session.system_id,
            commands::manual_control(session.system_id, &setpoint),
        )
        .await;
    }
}

// ---------------------------------------------------------------------------
// Stream subscriber
// ---------------------------------------------------------------------------

/// Re-requests every configured data stream once a second; ArduSub drops
/// stream subscriptions on reboot, so a one-shot request is not enough.
async fn stream_subscriber(
    session: Arc<Session>,
    link: Arc<dyn MavLink>,
    station: StationConfig,
    streams: Vec<(u8, u16)>,
) {
    let mut interval = tokio::time::interval(STREAM_REQUEST_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        for &(stream_id, rate_hz) in &streams {
            send(
                link.as_ref(),
                &station,
                session.system_id,
                commands::request_data_stream(
                    session.system_id,
                    session.component_id,
                    stream_id,
                    rate_hz,
                ),
            )
            .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter harvester
// ---------------------------------------------------------------------------

/// Requests the full parameter list and retries until every index in
/// `[0, expected_count)` arrived, falling back to indexed reads for the last
/// holes. On retry exhaustion the session stays in Initiating.
async fn param_harvester(session: Arc<Session>, link: Arc<dyn MavLink>, station: StationConfig) {
    let mut machine = HarvestMachine::new(HarvestPolicy::default());

    loop {
        match machine.phase() {
            HarvestPhase::RequestList => {
                send(
                    link.as_ref(),
                    &station,
                    session.system_id,
                    commands::param_request_list(session.system_id, session.component_id),
                )
                .await;
            }
            HarvestPhase::RequestMissing => {
                let missing = session
                    .params
                    .read()
                    .unwrap()
                    .missing_indices(PARAM_READ_BATCH);
                for index in missing {
                    send(
                        link.as_ref(),
                        &station,
                        session.system_id,
                        commands::param_request_read(
                            session.system_id,
                            session.component_id,
                            index,
                        ),
                    )
                    .await;
                }
            }
            HarvestPhase::Completed | HarvestPhase::Failed => break,
        }

        let round = tokio::time::sleep(machine.round_timeout());
        tokio::pin!(round);

        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => return,
                _ = &mut round => break,
                _ = session.param_notify.notified() => {
                    if session.params.read().unwrap().is_complete() {
                        machine.on_complete();
                        break;
                    }
                }
            }
        }

        if machine.phase() == HarvestPhase::Completed {
            session.note_params_complete();
            break;
        }

        // the notify can race the round deadline; re-check before retrying
        if session.params.read().unwrap().is_complete() {
            machine.on_complete();
            session.note_params_complete();
            break;
        }

        let expected_known = session.params.read().unwrap().expected_count().is_some();
        machine.on_round_timeout(expected_known);
        if machine.phase() == HarvestPhase::Failed {
            error!(
                system_id = session.system_id,
                rounds = machine.rounds_used(),
                "parameter harvest ran out of retries, vehicle stays initiating"
            );
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Event router
// ---------------------------------------------------------------------------

/// Drains aggregator notifications into the bounded per-vehicle queues.
async fn event_router(session: Arc<Session>, mut events_rx: mpsc::UnboundedReceiver<RouterEvent>) {
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    RouterEvent::Statustext(event) => session.statustext_queue.push(event),
                    RouterEvent::NamedValueFloat(event) => session.named_value_queue.push(event),
                    RouterEvent::Message(message) => session.message_queue.push(message),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot publisher
// ---------------------------------------------------------------------------

/// Periodically rebuilds the consumer snapshot from the message set and
/// mirrors it into the telemetry store.
async fn snapshot_publisher(session: Arc<Session>, db: Option<Database>) {
    let mut interval = tokio::time::interval(SNAPSHOT_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let snapshot = {
            let set = session.messages.read().unwrap();
            VehicleSnapshot::from_messages(&set)
        };

        if let Some(db) = &db {
            if let Err(err) = db.insert_snapshot(session.system_id, &snapshot).await {
                warn!(system_id = session.system_id, "telemetry insert failed: {err}");
            }
        }

        session.publish_snapshot(snapshot);
    }
}
