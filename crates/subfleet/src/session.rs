use mavlink::common;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::RouterEvent;
use crate::params::ParamTable;
use crate::queue::EventQueue;
use crate::snapshot::{NamedValueEvent, StatusTextEvent, VehicleSnapshot};

pub const MAX_STATUSTEXT: usize = 256;
pub const MAX_NAMED_VALUE_FLOAT: usize = 256;
pub const MAX_MESSAGE: usize = 1024;

/// Lifecycle of one vehicle. Transitions are restricted to:
/// Uninitialized → Initiating (admission), Initiating → Disarmed (parameter
/// harvest complete), Disarmed ↔ Armed (arm/disarm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VehicleStatus {
    Uninitialized = 0,
    Initiating = 1,
    Disarmed = 2,
    Armed = 3,
}

impl VehicleStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => VehicleStatus::Initiating,
            2 => VehicleStatus::Disarmed,
            3 => VehicleStatus::Armed,
            _ => VehicleStatus::Uninitialized,
        }
    }

    /// Permitted predecessors of each target state.
    fn permitted_from(self) -> &'static [VehicleStatus] {
        match self {
            VehicleStatus::Uninitialized => &[],
            VehicleStatus::Initiating => &[VehicleStatus::Uninitialized],
            VehicleStatus::Disarmed => &[VehicleStatus::Initiating, VehicleStatus::Armed],
            VehicleStatus::Armed => &[VehicleStatus::Disarmed],
        }
    }
}

/// Last-seen payload per recognized message kind, plus the heartbeat clock.
/// Written only by the aggregator of the owning session.
#[derive(Debug, Clone, Default)]
pub struct MessageSet {
    pub heartbeat: Option<common::HEARTBEAT_DATA>,
    pub sys_status: Option<common::SYS_STATUS_DATA>,
    pub attitude: Option<common::ATTITUDE_DATA>,
    pub gps_raw: Option<common::GPS_RAW_INT_DATA>,
    pub global_position: Option<common::GLOBAL_POSITION_INT_DATA>,
    pub vfr_hud: Option<common::VFR_HUD_DATA>,
    pub battery: Option<common::BATTERY_STATUS_DATA>,
    pub rc_channels: Option<common::RC_CHANNELS_DATA>,
    pub scaled_pressure: Option<common::SCALED_PRESSURE_DATA>,
    pub scaled_pressure2: Option<common::SCALED_PRESSURE2_DATA>,
    pub power_status: Option<common::POWER_STATUS_DATA>,
    pub servo_output: Option<common::SERVO_OUTPUT_RAW_DATA>,
    pub statustext: Option<common::STATUSTEXT_DATA>,
    pub named_value_float: Option<common::NAMED_VALUE_FLOAT_DATA>,
    pub last_heartbeat: Option<Instant>,
}

/// Joystick axes and button mask pumped to an armed vehicle.
/// z is throttle, 0..=1000 with 500 neutral; x/y/r are −1000..=1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualSetpoint {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub r: i16,
    pub buttons: u16,
}

impl ManualSetpoint {
    pub const NEUTRAL: Self = Self {
        x: 0,
        y: 0,
        z: 500,
        r: 0,
        buttons: 0,
    };
}

impl Default for ManualSetpoint {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Per-vehicle state bundle. Lock order inside a session: messages before
/// params before manual; no lock is held across an await or a link send.
pub struct Session {
    pub system_id: u8,
    pub component_id: u8,
    pub(crate) messages: RwLock<MessageSet>,
    pub(crate) params: RwLock<ParamTable>,
    pub(crate) manual: Mutex<ManualSetpoint>,
    status: AtomicU8,
    pub(crate) statustext_queue: EventQueue<StatusTextEvent>,
    pub(crate) named_value_queue: EventQueue<NamedValueEvent>,
    pub(crate) message_queue: EventQueue<common::MavMessage>,
    pub(crate) param_notify: Notify,
    pub(crate) events_tx: mpsc::UnboundedSender<RouterEvent>,
    snapshot_tx: watch::Sender<VehicleSnapshot>,
    snapshot_rx: watch::Receiver<VehicleSnapshot>,
    pub(crate) cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        system_id: u8,
        component_id: u8,
        cancel: CancellationToken,
    ) -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<RouterEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(VehicleSnapshot::default());

        let session = std::sync::Arc::new(Self {
            system_id,
            component_id,
            messages: RwLock::new(MessageSet::default()),
            params: RwLock::new(ParamTable::default()),
            manual: Mutex::new(ManualSetpoint::NEUTRAL),
            status: AtomicU8::new(VehicleStatus::Uninitialized as u8),
            statustext_queue: EventQueue::new(MAX_STATUSTEXT, "statustext"),
            named_value_queue: EventQueue::new(MAX_NAMED_VALUE_FLOAT, "named_value_float"),
            message_queue: EventQueue::new(MAX_MESSAGE, "message"),
            param_notify: Notify::new(),
            events_tx,
            snapshot_tx,
            snapshot_rx,
            cancel,
        });

        (session, events_rx)
    }

    pub fn status(&self) -> VehicleStatus {
        VehicleStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Moves to `target` if the current status is a permitted predecessor.
    /// Rejected transitions are logged and leave the status untouched.
    pub(crate) fn try_transition(&self, target: VehicleStatus) -> bool {
        for &from in target.permitted_from() {
            if self
                .status
                .compare_exchange(
                    from as u8,
                    target as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
        warn!(
            system_id = self.system_id,
            current = ?self.status(),
            requested = ?target,
            "rejected vehicle status transition"
        );
        false
    }

    /// True once the vehicle has finished initiating.
    pub fn is_ready(&self) -> bool {
        matches!(
            self.status(),
            VehicleStatus::Disarmed | VehicleStatus::Armed
        )
    }

    /// Called when the parameter harvest finishes; completes admission.
    pub(crate) fn note_params_complete(&self) {
        if self.status() == VehicleStatus::Initiating
            && self.try_transition(VehicleStatus::Disarmed)
        {
            info!(system_id = self.system_id, "vehicle ready, parameter set complete");
        }
    }

    pub(crate) fn set_manual(&self, setpoint: ManualSetpoint) {
        *self.manual.lock().unwrap() = setpoint;
    }

    pub(crate) fn reset_manual(&self) {
        self.set_manual(ManualSetpoint::NEUTRAL);
    }

    pub(crate) fn manual_setpoint(&self) -> ManualSetpoint {
        *self.manual.lock().unwrap()
    }

    pub(crate) fn publish_snapshot(&self, snapshot: VehicleSnapshot) {
        let _ = self.snapshot_tx.send(snapshot);
    }

    pub(crate) fn snapshot(&self) -> VehicleSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

/// The fleet table: SystemId → session. One reader/writer lock; sessions are
/// inserted at admission and live for the controller lifetime.
#[derive(Default)]
pub(crate) struct Registry {
    sessions: RwLock<HashMap<u8, std::sync::Arc<Session>>>,
}

impl Registry {
    pub(crate) fn get(&self, system_id: u8) -> Option<std::sync::Arc<Session>> {
        self.sessions.read().unwrap().get(&system_id).cloned()
    }

    /// Installs a freshly admitted session. A duplicate system id is a
    /// programming error and fails loudly.
    pub(crate) fn insert(&self, session: std::sync::Arc<Session>) {
        let mut sessions = self.sessions.write().unwrap();
        let system_id = session.system_id;
        if sessions.insert(system_id, session).is_some() {
            panic!("system {system_id} admitted twice");
        }
    }

    pub(crate) fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.sessions.read().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// The sole session, when exactly one vehicle is admitted.
    pub(crate) fn sole(&self) -> Option<std::sync::Arc<Session>> {
        let sessions = self.sessions.read().unwrap();
        if sessions.len() == 1 {
            sessions.values().next().cloned()
        } else {
            None
        }
    }
}
