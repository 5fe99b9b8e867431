use mavlink::common::MavMessage;
use mavlink::MavHeader;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::aggregator;
use crate::commands;
use crate::config::{FleetConfig, TransportMode, TransportSelector};
use crate::db::Database;
use crate::error::FleetError;
use crate::link::{LinkError, MavLink, UdpLink};
use crate::logging;
use crate::modes;
use crate::session::{ManualSetpoint, Registry, Session, VehicleStatus};
use crate::snapshot::{NamedValueEvent, StatusTextEvent, VehicleSnapshot};
use crate::workers::VehicleWorkers;

/// Ground-station fleet controller.
///
/// `Controller` is `Clone + Send + Sync`; clones share the same registry and
/// transport. The lifecycle is single-shot: `init` once (repeat calls are
/// no-ops), then `deinit` to tear everything down.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: FleetConfig,
    initialized: Mutex<bool>,
    link: OnceLock<Arc<dyn MavLink>>,
    db: OnceLock<Database>,
    registry: Registry,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Controller {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                initialized: Mutex::new(false),
                link: OnceLock::new(),
                db: OnceLock::new(),
                registry: Registry::default(),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FleetConfig::default())
    }

    // --- Lifecycle ---

    /// Brings the controller up on the selected transport. Idempotent: only
    /// the first call does any work, later calls return Ok without effect.
    pub async fn init(&self, selector: TransportSelector) -> Result<(), FleetError> {
        let mut initialized = self.inner.initialized.lock().await;
        if *initialized {
            debug!("controller already initialized");
            return Ok(());
        }

        logging::install(&self.inner.config.logging);
        let link = self.build_link(&selector).await?;
        self.finish_init(link)?;
        *initialized = true;
        Ok(())
    }

    /// Same lifecycle with a caller-supplied transport; used with
    /// [`crate::link::LoopbackLink`] for simulators and tests.
    pub async fn init_with_link(&self, link: Arc<dyn MavLink>) -> Result<(), FleetError> {
        let mut initialized = self.inner.initialized.lock().await;
        if *initialized {
            debug!("controller already initialized");
            return Ok(());
        }

        logging::install(&self.inner.config.logging);
        self.finish_init(link)?;
        *initialized = true;
        Ok(())
    }

    /// Stops the reader and every vehicle worker, then waits for them. The
    /// controller cannot be re-initialized afterwards.
    pub async fn deinit(&self) {
        let initialized = self.inner.initialized.lock().await;
        if !*initialized {
            return;
        }
        info!("shutting down fleet controller");
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    async fn build_link(
        &self,
        selector: &TransportSelector,
    ) -> Result<Arc<dyn MavLink>, FleetError> {
        let transport = &self.inner.config.transport;
        match selector {
            TransportSelector::DefaultSubnet => match transport.mode {
                TransportMode::Udp => {
                    bind_udp(&transport.bind_address, &transport.subnet_address).await
                }
                TransportMode::Serial => self.open_serial().await,
            },
            TransportSelector::Subnet(subnet) => {
                bind_udp(&transport.bind_address, subnet).await
            }
            TransportSelector::Serial => self.open_serial().await,
        }
    }

    #[cfg(feature = "serial")]
    async fn open_serial(&self) -> Result<Arc<dyn MavLink>, FleetError> {
        let transport = &self.inner.config.transport;
        let link = crate::link::SerialLink::open(&transport.serial_port, transport.baud_rate)
            .await
            .map_err(|err| FleetError::ConnectionFailed(err.to_string()))?;
        Ok(Arc::new(link))
    }

    #[cfg(not(feature = "serial"))]
    async fn open_serial(&self) -> Result<Arc<dyn MavLink>, FleetError> {
        Err(FleetError::Config(String::from(
            "serial transport support not compiled in",
        )))
    }

    fn finish_init(&self, link: Arc<dyn MavLink>) -> Result<(), FleetError> {
        let db = Database::open(&self.inner.config.database.path)?;
        let _ = self.inner.db.set(db);
        let _ = self.inner.link.set(link);

        self.inner.tracker.spawn(run_reader(self.inner.clone()));
        info!(
            station = self.inner.config.station.system_id,
            "fleet controller initialized"
        );
        Ok(())
    }

    // --- Command surface ---

    /// Arms the vehicle. The setpoint resets to neutral first so the pump
    /// never replays stale joystick values into a fresh arming.
    pub async fn arm(&self, system_id: u8, autopilot: u8) -> Result<(), FleetError> {
        self.check_ready(system_id, "arm");
        if let Some(session) = self.inner.registry.get(system_id) {
            session.reset_manual();
            session.try_transition(VehicleStatus::Armed);
        }
        self.transmit(system_id, commands::arm_disarm(system_id, autopilot, true))
            .await
    }

    pub async fn disarm(&self, system_id: u8, autopilot: u8) -> Result<(), FleetError> {
        self.check_ready(system_id, "disarm");
        let result = self
            .transmit(system_id, commands::arm_disarm(system_id, autopilot, false))
            .await;
        if let Some(session) = self.inner.registry.get(system_id) {
            session.try_transition(VehicleStatus::Disarmed);
            session.reset_manual();
        }
        result
    }

    pub async fn set_mode(&self, system_id: u8, custom_mode: u32) -> Result<(), FleetError> {
        self.check_ready(system_id, "set_mode");
        let component = self.target_component(system_id);
        self.transmit(system_id, commands::set_mode(system_id, component, custom_mode))
            .await
    }

    pub async fn set_mode_by_name(&self, system_id: u8, name: &str) -> Result<(), FleetError> {
        let custom_mode = modes::mode_number(name)
            .ok_or_else(|| FleetError::ModeNotAvailable(name.to_string()))?;
        self.set_mode(system_id, custom_mode).await
    }

    pub async fn set_servo(
        &self,
        system_id: u8,
        autopilot: u8,
        servo_no: f32,
        pwm: f32,
    ) -> Result<(), FleetError> {
        self.check_ready(system_id, "set_servo");
        self.transmit(
            system_id,
            commands::set_servo(system_id, autopilot, servo_no, pwm),
        )
        .await
    }

    pub async fn motor_test(
        &self,
        system_id: u8,
        autopilot: u8,
        motor_no: f32,
        pwm: f32,
    ) -> Result<(), FleetError> {
        self.check_ready(system_id, "motor_test");
        self.transmit(
            system_id,
            commands::motor_test(system_id, autopilot, motor_no, pwm),
        )
        .await
    }

    pub async fn rc_channels_override(
        &self,
        system_id: u8,
        autopilot: u8,
        channels: [u16; 8],
    ) -> Result<(), FleetError> {
        self.check_ready(system_id, "rc_channels_override");
        self.transmit(
            system_id,
            commands::rc_channels_override(system_id, autopilot, channels),
        )
        .await
    }

    /// Stores joystick values for the manual-control pump of the sole
    /// admitted vehicle. With more than one vehicle use
    /// [`Controller::manual_control_for`].
    pub fn manual_control(&self, x: i16, y: i16, z: i16, r: i16, buttons: u16) {
        match self.inner.registry.sole() {
            Some(session) => self.store_manual(&session, x, y, z, r, buttons),
            None => warn!(
                vehicles = self.inner.registry.len(),
                "manual control needs an explicit system id"
            ),
        }
    }

    pub fn manual_control_for(
        &self,
        system_id: u8,
        x: i16,
        y: i16,
        z: i16,
        r: i16,
        buttons: u16,
    ) {
        match self.inner.registry.get(system_id) {
            Some(session) => self.store_manual(&session, x, y, z, r, buttons),
            None => warn!(system_id, "manual control for unknown vehicle"),
        }
    }

    fn store_manual(&self, session: &Session, x: i16, y: i16, z: i16, r: i16, buttons: u16) {
        // the vehicle only consumes manual control while armed
        if session.status() != VehicleStatus::Armed {
            debug!(
                system_id = session.system_id,
                "ignoring manual control, vehicle not armed"
            );
            return;
        }
        session.set_manual(ManualSetpoint { x, y, z, r, buttons });
    }

    // --- Read surface ---

    /// Owned clone of the latest published snapshot; stable for the caller
    /// while aggregation continues. Empty until the vehicle is ready.
    pub fn get_vehicle_data(&self, system_id: u8) -> Option<VehicleSnapshot> {
        self.session_for_read(system_id)
            .map(|session| session.snapshot())
    }

    /// False while the vehicle is unknown or still harvesting parameters.
    pub fn check_vehicle(&self, system_id: u8) -> bool {
        self.inner
            .registry
            .get(system_id)
            .map(|session| session.is_ready())
            .unwrap_or(false)
    }

    pub fn vehicle_ids(&self) -> Vec<u8> {
        self.inner.registry.ids()
    }

    pub fn vehicle_status(&self, system_id: u8) -> VehicleStatus {
        self.inner
            .registry
            .get(system_id)
            .map(|session| session.status())
            .unwrap_or(VehicleStatus::Uninitialized)
    }

    pub fn statustext_pop(&self, system_id: u8) -> Option<StatusTextEvent> {
        self.session_for_read(system_id)?
            .statustext_queue
            .try_pop()
    }

    pub fn statustext_count(&self, system_id: u8) -> usize {
        self.session_for_read(system_id)
            .map(|session| session.statustext_queue.len())
            .unwrap_or(0)
    }

    pub fn named_value_float_pop(&self, system_id: u8) -> Option<NamedValueEvent> {
        self.session_for_read(system_id)?
            .named_value_queue
            .try_pop()
    }

    pub fn named_value_float_count(&self, system_id: u8) -> usize {
        self.session_for_read(system_id)
            .map(|session| session.named_value_queue.len())
            .unwrap_or(0)
    }

    pub fn message_pop(&self, system_id: u8) -> Option<MavMessage> {
        self.session_for_read(system_id)?.message_queue.try_pop()
    }

    pub fn message_count(&self, system_id: u8) -> usize {
        self.session_for_read(system_id)
            .map(|session| session.message_queue.len())
            .unwrap_or(0)
    }

    // --- Internals ---

    /// Read-side session lookup: unknown and still-initiating vehicles both
    /// read as empty.
    fn session_for_read(&self, system_id: u8) -> Option<Arc<Session>> {
        match self.inner.registry.get(system_id) {
            Some(session) if session.is_ready() => Some(session),
            Some(_) => {
                debug!(system_id, "read from a vehicle that is still initiating");
                None
            }
            None => {
                debug!(system_id, "read from an unknown vehicle");
                None
            }
        }
    }

    /// Logs when a command addresses a vehicle that is absent or still
    /// initiating; the command is transmitted regardless, the vehicle may
    /// come online.
    fn check_ready(&self, system_id: u8, operation: &str) {
        if !self.check_vehicle(system_id) {
            warn!(system_id, operation, "command for a vehicle that is not ready");
        }
    }

    fn target_component(&self, system_id: u8) -> u8 {
        self.inner
            .registry
            .get(system_id)
            .map(|session| session.component_id)
            .unwrap_or(1)
    }

    async fn transmit(&self, target_system: u8, message: MavMessage) -> Result<(), FleetError> {
        let link = self
            .inner
            .link
            .get()
            .ok_or(FleetError::NotInitialized)?;
        let header = MavHeader {
            system_id: self.inner.config.station.system_id,
            component_id: self.inner.config.station.component_id,
            sequence: 0,
        };
        link.send_to(target_system, &header, &message)
            .await
            .map_err(|err| match err {
                // no learned route means the vehicle was never seen
                LinkError::UnknownPeer(system_id) => FleetError::UnknownVehicle(system_id),
                err => FleetError::from(err),
            })
    }
}

impl ControllerInner {
    /// Admits a newly seen system id: session, registry entry, worker set.
    fn admit(self: &Arc<Self>, system_id: u8, component_id: u8) -> Option<Arc<Session>> {
        let link = self.link.get()?.clone();

        let (session, events_rx) =
            Session::new(system_id, component_id, self.cancel.child_token());
        self.registry.insert(session.clone());
        session.try_transition(VehicleStatus::Initiating);
        info!(system_id, component_id, "vehicle admitted");

        let workers = VehicleWorkers {
            link,
            station: self.config.station,
            streams: self.config.stream_requests(),
            db: self.db.get().cloned(),
        };
        workers.spawn(&self.tracker, session.clone(), events_rx);
        Some(session)
    }

    fn dispatch(self: &Arc<Self>, header: MavHeader, message: MavMessage) {
        let source = header.system_id;
        if source == 0 || source == self.config.station.system_id {
            trace!(source, "ignoring frame without a vehicle source");
            return;
        }

        let session = match self.registry.get(source) {
            Some(session) => session,
            None => match self.admit(source, header.component_id) {
                Some(session) => session,
                None => return,
            },
        };
        aggregator::ingest(&session, &header, &message);
    }
}

async fn bind_udp(bind_addr: &str, subnet_addr: &str) -> Result<Arc<dyn MavLink>, FleetError> {
    let subnet = match subnet_addr.parse() {
        Ok(subnet) => Some(subnet),
        Err(_) => {
            warn!(subnet_addr, "unparseable subnet address, accepting any peer");
            None
        }
    };
    let link = UdpLink::bind_with_subnet(bind_addr, subnet)
        .await
        .map_err(|err| FleetError::ConnectionFailed(err.to_string()))?;
    Ok(Arc::new(link))
}

/// The process-wide transport reader: frames arrive here, get demultiplexed
/// by source system and folded into their session.
async fn run_reader(inner: Arc<ControllerInner>) {
    let Some(link) = inner.link.get().cloned() else {
        return;
    };

    loop {
        tokio::select! {
            biased;

            _ = inner.cancel.cancelled() => {
                debug!("transport reader stopped");
                break;
            }
            result = link.recv() => match result {
                Ok((header, message)) => inner.dispatch(header, message),
                Err(LinkError::Closed) => {
                    warn!("transport closed, reader exiting");
                    break;
                }
                Err(err) => {
                    warn!("transport receive error: {err}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}
