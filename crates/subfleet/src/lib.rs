mod aggregator;
mod commands;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod link;
mod logging;
pub mod modes;
pub mod params;
mod queue;
pub mod session;
pub mod snapshot;
mod workers;

pub use config::{FleetConfig, TransportSelector};
pub use controller::Controller;
pub use db::{Database, TelemetryTable};
pub use error::FleetError;
pub use modes::{available_modes, FlightMode};

pub use link::{LinkError, LinkFrame, LoopbackHarness, LoopbackLink, MavLink, UdpLink};
#[cfg(feature = "serial")]
pub use link::SerialLink;

pub use session::{
    ManualSetpoint, VehicleStatus, MAX_MESSAGE, MAX_NAMED_VALUE_FLOAT, MAX_STATUSTEXT,
};

pub use snapshot::{
    GpsFixType, NamedValueEvent, StatusSeverity, StatusTextEvent, SystemStatus, VehicleSnapshot,
};

pub use params::{Param, ParamType};
