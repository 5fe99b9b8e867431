use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::FleetError;

/// Transport chosen at `init` time. `DefaultSubnet` uses the subnet address
/// from the configuration file, `Subnet` overrides it, `Serial` uses the
/// configured serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSelector {
    DefaultSubnet,
    Subnet(String),
    Serial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub station: StationConfig,
    pub transport: TransportConfig,
    pub streams: StreamConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

/// Identity the station stamps into every outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub system_id: u8,
    pub component_id: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// "udp" or "serial"; only consulted when the embedder passes
    /// `TransportSelector::DefaultSubnet` but the file says otherwise.
    pub mode: TransportMode,
    pub bind_address: String,
    pub subnet_address: String,
    pub serial_port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Udp,
    Serial,
}

/// Requested REQUEST_DATA_STREAM rates, in Hz. Zero disables a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub raw_sensors: u16,
    pub extended_status: u16,
    pub rc_channels: u16,
    pub position: u16,
    pub extra1: u16,
    pub extra2: u16,
    pub extra3: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Empty means stderr.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlite file path; ":memory:" keeps the store in RAM.
    pub path: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            station: StationConfig::default(),
            transport: TransportConfig::default(),
            streams: StreamConfig::default(),
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            system_id: 255,
            component_id: 190,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Udp,
            bind_address: String::from("0.0.0.0:14550"),
            subnet_address: String::from("192.168.2.0"),
            serial_port: String::from("/dev/ttyACM0"),
            baud_rate: 115_200,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            raw_sensors: 2,
            extended_status: 2,
            rc_channels: 2,
            position: 3,
            extra1: 10,
            extra2: 10,
            extra3: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            path: String::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::from("subfleet.sqlite3"),
        }
    }
}

impl FleetConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, FleetError> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| FleetError::Config(err.to_string()))
    }

    /// Stream ids and rates for REQUEST_DATA_STREAM, disabled streams
    /// filtered out. Ids follow MAV_DATA_STREAM.
    pub(crate) fn stream_requests(&self) -> Vec<(u8, u16)> {
        const RAW_SENSORS: u8 = 1;
        const EXTENDED_STATUS: u8 = 2;
        const RC_CHANNELS: u8 = 3;
        const POSITION: u8 = 6;
        const EXTRA1: u8 = 10;
        const EXTRA2: u8 = 11;
        const EXTRA3: u8 = 12;

        let s = &self.streams;
        [
            (RAW_SENSORS, s.raw_sensors),
            (EXTENDED_STATUS, s.extended_status),
            (RC_CHANNELS, s.rc_channels),
            (POSITION, s.position),
            (EXTRA1, s.extra1),
            (EXTRA2, s.extra2),
            (EXTRA3, s.extra3),
        ]
        .into_iter()
        .filter(|(_, rate)| *rate > 0)
        .collect()
    }
}
