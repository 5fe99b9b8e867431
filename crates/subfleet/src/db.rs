use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::snapshot::VehicleSnapshot;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attitude (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    system_id INTEGER NOT NULL,
    roll REAL NOT NULL,
    pitch REAL NOT NULL,
    yaw REAL NOT NULL,
    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS position (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    system_id INTEGER NOT NULL,
    latitude REAL,
    longitude REAL,
    altitude REAL,
    depth REAL,
    heading REAL,
    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS vfr_hud (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    system_id INTEGER NOT NULL,
    groundspeed REAL,
    climb REAL,
    throttle INTEGER,
    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sys_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    system_id INTEGER NOT NULL,
    voltage REAL,
    current REAL,
    battery_remaining INTEGER,
    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS pressure (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    system_id INTEGER NOT NULL,
    pressure_abs REAL,
    temperature REAL,
    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// The fixed set of telemetry tables; keeps callers from naming arbitrary
/// tables in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryTable {
    Attitude,
    Position,
    VfrHud,
    SysStatus,
    Pressure,
}

impl TelemetryTable {
    fn name(self) -> &'static str {
        match self {
            TelemetryTable::Attitude => "attitude",
            TelemetryTable::Position => "position",
            TelemetryTable::VfrHud => "vfr_hud",
            TelemetryTable::SysStatus => "sys_status",
            TelemetryTable::Pressure => "pressure",
        }
    }
}

/// Telemetry store fed by the snapshot publishers, one table per domain.
/// The connection is shared across workers behind an async mutex.
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let connection = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        connection.execute_batch(SCHEMA)?;
        debug!(path, "telemetry store open");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Inserts one row per telemetry domain the snapshot has data for.
    pub(crate) async fn insert_snapshot(
        &self,
        system_id: u8,
        snapshot: &VehicleSnapshot,
    ) -> Result<(), rusqlite::Error> {
        let connection = self.connection.lock().await;

        if let (Some(roll), Some(pitch), Some(yaw)) =
            (snapshot.roll_rad, snapshot.pitch_rad, snapshot.yaw_rad)
        {
            connection.execute(
                "INSERT INTO attitude (system_id, roll, pitch, yaw) VALUES (?1, ?2, ?3, ?4)",
                params![system_id, roll as f64, pitch as f64, yaw as f64],
            )?;
        }

        if snapshot.latitude_deg.is_some() || snapshot.depth_m.is_some() {
            connection.execute(
                "INSERT INTO position (system_id, latitude, longitude, altitude, depth, heading)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    system_id,
                    snapshot.latitude_deg,
                    snapshot.longitude_deg,
                    snapshot.altitude_m,
                    snapshot.depth_m,
                    snapshot.heading_deg,
                ],
            )?;
        }

        if snapshot.groundspeed_mps.is_some() || snapshot.throttle_pct.is_some() {
            connection.execute(
                "INSERT INTO vfr_hud (system_id, groundspeed, climb, throttle)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    system_id,
                    snapshot.groundspeed_mps,
                    snapshot.climb_mps,
                    snapshot.throttle_pct,
                ],
            )?;
        }

        if snapshot.battery_voltage_v.is_some() {
            connection.execute(
                "INSERT INTO sys_status (system_id, voltage, current, battery_remaining)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    system_id,
                    snapshot.battery_voltage_v,
                    snapshot.battery_current_a,
                    snapshot.battery_remaining_pct,
                ],
            )?;
        }

        if snapshot.pressure_abs_hpa.is_some() {
            connection.execute(
                "INSERT INTO pressure (system_id, pressure_abs, temperature) VALUES (?1, ?2, ?3)",
                params![
                    system_id,
                    snapshot.pressure_abs_hpa,
                    snapshot.water_temperature_c,
                ],
            )?;
        }

        Ok(())
    }

    /// Row count of one telemetry table, for tests and health checks.
    pub async fn count_rows(&self, table: TelemetryTable) -> Result<i64, rusqlite::Error> {
        let connection = self.connection.lock().await;
        connection.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_attitude_and_battery() -> VehicleSnapshot {
        VehicleSnapshot {
            roll_rad: Some(0.1),
            pitch_rad: Some(-0.05),
            yaw_rad: Some(1.2),
            battery_voltage_v: Some(12.6),
            battery_remaining_pct: Some(80),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_snapshot_inserts_nothing() {
        let db = Database::open(":memory:").unwrap();
        db.insert_snapshot(1, &VehicleSnapshot::default())
            .await
            .unwrap();
        assert_eq!(db.count_rows(TelemetryTable::Attitude).await.unwrap(), 0);
        assert_eq!(db.count_rows(TelemetryTable::Position).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn populated_domains_each_get_a_row() {
        let db = Database::open(":memory:").unwrap();
        db.insert_snapshot(1, &snapshot_with_attitude_and_battery())
            .await
            .unwrap();
        db.insert_snapshot(1, &snapshot_with_attitude_and_battery())
            .await
            .unwrap();

        assert_eq!(db.count_rows(TelemetryTable::Attitude).await.unwrap(), 2);
        assert_eq!(db.count_rows(TelemetryTable::SysStatus).await.unwrap(), 2);
        assert_eq!(db.count_rows(TelemetryTable::VfrHud).await.unwrap(), 0);
    }
}
