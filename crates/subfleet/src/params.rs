use mavlink::common::{MavParamType, PARAM_VALUE_DATA};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Real32,
    Real64,
}

impl ParamType {
    fn from_mav(param_type: MavParamType) -> Self {
        match param_type {
            MavParamType::MAV_PARAM_TYPE_UINT8 => ParamType::Uint8,
            MavParamType::MAV_PARAM_TYPE_INT8 => ParamType::Int8,
            MavParamType::MAV_PARAM_TYPE_UINT16 => ParamType::Uint16,
            MavParamType::MAV_PARAM_TYPE_INT16 => ParamType::Int16,
            MavParamType::MAV_PARAM_TYPE_UINT32 => ParamType::Uint32,
            MavParamType::MAV_PARAM_TYPE_INT32 => ParamType::Int32,
            MavParamType::MAV_PARAM_TYPE_UINT64 => ParamType::Uint64,
            MavParamType::MAV_PARAM_TYPE_INT64 => ParamType::Int64,
            MavParamType::MAV_PARAM_TYPE_REAL32 => ParamType::Real32,
            MavParamType::MAV_PARAM_TYPE_REAL64 => ParamType::Real64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: f32,
    pub param_type: ParamType,
    pub index: u16,
}

/// Full parameter set of one vehicle, filled in by PARAM_VALUE messages.
///
/// `expected_count` is fixed by the first PARAM_VALUE seen; the set is
/// complete once every index below it has arrived at least once.
#[derive(Debug, Default)]
pub struct ParamTable {
    params: HashMap<String, Param>,
    seen: Vec<bool>,
    expected_count: Option<u16>,
}

impl ParamTable {
    /// Folds one PARAM_VALUE into the table. Returns true when the index was
    /// not seen before.
    pub(crate) fn record(&mut self, data: &PARAM_VALUE_DATA) -> bool {
        if self.expected_count.is_none() {
            self.expected_count = Some(data.param_count);
            self.seen = vec![false; data.param_count as usize];
        }

        let name = text_field(&data.param_id[..]);
        self.params.insert(
            name.clone(),
            Param {
                name,
                value: data.param_value,
                param_type: ParamType::from_mav(data.param_type),
                index: data.param_index,
            },
        );

        match self.seen.get_mut(data.param_index as usize) {
            Some(slot) if !*slot => {
                *slot = true;
                true
            }
            _ => false,
        }
    }

    pub fn expected_count(&self) -> Option<u16> {
        self.expected_count
    }

    pub fn received_count(&self) -> usize {
        self.seen.iter().filter(|seen| **seen).count()
    }

    pub fn is_complete(&self) -> bool {
        match self.expected_count {
            Some(_) => self.seen.iter().all(|seen| *seen),
            None => false,
        }
    }

    /// Indices still missing, capped at `limit` per request round.
    pub(crate) fn missing_indices(&self, limit: usize) -> Vec<u16> {
        self.seen
            .iter()
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .take(limit)
            .map(|(index, _)| index as u16)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }
}

/// Turns a fixed-size NUL-padded wire field into a string.
pub(crate) fn text_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// Harvest state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    /// Re-issue PARAM_REQUEST_LIST each round.
    RequestList,
    /// Fall back to indexed PARAM_REQUEST_READ for the holes.
    RequestMissing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestPolicy {
    pub round_timeout_ms: u64,
    /// Full-list rounds before the per-index fallback kicks in.
    pub list_rounds: u8,
    pub max_rounds: u8,
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self {
            round_timeout_ms: 2000,
            list_rounds: 10,
            max_rounds: 25,
        }
    }
}

/// Drives the retry loop of the parameter harvester worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestMachine {
    phase: HarvestPhase,
    rounds_used: u8,
    policy: HarvestPolicy,
}

impl HarvestMachine {
    pub fn new(policy: HarvestPolicy) -> Self {
        Self {
            phase: HarvestPhase::RequestList,
            rounds_used: 0,
            policy,
        }
    }

    pub fn phase(&self) -> HarvestPhase {
        self.phase
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.policy.round_timeout_ms)
    }

    pub fn on_complete(&mut self) {
        if !self.is_terminal() {
            self.phase = HarvestPhase::Completed;
        }
    }

    /// A round elapsed without the table completing. `expected_known` gates
    /// the indexed fallback: without a count there is nothing to index.
    pub fn on_round_timeout(&mut self, expected_known: bool) {
        if self.is_terminal() {
            return;
        }

        self.rounds_used = self.rounds_used.saturating_add(1);
        if self.rounds_used >= self.policy.max_rounds {
            self.phase = HarvestPhase::Failed;
            return;
        }

        if expected_known && self.rounds_used >= self.policy.list_rounds {
            self.phase = HarvestPhase::RequestMissing;
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, HarvestPhase::Completed | HarvestPhase::Failed)
    }

    pub fn rounds_used(&self) -> u8 {
        self.rounds_used
    }
}
