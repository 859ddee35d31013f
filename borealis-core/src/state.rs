//! Ground-station state model published to UI subscribers.
//!
//! These structs serialize directly into the outward snapshot JSON, so
//! field names here are wire format.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Where telemetry is coming from, if anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MissionState {
    /// No bound live source and no active replay
    Dne,
    /// A live radio source is bound
    Live,
    /// A recorded mission is being replayed; live blocks are ignored
    Recorded,
}

/// Replay activity, always derived from mission state and speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplayState {
    Dne,
    Paused,
    Playing,
}

impl ReplayState {
    pub fn derive(mission: MissionState, speed: f64) -> ReplayState {
        if mission != MissionState::Recorded {
            ReplayState::Dne
        } else if speed == 0.0 {
            ReplayState::Paused
        } else {
            ReplayState::Playing
        }
    }
}

/// Current mission identity and recording flag
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionData {
    pub name: Option<String>,
    /// Epoch seconds of the mission start, -1 when unknown
    pub epoch: i64,
    pub state: MissionState,
    pub recording: bool,
    /// Highest mission time seen this session, in milliseconds
    pub last_mission_time: u32,
}

impl Default for MissionData {
    fn default() -> Self {
        Self {
            name: None,
            epoch: -1,
            state: MissionState::Dne,
            recording: false,
            last_mission_time: 0,
        }
    }
}

/// One mission file known to the ground station
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionEntry {
    pub name: String,
    pub epoch: i64,
}

/// Replay position and the list of replayable missions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayData {
    pub state: ReplayState,
    pub speed: f64,
    /// Most recent nonzero speed, restored on resume
    pub last_played_speed: f64,
    pub missions: Vec<MissionEntry>,
}

impl Default for ReplayData {
    fn default() -> Self {
        Self {
            state: ReplayState::Dne,
            speed: 1.0,
            last_played_speed: 1.0,
            missions: Vec::new(),
        }
    }
}

/// Serial ports visible to the transport collaborator
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialData {
    pub available_ports: Vec<String>,
}

/// RN2483 radio link status
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioData {
    pub connected: bool,
    pub port: Option<String>,
}

/// Aggregated status section of the snapshot
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub mission: MissionData,
    pub serial: SerialData,
    pub radio: RadioData,
    pub replay: ReplayData,
}

/// Immutable view published after every state-affecting operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub org: String,
    pub status: StatusData,
    /// Block type name to ordered decoded records, oldest first
    pub telemetry: BTreeMap<String, Vec<Value>>,
}
