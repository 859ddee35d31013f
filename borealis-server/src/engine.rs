//! Telemetry engine - the orchestrating state machine.
//!
//! The engine is the sole owner of mission state, replay state and the
//! telemetry buffers. All inbound traffic arrives over channels and is
//! drained each tick in fixed priority order: commands first, then serial
//! status reports, then signal reports, then data. Data comes from the
//! live radio path or from an active replay, never both. After any
//! state-affecting work the engine republishes its snapshot.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_graceful_shutdown::SubsystemHandle;

use borealis_core::block::{DataBlock, BLOCK_TYPE_DATA};
use borealis_core::frame::{Transmission, BLOCK_HEADER_SIZE};
use borealis_core::state::{MissionState, ReplayState, Snapshot, StatusData};

use crate::commands::Command;
use crate::recorder::MissionRecorder;
use crate::replay::{ReplayHandle, ReplayOutput};
use crate::storage::MissionStore;
use crate::SessionConfig;

/// Errors surfaced by engine operations. None of them abort the loop.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("already recording")]
    AlreadyRecording,
    #[error("replay playback in progress")]
    ReplayPlayback,
    #[error("no mission named {0:?}")]
    MissionNotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Typed status reports from the serial transport collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SerialStatus {
    /// Serial ports currently visible on the host
    Ports(Vec<String>),
    /// RN2483 radio module connection state
    RadioConnected(bool),
    /// Port the radio is bound to; empty means unbound
    RadioPort(String),
}

/// Sender halves handed to the engine's collaborators
pub struct EngineIo {
    /// Whitespace-tokenized command strings
    pub command_tx: mpsc::Sender<Vec<String>>,
    /// Serial transport status reports
    pub serial_tx: mpsc::Sender<SerialStatus>,
    /// Radio signal reports (logged only)
    pub signal_tx: mpsc::Sender<String>,
    /// Hex-encoded radio transmissions
    pub radio_tx: mpsc::Sender<String>,
    /// Subscribe here for published snapshots
    pub snapshot_tx: broadcast::Sender<Snapshot>,
}

pub struct TelemetryEngine {
    config: SessionConfig,
    store: MissionStore,
    status: StatusData,
    telemetry: BTreeMap<String, VecDeque<Value>>,
    recorder: Option<MissionRecorder<File>>,
    replay: Option<ReplayHandle>,
    replay_rx: Option<mpsc::Receiver<ReplayOutput>>,
    command_rx: mpsc::Receiver<Vec<String>>,
    serial_rx: mpsc::Receiver<SerialStatus>,
    signal_rx: mpsc::Receiver<String>,
    radio_rx: mpsc::Receiver<String>,
    snapshot_tx: broadcast::Sender<Snapshot>,
}

impl TelemetryEngine {
    pub fn new(config: SessionConfig) -> io::Result<(Self, EngineIo)> {
        let store = MissionStore::new(config.missions_dir.clone())?;

        let (command_tx, command_rx) = mpsc::channel(32);
        let (serial_tx, serial_rx) = mpsc::channel(32);
        let (signal_tx, signal_rx) = mpsc::channel(32);
        let (radio_tx, radio_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(16);

        let engine = Self {
            config,
            store,
            status: StatusData::default(),
            telemetry: BTreeMap::new(),
            recorder: None,
            replay: None,
            replay_rx: None,
            command_rx,
            serial_rx,
            signal_rx,
            radio_rx,
            snapshot_tx: snapshot_tx.clone(),
        };
        let io = EngineIo {
            command_tx,
            serial_tx,
            signal_tx,
            radio_tx,
            snapshot_tx,
        };
        Ok((engine, io))
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), TelemetryError> {
        info!(
            "Telemetry engine started, missions in {}",
            self.store.base_dir().display()
        );
        self.update_missions();
        self.publish_snapshot();

        let mut tick = tokio::time::interval(Duration::from_millis(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    info!("Telemetry engine shutting down");
                    self.shutdown();
                    return Ok(());
                }
                _ = tick.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One cooperative poll: drain every inbound queue in priority order,
    /// then republish the snapshot if anything changed.
    async fn tick(&mut self) {
        let mut dirty = false;

        while let Ok(tokens) = self.command_rx.try_recv() {
            self.handle_command(&tokens).await;
            dirty = true;
        }

        while let Ok(report) = self.serial_rx.try_recv() {
            self.handle_serial(report);
            dirty = true;
        }

        while let Ok(report) = self.signal_rx.try_recv() {
            debug!("Signal report: {}", report);
        }

        if self.status.mission.state == MissionState::Recorded {
            // live blocks are ignored while a replay owns the data path
            while let Ok(tx) = self.radio_rx.try_recv() {
                debug!("Dropping live transmission during replay ({} chars)", tx.len());
            }
            let mut outputs = Vec::new();
            if let Some(replay_rx) = &mut self.replay_rx {
                while let Ok(output) = replay_rx.try_recv() {
                    outputs.push(output);
                }
            }
            for output in outputs {
                self.process_replay_output(output);
                dirty = true;
            }
        } else {
            while let Ok(tx) = self.radio_rx.try_recv() {
                self.process_transmission(&tx);
                dirty = true;
            }
        }

        if dirty {
            self.publish_snapshot();
        }
    }

    async fn handle_command(&mut self, tokens: &[String]) {
        let Some(command) = Command::parse(tokens) else {
            warn!("Unknown command: {:?}", tokens.join(" "));
            return;
        };
        debug!("Executing {:?}", command);

        let result = match command {
            Command::Update => {
                self.update_missions();
                Ok(())
            }
            Command::ReplayPlay(name) => self.play_mission(name),
            Command::ReplayPause => {
                self.set_replay_speed(0.0).await;
                Ok(())
            }
            Command::ReplayResume => {
                let speed = self.status.replay.last_played_speed;
                self.set_replay_speed(speed).await;
                Ok(())
            }
            Command::ReplaySpeed(speed) => {
                self.set_replay_speed(speed).await;
                Ok(())
            }
            Command::ReplayStop => {
                self.stop_replay();
                Ok(())
            }
            Command::RecordStart(name) => self.start_recording(name),
            Command::RecordStop => self.stop_recording(),
        };
        if let Err(e) = result {
            warn!("Command failed: {}", e);
        }
    }

    fn handle_serial(&mut self, report: SerialStatus) {
        match report {
            SerialStatus::Ports(ports) => {
                self.status.serial.available_ports = ports;
            }
            SerialStatus::RadioConnected(connected) => {
                self.status.radio.connected = connected;
            }
            SerialStatus::RadioPort(port) if port.is_empty() => {
                self.status.radio.port = None;
                if self.status.mission.state == MissionState::Live {
                    self.status.mission.state = MissionState::Dne;
                }
            }
            SerialStatus::RadioPort(port) => {
                info!("Radio bound to {}", port);
                self.status.radio.port = Some(port);
                if self.status.mission.state == MissionState::Recorded {
                    // a live binding preempts any replay in progress
                    self.stop_replay();
                } else if self.status.mission.state != MissionState::Dne {
                    self.clear_buffers();
                }
                self.status.mission.state = MissionState::Live;
            }
        }
    }

    pub fn update_missions(&mut self) {
        self.status.replay.missions = self.store.list_missions();
        debug!("{} missions known", self.status.replay.missions.len());
    }

    pub fn start_recording(&mut self, name: Option<String>) -> Result<(), TelemetryError> {
        if self.status.mission.recording {
            return Err(TelemetryError::AlreadyRecording);
        }
        if self.status.mission.state == MissionState::Recorded {
            return Err(TelemetryError::ReplayPlayback);
        }

        let epoch = Utc::now().timestamp();
        let proposed = name.unwrap_or_else(|| epoch.to_string());
        let name = self.store.unique_name(&proposed)?;
        let path = self.store.mission_path(&name);

        self.recorder = Some(MissionRecorder::create(&path, epoch as u32)?);
        self.status.mission.recording = true;
        self.status.mission.name = Some(name);
        self.status.mission.epoch = epoch;
        Ok(())
    }

    /// Idempotent: stopping with no active recording only logs
    pub fn stop_recording(&mut self) -> Result<(), TelemetryError> {
        match self.recorder.take() {
            Some(recorder) => recorder.stop()?,
            None => debug!("record stop with no active recording"),
        }
        self.status.mission.recording = false;
        self.status.mission.name = None;
        self.status.mission.epoch = -1;
        // the finished mission is immediately replayable
        self.update_missions();
        Ok(())
    }

    pub fn play_mission(&mut self, name: Option<String>) -> Result<(), TelemetryError> {
        if self.status.mission.recording {
            return Err(TelemetryError::AlreadyRecording);
        }
        let name = name.ok_or(TelemetryError::ReplayPlayback)?;
        let entry = self
            .status
            .replay
            .missions
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .ok_or(TelemetryError::MissionNotFound(name))?;

        if let Some(handle) = self.replay.take() {
            handle.stop();
        }
        if self.status.replay.speed <= 0.0 {
            self.status.replay.speed = self.status.replay.last_played_speed;
        }

        let (output_tx, output_rx) = mpsc::channel(256);
        self.replay_rx = Some(output_rx);
        self.replay = Some(ReplayHandle::spawn(
            self.store.mission_path(&entry.name),
            self.status.replay.speed,
            entry.epoch,
            output_tx,
        ));

        self.clear_buffers();
        self.status.mission.state = MissionState::Recorded;
        self.status.mission.name = Some(entry.name);
        self.status.mission.epoch = entry.epoch;
        Ok(())
    }

    /// Forceful and idempotent; queued replay output is discarded with
    /// the receiver.
    pub fn stop_replay(&mut self) {
        if let Some(handle) = self.replay.take() {
            handle.stop();
        }
        self.replay_rx = None;
        if self.status.mission.state == MissionState::Recorded {
            self.clear_buffers();
            self.status.mission.state = MissionState::Dne;
            self.status.mission.name = None;
            self.status.mission.epoch = -1;
        }
    }

    /// Negative or non-finite speeds clamp to 0 (paused)
    pub async fn set_replay_speed(&mut self, speed: f64) {
        let speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
        self.status.replay.speed = speed;
        if speed > 0.0 {
            self.status.replay.last_played_speed = speed;
        }
        if let Some(handle) = &self.replay {
            handle.set_speed(speed).await;
        }
    }

    /// Decode a live transmission and fold its blocks into the buffers,
    /// recording the raw block bytes when a recording is active.
    pub fn process_transmission(&mut self, hex: &str) {
        let transmission = match Transmission::parse_hex(hex) {
            Ok(t) => t,
            Err(e) => {
                warn!("Dropping transmission: {}", e);
                return;
            }
        };
        let (decoded, errors) = transmission.decode_blocks();
        for e in errors {
            warn!("Skipping block: {}", e);
        }
        for (raw, block) in decoded {
            if self.status.mission.recording {
                if let Some(recorder) = &mut self.recorder {
                    if let Err(e) = recorder.append(&raw.to_bytes()) {
                        error!("Recording failed: {}", e);
                        self.abort_recording();
                    }
                }
            }
            self.process_block(&block);
        }
    }

    /// An I/O failure is fatal to the recording session but not to the
    /// engine: close out what was durably flushed and keep serving data.
    fn abort_recording(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            if let Err(e) = recorder.stop() {
                error!("Could not close failed recording cleanly: {}", e);
            }
        }
        self.status.mission.recording = false;
        self.status.mission.name = None;
        self.status.mission.epoch = -1;
    }

    fn process_replay_output(&mut self, (block_type, subtype, raw): ReplayOutput) {
        if block_type != BLOCK_TYPE_DATA || raw.len() < BLOCK_HEADER_SIZE {
            return;
        }
        match DataBlock::decode(subtype, &raw[BLOCK_HEADER_SIZE..]) {
            Ok(block) => self.process_block(&block),
            Err(e) => warn!("Skipping replayed block: {}", e),
        }
    }

    /// Fold one decoded block into its bounded buffer. Mission time only
    /// ever advances, guarding against out-of-order delivery.
    pub fn process_block(&mut self, block: &DataBlock) {
        let mission_time = block.mission_time();
        if mission_time > self.status.mission.last_mission_time {
            self.status.mission.last_mission_time = mission_time;
        }

        let buffer = self
            .telemetry
            .entry(block.subtype().name().to_string())
            .or_default();
        buffer.push_back(block.to_json());
        while buffer.len() > self.config.telemetry_buffer_size {
            buffer.pop_front();
        }
    }

    fn clear_buffers(&mut self) {
        self.telemetry.clear();
        self.status.mission.last_mission_time = 0;
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut status = self.status.clone();
        status.replay.state = ReplayState::derive(status.mission.state, status.replay.speed);
        Snapshot {
            version: self.config.version.clone(),
            org: self.config.org.clone(),
            status,
            telemetry: self
                .telemetry
                .iter()
                .map(|(name, records)| (name.clone(), records.iter().cloned().collect()))
                .collect(),
        }
    }

    fn publish_snapshot(&mut self) {
        self.status.replay.state =
            ReplayState::derive(self.status.mission.state, self.status.replay.speed);
        // no subscribers is not an error
        let _ = self.snapshot_tx.send(self.snapshot());
    }

    fn shutdown(&mut self) {
        if self.status.mission.recording {
            if let Err(e) = self.stop_recording() {
                error!("Could not stop recording on shutdown: {}", e);
            }
        }
        if let Some(handle) = self.replay.take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borealis_core::frame::encode_block;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_engine(dir: &Path) -> TelemetryEngine {
        let config = SessionConfig {
            version: "0.0.0-test".to_string(),
            org: "CUInSpace".to_string(),
            missions_dir: dir.to_path_buf(),
            telemetry_buffer_size: 5,
        };
        TelemetryEngine::new(config).unwrap().0
    }

    fn altitude_transmission(times: &[u32]) -> String {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"VA3INI");
        bytes.push(1);
        bytes.push(0);
        for &t in times {
            let block = DataBlock::Altitude {
                mission_time: t,
                millimetres: 1_000,
            };
            bytes.extend_from_slice(&encode_block(0x01, &block.encode()));
        }
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_second_start_recording_fails() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.start_recording(Some("first".to_string())).unwrap();
        let err = engine.start_recording(Some("second".to_string())).unwrap_err();
        assert!(matches!(err, TelemetryError::AlreadyRecording));

        // state unchanged by the failed call
        assert_eq!(engine.status.mission.name.as_deref(), Some("first"));
        assert!(engine.status.mission.recording);
    }

    #[test]
    fn test_play_mission_requires_name() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        assert!(matches!(
            engine.play_mission(None).unwrap_err(),
            TelemetryError::ReplayPlayback
        ));
    }

    #[test]
    fn test_play_unknown_mission() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());
        let err = engine.play_mission(Some("ghost".to_string())).unwrap_err();
        assert!(matches!(err, TelemetryError::MissionNotFound(name) if name == "ghost"));
        assert_eq!(engine.status.mission.state, MissionState::Dne);
    }

    #[test]
    fn test_last_mission_time_is_monotonic() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        for t in [5u32, 3, 9, 2] {
            engine.process_block(&DataBlock::Altitude {
                mission_time: t,
                millimetres: 0,
            });
        }
        assert_eq!(engine.status.mission.last_mission_time, 9);
    }

    #[test]
    fn test_buffer_caps_at_configured_size() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        for t in 0..8u32 {
            engine.process_block(&DataBlock::Pressure {
                mission_time: t,
                pascals: 100_000,
            });
        }
        let buffer = &engine.telemetry["pressure"];
        assert_eq!(buffer.len(), 5);
        // oldest evicted first
        assert_eq!(buffer.front().unwrap()["mission_time"], 3);
        assert_eq!(buffer.back().unwrap()["mission_time"], 7);
    }

    #[test]
    fn test_recording_captures_transmission() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.start_recording(Some("launch".to_string())).unwrap();
        engine.process_transmission(&altitude_transmission(&[100, 200]));
        engine.stop_recording().unwrap();

        assert!(!engine.status.mission.recording);
        assert_eq!(engine.status.mission.name, None);
        let missions = engine.status.replay.missions.clone();
        assert_eq!(missions.len(), 1);
        assert_eq!(missions[0].name, "launch");

        let size = std::fs::metadata(engine.store.mission_path("launch"))
            .unwrap()
            .len();
        assert_eq!(size % 512, 0);
        // last_mission_time survives the recording stop
        assert_eq!(engine.status.mission.last_mission_time, 200);
    }

    #[tokio::test]
    async fn test_record_while_replaying_fails() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.start_recording(Some("m".to_string())).unwrap();
        engine.process_transmission(&altitude_transmission(&[1]));
        engine.stop_recording().unwrap();

        engine.play_mission(Some("m".to_string())).unwrap();
        assert_eq!(engine.status.mission.state, MissionState::Recorded);

        let err = engine.start_recording(None).unwrap_err();
        assert!(matches!(err, TelemetryError::ReplayPlayback));
    }

    #[tokio::test]
    async fn test_pause_resume_restores_speed() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.start_recording(Some("m".to_string())).unwrap();
        engine.process_transmission(&altitude_transmission(&[1, 2]));
        engine.stop_recording().unwrap();
        engine.play_mission(Some("m".to_string())).unwrap();

        engine.set_replay_speed(2.5).await;
        assert_eq!(engine.snapshot().status.replay.state, ReplayState::Playing);

        engine.set_replay_speed(0.0).await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status.replay.state, ReplayState::Paused);
        assert_eq!(snapshot.status.replay.last_played_speed, 2.5);

        // resume restores the last nonzero speed
        let speed = engine.status.replay.last_played_speed;
        engine.set_replay_speed(speed).await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.status.replay.speed, 2.5);
        assert_eq!(snapshot.status.replay.state, ReplayState::Playing);
    }

    #[tokio::test]
    async fn test_stop_replay_resets_state() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.start_recording(Some("m".to_string())).unwrap();
        engine.process_transmission(&altitude_transmission(&[1]));
        engine.stop_recording().unwrap();
        engine.play_mission(Some("m".to_string())).unwrap();

        engine.stop_replay();
        assert_eq!(engine.status.mission.state, MissionState::Dne);
        assert!(engine.telemetry.is_empty());
        assert_eq!(engine.snapshot().status.replay.state, ReplayState::Dne);

        // idempotent
        engine.stop_replay();
    }

    #[test]
    fn test_live_source_binding_transitions() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.handle_serial(SerialStatus::RadioPort("/dev/ttyUSB0".to_string()));
        assert_eq!(engine.status.mission.state, MissionState::Live);

        engine.process_block(&DataBlock::Altitude {
            mission_time: 10,
            millimetres: 0,
        });

        // rebinding is a new session: buffers cleared
        engine.handle_serial(SerialStatus::RadioPort("/dev/ttyUSB1".to_string()));
        assert!(engine.telemetry.is_empty());
        assert_eq!(engine.status.mission.last_mission_time, 0);

        engine.handle_serial(SerialStatus::RadioPort(String::new()));
        assert_eq!(engine.status.mission.state, MissionState::Dne);
    }

    #[tokio::test]
    async fn test_live_binding_preempts_replay() {
        let dir = tempdir().unwrap();
        let mut engine = test_engine(dir.path());

        engine.start_recording(Some("m".to_string())).unwrap();
        engine.process_transmission(&altitude_transmission(&[1, 2]));
        engine.stop_recording().unwrap();
        engine.play_mission(Some("m".to_string())).unwrap();
        assert_eq!(engine.status.mission.state, MissionState::Recorded);

        engine.handle_serial(SerialStatus::RadioPort("/dev/ttyUSB0".to_string()));
        assert_eq!(engine.status.mission.state, MissionState::Live);
        assert!(engine.replay.is_none());
        assert!(engine.replay_rx.is_none());
        assert!(engine.telemetry.is_empty());
        assert_eq!(engine.status.mission.name, None);
        assert_eq!(engine.snapshot().status.replay.state, ReplayState::Dne);
    }
}
