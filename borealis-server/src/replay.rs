//! Mission replay - reads a recorded mission file and re-emits its blocks
//! at a caller-controlled pace, through the same decode path as live data.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use borealis_core::block::BLOCK_TYPE_DATA;
use borealis_core::format::{SuperBlock, BLOCK_SIZE};
use borealis_core::frame::{BlockHeader, BLOCK_HEADER_SIZE};

/// Control messages accepted by a running replay
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayCommand {
    /// New speed factor; 0 parks the replay without losing position
    SetSpeed(f64),
}

/// `(block_type, block_subtype, raw_block_bytes)` as stored on disk
pub type ReplayOutput = (u8, u8, Vec<u8>);

/// Handle to a spawned replay task
pub struct ReplayHandle {
    control_tx: mpsc::Sender<ReplayCommand>,
    task: JoinHandle<()>,
}

impl ReplayHandle {
    /// Spawn a replay of the mission file at `path`. An `epoch` of -1
    /// selects the legacy (version 0) superblock interpretation.
    pub fn spawn(
        path: PathBuf,
        speed: f64,
        epoch: i64,
        output_tx: mpsc::Sender<ReplayOutput>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(8);
        let task = tokio::spawn(replay_task(path, speed, epoch, control_rx, output_tx));
        Self { control_tx, task }
    }

    /// Apply a new speed factor; takes effect mid-sleep
    pub async fn set_speed(&self, speed: f64) {
        if self
            .control_tx
            .send(ReplayCommand::SetSpeed(speed))
            .await
            .is_err()
        {
            debug!("Replay task already finished");
        }
    }

    /// Forceful termination. The caller replaces its output receiver so
    /// any blocks still queued are discarded, never delivered.
    pub fn stop(self) {
        self.task.abort();
    }
}

async fn replay_task(
    path: PathBuf,
    mut speed: f64,
    epoch: i64,
    mut control_rx: mpsc::Receiver<ReplayCommand>,
    output_tx: mpsc::Sender<ReplayOutput>,
) {
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Cannot read mission file {}: {}", path.display(), e);
            return;
        }
    };
    if bytes.len() < BLOCK_SIZE {
        error!("Mission file {} has no superblock", path.display());
        return;
    }

    let version = if epoch < 0 { 0 } else { 1 };
    let superblock = match SuperBlock::parse_with_version(&bytes[..BLOCK_SIZE], version) {
        Ok(sb) => sb,
        Err(e) => {
            error!("Cannot parse superblock of {}: {}", path.display(), e);
            return;
        }
    };
    info!(
        "Replaying {} ({} flights, {} bytes)",
        path.display(),
        superblock.flights.len(),
        bytes.len()
    );

    let mut offset = BLOCK_SIZE;
    let mut last_mission_time: Option<u32> = None;
    while offset + BLOCK_HEADER_SIZE <= bytes.len() {
        let header = match BlockHeader::from_bytes(&bytes[offset..]) {
            Ok(header) => header,
            Err(e) => {
                warn!("Bad block header at offset {}: {}", offset, e);
                break;
            }
        };
        let end = offset + BLOCK_HEADER_SIZE + header.length as usize;
        if end > bytes.len() {
            warn!("Truncated block at offset {}, stopping replay", offset);
            break;
        }
        let raw = bytes[offset..end].to_vec();
        offset = end;

        // spacers and other metadata only pad the file
        if header.block_type != BLOCK_TYPE_DATA {
            continue;
        }

        let payload = &raw[BLOCK_HEADER_SIZE..];
        if payload.len() >= 4 {
            let mission_time =
                u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            // the first block has no delta but still honors speed 0
            let delta = last_mission_time.map_or(0, |prev| mission_time.saturating_sub(prev));
            if !pace(delta, &mut speed, &mut control_rx).await {
                return;
            }
            last_mission_time = Some(mission_time);
        }

        if output_tx
            .send((header.block_type, header.subtype, raw))
            .await
            .is_err()
        {
            debug!("Replay output receiver dropped, stopping");
            return;
        }
    }

    info!("Replay of {} complete", path.display());
}

/// Wait out `delta_ms / speed`, applying speed changes the moment they
/// arrive. Speed 0 parks on the control channel without losing position.
/// Returns false when the control channel closed.
async fn pace(
    delta_ms: u32,
    speed: &mut f64,
    control_rx: &mut mpsc::Receiver<ReplayCommand>,
) -> bool {
    let mut remaining = delta_ms as f64;
    loop {
        if *speed <= 0.0 {
            match control_rx.recv().await {
                Some(ReplayCommand::SetSpeed(s)) => {
                    *speed = s.max(0.0);
                    continue;
                }
                None => return false,
            }
        }
        if remaining <= 0.0 {
            return true;
        }
        let started = Instant::now();
        let sleep_ms = (remaining / *speed).ceil() as u64;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => return true,
            cmd = control_rx.recv() => match cmd {
                Some(ReplayCommand::SetSpeed(s)) => {
                    // account for mission time already played at the old speed
                    remaining -= started.elapsed().as_millis() as f64 * *speed;
                    *speed = s.max(0.0);
                }
                None => return false,
            },
        }
    }
}
