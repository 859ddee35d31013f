//! # Borealis Server
//!
//! Ground-station telemetry server for Borealis flight vehicles.
//!
//! The server decodes the block-structured radio protocol, maintains live
//! mission state, records received data into block-addressed mission files
//! and can replay a recorded mission at adjustable speed through the same
//! processing path as live data.
//!
//! ## Architecture
//!
//! The server is built on top of [`borealis_core`] for protocol and file
//! format handling, with [`tokio`] providing the async runtime.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    borealis-server                        │
//! │                                                           │
//! │  radio transport ──► hex transmissions ─┐                 │
//! │  serial status   ──► typed reports ─────┤                 │
//! │  command console ──► token lists ───────┤                 │
//! │                                         ▼                 │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │  TelemetryEngine (single owner of mutable state)    │  │
//! │  │  - mission / replay state machine                   │  │
//! │  │  - bounded per-type telemetry buffers               │  │
//! │  │  - MissionRecorder (inline, bounded flushes)        │  │
//! │  │  - ReplayHandle (spawned task, paced emission)      │  │
//! │  └──────────────────────┬──────────────────────────────┘  │
//! │                         ▼                                 │
//! │            snapshot broadcast (JSON, camelCase)           │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`engine::TelemetryEngine`] - orchestrating state machine
//! - [`recorder::MissionRecorder`] - 512-byte-aligned mission file writer
//! - [`replay::ReplayHandle`] - paced playback of recorded missions
//! - [`storage::MissionStore`] - mission directory listing and naming
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-m, --missions-dir` - Where mission files are stored
//! - `--output` - Print every published snapshot to stdout as JSON
//! - `-v` - Increase verbosity (use multiple times)

use std::path::PathBuf;

use clap::Parser;

pub mod commands;
pub mod engine;
pub mod recorder;
pub mod replay;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Organization identifier published in every snapshot
pub const ORG: &str = "CUInSpace";

#[derive(Parser, Clone, Debug)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Directory where mission files are stored
    #[arg(short, long, default_value = "missions")]
    pub missions_dir: PathBuf,

    /// How many records each telemetry buffer retains per block type
    #[arg(short, long, default_value_t = 20)]
    pub telemetry_buffer_size: usize,

    /// Print every published snapshot to stdout as JSON
    #[arg(long, default_value_t = false)]
    pub output: bool,
}

/// Immutable configuration handed to the engine at construction
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub version: String,
    pub org: String,
    pub missions_dir: PathBuf,
    pub telemetry_buffer_size: usize,
}

impl SessionConfig {
    pub fn from_args(args: &Cli) -> Self {
        Self {
            version: VERSION.to_string(),
            org: ORG.to_string(),
            missions_dir: args.missions_dir.clone(),
            telemetry_buffer_size: args.telemetry_buffer_size,
        }
    }
}
