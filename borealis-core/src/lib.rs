//! # Borealis Core
//!
//! Platform-independent telemetry protocol library for the Borealis
//! ground station.
//!
//! This crate contains pure parsing and encoding logic with **zero I/O
//! dependencies**: the radio block codec, the transmission framing, the
//! block-addressed mission file format, and the state model published to
//! UI subscribers. All file and network I/O lives in `borealis-server`.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  borealis-core (no tokio, no I/O)                        │
//! │  ├── block/   (telemetry data block codec + status bits) │
//! │  ├── frame    (transmission + block header framing)      │
//! │  ├── format   (superblock / flight / spacer file format) │
//! │  └── state    (mission & replay state, snapshot model)   │
//! └──────────────────────────────────────────────────────────┘
//!                           ▲
//!              ┌────────────┴────────────┐
//!              │  borealis-server        │
//!              │  (tokio, recording,     │
//!              │   replay, CLI)          │
//!              └─────────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`block`] - Data block decode/encode and the status bitfield
//! - [`frame`] - Hex transmission parsing and block headers
//! - [`format`] - Mission file superblock, flights and spacers
//! - [`state`] - Snapshot data model (mission, replay, serial, radio)

pub mod block;
pub mod error;
pub mod format;
pub mod frame;
pub mod state;

pub use block::{DataBlock, DataBlockSubtype};
pub use error::DecodeError;
pub use format::{Flight, SuperBlock, BLOCK_SIZE};
pub use frame::{BlockHeader, Transmission};
pub use state::{MissionState, ReplayState, Snapshot};
