//! Mission file format.
//!
//! A mission file is block-addressed in 512-byte units. File block 0 holds
//! the superblock, a directory of flight extents; everything after it is
//! consecutive header-prefixed telemetry blocks, with each recording
//! session padded to a block boundary by a spacer.

use crate::block::BLOCK_TYPE_META;
use crate::error::DecodeError;
use crate::frame::{BlockHeader, BLOCK_HEADER_SIZE};

/// File block size in bytes; all mission files are multiples of this
pub const BLOCK_SIZE: usize = 512;

/// Magic bytes opening every superblock
pub const SUPERBLOCK_MAGIC: [u8; 4] = *b"MSB1";

/// Current superblock format version
pub const SUPERBLOCK_VERSION: u8 = 1;

/// Flight directory starts at this byte of the superblock
const FLIGHT_DIR_OFFSET: usize = 16;

/// Size of one flight entry, current format
const FLIGHT_ENTRY_SIZE: usize = 12;

/// Size of one flight entry in legacy (version 0) files
const FLIGHT_ENTRY_SIZE_V0: usize = 8;

/// Maximum flights a version-1 superblock can index
pub const MAX_FLIGHTS: usize = (BLOCK_SIZE - FLIGHT_DIR_OFFSET) / FLIGHT_ENTRY_SIZE;

/// One recording session's extent within a mission file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flight {
    /// File block index where this flight's data begins
    pub first_block: u32,
    /// Number of 512-byte blocks the flight occupies, spacers included
    pub num_blocks: u32,
    /// Recording start time in epoch seconds; absent in legacy files
    pub timestamp: Option<u32>,
}

impl Flight {
    /// Epoch seconds, or -1 when the file predates timestamped entries
    pub fn epoch(&self) -> i64 {
        self.timestamp.map(|t| t as i64).unwrap_or(-1)
    }
}

/// Mission file header block: the directory of flights
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub version: u8,
    pub flights: Vec<Flight>,
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self {
            version: SUPERBLOCK_VERSION,
            flights: Vec::new(),
        }
    }
}

impl SuperBlock {
    pub fn add_flight(&mut self, flight: Flight) -> Result<(), DecodeError> {
        if self.flights.len() >= MAX_FLIGHTS {
            return Err(DecodeError::InvalidHeader(format!(
                "flight directory full ({} entries)",
                MAX_FLIGHTS
            )));
        }
        self.flights.push(flight);
        Ok(())
    }

    /// Epoch of the most recent flight, -1 when unknown or empty
    pub fn epoch(&self) -> i64 {
        self.flights.last().map(|f| f.epoch()).unwrap_or(-1)
    }

    /// Serialize as the 512-byte block 0. Always written in the current
    /// format version.
    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&SUPERBLOCK_MAGIC);
        buf[4] = SUPERBLOCK_VERSION;
        // bytes 5..8 reserved
        buf[8..12].copy_from_slice(&(self.flights.len() as u32).to_le_bytes());

        let mut offset = FLIGHT_DIR_OFFSET;
        for flight in &self.flights {
            buf[offset..offset + 4].copy_from_slice(&flight.first_block.to_le_bytes());
            buf[offset + 4..offset + 8].copy_from_slice(&flight.num_blocks.to_le_bytes());
            buf[offset + 8..offset + 12]
                .copy_from_slice(&flight.timestamp.unwrap_or(0).to_le_bytes());
            offset += FLIGHT_ENTRY_SIZE;
        }
        buf
    }

    /// Parse block 0 of a mission file. Accepts version 1 and the legacy
    /// version 0 layout whose flight entries carry no timestamp.
    pub fn from_bytes(buf: &[u8]) -> Result<SuperBlock, DecodeError> {
        if buf.len() < BLOCK_SIZE {
            return Err(DecodeError::TooShort {
                expected: BLOCK_SIZE,
                actual: buf.len(),
            });
        }
        Self::parse_with_version(buf, buf[4])
    }

    /// Parse block 0 using an explicitly chosen entry framing instead of
    /// the version byte. Replay selects version 0 for missions whose epoch
    /// is unknown.
    pub fn parse_with_version(buf: &[u8], version: u8) -> Result<SuperBlock, DecodeError> {
        if buf.len() < BLOCK_SIZE {
            return Err(DecodeError::TooShort {
                expected: BLOCK_SIZE,
                actual: buf.len(),
            });
        }
        if buf[0..4] != SUPERBLOCK_MAGIC {
            return Err(DecodeError::InvalidHeader(
                "bad superblock magic".to_string(),
            ));
        }
        if version > SUPERBLOCK_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let count = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        let entry_size = if version == 0 {
            FLIGHT_ENTRY_SIZE_V0
        } else {
            FLIGHT_ENTRY_SIZE
        };
        let max = (BLOCK_SIZE - FLIGHT_DIR_OFFSET) / entry_size;
        if count > max {
            return Err(DecodeError::InvalidHeader(format!(
                "flight count {} exceeds directory capacity {}",
                count, max
            )));
        }

        let mut flights = Vec::with_capacity(count);
        let mut offset = FLIGHT_DIR_OFFSET;
        for _ in 0..count {
            let first_block =
                u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]);
            let num_blocks = u32::from_le_bytes([
                buf[offset + 4],
                buf[offset + 5],
                buf[offset + 6],
                buf[offset + 7],
            ]);
            let timestamp = if version == 0 {
                None
            } else {
                Some(u32::from_le_bytes([
                    buf[offset + 8],
                    buf[offset + 9],
                    buf[offset + 10],
                    buf[offset + 11],
                ]))
            };
            flights.push(Flight {
                first_block,
                num_blocks,
                timestamp,
            });
            offset += entry_size;
        }

        Ok(SuperBlock { version, flights })
    }
}

/// Bytes of padding needed to round `written` up to a block boundary.
/// A gap too small to hold the spacer header grows by one full block so
/// the spacer header always fits.
pub fn spacer_gap(written: usize) -> usize {
    let mut gap = BLOCK_SIZE - (written % BLOCK_SIZE);
    if gap == BLOCK_SIZE {
        gap = 0;
    }
    if gap > 0 && gap < BLOCK_HEADER_SIZE {
        gap += BLOCK_SIZE;
    }
    gap
}

/// Build a spacer block spanning exactly `gap` bytes (header included).
/// Spacers are logging-metadata blocks with a zeroed payload; replay
/// skips them by block type.
pub fn spacer_block(gap: usize) -> Vec<u8> {
    debug_assert!(gap >= BLOCK_HEADER_SIZE);
    let header = BlockHeader::new(BLOCK_TYPE_META, 0x00, (gap - BLOCK_HEADER_SIZE) as u16);
    let mut buf = vec![0u8; gap];
    buf[0..BLOCK_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superblock_roundtrip() {
        let mut sb = SuperBlock::default();
        sb.add_flight(Flight {
            first_block: 1,
            num_blocks: 40,
            timestamp: Some(1_700_000_000),
        })
        .unwrap();
        sb.add_flight(Flight {
            first_block: 41,
            num_blocks: 7,
            timestamp: Some(1_700_001_234),
        })
        .unwrap();

        let bytes = sb.to_bytes();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let decoded = SuperBlock::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, sb);
        assert_eq!(decoded.epoch(), 1_700_001_234);
    }

    #[test]
    fn test_superblock_v0_legacy() {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&SUPERBLOCK_MAGIC);
        buf[4] = 0;
        buf[8..12].copy_from_slice(&1u32.to_le_bytes());
        buf[16..20].copy_from_slice(&1u32.to_le_bytes()); // first_block
        buf[20..24].copy_from_slice(&12u32.to_le_bytes()); // num_blocks

        let sb = SuperBlock::from_bytes(&buf).unwrap();
        assert_eq!(sb.version, 0);
        assert_eq!(sb.flights.len(), 1);
        assert_eq!(sb.flights[0].num_blocks, 12);
        assert_eq!(sb.flights[0].timestamp, None);
        assert_eq!(sb.epoch(), -1);
    }

    #[test]
    fn test_superblock_bad_magic() {
        let buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            SuperBlock::from_bytes(&buf).unwrap_err(),
            DecodeError::InvalidHeader(_)
        ));
    }

    #[test]
    fn test_flight_directory_capacity() {
        let mut sb = SuperBlock::default();
        for i in 0..MAX_FLIGHTS {
            sb.add_flight(Flight {
                first_block: i as u32,
                num_blocks: 1,
                timestamp: Some(0),
            })
            .unwrap();
        }
        assert!(sb
            .add_flight(Flight {
                first_block: 0,
                num_blocks: 0,
                timestamp: Some(0),
            })
            .is_err());
        // a full directory must still fit in one block
        assert!(FLIGHT_DIR_OFFSET + MAX_FLIGHTS * FLIGHT_ENTRY_SIZE <= BLOCK_SIZE);
    }

    #[test]
    fn test_spacer_gap() {
        assert_eq!(spacer_gap(0), 0);
        assert_eq!(spacer_gap(512), 0);
        assert_eq!(spacer_gap(500), 12);
        assert_eq!(spacer_gap(100), 412);
        // gap of 1..3 bytes cannot hold the 4-byte header
        assert_eq!(spacer_gap(510), 514);
        assert_eq!(spacer_gap(511), 513);
    }

    #[test]
    fn test_spacer_block_alignment() {
        for written in [4usize, 100, 500, 508, 510, 511] {
            let gap = spacer_gap(written);
            let spacer = spacer_block(gap);
            assert_eq!(spacer.len(), gap);
            assert_eq!((written + gap) % BLOCK_SIZE, 0);

            let header = crate::frame::BlockHeader::from_bytes(&spacer).unwrap();
            assert_eq!(header.block_type, BLOCK_TYPE_META);
            assert_eq!(header.length as usize, gap - BLOCK_HEADER_SIZE);
        }
    }
}
