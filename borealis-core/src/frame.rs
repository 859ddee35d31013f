//! Radio transmission framing.
//!
//! A transmission arrives from the radio module as a hex-encoded string:
//! an 8-byte packet header (6 ASCII call-sign bytes, encoding version,
//! reserved byte) followed by consecutive blocks, each prefixed with a
//! 4-byte header giving its type, subtype and payload length.

use crate::block::{DataBlock, BLOCK_TYPE_DATA};
use crate::error::DecodeError;

/// Packet header size in bytes
pub const PACKET_HEADER_SIZE: usize = 8;

/// Block header size in bytes
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Encoding version this decoder understands
pub const SUPPORTED_ENCODING_VERSION: u8 = 1;

/// 4-byte header prefixed to every block on the wire and on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block type: 0x00 telemetry data, 0x01 logging metadata
    pub block_type: u8,
    pub subtype: u8,
    /// Payload length, header excluded
    pub length: u16,
}

impl BlockHeader {
    pub fn new(block_type: u8, subtype: u8, length: u16) -> Self {
        Self {
            block_type,
            subtype,
            length,
        }
    }

    pub fn to_bytes(self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        buf[0] = self.block_type;
        buf[1] = self.subtype;
        buf[2..4].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < BLOCK_HEADER_SIZE {
            return Err(DecodeError::TooShort {
                expected: BLOCK_HEADER_SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self {
            block_type: buf[0],
            subtype: buf[1],
            length: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }
}

/// One raw block cut out of a transmission, header parsed, payload opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl RawBlock {
    /// Header plus payload, as written to the mission file
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Prefix an encoded telemetry payload with its block header
pub fn encode_block(subtype: u8, payload: &[u8]) -> Vec<u8> {
    let header = BlockHeader::new(BLOCK_TYPE_DATA, subtype, payload.len() as u16);
    let mut buf = Vec::with_capacity(BLOCK_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// A parsed radio transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub callsign: String,
    pub version: u8,
    pub blocks: Vec<RawBlock>,
}

impl Transmission {
    /// Parse a hex-encoded transmission string.
    ///
    /// Header errors fail the whole transmission; a malformed block header
    /// or truncated payload also fails the remainder since block boundaries
    /// can no longer be trusted. Individual payload decoding is left to the
    /// caller so one bad block does not discard its neighbours.
    pub fn parse_hex(hex: &str) -> Result<Transmission, DecodeError> {
        let bytes = decode_hex(hex.trim())?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Transmission, DecodeError> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(DecodeError::TooShort {
                expected: PACKET_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let callsign = std::str::from_utf8(&bytes[0..6])
            .map_err(|_| DecodeError::InvalidHeader("call sign is not ASCII".to_string()))?
            .trim_end()
            .to_string();

        let version = bytes[6];
        if version != SUPPORTED_ENCODING_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let mut blocks = Vec::new();
        let mut offset = PACKET_HEADER_SIZE;
        while offset < bytes.len() {
            let header = BlockHeader::from_bytes(&bytes[offset..])?;
            let payload_start = offset + BLOCK_HEADER_SIZE;
            let payload_end = payload_start + header.length as usize;
            if payload_end > bytes.len() {
                return Err(DecodeError::TooShort {
                    expected: payload_end,
                    actual: bytes.len(),
                });
            }
            blocks.push(RawBlock {
                header,
                payload: bytes[payload_start..payload_end].to_vec(),
            });
            offset = payload_end;
        }

        Ok(Transmission {
            callsign,
            version,
            blocks,
        })
    }

    /// Decode every telemetry payload, skipping blocks that fail.
    /// Returns the decoded blocks paired with their raw form, plus the
    /// errors encountered, so the caller can log the skips.
    pub fn decode_blocks(&self) -> (Vec<(RawBlock, DataBlock)>, Vec<DecodeError>) {
        let mut decoded = Vec::new();
        let mut errors = Vec::new();
        for raw in &self.blocks {
            if raw.header.block_type != BLOCK_TYPE_DATA {
                continue;
            }
            match DataBlock::decode(raw.header.subtype, &raw.payload) {
                Ok(block) => decoded.push((raw.clone(), block)),
                Err(e) => errors.push(e),
            }
        }
        (decoded, errors)
    }
}

/// Decode a hex string into bytes. Rejects odd lengths and non-hex digits.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, DecodeError> {
    if hex.len() % 2 != 0 {
        return Err(DecodeError::InvalidHex);
    }
    let digit = |c: u8| -> Result<u8, DecodeError> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(DecodeError::InvalidHex),
        }
    };
    hex.as_bytes()
        .chunks(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect()
}
