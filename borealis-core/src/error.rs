//! Error types for protocol and mission-file parsing

use thiserror::Error;

/// Errors that can occur when decoding radio transmissions or mission files
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is too short to contain required data
    #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Block subtype tag is not recognized; carries the raw bytes for diagnostics
    #[error("Unknown block subtype {subtype:#04X}: {raw:02X?}")]
    UnknownSubtype { subtype: u8, raw: Vec<u8> },

    /// A field inside the payload does not map to a defined value
    #[error("Malformed {field} field: {raw:02X?}")]
    MalformedPayload { field: &'static str, raw: Vec<u8> },

    /// Packet or file header doesn't match the expected format
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Encoding version is not supported by this decoder
    #[error("Unsupported encoding version: {0}")]
    UnsupportedVersion(u8),

    /// Transmission is not valid hexadecimal text
    #[error("Invalid hex encoding")]
    InvalidHex,
}
