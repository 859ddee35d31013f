//! Telemetry data block codec.
//!
//! Binary format for the fixed set of records the flight computer
//! transmits. Every block carries a `mission_time` in milliseconds since
//! launch; payloads are little-endian. Wire values stay in integer units
//! (millimetres, millidegrees, pascals, hundredths of a percent) and are
//! converted only when a presentation view is requested.

pub mod status;

use serde_json::{json, Value};

use crate::error::DecodeError;

pub use status::{DeploymentState, SdCardStatus, SensorStatus};

/// Block type tag for telemetry data blocks (byte 0 of the block header)
pub const BLOCK_TYPE_DATA: u8 = 0x00;

/// Block type tag for logging metadata blocks (spacers)
pub const BLOCK_TYPE_META: u8 = 0x01;

/// Subtype tags for telemetry data blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataBlockSubtype {
    DebugMessage = 0x00,
    Altitude = 0x01,
    Temperature = 0x02,
    Pressure = 0x03,
    Humidity = 0x08,
    Status = 0x09,
}

impl DataBlockSubtype {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(DataBlockSubtype::DebugMessage),
            0x01 => Some(DataBlockSubtype::Altitude),
            0x02 => Some(DataBlockSubtype::Temperature),
            0x03 => Some(DataBlockSubtype::Pressure),
            0x08 => Some(DataBlockSubtype::Humidity),
            0x09 => Some(DataBlockSubtype::Status),
            _ => None,
        }
    }

    /// Name used as the telemetry buffer key and in the outward snapshot
    pub fn name(self) -> &'static str {
        match self {
            DataBlockSubtype::DebugMessage => "debug_message",
            DataBlockSubtype::Altitude => "altitude",
            DataBlockSubtype::Temperature => "temperature",
            DataBlockSubtype::Pressure => "pressure",
            DataBlockSubtype::Humidity => "humidity",
            DataBlockSubtype::Status => "status",
        }
    }
}

/// Vehicle status report packed alongside SD card counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    pub mission_time: u32,
    pub kx134: SensorStatus,
    pub altimeter: SensorStatus,
    pub imu: SensorStatus,
    pub sd_card: SdCardStatus,
    pub deployment: DeploymentState,
    pub sd_blocks_recorded: u32,
    pub sd_checkouts_missed: u32,
}

/// One decoded telemetry record
#[derive(Debug, Clone, PartialEq)]
pub enum DataBlock {
    DebugMessage {
        mission_time: u32,
        message: String,
    },
    /// Altitude above launch in millimetres
    Altitude {
        mission_time: u32,
        millimetres: i32,
    },
    /// Temperature in thousandths of a degree Celsius
    Temperature {
        mission_time: u32,
        millidegrees: i32,
    },
    /// Barometric pressure in pascals
    Pressure {
        mission_time: u32,
        pascals: u32,
    },
    /// Relative humidity in hundredths of a percent
    Humidity {
        mission_time: u32,
        centipercent: u32,
    },
    Status(StatusPayload),
}

fn read_u32(payload: &[u8], offset: usize) -> Result<u32, DecodeError> {
    let end = offset + 4;
    if payload.len() < end {
        return Err(DecodeError::TooShort {
            expected: end,
            actual: payload.len(),
        });
    }
    Ok(u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ]))
}

fn read_i32(payload: &[u8], offset: usize) -> Result<i32, DecodeError> {
    read_u32(payload, offset).map(|v| v as i32)
}

impl DataBlock {
    /// Decode a block payload. The header (type, subtype, length) has
    /// already been stripped by the framing layer.
    pub fn decode(subtype: u8, payload: &[u8]) -> Result<DataBlock, DecodeError> {
        let subtype = DataBlockSubtype::from_u8(subtype).ok_or(DecodeError::UnknownSubtype {
            subtype,
            raw: payload.to_vec(),
        })?;

        match subtype {
            DataBlockSubtype::DebugMessage => {
                let mission_time = read_u32(payload, 0)?;
                let message = std::str::from_utf8(&payload[4..])
                    .map_err(|_| DecodeError::MalformedPayload {
                        field: "message",
                        raw: payload.to_vec(),
                    })?
                    .to_string();
                Ok(DataBlock::DebugMessage {
                    mission_time,
                    message,
                })
            }
            DataBlockSubtype::Altitude => Ok(DataBlock::Altitude {
                mission_time: read_u32(payload, 0)?,
                millimetres: read_i32(payload, 4)?,
            }),
            DataBlockSubtype::Temperature => Ok(DataBlock::Temperature {
                mission_time: read_u32(payload, 0)?,
                millidegrees: read_i32(payload, 4)?,
            }),
            DataBlockSubtype::Pressure => Ok(DataBlock::Pressure {
                mission_time: read_u32(payload, 0)?,
                pascals: read_u32(payload, 4)?,
            }),
            DataBlockSubtype::Humidity => Ok(DataBlock::Humidity {
                mission_time: read_u32(payload, 0)?,
                centipercent: read_u32(payload, 4)?,
            }),
            DataBlockSubtype::Status => Self::decode_status(payload),
        }
    }

    fn decode_status(payload: &[u8]) -> Result<DataBlock, DecodeError> {
        let mission_time = read_u32(payload, 0)?;
        let bits = read_u32(payload, 4)?;
        let sd_blocks_recorded = read_u32(payload, 8)?;
        let sd_checkouts_missed = read_u32(payload, 12)?;

        let malformed = |field: &'static str| DecodeError::MalformedPayload {
            field,
            raw: payload.to_vec(),
        };

        Ok(DataBlock::Status(StatusPayload {
            mission_time,
            kx134: SensorStatus::from_bits((bits >> 16) & 0x7).ok_or(malformed("kx134"))?,
            altimeter: SensorStatus::from_bits((bits >> 19) & 0x7)
                .ok_or(malformed("altimeter"))?,
            imu: SensorStatus::from_bits((bits >> 22) & 0x7).ok_or(malformed("imu"))?,
            sd_card: SdCardStatus::from_bits((bits >> 25) & 0x7).ok_or(malformed("sd_card"))?,
            deployment: DeploymentState::from_bits((bits >> 28) & 0xF)
                .ok_or(malformed("deployment"))?,
            sd_blocks_recorded,
            sd_checkouts_missed,
        }))
    }

    pub fn subtype(&self) -> DataBlockSubtype {
        match self {
            DataBlock::DebugMessage { .. } => DataBlockSubtype::DebugMessage,
            DataBlock::Altitude { .. } => DataBlockSubtype::Altitude,
            DataBlock::Temperature { .. } => DataBlockSubtype::Temperature,
            DataBlock::Pressure { .. } => DataBlockSubtype::Pressure,
            DataBlock::Humidity { .. } => DataBlockSubtype::Humidity,
            DataBlock::Status(_) => DataBlockSubtype::Status,
        }
    }

    pub fn mission_time(&self) -> u32 {
        match self {
            DataBlock::DebugMessage { mission_time, .. }
            | DataBlock::Altitude { mission_time, .. }
            | DataBlock::Temperature { mission_time, .. }
            | DataBlock::Pressure { mission_time, .. }
            | DataBlock::Humidity { mission_time, .. } => *mission_time,
            DataBlock::Status(status) => status.mission_time,
        }
    }

    /// Encode the block payload (header excluded), exact inverse of `decode`
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DataBlock::DebugMessage {
                mission_time,
                message,
            } => {
                let mut buf = Vec::with_capacity(4 + message.len());
                buf.extend_from_slice(&mission_time.to_le_bytes());
                buf.extend_from_slice(message.as_bytes());
                buf
            }
            DataBlock::Altitude {
                mission_time,
                millimetres,
            } => {
                let mut buf = [0u8; 8];
                buf[0..4].copy_from_slice(&mission_time.to_le_bytes());
                buf[4..8].copy_from_slice(&millimetres.to_le_bytes());
                buf.to_vec()
            }
            DataBlock::Temperature {
                mission_time,
                millidegrees,
            } => {
                let mut buf = [0u8; 8];
                buf[0..4].copy_from_slice(&mission_time.to_le_bytes());
                buf[4..8].copy_from_slice(&millidegrees.to_le_bytes());
                buf.to_vec()
            }
            DataBlock::Pressure {
                mission_time,
                pascals,
            } => {
                let mut buf = [0u8; 8];
                buf[0..4].copy_from_slice(&mission_time.to_le_bytes());
                buf[4..8].copy_from_slice(&pascals.to_le_bytes());
                buf.to_vec()
            }
            DataBlock::Humidity {
                mission_time,
                centipercent,
            } => {
                let mut buf = [0u8; 8];
                buf[0..4].copy_from_slice(&mission_time.to_le_bytes());
                buf[4..8].copy_from_slice(&centipercent.to_le_bytes());
                buf.to_vec()
            }
            DataBlock::Status(status) => {
                let bits = (status.kx134.bits() << 16)
                    | (status.altimeter.bits() << 19)
                    | (status.imu.bits() << 22)
                    | (status.sd_card.bits() << 25)
                    | (status.deployment.bits() << 28);
                let mut buf = [0u8; 16];
                buf[0..4].copy_from_slice(&status.mission_time.to_le_bytes());
                buf[4..8].copy_from_slice(&bits.to_le_bytes());
                buf[8..12].copy_from_slice(&status.sd_blocks_recorded.to_le_bytes());
                buf[12..16].copy_from_slice(&status.sd_checkouts_missed.to_le_bytes());
                buf.to_vec()
            }
        }
    }

    /// Presentation view used by the telemetry buffers and the outward
    /// snapshot. Unit conversions happen here and nowhere else.
    pub fn to_json(&self) -> Value {
        match self {
            DataBlock::DebugMessage {
                mission_time,
                message,
            } => json!({
                "mission_time": mission_time,
                "message": message,
            }),
            DataBlock::Altitude {
                mission_time,
                millimetres,
            } => {
                let metres = *millimetres as f64 / 1000.0;
                json!({
                    "mission_time": mission_time,
                    "altitude": {
                        "metres": metres,
                        "feet": metres * 3.28084,
                    },
                })
            }
            DataBlock::Temperature {
                mission_time,
                millidegrees,
            } => {
                let celsius = *millidegrees as f64 / 1000.0;
                json!({
                    "mission_time": mission_time,
                    "temperature": {
                        "celsius": celsius,
                        "fahrenheit": celsius * 9.0 / 5.0 + 32.0,
                    },
                })
            }
            DataBlock::Pressure {
                mission_time,
                pascals,
            } => json!({
                "mission_time": mission_time,
                "pressure": {
                    "pascals": pascals,
                    "psi": *pascals as f64 / 6894.757,
                },
            }),
            DataBlock::Humidity {
                mission_time,
                centipercent,
            } => json!({
                "mission_time": mission_time,
                "humidity": {
                    "percentage": (*centipercent as f64 / 100.0).round(),
                },
            }),
            DataBlock::Status(status) => json!({
                "mission_time": status.mission_time,
                "kx134_state": status.kx134.to_string(),
                "altimeter_state": status.altimeter.to_string(),
                "imu_state": status.imu.to_string(),
                "sd_driver_state": status.sd_card.to_string(),
                "deployment_state": status.deployment.to_string(),
                "sd_blocks_recorded": status.sd_blocks_recorded,
                "sd_checkouts_missed": status.sd_checkouts_missed,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_variants_roundtrip() {
        let blocks = [
            DataBlock::Altitude {
                mission_time: 3340,
                millimetres: -12_500,
            },
            DataBlock::Temperature {
                mission_time: 3340,
                millidegrees: 21_375,
            },
            DataBlock::Pressure {
                mission_time: 3340,
                pascals: 101_325,
            },
            DataBlock::Humidity {
                mission_time: 3340,
                centipercent: 4_570,
            },
        ];

        for block in blocks {
            let bytes = block.encode();
            assert_eq!(bytes.len(), 8);
            let decoded = DataBlock::decode(block.subtype() as u8, &bytes).unwrap();
            assert_eq!(decoded, block);
        }
    }

    #[test]
    fn test_debug_message_roundtrip() {
        let block = DataBlock::DebugMessage {
            mission_time: 150,
            message: "pyro continuity ok".to_string(),
        };
        let bytes = block.encode();
        let decoded = DataBlock::decode(0x00, &bytes).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_debug_message_invalid_utf8() {
        let mut bytes = 42u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE, 0x00]);
        let err = DataBlock::decode(0x00, &bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedPayload {
                field: "message",
                ..
            }
        ));
    }

    #[test]
    fn test_status_roundtrip_all_combinations() {
        let sensors = [
            SensorStatus::None,
            SensorStatus::Initializing,
            SensorStatus::Running,
            SensorStatus::SelfTestFailed,
            SensorStatus::Failed,
        ];
        let sd_states = [
            SdCardStatus::NotPresent,
            SdCardStatus::Initializing,
            SdCardStatus::Ready,
            SdCardStatus::Failed,
        ];
        let deployments = [
            DeploymentState::Idle,
            DeploymentState::Armed,
            DeploymentState::PoweredAscent,
            DeploymentState::CoastingAscent,
            DeploymentState::DrogueDeploy,
            DeploymentState::DrogueDescent,
            DeploymentState::MainDeploy,
            DeploymentState::MainDescent,
            DeploymentState::Recovery,
            DeploymentState::DoesNotExist,
        ];

        for &kx134 in &sensors {
            for &altimeter in &sensors {
                for &imu in &sensors {
                    for &sd_card in &sd_states {
                        for &deployment in &deployments {
                            let block = DataBlock::Status(StatusPayload {
                                mission_time: 1000,
                                kx134,
                                altimeter,
                                imu,
                                sd_card,
                                deployment,
                                sd_blocks_recorded: 77,
                                sd_checkouts_missed: 3,
                            });
                            let bytes = block.encode();
                            assert_eq!(bytes.len(), 16);
                            let decoded = DataBlock::decode(0x09, &bytes).unwrap();
                            assert_eq!(decoded, block);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_status_out_of_range_slice() {
        // kx134 slice [16:19) set to 0x7, outside the sensor enum
        let bits = 0x7u32 << 16;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&500u32.to_le_bytes());
        bytes.extend_from_slice(&bits.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let err = DataBlock::decode(0x09, &bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedPayload { field: "kx134", .. }
        ));
    }

    #[test]
    fn test_unknown_subtype() {
        let err = DataBlock::decode(0x42, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnknownSubtype { subtype: 0x42, .. }
        ));
    }

    #[test]
    fn test_too_short_payload() {
        let err = DataBlock::decode(0x01, &[0, 0, 0, 0, 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                expected: 8,
                actual: 5
            }
        );
    }

    #[test]
    fn test_presentation_conversions() {
        let altitude = DataBlock::Altitude {
            mission_time: 100,
            millimetres: 1_000,
        };
        let view = altitude.to_json();
        assert_eq!(view["altitude"]["metres"], 1.0);

        let humidity = DataBlock::Humidity {
            mission_time: 100,
            centipercent: 4_567,
        };
        let view = humidity.to_json();
        assert_eq!(view["humidity"]["percentage"], 46.0);
    }
}
