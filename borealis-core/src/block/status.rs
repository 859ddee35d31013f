//! Sub-state enums packed into the status block bitfield.
//!
//! The flight computer reports the health of its peripherals in one `u32`,
//! with each peripheral occupying a fixed slice of bits:
//!
//! ```text
//! bit 31          28          25          22          19          16
//!  ┌──────────────┬───────────┬───────────┬───────────┬───────────┬── ... ──┐
//!  │ deployment   │ sd card   │ imu       │ altimeter │ kx134     │ unused  │
//!  │ [28:32)      │ [25:28)   │ [22:25)   │ [19:22)   │ [16:19)   │         │
//!  └──────────────┴───────────┴───────────┴───────────┴───────────┴─────────┘
//! ```
//!
//! A slice value outside the defined range of its enum is a decode error,
//! never silently coerced.

use serde::Serialize;

/// Health of one sensor (KX134 accelerometer, altimeter or IMU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    None,
    Initializing,
    Running,
    SelfTestFailed,
    Failed,
}

impl SensorStatus {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x0 => Some(SensorStatus::None),
            0x1 => Some(SensorStatus::Initializing),
            0x2 => Some(SensorStatus::Running),
            0x3 => Some(SensorStatus::SelfTestFailed),
            0x4 => Some(SensorStatus::Failed),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            SensorStatus::None => 0x0,
            SensorStatus::Initializing => 0x1,
            SensorStatus::Running => 0x2,
            SensorStatus::SelfTestFailed => 0x3,
            SensorStatus::Failed => 0x4,
        }
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStatus::None => write!(f, "none"),
            SensorStatus::Initializing => write!(f, "initializing"),
            SensorStatus::Running => write!(f, "running"),
            SensorStatus::SelfTestFailed => write!(f, "self test failed"),
            SensorStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Health of the onboard SD card driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SdCardStatus {
    NotPresent,
    Initializing,
    Ready,
    Failed,
}

impl SdCardStatus {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x0 => Some(SdCardStatus::NotPresent),
            0x1 => Some(SdCardStatus::Initializing),
            0x2 => Some(SdCardStatus::Ready),
            0x3 => Some(SdCardStatus::Failed),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            SdCardStatus::NotPresent => 0x0,
            SdCardStatus::Initializing => 0x1,
            SdCardStatus::Ready => 0x2,
            SdCardStatus::Failed => 0x3,
        }
    }
}

impl std::fmt::Display for SdCardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdCardStatus::NotPresent => write!(f, "card not present"),
            SdCardStatus::Initializing => write!(f, "initializing"),
            SdCardStatus::Ready => write!(f, "ready"),
            SdCardStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Recovery deployment state machine position, as reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Idle,
    Armed,
    PoweredAscent,
    CoastingAscent,
    DrogueDeploy,
    DrogueDescent,
    MainDeploy,
    MainDescent,
    Recovery,
    DoesNotExist,
}

impl DeploymentState {
    /// `DoesNotExist` occupies the all-ones slice; values 9..=14 are undefined.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x0 => Some(DeploymentState::Idle),
            0x1 => Some(DeploymentState::Armed),
            0x2 => Some(DeploymentState::PoweredAscent),
            0x3 => Some(DeploymentState::CoastingAscent),
            0x4 => Some(DeploymentState::DrogueDeploy),
            0x5 => Some(DeploymentState::DrogueDescent),
            0x6 => Some(DeploymentState::MainDeploy),
            0x7 => Some(DeploymentState::MainDescent),
            0x8 => Some(DeploymentState::Recovery),
            0xF => Some(DeploymentState::DoesNotExist),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            DeploymentState::Idle => 0x0,
            DeploymentState::Armed => 0x1,
            DeploymentState::PoweredAscent => 0x2,
            DeploymentState::CoastingAscent => 0x3,
            DeploymentState::DrogueDeploy => 0x4,
            DeploymentState::DrogueDescent => 0x5,
            DeploymentState::MainDeploy => 0x6,
            DeploymentState::MainDescent => 0x7,
            DeploymentState::Recovery => 0x8,
            DeploymentState::DoesNotExist => 0xF,
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentState::Idle => write!(f, "idle"),
            DeploymentState::Armed => write!(f, "armed"),
            DeploymentState::PoweredAscent => write!(f, "powered ascent"),
            DeploymentState::CoastingAscent => write!(f, "coasting ascent"),
            DeploymentState::DrogueDeploy => write!(f, "drogue deployed"),
            DeploymentState::DrogueDescent => write!(f, "drogue descent"),
            DeploymentState::MainDeploy => write!(f, "main deployed"),
            DeploymentState::MainDescent => write!(f, "main descent"),
            DeploymentState::Recovery => write!(f, "recovery"),
            DeploymentState::DoesNotExist => write!(f, ""),
        }
    }
}
