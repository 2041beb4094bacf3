// lib.rs: national telematics reporting protocol: signals, data units, framing

pub mod codec;
pub mod frame;
pub mod layout;
pub mod signal;

pub use codec::ReportOptions;
pub use frame::{checksum, FrameError, Message, MessageBuilder};
pub use signal::{SignalId, SignalMap, SignalSource, SignalType, SignalValue, ValueKind};

use serde::{Deserialize, Serialize};

// =============================== Enums ======================================

/// Command flag byte of the outer envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CommandFlag {
    VehicleLogin = 0x01,
    RealtimeReport = 0x02,
    ReissueReport = 0x03,
    VehicleLogout = 0x04,
}

impl CommandFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandFlag::VehicleLogin => "login",
            CommandFlag::RealtimeReport => "realtime",
            CommandFlag::ReissueReport => "reissue",
            CommandFlag::VehicleLogout => "logout",
        }
    }
}

impl TryFrom<u8> for CommandFlag {
    type Error = FrameError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x01 => Ok(CommandFlag::VehicleLogin),
            0x02 => Ok(CommandFlag::RealtimeReport),
            0x03 => Ok(CommandFlag::ReissueReport),
            0x04 => Ok(CommandFlag::VehicleLogout),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

/// Ack byte for terminal-originated commands.
pub const ACK_COMMAND: u8 = 0xFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EncryptType {
    None = 0x01,
    Rsa = 0x02,
    Aes128 = 0x03,
    Exception = 0xFE,
    Invalid = 0xFF,
}

impl TryFrom<u8> for EncryptType {
    type Error = FrameError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x01 => Ok(EncryptType::None),
            0x02 => Ok(EncryptType::Rsa),
            0x03 => Ok(EncryptType::Aes128),
            0xFE => Ok(EncryptType::Exception),
            0xFF => Ok(EncryptType::Invalid),
            other => Err(FrameError::UnknownEncryption(other)),
        }
    }
}

/// Type tag at byte 0 of each realtime information unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InfoType {
    Vehicle = 0x01,
    DriveMotor = 0x02,
    FuelCell = 0x03,
    Engine = 0x04,
    Position = 0x05,
    Extremum = 0x06,
    Alarm = 0x07,
    BatteryVoltage = 0x08,
    BatteryTemperature = 0x09,
}

// ================================ Tests =====================================
