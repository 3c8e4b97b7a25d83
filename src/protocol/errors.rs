//! Device error reports.

use std::fmt;

use super::codes::CommandCode;
use crate::error::{Error, Result};

/// Error frame sent by the lock: error code plus the command it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    pub code: u8,
    /// Raw code of the failing command; may be one this client does not know.
    pub command: u16,
}

impl ErrorReport {
    pub const SIZE: usize = 3;

    pub fn new(code: u8, command: CommandCode) -> Self {
        Self {
            code,
            command: command.value(),
        }
    }

    pub(crate) fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != Self::SIZE {
            return Err(Error::InvalidLength {
                command: CommandCode::ErrorReport,
                expected: Self::SIZE,
                actual: payload.len(),
            });
        }
        Ok(Self {
            code: payload[0],
            command: u16::from_le_bytes([payload[1], payload[2]]),
        })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let [lo, hi] = self.command.to_le_bytes();
        vec![self.code, lo, hi]
    }

    /// Name from the device error table.
    pub fn name(&self) -> &'static str {
        error_name(self.code)
    }

    /// The failing command, if known.
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::try_from(self.command).ok()
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.code)?;
        match self.command() {
            Some(command) => write!(f, " in response to {command}"),
            None => write!(f, " in response to {:#06x}", self.command),
        }
    }
}

/// Look up the name of a device error code.
pub fn error_name(code: u8) -> &'static str {
    match code {
        0xFD => "ERROR_BAD_CRC",
        0xFE => "ERROR_BAD_LENGTH",
        0xFF => "ERROR_UNKNOWN",
        0x10 => "P_ERROR_NOT_PAIRING",
        0x11 => "P_ERROR_BAD_AUTHENTICATOR",
        0x12 => "P_ERROR_BAD_PARAMETER",
        0x13 => "P_ERROR_MAX_USER",
        0x20 => "K_ERROR_NOT_AUTHORIZED",
        0x21 => "K_ERROR_BAD_PIN",
        0x22 => "K_ERROR_BAD_NONCE",
        0x23 => "K_ERROR_BAD_PARAMETER",
        0x24 => "K_ERROR_INVALID_AUTH_ID",
        0x25 => "K_ERROR_DISABLED",
        0x26 => "K_ERROR_REMOTE_NOT_ALLOWED",
        0x27 => "K_ERROR_TIME_NOT_ALLOWED",
        0x28 => "K_ERROR_TOO_MANY_PIN_ATTEMPTS",
        0x29 => "K_ERROR_TOO_MANY_ENTRIES",
        0x2A => "K_ERROR_CODE_ALREADY_EXISTS",
        0x2B => "K_ERROR_CODE_INVALID",
        0x2C => "K_ERROR_CODE_INVALID_TIMEOUT_1",
        0x2D => "K_ERROR_CODE_INVALID_TIMEOUT_2",
        0x2E => "K_ERROR_CODE_INVALID_TIMEOUT_3",
        0x40 => "K_ERROR_AUTO_UNLOCK_TOO_RECENT",
        0x41 => "K_ERROR_POSITION_UNKNOWN",
        0x42 => "K_ERROR_MOTOR_BLOCKED",
        0x43 => "K_ERROR_CLUTCH_FAILURE",
        0x44 => "K_ERROR_MOTOR_TIMEOUT",
        0x45 => "K_ERROR_BUSY",
        0x46 => "K_ERROR_CANCELED",
        0x47 => "K_ERROR_NOT_CALIBRATED",
        0x48 => "K_ERROR_MOTOR_POSITION_LIMIT",
        0x49 => "K_ERROR_MOTOR_LOW_VOLTAGE",
        0x4A => "K_ERROR_MOTOR_POWER_FAILURE",
        0x4B => "K_ERROR_CLUTCH_POWER_FAILURE",
        0x4C => "K_ERROR_VOLTAGE_TOO_LOW",
        0x4D => "K_ERROR_FIRMWARE_UPDATE_NEEDED",
        _ => "UNDEFINED_ERROR",
    }
}
