//! Security PIN encoding.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Device security PIN. Older locks use 4 digits, newer ones 6.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SecurityPin {
    FourDigit(u16),
    SixDigit(u32),
}

impl SecurityPin {
    /// Parse a 4- or 6-digit decimal PIN.
    pub fn parse(pin: &str) -> Result<Self> {
        if !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidPin("PIN must contain digits only".to_string()));
        }
        match pin.len() {
            4 => pin
                .parse::<u16>()
                .map(Self::FourDigit)
                .map_err(|e| Error::InvalidPin(e.to_string())),
            6 => pin
                .parse::<u32>()
                .map(Self::SixDigit)
                .map_err(|e| Error::InvalidPin(e.to_string())),
            n => Err(Error::InvalidPin(format!("PIN must have 4 or 6 digits, got {n}"))),
        }
    }

    /// Little-endian wire encoding: 2 bytes for 4-digit, 4 bytes for 6-digit PINs.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::FourDigit(pin) => pin.to_le_bytes().to_vec(),
            Self::SixDigit(pin) => pin.to_le_bytes().to_vec(),
        }
    }

    /// Encoding of an optional PIN; an absent PIN is sent as two zero bytes.
    pub fn encode(pin: Option<&SecurityPin>) -> Vec<u8> {
        pin.map(SecurityPin::to_bytes).unwrap_or_else(|| vec![0, 0])
    }
}

impl FromStr for SecurityPin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Digits with leading zeros, as the user entered them.
impl fmt::Display for SecurityPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FourDigit(pin) => write!(f, "{pin:04}"),
            Self::SixDigit(pin) => write!(f, "{pin:06}"),
        }
    }
}

impl fmt::Debug for SecurityPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FourDigit(_) => f.write_str("SecurityPin(****)"),
            Self::SixDigit(_) => f.write_str("SecurityPin(******)"),
        }
    }
}
