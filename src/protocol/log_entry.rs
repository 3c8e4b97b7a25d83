//! Activity log entries (`LogEntry`, 0x0032).

use std::fmt;

use super::codes::CommandCode;
use super::types::{
    name_from_field, name_to_field, u32_at, DeviceTime, LockActionKind, LogEntryType, Trigger, NAME_SIZE,
};
use crate::error::{Error, Result};

/// One activity log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub index: u32,
    pub time: DeviceTime,
    /// Authorization that caused the entry.
    pub auth_id: u32,
    pub auth_name: String,
    pub entry_type: LogEntryType,
    /// Type-specific trailing data.
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Fixed header size before the type-specific data.
    pub const MIN_SIZE: usize = 48;

    pub(crate) fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < Self::MIN_SIZE {
            return Err(Error::PayloadTooShort {
                command: CommandCode::LogEntry,
                minimum: Self::MIN_SIZE,
                actual: b.len(),
            });
        }
        Ok(Self {
            index: u32_at(b, 0),
            time: DeviceTime::read(&b[4..11]),
            auth_id: u32_at(b, 11),
            auth_name: name_from_field(&b[15..15 + NAME_SIZE]),
            entry_type: LogEntryType::from(b[47]),
            data: b[48..].to_vec(),
        })
    }

    /// Wire encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(Self::MIN_SIZE + self.data.len());
        b.extend_from_slice(&self.index.to_le_bytes());
        b.extend_from_slice(&self.time.to_bytes());
        b.extend_from_slice(&self.auth_id.to_le_bytes());
        b.extend_from_slice(&name_to_field::<NAME_SIZE>(&self.auth_name));
        b.push(self.entry_type.into());
        b.extend_from_slice(&self.data);
        b
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.entry_type, self.data.as_slice()) {
            (LogEntryType::LoggingEnabledDisabled, [0, ..]) => f.write_str("Logging disabled"),
            (LogEntryType::LoggingEnabledDisabled, [_, ..]) => f.write_str("Logging enabled"),
            (
                LogEntryType::LockAction | LogEntryType::Calibration | LogEntryType::InitializationRun,
                [action, trigger, ..],
            ) => match Trigger::from(*trigger) {
                Trigger::Unknown(_) => write!(f, "{}", LockActionKind::from(*action)),
                trigger => write!(f, "{} ({trigger})", LockActionKind::from(*action)),
            },
            (LogEntryType::FirmwareUpdate, [major, minor, patch, ..]) => {
                write!(f, "Firmware update ({major}.{minor}.{patch})")
            }
            _ => write!(
                f,
                "{} by {} (ID: {}) at {}",
                self.entry_type, self.auth_name, self.auth_id, self.time
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entry_type: LogEntryType, data: &[u8]) -> LogEntry {
        LogEntry {
            index: 17,
            time: DeviceTime {
                year: 2025,
                month: 2,
                day: 28,
                hour: 8,
                minute: 15,
                second: 0,
            },
            auth_id: 3,
            auth_name: "Kitchen Tablet".to_string(),
            entry_type,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_parse_log_entry() {
        let original = entry(LogEntryType::LockAction, &[0x02, 0x01, 0x00, 0x00]);
        let bytes = original.to_bytes();
        assert_eq!(bytes.len(), 52);
        assert_eq!(bytes[47], 0x02);

        let parsed = LogEntry::parse(&bytes).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_log_entry_too_short() {
        let err = LogEntry::parse(&[0u8; 47]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooShort { minimum: 48, actual: 47, .. }));
    }

    #[test]
    fn test_display_lock_action() {
        assert_eq!(entry(LogEntryType::LockAction, &[0x01, 0x02]).to_string(), "Unlock (Button)");
        assert_eq!(entry(LogEntryType::Calibration, &[0x02, 0x55]).to_string(), "Lock");
    }

    #[test]
    fn test_display_logging_toggle() {
        assert_eq!(entry(LogEntryType::LoggingEnabledDisabled, &[1]).to_string(), "Logging enabled");
        assert_eq!(entry(LogEntryType::LoggingEnabledDisabled, &[0]).to_string(), "Logging disabled");
    }

    #[test]
    fn test_display_firmware_update() {
        assert_eq!(
            entry(LogEntryType::FirmwareUpdate, &[4, 1, 9]).to_string(),
            "Firmware update (4.1.9)"
        );
    }

    #[test]
    fn test_display_default() {
        assert_eq!(
            entry(LogEntryType::DoorSensor, &[0x01]).to_string(),
            "Door sensor by Kitchen Tablet (ID: 3) at 2025-02-28T08:15:00Z"
        );
    }

    #[test]
    fn test_display_short_data_falls_back() {
        assert_eq!(
            entry(LogEntryType::LockAction, &[0x01]).to_string(),
            "Lock action by Kitchen Tablet (ID: 3) at 2025-02-28T08:15:00Z"
        );
    }
}
