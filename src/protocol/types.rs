//! Protocol enumerations, device clock and byte helpers.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

/// Size of fixed name fields (NUL-padded UTF-8).
pub const NAME_SIZE: usize = 32;

/// Size of challenge nonces.
pub const CHALLENGE_SIZE: usize = 32;

/// Byte-valued enumeration that keeps unknown raw values.
macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident = $value:literal => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// Raw value not known to this client.
            Unknown(u8),
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                match value {
                    $($value => Self::$variant,)+
                    other => Self::Unknown(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                match value {
                    $($name::$variant => $value,)+
                    $name::Unknown(raw) => raw,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($label),)+
                    Self::Unknown(raw) => write!(f, "Unknown ({raw:#04x})"),
                }
            }
        }
    };
}

pub(crate) use byte_enum;

byte_enum! {
    /// Requested lock movement.
    pub enum LockActionKind {
        Unlock = 0x01 => "Unlock",
        Lock = 0x02 => "Lock",
        Unlatch = 0x03 => "Unlatch",
        LockAndGo = 0x04 => "Lock 'n' Go",
        LockAndGoUnlatch = 0x05 => "Lock 'n' Go with unlatch",
        FullLock = 0x06 => "Full lock",
        FobAction1 = 0x81 => "Fob action 1",
        FobAction2 = 0x82 => "Fob action 2",
        FobAction3 = 0x83 => "Fob action 3",
    }
}

byte_enum! {
    /// Completion status carried by `Status` frames.
    pub enum StatusCode {
        Complete = 0x00 => "Complete",
        Accepted = 0x01 => "Accepted",
    }
}

byte_enum! {
    /// Bolt position reported by the lock.
    pub enum LockState {
        Uncalibrated = 0x00 => "Uncalibrated",
        Locked = 0x01 => "Locked",
        Unlocking = 0x02 => "Unlocking",
        Unlocked = 0x03 => "Unlocked",
        Locking = 0x04 => "Locking",
        Unlatched = 0x05 => "Unlatched",
        UnlockedLockAndGo = 0x06 => "Unlocked (Lock 'n' Go)",
        Unlatching = 0x07 => "Unlatching",
        Calibration = 0xFC => "Calibration",
        BootRun = 0xFD => "Boot run",
        MotorBlocked = 0xFE => "Motor blocked",
        Undefined = 0xFF => "Undefined",
    }
}

byte_enum! {
    /// Operating mode of the lock.
    pub enum DeviceState {
        Uninitialized = 0x00 => "Uninitialized",
        PairingMode = 0x01 => "Pairing mode",
        DoorMode = 0x02 => "Door mode",
        MaintenanceMode = 0x04 => "Maintenance mode",
    }
}

byte_enum! {
    /// What caused the last state change.
    pub enum Trigger {
        System = 0x00 => "System",
        Manual = 0x01 => "Manual",
        Button = 0x02 => "Button",
        Automatic = 0x03 => "Automatic",
        AutoLock = 0x06 => "Auto lock",
    }
}

byte_enum! {
    /// Door sensor reading.
    pub enum DoorSensorState {
        Unavailable = 0x00 => "Unavailable",
        Closed = 0x02 => "Door closed",
        Opened = 0x03 => "Door opened",
        Uncalibrated = 0x10 => "Uncalibrated",
        Tampered = 0xF0 => "Tampered",
        StateUnknown = 0xFF => "Unknown",
    }
}

byte_enum! {
    /// Order of returned log entries.
    pub enum LogSortOrder {
        Ascending = 0x00 => "Ascending",
        Descending = 0x01 => "Descending",
    }
}

byte_enum! {
    /// Kind of identity being authorized.
    pub enum AuthorizationType {
        App = 0x00 => "App",
        Bridge = 0x01 => "Bridge",
        Fob = 0x02 => "Fob",
        Keypad = 0x03 => "Keypad",
    }
}

byte_enum! {
    /// Activity log entry kind.
    pub enum LogEntryType {
        LoggingEnabledDisabled = 0x01 => "Logging enabled/disabled",
        LockAction = 0x02 => "Lock action",
        Calibration = 0x03 => "Calibration",
        InitializationRun = 0x04 => "Initialization run",
        KeypadAction = 0x05 => "Keypad action",
        DoorSensor = 0x06 => "Door sensor",
        DoorSensorLogging = 0x07 => "Door sensor logging enabled/disabled",
        FirmwareUpdate = 0x0A => "Firmware update",
    }
}

/// Device clock, transmitted as year (u16 LE), month, day, hour, minute, second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DeviceTime {
    /// Encoded size.
    pub const SIZE: usize = 7;

    /// Decode from the first 7 bytes of `b`. Caller guarantees the length.
    pub(crate) fn read(b: &[u8]) -> Self {
        Self {
            year: u16::from_le_bytes([b[0], b[1]]),
            month: b[2],
            day: b[3],
            hour: b[4],
            minute: b[5],
            second: b[6],
        }
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let [lo, hi] = self.year.to_le_bytes();
        [lo, hi, self.month, self.day, self.hour, self.minute, self.second]
    }

    /// Interpret as a UTC timestamp. `None` when the fields do not form a valid date.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(
            self.year as i32,
            self.month as u32,
            self.day as u32,
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
        .single()
    }

    /// Device clock fields for a UTC timestamp.
    pub fn from_utc(dt: &DateTime<Utc>) -> Self {
        Self {
            year: dt.year().clamp(0, u16::MAX as i32) as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
        }
    }

    /// Current UTC time.
    pub fn now() -> Self {
        Self::from_utc(&Utc::now())
    }
}

impl fmt::Display for DeviceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

pub(crate) fn u16_at(b: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([b[offset], b[offset + 1]])
}

pub(crate) fn u32_at(b: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]])
}

pub(crate) fn array_at<const N: usize>(b: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&b[offset..offset + N]);
    out
}

/// Decode a NUL-padded name field.
pub(crate) fn name_from_field(field: &[u8]) -> String {
    String::from_utf8_lossy(field).trim_matches('\0').to_string()
}

/// Encode a name into a NUL-padded field, truncating on a char boundary.
pub(crate) fn name_to_field<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut end = name.len().min(N);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&name.as_bytes()[..end]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_values_preserved() {
        let state = LockState::from(0x42);
        assert_eq!(state, LockState::Unknown(0x42));
        assert_eq!(u8::from(state), 0x42);
        assert_eq!(state.to_string(), "Unknown (0x42)");
    }

    #[test]
    fn test_known_values_map_both_ways() {
        assert_eq!(LockActionKind::from(0x82), LockActionKind::FobAction2);
        assert_eq!(u8::from(LockActionKind::FullLock), 0x06);
        assert_eq!(DeviceState::from(0x04), DeviceState::MaintenanceMode);
        assert_eq!(Trigger::from(0x06), Trigger::AutoLock);
        assert_eq!(u8::from(DoorSensorState::Tampered), 0xF0);
    }

    #[test]
    fn test_device_time_bytes() {
        let time = DeviceTime::read(&[0xE9, 0x07, 3, 14, 15, 9, 26]);
        assert_eq!(time.year, 2025);
        assert_eq!(time.to_bytes(), [0xE9, 0x07, 3, 14, 15, 9, 26]);
        assert_eq!(time.to_string(), "2025-03-14T15:09:26Z");
    }

    #[test]
    fn test_device_time_invalid_date() {
        let time = DeviceTime::default();
        assert!(time.to_utc().is_none());
    }

    #[test]
    fn test_device_time_from_utc() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
        let time = DeviceTime::from_utc(&dt);
        assert_eq!(time.to_utc(), Some(dt));
    }

    #[test]
    fn test_name_field_roundtrip() {
        let field: [u8; NAME_SIZE] = name_to_field("Front Door");
        assert_eq!(&field[..10], b"Front Door");
        assert!(field[10..].iter().all(|&b| b == 0));
        assert_eq!(name_from_field(&field), "Front Door");
    }

    #[test]
    fn test_name_field_truncates_on_char_boundary() {
        let long = "ä".repeat(20);
        let field: [u8; NAME_SIZE] = name_to_field(&long);
        assert_eq!(name_from_field(&field), "ä".repeat(16));
    }
}
