//! `KeyturnerStates` status snapshot and its packed status bytes.

use std::fmt;

use super::codes::CommandCode;
use super::types::{
    byte_enum, u16_at, DeviceState, DeviceTime, DoorSensorState, LockActionKind, LockState, StatusCode, Trigger,
};
use crate::error::{Error, Result};

/// Battery byte: bit 0 critical, bit 1 charging, upper 6 bits percentage / 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryState {
    pub critical: bool,
    pub charging: bool,
    pub percentage: u8,
}

impl From<u8> for BatteryState {
    fn from(b: u8) -> Self {
        Self {
            critical: b & 0x01 != 0,
            charging: b & 0x02 != 0,
            percentage: (b >> 2) * 2,
        }
    }
}

/// Accessory battery and feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessoryStatus {
    pub keypad_supported: bool,
    pub keypad_battery_critical: bool,
    pub door_sensor_supported: bool,
    pub door_sensor_battery_critical: bool,
}

impl From<u8> for AccessoryStatus {
    fn from(b: u8) -> Self {
        Self {
            keypad_supported: b & 0x01 != 0,
            keypad_battery_critical: b & 0x02 != 0,
            door_sensor_supported: b & 0x04 != 0,
            door_sensor_battery_critical: b & 0x08 != 0,
        }
    }
}

/// Remote access (server-sent events) flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteAccessStatus {
    pub sse_uplink_available: bool,
    pub bridge_paired: bool,
    pub sse_via_wifi: bool,
    pub sse_established: bool,
    pub sse_via_thread: bool,
    pub thread_sse_uplink_enabled: bool,
    pub nat64_via_thread: bool,
}

impl From<u8> for RemoteAccessStatus {
    fn from(b: u8) -> Self {
        Self {
            sse_uplink_available: b & 0x01 != 0,
            bridge_paired: b & 0x02 != 0,
            sse_via_wifi: b & 0x04 != 0,
            sse_established: b & 0x08 != 0,
            sse_via_thread: b & 0x10 != 0,
            thread_sse_uplink_enabled: b & 0x20 != 0,
            nat64_via_thread: b & 0x40 != 0,
        }
    }
}

impl fmt::Display for RemoteAccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.sse_uplink_available, "SSE uplink available"),
            (self.bridge_paired, "Bridge paired"),
            (self.sse_via_wifi, "SSE via WiFi"),
            (self.sse_established, "SSE established"),
            (self.sse_via_thread, "SSE via Thread"),
            (self.thread_sse_uplink_enabled, "Thread SSE uplink enabled"),
            (self.nat64_via_thread, "NAT64 via Thread"),
        ];
        let set: Vec<&str> = flags.iter().filter(|(on, _)| *on).map(|(_, name)| *name).collect();
        if set.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&set.join(", "))
        }
    }
}

/// Radio signal strength byte: 0 invalid, 1 not supported, otherwise RSSI in dBm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStrength {
    #[default]
    Invalid,
    NotSupported,
    Rssi(i8),
}

impl From<u8> for ConnectionStrength {
    fn from(b: u8) -> Self {
        match b {
            0x00 => Self::Invalid,
            0x01 => Self::NotSupported,
            other => Self::Rssi(other as i8),
        }
    }
}

impl fmt::Display for ConnectionStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("invalid"),
            Self::NotSupported => f.write_str("not supported"),
            Self::Rssi(rssi) => write!(f, "{rssi} dBm"),
        }
    }
}

byte_enum! {
    /// WiFi link state (2 bits).
    pub enum WifiStatus {
        Disabled = 0x00 => "Disabled",
        Disconnected = 0x01 => "Disconnected",
        Connecting = 0x02 => "Connecting",
        Connected = 0x03 => "Connected",
    }
}

byte_enum! {
    /// Server-sent events link state (2 bits).
    pub enum SseStatus {
        Suspended = 0x00 => "Suspended",
        NotReachable = 0x01 => "Not reachable",
        Connecting = 0x02 => "Connecting",
        Connected = 0x03 => "Connected",
    }
}

byte_enum! {
    /// MQTT link state (2 bits).
    pub enum MqttStatus {
        Disabled = 0x00 => "Disabled",
        Disconnected = 0x01 => "Disconnected",
        Connecting = 0x02 => "Connecting",
        Connected = 0x03 => "Connected",
    }
}

byte_enum! {
    /// Network carrying the MQTT connection.
    pub enum MqttUplink {
        Wifi = 0x00 => "WiFi",
        Thread = 0x01 => "Thread",
    }
}

byte_enum! {
    /// Thread link state (2 bits).
    pub enum ThreadStatus {
        MatterDisabled = 0x00 => "Matter disabled",
        Disconnected = 0x01 => "Disconnected",
        Connecting = 0x02 => "Connecting",
        Connected = 0x03 => "Connected",
    }
}

/// WiFi status byte: bits 0-1 WiFi, bits 2-3 SSE, bits 4-7 quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiConnectionStatus {
    pub wifi: WifiStatus,
    pub sse: SseStatus,
    pub quality: u8,
}

impl From<u8> for WifiConnectionStatus {
    fn from(b: u8) -> Self {
        Self {
            wifi: WifiStatus::from(b & 0x03),
            sse: SseStatus::from((b >> 2) & 0x03),
            quality: (b >> 4) & 0x0F,
        }
    }
}

/// MQTT status byte: bits 0-1 status, bit 2 uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttConnectionStatus {
    pub status: MqttStatus,
    pub uplink: MqttUplink,
}

impl From<u8> for MqttConnectionStatus {
    fn from(b: u8) -> Self {
        Self {
            status: MqttStatus::from(b & 0x03),
            uplink: MqttUplink::from((b >> 2) & 0x01),
        }
    }
}

/// Thread status byte: bits 0-1 status, bits 2-3 SSE, bit 4 commissioning, bit 5 WiFi suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConnectionStatus {
    pub status: ThreadStatus,
    pub sse: SseStatus,
    pub matter_commissioning: bool,
    pub wifi_suspended: bool,
}

impl From<u8> for ThreadConnectionStatus {
    fn from(b: u8) -> Self {
        Self {
            status: ThreadStatus::from(b & 0x03),
            sse: SseStatus::from((b >> 2) & 0x03),
            matter_commissioning: b & 0x10 != 0,
            wifi_suspended: b & 0x20 != 0,
        }
    }
}

/// Lock status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyturnerStates {
    pub device_state: DeviceState,
    pub lock_state: LockState,
    pub trigger: Trigger,
    pub current_time: DeviceTime,
    /// Offset to UTC in minutes.
    pub timezone_offset: i16,
    pub battery: BatteryState,
    pub config_update_count: u8,
    pub lock_n_go_timer: u8,
    pub last_lock_action: LockActionKind,
    pub last_lock_action_trigger: Trigger,
    pub last_lock_action_completion: StatusCode,
    pub door_sensor: DoorSensorState,
    pub nightmode_active: bool,
    pub accessory: AccessoryStatus,
    pub remote_access: RemoteAccessStatus,
    pub ble_strength: ConnectionStrength,
    pub wifi_strength: ConnectionStrength,
    pub wifi: WifiConnectionStatus,
    pub mqtt: MqttConnectionStatus,
    pub thread: ThreadConnectionStatus,
}

impl KeyturnerStates {
    /// Shortest payload accepted. Later firmware appends fields; missing ones read as zero.
    pub const MIN_SIZE: usize = 26;

    pub(crate) fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < Self::MIN_SIZE {
            return Err(Error::PayloadTooShort {
                command: CommandCode::KeyturnerStates,
                minimum: Self::MIN_SIZE,
                actual: b.len(),
            });
        }
        let opt = |i: usize| b.get(i).copied().unwrap_or(0);

        Ok(Self {
            device_state: DeviceState::from(b[0]),
            lock_state: LockState::from(b[1]),
            trigger: Trigger::from(b[2]),
            current_time: DeviceTime::read(&b[3..10]),
            timezone_offset: u16_at(b, 10) as i16,
            battery: BatteryState::from(b[12]),
            config_update_count: b[13],
            lock_n_go_timer: b[14],
            last_lock_action: LockActionKind::from(b[15]),
            last_lock_action_trigger: Trigger::from(b[16]),
            last_lock_action_completion: StatusCode::from(b[17]),
            door_sensor: DoorSensorState::from(b[18]),
            nightmode_active: b[19] != 0,
            accessory: AccessoryStatus::from(b[20]),
            remote_access: RemoteAccessStatus::from(b[21]),
            ble_strength: ConnectionStrength::from(b[22]),
            wifi_strength: ConnectionStrength::from(b[23]),
            wifi: WifiConnectionStatus::from(b[24]),
            mqtt: MqttConnectionStatus::from(b[25]),
            thread: ThreadConnectionStatus::from(opt(26)),
        })
    }

    /// Whether the bolt is in a locked position.
    pub fn is_locked(&self) -> bool {
        matches!(self.lock_state, LockState::Locked | LockState::Locking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        vec![
            0x02, // door mode
            0x01, // locked
            0x02, // button
            0xE9, 0x07, 6, 1, 12, 30, 45, // 2025-06-01 12:30:45
            0x3C, 0x00, // +60 min
            0b0011_0010, // charging, 24 %
            7,    // config updates
            0,    // lock'n'go timer
            0x02, // last action lock
            0x01, // manual
            0x00, // complete
            0x02, // door closed
            0x01, // nightmode
            0x05, // keypad + door sensor supported
            0x0A, // bridge paired, SSE established
            0xC4, // -60 dBm
            0x01, // wifi strength not supported
            0b0111_1111, // wifi connected, sse connected, quality 7
            0b0000_0111, // mqtt connected over thread
            0b0011_0011, // thread connected, commissioning, wifi suspended
        ]
    }

    #[test]
    fn test_parse_full_states() {
        let states = KeyturnerStates::parse(&sample()).unwrap();

        assert_eq!(states.device_state, DeviceState::DoorMode);
        assert_eq!(states.lock_state, LockState::Locked);
        assert_eq!(states.trigger, Trigger::Button);
        assert_eq!(states.current_time.to_string(), "2025-06-01T12:30:45Z");
        assert_eq!(states.timezone_offset, 60);
        assert_eq!(states.config_update_count, 7);
        assert_eq!(states.last_lock_action, LockActionKind::Lock);
        assert_eq!(states.last_lock_action_trigger, Trigger::Manual);
        assert_eq!(states.last_lock_action_completion, StatusCode::Complete);
        assert_eq!(states.door_sensor, DoorSensorState::Closed);
        assert!(states.nightmode_active);
        assert!(states.accessory.keypad_supported);
        assert!(states.accessory.door_sensor_supported);
        assert!(!states.accessory.keypad_battery_critical);
        assert!(states.remote_access.bridge_paired);
        assert!(states.remote_access.sse_established);
        assert_eq!(states.remote_access.to_string(), "Bridge paired, SSE established");
        assert_eq!(states.ble_strength, ConnectionStrength::Rssi(-60));
        assert_eq!(states.wifi_strength, ConnectionStrength::NotSupported);
        assert_eq!(states.wifi.wifi, WifiStatus::Connected);
        assert_eq!(states.wifi.sse, SseStatus::Connected);
        assert_eq!(states.wifi.quality, 7);
        assert_eq!(states.mqtt.status, MqttStatus::Connected);
        assert_eq!(states.mqtt.uplink, MqttUplink::Thread);
        assert_eq!(states.thread.status, ThreadStatus::Connected);
        assert!(states.thread.matter_commissioning);
        assert!(states.thread.wifi_suspended);
        assert!(states.is_locked());
    }

    #[test]
    fn test_battery_decoding() {
        let battery = BatteryState::from(0b0011_0010);
        assert!(battery.charging);
        assert!(!battery.critical);
        assert_eq!(battery.percentage, 24);

        let full = BatteryState::from(0b1100_1001);
        assert!(full.critical);
        assert_eq!(full.percentage, 100);
    }

    #[test]
    fn test_negative_timezone_offset() {
        let mut b = sample();
        b[10..12].copy_from_slice(&(-300i16).to_le_bytes());
        let states = KeyturnerStates::parse(&b).unwrap();
        assert_eq!(states.timezone_offset, -300);
    }

    #[test]
    fn test_short_variant_defaults_thread_status() {
        let mut b = sample();
        b.truncate(26);
        let states = KeyturnerStates::parse(&b).unwrap();
        assert_eq!(states.thread.status, ThreadStatus::MatterDisabled);
        assert!(!states.thread.wifi_suspended);
    }

    #[test]
    fn test_longer_payload_accepted() {
        let mut b = sample();
        b.extend_from_slice(&[0xAA, 0xBB]);
        assert!(KeyturnerStates::parse(&b).is_ok());
    }

    #[test]
    fn test_too_short() {
        let err = KeyturnerStates::parse(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooShort { minimum: 26, actual: 20, .. }));
    }

    #[test]
    fn test_unknown_lock_state_kept() {
        let mut b = sample();
        b[1] = 0x33;
        let states = KeyturnerStates::parse(&b).unwrap();
        assert_eq!(states.lock_state, LockState::Unknown(0x33));
    }
}
