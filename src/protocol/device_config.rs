//! Device configuration payload (`Config`, 0x0015).

use super::codes::CommandCode;
use super::types::{name_from_field, u16_at, u32_at, DeviceTime, NAME_SIZE};
use crate::error::{Error, Result};

/// Device configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub device_id: u32,
    pub name: String,
    pub latitude: f32,
    pub longitude: f32,
    pub auto_unlatch: bool,
    pub pairing_enabled: bool,
    pub button_enabled: bool,
    pub led_enabled: bool,
    pub led_brightness: u8,
    pub current_time: DeviceTime,
    /// Offset to UTC in minutes.
    pub timezone_offset: i16,
    pub dst_mode: u8,
    pub has_fob: bool,
    pub fob_actions: [u8; 3],
    pub single_lock: bool,
    pub advertising_mode: u8,
    pub has_keypad: bool,
    pub firmware_version: [u8; 3],
    pub hardware_revision: [u8; 2],
    pub homekit_status: u8,
    pub timezone_id: u16,
    pub device_type: u8,
    pub capabilities: u8,
    /// Only sent by newer firmware.
    pub has_keypad_v2: Option<bool>,
    /// Only sent by newer firmware.
    pub matter_status: Option<u8>,
}

impl DeviceConfig {
    /// Payload length up to and including the capabilities byte.
    pub const MIN_SIZE: usize = 76;

    pub(crate) fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < Self::MIN_SIZE {
            return Err(Error::PayloadTooShort {
                command: CommandCode::Config,
                minimum: Self::MIN_SIZE,
                actual: b.len(),
            });
        }

        Ok(Self {
            device_id: u32_at(b, 0),
            name: name_from_field(&b[4..4 + NAME_SIZE]),
            latitude: f32::from_bits(u32_at(b, 36)),
            longitude: f32::from_bits(u32_at(b, 40)),
            auto_unlatch: b[44] != 0,
            pairing_enabled: b[45] != 0,
            button_enabled: b[46] != 0,
            led_enabled: b[47] != 0,
            led_brightness: b[48],
            current_time: DeviceTime::read(&b[49..56]),
            timezone_offset: u16_at(b, 56) as i16,
            dst_mode: b[58],
            has_fob: b[59] != 0,
            fob_actions: [b[60], b[61], b[62]],
            single_lock: b[63] != 0,
            advertising_mode: b[64],
            has_keypad: b[65] != 0,
            firmware_version: [b[66], b[67], b[68]],
            hardware_revision: [b[69], b[70]],
            homekit_status: b[71],
            timezone_id: u16_at(b, 72),
            device_type: b[74],
            capabilities: b[75],
            has_keypad_v2: b.get(76).map(|&v| v != 0),
            matter_status: b.get(77).copied(),
        })
    }

    /// Device id as shown on the lock label (uppercase hex).
    pub fn device_id_hex(&self) -> String {
        format!("{:X}", self.device_id)
    }

    pub fn firmware_string(&self) -> String {
        let [major, minor, patch] = self.firmware_version;
        format!("{major}.{minor}.{patch}")
    }

    pub fn hardware_string(&self) -> String {
        let [major, minor] = self.hardware_revision;
        format!("{major}.{minor}")
    }

    /// IANA zone name for the configured timezone id, if listed.
    pub fn timezone_name(&self) -> Option<&'static str> {
        timezone_name(self.timezone_id)
    }
}

/// Map the device's timezone id to an IANA zone name. Id 0xFFFF means "no timezone".
pub fn timezone_name(id: u16) -> Option<&'static str> {
    const ZONES: [&str; 46] = [
        "Africa/Cairo",
        "Africa/Lagos",
        "Africa/Maputo",
        "Africa/Nairobi",
        "America/Anchorage",
        "America/Argentina/Buenos_Aires",
        "America/Chicago",
        "America/Denver",
        "America/Halifax",
        "America/Los_Angeles",
        "America/Manaus",
        "America/Mexico_City",
        "America/New_York",
        "America/Phoenix",
        "America/Regina",
        "America/Santiago",
        "America/Sao_Paulo",
        "America/St_Johns",
        "Asia/Bangkok",
        "Asia/Dubai",
        "Asia/Hong_Kong",
        "Asia/Jerusalem",
        "Asia/Karachi",
        "Asia/Kathmandu",
        "Asia/Kolkata",
        "Asia/Riyadh",
        "Asia/Seoul",
        "Asia/Shanghai",
        "Asia/Tehran",
        "Asia/Tokyo",
        "Asia/Yangon",
        "Australia/Adelaide",
        "Australia/Brisbane",
        "Australia/Darwin",
        "Australia/Hobart",
        "Australia/Perth",
        "Australia/Sydney",
        "Europe/Berlin",
        "Europe/Helsinki",
        "Europe/Istanbul",
        "Europe/London",
        "Europe/Moscow",
        "Pacific/Auckland",
        "Pacific/Guam",
        "Pacific/Honolulu",
        "Pacific/Pago_Pago",
    ];
    ZONES.get(id as usize).copied()
}
