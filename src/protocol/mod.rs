//! Keyturner BLE protocol: command codec, framing and crypto.
//!
//! Everything here is pure and synchronous. The async exchange lives in
//! [`crate::session`].

mod checksum;
mod codes;
mod commands;
mod crypto;
mod device_config;
mod errors;
mod frame;
mod log_entry;
mod pin;
mod states;
mod types;


pub use checksum::crc16;
pub use codes::CommandCode;
pub use commands::{
    AuthorizationData, AuthorizationData5G, AuthorizationId, AuthorizationIdConfirmation, AuthorizationInfo, Command,
    EnableLogging, LockAction, NAME_SUFFIX_SIZE, RequestLogEntries, SecuredRequest, UpdateTime,
};
pub use crypto::{AUTHENTICATOR_SIZE, KEY_SIZE, KeyPair, NONCE_SIZE, SharedKey, TAG_SIZE, random_bytes};
pub use device_config::{DeviceConfig, timezone_name};
pub use errors::{ErrorReport, error_name};
pub use frame::{
    ENCRYPTED_HEADER_SIZE, MIN_FRAME_SIZE, build_encrypted, build_unencrypted, encrypted_auth_id, parse_encrypted,
    parse_unencrypted,
};
pub use log_entry::LogEntry;
pub use pin::SecurityPin;
pub use states::{
    AccessoryStatus, BatteryState, ConnectionStrength, KeyturnerStates, MqttConnectionStatus, MqttStatus, MqttUplink,
    RemoteAccessStatus, SseStatus, ThreadConnectionStatus, ThreadStatus, WifiConnectionStatus, WifiStatus,
};
pub use types::{
    AuthorizationType, CHALLENGE_SIZE, DeviceState, DeviceTime, DoorSensorState, LockActionKind, LockState,
    LogEntryType, LogSortOrder, NAME_SIZE, StatusCode, Trigger,
};

pub(crate) use frame::encode_encrypted;
pub(crate) use frame::encode_unencrypted;
