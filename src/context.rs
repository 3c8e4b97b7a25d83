//! Negotiated credentials for one paired lock.

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::protocol::{DeviceConfig, KEY_SIZE, KeyPair, SecurityPin, SharedKey};

/// Credential produced by pairing and loaded by every authenticated flow.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub keypair: KeyPair,
    pub lock_public_key: [u8; KEY_SIZE],
    pub shared_key: SharedKey,
    /// Assigned by the lock.
    pub auth_id: [u8; 4],
    /// Chosen by this client at pairing time.
    pub app_id: [u8; 4],
    /// Lock name, refreshed by config reads.
    pub device_name: Option<String>,
    /// Lock id, refreshed by config reads.
    pub device_id: Option<u32>,
    pub pin: Option<SecurityPin>,
}

impl AuthorizationContext {
    /// Authorization id as a number.
    pub fn auth_id_value(&self) -> u32 {
        u32::from_le_bytes(self.auth_id)
    }

    /// Cache name and id reported by a config read.
    pub fn update_from_config(&mut self, config: &DeviceConfig) {
        self.device_name = Some(config.name.clone());
        self.device_id = Some(config.device_id);
    }

    pub fn to_stored(&self) -> StoredAuthorization {
        StoredAuthorization {
            cli_public_key: HEXLOWER.encode(&self.keypair.public_bytes()),
            cli_private_key: HEXLOWER.encode(&self.keypair.secret_bytes()),
            sl_public_key: HEXLOWER.encode(&self.lock_public_key),
            shared_key: HEXLOWER.encode(self.shared_key.as_bytes()),
            auth_id: HEXLOWER.encode(&self.auth_id),
            app_id: HEXLOWER.encode(&self.app_id),
            name: self.device_name.clone(),
            nuki_id: self.device_id.map(|id| format!("{id:X}")),
            pin: self.pin.map(|pin| pin.to_string()),
        }
    }

    pub fn from_stored(stored: &StoredAuthorization) -> Result<Self, ConfigError> {
        let secret: [u8; KEY_SIZE] = decode_hex("cli_private_key", &stored.cli_private_key)?;
        let keypair = KeyPair::from_secret_bytes(secret);
        let public: [u8; KEY_SIZE] = decode_hex("cli_public_key", &stored.cli_public_key)?;
        if public != keypair.public_bytes() {
            return Err(ConfigError::Validation(
                "cli_public_key does not match cli_private_key".to_string(),
            ));
        }

        let device_id = stored
            .nuki_id
            .as_deref()
            .map(|id| u32::from_str_radix(id, 16))
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("nuki_id: {e}")))?;
        let pin = stored
            .pin
            .as_deref()
            .map(SecurityPin::parse)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("pin: {e}")))?;

        Ok(Self {
            keypair,
            lock_public_key: decode_hex("sl_public_key", &stored.sl_public_key)?,
            shared_key: SharedKey::from_bytes(decode_hex("shared_key", &stored.shared_key)?),
            auth_id: decode_hex("auth_id", &stored.auth_id)?,
            app_id: decode_hex("app_id", &stored.app_id)?,
            device_name: stored.name.clone(),
            device_id,
            pin,
        })
    }
}

/// TOML form of [`AuthorizationContext`]; keys are hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuthorization {
    pub cli_public_key: String,
    pub cli_private_key: String,
    pub sl_public_key: String,
    pub shared_key: String,
    pub auth_id: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Device id in uppercase hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nuki_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

fn decode_hex<const N: usize>(field: &str, value: &str) -> Result<[u8; N], ConfigError> {
    let bytes = HEXLOWER_PERMISSIVE
        .decode(value.as_bytes())
        .map_err(|e| ConfigError::Validation(format!("{field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ConfigError::Validation(format!("{field}: expected {N} bytes, got {}", b.len())))
}
