//! Credential persistence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::config::AppConfig;
use crate::context::AuthorizationContext;
use crate::error::{Error, Result};

/// Where authorization contexts live between runs.
pub trait CredentialStore {
    fn load_context(&self, device_id: &str) -> Result<Option<AuthorizationContext>>;
    fn store_context(&self, device_id: &str, context: &AuthorizationContext) -> Result<()>;

    /// Like [`load_context`](Self::load_context), but a missing entry is [`Error::NotAuthorized`].
    fn require_context(&self, device_id: &str) -> Result<AuthorizationContext> {
        self.load_context(device_id)?
            .ok_or_else(|| Error::NotAuthorized(device_id.to_string()))
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contexts: Mutex<HashMap<String, AuthorizationContext>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn load_context(&self, device_id: &str) -> Result<Option<AuthorizationContext>> {
        let contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(contexts.get(device_id).cloned())
    }

    fn store_context(&self, device_id: &str, context: &AuthorizationContext) -> Result<()> {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        contexts.insert(device_id.to_string(), context.clone());
        Ok(())
    }
}

/// Store backed by the `[authorizations]` table of the config file. Every store is written to disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    config: Mutex<AppConfig>,
}

impl FileStore {
    pub fn new(path: PathBuf, config: AppConfig) -> Self {
        Self {
            path,
            config: Mutex::new(config),
        }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Result<AppConfig> {
        Ok(self.lock().clone())
    }

    /// Persist `device_id` as the active device.
    pub fn set_active_device(&self, device_id: &str) -> Result<()> {
        self.update(|config| config.active_device = Some(device_id.to_string()))?;
        info!("Active device set to {}", device_id);
        Ok(())
    }

    /// Apply `change` to a copy, write it, and only then replace the in-memory config.
    fn update(&self, change: impl FnOnce(&mut AppConfig)) -> Result<()> {
        let mut config = self.lock();
        let mut updated = config.clone();
        change(&mut updated);
        updated.save(&self.path)?;
        *config = updated;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, AppConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for FileStore {
    fn load_context(&self, device_id: &str) -> Result<Option<AuthorizationContext>> {
        let config = self.lock();
        config
            .authorizations
            .get(device_id)
            .map(|stored| AuthorizationContext::from_stored(stored).map_err(Error::from))
            .transpose()
    }

    fn store_context(&self, device_id: &str, context: &AuthorizationContext) -> Result<()> {
        self.update(|config| {
            config
                .authorizations
                .insert(device_id.to_string(), context.to_stored());
        })
    }
}
