//! User-facing operations.
//!
//! The free functions run one protocol script over an already-open encrypted
//! [`Session`]. [`Flow`] adds the surrounding scan, connect, credential lookup
//! and disconnect, one connection per operation.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::AuthorizationContext;
use crate::error::{Error, Result};
use crate::pairing::{self, Pairing};
use crate::protocol::{
    CHALLENGE_SIZE, Command, CommandCode, DeviceConfig, DeviceTime, EnableLogging, KeyturnerStates, LockAction,
    LockActionKind, LogEntry, LogSortOrder, RequestLogEntries, SecuredRequest, SecurityPin, StatusCode, UpdateTime,
};
use crate::session::{self, Interrupted, Session};
use crate::store::CredentialStore;
use crate::transport::{Characteristic, Link, Transport};

fn is_complete(command: &Command) -> bool {
    matches!(command, Command::Status(StatusCode::Complete))
}

/// Encrypted `RequestData(code)`, single reply.
pub async fn request_data<C: Characteristic>(session: &Session<C>, code: CommandCode) -> Result<Command> {
    session.request(&Command::RequestData(code)).await
}

/// Fetch a fresh nonce for a secured command.
pub async fn challenge<C: Characteristic>(session: &Session<C>) -> Result<[u8; CHALLENGE_SIZE]> {
    match request_data(session, CommandCode::Challenge).await? {
        Command::Challenge(nonce) => Ok(nonce),
        other => Err(Error::UnexpectedResponse {
            expected: "Challenge",
            received: other.code(),
        }),
    }
}

pub async fn get_status<C: Characteristic>(session: &Session<C>) -> Result<KeyturnerStates> {
    match request_data(session, CommandCode::KeyturnerStates).await? {
        Command::KeyturnerStates(states) => Ok(states),
        other => Err(Error::UnexpectedResponse {
            expected: "KeyturnerStates",
            received: other.code(),
        }),
    }
}

pub async fn get_config<C: Characteristic>(session: &Session<C>) -> Result<DeviceConfig> {
    let nonce = challenge(session).await?;
    match session.request(&Command::RequestConfig(nonce)).await? {
        Command::Config(config) => Ok(config),
        other => Err(Error::UnexpectedResponse {
            expected: "Config",
            received: other.code(),
        }),
    }
}

/// Send a command and wait through intermediate frames until `Status(Complete)`.
async fn until_complete<C: Characteristic>(session: &Session<C>, command: &Command) -> Result<()> {
    let frames = session
        .request_stream(command, is_complete)
        .await
        .map_err(|interrupted| interrupted.error)?;
    for frame in &frames[..frames.len().saturating_sub(1)] {
        match frame {
            Command::Status(status) => info!("{}: {}", command.name(), status),
            other => debug!("Intermediate {} during {}", other.name(), command.name()),
        }
    }
    Ok(())
}

/// Move the bolt. Returns once the lock reports completion.
pub async fn perform_lock_action<C: Characteristic>(
    session: &Session<C>,
    context: &AuthorizationContext,
    action: LockActionKind,
    name_suffix: Option<String>,
) -> Result<()> {
    let nonce = challenge(session).await?;
    let command = Command::LockAction(LockAction {
        action,
        app_id: context.app_id,
        flags: 0,
        name_suffix,
        nonce,
    });
    until_complete(session, &command).await?;
    info!("{} complete", action);
    Ok(())
}

/// Unlock when locked, otherwise lock. Returns the action performed.
pub async fn toggle<C: Characteristic>(session: &Session<C>, context: &AuthorizationContext) -> Result<LockActionKind> {
    let states = get_status(session).await?;
    let action = if states.is_locked() {
        LockActionKind::Unlock
    } else {
        LockActionKind::Lock
    };
    debug!("Lock state is {}, toggling with {}", states.lock_state, action);
    perform_lock_action(session, context, action, None).await?;
    Ok(action)
}

/// Read `count` log entries starting at `start_index`, newest first.
pub async fn get_logs<C: Characteristic>(
    session: &Session<C>,
    context: &AuthorizationContext,
    start_index: u32,
    count: u16,
) -> Result<Vec<LogEntry>> {
    let nonce = challenge(session).await?;
    let command = Command::RequestLogEntries(RequestLogEntries {
        start_index,
        count,
        sort_order: LogSortOrder::Descending,
        total_count: false,
        nonce,
        pin: context.pin,
    });

    match session.request_stream(&command, is_complete).await {
        Ok(frames) => Ok(collect_entries(frames)),
        Err(Interrupted { received, error }) => {
            let received = collect_entries(received);
            if received.is_empty() {
                return Err(error);
            }
            warn!("Log retrieval interrupted after {} entries: {}", received.len(), error);
            Err(Error::LogStreamInterrupted {
                received,
                source: Box::new(error),
            })
        }
    }
}

fn collect_entries(frames: Vec<Command>) -> Vec<LogEntry> {
    frames
        .into_iter()
        .filter_map(|frame| match frame {
            Command::LogEntry(entry) => Some(entry),
            _ => None,
        })
        .collect()
}

fn secured(nonce: [u8; CHALLENGE_SIZE], pin: Option<SecurityPin>) -> SecuredRequest {
    SecuredRequest { nonce, pin }
}

pub async fn calibrate<C: Characteristic>(session: &Session<C>, context: &AuthorizationContext) -> Result<()> {
    let nonce = challenge(session).await?;
    until_complete(session, &Command::RequestCalibration(secured(nonce, context.pin))).await
}

pub async fn reboot<C: Characteristic>(session: &Session<C>, context: &AuthorizationContext) -> Result<()> {
    let nonce = challenge(session).await?;
    until_complete(session, &Command::RequestReboot(secured(nonce, context.pin))).await
}

/// Check the stored PIN against the lock.
pub async fn verify_pin<C: Characteristic>(session: &Session<C>, context: &AuthorizationContext) -> Result<()> {
    let nonce = challenge(session).await?;
    until_complete(session, &Command::VerifySecurityPin(secured(nonce, context.pin))).await
}

/// Set the lock clock to `time` (UTC).
pub async fn update_time<C: Characteristic>(
    session: &Session<C>,
    context: &AuthorizationContext,
    time: DeviceTime,
) -> Result<()> {
    let nonce = challenge(session).await?;
    let command = Command::UpdateTime(UpdateTime {
        time,
        nonce,
        pin: context.pin,
    });
    until_complete(session, &command).await
}

pub async fn enable_logging<C: Characteristic>(
    session: &Session<C>,
    context: &AuthorizationContext,
    enabled: bool,
) -> Result<()> {
    let nonce = challenge(session).await?;
    let command = Command::EnableLogging(EnableLogging {
        enabled,
        nonce,
        pin: context.pin,
    });
    until_complete(session, &command).await
}

/// An authenticated connection to one lock.
pub struct Connection<L: Link> {
    link: L,
    pub session: Session<L::Characteristic>,
    pub context: AuthorizationContext,
}

impl<L: Link> Connection<L> {
    /// Disconnect, logging instead of failing.
    pub async fn close(self) {
        if let Err(e) = self.link.disconnect().await {
            warn!("Error disconnecting: {}", e);
        }
    }
}

/// Connection management around the protocol scripts.
pub struct Flow<'a, T: Transport, S: CredentialStore> {
    transport: &'a T,
    store: &'a S,
    scan_timeout: Duration,
    request_timeout: Duration,
}

impl<'a, T, S> Flow<'a, T, S>
where
    T: Transport + Sync,
    T::Link: Sync,
    S: CredentialStore,
{
    pub fn new(transport: &'a T, store: &'a S) -> Self {
        Self {
            transport,
            store,
            scan_timeout: Duration::from_secs(10),
            request_timeout: session::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn connect(&self, device_id: &str) -> Result<T::Link> {
        self.transport.scan_for_device(device_id, self.scan_timeout).await?;
        self.transport.connect(device_id).await
    }

    /// Pair with `device_id` and persist the resulting credential.
    pub async fn authorize(&self, device_id: &str, name: &str, pin: Option<SecurityPin>) -> Result<AuthorizationContext> {
        let link = self.connect(device_id).await?;
        let result = async {
            let characteristic = link.discover_pairing().await?;
            let mut session = Session::open(characteristic).await?.with_timeout(self.request_timeout);
            let mut handshake = Pairing::new(name, pin);
            pairing::run(&mut session, &mut handshake).await
        }
        .await;

        if let Err(e) = link.disconnect().await {
            warn!("Error disconnecting: {}", e);
        }
        let context = result?;
        self.store.store_context(device_id, &context)?;
        info!("Stored authorization for {}", device_id);
        Ok(context)
    }

    /// Connect using the stored credential for `device_id`.
    pub async fn open(&self, device_id: &str) -> Result<Connection<T::Link>> {
        let context = self.store.require_context(device_id)?;
        let link = self.connect(device_id).await?;
        let session = async {
            let characteristic = link.discover_usdio().await?;
            Session::open_encrypted(characteristic, context.auth_id, context.shared_key.clone()).await
        }
        .await;

        match session {
            Ok(session) => Ok(Connection {
                link,
                session: session.with_timeout(self.request_timeout),
                context,
            }),
            Err(e) => {
                if let Err(disconnect) = link.disconnect().await {
                    warn!("Error disconnecting: {}", disconnect);
                }
                Err(e)
            }
        }
    }

    pub async fn get_status(&self, device_id: &str) -> Result<KeyturnerStates> {
        let connection = self.open(device_id).await?;
        let result = get_status(&connection.session).await;
        connection.close().await;
        result
    }

    /// Read the config and cache the reported name and id in the stored credential.
    pub async fn get_config(&self, device_id: &str) -> Result<DeviceConfig> {
        let mut connection = self.open(device_id).await?;
        let result = get_config(&connection.session).await;
        if let Ok(config) = &result {
            connection.context.update_from_config(config);
        }
        let context = connection.context.clone();
        connection.close().await;

        let config = result?;
        self.store.store_context(device_id, &context)?;
        Ok(config)
    }

    pub async fn perform_lock_action(
        &self,
        device_id: &str,
        action: LockActionKind,
        name_suffix: Option<String>,
    ) -> Result<()> {
        let connection = self.open(device_id).await?;
        let result = perform_lock_action(&connection.session, &connection.context, action, name_suffix).await;
        connection.close().await;
        result
    }

    pub async fn toggle(&self, device_id: &str) -> Result<LockActionKind> {
        let connection = self.open(device_id).await?;
        let result = toggle(&connection.session, &connection.context).await;
        connection.close().await;
        result
    }

    pub async fn get_logs(&self, device_id: &str, start_index: u32, count: u16) -> Result<Vec<LogEntry>> {
        let connection = self.open(device_id).await?;
        let result = get_logs(&connection.session, &connection.context, start_index, count).await;
        connection.close().await;
        result
    }
}
