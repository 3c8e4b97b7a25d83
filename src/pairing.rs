//! Pairing handshake.
//!
//! [`Pairing`] is a pure state machine: feed it each response and it yields the
//! next command to send. [`run`] drives it over a [`Session`]. Both firmware
//! generations start identically; the reply to the authenticator selects the
//! branch (a second `Challenge` for legacy locks, `AuthorizationInfo` for 5G).

use std::fmt;

use data_encoding::HEXLOWER;
use tracing::{debug, info, warn};

use crate::context::AuthorizationContext;
use crate::error::{Error, Result};
use crate::protocol::{
    AuthorizationData, AuthorizationData5G, AuthorizationId, AuthorizationIdConfirmation, AuthorizationType,
    CHALLENGE_SIZE, Command, CommandCode, KEY_SIZE, KeyPair, SecurityPin, SharedKey, random_bytes,
};
use crate::session::Session;
use crate::transport::Characteristic;

/// Authorization id used for the encrypted part of a 5G pairing, before the real one is known.
pub const PLACEHOLDER_AUTH_ID: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Init,
    AwaitingLockPublicKey,
    AwaitingChallenge,
    AwaitingBranchSignal,
    AwaitingAuthorizationId,
    AwaitingStatus,
    Authorized,
    Failed,
}

/// Firmware generation, known once the branch signal arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Legacy,
    Gen5,
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("pre-5G"),
            Self::Gen5 => f.write_str("5G"),
        }
    }
}

/// What the driver does next.
#[derive(Debug)]
pub enum Step {
    /// Send on the unencrypted pairing channel.
    Send(Command),
    /// Send encrypted with the given authorization id and key.
    SendEncrypted {
        command: Command,
        auth_id: [u8; 4],
        key: SharedKey,
    },
    /// Pairing finished; the context is ready to persist.
    Complete(AuthorizationContext),
}

/// Handshake state. Nothing in here outlives a failed pairing.
pub struct Pairing {
    state: PairingState,
    generation: Option<Generation>,
    name: String,
    app_id: [u8; 4],
    pin: Option<SecurityPin>,
    keypair: Option<KeyPair>,
    lock_public_key: Option<[u8; KEY_SIZE]>,
    shared_key: Option<SharedKey>,
    /// Legacy only: assigned id, held until the lock confirms.
    pending_auth_id: Option<[u8; 4]>,
}

impl Pairing {
    /// New handshake presenting `name` to the lock, with a random application id.
    pub fn new(name: impl Into<String>, pin: Option<SecurityPin>) -> Self {
        Self::with_app_id(name, pin, random_bytes::<4>())
    }

    pub fn with_app_id(name: impl Into<String>, pin: Option<SecurityPin>, app_id: [u8; 4]) -> Self {
        Self {
            state: PairingState::Init,
            generation: None,
            name: name.into(),
            app_id,
            pin,
            keypair: None,
            lock_public_key: None,
            shared_key: None,
            pending_auth_id: None,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// First command: ask the lock for its public key.
    pub fn start(&mut self) -> Result<Step> {
        if self.state != PairingState::Init {
            return Err(self.fail_with(Error::UnexpectedResponse {
                expected: "fresh handshake",
                received: CommandCode::RequestData,
            }));
        }
        info!("Requesting public key from lock");
        self.state = PairingState::AwaitingLockPublicKey;
        Ok(Step::Send(Command::RequestData(CommandCode::PublicKey)))
    }

    /// Mark the handshake failed and drop key material.
    pub fn fail(&mut self) {
        self.state = PairingState::Failed;
        self.keypair = None;
        self.lock_public_key = None;
        self.shared_key = None;
        self.pending_auth_id = None;
    }

    fn fail_with(&mut self, error: Error) -> Error {
        self.fail();
        error
    }

    /// Advance on a response from the lock.
    pub fn on_response(&mut self, response: Command) -> Result<Step> {
        let result = self.advance(response);
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn advance(&mut self, response: Command) -> Result<Step> {
        match (self.state, response) {
            (PairingState::AwaitingLockPublicKey, Command::PublicKey(lock_public)) => {
                info!("Received lock public key {}", HEXLOWER.encode(&lock_public));
                let keypair = KeyPair::generate();
                let client_public = keypair.public_bytes();
                self.shared_key = Some(keypair.shared_key(&lock_public));
                self.keypair = Some(keypair);
                self.lock_public_key = Some(lock_public);
                self.state = PairingState::AwaitingChallenge;
                info!("Sending client public key {}", HEXLOWER.encode(&client_public));
                Ok(Step::Send(Command::PublicKey(client_public)))
            }
            (PairingState::AwaitingChallenge, Command::Challenge(challenge)) => {
                let (client_public, lock_public, key) = self.keys()?;
                let authenticator = key.authenticator(&[&client_public[..], &lock_public, &challenge].concat())?;
                self.state = PairingState::AwaitingBranchSignal;
                debug!("Sending authenticator");
                Ok(Step::Send(Command::AuthorizationAuthenticator(authenticator)))
            }
            (PairingState::AwaitingBranchSignal, Command::Challenge(challenge)) => {
                self.generation = Some(Generation::Legacy);
                let (_, _, key) = self.keys()?;
                let mut data = AuthorizationData {
                    authenticator: [0; 32],
                    id_type: AuthorizationType::App,
                    app_id: self.app_id,
                    name: self.name.clone(),
                    nonce: random_bytes::<CHALLENGE_SIZE>(),
                };
                data.authenticator = key.authenticator(&[data.signed_bytes(), challenge.to_vec()].concat())?;
                self.state = PairingState::AwaitingAuthorizationId;
                info!("Lock uses {} pairing, sending authorization data", Generation::Legacy);
                Ok(Step::Send(Command::AuthorizationData(data)))
            }
            (PairingState::AwaitingBranchSignal, Command::AuthorizationInfo(info)) => {
                self.generation = Some(Generation::Gen5);
                if info.security_pin_set && self.pin.is_none() {
                    return Err(Error::InvalidPin("lock requires its security PIN for pairing".to_string()));
                }
                let (_, _, key) = self.keys()?;
                self.state = PairingState::AwaitingAuthorizationId;
                info!("Lock uses {} pairing, sending authorization data", Generation::Gen5);
                Ok(Step::SendEncrypted {
                    command: Command::AuthorizationData5G(AuthorizationData5G {
                        app_id: self.app_id,
                        name: self.name.clone(),
                        pin: self.pin,
                    }),
                    auth_id: PLACEHOLDER_AUTH_ID.to_le_bytes(),
                    key,
                })
            }
            (PairingState::AwaitingAuthorizationId, Command::AuthorizationId(id)) => match (self.generation, id) {
                (Some(Generation::Legacy), AuthorizationId::Legacy { auth_id, nonce, .. }) => {
                    // The lock's authenticator on this reply is accepted unchecked; the
                    // confirmation below binds the id to the nonce under the shared key.
                    debug!("Lock authenticator on AuthorizationID not verified");
                    let (_, _, key) = self.keys()?;
                    let authenticator = key.authenticator(&[&auth_id[..], &nonce].concat())?;
                    self.pending_auth_id = Some(auth_id);
                    self.state = PairingState::AwaitingStatus;
                    debug!("Received authorization id {}, confirming", u32::from_le_bytes(auth_id));
                    Ok(Step::Send(Command::AuthorizationIdConfirmation(AuthorizationIdConfirmation {
                        authenticator,
                        auth_id,
                    })))
                }
                (Some(Generation::Gen5), AuthorizationId::Gen5 { auth_id, .. }) => self.complete(auth_id),
                (generation, _) => {
                    warn!("Authorization id shape does not match {:?} pairing", generation);
                    Err(Error::UnexpectedResponse {
                        expected: "AuthorizationID matching the pairing generation",
                        received: CommandCode::AuthorizationId,
                    })
                }
            },
            (PairingState::AwaitingStatus, Command::Status(status)) => {
                debug!("Pairing status {}", status);
                let Some(auth_id) = self.pending_auth_id.take() else {
                    return Err(Error::UnexpectedResponse {
                        expected: "AuthorizationID",
                        received: CommandCode::Status,
                    });
                };
                self.complete(auth_id)
            }
            (state, response) => Err(Error::UnexpectedResponse {
                expected: expected_for(state),
                received: response.code(),
            }),
        }
    }

    fn keys(&self) -> Result<([u8; KEY_SIZE], [u8; KEY_SIZE], SharedKey)> {
        match (&self.keypair, &self.lock_public_key, &self.shared_key) {
            (Some(keypair), Some(lock_public), Some(key)) => Ok((keypair.public_bytes(), *lock_public, key.clone())),
            _ => Err(Error::crypto("pairing keys not negotiated yet")),
        }
    }

    fn complete(&mut self, auth_id: [u8; 4]) -> Result<Step> {
        let (Some(keypair), Some(lock_public_key), Some(shared_key)) =
            (self.keypair.take(), self.lock_public_key.take(), self.shared_key.take())
        else {
            return Err(Error::crypto("pairing keys not negotiated yet"));
        };
        self.state = PairingState::Authorized;
        info!("Pairing complete, authorization id {}", u32::from_le_bytes(auth_id));
        Ok(Step::Complete(AuthorizationContext {
            keypair,
            lock_public_key,
            shared_key,
            auth_id,
            app_id: self.app_id,
            device_name: None,
            device_id: None,
            pin: self.pin,
        }))
    }
}

fn expected_for(state: PairingState) -> &'static str {
    match state {
        PairingState::AwaitingLockPublicKey => "PublicKey",
        PairingState::AwaitingChallenge => "Challenge",
        PairingState::AwaitingBranchSignal => "Challenge or AuthorizationInfo",
        PairingState::AwaitingAuthorizationId => "AuthorizationID",
        PairingState::AwaitingStatus => "Status",
        PairingState::Init | PairingState::Authorized | PairingState::Failed => "no response",
    }
}

/// Run a full handshake over `session` (opened on the pairing characteristic).
pub async fn run<C: Characteristic>(session: &mut Session<C>, pairing: &mut Pairing) -> Result<AuthorizationContext> {
    let mut step = pairing.start()?;
    loop {
        let response = match step {
            Step::Send(command) => session.request(&command).await,
            Step::SendEncrypted { command, auth_id, key } => {
                session.set_encryption(auth_id, key);
                session.request(&command).await
            }
            Step::Complete(context) => return Ok(context),
        };
        step = match response {
            Ok(response) => pairing.on_response(response)?,
            Err(e) => {
                warn!("Pairing failed: {}", e);
                pairing.fail();
                return Err(e);
            }
        };
    }
}
