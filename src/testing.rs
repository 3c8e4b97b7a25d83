//! In-memory lock for exercising sessions, pairing and flows without hardware.
//!
//! [`FakeLock`] implements the transport traits and answers frames the way a
//! real lock does: both pairing generations, encrypted requests with nonce and
//! PIN checks, multi-frame lock actions and log streams.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use crate::context::AuthorizationContext;
use crate::error::{Error, Result};
use crate::pairing::{Generation, PLACEHOLDER_AUTH_ID};
use crate::protocol::{
    self, AuthorizationId, AuthorizationInfo, CHALLENGE_SIZE, Command, CommandCode, DeviceTime, ErrorReport, KeyPair,
    LockActionKind, LogEntry, LogEntryType, NONCE_SIZE, SecurityPin, SharedKey, StatusCode, random_bytes,
};
use crate::transport::{
    Characteristic, KEYTURNER_SERVICE, KEYTURNER_USDIO, Link, NotificationHandler, PAIRING_GDIO, PAIRING_SERVICE,
    PAIRING_SERVICE_ULTRA, Transport,
};

pub(crate) const ADDRESS: &str = "54:D2:72:AA:BB:CC";
pub(crate) const APP_ID: [u8; 4] = [0x27, 0xED, 0x7E, 0x18];

const UUID: [u8; 16] = [0xAB; 16];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Pairing,
    Usdio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairingStep {
    Idle,
    SentPublicKey,
    SentChallenge,
    SentBranchSignal,
    SentAuthorizationId,
    Done,
}

/// Lock-side state. Tests tweak the public fields to script behaviour.
pub(crate) struct LockSim {
    pub generation: Generation,
    /// Only advertise the Ultra pairing service.
    pub ultra: bool,
    pub keypair: KeyPair,
    pub pin: Option<SecurityPin>,
    pub assigned_auth_id: [u8; 4],
    /// Raw `KeyturnerStates` payload.
    pub status: Vec<u8>,
    /// Raw `Config` payload.
    pub config: Vec<u8>,
    /// Newest first.
    pub logs: Vec<LogEntry>,
    /// Send this many log entries, then an error report.
    pub log_error_after: Option<usize>,
    /// Answer lock actions with this error code.
    pub lock_error: Option<u8>,
    /// Push a status snapshot between `Accepted` and `Complete`.
    pub states_during_action: bool,
    /// Never answer.
    pub silent: bool,
    /// Drop the link on the next write.
    pub disconnect_on_write: bool,
    /// Every command decoded from the client, in order.
    pub received: Vec<Command>,
    pub disconnects: usize,
    step: PairingStep,
    client_public: Option<[u8; 32]>,
    pairing_key: Option<SharedKey>,
    challenge: Option<[u8; CHALLENGE_SIZE]>,
    confirm_nonce: Option<[u8; CHALLENGE_SIZE]>,
    authorized: Option<([u8; 4], SharedKey)>,
    issued_nonce: Option<[u8; CHALLENGE_SIZE]>,
    handler: Option<NotificationHandler>,
}

impl LockSim {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            ultra: false,
            keypair: KeyPair::generate(),
            pin: None,
            assigned_auth_id: [0x03, 0x00, 0x00, 0x00],
            status: sample_status(),
            config: sample_config(),
            logs: sample_logs(),
            log_error_after: None,
            lock_error: None,
            states_during_action: false,
            silent: false,
            disconnect_on_write: false,
            received: Vec::new(),
            disconnects: 0,
            step: PairingStep::Idle,
            client_public: None,
            pairing_key: None,
            challenge: None,
            confirm_nonce: None,
            authorized: None,
            issued_nonce: None,
            handler: None,
        }
    }

    fn process(&mut self, channel: Channel, frame: &[u8]) -> Vec<Vec<u8>> {
        match channel {
            Channel::Pairing => self.on_pairing(frame),
            Channel::Usdio => self.on_usdio(frame),
        }
    }

    fn plain(command: Command) -> Vec<u8> {
        protocol::build_unencrypted(&command)
    }

    fn plain_error(code: u8, command: CommandCode) -> Vec<u8> {
        Self::plain(Command::ErrorReport(ErrorReport::new(code, command)))
    }

    fn sealed(auth_id: &[u8; 4], key: &SharedKey, command: Command) -> Vec<u8> {
        protocol::build_encrypted(&command, auth_id, key, &random_bytes::<NONCE_SIZE>()).expect("seal reply")
    }

    fn on_pairing(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        if self.step == PairingStep::SentBranchSignal && self.generation == Generation::Gen5 {
            return self.on_authorization_data_5g(frame);
        }

        let command = match protocol::parse_unencrypted(frame) {
            Ok(command) => command,
            Err(_) => return vec![Self::plain_error(0xFD, CommandCode::ErrorReport)],
        };
        self.received.push(command.clone());

        match (self.step, command) {
            (PairingStep::Idle, Command::RequestData(CommandCode::PublicKey)) => {
                self.step = PairingStep::SentPublicKey;
                vec![Self::plain(Command::PublicKey(self.keypair.public_bytes()))]
            }
            (PairingStep::SentPublicKey, Command::PublicKey(client_public)) => {
                self.client_public = Some(client_public);
                self.pairing_key = Some(self.keypair.shared_key(&client_public));
                let challenge = random_bytes::<CHALLENGE_SIZE>();
                self.challenge = Some(challenge);
                self.step = PairingStep::SentChallenge;
                vec![Self::plain(Command::Challenge(challenge))]
            }
            (PairingStep::SentChallenge, Command::AuthorizationAuthenticator(authenticator)) => {
                let (Some(client_public), Some(key), Some(challenge)) =
                    (self.client_public, self.pairing_key.clone(), self.challenge)
                else {
                    return vec![Self::plain_error(0x10, CommandCode::AuthorizationAuthenticator)];
                };
                let signed = [&client_public[..], &self.keypair.public_bytes(), &challenge].concat();
                if !key.verify_authenticator(&signed, &authenticator) {
                    return vec![Self::plain_error(0x11, CommandCode::AuthorizationAuthenticator)];
                }
                self.step = PairingStep::SentBranchSignal;
                match self.generation {
                    Generation::Legacy => {
                        let challenge = random_bytes::<CHALLENGE_SIZE>();
                        self.challenge = Some(challenge);
                        vec![Self::plain(Command::Challenge(challenge))]
                    }
                    Generation::Gen5 => vec![Self::plain(Command::AuthorizationInfo(AuthorizationInfo {
                        security_pin_set: self.pin.is_some(),
                    }))],
                }
            }
            (PairingStep::SentBranchSignal, Command::AuthorizationData(data)) => {
                let (Some(key), Some(challenge)) = (self.pairing_key.clone(), self.challenge) else {
                    return vec![Self::plain_error(0x10, CommandCode::AuthorizationData)];
                };
                if !key.verify_authenticator(&[data.signed_bytes(), challenge.to_vec()].concat(), &data.authenticator) {
                    return vec![Self::plain_error(0x11, CommandCode::AuthorizationData)];
                }
                let nonce = random_bytes::<CHALLENGE_SIZE>();
                self.confirm_nonce = Some(nonce);
                self.step = PairingStep::SentAuthorizationId;
                let auth_id = self.assigned_auth_id;
                let authenticator = key
                    .authenticator(&[&auth_id[..], &UUID, &nonce].concat())
                    .expect("hmac");
                vec![Self::plain(Command::AuthorizationId(AuthorizationId::Legacy {
                    authenticator,
                    auth_id,
                    uuid: UUID,
                    nonce,
                }))]
            }
            (PairingStep::SentAuthorizationId, Command::AuthorizationIdConfirmation(confirmation)) => {
                let (Some(key), Some(nonce)) = (self.pairing_key.clone(), self.confirm_nonce) else {
                    return vec![Self::plain_error(0x10, CommandCode::AuthorizationIdConfirmation)];
                };
                let signed = [&confirmation.auth_id[..], &nonce].concat();
                if confirmation.auth_id != self.assigned_auth_id
                    || !key.verify_authenticator(&signed, &confirmation.authenticator)
                {
                    return vec![Self::plain_error(0x11, CommandCode::AuthorizationIdConfirmation)];
                }
                self.authorized = Some((self.assigned_auth_id, key));
                self.step = PairingStep::Done;
                vec![Self::plain(Command::Status(StatusCode::Complete))]
            }
            (_, other) => vec![Self::plain_error(0x10, other.code())],
        }
    }

    fn on_authorization_data_5g(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        let placeholder = PLACEHOLDER_AUTH_ID.to_le_bytes();
        let Some(key) = self.pairing_key.clone() else {
            return vec![Self::plain_error(0x10, CommandCode::AuthorizationData)];
        };
        let data = match protocol::parse_encrypted(frame, &placeholder, &key) {
            Ok(Command::AuthorizationData5G(data)) => data,
            Ok(other) => {
                self.received.push(other);
                return vec![Self::plain_error(0x12, CommandCode::AuthorizationData)];
            }
            Err(_) => return vec![Self::plain_error(0xFD, CommandCode::AuthorizationData)],
        };
        self.received.push(Command::AuthorizationData5G(data.clone()));

        if self.pin.is_some() && data.pin != self.pin {
            return vec![Self::sealed(
                &placeholder,
                &key,
                Command::ErrorReport(ErrorReport::new(0x21, CommandCode::AuthorizationData)),
            )];
        }
        self.authorized = Some((self.assigned_auth_id, key.clone()));
        self.step = PairingStep::Done;
        vec![Self::sealed(
            &placeholder,
            &key,
            Command::AuthorizationId(AuthorizationId::Gen5 {
                auth_id: self.assigned_auth_id,
                uuid: UUID,
            }),
        )]
    }

    /// Consume the issued nonce and compare PINs. Returns the error code to report.
    fn check(&mut self, nonce: [u8; CHALLENGE_SIZE], pin: Option<SecurityPin>) -> Option<u8> {
        if self.issued_nonce.take() != Some(nonce) {
            return Some(0x22);
        }
        if self.pin.is_some() && pin != self.pin {
            return Some(0x21);
        }
        None
    }

    fn on_usdio(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        let Some((auth_id, key)) = self.authorized.clone() else {
            return vec![Self::plain_error(0x20, CommandCode::RequestData)];
        };
        let seal = |command: Command| Self::sealed(&auth_id, &key, command);
        let raw = |code: CommandCode, payload: &[u8]| {
            protocol::encode_encrypted(code, payload, &auth_id, &key, &random_bytes::<NONCE_SIZE>()).expect("seal reply")
        };
        let error = |code: u8, command: CommandCode| seal(Command::ErrorReport(ErrorReport::new(code, command)));

        let command = match protocol::parse_encrypted(frame, &auth_id, &key) {
            Ok(command) => command,
            Err(_) => return vec![error(0xFD, CommandCode::ErrorReport)],
        };
        self.received.push(command.clone());

        let code = command.code();

        match command {
            Command::RequestData(CommandCode::Challenge) => {
                let nonce = random_bytes::<CHALLENGE_SIZE>();
                self.issued_nonce = Some(nonce);
                vec![seal(Command::Challenge(nonce))]
            }
            Command::RequestData(CommandCode::KeyturnerStates) => {
                vec![raw(CommandCode::KeyturnerStates, &self.status)]
            }
            Command::RequestConfig(nonce) => match self.check(nonce, self.pin) {
                Some(failure) => vec![error(failure, code)],
                None => vec![raw(CommandCode::Config, &self.config)],
            },
            Command::LockAction(action) => {
                if let Some(failure) = self.check(action.nonce, self.pin) {
                    return vec![error(failure, code)];
                }
                if let Some(failure) = self.lock_error {
                    return vec![seal(Command::Status(StatusCode::Accepted)), error(failure, code)];
                }
                self.status[1] = match action.action {
                    LockActionKind::Unlock | LockActionKind::Unlatch => 0x03,
                    _ => 0x01,
                };
                let mut frames = vec![seal(Command::Status(StatusCode::Accepted))];
                if self.states_during_action {
                    frames.push(raw(CommandCode::KeyturnerStates, &self.status));
                }
                frames.push(seal(Command::Status(StatusCode::Complete)));
                frames
            }
            Command::RequestLogEntries(request) => {
                if let Some(failure) = self.check(request.nonce, request.pin) {
                    return vec![error(failure, code)];
                }
                let entries: Vec<_> = self
                    .logs
                    .iter()
                    .skip(request.start_index as usize)
                    .take(request.count as usize)
                    .cloned()
                    .collect();
                let mut frames = Vec::new();
                match self.log_error_after {
                    Some(limit) => {
                        frames.extend(entries.into_iter().take(limit).map(|e| seal(Command::LogEntry(e))));
                        frames.push(error(0x45, code));
                    }
                    None => {
                        frames.extend(entries.into_iter().map(|e| seal(Command::LogEntry(e))));
                        frames.push(seal(Command::Status(StatusCode::Complete)));
                    }
                }
                frames
            }
            Command::RequestCalibration(request) | Command::RequestReboot(request) => {
                match self.check(request.nonce, request.pin) {
                    Some(failure) => vec![error(failure, code)],
                    None => vec![
                        seal(Command::Status(StatusCode::Accepted)),
                        seal(Command::Status(StatusCode::Complete)),
                    ],
                }
            }
            Command::VerifySecurityPin(request) => match self.check(request.nonce, request.pin) {
                Some(failure) => vec![error(failure, code)],
                None => vec![seal(Command::Status(StatusCode::Complete))],
            },
            Command::UpdateTime(update) => match self.check(update.nonce, update.pin) {
                Some(failure) => vec![error(failure, code)],
                None => {
                    self.status[3..10].copy_from_slice(&update.time.to_bytes());
                    vec![seal(Command::Status(StatusCode::Complete))]
                }
            },
            Command::EnableLogging(request) => match self.check(request.nonce, request.pin) {
                Some(failure) => vec![error(failure, code)],
                None => vec![seal(Command::Status(StatusCode::Complete))],
            },
            _ => vec![error(0x23, code)],
        }
    }
}

/// Door mode, locked, charging at 24%.
pub(crate) fn sample_status() -> Vec<u8> {
    let mut b = vec![0u8; 27];
    b[0] = 0x02;
    b[1] = 0x01;
    b[3..10].copy_from_slice(&[0xE9, 0x07, 3, 14, 9, 26, 53]);
    b[10..12].copy_from_slice(&60i16.to_le_bytes());
    b[12] = 0b0011_0010;
    b[15] = 0x02;
    b[16] = 0x01;
    b[18] = 0x02;
    b
}

pub(crate) fn sample_config() -> Vec<u8> {
    let mut b = vec![0u8; 78];
    b[0..4].copy_from_slice(&0x2ABC_DEF0u32.to_le_bytes());
    b[4..14].copy_from_slice(b"Front Door");
    b[45] = 1;
    b[46] = 1;
    b[49..56].copy_from_slice(&[0xE9, 0x07, 3, 14, 9, 26, 53]);
    b[66..69].copy_from_slice(&[4, 2, 7]);
    b[69..71].copy_from_slice(&[1, 3]);
    b[72..74].copy_from_slice(&37u16.to_le_bytes());
    b[74] = 4;
    b
}

pub(crate) fn sample_logs() -> Vec<LogEntry> {
    (1..=3u32)
        .rev()
        .map(|index| LogEntry {
            index,
            time: DeviceTime {
                year: 2025,
                month: 3,
                day: 14,
                hour: 9,
                minute: index as u8,
                second: 0,
            },
            auth_id: 3,
            auth_name: "keyturner cli".to_string(),
            entry_type: LogEntryType::LockAction,
            data: vec![0x01, 0x00, 0x00, 0x00],
        })
        .collect()
}

fn lock(sim: &Mutex<LockSim>) -> MutexGuard<'_, LockSim> {
    sim.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle on a simulated lock. Clones share state.
#[derive(Clone)]
pub(crate) struct FakeLock {
    sim: Arc<Mutex<LockSim>>,
}

impl FakeLock {
    pub fn new(generation: Generation) -> Self {
        Self {
            sim: Arc::new(Mutex::new(LockSim::new(generation))),
        }
    }

    pub fn sim(&self) -> MutexGuard<'_, LockSim> {
        lock(&self.sim)
    }

    /// Authorize a client directly, skipping the handshake.
    pub fn pair_client(&self) -> AuthorizationContext {
        let mut sim = self.sim();
        let keypair = KeyPair::generate();
        let lock_public_key = sim.keypair.public_bytes();
        let shared_key = keypair.shared_key(&lock_public_key);
        sim.authorized = Some((sim.assigned_auth_id, shared_key.clone()));
        AuthorizationContext {
            keypair,
            lock_public_key,
            shared_key,
            auth_id: sim.assigned_auth_id,
            app_id: APP_ID,
            device_name: None,
            device_id: None,
            pin: sim.pin,
        }
    }

    /// Deliver a notification outside of any exchange.
    pub fn notify(&self, event: Result<Vec<u8>>) {
        let handler = self.sim().handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub fn characteristic(&self, usdio: bool) -> FakeCharacteristic {
        FakeCharacteristic {
            sim: Arc::clone(&self.sim),
            channel: if usdio { Channel::Usdio } else { Channel::Pairing },
        }
    }
}

impl Transport for FakeLock {
    type Link = FakeLink;

    async fn scan_for_device(&self, device_id: &str, _timeout: Duration) -> Result<()> {
        if device_id.eq_ignore_ascii_case(ADDRESS) {
            Ok(())
        } else {
            Err(Error::DeviceNotFound(device_id.to_string()))
        }
    }

    async fn connect(&self, device_id: &str) -> Result<FakeLink> {
        if !device_id.eq_ignore_ascii_case(ADDRESS) {
            return Err(Error::DeviceNotFound(device_id.to_string()));
        }
        Ok(FakeLink {
            sim: Arc::clone(&self.sim),
        })
    }
}

pub(crate) struct FakeLink {
    sim: Arc<Mutex<LockSim>>,
}

impl Link for FakeLink {
    type Characteristic = FakeCharacteristic;

    async fn discover(&self, service: Uuid, characteristic: Uuid) -> Result<FakeCharacteristic> {
        let ultra = lock(&self.sim).ultra;
        let pairing_service = if ultra { PAIRING_SERVICE_ULTRA } else { PAIRING_SERVICE };
        let channel = if service == pairing_service && characteristic == PAIRING_GDIO {
            Channel::Pairing
        } else if service == KEYTURNER_SERVICE && characteristic == KEYTURNER_USDIO {
            Channel::Usdio
        } else {
            return Err(Error::CharacteristicNotFound(characteristic));
        };
        Ok(FakeCharacteristic {
            sim: Arc::clone(&self.sim),
            channel,
        })
    }

    async fn disconnect(&self) -> Result<()> {
        lock(&self.sim).disconnects += 1;
        Ok(())
    }
}

pub(crate) struct FakeCharacteristic {
    sim: Arc<Mutex<LockSim>>,
    channel: Channel,
}

impl Characteristic for FakeCharacteristic {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let (replies, handler, drop_link) = {
            let mut sim = lock(&self.sim);
            let drop_link = std::mem::take(&mut sim.disconnect_on_write);
            let replies = if sim.silent || drop_link {
                Vec::new()
            } else {
                sim.process(self.channel, data)
            };
            (replies, sim.handler.clone(), drop_link)
        };

        // Replies arrive on another task, like real notifications
        if let Some(handler) = handler {
            tokio::spawn(async move {
                if drop_link {
                    handler(Err(Error::Disconnected));
                    return;
                }
                for frame in replies {
                    handler(Ok(frame));
                }
            });
        }
        Ok(())
    }

    async fn enable_notifications(&self, handler: NotificationHandler) -> Result<()> {
        lock(&self.sim).handler = Some(handler);
        Ok(())
    }
}
