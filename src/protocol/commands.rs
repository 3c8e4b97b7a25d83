//! Typed command bodies and their payload codec.
//!
//! Every message is one [`Command`] variant. Serialization produces the payload
//! only; code and checksum are added by the frame layer. Parsing dispatches on
//! the command code with a single exhaustive match.

use super::codes::CommandCode;
use super::crypto::{AUTHENTICATOR_SIZE, KEY_SIZE};
use super::device_config::DeviceConfig;
use super::errors::ErrorReport;
use super::log_entry::LogEntry;
use super::pin::SecurityPin;
use super::states::KeyturnerStates;
use super::types::{
    array_at, name_from_field, name_to_field, u16_at, u32_at, AuthorizationType, DeviceTime, LockActionKind,
    LogSortOrder, StatusCode, CHALLENGE_SIZE, NAME_SIZE,
};
use crate::error::{Error, Result};

/// Size of the optional name suffix on lock actions.
pub const NAME_SUFFIX_SIZE: usize = 20;

/// Legacy pairing: identity data sent after the second challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationData {
    pub authenticator: [u8; AUTHENTICATOR_SIZE],
    pub id_type: AuthorizationType,
    pub app_id: [u8; 4],
    pub name: String,
    pub nonce: [u8; CHALLENGE_SIZE],
}

impl AuthorizationData {
    pub const SIZE: usize = AUTHENTICATOR_SIZE + 1 + 4 + NAME_SIZE + CHALLENGE_SIZE;

    /// Bytes covered by the authenticator: everything after it.
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(Self::SIZE - AUTHENTICATOR_SIZE);
        b.push(self.id_type.into());
        b.extend_from_slice(&self.app_id);
        b.extend_from_slice(&name_to_field::<NAME_SIZE>(&self.name));
        b.extend_from_slice(&self.nonce);
        b
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = self.authenticator.to_vec();
        b.extend_from_slice(&self.signed_bytes());
        b
    }

    fn parse(b: &[u8]) -> Self {
        Self {
            authenticator: array_at(b, 0),
            id_type: AuthorizationType::from(b[32]),
            app_id: array_at(b, 33),
            name: name_from_field(&b[37..37 + NAME_SIZE]),
            nonce: array_at(b, 69),
        }
    }
}

/// 5G pairing: identity data sent encrypted under the placeholder authorization id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationData5G {
    pub app_id: [u8; 4],
    pub name: String,
    pub pin: Option<SecurityPin>,
}

impl AuthorizationData5G {
    /// Size without the PIN field.
    pub const BASE_SIZE: usize = 4 + NAME_SIZE;

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = self.app_id.to_vec();
        b.extend_from_slice(&name_to_field::<NAME_SIZE>(&self.name));
        b.extend_from_slice(&SecurityPin::encode(self.pin.as_ref()));
        b
    }

    fn parse(b: &[u8]) -> Result<Self> {
        Ok(Self {
            app_id: array_at(b, 0),
            name: name_from_field(&b[4..Self::BASE_SIZE]),
            pin: parse_pin(&b[Self::BASE_SIZE..])?,
        })
    }
}

/// Authorization id assigned by the lock. The payload shape depends on the firmware generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationId {
    /// Before 5G: authenticated, and confirmed by the client afterwards.
    Legacy {
        authenticator: [u8; AUTHENTICATOR_SIZE],
        auth_id: [u8; 4],
        uuid: [u8; 16],
        nonce: [u8; CHALLENGE_SIZE],
    },
    /// 5G onwards: sent encrypted, no confirmation step.
    Gen5 { auth_id: [u8; 4], uuid: [u8; 16] },
}

impl AuthorizationId {
    pub const LEGACY_SIZE: usize = 84;
    pub const GEN5_SIZE: usize = 20;

    pub fn auth_id(&self) -> [u8; 4] {
        match self {
            Self::Legacy { auth_id, .. } | Self::Gen5 { auth_id, .. } => *auth_id,
        }
    }

    pub fn uuid(&self) -> [u8; 16] {
        match self {
            Self::Legacy { uuid, .. } | Self::Gen5 { uuid, .. } => *uuid,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Legacy {
                authenticator,
                auth_id,
                uuid,
                nonce,
            } => [&authenticator[..], auth_id, uuid, nonce].concat(),
            Self::Gen5 { auth_id, uuid } => [&auth_id[..], uuid].concat(),
        }
    }

    fn parse(b: &[u8]) -> Result<Self> {
        match b.len() {
            Self::LEGACY_SIZE => Ok(Self::Legacy {
                authenticator: array_at(b, 0),
                auth_id: array_at(b, 32),
                uuid: array_at(b, 36),
                nonce: array_at(b, 52),
            }),
            Self::GEN5_SIZE => Ok(Self::Gen5 {
                auth_id: array_at(b, 0),
                uuid: array_at(b, 4),
            }),
            actual => Err(Error::InvalidLength {
                command: CommandCode::AuthorizationId,
                expected: Self::LEGACY_SIZE,
                actual,
            }),
        }
    }
}

/// Legacy pairing: client proof that it received the authorization id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationIdConfirmation {
    pub authenticator: [u8; AUTHENTICATOR_SIZE],
    pub auth_id: [u8; 4],
}

impl AuthorizationIdConfirmation {
    pub const SIZE: usize = AUTHENTICATOR_SIZE + 4;
}

/// Lock movement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAction {
    pub action: LockActionKind,
    pub app_id: [u8; 4],
    pub flags: u8,
    /// Shown in the activity log after the authorization name.
    pub name_suffix: Option<String>,
    pub nonce: [u8; CHALLENGE_SIZE],
}

impl LockAction {
    pub const SIZE: usize = 1 + 4 + 1 + CHALLENGE_SIZE;
    pub const SIZE_WITH_SUFFIX: usize = Self::SIZE + NAME_SUFFIX_SIZE;

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(Self::SIZE_WITH_SUFFIX);
        b.push(self.action.into());
        b.extend_from_slice(&self.app_id);
        b.push(self.flags);
        if let Some(suffix) = &self.name_suffix {
            b.extend_from_slice(&name_to_field::<NAME_SUFFIX_SIZE>(suffix));
        }
        b.extend_from_slice(&self.nonce);
        b
    }

    fn parse(b: &[u8]) -> Result<Self> {
        let name_suffix = match b.len() {
            Self::SIZE => None,
            Self::SIZE_WITH_SUFFIX => Some(name_from_field(&b[6..6 + NAME_SUFFIX_SIZE])),
            actual => {
                return Err(Error::InvalidLength {
                    command: CommandCode::LockAction,
                    expected: Self::SIZE,
                    actual,
                });
            }
        };
        Ok(Self {
            action: LockActionKind::from(b[0]),
            app_id: array_at(b, 1),
            flags: b[5],
            name_suffix,
            nonce: array_at(b, b.len() - CHALLENGE_SIZE),
        })
    }
}

/// Activity log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogEntries {
    pub start_index: u32,
    pub count: u16,
    pub sort_order: LogSortOrder,
    /// Ask the lock to report the total entry count first.
    pub total_count: bool,
    pub nonce: [u8; CHALLENGE_SIZE],
    pub pin: Option<SecurityPin>,
}

impl RequestLogEntries {
    /// Size without the PIN field.
    pub const BASE_SIZE: usize = 4 + 2 + 1 + 1 + CHALLENGE_SIZE;

    fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(Self::BASE_SIZE + 4);
        b.extend_from_slice(&self.start_index.to_le_bytes());
        b.extend_from_slice(&self.count.to_le_bytes());
        b.push(self.sort_order.into());
        b.push(self.total_count as u8);
        b.extend_from_slice(&self.nonce);
        b.extend_from_slice(&SecurityPin::encode(self.pin.as_ref()));
        b
    }

    fn parse(b: &[u8]) -> Result<Self> {
        Ok(Self {
            start_index: u32_at(b, 0),
            count: u16_at(b, 4),
            sort_order: LogSortOrder::from(b[6]),
            total_count: b[7] != 0,
            nonce: array_at(b, 8),
            pin: parse_pin(&b[Self::BASE_SIZE..])?,
        })
    }
}

/// Nonce plus PIN, the body shared by calibration, reboot and PIN verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuredRequest {
    pub nonce: [u8; CHALLENGE_SIZE],
    pub pin: Option<SecurityPin>,
}

impl SecuredRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut b = self.nonce.to_vec();
        b.extend_from_slice(&SecurityPin::encode(self.pin.as_ref()));
        b
    }

    fn parse(b: &[u8]) -> Result<Self> {
        Ok(Self {
            nonce: array_at(b, 0),
            pin: parse_pin(&b[CHALLENGE_SIZE..])?,
        })
    }
}

/// Set the lock clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTime {
    pub time: DeviceTime,
    pub nonce: [u8; CHALLENGE_SIZE],
    pub pin: Option<SecurityPin>,
}

/// Turn activity logging on or off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableLogging {
    pub enabled: bool,
    pub nonce: [u8; CHALLENGE_SIZE],
    pub pin: Option<SecurityPin>,
}

/// Pairing info sent by 5G locks instead of a second challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationInfo {
    pub security_pin_set: bool,
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RequestData(CommandCode),
    PublicKey([u8; KEY_SIZE]),
    Challenge([u8; CHALLENGE_SIZE]),
    AuthorizationAuthenticator([u8; AUTHENTICATOR_SIZE]),
    AuthorizationData(AuthorizationData),
    AuthorizationData5G(AuthorizationData5G),
    AuthorizationId(AuthorizationId),
    AuthorizationIdConfirmation(AuthorizationIdConfirmation),
    KeyturnerStates(KeyturnerStates),
    LockAction(LockAction),
    Status(StatusCode),
    ErrorReport(ErrorReport),
    RequestConfig([u8; CHALLENGE_SIZE]),
    Config(DeviceConfig),
    RequestCalibration(SecuredRequest),
    RequestReboot(SecuredRequest),
    VerifySecurityPin(SecuredRequest),
    UpdateTime(UpdateTime),
    RequestLogEntries(RequestLogEntries),
    LogEntry(LogEntry),
    EnableLogging(EnableLogging),
    AuthorizationInfo(AuthorizationInfo),
}

impl Command {
    /// Command code written in front of the payload.
    pub fn code(&self) -> CommandCode {
        match self {
            Self::RequestData(_) => CommandCode::RequestData,
            Self::PublicKey(_) => CommandCode::PublicKey,
            Self::Challenge(_) => CommandCode::Challenge,
            Self::AuthorizationAuthenticator(_) => CommandCode::AuthorizationAuthenticator,
            Self::AuthorizationData(_) | Self::AuthorizationData5G(_) => CommandCode::AuthorizationData,
            Self::AuthorizationId(_) => CommandCode::AuthorizationId,
            Self::AuthorizationIdConfirmation(_) => CommandCode::AuthorizationIdConfirmation,
            Self::KeyturnerStates(_) => CommandCode::KeyturnerStates,
            Self::LockAction(_) => CommandCode::LockAction,
            Self::Status(_) => CommandCode::Status,
            Self::ErrorReport(_) => CommandCode::ErrorReport,
            Self::RequestConfig(_) => CommandCode::RequestConfig,
            Self::Config(_) => CommandCode::Config,
            Self::RequestCalibration(_) => CommandCode::RequestCalibration,
            Self::RequestReboot(_) => CommandCode::RequestReboot,
            Self::VerifySecurityPin(_) => CommandCode::VerifySecurityPin,
            Self::UpdateTime(_) => CommandCode::UpdateTime,
            Self::RequestLogEntries(_) => CommandCode::RequestLogEntries,
            Self::LogEntry(_) => CommandCode::LogEntry,
            Self::EnableLogging(_) => CommandCode::EnableLogging,
            Self::AuthorizationInfo(_) => CommandCode::AuthorizationInfo,
        }
    }

    /// Serialize the payload (without code and checksum).
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Self::RequestData(code) => code.to_le_bytes().to_vec(),
            Self::PublicKey(key) => key.to_vec(),
            Self::Challenge(nonce) | Self::RequestConfig(nonce) => nonce.to_vec(),
            Self::AuthorizationAuthenticator(authenticator) => authenticator.to_vec(),
            Self::AuthorizationData(data) => data.to_bytes(),
            Self::AuthorizationData5G(data) => data.to_bytes(),
            Self::AuthorizationId(id) => id.to_bytes(),
            Self::AuthorizationIdConfirmation(confirmation) => {
                [&confirmation.authenticator[..], &confirmation.auth_id].concat()
            }
            Self::LockAction(action) => action.to_bytes(),
            Self::Status(status) => vec![u8::from(*status)],
            Self::ErrorReport(report) => report.to_bytes(),
            Self::RequestCalibration(request) | Self::RequestReboot(request) | Self::VerifySecurityPin(request) => {
                request.to_bytes()
            }
            Self::UpdateTime(update) => {
                let mut b = update.time.to_bytes().to_vec();
                b.extend_from_slice(&update.nonce);
                b.extend_from_slice(&SecurityPin::encode(update.pin.as_ref()));
                b
            }
            Self::RequestLogEntries(request) => request.to_bytes(),
            Self::LogEntry(entry) => entry.to_bytes(),
            Self::EnableLogging(request) => {
                let mut b = vec![request.enabled as u8];
                b.extend_from_slice(&request.nonce);
                b.extend_from_slice(&SecurityPin::encode(request.pin.as_ref()));
                b
            }
            Self::AuthorizationInfo(info) => vec![info.security_pin_set as u8],
            // Device-to-client snapshots are never sent by the client
            Self::KeyturnerStates(_) | Self::Config(_) => Vec::new(),
        }
    }

    /// Parse a payload for `code`.
    pub fn parse(code: CommandCode, payload: &[u8]) -> Result<Self> {
        let b = payload;
        match code {
            CommandCode::RequestData => {
                exact(code, b, 2)?;
                Ok(Self::RequestData(CommandCode::try_from(u16_at(b, 0))?))
            }
            CommandCode::PublicKey => {
                exact(code, b, KEY_SIZE)?;
                Ok(Self::PublicKey(array_at(b, 0)))
            }
            CommandCode::Challenge => {
                exact(code, b, CHALLENGE_SIZE)?;
                Ok(Self::Challenge(array_at(b, 0)))
            }
            CommandCode::AuthorizationAuthenticator => {
                exact(code, b, AUTHENTICATOR_SIZE)?;
                Ok(Self::AuthorizationAuthenticator(array_at(b, 0)))
            }
            // Both pairing generations share this code; the legacy body has a fixed size.
            CommandCode::AuthorizationData => {
                if b.len() == AuthorizationData::SIZE {
                    Ok(Self::AuthorizationData(AuthorizationData::parse(b)))
                } else {
                    at_least(code, b, AuthorizationData5G::BASE_SIZE + 2)?;
                    Ok(Self::AuthorizationData5G(AuthorizationData5G::parse(b)?))
                }
            }
            CommandCode::AuthorizationId => Ok(Self::AuthorizationId(AuthorizationId::parse(b)?)),
            CommandCode::AuthorizationIdConfirmation => {
                exact(code, b, AuthorizationIdConfirmation::SIZE)?;
                Ok(Self::AuthorizationIdConfirmation(AuthorizationIdConfirmation {
                    authenticator: array_at(b, 0),
                    auth_id: array_at(b, AUTHENTICATOR_SIZE),
                }))
            }
            CommandCode::KeyturnerStates => Ok(Self::KeyturnerStates(KeyturnerStates::parse(b)?)),
            CommandCode::LockAction => Ok(Self::LockAction(LockAction::parse(b)?)),
            CommandCode::Status => {
                exact(code, b, 1)?;
                Ok(Self::Status(StatusCode::from(b[0])))
            }
            CommandCode::ErrorReport => Ok(Self::ErrorReport(ErrorReport::parse(b)?)),
            CommandCode::RequestConfig => {
                exact(code, b, CHALLENGE_SIZE)?;
                Ok(Self::RequestConfig(array_at(b, 0)))
            }
            CommandCode::Config => Ok(Self::Config(DeviceConfig::parse(b)?)),
            CommandCode::RequestCalibration => {
                at_least(code, b, CHALLENGE_SIZE + 2)?;
                Ok(Self::RequestCalibration(SecuredRequest::parse(b)?))
            }
            CommandCode::RequestReboot => {
                at_least(code, b, CHALLENGE_SIZE + 2)?;
                Ok(Self::RequestReboot(SecuredRequest::parse(b)?))
            }
            CommandCode::VerifySecurityPin => {
                at_least(code, b, CHALLENGE_SIZE + 2)?;
                Ok(Self::VerifySecurityPin(SecuredRequest::parse(b)?))
            }
            CommandCode::UpdateTime => {
                at_least(code, b, DeviceTime::SIZE + CHALLENGE_SIZE + 2)?;
                Ok(Self::UpdateTime(UpdateTime {
                    time: DeviceTime::read(b),
                    nonce: array_at(b, DeviceTime::SIZE),
                    pin: parse_pin(&b[DeviceTime::SIZE + CHALLENGE_SIZE..])?,
                }))
            }
            CommandCode::RequestLogEntries => {
                at_least(code, b, RequestLogEntries::BASE_SIZE + 2)?;
                Ok(Self::RequestLogEntries(RequestLogEntries::parse(b)?))
            }
            CommandCode::LogEntry => Ok(Self::LogEntry(LogEntry::parse(b)?)),
            CommandCode::EnableLogging => {
                at_least(code, b, 1 + CHALLENGE_SIZE + 2)?;
                Ok(Self::EnableLogging(EnableLogging {
                    enabled: b[0] != 0,
                    nonce: array_at(b, 1),
                    pin: parse_pin(&b[1 + CHALLENGE_SIZE..])?,
                }))
            }
            CommandCode::AuthorizationInfo => {
                at_least(code, b, 1)?;
                Ok(Self::AuthorizationInfo(AuthorizationInfo {
                    security_pin_set: b[0] != 0,
                }))
            }
            CommandCode::RemoveAuthorizationEntry
            | CommandCode::RequestAuthorizationEntries
            | CommandCode::AuthorizationEntry
            | CommandCode::AuthorizationDataInvite
            | CommandCode::MostRecentCommand
            | CommandCode::OpeningsClosingsSummary
            | CommandCode::BatteryReport
            | CommandCode::SetConfig
            | CommandCode::SetSecurityPin
            | CommandCode::AuthorizationIdInvite
            | CommandCode::UpdateAuthorizationEntry
            | CommandCode::AuthorizationEntryCount
            | CommandCode::LogEntryCount
            | CommandCode::SetAdvancedConfig
            | CommandCode::RequestAdvancedConfig
            | CommandCode::AdvancedConfig
            | CommandCode::AddTimeControlEntry
            | CommandCode::TimeControlEntryId
            | CommandCode::RemoveTimeControlEntry
            | CommandCode::RequestTimeControlEntries
            | CommandCode::TimeControlEntryCount
            | CommandCode::TimeControlEntry
            | CommandCode::UpdateTimeControlEntry
            | CommandCode::AddKeypadCode
            | CommandCode::KeypadCodeId
            | CommandCode::RequestKeypadCodes
            | CommandCode::KeypadCodeCount
            | CommandCode::KeypadCode
            | CommandCode::UpdateKeypadCode
            | CommandCode::RemoveKeypadCode
            | CommandCode::SimpleLockAction => Err(Error::UnsupportedResponse(code)),
        }
    }

    /// Short variant name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationData5G(_) => "AuthorizationData5G",
            other => other.code().name(),
        }
    }
}

fn exact(command: CommandCode, b: &[u8], expected: usize) -> Result<()> {
    if b.len() != expected {
        return Err(Error::InvalidLength {
            command,
            expected,
            actual: b.len(),
        });
    }
    Ok(())
}

fn at_least(command: CommandCode, b: &[u8], minimum: usize) -> Result<()> {
    if b.len() < minimum {
        return Err(Error::PayloadTooShort {
            command,
            minimum,
            actual: b.len(),
        });
    }
    Ok(())
}

/// Decode a trailing PIN field. Two zero bytes mean no PIN.
fn parse_pin(b: &[u8]) -> Result<Option<SecurityPin>> {
    match b {
        [0, 0] => Ok(None),
        [lo, hi] => Ok(Some(SecurityPin::FourDigit(u16::from_le_bytes([*lo, *hi])))),
        [a, b, c, d] => Ok(Some(SecurityPin::SixDigit(u32::from_le_bytes([*a, *b, *c, *d])))),
        other => Err(Error::InvalidPin(format!("PIN field must be 2 or 4 bytes, got {}", other.len()))),
    }
}
