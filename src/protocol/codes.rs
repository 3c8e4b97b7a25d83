//! Command code catalogue.

use std::fmt;

use crate::error::{Error, Result};

/// 16-bit command identifier, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    RequestData = 0x0001,
    PublicKey = 0x0003,
    Challenge = 0x0004,
    AuthorizationAuthenticator = 0x0005,
    AuthorizationData = 0x0006,
    AuthorizationId = 0x0007,
    RemoveAuthorizationEntry = 0x0008,
    RequestAuthorizationEntries = 0x0009,
    AuthorizationEntry = 0x000A,
    AuthorizationDataInvite = 0x000B,
    KeyturnerStates = 0x000C,
    LockAction = 0x000D,
    Status = 0x000E,
    MostRecentCommand = 0x000F,
    OpeningsClosingsSummary = 0x0010,
    BatteryReport = 0x0011,
    ErrorReport = 0x0012,
    SetConfig = 0x0013,
    RequestConfig = 0x0014,
    Config = 0x0015,
    SetSecurityPin = 0x0019,
    RequestCalibration = 0x001A,
    RequestReboot = 0x001D,
    AuthorizationIdConfirmation = 0x001E,
    AuthorizationIdInvite = 0x001F,
    VerifySecurityPin = 0x0020,
    UpdateTime = 0x0021,
    UpdateAuthorizationEntry = 0x0025,
    AuthorizationEntryCount = 0x0027,
    RequestLogEntries = 0x0031,
    LogEntry = 0x0032,
    LogEntryCount = 0x0033,
    EnableLogging = 0x0034,
    SetAdvancedConfig = 0x0035,
    RequestAdvancedConfig = 0x0036,
    AdvancedConfig = 0x0037,
    AddTimeControlEntry = 0x0039,
    TimeControlEntryId = 0x003A,
    RemoveTimeControlEntry = 0x003B,
    RequestTimeControlEntries = 0x003C,
    TimeControlEntryCount = 0x003D,
    TimeControlEntry = 0x003E,
    UpdateTimeControlEntry = 0x003F,
    AddKeypadCode = 0x0041,
    KeypadCodeId = 0x0042,
    RequestKeypadCodes = 0x0043,
    KeypadCodeCount = 0x0044,
    KeypadCode = 0x0045,
    UpdateKeypadCode = 0x0046,
    RemoveKeypadCode = 0x0047,
    AuthorizationInfo = 0x004C,
    SimpleLockAction = 0x0100,
}

impl CommandCode {
    /// Every known code, in numeric order.
    pub const ALL: [CommandCode; 52] = [
        Self::RequestData,
        Self::PublicKey,
        Self::Challenge,
        Self::AuthorizationAuthenticator,
        Self::AuthorizationData,
        Self::AuthorizationId,
        Self::RemoveAuthorizationEntry,
        Self::RequestAuthorizationEntries,
        Self::AuthorizationEntry,
        Self::AuthorizationDataInvite,
        Self::KeyturnerStates,
        Self::LockAction,
        Self::Status,
        Self::MostRecentCommand,
        Self::OpeningsClosingsSummary,
        Self::BatteryReport,
        Self::ErrorReport,
        Self::SetConfig,
        Self::RequestConfig,
        Self::Config,
        Self::SetSecurityPin,
        Self::RequestCalibration,
        Self::RequestReboot,
        Self::AuthorizationIdConfirmation,
        Self::AuthorizationIdInvite,
        Self::VerifySecurityPin,
        Self::UpdateTime,
        Self::UpdateAuthorizationEntry,
        Self::AuthorizationEntryCount,
        Self::RequestLogEntries,
        Self::LogEntry,
        Self::LogEntryCount,
        Self::EnableLogging,
        Self::SetAdvancedConfig,
        Self::RequestAdvancedConfig,
        Self::AdvancedConfig,
        Self::AddTimeControlEntry,
        Self::TimeControlEntryId,
        Self::RemoveTimeControlEntry,
        Self::RequestTimeControlEntries,
        Self::TimeControlEntryCount,
        Self::TimeControlEntry,
        Self::UpdateTimeControlEntry,
        Self::AddKeypadCode,
        Self::KeypadCodeId,
        Self::RequestKeypadCodes,
        Self::KeypadCodeCount,
        Self::KeypadCode,
        Self::UpdateKeypadCode,
        Self::RemoveKeypadCode,
        Self::AuthorizationInfo,
        Self::SimpleLockAction,
    ];

    /// Raw 16-bit value.
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Little-endian wire bytes.
    pub fn to_le_bytes(self) -> [u8; 2] {
        self.value().to_le_bytes()
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::RequestData => "RequestData",
            Self::PublicKey => "PublicKey",
            Self::Challenge => "Challenge",
            Self::AuthorizationAuthenticator => "AuthorizationAuthenticator",
            Self::AuthorizationData => "AuthorizationData",
            Self::AuthorizationId => "AuthorizationID",
            Self::RemoveAuthorizationEntry => "RemoveAuthorizationEntry",
            Self::RequestAuthorizationEntries => "RequestAuthorizationEntries",
            Self::AuthorizationEntry => "AuthorizationEntry",
            Self::AuthorizationDataInvite => "AuthorizationDataInvite",
            Self::KeyturnerStates => "KeyturnerStates",
            Self::LockAction => "LockAction",
            Self::Status => "Status",
            Self::MostRecentCommand => "MostRecentCommand",
            Self::OpeningsClosingsSummary => "OpeningsClosingsSummary",
            Self::BatteryReport => "BatteryReport",
            Self::ErrorReport => "ErrorReport",
            Self::SetConfig => "SetConfig",
            Self::RequestConfig => "RequestConfig",
            Self::Config => "Config",
            Self::SetSecurityPin => "SetSecurityPIN",
            Self::RequestCalibration => "RequestCalibration",
            Self::RequestReboot => "RequestReboot",
            Self::AuthorizationIdConfirmation => "AuthorizationIDConfirmation",
            Self::AuthorizationIdInvite => "AuthorizationIDInvite",
            Self::VerifySecurityPin => "VerifySecurityPIN",
            Self::UpdateTime => "UpdateTime",
            Self::UpdateAuthorizationEntry => "UpdateAuthorizationEntry",
            Self::AuthorizationEntryCount => "AuthorizationEntryCount",
            Self::RequestLogEntries => "RequestLogEntries",
            Self::LogEntry => "LogEntry",
            Self::LogEntryCount => "LogEntryCount",
            Self::EnableLogging => "EnableLogging",
            Self::SetAdvancedConfig => "SetAdvancedConfig",
            Self::RequestAdvancedConfig => "RequestAdvancedConfig",
            Self::AdvancedConfig => "AdvancedConfig",
            Self::AddTimeControlEntry => "AddTimeControlEntry",
            Self::TimeControlEntryId => "TimeControlEntryID",
            Self::RemoveTimeControlEntry => "RemoveTimeControlEntry",
            Self::RequestTimeControlEntries => "RequestTimeControlEntries",
            Self::TimeControlEntryCount => "TimeControlEntryCount",
            Self::TimeControlEntry => "TimeControlEntry",
            Self::UpdateTimeControlEntry => "UpdateTimeControlEntry",
            Self::AddKeypadCode => "AddKeypadCode",
            Self::KeypadCodeId => "KeypadCodeID",
            Self::RequestKeypadCodes => "RequestKeypadCodes",
            Self::KeypadCodeCount => "KeypadCodeCount",
            Self::KeypadCode => "KeypadCode",
            Self::UpdateKeypadCode => "UpdateKeypadCode",
            Self::RemoveKeypadCode => "RemoveKeypadCode",
            Self::AuthorizationInfo => "AuthorizationInfo",
            Self::SimpleLockAction => "SimpleLockAction",
        }
    }

    /// Read a code from the first two bytes of `data`.
    pub(crate) fn from_le_slice(data: &[u8]) -> Result<Self> {
        match data {
            [lo, hi, ..] => Self::try_from(u16::from_le_bytes([*lo, *hi])),
            _ => Err(Error::FrameTooShort(data.len())),
        }
    }
}

impl TryFrom<u16> for CommandCode {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.value() == value)
            .ok_or(Error::UnrecognizedCommand(value))
    }
}

impl From<CommandCode> for u16 {
    fn from(code: CommandCode) -> u16 {
        code.value()
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
