//! Frame building and parsing.
//!
//! Unencrypted: `code (2 LE) || payload || crc (2 LE)`.
//!
//! Encrypted: `nonce (24) || auth_id (4) || len (2 LE) || secretbox(auth_id || code || payload || crc)`.
//! The CRC always covers the bytes before it, pre-encryption.

use data_encoding::HEXLOWER;
use tracing::debug;

use super::checksum::crc16;
use super::codes::CommandCode;
use super::commands::Command;
use super::crypto::{NONCE_SIZE, SharedKey};
use crate::error::{Error, Result};

/// Code plus checksum.
pub const MIN_FRAME_SIZE: usize = 4;

/// Nonce, authorization id and length prefix of an encrypted frame.
pub const ENCRYPTED_HEADER_SIZE: usize = NONCE_SIZE + 4 + 2;

/// Serialize `command` into an unencrypted frame.
pub fn build_unencrypted(command: &Command) -> Vec<u8> {
    let frame = encode_unencrypted(command.code(), &command.to_payload());
    debug!("TX plain {}: {}", command.name(), HEXLOWER.encode(&frame));
    frame
}

/// Serialize `command` into an encrypted frame for `auth_id`.
pub fn build_encrypted(
    command: &Command,
    auth_id: &[u8; 4],
    key: &SharedKey,
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>> {
    let payload = command.to_payload();
    debug!("TX encrypted {} ({} byte payload)", command.name(), payload.len());
    encode_encrypted(command.code(), &payload, auth_id, key, nonce)
}

/// Parse an unencrypted frame. A device `ErrorReport` is returned as [`Error::DeviceReport`].
pub fn parse_unencrypted(frame: &[u8]) -> Result<Command> {
    debug!("RX plain: {}", HEXLOWER.encode(frame));
    let (code, payload) = decode_unencrypted(frame)?;
    into_result(Command::parse(code, payload)?)
}

/// Parse an encrypted frame addressed to `auth_id`.
pub fn parse_encrypted(frame: &[u8], auth_id: &[u8; 4], key: &SharedKey) -> Result<Command> {
    let plaintext = open_encrypted(frame, auth_id, key)?;
    debug!("RX decrypted: {}", HEXLOWER.encode(&plaintext));

    let code = CommandCode::from_le_slice(&plaintext[4..6])?;
    into_result(Command::parse(code, &plaintext[6..plaintext.len() - 2])?)
}

/// Authorization id claimed by an encrypted frame, without decrypting it.
pub fn encrypted_auth_id(frame: &[u8]) -> Result<[u8; 4]> {
    if frame.len() < ENCRYPTED_HEADER_SIZE {
        return Err(Error::FrameTooShort(frame.len()));
    }
    let mut auth_id = [0u8; 4];
    auth_id.copy_from_slice(&frame[NONCE_SIZE..NONCE_SIZE + 4]);
    Ok(auth_id)
}

pub(crate) fn encode_unencrypted(code: CommandCode, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MIN_FRAME_SIZE + payload.len());
    frame.extend_from_slice(&code.to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

pub(crate) fn encode_encrypted(
    code: CommandCode,
    payload: &[u8],
    auth_id: &[u8; 4],
    key: &SharedKey,
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>> {
    let mut plaintext = Vec::with_capacity(4 + MIN_FRAME_SIZE + payload.len());
    plaintext.extend_from_slice(auth_id);
    plaintext.extend_from_slice(&code.to_le_bytes());
    plaintext.extend_from_slice(payload);
    let crc = crc16(&plaintext);
    plaintext.extend_from_slice(&crc.to_le_bytes());

    let sealed = key.seal(nonce, &plaintext)?;
    let length = u16::try_from(sealed.len()).map_err(|_| Error::crypto("encrypted frame too large"))?;

    let mut frame = Vec::with_capacity(ENCRYPTED_HEADER_SIZE + sealed.len());
    frame.extend_from_slice(nonce);
    frame.extend_from_slice(auth_id);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&sealed);
    Ok(frame)
}

/// Check the CRC and split off the command code.
fn decode_unencrypted(frame: &[u8]) -> Result<(CommandCode, &[u8])> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(Error::FrameTooShort(frame.len()));
    }
    let body = &frame[..frame.len() - 2];
    let received = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
    let expected = crc16(body);
    if expected != received {
        return Err(Error::ChecksumMismatch { expected, received });
    }
    let code = CommandCode::from_le_slice(body)?;
    Ok((code, &body[2..]))
}

/// Verify the addressed authorization id and decrypt. Returns the inner plaintext.
fn open_encrypted(frame: &[u8], auth_id: &[u8; 4], key: &SharedKey) -> Result<Vec<u8>> {
    let received = encrypted_auth_id(frame)?;
    if &received != auth_id {
        return Err(Error::AuthorizationIdMismatch {
            expected: *auth_id,
            received,
        });
    }

    let declared = u16::from_le_bytes([frame[NONCE_SIZE + 4], frame[NONCE_SIZE + 5]]) as usize;
    let sealed = &frame[ENCRYPTED_HEADER_SIZE..];
    if sealed.len() < declared {
        return Err(Error::FrameTooShort(frame.len()));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&frame[..NONCE_SIZE]);
    let plaintext = key.open(&nonce, &sealed[..declared])?;

    if plaintext.len() < 4 + MIN_FRAME_SIZE {
        return Err(Error::FrameTooShort(plaintext.len()));
    }
    let mut inner = [0u8; 4];
    inner.copy_from_slice(&plaintext[..4]);
    if &inner != auth_id {
        return Err(Error::AuthorizationIdMismatch {
            expected: *auth_id,
            received: inner,
        });
    }
    // CRC covers the embedded auth id too
    let body = &plaintext[..plaintext.len() - 2];
    let received = u16::from_le_bytes([plaintext[plaintext.len() - 2], plaintext[plaintext.len() - 1]]);
    let expected = crc16(body);
    if expected != received {
        return Err(Error::ChecksumMismatch { expected, received });
    }
    Ok(plaintext)
}

fn into_result(command: Command) -> Result<Command> {
    match command {
        Command::ErrorReport(report) => Err(Error::DeviceReport(report)),
        other => Ok(other),
    }
}
