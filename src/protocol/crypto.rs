//! Key agreement, secretbox sealing and HMAC authenticators.
//!
//! The lock uses NaCl primitives: the session key is X25519 followed by
//! HSalsa20 over a zero block (NaCl `box` precomputation), frames are sealed
//! with XSalsa20-Poly1305 secretbox (16-byte tag in front of the ciphertext),
//! and pairing messages are authenticated with HMAC-SHA256 keyed by the
//! session key.

use std::fmt;

use crypto_secretbox::{
    aead::{Aead, KeyInit},
    Key, Nonce, XSalsa20Poly1305,
};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use salsa20::cipher::consts::U10;
use salsa20::cipher::generic_array::GenericArray;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Key size for X25519 and secretbox keys.
pub const KEY_SIZE: usize = 32;

/// Nonce size for XSalsa20-Poly1305.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size.
pub const TAG_SIZE: usize = 16;

/// Size of HMAC-SHA256 authenticators and pairing nonces.
pub const AUTHENTICATOR_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Client X25519 key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a key pair from its secret scalar.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Secret key bytes, for persistence.
    pub fn secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Derive the session key shared with `peer_public`.
    pub fn shared_key(&self, peer_public: &[u8; KEY_SIZE]) -> SharedKey {
        let dh = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        let derived = salsa20::hsalsa::<U10>(
            salsa20::Key::from_slice(dh.as_bytes()),
            &GenericArray::default(),
        );
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&derived);
        SharedKey(key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair(public={})", HEXLOWER.encode(&self.public_bytes()[..4]))
    }
}

/// Symmetric session key derived during pairing.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Seal `plaintext` with XSalsa20-Poly1305. Output is tag followed by ciphertext.
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| Error::crypto(format!("encrypt: {e}")))
    }

    /// Open a sealed box. Any authentication failure maps to [`Error::DecryptionFailed`].
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < TAG_SIZE {
            return Err(Error::DecryptionFailed);
        }
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::DecryptionFailed)
    }

    /// HMAC-SHA256 of `data` keyed by the session key.
    pub fn authenticator(&self, data: &[u8]) -> Result<[u8; AUTHENTICATOR_SIZE]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.0).map_err(|e| Error::crypto(format!("hmac init: {e}")))?;
        mac.update(data);
        let digest = mac.finalize().into_bytes();
        let mut out = [0u8; AUTHENTICATOR_SIZE];
        out.copy_from_slice(&digest);
        Ok(out)
    }

    /// Constant-time check of an authenticator over `data`.
    pub fn verify_authenticator(&self, data: &[u8], authenticator: &[u8]) -> bool {
        match <HmacSha256 as Mac>::new_from_slice(&self.0) {
            Ok(mut mac) => {
                mac.update(data);
                mac.verify_slice(authenticator).is_ok()
            }
            Err(_) => false,
        }
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Fill an array from the OS RNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}
