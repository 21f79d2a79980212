//! Cryptographic primitives.
//!
//! The decoding machinery never computes a primitive itself: everything
//! it needs — asymmetric session-key decryption, streaming CFB
//! decryption, hash contexts, signature verification — is obtained from
//! a [`Backend`] passed explicitly to the entry point.  The
//! [`RustCryptoBackend`] implementation over the RustCrypto crates is
//! provided as a default; callers with hardware tokens or alternative
//! software stacks implement the trait themselves.

use std::ops::{Deref, DerefMut};

use digest::DynDigest;
use zeroize::Zeroize;

use crate::keyring::{PublicKey, UnlockedKey};
use crate::types::{HashAlgorithm, SymmetricAlgorithm};
use crate::Result;
use crate::MPI;

mod backend;
pub use backend::RustCryptoBackend;

/// Holds a session key.
///
/// The session key is cleared when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Creates a new session key.
    pub fn new(key: Vec<u8>) -> Self {
        SessionKey(key)
    }
}

impl Deref for SessionKey {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SessionKey {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for SessionKey {
    fn from(v: Vec<u8>) -> Self {
        SessionKey(v)
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SessionKey ({} bytes)", self.0.len())
    }
}

/// Holds a passphrase.
///
/// The passphrase is cleared when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Vec<u8>);

impl AsRef<[u8]> for Password {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Password {
    fn from(v: Vec<u8>) -> Self {
        Password(v)
    }
}

impl From<&[u8]> for Password {
    fn from(v: &[u8]) -> Self {
        Password(v.to_vec())
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Password(s.as_bytes().to_vec())
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Password (redacted)")
    }
}

/// A stateful CFB-mode decryptor.
///
/// Keystream state is carried across calls, so ciphertext may be fed
/// in chunks of arbitrary size.
pub trait CfbDecrypt {
    /// Decrypts `data` in place.
    fn decrypt(&mut self, data: &mut [u8]);

    /// The block size of the underlying cipher in bytes.
    fn block_size(&self) -> usize;
}

/// The cryptographic primitives used by the decoding machinery.
///
/// Implementations are expected to be stateless; a backend reference is
/// shared by everything one decode operation touches.
pub trait Backend {
    /// Decrypts an encrypted session key with an unlocked secret key.
    ///
    /// `ciphertext` is the algorithm-specific MPI sequence from the
    /// encrypted session key packet.  Returns the padded session-key
    /// payload (cipher specifier, key, checksum).
    fn asymmetric_decrypt(&self, key: &UnlockedKey, ciphertext: &[MPI])
        -> Result<Vec<u8>>;

    /// Creates a streaming CFB decryptor for `algo`, keyed with `key`
    /// and starting from `iv`.
    fn cfb_decryptor(&self, algo: SymmetricAlgorithm, key: &SessionKey,
                     iv: &[u8])
        -> Result<Box<dyn CfbDecrypt>>;

    /// Creates an incremental hash context for `algo`.
    fn hasher(&self, algo: HashAlgorithm) -> Result<Box<dyn DynDigest>>;

    /// Verifies `sig` over the finished `digest` with `key`.
    ///
    /// Returns `Ok(false)` for a well-formed but invalid signature;
    /// `Err` is reserved for unusable keys and unsupported algorithms.
    fn verify(&self, key: &PublicKey, algo: HashAlgorithm, digest: &[u8],
              sig: &[MPI])
        -> Result<bool>;
}
