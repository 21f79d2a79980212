//! Key material collaborators.
//!
//! Keyring storage and parsing are not this crate's business.  The
//! decoder only ever asks three questions — "which secret key matches
//! this key ID", "which public key matches this key ID", "what is the
//! passphrase for this key" — and an optional fourth for user-id based
//! verification policies.  All of them are answered by a caller-side
//! [`Keyring`] implementation.
//!
//! The handle types carry the raw algorithm-specific material (MPIs),
//! optionally protected by a passphrase the way transferable secret
//! keys protect theirs: an S2K-derived key, CFB encryption, and a
//! trailing SHA-1 checksum over the cleartext material.

use crate::crypto::{Backend, Password};
use crate::s2k::S2K;
use crate::types::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm};
use crate::{Error, KeyID, Result, MPI};

/// The public part of a key.
#[derive(Clone, Debug)]
pub struct PublicKey {
    /// The key ID the keyring knows this key by.
    pub keyid: KeyID,
    /// Public key algorithm.
    pub pk_algo: PublicKeyAlgorithm,
    /// Algorithm-specific public material.
    pub mpis: PublicMpis,
}

/// Algorithm-specific public key material.
#[derive(Clone, Debug)]
pub enum PublicMpis {
    /// An RSA modulus and public exponent.
    Rsa {
        /// The modulus.
        n: MPI,
        /// The public exponent.
        e: MPI,
    },
}

/// A secret key as handed out by a [`Keyring`].
#[derive(Clone, Debug)]
pub struct SecretKey {
    /// The corresponding public key.
    pub public: PublicKey,
    /// The secret material, possibly passphrase-protected.
    pub material: SecretKeyMaterial,
}

/// Secret key material, in the clear or passphrase-protected.
#[derive(Clone, Debug)]
pub enum SecretKeyMaterial {
    /// Unprotected material.
    Unencrypted(SecretMpis),
    /// Material protected with an S2K-derived key.
    Encrypted {
        /// How to turn the passphrase into the decryption key.
        s2k: S2K,
        /// Symmetric algorithm protecting the material.
        algo: SymmetricAlgorithm,
        /// CFB initialization vector.
        iv: Vec<u8>,
        /// The encrypted MPIs followed by a 20-octet SHA-1 checksum.
        ciphertext: Vec<u8>,
    },
}

/// Algorithm-specific secret key material.
///
/// The material is wiped on drop.
#[derive(Debug)]
pub enum SecretMpis {
    /// RSA secret material.
    Rsa {
        /// The secret exponent.
        d: MPI,
        /// The first prime.
        p: MPI,
        /// The second prime.
        q: MPI,
        /// The multiplicative inverse of `p` modulo `q`.
        u: MPI,
    },
}

impl Clone for SecretMpis {
    fn clone(&self) -> Self {
        let SecretMpis::Rsa { d, p, q, u } = self;
        SecretMpis::Rsa {
            d: d.clone(), p: p.clone(), q: q.clone(), u: u.clone(),
        }
    }
}

impl Drop for SecretMpis {
    fn drop(&mut self) {
        let SecretMpis::Rsa { d, p, q, u } = self;
        d.zeroize();
        p.zeroize();
        q.zeroize();
        u.zeroize();
    }
}

impl SecretMpis {
    /// Parses secret material for `pk_algo` from its serialized form.
    fn parse(pk_algo: PublicKeyAlgorithm, mut body: &[u8]) -> Result<SecretMpis> {
        use self::PublicKeyAlgorithm::*;
        match pk_algo {
            RSAEncryptSign | RSAEncrypt | RSASign => {
                let d = MPI::parse(&mut body)?;
                let p = MPI::parse(&mut body)?;
                let q = MPI::parse(&mut body)?;
                let u = MPI::parse(&mut body)?;
                if !body.is_empty() {
                    return Err(Error::MalformedMPI(
                        "Trailing junk after secret material".into()).into());
                }
                Ok(SecretMpis::Rsa { d, p, q, u })
            }
            algo => Err(Error::UnsupportedPublicKeyAlgorithm(algo).into()),
        }
    }

    /// Serializes the secret material.
    pub fn serialize(&self, buf: &mut Vec<u8>) {
        let SecretMpis::Rsa { d, p, q, u } = self;
        d.serialize(buf);
        p.serialize(buf);
        q.serialize(buf);
        u.serialize(buf);
    }
}

/// A secret key ready for use: public and secret halves together.
#[derive(Clone, Debug)]
pub struct UnlockedKey {
    /// The public half.
    pub public: PublicKey,
    /// The secret half.
    pub secret: SecretMpis,
}

impl SecretKey {
    /// Unlocks the secret material.
    ///
    /// Unprotected material unlocks without a passphrase; protected
    /// material requires the right one.  A wrong passphrase fails with
    /// [`Error::InvalidPassword`].
    pub fn unlock(&self, passphrase: Option<&Password>, backend: &dyn Backend)
        -> Result<UnlockedKey>
    {
        match &self.material {
            SecretKeyMaterial::Unencrypted(mpis) => Ok(UnlockedKey {
                public: self.public.clone(),
                secret: mpis.clone(),
            }),
            SecretKeyMaterial::Encrypted { s2k, algo, iv, ciphertext } => {
                let passphrase = passphrase.ok_or(Error::InvalidPassword)?;
                let key = s2k.derive(passphrase, algo.key_size()?, backend)?;

                let mut cleartext = ciphertext.clone();
                backend.cfb_decryptor(*algo, &key, iv)?
                    .decrypt(&mut cleartext);

                if cleartext.len() < 20 {
                    return Err(Error::MalformedPacket(
                        "Secret material shorter than its checksum".into())
                        .into());
                }
                let (body, checksum) =
                    cleartext.split_at(cleartext.len() - 20);

                let mut sha1 = backend.hasher(HashAlgorithm::SHA1)?;
                sha1.update(body);
                let digest = sha1.finalize_reset();
                if &digest[..] != checksum {
                    return Err(Error::InvalidPassword.into());
                }

                Ok(UnlockedKey {
                    public: self.public.clone(),
                    secret: SecretMpis::parse(self.public.pk_algo, body)?,
                })
            }
        }
    }
}

/// The keyring collaborator interface.
///
/// All methods default to "not found", so minimal implementations only
/// override what they can answer.  Lookups are by key ID; the decoder
/// neither caches nor mutates any key material.
pub trait Keyring {
    /// Looks up the public key for `keyid`.
    fn public_key(&self, keyid: &KeyID) -> Option<PublicKey> {
        let _ = keyid;
        None
    }

    /// Looks up the secret key for `keyid`.
    fn secret_key(&self, keyid: &KeyID) -> Option<SecretKey> {
        let _ = keyid;
        None
    }

    /// Returns the passphrase protecting the secret key `keyid`, if
    /// any.
    fn passphrase(&self, keyid: &KeyID) -> Option<Password> {
        let _ = keyid;
        None
    }

    /// Returns the key IDs acceptable as signers for `user_id`.
    ///
    /// Only consulted by user-id based verification policies.
    fn keys_for_user_id(&self, user_id: &str) -> Vec<KeyID> {
        let _ = user_id;
        Vec::new()
    }
}
