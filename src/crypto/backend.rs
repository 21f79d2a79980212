//! The default backend, built on the RustCrypto crates.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::BufDecryptor;
use cipher::{BlockCipher, BlockEncryptMut, KeyIvInit};
use digest::DynDigest;
use rsa::{BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use rsa::traits::PublicKeyParts;

use crate::keyring::{PublicKey, PublicMpis, SecretMpis, UnlockedKey};
use crate::types::{HashAlgorithm, SymmetricAlgorithm};
use crate::crypto::{Backend, CfbDecrypt, SessionKey};
use crate::{Error, Result, MPI};

/// A [`Backend`] over the pure-Rust RustCrypto implementations.
///
/// Supports RSA, AES-128/192/256 in CFB mode, and the SHA family.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoBackend;

struct Cfb<C>
where
    C: BlockEncryptMut + BlockCipher,
{
    inner: BufDecryptor<C>,
    block_size: usize,
}

impl<C> CfbDecrypt for Cfb<C>
where
    C: BlockEncryptMut + BlockCipher,
{
    fn decrypt(&mut self, data: &mut [u8]) {
        self.inner.decrypt(data);
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Left-pads `bytes` with zeros to `len`, the size expected by the raw
/// RSA operations.
fn pad_to(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut padded = vec![0u8; len - bytes.len()];
    padded.extend_from_slice(bytes);
    padded
}

fn rsa_public(key: &PublicKey) -> Result<RsaPublicKey> {
    let PublicMpis::Rsa { ref n, ref e } = key.mpis;
    RsaPublicKey::new(BigUint::from_bytes_be(n.value()),
                      BigUint::from_bytes_be(e.value()))
        .map_err(|e| Error::InvalidArgument(
            format!("Unusable RSA public key: {}", e)).into())
}

impl Backend for RustCryptoBackend {
    fn asymmetric_decrypt(&self, key: &UnlockedKey, ciphertext: &[MPI])
        -> Result<Vec<u8>>
    {
        use crate::types::PublicKeyAlgorithm::*;
        match key.public.pk_algo {
            RSAEncryptSign | RSAEncrypt => (),
            algo => return Err(
                Error::UnsupportedPublicKeyAlgorithm(algo).into()),
        }

        let PublicMpis::Rsa { ref n, ref e } = key.public.mpis;
        let SecretMpis::Rsa { ref d, ref p, ref q, .. } = key.secret;
        let c = ciphertext.first()
            .ok_or_else(|| Error::MalformedMPI(
                "Empty RSA ciphertext".into()))?;

        let secret = RsaPrivateKey::from_components(
            BigUint::from_bytes_be(n.value()),
            BigUint::from_bytes_be(e.value()),
            BigUint::from_bytes_be(d.value()),
            vec![BigUint::from_bytes_be(p.value()),
                 BigUint::from_bytes_be(q.value())])
            .map_err(|e| Error::InvalidArgument(
                format!("Unusable RSA secret key: {}", e)))?;

        let padded = pad_to(c.value(), secret.size());
        secret.decrypt(Pkcs1v15Encrypt, &padded)
            .map_err(|_| Error::InvalidSessionKey(
                "RSA decryption failed".into()).into())
    }

    fn cfb_decryptor(&self, algo: SymmetricAlgorithm, key: &SessionKey,
                     iv: &[u8])
        -> Result<Box<dyn CfbDecrypt>>
    {
        use crate::types::SymmetricAlgorithm::*;

        if key.len() != algo.key_size()? || iv.len() != algo.block_size()? {
            return Err(Error::InvalidSessionKey(
                format!("Bad key or IV length for {}", algo)).into());
        }

        let block_size = algo.block_size()?;
        match algo {
            AES128 => Ok(Box::new(Cfb::<Aes128> {
                inner: BufDecryptor::new_from_slices(key, iv)
                    .expect("key and IV lengths checked above"),
                block_size,
            })),
            AES192 => Ok(Box::new(Cfb::<Aes192> {
                inner: BufDecryptor::new_from_slices(key, iv)
                    .expect("key and IV lengths checked above"),
                block_size,
            })),
            AES256 => Ok(Box::new(Cfb::<Aes256> {
                inner: BufDecryptor::new_from_slices(key, iv)
                    .expect("key and IV lengths checked above"),
                block_size,
            })),
            _ => Err(Error::UnsupportedSymmetricAlgorithm(algo).into()),
        }
    }

    fn hasher(&self, algo: HashAlgorithm) -> Result<Box<dyn DynDigest>> {
        use crate::types::HashAlgorithm::*;
        match algo {
            SHA1 => Ok(Box::new(sha1::Sha1::default())),
            SHA224 => Ok(Box::new(sha2::Sha224::default())),
            SHA256 => Ok(Box::new(sha2::Sha256::default())),
            SHA384 => Ok(Box::new(sha2::Sha384::default())),
            SHA512 => Ok(Box::new(sha2::Sha512::default())),
            _ => Err(Error::UnsupportedHashAlgorithm(algo).into()),
        }
    }

    fn verify(&self, key: &PublicKey, algo: HashAlgorithm, digest: &[u8],
              sig: &[MPI])
        -> Result<bool>
    {
        use crate::types::HashAlgorithm::*;

        if !key.pk_algo.is_supported() {
            return Err(
                Error::UnsupportedPublicKeyAlgorithm(key.pk_algo).into());
        }

        let scheme = match algo {
            SHA1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
            SHA224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
            SHA256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
            SHA384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
            SHA512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
            _ => return Err(Error::UnsupportedHashAlgorithm(algo).into()),
        };

        let public = rsa_public(key)?;
        let s = match sig.first() {
            Some(s) => pad_to(s.value(), public.size()),
            None => return Ok(false),
        };

        Ok(public.verify(scheme, digest, &s).is_ok())
    }
}
