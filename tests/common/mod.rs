//! Test-side message composer.
//!
//! The library only reads OpenPGP messages, so the round-trip tests
//! bring their own writer: just enough packet serialization, CFB
//! encryption, and v4 signature hashing to produce the messages the
//! decoder consumes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::OnceLock;

use aes::{Aes128, Aes256};
use cfb_mode::BufEncryptor;
use cipher::KeyIvInit;
use digest::{Digest, DynDigest};
use rand::RngCore;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::Sha256;

use rill_openpgp::armor;
use rill_openpgp::crypto::Password;
use rill_openpgp::keyring::{
    Keyring, PublicKey, PublicMpis, SecretKey, SecretKeyMaterial, SecretMpis,
};
use rill_openpgp::packet::signature::issuer_subpacket;
use rill_openpgp::packet::Signature;
use rill_openpgp::types::{
    HashAlgorithm, PublicKeyAlgorithm, SignatureType, SymmetricAlgorithm,
};
use rill_openpgp::{KeyID, MPI, S2K};

/// A generated RSA key with everything the composer and the keyring
/// need.
pub struct TestKey {
    pub keyid: KeyID,
    pub rsa: RsaPrivateKey,
}

impl TestKey {
    fn generate() -> TestKey {
        let mut rng = rand::rngs::OsRng;
        // Big enough for a 35-byte session-key payload and a SHA-256
        // signature; small enough to keep the test suite fast.
        let rsa = RsaPrivateKey::new(&mut rng, 1024)
            .expect("RSA key generation");

        // Derive a fingerprint-style key ID from the public material.
        let mut h = Sha1::new();
        Digest::update(&mut h, rsa.n().to_bytes_be());
        Digest::update(&mut h, rsa.e().to_bytes_be());
        let digest = Digest::finalize(h);
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest[digest.len() - 8..]);

        TestKey { keyid: KeyID::from(id), rsa }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            keyid: self.keyid,
            pk_algo: PublicKeyAlgorithm::RSAEncryptSign,
            mpis: PublicMpis::Rsa {
                n: MPI::new(&self.rsa.n().to_bytes_be()),
                e: MPI::new(&self.rsa.e().to_bytes_be()),
            },
        }
    }

    fn secret_mpis(&self) -> SecretMpis {
        let primes = self.rsa.primes();
        let (p, q) = (primes[0].clone(), primes[1].clone());
        // u is p^-1 mod q; q is prime, so Fermat gives the inverse.
        let u = p.modpow(&(q.clone() - 2u32), &q);
        SecretMpis::Rsa {
            d: MPI::new(&self.rsa.d().to_bytes_be()),
            p: MPI::new(&p.to_bytes_be()),
            q: MPI::new(&q.to_bytes_be()),
            u: MPI::new(&u.to_bytes_be()),
        }
    }

    /// The secret key with unprotected material.
    pub fn secret_key(&self) -> SecretKey {
        SecretKey {
            public: self.public_key(),
            material: SecretKeyMaterial::Unencrypted(self.secret_mpis()),
        }
    }

    /// The secret key with material locked under `passphrase`.
    pub fn locked_secret_key(&self, passphrase: &str) -> SecretKey {
        let s2k = S2K {
            hash_algo: HashAlgorithm::SHA1,
            salt: Some(random_array()),
            coded_count: Some(96),
        };
        let key = s2k
            .derive(&Password::from(passphrase), 16,
                    &rill_openpgp::crypto::RustCryptoBackend::default())
            .unwrap();

        let mut cleartext = Vec::new();
        self.secret_mpis().serialize(&mut cleartext);
        let mut h = Sha1::new();
        Digest::update(&mut h, &cleartext);
        cleartext.extend_from_slice(&Digest::finalize(h));

        let iv: [u8; 16] = random_array();
        let mut ciphertext = cleartext;
        BufEncryptor::<Aes128>::new_from_slices(&key, &iv)
            .unwrap()
            .encrypt(&mut ciphertext);

        SecretKey {
            public: self.public_key(),
            material: SecretKeyMaterial::Encrypted {
                s2k,
                algo: SymmetricAlgorithm::AES128,
                iv: iv.to_vec(),
                ciphertext,
            },
        }
    }
}

/// A pool of generated keys, shared by all tests in the binary.
pub fn test_keys() -> &'static [TestKey] {
    static KEYS: OnceLock<Vec<TestKey>> = OnceLock::new();
    KEYS.get_or_init(|| (0..5).map(|_| TestKey::generate()).collect())
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// An in-memory keyring.
#[derive(Default)]
pub struct TestKeyring {
    publics: HashMap<KeyID, PublicKey>,
    secrets: HashMap<KeyID, SecretKey>,
    passphrases: HashMap<KeyID, Password>,
    user_ids: HashMap<String, Vec<KeyID>>,
}

impl TestKeyring {
    pub fn new() -> TestKeyring {
        TestKeyring::default()
    }

    pub fn with_public(mut self, key: &TestKey) -> Self {
        self.publics.insert(key.keyid, key.public_key());
        self
    }

    pub fn with_secret(mut self, key: &TestKey) -> Self {
        self.secrets.insert(key.keyid, key.secret_key());
        self
    }

    /// Adds a passphrase-protected secret key, and the passphrase the
    /// keyring will hand out for it.
    pub fn with_locked_secret(mut self, key: &TestKey, locked_with: &str,
                              provides: &str)
        -> Self
    {
        self.secrets.insert(key.keyid, key.locked_secret_key(locked_with));
        self.passphrases.insert(key.keyid, Password::from(provides));
        self
    }

    pub fn with_user_id(mut self, user_id: &str, keys: &[&TestKey]) -> Self {
        self.user_ids.insert(
            user_id.into(), keys.iter().map(|k| k.keyid).collect());
        self
    }
}

impl Keyring for TestKeyring {
    fn public_key(&self, keyid: &KeyID) -> Option<PublicKey> {
        self.publics.get(keyid).cloned()
    }

    fn secret_key(&self, keyid: &KeyID) -> Option<SecretKey> {
        self.secrets.get(keyid).cloned()
    }

    fn passphrase(&self, keyid: &KeyID) -> Option<Password> {
        self.passphrases.get(keyid).cloned()
    }

    fn keys_for_user_id(&self, user_id: &str) -> Vec<KeyID> {
        self.user_ids.get(user_id).cloned().unwrap_or_default()
    }
}

/// Frames `body` as a new-format packet.
pub fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut p = vec![0xc0 | tag];
    let len = body.len();
    if len < 192 {
        p.push(len as u8);
    } else if len < 8384 {
        let l = len - 192;
        p.push(((l >> 8) + 192) as u8);
        p.push((l & 0xff) as u8);
    } else {
        p.push(255);
        p.extend_from_slice(&(len as u32).to_be_bytes());
    }
    p.extend_from_slice(body);
    p
}

/// A literal data packet.
pub fn literal(data: &[u8], filename: &[u8], date: u32) -> Vec<u8> {
    let mut body = vec![b'b', filename.len() as u8];
    body.extend_from_slice(filename);
    body.extend_from_slice(&date.to_be_bytes());
    body.extend_from_slice(data);
    packet(11, &body)
}

/// A one-pass signature packet announcing `signer`.
pub fn one_pass_sig(signer: &TestKey, hash_algo: HashAlgorithm, last: bool)
    -> Vec<u8>
{
    let mut body = vec![
        3,
        SignatureType::Binary.into(),
        hash_algo.into(),
        PublicKeyAlgorithm::RSAEncryptSign.into(),
    ];
    body.extend_from_slice(signer.keyid.as_bytes());
    body.push(last as u8);
    packet(4, &body)
}

/// A v4 binary signature over `data` by `signer`.
pub fn signature(signer: &TestKey, hash_algo: HashAlgorithm, data: &[u8])
    -> Vec<u8>
{
    let hashed_area = issuer_subpacket(&signer.keyid);

    // The signed digest: the data, closed by the v4 trailer.
    let shell = Signature {
        version: 4,
        sigtype: SignatureType::Binary,
        pk_algo: PublicKeyAlgorithm::RSAEncryptSign,
        hash_algo,
        hashed_area: hashed_area.clone(),
        unhashed_area: Vec::new(),
        digest_prefix: [0, 0],
        mpis: Vec::new(),
    };
    let digest = match hash_algo {
        HashAlgorithm::SHA1 => {
            let mut h = Sha1::new();
            DynDigest::update(&mut h, data);
            shell.hash_trailer(&mut h);
            Digest::finalize(h).to_vec()
        }
        HashAlgorithm::SHA256 => {
            let mut h = Sha256::new();
            DynDigest::update(&mut h, data);
            shell.hash_trailer(&mut h);
            Digest::finalize(h).to_vec()
        }
        _ => panic!("unsupported hash algorithm in the composer"),
    };

    let scheme = match hash_algo {
        HashAlgorithm::SHA1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::SHA256 => Pkcs1v15Sign::new::<Sha256>(),
        _ => unreachable!(),
    };
    let sig = signer.rsa.sign(scheme, &digest).expect("RSA signing");

    let mut body = vec![
        4,
        SignatureType::Binary.into(),
        PublicKeyAlgorithm::RSAEncryptSign.into(),
        hash_algo.into(),
    ];
    body.extend_from_slice(&(hashed_area.len() as u16).to_be_bytes());
    body.extend_from_slice(&hashed_area);
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&digest[..2]);
    MPI::new(&sig).serialize(&mut body);
    packet(2, &body)
}

/// A compressed data packet around an inner packet sequence.
pub fn compressed(algo: u8, inner: &[u8]) -> Vec<u8> {
    let mut body = vec![algo];
    match algo {
        0 => body.extend_from_slice(inner),
        1 => {
            let mut enc = flate2::write::DeflateEncoder::new(
                Vec::new(), flate2::Compression::default());
            enc.write_all(inner).unwrap();
            body.extend_from_slice(&enc.finish().unwrap());
        }
        2 => {
            let mut enc = flate2::write::ZlibEncoder::new(
                Vec::new(), flate2::Compression::default());
            enc.write_all(inner).unwrap();
            body.extend_from_slice(&enc.finish().unwrap());
        }
        3 => {
            let mut enc = bzip2::write::BzEncoder::new(
                Vec::new(), bzip2::Compression::default());
            enc.write_all(inner).unwrap();
            body.extend_from_slice(&enc.finish().unwrap());
        }
        _ => panic!("unsupported compression algorithm in the composer"),
    }
    packet(8, &body)
}

/// A PKESK packet carrying `session_key` for `recipient`.
pub fn pkesk(recipient: &TestKey, algo: SymmetricAlgorithm,
             session_key: &[u8])
    -> Vec<u8>
{
    let mut payload = vec![algo.into()];
    payload.extend_from_slice(session_key);
    let sum: u32 =
        session_key.iter().map(|&b| b as u32).sum::<u32>() & 0xffff;
    payload.extend_from_slice(&[(sum >> 8) as u8, sum as u8]);

    let esk = recipient.rsa.to_public_key()
        .encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, &payload)
        .expect("RSA encryption");

    let mut body = vec![3];
    body.extend_from_slice(recipient.keyid.as_bytes());
    body.push(PublicKeyAlgorithm::RSAEncryptSign.into());
    MPI::new(&esk).serialize(&mut body);
    packet(1, &body)
}

/// An integrity protected encryption container around an inner packet
/// sequence.
pub fn seip(algo: SymmetricAlgorithm, session_key: &[u8], inner: &[u8])
    -> Vec<u8>
{
    let block_size = 16;

    let mut plaintext = vec![0u8; block_size];
    rand::rngs::OsRng.fill_bytes(&mut plaintext);
    let (a, b) = (plaintext[block_size - 2], plaintext[block_size - 1]);
    plaintext.push(a);
    plaintext.push(b);
    plaintext.extend_from_slice(inner);
    plaintext.extend_from_slice(&[0xd3, 0x14]);

    let mut h = Sha1::new();
    Digest::update(&mut h, &plaintext);
    let mdc = Digest::finalize(h);
    plaintext.extend_from_slice(&mdc);

    let iv = [0u8; 16];
    match algo {
        SymmetricAlgorithm::AES128 => {
            BufEncryptor::<Aes128>::new_from_slices(session_key, &iv)
                .unwrap()
                .encrypt(&mut plaintext);
        }
        SymmetricAlgorithm::AES256 => {
            BufEncryptor::<Aes256>::new_from_slices(session_key, &iv)
                .unwrap()
                .encrypt(&mut plaintext);
        }
        _ => panic!("unsupported cipher in the composer"),
    }

    let mut body = vec![1];
    body.extend_from_slice(&plaintext);
    packet(18, &body)
}

/// Applies ASCII armor.
pub fn armored(binary: &[u8]) -> Vec<u8> {
    let mut w = armor::Writer::new(Vec::new(), armor::Kind::Message);
    w.write_all(binary).unwrap();
    w.finalize().unwrap()
}

/// A fresh random session key for `algo`.
pub fn session_key(algo: SymmetricAlgorithm) -> Vec<u8> {
    let mut key = vec![0u8; algo.key_size().unwrap()];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Composes a complete signed, compressed, encrypted message.
///
/// Layout: PKESK* (SEIP (COMPRESSED (OPS LITERAL SIG*))).
pub struct MessageBuilder<'k> {
    pub plaintext: Vec<u8>,
    pub filename: Vec<u8>,
    pub date: u32,
    pub recipients: Vec<&'k TestKey>,
    pub signers: Vec<(&'k TestKey, HashAlgorithm)>,
    pub cipher: SymmetricAlgorithm,
    /// Compression algorithm identifier; `None` leaves the signed data
    /// uncompressed and unwrapped.
    pub compression: Option<u8>,
    pub armor: bool,
}

impl<'k> MessageBuilder<'k> {
    pub fn new(plaintext: &[u8]) -> MessageBuilder<'k> {
        MessageBuilder {
            plaintext: plaintext.to_vec(),
            filename: Vec::new(),
            date: 0,
            recipients: Vec::new(),
            signers: Vec::new(),
            cipher: SymmetricAlgorithm::AES256,
            compression: None,
            armor: false,
        }
    }

    pub fn recipient(mut self, key: &'k TestKey) -> Self {
        self.recipients.push(key);
        self
    }

    pub fn signer(mut self, key: &'k TestKey, hash: HashAlgorithm) -> Self {
        self.signers.push((key, hash));
        self
    }

    pub fn cipher(mut self, cipher: SymmetricAlgorithm) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn compression(mut self, algo: u8) -> Self {
        self.compression = Some(algo);
        self
    }

    pub fn armored(mut self) -> Self {
        self.armor = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        // The signed region: one-pass framing, the literal data, and
        // the trailing signatures in reverse announcement order.
        let mut signed = Vec::new();
        for (i, (signer, hash)) in self.signers.iter().enumerate() {
            let last = i + 1 == self.signers.len();
            signed.extend_from_slice(&one_pass_sig(signer, *hash, last));
        }
        signed.extend_from_slice(
            &literal(&self.plaintext, &self.filename, self.date));
        for (signer, hash) in self.signers.iter().rev() {
            signed.extend_from_slice(
                &signature(signer, *hash, &self.plaintext));
        }

        let inner = match self.compression {
            Some(algo) => compressed(algo, &signed),
            None => signed,
        };

        let mut message = Vec::new();
        if self.recipients.is_empty() {
            message = inner;
        } else {
            let sk = session_key(self.cipher);
            for recipient in &self.recipients {
                message.extend_from_slice(
                    &pkesk(recipient, self.cipher, &sk));
            }
            message.extend_from_slice(&seip(self.cipher, &sk, &inner));
        }

        if self.armor {
            armored(&message)
        } else {
            message
        }
    }
}
