//! Streaming decryption and verification.
//!
//! This module provides the decoding pipeline for OpenPGP messages.
//! [`Decryptor`] eagerly unwraps the nested containers of a message —
//! encrypted data, compressed data, one-pass signature framing — up to
//! the literal data, then hands the payload to the caller as an
//! [`std::io::Read`].
//!
//! Signature verification requires the whole message: the signature
//! packets trail the data they sign.  Every byte the caller reads is
//! therefore fed to the hash contexts announced by the one-pass
//! signature packets, and when the payload is exhausted the trailing
//! signature packets are read and checked against the configured
//! [`VerificationPolicy`] — exactly once.  A policy failure surfaces as
//! an error on the read that observed end-of-stream; until that read
//! has succeeded, the data must be treated as unverified.

use std::io::{self, Read};
use std::mem;

use digest::DynDigest;

use crate::armor;
use crate::crypto::{Backend, CfbDecrypt, SessionKey};
use crate::keyring::{Keyring, PublicKey};
use crate::packet::{Literal, OnePassSig, Packet, Signature, PKESK};
use crate::parse::{
    BodyReader,
    Container,
    Decompressor,
    External,
    Item,
    PacketReader,
    Source,
    MAX_NESTING_DEPTH,
};
use crate::policy::VerificationPolicy;
use crate::types::{HashAlgorithm, SignatureType, SymmetricAlgorithm};
use crate::{Error, KeyID, Result};

/// Whether to trace execution by default (on stderr).
const TRACE: bool = false;

/// The size of an MDC packet, header included.
const MDC_PACKET_LEN: usize = 22;

/// Decrypts and verifies an OpenPGP message.
///
/// Equivalent to [`Decryptor::from_reader`].  The input may be ASCII
/// armored or binary; both are accepted transparently.
pub fn decrypt_and_verify<'a, R>(reader: R, keyring: &'a dyn Keyring,
                                 policy: VerificationPolicy,
                                 backend: &'a dyn Backend)
    -> Result<Decryptor<'a>>
where
    R: Read + 'a,
{
    Decryptor::from_reader(reader, keyring, policy, backend)
}

/// A live one-pass signature verification.
///
/// Created when a one-pass signature packet announces a signer whose
/// public key the keyring knows; consumed when the trailing signature
/// packets are checked at end-of-stream.
pub(crate) struct SignatureContext {
    pub(crate) issuer: KeyID,
    pub(crate) hash_algo: HashAlgorithm,
    pub(crate) key: PublicKey,
    pub(crate) hasher: Box<dyn DynDigest>,
}

/// Decrypts and verifies an OpenPGP message, streaming the plaintext.
///
/// See the [module documentation](self) for the verification model.
/// The stream does not support seeking: the signature hash state only
/// moves forward.
pub struct Decryptor<'a> {
    keyring: &'a dyn Keyring,
    backend: &'a dyn Backend,
    policy: VerificationPolicy,
    literal: Literal,
    state: State<'a>,
}

impl std::fmt::Debug for Decryptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decryptor").finish_non_exhaustive()
    }
}

enum State<'a> {
    /// Streaming the literal data payload.
    Streaming {
        body: BodyReader<'a>,
        contexts: Vec<SignatureContext>,
    },
    /// End-of-stream processing has run; subsequent reads yield EOF.
    Done,
}

impl<'a> Decryptor<'a> {
    /// Creates a `Decryptor` from the given reader.
    pub fn from_reader<R>(reader: R, keyring: &'a dyn Keyring,
                          policy: VerificationPolicy,
                          backend: &'a dyn Backend)
        -> Result<Decryptor<'a>>
    where
        R: Read + 'a,
    {
        Decryptor::from_source(detect_armor(reader)?, keyring, policy,
                               backend)
    }

    /// Creates a `Decryptor` from the given buffer.
    pub fn from_bytes(bytes: &'a [u8], keyring: &'a dyn Keyring,
                      policy: VerificationPolicy,
                      backend: &'a dyn Backend)
        -> Result<Decryptor<'a>>
    {
        Decryptor::from_reader(bytes, keyring, policy, backend)
    }

    /// Returns the metadata of the literal data packet whose payload
    /// this stream produces.
    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    /// Returns true once the whole message, including its trailing
    /// signatures, has been processed.
    pub fn message_processed(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Unwraps the message's containers up to the literal data.
    ///
    /// All session-key resolution, decryption layering, and signature
    /// context setup happens here; only payload bytes are produced
    /// lazily afterwards.
    fn from_source(source: Box<dyn Source + 'a>, keyring: &'a dyn Keyring,
                   policy: VerificationPolicy, backend: &'a dyn Backend)
        -> Result<Decryptor<'a>>
    {
        tracer!(TRACE, "Decryptor::from_source");

        let mut source = source;
        let mut contexts: Vec<SignatureContext> = Vec::new();
        let mut saw_signatures = false;
        let mut depth = 0;

        'containers: loop {
            if depth > MAX_NESTING_DEPTH {
                return Err(Error::MalformedMessage(
                    format!("Message nests deeper than {} containers",
                            MAX_NESTING_DEPTH)).into());
            }

            let mut reader = PacketReader::new(source);
            let mut pkesks: Vec<PKESK> = Vec::new();

            loop {
                match reader.next()? {
                    Item::Packet(Packet::PKESK(pkesk)) => {
                        t!("Recipient {}", pkesk.recipient);
                        pkesks.push(pkesk);
                    }

                    Item::Packet(Packet::OnePassSig(ref ops)) => {
                        saw_signatures = true;
                        if let Some(ctx) = make_context(ops, keyring, backend)
                        {
                            contexts.push(ctx);
                        }
                    }

                    // A signature before the literal data (the historic
                    // SIG LITERAL layout) cannot be checked in one
                    // pass; it does not participate in decoding.
                    Item::Packet(Packet::Signature(_)) => (),

                    Item::Container(Container::Seip(_, body)) => {
                        let (algo, key) =
                            resolve_session_key(&pkesks, keyring, backend)?;
                        t!("Decrypting with {}", algo);
                        source = Box::new(
                            SeipReader::new(body, algo, &key, backend)?);
                        depth += 1;
                        continue 'containers;
                    }

                    Item::Container(Container::Compressed(c, body)) => {
                        t!("Decompressing {}", c.algo);
                        source = Box::new(Decompressor::new(c.algo, body)?);
                        depth += 1;
                        continue 'containers;
                    }

                    Item::Container(Container::Literal(literal, body)) => {
                        // An unsigned message cannot satisfy a
                        // signature-requiring policy; fail before any
                        // plaintext is produced.  Signed messages with
                        // no usable signer key proceed: the policy
                        // names the missing signers at end-of-stream.
                        if policy.requires_signature() && !saw_signatures {
                            return Err(Error::SignatureRequired.into());
                        }
                        return Ok(Decryptor {
                            keyring,
                            backend,
                            policy,
                            literal,
                            state: State::Streaming { body, contexts },
                        });
                    }

                    Item::Eof => return Err(Error::NoLiteralData.into()),
                }
            }
        }
    }

    /// Like `io::Read::read()`, but returns our `Result`.
    fn read_helper(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = match &mut self.state {
            State::Done => return Ok(0),
            State::Streaming { body, contexts } => {
                let n = body.read(buf)?;
                for ctx in contexts.iter_mut() {
                    ctx.hasher.update(&buf[..n]);
                }
                n
            }
        };

        if n == 0 {
            self.finalize()?;
        }
        Ok(n)
    }

    /// Runs end-of-stream processing: reads the trailing signature
    /// packets, unwinds the container layers (which runs their
    /// integrity checks), and applies the verification policy.
    ///
    /// The state moves to `Done` before anything can fail, so this
    /// runs at most once per message.
    fn finalize(&mut self) -> Result<()> {
        tracer!(TRACE, "Decryptor::finalize");

        let state = mem::replace(&mut self.state, State::Done);
        let State::Streaming { body, contexts } = state else {
            return Ok(());
        };

        let mut reader = PacketReader::new(body.into_inner());
        let mut sigs: Vec<Signature> = Vec::new();
        let mut parse_error = None;
        loop {
            match reader.next() {
                Ok(Item::Packet(Packet::Signature(sig))) => {
                    t!("Trailing signature by {:?}", sig.issuer());
                    sigs.push(sig);
                }
                Ok(Item::Packet(_)) => (),
                Ok(Item::Container(c)) => {
                    let (Container::Seip(_, b)
                         | Container::Compressed(_, b)
                         | Container::Literal(_, b)) = c;
                    let (recovered, _) = b.drain();
                    reader = PacketReader::new(recovered);
                    parse_error = Some(Error::MalformedMessage(
                        "Container packet after the literal data".into())
                        .into());
                    break;
                }
                Ok(Item::Eof) => break,
                Err(e) => {
                    parse_error = Some(e);
                    break;
                }
            }
        }

        // Unwind the layers.  This drains and checks the integrity
        // state each one owns: the MDC of an encryption layer, the
        // CRC-24 of an armor layer.  A manipulated message must be
        // reported as such even if the garbled trailer also failed to
        // parse, so this takes precedence.
        match reader.into_source() {
            Some(source) => source.finish()?,
            None => (),
        }
        if let Some(e) = parse_error {
            return Err(e);
        }

        self.policy.validate(&contexts, &sigs, self.keyring, self.backend)
    }
}

impl<'a> Read for Decryptor<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_helper(buf) {
            Ok(n) => Ok(n),
            Err(e) => match e.downcast::<io::Error>() {
                // An io::Error.  Pass as-is.
                Ok(e) => Err(e),
                // Our error.  Wrap it.
                Err(e) => match e.downcast::<Error>() {
                    Ok(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
                    Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
                },
            },
        }
    }
}

/// Routes the input through an armor decoder if it does not start
/// with a binary packet header.
///
/// The CTB of a binary packet always has bit 7 set; no line of armored
/// text starts with such an octet.
fn detect_armor<'a, R>(mut reader: R) -> Result<Box<dyn Source + 'a>>
where
    R: Read + 'a,
{
    let mut first = [0u8; 1];
    let n = loop {
        match reader.read(&mut first) {
            Ok(n) => break n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    if n == 0 {
        // Empty input; let the packet reader report it.
        return Ok(Box::new(External(io::empty())));
    }

    let chained = io::Cursor::new([first[0]]).chain(reader);
    if first[0] & 0x80 != 0 {
        Ok(Box::new(External(chained)))
    } else {
        Ok(Box::new(armor::Reader::new(chained, None)))
    }
}

/// Creates a verification context for a one-pass signature, if it is
/// usable.
///
/// Signers without a known public key and algorithms the backend
/// cannot hash are skipped here; whether their absence matters is the
/// verification policy's question, asked at end-of-stream.
fn make_context(ops: &OnePassSig, keyring: &dyn Keyring,
                backend: &dyn Backend)
    -> Option<SignatureContext>
{
    tracer!(TRACE, "make_context");

    if ops.sigtype != SignatureType::Binary {
        t!("Ignoring a {} one-pass signature", ops.sigtype);
        return None;
    }
    let key = match keyring.public_key(&ops.issuer) {
        Some(key) => key,
        None => {
            t!("No public key for signer {}", ops.issuer);
            return None;
        }
    };
    let hasher = match backend.hasher(ops.hash_algo) {
        Ok(hasher) => hasher,
        Err(e) => {
            t!("Cannot hash with {}: {}", ops.hash_algo, e);
            return None;
        }
    };

    t!("Collecting a {} signature context for {}",
       ops.hash_algo, ops.issuer);
    Some(SignatureContext {
        issuer: ops.issuer,
        hash_algo: ops.hash_algo,
        key,
        hasher,
    })
}

/// Finds the session key among the encrypted session key packets
/// preceding an encryption container.
///
/// The entries are tried strictly in the order they appear.  A
/// candidate failing — no secret key, a wrong passphrase, a decryption
/// or checksum mismatch — only moves resolution on to the next entry:
/// real keyrings routinely hold only one of a message's several
/// recipient keys.
fn resolve_session_key(pkesks: &[PKESK], keyring: &dyn Keyring,
                       backend: &dyn Backend)
    -> Result<(SymmetricAlgorithm, SessionKey)>
{
    tracer!(TRACE, "resolve_session_key");

    for pkesk in pkesks {
        let secret = match keyring.secret_key(&pkesk.recipient) {
            Some(secret) => secret,
            None => {
                t!("No secret key for recipient {}", pkesk.recipient);
                continue;
            }
        };

        let passphrase = keyring.passphrase(&pkesk.recipient);
        let unlocked = match secret.unlock(passphrase.as_ref(), backend) {
            Ok(unlocked) => unlocked,
            Err(e) => {
                t!("Could not unlock key {}: {}", pkesk.recipient, e);
                continue;
            }
        };

        let payload =
            match backend.asymmetric_decrypt(&unlocked, &pkesk.esk) {
                Ok(payload) => payload,
                Err(e) => {
                    t!("Key {} does not decrypt this message: {}",
                       pkesk.recipient, e);
                    continue;
                }
            };

        match parse_session_key(&payload) {
            Ok(resolved) => {
                t!("Session key found via {}", pkesk.recipient);
                return Ok(resolved);
            }
            Err(e) => {
                t!("Bad session key payload via {}: {}",
                   pkesk.recipient, e);
                continue;
            }
        }
    }

    Err(Error::NoUsableKey.into())
}

/// Splits a decrypted PKESK payload into cipher and session key,
/// verifying the trailing checksum.
fn parse_session_key(payload: &[u8])
    -> Result<(SymmetricAlgorithm, SessionKey)>
{
    if payload.len() < 3 {
        return Err(Error::InvalidSessionKey(
            "Payload too short".into()).into());
    }

    let algo = SymmetricAlgorithm::from(payload[0]);
    let (key, checksum) = payload[1..].split_at(payload.len() - 3);

    let sum = key.iter().map(|&b| b as u32).sum::<u32>() & 0xffff;
    if sum != u16::from_be_bytes([checksum[0], checksum[1]]) as u32 {
        return Err(Error::InvalidSessionKey(
            "Checksum mismatch".into()).into());
    }
    if key.len() != algo.key_size()? {
        return Err(Error::InvalidSessionKey(
            format!("{} bytes of key material for {}", key.len(), algo))
            .into());
    }

    Ok((algo, SessionKey::new(key.to_vec())))
}

/// Decrypts the body of an integrity protected encryption container.
///
/// The trailing MDC packet is withheld from the produced stream and
/// checked against the running SHA-1 when the ciphertext is exhausted.
struct SeipReader<'a> {
    body: BodyReader<'a>,
    decryptor: Box<dyn CfbDecrypt>,
    mdc_hash: Box<dyn DynDigest>,
    /// Decrypted bytes not yet released.  The last `MDC_PACKET_LEN` of
    /// them are always retained: until the ciphertext ends they may be
    /// the modification detection code.
    held: Vec<u8>,
    done: bool,
}

impl<'a> SeipReader<'a> {
    fn new(mut body: BodyReader<'a>, algo: SymmetricAlgorithm,
           key: &SessionKey, backend: &dyn Backend)
        -> Result<SeipReader<'a>>
    {
        let block_size = algo.block_size()?;
        let iv = vec![0u8; block_size];
        let mut decryptor = backend.cfb_decryptor(algo, key, &iv)?;
        let mut mdc_hash = backend.hasher(HashAlgorithm::SHA1)?;

        // The random prefix: one block plus its last two octets
        // repeated.  With the session key already vetted by the PKESK
        // checksum, a repetition mismatch means the ciphertext was
        // altered.
        let mut prefix = vec![0u8; block_size + 2];
        body.read_exact(&mut prefix)
            .map_err(|_| Error::MalformedMessage(
                "Encrypted data shorter than its random prefix".into()))?;
        decryptor.decrypt(&mut prefix);
        if prefix[block_size - 2..block_size] != prefix[block_size..] {
            return Err(Error::ManipulatedMessage.into());
        }
        mdc_hash.update(&prefix);

        Ok(SeipReader {
            body,
            decryptor,
            mdc_hash,
            held: Vec::new(),
            done: false,
        })
    }

    fn check_mdc(&mut self) -> io::Result<()> {
        let manipulated = || io::Error::new(io::ErrorKind::Other,
                                            Error::ManipulatedMessage);

        if self.held.len() != MDC_PACKET_LEN
            || self.held[0] != 0xd3 || self.held[1] != 0x14
        {
            return Err(manipulated());
        }

        // The hash covers the MDC packet's own header.
        self.mdc_hash.update(&self.held[..2]);
        let digest = self.mdc_hash.finalize_reset();
        if digest[..] != self.held[2..] {
            return Err(manipulated());
        }
        Ok(())
    }
}

impl<'a> Read for SeipReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.done {
            return Ok(0);
        }

        loop {
            if self.held.len() > MDC_PACKET_LEN {
                let n = std::cmp::min(buf.len(),
                                      self.held.len() - MDC_PACKET_LEN);
                buf[..n].copy_from_slice(&self.held[..n]);
                self.mdc_hash.update(&self.held[..n]);
                self.held.drain(..n);
                return Ok(n);
            }

            let mut chunk = vec![0u8; buf.len() + MDC_PACKET_LEN];
            let got = self.body.read(&mut chunk)?;
            if got == 0 {
                self.check_mdc()?;
                self.done = true;
                return Ok(0);
            }
            self.decryptor.decrypt(&mut chunk[..got]);
            self.held.extend_from_slice(&chunk[..got]);
        }
    }
}

impl<'a> Source for SeipReader<'a> {
    fn finish(mut self: Box<Self>) -> Result<()> {
        // Draining runs the MDC check at EOF.
        let mut sink = io::sink();
        io::copy(&mut *self, &mut sink)?;
        let this = *self;
        Box::new(this.body).finish()
    }
}
