//! Verification policies.
//!
//! A [`VerificationPolicy`] states which signers a message must carry
//! valid signatures from.  The policy is applied exactly once, at
//! end-of-stream, against the signature contexts collected from the
//! one-pass signature packets and the signature packets trailing the
//! literal data.
//!
//! The policy set is fixed, so it is a plain enum dispatched by
//! matching; there is no open-ended strategy trait to implement.

use crate::crypto::Backend;
use crate::keyring::Keyring;
use crate::packet::Signature;
use crate::parse::stream::SignatureContext;
use crate::{Error, KeyID, Result};

/// Whether to trace execution by default (on stderr).
const TRACE: bool = false;

/// What the trailing signatures of a message must satisfy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationPolicy {
    /// Do not check signatures at all.
    ///
    /// Signature contexts are still collected (they are harmless), but
    /// nothing is validated at end-of-stream.
    Ignore,
    /// At least one trailing signature must verify against a known
    /// key.
    RequireAny,
    /// Every listed key must have produced a valid trailing
    /// signature.
    RequireAllKeys(Vec<KeyID>),
    /// Every listed user ID must be covered by a valid trailing
    /// signature from one of its keys, as resolved by
    /// [`Keyring::keys_for_user_id`].
    RequireAllUserIds(Vec<String>),
}

impl VerificationPolicy {
    /// Returns whether this policy needs the message to be signed.
    pub fn requires_signature(&self) -> bool {
        !matches!(self, VerificationPolicy::Ignore)
    }

    /// Applies the policy.
    ///
    /// `contexts` hold the completed data hashes keyed by signer;
    /// `sigs` are the signature packets that trailed the literal data.
    pub(crate) fn validate(&self, contexts: &[SignatureContext],
                           sigs: &[Signature], keyring: &dyn Keyring,
                           backend: &dyn Backend)
        -> Result<()>
    {
        tracer!(TRACE, "VerificationPolicy::validate");

        match self {
            VerificationPolicy::Ignore => Ok(()),

            VerificationPolicy::RequireAny => {
                if sigs.is_empty() {
                    return Err(Error::NoTrailingSignature.into());
                }
                if sigs.iter().any(|sig| checks_out(contexts, sig, backend))
                {
                    Ok(())
                } else {
                    // Name the signers whose signatures did not hold
                    // up.
                    let mut key_ids: Vec<KeyID> =
                        sigs.iter().filter_map(|sig| sig.issuer()).collect();
                    key_ids.dedup();
                    Err(Error::MissingSignatures {
                        key_ids,
                        user_ids: Vec::new(),
                    }.into())
                }
            }

            VerificationPolicy::RequireAllKeys(required) => {
                if sigs.is_empty() {
                    return Err(Error::NoTrailingSignature.into());
                }
                let missing: Vec<KeyID> = required.iter()
                    .filter(|&&keyid| !key_satisfied(
                        keyid, contexts, sigs, backend))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    t!("Unsatisfied keys: {:?}", missing);
                    Err(Error::MissingSignatures {
                        key_ids: missing,
                        user_ids: Vec::new(),
                    }.into())
                }
            }

            VerificationPolicy::RequireAllUserIds(required) => {
                if sigs.is_empty() {
                    return Err(Error::NoTrailingSignature.into());
                }
                // A user ID is satisfied by any of its keys.
                let missing: Vec<String> = required.iter()
                    .filter(|user_id| {
                        !keyring.keys_for_user_id(user_id).into_iter()
                            .any(|keyid| key_satisfied(
                                keyid, contexts, sigs, backend))
                    })
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    t!("Unsatisfied user IDs: {:?}", missing);
                    Err(Error::MissingSignatures {
                        key_ids: Vec::new(),
                        user_ids: missing,
                    }.into())
                }
            }
        }
    }
}

/// Returns whether some trailing signature by `keyid` verifies.
fn key_satisfied(keyid: KeyID, contexts: &[SignatureContext],
                 sigs: &[Signature], backend: &dyn Backend)
    -> bool
{
    sigs.iter()
        .filter(|sig| sig.issuer() == Some(keyid))
        .any(|sig| checks_out(contexts, sig, backend))
}

/// Returns whether `sig` verifies against any matching context.
///
/// Several contexts may share a key ID; any one of them verifying the
/// signature counts.  No one-to-one pairing is enforced.
fn checks_out(contexts: &[SignatureContext], sig: &Signature,
              backend: &dyn Backend)
    -> bool
{
    tracer!(TRACE, "checks_out");

    let issuer = match sig.issuer() {
        Some(issuer) => issuer,
        None => {
            t!("Trailing signature without an issuer");
            return false;
        }
    };

    contexts.iter()
        .filter(|ctx| ctx.issuer == issuer)
        .any(|ctx| {
            if ctx.hash_algo != sig.hash_algo {
                t!("Hash algorithm mismatch for {}", issuer);
                return false;
            }

            // Close the hashed data with the signature's trailer.
            let mut hasher = ctx.hasher.box_clone();
            sig.hash_trailer(hasher.as_mut());
            let digest = hasher.finalize();

            // The stored digest prefix is a cheap first filter.
            if digest[..2] != sig.digest_prefix {
                t!("Digest prefix mismatch for {}", issuer);
                return false;
            }

            match backend.verify(&ctx.key, sig.hash_algo, &digest,
                                 &sig.mpis) {
                Ok(good) => {
                    t!("Signature by {}: {}", issuer,
                       if good { "good" } else { "bad" });
                    good
                }
                Err(e) => {
                    t!("Cannot verify signature by {}: {}", issuer, e);
                    false
                }
            }
        })
}
