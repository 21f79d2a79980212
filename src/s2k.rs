//! String-to-Key (S2K) specifiers.
//!
//! See [Section 3.7 of RFC 4880] for details.
//!
//!   [Section 3.7 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-3.7

use std::cmp;

use crate::crypto::{Backend, Password, SessionKey};
use crate::types::HashAlgorithm;
use crate::Result;

/// A string-to-key specifier, turning a passphrase into a symmetric
/// key.
///
/// `salt` is absent for the Simple variant; `coded_count` is only
/// present for the Iterated and Salted variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S2K {
    /// Hash algorithm used to derive the key.
    pub hash_algo: HashAlgorithm,
    /// Public salt value mixed into the passphrase.
    pub salt: Option<[u8; 8]>,
    /// Coded iteration count.
    pub coded_count: Option<u8>,
}

impl S2K {
    /// Returns the iteration count.
    pub fn iteration_count(&self) -> u32 {
        if let Some(cc) = self.coded_count {
            let cc = cc as u32;
            (16u32 + (cc & 15)) << ((cc >> 4) + 6)
        } else {
            0
        }
    }

    /// Converts the passphrase to a key using this S2K's parameters.
    pub fn derive(&self, password: &Password, key_size: usize,
                  backend: &dyn Backend)
                  -> Result<SessionKey> {
        let string = password.as_ref();
        let h = backend.hasher(self.hash_algo)?;
        let digest_size = h.output_size();

        // If the digest length is shorter than the key length, then we
        // need to concatenate multiple hashes, each preloaded with i
        // 0s.
        let contexts = (key_size + digest_size - 1) / digest_size;

        let mut hs = Vec::with_capacity(contexts);
        hs.push(h);

        let zeros = vec![0u8; contexts.saturating_sub(1)];
        for i in 1..contexts {
            let mut h = backend.hasher(self.hash_algo)?;
            h.update(&zeros[..i]);
            hs.push(h);
        }

        fn update(hs: &mut [Box<dyn digest::DynDigest>], data: &[u8]) {
            for h in hs.iter_mut() {
                h.update(data);
            }
        }

        // Independent of what the iteration count is, we always hash
        // the whole salt and passphrase once.
        let salt_len = if let Some(salt) = self.salt {
            update(&mut hs, &salt[..]);
            salt.len()
        } else {
            0
        };
        update(&mut hs, string);

        let mut todo = self.iteration_count() as usize
            - cmp::min(self.iteration_count() as usize,
                       salt_len + string.len());

        while todo > 0 {
            if let Some(salt) = self.salt {
                let l = cmp::min(salt.len(), todo);
                todo -= l;
                update(&mut hs, &salt[..l]);
            }

            let l = cmp::min(string.len(), todo);
            todo -= l;
            update(&mut hs, &string[..l]);
        }

        let mut key = vec![0u8; key_size];
        let mut start = 0;
        for h in hs.iter_mut() {
            let end = cmp::min(start + digest_size, key_size);
            let digest = h.finalize_reset();
            key[start..end].copy_from_slice(&digest[..end - start]);
            start = end;
        }

        Ok(SessionKey::from(key))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::RustCryptoBackend;
    use crate::to_hex;

    #[test]
    fn iteration_counts() {
        let s2k = S2K {
            hash_algo: HashAlgorithm::SHA1,
            salt: Some([0; 8]),
            coded_count: Some(96),
        };
        assert_eq!(s2k.iteration_count(), 65536);

        let simple = S2K {
            hash_algo: HashAlgorithm::SHA1,
            salt: None,
            coded_count: None,
        };
        assert_eq!(simple.iteration_count(), 0);
    }

    /// Key derivation vectors cross-checked against GnuPG.
    #[test]
    fn derive_vectors() {
        struct Test<'a> {
            s2k: S2K,
            key_size: usize,
            password: &'a [u8],
            key_hex: &'a str,
        }

        let tests = [
            Test {
                s2k: S2K {
                    hash_algo: HashAlgorithm::SHA1,
                    salt: None,
                    coded_count: None,
                },
                key_size: 32,
                password: &b"1234"[..],
                key_hex: "7110EDA4D09E062AA5E4A390B0A572AC0D2C0220F352B0D292B65164C2A67301",
            },
            Test {
                s2k: S2K {
                    hash_algo: HashAlgorithm::SHA1,
                    salt: Some([0xa8, 0x42, 0xa7, 0xa9, 0x59, 0xfa, 0x42, 0x2a]),
                    coded_count: None,
                },
                key_size: 32,
                password: &b"123456"[..],
                key_hex: "8B79077CA448F6FB3D3AD2A264D3B938D357C9FB3E41219FD962DF960A9AFA08",
            },
            Test {
                s2k: S2K {
                    hash_algo: HashAlgorithm::SHA1,
                    salt: Some([0x78, 0x45, 0xf0, 0x5b, 0x55, 0xf7, 0xb4, 0x9e]),
                    coded_count: Some(241),
                },
                key_size: 32,
                password: &b"qwerty"[..],
                key_hex: "575AD156187A3F8CEC11108309236EB499F1E682F0D1AFADFAC4ECF97613108A",
            },
            Test {
                s2k: S2K {
                    hash_algo: HashAlgorithm::SHA1,
                    salt: Some([0xb9, 0x67, 0xea, 0x96, 0x53, 0xdb, 0x6a, 0xc8]),
                    coded_count: Some(43),
                },
                key_size: 32,
                password: &b"9876"[..],
                key_hex: "736C226B8C64E4E6D0325C6C552EF7C0738F98F48FED65FD8C93265103EFA23A",
            },
            Test {
                s2k: S2K {
                    hash_algo: HashAlgorithm::SHA1,
                    salt: Some([0x8f, 0x81, 0x74, 0xc5, 0xd9, 0x61, 0xc7, 0x79]),
                    coded_count: Some(238),
                },
                key_size: 24,
                password: &b"123"[..],
                key_hex: "915E96FC694E7F90A6850B740125EA005199C725F3BD27E3",
            },
        ];

        let backend = RustCryptoBackend::default();
        for test in tests.iter() {
            let key = test.s2k
                .derive(&Password::from(test.password), test.key_size, &backend)
                .unwrap();
            assert_eq!(to_hex(&key, false), test.key_hex);
        }
    }
}
