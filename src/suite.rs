//! Cryptographic suites and recipients.
//!
//! A [`Suite`] bundles everything the PURB pipeline needs from a group:
//! key generation, a uniform ("hiding") encoding of public keys, and key
//! agreement. Placement logic never looks past the fixed encoding length.

use std::fmt;
use std::sync::Arc;

use rand_core::CryptoRngCore;
use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::errors::PurbError;

/// Shared secret produced by key agreement.
pub type SharedSecret = Zeroizing<Vec<u8>>;

/// Public key bytes in the suite's canonical (non-hidden) form.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [a, b, ..] => write!(f, "PublicKey({a:02x}{b:02x}..)"),
            _ => write!(f, "PublicKey(..)"),
        }
    }
}

/// Private scalar bytes, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// # Security
    ///
    /// Handle with care - this exposes the private key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// A public/private key pair of one suite.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// Capability set of a cryptographic suite.
pub trait Suite: Send + Sync {
    /// Identifier used as key in the suite info map.
    fn name(&self) -> &str;

    /// Length of the uniform encoding of a public key.
    fn cornerstone_len(&self) -> usize;

    /// Generate a fresh key pair whose public key has a uniform encoding.
    fn generate_keypair(&self, rng: &mut dyn CryptoRngCore) -> KeyPair;

    /// Encode a public key as a uniform-looking byte string of
    /// [`Suite::cornerstone_len`] bytes. May be randomized per call.
    fn encode_uniform(&self, public: &PublicKey, rng: &mut dyn CryptoRngCore) -> Vec<u8>;

    /// Inverse of [`Suite::encode_uniform`].
    fn decode_uniform(&self, bytes: &[u8]) -> Result<PublicKey, PurbError>;

    /// Diffie-Hellman style key agreement.
    fn key_agreement(
        &self,
        private: &PrivateKey,
        public: &PublicKey,
    ) -> Result<SharedSecret, PurbError>;
}

/// Length of X25519 keys and of their uniform encoding.
pub const X25519_KEY_LEN: usize = 32;

/// X25519 suite.
///
/// The uniform encoding is the little-endian u-coordinate with its unused top
/// bit drawn at random, so two encodings of the same key usually differ.
/// Several suites may share the group under different identifiers.
#[derive(Clone, Debug)]
pub struct X25519Suite {
    name: String,
}

impl X25519Suite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn key_bytes(bytes: &[u8], what: &'static str) -> Result<[u8; X25519_KEY_LEN], PurbError> {
        bytes
            .try_into()
            .map_err(|_| PurbError::KeyAgreementFailure(what))
    }
}

impl Default for X25519Suite {
    fn default() -> Self {
        Self::new("x25519")
    }
}

impl Suite for X25519Suite {
    fn name(&self) -> &str {
        &self.name
    }

    fn cornerstone_len(&self) -> usize {
        X25519_KEY_LEN
    }

    fn generate_keypair(&self, rng: &mut dyn CryptoRngCore) -> KeyPair {
        let mut seed = Zeroizing::new([0u8; X25519_KEY_LEN]);
        rng.fill_bytes(&mut seed[..]);
        let secret = StaticSecret::from(*seed);
        let public = DalekPublic::from(&secret);
        KeyPair {
            public: PublicKey(public.as_bytes().to_vec()),
            private: PrivateKey(secret.to_bytes().to_vec()),
        }
    }

    fn encode_uniform(&self, public: &PublicKey, rng: &mut dyn CryptoRngCore) -> Vec<u8> {
        let mut out = public.0.clone();
        if let Some(last) = out.last_mut() {
            *last = (*last & 0x7f) | ((rng.next_u32() as u8) & 0x80);
        }
        out
    }

    fn decode_uniform(&self, bytes: &[u8]) -> Result<PublicKey, PurbError> {
        let mut key = Self::key_bytes(bytes, "x25519 encoding length")?;
        key[X25519_KEY_LEN - 1] &= 0x7f;
        Ok(PublicKey(key.to_vec()))
    }

    fn key_agreement(
        &self,
        private: &PrivateKey,
        public: &PublicKey,
    ) -> Result<SharedSecret, PurbError> {
        let sk = Zeroizing::new(Self::key_bytes(&private.0, "x25519 private key length")?);
        let pk = Self::key_bytes(&public.0, "x25519 public key length")?;
        let secret = StaticSecret::from(*sk);
        let shared = secret.diffie_hellman(&DalekPublic::from(pk));
        if !shared.was_contributory() {
            return Err(PurbError::KeyAgreementFailure("low-order x25519 point"));
        }
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}

/// Someone a PURB is encrypted for.
///
/// The private key is only present on the decoding side.
#[derive(Clone)]
pub struct Recipient {
    pub suite: Arc<dyn Suite>,
    pub public_key: PublicKey,
    pub private_key: Option<PrivateKey>,
}

impl Recipient {
    /// A recipient known to the sender by its public key only.
    pub fn new(suite: Arc<dyn Suite>, public_key: PublicKey) -> Self {
        Self {
            suite,
            public_key,
            private_key: None,
        }
    }

    /// Generate a recipient with a fresh static key pair.
    pub fn generate<R: CryptoRngCore>(suite: Arc<dyn Suite>, rng: &mut R) -> Self {
        let pair = suite.generate_keypair(rng);
        Self {
            suite,
            public_key: pair.public,
            private_key: Some(pair.private),
        }
    }

    pub fn suite_name(&self) -> &str {
        self.suite.name()
    }

    /// Copy of this recipient without the private key, as the sender sees it.
    pub fn public_only(&self) -> Self {
        Self::new(Arc::clone(&self.suite), self.public_key.clone())
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient")
            .field("suite", &self.suite.name())
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
