//! # purb
//!
//! Padded Uniform Random Blobs: encrypt one message for many recipients, who
//! may use different cryptographic suites, into a byte string that looks
//! uniformly random. No magic bytes, no length fields, no suite identifiers.
//!
//! ## Layout
//!
//! ```text
//! | nonce | cornerstones (per suite) | entry points (per recipient) | payload |
//! ```
//!
//! - **Cornerstone:** one ephemeral public key per suite, uniformly encoded.
//!   Its value is the XOR of the bytes at all of the suite's allowed
//!   positions, so suites may share positions.
//! - **Entry point:** the payload key and payload offset, wrapped under the
//!   secret a recipient shares with its suite's cornerstone.
//! - **Payload:** length-prefixed plaintext with random padding up to a Padmé
//!   length, encrypted with ChaCha20-Poly1305.
//!
//! Free header space is random filler.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use purb::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut rng = rand::rngs::OsRng;
//! let suite: Arc<dyn Suite> = Arc::new(X25519Suite::new("x25519"));
//! let info_map = SuiteInfoMap::new(&[("x25519", X25519_KEY_LEN)]);
//! let config = PurbConfig::default();
//!
//! let alice = Recipient::generate(Arc::clone(&suite), &mut rng);
//! let bob = Recipient::generate(Arc::clone(&suite), &mut rng);
//!
//! let blob = encode(
//!     b"Hello, PURB!",
//!     &[alice.public_only(), bob.public_only()],
//!     &info_map,
//!     &config,
//!     &mut rng,
//! )?;
//!
//! assert_eq!(decode(&blob, &alice, &info_map, &config)?, b"Hello, PURB!");
//! assert_eq!(decode(&blob, &bob, &info_map, &config)?, b"Hello, PURB!");
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Considerations
//!
//! - The suite info map and [`PurbConfig`] are public but must reach every
//!   recipient out of band; nothing in the blob signals them.
//! - Decoding failures are all reported as [`PurbError::DecryptionFailure`].
//! - The X25519 hiding encoding only randomizes the unused top bit; plug in
//!   an Elligator-style [`Suite`] where full indistinguishability matters.

mod crypto;
mod errors;
mod header;
mod purb;
mod region;
mod suite;
mod types;

pub use crypto::{entry_point_slot_hash, padded_payload_len, padme};
pub use errors::PurbError;
pub use header::{
    cornerstone_value, entry_point_candidates, entry_point_table_offset, Cornerstone, EntryPoint,
    Header, MAX_ENTRY_POINT_TABLES,
};
pub use self::purb::{decode, encode, Purb};
pub use region::{Region, RegionReservation};
pub use suite::*;
pub use types::*;
