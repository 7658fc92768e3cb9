//! PURB header: cornerstone placement and the entry point table.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand_core::CryptoRngCore;
use tracing::debug;

use crate::crypto::{entry_point_slot_hash, wrap_entry_point};
use crate::errors::PurbError;
use crate::region::RegionReservation;
use crate::suite::{PrivateKey, PublicKey, Recipient, SharedSecret, Suite};
use crate::types::*;

/// Upper bound on the number of hash tables tried for one entry point.
pub const MAX_ENTRY_POINT_TABLES: usize = 24;

/// Ephemeral key pair of one suite, shared by every recipient of that suite.
///
/// The value a decoder recovers is the XOR of the bytes at all of the
/// suite's candidate positions; only `offset` is written by this suite.
pub struct Cornerstone {
    pub suite_name: String,
    pub public: PublicKey,
    /// Dropped once the entry points are sealed.
    private: Option<PrivateKey>,
    /// Byte position this suite writes.
    pub offset: usize,
    /// Every candidate position of the suite under the container's layout.
    pub positions: Vec<usize>,
    bytes: Vec<u8>,
}

impl Cornerstone {
    /// Generate the key pair and encode its public key once. The encoding may
    /// be randomized, so it is never recomputed afterwards.
    fn generate(
        suite: &dyn Suite,
        offset: usize,
        positions: Vec<usize>,
        rng: &mut dyn CryptoRngCore,
    ) -> Self {
        let key_pair = suite.generate_keypair(rng);
        let bytes = suite.encode_uniform(&key_pair.public, rng);
        Self {
            suite_name: suite.name().to_string(),
            public: key_pair.public,
            private: Some(key_pair.private),
            offset,
            positions,
            bytes,
        }
    }

    /// Uniform encoding of the ephemeral public key.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }

    /// False once the header is sealed.
    pub fn has_private_key(&self) -> bool {
        self.private.is_some()
    }
}

impl fmt::Debug for Cornerstone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cornerstone")
            .field("suite_name", &self.suite_name)
            .field("offset", &self.offset)
            .field("positions", &self.positions)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One recipient's slot in the header.
pub struct EntryPoint {
    pub recipient: Recipient,
    /// Dropped once the entry point is sealed.
    shared_secret: Option<SharedSecret>,
    /// Starting byte position in the PURB.
    pub offset: usize,
    wrapped: Option<Vec<u8>>,
}

impl EntryPoint {
    /// Wrapped payload key, once the header is sealed.
    pub fn wrapped(&self) -> Option<&[u8]> {
        self.wrapped.as_deref()
    }

    /// Secret shared with the cornerstone, until the header is sealed.
    pub fn shared_secret(&self) -> Option<&[u8]> {
        self.shared_secret.as_ref().map(|s| s.as_slice())
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("suite", &self.recipient.suite_name())
            .field("offset", &self.offset)
            .field("sealed", &self.wrapped.is_some())
            .finish()
    }
}

/// Header of a PURB, nonce included.
#[derive(Debug)]
pub struct Header {
    /// Suite identifier to the entry points of its recipients, in recipient order.
    pub entry_points: BTreeMap<String, Vec<EntryPoint>>,
    /// Suite identifier to its cornerstone.
    pub cornerstones: BTreeMap<String, Cornerstone>,
    /// Order in which cornerstones must be written.
    pub write_order: Vec<String>,
    /// Final reservation state.
    pub layout: RegionReservation,
    /// Offset of the payload; every header byte lies before it.
    pub length: usize,
    pub entry_point_len: usize,
}

/// XOR of the `len`-byte ranges of `blob` starting at each of `positions`.
///
/// Positions whose range does not fit in `blob` are skipped; `None` when none fits.
pub fn cornerstone_value(blob: &[u8], positions: &[usize], len: usize) -> Option<Vec<u8>> {
    let mut value = vec![0u8; len];
    let mut any = false;
    for &p in positions {
        let Some(range) = blob.get(p..p + len) else {
            continue;
        };
        for (v, b) in value.iter_mut().zip(range) {
            *v ^= b;
        }
        any = true;
    }
    any.then_some(value)
}

/// Offset of the slot selected by `slot_hash` in entry point table `table`.
///
/// Table `t` holds `2^t` slots and follows tables `0..t`.
pub fn entry_point_table_offset(region_start: usize, table: usize, slot_hash: u64) -> usize {
    let slots = 1u64 << table;
    let base = region_start + ((1usize << table) - 1) * ENTRY_POINT_LEN;
    base + (slot_hash % slots) as usize * ENTRY_POINT_LEN
}

/// Every offset an entry point can have in a blob of `blob_len` bytes.
///
/// For the simplified layout this is every linear slot; otherwise it is the
/// one slot of each hash table selected by `slot_hash`.
pub fn entry_point_candidates(
    region_start: usize,
    blob_len: usize,
    simplified: bool,
    slot_hash: u64,
) -> Vec<usize> {
    let fits = |off: usize| off + ENTRY_POINT_LEN <= blob_len;
    if simplified {
        return (0..)
            .map(|i| region_start + i * ENTRY_POINT_LEN)
            .take_while(|&off| fits(off))
            .collect();
    }
    (0..MAX_ENTRY_POINT_TABLES)
        .take_while(|&t| fits(region_start + ((1usize << t) - 1) * ENTRY_POINT_LEN))
        .map(|t| entry_point_table_offset(region_start, t, slot_hash))
        .filter(|&off| fits(off))
        .collect()
}

impl Header {
    /// Place one cornerstone per suite in use, then one entry point per recipient.
    pub fn build(
        recipients: &[Recipient],
        info_map: &SuiteInfoMap,
        config: &PurbConfig,
        nonce: &[u8; NONCE_LEN],
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Self, PurbError> {
        if recipients.is_empty() {
            return Err(PurbError::NoRecipients);
        }

        let mut suites: BTreeMap<String, Arc<dyn Suite>> = BTreeMap::new();
        for r in recipients {
            info_map.coverage(r.suite_name(), r.suite.cornerstone_len())?;
            suites
                .entry(r.suite_name().to_string())
                .or_insert_with(|| Arc::clone(&r.suite));
        }

        let mut header = Header {
            entry_points: BTreeMap::new(),
            cornerstones: BTreeMap::new(),
            write_order: Vec::new(),
            layout: RegionReservation::new(),
            length: NONCE_LEN,
            entry_point_len: ENTRY_POINT_LEN,
        };
        header.place_cornerstones(&suites, info_map, config.simplified, rng)?;
        header.place_entry_points(recipients, info_map, config.simplified, nonce)?;
        // every candidate position of every suite lies inside the header
        header.length = header
            .layout
            .high_water_mark()
            .max(info_map.cornerstone_region_end(config.simplified));

        debug!(
            suites = header.cornerstones.len(),
            recipients = recipients.len(),
            header_len = header.length,
            simplified = config.simplified,
            "Built PURB header"
        );
        Ok(header)
    }

    fn place_cornerstones(
        &mut self,
        suites: &BTreeMap<String, Arc<dyn Suite>>,
        info_map: &SuiteInfoMap,
        simplified: bool,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<(), PurbError> {
        let used: Vec<&str> = suites.keys().map(String::as_str).collect();
        let plan = info_map.plan_cornerstones(&used, simplified)?;

        for (name, offset) in plan {
            let Some(suite) = suites.get(&name) else {
                return Err(PurbError::SuiteCoverage(format!("suite {name} not in use")));
            };
            let len = suite.cornerstone_len();
            self.layout
                .reserve(offset, offset + len, false, &format!("cornerstone {name}"));
            let positions = info_map.candidate_offsets(&name, simplified);
            debug!(suite = %name, offset, candidates = positions.len(), "Placed cornerstone");
            self.cornerstones.insert(
                name.clone(),
                Cornerstone::generate(suite.as_ref(), offset, positions, rng),
            );
            self.write_order.push(name);
        }
        Ok(())
    }

    fn place_entry_points(
        &mut self,
        recipients: &[Recipient],
        info_map: &SuiteInfoMap,
        simplified: bool,
        nonce: &[u8; NONCE_LEN],
    ) -> Result<(), PurbError> {
        let region_start = info_map.cornerstone_region_end(simplified);

        for (i, recipient) in recipients.iter().enumerate() {
            let name = recipient.suite_name();
            let private = self
                .cornerstones
                .get(name)
                .and_then(|c| c.private.as_ref())
                .ok_or_else(|| PurbError::SuiteCoverage(format!("no cornerstone for {name}")))?;
            let shared_secret = recipient
                .suite
                .key_agreement(private, &recipient.public_key)?;

            let tag = format!("entry point {name}/{i}");
            let offset = if simplified {
                let offset = region_start + i * ENTRY_POINT_LEN;
                self.reserve_entry_point(offset, &tag)?;
                offset
            } else {
                let slot_hash = entry_point_slot_hash(&shared_secret, nonce)?;
                (0..MAX_ENTRY_POINT_TABLES)
                    .map(|t| entry_point_table_offset(region_start, t, slot_hash))
                    .find(|&off| self.layout.reserve(off, off + ENTRY_POINT_LEN, true, &tag))
                    .ok_or_else(|| PurbError::AllocationConflict {
                        start: region_start,
                        end: region_start + ENTRY_POINT_LEN,
                        tag: tag.clone(),
                    })?
            };
            debug!(suite = %name, offset, "Placed entry point");

            self.entry_points
                .entry(name.to_string())
                .or_default()
                .push(EntryPoint {
                    recipient: recipient.clone(),
                    shared_secret: Some(shared_secret),
                    offset,
                    wrapped: None,
                });
        }
        Ok(())
    }

    fn reserve_entry_point(&mut self, offset: usize, tag: &str) -> Result<(), PurbError> {
        if self.layout.reserve(offset, offset + ENTRY_POINT_LEN, true, tag) {
            Ok(())
        } else {
            Err(PurbError::AllocationConflict {
                start: offset,
                end: offset + ENTRY_POINT_LEN,
                tag: tag.to_string(),
            })
        }
    }

    /// Wrap the payload key and payload offset into every entry point, then
    /// drop the shared secrets and the ephemeral private keys.
    pub fn seal_entry_points(
        &mut self,
        wrap: KeyWrap,
        nonce: &[u8; NONCE_LEN],
        payload_key: &[u8; PAYLOAD_KEY_LEN],
        payload_offset: usize,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<(), PurbError> {
        let offset = u32::try_from(payload_offset)
            .map_err(|_| PurbError::Malformed("header too large"))?;
        let mut plaintext = zeroize::Zeroizing::new([0u8; ENTRY_POINT_PLAINTEXT_LEN]);
        plaintext[..PAYLOAD_KEY_LEN].copy_from_slice(payload_key);
        plaintext[PAYLOAD_KEY_LEN..].copy_from_slice(&offset.to_be_bytes());

        for ep in self.entry_points.values_mut().flatten() {
            let secret = ep
                .shared_secret
                .take()
                .ok_or(PurbError::Malformed("entry points already sealed"))?;
            ep.wrapped = Some(wrap_entry_point(wrap, &secret, nonce, &plaintext, rng)?);
        }
        for c in self.cornerstones.values_mut() {
            c.private = None;
        }
        Ok(())
    }

    /// Write every cornerstone into `buf`, whose free bytes must already hold
    /// their final values. Each suite's written range is chosen so that the
    /// XOR over all of its positions equals its encoding.
    pub fn write_cornerstones(&self, buf: &mut [u8]) -> Result<(), PurbError> {
        for name in &self.write_order {
            let c = self
                .cornerstones
                .get(name)
                .ok_or(PurbError::Incomplete("create_header"))?;
            let len = c.bytes.len();
            let others: Vec<usize> = c
                .positions
                .iter()
                .copied()
                .filter(|&p| p != c.offset)
                .collect();
            let mut value = c.bytes.clone();
            if let Some(mask) = cornerstone_value(buf, &others, len) {
                for (v, m) in value.iter_mut().zip(&mask) {
                    *v ^= m;
                }
            }
            buf.get_mut(c.offset..c.end())
                .ok_or(PurbError::Malformed("cornerstone outside header"))?
                .copy_from_slice(&value);
        }
        Ok(())
    }

    /// Entry points of every suite.
    pub fn all_entry_points(&self) -> impl Iterator<Item = &EntryPoint> {
        self.entry_points.values().flatten()
    }
}
