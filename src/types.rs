//! Public parameters shared out of band and serialization utilities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::PurbError;

/// Length of the container nonce, stored at the very beginning of the PURB.
pub const NONCE_LEN: usize = 12;

/// Length of the symmetric payload key.
pub const PAYLOAD_KEY_LEN: usize = 32;

/// Length of a Poly1305 tag.
pub const TAG_LEN: usize = 16;

/// Length of the payload offset carried inside an entry point.
pub const OFFSET_LEN: usize = 4;

/// Plaintext carried by an entry point: payload key followed by the payload offset.
pub const ENTRY_POINT_PLAINTEXT_LEN: usize = PAYLOAD_KEY_LEN + OFFSET_LEN;

/// Slot length of every entry point, whatever the wrap type.
///
/// Sized for the authenticated wrap; a stream-wrapped entry point is followed
/// by random bytes up to this length.
pub const ENTRY_POINT_LEN: usize = ENTRY_POINT_PLAINTEXT_LEN + TAG_LEN;

/// Length of the plaintext length prefix inside the padded payload.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// How the payload key is wrapped inside each entry point.
///
/// Not signaled in the container; every recipient must know it out of band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyWrap {
    /// ChaCha20 keystream, no integrity tag.
    Stream,
    /// ChaCha20-Poly1305 with a 16-byte tag.
    #[default]
    Aead,
}

/// Per-container construction settings, shared with recipients out of band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurbConfig {
    /// Entry point wrap type.
    pub wrap: KeyWrap,
    /// Pack cornerstones and entry points linearly instead of using the
    /// combinatorial cornerstone positions and hash-table entry points.
    pub simplified: bool,
}

impl PurbConfig {
    pub const fn new(wrap: KeyWrap, simplified: bool) -> Self {
        Self { wrap, simplified }
    }
}

/// Static, public information about one suite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteInfo {
    /// Candidate offsets of the cornerstone, ascending, absolute in the PURB.
    pub allowed_positions: Vec<usize>,
    /// Length of the uniform encoding of a cornerstone.
    pub cornerstone_len: usize,
}

/// Map of suite identifier to its [`SuiteInfo`], ordered by identifier.
///
/// The ordering is the canonical suite order: suite indices, simplified
/// offsets and cornerstone placement all follow it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteInfoMap(BTreeMap<String, SuiteInfo>);

fn ranges_overlap(a: usize, a_len: usize, b: usize, b_len: usize) -> bool {
    a < b + b_len && b < a + a_len
}

/// Number of cornerstone levels for `n` suites: `ceil(log2 n) + 1`.
pub fn levels_for(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize + 1
    }
}

impl SuiteInfoMap {
    /// Compute allowed positions for the given `(identifier, cornerstone length)` pairs.
    ///
    /// Level `i` offers `2^i` slots as wide as the longest cornerstone, levels
    /// are laid out back to back right after the nonce, and the suite with
    /// index `k` takes slot `k mod 2^i` at every level.
    pub fn new(suites: &[(&str, usize)]) -> Self {
        let mut names: Vec<(&str, usize)> = suites.to_vec();
        names.sort_by(|a, b| a.0.cmp(b.0));
        names.dedup_by(|a, b| a.0 == b.0);

        let width = names.iter().map(|(_, len)| *len).max().unwrap_or(0);
        let levels = levels_for(names.len());

        let mut map = BTreeMap::new();
        for (k, (name, len)) in names.iter().enumerate() {
            let mut positions = Vec::with_capacity(levels);
            let mut floor = NONCE_LEN;
            for level in 0..levels {
                let slots = 1usize << level;
                positions.push(floor + (k % slots) * width);
                floor += slots * width;
            }
            map.insert(
                name.to_string(),
                SuiteInfo {
                    allowed_positions: positions,
                    cornerstone_len: *len,
                },
            );
        }
        Self(map)
    }

    /// Insert or replace a hand-made entry.
    pub fn insert(&mut self, name: &str, info: SuiteInfo) {
        self.0.insert(name.to_string(), info);
    }

    pub fn get(&self, name: &str) -> Option<&SuiteInfo> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Suite identifiers in canonical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SuiteInfo)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up a suite and check that it can hold a cornerstone of `cornerstone_len` bytes.
    pub fn coverage(&self, name: &str, cornerstone_len: usize) -> Result<&SuiteInfo, PurbError> {
        let info = self
            .get(name)
            .ok_or_else(|| PurbError::SuiteCoverage(format!("suite {name} not in info map")))?;
        if info.allowed_positions.is_empty() {
            return Err(PurbError::SuiteCoverage(format!(
                "suite {name} has no allowed position"
            )));
        }
        if info.cornerstone_len != cornerstone_len {
            return Err(PurbError::SuiteCoverage(format!(
                "suite {name} cornerstone length {} does not match encoding length {cornerstone_len}",
                info.cornerstone_len
            )));
        }
        if info.allowed_positions.iter().any(|&p| p < NONCE_LEN) {
            return Err(PurbError::SuiteCoverage(format!(
                "suite {name} has a position inside the nonce"
            )));
        }
        Ok(info)
    }

    /// Check that the map can serve any subset of its suites: each suite has
    /// at least one position outside the nonce, and a cornerstone plan exists
    /// when every suite is in use.
    pub fn validate(&self) -> Result<(), PurbError> {
        for (name, info) in self.iter() {
            if info.allowed_positions.is_empty() {
                return Err(PurbError::SuiteCoverage(format!(
                    "suite {name} has no allowed position"
                )));
            }
            if info.allowed_positions.iter().any(|&p| p < NONCE_LEN) {
                return Err(PurbError::SuiteCoverage(format!(
                    "suite {name} has a position inside the nonce"
                )));
            }
        }
        let names: Vec<&str> = self.names().collect();
        self.plan_cornerstones(&names, false).map(|_| ())
    }

    /// Choose where each suite in `used` stores its cornerstone, and in which
    /// order the cornerstones are written.
    ///
    /// A suite's cornerstone value is the XOR of the bytes at all of its
    /// candidate positions. The position a suite writes must therefore not
    /// overlap its own other candidates, nor any candidate of a suite written
    /// before it. Suites are peeled off from the end of the write order: the
    /// first suite (in identifier order) that owns a position clear of every
    /// remaining suite is written last, at the first such position.
    ///
    /// Returns `(suite, offset)` pairs in write order, or
    /// [`PurbError::SuiteCoverage`] when the remaining suites all collide.
    /// Succeeding for a set of suites implies succeeding for any subset.
    pub fn plan_cornerstones(
        &self,
        used: &[&str],
        simplified: bool,
    ) -> Result<Vec<(String, usize)>, PurbError> {
        let mut remaining: Vec<(&str, usize, Vec<usize>)> = Vec::with_capacity(used.len());
        for &name in used {
            let len = self
                .get(name)
                .map(|info| info.cornerstone_len)
                .ok_or_else(|| {
                    PurbError::SuiteCoverage(format!("suite {name} not in info map"))
                })?;
            remaining.push((name, len, self.candidate_offsets(name, simplified)));
        }
        remaining.sort_by(|a, b| a.0.cmp(b.0));
        remaining.dedup_by(|a, b| a.0 == b.0);

        let mut peeled = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let pick = remaining.iter().enumerate().find_map(|(i, (name, len, positions))| {
                positions
                    .iter()
                    .enumerate()
                    .find(|&(k, &p)| {
                        let own = positions
                            .iter()
                            .enumerate()
                            .filter(|&(j, _)| j != k)
                            .all(|(_, &q)| !ranges_overlap(p, *len, q, *len));
                        let others = remaining
                            .iter()
                            .filter(|(other, _, _)| other != name)
                            .all(|(_, other_len, other_positions)| {
                                other_positions
                                    .iter()
                                    .all(|&q| !ranges_overlap(p, *len, q, *other_len))
                            });
                        own && others
                    })
                    .map(|(_, &p)| (i, p))
            });
            let Some((i, offset)) = pick else {
                let names: Vec<&str> = remaining.iter().map(|(name, _, _)| *name).collect();
                return Err(PurbError::SuiteCoverage(format!(
                    "cornerstones of {names:?} cannot be placed without colliding"
                )));
            };
            let (name, _, _) = remaining.remove(i);
            peeled.push((name.to_string(), offset));
        }
        peeled.reverse();
        Ok(peeled)
    }

    /// Offset of a suite's cornerstone in the simplified layout: cornerstones
    /// of every suite in the map packed back to back after the nonce.
    pub fn simplified_offset(&self, name: &str) -> Option<usize> {
        let mut offset = NONCE_LEN;
        for (n, info) in self.iter() {
            if n == name {
                return Some(offset);
            }
            offset += info.cornerstone_len;
        }
        None
    }

    /// First byte after every possible cornerstone; entry points start here.
    pub fn cornerstone_region_end(&self, simplified: bool) -> usize {
        if simplified {
            return NONCE_LEN + self.iter().map(|(_, i)| i.cornerstone_len).sum::<usize>();
        }
        self.iter()
            .flat_map(|(_, info)| {
                info.allowed_positions
                    .iter()
                    .map(move |p| p + info.cornerstone_len)
            })
            .max()
            .unwrap_or(NONCE_LEN)
    }

    /// Candidate cornerstone offsets of a suite under the given layout.
    pub fn candidate_offsets(&self, name: &str, simplified: bool) -> Vec<usize> {
        if simplified {
            return self.simplified_offset(name).into_iter().collect();
        }
        self.get(name)
            .map(|info| info.allowed_positions.clone())
            .unwrap_or_default()
    }
}

/// Serialize a value to canonical CBOR format.
///
/// Used to hand the suite info map and the container settings to recipients.
pub fn to_cbor_canonical<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, PurbError> {
    let mut buf = Vec::new();
    let mut ser = serde_cbor::ser::Serializer::new(&mut buf);
    ser.self_describe()
        .map_err(|e| PurbError::Ser(e.to_string()))?;
    v.serialize(&mut ser)
        .map_err(|e| PurbError::Ser(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR format.
pub fn from_cbor<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, PurbError> {
    serde_cbor::from_slice::<T>(data).map_err(|e| PurbError::Ser(e.to_string()))
}
