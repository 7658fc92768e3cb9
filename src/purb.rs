//! The PURB container: build, assemble, decode.

use rand_core::CryptoRngCore;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{
    decrypt_then_unpad, entry_point_slot_hash, pad_then_encrypt, padded_payload_len,
    unwrap_entry_point,
};
use crate::errors::PurbError;
use crate::header::{cornerstone_value, entry_point_candidates, Header};
use crate::suite::Recipient;
use crate::types::*;

/// A Padded Uniform Random Blob under construction.
///
/// Built in one pass: [`Purb::create_header`], [`Purb::pad_then_encrypt`],
/// then [`Purb::to_bytes`].
pub struct Purb {
    /// Shared by every entry point and the payload, stored at offset 0.
    pub nonce: [u8; NONCE_LEN],
    header: Option<Header>,
    payload: Vec<u8>,
    payload_key: Zeroizing<[u8; PAYLOAD_KEY_LEN]>,
    config: PurbConfig,
    info_map: SuiteInfoMap,
    filler: Vec<u8>,
    original_len: usize,
}

impl Purb {
    /// Start a PURB from a caller-chosen payload key and nonce.
    pub fn new(payload_key: &[u8], nonce: &[u8]) -> Result<Self, PurbError> {
        let key: [u8; PAYLOAD_KEY_LEN] = payload_key
            .try_into()
            .map_err(|_| PurbError::Malformed("payload key length"))?;
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| PurbError::Malformed("nonce length"))?;
        Ok(Self {
            nonce,
            header: None,
            payload: Vec::new(),
            payload_key: Zeroizing::new(key),
            config: PurbConfig::default(),
            info_map: SuiteInfoMap::default(),
            filler: Vec::new(),
            original_len: 0,
        })
    }

    /// Start a PURB with a random payload key and nonce.
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        let mut key = Zeroizing::new([0u8; PAYLOAD_KEY_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut key[..]);
        rng.fill_bytes(&mut nonce);
        Self {
            nonce,
            header: None,
            payload: Vec::new(),
            payload_key: key,
            config: PurbConfig::default(),
            info_map: SuiteInfoMap::default(),
            filler: Vec::new(),
            original_len: 0,
        }
    }

    /// Place cornerstones and entry points for `recipients`.
    pub fn create_header<R: CryptoRngCore>(
        &mut self,
        recipients: &[Recipient],
        info_map: &SuiteInfoMap,
        config: &PurbConfig,
        rng: &mut R,
    ) -> Result<(), PurbError> {
        let header = Header::build(recipients, info_map, config, &self.nonce, rng)?;
        self.header = Some(header);
        self.config = *config;
        self.info_map = info_map.clone();
        self.payload.clear();
        self.filler.clear();
        Ok(())
    }

    /// Pad `data` to a Padmé total length, encrypt it after the header and seal
    /// the entry points with the payload key and offset.
    pub fn pad_then_encrypt<R: CryptoRngCore>(
        &mut self,
        data: &[u8],
        rng: &mut R,
    ) -> Result<(), PurbError> {
        let header = self
            .header
            .as_mut()
            .ok_or(PurbError::Incomplete("create_header"))?;
        if !self.payload.is_empty() {
            return Err(PurbError::Malformed("payload already encrypted"));
        }

        let payload_offset = header.length;
        let payload_len = padded_payload_len(payload_offset, data.len());
        if !header
            .layout
            .reserve(payload_offset, payload_offset + payload_len, true, "payload")
        {
            return Err(PurbError::AllocationConflict {
                start: payload_offset,
                end: payload_offset + payload_len,
                tag: "payload".to_string(),
            });
        }

        header.seal_entry_points(
            self.config.wrap,
            &self.nonce,
            &self.payload_key,
            payload_offset,
            rng,
        )?;
        self.payload = pad_then_encrypt(&self.payload_key, &self.nonce, data, payload_len, rng)?;

        let mut filler = vec![0u8; payload_offset];
        rng.fill_bytes(&mut filler);
        self.filler = filler;
        self.original_len = data.len();

        debug!(
            data_len = data.len(),
            header_len = payload_offset,
            total_len = payload_offset + payload_len,
            "Encrypted PURB payload"
        );
        Ok(())
    }

    /// Lay out `nonce || header || payload`.
    ///
    /// Free header bytes are random. Each cornerstone is written last over its
    /// own range so that the XOR of its suite's positions gives its encoding.
    /// Deterministic once the payload is encrypted.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PurbError> {
        let header = self
            .header
            .as_ref()
            .ok_or(PurbError::Incomplete("create_header"))?;
        if self.payload.is_empty() || self.filler.len() != header.length {
            return Err(PurbError::Incomplete("pad_then_encrypt"));
        }

        let mut buf = vec![0u8; header.length];
        buf[..NONCE_LEN].copy_from_slice(&self.nonce);

        let filler = &self.filler;
        header.layout.scan_free_regions(
            |start, end| {
                let start = start.max(NONCE_LEN);
                if start < end {
                    buf[start..end].copy_from_slice(&filler[start..end]);
                }
            },
            header.length,
        );

        for ep in header.all_entry_points() {
            let wrapped = ep.wrapped().ok_or(PurbError::Incomplete("pad_then_encrypt"))?;
            buf[ep.offset..ep.offset + wrapped.len()].copy_from_slice(wrapped);
        }
        header.write_cornerstones(&mut buf)?;

        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Recover the plaintext of `blob` as `recipient`.
    ///
    /// The cornerstone is the XOR of the bytes at every candidate position of
    /// the recipient's suite. For the derived secret every candidate entry
    /// point is tried; a candidate only counts once the payload authenticates.
    /// Every failure past input validation is reported as
    /// [`PurbError::DecryptionFailure`].
    pub fn decode(
        blob: &[u8],
        recipient: &Recipient,
        info_map: &SuiteInfoMap,
        config: &PurbConfig,
    ) -> Result<Vec<u8>, PurbError> {
        let private = recipient
            .private_key
            .as_ref()
            .ok_or(PurbError::KeyAgreementFailure("recipient has no private key"))?;
        let suite = &recipient.suite;
        let name = suite.name();
        let len = suite.cornerstone_len();
        info_map.coverage(name, len)?;
        // own key pair must be usable before the blob is looked at
        suite.key_agreement(private, &recipient.public_key)?;

        if blob.len() < NONCE_LEN {
            return Err(PurbError::DecryptionFailure);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&blob[..NONCE_LEN]);
        let region_start = info_map.cornerstone_region_end(config.simplified);

        let positions = info_map.candidate_offsets(name, config.simplified);
        let encoded =
            cornerstone_value(blob, &positions, len).ok_or(PurbError::DecryptionFailure)?;
        let public = suite
            .decode_uniform(&encoded)
            .map_err(|_| PurbError::DecryptionFailure)?;
        let secret = suite
            .key_agreement(private, &public)
            .map_err(|_| PurbError::DecryptionFailure)?;
        let slot_hash = entry_point_slot_hash(&secret, &nonce)?;

        let candidates =
            entry_point_candidates(region_start, blob.len(), config.simplified, slot_hash);
        for ep_offset in candidates {
            let slot = &blob[ep_offset..ep_offset + ENTRY_POINT_LEN];
            let Ok(opened) = unwrap_entry_point(config.wrap, &secret, &nonce, slot) else {
                continue;
            };
            let mut key = Zeroizing::new([0u8; PAYLOAD_KEY_LEN]);
            key.copy_from_slice(&opened[..PAYLOAD_KEY_LEN]);
            let mut raw_offset = [0u8; OFFSET_LEN];
            raw_offset.copy_from_slice(&opened[PAYLOAD_KEY_LEN..]);
            let payload_offset = u32::from_be_bytes(raw_offset) as usize;

            if payload_offset < ep_offset + ENTRY_POINT_LEN
                || payload_offset + LENGTH_PREFIX_LEN + TAG_LEN > blob.len()
            {
                continue;
            }
            if let Ok(data) = decrypt_then_unpad(&key, &nonce, &blob[payload_offset..]) {
                debug!(suite = %name, entry_point = ep_offset, "Decoded PURB");
                return Ok(data);
            }
        }
        Err(PurbError::DecryptionFailure)
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Encrypted, padded payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn config(&self) -> &PurbConfig {
        &self.config
    }

    /// Human-readable dump of the layout, for debugging only.
    pub fn visual_representation(&self, with_boundaries: bool) -> String {
        let mut lines = Vec::new();
        let bytes = self.to_bytes().unwrap_or_default();

        lines.push("*** PURB Details ***".to_string());
        lines.push(format!("Original data: len {}", self.original_len));
        let header_len = self.header.as_ref().map_or(0, |h| h.length);
        lines.push(format!(
            "PURB: header at 0 (len {header_len}), payload at {header_len} (len {}), total {} bytes",
            self.payload.len(),
            bytes.len()
        ));
        lines.push(format!("Nonce: {} (len {})", hex::encode(self.nonce), NONCE_LEN));

        if let Some(header) = &self.header {
            for c in header.cornerstones.values() {
                lines.push(format!(
                    "Cornerstone {} @ offset {} (len {})",
                    c.suite_name,
                    c.offset,
                    c.bytes().len()
                ));
                lines.push(format!("  Value: {}", hex::encode(c.bytes())));
                if let Some(info) = self.info_map.get(&c.suite_name) {
                    lines.push(format!("  Allowed positions: {:?}", info.allowed_positions));
                }
                let used: Vec<String> = c
                    .positions
                    .iter()
                    .filter(|&&p| p + c.bytes().len() <= bytes.len())
                    .map(|p| format!("{p}:{}", p + c.bytes().len()))
                    .collect();
                lines.push(format!("  Positions used: {used:?}"));
                if let Some(value) = cornerstone_value(&bytes, &c.positions, c.bytes().len()) {
                    lines.push(format!("  Recomputed value: {}", hex::encode(value)));
                }
            }
            for (suite, eps) in &header.entry_points {
                lines.push(format!("Entry points for suite {suite}"));
                for (i, ep) in eps.iter().enumerate() {
                    lines.push(format!(
                        "  Entry point [{i}] @ offset {} (len {})",
                        ep.offset, header.entry_point_len
                    ));
                }
            }
            let free = header.layout.free_regions(header.length);
            lines.push(format!("Free header regions: {free:?}"));
        }
        lines.push(format!(
            "Padded payload @ offset {header_len} (len {})",
            self.payload.len()
        ));

        if !with_boundaries {
            return lines.join("\n");
        }

        let width = lines.iter().map(|l| l.len()).max().unwrap_or(0);
        let body: Vec<String> = lines
            .iter()
            .map(|l| format!("| {l:<width$} |"))
            .collect();
        format!(
            "\n{}\n{}\n{}\n",
            "_".repeat(width + 4),
            body.join("\n"),
            "-".repeat(width + 4)
        )
    }
}

/// Encrypt `data` once for every recipient with a fresh payload key and nonce.
pub fn encode<R: CryptoRngCore>(
    data: &[u8],
    recipients: &[Recipient],
    info_map: &SuiteInfoMap,
    config: &PurbConfig,
    rng: &mut R,
) -> Result<Vec<u8>, PurbError> {
    let mut purb = Purb::generate(rng);
    purb.create_header(recipients, info_map, config, rng)?;
    purb.pad_then_encrypt(data, rng)?;
    purb.to_bytes()
}

/// Decrypt a PURB as `recipient`; see [`Purb::decode`].
pub fn decode(
    blob: &[u8],
    recipient: &Recipient,
    info_map: &SuiteInfoMap,
    config: &PurbConfig,
) -> Result<Vec<u8>, PurbError> {
    Purb::decode(blob, recipient, info_map, config)
}
