use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand_core::CryptoRngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::PurbError;
use crate::types::*;

const WRAP_KEY_INFO: &[u8] = b"purb/entry-point/key";
const SLOT_HASH_INFO: &[u8] = b"purb/entry-point/slot";

/* ---------------- Key derivation ---------------- */

fn hkdf32(
    secret: &[u8],
    nonce: &[u8; NONCE_LEN],
    info: &[u8],
) -> Result<Zeroizing<[u8; 32]>, PurbError> {
    // Salted with the container nonce
    let hk = Hkdf::<Sha256>::new(Some(&nonce[..]), secret);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, &mut okm[..])
        .map_err(|_| PurbError::Malformed("hkdf output length"))?;
    Ok(okm)
}

/// Key wrapping a recipient's entry point, derived from the shared secret.
pub fn entry_point_key(
    secret: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Result<Zeroizing<[u8; 32]>, PurbError> {
    hkdf32(secret, nonce, WRAP_KEY_INFO)
}

/// Hash selecting a recipient's slot in each entry point table.
pub fn entry_point_slot_hash(secret: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<u64, PurbError> {
    let okm = hkdf32(secret, nonce, SLOT_HASH_INFO)?;
    let mut head = [0u8; 8];
    head.copy_from_slice(&okm[..8]);
    Ok(u64::from_be_bytes(head))
}

/* ---------------- Entry points ---------------- */

/// Wrap `payload key || payload offset` under the recipient's shared secret.
///
/// The result is always [`ENTRY_POINT_LEN`] bytes long.
pub fn wrap_entry_point(
    wrap: KeyWrap,
    secret: &[u8],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8; ENTRY_POINT_PLAINTEXT_LEN],
    rng: &mut dyn CryptoRngCore,
) -> Result<Vec<u8>, PurbError> {
    let key = entry_point_key(secret, nonce)?;
    match wrap {
        KeyWrap::Stream => {
            let mut out = plaintext.to_vec();
            let mut cipher = ChaCha20::new((&*key).into(), nonce.into());
            cipher.apply_keystream(&mut out);
            let mut filler = [0u8; ENTRY_POINT_LEN - ENTRY_POINT_PLAINTEXT_LEN];
            rng.fill_bytes(&mut filler);
            out.extend_from_slice(&filler);
            Ok(out)
        }
        KeyWrap::Aead => {
            let cipher = ChaCha20Poly1305::new((&*key).into());
            cipher
                .encrypt(Nonce::from_slice(nonce), plaintext.as_slice())
                .map_err(|_| PurbError::Malformed("entry point encryption"))
        }
    }
}

/// Inverse of [`wrap_entry_point`]. A stream-wrapped slot always "opens";
/// only the authenticated wrap can reject it here.
pub fn unwrap_entry_point(
    wrap: KeyWrap,
    secret: &[u8],
    nonce: &[u8; NONCE_LEN],
    slot: &[u8],
) -> Result<Zeroizing<[u8; ENTRY_POINT_PLAINTEXT_LEN]>, PurbError> {
    if slot.len() < ENTRY_POINT_LEN {
        return Err(PurbError::DecryptionFailure);
    }
    let key = entry_point_key(secret, nonce)?;
    let mut out = Zeroizing::new([0u8; ENTRY_POINT_PLAINTEXT_LEN]);
    match wrap {
        KeyWrap::Stream => {
            out.copy_from_slice(&slot[..ENTRY_POINT_PLAINTEXT_LEN]);
            let mut cipher = ChaCha20::new((&*key).into(), nonce.into());
            cipher.apply_keystream(&mut out[..]);
        }
        KeyWrap::Aead => {
            let cipher = ChaCha20Poly1305::new((&*key).into());
            let pt = Zeroizing::new(
                cipher
                    .decrypt(Nonce::from_slice(nonce), &slot[..ENTRY_POINT_LEN])
                    .map_err(|_| PurbError::DecryptionFailure)?,
            );
            if pt.len() != ENTRY_POINT_PLAINTEXT_LEN {
                return Err(PurbError::DecryptionFailure);
            }
            out.copy_from_slice(&pt);
        }
    }
    Ok(out)
}

/* ---------------- Payload ---------------- */

/// Padmé: round `len` up so that only its top `floor(log2 floor(log2 len)) + 1`
/// bits may be set. Leaks at most O(log log len) bits about the length.
pub fn padme(len: usize) -> usize {
    if len < 2 {
        return len;
    }
    let e = (usize::BITS - 1 - len.leading_zeros()) as usize;
    let s = (usize::BITS - e.leading_zeros()) as usize;
    let mask = (1usize << (e - s)) - 1;
    (len + mask) & !mask
}

/// Length of the encrypted payload placed after a header of `header_len` bytes
/// for `data_len` bytes of plaintext, so that the whole PURB has a Padmé length.
pub fn padded_payload_len(header_len: usize, data_len: usize) -> usize {
    let min_total = header_len + LENGTH_PREFIX_LEN + data_len + TAG_LEN;
    padme(min_total) - header_len
}

/// Build `len(data) || data || random fill` of `payload_len - TAG_LEN` bytes
/// and encrypt it, giving exactly `payload_len` bytes.
pub fn pad_then_encrypt(
    key: &[u8; PAYLOAD_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    data: &[u8],
    payload_len: usize,
    rng: &mut dyn CryptoRngCore,
) -> Result<Vec<u8>, PurbError> {
    let prefix = u32::try_from(data.len())
        .map_err(|_| PurbError::Malformed("payload too large"))?;
    let inner_len = payload_len
        .checked_sub(TAG_LEN)
        .filter(|&l| l >= LENGTH_PREFIX_LEN + data.len())
        .ok_or(PurbError::Malformed("payload length too small"))?;

    let mut padded = Zeroizing::new(Vec::with_capacity(inner_len));
    padded.extend_from_slice(&prefix.to_be_bytes());
    padded.extend_from_slice(data);
    let fill_start = padded.len();
    padded.resize(inner_len, 0);
    rng.fill_bytes(&mut padded[fill_start..]);

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), padded.as_slice())
        .map_err(|_| PurbError::Malformed("payload encryption"))
}

/// Decrypt a payload and strip its padding.
pub fn decrypt_then_unpad(
    key: &[u8; PAYLOAD_KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    payload: &[u8],
) -> Result<Vec<u8>, PurbError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let padded = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| PurbError::DecryptionFailure)?,
    );
    unpad(&padded)
}

/// Recover the plaintext from `len || data || fill`.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, PurbError> {
    if padded.len() < LENGTH_PREFIX_LEN {
        return Err(PurbError::DecryptionFailure);
    }
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&padded[..LENGTH_PREFIX_LEN]);
    let len = u32::from_be_bytes(prefix) as usize;
    let body = &padded[LENGTH_PREFIX_LEN..];
    if len > body.len() {
        return Err(PurbError::DecryptionFailure);
    }
    Ok(body[..len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padme_values() {
        assert_eq!(padme(0), 0);
        assert_eq!(padme(1), 1);
        assert_eq!(padme(9), 10);
        assert_eq!(padme(100), 104);
        assert_eq!(padme(1000), 1024);
        assert_eq!(padme(1024), 1024);
        for len in 2..5000 {
            assert!(padme(len) >= len);
            assert!(padme(padme(len)) == padme(len));
        }
    }

    #[test]
    fn unpad_keeps_trailing_zeros() {
        let padded = [0, 0, 0, 3, 7, 0, 0, 9, 9];
        assert_eq!(unpad(&padded).unwrap(), vec![7, 0, 0]);
    }

    #[test]
    fn unpad_rejects_oversized_prefix() {
        let padded = [0, 0, 1, 0, 1, 2, 3];
        assert_eq!(unpad(&padded), Err(PurbError::DecryptionFailure));
        assert_eq!(unpad(&[0, 0]), Err(PurbError::DecryptionFailure));
    }
}
