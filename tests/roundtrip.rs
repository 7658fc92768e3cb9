use std::sync::Arc;

use purb::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn suites(names: &[&str]) -> (Vec<Arc<dyn Suite>>, SuiteInfoMap) {
    let suites = names
        .iter()
        .map(|n| Arc::new(X25519Suite::new(n)) as Arc<dyn Suite>)
        .collect();
    let pairs: Vec<(&str, usize)> = names.iter().map(|n| (*n, X25519_KEY_LEN)).collect();
    (suites, SuiteInfoMap::new(&pairs))
}

fn recipients(
    suites: &[Arc<dyn Suite>],
    per_suite: usize,
    rng: &mut ChaCha20Rng,
) -> Vec<Recipient> {
    let mut out = Vec::new();
    for _ in 0..per_suite {
        for s in suites {
            out.push(Recipient::generate(Arc::clone(s), rng));
        }
    }
    out
}

fn public(recipients: &[Recipient]) -> Vec<Recipient> {
    recipients.iter().map(Recipient::public_only).collect()
}

const ALL_CONFIGS: [PurbConfig; 4] = [
    PurbConfig::new(KeyWrap::Aead, false),
    PurbConfig::new(KeyWrap::Aead, true),
    PurbConfig::new(KeyWrap::Stream, false),
    PurbConfig::new(KeyWrap::Stream, true),
];

#[test]
fn six_recipients_three_suites_roundtrip() {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let (suites, info_map) = suites(&["x25519-a", "x25519-b", "x25519-c"]);
    let decs = recipients(&suites, 2, &mut rng);

    let msg = b"gorilla";
    for config in ALL_CONFIGS {
        let blob = encode(msg, &public(&decs), &info_map, &config, &mut rng).unwrap();
        for r in &decs {
            let pt = decode(&blob, r, &info_map, &config).unwrap();
            assert_eq!(pt, msg, "{config:?}");
        }
    }
}

#[test]
fn caller_supplied_key_and_nonce_roundtrip() {
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    let (suites, info_map) = suites(&["x25519"]);
    let decs = recipients(&suites, 3, &mut rng);
    let config = PurbConfig::default();

    let mut purb = Purb::new(b"key32key32key32key32key32key32!!", b"noncenonce12").unwrap();
    purb.create_header(&public(&decs), &info_map, &config, &mut rng).unwrap();
    purb.pad_then_encrypt(b"post-PURB hello", &mut rng).unwrap();
    let blob = purb.to_bytes().unwrap();

    assert_eq!(&blob[..NONCE_LEN], b"noncenonce12");
    for r in &decs {
        assert_eq!(decode(&blob, r, &info_map, &config).unwrap(), b"post-PURB hello");
    }
}

#[test]
fn empty_and_zero_tailed_messages_roundtrip() {
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let (suites, info_map) = suites(&["x25519"]);
    let decs = recipients(&suites, 1, &mut rng);

    for msg in [&b""[..], &[1, 2, 0, 0, 0][..], &[0u8; 300][..]] {
        for config in ALL_CONFIGS {
            let blob = encode(msg, &public(&decs), &info_map, &config, &mut rng).unwrap();
            assert_eq!(decode(&blob, &decs[0], &info_map, &config).unwrap(), msg);
        }
    }
}

#[test]
fn outsider_cannot_decode() {
    let mut rng = ChaCha20Rng::seed_from_u64(4);
    let (suites, info_map) = suites(&["x25519-a", "x25519-b"]);
    let decs = recipients(&suites, 1, &mut rng);
    let outsider = Recipient::generate(Arc::clone(&suites[0]), &mut rng);

    for config in ALL_CONFIGS {
        let blob = encode(b"not for you", &public(&decs), &info_map, &config, &mut rng).unwrap();
        let err = decode(&blob, &outsider, &info_map, &config).unwrap_err();
        assert_eq!(err, PurbError::DecryptionFailure);
    }
}

#[test]
fn suite_not_in_use_fails_to_decode() {
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let (suites, info_map) = suites(&["x25519-a", "x25519-b"]);
    // only suite a is addressed
    let only_a = vec![Recipient::generate(Arc::clone(&suites[0]), &mut rng)];
    let on_b = Recipient::generate(Arc::clone(&suites[1]), &mut rng);

    for config in ALL_CONFIGS {
        let blob = encode(b"suite a only", &public(&only_a), &info_map, &config, &mut rng).unwrap();
        assert_eq!(decode(&blob, &only_a[0], &info_map, &config).unwrap(), b"suite a only");
        assert_eq!(
            decode(&blob, &on_b, &info_map, &config).unwrap_err(),
            PurbError::DecryptionFailure
        );
    }
}

#[test]
fn tampered_payload_tag_is_rejected() {
    let mut rng = ChaCha20Rng::seed_from_u64(6);
    let (suites, info_map) = suites(&["x25519"]);
    let decs = recipients(&suites, 2, &mut rng);

    for config in ALL_CONFIGS {
        let mut blob = encode(b"integrity", &public(&decs), &info_map, &config, &mut rng).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        for r in &decs {
            assert_eq!(
                decode(&blob, r, &info_map, &config).unwrap_err(),
                PurbError::DecryptionFailure
            );
        }
    }
}

#[test]
fn tampered_entry_point_tag_is_rejected() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let (suites, info_map) = suites(&["x25519"]);
    let decs = recipients(&suites, 1, &mut rng);
    let config = PurbConfig::new(KeyWrap::Aead, false);

    let mut purb = Purb::generate(&mut rng);
    purb.create_header(&public(&decs), &info_map, &config, &mut rng).unwrap();
    purb.pad_then_encrypt(b"integrity", &mut rng).unwrap();
    let mut blob = purb.to_bytes().unwrap();

    let ep = purb.header().unwrap().all_entry_points().next().unwrap();
    blob[ep.offset + ENTRY_POINT_LEN - 1] ^= 0x80;

    assert_eq!(
        decode(&blob, &decs[0], &info_map, &config).unwrap_err(),
        PurbError::DecryptionFailure
    );
}

#[test]
fn mismatched_config_fails_to_decode() {
    let mut rng = ChaCha20Rng::seed_from_u64(8);
    let (suites, info_map) = suites(&["x25519-a", "x25519-b", "x25519-c"]);
    let decs = recipients(&suites, 1, &mut rng);

    let blob = encode(
        b"layout matters",
        &public(&decs),
        &info_map,
        &PurbConfig::new(KeyWrap::Aead, false),
        &mut rng,
    )
    .unwrap();
    let wrong = PurbConfig::new(KeyWrap::Stream, false);
    assert_eq!(
        decode(&blob, &decs[0], &info_map, &wrong).unwrap_err(),
        PurbError::DecryptionFailure
    );
}
