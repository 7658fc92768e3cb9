#![allow(clippy::unwrap_used)] // unwrap() is idiomatic in property tests

use std::sync::Arc;

use proptest::prelude::*;
use purb::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

// ============================================================================
// Property: free regions are the exact complement of strict reservations
// ============================================================================

fn disjoint_intervals() -> impl Strategy<Value = (Vec<(usize, usize)>, Vec<usize>)> {
    prop::collection::vec((0usize..50, 1usize..50), 0..20).prop_flat_map(|spans| {
        let mut intervals = Vec::with_capacity(spans.len());
        let mut cursor = 0;
        for (gap, len) in spans {
            let start = cursor + gap;
            intervals.push((start, start + len));
            cursor = start + len;
        }
        let n = intervals.len();
        (Just(intervals), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn prop_scan_is_complement_of_reservations(
        (intervals, order) in disjoint_intervals(),
        slack in 0usize..100,
    ) {
        let mut layout = RegionReservation::new();
        for &i in &order {
            let (start, end) = intervals[i];
            prop_assert!(layout.reserve(start, end, true, "block"));
        }
        let total = intervals.last().map_or(0, |&(_, end)| end) + slack;

        let gaps = layout.free_regions(total);

        // ascending, non-empty, non-adjacent to each other
        for pair in gaps.windows(2) {
            prop_assert!(pair[0].1 < pair[1].0);
        }
        for &(s, e) in &gaps {
            prop_assert!(s < e);
        }

        // every byte is in exactly one reservation or one gap
        let mut covered = vec![0u8; total];
        for &(s, e) in intervals.iter().chain(gaps.iter()) {
            for b in &mut covered[s..e] {
                *b += 1;
            }
        }
        prop_assert!(covered.iter().all(|&c| c == 1));

        // scanning is a pure query
        prop_assert_eq!(layout.free_regions(total), gaps);
    }
}

proptest! {
    #[test]
    fn prop_rejected_reservation_leaves_state_unchanged(
        (intervals, order) in disjoint_intervals(),
        pick in any::<prop::sample::Index>(),
        shift in 0usize..50,
        width in 1usize..80,
    ) {
        prop_assume!(!intervals.is_empty());
        let mut layout = RegionReservation::new();
        for &i in &order {
            let (start, end) = intervals[i];
            layout.reserve(start, end, true, "block");
        }
        let total = intervals.last().unwrap().1 + 10;
        let before = layout.free_regions(total);
        let regions_before = layout.regions().to_vec();

        // a range containing a reserved byte
        let (start, end) = intervals[pick.index(intervals.len())];
        let hit = start + shift % (end - start);
        let attempt_start = hit.saturating_sub(width / 2);
        prop_assert!(!layout.reserve(attempt_start, hit + 1 + width / 2, true, "overlap"));

        prop_assert_eq!(layout.free_regions(total), before);
        prop_assert_eq!(layout.regions(), regions_before.as_slice());
    }
}

// ============================================================================
// Property: every suite has a distinct position at the last level
// ============================================================================

proptest! {
    #[test]
    fn prop_allowed_positions_cover_every_suite(n in 1usize..70, len in 1usize..64) {
        let names: Vec<String> = (0..n).map(|k| format!("suite-{k:03}")).collect();
        let pairs: Vec<(&str, usize)> = names.iter().map(|s| (s.as_str(), len)).collect();
        let map = SuiteInfoMap::new(&pairs);
        prop_assert!(map.validate().is_ok());

        let levels = levels_for(n);
        let top = levels - 1;
        prop_assert!((1usize << top) >= n);

        let mut last_level = Vec::new();
        for (k, (_, info)) in map.iter().enumerate() {
            prop_assert_eq!(info.allowed_positions.len(), levels);
            prop_assert!(info.allowed_positions.windows(2).all(|w| w[0] < w[1]));
            let level_start = NONCE_LEN + ((1usize << top) - 1) * len;
            prop_assert_eq!(info.allowed_positions[top], level_start + k * len);
            last_level.push(info.allowed_positions[top]);
        }
        last_level.sort_unstable();
        last_level.dedup();
        prop_assert_eq!(last_level.len(), n);
    }
}

// ============================================================================
// Property: round trip for every recipient, layout and wrap type
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_encode_decode_roundtrip(
        message in prop::collection::vec(any::<u8>(), 0..2000),
        n_suites in 1usize..4,
        per_suite in 1usize..4,
        stream in any::<bool>(),
        simplified in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let names: Vec<String> = (0..n_suites).map(|k| format!("x25519-{k}")).collect();
        let pairs: Vec<(&str, usize)> =
            names.iter().map(|s| (s.as_str(), X25519_KEY_LEN)).collect();
        let info_map = SuiteInfoMap::new(&pairs);
        let wrap = if stream { KeyWrap::Stream } else { KeyWrap::Aead };
        let config = PurbConfig::new(wrap, simplified);

        let mut decs = Vec::new();
        for name in &names {
            let suite: Arc<dyn Suite> = Arc::new(X25519Suite::new(name));
            for _ in 0..per_suite {
                decs.push(Recipient::generate(Arc::clone(&suite), &mut rng));
            }
        }
        let public: Vec<Recipient> = decs.iter().map(Recipient::public_only).collect();

        let blob = encode(&message, &public, &info_map, &config, &mut rng)?;
        prop_assert_eq!(blob.len(), padme(blob.len()));
        for r in &decs {
            let pt = decode(&blob, r, &info_map, &config)?;
            prop_assert_eq!(&pt, &message);
        }
    }
}

// ============================================================================
// Property: hand-made maps either decode for everyone or are refused
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_hand_made_maps_decode_or_refuse(
        layouts in prop::collection::vec(prop::collection::vec(0usize..12, 1..4), 2..5),
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let config = PurbConfig::default();
        let mut info_map = SuiteInfoMap::default();
        let mut decs = Vec::new();
        for (k, slots) in layouts.iter().enumerate() {
            let name = format!("x25519-{k}");
            // 8-byte steps, so ranges often overlap only in part
            let positions: Vec<usize> = slots.iter().map(|s| NONCE_LEN + s * 8).collect();
            let info = SuiteInfo {
                allowed_positions: positions,
                cornerstone_len: X25519_KEY_LEN,
            };
            info_map.insert(&name, info);
            let suite: Arc<dyn Suite> = Arc::new(X25519Suite::new(&name));
            decs.push(Recipient::generate(suite, &mut rng));
        }
        let public: Vec<Recipient> = decs.iter().map(Recipient::public_only).collect();

        match encode(b"sixty-four", &public, &info_map, &config, &mut rng) {
            Ok(blob) => {
                prop_assert!(info_map.validate().is_ok());
                for r in &decs {
                    prop_assert_eq!(decode(&blob, r, &info_map, &config)?, b"sixty-four".to_vec());
                }
            }
            Err(err) => {
                prop_assert!(matches!(err, PurbError::SuiteCoverage(_)));
                prop_assert!(info_map.validate().is_err());
            }
        }
    }
}
