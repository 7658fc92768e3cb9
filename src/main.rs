//! purb demo main.rs
//! Builds one PURB for recipients spread over three suites, prints its layout
//! and lets every recipient decode it.

use std::sync::Arc;

use purb::*;
use rand::rngs::OsRng;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = OsRng;

    // --- Suites and their public positions ---
    let names = ["x25519-a", "x25519-b", "x25519-c"];
    let suites: Vec<Arc<dyn Suite>> = names
        .iter()
        .map(|n| Arc::new(X25519Suite::new(n)) as Arc<dyn Suite>)
        .collect();
    let info_map = SuiteInfoMap::new(&names.map(|n| (n, X25519_KEY_LEN)));
    info_map.validate()?;

    // --- Two recipients per suite ---
    let recipients: Vec<Recipient> = suites
        .iter()
        .flat_map(|s| {
            [
                Recipient::generate(Arc::clone(s), &mut rng),
                Recipient::generate(Arc::clone(s), &mut rng),
            ]
        })
        .collect();
    let public: Vec<Recipient> = recipients.iter().map(Recipient::public_only).collect();

    let message = b"gorilla";
    for config in [
        PurbConfig::default(),
        PurbConfig::new(KeyWrap::Stream, true),
    ] {
        let mut purb = Purb::generate(&mut rng);
        purb.create_header(&public, &info_map, &config, &mut rng)?;
        purb.pad_then_encrypt(message, &mut rng)?;
        let blob = purb.to_bytes()?;

        println!("{config:?}");
        println!("{}", purb.visual_representation(true));

        for (i, r) in recipients.iter().enumerate() {
            let pt = Purb::decode(&blob, r, &info_map, &config)?;
            println!(
                "Recipient {i} ({}) decrypted: {}",
                r.suite_name(),
                String::from_utf8_lossy(&pt)
            );
            assert_eq!(pt, message);
        }
    }

    // --- A recipient that was never addressed ---
    let outsider = Recipient::generate(Arc::clone(&suites[0]), &mut rng);
    let blob = encode(message, &public, &info_map, &PurbConfig::default(), &mut rng)?;
    let res = decode(&blob, &outsider, &info_map, &PurbConfig::default());
    assert!(res.is_err());
    println!("\nOutsider rejected as expected: {:?}", res.err());

    Ok(())
}
