//! Fuzz target for cache key derivation.
//!
//! Feeds arbitrary JSON payloads through `KeyDeriver::derive` and checks
//! that keys are stable, well-formed and inside their model namespace.
//!
//! Run with: cargo +nightly fuzz run key_derivation_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use querykv_core::{KeyDeriver, Operation, DIGEST_HEX_LEN};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(args) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let deriver = KeyDeriver::default();
    for model in [Some("User"), None] {
        let key = deriver.derive(model, &Operation::FindMany, &args);
        let again = deriver.derive(model, &Operation::FindMany, &args.clone());
        assert_eq!(key, again, "derivation must be deterministic");

        let namespace = deriver.namespace(model);
        assert!(key.as_str().starts_with(&namespace));

        let digest = key.digest();
        assert_eq!(digest.len(), DIGEST_HEX_LEN);
        assert!(digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
});
