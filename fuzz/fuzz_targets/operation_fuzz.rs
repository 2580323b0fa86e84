//! Fuzz target for operation identifier parsing.
//!
//! Run with: cargo +nightly fuzz run operation_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use querykv_core::Operation;

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = std::str::from_utf8(data) {
        let operation = Operation::parse(name);
        // Parsing preserves the identifier and never loses classification.
        assert_eq!(operation.as_str(), name);
        assert_eq!(Operation::parse(operation.as_str()), operation);
        let _ = operation.kind();
    }
});
