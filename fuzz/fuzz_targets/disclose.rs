#![no_main]

use foodblock_core::value::Value;
use foodblock_core::{selective_disclose, verify_proof};
use libfuzzer_sys::fuzz_target;

// Any disclosed subset of any object state verifies against its root.
fuzz_target!(|data: &[u8]| {
    let Some((&selector, body)) = data.split_first() else {
        return;
    };
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) else {
        return;
    };
    let Some(state) = Value::from(json).into_object() else {
        return;
    };

    let fields: Vec<&str> = state
        .keys()
        .enumerate()
        .filter(|(i, _)| selector & (1 << (i % 8)) != 0)
        .map(|(_, k)| k.as_str())
        .collect();
    let Ok(disclosure) = selective_disclose(&state, &fields) else {
        return;
    };
    if !fields.is_empty() {
        assert!(verify_proof(
            &disclosure.disclosed,
            &disclosure.proof,
            &disclosure.root
        ));
    }
});
