#![no_main]

use foodblock_core::block::canonical::canonical;
use foodblock_core::value::{Map, Value};
use libfuzzer_sys::fuzz_target;

// Canonical text must be a fixed point: re-canonicalizing its parsed state
// and refs yields the same bytes.
fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Some(state) = Value::from(json).into_object() else {
        return;
    };
    let Ok(first) = canonical("fuzz.block", &state, &Map::new()) else {
        return;
    };

    let reparsed: serde_json::Value =
        serde_json::from_str(&first).expect("canonical output is valid JSON");
    let state_again = Value::from(reparsed["state"].clone())
        .into_object()
        .unwrap_or_default();
    let second = canonical("fuzz.block", &state_again, &Map::new())
        .expect("canonical output re-canonicalizes");
    assert_eq!(first, second);
});
