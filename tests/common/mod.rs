//! Shared setup for the integration tests: a test-scoped tracing subscriber
//! so the birth/death/error events logged under `target = "scan_state"`
//! show up under `cargo test -- --nocapture` instead of going nowhere.

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}
