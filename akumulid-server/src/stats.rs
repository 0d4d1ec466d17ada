//! Process-wide registry of server-exposed stats snapshots, read by the
//! HTTP `/api/stats` endpoint. Indirected through a registry (the same
//! shape as the protocol factory registry in `registry.rs`) rather than a
//! direct reference, since servers are built one at a time by
//! `akumulid_server::build` and the HTTP server has no other way to reach
//! a `UdpServer` instance built from a separate config section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

type SnapshotFn = Arc<dyn Fn() -> String + Send + Sync>;

static SNAPSHOTS: Lazy<Mutex<HashMap<String, SnapshotFn>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers (overwriting any prior entry under the same key) a stats
/// snapshot producer. Called from a server's `start()`.
pub(crate) fn register(key: String, snapshot: SnapshotFn) {
    SNAPSHOTS
        .lock()
        .expect("stats registry mutex poisoned")
        .insert(key, snapshot);
}

/// Removes a previously registered producer. Called from a server's `stop()`.
pub(crate) fn unregister(key: &str) {
    SNAPSHOTS.lock().expect("stats registry mutex poisoned").remove(key);
}

/// Renders every currently registered producer's live snapshot, one
/// `key: text` line each. Empty if nothing is registered.
pub(crate) fn render_all() -> String {
    let registry = SNAPSHOTS.lock().expect("stats registry mutex poisoned");
    let mut out = String::new();
    for (key, snapshot) in registry.iter() {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&snapshot());
        out.push('\n');
    }
    out
}
