//! Process-global factory registry mapping a protocol name to the server
//! that implements it. Servers self-register at module load via
//! [`register_factory`]; registration is idempotent so re-running init
//! (e.g. in tests) is harmless.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use akumulid_engine::DbConnection;

use crate::error::ServerError;
use crate::server::Server;
use crate::settings::ServerSettings;

/// `(connection, settings) → server`. The query-builder side is derived
/// internally from `connection.downgrade()` by factories that need it
/// (currently only the HTTP server).
pub type Factory = fn(&DbConnection, &ServerSettings) -> Result<Box<dyn Server>, ServerError>;

static REGISTRY: Lazy<Mutex<HashMap<&'static str, Factory>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers `factory` under `protocol`, overwriting any prior entry for
/// the same name. Call during module initialization.
pub fn register_factory(protocol: &'static str, factory: Factory) {
    REGISTRY
        .lock()
        .expect("server registry mutex poisoned")
        .insert(protocol, factory);
}

/// Instantiates the server named by `settings.name`.
///
/// Fails with [`ServerError::UnknownProtocol`] if nothing registered under
/// that name.
pub fn build(connection: &DbConnection, settings: &ServerSettings) -> Result<Box<dyn Server>, ServerError> {
    let factory = {
        let registry = REGISTRY.lock().expect("server registry mutex poisoned");
        registry
            .get(settings.name.as_str())
            .copied()
            .ok_or_else(|| ServerError::UnknownProtocol(settings.name.clone()))?
    };
    factory(connection, settings)
}

/// Registers the built-in UDP/TCP/HTTP servers. Idempotent; call once at
/// daemon startup before [`build`].
pub fn register_builtin_servers() {
    register_factory("UDP", crate::udp::build);
    register_factory("TCP", crate::tcp::build);
    register_factory("OpenTSDB", crate::tcp::build_opentsdb);
    register_factory("HTTP", crate::http::build);
}
