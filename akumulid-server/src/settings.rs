//! `ServerSettings`: the configuration-loader's output for one server
//! instance, independent of how the config file spelled it.

use std::net::IpAddr;

/// One `(protocol-name, endpoint)` pair a server is built from.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Registry key, e.g. `"RESP"` or `"OpenTSDB"`.
    pub protocol: String,
    /// Port to bind.
    pub port: u16,
}

/// Bundle describing one server instance: a human name, its endpoints, and
/// a worker-pool size.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Registry key used to look up the factory, e.g. `"UDP"`, `"TCP"`, `"HTTP"`.
    pub name: String,
    /// Address to bind all of this server's sockets to.
    pub bind_addr: IpAddr,
    /// `(protocol, port)` pairs this server instance serves.
    pub endpoints: Vec<Endpoint>,
    /// Worker-pool size. `-1` means "auto-detect from hardware concurrency".
    pub pool_size: i32,
}

impl ServerSettings {
    /// Resolves [`Self::pool_size`] to a concrete worker count, defaulting
    /// auto-detect (`-1` or `0`) to the available parallelism, or `1` if
    /// that can't be determined.
    pub fn resolved_pool_size(&self) -> usize {
        if self.pool_size > 0 {
            return self.pool_size as usize;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
