//! The common interface every concrete server (`UdpServer`, `TcpServer`,
//! `HttpServer`) implements against a shared signal handler.

use crate::error::ServerError;
use crate::signal::SignalHandler;

/// A running network front-end.
///
/// `start` must register its own `stop` with `signal_handler` under `id`
/// and only return once every listener/worker it owns is ready. `stop`
/// must be idempotent and safe to call from the signal-delivery thread.
pub trait Server: Send {
    /// Binds sockets, spawns workers, and registers for shutdown signals.
    fn start(&mut self, signal_handler: &SignalHandler, id: u64) -> Result<(), ServerError>;

    /// Signals every worker to stop, waits for them to exit, and releases
    /// all sockets. Safe to call more than once and from any thread.
    fn stop(&self);
}
