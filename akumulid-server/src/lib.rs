//! The multi-protocol acceptor framework: a server registry, the UDP
//! batch ingestor, and the TCP/OpenTSDB/HTTP front-ends built on top of
//! it.

#![deny(missing_docs, rust_2018_idioms)]

mod error;
mod http;
mod registry;
mod server;
mod settings;
mod signal;
mod stats;
mod tcp;
mod udp;

pub use error::ServerError;
pub use http::HttpServer;
pub use registry::{build, register_builtin_servers, register_factory, Factory};
pub use server::Server;
pub use settings::{Endpoint, ServerSettings};
pub use signal::SignalHandler;
pub use tcp::{ParserKind, TcpServer};
pub use udp::UdpServer;
