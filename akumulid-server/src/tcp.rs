//! TCP ingestion: one `mio` poll loop per worker thread, each with its own
//! `SO_REUSEPORT` listening socket so the kernel spreads new connections
//! across workers the same way it spreads UDP datagrams. Each connection
//! is pinned to the worker thread that accepted it for its whole lifetime,
//! so its `DbSession` never has to cross threads.
//!
//! Grounded on the accept/dispatch split in the teacher's
//! `src/listener.rs` and `src/worker.rs`, collapsed into a single loop per
//! worker since a parser+session pair, unlike an HTTP connection, has no
//! separate "routing" stage worth moving to its own thread pool.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;

use akumulid_engine::DbConnection;
use akumulid_proto::{OpenTsdbParser, Parser, RespParser};

use crate::error::ServerError;
use crate::server::Server;
use crate::settings::ServerSettings;
use crate::signal::SignalHandler;

const LISTEN_TOKEN: Token = Token(usize::MAX);
const WAKE_TOKEN: Token = Token(usize::MAX - 1);
const READ_CHUNK: usize = 8192;

/// Which line protocol a `TcpServer` feeds accepted connections into.
#[derive(Clone, Copy)]
pub enum ParserKind {
    /// RESP ingestion framing.
    Resp,
    /// OpenTSDB telnet `put` framing.
    OpenTsdb,
}

impl ParserKind {
    fn make(self) -> Box<dyn Parser> {
        match self {
            ParserKind::Resp => Box::<RespParser>::default(),
            ParserKind::OpenTsdb => Box::<OpenTsdbParser>::default(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ParserKind::Resp => "RESP",
            ParserKind::OpenTsdb => "OpenTSDB",
        }
    }
}

struct Conn {
    stream: MioTcpStream,
    session: akumulid_engine::DbSession,
    parser: Box<dyn Parser>,
    started: bool,
}

fn worker_loop(
    bind_addr: SocketAddr,
    connection: DbConnection,
    kind: ParserKind,
    stop: Arc<AtomicBool>,
    startup_barrier: Arc<std::sync::Barrier>,
    setup_failed: &Mutex<Option<io::Error>>,
    waker_slot: &Mutex<Option<Arc<Waker>>>,
) {
    let setup = (|| -> io::Result<(Poll, MioTcpListener)> {
        let std_listener = std::net::TcpListener::bind(bind_addr)?;
        std_listener.set_nonblocking(true)?;
        #[cfg(unix)]
        {
            use nix::sys::socket::{setsockopt, sockopt::ReusePort};
            let _ = setsockopt(&std_listener, ReusePort, &true);
        }
        let mut listener = MioTcpListener::from_std(std_listener);
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;
        Ok((poll, listener))
    })();

    let (poll, mut listener) = match setup {
        Ok(p) => p,
        Err(e) => {
            *setup_failed.lock().expect("setup-failed mutex poisoned") = Some(e);
            startup_barrier.wait();
            return;
        }
    };

    let waker = match Waker::new(poll.registry(), WAKE_TOKEN) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            *setup_failed.lock().expect("setup-failed mutex poisoned") = Some(e);
            startup_barrier.wait();
            return;
        }
    };
    *waker_slot.lock().expect("waker slot mutex poisoned") = Some(waker);

    startup_barrier.wait();

    let mut poll = poll;
    let mut events = Events::with_capacity(256);
    let mut connections: Slab<Conn> = Slab::new();

    'outer: loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::warn!(error = %e, "TCP poll error, worker exiting");
            break;
        }

        if stop.load(Ordering::Relaxed) {
            break;
        }

        for event in events.iter() {
            match event.token() {
                WAKE_TOKEN => {
                    if stop.load(Ordering::Relaxed) {
                        break 'outer;
                    }
                }
                LISTEN_TOKEN => loop {
                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            let session = match connection.session() {
                                Ok(s) => s,
                                Err(e) => {
                                    tracing::warn!(error = %e, "failed to open session for new TCP connection");
                                    continue;
                                }
                            };
                            let entry = connections.vacant_entry();
                            let token = Token(entry.key());
                            if poll
                                .registry()
                                .register(&mut stream, token, Interest::READABLE)
                                .is_ok()
                            {
                                entry.insert(Conn {
                                    stream,
                                    session,
                                    parser: kind.make(),
                                    started: false,
                                });
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            tracing::warn!(error = %e, protocol = kind.name(), "accept failed");
                            break;
                        }
                    }
                },
                token => {
                    let mut close = false;
                    if let Some(conn) = connections.get_mut(token.0) {
                        if !conn.started {
                            conn.parser.start();
                            conn.started = true;
                        }
                        let mut chunk = [0u8; READ_CHUNK];
                        loop {
                            match conn.stream.read(&mut chunk) {
                                Ok(0) => {
                                    close = true;
                                    break;
                                }
                                Ok(n) => {
                                    let dest = conn.parser.next_buffer(n);
                                    dest.copy_from_slice(&chunk[..n]);
                                    if let Err(e) = conn.parser.parse_next(n, &mut conn.session) {
                                        tracing::warn!(error = %e, protocol = kind.name(), "protocol error, closing connection");
                                        close = true;
                                        break;
                                    }
                                }
                                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                                Err(e) => {
                                    tracing::warn!(error = %e, "read error, closing connection");
                                    close = true;
                                    break;
                                }
                            }
                        }
                    }
                    if close {
                        if let Some(mut conn) = connections.try_remove(token.0) {
                            conn.parser.close();
                            let _ = poll.registry().deregister(&mut conn.stream);
                        }
                    }
                }
            }
        }
    }

    for (_, mut conn) in connections {
        conn.parser.close();
        let _ = poll.registry().deregister(&mut conn.stream);
    }
}

/// Accepts RESP or OpenTSDB connections over TCP.
pub struct TcpServer {
    connection: DbConnection,
    bind_addr: SocketAddr,
    pool_size: usize,
    kind: ParserKind,
    stop: Arc<AtomicBool>,
    wakers: Vec<Arc<Mutex<Option<Arc<Waker>>>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TcpServer {
    /// Builds a not-yet-started server.
    pub fn new(connection: DbConnection, bind_addr: SocketAddr, pool_size: usize, kind: ParserKind) -> Self {
        Self {
            connection,
            bind_addr,
            pool_size: pool_size.max(1),
            kind,
            stop: Arc::new(AtomicBool::new(false)),
            wakers: Vec::new(),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Idempotently signals every worker's waker and always joins whatever
/// worker handles remain — the signal-handler callback and the explicit
/// `Server::stop()` call both route through this, whichever runs first.
fn stop_tcp_server(
    stop: &Arc<AtomicBool>,
    wakers: &[Arc<Mutex<Option<Arc<Waker>>>>],
    workers: &Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    if !stop.swap(true, Ordering::Relaxed) {
        for slot in wakers {
            if let Some(waker) = slot.lock().expect("waker slot mutex poisoned").as_ref() {
                let _ = waker.wake();
            }
        }
    }
    let mut workers = workers.lock().expect("workers mutex poisoned");
    for handle in workers.drain(..) {
        let _ = handle.join();
    }
}

impl Server for TcpServer {
    fn start(&mut self, signal_handler: &SignalHandler, id: u64) -> Result<(), ServerError> {
        let startup_barrier = Arc::new(std::sync::Barrier::new(self.pool_size + 1));
        let setup_failed: Arc<Mutex<Option<io::Error>>> = Arc::new(Mutex::new(None));

        let mut handles = Vec::with_capacity(self.pool_size);
        let mut waker_slots = Vec::with_capacity(self.pool_size);
        for _ in 0..self.pool_size {
            let bind_addr = self.bind_addr;
            let connection = self.connection.clone();
            let kind = self.kind;
            let stop = self.stop.clone();
            let startup_barrier = startup_barrier.clone();
            let setup_failed = setup_failed.clone();
            let waker_slot = Arc::new(Mutex::new(None));
            waker_slots.push(waker_slot.clone());
            handles.push(std::thread::spawn(move || {
                worker_loop(bind_addr, connection, kind, stop, startup_barrier, &setup_failed, &waker_slot);
            }));
        }

        startup_barrier.wait();

        if let Some(e) = setup_failed.lock().expect("setup-failed mutex poisoned").take() {
            self.stop.store(true, Ordering::Relaxed);
            for slot in &waker_slots {
                if let Some(waker) = slot.lock().expect("waker slot mutex poisoned").as_ref() {
                    let _ = waker.wake();
                }
            }
            for handle in handles {
                let _ = handle.join();
            }
            return Err(ServerError::Io(e));
        }

        self.wakers = waker_slots;
        *self.workers.lock().expect("workers mutex poisoned") = handles;

        let stop = self.stop.clone();
        let wakers = self.wakers.clone();
        let workers = self.workers.clone();
        signal_handler.register(id, move || {
            stop_tcp_server(&stop, &wakers, &workers);
        });

        Ok(())
    }

    fn stop(&self) {
        stop_tcp_server(&self.stop, &self.wakers, &self.workers);
    }
}


fn build_with_kind(
    connection: &DbConnection,
    settings: &ServerSettings,
    kind: ParserKind,
) -> Result<Box<dyn Server>, ServerError> {
    if settings.endpoints.len() != 1 {
        return Err(ServerError::InvalidSettings {
            protocol: kind.name(),
            reason: format!("expected exactly one endpoint, got {}", settings.endpoints.len()),
        });
    }
    let addr = SocketAddr::new(settings.bind_addr, settings.endpoints[0].port);
    Ok(Box::new(TcpServer::new(
        connection.clone(),
        addr,
        settings.resolved_pool_size(),
        kind,
    )))
}

/// Registry factory for the `"TCP"` protocol (RESP framing).
pub(crate) fn build(
    connection: &DbConnection,
    settings: &ServerSettings,
) -> Result<Box<dyn Server>, ServerError> {
    build_with_kind(connection, settings, ParserKind::Resp)
}

/// Registry factory for the `"OpenTSDB"` protocol.
pub(crate) fn build_opentsdb(
    connection: &DbConnection,
    settings: &ServerSettings,
) -> Result<Box<dyn Server>, ServerError> {
    build_with_kind(connection, settings, ParserKind::OpenTsdb)
}
