//! A minimal HTTP/1.1 front-end: the only server that drives the query
//! pipeline. Not core per the spec — just enough framing to push a
//! request body through `QueryProcessor::create`/`append`/`read_some`.
//!
//! Accept/dispatch is grounded on the teacher's `Listener`/`Worker` split
//! (`src/listener.rs`, `src/worker.rs`): one accept loop feeding a shared
//! channel, and a fixed pool of workers pulling off it. Unlike the
//! teacher, each worker here runs a connection to completion synchronously
//! rather than reacting to individual readiness events, since requests
//! are small and the pipeline itself already streams the response body.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use mio::net::TcpListener as MioTcpListener;
use mio::{Events, Interest, Poll, Token, Waker};

use akumulid_engine::DbConnection;
use akumulid_query::{ApiEndpoint, QueryFormat, QueryProcessor};

use crate::error::ServerError;
use crate::server::Server;
use crate::settings::ServerSettings;
use crate::signal::SignalHandler;

const LISTEN_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);

struct Request {
    method: String,
    path: String,
    query: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> io::Result<Request> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();
    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    let (path, query) = (path.to_string(), query.to_string());

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body)?;
    }

    Ok(Request {
        method,
        path,
        query,
        body,
    })
}

fn write_response(stream: &mut TcpStream, status: &str, body: &[u8]) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body)
}

fn endpoint_for(path: &str, query: &str) -> Option<ApiEndpoint> {
    match path {
        "/api/query" => {
            let json = query.split('&').any(|p| p == "format=json");
            Some(ApiEndpoint::Query(if json {
                QueryFormat::Json
            } else {
                QueryFormat::Csv
            }))
        }
        "/api/suggest" => Some(ApiEndpoint::Suggest),
        "/api/search" => Some(ApiEndpoint::Search),
        _ => None,
    }
}

fn handle_request(processor: &QueryProcessor, req: Request) -> (String, Vec<u8>) {
    if req.path == "/api/stats" {
        return match processor.get_all_stats() {
            Ok(mut stats) => {
                stats.push_str(&crate::stats::render_all());
                ("200 OK".to_string(), stats.into_bytes())
            }
            Err(e) => ("503 Service Unavailable".to_string(), e.to_string().into_bytes()),
        };
    }

    if let Some(name) = req.path.strip_prefix("/api/resource/") {
        return match processor.get_resource(name) {
            Ok(resource) => ("200 OK".to_string(), resource.into_bytes()),
            Err(e) => ("404 Not Found".to_string(), e.to_string().into_bytes()),
        };
    }

    let Some(endpoint) = endpoint_for(&req.path, &req.query) else {
        return ("404 Not Found".to_string(), b"unknown endpoint".to_vec());
    };

    let mut pooler = match processor.create(endpoint) {
        Ok(p) => p,
        Err(e) => return ("503 Service Unavailable".to_string(), e.to_string().into_bytes()),
    };

    if let Err(e) = pooler.append(&req.body) {
        return ("400 Bad Request".to_string(), e.to_string().into_bytes());
    }
    if let Err(e) = pooler.start() {
        return ("400 Bad Request".to_string(), e.to_string().into_bytes());
    }

    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match pooler.read_some(&mut buf) {
            Ok((n, complete)) => {
                out.extend_from_slice(&buf[..n]);
                if complete {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    if let Some(e) = pooler.get_error_message() {
        return ("500 Internal Server Error".to_string(), e.into_bytes());
    }

    ("200 OK".to_string(), out)
}

fn worker_loop(receiver: Receiver<TcpStream>, processor: Arc<QueryProcessor>) {
    while let Ok(mut stream) = receiver.recv() {
        let request = match read_request(&mut stream) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if request.method != "GET" && request.method != "POST" {
            let _ = write_response(&mut stream, "405 Method Not Allowed", b"");
            continue;
        }
        let (status, body) = handle_request(&processor, request);
        let _ = write_response(&mut stream, &status, &body);
    }
}

/// Serves `/api/query`, `/api/suggest`, `/api/search`, `/api/stats`, and
/// `/api/resource/<name>` over HTTP/1.1.
pub struct HttpServer {
    bind_addr: SocketAddr,
    pool_size: usize,
    processor: Arc<QueryProcessor>,
    stop: Arc<AtomicBool>,
    waker: Arc<Mutex<Option<Arc<Waker>>>>,
    accept_thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpServer {
    /// Builds a not-yet-started server.
    pub fn new(connection: DbConnection, bind_addr: SocketAddr, pool_size: usize) -> Self {
        Self {
            bind_addr,
            pool_size: pool_size.max(1),
            processor: Arc::new(QueryProcessor::new(connection.downgrade())),
            stop: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(Mutex::new(None)),
            accept_thread: Arc::new(Mutex::new(None)),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Idempotently signals shutdown and always joins the accept thread and
/// worker pool, whether called first by the signal handler's callback or
/// redundantly by the explicit `Server::stop()` `main` calls afterward.
fn stop_http_server(
    stop: &Arc<AtomicBool>,
    waker: &Arc<Mutex<Option<Arc<Waker>>>>,
    accept_thread: &Arc<Mutex<Option<JoinHandle<()>>>>,
    workers: &Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    if !stop.swap(true, Ordering::Relaxed) {
        if let Some(waker) = waker.lock().expect("waker mutex poisoned").as_ref() {
            let _ = waker.wake();
        }
    }
    if let Some(handle) = accept_thread.lock().expect("accept thread mutex poisoned").take() {
        let _ = handle.join();
    }
    let mut workers = workers.lock().expect("workers mutex poisoned");
    for handle in workers.drain(..) {
        let _ = handle.join();
    }
}

impl Server for HttpServer {
    fn start(&mut self, signal_handler: &SignalHandler, id: u64) -> Result<(), ServerError> {
        let std_listener = std::net::TcpListener::bind(self.bind_addr)?;
        std_listener.set_nonblocking(true)?;
        let mut listener = MioTcpListener::from_std(std_listener);
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        *self.waker.lock().expect("waker mutex poisoned") = Some(waker);

        let (sender, receiver): (Sender<TcpStream>, Receiver<TcpStream>) = bounded(256);

        let mut workers = Vec::with_capacity(self.pool_size);
        for _ in 0..self.pool_size {
            let receiver = receiver.clone();
            let processor = self.processor.clone();
            workers.push(std::thread::spawn(move || worker_loop(receiver, processor)));
        }
        *self.workers.lock().expect("workers mutex poisoned") = workers;

        let stop = self.stop.clone();
        let accept_thread = std::thread::spawn(move || {
            accept_loop(poll, listener, sender, stop);
        });
        *self.accept_thread.lock().expect("accept thread mutex poisoned") = Some(accept_thread);

        let stop = self.stop.clone();
        let waker_field = self.waker.clone();
        let accept_thread = self.accept_thread.clone();
        let workers_field = self.workers.clone();
        signal_handler.register(id, move || {
            stop_http_server(&stop, &waker_field, &accept_thread, &workers_field);
        });

        Ok(())
    }

    fn stop(&self) {
        stop_http_server(&self.stop, &self.waker, &self.accept_thread, &self.workers);
    }
}

fn accept_loop(
    mut poll: Poll,
    mut listener: MioTcpListener,
    sender: Sender<TcpStream>,
    stop: Arc<AtomicBool>,
) {
    let mut events = Events::with_capacity(128);
    'outer: loop {
        if poll.poll(&mut events, None).is_err() {
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
                        Ok((stream, _)) => {
                            let std_stream = unsafe {
                                TcpStream::from_raw_fd(stream.into_raw_fd())
                            };
                            let _ = std_stream.set_nonblocking(false);
                            if sender.send(std_stream).is_err() {
                                break 'outer;
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(_) => break,
                    }
                },
                _ => {}
            }
        }
    }
    drop(sender);
    let _ = poll.registry().deregister(&mut listener);
}

#[cfg(test)]
mod tests {
    use super::*;
    use akumulid_engine::MemoryEngine;
    use serial_test::serial;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicU64 as TestAtomicU64;
    use std::time::Duration;

    fn test_connection(tag: &str) -> DbConnection {
        static NEXT: TestAtomicU64 = TestAtomicU64::new(0);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        DbConnection::open(
            std::env::temp_dir().join(format!("akumulid-http-test-{tag}-{id}")),
            Box::new(MemoryEngine::new()),
        )
        .unwrap()
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    #[serial]
    fn stats_endpoint_reports_registered_server_snapshots() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), free_port());
        let connection = test_connection("stats");
        let mut server = HttpServer::new(connection, addr, 1);
        let handler = SignalHandler::new();
        server.start(&handler, 1).unwrap();

        crate::stats::register(
            "TEST:http".to_string(),
            Arc::new(|| "packets_processed=7 bytes_processed=70".to_string()),
        );

        let mut stream = TcpStream::connect(addr).expect("accept loop already bound");
        stream
            .write_all(b"GET /api/stats HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        stream.shutdown(std::net::Shutdown::Write).ok();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        crate::stats::unregister("TEST:http");
        server.stop();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("TEST:http: packets_processed=7 bytes_processed=70"));
    }

    #[test]
    #[serial]
    fn stop_joins_accept_thread_and_workers() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), free_port());
        let connection = test_connection("stop");
        let mut server = HttpServer::new(connection, addr, 2);
        let handler = SignalHandler::new();
        server.start(&handler, 2).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        server.stop();

        assert!(server.accept_thread.lock().unwrap().is_none());
        assert!(server.workers.lock().unwrap().is_empty());
    }
}

/// Registry factory for the `"HTTP"` protocol.
pub(crate) fn build(
    connection: &DbConnection,
    settings: &ServerSettings,
) -> Result<Box<dyn Server>, ServerError> {
    if settings.endpoints.len() != 1 {
        return Err(ServerError::InvalidSettings {
            protocol: "HTTP",
            reason: format!("expected exactly one endpoint, got {}", settings.endpoints.len()),
        });
    }
    let addr = SocketAddr::new(settings.bind_addr, settings.endpoints[0].port);
    Ok(Box::new(HttpServer::new(
        connection.clone(),
        addr,
        settings.resolved_pool_size(),
    )))
}
