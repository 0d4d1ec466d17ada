//! Process-wide signal plumbing: one thread waits on SIGINT/SIGTERM and
//! invokes every server's registered `stop` callable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

type StopFn = Box<dyn Fn() + Send + 'static>;

struct Inner {
    callbacks: Mutex<HashMap<u64, StopFn>>,
}

/// Maps an integer id to a `stop` callable, and runs the thread that
/// invokes them all when the process is asked to terminate.
#[derive(Clone)]
pub struct SignalHandler {
    inner: Arc<Inner>,
}

impl SignalHandler {
    /// Creates a handler with no registrations yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                callbacks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers `stop` under `id`. Re-registering the same id replaces the
    /// previous callable.
    pub fn register(&self, id: u64, stop: impl Fn() + Send + 'static) {
        self.inner
            .callbacks
            .lock()
            .expect("signal handler mutex poisoned")
            .insert(id, Box::new(stop));
    }

    /// Removes a registration, e.g. once a server has been stopped directly.
    pub fn unregister(&self, id: u64) {
        self.inner
            .callbacks
            .lock()
            .expect("signal handler mutex poisoned")
            .remove(&id);
    }

    /// Spawns the thread that blocks on SIGINT/SIGTERM and, once one
    /// arrives, invokes every registered callback (order unspecified) and
    /// returns the ids that were stopped.
    pub fn spawn_wait_thread(&self) -> std::io::Result<JoinHandle<Vec<u64>>> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let inner = self.inner.clone();
        Ok(std::thread::spawn(move || {
            // Block until the OS delivers a termination signal.
            let _ = signals.forever().next();
            let callbacks = inner.callbacks.lock().expect("signal handler mutex poisoned");
            let ids: Vec<u64> = callbacks.keys().copied().collect();
            for stop in callbacks.values() {
                stop();
            }
            ids
        }))
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
