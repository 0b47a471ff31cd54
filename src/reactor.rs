//! The worker-thread pool that drives `mio::Poll` and dispatches readiness
//! events to registered handlers.
//!
//! Out of the core's scope by design — `basic_io_interface`/`basic_io_output`
//! and the I/O base don't know this exists — but a handle abstraction with
//! nothing driving readiness isn't a usable network library, so this module
//! supplies it the way `mio`'s own `examples/tcp_server.rs` and
//! `examples/udp_server.rs` do: one `Poll` + `Events` loop per worker
//! thread, a token-indexed table mapping `Token` back to the registered
//! target.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use slab::Slab;

use crate::macros::{debug, trace, warn};

const WAKER_TOKEN: Token = Token(usize::MAX);

/// Configuration for a [`Reactor`].
pub struct ReactorConfig {
    /// Number of worker threads, each driving its own `mio::Poll`.
    /// Defaults to the visible core count.
    pub worker_threads: usize,
    /// Capacity of the `Events` buffer each worker polls into per iteration.
    pub events_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            events_capacity: 1024,
        }
    }
}

/// Anything a worker can deliver readiness callbacks to.
///
/// Implemented by the entity layer's per-connection wrappers around
/// `TcpIoHandler`/`UdpIoHandler` (an acceptor's listening socket implements
/// it too, to accept new connections on readability).
pub trait ReactorTarget: Send + Sync {
    fn on_readable(&self) {}
    fn on_writable(&self) {}
}

type TargetTable = Arc<Mutex<Slab<Arc<dyn ReactorTarget>>>>;

struct Worker {
    registry: Registry,
    targets: TargetTable,
    waker: Arc<Waker>,
    handle: Option<JoinHandle<()>>,
}

/// A fixed-size pool of poll-driven worker threads.
///
/// Registrations are assigned round-robin across workers. `mio::Registry`
/// is documented safe to call `register`/`reregister`/`deregister` from any
/// thread concurrently with another thread blocked in `Poll::poll`, which is
/// what lets [`Reactor::register`] avoid any cross-worker locking beyond
/// each worker's own target table.
pub struct Reactor {
    workers: Vec<Worker>,
    next: AtomicUsize,
    shutdown: Arc<AtomicBool>,
}

/// A live registration, used to deregister or to shift interest later.
pub struct Registration {
    worker: usize,
    token: Token,
}

impl Reactor {
    pub fn start(config: ReactorConfig) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.worker_threads);
        for index in 0..config.worker_threads {
            let poll = Poll::new()?;
            let registry = poll.registry().try_clone()?;
            let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
            let targets: TargetTable = Arc::new(Mutex::new(Slab::new()));
            let worker_targets = targets.clone();
            let worker_shutdown = shutdown.clone();
            let events_capacity = config.events_capacity;
            let handle = thread::Builder::new()
                .name(format!("spark-io-worker-{index}"))
                .spawn(move || run_worker(poll, worker_targets, worker_shutdown, events_capacity))?;
            workers.push(Worker {
                registry,
                targets,
                waker,
                handle: Some(handle),
            });
        }
        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
            shutdown,
        })
    }

    /// Registers `target` for the given interest, assigning it to the next
    /// worker in round-robin order.
    pub fn register(
        &self,
        source: &mut dyn mio::event::Source,
        interest: Interest,
        target: Arc<dyn ReactorTarget>,
    ) -> io::Result<Registration> {
        let worker_index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = &self.workers[worker_index];
        let mut targets = worker.targets.lock();
        let entry = targets.vacant_entry();
        let token = Token(entry.key());
        worker.registry.register(source, token, interest)?;
        entry.insert(target);
        trace!("registered token {:?} on worker {}", token, worker_index);
        Ok(Registration { worker: worker_index, token })
    }

    pub fn reregister(
        &self,
        source: &mut dyn mio::event::Source,
        registration: &Registration,
        interest: Interest,
    ) -> io::Result<()> {
        self.workers[registration.worker]
            .registry
            .reregister(source, registration.token, interest)
    }

    pub fn deregister(&self, source: &mut dyn mio::event::Source, registration: Registration) -> io::Result<()> {
        self.workers[registration.worker].registry.deregister(source)?;
        self.workers[registration.worker]
            .targets
            .lock()
            .remove(registration.token.0);
        Ok(())
    }

    /// Signals every worker to exit its poll loop and joins the threads.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in &self.workers {
            let _ = worker.waker.wake();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_worker(mut poll: Poll, targets: TargetTable, shutdown: Arc<AtomicBool>, events_capacity: usize) {
    let mut events = Events::with_capacity(events_capacity);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("reactor worker shutting down");
            return;
        }
        if let Err(e) = poll.poll(&mut events, Some(Duration::from_millis(250))) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!("poll error: {}", e);
            continue;
        }
        for event in events.iter() {
            if event.token() == WAKER_TOKEN {
                continue;
            }
            let target = targets.lock().get(event.token().0).cloned();
            let Some(target) = target else { continue };
            if event.is_readable() {
                target.on_readable();
            }
            if event.is_writable() {
                target.on_writable();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::UdpSocket;
    use std::sync::atomic::AtomicUsize as Counter;

    struct CountingTarget {
        reads: Counter,
    }

    impl ReactorTarget for CountingTarget {
        fn on_readable(&self) {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_and_shutdown_round_trip() {
        let reactor = Reactor::start(ReactorConfig {
            worker_threads: 1,
            events_capacity: 16,
        })
        .unwrap();

        let mut socket = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let target = Arc::new(CountingTarget { reads: Counter::new(0) });
        let registration = reactor
            .register(&mut socket, Interest::READABLE, target.clone())
            .unwrap();
        reactor.deregister(&mut socket, registration).unwrap();
        reactor.shutdown();
    }
}
