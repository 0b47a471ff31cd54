//! The per-handler I/O base: the send/dequeue state machine every concrete
//! handler embeds and delegates to.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::SharedBuffer;
use crate::error::NetIpError;
use crate::handler::IoHandler;
use crate::queue::{OutputQueue, QueueStats};

/// Notifier callback shape: `(error, strong-ref-to-handler) -> ()`, invoked
/// at most once per handler.
pub type Notifier<H> = dyn Fn(NetIpError, Option<Arc<H>>) + Send + Sync;

/// Outcome of [`IoBase::start_write_setup`].
pub enum WriteSetup<E> {
    /// No write was in flight; the caller must issue the transport write
    /// itself right now, with this exact buffer.
    Issue(SharedBuffer, Option<E>),
    /// A write was already in flight; this buffer was appended to the
    /// queue and will surface from a future `get_next_element` call.
    Queued,
    /// The handler isn't started; the buffer was dropped without being
    /// queued (fail-closed).
    Rejected,
}

impl<E> WriteSetup<E> {
    pub fn should_issue(&self) -> bool {
        matches!(self, WriteSetup::Issue(..))
    }
}

struct State<H: IoHandler> {
    started: bool,
    write_in_progress: bool,
    remote_endp: H::Endpoint,
    queue: OutputQueue<H::Endpoint>,
    notify_called: bool,
}

/// Owns the outbound-queue state machine and the started/write-in-progress
/// flags for a single handler.
///
/// Every method takes a small, bounded-time lock; none of them perform I/O.
/// Callers use the return value of [`IoBase::start_write_setup`] and
/// [`IoBase::get_next_element`] to decide, outside the lock, whether *they*
/// must issue a transport write.
pub struct IoBase<H: IoHandler> {
    state: Mutex<State<H>>,
    notifier: Box<Notifier<H>>,
}

impl<H: IoHandler> IoBase<H> {
    pub fn new<F>(notifier: F) -> Self
    where
        F: Fn(NetIpError, Option<Arc<H>>) + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(State {
                started: false,
                write_in_progress: false,
                remote_endp: H::Endpoint::default(),
                queue: OutputQueue::new(),
                notify_called: false,
            }),
            notifier: Box::new(notifier),
        }
    }

    /// First call wires the handler up and returns `true`; every subsequent
    /// call is a no-op returning `false`.
    pub fn start_io_setup(&self) -> bool {
        let mut state = self.state.lock();
        if state.started {
            return false;
        }
        state.started = true;
        true
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn is_write_in_progress(&self) -> bool {
        self.state.lock().write_in_progress
    }

    pub fn output_queue_stats(&self) -> QueueStats {
        self.state.lock().queue.stats()
    }

    pub fn remote_endp(&self) -> H::Endpoint {
        self.state.lock().remote_endp
    }

    pub fn set_remote_endp(&self, endpoint: H::Endpoint) {
        self.state.lock().remote_endp = endpoint;
    }

    /// The central send state machine. See [`WriteSetup`] for the three
    /// outcomes and what the caller owes in each case.
    pub fn start_write_setup(&self, buf: SharedBuffer, endpoint: Option<H::Endpoint>) -> WriteSetup<H::Endpoint> {
        let mut state = self.state.lock();
        if !state.started {
            return WriteSetup::Rejected;
        }
        if state.write_in_progress {
            state.queue.push(buf, endpoint);
            WriteSetup::Queued
        } else {
            state.write_in_progress = true;
            WriteSetup::Issue(buf, endpoint)
        }
    }

    /// Invoked on write completion. Pops the next queued entry for the
    /// caller to write, or clears `write_in_progress` if the queue is
    /// drained.
    pub fn get_next_element(&self) -> Option<(SharedBuffer, Option<H::Endpoint>)> {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
            Some(entry) => Some(entry),
            None => {
                state.write_in_progress = false;
                None
            }
        }
    }

    /// Fires the notifier exactly once, regardless of how many times this
    /// is called.
    pub fn process_err_code(&self, err: NetIpError, handler: Option<Arc<H>>) {
        {
            let mut state = self.state.lock();
            if state.notify_called {
                return;
            }
            state.notify_called = true;
        }
        (self.notifier)(err, handler);
    }

    /// Marks the handler stopped. Returns `false` if already stopped.
    /// One-shot: there is no operation that sets `started` back to `true`
    /// after this.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if !state.started {
            return false;
        }
        state.started = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::UdpEndpoint;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockHandler {
        io_base: IoBase<MockHandler>,
        socket: parking_lot::Mutex<()>,
    }

    impl IoHandler for MockHandler {
        type Endpoint = UdpEndpoint;
        type Socket = ();

        fn io_base(&self) -> &IoBase<Self> {
            &self.io_base
        }

        fn socket(&self) -> &parking_lot::Mutex<Self::Socket> {
            &self.socket
        }

        fn begin_write(&self, _buf: SharedBuffer, _endpoint: Option<Self::Endpoint>) {}
    }

    fn mock(notify_called: Arc<AtomicBool>) -> MockHandler {
        MockHandler {
            io_base: IoBase::new(move |_err, _handler| {
                notify_called.store(true, Ordering::SeqCst);
            }),
            socket: parking_lot::Mutex::new(()),
        }
    }

    fn buf(n: usize) -> SharedBuffer {
        SharedBuffer::copy_from_slice(&vec![0xABu8; n])
    }

    #[test]
    fn fresh_io_base_is_unstarted_and_empty() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        assert!(!ioh.io_base.is_started());
        assert!(!ioh.io_base.is_write_in_progress());
        assert_eq!(ioh.io_base.output_queue_stats().output_queue_size, 0);
        assert_eq!(ioh.io_base.output_queue_stats().bytes_in_output_queue, 0);
    }

    #[test]
    fn start_io_setup_is_idempotent() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        assert!(ioh.io_base.start_io_setup());
        assert!(ioh.io_base.is_started());
        assert!(!ioh.io_base.start_io_setup());
    }

    #[test]
    fn send_before_start_is_rejected() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        assert!(!ioh.io_base.start_write_setup(buf(4), None).should_issue());
        assert_eq!(ioh.io_base.output_queue_stats().output_queue_size, 0);
        assert!(!ioh.io_base.is_write_in_progress());
    }

    #[test]
    fn first_write_after_start_must_be_issued_by_caller() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        assert!(ioh.io_base.start_io_setup());
        let setup = ioh.io_base.start_write_setup(buf(4), None);
        assert!(matches!(setup, WriteSetup::Issue(..)));
        assert!(ioh.io_base.is_write_in_progress());
        assert_eq!(ioh.io_base.output_queue_stats().output_queue_size, 0);
    }

    #[test]
    fn second_concurrent_write_is_queued() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        ioh.io_base.start_io_setup();
        assert!(ioh.io_base.start_write_setup(buf(4), None).should_issue());
        assert!(matches!(
            ioh.io_base.start_write_setup(buf(4), None),
            WriteSetup::Queued
        ));
        assert!(ioh.io_base.is_write_in_progress());
        assert_eq!(ioh.io_base.output_queue_stats().output_queue_size, 1);
    }

    /// 20 sends while write-in-progress queues 19 behind the first.
    #[test]
    fn queueing_under_write_in_progress() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        ioh.io_base.start_io_setup();
        let one_buf = buf(7);
        assert!(ioh
            .io_base
            .start_write_setup(one_buf.clone(), None)
            .should_issue());
        for _ in 0..19 {
            assert!(matches!(
                ioh.io_base.start_write_setup(one_buf.clone(), None),
                WriteSetup::Queued
            ));
        }
        let stats = ioh.io_base.output_queue_stats();
        assert!(ioh.io_base.is_write_in_progress());
        assert_eq!(stats.output_queue_size, 19);
        assert_eq!(stats.bytes_in_output_queue, 19 * one_buf.len());
    }

    /// Draining a full queue down to empty, one `get_next_element` at a time.
    #[test]
    fn drain_to_empty_clears_write_in_progress_on_the_call_after_the_last_entry() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        ioh.io_base.start_io_setup();
        let one_buf = buf(7);
        let endpoint = UdpEndpoint("10.0.0.1:9999".parse().unwrap());
        for _ in 0..20 {
            ioh.io_base.start_write_setup(one_buf.clone(), Some(endpoint));
        }
        for _ in 0..18 {
            assert!(ioh.io_base.get_next_element().is_some());
        }
        let stats = ioh.io_base.output_queue_stats();
        assert_eq!(stats.output_queue_size, 1);
        assert_eq!(stats.bytes_in_output_queue, one_buf.len());

        let last = ioh.io_base.get_next_element();
        assert_eq!(ioh.io_base.output_queue_stats().output_queue_size, 0);
        assert!(ioh.io_base.is_write_in_progress());
        let (returned_buf, returned_endpoint) = last.unwrap();
        assert_eq!(returned_buf, one_buf);
        assert_eq!(returned_endpoint, Some(endpoint));

        assert!(ioh.io_base.get_next_element().is_none());
        assert!(!ioh.io_base.is_write_in_progress());
    }

    #[test]
    fn notifier_fires_at_most_once() {
        let notify_called = Arc::new(AtomicBool::new(false));
        let ioh = mock(notify_called.clone());
        assert!(!notify_called.load(Ordering::SeqCst));
        ioh.io_base
            .process_err_code(NetIpError::MessageHandlerTerminated, None);
        assert!(notify_called.load(Ordering::SeqCst));

        notify_called.store(false, Ordering::SeqCst);
        ioh.io_base
            .process_err_code(NetIpError::MessageHandlerTerminated, None);
        assert!(!notify_called.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_is_idempotent() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        ioh.io_base.start_io_setup();
        assert!(ioh.io_base.stop());
        assert!(!ioh.io_base.is_started());
        assert!(!ioh.io_base.stop());
    }

    #[test]
    fn stop_before_start_returns_false() {
        let ioh = mock(Arc::new(AtomicBool::new(false)));
        assert!(!ioh.io_base.stop());
    }
}
