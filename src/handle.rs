//! The two application-facing handle types: [`IoInterface`] (weak,
//! validity-checked) and [`IoOutput`] (strong, lifetime-participating).

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::buffer::SharedBuffer;
use crate::error::NetIpError;
use crate::handler::IoHandler;
use crate::io_base::WriteSetup;
use crate::queue::QueueStats;

/// Shared by [`IoInterface::send`] and [`IoOutput::send`]: runs the buffer
/// through the I/O base's state machine and, if this call holds the "issue
/// write now" token, hands it to the handler to actually write.
fn submit<H: IoHandler>(handler: &H, buf: SharedBuffer, endpoint: Option<H::Endpoint>) -> bool {
    match handler.io_base().start_write_setup(buf, endpoint) {
        WriteSetup::Issue(buf, endpoint) => {
            handler.begin_write(buf, endpoint);
            true
        }
        WriteSetup::Queued => true,
        WriteSetup::Rejected => false,
    }
}

/// A value-copyable application handle whose validity tracks the existence
/// of the underlying handler.
///
/// Every operation except [`IoInterface::is_valid`] upgrades the internal
/// weak reference to a strong one for the duration of the call, so a handle
/// that outlives its handler simply starts returning
/// [`NetIpError::HandleExpired`] rather than dangling.
pub struct IoInterface<H: IoHandler> {
    inner: Weak<H>,
}

impl<H: IoHandler> IoInterface<H> {
    pub(crate) fn new(handler: &Arc<H>) -> Self {
        Self {
            inner: Arc::downgrade(handler),
        }
    }

    pub(crate) fn from_weak(inner: Weak<H>) -> Self {
        Self { inner }
    }

    /// `true` iff the referenced handler still exists. The only operation
    /// that does not require an upgrade.
    pub fn is_valid(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Upgrade to a strong reference, or `HandleExpired`. Visible to the
    /// `handler` module so each concrete handler kind can add its own
    /// `start_io` overload without this crate exposing the handler itself
    /// (and its reactor-callback methods) as part of the public API.
    pub(crate) fn upgrade(&self) -> Result<Arc<H>, NetIpError> {
        self.inner.upgrade().ok_or(NetIpError::HandleExpired)
    }

    pub fn is_io_started(&self) -> Result<bool, NetIpError> {
        Ok(self.upgrade()?.io_base().is_started())
    }

    /// A reference to the underlying socket, scoped so that only the
    /// socket is reachable through it — not the handler's internal
    /// `start_io`/`on_readable`/`on_writable` methods the reactor and entity
    /// layer call.
    pub fn get_socket(&self) -> Result<SocketHandle<H>, NetIpError> {
        Ok(SocketHandle::new(self.upgrade()?))
    }

    pub fn get_output_queue_stats(&self) -> Result<QueueStats, NetIpError> {
        Ok(self.upgrade()?.io_base().output_queue_stats())
    }

    /// Submits `buf` to the I/O base. Returns `Ok(true)` if queued for
    /// output, `Ok(false)` if the handler silently dropped it (not started,
    /// or shutting down).
    pub fn send(&self, buf: SharedBuffer, endpoint: Option<H::Endpoint>) -> Result<bool, NetIpError> {
        let handler = self.upgrade()?;
        Ok(submit(&handler, buf, endpoint))
    }

    /// Returns `false` if the handler is already stopped; `true` on first
    /// success. Triggers orderly teardown: the handler's notifier fires
    /// with [`NetIpError::Stopped`], which deregisters the socket from the
    /// reactor and publishes the closing state-change event, exactly once.
    pub fn stop_io(&self) -> Result<bool, NetIpError> {
        let handler = self.upgrade()?;
        let first = handler.io_base().stop();
        if first {
            handler.io_base().process_err_code(NetIpError::Stopped, Some(handler.clone()));
        }
        Ok(first)
    }

    /// A strong, lifetime-participating handle constructed from this weak
    /// one, or `HandleExpired` if the referent is already gone.
    pub fn make_io_output(&self) -> Result<IoOutput<'static, H>, NetIpError> {
        Ok(IoOutput::Owned(self.upgrade()?))
    }
}

impl<H: IoHandler> Clone for IoInterface<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: IoHandler> std::fmt::Debug for IoInterface<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoInterface")
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Two invalid handles are equal; an invalid handle orders strictly below
/// every valid one; two valid handles compare (and order) by referent
/// identity, not content.
impl<H: IoHandler> PartialEq for IoInterface<H> {
    fn eq(&self, other: &Self) -> bool {
        match (self.inner.upgrade(), other.inner.upgrade()) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

impl<H: IoHandler> Eq for IoInterface<H> {}

impl<H: IoHandler> PartialOrd for IoInterface<H> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<H: IoHandler> Ord for IoInterface<H> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.inner.upgrade(), other.inner.upgrade()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => (Arc::as_ptr(&a) as usize).cmp(&(Arc::as_ptr(&b) as usize)),
        }
    }
}

/// A strong send handle: either owns a share of the handler (extending its
/// lifetime for as long as the handle exists) or borrows one for the
/// duration of a callback the framework guarantees is live.
///
/// `release` consumes `self` by value rather than nulling an internal
/// pointer: a released handle cannot be sent through because it no longer
/// exists, which turns "send after release" into a compile error instead of
/// the undefined behavior the borrowed-pointer design it's modeled on
/// documents.
pub enum IoOutput<'a, H: IoHandler> {
    Owned(Arc<H>),
    Borrowed(&'a H),
}

impl<'a, H: IoHandler> IoOutput<'a, H> {
    pub(crate) fn borrowed(handler: &'a H) -> Self {
        Self::Borrowed(handler)
    }

    pub(crate) fn owned(handler: Arc<H>) -> Self {
        Self::Owned(handler)
    }

    fn handler(&self) -> &H {
        match self {
            IoOutput::Owned(arc) => arc,
            IoOutput::Borrowed(r) => r,
        }
    }

    /// Non-blocking send. Returns `true` if queued for output.
    pub fn send(&self, buf: SharedBuffer, endpoint: Option<H::Endpoint>) -> bool {
        submit(self.handler(), buf, endpoint)
    }

    pub fn get_output_queue_stats(&self) -> QueueStats {
        self.handler().io_base().output_queue_stats()
    }

    /// Gives up whatever share of the handler this handle held. Consumes
    /// `self`, so there is no longer a value to call `send` on afterward.
    pub fn release(self) {}
}

/// Returned by [`IoInterface::get_socket`]. Keeps the handler alive for as
/// long as this value exists, the same way any other strong reference
/// would, but derefs straight to `Mutex<H::Socket>` rather than exposing
/// the handler itself — so application code reachable through
/// `get_socket()` can't call the handler's `start_io`/`on_readable`/
/// `on_writable` methods the reactor and entity layer own.
pub struct SocketHandle<H: IoHandler> {
    handler: Arc<H>,
}

impl<H: IoHandler> SocketHandle<H> {
    fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H: IoHandler> std::ops::Deref for SocketHandle<H> {
    type Target = Mutex<H::Socket>;

    fn deref(&self) -> &Self::Target {
        self.handler.socket()
    }
}
