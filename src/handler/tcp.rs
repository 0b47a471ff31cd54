//! The TCP handler: a single connection's I/O base, socket, and inbound
//! framing state bundled together.

use std::io::{self, Read, Write};
use std::sync::Arc;

use mio::net::TcpStream;
use parking_lot::Mutex;

use crate::buffer::SharedBuffer;
use crate::endpoint::NoEndpoint;
use crate::error::NetIpError;
use crate::framing::{FrameDispatcher, FramingMode};
use crate::handle::{IoInterface, IoOutput};
use crate::handler::IoHandler;
use crate::io_base::IoBase;
use crate::macros::{debug, trace, warn};
use crate::reactor::{Reactor, Registration};

/// One of the six `start_io` configurations applicable to a stream handler.
pub enum TcpStartIo {
    HeaderVariable {
        header_size: usize,
        next_read: Box<dyn FnMut(&[u8]) -> usize + Send>,
    },
    Delimiter {
        delimiter: Vec<u8>,
    },
    Fixed {
        size: usize,
    },
    NoReader,
}

type MessageHandler = dyn Fn(Vec<u8>, IoOutput<'_, TcpIoHandler>, NoEndpoint) -> bool + Send + Sync;

struct Dispatch {
    frame: FrameDispatcher,
    handler: Box<MessageHandler>,
}

/// A single TCP connection.
///
/// `stream` is wrapped in a `Mutex` rather than accessed lock-free because
/// the write path toggles the socket's registered interest (readable-only
/// vs readable-or-writable) around partial writes, and that reregistration
/// has to observe a socket that isn't concurrently being read from.
pub struct TcpIoHandler {
    io_base: IoBase<Self>,
    stream: Mutex<TcpStream>,
    dispatch: Mutex<Option<Dispatch>>,
    pending_write: Mutex<Option<(SharedBuffer, usize)>>,
    teardown: Mutex<Option<(Arc<Reactor>, Registration)>>,
}

impl TcpIoHandler {
    pub fn new<F>(stream: TcpStream, notifier: F) -> Arc<Self>
    where
        F: Fn(NetIpError, Option<Arc<Self>>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            io_base: IoBase::new(notifier),
            stream: Mutex::new(stream),
            dispatch: Mutex::new(None),
            pending_write: Mutex::new(None),
            teardown: Mutex::new(None),
        })
    }

    /// Records how to deregister this handler's socket from the reactor.
    /// Called once by the entity layer right after registration, before the
    /// handle is published to the application.
    pub(crate) fn attach_teardown(&self, reactor: Arc<Reactor>, registration: Registration) {
        *self.teardown.lock() = Some((reactor, registration));
    }

    /// Deregisters the socket from the reactor. Called from the notifier
    /// exactly once, whatever triggered it (`stop_io`, a transport error, or
    /// the message handler requesting close).
    pub(crate) fn teardown(&self) {
        if let Some((reactor, registration)) = self.teardown.lock().take() {
            let mut stream = self.stream.lock();
            if let Err(e) = reactor.deregister(&mut *stream, registration) {
                warn!("tcp handler deregister failed: {}", e);
            }
        }
    }

    /// Wires up the framing mode and message handler, then marks the
    /// handler started. Returns `false` if already started.
    pub(crate) fn start_io(
        &self,
        config: TcpStartIo,
        message_handler: impl Fn(Vec<u8>, IoOutput<'_, Self>, NoEndpoint) -> bool + Send + Sync + 'static,
    ) -> bool {
        if !self.io_base.start_io_setup() {
            return false;
        }
        let mode = match config {
            TcpStartIo::HeaderVariable { header_size, next_read } => {
                FramingMode::HeaderVariable { header_size, next_read }
            }
            TcpStartIo::Delimiter { delimiter } => FramingMode::Delimiter { delimiter },
            TcpStartIo::Fixed { size } => FramingMode::Fixed { size },
            TcpStartIo::NoReader => FramingMode::NoReader,
        };
        *self.dispatch.lock() = Some(Dispatch {
            frame: FrameDispatcher::new(mode),
            handler: Box::new(message_handler),
        });
        true
    }

    /// Called by the reactor when the socket becomes readable. Reads as
    /// much as is available, feeds the framing dispatcher, and dispatches
    /// every complete message. Returns `false` if the connection should be
    /// torn down (EOF, transport error, or the message handler requesting
    /// close).
    pub(crate) fn on_readable(&self) -> Result<(), NetIpError> {
        if !self.io_base.is_started() {
            return Ok(());
        }
        let mut scratch = [0u8; 4096];
        loop {
            let read = {
                let mut stream = self.stream.lock();
                match stream.read(&mut scratch) {
                    Ok(0) => return Err(NetIpError::Io(io::Error::from(io::ErrorKind::UnexpectedEof))),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(NetIpError::Io(e)),
                }
            };
            trace!("tcp handler read {} bytes", read);

            let mut dispatch_guard = self.dispatch.lock();
            let dispatch = match dispatch_guard.as_mut() {
                Some(d) => d,
                None => return Ok(()),
            };
            if dispatch.frame.is_no_reader() {
                warn!("tcp handler configured send-only received {} bytes", read);
                return Err(NetIpError::Io(io::Error::from(io::ErrorKind::InvalidData)));
            }
            let mut remaining = &scratch[..read];
            loop {
                let message = dispatch.frame.feed(remaining);
                remaining = &[];
                match message {
                    Some(bytes) => {
                        let keep_open = (dispatch.handler)(bytes, IoOutput::borrowed(self), NoEndpoint);
                        if !keep_open {
                            drop(dispatch_guard);
                            return Err(NetIpError::MessageHandlerTerminated);
                        }
                    }
                    None => break,
                }
            }
        }
    }

    /// Called when this caller holds the "issue write now" token, or when
    /// the reactor reports writable readiness while a write is pending.
    ///
    /// Drains the whole output queue in a loop rather than recursing
    /// through `get_next_element`, so a deep backlog can't blow the stack.
    fn drive_write(&self, buf: SharedBuffer, offset: usize) {
        let mut buf = buf;
        let mut offset = offset;
        loop {
            match self.write_one(&buf, offset) {
                WriteOutcome::Complete => {}
                WriteOutcome::Pending => return,
            }
            match self.io_base.get_next_element() {
                Some((next_buf, _endpoint)) => {
                    debug!("tcp handler issuing queued write of {} bytes", next_buf.len());
                    buf = next_buf;
                    offset = 0;
                }
                None => return,
            }
        }
    }

    fn write_one(&self, buf: &SharedBuffer, offset: usize) -> WriteOutcome {
        let mut stream = self.stream.lock();
        let mut offset = offset;
        loop {
            match stream.write(&buf[offset..]) {
                Ok(0) => {
                    warn!("tcp write returned 0 with {} bytes remaining", buf.len() - offset);
                    *self.pending_write.lock() = Some((buf.clone(), offset));
                    return WriteOutcome::Pending;
                }
                Ok(n) => {
                    offset += n;
                    if offset == buf.len() {
                        return WriteOutcome::Complete;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    *self.pending_write.lock() = Some((buf.clone(), offset));
                    return WriteOutcome::Pending;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return WriteOutcome::Complete,
            }
        }
    }

    /// Called by the reactor on writable readiness: finishes a partial
    /// write, then pulls the next queued entry until the queue drains.
    pub(crate) fn on_writable(&self) {
        if let Some((buf, offset)) = self.pending_write.lock().take() {
            self.drive_write(buf, offset);
            return;
        }
        if let Some((buf, _endpoint)) = self.io_base.get_next_element() {
            debug!("tcp handler issuing queued write of {} bytes", buf.len());
            self.drive_write(buf, 0);
        }
    }
}

enum WriteOutcome {
    Complete,
    Pending,
}

impl IoHandler for TcpIoHandler {
    type Endpoint = NoEndpoint;
    type Socket = TcpStream;

    fn io_base(&self) -> &IoBase<Self> {
        &self.io_base
    }

    fn socket(&self) -> &Mutex<Self::Socket> {
        &self.stream
    }

    fn begin_write(&self, buf: SharedBuffer, _endpoint: Option<Self::Endpoint>) {
        self.drive_write(buf, 0);
    }
}

impl IoInterface<TcpIoHandler> {
    /// Configures framing and the message handler for a connection the
    /// application just received via a state-change callback, then starts
    /// delivering reads. Returns `false` if the handler is already started.
    pub fn start_io(
        &self,
        config: TcpStartIo,
        message_handler: impl Fn(Vec<u8>, IoOutput<'_, TcpIoHandler>, NoEndpoint) -> bool + Send + Sync + 'static,
    ) -> Result<bool, NetIpError> {
        Ok(self.upgrade()?.start_io(config, message_handler))
    }
}
