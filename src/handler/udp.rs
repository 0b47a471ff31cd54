//! The UDP handler. Unlike TCP there is no multi-call framing: each
//! datagram is already one message, truncated to the configured maximum
//! size if the peer sent something larger.

use std::io;
use std::sync::Arc;

use mio::net::UdpSocket;
use parking_lot::Mutex;

use crate::buffer::SharedBuffer;
use crate::endpoint::UdpEndpoint;
use crate::error::NetIpError;
use crate::handle::{IoInterface, IoOutput};
use crate::handler::IoHandler;
use crate::io_base::IoBase;
use crate::macros::{debug, trace, warn};
use crate::reactor::{Reactor, Registration};

type MessageHandler = dyn Fn(Vec<u8>, IoOutput<'_, UdpIoHandler>, UdpEndpoint) -> bool + Send + Sync;

/// One of the six `start_io` configurations applicable to a datagram
/// handler. Variants 3/4/5/6 of the framing contract, since header-variable
/// and delimiter modes don't apply to datagrams.
pub enum UdpStartIo {
    /// Maximum datagram size; larger incoming datagrams are truncated.
    Fixed { max_size: usize },
    /// Maximum datagram size plus a default destination, enabling sends
    /// without an explicit endpoint.
    FixedWithDefault { max_size: usize, default_endpoint: UdpEndpoint },
    /// Send-only: no read is posted.
    NoReader,
    /// Send-only with a default destination.
    NoReaderWithDefault { default_endpoint: UdpEndpoint },
}

struct Dispatch {
    max_size: usize,
    handler: Box<MessageHandler>,
}

pub struct UdpIoHandler {
    io_base: IoBase<Self>,
    socket: Mutex<UdpSocket>,
    dispatch: Mutex<Option<Dispatch>>,
    teardown: Mutex<Option<(Arc<Reactor>, Registration)>>,
}

impl UdpIoHandler {
    pub fn new<F>(socket: UdpSocket, notifier: F) -> Arc<Self>
    where
        F: Fn(NetIpError, Option<Arc<Self>>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            io_base: IoBase::new(notifier),
            socket: Mutex::new(socket),
            dispatch: Mutex::new(None),
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
    /// exactly once, whatever triggered it.
    pub(crate) fn teardown(&self) {
        if let Some((reactor, registration)) = self.teardown.lock().take() {
            let mut socket = self.socket.lock();
            if let Err(e) = reactor.deregister(&mut *socket, registration) {
                warn!("udp handler deregister failed: {}", e);
            }
        }
    }

    pub(crate) fn start_io(
        &self,
        config: UdpStartIo,
        message_handler: impl Fn(Vec<u8>, IoOutput<'_, Self>, UdpEndpoint) -> bool + Send + Sync + 'static,
    ) -> bool {
        if !self.io_base.start_io_setup() {
            return false;
        }
        let (max_size, default_endpoint) = match config {
            UdpStartIo::Fixed { max_size } => (Some(max_size), None),
            UdpStartIo::FixedWithDefault { max_size, default_endpoint } => {
                (Some(max_size), Some(default_endpoint))
            }
            UdpStartIo::NoReader => (None, None),
            UdpStartIo::NoReaderWithDefault { default_endpoint } => (None, Some(default_endpoint)),
        };
        if let Some(endpoint) = default_endpoint {
            self.io_base.set_remote_endp(endpoint);
        }
        if let Some(max_size) = max_size {
            *self.dispatch.lock() = Some(Dispatch {
                max_size,
                handler: Box::new(message_handler),
            });
        }
        true
    }

    /// Called by the reactor when the socket becomes readable. A single
    /// `recv_from` is a single datagram is a single message — no
    /// accumulation state needed.
    pub(crate) fn on_readable(&self) -> Result<(), NetIpError> {
        if !self.io_base.is_started() {
            return Ok(());
        }
        loop {
            let (max_size, has_dispatch) = {
                let dispatch = self.dispatch.lock();
                match dispatch.as_ref() {
                    Some(d) => (d.max_size, true),
                    None => (0, false),
                }
            };
            if !has_dispatch {
                return Ok(());
            }
            let mut scratch = vec![0u8; max_size];
            let (read, from) = {
                let socket = self.socket.lock();
                match socket.recv_from(&mut scratch) {
                    Ok(result) => result,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(NetIpError::Io(e)),
                }
            };
            trace!("udp handler received {} bytes from {}", read, from);
            scratch.truncate(read);

            let mut dispatch_guard = self.dispatch.lock();
            if let Some(dispatch) = dispatch_guard.as_ref() {
                let keep_open = (dispatch.handler)(scratch, IoOutput::borrowed(self), UdpEndpoint(from));
                if !keep_open {
                    drop(dispatch_guard);
                    return Err(NetIpError::MessageHandlerTerminated);
                }
            }
        }
    }

    /// Drains the whole output queue in a loop rather than recursing
    /// through `get_next_element`, so a deep backlog can't blow the stack.
    fn drive_write(&self, buf: SharedBuffer, endpoint: Option<UdpEndpoint>) {
        let mut buf = buf;
        let mut endpoint = endpoint;
        loop {
            let destination = endpoint.or_else(|| {
                let remote = self.io_base.remote_endp();
                (remote != UdpEndpoint::default()).then_some(remote)
            });
            let socket = self.socket.lock();
            let result = match destination {
                Some(dest) => socket.send_to(&buf, dest.0),
                None => socket.send(&buf),
            };
            drop(socket);
            match result {
                Ok(n) => debug!("udp handler sent {} bytes", n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Datagram sends either complete immediately or are
                    // dropped; there is no partial-write state to resume.
                }
                Err(_) => {}
            }
            match self.io_base.get_next_element() {
                Some((next_buf, next_endpoint)) => {
                    buf = next_buf;
                    endpoint = next_endpoint;
                }
                None => return,
            }
        }
    }
}

impl IoHandler for UdpIoHandler {
    type Endpoint = UdpEndpoint;
    type Socket = UdpSocket;

    fn io_base(&self) -> &IoBase<Self> {
        &self.io_base
    }

    fn socket(&self) -> &Mutex<Self::Socket> {
        &self.socket
    }

    fn begin_write(&self, buf: SharedBuffer, endpoint: Option<Self::Endpoint>) {
        self.drive_write(buf, endpoint);
    }
}

impl IoInterface<UdpIoHandler> {
    /// Configures framing and the message handler for a datagram socket the
    /// application just received via a state-change callback, then starts
    /// delivering reads. Returns `false` if the handler is already started.
    pub fn start_io(
        &self,
        config: UdpStartIo,
        message_handler: impl Fn(Vec<u8>, IoOutput<'_, UdpIoHandler>, UdpEndpoint) -> bool + Send + Sync + 'static,
    ) -> Result<bool, NetIpError> {
        Ok(self.upgrade()?.start_io(config, message_handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_enables_send_without_explicit_destination() {
        let sender = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let handler = UdpIoHandler::new(sender, |_err, _handler| {});
        assert!(handler.start_io(
            UdpStartIo::FixedWithDefault {
                max_size: 1024,
                default_endpoint: UdpEndpoint(receiver_addr),
            },
            |_bytes, _output, _endpoint| true,
        ));
        assert_eq!(handler.io_base.remote_endp(), UdpEndpoint(receiver_addr));
    }

    #[test]
    fn no_reader_leaves_dispatch_unset() {
        let socket = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let handler = UdpIoHandler::new(socket, |_err, _handler| {});
        assert!(handler.start_io(UdpStartIo::NoReader, |_b, _o, _e| true));
        assert!(handler.dispatch.lock().is_none());
    }
}
