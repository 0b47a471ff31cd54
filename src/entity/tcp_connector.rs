use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::TcpStream;
use mio::Interest;
use parking_lot::Mutex;

use crate::error::NetIpError;
use crate::handle::IoInterface;
use crate::handler::tcp::TcpIoHandler;
use crate::handler::IoHandler;
use crate::macros::debug;
use crate::reactor::{Reactor, ReactorTarget};

use super::TcpConnTarget;
use super::TcpStateChange;

/// Outbound TCP connections.
///
/// `mio::net::TcpStream::connect` returns immediately with a non-blocking,
/// in-progress connection; completion is signaled by the socket becoming
/// writable, at which point `take_error()` distinguishes success from a
/// failed connection attempt — the same two-step handshake `mio`'s own
/// client examples use.
pub struct TcpConnector {
    reactor: Arc<Reactor>,
}

struct ConnectingTarget {
    stream: Mutex<Option<TcpStream>>,
    reactor: Arc<Reactor>,
    state_change: Arc<TcpStateChange>,
}

impl ReactorTarget for ConnectingTarget {
    fn on_writable(&self) {
        let mut stream_slot = self.stream.lock();
        let Some(stream) = stream_slot.take() else { return };
        match stream.take_error() {
            Ok(None) => {
                let state_change = self.state_change.clone();
                let handler = TcpIoHandler::new(stream, move |err, handler| {
                    if let Some(handler) = handler {
                        handler.teardown();
                        state_change(IoInterface::new(&handler), Err(err));
                    }
                });
                let registration = {
                    let mut stream_guard = handler.socket().lock();
                    self.reactor.register(
                        &mut *stream_guard,
                        Interest::READABLE,
                        Arc::new(TcpConnTarget(handler.clone())),
                    )
                };
                let registration = match registration {
                    Ok(r) => r,
                    Err(e) => {
                        (self.state_change)(IoInterface::new(&handler), Err(NetIpError::Io(e)));
                        return;
                    }
                };
                handler.attach_teardown(self.reactor.clone(), registration);
                debug!("outbound tcp connection established");
                (self.state_change)(IoInterface::new(&handler), Ok(()));
            }
            Ok(Some(e)) | Err(e) => {
                (self.state_change)(IoInterface::from_weak(std::sync::Weak::new()), Err(NetIpError::Io(e)));
            }
        }
    }
}

impl TcpConnector {
    pub fn new(reactor: Arc<Reactor>) -> Self {
        Self { reactor }
    }

    /// Initiates a non-blocking outbound connection. The state-change
    /// callback fires once: with `Ok(())` and an unstarted, valid handle on
    /// success (the caller configures framing and starts it via
    /// `IoInterface::start_io`), or with an error and an already-invalid
    /// handle on failure.
    pub fn connect(
        &self,
        addr: SocketAddr,
        state_change: impl Fn(IoInterface<TcpIoHandler>, Result<(), NetIpError>) + Send + Sync + 'static,
    ) -> std::io::Result<()> {
        let mut stream = TcpStream::connect(addr)?;
        let target = Arc::new(ConnectingTarget {
            reactor: self.reactor.clone(),
            state_change: Arc::new(state_change),
            stream: Mutex::new(None),
        });
        self.reactor.register(&mut stream, Interest::WRITABLE, target.clone())?;
        *target.stream.lock() = Some(stream);
        Ok(())
    }
}
