use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::{TcpListener, TcpSocket, TcpStream};
use mio::Interest;
use parking_lot::Mutex;

use crate::error::NetIpError;
use crate::handle::IoInterface;
use crate::handler::tcp::TcpIoHandler;
use crate::handler::IoHandler;
use crate::macros::{debug, warn};
use crate::reactor::{Reactor, ReactorTarget, Registration};

use super::TcpConnTarget;
use super::TcpStateChange;

/// Listening-socket options, analogous to `mio::net::TcpSocket`'s own
/// builder methods.
pub struct TcpAcceptorConfig {
    pub backlog: u32,
}

impl Default for TcpAcceptorConfig {
    fn default() -> Self {
        Self { backlog: 1024 }
    }
}

/// Owns a listening socket and every connection it has accepted.
///
/// On each readable event it drains `accept()` in a loop (edge-triggered
/// readiness under `mio` means a single event can correspond to more than
/// one pending connection), wraps each new stream in a [`TcpIoHandler`],
/// registers it with the reactor, and publishes an unstarted weak handle to
/// the application through the state-change callback. The application
/// configures framing and starts the connection itself by calling
/// `IoInterface::start_io` on the handle it receives.
pub struct TcpAcceptor {
    listener: Mutex<TcpListener>,
    reactor: Arc<Reactor>,
    state_change: Arc<TcpStateChange>,
    registration: Mutex<Option<Registration>>,
}

impl TcpAcceptor {
    pub fn bind(
        addr: SocketAddr,
        config: TcpAcceptorConfig,
        reactor: Arc<Reactor>,
        state_change: impl Fn(IoInterface<TcpIoHandler>, Result<(), NetIpError>) + Send + Sync + 'static,
    ) -> std::io::Result<Arc<Self>> {
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;
        let acceptor = Arc::new(Self {
            listener: Mutex::new(listener),
            reactor,
            state_change: Arc::new(state_change),
            registration: Mutex::new(None),
        });
        let mut listener_guard = acceptor.listener.lock();
        let registration = acceptor.reactor.register(
            &mut *listener_guard,
            Interest::READABLE,
            acceptor.clone() as Arc<dyn ReactorTarget>,
        )?;
        drop(listener_guard);
        *acceptor.registration.lock() = Some(registration);
        Ok(acceptor)
    }

    /// The address the listening socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.lock().local_addr()
    }

    fn accept_one(&self, stream: TcpStream, peer: SocketAddr) {
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
                warn!("failed to register accepted connection from {}: {}", peer, e);
                return;
            }
        };
        handler.attach_teardown(self.reactor.clone(), registration);

        debug!("accepted connection from {}", peer);
        (self.state_change)(IoInterface::new(&handler), Ok(()));
    }
}

impl ReactorTarget for TcpAcceptor {
    fn on_readable(&self) {
        loop {
            let accepted = {
                let listener = self.listener.lock();
                listener.accept()
            };
            match accepted {
                Ok((stream, peer)) => self.accept_one(stream, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept error: {}", e);
                    break;
                }
            }
        }
    }
}
