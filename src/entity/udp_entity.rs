use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::UdpSocket;
use mio::Interest;
use parking_lot::Mutex;

use crate::error::NetIpError;
use crate::handle::IoInterface;
use crate::handler::udp::UdpIoHandler;
use crate::handler::IoHandler;
use crate::macros::debug;
use crate::reactor::{Reactor, ReactorTarget};

/// Datagram-socket options, analogous to [`super::TcpAcceptorConfig`].
///
/// Unlike `mio::net::TcpSocket`, `mio::net::UdpSocket::bind` has no builder
/// step before the socket is bound, so there's nothing pre-bind to set today;
/// this exists as the landing spot for options a socket2-backed bind would
/// add later, rather than threading raw bind calls through the entity layer.
#[derive(Default)]
pub struct UdpEntityConfig {}

/// Owns a single bound UDP socket and the one [`UdpIoHandler`] wrapping it.
///
/// Unlike [`super::TcpAcceptor`] there is no per-peer handler: a UDP socket
/// is a single handler for its whole lifetime, since datagrams don't carry
/// a connection to accept. The entity's only job is binding the socket,
/// registering it with the reactor, wiring the handler, and publishing the
/// one resulting weak handle through the state-change callback.
pub struct UdpEntity {
    handler: Arc<UdpIoHandler>,
}

impl UdpEntity {
    /// Binds and registers the socket, publishing an unstarted handle
    /// through `state_change`; the caller configures framing and starts
    /// delivering reads via `IoInterface::start_io` on the handle it
    /// receives.
    pub fn bind(
        addr: SocketAddr,
        _config: UdpEntityConfig,
        reactor: Arc<Reactor>,
        state_change: impl Fn(IoInterface<UdpIoHandler>, Result<(), NetIpError>) + Send + Sync + 'static,
    ) -> std::io::Result<Arc<Self>> {
        let socket = UdpSocket::bind(addr)?;
        let state_change = Arc::new(state_change);
        let notifier_state_change = state_change.clone();
        let handler = UdpIoHandler::new(socket, move |err, handler| {
            if let Some(handler) = handler {
                handler.teardown();
                notifier_state_change(IoInterface::new(&handler), Err(err));
            }
        });

        let registration = {
            let mut socket_guard = handler.socket().lock();
            reactor.register(
                &mut *socket_guard,
                Interest::READABLE,
                Arc::new(UdpSocketTarget(handler.clone())) as Arc<dyn ReactorTarget>,
            )?
        };
        handler.attach_teardown(reactor, registration);

        let entity = Arc::new(Self { handler: handler.clone() });

        debug!("bound udp socket at {}", addr);
        state_change(IoInterface::new(&handler), Ok(()));
        Ok(entity)
    }

    pub fn handle(&self) -> IoInterface<UdpIoHandler> {
        IoInterface::new(&self.handler)
    }

    /// The address the underlying socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.handler.socket().lock().local_addr()
    }
}

struct UdpSocketTarget(Arc<UdpIoHandler>);

impl ReactorTarget for UdpSocketTarget {
    fn on_readable(&self) {
        if let Err(err) = self.0.on_readable() {
            self.0.io_base().process_err_code(err, Some(self.0.clone()));
        }
    }
}
