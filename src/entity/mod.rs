//! The "external entity" layer: acceptors, connectors, and UDP endpoints
//! that own handlers and publish weak handles to the application.
//!
//! None of this is part of the core — the core only documents the contract
//! a handler needs from its entity (a notifier constructor argument) and
//! what the entity owes the application (a state-change callback). These
//! types are one concrete way to honor that contract, built on
//! [`crate::reactor::Reactor`].

mod tcp_acceptor;
mod tcp_connector;
mod udp_entity;

pub use tcp_acceptor::{TcpAcceptor, TcpAcceptorConfig};
pub use tcp_connector::TcpConnector;
pub use udp_entity::{UdpEntity, UdpEntityConfig};

use std::sync::Arc;

use crate::error::NetIpError;
use crate::handle::IoInterface;
use crate::handler::tcp::TcpIoHandler;
use crate::handler::udp::UdpIoHandler;
use crate::handler::IoHandler;
use crate::reactor::ReactorTarget;

pub type TcpStateChange = dyn Fn(IoInterface<TcpIoHandler>, Result<(), NetIpError>) + Send + Sync;
pub type UdpStateChange = dyn Fn(IoInterface<UdpIoHandler>, Result<(), NetIpError>) + Send + Sync;

/// Adapts a live connection's handler to the reactor's readiness callbacks;
/// shared by the acceptor and connector since both end up owning an
/// established [`TcpIoHandler`] the same way once the connection exists.
pub(crate) struct TcpConnTarget(pub(crate) Arc<TcpIoHandler>);

impl ReactorTarget for TcpConnTarget {
    fn on_readable(&self) {
        if let Err(err) = self.0.on_readable() {
            self.0.io_base().process_err_code(err, Some(self.0.clone()));
        }
    }

    fn on_writable(&self) {
        self.0.on_writable();
    }
}
