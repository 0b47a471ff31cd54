//! Endpoint value types for the two handler kinds.
//!
//! TCP I/O bases have no per-send destination — the connection itself is the
//! destination — so they're parameterized by [`NoEndpoint`]. UDP I/O bases
//! carry an optional destination address per datagram, parameterized by
//! [`UdpEndpoint`].

use std::fmt::Debug;
use std::net::SocketAddr;

/// Bound requirements on a handler's endpoint type.
///
/// `Default` models the endpoint's state before any handler wiring runs;
/// `Copy` keeps `remote_endp()` accessors cheap.
pub trait Endpoint: Copy + Clone + Default + PartialEq + Debug + Send + Sync + 'static {}

/// The (nonexistent) endpoint type for stream handlers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoEndpoint;

impl Endpoint for NoEndpoint {}

/// A UDP destination/source address.
///
/// Defaults to `0.0.0.0:0`, standing in for "no peer assigned yet" before
/// handler wiring runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UdpEndpoint(pub SocketAddr);

impl Default for UdpEndpoint {
    fn default() -> Self {
        Self(SocketAddr::from(([0, 0, 0, 0], 0)))
    }
}

impl Endpoint for UdpEndpoint {}

impl From<SocketAddr> for UdpEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<UdpEndpoint> for SocketAddr {
    fn from(endpoint: UdpEndpoint) -> Self {
        endpoint.0
    }
}
