//! The handler capability trait.
//!
//! The I/O base, the weak/strong handles, and the framing dispatcher are all
//! generic over a single trait rather than over concrete TCP/UDP types, so
//! none of the hot send path pays for virtual dispatch. `TcpIoHandler` and
//! `UdpIoHandler` are the two concrete implementations (in
//! [`crate::handler::tcp`] and [`crate::handler::udp`]).

use parking_lot::Mutex;

use crate::endpoint::Endpoint;
use crate::io_base::IoBase;

pub mod tcp;
pub mod udp;

/// Per-connection or per-socket capability set that the core is generic
/// over.
pub trait IoHandler: Send + Sync + Sized + 'static {
    /// The endpoint type this handler's output queue carries: [`crate::endpoint::NoEndpoint`]
    /// for TCP, [`crate::endpoint::UdpEndpoint`] for UDP.
    type Endpoint: Endpoint;

    /// The underlying transport socket type, exposed read-only through the
    /// weak application handle's `get_socket`.
    type Socket;

    /// Access the handler's I/O base (send/dequeue state machine).
    fn io_base(&self) -> &IoBase<Self>;

    /// Access the handler's underlying socket. Mutex-wrapped because the
    /// write path toggles the socket's registered interest around partial
    /// writes and must not race a concurrent read.
    fn socket(&self) -> &Mutex<Self::Socket>;

    /// Called by a handle's `send` when [`IoBase::start_write_setup`] hands
    /// back the "issue write now" token. Implementations attempt the
    /// transport write inline; on `WouldBlock` they register for writable
    /// readiness and let the reactor drive the rest through
    /// `IoBase::get_next_element`.
    fn begin_write(&self, buf: crate::buffer::SharedBuffer, endpoint: Option<Self::Endpoint>);
}
