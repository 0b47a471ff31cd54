//! A value-typed handle abstraction over per-connection TCP/UDP I/O
//! handlers.
//!
//! Applications hold lightweight, `Clone`-able handles
//! ([`handle::IoInterface`]) whose validity tracks the lifetime of the
//! underlying I/O handler, and through which they send outbound buffers,
//! start/stop read processing, and observe output-queue pressure. Sends
//! from multiple application threads into a single-writer transport are
//! serialized through a per-handler output queue with a write-in-progress
//! guard ([`io_base::IoBase`]); inbound bytes are turned into discrete
//! application messages by a message-framing dispatcher
//! ([`framing::FrameDispatcher`]).
//!
//! ```text
//! application thread ──send()──▶ IoInterface ──upgrade──▶ IoBase ──▶ transport write
//!                                                             ▲
//! reactor worker ──on_writable()───────────────────────────────┘
//! ```
//!
//! The reactor, socket wrappers, and entity layer (acceptor/connector/UDP
//! binding) are supplied here as a usable, if minimal, concrete
//! implementation built on [`mio`], but the core types in [`io_base`],
//! [`handle`], and [`framing`] don't depend on them — a different reactor
//! could drive the same handlers.

#![allow(clippy::type_complexity)]

pub mod buffer;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod framing;
pub mod handle;
pub mod handler;
pub mod io_base;
mod macros;
pub mod queue;
pub mod reactor;

pub use buffer::SharedBuffer;
pub use endpoint::{Endpoint, NoEndpoint, UdpEndpoint};
pub use error::NetIpError;
pub use handle::{IoInterface, IoOutput, SocketHandle};
pub use handler::tcp::{TcpIoHandler, TcpStartIo};
pub use handler::udp::{UdpIoHandler, UdpStartIo};
pub use handler::IoHandler;
pub use io_base::{IoBase, WriteSetup};
pub use queue::QueueStats;
pub use reactor::{Reactor, ReactorConfig, ReactorTarget};

pub use entity::{TcpAcceptor, TcpAcceptorConfig, TcpConnector, UdpEntity, UdpEntityConfig};
