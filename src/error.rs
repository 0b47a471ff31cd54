//! The crate's error taxonomy.
//!
//! Lifecycle soft-conditions (`already-started`, `already-stopped`,
//! `send-before-start`) are deliberately *not* represented here — they
//! surface as plain `bool` returns, not errors, so callers can treat them as
//! soft conditions without matching on an error variant.

use std::io;

/// Errors surfaced synchronously from handle calls or delivered through a
/// handler's notifier.
#[derive(Debug, thiserror::Error)]
pub enum NetIpError {
    /// The weak handle's referent no longer exists.
    #[error("io handle has expired: the referenced handler no longer exists")]
    HandleExpired,

    /// A message handler returned `false`, requesting the connection close.
    #[error("message handler terminated the connection")]
    MessageHandlerTerminated,

    /// The handler was stopped via `stop_io`: orderly shutdown, not a
    /// transport failure or an application-driven close.
    #[error("io handler was stopped")]
    Stopped,

    /// A transport-level error forwarded from the reactor or socket layer.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NetIpError {
    /// `true` if this is an end-of-stream/transport condition rather than an
    /// application-driven close.
    pub fn is_transport(&self) -> bool {
        matches!(self, NetIpError::Io(_))
    }
}
