//! Shared, immutable byte buffers.
//!
//! `SharedBuffer` is the currency the rest of the crate moves around:
//! output queue entries, message-handler callback arguments, and framing
//! scratch space all end up as one of these. Cloning one is a refcount bump,
//! never a copy.

use bytes::{Bytes, BytesMut};

/// A reference-counted, immutable sequence of bytes.
///
/// Equality is bytewise; `len()` is O(1); `clone()` is a refcount bump, not a
/// copy. Safe to hand to another thread and send through an output queue
/// without synchronization of its own — the bytes themselves never change
/// once constructed.
#[derive(Clone, Debug, Default, Eq)]
pub struct SharedBuffer(Bytes);

impl SharedBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self(Bytes::new())
    }

    /// Copy `len` bytes starting at `ptr` into a new shared buffer.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes.
    pub unsafe fn copy_from_raw(ptr: *const u8, len: usize) -> Self {
        let slice = std::slice::from_raw_parts(ptr, len);
        Self(Bytes::copy_from_slice(slice))
    }

    /// Copy a byte slice into a new shared buffer.
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Take ownership of a mutable builder, converting it without copying.
    pub fn from_builder(builder: BytesMut) -> Self {
        Self(builder.freeze())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl From<Bytes> for SharedBuffer {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }
}

impl From<&[u8]> for SharedBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::copy_from_slice(bytes)
    }
}

impl From<BytesMut> for SharedBuffer {
    fn from(builder: BytesMut) -> Self {
        Self::from_builder(builder)
    }
}

impl std::ops::Deref for SharedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytewise_equality() {
        let a = SharedBuffer::copy_from_slice(&[1, 2, 3]);
        let b = SharedBuffer::copy_from_slice(&[1, 2, 3]);
        let c = SharedBuffer::copy_from_slice(&[1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn clone_is_cheap_and_shares_storage() {
        let a = SharedBuffer::copy_from_slice(&[9; 64]);
        let b = a.clone();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn from_builder_moves_without_copy() {
        let mut builder = BytesMut::with_capacity(8);
        builder.extend_from_slice(b"hello");
        let shared = SharedBuffer::from_builder(builder);
        assert_eq!(shared.as_slice(), b"hello");
    }
}
