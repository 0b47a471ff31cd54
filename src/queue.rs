//! The per-handler output queue.

use std::collections::VecDeque;

use crate::buffer::SharedBuffer;
use crate::endpoint::Endpoint;

/// A snapshot of output queue occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub output_queue_size: usize,
    pub bytes_in_output_queue: usize,
}

/// Strict FIFO queue of `(buffer, optional destination)` pairs.
///
/// Carries its own byte counter rather than recomputing it on every
/// `stats()` call, keeping `stats()` O(1) as required. Has no internal
/// synchronization of its own; [`crate::io_base::IoBase`] supplies the
/// mutual exclusion.
pub(crate) struct OutputQueue<E: Endpoint> {
    entries: VecDeque<(SharedBuffer, Option<E>)>,
    bytes: usize,
}

impl<E: Endpoint> OutputQueue<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            bytes: 0,
        }
    }

    pub(crate) fn push(&mut self, buf: SharedBuffer, endpoint: Option<E>) {
        self.bytes += buf.len();
        self.entries.push_back((buf, endpoint));
    }

    pub(crate) fn pop_front(&mut self) -> Option<(SharedBuffer, Option<E>)> {
        let entry = self.entries.pop_front()?;
        self.bytes -= entry.0.len();
        Some(entry)
    }

    pub(crate) fn stats(&self) -> QueueStats {
        QueueStats {
            output_queue_size: self.entries.len(),
            bytes_in_output_queue: self.bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::UdpEndpoint;

    #[test]
    fn byte_counter_tracks_pushes_and_pops() {
        let mut q: OutputQueue<UdpEndpoint> = OutputQueue::new();
        q.push(SharedBuffer::copy_from_slice(&[0u8; 5]), None);
        q.push(SharedBuffer::copy_from_slice(&[0u8; 3]), None);
        assert_eq!(q.stats(), QueueStats { output_queue_size: 2, bytes_in_output_queue: 8 });

        q.pop_front();
        assert_eq!(q.stats(), QueueStats { output_queue_size: 1, bytes_in_output_queue: 3 });

        q.pop_front();
        assert_eq!(q.stats(), QueueStats { output_queue_size: 0, bytes_in_output_queue: 0 });
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn udp_endpoint_round_trips() {
        let mut q: OutputQueue<UdpEndpoint> = OutputQueue::new();
        let buf = SharedBuffer::copy_from_slice(&[0x20, 0x21, 0x22, 0x23, 0x24]);
        let endpoint = UdpEndpoint("127.0.0.1:1234".parse().unwrap());
        q.push(buf.clone(), Some(endpoint));

        let (popped_buf, popped_endpoint) = q.pop_front().unwrap();
        assert_eq!(popped_buf, buf);
        assert_eq!(popped_endpoint, Some(endpoint));
    }

    #[test]
    fn fifo_ordering() {
        let mut q: OutputQueue<UdpEndpoint> = OutputQueue::new();
        for i in 0..5u8 {
            q.push(SharedBuffer::copy_from_slice(&[i]), None);
        }
        for i in 0..5u8 {
            let (buf, _) = q.pop_front().unwrap();
            assert_eq!(buf.as_slice(), &[i]);
        }
    }
}
