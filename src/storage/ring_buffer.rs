use heapless::Deque;

use super::{Empty, Full};

/// A fixed-capacity byte ring buffer.
///
/// Backs both the per-connection send byte queue (bytes the application
/// has written but not yet framed) and the receive byte queue (in-order
/// payload bytes the application hasn't read yet). Capacity `N` is fixed
/// at compile time; the buffer never grows.
pub struct RingBuffer<const N: usize> {
    storage: Deque<u8, N>,
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        RingBuffer {
            storage: Deque::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() == N
    }

    /// Room left for more bytes.
    pub fn available(&self) -> usize {
        N - self.storage.len()
    }

    /// Enqueue as many bytes of `data` as there is room for. Never blocks;
    /// returns the count actually accepted, which may be fewer than
    /// `data.len()`.
    pub fn enqueue_slice(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if self.storage.push_back(byte).is_err() {
                break;
            }
            accepted += 1;
        }
        accepted
    }

    /// Enqueue all of `data`, or none of it if there isn't room for all of
    /// it. Used on the receive side so a partially-delivered payload never
    /// silently loses its tail.
    pub fn enqueue_slice_atomic(&mut self, data: &[u8]) -> Result<(), Full> {
        if data.len() > self.available() {
            return Err(Full);
        }
        for &byte in data {
            // Capacity was already checked above.
            let _ = self.storage.push_back(byte);
        }
        Ok(())
    }

    pub fn dequeue_one(&mut self) -> Result<u8, Empty> {
        self.storage.pop_front().ok_or(Empty)
    }

    pub fn peek_one(&self) -> Result<u8, Empty> {
        self.storage.front().copied().ok_or(Empty)
    }

    /// Dequeue up to `out.len()` bytes into `out`, returning the count
    /// actually dequeued.
    pub fn dequeue_slice(&mut self, out: &mut [u8]) -> usize {
        let mut dequeued = 0;
        while dequeued < out.len() {
            match self.storage.pop_front() {
                Some(byte) => {
                    out[dequeued] = byte;
                    dequeued += 1;
                }
                None => break,
            }
        }
        dequeued
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_refuses_overflow() {
        let mut buf: RingBuffer<4> = RingBuffer::new();
        assert_eq!(buf.enqueue_slice(b"hello"), 4);
        assert!(buf.is_full());
        assert_eq!(buf.enqueue_slice(b"x"), 0);
    }

    #[test]
    fn atomic_enqueue_rejects_partial() {
        let mut buf: RingBuffer<4> = RingBuffer::new();
        assert_eq!(buf.enqueue_slice_atomic(b"abc"), Ok(()));
        assert_eq!(buf.enqueue_slice_atomic(b"de"), Err(Full));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn fifo_order_preserved() {
        let mut buf: RingBuffer<8> = RingBuffer::new();
        buf.enqueue_slice(b"abcd");
        let mut out = [0u8; 2];
        assert_eq!(buf.dequeue_slice(&mut out), 2);
        assert_eq!(&out, b"ab");
        buf.enqueue_slice(b"ef");
        let mut out = [0u8; 8];
        let n = buf.dequeue_slice(&mut out);
        assert_eq!(&out[..n], b"cdef");
    }
}
