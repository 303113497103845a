//! Fixed-capacity single-producer / single-consumer byte FIFO.
//!
//! No dynamic allocation: the backing store is a `heapless::Vec` sized by the
//! caller. Producer and consumer each get a zero-copy "view" into the backing
//! store so bytes can be copied in/out (or DMA'd in/out) without an
//! intermediate buffer.

use heapless::Vec;

/// A contiguous free or data region: `(start, len)`. A second region is
/// non-empty only when the view wraps around the end of the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct View {
    pub p0: usize,
    pub l0: usize,
    pub p1: usize,
    pub l1: usize,
}

impl View {
    const EMPTY: Self = Self { p0: 0, l0: 0, p1: 0, l1: 0 };
}

/// SPSC circular byte buffer over a fixed-size backing array of capacity `N`.
pub struct CBuf<const N: usize> {
    buf: Vec<u8, N>,
    read: usize,
    write: usize,
    len: usize,
}

impl<const N: usize> Default for CBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CBuf<N> {
    pub fn new() -> Self {
        let mut buf = Vec::new();
        // Pre-fill so indexing is always valid; contents are overwritten by `put`.
        buf.resize(N, 0).ok();
        Self { buf, read: 0, write: 0, len: 0 }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn space(&self) -> usize {
        N - self.len
    }

    /// Free regions available to a producer, contiguous-first.
    pub fn tail_view(&self) -> View {
        let space = self.space();
        if space == 0 {
            return View::EMPTY;
        }
        let to_end = N - self.write;
        if to_end >= space {
            View { p0: self.write, l0: space, p1: 0, l1: 0 }
        } else {
            View { p0: self.write, l0: to_end, p1: 0, l1: space - to_end }
        }
    }

    /// Data regions available to a consumer, contiguous-first.
    pub fn head_view(&self) -> View {
        if self.len == 0 {
            return View::EMPTY;
        }
        let to_end = N - self.read;
        if to_end >= self.len {
            View { p0: self.read, l0: self.len, p1: 0, l1: 0 }
        } else {
            View { p0: self.read, l0: to_end, p1: 0, l1: self.len - to_end }
        }
    }

    /// Advance the write cursor by `n` bytes already copied in by the caller.
    /// Panics if `n > space()` — a producer-side bug, never hit on the wire
    /// path because callers always size `n` from `tail_view`.
    pub fn produce(&mut self, n: usize) {
        debug_assert!(n <= self.space());
        self.write = (self.write + n) % N;
        self.len += n;
    }

    /// Advance the read cursor by `n` bytes already copied out by the caller.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.read = (self.read + n) % N;
        self.len -= n;
    }

    /// Copy `src` into the buffer, writing as many bytes as fit. Returns the
    /// number of bytes actually written.
    pub fn put(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.space());
        let view = self.tail_view();
        let mut copied = 0;
        if view.l0 > 0 {
            let take = n.min(view.l0);
            self.buf[view.p0..view.p0 + take].copy_from_slice(&src[..take]);
            copied += take;
        }
        if copied < n && view.l1 > 0 {
            let take = n - copied;
            self.buf[view.p1..view.p1 + take].copy_from_slice(&src[copied..copied + take]);
            copied += take;
        }
        self.produce(copied);
        copied
    }

    /// Copy out up to `dst.len()` bytes. Returns the number of bytes actually
    /// read.
    pub fn get(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        let view = self.head_view();
        let mut copied = 0;
        if view.l0 > 0 {
            let take = n.min(view.l0);
            dst[..take].copy_from_slice(&self.buf[view.p0..view.p0 + take]);
            copied += take;
        }
        if copied < n && view.l1 > 0 {
            let take = n - copied;
            dst[copied..copied + take].copy_from_slice(&self.buf[view.p1..view.p1 + take]);
            copied += take;
        }
        self.consume(copied);
        copied
    }

    /// Copy out up to `dst.len()` bytes without consuming them. Used by the
    /// link's transmit pump, which must hand bytes to "DMA" before it knows
    /// the transfer has completed.
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        let view = self.head_view();
        let mut copied = 0;
        if view.l0 > 0 {
            let take = n.min(view.l0);
            dst[..take].copy_from_slice(&self.buf[view.p0..view.p0 + take]);
            copied += take;
        }
        if copied < n && view.l1 > 0 {
            let take = n - copied;
            dst[copied..copied + take].copy_from_slice(&self.buf[view.p1..view.p1 + take]);
            copied += take;
        }
        copied
    }

    /// Drop all buffered bytes without reading them.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_full_space() {
        let b = CBuf::<8>::new();
        assert_eq!(b.space(), 8);
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn put_get_roundtrip() {
        let mut b = CBuf::<8>::new();
        assert_eq!(b.put(b"hello"), 5);
        let mut out = [0u8; 5];
        assert_eq!(b.get(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn put_saturates_at_capacity() {
        let mut b = CBuf::<4>::new();
        assert_eq!(b.put(b"abcdef"), 4);
        assert_eq!(b.space(), 0);
    }

    #[test]
    fn wrap_around_preserves_order() {
        let mut b = CBuf::<4>::new();
        assert_eq!(b.put(b"ab"), 2);
        let mut out = [0u8; 2];
        assert_eq!(b.get(&mut out), 2);
        assert_eq!(&out, b"ab");
        // write index is now at 2; this put wraps write past the end.
        assert_eq!(b.put(b"cdef"), 4);
        let mut out2 = [0u8; 4];
        assert_eq!(b.get(&mut out2), 4);
        assert_eq!(&out2, b"cdef");
    }

    #[test]
    fn idempotence_for_arbitrary_sequences() {
        // For all sequences of put/get with total bytes <= capacity, bytes
        // read equal bytes written, in order.
        let mut b = CBuf::<16>::new();
        let chunks: &[&[u8]] = &[b"ab", b"cd", b"ef", b"gh"];
        let mut all_in = heapless::Vec::<u8, 64>::new();
        let mut all_out = heapless::Vec::<u8, 64>::new();
        for c in chunks {
            b.put(c);
            all_in.extend_from_slice(c).unwrap();
            let mut tmp = [0u8; 2];
            let n = b.get(&mut tmp);
            all_out.extend_from_slice(&tmp[..n]).unwrap();
        }
        assert_eq!(all_in, all_out);
    }

    #[test]
    fn views_report_two_segments_when_wrapped() {
        let mut b = CBuf::<4>::new();
        b.put(b"abc");
        let mut out = [0u8; 2];
        b.get(&mut out); // read=2, len=1
        b.put(b"xy"); // write wraps: 1 byte at end, 1 byte at start
        let v = b.head_view();
        assert_eq!(v.l0 + v.l1, 3);
    }
}
