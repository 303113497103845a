//! Buffered full-duplex command link: DMA-style async I/O over
//! the command UART, with pause/resume/detach for host-polled operation.
//!
//! The circular-DMA receive diffing and the `tx_inflight`/`tx_pending`
//! transmit pump are implemented here as pure logic; the actual DMA/GPIO
//! peripheral is a board-level concern out of this core's scope. The board
//! driver calls [`Link::on_rx_dma_event`] from its half/complete/idle/wake
//! interrupts and [`Link::on_tx_complete`] from its DMA-complete interrupt;
//! both run with interrupts effectively disabled (an ISR stack), so every
//! field touched here is either owned exclusively by one side or accessed
//! only behind that discipline.

use crate::wakelock::{WakeLock, WakeLockMask};
use crate::cbuf::CBuf;
use heapless::Vec;

/// A contiguous chunk of bytes the board driver should start a transmit DMA
/// over. Its length is always `<= TXCAP`.
pub type TxChunk<const TXCAP: usize> = Vec<u8, TXCAP>;

pub struct Link<const RXCAP: usize, const TXCAP: usize> {
    rx: CBuf<RXCAP>,
    tx: CBuf<TXCAP>,
    tx_inflight: usize,
    tx_paused: bool,
    attached: bool,
    old_pos: usize,
    rx_overflow_count: u32,
    reported_overflow_count: u32,
}

impl<const RXCAP: usize, const TXCAP: usize> Default for Link<RXCAP, TXCAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RXCAP: usize, const TXCAP: usize> Link<RXCAP, TXCAP> {
    pub fn new() -> Self {
        Self {
            rx: CBuf::new(),
            tx: CBuf::new(),
            tx_inflight: 0,
            tx_paused: false,
            attached: true,
            old_pos: 0,
            rx_overflow_count: 0,
            reported_overflow_count: 0,
        }
    }

    pub fn rx_overflow_count(&self) -> u32 {
        self.rx_overflow_count
    }

    /// Non-blocking poll for RX overflow since the last call. Returns
    /// `Err` exactly once per batch of newly dropped bytes, so the caller
    /// can log it without having to track the counter itself.
    pub fn poll_overrun(&mut self) -> Result<(), crate::error::LinkError> {
        if self.reported_overflow_count == self.rx_overflow_count {
            return Ok(());
        }
        self.reported_overflow_count = self.rx_overflow_count;
        Err(crate::error::LinkError::Overrun)
    }

    /// Called from the half-complete/complete/idle-line/wake interrupts with
    /// the DMA ring's current contents and write cursor. Copies the bytes
    /// produced since the last call into the RX FIFO; bytes that don't fit
    /// are dropped from the tail and counted.
    pub fn on_rx_dma_event(&mut self, ring: &[u8], new_pos: usize) {
        let ring_len = ring.len();
        if ring_len == 0 {
            return;
        }
        let mut remaining = if new_pos >= self.old_pos {
            new_pos - self.old_pos
        } else {
            ring_len - self.old_pos + new_pos
        };
        let mut pos = self.old_pos;
        while remaining > 0 {
            let seg = (ring_len - pos).min(remaining);
            let written = self.rx.put(&ring[pos..pos + seg]);
            if written < seg {
                self.rx_overflow_count += (seg - written) as u32;
            }
            pos = (pos + seg) % ring_len;
            remaining -= seg;
        }
        self.old_pos = new_pos;
    }

    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.rx.get(dst)
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    /// Non-blocking enqueue into the TX FIFO. Returns the number of bytes
    /// actually accepted (FIFO may be saturated). Kicks the transmit pump
    /// unless the link is paused.
    pub fn write(&mut self, src: &[u8], wake: &WakeLockMask) -> usize {
        let n = self.tx.put(src);
        self.pump_tx(wake);
        n
    }

    /// As `write`, but loops and yields via `idle()` while the FIFO is
    /// saturated instead of returning a short write.
    pub fn write_blocking(&mut self, mut src: &[u8], wake: &WakeLockMask, mut idle: impl FnMut()) {
        while !src.is_empty() {
            let n = self.write(src, wake);
            src = &src[n..];
            if !src.is_empty() {
                idle();
            }
        }
    }

    /// Block until no bytes remain buffered or in flight, yielding via
    /// `idle` between polls. The transmit-complete interrupt still drains
    /// what's in flight concurrently; this only waits for it.
    pub fn flush(&mut self, mut idle: impl FnMut()) {
        while !self.tx_idle() {
            idle();
        }
    }

    pub fn pause_tx(&mut self) {
        self.tx_paused = true;
    }

    pub fn resume_tx(&mut self, wake: &WakeLockMask) {
        self.tx_paused = false;
        self.pump_tx(wake);
    }

    pub fn is_tx_paused(&self) -> bool {
        self.tx_paused
    }

    /// Reconfigure pins to/from analog mode so they can be shared with
    /// another peripheral; pending TX is paused across the detached
    /// interval.
    pub fn detach(&mut self) {
        self.attached = false;
        self.pause_tx();
    }

    pub fn attach(&mut self, wake: &WakeLockMask) {
        self.attached = true;
        self.resume_tx(wake);
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn before_sleep(&mut self) {
        self.pause_tx();
    }

    /// On wake, clear error flags (handled silently at the peripheral level
    /// out of this core's scope) and take the RX wake-lock until the first
    /// idle frame arrives.
    pub fn after_sleep(&mut self, wake: &WakeLockMask) {
        wake.take(WakeLock::LinkRx);
    }

    /// True once no bytes remain buffered or in flight.
    pub fn tx_idle(&self) -> bool {
        self.tx.is_empty() && self.tx_inflight == 0
    }

    /// Pick one contiguous segment from the TX FIFO's head and hand it back
    /// for the caller to start a DMA transfer over. Returns `None` if
    /// nothing is eligible (already sending, paused, or nothing queued).
    pub fn pump_tx(&mut self, wake: &WakeLockMask) -> Option<TxChunk<TXCAP>> {
        if self.tx_inflight != 0 || self.tx_paused || self.tx.is_empty() {
            return None;
        }
        let view = self.tx.head_view();
        let take = view.l0;
        let mut chunk: TxChunk<TXCAP> = Vec::new();
        chunk.resize(take, 0).ok()?;
        self.tx.peek(&mut chunk);
        self.tx_inflight = take;
        wake.take(WakeLock::LinkTx);
        Some(chunk)
    }

    /// Called from the transmit-complete interrupt. Consumes the bytes that
    /// were in flight, then re-arms the pump; releases the `LinkTx` wake
    /// lock if there's nothing left to send.
    pub fn on_tx_complete(&mut self, wake: &WakeLockMask) -> Option<TxChunk<TXCAP>> {
        self.tx.consume(self.tx_inflight);
        self.tx_inflight = 0;
        let next = self.pump_tx(wake);
        if next.is_none() {
            wake.release(WakeLock::LinkTx);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_event_copies_new_bytes_without_wrap() {
        let mut link = Link::<32, 32>::new();
        let ring = *b"hello world, more data here!!!!";
        link.on_rx_dma_event(&ring, 5);
        let mut out = [0u8; 5];
        assert_eq!(link.read(&mut out), 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn rx_event_handles_wraparound() {
        let mut link = Link::<32, 32>::new();
        let ring = *b"0123456789";
        link.on_rx_dma_event(&ring, 8); // old_pos starts at 0
        let mut drained = [0u8; 8];
        link.read(&mut drained);
        // wrap: new pos (2) < old pos (8)
        link.on_rx_dma_event(&ring, 2);
        let mut out = [0u8; 4];
        assert_eq!(link.read(&mut out), 4);
        assert_eq!(&out, b"8901");
    }

    #[test]
    fn rx_overflow_drops_tail_and_counts() {
        let mut link = Link::<4, 4>::new();
        let ring = [1u8, 2, 3, 4, 5, 6, 7, 8];
        link.on_rx_dma_event(&ring, 8);
        assert_eq!(link.rx_len(), 4);
        assert_eq!(link.rx_overflow_count(), 4);
    }

    #[test]
    fn poll_overrun_reports_once_per_event() {
        let mut link = Link::<4, 4>::new();
        assert!(link.poll_overrun().is_ok());
        let ring = [1u8, 2, 3, 4, 5, 6, 7, 8];
        link.on_rx_dma_event(&ring, 8);
        assert!(link.poll_overrun().is_err());
        assert!(link.poll_overrun().is_ok());
    }

    #[test]
    fn write_then_pump_then_complete_drains_fifo() {
        let wake = WakeLockMask::new();
        let mut link = Link::<16, 16>::new();
        assert_eq!(link.write(b"abc", &wake), 3);
        assert!(wake.is_held(WakeLock::LinkTx));
        let chunk = link.pump_tx(&wake);
        assert!(chunk.is_none(), "pump already ran inside write()");
        let next = link.on_tx_complete(&wake);
        assert!(next.is_none());
        assert!(!wake.is_held(WakeLock::LinkTx));
        assert!(link.tx_idle());
    }

    #[test]
    fn pause_blocks_transmission_until_resumed() {
        let wake = WakeLockMask::new();
        let mut link = Link::<16, 16>::new();
        link.pause_tx();
        link.write(b"xyz", &wake);
        assert!(!link.tx_idle());
        assert!(!wake.is_held(WakeLock::LinkTx));
        link.resume_tx(&wake);
        assert!(wake.is_held(WakeLock::LinkTx));
    }

    #[test]
    fn detach_pauses_and_attach_resumes() {
        let wake = WakeLockMask::new();
        let mut link = Link::<16, 16>::new();
        link.write(b"a", &wake);
        link.on_tx_complete(&wake);
        link.detach();
        link.write(b"b", &wake);
        assert!(!wake.is_held(WakeLock::LinkTx));
        link.attach(&wake);
        assert!(wake.is_held(WakeLock::LinkTx));
    }
}
