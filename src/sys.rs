//! The main-loop glue: one cooperative pass per call, plus the sleep
//! decision made just before the board driver actually stops the core.
//!
//! Everything feeding this pass arrives out of band: UART bytes land in
//! [`CmdLink`]'s RX `CBuf` from a DMA-complete ISR calling
//! [`Link::on_rx_dma_event`](crate::link::Link::on_rx_dma_event), and radio
//! events are pumped into the MAC library the same way. `Sys` only owns the
//! pieces that have to run at task level: the command table, the line
//! parser, and the wake-lock mask that ties them to the sleep decision.

use crate::atci::{Atci, CmdLink};
use crate::cmd::{Cmd, ResetKind};
use crate::hal::{Clock, MacService, RawStore, Unique};
use crate::nvm::Nvm;
use crate::wakelock::{self, SleepDecision, WakeLockMask};

pub struct Sys<M: MacService, R: RawStore, U: Unique> {
    pub link: CmdLink,
    pub atci: Atci,
    pub cmd: Cmd<M, R, U>,
    pub wake: WakeLockMask,
}

impl<M: MacService, R: RawStore, U: Unique> Sys<M, R, U> {
    pub fn new(nvm: Nvm<R>, mac: M, unique: U) -> Self {
        Self {
            link: CmdLink::new(),
            atci: Atci::new(),
            cmd: Cmd::new(nvm, mac, unique),
            wake: WakeLockMask::new(),
        }
    }

    /// One pass of the cooperative loop: flush dirty config, run the command
    /// line parser, drive the MAC adapter, fold its telemetry back into
    /// [`RadioState`](crate::cmd::RadioState), and report a reset the pass
    /// may have scheduled. Bounded and non-blocking; the caller is expected
    /// to call this from its own `loop {}` and follow it with [`Self::idle`].
    pub fn run_once(&mut self, clock: &dyn Clock) -> Option<ResetKind> {
        self.cmd.sysconf.flush(&mut self.cmd.nvm);

        self.atci.process(&mut self.link, &self.wake, clock, &mut self.cmd);
        self.cmd.lrw.process(&mut self.link, &self.wake);

        if let Some(counter) = self.cmd.lrw.take_last_uplink_counter() {
            self.cmd.radio.last_uplink_counter = counter;
        }
        if let Some((counter, rssi, snr)) = self.cmd.lrw.take_last_downlink() {
            self.cmd.radio.last_downlink_counter = counter;
            self.cmd.radio.last_rssi = rssi;
            self.cmd.radio.last_snr = snr;
        }
        if self.cmd.lrw.take_tx_needed() {
            let port = self.cmd.sysconf.get().default_port;
            if self.cmd.lrw.send(port, &[], false).is_err() {
                crate::log::warn!("lrw: frame-pending auto-retransmit failed");
            }
        }

        if let Some(kind) = self.cmd.schedule_reset {
            self.flush_and_reset(kind);
            return Some(kind);
        }
        None
    }

    /// Last-chance flush before a reset the command table already scheduled.
    /// The board driver performs the actual reset/halt; this just makes sure
    /// nothing dirty is lost first.
    fn flush_and_reset(&mut self, kind: ResetKind) {
        self.cmd.sysconf.flush(&mut self.cmd.nvm);
        Atci::flush(&mut self.link, &self.wake);
        let label = match kind {
            ResetKind::Graceful => "graceful",
            ResetKind::Immediate => "immediate",
            ResetKind::Halt => "halt",
        };
        crate::log::info!("sys: {} reset scheduled", label);
    }

    /// Called after `run_once` returns `None`, with interrupts disabled.
    /// Deep sleep is only entered when the wake-lock mask is actually zero;
    /// `WakeLockMask::decide` is the sole source of truth for that, not a
    /// separate check here.
    pub fn idle(&self, sleep_allowed: bool) -> SleepDecision {
        let decision = wakelock::log_sleep_decision(&self.wake, sleep_allowed);
        debug_assert!(
            decision != SleepDecision::Deep || self.wake.is_zero(),
            "deep sleep decided with a held wake lock"
        );
        decision
    }

    /// Called by the board driver immediately after waking from deep sleep,
    /// symmetric with the log line `idle` emits on the way down.
    pub fn on_deep_sleep_exit(&self) {
        crate::log::debug!("sys: exited deep sleep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::fake::{FakeClock, FakeMac};
    use crate::nvm::test_support::MemStore;

    struct FakeUnique;
    impl Unique for FakeUnique {
        fn id(&self) -> [u8; 8] {
            [0u8; 8]
        }
    }

    fn fresh_sys() -> Sys<FakeMac, MemStore, FakeUnique> {
        let nvm = Nvm::format(MemStore::new(4096)).unwrap();
        Sys::new(nvm, FakeMac::default(), FakeUnique)
    }

    #[test]
    fn run_once_with_no_input_reports_no_reset() {
        let mut sys = fresh_sys();
        let clock = FakeClock::new();
        assert_eq!(sys.run_once(&clock), None);
    }

    #[test]
    fn idle_is_deep_when_mask_is_zero_and_sleep_allowed() {
        let sys = fresh_sys();
        assert_eq!(sys.idle(true), SleepDecision::Deep);
    }

    #[test]
    fn idle_is_shallow_when_a_lock_is_held() {
        let sys = fresh_sys();
        sys.wake.take(crate::wakelock::WakeLock::Radio);
        assert_eq!(sys.idle(true), SleepDecision::Shallow);
    }

    #[test]
    fn scheduled_reset_is_reported_and_flushes_config() {
        let mut sys = fresh_sys();
        sys.cmd.sysconf.update(|d| d.default_port = 9);
        sys.cmd.schedule_reset = Some(ResetKind::Graceful);
        let clock = FakeClock::new();
        assert_eq!(sys.run_once(&clock), Some(ResetKind::Graceful));
        assert!(!sys.cmd.sysconf.is_dirty());
    }
}
