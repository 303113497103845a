//! External contracts the core depends on. These are implemented by the
//! board-support crate (radio driver, GPIO/SPI/DMA glue, RTC) and handed to
//! the core as trait objects / generics; this crate never links a concrete
//! HAL, keeping board support gated behind a feature rather than baking one
//! board into the library.

use heapless::Vec;

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// One-shot timer. `arm` schedules `on_fire` to run (from the main loop, not
/// necessarily an ISR) after `ms` milliseconds; a second `arm` before firing
/// replaces the pending deadline.
pub trait Timer {
    fn arm(&mut self, ms: u32);
    fn cancel(&mut self);
    /// Non-blocking poll: true exactly once per arm, the pass after the
    /// deadline elapses.
    fn poll_fired(&mut self) -> bool;
}

/// Raw contiguous byte-addressable store backing the NVM block. No
/// wear-leveling or replication at this layer — that is the job of
/// [`crate::nvm::Nvm`], which owns the majority-of-five replication scheme.
pub trait RawStore {
    fn size(&self) -> usize;
    fn read(&self, offset: usize, buf: &mut [u8]);
    fn write(&mut self, offset: usize, data: &[u8]);
}

/// 8-byte globally-unique device identifier (e.g. a silicon UID register).
pub trait Unique {
    fn id(&self) -> [u8; 8];
}

/// Region used by `+DR`/dwell/channel-mask style commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxInfo {
    pub max_size: u16,
    pub current_size: u16,
}

/// MAC activation / session status surfaced back through `MacService` calls,
/// mapped onto the host-facing error taxonomy by the adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacStatus {
    Ok,
    Busy,
    NotJoined,
    AlreadyJoined,
    RegionNotSupported,
    TxPowerTooHigh,
    NotSupportedInRegion,
    DutyCycleRestricted,
    NoFreeChannel,
    TooManyLinkChecksQueued,
    PayloadTooLong,
    OnlyInAbp,
    OnlyInOtaa,
    KeyAccessDenied,
    ReattachDenied,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacMib {
    Dwell { up: bool, down: bool },
    MaxEirp(i8),
    ChannelMask([u8; 16]),
    Adr(bool),
    AdrAckLimit(u16),
    Delay { rx1: u16, rx2: u16 },
    Rx2 { freq: u32, datarate: u8 },
    Repeat(u8),
    RetryCount { unconfirmed: u8, confirmed: u8 },
    RssiThreshold(i16),
}

/// Tagged record surfaced from the MAC to [`crate::lrw::Lrw`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacEvent {
    McpsConfirm {
        status: MacStatus,
        channel: u8,
        datarate: u8,
        ack_received: bool,
        uplink_counter: u32,
    },
    McpsIndication {
        port: u8,
        rx_datarate: u8,
        rssi: i16,
        snr: i8,
        downlink_counter: u32,
        slot: u8,
        frame_pending: bool,
        payload: Vec<u8, 242>,
    },
    MlmeConfirm {
        kind: MlmeKind,
        status: MacStatus,
        /// Only meaningful for `LinkCheck`.
        margin: Option<u8>,
        gw_count: Option<u8>,
    },
    MlmeIndication {
        kind: MlmeKind,
        status: MacStatus,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MlmeKind {
    Join,
    LinkCheck,
    ScheduleUplink,
    PingSlotInfo,
    BeaconAcquisition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    A,
    B,
    C,
}

/// Receiver of asynchronous MAC events. The adapter (`Lrw`) is the sole
/// implementer; modeled as a single trait with one method per event rather
/// than a raw function-pointer table (see DESIGN.md).
pub trait MacObserver {
    fn on_event(&mut self, event: MacEvent);
}

/// Which LoRaWAN region/band the MAC is configured for. Numeric values are
/// irrelevant here — the MAC library owns the channel plan; the core only
/// needs to ask for a switch and learn whether it was accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region(pub u8);

/// The MAC protocol library's entry points (join, send, MIB access). PHY
/// framing, crypto and the ADR algorithm live on the other side of this
/// trait and are out of scope for this core.
pub trait MacService {
    fn start(&mut self);
    fn stop(&mut self);

    /// Switch region/band. Returns `false` if unsupported. A successful
    /// switch that actually changes the active region is the adapter's cue
    /// to factory-reset — this call only
    /// reports acceptance, the adapter diffs old vs new itself.
    fn set_region(&mut self, region: Region) -> bool;
    fn region(&self) -> Region;

    fn activate_otaa(&mut self, datarate: Option<u8>, tries: u8) -> MacStatus;
    fn activate_abp(&mut self, dev_addr: u32, net_id: u32) -> MacStatus;
    fn is_activated(&self) -> bool;

    fn send(&mut self, port: u8, payload: &[u8], confirmed: bool, retries: u8) -> MacStatus;

    fn query_tx_possible(&self, len: usize) -> TxInfo;
    fn is_busy(&self) -> bool;

    fn mib_get(&self, mib: MacMib) -> MacMib;
    fn mib_set(&mut self, mib: MacMib) -> MacStatus;

    fn set_class(&mut self, class: DeviceClass) -> MacStatus;
    fn set_port_default(&mut self, port: u8);

    fn link_check_request(&mut self) -> MacStatus;
    fn mcast_configure(&mut self, group: u8, dev_addr: u32, nwk_skey: &[u8; 16], app_skey: &[u8; 16]) -> MacStatus;

    // --- Key / identity storage. ---
    fn set_deveui(&mut self, v: [u8; 8]);
    fn deveui(&self) -> [u8; 8];
    fn set_joineui(&mut self, v: [u8; 8]);
    fn joineui(&self) -> [u8; 8];
    fn set_devaddr(&mut self, v: u32);
    fn devaddr(&self) -> u32;
    fn set_netid(&mut self, v: u32);
    fn netid(&self) -> u32;
    /// 1.0: dual-writes NwkKey and AppKey. 1.1: `$APPKEY` writes only AppKey.
    fn set_appkey(&mut self, v: [u8; 16]);
    fn set_nwkkey(&mut self, v: [u8; 16]);
    fn set_nwkskey(&mut self, v: [u8; 16]);
    fn set_appskey(&mut self, v: [u8; 16]);
    fn set_fnwksintkey(&mut self, v: [u8; 16]);
    fn set_snwksintkey(&mut self, v: [u8; 16]);
    fn set_nwksenckey(&mut self, v: [u8; 16]);

    /// Drive pending MAC work; called once per main-loop pass. Fires queued
    /// callbacks on `observer` synchronously, from main-loop context only.
    fn process(&mut self, observer: &mut dyn MacObserver);
}

/// Test doubles shared by `lrw`'s and `cmd`'s unit tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    pub struct FakeClock {
        pub ms: core::cell::Cell<u32>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self { ms: core::cell::Cell::new(0) }
        }
        pub fn advance(&self, ms: u32) {
            self.ms.set(self.ms.get() + ms);
        }
    }

    impl Clock for FakeClock {
        fn now_ms(&self) -> u32 {
            self.ms.get()
        }
    }

    #[derive(Default)]
    pub struct FakeMac {
        pub region: u8,
        pub activated: bool,
        pub busy: bool,
        pub next_join_status: MacStatus,
        pub next_send_status: MacStatus,
        pub class: Option<DeviceClass>,
        pub default_port: u8,
        pub deveui: [u8; 8],
        pub joineui: [u8; 8],
        pub devaddr: u32,
        pub netid: u32,
        pub appkey: [u8; 16],
        pub nwkkey: [u8; 16],
        pub nwkskey: [u8; 16],
        pub appskey: [u8; 16],
        pub sent: heapless::Vec<(u8, heapless::Vec<u8, 242>, bool), 8>,
        pub events: heapless::Vec<MacEvent, 8>,
    }

    impl FakeMac {
        /// Queue an event to be handed to the observer on the next `process()`.
        pub fn push_event(&mut self, e: MacEvent) {
            self.events.push(e).ok();
        }
    }

    impl MacService for FakeMac {
        fn start(&mut self) {}
        fn stop(&mut self) {}

        fn set_region(&mut self, region: Region) -> bool {
            if region.0 > 2 {
                return false;
            }
            self.region = region.0;
            true
        }
        fn region(&self) -> Region {
            Region(self.region)
        }

        fn activate_otaa(&mut self, _datarate: Option<u8>, _tries: u8) -> MacStatus {
            if self.next_join_status == MacStatus::Ok {
                self.activated = true;
            }
            self.next_join_status
        }
        fn activate_abp(&mut self, dev_addr: u32, net_id: u32) -> MacStatus {
            self.devaddr = dev_addr;
            self.netid = net_id;
            self.activated = true;
            MacStatus::Ok
        }
        fn is_activated(&self) -> bool {
            self.activated
        }

        fn send(&mut self, port: u8, payload: &[u8], confirmed: bool, _retries: u8) -> MacStatus {
            if self.next_send_status == MacStatus::Ok {
                let mut v = heapless::Vec::new();
                v.extend_from_slice(payload).ok();
                self.sent.push((port, v, confirmed)).ok();
            }
            self.next_send_status
        }

        fn query_tx_possible(&self, len: usize) -> TxInfo {
            TxInfo { max_size: 242, current_size: len as u16 }
        }
        fn is_busy(&self) -> bool {
            self.busy
        }

        fn mib_get(&self, mib: MacMib) -> MacMib {
            mib
        }
        fn mib_set(&mut self, _mib: MacMib) -> MacStatus {
            MacStatus::Ok
        }

        fn set_class(&mut self, class: DeviceClass) -> MacStatus {
            self.class = Some(class);
            MacStatus::Ok
        }
        fn set_port_default(&mut self, port: u8) {
            self.default_port = port;
        }

        fn link_check_request(&mut self) -> MacStatus {
            MacStatus::Ok
        }
        fn mcast_configure(&mut self, _group: u8, _dev_addr: u32, _nwk_skey: &[u8; 16], _app_skey: &[u8; 16]) -> MacStatus {
            MacStatus::Ok
        }

        fn set_deveui(&mut self, v: [u8; 8]) {
            self.deveui = v;
        }
        fn deveui(&self) -> [u8; 8] {
            self.deveui
        }
        fn set_joineui(&mut self, v: [u8; 8]) {
            self.joineui = v;
        }
        fn joineui(&self) -> [u8; 8] {
            self.joineui
        }
        fn set_devaddr(&mut self, v: u32) {
            self.devaddr = v;
        }
        fn devaddr(&self) -> u32 {
            self.devaddr
        }
        fn set_netid(&mut self, v: u32) {
            self.netid = v;
        }
        fn netid(&self) -> u32 {
            self.netid
        }
        fn set_appkey(&mut self, v: [u8; 16]) {
            self.appkey = v;
        }
        fn set_nwkkey(&mut self, v: [u8; 16]) {
            self.nwkkey = v;
        }
        fn set_nwkskey(&mut self, v: [u8; 16]) {
            self.nwkskey = v;
        }
        fn set_appskey(&mut self, v: [u8; 16]) {
            self.appskey = v;
        }
        fn set_fnwksintkey(&mut self, _v: [u8; 16]) {}
        fn set_snwksintkey(&mut self, _v: [u8; 16]) {}
        fn set_nwksenckey(&mut self, _v: [u8; 16]) {}

        fn process(&mut self, observer: &mut dyn MacObserver) {
            let queued = core::mem::take(&mut self.events);
            for e in queued {
                observer.on_event(e);
            }
        }
    }

    impl Default for MacStatus {
        fn default() -> Self {
            MacStatus::Ok
        }
    }
}
