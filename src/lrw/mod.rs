//! Adapter between the ATCI command layer and the MAC library: activation, uplink submission, MIB wrappers, class switching, and
//! translation of MAC callbacks into host-facing `+EVENT`/`+RECV`/`+ACK`
//! output.

mod event;

use crate::atci::{Atci, CmdLink};
use crate::error::AtErr;
use crate::hal::{DeviceClass, MacMib, MacService, MacStatus, Region};
use crate::sysconf::DataFormat;
use crate::wakelock::WakeLockMask;
use event::{EventSink, PENDING_CAP};
use heapless::Vec;

const MIN_PORT: u8 = 1;
const MAX_PORT: u8 = 223;

pub struct Lrw<M: MacService> {
    mac: M,
    pending: Vec<u8, PENDING_CAP>,
    async_events: bool,
    data_format: DataFormat,
    cert_port: u8,
    cert_port_enabled: bool,
    configured_class: DeviceClass,
    configured_chmask: Option<[u8; 16]>,
    tx_needed: bool,
    unconfirmed_retx: u8,
    confirmed_retx: u8,
    last_uplink_counter: Option<u32>,
    last_downlink: Option<(u32, i16, i8)>,
}

impl<M: MacService> Lrw<M> {
    pub fn new(mac: M) -> Self {
        Self {
            mac,
            pending: Vec::new(),
            async_events: true,
            data_format: DataFormat::Binary,
            cert_port: 224,
            cert_port_enabled: false,
            configured_class: DeviceClass::A,
            configured_chmask: None,
            tx_needed: false,
            unconfirmed_retx: 1,
            confirmed_retx: 1,
            last_uplink_counter: None,
            last_downlink: None,
        }
    }

    pub fn mac(&self) -> &M {
        &self.mac
    }

    pub fn mac_mut(&mut self) -> &mut M {
        &mut self.mac
    }

    pub fn set_async_events(&mut self, on: bool) {
        self.async_events = on;
    }

    pub fn set_data_format(&mut self, fmt: DataFormat) {
        self.data_format = fmt;
    }

    pub fn set_cert_port(&mut self, enabled: bool, port: u8) {
        self.cert_port_enabled = enabled;
        self.cert_port = port;
    }

    pub fn set_configured_class(&mut self, class: DeviceClass) {
        self.configured_class = class;
    }

    pub fn set_configured_chmask(&mut self, mask: Option<[u8; 16]>) {
        self.configured_chmask = mask;
    }

    pub fn set_retries(&mut self, unconfirmed: u8, confirmed: u8) {
        self.unconfirmed_retx = unconfirmed;
        self.confirmed_retx = confirmed;
    }

    /// True, exactly once, if a frame-pending bit or a scheduled-uplink
    /// indication requested a zero-length uplink since the last call.
    pub fn take_tx_needed(&mut self) -> bool {
        core::mem::replace(&mut self.tx_needed, false)
    }

    /// Drive the MAC library and translate its callbacks into host output.
    /// Must run once per main-loop pass.
    pub fn process(&mut self, link: &mut CmdLink, wake: &WakeLockMask) {
        let mut tx_needed = false;
        let mut join_succeeded = false;
        {
            let mut sink = EventSink {
                pending: &mut self.pending,
                link,
                wake,
                async_events: self.async_events,
                cert_port: self.cert_port,
                cert_port_enabled: self.cert_port_enabled,
                data_format: self.data_format,
                tx_needed: &mut tx_needed,
                join_succeeded: &mut join_succeeded,
                last_uplink_counter: &mut self.last_uplink_counter,
                last_downlink: &mut self.last_downlink,
            };
            self.mac.process(&mut sink);
        }
        if tx_needed {
            self.tx_needed = true;
        }
        if join_succeeded {
            crate::log::info!("lrw: join succeeded");
            let _ = self.mac.set_class(self.configured_class);
            if let Some(mask) = self.configured_chmask {
                let _ = self.mac.mib_set(MacMib::ChannelMask(mask));
            }
        }
    }

    /// Last uplink's frame counter as last reported by an `McpsConfirm`,
    /// taken (and cleared) so the main loop can fold it into `RadioState`
    /// exactly once per occurrence.
    pub fn take_last_uplink_counter(&mut self) -> Option<u32> {
        self.last_uplink_counter.take()
    }

    /// Last downlink's `(frame_counter, rssi, snr)` as last reported by an
    /// `McpsIndication`, taken the same way.
    pub fn take_last_downlink(&mut self) -> Option<(u32, i16, i8)> {
        self.last_downlink.take()
    }

    /// Drain events buffered while `async_events=false`; called by the
    /// command dispatcher immediately before writing `+OK`/`+ERR` so
    /// buffered output always precedes the reply.
    pub fn drain_pending(&mut self, link: &mut CmdLink, wake: &WakeLockMask) {
        if self.pending.is_empty() {
            return;
        }
        Atci::write(link, wake, &self.pending);
        self.pending.clear();
    }

    pub fn activate_otaa(&mut self, datarate: Option<u8>, tries: u8) -> Result<(), AtErr> {
        if self.mac.is_activated() {
            return Err(AtErr::ALREADY_JOINED);
        }
        let status = self.mac.activate_otaa(datarate, tries);
        crate::log::info!("lrw: otaa join request issued, {} tries", tries);
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }

    pub fn activate_abp(&mut self, dev_addr: u32, net_id: u32) -> Result<(), AtErr> {
        if self.mac.is_activated() {
            return Err(AtErr::ALREADY_JOINED);
        }
        let status = self.mac.activate_abp(dev_addr, net_id);
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }

    pub fn is_activated(&self) -> bool {
        self.mac.is_activated()
    }

    /// Validate and submit an uplink; retry count is whichever of
    /// `unconfirmed_retx`/`confirmed_retx` matches `confirmed`.
    pub fn send(&mut self, port: u8, payload: &[u8], confirmed: bool) -> Result<(), AtErr> {
        if !self.mac.is_activated() {
            return Err(AtErr::NOT_JOINED);
        }
        let valid_port =
            (MIN_PORT..=MAX_PORT).contains(&port) || (self.cert_port_enabled && port == self.cert_port);
        if !valid_port {
            return Err(AtErr::INVALID_VALUE);
        }
        let info = self.mac.query_tx_possible(payload.len());
        if payload.len() as u16 > info.current_size {
            return Err(AtErr::PAYLOAD_TOO_LONG);
        }
        let retries = if confirmed { self.confirmed_retx } else { self.unconfirmed_retx };
        let status = self.mac.send(port, payload, confirmed, retries);
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }

    pub fn set_dwell(&mut self, up: bool, down: bool) -> Result<(), AtErr> {
        let status = self.mac.mib_set(MacMib::Dwell { up, down });
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }

    pub fn dwell(&self) -> (bool, bool) {
        match self.mac.mib_get(MacMib::Dwell { up: false, down: false }) {
            MacMib::Dwell { up, down } => (up, down),
            _ => (false, false),
        }
    }

    pub fn set_max_eirp(&mut self, eirp: i8) -> Result<(), AtErr> {
        let status = self.mac.mib_set(MacMib::MaxEirp(eirp));
        if status == MacStatus::Ok { Ok(()) } else { Err(AtErr::NOT_SUPPORTED_IN_REGION) }
    }

    pub fn max_eirp(&self) -> i8 {
        match self.mac.mib_get(MacMib::MaxEirp(0)) {
            MacMib::MaxEirp(v) => v,
            _ => 0,
        }
    }

    pub fn set_channel_mask(&mut self, mask: [u8; 16]) -> Result<(), AtErr> {
        let status = self.mac.mib_set(MacMib::ChannelMask(mask));
        if status == MacStatus::Ok {
            self.configured_chmask = Some(mask);
            Ok(())
        } else {
            Err(AtErr::NOT_SUPPORTED_IN_REGION)
        }
    }

    pub fn channel_mask(&self) -> [u8; 16] {
        match self.mac.mib_get(MacMib::ChannelMask([0; 16])) {
            MacMib::ChannelMask(m) => m,
            _ => [0; 16],
        }
    }

    /// `A`/`C` apply instantly; `B` only kicks off beacon acquisition here —
    /// the library runs the rest of the state machine and the confirmation
    /// arrives later as an `+EVENT` through [`Self::process`].
    pub fn set_class(&mut self, class: DeviceClass) -> Result<(), AtErr> {
        let status = self.mac.set_class(class);
        if status == MacStatus::Ok {
            self.configured_class = class;
            crate::log::debug!("lrw: class switch accepted");
            Ok(())
        } else {
            Err(status.into())
        }
    }

    pub fn set_region(&mut self, region: Region) -> bool {
        self.mac.set_region(region)
    }

    pub fn region(&self) -> Region {
        self.mac.region()
    }

    /// Generic MIB passthrough for the handful of radio knobs that map
    /// 1:1 onto a [`MacMib`] variant (`+ADR`, `+ADRACK`, `+DELAY`, `+RX2`,
    /// `+REP`, `+RTYNUM`, `+RSSITH`).
    pub fn mib_get(&self, mib: MacMib) -> MacMib {
        self.mac.mib_get(mib)
    }

    pub fn mib_set(&mut self, mib: MacMib) -> Result<(), AtErr> {
        let status = self.mac.mib_set(mib);
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }

    pub fn link_check_request(&mut self) -> Result<(), AtErr> {
        let status = self.mac.link_check_request();
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }

    pub fn mcast_configure(
        &mut self,
        group: u8,
        dev_addr: u32,
        nwk_skey: &[u8; 16],
        app_skey: &[u8; 16],
    ) -> Result<(), AtErr> {
        let status = self.mac.mcast_configure(group, dev_addr, nwk_skey, app_skey);
        if status == MacStatus::Ok { Ok(()) } else { Err(status.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::fake::FakeMac;
    use crate::hal::{MacEvent, MlmeKind};

    fn fresh_link() -> CmdLink {
        CmdLink::new()
    }

    #[test]
    fn activate_otaa_rejects_when_already_joined() {
        let mut mac = FakeMac::default();
        mac.activated = true;
        let mut lrw = Lrw::new(mac);
        assert_eq!(lrw.activate_otaa(None, 3), Err(AtErr::ALREADY_JOINED));
    }

    #[test]
    fn send_before_activation_is_not_joined() {
        let mut lrw = Lrw::new(FakeMac::default());
        assert_eq!(lrw.send(1, b"hi", false), Err(AtErr::NOT_JOINED));
    }

    #[test]
    fn send_rejects_out_of_range_port() {
        let mut mac = FakeMac::default();
        mac.activated = true;
        let mut lrw = Lrw::new(mac);
        assert_eq!(lrw.send(0, b"hi", false), Err(AtErr::INVALID_VALUE));
        assert_eq!(lrw.send(250, b"hi", false), Err(AtErr::INVALID_VALUE));
    }

    #[test]
    fn send_submits_to_mac_with_configured_retries() {
        let mut mac = FakeMac::default();
        mac.activated = true;
        let mut lrw = Lrw::new(mac);
        lrw.set_retries(2, 5);
        assert_eq!(lrw.send(10, b"abc", true), Ok(()));
        assert_eq!(lrw.mac().sent.len(), 1);
        let (port, payload, confirmed) = &lrw.mac().sent[0];
        assert_eq!(*port, 10);
        assert_eq!(&payload[..], b"abc");
        assert!(*confirmed);
    }

    #[test]
    fn join_success_event_restores_class_and_chmask() {
        let mut mac = FakeMac::default();
        mac.next_join_status = MacStatus::Ok;
        mac.push_event(MacEvent::MlmeConfirm { kind: MlmeKind::Join, status: MacStatus::Ok, margin: None, gw_count: None });
        let mut lrw = Lrw::new(mac);
        lrw.set_configured_class(DeviceClass::C);
        lrw.set_configured_chmask(Some([0xff; 16]));

        let mut link = fresh_link();
        let wake = WakeLockMask::new();
        lrw.process(&mut link, &wake);

        assert_eq!(lrw.mac().class, Some(DeviceClass::C));
    }

    #[test]
    fn async_events_true_writes_immediately() {
        let mut mac = FakeMac::default();
        mac.push_event(MacEvent::McpsConfirm {
            status: MacStatus::Ok,
            channel: 0,
            datarate: 0,
            ack_received: true,
            uplink_counter: 1,
        });
        let mut lrw = Lrw::new(mac);
        let mut link = fresh_link();
        let wake = WakeLockMask::new();
        lrw.process(&mut link, &wake);

        let mut out = [0u8; 32];
        let n = link.read(&mut out);
        assert_eq!(&out[..n], b"+ACK=1\r\n");
    }

    #[test]
    fn async_events_false_buffers_until_drained() {
        let mut mac = FakeMac::default();
        mac.push_event(MacEvent::McpsConfirm {
            status: MacStatus::Ok,
            channel: 0,
            datarate: 0,
            ack_received: false,
            uplink_counter: 1,
        });
        let mut lrw = Lrw::new(mac);
        lrw.set_async_events(false);
        let mut link = fresh_link();
        let wake = WakeLockMask::new();
        lrw.process(&mut link, &wake);

        let mut out = [0u8; 32];
        assert_eq!(link.read(&mut out), 0, "nothing written before drain");

        lrw.drain_pending(&mut link, &wake);
        let n = link.read(&mut out);
        assert_eq!(&out[..n], b"+ACK=0\r\n");
    }

    #[test]
    fn mcps_events_populate_telemetry_taken_once() {
        let mut mac = FakeMac::default();
        mac.push_event(MacEvent::McpsConfirm {
            status: MacStatus::Ok,
            channel: 0,
            datarate: 0,
            ack_received: true,
            uplink_counter: 7,
        });
        mac.push_event(MacEvent::McpsIndication {
            port: 5,
            rx_datarate: 0,
            rssi: -42,
            snr: 3,
            downlink_counter: 9,
            slot: 1,
            frame_pending: false,
            payload: heapless::Vec::new(),
        });
        let mut lrw = Lrw::new(mac);
        let mut link = fresh_link();
        let wake = WakeLockMask::new();
        lrw.process(&mut link, &wake);

        assert_eq!(lrw.take_last_uplink_counter(), Some(7));
        assert_eq!(lrw.take_last_uplink_counter(), None);
        assert_eq!(lrw.take_last_downlink(), Some((9, -42, 3)));
        assert_eq!(lrw.take_last_downlink(), None);
    }

    #[test]
    fn frame_pending_sets_tx_needed() {
        let mut mac = FakeMac::default();
        mac.push_event(MacEvent::McpsIndication {
            port: 5,
            rx_datarate: 0,
            rssi: -80,
            snr: 4,
            downlink_counter: 1,
            slot: 1,
            frame_pending: true,
            payload: heapless::Vec::new(),
        });
        let mut lrw = Lrw::new(mac);
        let mut link = fresh_link();
        let wake = WakeLockMask::new();
        lrw.process(&mut link, &wake);
        assert!(lrw.take_tx_needed());
        assert!(!lrw.take_tx_needed());
    }
}
