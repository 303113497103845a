//! Formatting and buffering for asynchronous MAC-originated output: `+EVENT`, `+RECV`, `+ACK`, `+ANS` lines and the payload line
//! that follows a `+RECV` header.

use heapless::Vec;

use crate::atci::{write_decimal, Atci, CmdLink};
use crate::hal::{MacEvent, MacObserver, MacStatus, MlmeKind};
use crate::sysconf::DataFormat;
use crate::wakelock::WakeLockMask;

pub const PENDING_CAP: usize = 512;

fn fmt_event(kind: u8, sub: i32) -> Vec<u8, 32> {
    let mut s = Vec::new();
    s.extend_from_slice(b"+EVENT=").ok();
    write_decimal(&mut s, kind as i32);
    s.push(b',').ok();
    write_decimal(&mut s, sub);
    s.extend_from_slice(b"\r\n").ok();
    s
}

fn fmt_ack(n: u8) -> Vec<u8, 16> {
    let mut s = Vec::new();
    s.extend_from_slice(b"+ACK=").ok();
    write_decimal(&mut s, n as i32);
    s.extend_from_slice(b"\r\n").ok();
    s
}

fn fmt_ans_linkcheck(margin: u8, gw_count: u8) -> Vec<u8, 32> {
    let mut s = Vec::new();
    s.extend_from_slice(b"+ANS=2,").ok();
    write_decimal(&mut s, margin as i32);
    s.push(b',').ok();
    write_decimal(&mut s, gw_count as i32);
    s.extend_from_slice(b"\r\n").ok();
    s
}

fn fmt_recv_header(port: u8, len: usize) -> Vec<u8, 32> {
    let mut s = Vec::new();
    s.extend_from_slice(b"+RECV=").ok();
    write_decimal(&mut s, port as i32);
    s.push(b',').ok();
    write_decimal(&mut s, len as i32);
    s.extend_from_slice(b"\r\n").ok();
    s
}

fn fmt_payload_line(payload: &[u8], format: DataFormat) -> Vec<u8, 512> {
    let mut s = Vec::new();
    match format {
        DataFormat::Binary => {
            s.extend_from_slice(payload).ok();
        }
        DataFormat::Hex => {
            for b in payload {
                let hi = b"0123456789ABCDEF"[(b >> 4) as usize];
                let lo = b"0123456789ABCDEF"[(b & 0xf) as usize];
                s.push(hi).ok();
                s.push(lo).ok();
            }
        }
    }
    s.extend_from_slice(b"\r\n").ok();
    s
}

fn mlme_kind_code(kind: MlmeKind) -> u8 {
    match kind {
        MlmeKind::Join => 1,
        MlmeKind::LinkCheck => 2,
        MlmeKind::ScheduleUplink => 3,
        MlmeKind::PingSlotInfo => 4,
        MlmeKind::BeaconAcquisition => 5,
    }
}

/// Receives [`MacEvent`]s from the MAC library's `process()` call and either
/// writes them straight through the link (`async_events=true`) or buffers
/// them for the next reply to drain (`async_events=false`).
/// Lives only for the duration of one [`crate::lrw::Lrw::process`] call so it
/// can borrow `link`/`wake` without the `Lrw` itself holding them.
pub(crate) struct EventSink<'a> {
    pub pending: &'a mut Vec<u8, PENDING_CAP>,
    pub link: &'a mut CmdLink,
    pub wake: &'a WakeLockMask,
    pub async_events: bool,
    pub cert_port: u8,
    pub cert_port_enabled: bool,
    pub data_format: DataFormat,
    pub tx_needed: &'a mut bool,
    pub join_succeeded: &'a mut bool,
    pub last_uplink_counter: &'a mut Option<u32>,
    pub last_downlink: &'a mut Option<(u32, i16, i8)>,
}

impl<'a> EventSink<'a> {
    fn emit(&mut self, bytes: &[u8]) {
        if self.async_events {
            Atci::write(&mut *self.link, self.wake, bytes);
        } else {
            // Buffer fills up only under sustained async output with
            // host-polling disabled; oldest-first drop is acceptable here
            // since the host is expected to poll promptly.
            self.pending.extend_from_slice(bytes).ok();
        }
    }
}

impl<'a> MacObserver for EventSink<'a> {
    fn on_event(&mut self, event: MacEvent) {
        match event {
            MacEvent::McpsConfirm { status, ack_received, uplink_counter, .. } => {
                *self.last_uplink_counter = Some(uplink_counter);
                if status == MacStatus::Ok {
                    let line = fmt_ack(ack_received as u8);
                    self.emit(&line);
                }
            }
            MacEvent::McpsIndication { port, frame_pending, payload, rssi, snr, downlink_counter, .. } => {
                *self.last_downlink = Some((downlink_counter, rssi, snr));
                let header = fmt_recv_header(port, payload.len());
                self.emit(&header);
                let body = fmt_payload_line(&payload, self.data_format);
                self.emit(&body);
                if frame_pending {
                    *self.tx_needed = true;
                }
            }
            MacEvent::MlmeConfirm { kind, status, margin, gw_count } => match kind {
                MlmeKind::Join => {
                    let ok = status == MacStatus::Ok;
                    let line = fmt_event(mlme_kind_code(kind), ok as i32);
                    self.emit(&line);
                    if ok {
                        *self.join_succeeded = true;
                    }
                }
                MlmeKind::LinkCheck => {
                    let line = fmt_ans_linkcheck(margin.unwrap_or(0), gw_count.unwrap_or(0));
                    self.emit(&line);
                }
                other => {
                    let line = fmt_event(mlme_kind_code(other), (status == MacStatus::Ok) as i32);
                    self.emit(&line);
                }
            },
            MacEvent::MlmeIndication { kind, .. } => {
                if let MlmeKind::ScheduleUplink = kind {
                    *self.tx_needed = true;
                }
            }
        }
    }
}
