//! Session & traffic commands: join, uplink submission
//! (including the `+UTX`/`+CTX`/`+PUTX`/`+PCTX` upload family), multicast,
//! and session/status readback.

use heapless::Vec;

use super::{pack_upload_origin, CmdResult, Ctx};
use crate::atci::upload::{ArmError, Encoding};
use crate::atci::{AtciParam, UploadArmer};
use crate::error::AtErr;
use crate::hal::{MacService, RawStore, Unique};
use crate::sysconf::DataFormat;

fn write_i32(v: &mut Vec<u8, 96>, n: i32) {
    crate::atci::write_decimal(v, n);
}

/// `+JOIN[=<dr>[,<tries>]]`: OTAA issues the library's `Join` MLME request;
/// ABP just flips the activated bit.
pub fn join<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: Option<&[u8]>) -> CmdResult {
    if ctx.otaa {
        let (dr, tries) = match args {
            None => (None, ctx.radio.join_tries),
            Some(a) => {
                let mut p = AtciParam::new(a);
                let dr = p.get_uint().map(|v| v as u8);
                let tries = if p.is_comma() { p.get_uint().map(|v| v as u8) } else { None };
                (dr, tries.unwrap_or(ctx.radio.join_tries))
            }
        };
        ctx.lrw.activate_otaa(dr, tries)?;
    } else {
        let dev_addr = ctx.lrw.mac().devaddr();
        let net_id = ctx.lrw.mac().netid();
        ctx.lrw.activate_abp(dev_addr, net_id)?;
    }
    Ok(None)
}

pub fn joindc_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.joindc_ms as i32);
    Ok(Some(v))
}

pub fn joindc_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.radio.joindc_ms = v;
    Ok(None)
}

pub fn lncheck<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    ctx.lrw.link_check_request()?;
    Ok(None)
}

/// `$DEVTIME`: request the network time sync MLME; the confirmation surfaces
/// asynchronously the same way a `LinkCheck` answer does.
pub fn devtime<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    ctx.lrw.link_check_request()?;
    Ok(None)
}

pub fn port_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.sysconf.get().default_port as i32);
    Ok(Some(v))
}

pub fn port_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !(1..=223).contains(&v) {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.sysconf.update(|d| d.default_port = v as u8);
    Ok(None)
}

/// Arms an upload for one of `+UTX`/`+CTX`/`+PUTX`/`+PCTX`. `explicit_port`
/// is `None` for `+UTX`/`+CTX` (uses `SysConf.default_port`).
pub fn arm_tx<M: MacService, R: RawStore, U: Unique>(
    ctx: &mut Ctx<M, R, U>,
    args: &[u8],
    explicit_port: bool,
    confirmed: bool,
    upload: &mut dyn UploadArmer,
    now_ms: u32,
) -> CmdResult {
    let mut p = AtciParam::new(args);
    let port = if explicit_port {
        let port = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
        if !p.is_comma() {
            return Err(AtErr::WRONG_ARITY);
        }
        if !(1..=223).contains(&port) {
            return Err(AtErr::INVALID_VALUE);
        }
        port as u8
    } else {
        ctx.sysconf.get().default_port
    };
    let len = p.get_uint().ok_or(AtErr::WRONG_ARITY)? as usize;
    let encoding = if matches!(ctx.sysconf.get().data_format, DataFormat::Hex) {
        Encoding::Hex
    } else {
        Encoding::Binary
    };
    let timeout_ms = ctx.sysconf.get().uart_timeout_ms as u32;
    let origin = pack_upload_origin(port, confirmed);
    match upload.arm_upload(origin, len, encoding, timeout_ms, now_ms) {
        // Upload armed; the `+OK`/`+ERR` reply is deferred to `on_upload`.
        Ok(None) => Err(super::DEFERRED),
        // Zero-length upload fires immediately; submit right away.
        Ok(Some(outcome)) => super::deliver_upload(ctx, outcome),
        Err(ArmError::TooLong) => Err(AtErr::PAYLOAD_TOO_LONG),
        Err(ArmError::AlreadyPending) => Err(AtErr::BUSY),
    }
}

pub fn mcast<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let group = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let mut dev_addr_bytes = [0u8; 4];
    let n = p.get_hex(&mut dev_addr_bytes, 8).ok_or(AtErr::INVALID_VALUE)?;
    if n != 4 || !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let mut nwk_skey = [0u8; 16];
    let n = p.get_hex(&mut nwk_skey, 32).ok_or(AtErr::INVALID_VALUE)?;
    if n != 16 || !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let mut app_skey = [0u8; 16];
    let n = p.get_hex(&mut app_skey, 32).ok_or(AtErr::INVALID_VALUE)?;
    if n != 16 {
        return Err(AtErr::WRONG_ARITY);
    }
    if group > u8::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw
        .mcast_configure(group as u8, u32::from_be_bytes(dev_addr_bytes), &nwk_skey, &app_skey)?;
    Ok(None)
}

/// `+FRMCNT`: uplink/downlink frame counters. The MAC library owns the real
/// counters; this core only surfaces what `mcps_confirm`/`mcps_indication`
/// last reported (see DESIGN.md — no dedicated MIB item for frame counters
/// in `MacMib`).
pub fn frmcnt_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.last_uplink_counter as i32);
    v.push(b',').ok();
    write_i32(&mut v, ctx.radio.last_downlink_counter as i32);
    Ok(Some(v))
}

pub fn msize<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let info = ctx.lrw.mac().query_tx_possible(0);
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, info.max_size as i32);
    Ok(Some(v))
}

/// `+RFQ`: last-heard downlink radio quality (rssi,snr); 0,0 before any
/// downlink has been received.
pub fn rfq<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.last_rssi as i32);
    v.push(b',').ok();
    write_i32(&mut v, ctx.radio.last_snr as i32);
    Ok(Some(v))
}

pub fn backoff_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.backoff_ms as i32);
    Ok(Some(v))
}

pub fn backoff_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.radio.backoff_ms = v;
    Ok(None)
}

pub fn session<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.lrw.is_activated() as i32);
    v.push(b',').ok();
    write_i32(&mut v, ctx.otaa as i32);
    v.push(b',').ok();
    write_i32(&mut v, ctx.lrw.region().0 as i32);
    Ok(Some(v))
}

pub fn activated<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if ctx.lrw.is_activated() { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

/// `$PING`: a zero-length confirmed uplink on the configured port, used as a
/// connectivity probe.
pub fn ping<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let port = ctx.sysconf.get().default_port;
    ctx.lrw.send(port, &[], true)?;
    Ok(None)
}

pub fn cert_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if ctx.radio.cert_enabled { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn cert_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.radio.cert_enabled = v != 0;
    ctx.lrw.set_cert_port(ctx.radio.cert_enabled, ctx.radio.cert_port);
    Ok(None)
}

/// `$CW`: continuous-wave radio test transmission. Out of this core's scope
/// (the radio driver, not the MAC library, runs CW) — accepted but not
/// actionable without a `Radio` trait, so it reports "not supported in this
/// region" rather than silently pretending to transmit.
pub fn cw<M: MacService, R: RawStore, U: Unique>(_ctx: &mut Ctx<M, R, U>, _args: &[u8]) -> CmdResult {
    Err(AtErr::NOT_SUPPORTED_IN_REGION)
}

/// `$CM`: continuous modulation test transmission; same scope note as `$CW`.
pub fn cm<M: MacService, R: RawStore, U: Unique>(_ctx: &mut Ctx<M, R, U>, _args: &[u8]) -> CmdResult {
    Err(AtErr::NOT_SUPPORTED_IN_REGION)
}

/// `$TIME`: current GPS/network time, if `$DEVTIME` has completed a sync;
/// otherwise `0`.
pub fn time<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.network_time_s as i32);
    Ok(Some(v))
}
