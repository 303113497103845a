//! Region & radio-policy commands. Most of these are thin
//! wrappers over `Lrw`'s MIB passthrough; a handful (`+NWK`, `+RFPARAM`,
//! `+DUTYCYCLE`, `+CST`, `+DR`, `+RFPOWER`) have no counterpart in
//! [`crate::hal::MacMib`] and are tracked locally in [`super::RadioState`]
//! (see DESIGN.md).

use heapless::Vec;

use super::{CmdResult, Ctx};
use crate::atci::AtciParam;
use crate::error::AtErr;
use crate::hal::{MacMib, MacService, RawStore, Region, Unique};

fn write_i32(v: &mut Vec<u8, 96>, n: i32) {
    crate::atci::write_decimal(v, n);
}

pub fn band_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.lrw.region().0 as i32);
    Ok(Some(v))
}

/// A successful band change that actually alters the active region schedules
/// a factory reset: session, channel
/// plan and calibration state are no longer valid for the new region.
pub fn band_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let n = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if n > u8::MAX as u32 {
        return Err(AtErr::REGION_NOT_SUPPORTED);
    }
    let new_region = Region(n as u8);
    let old_region = ctx.lrw.region();
    if !ctx.lrw.set_region(new_region) {
        return Err(AtErr::REGION_NOT_SUPPORTED);
    }
    if old_region != new_region {
        ctx.nvm.erase().map_err(crate::error::NvmError::from)?;
        ctx.schedule_reset = Some(super::ResetKind::Graceful);
    }
    Ok(None)
}

pub fn dr_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.datarate as i32);
    Ok(Some(v))
}

pub fn dr_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if v > 15 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.radio.datarate = v as u8;
    Ok(None)
}

pub fn rfpower_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.tx_power as i32);
    Ok(Some(v))
}

pub fn rfpower_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_int().ok_or(AtErr::WRONG_ARITY)?;
    if !(0..=20).contains(&v) {
        return Err(AtErr::TX_POWER_TOO_HIGH);
    }
    ctx.radio.tx_power = v as i8;
    Ok(None)
}

/// `+NWK`: `0` private sync word, `1` public (the LoRaWAN-Alliance default).
pub fn nwk_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if ctx.radio.nwk_public { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn nwk_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.radio.nwk_public = v != 0;
    Ok(None)
}

pub fn chmask_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mask = ctx.lrw.channel_mask();
    let mut v: Vec<u8, 96> = Vec::new();
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for b in mask {
        v.push(HEX[(b >> 4) as usize]).ok();
        v.push(HEX[(b & 0xf) as usize]).ok();
    }
    Ok(Some(v))
}

pub fn chmask_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let mut mask = [0u8; 16];
    let n = p.get_hex(&mut mask, 32).ok_or(AtErr::INVALID_VALUE)?;
    if n != 16 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.set_channel_mask(mask)?;
    Ok(None)
}

/// `+RFPARAM=<add|remove>,<index>`: enable/disable one channel index in the
/// locally-tracked channel set.
pub fn rfparam_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let op = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let idx = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if idx > 127 {
        return Err(AtErr::INVALID_VALUE);
    }
    let byte = (idx / 8) as usize;
    let bit = 1u8 << (idx % 8);
    match op {
        0 => ctx.radio.channels[byte] &= !bit,
        1 => ctx.radio.channels[byte] |= bit,
        _ => return Err(AtErr::INVALID_VALUE),
    }
    Ok(None)
}

pub fn dutycycle_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if ctx.radio.dutycycle { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn dutycycle_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.radio.dutycycle = v != 0;
    Ok(None)
}

pub fn dwell_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let (up, down) = ctx.lrw.dwell();
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if up { b'1' } else { b'0' }).ok();
    v.push(b',').ok();
    v.push(if down { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn dwell_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let up = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let down = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.lrw.set_dwell(up != 0, down != 0)?;
    Ok(None)
}

pub fn maxeirp_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.lrw.max_eirp() as i32);
    Ok(Some(v))
}

pub fn maxeirp_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_int().ok_or(AtErr::WRONG_ARITY)?;
    if !(-128..=127).contains(&v) {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.set_max_eirp(v as i8)?;
    Ok(None)
}

pub fn adr_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::Adr(on) = ctx.lrw.mib_get(MacMib::Adr(false)) {
        v.push(if on { b'1' } else { b'0' }).ok();
    }
    Ok(Some(v))
}

pub fn adr_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.lrw.mib_set(MacMib::Adr(v != 0))?;
    Ok(None)
}

pub fn adrack_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::AdrAckLimit(n) = ctx.lrw.mib_get(MacMib::AdrAckLimit(0)) {
        write_i32(&mut v, n as i32);
    }
    Ok(Some(v))
}

pub fn adrack_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if v > u16::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.mib_set(MacMib::AdrAckLimit(v as u16))?;
    Ok(None)
}

pub fn delay_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::Delay { rx1, rx2 } = ctx.lrw.mib_get(MacMib::Delay { rx1: 0, rx2: 0 }) {
        write_i32(&mut v, rx1 as i32);
        v.push(b',').ok();
        write_i32(&mut v, rx2 as i32);
    }
    Ok(Some(v))
}

pub fn delay_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let rx1 = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let rx2 = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if rx1 > u16::MAX as u32 || rx2 > u16::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.mib_set(MacMib::Delay { rx1: rx1 as u16, rx2: rx2 as u16 })?;
    Ok(None)
}

pub fn rx2_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::Rx2 { freq, datarate } = ctx.lrw.mib_get(MacMib::Rx2 { freq: 0, datarate: 0 }) {
        write_i32(&mut v, freq as i32);
        v.push(b',').ok();
        write_i32(&mut v, datarate as i32);
    }
    Ok(Some(v))
}

pub fn rx2_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let freq = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let dr = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if dr > 15 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.mib_set(MacMib::Rx2 { freq, datarate: dr as u8 })?;
    Ok(None)
}

pub fn rep_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::Repeat(n) = ctx.lrw.mib_get(MacMib::Repeat(0)) {
        write_i32(&mut v, n as i32);
    }
    Ok(Some(v))
}

pub fn rep_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if v > u8::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.mib_set(MacMib::Repeat(v as u8))?;
    Ok(None)
}

pub fn rtynum_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::RetryCount { unconfirmed, confirmed } =
        ctx.lrw.mib_get(MacMib::RetryCount { unconfirmed: 0, confirmed: 0 })
    {
        write_i32(&mut v, unconfirmed as i32);
        v.push(b',').ok();
        write_i32(&mut v, confirmed as i32);
    }
    Ok(Some(v))
}

pub fn rtynum_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let unconfirmed = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if !p.is_comma() {
        return Err(AtErr::WRONG_ARITY);
    }
    let confirmed = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if unconfirmed > u8::MAX as u32 || confirmed > u8::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.mib_set(MacMib::RetryCount { unconfirmed: unconfirmed as u8, confirmed: confirmed as u8 })?;
    ctx.lrw.set_retries(unconfirmed as u8, confirmed as u8);
    ctx.sysconf.update(|d| {
        d.unconfirmed_retx = unconfirmed as u8;
        d.confirmed_retx = confirmed as u8;
    });
    Ok(None)
}

pub fn rssith_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    if let MacMib::RssiThreshold(n) = ctx.lrw.mib_get(MacMib::RssiThreshold(0)) {
        write_i32(&mut v, n as i32);
    }
    Ok(Some(v))
}

pub fn rssith_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_int().ok_or(AtErr::WRONG_ARITY)?;
    if !(-200..=0).contains(&v) {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.lrw.mib_set(MacMib::RssiThreshold(v as i16))?;
    Ok(None)
}

/// `+CST`: carrier-sense threshold in dBm; purely local, no MIB counterpart.
pub fn cst_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    write_i32(&mut v, ctx.radio.cst_dbm as i32);
    Ok(Some(v))
}

pub fn cst_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_int().ok_or(AtErr::WRONG_ARITY)?;
    if !(-128..=0).contains(&v) {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.radio.cst_dbm = v as i16;
    Ok(None)
}
