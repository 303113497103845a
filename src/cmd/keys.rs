//! Activation mode & key-material commands. Key *reads* are
//! rejected with `-50` once `SysConf.keys_locked` is set; writes are always
//! allowed (locking only protects readback).

use heapless::Vec;

use super::{CmdResult, Ctx};
use crate::atci::AtciParam;
use crate::error::AtErr;
use crate::hal::{MacService, RawStore, Unique};

fn push_hex(v: &mut Vec<u8, 96>, bytes: &[u8]) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for b in bytes {
        v.push(HEX[(b >> 4) as usize]).ok();
        v.push(HEX[(b & 0xf) as usize]).ok();
    }
}

fn read_hex<const N: usize>(args: &[u8]) -> Result<[u8; N], AtErr> {
    let mut p = AtciParam::new(args);
    let mut out = [0u8; N];
    let n = p.get_hex(&mut out, N * 2).ok_or(AtErr::INVALID_VALUE)?;
    if n != N {
        return Err(AtErr::INVALID_VALUE);
    }
    Ok(out)
}

fn keys_locked<M: MacService, R: RawStore, U: Unique>(ctx: &Ctx<M, R, U>) -> bool {
    ctx.sysconf.get().keys_locked
}

/// `+MODE`: `0` = ABP, `1` = OTAA (read/write the activation-mode bit that
/// gates which `activate_*` entry `+JOIN` uses).
pub fn mode_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if ctx.otaa { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn mode_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.otaa = v != 0;
    Ok(None)
}

pub fn devaddr_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    if keys_locked(ctx) {
        return Err(AtErr::KEY_ACCESS_DENIED);
    }
    let mut v: Vec<u8, 96> = Vec::new();
    push_hex(&mut v, &ctx.lrw.mac().devaddr().to_be_bytes());
    Ok(Some(v))
}

pub fn devaddr_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let bytes: [u8; 4] = read_hex(args)?;
    ctx.lrw.mac_mut().set_devaddr(u32::from_be_bytes(bytes));
    Ok(None)
}

pub fn deveui_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    if keys_locked(ctx) {
        return Err(AtErr::KEY_ACCESS_DENIED);
    }
    let mut v: Vec<u8, 96> = Vec::new();
    push_hex(&mut v, &ctx.lrw.mac().deveui());
    Ok(Some(v))
}

pub fn deveui_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let bytes: [u8; 8] = read_hex(args)?;
    ctx.lrw.mac_mut().set_deveui(bytes);
    Ok(None)
}

pub fn joineui_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    if keys_locked(ctx) {
        return Err(AtErr::KEY_ACCESS_DENIED);
    }
    let mut v: Vec<u8, 96> = Vec::new();
    push_hex(&mut v, &ctx.lrw.mac().joineui());
    Ok(Some(v))
}

pub fn joineui_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let bytes: [u8; 8] = read_hex(args)?;
    ctx.lrw.mac_mut().set_joineui(bytes);
    Ok(None)
}

pub fn netid_read<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>) -> CmdResult {
    if keys_locked(ctx) {
        return Err(AtErr::KEY_ACCESS_DENIED);
    }
    let mut v: Vec<u8, 96> = Vec::new();
    push_hex(&mut v, &ctx.lrw.mac().netid().to_be_bytes()[1..]);
    Ok(Some(v))
}

pub fn netid_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let mut p = AtciParam::new(args);
    let mut out = [0u8; 3];
    let n = p.get_hex(&mut out, 6).ok_or(AtErr::INVALID_VALUE)?;
    if n != 3 {
        return Err(AtErr::INVALID_VALUE);
    }
    let netid = u32::from_be_bytes([0, out[0], out[1], out[2]]);
    ctx.lrw.mac_mut().set_netid(netid);
    Ok(None)
}

/// `+APPKEY`: LoRaWAN 1.0 dual-writes `NwkKey` and `AppKey`. `$APPKEY`
/// (1.1) writes only `AppKey`; dispatched by `dual_write`.
pub fn appkey_set<M: MacService, R: RawStore, U: Unique>(
    ctx: &mut Ctx<M, R, U>,
    args: &[u8],
    dual_write: bool,
) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_appkey(key);
    if dual_write {
        ctx.lrw.mac_mut().set_nwkkey(key);
    }
    Ok(None)
}

pub fn nwkkey_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_nwkkey(key);
    Ok(None)
}

/// `+NWKSKEY`: LoRaWAN 1.0 writes `NwkSEncKey`, `FNwkSIntKey`, and
/// `SNwkSIntKey` all to the same value (the pre-1.1 single network key).
pub fn nwkskey_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_nwkskey(key);
    ctx.lrw.mac_mut().set_fnwksintkey(key);
    ctx.lrw.mac_mut().set_snwksintkey(key);
    ctx.lrw.mac_mut().set_nwksenckey(key);
    Ok(None)
}

pub fn appskey_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_appskey(key);
    Ok(None)
}

pub fn fnwksintkey_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_fnwksintkey(key);
    Ok(None)
}

pub fn snwksintkey_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_snwksintkey(key);
    Ok(None)
}

pub fn nwksenckey_set<M: MacService, R: RawStore, U: Unique>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult {
    let key: [u8; 16] = read_hex(args)?;
    ctx.lrw.mac_mut().set_nwksenckey(key);
    Ok(None)
}

