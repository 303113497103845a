//! Identity & platform commands: firmware version, device
//! UID, UART config, reboot/sleep/factory-reset, NVM register peek/poke.

use heapless::Vec;

use super::{CmdResult, Ctx};
use crate::atci::AtciParam;
use crate::error::AtErr;
use crate::hal::{RawStore, Unique};
use crate::sysconf::{DataFormat, UartBaud};

const FW_VERSION: &[u8] = b"1.0.0";

pub fn ver<M, R, U>(_ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut v: Vec<u8, 96> = Vec::new();
    v.extend_from_slice(FW_VERSION).ok();
    Ok(Some(v))
}

pub fn dollar_ver<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    ver(ctx)
}

pub fn dev<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let id = ctx.unique.id();
    let mut v: Vec<u8, 96> = Vec::new();
    for b in id {
        push_hex_byte(&mut v, b);
    }
    Ok(Some(v))
}

fn push_hex_byte(v: &mut Vec<u8, 96>, b: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    v.push(HEX[(b >> 4) as usize]).ok();
    v.push(HEX[(b & 0xf) as usize]).ok();
}

pub fn uart_read<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut v: Vec<u8, 96> = Vec::new();
    crate::atci::write_decimal(&mut v, ctx.sysconf.get().uart_baud.value() as i32);
    Ok(Some(v))
}

pub fn uart_set<M, R, U>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut p = AtciParam::new(args);
    let baud = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    let baud = UartBaud::from_value(baud).ok_or(AtErr::INVALID_VALUE)?;
    ctx.sysconf.update(|d| d.uart_baud = baud);
    Ok(None)
}

/// `+REBOOT`: graceful, reply flushed first. `+REBOOT=1`: immediate, unclean.
pub fn reboot<M, R, U>(ctx: &mut Ctx<M, R, U>, args: Option<&[u8]>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let immediate = match args {
        None => false,
        Some(a) => {
            let mut p = AtciParam::new(a);
            p.get_uint() == Some(1)
        }
    };
    ctx.schedule_reset = Some(if immediate { super::ResetKind::Immediate } else { super::ResetKind::Graceful });
    Ok(None)
}

pub fn facnew<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    ctx.nvm.erase().map_err(crate::error::NvmError::from)?;
    ctx.schedule_reset = Some(super::ResetKind::Graceful);
    Ok(None)
}

pub fn halt<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    ctx.schedule_reset = Some(super::ResetKind::Halt);
    Ok(None)
}

pub fn to_read<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut v: Vec<u8, 96> = Vec::new();
    crate::atci::write_decimal(&mut v, ctx.sysconf.get().uart_timeout_ms as i32);
    Ok(Some(v))
}

pub fn to_set<M, R, U>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut p = AtciParam::new(args);
    let ms = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if ms > u16::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    ctx.sysconf.update(|d| d.uart_timeout_ms = ms as u16);
    Ok(None)
}

pub fn sleep_read<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if ctx.sysconf.get().sleep_allowed { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn sleep_set<M, R, U>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    ctx.sysconf.update(|d| d.sleep_allowed = v != 0);
    Ok(None)
}

pub fn dformat_read<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut v: Vec<u8, 96> = Vec::new();
    v.push(if matches!(ctx.sysconf.get().data_format, DataFormat::Hex) { b'1' } else { b'0' }).ok();
    Ok(Some(v))
}

pub fn dformat_set<M, R, U>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut p = AtciParam::new(args);
    let v = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    let fmt = if v != 0 { DataFormat::Hex } else { DataFormat::Binary };
    ctx.sysconf.update(|d| d.data_format = fmt);
    ctx.lrw.set_data_format(fmt);
    Ok(None)
}

/// `$LOCKKEYS`: one-way. Locking is the only effect; unlocking is silently
/// ignored by `SysConf::update`.
pub fn lockkeys<M, R, U>(ctx: &mut Ctx<M, R, U>) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    ctx.sysconf.update(|d| d.keys_locked = true);
    Ok(None)
}

/// `$NVM <index>[,<value>]`: raw peek/poke into the user-register block.
pub fn nvm<M, R, U>(ctx: &mut Ctx<M, R, U>, args: &[u8]) -> CmdResult
where
    M: crate::hal::MacService,
    R: RawStore,
    U: Unique,
{
    let mut p = AtciParam::new(args);
    let index = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
    if index > u8::MAX as u32 {
        return Err(AtErr::INVALID_VALUE);
    }
    if p.is_comma() {
        let value = p.get_uint().ok_or(AtErr::WRONG_ARITY)?;
        if value > u8::MAX as u32 {
            return Err(AtErr::INVALID_VALUE);
        }
        ctx.usernvm.set(&mut ctx.nvm, index as u8, value as u8).map_err(|_| AtErr::INVALID_VALUE)?;
        Ok(None)
    } else {
        let value = ctx.usernvm.get(index as u8).ok_or(AtErr::INVALID_VALUE)?;
        let mut v: Vec<u8, 96> = Vec::new();
        crate::atci::write_decimal(&mut v, value as i32);
        Ok(Some(v))
    }
}
