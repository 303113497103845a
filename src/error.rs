//! Host-facing error taxonomy and the internal error enums
//! that get mapped onto it.

use crate::hal::MacStatus;

/// The stable, negative, host-facing AT error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtErr(pub i32);

impl AtErr {
    pub const UNKNOWN_COMMAND: AtErr = AtErr(-1);
    pub const WRONG_ARITY: AtErr = AtErr(-2);
    pub const INVALID_VALUE: AtErr = AtErr(-3);
    pub const FACNEW_FAILED: AtErr = AtErr(-4);
    pub const NOT_JOINED: AtErr = AtErr(-5);
    pub const ALREADY_JOINED: AtErr = AtErr(-6);
    pub const BUSY: AtErr = AtErr(-7);
    pub const FIRMWARE_UPDATE_8: AtErr = AtErr(-8);
    pub const FIRMWARE_UPDATE_9: AtErr = AtErr(-9);
    pub const FIRMWARE_UPDATE_10: AtErr = AtErr(-10);
    pub const FIRMWARE_UPDATE_11: AtErr = AtErr(-11);
    pub const PAYLOAD_TOO_LONG: AtErr = AtErr(-12);
    pub const ONLY_IN_ABP: AtErr = AtErr(-13);
    pub const ONLY_IN_OTAA: AtErr = AtErr(-14);
    pub const REGION_NOT_SUPPORTED: AtErr = AtErr(-15);
    pub const TX_POWER_TOO_HIGH: AtErr = AtErr(-16);
    pub const NOT_SUPPORTED_IN_REGION: AtErr = AtErr(-17);
    pub const DUTY_CYCLE_RESTRICTED: AtErr = AtErr(-18);
    pub const NO_FREE_CHANNEL: AtErr = AtErr(-19);
    pub const TOO_MANY_LINK_CHECKS: AtErr = AtErr(-20);
    pub const KEY_ACCESS_DENIED: AtErr = AtErr(-50);
    pub const REATTACH_DENIED: AtErr = AtErr(-51);
}

/// Fixed MAC-status-to-ATCI-code mapping table.
impl From<MacStatus> for AtErr {
    fn from(status: MacStatus) -> Self {
        match status {
            MacStatus::Ok => AtErr(0),
            MacStatus::Busy => AtErr::BUSY,
            MacStatus::NotJoined => AtErr::NOT_JOINED,
            MacStatus::AlreadyJoined => AtErr::ALREADY_JOINED,
            MacStatus::RegionNotSupported => AtErr::REGION_NOT_SUPPORTED,
            MacStatus::TxPowerTooHigh => AtErr::TX_POWER_TOO_HIGH,
            MacStatus::NotSupportedInRegion => AtErr::NOT_SUPPORTED_IN_REGION,
            MacStatus::DutyCycleRestricted => AtErr::DUTY_CYCLE_RESTRICTED,
            MacStatus::NoFreeChannel => AtErr::NO_FREE_CHANNEL,
            MacStatus::TooManyLinkChecksQueued => AtErr::TOO_MANY_LINK_CHECKS,
            MacStatus::PayloadTooLong => AtErr::PAYLOAD_TOO_LONG,
            MacStatus::OnlyInAbp => AtErr::ONLY_IN_ABP,
            MacStatus::OnlyInOtaa => AtErr::ONLY_IN_OTAA,
            MacStatus::KeyAccessDenied => AtErr::KEY_ACCESS_DENIED,
            MacStatus::ReattachDenied => AtErr::REATTACH_DENIED,
            MacStatus::Error => AtErr::INVALID_VALUE,
        }
    }
}

/// Internal NVM-layer failure, never surfaced to the host directly; command
/// handlers that can trigger one (currently only `facnew`/`+BAND`'s erase)
/// translate it to `AtErr::FACNEW_FAILED`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum NvmError {
    NotFormatted,
    CorruptTable,
    WriteVerifyFailed,
}

impl From<crate::nvm::NvmError> for NvmError {
    fn from(e: crate::nvm::NvmError) -> Self {
        match e {
            crate::nvm::NvmError::NotFormatted => NvmError::NotFormatted,
            crate::nvm::NvmError::WriteVerifyFailed => NvmError::WriteVerifyFailed,
            _ => NvmError::CorruptTable,
        }
    }
}

impl From<NvmError> for AtErr {
    fn from(_: NvmError) -> Self {
        AtErr::FACNEW_FAILED
    }
}

/// Internal link-layer failure; `Link::poll_overrun` raises it once per
/// RX-overflow event for the main loop to log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkError {
    Overrun,
}
