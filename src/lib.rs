//! Core firmware for a LoRaWAN end-device AT modem.
//!
//! This crate is the board-independent half of the modem: the serial
//! command link, the AT command catalogue, the NVM block and the adapter
//! onto a LoRaWAN MAC library. It is built `no_std` and has no allocator;
//! everything on the data path lives in fixed-capacity `heapless`
//! collections. A board-support binary supplies the trait implementations
//! in [`hal`] (radio driver, UART DMA, RTC, unique ID) and drives [`sys`]'s
//! main-loop pass from its own `loop {}` plus interrupt handlers.
#![cfg_attr(not(test), no_std)]

pub mod atci;
pub mod cbuf;
pub mod cmd;
pub mod error;
pub mod hal;
pub mod link;
pub(crate) mod log;
pub mod lrw;
pub mod nvm;
pub mod sys;
pub mod sysconf;
pub mod usernvm;
pub mod wakelock;

pub use cmd::Cmd;
pub use sys::Sys;
