//! Typed, CRC-sealed system configuration record.
//!
//! Owned by the main task; persisted in the `sysconf` partition. A `dirty`
//! flag is set by every setter; the main loop's `flush()` call writes the
//! whole record back only when the stored CRC no longer matches.

use crate::hal::RawStore;
use crate::nvm::{Nvm, Partition};
use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const PARTITION_LABEL: &[u8] = b"sysconf";
const RECORD_LEN: usize = 10;
const SEALED_LEN: usize = RECORD_LEN + 4; // + CRC-32

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UartBaud {
    B4800,
    B9600,
    B19200,
    B38400,
}

impl UartBaud {
    fn code(self) -> u8 {
        match self {
            UartBaud::B4800 => 0,
            UartBaud::B9600 => 1,
            UartBaud::B19200 => 2,
            UartBaud::B38400 => 3,
        }
    }

    fn from_code(c: u8) -> Option<Self> {
        match c {
            0 => Some(UartBaud::B4800),
            1 => Some(UartBaud::B9600),
            2 => Some(UartBaud::B19200),
            3 => Some(UartBaud::B38400),
            _ => None,
        }
    }

    pub fn from_value(v: u32) -> Option<Self> {
        match v {
            4800 => Some(UartBaud::B4800),
            9600 => Some(UartBaud::B9600),
            19200 => Some(UartBaud::B19200),
            38400 => Some(UartBaud::B38400),
            _ => None,
        }
    }

    pub fn value(self) -> u32 {
        match self {
            UartBaud::B4800 => 4800,
            UartBaud::B9600 => 9600,
            UartBaud::B19200 => 19200,
            UartBaud::B38400 => 38400,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    Binary,
    Hex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    A,
    B,
    C,
}

impl From<DeviceClass> for crate::hal::DeviceClass {
    fn from(c: DeviceClass) -> Self {
        match c {
            DeviceClass::A => crate::hal::DeviceClass::A,
            DeviceClass::B => crate::hal::DeviceClass::B,
            DeviceClass::C => crate::hal::DeviceClass::C,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SysConfData {
    pub uart_baud: UartBaud,
    pub uart_timeout_ms: u16,
    pub default_port: u8,
    pub data_format: DataFormat,
    pub sleep_allowed: bool,
    pub device_class: DeviceClass,
    pub unconfirmed_retx: u8,
    pub confirmed_retx: u8,
    pub keys_locked: bool,
    pub async_events: bool,
}

impl Default for SysConfData {
    fn default() -> Self {
        Self {
            uart_baud: UartBaud::B19200,
            uart_timeout_ms: 1000,
            default_port: 1,
            data_format: DataFormat::Binary,
            sleep_allowed: true,
            device_class: DeviceClass::A,
            unconfirmed_retx: 1,
            confirmed_retx: 1,
            keys_locked: false,
            async_events: true,
        }
    }
}

impl SysConfData {
    fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0] = self.uart_baud.code();
        buf[1..3].copy_from_slice(&self.uart_timeout_ms.to_be_bytes());
        buf[3] = self.default_port;
        buf[4] = matches!(self.data_format, DataFormat::Hex) as u8;
        buf[5] = self.sleep_allowed as u8;
        buf[6] = match self.device_class {
            DeviceClass::A => 0,
            DeviceClass::B => 1,
            DeviceClass::C => 2,
        };
        buf[7] = self.unconfirmed_retx;
        buf[8] = self.confirmed_retx;
        // keys_locked and async_events share the final byte: two flags.
        buf[9] = (self.keys_locked as u8) | ((self.async_events as u8) << 1);
        buf
    }

    fn decode(buf: &[u8; RECORD_LEN]) -> Option<Self> {
        Some(Self {
            uart_baud: UartBaud::from_code(buf[0])?,
            uart_timeout_ms: u16::from_be_bytes([buf[1], buf[2]]),
            default_port: buf[3],
            data_format: if buf[4] != 0 { DataFormat::Hex } else { DataFormat::Binary },
            sleep_allowed: buf[5] != 0,
            device_class: match buf[6] {
                0 => DeviceClass::A,
                1 => DeviceClass::B,
                2 => DeviceClass::C,
                _ => return None,
            },
            unconfirmed_retx: buf[7],
            confirmed_retx: buf[8],
            keys_locked: buf[9] & 1 != 0,
            async_events: buf[9] & 2 != 0,
        })
    }
}

pub struct SysConf {
    data: SysConfData,
    dirty: bool,
    partition: Partition,
}

impl SysConf {
    fn crc_of(record: &[u8; RECORD_LEN]) -> u32 {
        CRC32.checksum(record)
    }

    fn load<R: RawStore>(nvm: &Nvm<R>, partition: &Partition) -> Option<SysConfData> {
        let mut sealed = [0u8; SEALED_LEN];
        nvm.read(partition, 0, &mut sealed).ok()?;
        let mut record = [0u8; RECORD_LEN];
        record.copy_from_slice(&sealed[..RECORD_LEN]);
        let stored_crc = u32::from_be_bytes(sealed[RECORD_LEN..].try_into().ok()?);
        if Self::crc_of(&record) != stored_crc {
            return None;
        }
        SysConfData::decode(&record)
    }

    /// Open the `sysconf` partition (creating it if this is a fresh block),
    /// reading and CRC-checking the record; on mismatch or absence, falls
    /// back to compiled defaults.
    pub fn init<R: RawStore>(nvm: &mut Nvm<R>) -> Self {
        let partition = match nvm.find(PARTITION_LABEL) {
            Some(p) => p,
            None => nvm
                .create(PARTITION_LABEL, SEALED_LEN as u32)
                .expect("sysconf partition creation"),
        };
        let data = Self::load(nvm, &partition).unwrap_or_default();
        let mut conf = Self { data, dirty: false, partition };
        if Self::load(nvm, &conf.partition).is_none() {
            crate::log::warn!("sysconf: CRC mismatch or empty record, falling back to defaults");
            conf.dirty = true; // defaults were never persisted; seed the block.
        }
        conf
    }

    pub fn get(&self) -> &SysConfData {
        &self.data
    }

    /// Apply `f` to the record and mark it dirty. `keys_locked` is a
    /// one-way-set flag: clearing it is rejected silently.
    pub fn update(&mut self, f: impl FnOnce(&mut SysConfData)) {
        let was_locked = self.data.keys_locked;
        f(&mut self.data);
        if was_locked {
            self.data.keys_locked = true;
        }
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Called once per main-loop pass: writes the record back only if dirty
    /// and the computed CRC actually differs from what's persisted.
    pub fn flush<R: RawStore>(&mut self, nvm: &mut Nvm<R>) {
        if !self.dirty {
            return;
        }
        let record = self.data.encode();
        let crc = Self::crc_of(&record);
        let mut sealed = [0u8; SEALED_LEN];
        sealed[..RECORD_LEN].copy_from_slice(&record);
        sealed[RECORD_LEN..].copy_from_slice(&crc.to_be_bytes());
        if nvm.write(&self.partition, 0, &sealed).is_ok() {
            self.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvm::test_support::MemStore;

    fn fresh_nvm() -> Nvm<MemStore> {
        Nvm::format(MemStore::new(4096)).unwrap()
    }

    #[test]
    fn missing_partition_falls_back_to_defaults() {
        let mut nvm = fresh_nvm();
        let conf = SysConf::init(&mut nvm);
        assert_eq!(conf.get().uart_baud, UartBaud::B19200);
    }

    #[test]
    fn config_round_trips_through_flush_and_reinit() {
        let mut nvm = fresh_nvm();
        let mut conf = SysConf::init(&mut nvm);
        conf.update(|d| {
            d.uart_baud = UartBaud::B38400;
            d.default_port = 42;
        });
        conf.flush(&mut nvm);
        assert!(!conf.is_dirty());

        // "reboot": drop and reload from the same nvm.
        let reloaded = SysConf::init(&mut nvm);
        assert_eq!(reloaded.get().uart_baud, UartBaud::B38400);
        assert_eq!(reloaded.get().default_port, 42);
    }

    #[test]
    fn corrupt_crc_resets_to_defaults() {
        let mut nvm = fresh_nvm();
        let mut conf = SysConf::init(&mut nvm);
        conf.update(|d| d.default_port = 99);
        conf.flush(&mut nvm);

        // Stomp the persisted CRC bytes directly so the record no longer
        // checksums, forcing the next init() to fall back to defaults.
        let part = nvm.find(PARTITION_LABEL).unwrap();
        nvm.write(&part, RECORD_LEN as u32, &[0, 0, 0, 0]).unwrap();

        let reloaded = SysConf::init(&mut nvm);
        assert_eq!(reloaded.get().default_port, SysConfData::default().default_port);
    }

    #[test]
    fn keys_locked_is_one_way() {
        let mut nvm = fresh_nvm();
        let mut conf = SysConf::init(&mut nvm);
        conf.update(|d| d.keys_locked = true);
        conf.update(|d| d.keys_locked = false);
        assert!(conf.get().keys_locked);
    }
}
