//! 64 byte-sized user registers, magic-prefixed and CRC-sealed,
//! addressable by index 0..63 from `$NVM`.

use crate::hal::RawStore;
use crate::nvm::{Nvm, Partition};
use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const MAGIC: u32 = 0x5553_4552; // "USER"
pub const NUM_REGISTERS: usize = 64;
pub const PARTITION_LABEL: &[u8] = b"user";
const SEALED_LEN: usize = 4 + NUM_REGISTERS + 4; // magic + registers + crc

pub struct UserNvm {
    registers: [u8; NUM_REGISTERS],
    partition: Partition,
}

impl UserNvm {
    pub fn init<R: RawStore>(nvm: &mut Nvm<R>) -> Self {
        let partition = match nvm.find(PARTITION_LABEL) {
            Some(p) => p,
            None => nvm.create(PARTITION_LABEL, SEALED_LEN as u32).expect("user partition creation"),
        };
        let registers = Self::load(nvm, &partition).unwrap_or([0u8; NUM_REGISTERS]);
        Self { registers, partition }
    }

    fn load<R: RawStore>(nvm: &Nvm<R>, partition: &Partition) -> Option<[u8; NUM_REGISTERS]> {
        let mut sealed = [0u8; SEALED_LEN];
        nvm.read(partition, 0, &mut sealed).ok()?;
        let magic = u32::from_be_bytes(sealed[0..4].try_into().ok()?);
        if magic != MAGIC {
            return None;
        }
        let mut regs = [0u8; NUM_REGISTERS];
        regs.copy_from_slice(&sealed[4..4 + NUM_REGISTERS]);
        let stored_crc = u32::from_be_bytes(sealed[4 + NUM_REGISTERS..].try_into().ok()?);
        if CRC32.checksum(&regs) != stored_crc {
            return None;
        }
        Some(regs)
    }

    pub fn get(&self, index: u8) -> Option<u8> {
        self.registers.get(index as usize).copied()
    }

    pub fn set<R: RawStore>(&mut self, nvm: &mut Nvm<R>, index: u8, value: u8) -> Result<(), ()> {
        let slot = self.registers.get_mut(index as usize).ok_or(())?;
        *slot = value;
        let mut sealed = [0u8; SEALED_LEN];
        sealed[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        sealed[4..4 + NUM_REGISTERS].copy_from_slice(&self.registers);
        let crc = CRC32.checksum(&self.registers);
        sealed[4 + NUM_REGISTERS..].copy_from_slice(&crc.to_be_bytes());
        nvm.write(&self.partition, 0, &sealed).map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvm::test_support::MemStore;

    #[test]
    fn out_of_range_index_rejected() {
        let mut nvm = Nvm::format(MemStore::new(4096)).unwrap();
        let mut user = UserNvm::init(&mut nvm);
        assert!(user.set(&mut nvm, 64, 1).is_err());
        assert_eq!(user.get(64), None);
    }

    #[test]
    fn set_then_get_persists_across_reinit() {
        let mut nvm = Nvm::format(MemStore::new(4096)).unwrap();
        let mut user = UserNvm::init(&mut nvm);
        user.set(&mut nvm, 3, 0x42).unwrap();
        assert_eq!(user.get(3), Some(0x42));

        let reloaded = UserNvm::init(&mut nvm);
        assert_eq!(reloaded.get(3), Some(0x42));
        assert_eq!(reloaded.get(0), Some(0));
    }
}
