//! NVM block: a partition table over a raw byte store, with per-byte
//! majority-of-five replication.
//!
//! The replication lives here, not in [`crate::hal::RawStore`]: the raw
//! store is a dumb contiguous byte region (5x the logical capacity); this
//! module is the one place that knows a logical byte maps to five physical
//! ones. See DESIGN.md for why the layering was drawn this way.

use crate::hal::RawStore;
use heapless::Vec;

pub const SIGNATURE: u32 = 0x1ABE_11ED;
pub const MAX_PARTS: usize = 16;
const LABEL_LEN: usize = 15;
const HEADER_SIZE: usize = 8;
const DESCRIPTOR_SIZE: usize = LABEL_LEN + 1 + 4 + 4; // label + len + start_offset + size
const REPLICAS: usize = 5;

/// Table size reserved at the front of the block: header plus `MAX_PARTS`
/// descriptor slots, enough for at least 16 partitions.
pub const TABLE_SIZE: usize = HEADER_SIZE + MAX_PARTS * DESCRIPTOR_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NvmError {
    NotFormatted,
    AlreadyFormatted,
    TableFull,
    DuplicateLabel,
    Overflow,
    NotFound,
    LabelTooLong,
    WriteVerifyFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    label: [u8; LABEL_LEN],
    label_len: u8,
    pub start_offset: u32,
    pub size: u32,
}

impl Descriptor {
    pub fn label(&self) -> &[u8] {
        &self.label[..self.label_len as usize]
    }
}

/// A re-resolvable reference to a partition: only the label is carried
/// across calls, never a raw offset, so it is always looked back up through
/// the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    label: [u8; LABEL_LEN],
    label_len: u8,
    pub size: u32,
}

impl Partition {
    pub fn label(&self) -> &[u8] {
        &self.label[..self.label_len as usize]
    }
}

fn majority(replicas: [u8; REPLICAS]) -> u8 {
    let mut out = 0u8;
    for bit in 0..8u8 {
        let mut count = 0;
        for r in replicas {
            if (r >> bit) & 1 == 1 {
                count += 1;
            }
        }
        if count >= 3 {
            out |= 1 << bit;
        }
    }
    out
}

fn make_label(s: &[u8]) -> Result<([u8; LABEL_LEN], u8), NvmError> {
    if s.len() > LABEL_LEN {
        return Err(NvmError::LabelTooLong);
    }
    let mut label = [0u8; LABEL_LEN];
    label[..s.len()].copy_from_slice(s);
    Ok((label, s.len() as u8))
}

pub struct Nvm<R: RawStore> {
    store: R,
    num_parts: u16,
    parts: Vec<Descriptor, MAX_PARTS>,
}

impl<R: RawStore> Nvm<R> {
    fn virt_size(store: &R) -> usize {
        store.size() / REPLICAS
    }

    fn read_bytes(store: &R, virt_offset: usize, out: &mut [u8]) {
        for (i, b) in out.iter_mut().enumerate() {
            let base = (virt_offset + i) * REPLICAS;
            let mut replicas = [0u8; REPLICAS];
            let mut one = [0u8; 1];
            for (r, slot) in replicas.iter_mut().enumerate() {
                store.read(base + r, &mut one);
                *slot = one[0];
            }
            *b = majority(replicas);
        }
    }

    fn write_bytes(store: &mut R, virt_offset: usize, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let base = (virt_offset + i) * REPLICAS;
            for r in 0..REPLICAS {
                store.write(base + r, &[b]);
            }
        }
    }

    fn read_header(store: &R) -> (u32, u16, u16) {
        let mut buf = [0u8; HEADER_SIZE];
        Self::read_bytes(store, 0, &mut buf);
        let sig = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let table_size = u16::from_be_bytes([buf[4], buf[5]]);
        let num_parts = u16::from_be_bytes([buf[6], buf[7]]);
        (sig, table_size, num_parts)
    }

    fn write_header(store: &mut R, num_parts: u16) {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&SIGNATURE.to_be_bytes());
        buf[4..6].copy_from_slice(&(TABLE_SIZE as u16).to_be_bytes());
        buf[6..8].copy_from_slice(&num_parts.to_be_bytes());
        Self::write_bytes(store, 0, &buf);
    }

    fn descriptor_offset(index: usize) -> usize {
        HEADER_SIZE + index * DESCRIPTOR_SIZE
    }

    fn read_descriptor(store: &R, index: usize) -> Descriptor {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        Self::read_bytes(store, Self::descriptor_offset(index), &mut buf);
        let mut label = [0u8; LABEL_LEN];
        label.copy_from_slice(&buf[..LABEL_LEN]);
        let label_len = buf[LABEL_LEN];
        let start_offset = u32::from_be_bytes([
            buf[LABEL_LEN + 1],
            buf[LABEL_LEN + 2],
            buf[LABEL_LEN + 3],
            buf[LABEL_LEN + 4],
        ]);
        let size = u32::from_be_bytes([
            buf[LABEL_LEN + 5],
            buf[LABEL_LEN + 6],
            buf[LABEL_LEN + 7],
            buf[LABEL_LEN + 8],
        ]);
        Descriptor { label, label_len, start_offset, size }
    }

    fn write_descriptor(store: &mut R, index: usize, d: &Descriptor) {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        buf[..LABEL_LEN].copy_from_slice(&d.label);
        buf[LABEL_LEN] = d.label_len;
        buf[LABEL_LEN + 1..LABEL_LEN + 5].copy_from_slice(&d.start_offset.to_be_bytes());
        buf[LABEL_LEN + 5..LABEL_LEN + 9].copy_from_slice(&d.size.to_be_bytes());
        Self::write_bytes(store, Self::descriptor_offset(index), &buf);
    }

    /// Open an already-formatted block: fails if the header signature
    /// doesn't match.
    pub fn open(store: R) -> Result<Self, NvmError> {
        let (sig, _table_size, num_parts) = Self::read_header(&store);
        if sig != SIGNATURE {
            crate::log::warn!("nvm: open found no valid signature");
            return Err(NvmError::NotFormatted);
        }
        crate::log::debug!("nvm: opened block with {} partitions", num_parts);
        let mut parts = Vec::new();
        for i in 0..num_parts as usize {
            let d = Self::read_descriptor(&store, i);
            parts.push(d).map_err(|_| NvmError::TableFull)?;
        }
        Ok(Self { store, num_parts, parts })
    }

    /// Format a virgin (or erased) block: refuses if a valid signature is
    /// already present.
    pub fn format(mut store: R) -> Result<Self, NvmError> {
        let (sig, _, _) = Self::read_header(&store);
        if sig == SIGNATURE {
            return Err(NvmError::AlreadyFormatted);
        }
        Self::write_header(&mut store, 0);
        crate::log::info!("nvm: formatted fresh block");
        Ok(Self { store, num_parts: 0, parts: Vec::new() })
    }

    /// Factory erase: fill the signature and every partition region with
    /// 0xFF, then invalidate the in-memory table. Reads the header back
    /// through the same majority vote `open()` uses to confirm the erase
    /// actually took before reporting success.
    pub fn erase(&mut self) -> Result<(), NvmError> {
        let virt_size = Self::virt_size(&self.store);
        let fill = [0xFFu8; 64];
        let mut off = 0;
        while off < virt_size {
            let n = fill.len().min(virt_size - off);
            Self::write_bytes(&mut self.store, off, &fill[..n]);
            off += n;
        }
        self.num_parts = 0;
        self.parts.clear();
        let (sig, _, _) = Self::read_header(&self.store);
        if sig == SIGNATURE {
            crate::log::warn!("nvm: factory erase verify failed, signature still present");
            return Err(NvmError::WriteVerifyFailed);
        }
        crate::log::warn!("nvm: factory erase complete");
        Ok(())
    }

    pub fn find(&self, label: &[u8]) -> Option<Partition> {
        self.parts.iter().find(|d| d.label() == label).map(|d| Partition {
            label: d.label,
            label_len: d.label_len,
            size: d.size,
        })
    }

    fn next_free_offset(&self) -> u32 {
        self.parts
            .iter()
            .map(|d| d.start_offset + d.size)
            .max()
            .unwrap_or(TABLE_SIZE as u32)
    }

    fn align4(v: u32) -> u32 {
        (v + 3) & !3
    }

    /// Append a new partition after the last one, 4-byte aligned. Refuses on
    /// overflow of the block or a duplicate label.
    pub fn create(&mut self, label: &[u8], size: u32) -> Result<Partition, NvmError> {
        if self.find(label).is_some() {
            return Err(NvmError::DuplicateLabel);
        }
        if self.parts.len() >= MAX_PARTS {
            return Err(NvmError::TableFull);
        }
        let (label_arr, label_len) = make_label(label)?;
        let start_offset = Self::align4(self.next_free_offset());
        let virt_size = Self::virt_size(&self.store) as u32;
        if start_offset.checked_add(size).is_none_or(|end| end > virt_size) {
            return Err(NvmError::Overflow);
        }
        let d = Descriptor { label: label_arr, label_len, start_offset, size };
        let index = self.parts.len();
        Self::write_descriptor(&mut self.store, index, &d);
        self.num_parts += 1;
        Self::write_header(&mut self.store, self.num_parts);
        self.parts.push(d).map_err(|_| NvmError::TableFull)?;
        Ok(Partition { label: label_arr, label_len, size })
    }

    fn resolve(&self, part: &Partition) -> Result<u32, NvmError> {
        self.parts
            .iter()
            .find(|d| d.label() == part.label())
            .map(|d| d.start_offset)
            .ok_or(NvmError::NotFound)
    }

    pub fn write(&mut self, part: &Partition, offset: u32, data: &[u8]) -> Result<(), NvmError> {
        let start = self.resolve(part)?;
        if offset + data.len() as u32 > part.size {
            return Err(NvmError::Overflow);
        }
        Self::write_bytes(&mut self.store, (start + offset) as usize, data);
        Ok(())
    }

    pub fn read(&self, part: &Partition, offset: u32, out: &mut [u8]) -> Result<(), NvmError> {
        let start = self.resolve(part)?;
        if offset + out.len() as u32 > part.size {
            return Err(NvmError::Overflow);
        }
        Self::read_bytes(&self.store, (start + offset) as usize, out);
        Ok(())
    }

    /// Memory-map the whole partition into `out` (must be at least
    /// `part.size` bytes); since the replicated store is not literally
    /// memory-mapped hardware, this reconstructs the decoded bytes.
    pub fn mmap(&self, part: &Partition, out: &mut [u8]) -> Result<(), NvmError> {
        self.read(part, 0, &mut out[..part.size as usize])
    }

    pub fn erase_partition(&mut self, part: &Partition) -> Result<(), NvmError> {
        let start = self.resolve(part)?;
        let fill = [0xFFu8; 64];
        let mut off = 0u32;
        while off < part.size {
            let n = (fill.len() as u32).min(part.size - off);
            Self::write_bytes(&mut self.store, (start + off) as usize, &fill[..n as usize]);
            off += n;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// In-memory `RawStore` for host-side tests: a plain byte vec sized
    /// `virt_size * 5`.
    pub struct MemStore {
        bytes: std::vec::Vec<u8>,
    }

    impl MemStore {
        pub fn new(virt_size: usize) -> Self {
            Self { bytes: std::vec![0u8; virt_size * REPLICAS] }
        }

        /// Flip bits directly in one physical replica, bypassing the
        /// majority layer — used to test corruption tolerance.
        pub fn corrupt_replica(&mut self, virt_offset: usize, replica: usize, value: u8) {
            self.bytes[virt_offset * REPLICAS + replica] = value;
        }
    }

    impl RawStore for MemStore {
        fn size(&self) -> usize {
            self.bytes.len()
        }
        fn read(&self, offset: usize, buf: &mut [u8]) {
            buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        }
        fn write(&mut self, offset: usize, data: &[u8]) {
            self.bytes[offset..offset + data.len()].copy_from_slice(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemStore;
    use super::*;

    fn fresh(virt_size: usize) -> Nvm<MemStore> {
        Nvm::format(MemStore::new(virt_size)).unwrap()
    }

    #[test]
    fn format_then_open_roundtrips() {
        let store = MemStore::new(4096);
        {
            let _nvm = Nvm::format(store).unwrap();
        }
    }

    #[test]
    fn format_refuses_if_already_signed() {
        let nvm = fresh(4096);
        let store = nvm.store; // move out the already-formatted store
        assert_eq!(Nvm::format(store).unwrap_err(), NvmError::AlreadyFormatted);
    }

    #[test]
    fn create_and_find_partition() {
        let mut nvm = fresh(4096);
        let p = nvm.create(b"sysconf", 64).unwrap();
        assert_eq!(p.size, 64);
        let found = nvm.find(b"sysconf").unwrap();
        assert_eq!(found.size, 64);
    }

    #[test]
    fn duplicate_label_refused() {
        let mut nvm = fresh(4096);
        nvm.create(b"sysconf", 64).unwrap();
        assert_eq!(nvm.create(b"sysconf", 32).unwrap_err(), NvmError::DuplicateLabel);
    }

    #[test]
    fn partitions_never_overlap_and_are_aligned() {
        let mut nvm = fresh(4096);
        let a = nvm.create(b"a", 5).unwrap();
        let b = nvm.create(b"b", 5).unwrap();
        let off_a = nvm.resolve(&a).unwrap();
        let off_b = nvm.resolve(&b).unwrap();
        assert!(off_b >= off_a + 5);
        assert_eq!(off_b % 4, 0);
    }

    #[test]
    fn write_read_roundtrip() {
        let mut nvm = fresh(4096);
        let p = nvm.create(b"user", 64).unwrap();
        nvm.write(&p, 0, b"hello").unwrap();
        let mut out = [0u8; 5];
        nvm.read(&p, 0, &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_beyond_partition_size_errors() {
        let mut nvm = fresh(4096);
        let p = nvm.create(b"user", 4).unwrap();
        assert_eq!(nvm.write(&p, 0, b"hello").unwrap_err(), NvmError::Overflow);
    }

    #[test]
    fn single_replica_corruption_does_not_change_read() {
        let mut nvm = fresh(4096);
        let p = nvm.create(b"user", 16).unwrap();
        nvm.write(&p, 0, &[0xAA]).unwrap();
        let start = nvm.resolve(&p).unwrap() as usize;
        nvm.store.corrupt_replica(start, 0, 0x00);
        let mut out = [0u8; 1];
        nvm.read(&p, 0, &mut out).unwrap();
        assert_eq!(out[0], 0xAA);
    }

    #[test]
    fn three_replica_corruption_flips_the_read() {
        let mut nvm = fresh(4096);
        let p = nvm.create(b"user", 16).unwrap();
        nvm.write(&p, 0, &[0xAA]).unwrap();
        let start = nvm.resolve(&p).unwrap() as usize;
        nvm.store.corrupt_replica(start, 0, 0x00);
        nvm.store.corrupt_replica(start, 1, 0x00);
        nvm.store.corrupt_replica(start, 2, 0x00);
        let mut out = [0u8; 1];
        nvm.read(&p, 0, &mut out).unwrap();
        assert_eq!(out[0], 0x00);
    }

    #[test]
    fn erase_invalidates_table() {
        let mut nvm = fresh(4096);
        nvm.create(b"user", 16).unwrap();
        nvm.erase().unwrap();
        assert!(nvm.find(b"user").is_none());
        let (sig, _, _) = Nvm::<MemStore>::read_header(&nvm.store);
        assert_ne!(sig, SIGNATURE);
    }
}
