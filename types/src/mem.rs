use core::fmt::{Display, Formatter, Result};

use crate::addr::{PhysAddr, PAGE_SIZE};
use crate::fmt::ByteSize;
use crate::util::frames_spanned;

/// First address past the physical memory this kernel can track without PAE.
pub const ADDRESS_LIMIT: u64 = 1 << 32;

/// A contiguous range of physical memory as reported by the bootloader.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base_addr: u64,
    pub length: u64,
    pub class: MemoryRegionType,
}

impl From<multiboot::MemoryRegion> for MemoryRegion {
    fn from(value: multiboot::MemoryRegion) -> Self {
        Self {
            base_addr: value.base_addr,
            length: value.length,
            class: value.kind.into(),
        }
    }
}

impl MemoryRegion {
    pub const fn new(base_addr: u64, length: u64, class: MemoryRegionType) -> Self {
        Self {
            base_addr,
            length,
            class,
        }
    }

    /// First address past the end of the region. Saturates on malformed entries whose length
    /// would wrap around the 64-bit address space.
    pub const fn end_addr(&self) -> u64 {
        self.base_addr.saturating_add(self.length)
    }

    /// Returns `true` if every byte of the region lies below [`ADDRESS_LIMIT`].
    pub const fn is_addressable(&self) -> bool {
        self.end_addr() <= ADDRESS_LIMIT
    }

    pub fn is_usable(&self) -> bool {
        self.class == MemoryRegionType::Available
    }

    /// The physical address of the frame containing the first byte of the region. Only meaningful
    /// for addressable regions.
    pub const fn first_frame(&self) -> PhysAddr {
        PhysAddr::new((self.base_addr & !(PAGE_SIZE as u64 - 1)) as u32)
    }

    /// Number of frames the region touches, counting partially covered frames at both ends.
    pub const fn frame_count(&self) -> usize {
        frames_spanned(self.base_addr, self.end_addr()) as usize
    }
}

impl core::fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "(@ 0x{:x}, len: {} KiB, {})",
            self.base_addr,
            self.length / 1024,
            self.class,
        )
    }
}

impl Display for MemoryRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "@ 0x{:09x}: {} ({})",
            self.base_addr,
            ByteSize(self.length),
            self.class
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegionType {
    Available,
    Reserved,
    Reclaimable,
    Defective,
}

impl Display for MemoryRegionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(match self {
            Self::Available => "usable",
            Self::Reserved => "reserved",
            Self::Reclaimable => "reclaimable",
            Self::Defective => "defective",
        })
    }
}

impl From<multiboot::MemoryRegionKind> for MemoryRegionType {
    fn from(value: multiboot::MemoryRegionKind) -> Self {
        use multiboot::MemoryRegionKind;
        match value {
            MemoryRegionKind::Available => Self::Available,
            MemoryRegionKind::Acpi => Self::Reclaimable,
            MemoryRegionKind::Defective => Self::Defective,
            MemoryRegionKind::Reserved | MemoryRegionKind::Unknown(_) => Self::Reserved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_of_unaligned_region() {
        let region = MemoryRegion::new(0x9fc00, 0x400, MemoryRegionType::Reserved);
        assert_eq!(region.first_frame(), PhysAddr::new(0x9f000));
        assert_eq!(region.frame_count(), 1);
    }

    #[test]
    fn addressable_up_to_four_gib() {
        let top = MemoryRegion::new(0xfffc_0000, 0x4_0000, MemoryRegionType::Reserved);
        assert!(top.is_addressable());

        let high = MemoryRegion::new(0x1_0000_0000, 0x1000, MemoryRegionType::Available);
        assert!(!high.is_addressable());

        let straddling = MemoryRegion::new(0xffff_f000, 0x2000, MemoryRegionType::Available);
        assert!(!straddling.is_addressable());
    }

    #[test]
    fn unknown_kinds_are_reserved() {
        let class: MemoryRegionType = multiboot::MemoryRegionKind::Unknown(9).into();
        assert_eq!(class, MemoryRegionType::Reserved);
    }
}
