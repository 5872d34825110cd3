//! Iterator and structs to traverse and represent entries of the Multiboot memory map.
//!
//! The buffer consists of one or more of the following size/structure pairs (`size` is really just
//! used for skipping to the next pair):
//!
//! ```text
//!         +-------------------+  <-- Start of entry
//! -4      | size              |
//!         +-------------------+  <-- `size` is from here to next entry
//! 0       | base_addr         |
//! 8       | length            |
//! 16      | type              |
//!         +-------------------+
//! ```
//!
//! Entries are only 4-byte aligned, so the 64-bit fields are decoded from bytes instead of being
//! read through a `repr(C)` struct.

/// Smallest valid value of an entry's `size` field.
const MIN_ENTRY_SIZE: u32 = 20;

/// Provides an iterator over the multiboot memory map. The `'mmap` lifetime parameter describes
/// the lifetime of the underlying memory buffer containing the memory map.
#[derive(Clone)]
pub struct MemoryMapIter<'mmap> {
    buffer: &'mmap [u8],
}

impl<'mmap> From<&'mmap [u8]> for MemoryMapIter<'mmap> {
    fn from(buffer: &'mmap [u8]) -> Self {
        Self { buffer }
    }
}

impl MemoryMapIter<'_> {
    /// Creates an iterator over `length` bytes of memory map starting at `ptr`.
    ///
    /// ### Safety
    ///
    /// `ptr` must be readable for `length` bytes in the current address space and the buffer must
    /// not be mutated during `'mmap`.
    pub unsafe fn from_raw_parts<'mmap>(ptr: *const u8, length: usize) -> MemoryMapIter<'mmap> {
        unsafe { core::slice::from_raw_parts::<'mmap>(ptr, length) }.into()
    }
}

impl Iterator for MemoryMapIter<'_> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<Self::Item> {
        let entry_size = read_u32(self.buffer, 0)?;
        if entry_size < MIN_ENTRY_SIZE {
            // A malformed size would make us loop or misparse everything after it.
            self.buffer = &[];
            return None;
        }

        let region = MemoryRegion {
            base_addr: read_u64(self.buffer, 4)?,
            length: read_u64(self.buffer, 12)?,
            kind: read_u32(self.buffer, 20)?.into(),
            entry_size,
        };

        let next = (entry_size as usize + 4).min(self.buffer.len());
        self.buffer = &self.buffer[next..];
        Some(region)
    }
}

impl core::fmt::Debug for MemoryMapIter<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

fn read_u32(buffer: &[u8], offset: usize) -> Option<u32> {
    let bytes = buffer.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64(buffer: &[u8], offset: usize) -> Option<u64> {
    let bytes = buffer.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// A contiguous region of physical memory reported by the Multiboot memory map.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// The start address of the memory region.
    pub base_addr: u64,
    /// The length of the memory region in bytes.
    pub length: u64,
    /// The type of the memory region.
    pub kind: MemoryRegionKind,
    /// Value of the entry's `size` field; the next entry starts `entry_size + 4` bytes later.
    pub entry_size: u32,
}

impl core::fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?} @ {:#x} ({:?} KiB)",
            self.kind,
            self.base_addr,
            self.length >> 10,
        )
    }
}

/// Describes the availability of the memory referenced by a [`MemoryRegion`] as reported by the
/// `type` field of a Multiboot memory map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegionKind {
    /// 1: available RAM
    Available,
    /// 3: usable memory holding ACPI information
    Acpi,
    /// 2 or 4: reserved memory, 4 needs to be preserved on hibernation
    Reserved,
    /// 5: memory occupied by defective RAM modules
    Defective,
    Unknown(u32),
}

impl From<u32> for MemoryRegionKind {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Available,
            2 | 4 => Self::Reserved,
            3 => Self::Acpi,
            5 => Self::Defective,
            other => Self::Unknown(other),
        }
    }
}
