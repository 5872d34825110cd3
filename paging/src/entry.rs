//! Hardware entry formats of the two paging levels. Both are 32-bit words whose upper 20 bits hold
//! a frame number and whose low 12 bits hold flags.

use bitfield_struct::bitfield;
use types::PhysAddr;

/// A page table entry (PTE), mapping one 4 KiB page.
///
/// ```text
/// 31                  12 11  9 8 7 6 5 4 3 2 1 0
/// +---------------------+-----+-+-+-+-+-+-+-+-+-+
/// | frame number        |avail|G|P|D|A|C|W|U|R|P|
/// +---------------------+-----+-+-+-+-+-+-+-+-+-+
/// ```
///
/// With `present` cleared the frame number means nothing and the entry must not be treated as a
/// mapping.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    /// **Present** (bit 0): the entry defines a valid mapping.
    pub present: bool,
    /// **Read/Write** (bit 1): writes allowed if set.
    pub writable: bool,
    /// **User/Supervisor** (bit 2): ring 3 access allowed if set.
    pub user: bool,
    /// **Page Write-Through** (bit 3).
    pub write_through: bool,
    /// **Page Cache Disable** (bit 4).
    pub cache_disable: bool,
    /// **Accessed** (bit 5): set by the CPU, left alone by this crate.
    pub accessed: bool,
    /// **Dirty** (bit 6): set by the CPU on writes, left alone by this crate.
    pub dirty: bool,
    /// **Page Attribute Table** index bit (bit 7).
    pub pat: bool,
    /// **Global** (bit 8): survives `cr3` reloads if CR4.PGE is enabled.
    pub global: bool,
    /// Bits 9..11, free for the OS.
    #[bits(3)]
    pub available: u8,
    /// Bits 12..31, physical frame number.
    #[bits(20)]
    pub frame: u32,
}

impl PageTableEntry {
    /// Points this entry at `frame`: sets present, the read/write bit to `is_writable`, the user bit
    /// to `!is_kernel` and the frame number to `frame / 4096`. Any other bits (accessed, dirty,
    /// caching) are left as they are.
    ///
    /// This only writes the entry. Replacing a live mapping requires a TLB invalidation by the
    /// caller.
    #[inline]
    pub fn map(&mut self, frame: PhysAddr, is_kernel: bool, is_writable: bool) {
        self.set_present(true);
        self.set_writable(is_writable);
        self.set_user(!is_kernel);
        self.set_frame(frame.frame_number() as u32);
    }

    /// Clears the present bit. The frame number is kept but becomes meaningless.
    #[inline]
    pub fn unmap(&mut self) {
        self.set_present(false);
    }

    /// Physical address of the mapped frame.
    #[inline]
    pub const fn frame_address(&self) -> PhysAddr {
        PhysAddr::from_frame(self.frame() as usize)
    }
}

/// A page directory entry (PDE) referencing a page table.
///
/// ```text
/// 31                  12 11  9 8 7 6 5 4 3 2 1 0
/// +---------------------+-----+-+-+-+-+-+-+-+-+-+
/// | page table address  |avail|-|S|-|A|C|W|U|R|P|
/// +---------------------+-----+-+-+-+-+-+-+-+-+-+
/// ```
///
/// 4 MiB pages (`S` set) are never created by this kernel.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct DirectoryEntry {
    /// **Present** (bit 0): a page table is installed.
    pub present: bool,
    /// **Read/Write** (bit 1).
    pub writable: bool,
    /// **User/Supervisor** (bit 2).
    pub user: bool,
    /// **Page Write-Through** (bit 3).
    pub write_through: bool,
    /// **Page Cache Disable** (bit 4).
    pub cache_disable: bool,
    /// **Accessed** (bit 5).
    pub accessed: bool,
    #[bits(1)]
    __ignored: u8,
    /// **Page Size** (bit 7): must stay clear.
    pub large_page: bool,
    #[bits(1)]
    __global_ignored: u8,
    /// Bits 9..11, free for the OS.
    #[bits(3)]
    pub available: u8,
    /// Bits 12..31, frame number of the page table.
    #[bits(20)]
    pub table_frame: u32,
}

impl DirectoryEntry {
    /// Entry for a kernel page table located at physical address `table`. The low 12 bits of
    /// `table` are dropped; page tables must be 4 KiB aligned.
    #[inline]
    pub const fn for_table(table: PhysAddr) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_table_frame(table.frame_number() as u32)
    }

    /// Physical address of the referenced page table.
    #[inline]
    pub const fn table_address(&self) -> PhysAddr {
        PhysAddr::from_frame(self.table_frame() as usize)
    }
}
