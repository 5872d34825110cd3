//! 32-bit physical and virtual address newtypes. Both wrap a `u32` since this kernel only ever runs
//! with non-PAE paging, so neither address space exceeds 4 GiB.

use core::fmt::{Debug, Display, Formatter, Result};
use core::ops::Add;

/// Size of a page and of a page frame in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of bits of an address that select the byte within a page.
pub const PAGE_SHIFT: u32 = 12;

/// Number of 4 KiB pages in the 32-bit virtual address space.
pub const PAGES_IN_ADDRESS_SPACE: usize = 1 << 20;

/// A physical memory address, i.e. what ends up on the memory bus.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhysAddr(u32);

/// A virtual memory address in the currently loaded address space.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtAddr(u32);

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Physical address of the first byte of frame number `frame`.
    pub const fn from_frame(frame: usize) -> Self {
        Self((frame << PAGE_SHIFT) as u32)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The number of the frame that contains this address.
    pub const fn frame_number(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    /// Offset of this address from the start of its frame.
    pub const fn page_offset(self) -> u32 {
        self.0 & (PAGE_SIZE as u32 - 1)
    }

    pub const fn align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u32 - 1))
    }

    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }
}

impl VirtAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Virtual address of the first byte of page number `page`.
    pub const fn from_page_number(page: usize) -> Self {
        Self((page << PAGE_SHIFT) as u32)
    }

    /// Virtual address selected by a page directory slot and a page table slot.
    pub const fn from_indices(directory_index: usize, table_index: usize) -> Self {
        Self::from_page_number(directory_index * 1024 + table_index)
    }

    /// Takes the address of a pointer in the running kernel.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u32)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }

    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }

    /// Page number of this address, counting from 0 at the bottom of the address space.
    pub const fn page_number(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    /// Page directory slot covering this address (bits 31..22).
    pub const fn directory_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    /// Page table slot covering this address (bits 21..12).
    pub const fn table_index(self) -> usize {
        ((self.0 >> PAGE_SHIFT) & 0x3ff) as usize
    }

    pub const fn page_offset(self) -> u32 {
        self.0 & (PAGE_SIZE as u32 - 1)
    }

    pub const fn align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u32 - 1))
    }
}

impl Add<u32> for PhysAddr {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0 + rhs)
    }
}

impl Add<u32> for VirtAddr {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        Self(self.0 + rhs)
    }
}

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "PhysAddr({:#010x})", self.0)
    }
}

impl Display for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl Display for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#010x}", self.0)
    }
}
