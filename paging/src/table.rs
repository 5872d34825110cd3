use core::ops::{Index, IndexMut};

use crate::entry::{DirectoryEntry, PageTableEntry};

/// Number of entries in a page table and in a page directory.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// A page table: 1024 page entries mapping a 4 MiB window. The CPU requires the table to start on
/// a 4 KiB boundary, which the type's alignment guarantees for statics and heap allocations.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

/// The hardware page directory, i.e. what `cr3` points at: 1024 entries holding physical page
/// table addresses.
#[repr(C, align(4096))]
pub struct DirectoryTable {
    entries: [DirectoryEntry; ENTRIES_PER_TABLE],
}

const _: [(); 4096] = [(); core::mem::size_of::<PageTable>()];
const _: [(); 4096] = [(); core::mem::size_of::<DirectoryTable>()];

impl PageTable {
    /// A table with every entry non-present.
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::new(); ENTRIES_PER_TABLE],
        }
    }

    /// Iterates over the present entries together with their index.
    pub fn present_entries(&self) -> impl Iterator<Item = (usize, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, entry)| entry.present())
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

impl DirectoryTable {
    pub const fn zeroed() -> Self {
        Self {
            entries: [DirectoryEntry::new(); ENTRIES_PER_TABLE],
        }
    }
}

impl Index<usize> for DirectoryTable {
    type Output = DirectoryEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for DirectoryTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}
