//! The kernel's page directory and everything that walks or edits it.

use core::ops::ControlFlow;
use core::ptr::NonNull;

use log::debug;
use types::{PhysAddr, VirtAddr, PAGE_SIZE};

use crate::entry::{DirectoryEntry, PageTableEntry};
use crate::table::{DirectoryTable, PageTable, ENTRIES_PER_TABLE};
use crate::tlb::TranslationCache;
use crate::PagingError;

/// The directory slot whose page table aliases every other page table (and the directory itself)
/// into virtual memory, plus the offset between the kernel's virtual and physical addresses.
///
/// Page `0` of the window maps the page directory, pages `1..` map the page tables present at
/// bootstrap time in ascending directory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationWindow {
    pub slot: usize,
    pub kernel_base: VirtAddr,
}

impl TranslationWindow {
    /// First virtual address covered by the window.
    pub const fn base(&self) -> VirtAddr {
        VirtAddr::from_indices(self.slot, 0)
    }

    /// Physical address of the page containing `addr`, for an address inside the kernel image.
    pub const fn kernel_physical(&self, addr: VirtAddr) -> PhysAddr {
        PhysAddr::new(addr.as_u32().wrapping_sub(self.kernel_base.as_u32())).align_down()
    }
}

/// A page directory together with a virtual view of its page tables.
///
/// The hardware directory only stores physical table addresses. Next to it `tables` keeps a
/// pointer through which each of those tables can be edited. Both are only ever changed together
/// by [`PageDirectory::install_table`]: a directory slot is present exactly when `tables` holds a
/// pointer to the very table that the slot references.
pub struct PageDirectory {
    /// Where the hardware directory can currently be read and written.
    entries: NonNull<DirectoryTable>,

    /// The value `cr3` is loaded with for this directory.
    physical_addr: PhysAddr,

    tables: [Option<NonNull<PageTable>>; ENTRIES_PER_TABLE],
}

impl PageDirectory {
    /// Wraps an empty directory.
    ///
    /// ### Safety
    ///
    /// `entries` must point to a valid directory whose entries are all non-present, located at
    /// `physical_addr`, and must stay valid and otherwise unaliased for the lifetime of the
    /// returned value.
    pub unsafe fn from_raw_parts(entries: NonNull<DirectoryTable>, physical_addr: PhysAddr) -> Self {
        Self {
            entries,
            physical_addr,
            tables: [None; ENTRIES_PER_TABLE],
        }
    }

    /// Takes over the page directory set up by the boot code.
    ///
    /// Every page table present in `boot_directory` gets an alias in `window_table`, and the
    /// directory itself is aliased at the start of the window. `window_table` is then installed in
    /// the window's slot at the physical address derived from its kernel virtual address, the TLB
    /// is flushed and the directory is from then on accessed through its alias at
    /// [`TranslationWindow::base`], so the boot identity mapping can go away.
    ///
    /// ### Safety
    ///
    /// * Must be called exactly once, before any other operation on the kernel address space, with
    ///   the directory that is currently loaded in `cr3`.
    /// * `boot_directory` must be readable and writable at its current address and be located at
    ///   `boot_directory_phys`.
    /// * `window_table` must be part of the kernel image (so that its virtual address minus
    ///   `window.kernel_base` is its physical address) and have at least one free entry more than
    ///   there are present slots in `boot_directory`.
    ///
    /// ### Panics
    ///
    /// If the window slot is 0, or the window table runs out of entries.
    pub unsafe fn bootstrap(
        boot_directory: NonNull<DirectoryTable>,
        boot_directory_phys: PhysAddr,
        window_table: &'static mut PageTable,
        window: TranslationWindow,
        tlb: &mut impl TranslationCache,
    ) -> Self {
        assert_ne!(window.slot, 0, "Translation window must not live in slot 0");
        let window_base = window.base();

        let mut directory = Self {
            entries: boot_directory,
            physical_addr: boot_directory_phys,
            tables: [None; ENTRIES_PER_TABLE],
        };

        window_table[0].map(boot_directory_phys, true, true);
        let mut window_page = 1;

        for index in 0..ENTRIES_PER_TABLE {
            let entry = directory.entries()[index];
            if !entry.present() {
                continue;
            }

            assert!(
                window_page < ENTRIES_PER_TABLE,
                "Translation window has no room left for page table {index}"
            );
            let alias = window_base + (window_page * PAGE_SIZE) as u32;
            window_table[window_page].map(entry.table_address(), true, true);
            directory.tables[index] = Some(unsafe {
                // SAFETY: `alias` lies in the window, which is never the zero page.
                NonNull::new_unchecked(alias.as_mut_ptr())
            });
            debug!(
                "Page table {index} @ {} aliased at {alias}",
                entry.table_address()
            );
            window_page += 1;
        }

        let window_virt = VirtAddr::from_ptr(window_table as *const PageTable);
        let window_phys = window.kernel_physical(window_virt);
        unsafe {
            directory.install_table(window.slot, window_phys, NonNull::from(window_table));
        }

        tlb.flush_all();

        directory.entries = unsafe {
            // SAFETY: Same as above, the window base is non-null.
            NonNull::new_unchecked(window_base.as_mut_ptr())
        };
        debug!(
            "Page directory @ {} now accessed through {window_base}",
            directory.physical_addr
        );

        directory
    }

    /// Installs a page table in directory slot `index`, updating the hardware entry and the
    /// virtual pointer together. The previous table of that slot, if any, is forgotten.
    ///
    /// The caller is responsible for flushing the TLB if the slot was live.
    ///
    /// ### Safety
    ///
    /// `table` must point to the page table located at `table_phys`, be 4 KiB aligned and stay
    /// valid for as long as this directory is in use.
    pub unsafe fn install_table(
        &mut self,
        index: usize,
        table_phys: PhysAddr,
        table: NonNull<PageTable>,
    ) {
        self.entries_mut()[index] = DirectoryEntry::for_table(table_phys);
        self.tables[index] = Some(table);
    }

    /// The physical address to load into `cr3`.
    pub const fn physical_addr(&self) -> PhysAddr {
        self.physical_addr
    }

    /// The virtual address through which the hardware directory is currently edited.
    pub fn directory_address(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.entries.as_ptr().cast_const())
    }

    /// Returns `true` if directory slot `index` references a page table.
    pub fn is_table_present(&self, index: usize) -> bool {
        self.entries()[index].present()
    }

    /// The virtual address through which the page table of slot `index` is accessed.
    pub fn table_address(&self, index: usize) -> Option<VirtAddr> {
        self.tables[index].map(|table| VirtAddr::from_ptr(table.as_ptr().cast_const()))
    }

    /// The page table installed in slot `index`, if any.
    pub fn table(&self, index: usize) -> Option<&PageTable> {
        if !self.is_table_present(index) {
            return None;
        }
        self.tables[index].map(|table| unsafe {
            // SAFETY: Guaranteed valid by `install_table`/`bootstrap`.
            table.as_ref()
        })
    }

    pub fn table_mut(&mut self, index: usize) -> Option<&mut PageTable> {
        if !self.is_table_present(index) {
            return None;
        }
        self.tables[index].map(|mut table| unsafe {
            // SAFETY: See `table()`; `&mut self` guarantees exclusivity.
            table.as_mut()
        })
    }

    /// The page entry responsible for `addr`, or `None` if the governing page table is absent.
    pub fn entry(&self, addr: VirtAddr) -> Option<PageTableEntry> {
        self.table(addr.directory_index())
            .map(|table| table[addr.table_index()])
    }

    pub fn entry_mut(&mut self, addr: VirtAddr) -> Option<&mut PageTableEntry> {
        self.table_mut(addr.directory_index())
            .map(|table| &mut table[addr.table_index()])
    }

    /// Maps the page containing `addr` to `frame`. Page tables are never created here, so this
    /// fails if the directory slot is empty. No TLB maintenance is done.
    pub fn map(
        &mut self,
        addr: VirtAddr,
        frame: PhysAddr,
        is_kernel: bool,
        is_writable: bool,
    ) -> Result<(), PagingError> {
        let index = addr.directory_index();
        let entry = self
            .entry_mut(addr)
            .ok_or(PagingError::TableNotPresent { index })?;
        entry.map(frame, is_kernel, is_writable);
        Ok(())
    }

    /// Removes the mapping of the page containing `addr` and invalidates just that page in the
    /// TLB. Does nothing if the governing page table is absent.
    pub fn unmap(&mut self, addr: VirtAddr, tlb: &mut impl TranslationCache) {
        if let Some(entry) = self.entry_mut(addr) {
            entry.unmap();
            tlb.invalidate(addr.align_down());
        }
    }

    /// Visits every present page table in ascending slot order and, within each, every present
    /// page in ascending order. Breaking out of either callback ends the whole walk and returns the
    /// break value.
    pub fn walk<B>(
        &self,
        mut on_table: impl FnMut(usize, &PageTable) -> ControlFlow<B>,
        mut on_page: impl FnMut(usize, usize, PageTableEntry) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        for directory_index in 0..ENTRIES_PER_TABLE {
            let Some(table) = self.table(directory_index) else {
                continue;
            };
            on_table(directory_index, table)?;
            for (table_index, entry) in table.present_entries() {
                on_page(directory_index, table_index, entry)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// [`walk`](Self::walk) without a page table callback.
    pub fn walk_pages<B>(
        &self,
        on_page: impl FnMut(usize, usize, PageTableEntry) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        self.walk(|_, _| ControlFlow::Continue(()), on_page)
    }

    /// Returns the lowest virtual address that maps to `addr`, or `None` if no page maps its frame.
    ///
    /// This scans the whole directory, so avoid it on anything resembling a hot path, especially
    /// once the directory gets large.
    pub fn physical_to_virtual(&self, addr: PhysAddr) -> Option<VirtAddr> {
        let frame = addr.frame_number();
        let found = self.walk_pages(|directory_index, table_index, entry| {
            if entry.frame() as usize == frame {
                ControlFlow::Break(VirtAddr::from_indices(directory_index, table_index))
            } else {
                ControlFlow::Continue(())
            }
        });
        match found {
            ControlFlow::Break(page) => Some(page + addr.page_offset()),
            ControlFlow::Continue(()) => None,
        }
    }

    fn entries(&self) -> &DirectoryTable {
        unsafe {
            // SAFETY: Valid per the constructors' contracts.
            self.entries.as_ref()
        }
    }

    fn entries_mut(&mut self) -> &mut DirectoryTable {
        unsafe {
            // SAFETY: Valid per the constructors' contracts, `&mut self` guarantees exclusivity.
            self.entries.as_mut()
        }
    }
}
