use core::ops::Range;

use log::{debug, trace};
use paging::{PageDirectory, PagingError, TranslationCache, ENTRIES_PER_TABLE};
use types::addr::PAGES_IN_ADDRESS_SPACE;
use types::util::frames_for;
use types::{PhysAddr, VirtAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("no run of {pages} free pages left in the mapped page tables")]
    OutOfVirtualSpace { pages: usize },
    #[error("claiming {frames} more frames would run past the end of physical memory")]
    OutOfPhysicalFrames { frames: usize },
    #[error("cannot allocate zero bytes")]
    ZeroSized,
    #[error(transparent)]
    Paging(#[from] PagingError),
}

/// Where the kernel image lives: its first virtual address and the first physical address past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelImage {
    pub virtual_base: VirtAddr,
    pub physical_end: PhysAddr,
}

/// Hands out memory before the kernel knows which physical frames are free.
///
/// Virtual pages are taken from page tables that already exist and physical frames are claimed
/// one after the other starting right behind the kernel image. Nothing is ever freed, and the
/// claimed frames must later be reserved in the frame bitmap (see
/// [`claimed_frames`](Self::claimed_frames)).
#[derive(Debug)]
pub struct BootstrapAllocator {
    next_free_page: usize,
    first_frame: usize,
    next_free_frame: usize,
}

impl BootstrapAllocator {
    /// Starts the search for free pages at the kernel's base, moving to the first page not mapped
    /// yet, and claims frames starting with the first one past the kernel image.
    pub fn new(directory: &PageDirectory, image: KernelImage) -> Self {
        let first_frame = frames_for(image.physical_end.as_u32() as u64) as usize;
        let mut allocator = Self {
            next_free_page: image.virtual_base.page_number(),
            first_frame,
            next_free_frame: first_frame,
        };
        if let Some(page) = allocator.find_free_pages(directory, 1) {
            allocator.next_free_page = page;
        }
        debug!(
            "Bootstrap allocator: pages from {}, frames from {}",
            VirtAddr::from_page_number(allocator.next_free_page),
            PhysAddr::from_frame(first_frame)
        );
        allocator
    }

    /// Maps `size` bytes, rounded up to whole pages, at a run of consecutive free pages and returns
    /// the address of the first one. Every page gets a freshly claimed frame and is mapped kernel
    /// writable; the TLB is flushed once at the end.
    pub fn alloc(
        &mut self,
        directory: &mut PageDirectory,
        size: usize,
        tlb: &mut impl TranslationCache,
    ) -> Result<VirtAddr, BootstrapError> {
        let pages = frames_for(size as u64) as usize;
        if pages == 0 {
            return Err(BootstrapError::ZeroSized);
        }
        if self.next_free_frame + pages > PAGES_IN_ADDRESS_SPACE {
            return Err(BootstrapError::OutOfPhysicalFrames { frames: pages });
        }
        let start = self
            .find_free_pages(directory, pages)
            .ok_or(BootstrapError::OutOfVirtualSpace { pages })?;

        for page in start..start + pages {
            let frame = PhysAddr::from_frame(self.next_free_frame);
            directory.map(VirtAddr::from_page_number(page), frame, true, true)?;
            trace!("{} -> {frame}", VirtAddr::from_page_number(page));
            self.next_free_frame += 1;
        }
        tlb.flush_all();

        self.next_free_page = start + pages;
        let addr = VirtAddr::from_page_number(start);
        debug!("Bootstrap allocation: {pages} pages @ {addr}");
        Ok(addr)
    }

    /// Frame numbers claimed so far.
    pub fn claimed_frames(&self) -> Range<usize> {
        self.first_frame..self.next_free_frame
    }

    /// Number of frames handed out so far.
    pub fn allocated_frames(&self) -> usize {
        self.claimed_frames().len()
    }

    pub fn next_free_page(&self) -> usize {
        self.next_free_page
    }

    pub fn next_free_frame(&self) -> usize {
        self.next_free_frame
    }

    /// Finds `pages` consecutive non-present pages inside present page tables, starting at
    /// `next_free_page` and wrapping around at the end of the address space. A run never spans an
    /// absent table or the wrap point.
    fn find_free_pages(&self, directory: &PageDirectory, pages: usize) -> Option<usize> {
        let mut position = self.next_free_page % PAGES_IN_ADDRESS_SPACE;
        let mut scanned = 0;
        let mut run_start = position;
        let mut run_length = 0;

        while scanned < PAGES_IN_ADDRESS_SPACE {
            if position == 0 {
                run_length = 0;
            }

            let Some(table) = directory.table(position / ENTRIES_PER_TABLE) else {
                let skip = ENTRIES_PER_TABLE - position % ENTRIES_PER_TABLE;
                run_length = 0;
                scanned += skip;
                position = (position + skip) % PAGES_IN_ADDRESS_SPACE;
                continue;
            };

            if table[position % ENTRIES_PER_TABLE].present() {
                run_length = 0;
            } else {
                if run_length == 0 {
                    run_start = position;
                }
                run_length += 1;
                if run_length == pages {
                    return Some(run_start);
                }
            }

            scanned += 1;
            position = (position + 1) % PAGES_IN_ADDRESS_SPACE;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ptr::NonNull;
    use paging::{DirectoryTable, PageTable};

    #[derive(Default)]
    struct RecordingTlb {
        flushes: usize,
    }

    impl TranslationCache for RecordingTlb {
        fn flush_all(&mut self) {
            self.flushes += 1;
        }

        fn invalidate(&mut self, _addr: VirtAddr) {}
    }

    const KERNEL: KernelImage = KernelImage {
        virtual_base: VirtAddr::new(0xc000_0000),
        physical_end: PhysAddr::new(0x0010_4800),
    };

    fn directory_with_tables(slots: &[usize]) -> PageDirectory {
        let mut directory = unsafe {
            PageDirectory::from_raw_parts(
                NonNull::from(Box::leak(Box::new(DirectoryTable::zeroed()))),
                PhysAddr::new(0x1000),
            )
        };
        for (n, &slot) in slots.iter().enumerate() {
            let table = NonNull::from(Box::leak(Box::new(PageTable::zeroed())));
            unsafe { directory.install_table(slot, PhysAddr::from_frame(0x200 + n), table) };
        }
        directory
    }

    fn map_pages(directory: &mut PageDirectory, first: VirtAddr, count: usize) {
        for page in 0..count {
            let addr = first + (page * 4096) as u32;
            directory
                .map(addr, PhysAddr::from_frame(page), true, true)
                .unwrap();
        }
    }

    #[test]
    fn init_skips_mapped_kernel_pages() {
        let mut directory = directory_with_tables(&[768]);
        map_pages(&mut directory, KERNEL.virtual_base, 5);

        let allocator = BootstrapAllocator::new(&directory, KERNEL);
        assert_eq!(allocator.next_free_page(), 0xc0005);
        assert_eq!(allocator.next_free_frame(), 0x105);
        assert!(allocator.claimed_frames().is_empty());
    }

    #[test]
    fn alloc_maps_fresh_frames() {
        let mut directory = directory_with_tables(&[768]);
        map_pages(&mut directory, KERNEL.virtual_base, 5);
        let mut allocator = BootstrapAllocator::new(&directory, KERNEL);
        let mut tlb = RecordingTlb::default();

        let addr = allocator.alloc(&mut directory, 10_000, &mut tlb).unwrap();
        assert_eq!(addr, VirtAddr::new(0xc000_5000));
        assert_eq!(tlb.flushes, 1);
        assert_eq!(allocator.next_free_page(), 0xc0008);
        assert_eq!(allocator.next_free_frame(), 0x108);
        assert_eq!(allocator.claimed_frames(), 0x105..0x108);
        assert_eq!(allocator.allocated_frames(), 3);

        for (n, frame) in (0x105..0x108).enumerate() {
            let entry = directory.entry(addr + (n * 4096) as u32).unwrap();
            assert!(entry.present());
            assert!(entry.writable());
            assert!(!entry.user());
            assert_eq!(entry.frame_address(), PhysAddr::from_frame(frame));
        }
        assert!(!directory.entry(VirtAddr::new(0xc000_8000)).unwrap().present());

        let next = allocator.alloc(&mut directory, 1, &mut tlb).unwrap();
        assert_eq!(next, VirtAddr::new(0xc000_8000));
        assert_eq!(allocator.claimed_frames(), 0x105..0x109);
        assert_eq!(tlb.flushes, 2);
    }

    #[test]
    fn alloc_skips_runs_that_are_too_short() {
        let mut directory = directory_with_tables(&[768]);
        map_pages(&mut directory, KERNEL.virtual_base, 5);
        map_pages(&mut directory, VirtAddr::new(0xc000_7000), 1);
        let mut allocator = BootstrapAllocator::new(&directory, KERNEL);

        let addr = allocator
            .alloc(&mut directory, 3 * 4096, &mut RecordingTlb::default())
            .unwrap();
        assert_eq!(addr, VirtAddr::new(0xc000_8000));
    }

    #[test]
    fn alloc_skips_absent_tables() {
        let mut directory = directory_with_tables(&[768, 770]);
        map_pages(&mut directory, KERNEL.virtual_base, 1022);
        let mut allocator = BootstrapAllocator::new(&directory, KERNEL);
        assert_eq!(allocator.next_free_page(), 0xc03fe);

        // Two pages are left in slot 768 and the run may not continue into the hole at 769.
        let addr = allocator
            .alloc(&mut directory, 4 * 4096, &mut RecordingTlb::default())
            .unwrap();
        assert_eq!(addr, VirtAddr::from_indices(770, 0));
    }

    #[test]
    fn search_wraps_around_the_address_space() {
        let mut directory = directory_with_tables(&[0, 1023]);
        map_pages(&mut directory, VirtAddr::from_indices(1023, 0), 1024);
        map_pages(&mut directory, VirtAddr::new(0), 1);

        let image = KernelImage {
            virtual_base: VirtAddr::from_indices(1023, 0),
            ..KERNEL
        };
        let allocator = BootstrapAllocator::new(&directory, image);
        assert_eq!(allocator.next_free_page(), 1);
    }

    #[test]
    fn out_of_virtual_space() {
        let mut directory = directory_with_tables(&[768]);
        map_pages(&mut directory, KERNEL.virtual_base, 1022);
        let mut allocator = BootstrapAllocator::new(&directory, KERNEL);
        let mut tlb = RecordingTlb::default();

        assert_eq!(
            allocator.alloc(&mut directory, 3 * 4096, &mut tlb),
            Err(BootstrapError::OutOfVirtualSpace { pages: 3 })
        );
        assert_eq!(tlb.flushes, 0);
        assert_eq!(allocator.next_free_frame(), 0x105);
    }

    #[test]
    fn out_of_physical_frames() {
        let mut directory = directory_with_tables(&[768]);
        let image = KernelImage {
            physical_end: PhysAddr::new(0xffff_f000),
            ..KERNEL
        };
        let mut allocator = BootstrapAllocator::new(&directory, image);
        let mut tlb = RecordingTlb::default();

        assert_eq!(
            allocator.alloc(&mut directory, 2 * 4096, &mut tlb),
            Err(BootstrapError::OutOfPhysicalFrames { frames: 2 })
        );
        assert!(allocator.alloc(&mut directory, 4096, &mut tlb).is_ok());
        assert_eq!(allocator.next_free_frame(), PAGES_IN_ADDRESS_SPACE);
    }

    #[test]
    fn zero_sized_alloc_fails() {
        let mut directory = directory_with_tables(&[768]);
        let mut allocator = BootstrapAllocator::new(&directory, KERNEL);
        assert_eq!(
            allocator.alloc(&mut directory, 0, &mut RecordingTlb::default()),
            Err(BootstrapError::ZeroSized)
        );
    }
}
