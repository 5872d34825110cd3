//! Memory management
//!
//! Brings up the memory subsystem from what the boot code left behind: a page directory with an
//! identity mapping of the low memory plus the kernel at [`layout::KERNEL_BASE`], and the
//! bootloader's memory map. The steps, in order:
//!
//! 1. Check that the bootloader provided a memory map.
//! 2. Take over the boot page directory (see [`PageDirectory::bootstrap`]).
//! 3. Set up the bootstrap allocator.
//! 4. Find the highest usable physical address in the memory map.
//! 5. Size the frame bitmap for it and allocate its storage from the bootstrap allocator.
//! 6. Mark the frames in use: low memory, both kernel images, the bitmap's own frames, everything
//!    mapped, and every region the memory map does not report as available.
//! 7. Unmap the bootstrap image.

use log::{debug, info, warn};

use allocators::{BitmapError, BootstrapError, FrameBitmap};
use multiboot::{BootInfoError, MemoryMapBuffer};
use paging::{PageDirectory, PagingError};
use types::fmt::ByteSize;
use types::mem::{MemoryRegion, ADDRESS_LIMIT};
use types::util::frames_for;
use types::{PhysAddr, VirtAddr, PAGE_SIZE};

use self::layout::{KernelLayout, FIRST_MEGABYTE};

pub mod layout;

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    BootInfo(#[from] BootInfoError),
    #[error(transparent)]
    Paging(#[from] PagingError),
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
    #[error("bootstrap allocation failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("memory map @ {address} is not mapped (on-demand mapping is not supported yet)")]
    MemoryMapInaccessible { address: PhysAddr },
}

/// The memory subsystem once it is up. Owned by the boot code for the rest of the kernel's life.
pub struct MemoryContext {
    pub directory: PageDirectory,
    pub frames: FrameBitmap<'static>,
}

#[cfg(target_arch = "x86")]
pub use self::startup::init;

#[cfg(target_arch = "x86")]
mod startup {
    use core::ptr::{addr_of_mut, NonNull};

    use log::{debug, info};

    use allocators::{BitmapLayout, BootstrapAllocator};
    use multiboot::{BootInfo, MemoryMapIter};
    use paging::{DirectoryTable, PageDirectory, PageTable};

    use super::layout::{KernelLayout, WINDOW};
    use super::{
        apply_memory_map, locate_memory_map, memory_ceiling, print_memory_map,
        reserve_boot_frames, BootError, ByteSize, MemoryContext,
    };
    use crate::arch::mmu::Mmu;

    /// Aliases the page directory and all page tables, see [`PageDirectory::bootstrap`].
    static mut WINDOW_TABLE: PageTable = PageTable::zeroed();

    /// Runs the steps listed in the [module documentation](super).
    ///
    /// ### Safety
    ///
    /// Must be called once, with `boot_directory` being the identity-mapped directory that is
    /// loaded in `cr3`, and `layout` describing the running kernel.
    pub unsafe fn init(
        boot_info: &BootInfo,
        boot_directory: NonNull<DirectoryTable>,
        layout: &KernelLayout,
        mmu: &mut Mmu,
    ) -> Result<MemoryContext, BootError> {
        let mmap = boot_info.memory_map_buffer()?;
        debug!("Memory map @ {:#x}, {} bytes", mmap.address, mmap.length);

        let window_table = unsafe { &mut *addr_of_mut!(WINDOW_TABLE) };
        let boot_directory_phys = types::PhysAddr::new(boot_directory.as_ptr() as u32);
        let mut directory = unsafe {
            PageDirectory::bootstrap(
                boot_directory,
                boot_directory_phys,
                window_table,
                WINDOW,
                mmu,
            )
        };
        debug!("Took over page directory @ {}", directory.physical_addr());

        let mut bootstrap = BootstrapAllocator::new(&directory, layout.kernel_image());

        let mmap_addr = locate_memory_map(&directory, mmap)?;
        let memory_map = unsafe {
            // SAFETY: Mapped contiguously as checked above, and nothing writes to it.
            MemoryMapIter::from_raw_parts(mmap_addr.as_ptr(), mmap.length as usize)
        };
        let regions = memory_map.map(types::mem::MemoryRegion::from);
        print_memory_map(regions.clone());

        let ceiling = memory_ceiling(regions.clone());
        let bitmap_layout = BitmapLayout::for_memory_ceiling(ceiling);
        debug!(
            "Memory ceiling {ceiling:#x}: {} frames, {} bytes of bitmap",
            bitmap_layout.frame_count(),
            bitmap_layout.size()
        );

        let storage_addr = bootstrap.alloc(&mut directory, bitmap_layout.size(), mmu)?;
        let storage = unsafe {
            // SAFETY: Freshly mapped, page aligned and used for nothing else.
            core::slice::from_raw_parts_mut(
                storage_addr.as_mut_ptr::<u32>(),
                bitmap_layout.word_count(),
            )
        };
        let mut frames = bitmap_layout.install(storage)?;

        reserve_boot_frames(&mut frames, layout, bootstrap.claimed_frames());
        frames.set_from_page_directory(&directory);
        apply_memory_map(&mut frames, regions);

        for page in layout.bootstrap_pages() {
            directory.unmap(page, mmu);
        }
        debug!("Unmapped bootstrap image");

        info!(
            "Physical memory: {} frames tracked, {} used, {} free (bitmap: {} @ {storage_addr})",
            frames.frame_count(),
            frames.used_frames(),
            frames.free_frames(),
            ByteSize::from(bitmap_layout.size())
        );

        Ok(MemoryContext { directory, frames })
    }
}

/// Finds the virtual address of the memory map buffer. Every page of the buffer must be mapped, and
/// mapped contiguously, through the lowest aliases of its frames.
pub fn locate_memory_map(
    directory: &PageDirectory,
    buffer: MemoryMapBuffer,
) -> Result<VirtAddr, BootError> {
    let start = PhysAddr::new(buffer.address);
    let base = directory
        .physical_to_virtual(start)
        .ok_or(BootError::MemoryMapInaccessible { address: start })?;

    let first_frame = start.align_down().as_u32();
    let last = buffer
        .address
        .saturating_add(buffer.length.saturating_sub(1));
    let last_frame = PhysAddr::new(last).align_down().as_u32();

    let mut frame = first_frame;
    while frame < last_frame {
        frame += PAGE_SIZE as u32;
        let expected = base.align_down() + (frame - first_frame);
        if directory.physical_to_virtual(PhysAddr::new(frame)) != Some(expected) {
            return Err(BootError::MemoryMapInaccessible {
                address: PhysAddr::new(frame),
            });
        }
    }
    Ok(base)
}

/// Highest end address of any available region, limited to 4 GiB. Regions starting above 4 GiB
/// are skipped.
pub fn memory_ceiling(regions: impl Iterator<Item = MemoryRegion>) -> u64 {
    regions
        .filter(MemoryRegion::is_usable)
        .filter_map(|region| {
            if region.base_addr >= ADDRESS_LIMIT {
                warn!("Ignoring memory above 4 GiB: {region}");
                return None;
            }
            Some(region.end_addr().min(ADDRESS_LIMIT))
        })
        .max()
        .unwrap_or(0)
}

/// Marks everything the kernel occupies or must not touch: the first megabyte, the bootstrap and
/// kernel images and the frames claimed by the bootstrap allocator.
pub fn reserve_boot_frames(
    frames: &mut FrameBitmap,
    layout: &KernelLayout,
    claimed: core::ops::Range<usize>,
) {
    frames.set_range(PhysAddr::new(0), frames_for(FIRST_MEGABYTE as u64) as usize);

    let (start, count) = layout.bootstrap_frames();
    debug!("Bootstrap image: {count} frames @ {start}");
    frames.set_range(start, count);

    let (start, count) = layout.kernel_frames();
    debug!("Kernel image: {count} frames @ {start}");
    frames.set_range(start, count);

    debug!(
        "Bootstrap allocations: {} frames @ {}",
        claimed.len(),
        PhysAddr::from_frame(claimed.start)
    );
    frames.set_range(PhysAddr::from_frame(claimed.start), claimed.len());
}

/// Marks every region that is not available as used and returns how many regions were marked.
pub fn apply_memory_map(
    frames: &mut FrameBitmap,
    regions: impl Iterator<Item = MemoryRegion>,
) -> usize {
    let mut marked = 0;
    for region in regions.filter(|region| !region.is_usable()) {
        if region.base_addr >= ADDRESS_LIMIT {
            warn!("Skipping region above 4 GiB: {region}");
            continue;
        }
        if !region.is_addressable() {
            warn!("Only tracking the part below 4 GiB of {region}");
        }
        frames.mark_region(&region);
        marked += 1;
    }
    marked
}

/// Prints the bootloader-provided memory map to the kernel log.
pub fn print_memory_map(memory_map: impl Iterator<Item = MemoryRegion>) {
    info!("Bootloader-provided memory map:");

    let total_bytes_available = memory_map
        .map(|region| {
            info!("├─ {}", region);
            if region.is_usable() {
                region.length
            } else {
                0
            }
        })
        .sum::<u64>();

    info!(
        "└─ total memory available: {}",
        ByteSize(total_bytes_available)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocators::BitmapLayout;
    use core::ptr::NonNull;
    use paging::{DirectoryTable, PageTable};
    use types::mem::MemoryRegionType::{Available, Reclaimable, Reserved};

    /// What QEMU reports for 128 MiB, plus a bit of RAM above 4 GiB.
    fn qemu_memory_map() -> Vec<MemoryRegion> {
        vec![
            MemoryRegion::new(0x0, 0x9_fc00, Available),
            MemoryRegion::new(0x9_fc00, 0x400, Reserved),
            MemoryRegion::new(0xf_0000, 0x1_0000, Reserved),
            MemoryRegion::new(0x10_0000, 0x7ee_0000, Available),
            MemoryRegion::new(0x7fe_0000, 0x2_0000, Reclaimable),
            MemoryRegion::new(0xfffc_0000, 0x4_0000, Reserved),
            MemoryRegion::new(0x1_0000_0000, 0x1000_0000, Available),
        ]
    }

    fn directory_with_tables(slots: &[usize]) -> PageDirectory {
        let mut directory = unsafe {
            PageDirectory::from_raw_parts(
                NonNull::from(Box::leak(Box::new(DirectoryTable::zeroed()))),
                PhysAddr::new(0x1000),
            )
        };
        for (n, &slot) in slots.iter().enumerate() {
            let table = NonNull::from(Box::leak(Box::new(PageTable::zeroed())));
            unsafe { directory.install_table(slot, PhysAddr::from_frame(0x300 + n), table) };
        }
        directory
    }

    #[test]
    fn ceiling_is_highest_available_address() {
        assert_eq!(memory_ceiling(qemu_memory_map().into_iter()), 0x7fe_0000);
        assert_eq!(memory_ceiling(core::iter::empty()), 0);
    }

    #[test]
    fn ceiling_is_clamped_to_four_gib() {
        let map = [MemoryRegion::new(0xf000_0000, 0x2000_0000, Available)];
        assert_eq!(memory_ceiling(map.into_iter()), ADDRESS_LIMIT);
    }

    #[test]
    fn memory_map_marks_reserved_regions() {
        let layout = BitmapLayout::for_memory_ceiling(0x7fe_0000);
        let mut storage = vec![0u32; layout.word_count()];
        let mut frames = layout.install(&mut storage).unwrap();

        let marked = apply_memory_map(&mut frames, qemu_memory_map().into_iter());
        assert_eq!(marked, 4);

        assert!(!frames.test(PhysAddr::new(0x9_e000)));
        assert!(frames.test(PhysAddr::new(0x9_f000)));
        assert!(!frames.test(PhysAddr::new(0xa_0000)));
        assert!(frames.test(PhysAddr::new(0xf_0000)));
        assert!(frames.test(PhysAddr::new(0xf_f000)));
        assert!(!frames.test(PhysAddr::new(0x10_0000)));
        assert!(!frames.test(PhysAddr::new(0x7fd_f000)));
        assert_eq!(frames.used_frames(), 1 + 16);
    }

    #[test]
    fn straddling_region_is_clamped() {
        let layout = BitmapLayout::for_memory_ceiling(ADDRESS_LIMIT);
        let mut storage = vec![0u32; layout.word_count()];
        let mut frames = layout.install(&mut storage).unwrap();

        let map = [
            MemoryRegion::new(0xffff_e000, 0x4000, Reserved),
            MemoryRegion::new(0x1_0000_0000, 0x1000, Reserved),
        ];
        assert_eq!(apply_memory_map(&mut frames, map.into_iter()), 1);
        assert!(frames.test(PhysAddr::new(0xffff_e000)));
        assert!(frames.test(PhysAddr::new(0xffff_f000)));
        assert_eq!(frames.used_frames(), 2);
    }

    #[test]
    fn boot_frames_are_reserved() {
        let layout = KernelLayout {
            bootstrap_start: PhysAddr::new(0x10_0000),
            bootstrap_end: PhysAddr::new(0x10_4000),
            kernel_start: PhysAddr::new(0x10_4000),
            kernel_end: PhysAddr::new(0x12_0000),
        };
        let bitmap_layout = BitmapLayout::for_memory_ceiling(0x100_0000);
        let mut storage = vec![0u32; bitmap_layout.word_count()];
        let mut frames = bitmap_layout.install(&mut storage).unwrap();

        reserve_boot_frames(&mut frames, &layout, 0x120..0x121);

        assert_eq!(frames.used_frames(), 0x121);
        assert_eq!(frames.next_free(), Some(0x121));
    }

    #[test]
    fn memory_map_found_through_lowest_alias() {
        let mut directory = directory_with_tables(&[0, 768]);
        for frame in [0x9, 0xa] {
            let phys = PhysAddr::from_frame(frame);
            directory
                .map(VirtAddr::new(phys.as_u32()), phys, true, true)
                .unwrap();
            directory
                .map(VirtAddr::new(0xc000_0000 + phys.as_u32()), phys, true, true)
                .unwrap();
        }

        let buffer = MemoryMapBuffer {
            address: 0x9f00,
            length: 0x200,
        };
        assert_eq!(
            locate_memory_map(&directory, buffer).unwrap(),
            VirtAddr::new(0x9f00)
        );
    }

    #[test]
    fn unmapped_memory_map_is_inaccessible() {
        let mut directory = directory_with_tables(&[0]);
        directory
            .map(VirtAddr::new(0x9000), PhysAddr::new(0x9000), true, true)
            .unwrap();

        let straddling = MemoryMapBuffer {
            address: 0x9f00,
            length: 0x200,
        };
        assert!(matches!(
            locate_memory_map(&directory, straddling),
            Err(BootError::MemoryMapInaccessible { address }) if address == PhysAddr::new(0xa000)
        ));

        let elsewhere = MemoryMapBuffer {
            address: 0x2_0000,
            length: 0x90,
        };
        assert!(matches!(
            locate_memory_map(&directory, elsewhere),
            Err(BootError::MemoryMapInaccessible { address }) if address == PhysAddr::new(0x2_0000)
        ));
    }
}
