//! Fixed virtual memory layout and the image boundaries the linker script provides.
//!
//! ```text
//! 0x0000_0000 ─ identity mapping of the first MiB and the bootstrap image (until unmapped)
//! 0xC000_0000 ─ physical 0.._end_pa (kernel image, boot stack, VGA text buffer)
//! 0xC040_0000 ─ translation window: page directory, then every page table
//! ```

use types::util::frames_spanned;
use types::{PhysAddr, VirtAddr, PAGE_SIZE};

use allocators::KernelImage;
use paging::TranslationWindow;

/// Virtual address physical address `0` is mapped at.
pub const KERNEL_BASE: u32 = 0xc000_0000;

/// Directory slot of the kernel table built by the boot code.
pub const KERNEL_SLOT: usize = (KERNEL_BASE >> 22) as usize;

/// Directory slot of the translation window, right after the kernel table.
pub const WINDOW_SLOT: usize = KERNEL_SLOT + 1;

pub const WINDOW: TranslationWindow = TranslationWindow {
    slot: WINDOW_SLOT,
    kernel_base: VirtAddr::new(KERNEL_BASE),
};

/// Real mode memory, BIOS data and ROMs. Never handed out.
pub const FIRST_MEGABYTE: u32 = 0x10_0000;

/// The boot stack grows down from here, below the EBDA in conventional memory.
pub const BOOT_STACK_TOP: u32 = KERNEL_BASE + 0x8_0000;

/// Physical boundaries of the two parts of the kernel binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelLayout {
    /// The bootstrap image: multiboot header, entry code and boot page tables. Linked and run at
    /// its physical address.
    pub bootstrap_start: PhysAddr,
    pub bootstrap_end: PhysAddr,

    /// The kernel proper, linked at `KERNEL_BASE` plus its physical address.
    pub kernel_start: PhysAddr,
    pub kernel_end: PhysAddr,
}

impl KernelLayout {
    /// Reads the boundaries from the symbols defined in `linker.ld`.
    ///
    /// ### Safety
    ///
    /// The kernel must have been linked with `linker.ld`.
    #[cfg(target_arch = "x86")]
    pub unsafe fn from_linker() -> Self {
        extern "C" {
            static _b_start: u8;
            static _b_end: u8;
            static _start_pa: u8;
            static _end_pa: u8;
        }

        let symbol = |addr: *const u8| PhysAddr::new(addr as u32);
        Self {
            bootstrap_start: symbol(core::ptr::addr_of!(_b_start)),
            bootstrap_end: symbol(core::ptr::addr_of!(_b_end)),
            kernel_start: symbol(core::ptr::addr_of!(_start_pa)),
            kernel_end: symbol(core::ptr::addr_of!(_end_pa)),
        }
    }

    /// First frame and frame count of the bootstrap image.
    pub fn bootstrap_frames(&self) -> (PhysAddr, usize) {
        frame_range(self.bootstrap_start, self.bootstrap_end)
    }

    pub fn kernel_frames(&self) -> (PhysAddr, usize) {
        frame_range(self.kernel_start, self.kernel_end)
    }

    pub fn kernel_image(&self) -> KernelImage {
        KernelImage {
            virtual_base: VirtAddr::new(KERNEL_BASE + self.kernel_start.as_u32()),
            physical_end: self.kernel_end,
        }
    }

    /// The identity-mapped pages of the bootstrap image.
    pub fn bootstrap_pages(&self) -> impl Iterator<Item = VirtAddr> {
        let (first, count) = self.bootstrap_frames();
        (0..count).map(move |page| VirtAddr::new(first.as_u32() + (page * PAGE_SIZE) as u32))
    }
}

fn frame_range(start: PhysAddr, end: PhysAddr) -> (PhysAddr, usize) {
    let count = frames_spanned(start.as_u32() as u64, end.as_u32() as u64);
    (start.align_down(), count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: KernelLayout = KernelLayout {
        bootstrap_start: PhysAddr::new(0x10_0000),
        bootstrap_end: PhysAddr::new(0x10_4000),
        kernel_start: PhysAddr::new(0x10_4000),
        kernel_end: PhysAddr::new(0x13_2abc),
    };

    #[test]
    fn window_follows_kernel_table() {
        assert_eq!(KERNEL_SLOT, 768);
        assert_eq!(WINDOW_SLOT, 769);
        assert_eq!(WINDOW.base(), VirtAddr::new(0xc040_0000));
    }

    #[test]
    fn image_frames() {
        assert_eq!(LAYOUT.bootstrap_frames(), (PhysAddr::new(0x10_0000), 4));
        assert_eq!(LAYOUT.kernel_frames(), (PhysAddr::new(0x10_4000), 0x2f));
    }

    #[test]
    fn kernel_image_for_bootstrap_allocator() {
        let image = LAYOUT.kernel_image();
        assert_eq!(image.virtual_base, VirtAddr::new(0xc010_4000));
        assert_eq!(image.physical_end, PhysAddr::new(0x13_2abc));
    }

    #[test]
    fn bootstrap_pages_are_identity_mapped() {
        let pages: Vec<_> = LAYOUT.bootstrap_pages().collect();
        assert_eq!(
            pages,
            [0x10_0000, 0x10_1000, 0x10_2000, 0x10_3000].map(VirtAddr::new)
        );
    }
}
