//! Translation lookaside buffer maintenance on IA-32.

use paging::TranslationCache;
use types::VirtAddr;

/// Handle to the MMU of the boot processor.
pub struct Mmu {
    _private: (),
}

impl Mmu {
    /// ### Safety
    ///
    /// Paging must be enabled and there must be a single instance, used from the boot processor
    /// only.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl TranslationCache for Mmu {
    /// Reloads `cr3`, dropping every non-global translation.
    fn flush_all(&mut self) {
        unsafe {
            core::arch::asm!(
                "mov %cr3, {tmp}",
                "mov {tmp}, %cr3",
                tmp = out(reg) _,
                options(att_syntax, nostack, preserves_flags)
            );
        }
    }

    fn invalidate(&mut self, addr: VirtAddr) {
        unsafe {
            core::arch::asm!(
                "invlpg ({addr})",
                addr = in(reg) addr.as_usize(),
                options(att_syntax, nostack, preserves_flags)
            );
        }
    }
}
