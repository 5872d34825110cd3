use core::arch::asm;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod io;

#[cfg(target_arch = "x86")]
pub mod mmu;

#[cfg(target_arch = "x86")]
pub mod vga;

/// Disable interrupts and stop execution on this core indefinitely.
#[inline(always)]
pub fn halt_core() -> ! {
    irq_disable();
    loop {
        wait_for_irq();
    }
}

#[inline(always)]
fn wait_for_irq() {
    unsafe {
        asm!("hlt", options(nomem, nostack));
    }
}

#[inline(always)]
fn irq_disable() {
    unsafe {
        asm!("cli", options(nomem, nostack));
    }
}
