//! Kernel entry point and boot protocol implementation(s). Usually, the bootloader (e.g. GRUB)
//! loads the kernel into memory and jumps to it. The boot protocol (e.g. multiboot) defines the
//! machine state at that point and any other information that the bootloader passes to the kernel.

#[cfg(target_arch = "x86")]
mod x86;

/// Clears the entire BSS segment of the kernel image. This may corrupt kernel memory if the
/// function is executed after data in the BSS segment has been mutated. Furthermore, this function
/// assumes that the symbols `__bss_start` and `__bss_end` defined in the linker script are valid
/// addresses.
#[cfg(target_arch = "x86")]
unsafe extern "C" fn clear_bss() {
    // Symbols defined by linker script:
    extern "C" {
        /// Start address of the BSS segment.
        static mut __bss_start: u8;

        /// End address of the BSS segment.
        static __bss_end: u8;
    }

    unsafe {
        let start = core::ptr::addr_of_mut!(__bss_start);
        let end = core::ptr::addr_of!(__bss_end);
        core::ptr::write_bytes(start, 0, end as usize - start as usize);
    }
}
