//! On the x86-32 architecture, this kernel uses the `multiboot` boot protocol. Please check the
//! specification for details on how it works.
//!
//! The bootloader enters [`multiboot_start()`] with paging disabled. Everything up to the switch to
//! the higher half lives in the bootstrap image (sections `.boot.*`), which is linked at its
//! physical address. The rest of the kernel is linked at [`KERNEL_BASE`] plus its physical address.

use core::ffi::c_void;
use core::ptr::{addr_of_mut, NonNull};

use log::{debug, info};
use multiboot::BootInfo;
use paging::{DirectoryTable, PageTable};

use crate::arch::mmu::Mmu;
use crate::config::BootConfig;
use crate::mem::layout::{KernelLayout, BOOT_STACK_TOP, KERNEL_BASE, KERNEL_SLOT};

/// Multiboot specification requires multiboot header to be present in the first 8K of the kernel
/// binary for the bootloader to search for. It signals to the bootloader that the kernel is
/// multiboot-compliant. Also, the kernel can request features from the bootloader via flags.
#[used]
#[link_section = ".multiboot"]
static MULTIBOOT_HEADER: multiboot::Header = multiboot::HeaderBuilder::new()
    .request_aligned_modules()
    .request_memory_map()
    .build();

/// The page directory loaded by [`multiboot_start()`]. Taken over by the memory subsystem later on.
#[export_name = "_b_page_directory"]
#[link_section = ".boot.data"]
static mut BOOT_PAGE_DIRECTORY: DirectoryTable = DirectoryTable::zeroed();

/// Identity mapping of the first MiB and the bootstrap image.
#[link_section = ".boot.data"]
static mut BOOT_IDENTITY_TABLE: PageTable = PageTable::zeroed();

/// Maps physical `0.._end_pa` at [`KERNEL_BASE`].
#[link_section = ".boot.data"]
static mut BOOT_KERNEL_TABLE: PageTable = PageTable::zeroed();

/// The entry point is the first code that gets executed once the bootloader passes control to the
/// kernel. The linker script makes it the entry point of the ELF file, which is where the
/// bootloader jumps to.
///
/// 1. Save the multiboot magic value (`eax`) and information structure pointer (`ebx`).
/// 2. Fill the boot page tables: identity map everything below `_b_end` and map `0.._end_pa` at
///    [`KERNEL_BASE`]. Entries are present and writable.
/// 3. Install both tables in the boot page directory, load it into `cr3` and enable paging.
/// 4. Jump to [`higher_half_start()`] with the saved values back in `eax` and `ebx`.
#[unsafe(naked)]
#[no_mangle]
#[link_section = ".boot.text"]
unsafe extern "C" fn multiboot_start() -> ! {
    // Exact machine state at this point is defined by the multiboot specification.
    // * `eax`: Must contain magic value `0x2BADB002`.
    // * `ebx`: Contains the physical address of the multiboot information structure.
    // * `esp`: Stack pointer is in an undefined state. Nothing here touches the stack.
    core::arch::naked_asm!(
        "mov %eax, %esi",
        "mov %ebx, %edi",
        // Identity mapping
        "xor %ecx, %ecx",
        "2:",
        "mov %ecx, %edx",
        "shl $12, %edx",
        "cmp $_b_end, %edx",
        "jae 3f",
        "or $3, %edx",
        "mov %edx, {identity}(,%ecx,4)",
        "inc %ecx",
        "jmp 2b",
        // Kernel mapping
        "3:",
        "xor %ecx, %ecx",
        "4:",
        "mov %ecx, %edx",
        "shl $12, %edx",
        "cmp $_end_pa, %edx",
        "jae 5f",
        "or $3, %edx",
        "mov %edx, {kernel}(,%ecx,4)",
        "inc %ecx",
        "jmp 4b",
        "5:",
        "movl ${identity} + 3, {directory}",
        "movl ${kernel} + 3, {directory} + {kernel_entry}",
        "mov ${directory}, %ecx",
        "mov %ecx, %cr3",
        "mov %cr0, %ecx",
        "or $0x80000000, %ecx",
        "mov %ecx, %cr0",
        "mov %esi, %eax",
        "mov %edi, %ebx",
        "mov ${higher_half}, %ecx",
        "jmp *%ecx",
        identity = sym BOOT_IDENTITY_TABLE,
        kernel = sym BOOT_KERNEL_TABLE,
        directory = sym BOOT_PAGE_DIRECTORY,
        kernel_entry = const KERNEL_SLOT * 4,
        higher_half = sym higher_half_start,
        options(att_syntax)
    );
}

/// First code running at a higher-half address. Sets up the boot stack, which lies in the kernel
/// mapping, clears the BSS and calls [`multiboot_main()`] with the magic value and the information
/// structure pointer.
#[unsafe(naked)]
unsafe extern "C" fn higher_half_start() -> ! {
    core::arch::naked_asm!(
        "mov ${stack_top}, %esp",
        "push %ebx",
        "push %eax",
        "call {clear_bss}",
        "call {main}",
        "ud2",
        stack_top = const BOOT_STACK_TOP,
        clear_bss = sym super::clear_bss,
        main = sym multiboot_main,
        options(att_syntax)
    );
}

/// Coming from [`higher_half_start()`], this is the first true Rust code that gets executed after
/// the bootloader passes control to the kernel. Its tasks are:
///
/// 1. Initialize the kernel log and apply the command line.
/// 2. Verify the multiboot magic value and information structure pointer.
/// 3. Initialize the memory subsystem based on the memory map provided by the bootloader via the
///    multiboot information structure.
extern "C" fn multiboot_main(magic: u32, mb_ptr: *const c_void) -> ! {
    crate::logging::initialize_kernel_log();
    info!("Kernel v{}", env!("CARGO_PKG_VERSION"));

    debug!("Multiboot structure @ {:?}", mb_ptr);
    let multiboot = match unsafe {
        // Safety: The structure is identity mapped and never mutated.
        BootInfo::from_addr(magic, mb_ptr)
    } {
        Ok(multiboot) => multiboot,
        Err(err) => crate::die(format_args!("Invalid boot information: {err}")),
    };
    debug!("Multiboot dump: {:?}", multiboot);

    let config = multiboot
        .command_line()
        .and_then(|cmdline| cmdline.to_str().ok())
        .map(BootConfig::from_command_line)
        .unwrap_or_default();
    crate::logging::apply_config(&config);

    let (layout, mut mmu) = unsafe { (KernelLayout::from_linker(), Mmu::new()) };
    debug!("Kernel layout: {:x?}", layout);

    let boot_directory = unsafe {
        // SAFETY: A static is never null.
        NonNull::new_unchecked(addr_of_mut!(BOOT_PAGE_DIRECTORY))
    };
    let _memory = match unsafe { crate::mem::init(&multiboot, boot_directory, &layout, &mut mmu) }
    {
        Ok(memory) => memory,
        Err(err) => crate::die(format_args!("Memory initialization failed: {err}")),
    };
    info!("Memory subsystem ready, halting");

    crate::arch::halt_core();
}
