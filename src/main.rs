#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

mod arch;

mod boot;

mod config;

mod logging;

mod mem;

/// Reports an unrecoverable error and halts. Used for every fatal condition during boot, as the
/// kernel has nothing to unwind to.
#[cfg_attr(test, allow(dead_code))]
fn die(reason: core::fmt::Arguments) -> ! {
    log::error!("{reason}");
    #[cfg(target_arch = "x86")]
    arch::vga::print_fatal(reason);
    arch::halt_core();
}

/// The panic handler is called whenever the kernel encountered an unrecoverable error. It's purpose
/// is to halt the system and report debug information to the user.
#[cfg(not(test))]
#[panic_handler]
fn panic(reason: &core::panic::PanicInfo) -> ! {
    die(format_args!("Halting due to unrecoverable kernel panic:\n{}", reason));
}
