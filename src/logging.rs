//! Kernel log, written to the emulator's debug console.

use core::fmt::Write;
use log::{Level, LevelFilter, Metadata, Record};

use crate::config::BootConfig;

/// Global instance of the kernel logger.
static LOGGER: KernelLog = KernelLog;

/// Installs the kernel log at level `Info`. Calling this more than once has no effect.
pub fn initialize_kernel_log() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Switches to the log level requested on the command line.
pub fn apply_config(config: &BootConfig) {
    log::set_max_level(config.log_level);
}

struct KernelLog;

impl log::Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = write_record(&mut DebugWriter, record.level(), *record.args());
        }
    }

    fn flush(&self) {}
}

fn write_record(
    out: &mut impl Write,
    level: Level,
    args: core::fmt::Arguments,
) -> core::fmt::Result {
    writeln!(out, "[{level:<5}] {args}")
}

struct DebugWriter;

impl Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.bytes() {
            crate::arch::io::Port::DEBUG_CONSOLE.write_u8(c);
        }
        Ok(())
    }
}
