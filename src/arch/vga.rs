//! Last-resort output to VGA text memory, for when the kernel is about to halt and nobody may be
//! watching the debug console.

use core::fmt::Write;

use crate::mem::layout::KERNEL_BASE;

/// Text buffer at physical `0xb8000`, reached through the kernel's higher-half mapping.
const TEXT_BUFFER: usize = (KERNEL_BASE + 0xb_8000) as usize;
const COLUMNS: usize = 80;
const ROWS: usize = 25;

/// White on red.
const FATAL_ATTRIBUTE: u16 = 0x4f00;

struct FatalWriter {
    cell: usize,
}

impl Write for FatalWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            if self.cell >= COLUMNS * ROWS {
                break;
            }
            if byte == b'\n' {
                self.cell += COLUMNS - self.cell % COLUMNS;
                continue;
            }
            let character = if byte.is_ascii() { byte } else { b'?' };
            unsafe {
                // SAFETY: `cell` is within the 80x25 text buffer, which the kernel table maps.
                core::ptr::write_volatile(
                    (TEXT_BUFFER as *mut u16).add(self.cell),
                    FATAL_ATTRIBUTE | character as u16,
                );
            }
            self.cell += 1;
        }
        Ok(())
    }
}

/// Writes `message` to the top of the screen.
pub fn print_fatal(message: core::fmt::Arguments) {
    let _ = FatalWriter { cell: 0 }.write_fmt(message);
}
