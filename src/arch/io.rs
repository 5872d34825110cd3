/// An I/O port. Only byte writes are needed so far.
#[derive(Debug, Clone, Copy)]
pub struct Port(pub u16);

impl Port {
    /// The Bochs/QEMU debug console. Bytes written here show up on the emulator's console.
    pub const DEBUG_CONSOLE: Self = Self(0xe9);

    pub fn write_u8(&self, value: u8) {
        unsafe {
            core::arch::asm!(
                "outb %al, %dx",
                in("al") value,
                in("dx") self.0,
                options(att_syntax, nomem, nostack, preserves_flags)
            );
        }
    }
}
