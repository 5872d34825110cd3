//! This crate contains the structures used to implement the multiboot boot protocol as defined in
//! the corresponding specification:
//!
//! https://www.gnu.org/software/grub/manual/multiboot/multiboot.html (version 0.6.96)

#![cfg_attr(not(test), no_std)]

mod header;
mod mmap;

pub use header::*;
pub use mmap::*;

/// Value the bootloader leaves in `eax` when it hands over to a multiboot kernel.
pub const BOOTLOADER_MAGIC: u32 = 0x2bad_b002;

/// Reasons for rejecting the information handed over by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BootInfoError {
    #[error("multiboot magic value mismatch: {0:#010x}")]
    BadMagic(u32),
    #[error("multiboot information structure pointer is null")]
    NullPointer,
    #[error("multiboot information structure pointer is misaligned")]
    Misaligned,
    #[error("bootloader did not provide a memory map")]
    MissingMemoryMap,
}

#[derive(Clone)]
pub struct BootInfo<'mb> {
    inner: &'mb InnerBootInfo,
}

impl BootInfo<'_> {
    /// Check multiboot magic value and try to dereference pointer to information structure.
    ///
    /// ### Safety
    ///
    /// If non-null, the multiboot pointer has to be readable at its current address and must not be
    /// mutated during the `'mb` lifetime.
    pub unsafe fn from_addr<'mb>(
        magic: u32,
        mb_ptr: *const core::ffi::c_void,
    ) -> Result<BootInfo<'mb>, BootInfoError> {
        let mb_ptr = mb_ptr.cast::<InnerBootInfo>();
        if magic != BOOTLOADER_MAGIC {
            return Err(BootInfoError::BadMagic(magic));
        }
        if mb_ptr.is_null() {
            return Err(BootInfoError::NullPointer);
        }
        if !mb_ptr.is_aligned() {
            return Err(BootInfoError::Misaligned);
        }
        let inner = unsafe {
            // SAFETY: Checked for null and alignment, readability is up to the caller.
            &*mb_ptr
        };
        Ok(inner.into())
    }
}

impl<'mb> From<&'mb InnerBootInfo> for BootInfo<'mb> {
    fn from(inner: &'mb InnerBootInfo) -> Self {
        Self { inner }
    }
}

impl core::ops::Deref for BootInfo<'_> {
    type Target = InnerBootInfo;

    fn deref(&self) -> &Self::Target {
        self.inner
    }
}

impl core::fmt::Debug for BootInfo<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Multiboot")
            .field("flags", &self.inner.flags)
            .field("basic_memory", &self.inner.basic_memory())
            .field("mmap", &self.inner.memory_map_buffer().ok())
            .finish_non_exhaustive()
    }
}

/// When the bootloader (e.g. GRUB) transfers control to the kernel, an instance of this struct is
/// passed along to the kernel. It contains information vital to the kernel startup procedure.
#[repr(C)]
#[derive(Debug)]
pub struct InnerBootInfo {
    /// Indicates the presence and validity of other fields in the Multiboot information structure.
    /// Any set bits that the operating system does not understand should be ignored.
    flags: BootInfoFlags,

    /// Amount of lower memory in KiB, starting at address 0. Valid if bit 0 of `flags` is set.
    mem_lower: u32,

    /// Amount of upper memory in KiB, starting at 1 MiB. Valid if bit 0 of `flags` is set.
    mem_upper: u32,

    _boot_device: u32,

    /// If bit 2 of the `flags` word is set, the `cmdline` field is valid, and contains the
    /// physical address of the command line to be passed to the kernel. The command line is a
    /// normal C-style zero-terminated string.
    cmdline: u32,

    _mods_count: u32,

    _mods_addr: u32,

    _syms: [u32; 4],

    /// Total size of the memory map buffer in bytes. Valid if bit 6 of `flags` is set.
    mmap_length: u32,

    /// Physical address of the memory map buffer. Valid if bit 6 of `flags` is set. For the
    /// layout of the entries see [`MemoryMapIter`].
    mmap_addr: u32,
}

/// Physical location of the bootloader-provided memory map. It is not dereferenced here since the
/// buffer may not be reachable through the current address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapBuffer {
    pub address: u32,
    pub length: u32,
}

impl InnerBootInfo {
    /// Returns the kernel command line if it has been passed by the bootloader and is valid. The
    /// command line pointer is physical, so this must only be called while it is identity-mapped.
    pub fn command_line(&self) -> Option<&core::ffi::CStr> {
        let cmdline_ptr = self.cmdline as usize as *const core::ffi::c_char;
        if self.flags.is_cmdline_valid() && !cmdline_ptr.is_null() {
            Some(unsafe { core::ffi::CStr::from_ptr(cmdline_ptr) })
        } else {
            None
        }
    }

    /// Returns the amount of lower and upper memory in KiB, if reported.
    pub fn basic_memory(&self) -> Option<(u32, u32)> {
        self.flags
            .is_memory_valid()
            .then_some((self.mem_lower, self.mem_upper))
    }

    /// Returns the physical location of the memory map, or an error if the bootloader didn't
    /// provide one.
    pub fn memory_map_buffer(&self) -> Result<MemoryMapBuffer, BootInfoError> {
        if self.flags.is_mmap_valid() && self.mmap_addr != 0 {
            Ok(MemoryMapBuffer {
                address: self.mmap_addr,
                length: self.mmap_length,
            })
        } else {
            Err(BootInfoError::MissingMemoryMap)
        }
    }
}

#[derive(Clone)]
#[repr(transparent)]
struct BootInfoFlags(u32);

impl BootInfoFlags {
    const fn bits() -> &'static [(&'static str, usize)] {
        &[
            ("MEM", 0),
            ("BOOTDEV", 1),
            ("CMDLINE", 2),
            ("MODS", 3),
            ("SYMBOLS", 4),
            ("ELFSHT", 5),
            ("MMAP", 6),
            ("DRV", 7),
            ("CFG", 8),
            ("BLDR", 9),
            ("APM", 10),
            ("VBE", 11),
            ("FBR", 12),
        ]
    }

    fn is_nth_bit_set(&self, bit: usize) -> bool {
        self.0 & (1 << bit) as u32 != 0
    }

    fn is_memory_valid(&self) -> bool {
        self.is_nth_bit_set(0)
    }

    fn is_cmdline_valid(&self) -> bool {
        self.is_nth_bit_set(2)
    }

    fn is_mmap_valid(&self) -> bool {
        self.is_nth_bit_set(6)
    }
}

impl core::fmt::Debug for BootInfoFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{{ ")?;
        for flag_set in Self::bits()
            .iter()
            .filter_map(|(name, bit)| self.is_nth_bit_set(*bit).then_some(name))
        {
            write!(f, "{flag_set}, ")?;
        }
        write!(f, ".. }}")
    }
}
