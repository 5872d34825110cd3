//! Every multiboot-compliant kernel needs to have the multiboot header structure within the first
//! 8K of its binary. It is recommended to link it into a custom section of the binary (e.g.
//! `.multiboot`) to make sure that it will actually end up in the first 8K.
//!
//! Example:
//!
//! ```ignore
//! #[used]
//! #[link_section = ".multiboot"]
//! static MULTIBOOT_HEADER: Header = HeaderBuilder::new()
//!     .request_aligned_modules()
//!     .request_memory_map()
//!     .build();
//! ```

/// Magic number identifying the header.
const HEADER_MAGIC: u32 = 0x1bad_b002;

/// The multiboot header must be present in the first 8KB of every multiboot-compliant kernel image.
/// It is used to indicate to the bootloader which features and information the kernel requires.
///
/// Only the mandatory part of the header is modelled. The optional address and graphics fields
/// are only read by the bootloader if flag bits 16 or 2 are set, which this builder never does.
#[derive(Debug, Clone, PartialEq)]
#[repr(C)]
pub struct Header {
    magic: u32,

    /// Bits 0-15 indicate requirements the bootloader must fulfill or refuse to boot. Bits 16-31
    /// indicate optional features.
    flags: u32,

    /// Chosen so that `magic`, `flags` and `checksum` have a 32-bit unsigned sum of zero.
    checksum: u32,
}

const _: [(); 12] = [(); core::mem::size_of::<Header>()];

/// Builder struct to construct a valid multiboot header.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderBuilder {
    flags: u32,
}

impl HeaderBuilder {
    /// Create a new header builder with no flags set. Unlike `Default::default()` this can be used
    /// to initialize a `static`.
    pub const fn new() -> Self {
        Self { flags: 0 }
    }

    /// Requests that any modules loaded by the bootloader be aligned on page boundaries (4K).
    pub const fn request_aligned_modules(self) -> Self {
        Self {
            flags: self.flags | (1 << 0),
        }
    }

    /// Requests memory information (`mem_*` fields and the memory map) from the bootloader.
    pub const fn request_memory_map(self) -> Self {
        Self {
            flags: self.flags | (1 << 1),
        }
    }

    /// Build a valid multiboot header using the selected flags and compute the header checksum.
    pub const fn build(self) -> Header {
        Header {
            magic: HEADER_MAGIC,
            flags: self.flags,
            checksum: (!HEADER_MAGIC.wrapping_add(self.flags)).wrapping_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_sums_to_zero() {
        let header = HeaderBuilder::new()
            .request_aligned_modules()
            .request_memory_map()
            .build();
        assert_eq!(header.flags, 0b11);
        assert_eq!(
            header
                .magic
                .wrapping_add(header.flags)
                .wrapping_add(header.checksum),
            0
        );
    }
}
