//! Physical memory allocators used while the kernel boots.
//!
//! * [`FrameBitmap`] tracks every 4 KiB physical frame below the highest address reported by the
//!   bootloader with one bit. Its storage is sized by [`BitmapLayout`] and handed in by the caller.
//! * [`BootstrapAllocator`] is a very stupid allocator that hands out freshly mapped pages before
//!   anything else exists. Its only job is to provide the storage for the [`FrameBitmap`].

#![cfg_attr(not(test), no_std)]

mod bitmap;
mod bootstrap;

pub use bitmap::{BitmapError, BitmapLayout, FrameBitmap};
pub use bootstrap::{BootstrapAllocator, BootstrapError, KernelImage};
