//! Plain data types shared by the kernel and its memory management crates: physical and virtual
//! addresses, bootloader memory regions and a few formatting and arithmetic helpers.

#![cfg_attr(not(test), no_std)]

pub mod addr;
pub mod fmt;
pub mod mem;
pub mod util;

pub use addr::{PhysAddr, VirtAddr, PAGE_SIZE};
