//! # Paging for IA-32 (x86, non-PAE)
//!
//! Two-level translation of 32-bit virtual addresses:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! The page directory selects one of 1024 page tables, each page table maps 1024 pages of 4 KiB, so
//! one directory slot covers a 4 MiB window of virtual memory.
//!
//! The hardware only knows the *physical* address of each page table. To edit tables through plain
//! pointers the kernel aliases every table into a dedicated directory slot, the translation window
//! (see [`PageDirectory::bootstrap`]). [`PageDirectory`] owns both views and keeps them in lock-step.
//!
//! Nothing in this crate flushes the TLB on its own except where documented. Callers that change an
//! active mapping through [`PageTableEntry::map`] or [`PageDirectory::map`] must invalidate it via a
//! [`TranslationCache`] right afterwards.

#![cfg_attr(not(test), no_std)]

mod directory;
mod entry;
mod table;
mod tlb;

pub use directory::{PageDirectory, TranslationWindow};
pub use entry::{DirectoryEntry, PageTableEntry};
pub use table::{DirectoryTable, PageTable, ENTRIES_PER_TABLE};
pub use tlb::TranslationCache;

/// Errors returned by page directory manipulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PagingError {
    #[error("no page table present in directory slot {index}")]
    TableNotPresent { index: usize },
}
