use core::ops::ControlFlow;

use paging::PageDirectory;
use types::mem::{MemoryRegion, ADDRESS_LIMIT};
use types::util::{div_ceil, frames_for};
use types::PhysAddr;

const BITS_PER_WORD: usize = u32::BITS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BitmapError {
    #[error("frame bitmap needs {required} bytes of storage, got {provided}")]
    StorageTooSmall { required: usize, provided: usize },
}

/// Size of a frame bitmap covering physical memory up to some ceiling. This is the state before any
/// storage exists; [`BitmapLayout::install`] turns it into a usable [`FrameBitmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapLayout {
    frames: usize,
}

impl BitmapLayout {
    /// Layout tracking every frame below `highest_address`, which is clamped to 4 GiB.
    pub fn for_memory_ceiling(highest_address: u64) -> Self {
        Self {
            frames: frames_for(highest_address.min(ADDRESS_LIMIT)) as usize,
        }
    }

    /// Number of frames the bitmap tracks.
    pub const fn frame_count(&self) -> usize {
        self.frames
    }

    pub const fn word_count(&self) -> usize {
        div_ceil(self.frames as u64, BITS_PER_WORD as u64) as usize
    }

    /// Number of bytes of storage the bitmap needs.
    pub const fn size(&self) -> usize {
        self.word_count() * core::mem::size_of::<u32>()
    }

    /// Installs `storage` as the bitmap and marks all frames free. Storage beyond
    /// [`size`](Self::size) is left untouched.
    pub fn install(self, storage: &mut [u32]) -> Result<FrameBitmap<'_>, BitmapError> {
        let provided = core::mem::size_of_val(storage);
        let words = storage
            .get_mut(..self.word_count())
            .ok_or(BitmapError::StorageTooSmall {
                required: self.size(),
                provided,
            })?;
        words.fill(0);
        Ok(FrameBitmap {
            words,
            frames: self.frames,
        })
    }
}

/// One bit per physical frame, set if the frame is used.
///
/// Frames at or beyond [`frame_count`](Self::frame_count) are outside the bitmap: marking them is a
/// no-op and testing them always reports "used", so nothing can ever hand them out.
pub struct FrameBitmap<'a> {
    words: &'a mut [u32],
    frames: usize,
}

impl FrameBitmap<'_> {
    pub const fn frame_count(&self) -> usize {
        self.frames
    }

    /// Marks the frame containing `addr` as used.
    pub fn set(&mut self, addr: PhysAddr) {
        self.set_frame(addr.frame_number());
    }

    /// Marks the frame containing `addr` as free.
    pub fn clear(&mut self, addr: PhysAddr) {
        if let Some((word, mask)) = self.locate(addr.frame_number()) {
            self.words[word] &= !mask;
        }
    }

    /// Returns `true` if the frame containing `addr` is used or out of range.
    pub fn test(&self, addr: PhysAddr) -> bool {
        match self.locate(addr.frame_number()) {
            Some((word, mask)) => self.words[word] & mask != 0,
            None => true,
        }
    }

    /// Marks `count` consecutive frames starting with the one containing `start` as used.
    pub fn set_range(&mut self, start: PhysAddr, count: usize) {
        let first = start.frame_number();
        let end = first.saturating_add(count).min(self.frames);
        for frame in first..end {
            self.set_frame(frame);
        }
    }

    /// Number of the lowest free frame, or `0` if every tracked frame is used.
    ///
    /// The `0` is ambiguous with frame 0 actually being free, which never happens once the first
    /// megabyte is reserved. Prefer [`next_free`](Self::next_free) for new callers.
    pub fn first_free(&self) -> usize {
        self.next_free().unwrap_or(0)
    }

    /// Number of the lowest free frame, or `None` if every tracked frame is used.
    pub fn next_free(&self) -> Option<usize> {
        let (index, word) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u32::MAX)?;
        let frame = index * BITS_PER_WORD + (!word).trailing_zeros() as usize;
        // Only the padding bits of the last word can lie beyond the tracked frames.
        (frame < self.frames).then_some(frame)
    }

    /// Marks every frame that is mapped by a present page in `directory` as used.
    pub fn set_from_page_directory(&mut self, directory: &PageDirectory) {
        let _: ControlFlow<()> = directory.walk_pages(|_, _, entry| {
            self.set(entry.frame_address());
            ControlFlow::Continue(())
        });
    }

    /// Marks the frames of a non-available memory region as used. Available regions are left
    /// untouched, and so is whatever part of a region lies above 4 GiB.
    pub fn mark_region(&mut self, region: &MemoryRegion) {
        if region.is_usable() || region.base_addr >= ADDRESS_LIMIT {
            return;
        }
        self.set_range(region.first_frame(), region.frame_count());
    }

    /// Padding bits of the last word are never set, so counting bits counts used frames.
    pub fn used_frames(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn free_frames(&self) -> usize {
        self.frames - self.used_frames()
    }

    fn set_frame(&mut self, frame: usize) {
        if let Some((word, mask)) = self.locate(frame) {
            self.words[word] |= mask;
        }
    }

    fn locate(&self, frame: usize) -> Option<(usize, u32)> {
        (frame < self.frames).then(|| (frame / BITS_PER_WORD, 1u32 << (frame % BITS_PER_WORD)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paging::{DirectoryTable, PageTable};
    use types::mem::MemoryRegionType;
    use types::VirtAddr;

    const MIB: u64 = 1024 * 1024;

    fn storage_for(layout: BitmapLayout) -> Vec<u32> {
        vec![u32::MAX; layout.word_count()]
    }

    #[test]
    fn sixteen_mib_layout() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        assert_eq!(layout.frame_count(), 4096);
        assert_eq!(layout.size(), 512);
    }

    #[test]
    fn layout_rounds_partial_frames_and_words() {
        let layout = BitmapLayout::for_memory_ceiling(33 * 4096 + 1);
        assert_eq!(layout.frame_count(), 34);
        assert_eq!(layout.word_count(), 2);
        assert_eq!(layout.size(), 8);

        let layout = BitmapLayout::for_memory_ceiling(u64::MAX);
        assert_eq!(layout.frame_count(), 1 << 20);
        assert_eq!(layout.size(), 128 * 1024);
    }

    #[test]
    fn install_zero_fills_and_checks_size() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut short = vec![0u32; layout.word_count() - 1];
        assert_eq!(
            layout.install(&mut short).err(),
            Some(BitmapError::StorageTooSmall {
                required: 512,
                provided: 508
            })
        );

        let mut storage = storage_for(layout);
        let bitmap = layout.install(&mut storage).unwrap();
        assert_eq!(bitmap.used_frames(), 0);
        assert_eq!(bitmap.free_frames(), 4096);
    }

    #[test]
    fn set_clear_test_across_word_boundaries() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        for frame in [0, 31, 32, 4095] {
            let addr = PhysAddr::from_frame(frame);
            assert!(!bitmap.test(addr));
            bitmap.set(addr);
            assert!(bitmap.test(addr), "frame {frame} should be used");
            bitmap.clear(addr);
            assert!(!bitmap.test(addr), "frame {frame} should be free");
        }
    }

    #[test]
    fn set_range_leaves_neighbours_alone() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        bitmap.set_range(PhysAddr::from_frame(30), 40);
        assert!(!bitmap.test(PhysAddr::from_frame(29)));
        for frame in 30..70 {
            assert!(bitmap.test(PhysAddr::from_frame(frame)));
        }
        assert!(!bitmap.test(PhysAddr::from_frame(70)));
        assert_eq!(bitmap.used_frames(), 40);
    }

    #[test]
    fn out_of_range_frames() {
        let layout = BitmapLayout::for_memory_ceiling(40 * 4096);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        let beyond = PhysAddr::from_frame(40);
        assert!(bitmap.test(beyond));
        assert!(bitmap.test(PhysAddr::new(0xffff_f000)));

        bitmap.clear(beyond);
        assert!(bitmap.test(beyond));

        bitmap.set(beyond);
        bitmap.set_range(PhysAddr::from_frame(38), 10);
        assert_eq!(bitmap.used_frames(), 2);
    }

    #[test]
    fn first_free_scans_upwards() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        assert_eq!(bitmap.first_free(), 0);
        bitmap.set_range(PhysAddr::new(0), 77);
        assert_eq!(bitmap.first_free(), 77);
        assert_eq!(bitmap.next_free(), Some(77));

        bitmap.clear(PhysAddr::from_frame(5));
        assert_eq!(bitmap.first_free(), 5);
    }

    #[test]
    fn first_free_when_everything_is_used() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        bitmap.set_range(PhysAddr::new(0), 4096);
        assert_eq!(bitmap.first_free(), 0);
        assert_eq!(bitmap.next_free(), None);
    }

    #[test]
    fn next_free_ignores_padding_bits() {
        let layout = BitmapLayout::for_memory_ceiling(40 * 4096);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        bitmap.set_range(PhysAddr::new(0), 40);
        assert_eq!(bitmap.next_free(), None);
        assert_eq!(bitmap.first_free(), 0);
    }

    #[test]
    fn reserved_region_is_marked() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        let reserved = MemoryRegion::new(0x10_0000, 0x40_0000, MemoryRegionType::Reserved);
        bitmap.mark_region(&reserved);

        assert!(!bitmap.test(PhysAddr::from_frame(0xff)));
        for frame in 0x100..0x500 {
            assert!(bitmap.test(PhysAddr::from_frame(frame)));
        }
        assert!(!bitmap.test(PhysAddr::from_frame(0x500)));
    }

    #[test]
    fn available_region_is_left_alone() {
        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();

        let available = MemoryRegion::new(0x10_0000, 0x40_0000, MemoryRegionType::Available);
        bitmap.mark_region(&available);
        assert_eq!(bitmap.used_frames(), 0);

        let high = MemoryRegion::new(0x1_0000_0000, 0x1000, MemoryRegionType::Reserved);
        bitmap.mark_region(&high);
        assert_eq!(bitmap.used_frames(), 0);
    }

    #[test]
    fn seeded_from_page_directory() {
        let table = Box::leak(Box::new(PageTable::zeroed()));
        for page in 0..256 {
            table[page].map(PhysAddr::from_frame(page), true, true);
        }
        let mut directory = unsafe {
            PageDirectory::from_raw_parts(
                core::ptr::NonNull::from(Box::leak(Box::new(DirectoryTable::zeroed()))),
                PhysAddr::new(0x1000),
            )
        };
        unsafe {
            directory.install_table(0, PhysAddr::new(0x2000), core::ptr::NonNull::from(table));
        }
        assert!(directory.entry(VirtAddr::new(0xff000)).unwrap().present());

        let layout = BitmapLayout::for_memory_ceiling(16 * MIB);
        let mut storage = storage_for(layout);
        let mut bitmap = layout.install(&mut storage).unwrap();
        bitmap.set_from_page_directory(&directory);

        for frame in 0..256 {
            assert!(bitmap.test(PhysAddr::from_frame(frame)));
        }
        assert!(!bitmap.test(PhysAddr::from_frame(256)));
        assert_eq!(bitmap.first_free(), 256);
    }
}
