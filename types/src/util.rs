//! Integer helpers used wherever frame or page counts are derived from byte sizes.

use crate::addr::PAGE_SIZE;

/// Integer division of `x` by `y`, rounding up. `div_ceil(0, y)` is `0`.
///
/// Written without `x + y - 1` so it can't overflow for values close to `u64::MAX`.
#[inline]
pub const fn div_ceil(x: u64, y: u64) -> u64 {
    if x == 0 {
        0
    } else {
        (x - 1) / y + 1
    }
}

/// Number of 4 KiB frames needed to hold `bytes` bytes.
#[inline]
pub const fn frames_for(bytes: u64) -> u64 {
    div_ceil(bytes, PAGE_SIZE as u64)
}

/// Number of frames touched by the byte range `[start, end)`, including partially covered frames at
/// either end.
#[inline]
pub const fn frames_spanned(start: u64, end: u64) -> u64 {
    if end <= start {
        return 0;
    }
    frames_for(end) - start / PAGE_SIZE as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(div_ceil(0, 4096), 0);
        assert_eq!(div_ceil(1, 4096), 1);
        assert_eq!(div_ceil(4096, 4096), 1);
        assert_eq!(div_ceil(4097, 4096), 2);
        assert_eq!(div_ceil(4096, 32), 128);
    }

    #[test]
    fn no_overflow_near_max() {
        assert_eq!(div_ceil(u64::MAX, 2), 1 << 63);
    }

    #[test]
    fn frames_spanned_counts_partial_frames() {
        assert_eq!(frames_spanned(0x1000, 0x2000), 1);
        assert_eq!(frames_spanned(0x1800, 0x2001), 2);
        assert_eq!(frames_spanned(0x10_0000, 0x50_0000), 0x400);
        assert_eq!(frames_spanned(0x2000, 0x2000), 0);
    }
}
