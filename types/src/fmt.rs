use core::fmt::{Display, Formatter, Result};

/// Formats a length in bytes with a binary unit chosen so the printed number stays readable, e.g.
/// `639 KiB` or `3 GiB`. Values are truncated rather than rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for ByteSize {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

impl Display for ByteSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.0 {
            b if b < 10 * 1024 => write!(f, "{b} B"),
            kb if kb < 10 * 1024u64.pow(2) => write!(f, "{} KiB", kb >> 10),
            mb if mb < 10 * 1024u64.pow(3) => write!(f, "{} MiB", mb >> 20),
            gb => write!(f, "{} GiB", gb >> 30),
        }
    }
}
