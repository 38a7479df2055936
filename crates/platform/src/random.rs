//! Randomness source
//!
//! Buffer contents only need to differ between buffers and between runs so
//! that a stale or partial copy cannot pass the comparison by accident. The
//! source does not need to be cryptographically strong.

/// Source of pseudo-random 32-bit words (the host's `get_random_u32`)
pub trait RandomSource {
    /// Next pseudo-random word
    fn next_u32(&mut self) -> u32;
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn next_u32(&mut self) -> u32 {
        (**self).next_u32()
    }
}
