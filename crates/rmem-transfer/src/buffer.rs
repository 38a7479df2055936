//! Test buffers
//!
//! A [`Buffer`] is the exclusive owner of one [`MemoryView`] for the
//! duration of a run: `src` and `dst` come from the coherent allocator,
//! `fix` from the write-combined mapping of the fixed region.

use core::fmt;

use platform::{MemoryView, PhysAddr, RandomSource};

use crate::checksum::crc32_le;

/// Which of the three run buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferRole {
    /// Coherent source buffer
    Src,
    /// Write-combined window onto the fixed region
    Fix,
    /// Coherent destination buffer
    Dst,
}

impl BufferRole {
    /// Label used in log lines
    pub const fn label(self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::Fix => "fix",
            Self::Dst => "dst",
        }
    }
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One run buffer
#[derive(Debug)]
pub struct Buffer {
    view: MemoryView,
    role: BufferRole,
}

impl Buffer {
    /// Wrap a view produced by a [`platform::ReservedMemory`] implementation.
    ///
    /// The trait's safety contract is what makes the byte accessors sound.
    pub(crate) fn new(view: MemoryView, role: BufferRole) -> Self {
        Self { view, role }
    }

    /// Give the view back for release
    pub(crate) fn into_view(self) -> MemoryView {
        self.view
    }

    /// Role of this buffer
    pub fn role(&self) -> BufferRole {
        self.role
    }

    /// Bus address of the first byte
    pub fn phys(&self) -> PhysAddr {
        self.view.phys
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.view.len
    }

    /// Zero-length buffer
    pub fn is_empty(&self) -> bool {
        self.view.len == 0
    }

    /// Current contents
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: ReservedMemory guarantees the view is valid for `len`
        // bytes and unaliased while we own it.
        unsafe { core::slice::from_raw_parts(self.view.virt.as_ptr(), self.view.len) }
    }

    /// Current contents, writable
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for as_bytes; `&mut self` makes the borrow exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.view.virt.as_ptr(), self.view.len) }
    }

    /// CRC-32 of the current contents, seeded with 0
    pub fn checksum(&self) -> u32 {
        crc32_le(0, self.as_bytes())
    }
}

/// Fill all three buffers with pseudo-random 32-bit words.
///
/// Words are drawn interleaved (src, fix, dst, src, ...) so no two buffers
/// share a run of the generator's output. A trailing partial word, if any,
/// is left untouched.
pub fn fill_random<R: RandomSource + ?Sized>(
    src: &mut Buffer,
    fix: &mut Buffer,
    dst: &mut Buffer,
    rng: &mut R,
) {
    let words = src
        .as_bytes_mut()
        .chunks_exact_mut(4)
        .zip(fix.as_bytes_mut().chunks_exact_mut(4))
        .zip(dst.as_bytes_mut().chunks_exact_mut(4));
    for ((s, f), d) in words {
        s.copy_from_slice(&rng.next_u32().to_ne_bytes());
        f.copy_from_slice(&rng.next_u32().to_ne_bytes());
        d.copy_from_slice(&rng.next_u32().to_ne_bytes());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use core::ptr::NonNull;

    struct Counter(u32);

    impl RandomSource for Counter {
        fn next_u32(&mut self) -> u32 {
            self.0 = self.0.wrapping_add(1);
            self.0
        }
    }

    fn buffer(store: &mut [u8], phys: u64, role: BufferRole) -> Buffer {
        Buffer::new(
            MemoryView {
                virt: NonNull::new(store.as_mut_ptr()).unwrap(),
                phys: PhysAddr(phys),
                len: store.len(),
            },
            role,
        )
    }

    #[test]
    fn fill_interleaves_words() {
        let (mut a, mut b, mut c) = ([0u8; 8], [0u8; 8], [0u8; 8]);
        let mut src = buffer(&mut a, 0x1000, BufferRole::Src);
        let mut fix = buffer(&mut b, 0x2000, BufferRole::Fix);
        let mut dst = buffer(&mut c, 0x3000, BufferRole::Dst);
        fill_random(&mut src, &mut fix, &mut dst, &mut Counter(0));

        let word = |buf: &Buffer, i: usize| {
            u32::from_ne_bytes(buf.as_bytes()[i * 4..i * 4 + 4].try_into().unwrap())
        };
        assert_eq!((word(&src, 0), word(&fix, 0), word(&dst, 0)), (1, 2, 3));
        assert_eq!((word(&src, 1), word(&fix, 1), word(&dst, 1)), (4, 5, 6));
    }

    #[test]
    fn checksum_tracks_contents() {
        let mut store = [0u8; 16];
        let mut buf = buffer(&mut store, 0x1000, BufferRole::Src);
        let before = buf.checksum();
        buf.as_bytes_mut()[15] = 0x80;
        assert_ne!(before, buf.checksum());
        assert_eq!(buf.phys(), PhysAddr(0x1000));
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn role_labels() {
        assert_eq!(BufferRole::Src.to_string(), "src");
        assert_eq!(BufferRole::Fix.label(), "fix");
        assert_eq!(format!("{}", BufferRole::Dst), "dst");
    }
}
