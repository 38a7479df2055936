//! CRC-32 over buffer contents
//!
//! The host's `crc32_le(seed, p, len)` convention: reflected polynomial
//! 0xEDB88320, register seeded with `seed`, no final inversion. crc32fast
//! implements the IEEE variant (pre- and post-inverted), so the seed and
//! the result are inverted around it.

use crc32fast::Hasher;

/// Little-endian CRC-32 of `data` starting from register value `seed`
///
/// Chainable: `crc32_le(crc32_le(s, a), b) == crc32_le(s, a ++ b)`.
pub fn crc32_le(seed: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(!seed);
    hasher.update(data);
    !hasher.finalize()
}
