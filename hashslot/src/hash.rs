//! Key hashing
//!
//! Generated IDs are often sequential or clustered, and slot indices are
//! taken from the low bits of the hash, so every key goes through an
//! avalanche mixer before masking.

/// Golden ratio multiplier, `2^64 / phi`
const PHI: u64 = 0x9E37_79B9_7F4A_7C15;

/// Multiply-xor-shift mixer for one 64-bit word.
///
/// Folds the well-mixed high bits of the product down into the low bits
/// that the slot mask keeps.
#[inline(always)]
pub fn fast_long_mix(k: u64) -> u64 {
    let h = k.wrapping_mul(PHI);
    let h = h ^ (h >> 32);
    h ^ (h >> 16)
}

/// Hash for a two-word key: the first word's mix seeds the second.
#[inline(always)]
pub fn hash_key_pair(k1: u64, k2: u64) -> u64 {
    fast_long_mix(fast_long_mix(k1).wrapping_add(k2))
}
