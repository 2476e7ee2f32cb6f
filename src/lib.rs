#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use core::hash::BuildHasher;
use core::hash::Hash;

/// Positional sparse storage underneath pages and the index.
pub mod arena;

/// Error type shared by page and index operations.
pub mod error;

pub mod index;

pub mod page;

/// Stored entries and the equality policies that compare them.
pub mod slot;

pub use arena::Arena;
pub use error::Error;
pub use error::Result;
pub use index::Index;
pub use index::Route;
pub use page::AddOutcome;
pub use page::Page;
pub use page::SplitOutcome;
pub use slot::KeyEq;
pub use slot::PairEq;
pub use slot::Slot;
pub use slot::SlotEq;

/// A caller-computed 64 bit hash of a key.
pub type HashKey = u64;

/// A logical position inside a page's or the index's arena.
pub type Position = u64;

/// Number of home positions in a [`Page`].
pub const PAGE_WIDTH: Position = 256;

/// Number of routing slots in one [`Index`] block.
pub const INDEX_WIDTH: Position = 256;

/// Width of one radix digit, in bits.
pub const RADIX_BITS: u32 = 8;

/// Number of radix digits in a [`HashKey`], i.e. the maximum trie depth.
pub const MAX_LEVELS: u32 = HashKey::BITS / RADIX_BITS;

/// Shift of the last radix digit.
pub const MAX_SHIFT: u32 = (MAX_LEVELS - 1) * RADIX_BITS;

/// Extracts the radix digit of `hash_key` at bit offset `shift`.
///
/// Offsets past the width of the key yield `0`.
///
/// ```rust
/// use radix_page_hash::digit;
///
/// assert_eq!(digit(0xAB_CD, 0), 0xCD);
/// assert_eq!(digit(0xAB_CD, 8), 0xAB);
/// assert_eq!(digit(0xAB_CD, 16), 0x00);
/// ```
#[inline(always)]
pub fn digit(hash_key: HashKey, shift: u32) -> u8 {
    (hash_key.checked_shr(shift).unwrap_or(0) & 0xFF) as u8
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used when the caller has no preference.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Hasher builder used when the caller has no preference.
        pub type DefaultHashBuilder = std::hash::RandomState;
    }
}

/// Computes the [`HashKey`] of `key` with `hash_builder`.
///
/// The index and pages never hash on their own; this is a convenience for
/// callers that do not bring their own hash keys.
///
/// ```rust
/// # #[cfg(any(feature = "std", feature = "foldhash"))]
/// # {
/// use radix_page_hash::DefaultHashBuilder;
/// use radix_page_hash::make_hash_key;
///
/// let builder = DefaultHashBuilder::default();
/// assert_eq!(make_hash_key(&builder, "key"), make_hash_key(&builder, "key"));
/// # }
/// ```
#[inline]
pub fn make_hash_key<Q, S>(hash_builder: &S, key: &Q) -> HashKey
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    hash_builder.hash_one(key)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn digits_walk_low_to_high() {
        let h: HashKey = 0x0807_0605_0403_0201;
        let digits: alloc::vec::Vec<u8> = (0..MAX_LEVELS)
            .map(|level| digit(h, level * RADIX_BITS))
            .collect();
        assert_eq!(digits, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(digit(h, 64), 0);
        assert_eq!(MAX_LEVELS, 8);
        assert_eq!(MAX_SHIFT, 56);
    }

    #[cfg(any(feature = "std", feature = "foldhash"))]
    #[test]
    fn default_builder_is_deterministic_per_instance() {
        let builder = DefaultHashBuilder::default();
        let a = make_hash_key(&builder, &42u64);
        let b = make_hash_key(&builder, &42u64);
        assert_eq!(a, b);
    }
}
