//! Radix routing structure that resolves a hash key to a page.
//!
//! The index is a trie of [`INDEX_WIDTH`]-wide blocks. Block `b` occupies
//! positions `b * INDEX_WIDTH .. (b + 1) * INDEX_WIDTH` of one shared arena;
//! block `0` is the root. A descent consumes one radix digit per level,
//! starting at the least significant byte of the hash key, and stops at the
//! first [`Route::Page`].

use alloc::collections::BTreeMap;
use core::fmt::Debug;

use crate::HashKey;
use crate::INDEX_WIDTH;
use crate::MAX_LEVELS;
use crate::MAX_SHIFT;
use crate::Position;
use crate::RADIX_BITS;
use crate::arena::Arena;
use crate::digit;
use crate::error::Error;
use crate::error::Result;

/// One routing slot of an [`Index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Route {
    /// Nothing is routed through this slot yet.
    #[default]
    Empty,
    /// Direct reference to a page id.
    Page(u64),
    /// Link to a deeper index block, by block number.
    Link(u64),
}

impl Route {
    /// Largest target representable in the packed word form.
    pub const MAX_TARGET: u64 = u64::MAX >> 1;

    /// Packs the route as `(target << 1) | is_page`.
    ///
    /// Returns `None` for [`Route::Empty`], which has no word form.
    ///
    /// ```rust
    /// use radix_page_hash::Route;
    ///
    /// assert_eq!(Route::Page(42).to_word(), Some(85));
    /// assert_eq!(Route::Link(7).to_word(), Some(14));
    /// assert_eq!(Route::from_word(Some(85)), Route::Page(42));
    /// ```
    #[inline]
    pub fn to_word(self) -> Option<u64> {
        match self {
            Route::Empty => None,
            Route::Page(target) => Some((target << 1) | 1),
            Route::Link(target) => Some(target << 1),
        }
    }

    /// Unpacks a word produced by [`Route::to_word`].
    #[inline]
    pub fn from_word(word: Option<u64>) -> Self {
        match word {
            None => Route::Empty,
            Some(word) if word & 1 == 1 => Route::Page(word >> 1),
            Some(word) => Route::Link(word >> 1),
        }
    }

    /// Builds a non-empty route from its target and tag.
    #[inline]
    pub fn tagged(target: u64, is_page: bool) -> Self {
        if is_page {
            Route::Page(target)
        } else {
            Route::Link(target)
        }
    }

    /// Returns the page id or block number this route points at.
    #[inline]
    pub fn target(self) -> Option<u64> {
        match self {
            Route::Empty => None,
            Route::Page(target) | Route::Link(target) => Some(target),
        }
    }

    /// Returns `true` for a direct page reference.
    #[inline]
    pub fn is_page(self) -> bool {
        matches!(self, Route::Page(_))
    }

    /// Returns `true` for an unset slot.
    #[inline]
    pub fn is_empty(self) -> bool {
        matches!(self, Route::Empty)
    }
}

/// Index statistics for analysis.
///
/// Requires the `stats` feature.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct IndexStats {
    /// Number of allocated blocks, root included
    pub blocks: u64,
    /// Number of non-empty routing slots
    pub routes: u64,
    /// Number of routing slots that reference a page
    pub page_routes: u64,
    /// Number of routing slots that link to a deeper block
    pub link_routes: u64,
    /// Slot utilization (routes / (blocks * INDEX_WIDTH))
    pub slot_utilization: f64,
}

#[cfg(feature = "stats")]
impl IndexStats {
    /// Pretty-print the index statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Index Statistics ===");
        println!(
            "Routes: {} in {} blocks ({:.2}% utilization)",
            self.routes,
            self.blocks,
            self.slot_utilization * 100.0
        );
        println!(
            "Pages: {}, Links: {}",
            self.page_routes, self.link_routes
        );
    }
}

/// Fixed-width radix router from hash keys to page ids.
///
/// Not internally synchronized; mutation takes `&mut self`.
///
/// ## Example
///
/// ```rust
/// use std::collections::BTreeMap;
///
/// use radix_page_hash::Index;
/// use radix_page_hash::Route;
///
/// let mut index = Index::new();
/// let hash_key = 0x0000_0000_0000_3A07;
///
/// index.insert_route(hash_key, 1).unwrap();
/// assert_eq!(index.lookup_pagepos_for_hashkey(hash_key), Ok((0x07, 0)));
///
/// // Replace the direct page reference with a deeper block that sends
/// // digit 0x3A to page 2.
/// let block = index.split(hash_key, 0, &BTreeMap::from([(0x3A, 2)])).unwrap();
/// assert_eq!(index.internal_get(0x07), Route::Link(block));
/// assert_eq!(index.get(hash_key), Some(2));
/// ```
#[derive(Clone)]
pub struct Index {
    slots: Arena<Route>,
    blocks: u64,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Index {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Index")
            .field("blocks", &self.blocks)
            .field("routes", &self.slots)
            .finish()
    }
}

impl Index {
    /// Creates an index holding only an empty root block.
    pub const fn new() -> Self {
        Self {
            slots: Arena::new(),
            blocks: 1,
        }
    }

    /// Decodes the routing slot at absolute position `at`.
    #[inline]
    pub fn internal_get(&self, at: Position) -> Route {
        self.slots.get(at).copied().unwrap_or_default()
    }

    /// Stores `route` at absolute position `at`. [`Route::Empty`] clears it.
    ///
    /// `at` must lie in an allocated block, and a [`Route::Link`] must name
    /// one. Use [`Index::allocate_block`] to reserve blocks by hand.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `at` or a link target is past the
    /// allocated blocks, or a page target exceeds [`Route::MAX_TARGET`].
    /// Nothing is modified on error.
    pub fn internal_set(&mut self, at: Position, route: Route) -> Result<()> {
        if at / INDEX_WIDTH >= self.blocks {
            return Err(Error::InvalidParameter);
        }
        match route {
            Route::Empty => {
                self.slots.free_at(at);
            }
            Route::Page(page_id) if page_id > Route::MAX_TARGET => {
                return Err(Error::InvalidParameter);
            }
            Route::Link(block) if block >= self.blocks => return Err(Error::InvalidParameter),
            Route::Page(_) | Route::Link(_) => {
                self.slots.set_at(at, route);
            }
        }
        Ok(())
    }

    /// Reserves an empty block and returns its number.
    ///
    /// The block is never handed out again by [`Index::split`].
    pub fn allocate_block(&mut self) -> u64 {
        let block = self.next_block();
        self.blocks = block + 1;
        log::debug!("reserved index block {block}");
        block
    }

    /// Flat form of [`Index::internal_set`].
    pub fn internal_set_tagged(&mut self, at: Position, target: u64, is_page: bool) -> Result<()> {
        self.internal_set(at, Route::tagged(target, is_page))
    }

    /// Resolves the routing slot that references the page owning `hash_key`.
    ///
    /// Returns the absolute slot position and the shift of the level it was
    /// found at.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the descent reaches an empty slot or runs out
    /// of radix digits.
    pub fn lookup_pagepos_for_hashkey(&self, hash_key: HashKey) -> Result<(Position, u32)> {
        let mut base: Position = 0;
        for shift in (0..MAX_LEVELS).map(|level| level * RADIX_BITS) {
            let at = base + Position::from(digit(hash_key, shift));
            match self.internal_get(at) {
                Route::Empty => return Err(Error::NotFound),
                Route::Page(_) => return Ok((at, shift)),
                Route::Link(block) => {
                    base = block.checked_mul(INDEX_WIDTH).ok_or(Error::NotFound)?;
                }
            }
        }
        Err(Error::NotFound)
    }

    /// Returns the id of the page that owns `hash_key`.
    pub fn get(&self, hash_key: HashKey) -> Option<u64> {
        let (at, _) = self.lookup_pagepos_for_hashkey(hash_key).ok()?;
        match self.internal_get(at) {
            Route::Page(page_id) => Some(page_id),
            _ => None,
        }
    }

    /// Routes `hash_key` to `page_id`.
    ///
    /// Descends through existing links and installs a direct page reference
    /// in the first empty slot on the path. Returns the slot position.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRouted`] if a page already owns the path.
    /// - [`Error::DepthExhausted`] if every level is a link.
    /// - [`Error::InvalidParameter`] if `page_id` exceeds
    ///   [`Route::MAX_TARGET`].
    pub fn insert_route(&mut self, hash_key: HashKey, page_id: u64) -> Result<Position> {
        if page_id > Route::MAX_TARGET {
            return Err(Error::InvalidParameter);
        }

        let mut base: Position = 0;
        for shift in (0..MAX_LEVELS).map(|level| level * RADIX_BITS) {
            let at = base + Position::from(digit(hash_key, shift));
            match self.internal_get(at) {
                Route::Empty => {
                    self.slots.set_at(at, Route::Page(page_id));
                    log::trace!("routed {hash_key:#018X} to page {page_id} at slot {at}");
                    return Ok(at);
                }
                Route::Page(_) => return Err(Error::AlreadyRouted),
                Route::Link(block) => {
                    base = block
                        .checked_mul(INDEX_WIDTH)
                        .ok_or(Error::InvalidParameter)?;
                }
            }
        }
        Err(Error::DepthExhausted)
    }

    /// Replaces the page reference resolved for `hash_key` with a link to a
    /// freshly allocated block, and installs `positions` in that block.
    ///
    /// Each `(local, page_id)` pair of `positions` becomes a direct page
    /// reference at local position `local` of the new block. Returns the new
    /// block number.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `hash_key` does not resolve to a page.
    /// - [`Error::InvalidParameter`] if `shift` is not the level the page
    ///   was resolved at, or a page id exceeds [`Route::MAX_TARGET`].
    /// - [`Error::DepthExhausted`] if the page sits at the last level.
    ///
    /// Nothing is modified on error.
    pub fn split(
        &mut self,
        hash_key: HashKey,
        shift: u32,
        positions: &BTreeMap<u8, u64>,
    ) -> Result<u64> {
        let (at, resolved) = self.lookup_pagepos_for_hashkey(hash_key)?;
        if resolved != shift {
            return Err(Error::InvalidParameter);
        }
        if shift >= MAX_SHIFT {
            return Err(Error::DepthExhausted);
        }
        if positions.values().any(|&page_id| page_id > Route::MAX_TARGET) {
            return Err(Error::InvalidParameter);
        }

        let block = self.next_block();
        let base = block * INDEX_WIDTH;
        let replaced = self.internal_get(at);
        self.slots.set_at(at, Route::Link(block));
        for (&local, &page_id) in positions {
            self.slots
                .set_at(base + Position::from(local), Route::Page(page_id));
        }
        self.blocks = block + 1;

        log::debug!(
            "split slot {at} ({replaced:?}) at shift {shift} into block {block} with {} routes",
            positions.len()
        );
        Ok(block)
    }

    /// Block number for the next allocation: past every occupied position
    /// and past every block handed out before.
    fn next_block(&self) -> u64 {
        let past_used = self
            .slots
            .last_used_position()
            .map_or(1, |last| last / INDEX_WIDTH + 1);
        past_used.max(self.blocks)
    }

    /// Returns the number of non-empty routing slots.
    #[inline]
    pub fn n_routes(&self) -> u64 {
        self.slots.item_count()
    }

    /// Returns the number of allocated blocks, root included.
    #[inline]
    pub fn n_blocks(&self) -> u64 {
        self.blocks
    }

    /// Returns the number of routing slots that reference a page.
    pub fn n_pages(&self) -> u64 {
        self.slots.iter().filter(|(_, route)| route.is_page()).count() as u64
    }

    /// Returns routing statistics for debugging.
    ///
    /// Requires the `stats` feature.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> IndexStats {
        let routes = self.n_routes();
        let page_routes = self.n_pages();
        IndexStats {
            blocks: self.blocks,
            routes,
            page_routes,
            link_routes: routes - page_routes,
            slot_utilization: routes as f64 / (self.blocks * INDEX_WIDTH) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::format;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;
    use test_log::test;

    use super::*;

    fn hash_key(key: u64) -> u64 {
        let mut h = SipHasher::new_with_keys(0x89AB, 0xCDEF);
        h.write_u64(key);
        h.finish()
    }

    #[test]
    fn empty_index_resolves_nothing() {
        let index = Index::new();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let h = rng.random::<u64>();
            assert_eq!(index.lookup_pagepos_for_hashkey(h), Err(Error::NotFound));
            assert_eq!(index.get(h), None);
        }
        assert_eq!(index.lookup_pagepos_for_hashkey(0), Err(Error::NotFound));
        assert_eq!(index.lookup_pagepos_for_hashkey(u64::MAX), Err(Error::NotFound));
    }

    #[test]
    fn tagged_slots_decode() {
        let mut index = Index::new();
        index.internal_set_tagged(10, 42, true).unwrap();
        assert_eq!(index.internal_get(10), Route::Page(42));
        assert_eq!(index.internal_get(10).target(), Some(42));
        assert!(index.internal_get(10).is_page());

        while index.allocate_block() < 7 {}
        index.internal_set_tagged(10, 7, false).unwrap();
        assert_eq!(index.internal_get(10), Route::Link(7));
        assert!(!index.internal_get(10).is_page());

        assert_eq!(index.internal_get(11), Route::Empty);
        index.internal_set(10, Route::Empty).unwrap();
        assert!(index.internal_get(10).is_empty());
        assert_eq!(index.n_routes(), 0);
    }

    #[test]
    fn word_encoding_matches_packed_form() {
        for route in [Route::Page(0), Route::Page(42), Route::Link(0), Route::Link(7)] {
            assert_eq!(Route::from_word(route.to_word()), route);
        }
        assert_eq!(Route::Page(Route::MAX_TARGET).to_word(), Some(u64::MAX));
        assert_eq!(Route::Empty.to_word(), None);
        assert_eq!(Route::from_word(None), Route::Empty);
    }

    #[test]
    fn oversized_targets_are_rejected() {
        let mut index = Index::new();
        assert_eq!(
            index.internal_set(3, Route::Page(Route::MAX_TARGET + 1)),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            index.insert_route(3, Route::MAX_TARGET + 1),
            Err(Error::InvalidParameter)
        );
        assert_eq!(index.n_routes(), 0);
    }

    #[test]
    fn root_page_resolves_at_shift_zero() {
        let mut index = Index::new();
        let h = 0xDEAD_BEEF_0000_0042;
        assert_eq!(index.insert_route(h, 5), Ok(0x42));
        assert_eq!(index.lookup_pagepos_for_hashkey(h), Ok((0x42, 0)));
        assert_eq!(index.get(h), Some(5));

        // Any key sharing the low digit lands on the same page.
        assert_eq!(index.get(0x42), Some(5));
        assert_eq!(index.get(0x43), None);
        assert_eq!(index.insert_route(0x1142, 6), Err(Error::AlreadyRouted));
    }

    #[test]
    fn split_links_to_new_block() {
        let mut index = Index::new();
        let h = hash_key(1);
        let root_at = Position::from(digit(h, 0));
        index.insert_route(h, 1).unwrap();

        let next = digit(h, 8);
        let positions = BTreeMap::from([(0u8, 1u64), (next, 2u64)]);
        let block = index.split(h, 0, &positions).unwrap();
        assert_eq!(block, 1);
        assert_eq!(index.n_blocks(), 2);

        assert_eq!(index.internal_get(root_at), Route::Link(1));
        assert!(!index.internal_get(root_at).is_page());
        assert_eq!(
            index.lookup_pagepos_for_hashkey(h),
            Ok((INDEX_WIDTH + Position::from(next), 8))
        );
        assert_eq!(index.get(h), Some(2));
        if next != 0 {
            assert_eq!(index.get(h & !0xFF00), Some(1));
        }
    }

    #[test]
    fn split_rejects_and_leaves_index_untouched() {
        let mut index = Index::new();
        let positions = BTreeMap::from([(1u8, 9u64)]);
        assert_eq!(index.split(0x01, 0, &positions), Err(Error::NotFound));

        index.insert_route(0x01, 3).unwrap();
        assert_eq!(index.split(0x01, 8, &positions), Err(Error::InvalidParameter));
        assert_eq!(
            index.split(0x01, 0, &BTreeMap::from([(1u8, u64::MAX)])),
            Err(Error::InvalidParameter)
        );
        assert_eq!(index.internal_get(0x01), Route::Page(3));
        assert_eq!(index.n_blocks(), 1);
        assert_eq!(index.n_routes(), 1);
    }

    #[test]
    fn split_at_last_level_is_exhausted() {
        let mut index = Index::new();
        let h = 0u64;
        index.insert_route(h, 1).unwrap();
        for level in 0..(MAX_LEVELS - 1) {
            let shift = level * RADIX_BITS;
            index.split(h, shift, &BTreeMap::from([(0u8, 1u64)])).unwrap();
        }
        assert_eq!(index.lookup_pagepos_for_hashkey(h).map(|(_, s)| s), Ok(56));
        assert_eq!(
            index.split(h, 56, &BTreeMap::from([(0u8, 1u64)])),
            Err(Error::DepthExhausted)
        );
        assert_eq!(index.n_blocks(), u64::from(MAX_LEVELS));
    }

    #[test]
    fn descent_through_links_only_is_not_found() {
        let mut index = Index::new();
        // Every level of key 0 links to block 1, whose slot 0 links back to
        // itself.
        assert_eq!(index.allocate_block(), 1);
        index.internal_set(0, Route::Link(1)).unwrap();
        index.internal_set(INDEX_WIDTH, Route::Link(1)).unwrap();
        assert_eq!(index.lookup_pagepos_for_hashkey(0), Err(Error::NotFound));
        assert_eq!(index.get(0), None);
        assert_eq!(index.insert_route(0, 4), Err(Error::DepthExhausted));
    }

    #[test]
    fn blocks_never_alias() {
        let mut index = Index::new();
        index.insert_route(0x01, 1).unwrap();
        index.insert_route(0x02, 2).unwrap();

        // An empty mapping allocates a block that owns no slots yet.
        let first = index.split(0x01, 0, &BTreeMap::new()).unwrap();
        let second = index.split(0x02, 0, &BTreeMap::new()).unwrap();
        assert_ne!(first, second);

        // Reserved blocks are skipped by later splits.
        let reserved = index.allocate_block();
        assert_eq!(reserved, second + 1);
        index.internal_set(reserved * INDEX_WIDTH + 3, Route::Page(8)).unwrap();
        index.insert_route(0x03, 3).unwrap();
        let third = index.split(0x03, 0, &BTreeMap::from([(0u8, 3u64)])).unwrap();
        assert_eq!(third, reserved + 1);
        assert_eq!(index.n_blocks(), third + 1);
    }

    #[test]
    fn positions_past_allocated_blocks_are_rejected() {
        let mut index = Index::new();
        for at in [u64::MAX, 1 << 40, INDEX_WIDTH, INDEX_WIDTH * 3 + 1] {
            assert_eq!(
                index.internal_set(at, Route::Page(1)),
                Err(Error::InvalidParameter)
            );
            assert_eq!(
                index.internal_set(at, Route::Empty),
                Err(Error::InvalidParameter)
            );
            assert_eq!(
                index.internal_set_tagged(at, 1, false),
                Err(Error::InvalidParameter)
            );
        }
        assert_eq!(
            index.internal_set(0, Route::Link(1)),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            index.internal_set(0, Route::Link(u64::MAX)),
            Err(Error::InvalidParameter)
        );
        assert_eq!(index.n_routes(), 0);
        assert_eq!(index.n_blocks(), 1);

        assert_eq!(index.allocate_block(), 1);
        index.internal_set(INDEX_WIDTH, Route::Page(1)).unwrap();
        index.internal_set(0, Route::Link(1)).unwrap();
        assert_eq!(index.get(0), Some(1));
        assert_eq!(
            index.internal_set(2 * INDEX_WIDTH, Route::Page(1)),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn debug_shows_blocks_and_routes() {
        let mut index = Index::new();
        assert_eq!(format!("{index:?}"), "Index { blocks: 1, routes: {} }");

        index.insert_route(0x03, 7).unwrap();
        index.insert_route(0x01, 2).unwrap();
        index.split(0x01, 0, &BTreeMap::from([(4u8, 5u64)])).unwrap();
        assert_eq!(
            format!("{index:?}"),
            "Index { blocks: 2, routes: {1: Link(1), 3: Page(7), 260: Page(5)} }"
        );
    }

    #[cfg(feature = "stats")]
    #[test]
    fn stats_split_pages_from_links() {
        let mut index = Index::new();
        let stats = index.debug_stats();
        assert_eq!(stats.blocks, 1);
        assert_eq!(stats.routes, 0);
        assert_eq!(stats.slot_utilization, 0.0);

        index.insert_route(0x01, 1).unwrap();
        index.insert_route(0x02, 2).unwrap();
        index
            .split(0x01, 0, &BTreeMap::from([(0u8, 1u64), (9u8, 3u64)]))
            .unwrap();

        let stats = index.debug_stats();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.routes, 4);
        assert_eq!(stats.page_routes, 3);
        assert_eq!(stats.link_routes, 1);
        assert_eq!(stats.slot_utilization, 4.0 / 512.0);
    }

    #[test]
    fn block_boundary_allocation_skips_used_block() {
        let mut index = Index::new();
        index.insert_route(0x00, 1).unwrap();
        let block = index.split(0x00, 0, &BTreeMap::from([(0u8, 1u64)])).unwrap();
        assert_eq!(block, 1);
        // The last used position is exactly the first slot of block 1.
        assert_eq!(index.lookup_pagepos_for_hashkey(0), Ok((INDEX_WIDTH, 8)));

        let deeper = index.split(0x00, 8, &BTreeMap::from([(0u8, 1u64)])).unwrap();
        assert_eq!(deeper, 2);
        assert_eq!(index.lookup_pagepos_for_hashkey(0), Ok((2 * INDEX_WIDTH, 16)));
    }

    #[test]
    fn many_random_routes() {
        let mut index = Index::new();
        let mut owners = BTreeMap::new();
        for key in 0..2_000u64 {
            let h = hash_key(key);
            match index.insert_route(h, key) {
                Ok(_) => {
                    owners.insert(digit(h, 0), key);
                }
                Err(Error::AlreadyRouted) => {}
                Err(other) => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(index.n_pages(), owners.len() as u64);
        for key in 0..2_000u64 {
            let h = hash_key(key);
            assert_eq!(index.get(h), owners.get(&digit(h, 0)).copied());
        }
    }
}
