//! Fixed-width bucket of [`Slot`]s with in-page collision chaining.
//!
//! A page has [`PAGE_WIDTH`] home positions, one per radix digit. The first
//! entry addressed to a home position is stored there; later entries for the
//! same home position are placed at overflow positions (`>= PAGE_WIDTH`)
//! and linked from the chain tail.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::marker::PhantomData;

use crate::HashKey;
use crate::MAX_SHIFT;
use crate::PAGE_WIDTH;
use crate::Position;
use crate::RADIX_BITS;
use crate::arena::Arena;
use crate::digit;
use crate::error::Error;
use crate::error::Result;
use crate::slot::PairEq;
use crate::slot::Slot;
use crate::slot::SlotEq;

/// The result of a successful [`Page::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome<V> {
    /// The entry was stored directly at its home position.
    Ok,
    /// A matching entry already exists; nothing changed.
    AlreadyPresent,
    /// The entry was stored at an overflow position and linked into the
    /// chain of its home position.
    AppendedOk,
    /// A matching entry existed and its value was replaced. Only produced by
    /// policies with [`SlotEq::REPLACE`] set.
    Updated(V),
}

/// Counts reported by [`Page::split`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Entries that stayed in the original page.
    pub kept: usize,
    /// Entries that were relocated into the sibling page.
    pub moved: usize,
    /// Entries that matched one already stored at their destination and
    /// were merged into it instead of being stored again.
    pub merged: usize,
}

/// Page statistics for analysis.
///
/// Requires the `stats` feature.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct PageStats {
    /// Number of entries stored, chained overflow included
    pub items: u64,
    /// Number of occupied home positions
    pub home_occupied: usize,
    /// Number of entries stored at overflow positions
    pub overflow_entries: u64,
    /// Length of the longest collision chain
    pub longest_chain: usize,
    /// Number of arena positions backed by storage
    pub arena_positions: usize,
}

#[cfg(feature = "stats")]
impl PageStats {
    /// Pretty-print the page statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Page Statistics ===");
        println!(
            "Home Usage: {}/{} ({:.2}% utilization)",
            self.home_occupied,
            PAGE_WIDTH,
            self.home_occupied as f64 / PAGE_WIDTH as f64 * 100.0
        );
        println!(
            "Items: {} ({} overflow, longest chain {})",
            self.items, self.overflow_entries, self.longest_chain
        );
        println!("Arena Positions: {}", self.arena_positions);
    }
}

#[inline]
fn check_home(pos: Position) -> Result<()> {
    if pos >= PAGE_WIDTH {
        return Err(Error::InvalidParameter);
    }
    Ok(())
}

/// A fixed-width positional container of [`Slot`]s.
///
/// `E` decides when an insert matches an existing entry; see [`PairEq`] and
/// [`KeyEq`](crate::KeyEq).
///
/// Pages are not internally synchronized. Every mutation takes `&mut self`.
///
/// ## Example
///
/// ```rust
/// use radix_page_hash::AddOutcome;
/// use radix_page_hash::Page;
///
/// let mut page: Page<&str, &str> = Page::new();
/// assert_eq!(page.add(5, "k1", "v1", 0x05).unwrap(), AddOutcome::Ok);
/// assert_eq!(page.add(5, "k2", "v2", 0x105).unwrap(), AddOutcome::AppendedOk);
/// assert_eq!(page.add(5, "k1", "v1", 0x05).unwrap(), AddOutcome::AlreadyPresent);
///
/// assert_eq!(page.n_items(), 2);
/// assert_eq!(page.find(5, &"k2").map(|s| *s.value()), Some("v2"));
/// ```
pub struct Page<K, V, E = PairEq> {
    slots: Arena<Slot<K, V>>,
    _eq: PhantomData<fn() -> E>,
}

impl<K, V, E> Default for Page<K, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone, E> Clone for Page<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            _eq: PhantomData,
        }
    }
}

impl<K: Debug, V: Debug, E> Debug for Page<K, V, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut chains = f.debug_map();
        for pos in 0..PAGE_WIDTH {
            if self.slots.is_free_at(pos) {
                continue;
            }
            let chain: Vec<_> = self
                .chain(pos)
                .map(|slot| (slot.position(), slot.key(), slot.value()))
                .collect();
            chains.entry(&pos, &chain);
        }
        chains.finish()
    }
}

impl<K, V, E> Page<K, V, E> {
    /// Creates an empty page.
    pub const fn new() -> Self {
        Self {
            slots: Arena::new(),
            _eq: PhantomData,
        }
    }

    /// Returns the chain head stored at home position `pos`.
    ///
    /// Returns `None` when `pos` is not a home position or is unoccupied.
    pub fn get(&self, pos: Position) -> Option<&Slot<K, V>> {
        if pos >= PAGE_WIDTH {
            return None;
        }
        self.slots.get(pos)
    }

    /// Returns `true` if home position `pos` is occupied.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `pos >= PAGE_WIDTH`.
    pub fn has_item(&self, pos: Position) -> Result<bool> {
        check_home(pos)?;
        Ok(!self.slots.is_free_at(pos))
    }

    /// Iterates over the collision chain that starts at home position `pos`.
    ///
    /// The iterator is empty for an unoccupied or out of range position.
    pub fn chain(&self, pos: Position) -> Chain<'_, K, V> {
        Chain {
            slots: &self.slots,
            cursor: (pos < PAGE_WIDTH).then_some(pos),
        }
    }

    /// Returns the number of entries in the chain at `pos`.
    pub fn chain_len(&self, pos: Position) -> usize {
        self.chain(pos).count()
    }

    /// Iterates over every stored entry in position order.
    pub fn iter(&self) -> impl Iterator<Item = &Slot<K, V>> + '_ {
        self.slots.iter().map(|(_, slot)| slot)
    }

    /// Returns the number of stored entries, chained overflow included.
    #[inline]
    pub fn n_items(&self) -> u64 {
        self.slots.item_count()
    }

    /// Returns the number of unoccupied home positions.
    pub fn n_free(&self) -> usize {
        (0..PAGE_WIDTH)
            .filter(|&pos| self.slots.is_free_at(pos))
            .count()
    }

    /// Returns the number of entries stored at overflow positions.
    pub fn n_overflow(&self) -> u64 {
        self.n_items() - (PAGE_WIDTH as usize - self.n_free()) as u64
    }

    /// Returns `true` if the page stores no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Requires the `stats` feature.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> PageStats {
        let free = self.n_free();
        PageStats {
            items: self.n_items(),
            home_occupied: PAGE_WIDTH as usize - free,
            overflow_entries: self.n_overflow(),
            longest_chain: (0..PAGE_WIDTH)
                .map(|pos| self.chain_len(pos))
                .max()
                .unwrap_or(0),
            arena_positions: self.slots.capacity(),
        }
    }
}

impl<K: PartialEq, V, E> Page<K, V, E> {
    /// Returns the first entry of the chain at `pos` whose key equals `key`.
    pub fn find(&self, pos: Position, key: &K) -> Option<&Slot<K, V>> {
        self.chain(pos).find(|slot| slot.key() == key)
    }

    /// Removes the first entry of the chain at `pos` whose key equals `key`.
    ///
    /// Removing a chain head promotes its successor into the home position
    /// and frees the successor's overflow position. Removing any other member
    /// relinks its predecessor to its successor.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `pos >= PAGE_WIDTH`.
    pub fn remove(&mut self, pos: Position, key: &K) -> Result<Option<(K, V)>> {
        check_home(pos)?;

        let mut prev = None;
        let mut cursor = Some(pos);
        while let Some(at) = cursor {
            let Some(slot) = self.slots.get(at) else {
                return Ok(None);
            };
            if slot.key() == key {
                break;
            }
            prev = Some(at);
            cursor = slot.next();
        }

        let Some(removed) = cursor.and_then(|at| self.slots.free_at(at)) else {
            return Ok(None);
        };
        let next = removed.next();

        match prev {
            Some(prev) => {
                if let Some(prev) = self.slots.get_mut(prev) {
                    prev.set_next(next);
                }
            }
            None => {
                if let Some(mut successor) = next.and_then(|next| self.slots.free_at(next)) {
                    successor.set_position(pos);
                    self.slots.set_at(pos, successor);
                }
            }
        }

        log::trace!(
            "removed {:#018X} from chain {pos} at position {}",
            removed.hash_key(),
            removed.position()
        );

        let (key, value, _) = removed.into_parts();
        Ok(Some((key, value)))
    }
}

impl<K, V, E: SlotEq<K, V>> Page<K, V, E> {
    /// Returns `true` if the chain at `pos` holds an entry matching
    /// `(key, value)` under the page's equality policy.
    pub fn contains(&self, pos: Position, key: &K, value: &V) -> bool {
        self.chain(pos).any(|slot| slot.is_equal::<E>(key, value))
    }

    /// Inserts an entry at home position `pos`.
    ///
    /// An unoccupied home position takes the entry directly. Otherwise the
    /// chain is walked: a matching entry makes the call a no-op (or a value
    /// replacement under [`KeyEq`](crate::KeyEq)), and a miss appends the entry at
    /// the first free overflow position.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `pos >= PAGE_WIDTH`. Nothing is
    /// modified in that case.
    pub fn add(
        &mut self,
        pos: Position,
        key: K,
        value: V,
        hash_key: HashKey,
    ) -> Result<AddOutcome<V>> {
        check_home(pos)?;

        if self.slots.is_free_at(pos) {
            self.slots.set_at(pos, Slot::new(key, value, hash_key, pos));
            return Ok(AddOutcome::Ok);
        }

        let mut tail = pos;
        while let Some(slot) = self.slots.get_mut(tail) {
            if slot.is_equal::<E>(&key, &value) {
                if E::REPLACE {
                    return Ok(AddOutcome::Updated(slot.replace_value(value)));
                }
                return Ok(AddOutcome::AlreadyPresent);
            }
            match slot.next() {
                Some(next) => tail = next,
                None => break,
            }
        }

        let overflow = self.slots.first_free_position_from(PAGE_WIDTH);
        self.slots
            .set_at(overflow, Slot::new(key, value, hash_key, overflow));
        if let Some(slot) = self.slots.get_mut(tail) {
            slot.set_next(Some(overflow));
        }

        log::trace!("appended {hash_key:#018X} to chain {pos} at position {overflow}");
        Ok(AddOutcome::AppendedOk)
    }

    /// Redistributes the chain at home position `pos` by a fresh radix digit.
    ///
    /// Every chain member, the head included, gets the digit
    /// `(hash_key >> shift) & 0xFF`. Digit `0` entries are re-chained at
    /// `pos` in this page. Every other entry is added to `new_page` at the
    /// home position named by its digit, and `positions` records
    /// `digit -> new_page_id` for the caller's index split.
    ///
    /// `new_page` is expected to be freshly allocated; an entry that matches
    /// one already stored there is merged according to `E` and counted in
    /// [`SplitOutcome::merged`] rather than [`SplitOutcome::moved`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `pos >= PAGE_WIDTH`, or `shift` is past
    /// the last radix digit or not a multiple of [`RADIX_BITS`]. Nothing is
    /// modified in that case.
    pub fn split(
        &mut self,
        pos: Position,
        shift: u32,
        new_page: &mut Page<K, V, E>,
        new_page_id: u64,
        positions: &mut BTreeMap<u8, u64>,
    ) -> Result<SplitOutcome> {
        check_home(pos)?;
        if shift > MAX_SHIFT || shift % RADIX_BITS != 0 {
            return Err(Error::InvalidParameter);
        }

        let mut detached = Vec::with_capacity(self.chain_len(pos));
        let mut cursor = Some(pos);
        while let Some(slot) = cursor.and_then(|at| self.slots.free_at(at)) {
            cursor = slot.next();
            detached.push(slot);
        }

        let mut outcome = SplitOutcome::default();
        for slot in detached {
            let hash_key = slot.hash_key();
            let local = digit(hash_key, shift);
            let (key, value, _) = slot.into_parts();

            let added = if local == 0 {
                self.add(pos, key, value, hash_key)?
            } else {
                positions.insert(local, new_page_id);
                new_page.add(Position::from(local), key, value, hash_key)?
            };
            match added {
                AddOutcome::AlreadyPresent | AddOutcome::Updated(_) => outcome.merged += 1,
                AddOutcome::Ok | AddOutcome::AppendedOk if local == 0 => outcome.kept += 1,
                AddOutcome::Ok | AddOutcome::AppendedOk => outcome.moved += 1,
            }
        }

        log::debug!(
            "split chain {pos} at shift {shift}: kept {}, moved {} to page {new_page_id}, merged {}",
            outcome.kept,
            outcome.moved,
            outcome.merged
        );
        Ok(outcome)
    }
}

/// Iterator over one collision chain of a [`Page`].
///
/// Created by [`Page::chain`].
pub struct Chain<'a, K, V> {
    slots: &'a Arena<Slot<K, V>>,
    cursor: Option<Position>,
}

impl<'a, K, V> Iterator for Chain<'a, K, V> {
    type Item = &'a Slot<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.slots.get(self.cursor?)?;
        self.cursor = slot.next();
        Some(slot)
    }
}
