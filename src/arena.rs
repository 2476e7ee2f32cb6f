//! Positional sparse storage shared by [`Page`](crate::Page) and
//! [`Index`](crate::Index).
//!
//! Items live at caller-chosen logical positions. Unoccupied positions cost a
//! single `Option` discriminant, and trailing free positions are trimmed so
//! that [`Arena::last_used_position`] is always exact.

use alloc::vec::Vec;
use core::fmt::Debug;

use crate::Position;

/// A growable, densely packed positional container with free-slot tracking.
#[derive(Clone)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    populated: u64,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug> Debug for Arena<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena without allocating.
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            populated: 0,
        }
    }

    /// Creates an empty arena with room for positions `0..capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            populated: 0,
        }
    }

    #[inline]
    fn index_of(pos: Position) -> Option<usize> {
        usize::try_from(pos).ok()
    }

    /// Returns the item stored at `pos`, if any.
    #[inline]
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.items.get(Self::index_of(pos)?)?.as_ref()
    }

    /// Returns a mutable reference to the item stored at `pos`, if any.
    #[inline]
    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        self.items.get_mut(Self::index_of(pos)?)?.as_mut()
    }

    /// Stores `item` at `pos`, returning the item it replaced.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is not addressable on this target. Callers bound
    /// `pos` before storing.
    pub fn set_at(&mut self, pos: Position, item: T) -> Option<T> {
        let (idx, len) = Self::index_of(pos)
            .and_then(|idx| Some((idx, idx.checked_add(1)?)))
            .unwrap_or_else(|| panic!("position {pos} out of range"));
        if idx >= self.items.len() {
            self.items.resize_with(len, || None);
        }

        let previous = self.items[idx].replace(item);
        if previous.is_none() {
            self.populated += 1;
        }
        previous
    }

    /// Returns `true` if nothing is stored at `pos`.
    #[inline]
    pub fn is_free_at(&self, pos: Position) -> bool {
        self.get(pos).is_none()
    }

    /// Removes and returns the item stored at `pos`.
    pub fn free_at(&mut self, pos: Position) -> Option<T> {
        let idx = Self::index_of(pos)?;
        let taken = self.items.get_mut(idx)?.take()?;
        self.populated -= 1;

        while matches!(self.items.last(), Some(None)) {
            self.items.pop();
        }

        Some(taken)
    }

    /// Returns the smallest free position that is `>= start`.
    pub fn first_free_position_from(&self, start: Position) -> Position {
        let Some(begin) = Self::index_of(start) else {
            return start;
        };

        self.items
            .iter()
            .enumerate()
            .skip(begin)
            .find(|(_, item)| item.is_none())
            .map(|(idx, _)| idx as Position)
            .unwrap_or_else(|| start.max(self.items.len() as Position))
    }

    /// Returns the highest occupied position, or `None` for an empty arena.
    #[inline]
    pub fn last_used_position(&self) -> Option<Position> {
        // Trailing free positions are trimmed in `free_at`.
        self.items.len().checked_sub(1).map(|idx| idx as Position)
    }

    /// Returns the number of stored items.
    #[inline]
    pub fn item_count(&self) -> u64 {
        self.populated
    }

    /// Returns `true` if the arena holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of positions currently backed by storage.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Iterates over occupied positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &T)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| item.as_ref().map(|item| (idx as Position, item)))
    }

    /// Drops every stored item, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
        self.populated = 0;
    }
}
