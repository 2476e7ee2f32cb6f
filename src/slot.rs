use core::fmt::Debug;

use crate::HashKey;
use crate::Position;

/// Decides when an incoming `(key, value)` pair matches a stored [`Slot`].
///
/// A [`Page`](crate::Page) consults its policy while walking a collision
/// chain. On a match the insert either becomes a no-op or, when
/// [`SlotEq::REPLACE`] is set, overwrites the stored value.
pub trait SlotEq<K, V> {
    /// Whether a match overwrites the stored value instead of refusing the
    /// insert.
    const REPLACE: bool;

    /// Returns `true` if the stored pair and the candidate pair are the same
    /// entry.
    fn matches(stored_key: &K, stored_value: &V, key: &K, value: &V) -> bool;
}

/// Exact-pair equality: duplicates are only refused when both the key and
/// the value match, so a key may carry several values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairEq;

impl<K: PartialEq, V: PartialEq> SlotEq<K, V> for PairEq {
    const REPLACE: bool = false;

    #[inline]
    fn matches(stored_key: &K, stored_value: &V, key: &K, value: &V) -> bool {
        stored_key == key && stored_value == value
    }
}

/// Key-only equality with value overwrite, i.e. conventional map semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyEq;

impl<K: PartialEq, V> SlotEq<K, V> for KeyEq {
    const REPLACE: bool = true;

    #[inline]
    fn matches(stored_key: &K, _stored_value: &V, key: &K, _value: &V) -> bool {
        stored_key == key
    }
}

/// One stored entry of a [`Page`](crate::Page).
///
/// `next` is a position inside the same page's arena, never a reference into
/// another page.
#[derive(Clone, PartialEq, Eq)]
pub struct Slot<K, V> {
    key: K,
    value: V,
    hash_key: HashKey,
    position: Position,
    next: Option<Position>,
}

impl<K: Debug, V: Debug> Debug for Slot<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Slot")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("hash_key", &format_args!("{:#018X}", self.hash_key))
            .field("position", &self.position)
            .field("next", &self.next)
            .finish()
    }
}

impl<K, V> Slot<K, V> {
    pub(crate) fn new(key: K, value: V, hash_key: HashKey, position: Position) -> Self {
        Self {
            key,
            value,
            hash_key,
            position,
            next: None,
        }
    }

    /// The stored key.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The stored value.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Mutable access to the stored value.
    #[inline]
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// The hash key fixed when the entry was created.
    #[inline]
    pub fn hash_key(&self) -> HashKey {
        self.hash_key
    }

    /// Position of this slot inside its owning page's arena.
    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    /// The next slot of this collision chain, if any.
    #[inline]
    pub fn next(&self) -> Option<Position> {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: Option<Position>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub(crate) fn replace_value(&mut self, value: V) -> V {
        core::mem::replace(&mut self.value, value)
    }

    /// Evaluates the equality policy `E` against a candidate pair.
    #[inline]
    pub fn is_equal<E: SlotEq<K, V>>(&self, key: &K, value: &V) -> bool {
        E::matches(&self.key, &self.value, key, value)
    }

    /// Consumes the slot, returning its key, value and hash key.
    pub fn into_parts(self) -> (K, V, HashKey) {
        (self.key, self.value, self.hash_key)
    }
}
