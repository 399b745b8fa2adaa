//! One-pass enumeration of assigned slots

use crate::array::{HashSlotArray, ValueAddr};
use crate::layout::SlotKey;
use crate::mem::MemoryAllocator;

/// One assigned slot, as yielded by [`Cursor`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Slot<'a, K> {
    /// The slot's key
    pub key: K,
    /// Address of the slot's value field
    pub value_addr: ValueAddr,
    /// The value bytes
    pub value: &'a [u8],
}

/// Forward-only cursor over the assigned slots of a [`HashSlotArray`]
///
/// Starts before the first slot. Each [`advance`](Self::advance) moves to
/// the next assigned slot in index order; once it returns `false` the
/// cursor is exhausted for good. The cursor borrows the array, so the array
/// cannot change underneath it.
///
/// The cursor is also an [`Iterator`] of [`Slot`]s. Both styles share the
/// same position.
#[derive(Debug)]
pub struct Cursor<'a, K: SlotKey, A: MemoryAllocator> {
    /// Array being enumerated
    array: &'a HashSlotArray<K, A>,
    /// Next slot index to examine
    next: usize,
    /// Slot the cursor is positioned on
    current: Option<usize>,
}

impl<'a, K: SlotKey, A: MemoryAllocator> Cursor<'a, K, A> {
    /// Cursor positioned before the first slot of `array`.
    pub(crate) fn new(array: &'a HashSlotArray<K, A>) -> Self {
        Self {
            array,
            next: 0,
            current: None,
        }
    }

    /// Move to the next assigned slot. Returns `false` once exhausted.
    pub fn advance(&mut self) -> bool {
        let capacity = self.array.capacity();
        while self.next < capacity {
            let slot = self.next;
            self.next += 1;
            if self.array.is_assigned(slot) {
                self.current = Some(slot);
                return true;
            }
        }
        self.current = None;
        false
    }

    /// Slot the cursor is on, panicking if it is not on one.
    fn current(&self) -> usize {
        match self.current {
            Some(slot) => slot,
            None => panic!("cursor is not positioned on a slot"),
        }
    }

    /// Key of the current slot.
    ///
    /// Panics unless the last [`advance`](Self::advance) returned `true`.
    pub fn key(&self) -> K {
        self.array.key_of_slot(self.current())
    }

    /// Value address of the current slot.
    ///
    /// Panics unless the last [`advance`](Self::advance) returned `true`.
    pub fn value_addr(&self) -> ValueAddr {
        self.array.value_addr_of_slot(self.current())
    }

    /// Value bytes of the current slot.
    ///
    /// Panics unless the last [`advance`](Self::advance) returned `true`.
    pub fn value(&self) -> &'a [u8] {
        self.array.value(self.value_addr())
    }
}

impl<'a, K: SlotKey, A: MemoryAllocator> Iterator for Cursor<'a, K, A> {
    type Item = Slot<'a, K>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.advance() {
            return None;
        }
        Some(Slot {
            key: self.key(),
            value_addr: self.value_addr(),
            value: self.value(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.array.capacity() - self.next))
    }
}

impl<'a, K: SlotKey, A: MemoryAllocator> std::iter::FusedIterator for Cursor<'a, K, A> {}

#[cfg(test)]
mod tests {
    use crate::array::HashSlotArray;
    use crate::config::HashSlotConfig;
    use crate::mem::HeapAllocator;
    use std::collections::HashSet;

    #[test]
    fn advance_protocol() {
        let mut array = HashSlotArray::<(u64, u64)>::new(16).unwrap();
        for i in 1..=5u64 {
            let addr = array.ensure((i, i * 10)).unwrap().addr();
            array.value_words_mut(addr).copy_from_slice(&[i, i * i]);
        }
        let mut cursor = array.cursor();
        let mut seen = HashSet::new();
        while cursor.advance() {
            let (k1, k2) = cursor.key();
            assert_eq!(k2, k1 * 10);
            assert_eq!(array.value_words(cursor.value_addr()), &[k1, k1 * k1]);
            assert_eq!(cursor.value().len(), 16);
            assert!(seen.insert(k1));
        }
        assert_eq!(seen.len(), 5);
        // Exhausted cursors stay exhausted.
        assert!(!cursor.advance());
        assert!(cursor.next().is_none());
    }

    #[test]
    #[should_panic(expected = "not positioned")]
    fn key_before_advance_panics() {
        let array = HashSlotArray::<u64>::new(8).unwrap();
        let cursor = array.cursor();
        let _ = cursor.key();
    }

    #[test]
    fn iterator_yields_each_key_once() {
        let mut array = HashSlotArray::<u64>::with_config(
            HashSlotConfig {
                null_sentinel: 0,
                value_length: 8,
                initial_capacity: 4,
                load_factor: 0.5,
            },
            HeapAllocator,
        )
        .unwrap();
        for k in 100..200u64 {
            let addr = array.ensure(k).unwrap().addr();
            array.value_mut(addr).copy_from_slice(&k.to_ne_bytes());
        }
        for k in (100..200u64).step_by(3) {
            assert!(array.remove(k));
        }
        let mut keys: Vec<u64> = array
            .cursor()
            .map(|slot| {
                assert_eq!(slot.value, &slot.key.to_ne_bytes());
                slot.key
            })
            .collect();
        keys.sort_unstable();
        let expected: Vec<u64> = (100..200u64).filter(|k| (k - 100) % 3 != 0).collect();
        assert_eq!(keys, expected);
    }
}
