//! Slot layout and key types
//!
//! Every slot is `[key words][value words]`. Keys are one or two 64-bit
//! words, compared as raw bit patterns. One designated word per slot, the
//! sentinel word, tells assigned slots from unassigned ones: it is the first
//! value word when the array stores values, and the first key word for
//! key-only arrays.

use crate::err::Error;
use crate::hash;
use crate::mem::WORD_SIZE;
use std::fmt::Debug;

/// Value lengths must be a multiple of this many bytes
pub const VALUE_LENGTH_GRANULARITY: usize = WORD_SIZE;

/// Fixed-width keys that can be stored in a slot
pub trait SlotKey: Copy + Eq + Debug {
    /// Number of 64-bit words in the key
    const WORDS: usize;

    /// Key length in bytes
    const LENGTH: usize = Self::WORDS * WORD_SIZE;

    /// Mixed hash used to pick the key's ideal slot.
    fn slot_hash(&self) -> u64;

    /// First key word, which doubles as the sentinel in key-only arrays.
    fn first_word(&self) -> u64;

    /// Write the key into exactly [`Self::WORDS`] words.
    fn store(&self, words: &mut [u64]);

    /// Read a key back from exactly [`Self::WORDS`] words.
    fn load(words: &[u64]) -> Self;
}

/// 8-byte key
impl SlotKey for u64 {
    const WORDS: usize = 1;

    #[inline(always)]
    fn slot_hash(&self) -> u64 {
        hash::fast_long_mix(*self)
    }

    #[inline(always)]
    fn first_word(&self) -> u64 {
        *self
    }

    #[inline(always)]
    fn store(&self, words: &mut [u64]) {
        words[0] = *self;
    }

    #[inline(always)]
    fn load(words: &[u64]) -> Self {
        words[0]
    }
}

/// 16-byte key, as a pair of words
impl SlotKey for (u64, u64) {
    const WORDS: usize = 2;

    #[inline(always)]
    fn slot_hash(&self) -> u64 {
        hash::hash_key_pair(self.0, self.1)
    }

    #[inline(always)]
    fn first_word(&self) -> u64 {
        self.0
    }

    #[inline(always)]
    fn store(&self, words: &mut [u64]) {
        words[0] = self.0;
        words[1] = self.1;
    }

    #[inline(always)]
    fn load(words: &[u64]) -> Self {
        (words[0], words[1])
    }
}

/// Where the sentinel word lives inside a slot
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SentinelPlacement {
    /// First value word; the caller must overwrite it after creating a slot
    Value,
    /// First key word; writing the key assigns the slot
    Key,
}

/// Byte and word offsets of the fields inside one slot
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotLayout {
    /// Key length in words
    key_words: usize,
    /// Value length in words
    value_words: usize,
    /// Which field carries the sentinel word
    sentinel: SentinelPlacement,
}

impl SlotLayout {
    /// Layout for a key of `K` and a nonzero value of `value_length` bytes.
    pub fn with_value<K: SlotKey>(value_length: usize) -> Result<Self, Error> {
        if value_length == 0 || value_length % VALUE_LENGTH_GRANULARITY != 0 {
            return Err(Error::InvalidValueLength(value_length));
        }
        Ok(Self {
            key_words: K::WORDS,
            value_words: value_length / WORD_SIZE,
            sentinel: SentinelPlacement::Value,
        })
    }

    /// Layout for a key of `K` with no value at all.
    pub fn key_only<K: SlotKey>() -> Self {
        Self {
            key_words: K::WORDS,
            value_words: 0,
            sentinel: SentinelPlacement::Key,
        }
    }

    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        self.key_words * WORD_SIZE
    }

    /// Value length in bytes.
    pub fn value_length(&self) -> usize {
        self.value_words * WORD_SIZE
    }

    /// Slot length in bytes.
    pub fn slot_length(&self) -> usize {
        self.slot_words() * WORD_SIZE
    }

    /// Byte offset of the value field from the slot base.
    pub fn value_offset(&self) -> usize {
        self.key_length()
    }

    /// Where the sentinel word lives.
    pub fn sentinel_placement(&self) -> SentinelPlacement {
        self.sentinel
    }

    /// Key length in words.
    #[inline(always)]
    pub(crate) fn key_words(&self) -> usize {
        self.key_words
    }

    /// Value length in words.
    #[inline(always)]
    pub(crate) fn value_words(&self) -> usize {
        self.value_words
    }

    /// Slot length in words.
    #[inline(always)]
    pub(crate) fn slot_words(&self) -> usize {
        self.key_words + self.value_words
    }

    /// Word offset of the sentinel from the slot base.
    #[inline(always)]
    pub(crate) fn sentinel_word(&self) -> usize {
        match self.sentinel {
            SentinelPlacement::Value => self.key_words,
            SentinelPlacement::Key => 0,
        }
    }

    /// Word offset of a slot from the region base.
    #[inline(always)]
    pub(crate) fn slot_base(&self, slot: usize) -> usize {
        slot * self.slot_words()
    }

    /// Byte offset of a slot's value field from the region base.
    #[inline(always)]
    pub(crate) fn value_addr_of_slot(&self, slot: usize) -> usize {
        self.slot_base(slot) * WORD_SIZE + self.value_offset()
    }

    /// Slot index for a value field's byte offset, if the offset is one.
    #[inline(always)]
    pub(crate) fn slot_of_value_addr(&self, addr: usize) -> Option<usize> {
        let base = addr.checked_sub(self.value_offset())?;
        let slot_length = self.slot_length();
        (base % slot_length == 0).then(|| base / slot_length)
    }
}
