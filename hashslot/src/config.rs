//! Construction parameters for hash slot arrays

use crate::array::HashSlotArray;
use crate::capacity::{self, DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR};
use crate::err::Error;
use crate::layout::SlotKey;
use crate::mem::{HeapAllocator, MemoryAllocator};
use serde::{Deserialize, Serialize};

/// Parameters shared by every hash slot array
///
/// Missing fields take their [`Default`] values when deserialized, so a
/// container configuration only needs to name what it changes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashSlotConfig {
    /// Word that marks a slot as unassigned. Must never appear as the
    /// first word of a real value (or, for key-only arrays, of a key).
    pub null_sentinel: u64,
    /// Value length in bytes: a positive multiple of 8, or zero for
    /// key-only arrays
    pub value_length: usize,
    /// Initial number of slots, a power of two
    pub initial_capacity: usize,
    /// Maximum ratio of assigned slots to capacity, strictly between 0 and 1
    pub load_factor: f32,
}

impl Default for HashSlotConfig {
    fn default() -> Self {
        Self {
            null_sentinel: 0,
            value_length: 8,
            initial_capacity: DEFAULT_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl HashSlotConfig {
    /// Check capacity and load factor. Value length depends on the variant
    /// and is checked by the layout.
    pub fn validate(&self) -> Result<(), Error> {
        capacity::validate_capacity(self.initial_capacity)?;
        capacity::validate_load_factor(self.load_factor)
    }
}

/// Builder for creating [`HashSlotArray`] instances with custom settings
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HashSlotArrayBuilder {
    /// Settings collected so far
    config: HashSlotConfig,
}

impl HashSlotArrayBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: HashSlotConfig) -> Self {
        Self { config }
    }

    /// Select the null sentinel.
    pub fn null_sentinel(&mut self, null_sentinel: u64) -> &mut Self {
        self.config.null_sentinel = null_sentinel;
        self
    }

    /// Select the value length in bytes.
    pub fn value_length(&mut self, value_length: usize) -> &mut Self {
        self.config.value_length = value_length;
        self
    }

    /// Select the initial capacity. Must be a power of two.
    pub fn initial_capacity(&mut self, initial_capacity: usize) -> &mut Self {
        self.config.initial_capacity = initial_capacity;
        self
    }

    /// Pick the smallest capacity that holds `entries` without growing,
    /// under the load factor selected so far.
    pub fn expected_entries(&mut self, entries: usize) -> Result<&mut Self, Error> {
        self.config.initial_capacity = capacity::capacity_for(entries, self.config.load_factor)?;
        Ok(self)
    }

    /// Select the load factor.
    pub fn load_factor(&mut self, load_factor: f32) -> &mut Self {
        self.config.load_factor = load_factor;
        self
    }

    /// The configuration as built so far.
    pub fn config(&self) -> &HashSlotConfig {
        &self.config
    }

    /// Build an array that stores values, on the global heap.
    pub fn build<K: SlotKey>(&self) -> Result<HashSlotArray<K>, Error> {
        HashSlotArray::with_config(self.config, HeapAllocator)
    }

    /// Build an array that stores values, using `allocator`.
    pub fn build_in<K: SlotKey, A: MemoryAllocator>(
        &self,
        allocator: A,
    ) -> Result<HashSlotArray<K, A>, Error> {
        HashSlotArray::with_config(self.config, allocator)
    }

    /// Build a key-only array, using `allocator`.
    ///
    /// The value length must be set to zero.
    pub fn build_key_only_in<K: SlotKey, A: MemoryAllocator>(
        &self,
        allocator: A,
    ) -> Result<HashSlotArray<K, A>, Error> {
        HashSlotArray::key_only_with_config(self.config, allocator)
    }
}
