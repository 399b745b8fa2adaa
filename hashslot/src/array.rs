//! The open-addressing hash slot array
//!
//! All slots live in one [`Region`] of `capacity * slot_length` bytes.
//! Collisions are resolved by linear probing with a step of one, and
//! removal uses backward-shift deletion, so there are no tombstones: a
//! probe may always stop at the first unassigned slot it meets.

use crate::capacity;
use crate::config::HashSlotConfig;
use crate::cursor::Cursor;
use crate::err::Error;
use crate::layout::{SentinelPlacement, SlotKey, SlotLayout};
use crate::mem::{HeapAllocator, MemoryAllocator, Region, SharedAllocator, WORD_SIZE};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

/// Opaque handle to the value field of one slot
///
/// Internally this is the byte offset of the value field from the start of
/// the backing region. A handle stays valid until the next call to
/// [`HashSlotArray::ensure`], [`HashSlotArray::remove`] or
/// [`HashSlotArray::clear`], which may move or discard slots.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ValueAddr(usize);

impl ValueAddr {
    /// Byte offset of the value field within the backing region.
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Outcome of [`HashSlotArray::ensure`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SlotResult {
    /// The key was absent and now owns a fresh slot.
    ///
    /// For arrays that store values, the value still holds the null
    /// sentinel. The caller must overwrite its first word before anything
    /// else observes the slot, or the slot reads as unassigned.
    Created(ValueAddr),
    /// The key was already present.
    Found(ValueAddr),
}

impl SlotResult {
    /// Address of the slot's value field.
    pub fn addr(self) -> ValueAddr {
        match self {
            SlotResult::Created(addr) | SlotResult::Found(addr) => addr,
        }
    }

    /// True if the slot was created by this call.
    pub fn is_created(self) -> bool {
        matches!(self, SlotResult::Created(_))
    }

    /// Pack into one signed word: the address for a created slot, its
    /// bitwise complement for an existing one.
    pub fn encode(self) -> i64 {
        match self {
            SlotResult::Created(addr) => addr.0 as i64,
            SlotResult::Found(addr) => !(addr.0 as i64),
        }
    }

    /// Unpack a word produced by [`Self::encode`].
    pub fn decode(raw: i64) -> Self {
        if raw >= 0 {
            SlotResult::Created(ValueAddr(raw as usize))
        } else {
            SlotResult::Found(ValueAddr(!raw as usize))
        }
    }
}

/// Result of probing for a key
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Probe {
    /// Slot holding the key
    Found(usize),
    /// First unassigned slot on the key's probe sequence
    Vacant(usize),
}

/// Hash table of fixed-width keys and values in externally allocated memory
///
/// `K` selects the key width: [`u64`] for 8-byte keys or `(u64, u64)` for
/// 16-byte keys. The value length is fixed at construction. Values are
/// opaque bytes, accessed through [`ValueAddr`] handles.
///
/// Every mutation takes `&mut self`, so the single-writer rule is checked
/// by the borrow checker, and a [`Cursor`] can never observe a mutation.
pub struct HashSlotArray<K: SlotKey, A: MemoryAllocator = HeapAllocator> {
    /// Source of the backing region
    allocator: A,
    /// Holds a copy of the slots while the backing region is replaced
    aux_allocator: Option<SharedAllocator>,
    /// Backing region of `capacity` slots
    region: Region,
    /// Set while `region` belongs to `aux_allocator`, after a growth whose
    /// replacement region could not be allocated
    region_in_aux: bool,
    /// Field offsets within one slot
    layout: SlotLayout,
    /// Word marking an unassigned slot
    null_sentinel: u64,
    /// Number of slots, a power of two
    capacity: usize,
    /// Number of assigned slots
    size: usize,
    /// Maximum ratio of `size` to `capacity`
    load_factor: f32,
    /// Largest `size` allowed at the current capacity
    expansion_threshold: usize,
    /// Slot returned as created whose sentinel the caller has yet to overwrite
    pending: Option<usize>,
    /// Key type marker
    _key: PhantomData<K>,
}

/// Array with 8-byte keys
pub type HashSlotArray8ByteKey<A = HeapAllocator> = HashSlotArray<u64, A>;

/// Array with 16-byte keys
pub type HashSlotArray16ByteKey<A = HeapAllocator> = HashSlotArray<(u64, u64), A>;

impl<K: SlotKey> HashSlotArray<K, HeapAllocator> {
    /// New array on the global heap, with default capacity, load factor
    /// and a null sentinel of zero.
    pub fn new(value_length: usize) -> Result<Self, Error> {
        let config = HashSlotConfig {
            value_length,
            ..HashSlotConfig::default()
        };
        Self::with_config(config, HeapAllocator)
    }
}

impl<K: SlotKey, A: MemoryAllocator> HashSlotArray<K, A> {
    /// New array that stores values of `config.value_length` bytes.
    ///
    /// Zero-length values are rejected; use [`Self::key_only_with_config`].
    pub fn with_config(config: HashSlotConfig, allocator: A) -> Result<Self, Error> {
        config.validate()?;
        let layout = SlotLayout::with_value::<K>(config.value_length)?;
        Self::create(config, layout, allocator)
    }

    /// New array with keys only, for use as a set.
    ///
    /// The sentinel lives in the first key word, so keys whose first word
    /// equals the null sentinel cannot be stored. `config.value_length` must
    /// be zero.
    pub fn key_only_with_config(config: HashSlotConfig, allocator: A) -> Result<Self, Error> {
        config.validate()?;
        if config.value_length != 0 {
            return Err(Error::InvalidValueLength(config.value_length));
        }
        Self::create(config, SlotLayout::key_only::<K>(), allocator)
    }

    /// Allocate and initialize the backing region.
    fn create(config: HashSlotConfig, layout: SlotLayout, allocator: A) -> Result<Self, Error> {
        let capacity = config.initial_capacity;
        let mut region = Self::allocate_region(&allocator, layout, capacity)?;
        Self::mark_all_unassigned(region.words_mut(), layout, config.null_sentinel);
        tracing::trace!(
            capacity,
            key_length = layout.key_length(),
            value_length = layout.value_length(),
            load_factor = config.load_factor,
            "created hash slot array"
        );
        Ok(Self {
            allocator,
            aux_allocator: None,
            region,
            region_in_aux: false,
            layout,
            null_sentinel: config.null_sentinel,
            capacity,
            size: 0,
            load_factor: config.load_factor,
            expansion_threshold: capacity::expansion_threshold(capacity, config.load_factor),
            pending: None,
            _key: PhantomData,
        })
    }

    /// Use `aux` for the copy of the old slots during growth.
    ///
    /// Without it, growth needs the old and the new region from the main
    /// allocator at once. With it, the old slots are copied out to `aux` and
    /// their region is freed before the new one is allocated, so the main
    /// allocator only ever holds one region.
    pub fn with_aux_allocator(mut self, aux: SharedAllocator) -> Self {
        self.aux_allocator = Some(aux);
        self
    }

    /// Number of assigned slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True if no slot is assigned.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of slots in the backing region.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured load factor.
    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    /// Largest size the array holds before the next growth.
    pub fn expansion_threshold(&self) -> usize {
        self.expansion_threshold
    }

    /// Word that marks unassigned slots.
    pub fn null_sentinel(&self) -> u64 {
        self.null_sentinel
    }

    /// Field offsets within one slot.
    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    /// Size of the backing region in bytes.
    pub fn footprint(&self) -> usize {
        self.region.byte_len()
    }

    /// The allocator backing this array.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Find the slot for `key`, creating it if absent.
    ///
    /// On [`SlotResult::Created`] in an array with values, the caller must
    /// overwrite the null sentinel in the first value word (see
    /// [`Self::value_mut`]) before the slot is read or the array is mutated
    /// again. Builds with debug assertions check this on the next mutation.
    ///
    /// Fails with [`Error::OutOfMemory`] if growth cannot be satisfied, in
    /// which case the array is unchanged.
    pub fn ensure(&mut self, key: K) -> Result<SlotResult, Error> {
        self.check_pending();
        if self.layout.sentinel_placement() == SentinelPlacement::Key
            && key.first_word() == self.null_sentinel
        {
            return Err(Error::SentinelKey(self.null_sentinel));
        }

        let mut slot = match self.probe(key)? {
            Probe::Found(slot) => {
                return Ok(SlotResult::Found(self.value_addr_of_slot(slot)));
            }
            Probe::Vacant(slot) => slot,
        };
        if self.size + 1 > self.expansion_threshold {
            self.grow_to_fit(self.size + 1)?;
            slot = self.vacant_slot_for(key);
        }

        let base = self.layout.slot_base(slot);
        let key_words = self.layout.key_words();
        key.store(&mut self.region.words_mut()[base..base + key_words]);
        self.size += 1;
        if self.layout.sentinel_placement() == SentinelPlacement::Value {
            self.pending = Some(slot);
        }
        Ok(SlotResult::Created(self.value_addr_of_slot(slot)))
    }

    /// Look up the value address for `key`.
    pub fn get(&self, key: K) -> Option<ValueAddr> {
        match self.probe(key) {
            Ok(Probe::Found(slot)) => Some(self.value_addr_of_slot(slot)),
            _ => None,
        }
    }

    /// True if `key` is assigned.
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, returning whether it was present.
    pub fn remove(&mut self, key: K) -> bool {
        self.check_pending();
        match self.probe(key) {
            Ok(Probe::Found(slot)) => {
                self.size -= 1;
                self.shift_conflicting_keys(slot);
                true
            }
            _ => false,
        }
    }

    /// Mark every slot unassigned. Capacity is kept.
    pub fn clear(&mut self) {
        self.check_pending();
        let words = self.region.words_mut();
        words.fill(0);
        Self::mark_all_unassigned(words, self.layout, self.null_sentinel);
        self.size = 0;
    }

    /// Release the backing region. Equivalent to dropping the array.
    pub fn dispose(self) {
        drop(self);
    }

    /// Enumerate the assigned slots.
    pub fn cursor(&self) -> Cursor<'_, K, A> {
        Cursor::new(self)
    }

    /// Key stored in the slot whose value lives at `addr`.
    ///
    /// Panics if `addr` is not a value address of this array.
    pub fn key_at(&self, addr: ValueAddr) -> K {
        self.key_of_slot(self.slot_of(addr))
    }

    /// Value bytes at `addr`.
    ///
    /// Panics if `addr` is not a value address of this array.
    pub fn value(&self, addr: ValueAddr) -> &[u8] {
        bytemuck::cast_slice(self.value_words(addr))
    }

    /// Mutable value bytes at `addr`.
    ///
    /// Panics if `addr` is not a value address of this array.
    pub fn value_mut(&mut self, addr: ValueAddr) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.value_words_mut(addr))
    }

    /// Value at `addr` as 64-bit words. In arrays with values, the first
    /// word is the sentinel word.
    ///
    /// Panics if `addr` is not a value address of this array.
    pub fn value_words(&self, addr: ValueAddr) -> &[u64] {
        let range = self.value_range(addr);
        &self.region.words()[range]
    }

    /// Mutable value at `addr` as 64-bit words.
    ///
    /// Panics if `addr` is not a value address of this array.
    pub fn value_words_mut(&mut self, addr: ValueAddr) -> &mut [u64] {
        let range = self.value_range(addr);
        &mut self.region.words_mut()[range]
    }

    /// True if the slot's sentinel word has been overwritten.
    #[inline(always)]
    pub(crate) fn is_assigned(&self, slot: usize) -> bool {
        let word = self.layout.slot_base(slot) + self.layout.sentinel_word();
        self.region.words()[word] != self.null_sentinel
    }

    /// Key stored in a slot.
    #[inline(always)]
    pub(crate) fn key_of_slot(&self, slot: usize) -> K {
        let base = self.layout.slot_base(slot);
        K::load(&self.region.words()[base..base + self.layout.key_words()])
    }

    /// Value address of a slot.
    #[inline(always)]
    pub(crate) fn value_addr_of_slot(&self, slot: usize) -> ValueAddr {
        ValueAddr(self.layout.value_addr_of_slot(slot))
    }

    /// Slot index behind a value address, or a panic for foreign handles.
    fn slot_of(&self, addr: ValueAddr) -> usize {
        match self
            .layout
            .slot_of_value_addr(addr.0)
            .filter(|&slot| slot < self.capacity)
        {
            Some(slot) => slot,
            None => panic!(
                "{} is not a value address in this array of {} slots",
                addr.0, self.capacity
            ),
        }
    }

    /// Word range of the value field behind `addr`.
    fn value_range(&self, addr: ValueAddr) -> Range<usize> {
        let start = self.layout.slot_base(self.slot_of(addr)) + self.layout.key_words();
        start..start + self.layout.value_words()
    }

    /// Ideal slot of `key` at the current capacity.
    #[inline(always)]
    fn home_slot(&self, key: K) -> usize {
        (key.slot_hash() as usize) & (self.capacity - 1)
    }

    /// Walk the probe sequence of `key` until it or a vacancy turns up.
    ///
    /// Bounded by the capacity, so a corrupted sentinel cannot make it spin.
    fn probe(&self, key: K) -> Result<Probe, Error> {
        let mask = self.capacity - 1;
        let mut slot = self.home_slot(key);
        for _ in 0..self.capacity {
            if !self.is_assigned(slot) {
                return Ok(Probe::Vacant(slot));
            }
            if self.key_of_slot(slot) == key {
                return Ok(Probe::Found(slot));
            }
            slot = (slot + 1) & mask;
        }
        Err(Error::TableFull(self.capacity))
    }

    /// First vacancy on the probe sequence of a key known to be absent,
    /// right after growth.
    fn vacant_slot_for(&self, key: K) -> usize {
        let mask = self.capacity - 1;
        let mut slot = self.home_slot(key);
        while self.is_assigned(slot) {
            slot = (slot + 1) & mask;
        }
        slot
    }

    /// Close the gap at `gap` by shifting later members of the cluster back.
    ///
    /// A slot may move into the gap unless its home slot lies cyclically in
    /// `(gap, slot]`, in which case moving it would put it before its home
    /// and make it unreachable.
    fn shift_conflicting_keys(&mut self, gap: usize) {
        let mask = self.capacity - 1;
        let slot_words = self.layout.slot_words();
        let mut prev = gap;
        let mut curr = gap;
        for _ in 0..self.capacity {
            curr = (curr + 1) & mask;
            if !self.is_assigned(curr) {
                break;
            }
            let home = self.home_slot(self.key_of_slot(curr));
            let stays = if prev <= curr {
                prev < home && home <= curr
            } else {
                prev < home || home <= curr
            };
            if stays {
                continue;
            }
            let src = self.layout.slot_base(curr);
            self.region
                .words_mut()
                .copy_within(src..src + slot_words, self.layout.slot_base(prev));
            prev = curr;
        }
        let sentinel = self.layout.slot_base(prev) + self.layout.sentinel_word();
        self.region.words_mut()[sentinel] = self.null_sentinel;
    }

    /// Grow by doubling until `size` entries fit under the load factor.
    fn grow_to_fit(&mut self, size: usize) -> Result<(), Error> {
        let mut new_capacity = capacity::next_capacity(self.capacity)?;
        while size > capacity::expansion_threshold(new_capacity, self.load_factor) {
            new_capacity = capacity::next_capacity(new_capacity)?;
        }
        self.resize_to(new_capacity)
    }

    /// Rehash every assigned slot into a new region of `new_capacity` slots.
    ///
    /// The old region is released only once the new one is fully populated
    /// and installed. On allocation failure nothing changes.
    fn resize_to(&mut self, new_capacity: usize) -> Result<(), Error> {
        if let Some(aux) = self.aux_allocator.clone() {
            return self.resize_through_aux(&aux, new_capacity);
        }
        let layout = self.layout;
        let mut region = Self::allocate_region(&self.allocator, layout, new_capacity)
            .map_err(|e| self.growth_failed(new_capacity, e))?;
        Self::rehash(self.region.words(), region.words_mut(), layout, self.null_sentinel);
        let old = std::mem::replace(&mut self.region, region);
        // SAFETY: The old region came from our own allocator.
        unsafe { old.release(&self.allocator) };
        self.grew(new_capacity);
        Ok(())
    }

    /// Like [`Self::resize_to`], but parks the old slots in the auxiliary
    /// allocator so the main allocator never holds two regions.
    ///
    /// If the new region cannot be allocated, the slots go back into a main
    /// region of the old size, or stay in the auxiliary copy when even that
    /// fails. Either way the contents and capacity are unchanged.
    fn resize_through_aux(
        &mut self,
        aux: &SharedAllocator,
        new_capacity: usize,
    ) -> Result<(), Error> {
        let layout = self.layout;
        if !self.region_in_aux {
            let mut copy = Region::allocate(aux, self.region.len())
                .map_err(|e| self.growth_failed(new_capacity, e))?;
            copy.words_mut().copy_from_slice(self.region.words());
            let old = std::mem::replace(&mut self.region, copy);
            // SAFETY: The old region came from our own allocator.
            unsafe { old.release(&self.allocator) };
            self.region_in_aux = true;
        }

        let mut region = match Self::allocate_region(&self.allocator, layout, new_capacity) {
            Ok(region) => region,
            Err(e) => {
                let e = self.growth_failed(new_capacity, e);
                if let Ok(mut restored) = Region::allocate(&self.allocator, self.region.len()) {
                    restored.words_mut().copy_from_slice(self.region.words());
                    let copy = std::mem::replace(&mut self.region, restored);
                    // SAFETY: The copy came from the auxiliary allocator.
                    unsafe { copy.release(aux) };
                    self.region_in_aux = false;
                }
                return Err(e);
            }
        };
        Self::rehash(self.region.words(), region.words_mut(), layout, self.null_sentinel);
        let copy = std::mem::replace(&mut self.region, region);
        // SAFETY: The copy came from the auxiliary allocator.
        unsafe { copy.release(aux) };
        self.region_in_aux = false;
        self.grew(new_capacity);
        Ok(())
    }

    /// Copy every assigned slot of `src` into its probe position in the
    /// zeroed region `dst`.
    fn rehash(src: &[u64], dst: &mut [u64], layout: SlotLayout, null: u64) {
        Self::mark_all_unassigned(dst, layout, null);
        let slot_words = layout.slot_words();
        let sentinel_word = layout.sentinel_word();
        let mask = dst.len() / slot_words - 1;
        for slot in src.chunks_exact(slot_words) {
            if slot[sentinel_word] == null {
                continue;
            }
            let key = K::load(&slot[..layout.key_words()]);
            let mut target = (key.slot_hash() as usize) & mask;
            while dst[target * slot_words + sentinel_word] != null {
                target = (target + 1) & mask;
            }
            dst[target * slot_words..(target + 1) * slot_words].copy_from_slice(slot);
        }
    }

    fn growth_failed(&self, new_capacity: usize, e: Error) -> Error {
        tracing::warn!(
            capacity = self.capacity,
            new_capacity,
            size = self.size,
            error = %e,
            "hash slot array growth failed"
        );
        e
    }

    fn grew(&mut self, new_capacity: usize) {
        tracing::debug!(
            old_capacity = self.capacity,
            new_capacity,
            size = self.size,
            "grew hash slot array"
        );
        self.capacity = new_capacity;
        self.expansion_threshold = capacity::expansion_threshold(new_capacity, self.load_factor);
    }

    /// Allocate a zeroed region for `capacity` slots.
    fn allocate_region(allocator: &A, layout: SlotLayout, capacity: usize) -> Result<Region, Error> {
        let words = capacity
            .checked_mul(layout.slot_words())
            .filter(|words| words.checked_mul(WORD_SIZE).is_some())
            .ok_or(Error::CapacityOverflow(capacity))?;
        Region::allocate(allocator, words)
    }

    /// Write the sentinel into every slot of a zeroed region.
    fn mark_all_unassigned(words: &mut [u64], layout: SlotLayout, null_sentinel: u64) {
        if null_sentinel == 0 {
            return;
        }
        let sentinel_word = layout.sentinel_word();
        for slot in words.chunks_exact_mut(layout.slot_words()) {
            slot[sentinel_word] = null_sentinel;
        }
    }

    /// Forget the slot created by the previous `ensure`, checking in debug
    /// builds that the caller assigned it.
    fn check_pending(&mut self) {
        if let Some(slot) = self.pending.take() {
            debug_assert!(
                self.is_assigned(slot),
                "slot created by ensure() still holds the null sentinel"
            );
        }
    }

    /// Number of slots visited by `get(key)`, or `None` if absent.
    #[cfg(any(test, feature = "unstable-internals"))]
    #[cfg_attr(feature = "unstable-internals", visibility::make(pub))]
    pub(crate) fn probe_length(&self, key: K) -> Option<usize> {
        match self.probe(key) {
            Ok(Probe::Found(slot)) => {
                Some(((slot + self.capacity - self.home_slot(key)) & (self.capacity - 1)) + 1)
            }
            _ => None,
        }
    }

    /// Panic if any structural invariant is broken.
    ///
    /// Checks that the size matches the assigned slots and stays under the
    /// expansion threshold, that each key is reachable from its home slot
    /// through assigned slots only, and that no key appears twice.
    #[cfg(any(test, feature = "unstable-internals"))]
    #[cfg_attr(feature = "unstable-internals", visibility::make(pub))]
    pub(crate) fn check_invariants(&self) {
        assert!(self.capacity.is_power_of_two());
        assert!(self.size <= self.expansion_threshold);
        let mask = self.capacity - 1;
        let mut assigned = 0;
        for slot in 0..self.capacity {
            if !self.is_assigned(slot) {
                continue;
            }
            assigned += 1;
            let key = self.key_of_slot(slot);
            let mut walk = self.home_slot(key);
            while walk != slot {
                assert!(
                    self.is_assigned(walk),
                    "{:?} in slot {} is cut off from its home slot",
                    key,
                    slot
                );
                walk = (walk + 1) & mask;
            }
            assert_eq!(self.probe(key), Ok(Probe::Found(slot)), "duplicate {:?}", key);
        }
        assert_eq!(assigned, self.size);
    }
}

impl<K: SlotKey, A: MemoryAllocator> Drop for HashSlotArray<K, A> {
    fn drop(&mut self) {
        let region = std::mem::replace(&mut self.region, Region::empty());
        match &self.aux_allocator {
            // SAFETY: The flag records which allocator the region came from.
            Some(aux) if self.region_in_aux => unsafe { region.release(aux) },
            // SAFETY: As above.
            _ => unsafe { region.release(&self.allocator) },
        }
    }
}

impl<K: SlotKey, A: MemoryAllocator> fmt::Debug for HashSlotArray<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashSlotArray")
            .field("layout", &self.layout)
            .field("null_sentinel", &self.null_sentinel)
            .field("capacity", &self.capacity)
            .field("size", &self.size)
            .field("load_factor", &self.load_factor)
            .finish()
    }
}
