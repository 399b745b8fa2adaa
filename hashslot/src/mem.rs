//! Memory management internals for the hash slot array
//!
//! A hash slot array keeps all of its slots in one contiguous block of raw
//! memory obtained from a [`MemoryAllocator`]. The allocator is the only
//! thing that knows where that memory comes from: the process heap, a
//! preallocated arena, or something with a hard budget such as
//! [`BoundedAllocator`].
//!
//! Raw blocks are wrapped into a [`Region`], which owns the block for its
//! whole lifetime and exposes it as a slice of 64-bit words. Keys and values
//! are always whole words, so every other module works with ordinary safe
//! slice indexing and all `unsafe` code in the crate stays in this file.
//!
//! A [`Region`] does not free itself. It must be handed back to the same
//! allocator with [`Region::release`], which the owning array does when it
//! grows or is dropped.

use crate::err::Error;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Alignment of every block handed out by a [`MemoryAllocator`]
pub const WORD_ALIGN: usize = std::mem::align_of::<u64>();

/// Size of one slot word in bytes
pub const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// Source of raw, contiguous memory blocks
///
/// # Safety
///
/// Implementors guarantee that a successful [`allocate`](Self::allocate) or
/// [`reallocate`](Self::reallocate) returns a pointer to at least `size`
/// bytes, aligned to [`WORD_ALIGN`], which nobody else reads or writes until
/// the block is passed to [`free`](Self::free) or `reallocate`. Zero-sized
/// requests may return a dangling but aligned pointer.
pub unsafe trait MemoryAllocator {
    /// Allocate `size` bytes of uninitialized memory.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error>;

    /// Resize a block, preserving the first `min(old_size, new_size)` bytes.
    ///
    /// On failure the original block is untouched and still owned by the
    /// caller.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with a size of `old_size`, and
    /// must not be used again after a successful call.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        let new_ptr = self.allocate(new_size)?;
        // SAFETY: Both blocks are live, distinct, and at least this long.
        std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_size.min(new_size));
        self.free(ptr, old_size);
        Ok(new_ptr)
    }

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with a size of `size`, and must
    /// not be used again.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

/// SAFETY: Forwards to the referenced allocator unchanged.
unsafe impl<A: MemoryAllocator + ?Sized> MemoryAllocator for &A {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        (**self).allocate(size)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        (**self).reallocate(ptr, old_size, new_size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        (**self).free(ptr, size);
    }
}

/// SAFETY: Forwards to the shared allocator unchanged.
unsafe impl<A: MemoryAllocator + ?Sized> MemoryAllocator for Arc<A> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        (**self).allocate(size)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        (**self).reallocate(ptr, old_size, new_size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        (**self).free(ptr, size);
    }
}

/// Type-erased allocator that can be shared between arrays and threads
pub type SharedAllocator = Arc<dyn MemoryAllocator + Send + Sync>;

/// Allocator backed by the global Rust heap
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl HeapAllocator {
    /// Word-aligned layout for a block, or an OOM error if the size is
    /// too large to describe.
    fn layout(size: usize) -> Result<Layout, Error> {
        Layout::from_size_align(size, WORD_ALIGN).map_err(|_| Error::OutOfMemory { requested: size })
    }
}

/// SAFETY: [`std::alloc`] returns blocks of the requested layout, and we
///         always request [`WORD_ALIGN`] alignment. Zero-sized blocks use
///         an aligned dangling pointer and are never passed to the heap.
unsafe impl MemoryAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        if size == 0 {
            return Ok(NonNull::<u64>::dangling().cast());
        }
        let layout = Self::layout(size)?;
        // SAFETY: The layout has a nonzero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(Error::OutOfMemory { requested: size })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        if old_size == 0 || new_size == 0 {
            let new_ptr = self.allocate(new_size)?;
            self.free(ptr, old_size);
            return Ok(new_ptr);
        }
        // Validates new_size against isize::MAX before handing it to realloc
        let _ = Self::layout(new_size)?;
        let layout = Self::layout(old_size)?;
        let new_ptr = alloc::realloc(ptr.as_ptr(), layout, new_size);
        NonNull::new(new_ptr).ok_or(Error::OutOfMemory {
            requested: new_size,
        })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(size) {
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// Allocator wrapper that enforces a byte budget
///
/// Requests that would push the total of live bytes past `limit` fail with
/// [`Error::OutOfMemory`]. Useful for containers with a fixed memory quota,
/// and for exercising out-of-memory paths.
#[derive(Debug)]
pub struct BoundedAllocator<A = HeapAllocator> {
    /// Allocator that provides the actual memory
    inner: A,
    /// Maximum number of live bytes
    limit: usize,
    /// Number of bytes currently handed out
    used: AtomicUsize,
}

impl BoundedAllocator<HeapAllocator> {
    /// Bound the global heap to `limit` live bytes.
    pub fn new(limit: usize) -> Self {
        Self::wrap(HeapAllocator, limit)
    }
}

impl<A: MemoryAllocator> BoundedAllocator<A> {
    /// Bound an existing allocator to `limit` live bytes.
    pub fn wrap(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Number of bytes currently allocated through this wrapper.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// The configured byte budget.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reserve `size` bytes of budget, or fail without side effects.
    fn reserve(&self, size: usize) -> Result<(), Error> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= self.limit)
            })
            .map(|_| ())
            .map_err(|_| Error::OutOfMemory { requested: size })
    }

    /// Give back `size` bytes of budget.
    fn unreserve(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }
}

/// SAFETY: Every block comes from the inner allocator unchanged; this
///         wrapper only adds accounting.
unsafe impl<A: MemoryAllocator> MemoryAllocator for BoundedAllocator<A> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        self.reserve(size)?;
        self.inner.allocate(size).map_err(|e| {
            self.unreserve(size);
            e
        })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        if new_size > old_size {
            self.reserve(new_size - old_size)?;
        }
        match self.inner.reallocate(ptr, old_size, new_size) {
            Ok(new_ptr) => {
                if new_size < old_size {
                    self.unreserve(old_size - new_size);
                }
                Ok(new_ptr)
            }
            Err(e) => {
                if new_size > old_size {
                    self.unreserve(new_size - old_size);
                }
                Err(e)
            }
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        self.inner.free(ptr, size);
        self.unreserve(size);
    }
}

/// Exclusively owned block of 64-bit words
///
/// Always fully initialized: freshly allocated regions are zeroed before
/// they are exposed as a slice.
#[derive(Debug)]
pub(crate) struct Region {
    /// Start of the block, aligned to [`WORD_ALIGN`]
    ptr: NonNull<u64>,
    /// Length of the block in words
    len: usize,
}

/// SAFETY: A [`Region`] is the unique owner of its block, like a `Box<[u64]>`.
unsafe impl Send for Region {}

/// SAFETY: Shared references only permit reads.
unsafe impl Sync for Region {}

impl Region {
    /// Allocate a zeroed region of `len` words.
    pub(crate) fn allocate<A: MemoryAllocator>(allocator: &A, len: usize) -> Result<Self, Error> {
        let size = len
            .checked_mul(WORD_SIZE)
            .ok_or(Error::OutOfMemory { requested: usize::MAX })?;
        let ptr = allocator.allocate(size)?.cast::<u64>();
        debug_assert_eq!(ptr.as_ptr() as usize % WORD_ALIGN, 0);
        // SAFETY: The allocator promised `size` writable, aligned bytes that
        //         nobody else is using.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, len) };
        Ok(Self { ptr, len })
    }

    /// Zero-length region that owns no memory.
    pub(crate) fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Length in words.
    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Size in bytes.
    #[inline(always)]
    pub(crate) fn byte_len(&self) -> usize {
        self.len() * WORD_SIZE
    }

    /// The whole region as words.
    #[inline(always)]
    pub(crate) fn words(&self) -> &[u64] {
        // SAFETY: The block is live, aligned, initialized, and owned by us.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The whole region as mutable words.
    #[inline(always)]
    pub(crate) fn words_mut(&mut self) -> &mut [u64] {
        // SAFETY: As for `words`, and `&mut self` makes the access unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Hand the block back to the allocator it came from.
    ///
    /// # Safety
    ///
    /// `allocator` must be the allocator (or a handle to the same allocator)
    /// that produced this region.
    pub(crate) unsafe fn release<A: MemoryAllocator>(self, allocator: &A) {
        if self.len != 0 {
            allocator.free(self.ptr.cast(), self.byte_len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_is_zeroed_and_writable() {
        let heap = HeapAllocator;
        let mut region = Region::allocate(&heap, 64).unwrap();
        assert_eq!(region.len(), 64);
        assert_eq!(region.byte_len(), 512);
        assert!(region.words().iter().all(|&w| w == 0));
        region.words_mut()[63] = u64::MAX;
        assert_eq!(region.words()[63], u64::MAX);
        unsafe { region.release(&heap) };
    }

    #[test]
    fn empty_region() {
        let heap = HeapAllocator;
        let region = Region::allocate(&heap, 0).unwrap();
        assert!(region.words().is_empty());
        unsafe { region.release(&heap) };
    }

    #[test]
    fn bounded_allocator_accounting() {
        let bounded = BoundedAllocator::new(256);
        let a = Region::allocate(&bounded, 16).unwrap();
        assert_eq!(bounded.used(), 128);
        let b = Region::allocate(&bounded, 16).unwrap();
        assert_eq!(bounded.used(), 256);
        assert_eq!(
            Region::allocate(&bounded, 1).unwrap_err(),
            Error::OutOfMemory { requested: 8 }
        );
        assert_eq!(bounded.used(), 256);
        unsafe { a.release(&bounded) };
        assert_eq!(bounded.used(), 128);
        unsafe { b.release(&bounded) };
        assert_eq!(bounded.used(), 0);
    }

    #[test]
    fn reallocate_preserves_prefix() {
        let bounded = BoundedAllocator::new(1024);
        let ptr = bounded.allocate(16).unwrap();
        unsafe {
            std::ptr::copy_nonoverlapping([7u8; 16].as_ptr(), ptr.as_ptr(), 16);
            let grown = bounded.reallocate(ptr, 16, 512).unwrap();
            assert_eq!(bounded.used(), 512);
            assert_eq!(std::slice::from_raw_parts(grown.as_ptr(), 16), &[7u8; 16]);

            // Over budget: the original block stays valid.
            assert!(bounded.reallocate(grown, 512, 2048).is_err());
            assert_eq!(bounded.used(), 512);
            assert_eq!(std::slice::from_raw_parts(grown.as_ptr(), 16), &[7u8; 16]);

            let shrunk = bounded.reallocate(grown, 512, 8).unwrap();
            assert_eq!(bounded.used(), 8);
            assert_eq!(std::slice::from_raw_parts(shrunk.as_ptr(), 8), &[7u8; 8]);
            bounded.free(shrunk, 8);
        }
        assert_eq!(bounded.used(), 0);
    }

    #[test]
    fn shared_allocator_handles() {
        let shared = Arc::new(BoundedAllocator::new(64));
        let handle = Arc::clone(&shared);
        let region = Region::allocate(&handle, 8).unwrap();
        assert_eq!(shared.used(), 64);
        unsafe { region.release(&handle) };
        assert_eq!(shared.used(), 0);
    }
}
