//! Error types for the `hashslot` crate

/// Errors raised while building or mutating a hash slot array
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The memory allocator could not satisfy a request.
    ///
    /// Raised during construction or growth. A failed growth leaves the
    /// array exactly as it was before the triggering call.
    #[error("out of memory: allocator could not provide {requested} bytes")]
    OutOfMemory {
        /// Size of the failed request in bytes
        requested: usize,
    },

    /// The requested capacity is not a power of two.
    #[error("capacity must be a power of two, but was {0}")]
    InvalidCapacity(usize),

    /// The value length is not a multiple of 8, or is zero for an array
    /// that stores values, or is nonzero for a key-only array.
    #[error("invalid value length {0}: must be a positive multiple of 8, or zero for key-only arrays")]
    InvalidValueLength(usize),

    /// The load factor does not lie strictly between 0 and 1.
    #[error("load factor must lie strictly between 0 and 1, but was {0}")]
    InvalidLoadFactor(f32),

    /// Doubling the capacity would overflow the addressable size.
    #[error("hash slot array cannot grow beyond a capacity of {0} slots")]
    CapacityOverflow(usize),

    /// A key-only array was asked to store a key whose first word is the
    /// null sentinel, which would make the slot look unassigned.
    #[error("key collides with the null sentinel {0:#x}")]
    SentinelKey(u64),

    /// A probe visited every slot without finding the key or a free slot.
    ///
    /// Growth keeps the load factor below one, so this only happens when
    /// a caller wrote the null sentinel into an assigned slot's value.
    #[error("probe visited all {0} slots without finding a free one")]
    TableFull(usize),
}
