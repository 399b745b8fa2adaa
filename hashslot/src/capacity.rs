//! Capacity and load factor arithmetic
//!
//! Capacities are always powers of two so a slot index is a mask of the
//! hash instead of a division.

use crate::err::Error;

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 16;

/// Load factor used when none is configured
pub const DEFAULT_LOAD_FACTOR: f32 = 0.6;

/// Smallest capacity produced by [`round_capacity`]
pub const MIN_CAPACITY: usize = 4;

/// Largest capacity an array may grow to
pub const MAX_CAPACITY: usize = 1 << (usize::BITS - 2);

/// Round a requested capacity up to a power of two, at least [`MIN_CAPACITY`].
pub fn round_capacity(requested: usize) -> Result<usize, Error> {
    if requested > MAX_CAPACITY {
        return Err(Error::CapacityOverflow(requested));
    }
    Ok(requested.max(MIN_CAPACITY).next_power_of_two())
}

/// Capacity after one growth step.
pub fn next_capacity(current: usize) -> Result<usize, Error> {
    debug_assert!(current.is_power_of_two());
    match current.checked_mul(2) {
        Some(next) if next <= MAX_CAPACITY => Ok(next),
        _ => Err(Error::CapacityOverflow(current)),
    }
}

/// Number of assigned slots a table of `capacity` may hold before it grows.
#[inline]
pub fn expansion_threshold(capacity: usize, load_factor: f32) -> usize {
    (capacity as f64 * f64::from(load_factor)) as usize
}

/// Smallest valid capacity that holds `entries` without growing.
pub fn capacity_for(entries: usize, load_factor: f32) -> Result<usize, Error> {
    validate_load_factor(load_factor)?;
    let mut capacity = round_capacity(entries)?;
    while expansion_threshold(capacity, load_factor) < entries {
        capacity = next_capacity(capacity)?;
    }
    Ok(capacity)
}

/// Reject capacities that are not a power of two.
pub(crate) fn validate_capacity(capacity: usize) -> Result<(), Error> {
    if capacity.is_power_of_two() && capacity <= MAX_CAPACITY {
        Ok(())
    } else {
        Err(Error::InvalidCapacity(capacity))
    }
}

/// Reject load factors outside the open interval (0, 1), including NaN.
pub(crate) fn validate_load_factor(load_factor: f32) -> Result<(), Error> {
    if load_factor > 0.0 && load_factor < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidLoadFactor(load_factor))
    }
}
