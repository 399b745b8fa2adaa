#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![doc = include_str!("../README.md")]
// @@ begin lint list @@
#![allow(renamed_and_removed_lints)]
#![allow(unknown_lints)]
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![warn(clippy::cognitive_complexity)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![warn(clippy::manual_ok_or)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::ref_option_ref)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::trait_duplication_in_bounds)]
#![deny(clippy::unnecessary_wraps)]
#![warn(clippy::unseparated_literal_suffix)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::mod_module_files)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::needless_lifetimes)]
//! <!-- @@ end lint list @@ -->

mod array;
mod capacity;
mod config;
mod cursor;
mod err;
mod hash;
mod layout;
mod mem;

pub use array::{
    HashSlotArray, HashSlotArray16ByteKey, HashSlotArray8ByteKey, SlotResult, ValueAddr,
};
pub use capacity::{
    capacity_for, expansion_threshold, next_capacity, round_capacity, DEFAULT_CAPACITY,
    DEFAULT_LOAD_FACTOR, MAX_CAPACITY, MIN_CAPACITY,
};
pub use config::{HashSlotArrayBuilder, HashSlotConfig};
pub use cursor::{Cursor, Slot};
pub use err::Error;
pub use hash::{fast_long_mix, hash_key_pair};
pub use layout::{SentinelPlacement, SlotKey, SlotLayout, VALUE_LENGTH_GRANULARITY};
pub use mem::{
    BoundedAllocator, HeapAllocator, MemoryAllocator, SharedAllocator, WORD_ALIGN, WORD_SIZE,
};
