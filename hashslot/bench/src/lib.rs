//! Benchmarks for the `hashslot` crate live under `benches/`.
