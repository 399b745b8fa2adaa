//! Fuzzer for the hash slot array.
//!
//! Runs arbitrary operation sequences against an 8-byte-key array and a
//! 16-byte-key array side by side with a `HashMap` model, under a tight
//! memory budget so that growth failures are exercised too. After every
//! operation the structural invariants are checked.

#![no_main]
use arbitrary::Arbitrary;
use hashslot::{BoundedAllocator, Error, HashSlotArray, HashSlotConfig, SlotKey};
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    Ensure(u8, u8, u64),
    Remove(u8, u8),
    Get(u8, u8),
    Clear,
    Iterate,
}

#[derive(Clone, Debug, Arbitrary)]
struct Input {
    capacity_bits: u8,
    load_factor: u8,
    budget_kib: u8,
    ops: Vec<Op>,
}

struct Sim<'a, K: SlotKey + std::hash::Hash> {
    array: HashSlotArray<K, &'a BoundedAllocator>,
    model: HashMap<K, u64>,
}

impl<'a, K: SlotKey + std::hash::Hash> Sim<'a, K> {
    fn apply(&mut self, key: K, op: &Op) {
        match *op {
            Op::Ensure(_, _, value) => {
                // Zero is the null sentinel.
                let value = value | 1;
                let capacity = self.array.capacity();
                match self.array.ensure(key) {
                    Ok(result) => {
                        assert_eq!(result.is_created(), !self.model.contains_key(&key));
                        if result.is_created() {
                            self.array.value_words_mut(result.addr())[0] = value;
                            self.model.insert(key, value);
                        }
                    }
                    Err(Error::OutOfMemory { .. }) => {
                        assert!(!self.model.contains_key(&key));
                        assert_eq!(self.array.capacity(), capacity);
                    }
                    Err(e) => panic!("unexpected error {:?}", e),
                }
            }
            Op::Remove(..) => {
                assert_eq!(self.array.remove(key), self.model.remove(&key).is_some());
            }
            Op::Get(..) => {
                let found = self.array.get(key).map(|a| self.array.value_words(a)[0]);
                assert_eq!(found, self.model.get(&key).copied());
            }
            Op::Clear => {
                self.array.clear();
                self.model.clear();
            }
            Op::Iterate => {
                let mut count = 0;
                for slot in self.array.cursor() {
                    assert_eq!(
                        self.model.get(&slot.key).copied(),
                        Some(u64::from_ne_bytes(slot.value.try_into().unwrap()))
                    );
                    count += 1;
                }
                assert_eq!(count, self.model.len());
            }
        }
        assert_eq!(self.array.size(), self.model.len());
        self.array.check_invariants();
    }
}

fn key_bytes(op: &Op) -> (u8, u8) {
    match *op {
        Op::Ensure(a, b, _) | Op::Remove(a, b) | Op::Get(a, b) => (a, b),
        Op::Clear | Op::Iterate => (0, 0),
    }
}

fuzz_target!(|input: Input| {
    let config = HashSlotConfig {
        null_sentinel: 0,
        value_length: 8,
        initial_capacity: 1 << (input.capacity_bits % 6),
        load_factor: (f32::from(input.load_factor % 99) + 1.0) / 100.0,
    };
    let budget = BoundedAllocator::new((usize::from(input.budget_kib) + 1) * 1024);

    let (Ok(array8), Ok(array16)) = (
        HashSlotArray::<u64, _>::with_config(config, &budget),
        HashSlotArray::<(u64, u64), _>::with_config(config, &budget),
    ) else {
        return;
    };
    let mut sim8 = Sim {
        array: array8,
        model: HashMap::new(),
    };
    let mut sim16 = Sim {
        array: array16,
        model: HashMap::new(),
    };

    for op in &input.ops {
        let (a, b) = key_bytes(op);
        sim8.apply(u64::from(a), op);
        sim16.apply((u64::from(a), u64::from(b)), op);
    }

    drop(sim8);
    drop(sim16);
    assert_eq!(budget.used(), 0);
});
