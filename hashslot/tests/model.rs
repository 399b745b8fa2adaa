//! Model-based property tests against `std::collections::HashMap`

use hashslot::{HashSlotArray, HashSlotConfig, HeapAllocator, SlotKey};
use proptest::prelude::*;
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum Op<K> {
    Ensure(K, u64),
    Remove(K),
    Get(K),
    Clear,
}

fn small_key() -> impl Strategy<Value = u64> + Clone {
    // A narrow key space so that removes and re-ensures hit existing keys.
    0u64..64
}

fn ops<K: Clone + std::fmt::Debug>(
    key: impl Strategy<Value = K> + Clone,
) -> impl Strategy<Value = Vec<Op<K>>> {
    let op = prop_oneof![
        6 => (key.clone(), 1u64..u64::MAX).prop_map(|(k, v)| Op::Ensure(k, v)),
        3 => key.clone().prop_map(Op::Remove),
        2 => key.prop_map(Op::Get),
        1 => Just(Op::Clear),
    ];
    prop::collection::vec(op, 0..400)
}

fn new_array<K: SlotKey>(initial_capacity: usize, load_factor: f32) -> HashSlotArray<K> {
    HashSlotArray::with_config(
        HashSlotConfig {
            null_sentinel: 0,
            value_length: 8,
            initial_capacity,
            load_factor,
        },
        HeapAllocator,
    )
    .unwrap()
}

fn run<K: SlotKey + std::hash::Hash>(mut array: HashSlotArray<K>, ops: &[Op<K>]) {
    let mut model: HashMap<K, u64> = HashMap::new();
    for op in ops {
        match *op {
            Op::Ensure(k, v) => {
                let capacity = array.capacity();
                let result = array.ensure(k).unwrap();
                assert_eq!(result.is_created(), !model.contains_key(&k));
                if result.is_created() {
                    array.value_words_mut(result.addr())[0] = v;
                    model.insert(k, v);
                    assert!(array.capacity() == capacity || array.capacity() == capacity * 2);
                } else {
                    assert_eq!(array.capacity(), capacity);
                    assert_eq!(array.value_words(result.addr())[0], model[&k]);
                }
            }
            Op::Remove(k) => {
                assert_eq!(array.remove(k), model.remove(&k).is_some());
                assert!(array.get(k).is_none());
            }
            Op::Get(k) => {
                let found = array.get(k).map(|addr| array.value_words(addr)[0]);
                assert_eq!(found, model.get(&k).copied());
            }
            Op::Clear => {
                array.clear();
                model.clear();
            }
        }
        assert_eq!(array.size(), model.len());
        assert!(array.size() <= array.expansion_threshold());
    }

    let mut seen: HashMap<K, u64> = HashMap::new();
    for slot in array.cursor() {
        let value = u64::from_ne_bytes(slot.value.try_into().unwrap());
        assert!(seen.insert(slot.key, value).is_none());
    }
    assert_eq!(seen, model);
}

proptest! {
    #[test]
    fn eight_byte_keys_match_model(ops in ops(small_key())) {
        run(new_array::<u64>(4, 0.5), &ops);
    }

    #[test]
    fn eight_byte_keys_high_load(ops in ops(any::<u64>())) {
        run(new_array::<u64>(2, 0.9), &ops);
    }

    #[test]
    fn sixteen_byte_keys_match_model(ops in ops((0u64..8, 0u64..8))) {
        run(new_array::<(u64, u64)>(8, 0.75), &ops);
    }
}
