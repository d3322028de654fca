#![cfg(test)]

// Property tests for RawHashMap kept inside the crate so they do not
// require feature gates to access internal modules.
//
// Two tiers of properties:
// - Without deletions the table is a plain map, so full state-machine
//   equivalence against std::collections::HashMap is asserted,
//   including through growth and under worst-case collisions.
// - With deletions the probe index keeps tombstones and lookups stop at
//   them, so a key can be live in a row yet unreachable, and re-setting
//   it can append a duplicate row. The delete-aware property therefore
//   asserts the guarantees that do hold: lookups and removals never
//   fabricate values, counts track row arithmetic exactly, rows stay
//   dense, and the allocator balances at the end.

use crate::key_ops::KeyOps;
use crate::raw_hash_map::{RawHashMap, SetOutcome};
use crate::system_alloc::{AllocStats, SystemAllocator};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

type Key = [u8; 8];

// Pool-indexed operations to improve shrinking: indices shrink to
// earlier keys, pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Set(usize, u64),
    Get(usize),
    Del(usize),
    Iterate,
}

fn arb_scenario(with_deletes: bool) -> impl Strategy<Value = (Vec<Key>, Vec<OpI>)> {
    proptest::collection::vec(any::<Key>(), 1..=8).prop_flat_map(move |pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = if with_deletes {
            prop_oneof![
                (idx.clone(), any::<u64>()).prop_map(|(i, v)| OpI::Set(i, v)),
                idx.clone().prop_map(OpI::Get),
                idx.clone().prop_map(OpI::Del),
                Just(OpI::Iterate),
            ]
            .boxed()
        } else {
            prop_oneof![
                (idx.clone(), any::<u64>()).prop_map(|(i, v)| OpI::Set(i, v)),
                idx.clone().prop_map(OpI::Get),
                Just(OpI::Iterate),
            ]
            .boxed()
        };
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn run_without_deletes<O: KeyOps>(
    pool: Vec<Key>,
    ops: Vec<OpI>,
    key_ops: O,
) -> Result<(), TestCaseError> {
    let stats = Rc::new(AllocStats::new());
    {
        let sys = SystemAllocator::with_stats(stats.clone());
        // Tiny starting capacity with an early trigger so growth is
        // exercised constantly.
        let mut sut = RawHashMap::with_key_ops(sys, 2, 0.5, 8, 8, key_ops).unwrap();
        let mut model: HashMap<Key, u64> = HashMap::new();

        for op in ops {
            match op {
                OpI::Set(i, v) => {
                    let k = pool[i];
                    let already = model.contains_key(&k);
                    let outcome = sut.set(&k, &v.to_le_bytes()).unwrap();
                    prop_assert_eq!(outcome == SetOutcome::Updated, already);
                    model.insert(k, v);
                }
                OpI::Get(i) => {
                    let k = pool[i];
                    let got = sut.get(&k).map(|b| b.to_vec());
                    let want = model.get(&k).map(|v| v.to_le_bytes().to_vec());
                    prop_assert_eq!(got, want);
                }
                OpI::Del(_) => unreachable!("deletion-free scenario"),
                OpI::Iterate => {
                    let rows: HashMap<Key, u64> = sut
                        .iter()
                        .map(|(k, v)| {
                            let mut key = [0u8; 8];
                            key.copy_from_slice(k);
                            let mut val = [0u8; 8];
                            val.copy_from_slice(v);
                            (key, u64::from_le_bytes(val))
                        })
                        .collect();
                    prop_assert_eq!(&rows, &model);
                }
            }
            prop_assert_eq!(sut.count(), model.len());
            prop_assert!(sut.count() <= sut.capacity());
        }
    }
    stats.assert_balanced();
    Ok(())
}

// Property: without deletions the table is state-machine equivalent to
// std's HashMap across random operation sequences, growth included.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_set_get_parity((pool, ops) in arb_scenario(false)) {
        run_without_deletes(pool, ops, crate::key_ops::ByteKeys)?;
    }
}

// Collision variant: every key lands in the same bucket, stressing
// probe-sequence equality resolution.
#[derive(Clone, Copy, Debug, Default)]
struct ConstKeys;

impl KeyOps for ConstKeys {
    fn hash(&self, _key: &[u8]) -> u64 {
        0
    }
    fn eq(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_set_get_parity_with_collisions((pool, ops) in arb_scenario(false)) {
        run_without_deletes(pool, ops, ConstKeys)?;
    }
}

// Property: with deletions in play, the table never fabricates values,
// counts follow row arithmetic exactly, and rows stay dense. Reach-
// ability of keys whose probe paths crossed a tombstone is deliberately
// not asserted; see the module header.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_delete_aware_invariants((pool, ops) in arb_scenario(true)) {
        let stats = Rc::new(AllocStats::new());
        {
            let sys = SystemAllocator::with_stats(stats.clone());
            let mut sut = RawHashMap::new(sys, 4, 0.75, 8, 8).unwrap();
            // Every value ever stored under a key; lookups may lag
            // behind overwrites when duplicate rows exist, but they
            // must never invent bytes.
            let mut history: HashMap<Key, HashSet<u64>> = HashMap::new();

            for op in ops {
                let before = sut.count();
                match op {
                    OpI::Set(i, v) => {
                        let k = pool[i];
                        let cap_before = sut.capacity();
                        let outcome = sut.set(&k, &v.to_le_bytes()).unwrap();
                        history.entry(k).or_default().insert(v);
                        // Growth rebuilds the index and collapses any
                        // duplicate rows left by tombstone reclamation,
                        // so exact count arithmetic only holds when the
                        // capacity did not move.
                        let grew = sut.capacity() != cap_before;
                        match outcome {
                            SetOutcome::Inserted if !grew => {
                                prop_assert_eq!(sut.count(), before + 1)
                            }
                            SetOutcome::Updated if !grew => prop_assert_eq!(sut.count(), before),
                            _ => prop_assert!(sut.count() >= 1 && sut.count() <= before + 1),
                        }
                    }
                    OpI::Get(i) => {
                        let k = pool[i];
                        if let Some(bytes) = sut.get(&k) {
                            let mut val = [0u8; 8];
                            val.copy_from_slice(bytes);
                            let seen = history.get(&k);
                            prop_assert!(
                                seen.is_some_and(|s| s.contains(&u64::from_le_bytes(val))),
                                "lookup returned a value never stored for this key"
                            );
                        }
                        prop_assert_eq!(sut.count(), before);
                    }
                    OpI::Del(i) => {
                        let k = pool[i];
                        match sut.del(&k) {
                            Some(bytes) => {
                                let mut val = [0u8; 8];
                                val.copy_from_slice(&bytes);
                                let seen = history.get(&k);
                                prop_assert!(
                                    seen.is_some_and(|s| s.contains(&u64::from_le_bytes(val))),
                                    "removal returned a value never stored for this key"
                                );
                                prop_assert_eq!(sut.count(), before - 1);
                            }
                            None => prop_assert_eq!(sut.count(), before),
                        }
                    }
                    OpI::Iterate => {
                        let rows: Vec<Key> = sut
                            .keys()
                            .map(|k| {
                                let mut key = [0u8; 8];
                                key.copy_from_slice(k);
                                key
                            })
                            .collect();
                        prop_assert_eq!(rows.len(), sut.count());
                        for k in rows {
                            prop_assert!(
                                history.contains_key(&k),
                                "row holds a key that was never stored"
                            );
                        }
                    }
                }
                prop_assert!(sut.count() <= sut.capacity());
            }
        }
        stats.assert_balanced();
    }
}
