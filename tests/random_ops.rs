//! Randomised workloads exercising both layouts against
//! `std::collections::BTreeMap` as the model, plus property tests over
//! arbitrary key sets.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

use redblack::{CompactTree, RbTree};

const KEYS: usize = 1000;

/// Insert a shuffled key sequence, remove a random 75% subset, and check the
/// tree against the model after every phase.
macro_rules! shuffled_ops {
    ($tree:expr) => {{
        let mut rng = rand::thread_rng();
        let mut keys: Vec<u32> = (0..KEYS as u32).collect();
        keys.shuffle(&mut rng);

        let mut tree = $tree;
        let mut model = BTreeMap::new();
        for &key in &keys {
            assert!(tree.insert(key, key.wrapping_mul(31)).is_ok());
            model.insert(key, key.wrapping_mul(31));
        }
        tree.black_height();
        assert_eq!(tree.len(), model.len());
        assert!(tree.iter().eq(model.iter()));

        keys.shuffle(&mut rng);
        for &key in &keys {
            if rng.gen_bool(0.75) {
                assert_eq!(tree.remove(&key), model.remove(&key).map(|v| (key, v)));
            }
        }
        tree.black_height();
        assert_eq!(tree.len(), model.len());
        assert!(tree.iter().eq(model.iter()));

        // Whatever survived still answers lookups.
        for key in 0..KEYS as u32 {
            assert_eq!(tree.get(&key), model.get(&key));
        }
    }};
}

#[test]
fn shuffled_ops_map() {
    shuffled_ops!(RbTree::default());
}

#[test]
fn shuffled_ops_compact() {
    shuffled_ops!(CompactTree::default());
}

#[test]
fn interleaved_ops() {
    let mut rng = rand::thread_rng();
    let mut tree = RbTree::default();
    let mut compact = CompactTree::default();
    let mut model = BTreeMap::new();

    for step in 0..10_000u32 {
        let key = rng.gen_range(0..256u32);
        if rng.gen_bool(0.6) {
            let a = tree.insert(key, step);
            let b = compact.insert(key, step);
            let m = model.insert(key, step);
            assert_eq!(a.is_err(), m.is_some());
            assert_eq!(b.is_err(), m.is_some());
            if let Some(old) = m {
                // Both layouts keep the first entry on a collision.
                model.insert(key, old);
            }
        } else {
            let m = model.remove(&key).map(|v| (key, v));
            assert_eq!(tree.remove(&key), m);
            assert_eq!(compact.remove(&key), m);
        }
        if step % 512 == 0 {
            tree.black_height();
            compact.black_height();
        }
    }

    assert!(tree.iter().eq(model.iter()));
    assert!(compact.iter().eq(model.iter()));
}

proptest! {
    #[test]
    fn map_matches_model(entries in proptest::collection::hash_map(any::<i32>(), any::<i8>(), 0..64)) {
        let tree: RbTree<i32, i8> = entries.iter().map(|(&k, &v)| (k, v)).collect();
        let model: BTreeMap<i32, i8> = entries.into_iter().collect();

        tree.black_height();
        prop_assert_eq!(tree.len(), model.len());
        prop_assert!(tree.iter().eq(model.iter()));
        prop_assert!(tree.iter().rev().eq(model.iter().rev()));
    }

    #[test]
    fn compact_matches_model(entries in proptest::collection::hash_map(any::<i32>(), any::<i8>(), 0..64)) {
        let tree: CompactTree<i32, i8> = entries.iter().map(|(&k, &v)| (k, v)).collect();
        let model: BTreeMap<i32, i8> = entries.into_iter().collect();

        tree.black_height();
        prop_assert_eq!(tree.len(), model.len());
        prop_assert!(tree.iter().eq(model.iter()));

        // Walking backwards from the end visits the same entries reversed.
        let mut cursor = tree.cursor_last();
        let mut backward = Vec::new();
        while let Some((&k, &v)) = cursor.entry() {
            backward.push((k, v));
            cursor.move_prev();
        }
        backward.reverse();
        prop_assert!(backward.iter().map(|(k, v)| (k, v)).eq(model.iter()));
    }

    #[test]
    fn removal_keeps_invariants(
        keys in proptest::collection::hash_set(any::<u16>(), 1..64),
        victims in proptest::collection::vec(any::<u16>(), 0..64),
    ) {
        let mut tree: RbTree<u16, ()> = keys.iter().map(|&k| (k, ())).collect();
        let mut compact: CompactTree<u16, ()> = keys.iter().map(|&k| (k, ())).collect();
        let mut model: BTreeMap<u16, ()> = keys.into_iter().map(|k| (k, ())).collect();

        for key in victims {
            let m = model.remove(&key).map(|v| (key, v));
            prop_assert_eq!(tree.remove(&key), m);
            prop_assert_eq!(compact.remove(&key), m);
            tree.black_height();
            compact.black_height();
        }
        prop_assert!(tree.iter().eq(model.iter()));
        prop_assert!(compact.iter().eq(model.iter()));
    }
}
