use std::hash::{BuildHasher, Hash};

use ahash::RandomState;
use hashbrown::HashMap;

use crate::partition::PartialResults;

/// Compute the bucket to use for a given hash value.
pub const fn partition(hash: u64, partitions: usize) -> usize {
    ((hash as u128 * partitions as u128) >> 64) as usize
}

// Fixed seeds so bucket assignment is the same across runs and processes.
const ROUTER_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Routes keys to shuffle buckets.
#[derive(Debug, Clone)]
pub struct KeyRouter {
    state: RandomState,
    buckets: usize,
}

impl KeyRouter {
    pub fn new(buckets: usize) -> Self {
        let [k0, k1, k2, k3] = ROUTER_SEEDS;
        KeyRouter {
            state: RandomState::with_seeds(k0, k1, k2, k3),
            buckets: buckets.max(1),
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets
    }

    pub fn bucket_for<K: Hash>(&self, key: &K) -> usize {
        partition(BuildHasher::hash_one(&self.state, key), self.buckets)
    }
}

/// Partial states for a disjoint subset of keys, grouped by key.
#[derive(Debug, Clone)]
pub struct ShuffleBucket<K, S> {
    pub bucket_idx: usize,
    pub groups: HashMap<K, Vec<S>>,
}

impl<K, S> ShuffleBucket<K, S> {
    pub fn num_keys(&self) -> usize {
        self.groups.len()
    }

    pub fn num_states(&self) -> usize {
        self.groups.values().map(|states| states.len()).sum()
    }
}

/// Route every partial state to the bucket owning its key.
///
/// All partial states for a key end up in the same bucket, in the same group.
pub fn shuffle<K, S>(
    partials: Vec<PartialResults<K, S>>,
    router: &KeyRouter,
) -> Vec<ShuffleBucket<K, S>>
where
    K: Hash + Eq,
{
    let mut buckets: Vec<_> = (0..router.num_buckets())
        .map(|bucket_idx| ShuffleBucket {
            bucket_idx,
            groups: HashMap::new(),
        })
        .collect();

    for partial in partials {
        for (key, state) in partial.states {
            let idx = router.bucket_for(&key);
            buckets[idx].groups.entry(key).or_default().push(state);
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(idx: usize, entries: &[(&'static str, i64)]) -> PartialResults<&'static str, i64> {
        PartialResults {
            partition_idx: idx,
            states: entries.iter().copied().collect(),
        }
    }

    #[test]
    fn partition_in_range() {
        for hash in [0, 1, u64::MAX / 3, u64::MAX / 2, u64::MAX] {
            assert!(partition(hash, 7) < 7);
        }
        assert_eq!(0, partition(u64::MAX, 1));
    }

    #[test]
    fn router_is_deterministic() {
        let a = KeyRouter::new(16);
        let b = KeyRouter::new(16);
        for key in ["k1", "k2", "k3", "another"] {
            assert_eq!(a.bucket_for(&key), b.bucket_for(&key));
        }
    }

    #[test]
    fn same_key_same_group() {
        let router = KeyRouter::new(4);
        let partials = vec![
            partial(0, &[("k1", 1), ("k2", 2)]),
            partial(1, &[("k1", 3)]),
            partial(2, &[("k3", 4), ("k1", 5)]),
        ];

        let buckets = shuffle(partials, &router);
        assert_eq!(4, buckets.len());

        let k1_bucket = &buckets[router.bucket_for(&"k1")];
        let mut k1_states = k1_bucket.groups["k1"].clone();
        k1_states.sort_unstable();
        assert_eq!(vec![1, 3, 5], k1_states);

        let total_states: usize = buckets.iter().map(|b| b.num_states()).sum();
        assert_eq!(5, total_states);
        let total_keys: usize = buckets.iter().map(|b| b.num_keys()).sum();
        assert_eq!(3, total_keys);
    }
}
