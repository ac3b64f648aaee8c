//! Cross-partition merging of partial states.

pub mod shuffle;
pub mod tree;

use std::fmt::Debug;
use std::hash::Hash;

use keyagg_error::{AggError, ErrorKind, Result};
use shuffle::{KeyRouter, ShuffleBucket};
use tracing::{debug, trace};

use crate::accumulator::Accumulator;
use crate::config::AggregateConfig;
use crate::partition::PartialResults;
use crate::runtime::{ExecutionContext, TaskStage};

/// The fully combined state for a single key.
#[derive(Debug, Clone)]
pub struct FinalState<K, S> {
    pub key: K,
    pub state: S,
}

/// Groups partial states by key and reduces them to one state per key.
#[derive(Debug, Clone)]
pub struct MergeCoordinator {
    fan_in: usize,
    router: KeyRouter,
}

impl MergeCoordinator {
    pub fn new(fan_in: usize, merge_partitions: usize) -> Self {
        MergeCoordinator {
            fan_in,
            router: KeyRouter::new(merge_partitions),
        }
    }

    pub fn from_config(config: &AggregateConfig) -> Self {
        Self::new(config.merge_fan_in, config.merge_partitions)
    }

    /// Shuffle and reduce partial results from all partitions.
    ///
    /// Buckets are reduced in parallel, one retryable task per bucket.
    pub fn merge<A, K>(
        &self,
        ctx: &ExecutionContext,
        accumulator: &A,
        partials: Vec<PartialResults<K, A::State>>,
        expected_partitions: usize,
    ) -> Result<Vec<FinalState<K, A::State>>>
    where
        A: Accumulator,
        K: Hash + Eq + Clone + Debug + Send + Sync,
    {
        let buckets = self.shuffle(partials, expected_partitions)?;

        let reduced = ctx.run_tasks(TaskStage::Merge, &buckets, |_, bucket| {
            self.reduce_bucket(accumulator, bucket)
        })?;

        Ok(reduced.into_iter().flatten().collect())
    }

    /// Route partial results to buckets by key.
    ///
    /// Errors unless there's exactly one output for each partition in
    /// `0..expected_partitions`. Merging with an output missing would finalize
    /// keys over an incomplete sample.
    pub fn shuffle<K, S>(
        &self,
        partials: Vec<PartialResults<K, S>>,
        expected_partitions: usize,
    ) -> Result<Vec<ShuffleBucket<K, S>>>
    where
        K: Hash + Eq,
    {
        let mut reported = vec![false; expected_partitions];
        for partial in &partials {
            match reported.get_mut(partial.partition_idx) {
                Some(seen) if !*seen => *seen = true,
                Some(_) => {
                    return Err(AggError::new("Duplicate partial results for partition")
                        .with_kind(ErrorKind::InvariantViolation)
                        .with_field("partition", partial.partition_idx));
                }
                None => {
                    return Err(AggError::new("Partial results for unknown partition")
                        .with_kind(ErrorKind::InvariantViolation)
                        .with_field("partition", partial.partition_idx)
                        .with_field("expected_partitions", expected_partitions));
                }
            }
        }

        if let Some(missing) = reported.iter().position(|seen| !seen) {
            return Err(
                AggError::new("Attempted to merge, but some partial results missing")
                    .with_kind(ErrorKind::InvariantViolation)
                    .with_field("partition", missing),
            );
        }

        let buckets = shuffle::shuffle(partials, &self.router);
        debug!(
            num_buckets = buckets.len(),
            num_keys = buckets.iter().map(|b| b.num_keys()).sum::<usize>(),
            "shuffled partial results"
        );

        Ok(buckets)
    }

    /// Reduce every key in a bucket to its final state.
    ///
    /// The bucket is only read from. Leaf states are cloned into the merge
    /// tree so the same bucket can be reduced again if this attempt fails.
    pub fn reduce_bucket<A, K>(
        &self,
        accumulator: &A,
        bucket: &ShuffleBucket<K, A::State>,
    ) -> Result<Vec<FinalState<K, A::State>>>
    where
        A: Accumulator,
        K: Hash + Eq + Clone + Debug,
    {
        let mut finals = Vec::with_capacity(bucket.num_keys());

        for (key, states) in &bucket.groups {
            let rounds = tree::num_rounds(states.len(), self.fan_in);
            let state =
                tree::tree_reduce(accumulator, states.clone(), self.fan_in).ok_or_else(|| {
                    AggError::new("Key reached merge without partial states")
                        .with_kind(ErrorKind::InvariantViolation)
                        .with_field("key", format!("{key:?}"))
                })?;

            trace!(?key, num_partials = states.len(), rounds, "merged key");

            finals.push(FinalState {
                key: key.clone(),
                state,
            });
        }

        Ok(finals)
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashMap;

    use super::*;
    use crate::accumulator::multiset::{Multiset, MultisetAccumulator};
    use crate::runtime::CancelToken;

    fn partial(
        idx: usize,
        entries: &[(&'static str, &[i64])],
    ) -> PartialResults<&'static str, Multiset<i64>> {
        PartialResults {
            partition_idx: idx,
            states: entries
                .iter()
                .map(|(key, values)| (*key, values.iter().copied().collect()))
                .collect(),
        }
    }

    fn by_key(
        finals: Vec<FinalState<&'static str, Multiset<i64>>>,
    ) -> HashMap<&'static str, Vec<i64>> {
        finals
            .into_iter()
            .map(|f| {
                let mut values = f.state.into_values();
                values.sort_unstable();
                (f.key, values)
            })
            .collect()
    }

    fn context() -> ExecutionContext {
        let mut conf = AggregateConfig::new();
        conf.parallelism = 2;
        ExecutionContext::acquire(&conf, CancelToken::new()).unwrap()
    }

    #[test]
    fn merge_across_partitions() {
        let acc = MultisetAccumulator::<i64>::new();
        let partials = vec![
            partial(0, &[("k1", &[1, 2]), ("k2", &[6])]),
            partial(1, &[("k1", &[5])]),
            partial(2, &[]),
            partial(3, &[("k2", &[1, 8]), ("k3", &[30])]),
        ];

        let finals = MergeCoordinator::new(2, 3)
            .merge(&context(), &acc, partials, 4)
            .unwrap();

        let out = by_key(finals);
        assert_eq!(3, out.len());
        assert_eq!(vec![1, 2, 5], out["k1"]);
        assert_eq!(vec![1, 6, 8], out["k2"]);
        assert_eq!(vec![30], out["k3"]);
    }

    #[test]
    fn zero_state_key_emitted() {
        let acc = MultisetAccumulator::<i64>::new();
        // Key present in a partition even though its state equals zero.
        let partials = vec![partial(0, &[("empty", &[])]), partial(1, &[])];

        let finals = MergeCoordinator::new(2, 1)
            .merge(&context(), &acc, partials, 2)
            .unwrap();

        let out = by_key(finals);
        assert_eq!(1, out.len());
        assert!(out["empty"].is_empty());
    }

    #[test]
    fn missing_partition_rejected() {
        let coordinator = MergeCoordinator::new(2, 2);
        let partials = vec![partial(0, &[("k1", &[1])]), partial(2, &[])];

        let err = coordinator.shuffle(partials, 3).unwrap_err();
        assert_eq!(ErrorKind::InvariantViolation, err.kind());
        assert_eq!(Some("1"), err.get_field("partition"));
    }

    #[test]
    fn duplicate_partition_rejected() {
        let coordinator = MergeCoordinator::new(2, 2);
        let partials = vec![partial(0, &[("k1", &[1])]), partial(0, &[("k1", &[1])])];

        let err = coordinator.shuffle(partials, 2).unwrap_err();
        assert_eq!(ErrorKind::InvariantViolation, err.kind());
    }

    #[test]
    fn unknown_partition_rejected() {
        let coordinator = MergeCoordinator::new(2, 2);
        let partials = vec![partial(5, &[])];

        let err = coordinator.shuffle(partials, 1).unwrap_err();
        assert_eq!(ErrorKind::InvariantViolation, err.kind());
    }

    /// Panics on every combine.
    #[derive(Debug)]
    struct CrashingCombine;

    impl Accumulator for CrashingCombine {
        type Value = i64;
        type State = Multiset<i64>;

        fn zero(&self) -> Self::State {
            Multiset::new()
        }

        fn merge_in(&self, mut state: Self::State, value: i64) -> Self::State {
            state.push(value);
            state
        }

        fn combine(&self, _left: Self::State, _right: Self::State) -> Self::State {
            panic!("combine crashed")
        }
    }

    #[test]
    fn merge_failure_names_bucket() {
        let mut conf = AggregateConfig::new();
        conf.parallelism = 2;
        conf.max_task_retries = 1;
        let ctx = ExecutionContext::acquire(&conf, CancelToken::new()).unwrap();

        let partials = vec![partial(0, &[("k1", &[1])]), partial(1, &[("k1", &[2])])];
        let err = MergeCoordinator::new(2, 1)
            .merge(&ctx, &CrashingCombine, partials, 2)
            .unwrap_err();

        assert_eq!(ErrorKind::WorkerFailure, err.kind());
        assert_eq!(Some("merge"), err.get_field("stage"));
        assert_eq!(Some("0"), err.get_field("bucket"));
        assert_eq!(None, err.get_field("partition"));
        assert_eq!(Some("2"), err.get_field("attempts"));
    }

    #[test]
    fn bucket_count_does_not_change_result() {
        let acc = MultisetAccumulator::<i64>::new();
        let make = || {
            vec![
                partial(0, &[("a", &[1, 9]), ("b", &[2])]),
                partial(1, &[("a", &[3]), ("c", &[4, 4])]),
                partial(2, &[("b", &[7]), ("c", &[0])]),
            ]
        };

        let expected = by_key(
            MergeCoordinator::new(2, 1)
                .merge(&context(), &acc, make(), 3)
                .unwrap(),
        );

        for (fan_in, buckets) in [(2, 7), (3, 2), (16, 64)] {
            let out = by_key(
                MergeCoordinator::new(fan_in, buckets)
                    .merge(&context(), &acc, make(), 3)
                    .unwrap(),
            );
            assert_eq!(expected, out);
        }
    }
}
