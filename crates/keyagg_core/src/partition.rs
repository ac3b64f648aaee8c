//! Partition-local accumulation.

use std::fmt::Debug;
use std::hash::Hash;

use hashbrown::HashMap;
use keyagg_error::{ErrorKind, Result};
use tracing::trace;

use crate::accumulator::{Accumulator, FromRecordValue};
use crate::runtime::CancelToken;
use crate::source::Partition;

/// How many records are processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Partial states for every key observed in a single partition.
#[derive(Debug, Clone)]
pub struct PartialResults<K, S> {
    pub partition_idx: usize,
    pub states: HashMap<K, S>,
}

impl<K, S> PartialResults<K, S> {
    pub fn num_keys(&self) -> usize {
        self.states.len()
    }
}

/// Folds a partition's records into per-key accumulator states.
#[derive(Debug)]
pub struct PartitionProcessor<'a, A> {
    accumulator: &'a A,
}

impl<'a, A> PartitionProcessor<'a, A>
where
    A: Accumulator,
{
    pub fn new(accumulator: &'a A) -> Self {
        PartitionProcessor { accumulator }
    }

    /// Process all records in the partition in arrival order.
    ///
    /// States are created lazily the first time a key is seen. If any
    /// record's value can't be converted to the accumulator's value type,
    /// nothing is returned for the partition.
    pub fn process<K, V>(
        &self,
        partition_idx: usize,
        partition: &Partition<K, V>,
        cancel: &CancelToken,
    ) -> Result<PartialResults<K, A::State>>
    where
        K: Hash + Eq + Clone + Debug,
        A::Value: FromRecordValue<V>,
    {
        let mut states: HashMap<K, A::State> = HashMap::new();

        for (record_idx, record) in partition.records.iter().enumerate() {
            if record_idx % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }

            let value = <A::Value as FromRecordValue<V>>::from_record_value(&record.value)
                .map_err(|e| {
                    e.with_kind(ErrorKind::ValueType)
                        .with_field("partition", partition_idx)
                        .with_field("record", record_idx)
                        .with_field("key", format!("{:?}", record.key))
                })?;

            match states.get_mut(&record.key) {
                Some(state) => {
                    let prev = std::mem::replace(state, self.accumulator.zero());
                    *state = self.accumulator.merge_in(prev, value);
                }
                None => {
                    let state = self.accumulator.merge_in(self.accumulator.zero(), value);
                    states.insert(record.key.clone(), state);
                }
            }
        }

        trace!(
            partition_idx,
            num_records = partition.len(),
            num_keys = states.len(),
            "accumulated partition"
        );

        Ok(PartialResults {
            partition_idx,
            states,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::multiset::MultisetAccumulator;
    use crate::numeric::NumericValue;
    use crate::scalar::ScalarValue;

    fn sorted(values: Vec<i64>) -> Vec<i64> {
        let mut values = values;
        values.sort_unstable();
        values
    }

    #[test]
    fn accumulate_by_key() {
        let acc = MultisetAccumulator::<i64>::new();
        let partition: Partition<&str, i64> =
            [("k1", 1), ("k2", 6), ("k1", 3), ("k1", 2)].into_iter().collect();

        let out = PartitionProcessor::new(&acc)
            .process(0, &partition, &CancelToken::new())
            .unwrap();

        assert_eq!(2, out.num_keys());
        assert_eq!(vec![1, 2, 3], sorted(out.states["k1"].clone().into_values()));
        assert_eq!(vec![6], out.states["k2"].clone().into_values());
    }

    #[test]
    fn empty_partition() {
        let acc = MultisetAccumulator::<i64>::new();
        let partition = Partition::<&str, i64>::new(Vec::new());

        let out = PartitionProcessor::new(&acc)
            .process(3, &partition, &CancelToken::new())
            .unwrap();

        assert_eq!(3, out.partition_idx);
        assert_eq!(0, out.num_keys());
    }

    #[test]
    fn non_numeric_value_fails_partition() {
        let acc = MultisetAccumulator::<NumericValue>::new();
        let partition: Partition<&str, ScalarValue> = [
            ("k1", ScalarValue::Int64(1)),
            ("k2", ScalarValue::Utf8("seven".to_string())),
            ("k1", ScalarValue::Float64(2.5)),
        ]
        .into_iter()
        .collect();

        let err = PartitionProcessor::new(&acc)
            .process(4, &partition, &CancelToken::new())
            .unwrap_err();

        assert_eq!(ErrorKind::ValueType, err.kind());
        assert_eq!(Some("4"), err.get_field("partition"));
        assert_eq!(Some("1"), err.get_field("record"));
        assert_eq!(Some("\"k2\""), err.get_field("key"));
    }

    #[test]
    fn canceled_partition() {
        let acc = MultisetAccumulator::<i64>::new();
        let partition: Partition<&str, i64> = [("k1", 1)].into_iter().collect();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = PartitionProcessor::new(&acc)
            .process(0, &partition, &cancel)
            .unwrap_err();
        assert_eq!(ErrorKind::Canceled, err.kind());
    }
}
