use std::fmt::Debug;

use tracing::debug;

use crate::source::Record;

/// Diagnostic hook invoked once per partition before it's processed.
///
/// Observers only get shared access to the records and can't influence the
/// computed results.
pub trait PartitionObserver<K, V>: Sync + Send {
    fn observe_partition(&self, partition_idx: usize, records: &[Record<K, V>]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<K, V> PartitionObserver<K, V> for NoopObserver {
    fn observe_partition(&self, _partition_idx: usize, _records: &[Record<K, V>]) {}
}

/// Emits a debug event containing every record of each partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl<K, V> PartitionObserver<K, V> for TracingObserver
where
    K: Debug,
    V: Debug,
{
    fn observe_partition(&self, partition_idx: usize, records: &[Record<K, V>]) {
        let records: Vec<_> = records.iter().map(|r| (&r.key, &r.value)).collect();
        debug!(partition_idx, num_records = records.len(), ?records, "partition");
    }
}
