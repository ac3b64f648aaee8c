//! Partitioned input.

use keyagg_error::{AggError, ErrorKind, Result};

/// A single keyed input value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Record<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Record { key, value }
    }
}

impl<K, V> From<(K, V)> for Record<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Record { key, value }
    }
}

/// An ordered sequence of records processed by a single worker.
///
/// Partitions may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<K, V> {
    pub records: Vec<Record<K, V>>,
}

impl<K, V> Partition<K, V> {
    pub fn new(records: Vec<Record<K, V>>) -> Self {
        Partition { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Partition<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Partition {
            records: iter.into_iter().map(Record::from).collect(),
        }
    }
}

/// Provides input already split into partitions.
///
/// Partition count and record assignment are owned entirely by the source.
pub trait InputSource<K, V> {
    fn partitions(&self) -> Result<Vec<Partition<K, V>>>;
}

/// In-memory input source.
#[derive(Debug, Clone)]
pub struct MemorySource<K, V> {
    partitions: Vec<Partition<K, V>>,
}

impl<K, V> MemorySource<K, V> {
    /// Create a source using an explicit split.
    pub fn from_partitions(partitions: Vec<Partition<K, V>>) -> Self {
        MemorySource { partitions }
    }

    /// Split records into `num_partitions` contiguous slices.
    ///
    /// Partition `i` holds records `[i*len/n, (i+1)*len/n)`, so asking for more
    /// partitions than records yields some empty partitions.
    pub fn parallelize(records: Vec<Record<K, V>>, num_partitions: usize) -> Result<Self> {
        if num_partitions == 0 {
            return Err(AggError::new("Number of partitions must be greater than zero")
                .with_kind(ErrorKind::InvalidArgument));
        }

        let len = records.len();
        let mut partitions = Vec::with_capacity(num_partitions);
        let mut records = records.into_iter();

        for idx in 0..num_partitions {
            let start = idx * len / num_partitions;
            let end = (idx + 1) * len / num_partitions;
            partitions.push(Partition::new(records.by_ref().take(end - start).collect()));
        }

        Ok(MemorySource { partitions })
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn num_records(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }
}

impl<K, V> InputSource<K, V> for MemorySource<K, V>
where
    K: Clone,
    V: Clone,
{
    fn partitions(&self) -> Result<Vec<Partition<K, V>>> {
        Ok(self.partitions.clone())
    }
}
