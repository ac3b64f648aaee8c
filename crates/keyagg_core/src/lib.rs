//! Exact per-key aggregation over partitioned input using two-phase combiners.
//!
//! Records are folded into per-key states within each partition, states are
//! merged across partitions by key, and each key's merged state is finalized
//! into a statistic. The reference pipeline computes the median of each key's
//! values using [`MultisetAccumulator`](accumulator::multiset::MultisetAccumulator)
//! and [`Median`](finalize::Median).

pub mod accumulator;
pub mod config;
pub mod driver;
pub mod finalize;
pub mod merge;
pub mod numeric;
pub mod observe;
pub mod partition;
pub mod runtime;
pub mod scalar;
pub mod source;
