//! Orchestration of a complete aggregation run.

use std::fmt::{self, Debug};
use std::hash::Hash;
use std::time::Instant;

use keyagg_error::{AggError, ErrorKind, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::accumulator::{Accumulator, FromRecordValue};
use crate::config::AggregateConfig;
use crate::finalize::{Finalizer, OutputPair};
use crate::merge::{FinalState, MergeCoordinator};
use crate::observe::{NoopObserver, PartitionObserver};
use crate::partition::PartitionProcessor;
use crate::runtime::{CancelToken, ExecutionContext, TaskStage};
use crate::source::InputSource;

/// Stage a run is in.
///
/// A run only moves forward, one stage at a time. Every key in the run is in
/// the state matching the run's stage: accumulating into partial states,
/// being merged, or being finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Accumulating,
    Merging,
    Finalizing,
    Finalized,
}

impl RunPhase {
    fn successor(self) -> Option<RunPhase> {
        match self {
            Self::Accumulating => Some(Self::Merging),
            Self::Merging => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Finalized),
            Self::Finalized => None,
        }
    }

    /// Transition to `next`, erroring if it's not the immediate successor.
    pub fn advance(self, next: RunPhase) -> Result<RunPhase> {
        if self.successor() != Some(next) {
            return Err(AggError::new("Invalid run phase transition")
                .with_kind(ErrorKind::InvariantViolation)
                .with_field("from", self)
                .with_field("to", next));
        }
        debug!(from = %self, to = %next, "run phase transition");
        Ok(next)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulating => write!(f, "accumulating"),
            Self::Merging => write!(f, "merging"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// Runs the two-phase aggregation over an input source.
///
/// Every partition is accumulated into partial states in parallel, partial
/// states are merged across partitions by key, and each key's merged state is
/// finalized. A run either returns an output pair for every distinct key, or
/// fails with a single error.
#[derive(Debug)]
pub struct Driver<A, F> {
    accumulator: A,
    finalizer: F,
    config: AggregateConfig,
    cancel: CancelToken,
}

impl<A, F> Driver<A, F>
where
    A: Accumulator,
    F: Finalizer<A::State>,
{
    pub fn new(accumulator: A, finalizer: F, config: AggregateConfig) -> Self {
        Driver {
            accumulator,
            finalizer,
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &AggregateConfig {
        &self.config
    }

    /// Token that cancels any in-progress or future run of this driver.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run<K, V, S>(&self, source: &S) -> Result<Vec<OutputPair<K, F::Output>>>
    where
        S: InputSource<K, V> + ?Sized,
        K: Hash + Eq + Clone + Debug + Send + Sync,
        V: Sync,
        A::Value: FromRecordValue<V>,
    {
        self.run_with_observer(source, &NoopObserver)
    }

    /// Run the aggregation, calling `observer` once for each partition before
    /// it's dispatched.
    pub fn run_with_observer<K, V, S, O>(
        &self,
        source: &S,
        observer: &O,
    ) -> Result<Vec<OutputPair<K, F::Output>>>
    where
        S: InputSource<K, V> + ?Sized,
        O: PartitionObserver<K, V> + ?Sized,
        K: Hash + Eq + Clone + Debug + Send + Sync,
        V: Sync,
        A::Value: FromRecordValue<V>,
    {
        let start = Instant::now();
        let ctx = ExecutionContext::acquire(&self.config, self.cancel.clone())?;

        let mut phase = RunPhase::Accumulating;
        let partitions = source.partitions()?;
        let num_partitions = partitions.len();

        for (partition_idx, partition) in partitions.iter().enumerate() {
            observer.observe_partition(partition_idx, &partition.records);
        }

        let processor = PartitionProcessor::new(&self.accumulator);
        let partials = ctx.run_tasks(
            TaskStage::Accumulate,
            &partitions,
            |partition_idx, partition| processor.process(partition_idx, partition, &self.cancel),
        )?;
        // Raw records aren't needed once every partition has been accumulated.
        std::mem::drop(partitions);

        phase = phase.advance(RunPhase::Merging)?;
        let finals = MergeCoordinator::from_config(&self.config).merge(
            &ctx,
            &self.accumulator,
            partials,
            num_partitions,
        )?;

        phase = phase.advance(RunPhase::Finalizing)?;
        self.cancel.check()?;
        let num_keys = finals.len();
        let outputs = ctx.install(|| {
            finals
                .into_par_iter()
                .map(|FinalState { key, state }| match self.finalizer.finalize(state) {
                    Ok(statistic) => Ok(OutputPair { key, statistic }),
                    Err(e) => Err(e.with_field("key", format!("{key:?}"))),
                })
                .collect::<Result<Vec<_>>>()
        })?;

        // Cancellation discards everything, even fully finalized output.
        self.cancel.check()?;
        phase.advance(RunPhase::Finalized)?;

        info!(
            num_partitions,
            num_keys,
            failed_attempts = ctx.failed_attempts(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "aggregation complete"
        );

        Ok(outputs)
    }
}
