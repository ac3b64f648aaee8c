//! Execution resources for a single run.

pub mod threaded;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use keyagg_error::{AggError, ErrorKind, Result};
use rayon::prelude::*;
use threaded::ThreadedExecutor;
use tracing::{debug, warn};

use crate::config::AggregateConfig;

/// Shared flag for canceling a run from another thread.
///
/// Once canceled a token stays canceled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Return a Canceled error if the token has been canceled.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(AggError::new("Run canceled").with_kind(ErrorKind::Canceled));
        }
        Ok(())
    }
}

/// The stage a batch of tasks belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    /// One task per input partition.
    Accumulate,
    /// One task per shuffle bucket.
    Merge,
}

impl TaskStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accumulate => "accumulate",
            Self::Merge => "merge",
        }
    }

    /// Name of the error field identifying a task's input in this stage.
    pub const fn input_field(&self) -> &'static str {
        match self {
            Self::Accumulate => "partition",
            Self::Merge => "bucket",
        }
    }
}

/// Scoped execution handle for one run.
///
/// Holds the worker pool, the retry policy and the run's cancellation token.
/// Resources are released when the context is dropped, whichever way the
/// run ends.
#[derive(Debug)]
pub struct ExecutionContext {
    executor: ThreadedExecutor,
    cancel: CancelToken,
    max_task_retries: usize,
    /// Number of task attempts that terminated abnormally.
    failed_attempts: AtomicUsize,
}

impl ExecutionContext {
    pub fn acquire(config: &AggregateConfig, cancel: CancelToken) -> Result<Self> {
        let executor = ThreadedExecutor::try_new(config.parallelism)?;
        debug!(num_threads = executor.num_threads(), "acquired execution context");

        Ok(ExecutionContext {
            executor,
            cancel,
            max_task_retries: config.max_task_retries,
            failed_attempts: AtomicUsize::new(0),
        })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn failed_attempts(&self) -> usize {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.executor.install(op)
    }

    /// Run one task per input in parallel, returning outputs in input order.
    ///
    /// A task that panics is re-run against the same input until it succeeds
    /// or runs out of retries. Errors returned by a task are not retried and
    /// fail the whole stage.
    pub fn run_tasks<I, T, F>(&self, stage: TaskStage, inputs: &[I], task: F) -> Result<Vec<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(usize, &I) -> Result<T> + Sync,
    {
        self.executor.install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(idx, input)| self.run_with_retries(stage, idx, || task(idx, input)))
                .collect()
        })
    }

    fn run_with_retries<T, F>(&self, stage: TaskStage, idx: usize, task: F) -> Result<T>
    where
        F: Fn() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            self.cancel.check()?;
            attempt += 1;

            let payload = match panic::catch_unwind(AssertUnwindSafe(&task)) {
                Ok(result) => return result,
                Err(payload) => payload,
            };

            self.failed_attempts.fetch_add(1, Ordering::Relaxed);
            let cause = panic_message(payload.as_ref());

            if attempt > self.max_task_retries {
                return Err(AggError::new("Worker task failed, retries exhausted")
                    .with_kind(ErrorKind::WorkerFailure)
                    .with_field("stage", stage.as_str())
                    .with_field(stage.input_field(), idx)
                    .with_field("attempts", attempt)
                    .with_field("cause", cause));
            }

            warn!(
                stage = stage.as_str(),
                input = stage.input_field(),
                idx,
                attempt,
                %cause,
                "worker task failed, retrying"
            );
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        debug!(
            failed_attempts = self.failed_attempts(),
            "released execution context"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(retries: usize) -> ExecutionContext {
        let mut conf = AggregateConfig::new();
        conf.parallelism = 2;
        conf.max_task_retries = retries;
        ExecutionContext::acquire(&conf, CancelToken::new()).unwrap()
    }

    #[test]
    fn outputs_in_input_order() {
        let ctx = context(0);
        let inputs: Vec<usize> = (0..32).collect();
        let out = ctx
            .run_tasks(TaskStage::Accumulate, &inputs, |idx, v| Ok(idx * 100 + v))
            .unwrap();
        let expected: Vec<_> = (0..32).map(|v| v * 101).collect();
        assert_eq!(expected, out);
    }

    #[test]
    fn panicking_task_retried() {
        let ctx = context(2);
        let calls = AtomicUsize::new(0);

        let out = ctx
            .run_tasks(TaskStage::Accumulate, &[7], |_, v| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("simulated crash");
                }
                Ok(*v)
            })
            .unwrap();

        assert_eq!(vec![7], out);
        assert_eq!(2, calls.load(Ordering::SeqCst));
        assert_eq!(1, ctx.failed_attempts());
    }

    #[test]
    fn retries_exhausted() {
        let ctx = context(1);
        let err = ctx
            .run_tasks(TaskStage::Accumulate, &[1, 2], |idx, _| -> Result<()> {
                if idx == 1 {
                    panic!("always fails");
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!(ErrorKind::WorkerFailure, err.kind());
        assert_eq!(Some("accumulate"), err.get_field("stage"));
        assert_eq!(Some("1"), err.get_field("partition"));
        assert_eq!(Some("2"), err.get_field("attempts"));
        assert_eq!(Some("always fails"), err.get_field("cause"));
    }

    #[test]
    fn merge_stage_failure_names_bucket() {
        let ctx = context(0);
        let err = ctx
            .run_tasks(TaskStage::Merge, &[1, 2, 3], |idx, _| -> Result<()> {
                if idx == 2 {
                    panic!("bucket crashed");
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!(ErrorKind::WorkerFailure, err.kind());
        assert_eq!(Some("merge"), err.get_field("stage"));
        assert_eq!(Some("2"), err.get_field("bucket"));
        assert_eq!(None, err.get_field("partition"));
    }

    #[test]
    fn task_errors_not_retried() {
        let ctx = context(3);
        let calls = AtomicUsize::new(0);

        let err = ctx
            .run_tasks(TaskStage::Accumulate, &[1], |_, _| -> Result<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AggError::new("bad value").with_kind(ErrorKind::ValueType))
            })
            .unwrap_err();

        assert_eq!(ErrorKind::ValueType, err.kind());
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn canceled_before_start() {
        let ctx = context(0);
        ctx.cancel_token().cancel();
        let err = ctx.run_tasks(TaskStage::Accumulate, &[1], |_, v| Ok(*v)).unwrap_err();
        assert_eq!(ErrorKind::Canceled, err.kind());
    }
}
