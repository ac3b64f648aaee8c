//! The accumulator protocol.
//!
//! An accumulator describes how raw values fold into a per-key state
//! (`merge_in`) and how two states for the same key merge (`combine`).
//! Every accumulator must satisfy:
//!
//! - `combine(zero(), s) == s` and `combine(s, zero()) == s`.
//! - `combine` is associative and commutative with respect to what the state
//!   represents.
//! - `merge_in(s, v)` is equivalent to `combine(s, merge_in(zero(), v))`.
//!
//! Breaking any of these makes the output depend on how input was
//! partitioned and how merge work was scheduled.

pub mod multiset;

use std::fmt::Debug;

use keyagg_error::Result;

pub trait Accumulator: Debug + Sync + Send {
    /// Statically typed value folded into the state.
    type Value: Send;
    /// Intermediate per-key state.
    ///
    /// Clone is needed so a merge task can be re-run from retained input.
    type State: Debug + Clone + Send + Sync;

    /// The identity state.
    fn zero(&self) -> Self::State;

    /// Fold a single value into a state, producing a new state.
    fn merge_in(&self, state: Self::State, value: Self::Value) -> Self::State;

    /// Merge two states, producing a new state.
    fn combine(&self, left: Self::State, right: Self::State) -> Self::State;
}

/// Conversion from a raw record value to an accumulator's value type.
///
/// A failed conversion should produce an error with kind
/// `ErrorKind::ValueType`.
pub trait FromRecordValue<V>: Sized {
    fn from_record_value(value: &V) -> Result<Self>;
}

impl<T: Clone> FromRecordValue<T> for T {
    fn from_record_value(value: &T) -> Result<Self> {
        Ok(value.clone())
    }
}
