//! Turning fully merged states into output statistics.

use std::fmt::Debug;

use keyagg_error::{AggError, ErrorKind, OptionExt, Result};
use serde::Serialize;

use crate::accumulator::multiset::Multiset;
use crate::numeric::NumericValue;

/// Maps a key's final state to its output statistic.
///
/// Called exactly once per key, only after every partition has been merged.
pub trait Finalizer<S>: Debug + Sync + Send {
    type Output: Debug + Send;

    fn finalize(&self, state: S) -> Result<Self::Output>;
}

/// A key along with its computed statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPair<K, T> {
    pub key: K,
    pub statistic: T,
}

/// Computes the exact median of a multiset of numeric values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Median;

impl Finalizer<Multiset<NumericValue>> for Median {
    type Output = NumericValue;

    fn finalize(&self, state: Multiset<NumericValue>) -> Result<Self::Output> {
        median(state.into_values())
    }
}

/// Median of the given values.
///
/// For an odd count this is the middle value of the sorted values. For an even
/// count it's the mean of the two middle values, which is always Float64. If
/// any value is Float64, all values are promoted before selecting.
///
/// Errors if there are no values.
pub fn median(mut values: Vec<NumericValue>) -> Result<NumericValue> {
    if values.is_empty() {
        return Err(AggError::new("Cannot compute median of an empty state")
            .with_kind(ErrorKind::InvariantViolation));
    }

    if values.iter().any(|v| v.is_float()) {
        values.iter_mut().for_each(|v| *v = v.promote_to_float());
    }

    let n = values.len();
    let (lower_half, upper, _) = values.select_nth_unstable_by(n / 2, NumericValue::total_cmp);
    let upper = *upper;

    if n % 2 == 1 {
        return Ok(upper);
    }

    // Everything left of the selected index is <= it, so the largest of those
    // is the other middle value.
    let lower = lower_half
        .iter()
        .copied()
        .max_by(NumericValue::total_cmp)
        .required("lower middle value")?;

    Ok(NumericValue::midpoint(lower, upper))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(vals: &[i64]) -> Vec<NumericValue> {
        vals.iter().copied().map(NumericValue::Int64).collect()
    }

    #[test]
    fn odd_count() {
        let out = median(ints(&[1, 3, 5, 7, 9, 11, 13])).unwrap();
        assert_eq!(NumericValue::Int64(7), out);
    }

    #[test]
    fn even_count() {
        let out = median(ints(&[1, 3, 5, 7, 9, 11])).unwrap();
        assert_eq!(NumericValue::Float64(6.0), out);
        assert_eq!("6.0", out.to_string());
    }

    #[test]
    fn mixed_types() {
        let values = vec![
            NumericValue::Int64(-11),
            NumericValue::Float64(5.5),
            NumericValue::Float64(-3.4),
            NumericValue::Float64(7.1),
            NumericValue::Int64(-9),
            NumericValue::Int64(22),
        ];
        let out = median(values).unwrap();
        assert_eq!(NumericValue::Float64(1.05), out);
    }

    #[test]
    fn odd_count_with_float_promotes() {
        let values = vec![
            NumericValue::Int64(4),
            NumericValue::Float64(0.5),
            NumericValue::Int64(9),
        ];
        assert_eq!(NumericValue::Float64(4.0), median(values).unwrap());
    }

    #[test]
    fn unsorted_with_duplicates() {
        let out = median(ints(&[8, 2, 7, 6, 1, 2])).unwrap();
        assert_eq!(NumericValue::Float64(4.0), out);

        let out = median(ints(&[5, 5, 5, 1])).unwrap();
        assert_eq!(NumericValue::Float64(5.0), out);
    }

    #[test]
    fn single_value() {
        assert_eq!(NumericValue::Int64(42), median(ints(&[42])).unwrap());
        assert_eq!(
            NumericValue::Float64(2.5),
            median(vec![NumericValue::Float64(2.5)]).unwrap()
        );
    }

    #[test]
    fn empty_is_invariant_violation() {
        let err = median(Vec::new()).unwrap_err();
        assert_eq!(ErrorKind::InvariantViolation, err.kind());
    }

    #[test]
    fn median_finalizer() {
        let state: Multiset<NumericValue> = ints(&[10, 12, 30, 32]).into_iter().collect();
        let out = Median.finalize(state).unwrap();
        assert_eq!("21.0", out.to_string());
    }

    #[test]
    fn output_pair_json() {
        let pair = OutputPair {
            key: "k3",
            statistic: NumericValue::Float64(21.0),
        };
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(r#"{"key":"k3","statistic":21.0}"#, json);
    }
}
