use std::marker::PhantomData;

use super::Accumulator;

/// An unordered bag of values.
///
/// Storage order reflects the order values were pushed and appended, but
/// nothing reading a multiset may depend on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiset<T> {
    values: Vec<T>,
}

impl<T> Multiset<T> {
    pub const fn new() -> Self {
        Multiset { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// Move all values from `other` into self.
    pub fn append(&mut self, other: &mut Multiset<T>) {
        self.values.append(&mut other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }
}

impl<T> Default for Multiset<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Multiset {
            values: iter.into_iter().collect(),
        }
    }
}

/// Accumulator collecting every value unchanged.
///
/// Trades memory for exactness: the final state holds every value seen for a
/// key.
#[derive(Debug, Clone, Copy)]
pub struct MultisetAccumulator<T> {
    _t: PhantomData<fn() -> T>,
}

impl<T> MultisetAccumulator<T> {
    pub const fn new() -> Self {
        MultisetAccumulator { _t: PhantomData }
    }
}

impl<T> Default for MultisetAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Accumulator for MultisetAccumulator<T>
where
    T: std::fmt::Debug + Clone + Send + Sync,
{
    type Value = T;
    type State = Multiset<T>;

    fn zero(&self) -> Self::State {
        Multiset::new()
    }

    fn merge_in(&self, mut state: Self::State, value: Self::Value) -> Self::State {
        state.push(value);
        state
    }

    fn combine(&self, mut left: Self::State, mut right: Self::State) -> Self::State {
        // Append the smaller side into the larger one.
        if left.len() < right.len() {
            std::mem::swap(&mut left, &mut right);
        }
        left.append(&mut right);
        left
    }
}
