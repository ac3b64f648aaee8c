use rayon::prelude::*;

use crate::accumulator::Accumulator;

/// Reduce states with `combine` as a tree with bounded fan-in.
///
/// Each round combines consecutive chunks of at most `fan_in` states in
/// parallel, so `n` states take `ceil(log_fan_in(n))` rounds. Returns None if
/// there are no states.
pub fn tree_reduce<A>(accumulator: &A, states: Vec<A::State>, fan_in: usize) -> Option<A::State>
where
    A: Accumulator,
{
    // A fan-in of one would never shrink the level.
    let fan_in = fan_in.max(2);
    let mut level = states;

    while level.len() > 1 {
        level = level
            .into_par_iter()
            .chunks(fan_in)
            .map(|chunk| combine_all(accumulator, chunk))
            .collect();
    }

    level.pop()
}

/// Number of rounds `tree_reduce` takes for `n` states.
pub fn num_rounds(mut n: usize, fan_in: usize) -> usize {
    let fan_in = fan_in.max(2);
    let mut rounds = 0;
    while n > 1 {
        n = n.div_ceil(fan_in);
        rounds += 1;
    }
    rounds
}

fn combine_all<A>(accumulator: &A, chunk: Vec<A::State>) -> A::State
where
    A: Accumulator,
{
    chunk
        .into_iter()
        .fold(accumulator.zero(), |left, right| accumulator.combine(left, right))
}
