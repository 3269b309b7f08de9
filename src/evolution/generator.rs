use crate::maze::Direction;
use crate::vm::node::{FunctionKind, Node};
use rand::Rng;

/// Tree construction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Functions at every level above the cap, so every leaf sits exactly at the cap.
    Full,
    /// Terminals may appear early; at least one leaf still reaches the cap.
    Grow,
}

/// Builds random, always-complete trees.
#[derive(Debug, Clone, Copy)]
pub struct TreeGenerator {
    /// Chance that `grow` picks a terminal at a node that is free to stop
    terminal_probability: f64,
}

impl TreeGenerator {
    pub fn new(terminal_probability: f64) -> Self {
        Self {
            terminal_probability,
        }
    }

    /// Generates a tree whose depth is exactly `max_depth`.
    pub fn generate<R: Rng>(&self, method: Method, max_depth: usize, rng: &mut R) -> Node {
        match method {
            Method::Full => self.full(0, max_depth, rng),
            Method::Grow => self.grow(0, max_depth, true, rng),
        }
    }

    fn full<R: Rng>(&self, depth: usize, max_depth: usize, rng: &mut R) -> Node {
        if depth >= max_depth {
            return random_terminal(rng);
        }
        let kind = random_function(rng);
        let first = self.full(depth + 1, max_depth, rng);
        let second = self.full(depth + 1, max_depth, rng);
        kind.build(first, second)
    }

    /// `must_reach` marks the one branch that is forced down to `max_depth`,
    /// every other branch stops at random.
    fn grow<R: Rng>(&self, depth: usize, max_depth: usize, must_reach: bool, rng: &mut R) -> Node {
        if depth >= max_depth {
            return random_terminal(rng);
        }
        if !must_reach && rng.random::<f64>() < self.terminal_probability {
            return random_terminal(rng);
        }
        let kind = random_function(rng);
        let first_reaches = must_reach && rng.random_bool(0.5);
        let second_reaches = must_reach && !first_reaches;
        let first = self.grow(depth + 1, max_depth, first_reaches, rng);
        let second = self.grow(depth + 1, max_depth, second_reaches, rng);
        kind.build(first, second)
    }

    /// Ramped half-and-half initialisation: `population_size` trees spread over
    /// depths `1..=max_depth`, half built with `full` and half with `grow` at each depth.
    pub fn ramped_half_and_half<R: Rng>(
        &self,
        max_depth: usize,
        population_size: usize,
        rng: &mut R,
    ) -> Vec<Node> {
        ramped_plan(max_depth, population_size)
            .into_iter()
            .map(|(depth, method)| self.generate(method, depth, rng))
            .collect()
    }
}

/// The `(depth, method)` of every tree ramped half-and-half will build, in order.
///
/// Each depth gets `population_size / max_depth` trees and the deepest bucket also
/// takes the remainder. Inside a bucket `grow` gets the lower half and `full` the
/// rest, so the two counts differ by at most one.
pub fn ramped_plan(max_depth: usize, population_size: usize) -> Vec<(usize, Method)> {
    if max_depth == 0 {
        return vec![(0, Method::Full); population_size];
    }
    let per_depth = population_size / max_depth;
    let remainder = population_size % max_depth;

    let mut plan = Vec::with_capacity(population_size);
    for depth in 1..=max_depth {
        let count = if depth == max_depth {
            per_depth + remainder
        } else {
            per_depth
        };
        let grow_count = count / 2;
        plan.extend(std::iter::repeat_n((depth, Method::Grow), grow_count));
        plan.extend(std::iter::repeat_n((depth, Method::Full), count - grow_count));
    }
    plan
}

pub fn random_terminal<R: Rng>(rng: &mut R) -> Node {
    Node::Move(Direction::ALL[rng.random_range(0..Direction::ALL.len())])
}

fn random_function<R: Rng>(rng: &mut R) -> FunctionKind {
    FunctionKind::ALL[rng.random_range(0..FunctionKind::ALL.len())]
}
