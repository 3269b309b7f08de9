use crate::config::SelectionStrategy;
use crate::evolution::generator::{Method, TreeGenerator};
use crate::vm::node::Node;
use log::{debug, warn};
use rand::Rng;
use std::cmp::Ordering;

/// Share of over-selection draws taken from the top group.
const OVER_SELECTION_TOP_SHARE: f64 = 0.8;

/// Roulette weight of a fitness value. Lower fitness gives a larger weight and
/// an infinite (failed) fitness gives zero.
pub fn selection_weight(fitness: f64) -> f64 {
    if fitness.is_finite() {
        1.0 / (1.0 + fitness.max(0.0))
    } else {
        0.0
    }
}

/// Spins a roulette wheel over `candidates`, which index into `weights`.
/// Falls back to a uniform pick when no candidate carries weight.
fn spin<R: Rng>(candidates: &[usize], weights: &[f64], rng: &mut R) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    let total: f64 = candidates.iter().map(|&i| weights[i]).sum();
    if !(total > 0.0 && total.is_finite()) {
        return Some(candidates[rng.random_range(0..candidates.len())]);
    }
    let target = rng.random::<f64>() * total;
    let mut acc = 0.0;
    for &i in candidates {
        acc += weights[i];
        if acc > target {
            return Some(i);
        }
    }
    // Rounding can leave `acc` a hair under `target`.
    candidates.iter().rev().copied().find(|&i| weights[i] > 0.0)
}

/// Draws `count` parent indices, with replacement, from a population whose
/// fitness values are given in order.
///
/// # Arguments
/// * `fitnesses` - Fitness of every individual, lower is better
/// * `count` - Number of parents to draw
/// * `strategy` - Plain roulette or over-selection
/// * `rng` - The run's random stream
///
/// # Returns
/// * `Vec<usize>` - Indices into `fitnesses`; empty if the population is empty
pub fn select_parents<R: Rng>(
    fitnesses: &[f64],
    count: usize,
    strategy: SelectionStrategy,
    rng: &mut R,
) -> Vec<usize> {
    if fitnesses.is_empty() {
        warn!("selection operator received an empty population");
        return Vec::new();
    }
    let weights: Vec<f64> = fitnesses.iter().map(|&f| selection_weight(f)).collect();

    match strategy {
        SelectionStrategy::Roulette => {
            let everyone: Vec<usize> = (0..fitnesses.len()).collect();
            (0..count)
                .filter_map(|_| spin(&everyone, &weights, rng))
                .collect()
        }
        SelectionStrategy::OverSelection { top_fraction } => {
            let ranked = rank(fitnesses);
            let top_size = ((top_fraction * ranked.len() as f64).ceil() as usize).clamp(1, ranked.len());
            let (top, rest) = ranked.split_at(top_size);
            (0..count)
                .filter_map(|_| {
                    let group = if rest.is_empty() || rng.random::<f64>() < OVER_SELECTION_TOP_SHARE {
                        top
                    } else {
                        rest
                    };
                    spin(group, &weights, rng)
                })
                .collect()
        }
    }
}

/// Indices sorted by ascending fitness; ties keep population order.
pub fn rank(fitnesses: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitnesses.len()).collect();
    order.sort_by(|&a, &b| {
        fitnesses[a]
            .partial_cmp(&fitnesses[b])
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Copies `recipient` with the subtree at `at` replaced by a deep copy of the
/// subtree of `donor` at `from`.
fn graft(recipient: &Node, at: usize, donor: &Node, from: usize) -> Option<Node> {
    let scion = donor.subtree(from)?.clone();
    let mut child = recipient.clone();
    *child.subtree_mut(at)? = scion;
    Some(child)
}

/// Subtree crossover.
///
/// One node is picked uniformly from each parent (roots included) and the two
/// subtrees are exchanged between fresh copies of the parents. A child deeper
/// than `max_depth` is rejected and new points are drawn, up to `attempts`
/// times; a child still missing after that is a plain copy of its own parent.
///
/// # Returns
/// * `(Node, Node)` - Children built on `parent1` and `parent2` respectively. Neither
///   shares any node with the parents.
pub fn crossover<R: Rng>(
    parent1: &Node,
    parent2: &Node,
    max_depth: usize,
    attempts: usize,
    rng: &mut R,
) -> (Node, Node) {
    let mut first: Option<Node> = None;
    let mut second: Option<Node> = None;

    for _ in 0..attempts {
        let i = rng.random_range(0..parent1.size());
        let j = rng.random_range(0..parent2.size());
        if first.is_none() {
            first = graft(parent1, i, parent2, j).filter(|child| child.depth() <= max_depth);
        }
        if second.is_none() {
            second = graft(parent2, j, parent1, i).filter(|child| child.depth() <= max_depth);
        }
        if first.is_some() && second.is_some() {
            break;
        }
    }

    let first = first.unwrap_or_else(|| {
        debug!("Crossover exhausted {} attempts, keeping a copy of parent 1", attempts);
        parent1.clone()
    });
    let second = second.unwrap_or_else(|| {
        debug!("Crossover exhausted {} attempts, keeping a copy of parent 2", attempts);
        parent2.clone()
    });
    (first, second)
}

/// Whole-tree mutation: with probability `rate` the tree is discarded and a new
/// `grow` tree of depth `max_depth` takes its place.
pub fn mutate<R: Rng>(
    tree: Node,
    rate: f64,
    generator: &TreeGenerator,
    max_depth: usize,
    rng: &mut R,
) -> Node {
    if rng.random::<f64>() < rate {
        generator.generate(Method::Grow, max_depth, rng)
    } else {
        tree
    }
}
