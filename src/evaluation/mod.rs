//! Scoring of decision trees.
//!
//! A tree is run once through the [`Interpreter`] and the resulting
//! [`RunMetrics`] are folded into a single fitness value, lower being better:
//!
//! `fitness = steps + 2 * distance + 10 * wall_hits + 5 * revisits`
//!
//! A run that ends on the goal has `distance == 0`, but its fitness is still at
//! least the number of steps it took, so a fitness of exactly zero is only
//! possible when the start is the goal. Whether a run counts as solved is
//! decided from `reached_goal`, not from the fitness value.

use crate::maze::Maze;
use crate::vm::engine::{ExecError, Interpreter, RunMetrics};
use crate::vm::node::Node;
use log::debug;

pub const STEP_WEIGHT: f64 = 1.0;
pub const DISTANCE_WEIGHT: f64 = 2.0;
pub const WALL_HIT_WEIGHT: f64 = 10.0;
pub const REVISIT_WEIGHT: f64 = 5.0;

/// Fitness assigned when a tree cannot be evaluated at all.
pub const WORST_FITNESS: f64 = f64::INFINITY;

/// Cached outcome of evaluating one tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub fitness: f64,
    /// `None` when evaluation was aborted by a structural violation
    pub metrics: Option<RunMetrics>,
}

impl Evaluation {
    pub fn reached_goal(&self) -> bool {
        self.metrics.is_some_and(|m| m.reached_goal)
    }

    pub fn is_failure(&self) -> bool {
        self.metrics.is_none()
    }

    fn failed() -> Self {
        Self {
            fitness: WORST_FITNESS,
            metrics: None,
        }
    }
}

pub fn fitness(metrics: &RunMetrics) -> f64 {
    STEP_WEIGHT * metrics.steps as f64
        + DISTANCE_WEIGHT * metrics.distance as f64
        + WALL_HIT_WEIGHT * metrics.wall_hits as f64
        + REVISIT_WEIGHT * metrics.revisits as f64
}

/// Runs `tree` in a fresh simulation and scores it.
pub fn simulate(
    tree: &Node,
    maze: &Maze,
    max_steps: usize,
    goal_close_threshold: usize,
) -> Result<RunMetrics, ExecError> {
    let agent = Interpreter::new(maze, goal_close_threshold).run(tree, max_steps)?;
    Ok(agent.metrics(maze))
}

/// Scores `tree`. A structural violation is not propagated: the tree gets
/// [`WORST_FITNESS`] and no metrics, so one malformed individual never stops a run.
pub fn evaluate(tree: &Node, maze: &Maze, max_steps: usize, goal_close_threshold: usize) -> Evaluation {
    match simulate(tree, maze, max_steps, goal_close_threshold) {
        Ok(metrics) => Evaluation {
            fitness: fitness(&metrics),
            metrics: Some(metrics),
        },
        Err(e) => {
            debug!("Evaluation aborted: {}. Assigning worst fitness.", e);
            Evaluation::failed()
        }
    }
}
