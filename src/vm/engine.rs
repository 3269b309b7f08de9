use crate::maze::{Direction, Maze, Position};
use crate::vm::node::Node;
use std::collections::HashSet;
use thiserror::Error;

/// Deepest node nesting the interpreter will walk before giving up on a tree.
pub const MAX_NESTING: usize = 64;

#[derive(Error, Debug, PartialEq)]
pub enum ExecError {
    #[error("Program nesting exceeds the interpreter limit of {limit}")]
    NestingTooDeep { limit: usize },
}

/// What happened to a single `Move` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Revisited,
    Blocked,
}

/// Simulation state for one evaluation. Created fresh per run and never shared.
#[derive(Debug, Clone)]
pub struct Agent {
    position: Position,
    steps: usize,
    wall_hits: usize,
    revisits: usize,
    visited: HashSet<Position>,
    path: Vec<Position>,
}

impl Agent {
    pub fn new(start: Position) -> Self {
        Self {
            position: start,
            steps: 0,
            wall_hits: 0,
            revisits: 0,
            visited: HashSet::from([start]),
            path: vec![start],
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn wall_hits(&self) -> usize {
        self.wall_hits
    }

    pub fn revisits(&self) -> usize {
        self.revisits
    }

    /// Every cell the agent stood on, in order, starting with the start cell.
    pub fn path(&self) -> &[Position] {
        &self.path
    }

    /// Attempts one move. Off-grid and wall targets are rejected and counted as
    /// wall hits; every attempt costs a step.
    pub fn step(&mut self, direction: Direction, maze: &Maze) -> MoveOutcome {
        self.steps += 1;
        let target = maze
            .neighbor(self.position, direction)
            .filter(|&candidate| maze.is_open(candidate));

        let Some(target) = target else {
            self.wall_hits += 1;
            return MoveOutcome::Blocked;
        };

        let outcome = if self.visited.insert(target) {
            MoveOutcome::Moved
        } else {
            self.revisits += 1;
            MoveOutcome::Revisited
        };
        self.position = target;
        self.path.push(target);
        outcome
    }

    /// Raw performance figures once the run has ended.
    pub fn metrics(&self, maze: &Maze) -> RunMetrics {
        let distance = maze.distance_to_goal(self.position);
        RunMetrics {
            steps: self.steps,
            distance,
            wall_hits: self.wall_hits,
            revisits: self.revisits,
            reached_goal: self.position == maze.goal(),
            final_position: self.position,
        }
    }
}

/// Raw metrics extracted from a finished simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMetrics {
    pub steps: usize,
    /// Manhattan distance from the final position to the goal
    pub distance: usize,
    pub wall_hits: usize,
    pub revisits: usize,
    pub reached_goal: bool,
    pub final_position: Position,
}

/// Walks a decision tree against an agent inside a read-only maze.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    maze: &'a Maze,
    goal_close_threshold: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(maze: &'a Maze, goal_close_threshold: usize) -> Self {
        Self {
            maze,
            goal_close_threshold,
        }
    }

    /// Runs one invocation of `node`. Conditionals evaluate exactly one branch,
    /// `Sequence` always evaluates both.
    pub fn execute(&self, node: &Node, agent: &mut Agent) -> Result<(), ExecError> {
        self.execute_nested(node, agent, 0)
    }

    fn execute_nested(&self, node: &Node, agent: &mut Agent, nesting: usize) -> Result<(), ExecError> {
        if nesting > MAX_NESTING {
            return Err(ExecError::NestingTooDeep { limit: MAX_NESTING });
        }
        match node {
            Node::Move(direction) => {
                agent.step(*direction, self.maze);
            }
            Node::IfWallNearby(then_branch, else_branch) => {
                let branch = if self.maze.wall_nearby(agent.position) {
                    then_branch
                } else {
                    else_branch
                };
                self.execute_nested(branch, agent, nesting + 1)?;
            }
            Node::IfGoalClose(then_branch, else_branch) => {
                let branch =
                    if self.maze.distance_to_goal(agent.position) <= self.goal_close_threshold {
                        then_branch
                    } else {
                        else_branch
                    };
                self.execute_nested(branch, agent, nesting + 1)?;
            }
            Node::Sequence(first, second) => {
                self.execute_nested(first, agent, nesting + 1)?;
                self.execute_nested(second, agent, nesting + 1)?;
            }
        }
        Ok(())
    }

    /// Invokes `root` repeatedly from the maze start until the agent stands on
    /// the goal or has spent `max_steps`. Only accumulated steps are capped, so a
    /// single invocation may overshoot `max_steps`.
    ///
    /// # Returns
    /// * `Result<Agent, ExecError>` - The final agent state, or the structural
    ///   violation that aborted the run.
    pub fn run(&self, root: &Node, max_steps: usize) -> Result<Agent, ExecError> {
        let mut agent = Agent::new(self.maze.start());
        while agent.position != self.maze.goal() && agent.steps < max_steps {
            self.execute(root, &mut agent)?;
        }
        Ok(agent)
    }
}
