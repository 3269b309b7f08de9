use crate::maze::{Maze, MazeError, Position};
use crate::vm::engine::MAX_NESTING;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid maze: {0}")]
    Maze(#[from] MazeError),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Exactly one of 'maze.file_path' or 'maze.rows' must be set")]
    AmbiguousMazeSource,
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// How parents are drawn from an evaluated population.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Fitness-proportional draw with weight `1 / (1 + fitness)`.
    #[default]
    Roulette,
    /// 80% of draws from the best `top_fraction` of the ranked population, 20% from the rest.
    OverSelection { top_fraction: f64 },
}

/// Parameters of the evolutionary loop.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GaConfig {
    pub population_size: usize,
    pub max_generations: usize,
    /// Depth cap for generated and recombined trees (edges from root to deepest leaf)
    pub max_depth: usize,
    pub mutation_rate: f64,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default)]
    pub elite_count: usize,
    /// Probability that `grow` emits a terminal above the depth cap
    #[serde(default = "default_grow_terminal_probability")]
    pub grow_terminal_probability: f64,
    /// Number of crossover point pairs tried before falling back to a parent clone
    #[serde(default = "default_crossover_attempts")]
    pub crossover_attempts: usize,
    /// When set, a goal-reaching champion must also score at or below this to count as solved
    #[serde(default)]
    pub target_fitness: Option<f64>,
    #[serde(default)]
    pub selection: SelectionStrategy,
}

/// Parameters of a single simulation.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub max_steps: usize,
    #[serde(default = "default_goal_close_threshold")]
    pub goal_close_threshold: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            goal_close_threshold: default_goal_close_threshold(),
        }
    }
}

/// Where the grid comes from, plus start and goal.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MazeConfig {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub rows: Option<Vec<String>>,
    pub start: Position,
    pub goal: Position,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Seed for the run's random stream; `None` draws from OS entropy
    #[serde(default)]
    pub random_seed: Option<u64>,
    pub ga: GaConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub maze: MazeConfig,
}

fn default_crossover_rate() -> f64 {
    1.0
}

fn default_grow_terminal_probability() -> f64 {
    0.25
}

fn default_crossover_attempts() -> usize {
    10
}

fn default_max_steps() -> usize {
    50
}

fn default_goal_close_threshold() -> usize {
    5
}

impl Config {
    /// Reads and parses a TOML configuration file. Call `validate` before using it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks every numeric parameter and the maze source.
    ///
    /// # Returns
    /// * `Result<(), ConfigError>` - A unit in the happy case, the first violation otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ga = &self.ga;
        if ga.population_size == 0 {
            return Err(invalid("ga.population_size", "must be greater than 0"));
        }
        if ga.max_generations == 0 {
            return Err(invalid("ga.max_generations", "must be greater than 0"));
        }
        if ga.max_depth == 0 || ga.max_depth > MAX_NESTING {
            return Err(invalid(
                "ga.max_depth",
                format!("must be between 1 and {}", MAX_NESTING),
            ));
        }
        check_probability("ga.mutation_rate", ga.mutation_rate)?;
        check_probability("ga.crossover_rate", ga.crossover_rate)?;
        check_probability("ga.grow_terminal_probability", ga.grow_terminal_probability)?;
        if ga.elite_count >= ga.population_size {
            return Err(invalid(
                "ga.elite_count",
                format!("must be smaller than population_size ({})", ga.population_size),
            ));
        }
        if ga.crossover_attempts == 0 {
            return Err(invalid("ga.crossover_attempts", "must be greater than 0"));
        }
        if let Some(target) = ga.target_fitness {
            if !target.is_finite() || target < 0.0 {
                return Err(invalid(
                    "ga.target_fitness",
                    "must be a finite, non-negative number",
                ));
            }
        }
        if let SelectionStrategy::OverSelection { top_fraction } = ga.selection {
            if !(top_fraction > 0.0 && top_fraction <= 1.0) {
                return Err(invalid("ga.selection.top_fraction", "must be in (0, 1]"));
            }
        }
        if self.simulation.max_steps == 0 {
            return Err(invalid("simulation.max_steps", "must be greater than 0"));
        }
        if self.maze.file_path.is_some() == self.maze.rows.is_some() {
            return Err(ConfigError::AmbiguousMazeSource);
        }
        Ok(())
    }

    /// Loads the grid and checks that start and goal are open cells inside it.
    pub fn build_maze(&self) -> Result<Maze, ConfigError> {
        let MazeConfig {
            file_path,
            rows,
            start,
            goal,
        } = &self.maze;
        let maze = match (file_path, rows) {
            (Some(path), None) => Maze::load(Path::new(path), *start, *goal)?,
            (None, Some(rows)) => Maze::parse(&rows.join("\n"), *start, *goal)?,
            _ => return Err(ConfigError::AmbiguousMazeSource),
        };
        Ok(maze)
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(name, format!("{} is not a probability in [0, 1]", value)))
    }
}
