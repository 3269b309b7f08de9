pub mod config;
pub mod evaluation;
pub mod evolution;
pub mod maze;
pub mod render;
pub mod vm;

use crate::config::{Config, ConfigError};
use crate::evolution::{EvolutionEngine, EvolutionError, RunOutcome};
use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Evolution(#[from] EvolutionError),
}

/// Validates `config`, builds its maze and evolves a solver for it.
pub fn run(config: &Config) -> Result<RunOutcome, RunError> {
    config.validate()?;
    let maze = config.build_maze()?;
    info!(
        "Maze {}x{} loaded, start {} goal {}",
        maze.width(),
        maze.height(),
        maze.start(),
        maze.goal()
    );
    let mut engine = EvolutionEngine::new(&config.ga, &config.simulation, &maze, config.random_seed);
    Ok(engine.evolve()?)
}
