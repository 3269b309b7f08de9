use clap::Parser;
use maze_evolver::config::Config;
use maze_evolver::evaluation::fitness;
use maze_evolver::maze::Maze;
use maze_evolver::render;
use maze_evolver::vm::engine::Interpreter;
use maze_evolver::vm::node::Node;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "maze-evolver", version)]
#[command(about = "Evolve decision-tree programs that steer an agent through a grid maze")]
struct Cli {
    /// TOML configuration file.
    #[arg(default_value = "config.toml")]
    config: PathBuf,

    /// Replay this program once on the configured maze instead of evolving one,
    /// e.g. "SEQ(MOVE(RIGHT), IF_WALL(MOVE(DOWN), MOVE(RIGHT)))".
    #[arg(long)]
    program: Option<String>,

    /// Overrides `random_seed` from the configuration.
    #[arg(long)]
    seed: Option<u64>,
}

/// Runs `tree` once and prints its metrics, path and moves.
fn show_replay(tree: &Node, maze: &Maze, config: &Config) -> Result<(), String> {
    let simulation = &config.simulation;
    let agent = Interpreter::new(maze, simulation.goal_close_threshold)
        .run(tree, simulation.max_steps)
        .map_err(|e| format!("Program could not be executed: {}", e))?;
    let metrics = agent.metrics(maze);

    println!("Fitness: {:.2}", fitness(&metrics));
    println!(
        "Steps: {} | Distance: {} | Wall hits: {} | Revisits: {} | Reached goal: {}",
        metrics.steps, metrics.distance, metrics.wall_hits, metrics.revisits, metrics.reached_goal
    );
    println!("Final position: {}", metrics.final_position);
    println!("\n{}", render::maze_with_path(maze, agent.path()));

    let moves = render::movement_sequence(agent.path());
    println!("Total moves: {}", moves.len());
    println!("{}", render::compress_moves(&moves));
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    log::info!("Booting maze-evolver...");

    // 1. Load and validate configuration
    let mut config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration '{}': {}", cli.config.display(), e);
            process::exit(1);
        }
    };
    if let Some(seed) = cli.seed {
        config.random_seed = Some(seed);
    }
    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    // 2. Build the maze
    let maze = match config.build_maze() {
        Ok(m) => m,
        Err(e) => {
            log::error!("Failed to build maze: {}", e);
            process::exit(1);
        }
    };

    // 3a. Replay a given program
    if let Some(text) = &cli.program {
        let tree: Node = match text.parse() {
            Ok(t) => t,
            Err(e) => {
                log::error!("Failed to parse program: {}", e);
                process::exit(1);
            }
        };
        println!("{}", render::tree_structure(&tree));
        if let Err(e) = show_replay(&tree, &maze, &config) {
            log::error!("{}", e);
            process::exit(1);
        }
        return;
    }

    // 3b. Evolve
    log::info!("--- Starting Evolution ---");
    let outcome = match maze_evolver::run(&config) {
        Ok(o) => o,
        Err(e) => {
            log::error!("Evolution failed: {}", e);
            process::exit(1);
        }
    };

    println!("\nTermination: {:?}", outcome.termination);
    println!("Best program: {}", outcome.best.tree);
    println!(
        "Size: {} | Depth: {}\n",
        outcome.best.tree.size(),
        outcome.best.tree.depth()
    );
    println!("{}", render::tree_structure(&outcome.best.tree));
    if let Err(e) = show_replay(&outcome.best.tree, &maze, &config) {
        log::error!("{}", e);
        process::exit(1);
    }
    println!("\n{}", render::history_table(&outcome.history));
}
