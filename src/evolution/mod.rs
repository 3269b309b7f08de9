pub mod generator;
pub mod operators;

use crate::config::{GaConfig, SimulationConfig};
use crate::evaluation::{self, Evaluation, WORST_FITNESS};
use crate::evolution::generator::TreeGenerator;
use crate::maze::Maze;
use crate::vm::node::Node;
use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EvolutionError {
    #[error("Cannot evolve an empty population")]
    EmptyPopulation,
}

/// One member of the population: a tree it owns outright and, once it has been
/// run, the cached result of that run.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub tree: Node,
    /// `None` until the individual has been evaluated
    pub evaluation: Option<Evaluation>,
}

impl Individual {
    pub fn new(tree: Node) -> Self {
        Self {
            tree,
            evaluation: None,
        }
    }

    /// Cached fitness, or the worst possible value if not evaluated yet.
    pub fn fitness(&self) -> f64 {
        self.evaluation.map_or(WORST_FITNESS, |e| e.fitness)
    }

    pub fn reached_goal(&self) -> bool {
        self.evaluation.is_some_and(|e| e.reached_goal())
    }
}

/// Summary statistics of one evaluated generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best: f64,
    pub average: f64,
    pub worst: f64,
    /// Population standard deviation of the fitness values
    pub std_dev: f64,
    /// Mean node count, to keep an eye on bloat
    pub average_size: f64,
    /// Individuals whose evaluation was aborted; they are left out of the fitness statistics
    pub structural_failures: usize,
}

impl GenerationRecord {
    pub fn from_population(generation: usize, population: &[Individual]) -> Self {
        let fitnesses: Vec<f64> = population
            .iter()
            .map(Individual::fitness)
            .filter(|f| f.is_finite())
            .collect();
        let structural_failures = population.len() - fitnesses.len();
        let average_size = if population.is_empty() {
            0.0
        } else {
            population.iter().map(|i| i.tree.size()).sum::<usize>() as f64
                / population.len() as f64
        };

        if fitnesses.is_empty() {
            return Self {
                generation,
                best: WORST_FITNESS,
                average: WORST_FITNESS,
                worst: WORST_FITNESS,
                std_dev: 0.0,
                average_size,
                structural_failures,
            };
        }

        let n = fitnesses.len() as f64;
        let average = fitnesses.iter().sum::<f64>() / n;
        let variance = fitnesses
            .iter()
            .map(|f| (f - average).powi(2))
            .sum::<f64>()
            / n;
        Self {
            generation,
            best: fitnesses.iter().copied().fold(f64::INFINITY, f64::min),
            average,
            worst: fitnesses.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: variance.sqrt(),
            average_size,
            structural_failures,
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Solved,
    MaxGenReached,
}

/// Lifecycle of an [`EvolutionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No population yet
    Empty,
    /// Generation 0 has been built
    Initialized,
    /// Every individual of the current generation carries a fitness
    Evaluated,
    Terminated(Termination),
}

/// Everything a caller gets back from a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Best individual seen over the whole run
    pub best: Individual,
    pub history: Vec<GenerationRecord>,
    pub termination: Termination,
}

/// Returned by `evaluate_population`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PopulationEvaluationReport {
    /// Individuals that had no cached evaluation and were run this time
    pub evaluated: usize,
    /// Of those, how many were aborted by a structural violation
    pub structural_failures: usize,
}

/// Drives the generational loop: evaluate, record, select, breed, replace.
#[derive(Clone)]
pub struct EvolutionEngine<'a> {
    config: &'a GaConfig,
    simulation: &'a SimulationConfig,
    maze: &'a Maze,
    generator: TreeGenerator,
    population: Vec<Individual>,
    history: Vec<GenerationRecord>,
    champion: Option<Individual>,
    state: EngineState,
    /// Single source of randomness for the run
    rng: Pcg64,
}

impl<'a> EvolutionEngine<'a> {
    /// Creates a new engine.
    ///
    /// # Arguments
    /// * `config` - Parameters of the evolutionary loop
    /// * `simulation` - Parameters of each fitness simulation
    /// * `maze` - The maze every individual is evaluated in
    /// * `seed` - Seed of the run's random stream; `None` seeds from the thread-local generator
    pub fn new(
        config: &'a GaConfig,
        simulation: &'a SimulationConfig,
        maze: &'a Maze,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_rng(&mut rand::rng()),
        };
        Self {
            config,
            simulation,
            maze,
            generator: TreeGenerator::new(config.grow_terminal_probability),
            population: Vec::with_capacity(config.population_size),
            history: Vec::new(),
            champion: None,
            state: EngineState::Empty,
            rng,
        }
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn history(&self) -> &[GenerationRecord] {
        &self.history
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn champion(&self) -> Option<&Individual> {
        self.champion.as_ref()
    }

    /// Runs the whole evolution and returns the best individual found.
    ///
    /// Each generation is evaluated and recorded; the run stops as soon as an
    /// individual is solved or after `max_generations` records.
    pub fn evolve(&mut self) -> Result<RunOutcome, EvolutionError> {
        info!(
            "Initializing population of size {} (max depth {})...",
            self.config.population_size, self.config.max_depth
        );
        self.initialize_population();
        if self.population.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }

        let mut generation = 0;
        let termination = loop {
            let report = self.evaluate_population();
            let record = self.record_generation(generation);
            info!(
                "Gen {}: Best={:.2} | Avg={:.2} | Worst={:.2} | Std={:.2} | Avg Size={:.1} | Evaluated={} | Failures={}",
                record.generation,
                record.best,
                record.average,
                record.worst,
                record.std_dev,
                record.average_size,
                report.evaluated,
                record.structural_failures
            );

            if self.population.iter().any(|i| self.is_solved(i)) {
                break Termination::Solved;
            }
            generation += 1;
            if generation >= self.config.max_generations {
                break Termination::MaxGenReached;
            }
            self.population = self.breed();
        };
        self.state = EngineState::Terminated(termination);

        let best = self
            .champion
            .clone()
            .ok_or(EvolutionError::EmptyPopulation)?;
        info!(
            "Evolution finished after {} generation(s): {:?}, champion fitness {:.2}",
            self.history.len(),
            termination,
            best.fitness()
        );
        Ok(RunOutcome {
            best,
            history: self.history.clone(),
            termination,
        })
    }

    /// Builds generation 0 with ramped half-and-half and clears any previous run.
    pub fn initialize_population(&mut self) {
        self.population = self
            .generator
            .ramped_half_and_half(
                self.config.max_depth,
                self.config.population_size,
                &mut self.rng,
            )
            .into_iter()
            .map(Individual::new)
            .collect();
        self.history.clear();
        self.champion = None;
        self.state = EngineState::Initialized;
    }

    /// Evaluates every individual that has no cached evaluation.
    ///
    /// Simulations are independent and draw no randomness, so they run in
    /// parallel and are written back by index.
    pub fn evaluate_population(&mut self) -> PopulationEvaluationReport {
        let work_items: Vec<(usize, &Node)> = self
            .population
            .iter()
            .enumerate()
            .filter_map(|(i, ind)| ind.evaluation.is_none().then_some((i, &ind.tree)))
            .collect();

        let maze = self.maze;
        let max_steps = self.simulation.max_steps;
        let threshold = self.simulation.goal_close_threshold;
        let results: Vec<(usize, Evaluation)> = work_items
            .par_iter()
            .map(|&(i, tree)| (i, evaluation::evaluate(tree, maze, max_steps, threshold)))
            .collect();

        let mut structural_failures = 0;
        let evaluated = results.len();
        for (i, result) in results {
            if result.is_failure() {
                structural_failures += 1;
                debug!("Individual {} failed evaluation: {}", i, self.population[i].tree);
            }
            self.population[i].evaluation = Some(result);
        }
        self.state = EngineState::Evaluated;

        PopulationEvaluationReport {
            evaluated,
            structural_failures,
        }
    }

    /// A goal-reaching individual that also meets `target_fitness` when one is set.
    pub fn is_solved(&self, individual: &Individual) -> bool {
        individual.reached_goal()
            && self
                .config
                .target_fitness
                .is_none_or(|target| individual.fitness() <= target)
    }

    /// Solved individuals first, then lower fitness. `Less` means `a` is better.
    fn compare(&self, a: &Individual, b: &Individual) -> Ordering {
        self.is_solved(b)
            .cmp(&self.is_solved(a))
            .then_with(|| {
                a.fitness()
                    .partial_cmp(&b.fitness())
                    .unwrap_or(Ordering::Equal)
            })
    }

    /// Appends the statistics of the current (evaluated) generation to the
    /// history and updates the best-ever individual.
    pub fn record_generation(&mut self, generation: usize) -> GenerationRecord {
        let record = GenerationRecord::from_population(generation, &self.population);
        self.history.push(record);

        // `min_by` keeps the first of equal elements, so ties go to population order.
        let leader = self
            .population
            .iter()
            .min_by(|a, b| self.compare(a, b))
            .cloned();
        if let Some(leader) = leader {
            let improves = self
                .champion
                .as_ref()
                .is_none_or(|champion| self.compare(&leader, champion) == Ordering::Less);
            if improves {
                debug!("New champion at generation {}: {}", generation, leader.tree);
                self.champion = Some(leader);
            }
        }
        record
    }

    /// Produces the next generation: the `elite_count` best individuals carried
    /// over with their cached evaluation, then offspring of roulette-selected
    /// pairs until the population is full.
    pub fn breed(&mut self) -> Vec<Individual> {
        let size = self.config.population_size;
        let fitnesses: Vec<f64> = self.population.iter().map(Individual::fitness).collect();

        let mut next_generation: Vec<Individual> = operators::rank(&fitnesses)
            .into_iter()
            .take(self.config.elite_count.min(size))
            .map(|i| self.population[i].clone())
            .collect();

        let offspring_needed = size - next_generation.len();
        let parents = operators::select_parents(
            &fitnesses,
            2 * offspring_needed,
            self.config.selection,
            &mut self.rng,
        );

        for pair in parents.chunks_exact(2) {
            if next_generation.len() >= size {
                break;
            }
            let parent1 = &self.population[pair[0]].tree;
            let parent2 = &self.population[pair[1]].tree;

            let (child1, child2) = if self.rng.random::<f64>() < self.config.crossover_rate {
                operators::crossover(
                    parent1,
                    parent2,
                    self.config.max_depth,
                    self.config.crossover_attempts,
                    &mut self.rng,
                )
            } else {
                (parent1.clone(), parent2.clone())
            };

            for child in [child1, child2] {
                let child = operators::mutate(
                    child,
                    self.config.mutation_rate,
                    &self.generator,
                    self.config.max_depth,
                    &mut self.rng,
                );
                if next_generation.len() < size {
                    next_generation.push(Individual::new(child));
                }
            }
        }
        next_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionStrategy;
    use crate::maze::Position;

    fn get_test_config() -> GaConfig {
        GaConfig {
            population_size: 30,
            max_generations: 8,
            max_depth: 4,
            mutation_rate: 0.2,
            crossover_rate: 1.0,
            elite_count: 0,
            grow_terminal_probability: 0.25,
            crossover_attempts: 10,
            target_fitness: None,
            selection: SelectionStrategy::Roulette,
        }
    }

    fn get_simulation_config() -> SimulationConfig {
        SimulationConfig {
            max_steps: 30,
            goal_close_threshold: 5,
        }
    }

    fn get_test_maze() -> Maze {
        Maze::parse(
            "00000\n01110\n00010\n11010\n00000",
            Position::new(0, 0),
            Position::new(4, 4),
        )
        .unwrap()
    }

    fn individual(text: &str) -> Individual {
        Individual::new(text.parse().unwrap())
    }

    #[test]
    fn test_initialize_population() {
        let config = get_test_config();
        let simulation = get_simulation_config();
        let maze = get_test_maze();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(1));
        assert_eq!(engine.state(), EngineState::Empty);

        engine.initialize_population();

        assert_eq!(engine.state(), EngineState::Initialized);
        assert_eq!(engine.population().len(), config.population_size);
        for ind in engine.population() {
            assert!(ind.evaluation.is_none());
            assert!(ind.tree.depth() >= 1 && ind.tree.depth() <= config.max_depth);
        }
    }

    #[test]
    fn test_same_seed_same_initial_population() {
        let config = get_test_config();
        let simulation = get_simulation_config();
        let maze = get_test_maze();

        let mut first = EvolutionEngine::new(&config, &simulation, &maze, Some(2024));
        let mut second = EvolutionEngine::new(&config, &simulation, &maze, Some(2024));
        first.initialize_population();
        second.initialize_population();
        assert_eq!(first.population(), second.population());

        let mut other = EvolutionEngine::new(&config, &simulation, &maze, Some(2025));
        other.initialize_population();
        assert_ne!(first.population(), other.population());
    }

    #[test]
    fn test_evaluate_only_uncached() {
        let config = get_test_config();
        let simulation = get_simulation_config();
        let maze = get_test_maze();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(3));
        engine.initialize_population();

        let report = engine.evaluate_population();
        assert_eq!(report.evaluated, config.population_size);
        assert_eq!(engine.state(), EngineState::Evaluated);
        assert!(engine.population().iter().all(|i| i.evaluation.is_some()));

        let again = engine.evaluate_population();
        assert_eq!(again.evaluated, 0);
    }

    #[test]
    fn test_generation_record_statistics() {
        let mut population = vec![
            individual("MOVE(UP)"),
            individual("MOVE(DOWN)"),
            individual("SEQ(MOVE(UP), MOVE(UP))"),
        ];
        for (ind, fitness) in population.iter_mut().zip([2.0, 4.0, WORST_FITNESS]) {
            ind.evaluation = Some(Evaluation {
                fitness,
                metrics: None,
            });
        }

        let record = GenerationRecord::from_population(0, &population);
        assert_eq!(record.best, 2.0);
        assert_eq!(record.worst, 4.0);
        assert_eq!(record.average, 3.0);
        assert_eq!(record.std_dev, 1.0);
        assert_eq!(record.structural_failures, 1);
        assert!((record.average_size - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_generation_record_all_failed() {
        let population = vec![Individual::new("MOVE(UP)".parse().unwrap())];
        let record = GenerationRecord::from_population(3, &population);
        assert_eq!(record.generation, 3);
        assert_eq!(record.best, WORST_FITNESS);
        assert_eq!(record.structural_failures, 1);
        assert_eq!(record.std_dev, 0.0);
    }

    #[test]
    fn test_breed_keeps_population_size_and_depth() {
        let mut config = get_test_config();
        config.mutation_rate = 0.5;
        let simulation = get_simulation_config();
        let maze = get_test_maze();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(4));
        engine.initialize_population();
        engine.evaluate_population();

        let next = engine.breed();
        assert_eq!(next.len(), config.population_size);
        for ind in &next {
            assert!(ind.evaluation.is_none());
            assert!(ind.tree.depth() <= config.max_depth);
        }
    }

    #[test]
    fn test_elites_carried_with_cached_evaluation() {
        let mut config = get_test_config();
        config.elite_count = 2;
        let simulation = get_simulation_config();
        let maze = get_test_maze();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(5));
        engine.initialize_population();
        engine.evaluate_population();

        let fitnesses: Vec<f64> = engine.population().iter().map(Individual::fitness).collect();
        let ranked = operators::rank(&fitnesses);
        let expected: Vec<Individual> = ranked[..2]
            .iter()
            .map(|&i| engine.population()[i].clone())
            .collect();

        let next = engine.breed();
        assert_eq!(next.len(), config.population_size);
        assert_eq!(&next[..2], &expected[..]);
        assert!(next[..2].iter().all(|i| i.evaluation.is_some()));
        assert!(next[2..].iter().all(|i| i.evaluation.is_none()));
    }

    #[test]
    fn test_champion_prefers_goal_reaching_individuals() {
        let config = get_test_config();
        let simulation = SimulationConfig {
            max_steps: 2,
            goal_close_threshold: 0,
        };
        let maze = Maze::parse("0000", Position::new(0, 0), Position::new(3, 0)).unwrap();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(6));
        let detour = "SEQ(SEQ(MOVE(RIGHT), MOVE(LEFT)), SEQ(MOVE(RIGHT), SEQ(MOVE(RIGHT), MOVE(RIGHT))))";
        engine.population = vec![
            // Two steps, stops one cell short: 2 + 2 * 1
            individual("MOVE(RIGHT)"),
            // One invocation of five steps with two revisits: 5 + 5 * 2
            individual(detour),
            // Two bumps into the top edge: 2 + 2 * 3 + 10 * 2
            individual("MOVE(UP)"),
        ];
        engine.evaluate_population();
        let record = engine.record_generation(0);

        assert_eq!(record.best, 4.0);
        assert_eq!(record.worst, 28.0);
        let champion = engine.champion().unwrap();
        assert_eq!(champion.tree, detour.parse::<Node>().unwrap());
        assert_eq!(champion.fitness(), 15.0);
        assert!(engine.is_solved(champion));

        // A later, lower-fitness non-solver does not displace it.
        engine.population = vec![individual("MOVE(RIGHT)")];
        engine.evaluate_population();
        engine.record_generation(1);
        assert_eq!(engine.champion().unwrap().fitness(), 15.0);
    }

    #[test]
    fn test_target_fitness_tightens_solved() {
        let mut config = get_test_config();
        config.target_fitness = Some(1.0);
        let simulation = get_simulation_config();
        let maze = Maze::parse("00", Position::new(0, 0), Position::new(1, 0)).unwrap();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(7));
        engine.population = vec![individual("MOVE(RIGHT)")];
        engine.evaluate_population();
        let ind = &engine.population()[0];
        assert!(ind.reached_goal());
        assert_eq!(ind.fitness(), 1.0);
        assert!(engine.is_solved(ind));

        config.target_fitness = Some(0.5);
        let engine = EvolutionEngine::new(&config, &simulation, &maze, Some(7));
        let mut ind = individual("MOVE(RIGHT)");
        ind.evaluation = Some(evaluation::evaluate(&ind.tree, &maze, 30, 5));
        assert!(!engine.is_solved(&ind));
    }

    #[test]
    fn test_full_evolution_run_completes() {
        let config = get_test_config();
        let simulation = get_simulation_config();
        let maze = get_test_maze();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(8));

        let outcome = engine.evolve().unwrap();

        assert!(!outcome.history.is_empty());
        assert!(outcome.history.len() <= config.max_generations);
        assert_eq!(engine.state(), EngineState::Terminated(outcome.termination));
        for (i, record) in outcome.history.iter().enumerate() {
            assert_eq!(record.generation, i);
            assert!(record.best <= record.average && record.average <= record.worst);
        }
        match outcome.termination {
            Termination::Solved => assert!(outcome.best.reached_goal()),
            Termination::MaxGenReached => {
                assert_eq!(outcome.history.len(), config.max_generations)
            }
        }
        let best_recorded = outcome
            .history
            .iter()
            .map(|r| r.best)
            .fold(f64::INFINITY, f64::min);
        if !outcome.best.reached_goal() {
            assert_eq!(outcome.best.fitness(), best_recorded);
        }
    }

    #[test]
    fn test_trivial_maze_solved_in_first_generation() {
        let config = get_test_config();
        let simulation = get_simulation_config();
        let maze = Maze::parse("0", Position::new(0, 0), Position::new(0, 0)).unwrap();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(9));
        let outcome = engine.evolve().unwrap();
        assert_eq!(outcome.termination, Termination::Solved);
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.best.fitness(), 0.0);
    }

    #[test]
    fn test_same_seed_same_run() {
        let config = get_test_config();
        let simulation = get_simulation_config();
        let maze = get_test_maze();

        let first = EvolutionEngine::new(&config, &simulation, &maze, Some(77))
            .evolve()
            .unwrap();
        let second = EvolutionEngine::new(&config, &simulation, &maze, Some(77))
            .evolve()
            .unwrap();

        assert_eq!(first.history, second.history);
        assert_eq!(first.best, second.best);
        assert_eq!(first.termination, second.termination);
    }

    #[test]
    fn test_empty_population_is_an_error() {
        let mut config = get_test_config();
        config.population_size = 0;
        let simulation = get_simulation_config();
        let maze = get_test_maze();
        let mut engine = EvolutionEngine::new(&config, &simulation, &maze, Some(10));
        assert_eq!(engine.evolve().unwrap_err(), EvolutionError::EmptyPopulation);
    }
}
