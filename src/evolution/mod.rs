pub mod operators;
pub mod pool;
pub mod selection;

use crate::evolution::operators::{
    crossover_fixed, crossover_variable, mutate_aligned, mutate_variable, CrossoverCut,
    MutationRates,
};
use crate::evolution::pool::GenePool;
use crate::evolution::selection::{
    average_fitness, rank, select_weighted, GenerationStatistics, IndividualStatistics,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Re-draws of the second parent when distinct parents are required.
const MAX_PARENT_RESAMPLES: usize = 32;

/// Alias within crate for genome representation
pub type Genome<G> = Vec<G>;

pub type GeneFactory<G> = Arc<dyn Fn(&mut StdRng) -> G + Send + Sync>;
pub type FitnessFunction<G> = Arc<dyn Fn(&[G]) -> u64 + Send + Sync>;
pub type Validator<G> = Arc<dyn Fn(&[G]) -> bool + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvolutionError {
    #[error("Population has not been initialized")]
    Uninitialized,
    #[error("Population size must be at least one")]
    EmptyPopulation,
    #[error("No valid individual found after {attempts} attempts")]
    ValidationExhausted { attempts: usize },
}

/// How genomes are laid out across a population.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout<G> {
    /// Lengths drift freely: deletion removes genes and crossover mixes lengths.
    Variable,
    /// Every genome shares one length. Deletion writes `null_gene` and an
    /// insertion widens the whole population at once.
    Aligned { null_gene: G },
}

/// Which reproduction scheme fills the non-elite slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reproduction {
    /// Crossover with probability `crossover_rate`, otherwise clone one parent.
    #[default]
    Crossover,
    /// Every offspring is a crossover of two parents.
    AlwaysCrossover,
}

/// Engine behaviour fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub reproduction: Reproduction,
    /// Re-sample the second parent until it differs from the first.
    pub distinct_parents: bool,
    /// Point mutation must change the gene it hits.
    pub forbid_noop_mutation: bool,
    pub crossover_cut: CrossoverCut,
    /// Upper bound on fresh genomes drawn while searching for a valid one.
    pub max_validation_attempts: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            reproduction: Reproduction::Crossover,
            distinct_parents: true,
            forbid_noop_mutation: false,
            crossover_cut: CrossoverCut::LeftLength,
            max_validation_attempts: 10_000,
        }
    }
}

/// Knobs of a single generation transition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationParams {
    /// Share of the population copied unchanged, rounded up.
    pub elitism_fraction: f64,
    /// Only used by `Reproduction::Crossover`.
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub insertion_rate: f64,
    pub deletion_rate: f64,
}

impl GenerationParams {
    fn mutation_rates(&self) -> MutationRates {
        MutationRates {
            mutation: self.mutation_rate,
            insertion: self.insertion_rate,
            deletion: self.deletion_rate,
        }
    }
}

/// Orchestrates the evolution of a population of gene sequences.
///
/// The engine starts empty; `initialize_population` fills it and every call
/// to `compute_next_generation` replaces it wholesale. Statistics always
/// describe the current population.
#[derive(Clone)]
pub struct EvolutionEngine<G> {
    gene_factory: GeneFactory<G>,
    /// Rejects genomes during initialization and crossover when set.
    validator: Option<Validator<G>>,
    fitness: FitnessFunction<G>,
    layout: Layout<G>,
    options: EngineOptions,
    /// Single source of randomness for every engine decision.
    rng: StdRng,
    /// Empty until `initialize_population` succeeds.
    population: Vec<Genome<G>>,
    /// Ranked by descending fitness.
    statistics: Vec<IndividualStatistics>,
    generation: usize,
}

impl<G> EvolutionEngine<G>
where
    G: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates an engine with no population yet.
    ///
    /// # Arguments
    /// * `layout` - How genome lengths behave under mutation.
    /// * `gene_factory` - Draws one random gene. Must never return the null gene.
    /// * `fitness` - Scores a genome. Called concurrently, so it must be pure.
    pub fn new<F, S>(layout: Layout<G>, gene_factory: F, fitness: S) -> Self
    where
        F: Fn(&mut StdRng) -> G + Send + Sync + 'static,
        S: Fn(&[G]) -> u64 + Send + Sync + 'static,
    {
        Self {
            gene_factory: Arc::new(gene_factory),
            validator: None,
            fitness: Arc::new(fitness),
            layout,
            options: EngineOptions::default(),
            rng: StdRng::from_os_rng(),
            population: Vec::new(),
            statistics: Vec::new(),
            generation: 0,
        }
    }

    /// Engine whose genomes grow and shrink freely.
    ///
    /// # Arguments
    /// * `gene_factory` - Draws one random gene.
    /// * `fitness` - Scores a genome.
    pub fn variable_length<F, S>(gene_factory: F, fitness: S) -> Self
    where
        F: Fn(&mut StdRng) -> G + Send + Sync + 'static,
        S: Fn(&[G]) -> u64 + Send + Sync + 'static,
    {
        Self::new(Layout::Variable, gene_factory, fitness)
    }

    /// Engine whose genomes always share one length.
    ///
    /// # Arguments
    /// * `null_gene` - Placeholder for "no gene here". Deletion writes it and
    ///   insertion pads the other rows with it. Fitness should treat it as a
    ///   no-op.
    /// * `gene_factory` - Draws one random gene. Must never return `null_gene`.
    /// * `fitness` - Scores a genome.
    pub fn aligned<F, S>(null_gene: G, gene_factory: F, fitness: S) -> Self
    where
        F: Fn(&mut StdRng) -> G + Send + Sync + 'static,
        S: Fn(&[G]) -> u64 + Send + Sync + 'static,
    {
        Self::new(Layout::Aligned { null_gene }, gene_factory, fitness)
    }

    /// Rejects genomes during initialization and crossover.
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&[G]) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Makes every random decision of the engine reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn is_initialized(&self) -> bool {
        !self.population.is_empty()
    }

    pub fn population(&self) -> &[Genome<G>] {
        &self.population
    }

    /// Per-individual statistics, ranked by descending fitness.
    pub fn statistics(&self) -> &[IndividualStatistics] {
        &self.statistics
    }

    /// Number of completed generation transitions.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Builds the initial population and scores it.
    ///
    /// Each genome is `genome_length` freshly drawn genes. With a validator
    /// configured, genomes are redrawn until one passes, at most
    /// `max_validation_attempts` times per slot.
    pub fn initialize_population(
        &mut self,
        size: usize,
        genome_length: usize,
    ) -> Result<(), EvolutionError> {
        if size == 0 {
            return Err(EvolutionError::EmptyPopulation);
        }
        info!(
            "Initializing population of {} genomes with {} genes each...",
            size, genome_length
        );

        let mut population = Vec::with_capacity(size);
        for _ in 0..size {
            population.push(self.create_valid_genome(genome_length)?);
        }
        self.population = population;
        self.generation = 0;
        self.refresh_statistics();
        Ok(())
    }

    fn create_valid_genome(&mut self, genome_length: usize) -> Result<Genome<G>, EvolutionError> {
        let attempts = self.options.max_validation_attempts.max(1);
        for attempt in 1..=attempts {
            let genome: Genome<G> = (0..genome_length)
                .map(|_| (self.gene_factory)(&mut self.rng))
                .collect();
            if self.is_valid(&genome) {
                return Ok(genome);
            }
            debug!("Initial genome rejected by validator (attempt {})", attempt);
        }
        Err(EvolutionError::ValidationExhausted { attempts })
    }

    fn is_valid(&self, genome: &[G]) -> bool {
        self.validator.as_ref().map_or(true, |validate| validate(genome))
    }

    /// Scores every genome of the current population in parallel, in
    /// population order.
    pub fn evaluate_population(&self) -> Vec<u64> {
        let fitness = &self.fitness;
        self.population
            .par_iter()
            .map(|genome| fitness(genome.as_slice()))
            .collect()
    }

    fn refresh_statistics(&mut self) {
        let fitness = self.evaluate_population();
        self.statistics = rank(&fitness);
    }

    /// Summary of the current population.
    pub fn generation_statistics(&self) -> Result<GenerationStatistics<G>, EvolutionError> {
        let best = self.statistics.first().ok_or(EvolutionError::Uninitialized)?;
        Ok(GenerationStatistics {
            generation: self.generation,
            average_fitness: average_fitness(&self.statistics),
            best_fitness: best.fitness,
            best_genome: self.population[best.index].clone(),
        })
    }

    /// Replaces the population with the next generation and rescores it.
    ///
    /// Elites (the top `ceil(elitism_fraction * size)` genomes) are copied
    /// unchanged. The remaining slots are bred by weighted selection and
    /// crossover according to the engine options, then mutated.
    pub fn compute_next_generation(
        &mut self,
        params: &GenerationParams,
    ) -> Result<(), EvolutionError> {
        if !self.is_initialized() {
            return Err(EvolutionError::Uninitialized);
        }
        let size = self.population.len();
        let elite_count = ((params.elitism_fraction * size as f64).ceil() as usize).min(size);

        let elites: Vec<Genome<G>> = self.statistics[..elite_count]
            .iter()
            .map(|stats| self.population[stats.index].clone())
            .collect();

        let mut offspring = Vec::with_capacity(size - elite_count);
        for _ in elite_count..size {
            let child = self.breed(params.crossover_rate);
            offspring.push(child);
        }

        let next_generation = self.mutate_offspring(elites, offspring, &params.mutation_rates());
        assert_eq!(
            next_generation.len(),
            size,
            "generation transition changed the population size"
        );

        self.population = next_generation;
        self.generation += 1;
        self.refresh_statistics();
        Ok(())
    }

    /// Concatenates elites and mutated offspring, elites first.
    fn mutate_offspring(
        &mut self,
        elites: Vec<Genome<G>>,
        mut offspring: Vec<Genome<G>>,
        rates: &MutationRates,
    ) -> Vec<Genome<G>> {
        let forbid_noop = self.options.forbid_noop_mutation;
        let factory = self.gene_factory.as_ref();
        match &self.layout {
            Layout::Variable => {
                for genome in offspring.iter_mut() {
                    mutate_variable(genome, rates, factory, forbid_noop, &mut self.rng);
                }
                let mut next_generation = elites;
                next_generation.extend(offspring);
                next_generation
            }
            Layout::Aligned { null_gene } => {
                let elite_count = elites.len();
                let mut rows = elites;
                rows.extend(offspring);
                let total = rows.len();
                let mut pool = GenePool::from_rows(rows);
                mutate_aligned(
                    &mut pool,
                    elite_count..total,
                    rates,
                    null_gene,
                    factory,
                    forbid_noop,
                    &mut self.rng,
                );
                pool.into_rows()
            }
        }
    }

    fn breed(&mut self, crossover_rate: f64) -> Genome<G> {
        let crossover = match self.options.reproduction {
            Reproduction::AlwaysCrossover => true,
            Reproduction::Crossover => self.rng.random::<f64>() < crossover_rate,
        };
        if crossover {
            self.crossover_until_valid()
        } else {
            let parent = self.select_parent();
            self.population[parent].clone()
        }
    }

    /// Crosses weighted-selected parents until the child passes the validator.
    ///
    /// After `max_validation_attempts` failures a selected parent is cloned
    /// instead, so a generation always completes.
    fn crossover_until_valid(&mut self) -> Genome<G> {
        let attempts = self.options.max_validation_attempts.max(1);
        for attempt in 1..=attempts {
            let (left, right) = self.select_parents();
            let child = self.crossover(left, right);
            if self.is_valid(&child) {
                return child;
            }
            debug!("Crossover child rejected by validator (attempt {})", attempt);
        }
        warn!(
            "No valid crossover child after {} attempts, cloning a parent instead",
            attempts
        );
        let parent = self.select_parent();
        self.population[parent].clone()
    }

    fn crossover(&mut self, left: usize, right: usize) -> Genome<G> {
        let left = &self.population[left];
        let right = &self.population[right];
        match self.layout {
            Layout::Variable => {
                crossover_variable(left, right, self.options.crossover_cut, &mut self.rng)
            }
            Layout::Aligned { .. } => crossover_fixed(left, right, &mut self.rng),
        }
    }

    fn select_parent(&mut self) -> usize {
        select_weighted(&self.statistics, &mut self.rng)
    }

    fn select_parents(&mut self) -> (usize, usize) {
        let left = self.select_parent();
        let mut right = self.select_parent();
        if self.options.distinct_parents && self.population.len() > 1 {
            for _ in 0..MAX_PARENT_RESAMPLES {
                if right != left {
                    break;
                }
                right = self.select_parent();
            }
        }
        (left, right)
    }

    /// Runs up to `max_generations` transitions, logging one line per
    /// generation, and stops early once `should_stop` accepts the statistics
    /// of the current population.
    ///
    /// # Returns
    /// * `Result<GenerationStatistics<G>, EvolutionError>` - Statistics of the
    ///   last population.
    pub fn evolve<F>(
        &mut self,
        params: &GenerationParams,
        max_generations: usize,
        mut should_stop: F,
    ) -> Result<GenerationStatistics<G>, EvolutionError>
    where
        F: FnMut(&GenerationStatistics<G>) -> bool,
    {
        let mut stats = self.generation_statistics()?;
        for _ in 0..max_generations {
            if should_stop(&stats) {
                info!("Stop condition met at generation {}", stats.generation);
                return Ok(stats);
            }
            self.compute_next_generation(params)?;
            stats = self.generation_statistics()?;
            let avg_genome_len = self.population.iter().map(Vec::len).sum::<usize>() as f64
                / self.population.len() as f64;
            info!(
                "Gen {}: Best Fitness={} | Avg Fitness={} | Avg Genome Len={:.1}",
                stats.generation, stats.best_fitness, stats.average_fitness, avg_genome_len
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Genes are digits 1..=9, 0 is the null gene. Fitness is the digit sum.
    fn digit(rng: &mut StdRng) -> u8 {
        rng.random_range(1..=9)
    }

    fn digit_sum(genome: &[u8]) -> u64 {
        genome.iter().map(|&g| g as u64).sum()
    }

    fn variable_engine() -> EvolutionEngine<u8> {
        EvolutionEngine::variable_length(digit, digit_sum).with_seed(7)
    }

    fn aligned_engine() -> EvolutionEngine<u8> {
        EvolutionEngine::aligned(0, digit, digit_sum)
            .with_options(EngineOptions {
                reproduction: Reproduction::AlwaysCrossover,
                ..EngineOptions::default()
            })
            .with_seed(7)
    }

    fn get_test_params() -> GenerationParams {
        GenerationParams {
            elitism_fraction: 0.1,
            crossover_rate: 0.5,
            mutation_rate: 0.05,
            insertion_rate: 0.05,
            deletion_rate: 0.05,
        }
    }

    #[test]
    fn test_initialize_population() {
        let mut engine = variable_engine();
        assert!(!engine.is_initialized());
        engine.initialize_population(20, 8).unwrap();

        assert_eq!(engine.population().len(), 20);
        assert!(engine.population().iter().all(|g| g.len() == 8));
        assert_eq!(engine.statistics().len(), 20);
        assert_eq!(engine.generation(), 0);

        let stats = engine.generation_statistics().unwrap();
        assert_eq!(stats.best_fitness, digit_sum(&stats.best_genome));
        assert!(engine
            .population()
            .iter()
            .all(|g| digit_sum(g) <= stats.best_fitness));
    }

    #[test]
    fn test_empty_population_rejected() {
        let mut engine = variable_engine();
        assert_eq!(
            engine.initialize_population(0, 8),
            Err(EvolutionError::EmptyPopulation)
        );
    }

    #[test]
    fn test_uninitialized_engine() {
        let mut engine = variable_engine();
        assert_eq!(
            engine.compute_next_generation(&get_test_params()),
            Err(EvolutionError::Uninitialized)
        );
        assert_eq!(
            engine.generation_statistics().unwrap_err(),
            EvolutionError::Uninitialized
        );
    }

    #[test]
    fn test_validator_filters_initial_population() {
        let mut engine = variable_engine().with_validator(|g: &[u8]| g[0] == 9);
        engine.initialize_population(10, 4).unwrap();
        assert!(engine.population().iter().all(|g| g[0] == 9));
    }

    #[test]
    fn test_validation_exhausted() {
        let mut engine = variable_engine()
            .with_validator(|_: &[u8]| false)
            .with_options(EngineOptions {
                max_validation_attempts: 5,
                ..EngineOptions::default()
            });
        assert_eq!(
            engine.initialize_population(3, 4),
            Err(EvolutionError::ValidationExhausted { attempts: 5 })
        );
    }

    #[test]
    fn test_population_size_maintained_through_generations() {
        let mut engine = variable_engine();
        engine.initialize_population(15, 6).unwrap();
        let params = GenerationParams {
            elitism_fraction: 0.2,
            crossover_rate: 0.7,
            mutation_rate: 0.2,
            insertion_rate: 0.2,
            deletion_rate: 0.2,
        };
        for _ in 0..10 {
            engine.compute_next_generation(&params).unwrap();
            assert_eq!(engine.population().len(), 15);
            assert_eq!(engine.statistics().len(), 15);
        }
        assert_eq!(engine.generation(), 10);
    }

    #[test]
    fn test_full_elitism_keeps_population() {
        let mut engine = variable_engine();
        engine.initialize_population(10, 5).unwrap();
        let before: Vec<Genome<u8>> = engine
            .statistics()
            .iter()
            .map(|s| engine.population()[s.index].clone())
            .collect();
        let params = GenerationParams {
            elitism_fraction: 1.0,
            ..get_test_params()
        };
        engine.compute_next_generation(&params).unwrap();
        // Elites come first, in rank order.
        assert_eq!(engine.population(), before.as_slice());
    }

    #[test]
    fn test_elitism_keeps_best_fitness_non_decreasing() {
        let mut engine = variable_engine();
        engine.initialize_population(20, 6).unwrap();
        let mut best = engine.generation_statistics().unwrap().best_fitness;
        for _ in 0..25 {
            engine.compute_next_generation(&get_test_params()).unwrap();
            let next = engine.generation_statistics().unwrap().best_fitness;
            assert!(next >= best, "best fitness dropped from {best} to {next}");
            best = next;
        }
    }

    #[test]
    fn test_zero_rates_clone_parents_exactly() {
        let mut engine = variable_engine();
        engine.initialize_population(12, 6).unwrap();
        let previous = engine.population().to_vec();
        let params = GenerationParams {
            elitism_fraction: 0.0,
            crossover_rate: 0.0,
            mutation_rate: 0.0,
            insertion_rate: 0.0,
            deletion_rate: 0.0,
        };
        engine.compute_next_generation(&params).unwrap();
        for genome in engine.population() {
            assert!(previous.contains(genome));
        }
    }

    #[test]
    fn test_zero_fitness_population_still_breeds() {
        let mut engine =
            EvolutionEngine::variable_length(digit, |_: &[u8]| 0).with_seed(3);
        engine.initialize_population(8, 4).unwrap();
        engine.compute_next_generation(&get_test_params()).unwrap();
        let stats = engine.generation_statistics().unwrap();
        assert_eq!(stats.best_fitness, 0);
        assert_eq!(stats.average_fitness, 0);
        assert_eq!(engine.population().len(), 8);
    }

    #[test]
    fn test_aligned_layout_keeps_genomes_rectangular() {
        let mut engine = aligned_engine();
        engine.initialize_population(10, 6).unwrap();
        let params = GenerationParams {
            elitism_fraction: 0.2,
            crossover_rate: 1.0,
            mutation_rate: 0.1,
            insertion_rate: 0.05,
            deletion_rate: 0.1,
        };
        for _ in 0..10 {
            engine.compute_next_generation(&params).unwrap();
            let lengths: Vec<usize> = engine.population().iter().map(Vec::len).collect();
            assert!(lengths.iter().all(|&l| l == lengths[0]), "ragged: {lengths:?}");
        }
    }

    #[test]
    fn test_aligned_width_stays_bounded() {
        let mut engine = EvolutionEngine::aligned(0, digit, |_: &[u8]| 1)
            .with_options(EngineOptions {
                reproduction: Reproduction::AlwaysCrossover,
                ..EngineOptions::default()
            })
            .with_seed(11);
        engine.initialize_population(30, 8).unwrap();
        for _ in 0..40 {
            engine.compute_next_generation(&get_test_params()).unwrap();
            let population = engine.population();
            let width = population[0].len();
            // Every column carries at least one real gene.
            for column in 0..width {
                assert!(population.iter().any(|genome| genome[column] != 0));
            }
            let occupied = population.iter().flatten().filter(|&&g| g != 0).count();
            assert!(width <= occupied);
            assert!(width <= 30 * 8 * 4, "width grew to {width}");
        }
    }

    #[test]
    fn test_variable_layout_never_produces_null_genes() {
        let mut engine = variable_engine();
        engine.initialize_population(10, 6).unwrap();
        let params = GenerationParams {
            elitism_fraction: 0.1,
            crossover_rate: 0.9,
            mutation_rate: 0.3,
            insertion_rate: 0.3,
            deletion_rate: 0.3,
        };
        for _ in 0..10 {
            engine.compute_next_generation(&params).unwrap();
        }
        assert!(engine.population().iter().flatten().all(|&g| g != 0));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let mut engine = variable_engine();
            engine.initialize_population(10, 6).unwrap();
            for _ in 0..5 {
                engine.compute_next_generation(&get_test_params()).unwrap();
            }
            engine.population().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_evolve_stops_on_condition() {
        let mut engine = variable_engine();
        engine.initialize_population(20, 6).unwrap();
        let stats = engine
            .evolve(&get_test_params(), 100, |stats| stats.generation >= 3)
            .unwrap();
        assert_eq!(stats.generation, 3);
        assert_eq!(engine.generation(), 3);
    }

    #[test]
    fn test_evolve_improves_digit_sum() {
        let mut engine = aligned_engine();
        engine.initialize_population(30, 8).unwrap();
        let initial = engine.generation_statistics().unwrap().best_fitness;
        let stats = engine
            .evolve(&get_test_params(), 40, |_| false)
            .unwrap();
        assert_eq!(stats.generation, 40);
        assert!(stats.best_fitness >= initial);
    }
}
