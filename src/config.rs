use crate::evaluation::TestCase;
use crate::evolution::operators::CrossoverCut;
use crate::evolution::{EngineOptions, GenerationParams, Reproduction};
use crate::vm::engine::{ExecutionLimits, UnusedInputPolicy};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub ga: GaConfig,
    #[serde(default)]
    pub vm: VmConfig,
    pub test_cases: Vec<TestCase>,
}

/// Which genome representation the engine evolves.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    #[default]
    Variable,
    Aligned,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GaConfig {
    pub population_size: usize,
    pub genome_length: usize,
    pub num_generations: usize,
    #[serde(default = "default_elitism_fraction")]
    pub elitism_fraction: f64,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default = "default_operator_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_operator_rate")]
    pub insertion_rate: f64,
    #[serde(default = "default_operator_rate")]
    pub deletion_rate: f64,
    #[serde(default = "default_max_validation_attempts")]
    pub max_validation_attempts: usize,
    #[serde(default)]
    pub layout: LayoutKind,
    #[serde(default)]
    pub reproduction: Reproduction,
    #[serde(default = "default_true")]
    pub distinct_parents: bool,
    #[serde(default)]
    pub forbid_noop_mutation: bool,
    #[serde(default)]
    pub crossover_cut: CrossoverCut,
    /// Stop as soon as the best fitness reaches this value.
    pub target_fitness: Option<u64>,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

fn default_elitism_fraction() -> f64 {
    0.1
}

fn default_crossover_rate() -> f64 {
    0.5
}

fn default_operator_rate() -> f64 {
    0.01
}

fn default_max_validation_attempts() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

impl GaConfig {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            elitism_fraction: self.elitism_fraction,
            crossover_rate: self.crossover_rate,
            mutation_rate: self.mutation_rate,
            insertion_rate: self.insertion_rate,
            deletion_rate: self.deletion_rate,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            reproduction: self.reproduction,
            distinct_parents: self.distinct_parents,
            forbid_noop_mutation: self.forbid_noop_mutation,
            crossover_cut: self.crossover_cut,
            max_validation_attempts: self.max_validation_attempts,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct VmConfig {
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    #[serde(default = "default_max_instructions")]
    pub max_instructions: u64,
    /// Wall-clock budget shared by all test cases of one evaluation. Zero
    /// disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub unused_input: UnusedInputPolicy,
}

fn default_memory_size() -> usize {
    100
}

fn default_max_instructions() -> u64 {
    100_000
}

fn default_timeout_ms() -> Option<u64> {
    Some(10)
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            memory_size: default_memory_size(),
            max_instructions: default_max_instructions(),
            timeout_ms: default_timeout_ms(),
            unused_input: UnusedInputPolicy::default(),
        }
    }
}

impl VmConfig {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_instructions: self.max_instructions,
            timeout: self
                .timeout_ms
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis),
            unused_input: self.unused_input,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ga = &self.ga;
        if ga.population_size == 0 {
            return Err(ConfigError::Invalid(
                "population_size must be greater than 0".to_string(),
            ));
        }
        if ga.max_validation_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_validation_attempts must be greater than 0".to_string(),
            ));
        }
        let probabilities = [
            ("elitism_fraction", ga.elitism_fraction),
            ("crossover_rate", ga.crossover_rate),
            ("mutation_rate", ga.mutation_rate),
            ("insertion_rate", ga.insertion_rate),
            ("deletion_rate", ga.deletion_rate),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.vm.memory_size == 0 {
            return Err(ConfigError::Invalid(
                "vm.memory_size must be greater than 0".to_string(),
            ));
        }
        if self.vm.max_instructions == 0 {
            return Err(ConfigError::Invalid(
                "vm.max_instructions must be greater than 0".to_string(),
            ));
        }
        if self.test_cases.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[test_cases]] entry is required".to_string(),
            ));
        }
        Ok(())
    }
}
