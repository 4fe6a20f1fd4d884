use crate::config::{GaConfig, LayoutKind};
use crate::evolution::EvolutionEngine;
use crate::vm::engine::{Execution, ExecutionLimits, StopSignal, VirtualMachine, VmError};
use crate::vm::memory::Tape;
use crate::vm::op::{to_source, Gene};
use crate::vm::parser::{parse, ParseError};
use log::debug;
use rand::rngs::StdRng;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use thiserror::Error;

/// Best score a single output byte can earn.
const MAX_BYTE_SCORE: i64 = 255;
/// Weight of output closeness relative to the length and speed penalties.
const OUTPUT_SCORE_WEIGHT: i64 = 10;
/// Instruction units that cost one fitness point.
const INSTRUCTIONS_PER_PENALTY_POINT: u64 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Program does not parse: {0}")]
    Parse(#[from] ParseError),
    #[error("Test case {case} failed: {source}")]
    Execution { case: usize, source: VmError },
}

/// Input bytes and the output the evolved program should produce for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TestCase {
    #[serde(default, deserialize_with = "bytes")]
    pub input: Vec<u8>,
    #[serde(deserialize_with = "bytes")]
    pub expected: Vec<u8>,
}

impl TestCase {
    pub fn new(input: impl Into<Vec<u8>>, expected: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// Accepts either an ASCII string or an array of byte values.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytes {
    Text(String),
    Bytes(Vec<u8>),
}

fn bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    Ok(match RawBytes::deserialize(deserializer)? {
        RawBytes::Text(text) => text.into_bytes(),
        RawBytes::Bytes(bytes) => bytes,
    })
}

/// Scores how close `actual` is to `expected`.
///
/// Every expected byte the program produced earns `255 - |actual - expected|`;
/// every byte beyond the expected length costs 255.
pub fn output_score(expected: &[u8], actual: &[u8]) -> i64 {
    let matched: i64 = expected
        .iter()
        .zip(actual)
        .map(|(&e, &a)| MAX_BYTE_SCORE - (e as i64 - a as i64).abs())
        .sum();
    let surplus = actual.len().saturating_sub(expected.len()) as i64;
    matched - surplus * MAX_BYTE_SCORE
}

/// Runs genomes against a fixed set of test cases.
///
/// Each evaluation owns its tape, so one evaluator can be shared across
/// threads and called concurrently.
#[derive(Debug, Clone)]
pub struct ProgramEvaluator {
    /// Run in order; the first one alone decides validity.
    test_cases: Vec<TestCase>,
    vm: VirtualMachine,
    /// Cell count of the tape each evaluation allocates.
    memory_size: usize,
}

impl ProgramEvaluator {
    /// Creates an evaluator for a fixed task.
    ///
    /// # Arguments
    /// * `test_cases` - Input/expected-output pairs, run in order.
    /// * `limits` - Instruction budget, timeout and unused-input policy for one
    ///   whole evaluation.
    /// * `memory_size` - Tape capacity in cells. Must be non-zero.
    pub fn new(test_cases: Vec<TestCase>, limits: ExecutionLimits, memory_size: usize) -> Self {
        Self {
            test_cases,
            vm: VirtualMachine::new(limits),
            memory_size,
        }
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    /// Parses `genes` and runs it on every test case, in order.
    ///
    /// The tape is reset before each case and one timeout covers the whole
    /// evaluation.
    pub fn run_all(&self, genes: &[Gene]) -> Result<Vec<Execution>, EvaluationError> {
        self.run_cases(genes, self.test_cases.len())
    }

    fn run_cases(&self, genes: &[Gene], count: usize) -> Result<Vec<Execution>, EvaluationError> {
        let program = parse(&to_source(genes))?;
        let signal = StopSignal::with_timeout(self.vm.limits().timeout);
        let mut tape = Tape::new(self.memory_size);
        let mut executions = Vec::with_capacity(count);
        for (case, test_case) in self.test_cases.iter().take(count).enumerate() {
            tape.reset();
            let execution = self
                .vm
                .execute_with_signal(&program, &mut tape, &test_case.input, &signal)
                .map_err(|source| EvaluationError::Execution { case, source })?;
            executions.push(execution);
        }
        Ok(executions)
    }

    /// Fitness of a genome, never negative.
    ///
    /// `10 * sum of output scores - instructions / 100 - program length`,
    /// floored at zero. Null genes do not count towards the program length. Programs that fail to parse or run score zero.
    pub fn fitness(&self, genes: &[Gene]) -> u64 {
        let executions = match self.run_all(genes) {
            Ok(executions) => executions,
            Err(e) => {
                debug!("Evaluation failed: {}. Assigning zero fitness.", e);
                return 0;
            }
        };

        let score: i64 = self
            .test_cases
            .iter()
            .zip(&executions)
            .map(|(case, execution)| output_score(&case.expected, &execution.output))
            .sum();
        let instructions: u64 = executions.iter().map(|e| e.instructions).sum();
        let program_length = genes.iter().filter(|gene| !gene.is_null()).count();
        let penalty = (instructions / INSTRUCTIONS_PER_PENALTY_POINT) as i64 + program_length as i64;

        score
            .saturating_mul(OUTPUT_SCORE_WEIGHT)
            .saturating_sub(penalty)
            .max(0) as u64
    }

    /// A genome is valid when it parses and runs the first test case cleanly.
    pub fn is_valid(&self, genes: &[Gene]) -> bool {
        self.run_cases(genes, 1).is_ok()
    }

    /// True when every test case produces exactly its expected output.
    pub fn solves(&self, genes: &[Gene]) -> bool {
        match self.run_all(genes) {
            Ok(executions) => self
                .test_cases
                .iter()
                .zip(&executions)
                .all(|(case, execution)| case.expected == execution.output),
            Err(_) => false,
        }
    }
}

/// Wires an evaluator into a Brainfuck-gene engine configured by `ga`.
///
/// The evaluator scores fitness and doubles as the validator. The aligned
/// layout pads with `Gene::Null`.
pub fn build_engine(ga: &GaConfig, evaluator: Arc<ProgramEvaluator>) -> EvolutionEngine<Gene> {
    let factory = |rng: &mut StdRng| Gene::random(rng);
    let scorer = Arc::clone(&evaluator);
    let fitness = move |genes: &[Gene]| scorer.fitness(genes);
    let engine = match ga.layout {
        LayoutKind::Variable => EvolutionEngine::variable_length(factory, fitness),
        LayoutKind::Aligned => EvolutionEngine::aligned(Gene::Null, factory, fitness),
    };
    let engine = engine
        .with_validator(move |genes: &[Gene]| evaluator.is_valid(genes))
        .with_options(ga.engine_options());
    match ga.seed {
        Some(seed) => engine.with_seed(seed),
        None => engine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::op::from_source;

    fn evaluator(test_cases: Vec<TestCase>) -> ProgramEvaluator {
        ProgramEvaluator::new(test_cases, ExecutionLimits::default(), 100)
    }

    #[test]
    fn test_output_score() {
        assert_eq!(output_score(b"A", b"A"), 255);
        assert_eq!(output_score(b"A", b"C"), 253);
        assert_eq!(output_score(b"AB", b"A"), 255);
        assert_eq!(output_score(b"A", b"AAA"), 255 - 2 * 255);
        assert_eq!(output_score(b"", b""), 0);
    }

    #[test]
    fn test_fitness_of_perfect_echo() {
        let eval = evaluator(vec![TestCase::new([7u8], [7u8])]);
        let genes = from_source(",.");
        // 10 * 255 - 2 / 100 - 2
        assert_eq!(eval.fitness(&genes), 2548);
        assert!(eval.solves(&genes));
    }

    #[test]
    fn test_fitness_is_zero_on_errors() {
        let eval = evaluator(vec![TestCase::new([7u8], [7u8])]);
        // Unused input.
        assert_eq!(eval.fitness(&from_source("+.")), 0);
        // Unmatched loop end.
        assert_eq!(eval.fitness(&from_source(",.]")), 0);
        // Infinite loop.
        assert_eq!(eval.fitness(&from_source(",[]")), 0);
    }

    #[test]
    fn test_fitness_floors_at_zero() {
        let eval = evaluator(vec![TestCase::new([], [])]);
        // Surplus output drives the score negative.
        assert_eq!(eval.fitness(&from_source("....")), 0);
    }

    #[test]
    fn test_null_genes_cost_nothing() {
        let eval = evaluator(vec![TestCase::new([7u8], [7u8])]);
        let genes = vec![Gene::Null, Gene::Input, Gene::Null, Gene::Output, Gene::Null];
        assert!(eval.solves(&genes));
        assert_eq!(eval.fitness(&genes), 2548);
    }

    #[test]
    fn test_tape_is_reset_between_cases() {
        let eval = evaluator(vec![
            TestCase::new([], [1u8]),
            TestCase::new([], [1u8]),
        ]);
        assert!(eval.solves(&from_source("+.")));
    }

    #[test]
    fn test_validity_uses_first_case_only() {
        let eval = evaluator(vec![
            TestCase::new([], [1u8]),
            TestCase::new([9u8], [1u8]),
        ]);
        let genes = from_source("+.");
        assert!(eval.is_valid(&genes));
        // The second case leaves its input unread.
        assert!(!eval.solves(&genes));
        assert!(!eval.is_valid(&from_source("[")));
    }

    #[test]
    fn test_run_all_reports_failing_case() {
        let eval = evaluator(vec![TestCase::new([], []), TestCase::new([1u8], [])]);
        assert_eq!(
            eval.run_all(&from_source("")),
            Err(EvaluationError::Execution {
                case: 1,
                source: VmError::UnusedInput { remaining: 1 },
            })
        );
    }

    #[test]
    fn test_built_engine_population_is_valid() {
        let config = crate::config::Config::from_toml_str(
            r#"
            [ga]
            population_size = 12
            genome_length = 6
            num_generations = 3
            layout = "aligned"
            seed = 5

            [vm]
            timeout_ms = 0

            [[test_cases]]
            expected = "A"
            "#,
        )
        .unwrap();
        let eval = Arc::new(ProgramEvaluator::new(
            config.test_cases.clone(),
            config.vm.limits(),
            config.vm.memory_size,
        ));
        let mut engine = build_engine(&config.ga, Arc::clone(&eval));
        engine.initialize_population(12, 6).unwrap();
        assert!(engine.population().iter().all(|g| eval.is_valid(g)));

        let params = config.ga.generation_params();
        engine.evolve(&params, 3, |_| false).unwrap();
        assert_eq!(engine.generation(), 3);
        let width = engine.population()[0].len();
        assert!(engine.population().iter().all(|g| g.len() == width));
    }

    #[test]
    fn test_test_case_from_toml() {
        #[derive(Deserialize)]
        struct Cases {
            test_cases: Vec<TestCase>,
        }
        let cases: Cases = toml::from_str(
            r#"
            [[test_cases]]
            expected = "ping"

            [[test_cases]]
            input = [97, 194]
            expected = [35]
            "#,
        )
        .unwrap();
        assert_eq!(cases.test_cases[0], TestCase::new([], *b"ping"));
        assert_eq!(cases.test_cases[1], TestCase::new([97u8, 194], [35u8]));
    }
}
