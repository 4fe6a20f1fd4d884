use genetic_brainfuck::config::Config;
use genetic_brainfuck::evaluation::{build_engine, ProgramEvaluator};
use genetic_brainfuck::vm::op::to_source;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::init();
    log::info!("Booting genetic_brainfuck...");

    // 1. Load and Validate Configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!(
        "Configuration loaded from '{}' with {} test case(s).",
        config_path.display(),
        config.test_cases.len()
    );

    // 2. Build Evaluator and Engine
    let evaluator = Arc::new(ProgramEvaluator::new(
        config.test_cases.clone(),
        config.vm.limits(),
        config.vm.memory_size,
    ));
    let mut engine = build_engine(&config.ga, Arc::clone(&evaluator));

    if let Err(e) = engine.initialize_population(config.ga.population_size, config.ga.genome_length)
    {
        log::error!("Failed to initialize population: {}", e);
        process::exit(1);
    }

    // 3. Run the Evolution
    log::info!("--- Starting Evolution ---");
    let params = config.ga.generation_params();
    let target = config.ga.target_fitness;
    let result = engine.evolve(&params, config.ga.num_generations, |stats| {
        target.is_some_and(|t| stats.best_fitness >= t) || evaluator.solves(&stats.best_genome)
    });
    let best = match result {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("Evolution failed: {}", e);
            process::exit(1);
        }
    };

    // 4. Report the Champion
    log::info!("--- Evolution Complete ---");
    let solved = evaluator.solves(&best.best_genome);
    println!(
        "Generation {} | Fitness: {} | Solved: {}",
        best.generation, best.best_fitness, solved
    );
    println!("{}", to_source(&best.best_genome));
    match evaluator.run_all(&best.best_genome) {
        Ok(executions) => {
            for (case, execution) in evaluator.test_cases().iter().zip(&executions) {
                println!(
                    "  input {:?} -> {:?} (expected {:?}, {} instructions)",
                    String::from_utf8_lossy(&case.input),
                    String::from_utf8_lossy(&execution.output),
                    String::from_utf8_lossy(&case.expected),
                    execution.instructions
                );
            }
        }
        Err(e) => println!("  - Champion failed to run: {}", e),
    }
}
