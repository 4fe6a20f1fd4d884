use rand::rngs::StdRng;
use rand::Rng;

/// Fitness bookkeeping for one member of the current population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndividualStatistics {
    /// Position of the genome in the population.
    pub index: usize,
    pub fitness: u64,
    /// `fitness / total fitness`, NaN when the population's total is zero.
    pub normalized_fitness: f64,
    /// Running sum of `normalized_fitness` in rank order.
    pub cumulative_normalized_fitness: f64,
}

/// Summary of one generation, handed to callers as a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStatistics<G> {
    /// Number of completed generation transitions (0 right after initialization).
    pub generation: usize,
    pub average_fitness: u64,
    pub best_fitness: u64,
    pub best_genome: Vec<G>,
}

/// Ranks a population by fitness.
///
/// Returns one entry per individual, sorted by descending fitness (stable, so
/// ties keep population order), with normalized and cumulative normalized
/// fitness filled in.
pub fn rank(fitness: &[u64]) -> Vec<IndividualStatistics> {
    let total: u128 = fitness.iter().map(|&f| f as u128).sum();
    let mut ranked: Vec<IndividualStatistics> = fitness
        .iter()
        .enumerate()
        .map(|(index, &fitness)| IndividualStatistics {
            index,
            fitness,
            // 0 / 0 is NaN, which flags the uniform-selection fallback.
            normalized_fitness: fitness as f64 / total as f64,
            cumulative_normalized_fitness: 0.0,
        })
        .collect();

    ranked.sort_by(|a, b| b.fitness.cmp(&a.fitness));

    let mut cumulative = 0.0;
    for stats in ranked.iter_mut() {
        cumulative += stats.normalized_fitness;
        stats.cumulative_normalized_fitness = cumulative;
    }
    ranked
}

/// Mean fitness, rounded half to even.
pub fn average_fitness(ranked: &[IndividualStatistics]) -> u64 {
    if ranked.is_empty() {
        return 0;
    }
    let total: u128 = ranked.iter().map(|s| s.fitness as u128).sum();
    (total as f64 / ranked.len() as f64).round_ties_even() as u64
}

/// True when every individual scored zero and weights are meaningless.
pub fn is_degenerate(ranked: &[IndividualStatistics]) -> bool {
    ranked
        .first()
        .map_or(true, |best| best.normalized_fitness.is_nan())
}

/// Finds the population index picked by `threshold` in `[0, 1)`.
///
/// Binary searches for the first ranked individual whose cumulative share is
/// at least `threshold`. When rounding leaves the last cumulative value just
/// under the threshold, the lowest-ranked individual with a non-zero share is
/// returned.
///
/// # Panics
/// Panics if no individual has a positive share; callers check
/// `is_degenerate` first.
pub fn select_by_threshold(ranked: &[IndividualStatistics], threshold: f64) -> usize {
    let position = ranked.partition_point(|s| s.cumulative_normalized_fitness < threshold);
    if let Some(stats) = ranked.get(position) {
        return stats.index;
    }
    ranked
        .iter()
        .rev()
        .find(|s| s.normalized_fitness > 0.0)
        .map(|s| s.index)
        .expect("weighted selection found no individual with positive fitness")
}

/// Fitness-proportionate selection, uniform when the total fitness is zero.
///
/// # Arguments
/// * `ranked` - Output of `rank` for the current population.
/// * `rng` - Source of the selection threshold.
///
/// # Returns
/// * `usize` - Population index of the chosen individual.
pub fn select_weighted(ranked: &[IndividualStatistics], rng: &mut StdRng) -> usize {
    assert!(!ranked.is_empty(), "cannot select from an empty population");
    if is_degenerate(ranked) {
        return ranked[rng.random_range(0..ranked.len())].index;
    }
    select_by_threshold(ranked, rng.random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    #[test]
    fn test_rank_orders_by_descending_fitness() {
        let ranked = rank(&[1, 5, 0, 3, 5]);
        let order: Vec<usize> = ranked.iter().map(|s| s.index).collect();
        // Ties keep population order.
        assert_eq!(order, vec![1, 4, 3, 0, 2]);
        assert!((ranked[0].normalized_fitness - 5.0 / 14.0).abs() < 1e-12);
        assert!((ranked.last().unwrap().cumulative_normalized_fitness - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_fitness_is_degenerate() {
        let ranked = rank(&[0, 0, 0]);
        assert!(is_degenerate(&ranked));
        assert!(ranked.iter().all(|s| s.normalized_fitness.is_nan()));

        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[select_weighted(&ranked, &mut rng)] = true;
        }
        assert_eq!(seen, [true; 3]);
    }

    #[test]
    fn test_threshold_zero_picks_best() {
        let ranked = rank(&[2, 9, 4]);
        assert_eq!(select_by_threshold(&ranked, 0.0), 1);
    }

    #[test]
    fn test_threshold_near_one_picks_lowest_nonzero() {
        let ranked = rank(&[2, 9, 0, 4]);
        assert_eq!(select_by_threshold(&ranked, 0.999_999_999), 0);
        // Past the last cumulative value, the fallback still lands on it.
        assert_eq!(select_by_threshold(&ranked, 1.0 + 1e-9), 0);
    }

    #[test]
    fn test_selection_frequencies_follow_weights() {
        let ranked = rank(&[1, 3]);
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 20_000;
        let heavy = (0..draws)
            .filter(|_| select_weighted(&ranked, &mut rng) == 1)
            .count();
        let share = heavy as f64 / draws as f64;
        assert!((share - 0.75).abs() < 0.03, "share was {share}");
    }

    #[test]
    fn test_average_rounds_half_to_even() {
        assert_eq!(average_fitness(&rank(&[1, 2])), 2);
        assert_eq!(average_fitness(&rank(&[2, 3])), 2);
        assert_eq!(average_fitness(&rank(&[4, 5])), 4);
        assert_eq!(average_fitness(&rank(&[1, 1, 2])), 1);
        assert_eq!(average_fitness(&[]), 0);
    }

    #[test]
    fn test_huge_fitness_values_do_not_overflow() {
        let half = u64::MAX / 2 + 1;
        let ranked = rank(&[half, half]);
        assert!((ranked[0].normalized_fitness - 0.5).abs() < 1e-12);
        assert!((ranked[1].cumulative_normalized_fitness - 1.0).abs() < 1e-12);
        assert!(average_fitness(&ranked) > 0);
    }

    proptest! {
        #[test]
        fn cumulative_fitness_is_monotonic_and_ends_at_one(
            fitness in proptest::collection::vec(0u64..10_000, 1..64)
        ) {
            let ranked = rank(&fitness);
            prop_assert_eq!(ranked.len(), fitness.len());
            if fitness.iter().sum::<u64>() > 0 {
                for pair in ranked.windows(2) {
                    prop_assert!(pair[0].cumulative_normalized_fitness <= pair[1].cumulative_normalized_fitness);
                    prop_assert!(pair[0].fitness >= pair[1].fitness);
                }
                let last = ranked.last().unwrap().cumulative_normalized_fitness;
                prop_assert!((last - 1.0).abs() < 1e-9);
            } else {
                prop_assert!(is_degenerate(&ranked));
            }
        }

        #[test]
        fn selected_individual_has_positive_fitness(
            fitness in proptest::collection::vec(0u64..100, 1..32),
            threshold in 0.0f64..1.0,
        ) {
            prop_assume!(fitness.iter().any(|&f| f > 0));
            let ranked = rank(&fitness);
            let chosen = select_by_threshold(&ranked, threshold);
            prop_assert!(fitness[chosen] > 0);
        }
    }
}
