use crate::evolution::pool::GenePool;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;
use std::ops::Range;

/// Redraws allowed when a point mutation must change the gene.
const MAX_REDRAWS: usize = 16;

/// Per-gene probabilities of the structural mutation operators.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MutationRates {
    pub mutation: f64,
    pub insertion: f64,
    pub deletion: f64,
}

/// How the variable-length crossover places its cut in the right parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverCut {
    /// Both cuts are `ceil(left.len() * ratio)`. Long-standing behaviour.
    #[default]
    LeftLength,
    /// The right cut is `ceil(right.len() * ratio)`.
    OwnLength,
}

/// Cut points of the variable-length crossover for a ratio in `[0, 1)`.
pub fn variable_cut_points(
    left_len: usize,
    right_len: usize,
    ratio: f64,
    cut: CrossoverCut,
) -> (usize, usize) {
    let left_cut = (left_len as f64 * ratio).ceil() as usize;
    let right_cut = match cut {
        CrossoverCut::LeftLength => left_cut,
        CrossoverCut::OwnLength => (right_len as f64 * ratio).ceil() as usize,
    };
    (left_cut.min(left_len), right_cut.min(right_len))
}

/// Single-point crossover for parents of any length.
///
/// The child takes the left parent's genes before its cut followed by the
/// right parent's genes from its cut onward, so its length may differ from
/// both parents.
pub fn crossover_variable<G: Clone>(
    left: &[G],
    right: &[G],
    cut: CrossoverCut,
    rng: &mut StdRng,
) -> Vec<G> {
    let ratio = rng.random::<f64>();
    let (left_cut, right_cut) = variable_cut_points(left.len(), right.len(), ratio, cut);
    left[..left_cut]
        .iter()
        .chain(&right[right_cut..])
        .cloned()
        .collect()
}

/// Single-point crossover for parents of equal length. The child keeps that
/// length.
///
/// # Panics
/// Panics if the parents differ in length.
pub fn crossover_fixed<G: Clone>(left: &[G], right: &[G], rng: &mut StdRng) -> Vec<G> {
    assert_eq!(
        left.len(),
        right.len(),
        "fixed-length crossover needs equally long parents"
    );
    if left.is_empty() {
        return Vec::new();
    }
    let cut = rng.random_range(0..left.len());
    left[..cut].iter().chain(&right[cut..]).cloned().collect()
}

/// Draws a replacement for `current`. With `forbid_noop`, redraws a bounded
/// number of times until the gene actually changes.
pub fn replacement_gene<G: PartialEq>(
    current: &G,
    factory: &dyn Fn(&mut StdRng) -> G,
    forbid_noop: bool,
    rng: &mut StdRng,
) -> G {
    let mut gene = factory(rng);
    if forbid_noop {
        for _ in 0..MAX_REDRAWS {
            if gene != *current {
                break;
            }
            gene = factory(rng);
        }
    }
    gene
}

/// Mutates a genome whose length is free to change.
///
/// First a gene may be prepended (with the insertion rate). Then every
/// position, in order, may be point-mutated, then deleted, then followed by a
/// freshly drawn gene. A deleted position hands its turn to its successor;
/// inserted genes are not revisited.
pub fn mutate_variable<G: Clone + PartialEq>(
    genome: &mut Vec<G>,
    rates: &MutationRates,
    factory: &dyn Fn(&mut StdRng) -> G,
    forbid_noop: bool,
    rng: &mut StdRng,
) {
    if rng.random::<f64>() < rates.insertion {
        genome.insert(0, factory(rng));
    }

    let mut position = 0;
    while position < genome.len() {
        if rng.random::<f64>() < rates.mutation {
            let gene = replacement_gene(&genome[position], factory, forbid_noop, rng);
            genome[position] = gene;
        }
        if rng.random::<f64>() < rates.deletion {
            genome.remove(position);
            continue;
        }
        if rng.random::<f64>() < rates.insertion {
            genome.insert(position + 1, factory(rng));
            position += 1;
        }
        position += 1;
    }
}

/// Mutates the `rows` of an aligned pool without ever changing row lengths
/// relative to each other.
///
/// Only a row's own genes are visited: null padding and columns opened by
/// other rows during this pass are skipped. Per gene: point mutation, then
/// insertion, then deletion. An insertion adds a column after the current
/// position to the whole pool (null in every row, a fresh gene in the mutating
/// row) and is skipped by the walk. A deletion overwrites the gene with `null`.
pub fn mutate_aligned<G: Clone + PartialEq>(
    pool: &mut GenePool<G>,
    rows: Range<usize>,
    rates: &MutationRates,
    null: &G,
    factory: &dyn Fn(&mut StdRng) -> G,
    forbid_noop: bool,
    rng: &mut StdRng,
) {
    // Columns opened during this pass.
    let mut opened = vec![false; pool.width()];
    for row in rows {
        let mut column = 0;
        while column < pool.width() {
            if opened[column] || pool.get(row, column) == null {
                column += 1;
                continue;
            }
            if rng.random::<f64>() < rates.mutation {
                let gene = replacement_gene(pool.get(row, column), factory, forbid_noop, rng);
                pool.set(row, column, gene);
            }
            let mut inserted = false;
            if rng.random::<f64>() < rates.insertion {
                pool.insert_column(column + 1, null.clone());
                pool.set(row, column + 1, factory(rng));
                opened.insert(column + 1, true);
                inserted = true;
            }
            if rng.random::<f64>() < rates.deletion {
                pool.set(row, column, null.clone());
            }
            column += if inserted { 2 } else { 1 };
        }
    }
    pool.drop_null_columns(null);
}
