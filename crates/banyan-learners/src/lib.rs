//! Search learners over network structures.
//!
//! A learner owns a dataset, a prior, and its configuration; on `run` it
//! builds the right evaluator for the dataset (complete-data or
//! missing-data) and drives it with local edge edits, accumulating scored
//! networks in a [LearnerResult]. Learners serialize, so independent runs
//! can be shipped to workers and their results merged.

pub mod controller;
pub mod exhaustive;
pub mod greedy;
pub mod result;
pub mod simanneal;

pub use controller::{Executor, TaskController, ThreadPool};
pub use exhaustive::ListLearner;
pub use greedy::{GreedyConfig, GreedyLearner, GreedyStats};
pub use result::{LearnerResult, LearnerRun, Posterior, ResultArtifact, RunSummary, ScoredNetwork};
pub use simanneal::{SimAnnealConfig, SimAnnealLearner, SimAnnealStats};

use banyan_core::Evaluate;
use banyan_error::{BanyanResult, banyan_bail};
use rand::RngExt;
use rand::rngs::SmallRng;

pub trait Learner: Send {
    fn run(&mut self) -> BanyanResult<LearnerResult>;

    fn name(&self) -> &'static str;
}

/// Proposes one local change and applies it: picks two distinct nodes
/// `(u, v)` uniformly, then reverses `u -> v` if present, removes
/// `v -> u` if that is present, and otherwise adds `u -> v`. Cyclic
/// proposals are retried with a fresh pair, up to `n^2` attempts before
/// giving up with a cannot-alter error.
pub(crate) fn propose_random_change(
    evaluator: &mut dyn Evaluate,
    rng: &mut SmallRng,
    n_nodes: usize,
) -> BanyanResult<f64> {
    let max_attempts = n_nodes * n_nodes;

    for _ in 0..max_attempts {
        let u = rng.random_range(0..n_nodes);
        let v = rng.random_range(0..n_nodes);
        if u == v {
            continue;
        }

        let (add, remove): (Vec<_>, Vec<_>) = if evaluator.network().contains_edge((u, v)) {
            (vec![(v, u)], vec![(u, v)])
        } else if evaluator.network().contains_edge((v, u)) {
            (vec![], vec![(v, u)])
        } else {
            (vec![(u, v)], vec![])
        };

        match evaluator.alter_network(&add, &remove) {
            Ok(score) => return Ok(score),
            Err(err) if err.is_cyclic() => continue,
            Err(err) => return Err(err),
        }
    }

    banyan_bail!(CannotAlter: "no acyclic local change found in {} attempts", max_attempts)
}
