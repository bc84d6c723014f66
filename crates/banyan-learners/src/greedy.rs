//! Greedy hill-climbing with random restarts.

use crate::result::LearnerResult;
use crate::{Learner, propose_random_change};
use banyan_core::{Dataset, Evaluate, Network, Prior, SamplerConfig, build_evaluator};
use banyan_error::BanyanResult;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GreedyConfig {
    pub max_iterations: u64,
    /// Wall-clock budget in seconds; 0 means unlimited.
    pub max_seconds: f64,
    /// Restart (randomize the network) once this many consecutive
    /// proposals fail to improve the current score.
    pub max_unimproved: u64,
    /// Seed network in edge-string form; empty starts from no edges.
    pub seed_network: String,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        GreedyConfig {
            max_iterations: 1000,
            max_seconds: 0.0,
            max_unimproved: 500,
            seed_network: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GreedyStats {
    pub iterations: u64,
    pub restarts: u64,
    pub unimproved: u64,
    pub best_score: f64,
    pub runtime_seconds: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GreedyLearner {
    data: Arc<Dataset>,
    prior: Prior,
    sampler: SamplerConfig,
    config: GreedyConfig,
    seed: u64,
    result_size: usize,
    #[serde(default)]
    pub stats: GreedyStats,
}

impl GreedyLearner {
    pub fn new(
        data: Arc<Dataset>,
        prior: Prior,
        config: GreedyConfig,
        sampler: SamplerConfig,
        seed: u64,
    ) -> Self {
        GreedyLearner {
            data,
            prior,
            sampler,
            config,
            seed,
            result_size: 0,
            stats: GreedyStats::default(),
        }
    }

    pub fn with_result_size(mut self, size: usize) -> Self {
        self.result_size = size;
        self
    }
}

impl Learner for GreedyLearner {
    fn run(&mut self) -> BanyanResult<LearnerResult> {
        let n_nodes = self.data.num_variables();
        let seed_net = if self.config.seed_network.is_empty() {
            Network::new(n_nodes)
        } else {
            Network::from_edge_string(n_nodes, &self.config.seed_network)?
        };

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut evaluator =
            build_evaluator(self.data.clone(), seed_net, self.prior.clone(), &self.sampler)?;
        let mut result = LearnerResult::new(self.data.clone(), self.result_size);

        self.stats = GreedyStats::default();
        let start = Instant::now();
        result.start_run(self.name());

        // baseline for acceptance; resets on every restart
        let mut current_best = evaluator.score_network()?;
        self.stats.best_score = current_best;

        loop {
            if self.stats.iterations >= self.config.max_iterations {
                break;
            }
            if self.config.max_seconds > 0.0
                && start.elapsed().as_secs_f64() > self.config.max_seconds
            {
                break;
            }
            self.stats.iterations += 1;

            let score = match propose_random_change(evaluator.as_mut(), &mut rng, n_nodes) {
                Ok(score) => score,
                Err(err) if err.is_cannot_alter() => {
                    debug!(iterations = self.stats.iterations, "proposal budget exhausted");
                    break;
                }
                Err(err) => return Err(err),
            };
            result.add_network(evaluator.network(), score);

            if score > current_best {
                current_best = score;
                self.stats.unimproved = 0;
                if score > self.stats.best_score {
                    self.stats.best_score = score;
                    debug!(score, iteration = self.stats.iterations, "improved");
                }
            } else {
                evaluator.restore_network()?;
                self.stats.unimproved += 1;
            }

            if self.stats.unimproved > self.config.max_unimproved {
                current_best = evaluator.randomize_network(&mut rng)?;
                self.stats.restarts += 1;
                self.stats.unimproved = 0;
                if current_best > self.stats.best_score {
                    self.stats.best_score = current_best;
                }
            }
        }

        result.stop_run();
        self.stats.runtime_seconds = start.elapsed().as_secs_f64();
        info!(
            iterations = self.stats.iterations,
            restarts = self.stats.restarts,
            best_score = self.stats.best_score,
            "greedy run finished"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}
