//! Simulated annealing.

use crate::result::LearnerResult;
use crate::{Learner, propose_random_change};
use banyan_core::{Dataset, Evaluate, Network, Prior, SamplerConfig, build_evaluator};
use banyan_error::BanyanResult;
use rand::SeedableRng;
use rand::RngExt;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimAnnealConfig {
    pub start_temp: f64,
    /// Multiplicative decay applied once per `max_iters_at_temp`.
    pub delta_temp: f64,
    pub max_iters_at_temp: u64,
    /// Seed network in edge-string form; empty starts from no edges.
    pub seed_network: String,
}

impl Default for SimAnnealConfig {
    fn default() -> Self {
        SimAnnealConfig {
            start_temp: 100.0,
            delta_temp: 0.5,
            max_iters_at_temp: 100,
            seed_network: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimAnnealStats {
    pub iterations: u64,
    pub iterations_at_temp: u64,
    pub temp: f64,
    pub current_score: f64,
    pub best_score: f64,
    pub runtime_seconds: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimAnnealLearner {
    data: Arc<Dataset>,
    prior: Prior,
    sampler: SamplerConfig,
    config: SimAnnealConfig,
    seed: u64,
    result_size: usize,
    #[serde(default)]
    pub stats: SimAnnealStats,
}

impl SimAnnealLearner {
    pub fn new(
        data: Arc<Dataset>,
        prior: Prior,
        config: SimAnnealConfig,
        sampler: SamplerConfig,
        seed: u64,
    ) -> Self {
        SimAnnealLearner {
            data,
            prior,
            sampler,
            config,
            seed,
            result_size: 0,
            stats: SimAnnealStats::default(),
        }
    }

    pub fn with_result_size(mut self, size: usize) -> Self {
        self.result_size = size;
        self
    }

    /// Accept with probability `min(1, exp((new - current) / temp))`.
    fn accept(&self, rng: &mut SmallRng, new_score: f64) -> bool {
        if new_score >= self.stats.current_score {
            return true;
        }
        let ratio = ((new_score - self.stats.current_score) / self.stats.temp).exp();
        rng.random::<f64>() < ratio
    }
}

impl Learner for SimAnnealLearner {
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

        self.stats = SimAnnealStats {
            temp: self.config.start_temp,
            ..SimAnnealStats::default()
        };
        let start = Instant::now();
        result.start_run(self.name());

        self.stats.current_score = evaluator.score_network()?;
        self.stats.best_score = self.stats.current_score;

        // exponential decay never reaches zero, so stop below one
        while self.stats.temp >= 1.0 {
            let score = match propose_random_change(evaluator.as_mut(), &mut rng, n_nodes) {
                Ok(score) => score,
                Err(err) if err.is_cannot_alter() => {
                    debug!(temp = self.stats.temp, "proposal budget exhausted");
                    break;
                }
                Err(err) => return Err(err),
            };
            result.add_network(evaluator.network(), score);

            if self.accept(&mut rng, score) {
                self.stats.current_score = score;
                if score > self.stats.best_score {
                    self.stats.best_score = score;
                }
            } else {
                evaluator.restore_network()?;
            }

            self.stats.iterations += 1;
            self.stats.iterations_at_temp += 1;
            if self.stats.iterations_at_temp >= self.config.max_iters_at_temp {
                self.stats.temp *= self.config.delta_temp;
                self.stats.iterations_at_temp = 0;
            }
        }

        result.stop_run();
        self.stats.runtime_seconds = start.elapsed().as_secs_f64();
        info!(
            iterations = self.stats.iterations,
            best_score = self.stats.best_score,
            "annealing run finished"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "simanneal"
    }
}
