//! Scores an explicit list of networks.

use crate::Learner;
use crate::result::LearnerResult;
use banyan_core::{Dataset, Evaluate, Network, Prior, SamplerConfig, build_evaluator};
use banyan_error::BanyanResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Learner that scores every network in a user-supplied list. The list
/// can be split into chunks so independent workers each score a part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListLearner {
    data: Arc<Dataset>,
    prior: Prior,
    sampler: SamplerConfig,
    networks: Vec<Network>,
    result_size: usize,
}

impl ListLearner {
    pub fn new(
        data: Arc<Dataset>,
        prior: Prior,
        sampler: SamplerConfig,
        networks: Vec<Network>,
    ) -> Self {
        ListLearner {
            data,
            prior,
            sampler,
            networks,
            result_size: 0,
        }
    }

    /// Builds the network list from edge strings.
    pub fn from_strings<S: AsRef<str>>(
        data: Arc<Dataset>,
        prior: Prior,
        sampler: SamplerConfig,
        strings: impl IntoIterator<Item = S>,
    ) -> BanyanResult<Self> {
        let n = data.num_variables();
        let networks = strings
            .into_iter()
            .map(|s| Network::from_edge_string(n, s.as_ref()))
            .collect::<BanyanResult<Vec<_>>>()?;
        Ok(ListLearner::new(data, prior, sampler, networks))
    }

    pub fn with_result_size(mut self, size: usize) -> Self {
        self.result_size = size;
        self
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    /// Splits the list into up to `count` learners over disjoint chunks.
    pub fn split(self, count: usize) -> Vec<ListLearner> {
        let count = count.max(1);
        let per_task = self.networks.len().div_ceil(count);
        if per_task == 0 {
            return vec![self];
        }
        self.networks
            .chunks(per_task)
            .map(|chunk| ListLearner {
                data: self.data.clone(),
                prior: self.prior.clone(),
                sampler: self.sampler.clone(),
                networks: chunk.to_vec(),
                result_size: self.result_size,
            })
            .collect()
    }
}

impl Learner for ListLearner {
    fn run(&mut self) -> BanyanResult<LearnerResult> {
        let mut evaluator = build_evaluator(
            self.data.clone(),
            Network::new(self.data.num_variables()),
            self.prior.clone(),
            &self.sampler,
        )?;
        let mut result = LearnerResult::new(self.data.clone(), self.result_size);
        result.start_run(self.name());

        for network in &self.networks {
            let score = evaluator.set_network(network)?;
            result.add_network(network, score);
        }

        result.stop_run();
        info!(count = self.networks.len(), "list scoring finished");
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "exhaustive"
    }
}
