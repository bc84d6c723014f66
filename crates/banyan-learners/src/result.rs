//! Result sink and posterior estimate.
//!
//! Every scored network a learner visits lands in the current run of a
//! [LearnerResult]. Runs from independent learners merge, and
//! [LearnerResult::posterior] collapses them into a deduplicated,
//! score-sorted collection used to estimate the posterior over structures.
//! The persisted artifact carries the dataset, the top-scoring networks,
//! and per-run statistics.

use banyan_core::{Dataset, Matrix, Network};
use banyan_error::BanyanResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredNetwork {
    pub network: Network,
    pub score: f64,
}

/// One learner invocation: where it ran, when, and everything it scored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnerRun {
    pub learner: String,
    pub host: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub networks: Vec<ScoredNetwork>,
}

impl LearnerRun {
    fn new(learner: &str) -> Self {
        LearnerRun {
            learner: learner.to_string(),
            host: hostname(),
            start_time: Utc::now(),
            end_time: None,
            networks: Vec::new(),
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            learner: self.learner.clone(),
            host: self.host.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnerResult {
    pub dataset: Arc<Dataset>,
    /// Number of top-scoring networks the artifact retains; 0 keeps all.
    pub size: usize,
    pub runs: Vec<LearnerRun>,
}

impl LearnerResult {
    pub fn new(dataset: Arc<Dataset>, size: usize) -> Self {
        LearnerResult {
            dataset,
            size,
            runs: Vec::new(),
        }
    }

    pub fn variables(&self) -> Vec<String> {
        self.dataset.variable_names()
    }

    pub fn start_run(&mut self, learner: &str) {
        // close a dangling run left by an aborted learner
        if let Some(run) = self.runs.last_mut() {
            if run.end_time.is_none() {
                run.end_time = Some(Utc::now());
            }
        }
        self.runs.push(LearnerRun::new(learner));
    }

    pub fn stop_run(&mut self) {
        if let Some(run) = self.runs.last_mut() {
            run.end_time = Some(Utc::now());
        }
    }

    pub fn add_network(&mut self, network: &Network, score: f64) {
        if let Some(run) = self.runs.last_mut() {
            run.networks.push(ScoredNetwork {
                network: network.clone(),
                score,
            });
        }
    }

    pub fn merge(&mut self, other: LearnerResult) {
        self.runs.extend(other.runs);
    }

    pub fn num_networks(&self) -> usize {
        self.runs.iter().map(|run| run.networks.len()).sum()
    }

    /// Deduplicates by network (keeping the best score seen for each),
    /// sorts ascending by score, and truncates to the `size` best when a
    /// cap is configured.
    pub fn posterior(&self) -> Posterior {
        Posterior {
            variables: self.variables(),
            entries: self.ranked_networks(),
        }
    }

    fn ranked_networks(&self) -> Vec<(Network, f64)> {
        let mut scores: HashMap<&Network, f64> = HashMap::new();
        for run in &self.runs {
            for scored in &run.networks {
                scores
                    .entry(&scored.network)
                    .and_modify(|score| *score = score.max(scored.score))
                    .or_insert(scored.score);
            }
        }

        let mut best: Vec<(Network, f64)> = scores
            .into_iter()
            .map(|(net, score)| (net.clone(), score))
            .collect();
        // score ties break on the edge string so the order is stable
        best.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.to_string().cmp(&b.0.to_string()))
        });
        if self.size > 0 && best.len() > self.size {
            best.drain(..best.len() - self.size);
        }
        best
    }

    /// The persisted form: dataset, deduplicated top-scoring networks
    /// sorted ascending by score, and per-run statistics.
    pub fn artifact(&self) -> ResultArtifact {
        ResultArtifact {
            dataset: self.dataset.as_ref().clone(),
            networks: self
                .ranked_networks()
                .into_iter()
                .map(|(network, score)| ScoredNetwork { network, score })
                .collect(),
            runs: self.runs.iter().map(LearnerRun::summary).collect(),
        }
    }

    pub fn to_json(&self) -> BanyanResult<String> {
        serde_json::to_string_pretty(&self.artifact())
            .map_err(|e| banyan_error::banyan_err!(Serde: "cannot serialize result: {}", e))
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> BanyanResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub learner: String,
    pub host: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// What lands on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub dataset: Dataset,
    pub networks: Vec<ScoredNetwork>,
    pub runs: Vec<RunSummary>,
}

/// Scored networks sorted ascending by score; the best network is last.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Posterior {
    pub variables: Vec<String>,
    entries: Vec<(Network, f64)>,
}

impl Posterior {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<(&Network, f64)> {
        self.entries.get(index).map(|(net, score)| (net, *score))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Network, f64)> {
        self.entries.iter().map(|(net, score)| (net, *score))
    }

    pub fn best(&self) -> Option<(&Network, f64)> {
        self.entries.last().map(|(net, score)| (net, *score))
    }

    /// Model-averaged consensus: each network votes for its edges with
    /// weight proportional to `exp(score - max_score)`; edges whose
    /// averaged feature reaches the threshold survive.
    pub fn consensus_network(&self, threshold: f64) -> Network {
        let n = self
            .entries
            .first()
            .map(|(net, _)| net.num_nodes())
            .unwrap_or(0);
        let mut features = Matrix::<f64>::new(n, n);

        let max = self
            .entries
            .iter()
            .map(|&(_, score)| score)
            .fold(f64::NEG_INFINITY, f64::max);
        let total: f64 = self.entries.iter().map(|&(_, s)| (s - max).exp()).sum();

        for (net, score) in &self.entries {
            let weight = (score - max).exp() / total;
            for (src, dst) in net.edges() {
                features.set(src, dst, features.at(src, dst) + weight);
            }
        }

        let mut consensus = Network::new(n);
        for src in 0..n {
            for dst in 0..n {
                if features.at(src, dst) >= threshold {
                    consensus.add_edge((src, dst));
                }
            }
        }
        consensus
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}
