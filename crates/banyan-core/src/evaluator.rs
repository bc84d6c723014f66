//! Incremental network scoring.
//!
//! Local search proposes small edits to an existing network, so scoring
//! must only revisit the nodes an edit touched. [NetworkEvaluator] keeps
//! per-node local scores, a dirty set, and a one-deep undo record; as long
//! as callers edit the network transactionally through it, rescoring costs
//! O(changed families) instead of O(network).

use crate::cpt::DataView;
use crate::dataset::Dataset;
use crate::missing::{MissingDataEvaluator, SamplerConfig};
use crate::network::{CycleChecker, Edge, Network};
use crate::prior::Prior;
use crate::score::{self, LocalScoreCache};
use banyan_error::{BanyanResult, banyan_bail, ensure};
use rand::rngs::SmallRng;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The scoring contract learners drive. Implemented by the complete-data
/// evaluator and the missing-data evaluator; which one a learner gets is
/// decided by `dataset.has_missing()`.
///
/// None of these methods may call another public method on the same
/// evaluator; that keeps the undo record one deep.
pub trait Evaluate: Send {
    fn network(&self) -> &Network;

    /// Current score, recomputing only what is stale.
    fn score_network(&mut self) -> BanyanResult<f64>;

    /// Replaces the network wholesale; internally reduced to an
    /// [Evaluate::alter_network] over the symmetric difference.
    fn set_network(&mut self, net: &Network) -> BanyanResult<f64>;

    /// Atomic transactional edit: applies `remove` then `add`, verifies
    /// acyclicity (rolling back and failing with a cyclic-network error
    /// otherwise), records the undo information, and rescores.
    fn alter_network(&mut self, add: &[Edge], remove: &[Edge]) -> BanyanResult<f64>;

    /// Reverts the last accepted alteration. A second restore without an
    /// intervening alteration is a no-op.
    fn restore_network(&mut self) -> BanyanResult<f64>;

    /// Replaces the network with a random DAG at density `1/n`, honouring
    /// the prior's required and prohibited edges.
    fn randomize_network(&mut self, rng: &mut SmallRng) -> BanyanResult<f64>;

    /// Removes every edge.
    fn clear_network(&mut self) -> BanyanResult<f64>;
}

/// Selects the evaluator for a dataset: the missing-data sampler when any
/// cell is missing, the incremental complete-data evaluator otherwise.
pub fn build_evaluator(
    data: Arc<Dataset>,
    net: Network,
    prior: Prior,
    sampler: &SamplerConfig,
) -> BanyanResult<Box<dyn Evaluate>> {
    if data.has_missing() {
        Ok(Box::new(MissingDataEvaluator::new(
            data,
            net,
            prior,
            sampler.clone(),
        )?))
    } else {
        Ok(Box::new(NetworkEvaluator::new(data, net, prior)?))
    }
}

#[derive(Debug)]
struct SavedState {
    score: f64,
    localscores: Vec<(usize, f64)>,
    dirty: BTreeSet<usize>,
    added: Vec<Edge>,
    removed: Vec<Edge>,
}

/// Complete-data evaluator. Refuses datasets with missing cells; those go
/// through [MissingDataEvaluator].
#[derive(Debug)]
pub struct NetworkEvaluator {
    data: Arc<Dataset>,
    net: Network,
    prior: Prior,
    cache: LocalScoreCache,
    localscores: Vec<f64>,
    dirty: BTreeSet<usize>,
    score: f64,
    saved: Option<SavedState>,
    checker: CycleChecker,
}

impl NetworkEvaluator {
    pub fn new(data: Arc<Dataset>, net: Network, prior: Prior) -> BanyanResult<Self> {
        ensure!(
            !data.has_missing(),
            InvalidConfig: "cannot use the complete-data evaluator with missing data"
        );
        ensure!(
            net.num_nodes() == data.num_variables(),
            InvalidConfig: "network has {} nodes but dataset has {} variables",
            net.num_nodes(), data.num_variables()
        );

        let n = data.num_variables();
        Ok(NetworkEvaluator {
            data,
            net,
            prior,
            cache: LocalScoreCache::new(),
            localscores: vec![0.0; n],
            dirty: (0..n).collect(),
            score: f64::NAN,
            saved: None,
            checker: CycleChecker::new(n),
        })
    }

    /// Starts from a network with no edges.
    pub fn from_dataset(data: Arc<Dataset>, prior: Prior) -> BanyanResult<Self> {
        let net = Network::new(data.num_variables());
        NetworkEvaluator::new(data, net, prior)
    }

    pub fn cache(&self) -> &LocalScoreCache {
        &self.cache
    }

    pub fn localscores(&self) -> &[f64] {
        &self.localscores
    }

    fn rescore(&mut self) -> f64 {
        if self.dirty.is_empty() {
            return self.score;
        }

        let view = DataView::from_dataset(&self.data);
        let dirty = std::mem::take(&mut self.dirty);
        for &node in &dirty {
            let parents = self.net.parents(node);
            self.localscores[node] = self
                .cache
                .get_or_insert_with(node, parents, || score::family_score(view, node, parents));
        }

        self.score = self.localscores.iter().sum::<f64>() + self.prior.log_likelihood(&self.net);
        self.score
    }

    fn alter_impl(&mut self, add: &[Edge], remove: &[Edge]) -> BanyanResult<f64> {
        // removals first: an edge named in both lists must survive
        let mut removed = Vec::with_capacity(remove.len());
        for &edge in remove {
            if self.net.remove_edge(edge) {
                removed.push(edge);
            }
        }
        let mut added = Vec::with_capacity(add.len());
        for &edge in add {
            if self.net.add_edge(edge) {
                added.push(edge);
            }
        }

        if !self.checker.is_acyclic(&self.net) {
            for &edge in &added {
                self.net.remove_edge(edge);
            }
            for &edge in &removed {
                self.net.add_edge(edge);
            }
            banyan_bail!(CyclicNetwork: "proposed edit would introduce a cycle");
        }

        // only the destination's family changes when its incoming edges do
        let mut touched: BTreeSet<usize> = self.dirty.clone();
        touched.extend(added.iter().chain(removed.iter()).map(|&(_, dst)| dst));

        self.saved = Some(SavedState {
            score: self.score,
            localscores: touched.iter().map(|&n| (n, self.localscores[n])).collect(),
            dirty: self.dirty.clone(),
            added,
            removed,
        });
        self.dirty = touched;

        Ok(self.rescore())
    }

    fn replace_with(&mut self, net: &Network) -> BanyanResult<f64> {
        ensure!(
            net.num_nodes() == self.net.num_nodes(),
            InvalidConfig: "replacement network has {} nodes, expected {}",
            net.num_nodes(), self.net.num_nodes()
        );
        let add: Vec<Edge> = net.edges().filter(|&e| !self.net.contains_edge(e)).collect();
        let remove: Vec<Edge> = self.net.edges().filter(|&e| !net.contains_edge(e)).collect();
        self.alter_impl(&add, &remove)
    }
}

impl Evaluate for NetworkEvaluator {
    fn network(&self) -> &Network {
        &self.net
    }

    fn score_network(&mut self) -> BanyanResult<f64> {
        Ok(self.rescore())
    }

    fn set_network(&mut self, net: &Network) -> BanyanResult<f64> {
        self.replace_with(net)
    }

    fn alter_network(&mut self, add: &[Edge], remove: &[Edge]) -> BanyanResult<f64> {
        self.alter_impl(add, remove)
    }

    fn restore_network(&mut self) -> BanyanResult<f64> {
        // the previous state was acyclic by induction, so the inverse
        // edits skip the cycle check
        if let Some(saved) = self.saved.take() {
            for &edge in &saved.added {
                self.net.remove_edge(edge);
            }
            for &edge in &saved.removed {
                self.net.add_edge(edge);
            }
            for &(node, value) in &saved.localscores {
                self.localscores[node] = value;
            }
            self.score = saved.score;
            self.dirty = saved.dirty;
        }
        Ok(self.score)
    }

    fn randomize_network(&mut self, rng: &mut SmallRng) -> BanyanResult<f64> {
        let mut candidate = Network::new(self.net.num_nodes());
        candidate.randomize(rng, self.prior.required(), self.prior.prohibited())?;
        self.replace_with(&candidate)
    }

    fn clear_network(&mut self) -> BanyanResult<f64> {
        let remove: Vec<Edge> = self.net.edges().collect();
        self.alter_impl(&[], &remove)
    }
}
