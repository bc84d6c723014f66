//! Scoring with missing data.
//!
//! Missing cells are latents to be marginalized over. Three samplers share
//! one evaluator: plain Gibbs over single cells, exact enumeration of the
//! full assignment space, and a maximum-entropy chain that proposes swaps
//! within a variable so the marginal assignment distribution never moves.
//!
//! The evaluator owns a working copy of the observation matrix and one CPT
//! per node; cell edits keep the CPTs in lock-step through
//! [MultinomialCpt::replace_row], and rescoring walks only the nodes whose
//! family a cell edit touched.

use crate::cpt::{DataView, MultinomialCpt};
use crate::dataset::Dataset;
use crate::evaluator::Evaluate;
use crate::logmath;
use crate::matrix::Matrix;
use crate::network::{CycleChecker, Edge, Network};
use crate::prior::Prior;
use banyan_error::{BanyanResult, banyan_bail, banyan_err, ensure};
use rand::seq::SliceRandom;
use rand::rngs::SmallRng;
use rand::RngExt;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingMethod {
    #[default]
    Gibbs,
    Exact,
    MaxEntropyGibbs,
}

impl FromStr for MissingMethod {
    type Err = banyan_error::BanyanError;

    fn from_str(s: &str) -> BanyanResult<Self> {
        match s.trim() {
            "gibbs" => Ok(MissingMethod::Gibbs),
            "exact" => Ok(MissingMethod::Exact),
            "maxentropy_gibbs" => Ok(MissingMethod::MaxEntropyGibbs),
            other => Err(banyan_err!(
                InvalidConfig: "unknown missing-data evaluator '{}', expected gibbs | exact | maxentropy_gibbs",
                other
            )),
        }
    }
}

impl fmt::Display for MissingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingMethod::Gibbs => write!(f, "gibbs"),
            MissingMethod::Exact => write!(f, "exact"),
            MissingMethod::MaxEntropyGibbs => write!(f, "maxentropy_gibbs"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
enum StopKind {
    /// `iters > k`
    Iterations(u64),
    /// `iters > coef * n^power`
    ScaledPower { coef: f64, power: i32 },
}

/// When the sampler stops, as a predicate over the iteration count and the
/// number of missing cells. Defaults to `iters > n**2`. A custom closure
/// replaces the parsed expression and is skipped on the wire.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoppingCriteria {
    kind: StopKind,
    #[serde(skip)]
    custom: Option<Arc<dyn Fn(u64, usize) -> bool + Send + Sync>>,
}

impl StoppingCriteria {
    pub fn iterations(count: u64) -> Self {
        StoppingCriteria {
            kind: StopKind::Iterations(count),
            custom: None,
        }
    }

    pub fn scaled_power(coef: f64, power: i32) -> Self {
        StoppingCriteria {
            kind: StopKind::ScaledPower { coef, power },
            custom: None,
        }
    }

    pub fn custom(predicate: impl Fn(u64, usize) -> bool + Send + Sync + 'static) -> Self {
        StoppingCriteria {
            kind: StopKind::ScaledPower { coef: 1.0, power: 2 },
            custom: Some(Arc::new(predicate)),
        }
    }

    /// Parses expressions of the form `iters > 100`, `iters > n**2`,
    /// `iters > 10*n**2` (`^` also accepted for exponentiation).
    pub fn parse(expr: &str) -> BanyanResult<Self> {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.replace("**", "^");
        let rhs = compact
            .strip_prefix("iters>")
            .ok_or_else(|| banyan_err!(InvalidConfig: "stopping criteria '{}' must compare iters with '>'", expr))?;

        if let Ok(count) = rhs.parse::<u64>() {
            return Ok(StoppingCriteria::iterations(count));
        }

        let (coef, tail) = match rhs.split_once('*') {
            None => (1.0, rhs),
            Some((coef, tail)) => {
                let coef = coef.parse::<f64>().map_err(
                    |_| banyan_err!(InvalidConfig: "invalid coefficient in stopping criteria '{}'", expr),
                )?;
                (coef, tail)
            }
        };

        let tail = tail
            .strip_prefix('n')
            .ok_or_else(|| banyan_err!(InvalidConfig: "cannot parse stopping criteria '{}'", expr))?;
        let power = if tail.is_empty() {
            1
        } else {
            tail.strip_prefix('^')
                .and_then(|p| p.parse::<i32>().ok())
                .ok_or_else(|| banyan_err!(InvalidConfig: "cannot parse stopping criteria '{}'", expr))?
        };

        Ok(StoppingCriteria::scaled_power(coef, power))
    }

    pub fn should_stop(&self, iters: u64, n_missing: usize) -> bool {
        if let Some(custom) = &self.custom {
            return custom(iters, n_missing);
        }
        match self.kind {
            StopKind::Iterations(count) => iters > count,
            StopKind::ScaledPower { coef, power } => {
                iters as f64 > coef * (n_missing as f64).powi(power)
            }
        }
    }
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        StoppingCriteria::scaled_power(1.0, 2)
    }
}

impl fmt::Debug for StoppingCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoppingCriteria")
            .field("kind", &self.kind)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Sampler configuration shared by the three missing-data variants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub method: MissingMethod,
    /// Burn-in prefix discarded before averaging, as a multiple of the
    /// number of missing cells.
    pub burnin: usize,
    pub stopping: StoppingCriteria,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            method: MissingMethod::Gibbs,
            burnin: 10,
            stopping: StoppingCriteria::default(),
            seed: 0,
        }
    }
}

/// Enough sampler state to resume a chain without re-burning: the running
/// average, how many scores went into it, and the latest assignment of
/// every missing cell (in row-major cell order).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GibbsState {
    pub avg_score: f64,
    pub count: usize,
    pub assigned: Vec<i32>,
}

impl GibbsState {
    /// Log of the sum of scores behind the average.
    pub fn score_sum(&self) -> f64 {
        self.avg_score + (self.count as f64).ln()
    }
}

/// Network evaluator that marginalizes over missing cells.
///
/// Owns a mutable working copy of the observations and one CPT per node.
/// Not safe for concurrent use; a learner owns it exclusively.
pub struct MissingDataEvaluator {
    data: Arc<Dataset>,
    /// Working copy; missing cells hold the sampler's current assignment.
    obs: Matrix<i32>,
    net: Network,
    prior: Prior,
    method: MissingMethod,
    rng: SmallRng,
    burnin: usize,
    stop: StoppingCriteria,
    cpds: Vec<MultinomialCpt>,
    localscores: Vec<f64>,
    data_dirty: BTreeSet<usize>,
    score: f64,
    state: Option<GibbsState>,
    saved: Option<(Vec<Edge>, Vec<Edge>, f64)>,
    checker: CycleChecker,
}

impl MissingDataEvaluator {
    pub fn new(
        data: Arc<Dataset>,
        net: Network,
        prior: Prior,
        config: SamplerConfig,
    ) -> BanyanResult<Self> {
        ensure!(
            net.num_nodes() == data.num_variables(),
            InvalidConfig: "network has {} nodes but dataset has {} variables",
            net.num_nodes(), data.num_variables()
        );
        let n = data.num_variables();
        let obs = data.observations().clone();
        Ok(MissingDataEvaluator {
            data,
            obs,
            net,
            prior,
            method: config.method,
            rng: SmallRng::seed_from_u64(config.seed),
            burnin: config.burnin,
            stop: config.stopping,
            cpds: Vec::new(),
            localscores: vec![0.0; n],
            data_dirty: BTreeSet::new(),
            score: f64::NAN,
            state: None,
            saved: None,
            checker: CycleChecker::new(n),
        })
    }

    /// State of the last sampling run, if any.
    pub fn gibbs_state(&self) -> Option<&GibbsState> {
        self.state.as_ref()
    }

    /// Scores the current network resuming from the last run's state, so
    /// no burn-in is discarded again.
    pub fn score_resuming(&mut self) -> BanyanResult<f64> {
        let state = self.state.take();
        self.run_sampler(state)
    }

    /// Scores the current network starting from the supplied state.
    pub fn score_from_state(&mut self, state: GibbsState) -> BanyanResult<f64> {
        self.run_sampler(Some(state))
    }

    fn view(&self) -> DataView<'_> {
        DataView {
            observations: &self.obs,
            interventions: self.data.interventions(),
            arities: self.data.arities(),
        }
    }

    /// Rebuilds every CPT from the current working observations.
    fn init_state(&mut self) {
        let view = self.view();
        let cpds: Vec<MultinomialCpt> = (0..self.data.num_variables())
            .map(|node| MultinomialCpt::build(view, node, self.net.parents(node)))
            .collect();
        self.localscores = cpds
            .iter()
            .map(MultinomialCpt::log_marginal_likelihood)
            .collect();
        self.cpds = cpds;
        self.data_dirty.clear();
        self.score = self.localscores.iter().sum::<f64>() + self.prior.log_likelihood(&self.net);
    }

    /// Rescores walking only the nodes whose CPT changed.
    fn score_core(&mut self) -> f64 {
        let dirty = std::mem::take(&mut self.data_dirty);
        for node in dirty {
            self.localscores[node] = self.cpds[node].log_marginal_likelihood();
        }
        self.score = self.localscores.iter().sum::<f64>() + self.prior.log_likelihood(&self.net);
        self.score
    }

    /// Writes one cell and moves the affected families' counts. The
    /// affected nodes are the variable itself and its children; a node
    /// whose value for this sample was forced contributes nothing, so its
    /// counts stay untouched.
    fn alter_cell(&mut self, row: usize, col: usize, value: i32) {
        let old = self.obs.at(row, col);
        self.obs.set(row, col, value);

        let mut affected: SmallVec<[usize; 8]> = SmallVec::new();
        affected.push(col);
        affected.extend_from_slice(self.net.children(col));

        for &node in &affected {
            self.data_dirty.insert(node);
            if self.data.interventions().at(row, node) {
                continue;
            }
            let mut old_proj: SmallVec<[i32; 8]> = SmallVec::new();
            let mut new_proj: SmallVec<[i32; 8]> = SmallVec::new();
            for &var in self.cpds[node].family() {
                let current = self.obs.at(row, var);
                new_proj.push(current);
                old_proj.push(if var == col { old } else { current });
            }
            self.cpds[node].replace_row(&old_proj, &new_proj);
        }
    }

    fn run_sampler(&mut self, state: Option<GibbsState>) -> BanyanResult<f64> {
        match self.method {
            MissingMethod::Gibbs => self.score_gibbs(state),
            MissingMethod::Exact => self.score_exact(),
            MissingMethod::MaxEntropyGibbs => self.score_maxent(state),
        }
    }

    fn score_gibbs(&mut self, state: Option<GibbsState>) -> BanyanResult<f64> {
        let cells = self.data.missing_cells();
        let n_missing = cells.len();

        match &state {
            Some(st) => self.write_assignments(&cells, st)?,
            None => {
                for &(row, col) in &cells {
                    let arity = self.data.arities()[col];
                    let value = self.rng.random_range(0..arity) as i32;
                    self.obs.set(row, col, value);
                }
            }
        }
        self.init_state();

        if n_missing == 0 {
            let score = self.score_core();
            self.state = None;
            return Ok(score);
        }

        let stop = self.stop.clone();
        let mut chosen = Vec::new();
        let mut candidates: Vec<f64> = Vec::new();
        let mut iters: u64 = 0;

        while !stop.should_stop(iters, n_missing) {
            for &(row, col) in &cells {
                let arity = self.data.arities()[col];
                candidates.clear();
                for value in 0..arity {
                    self.alter_cell(row, col, value as i32);
                    candidates.push(self.score_core());
                }
                let pick = logmath::log_prob_wheel(&mut self.rng, &candidates);
                self.alter_cell(row, col, pick as i32);
                chosen.push(candidates[pick]);
            }
            iters += n_missing as u64;
        }

        self.finish_run(&cells, &chosen, state.as_ref(), n_missing);
        Ok(self.score)
    }

    fn score_exact(&mut self) -> BanyanResult<f64> {
        const MAX_ASSIGNMENTS: u128 = 1 << 20;

        let cells = self.data.missing_cells();
        let dims: Vec<usize> = cells
            .iter()
            .map(|&(_, col)| self.data.arities()[col])
            .collect();
        let total: u128 = dims.iter().map(|&d| d as u128).product();
        ensure!(
            total <= MAX_ASSIGNMENTS,
            InvalidConfig: "exact enumeration over {} assignments is infeasible", total
        );

        for &(row, col) in &cells {
            self.obs.set(row, col, 0);
        }
        self.init_state();

        let mut scores = Vec::with_capacity(total as usize);
        let mut counter = vec![0usize; cells.len()];
        loop {
            for (k, &(row, col)) in cells.iter().enumerate() {
                self.alter_cell(row, col, counter[k] as i32);
            }
            scores.push(self.score_core());

            let mut carry = true;
            for k in 0..counter.len() {
                if !carry {
                    break;
                }
                counter[k] += 1;
                if counter[k] == dims[k] {
                    counter[k] = 0;
                } else {
                    carry = false;
                }
            }
            if carry {
                break;
            }
        }

        self.score = logmath::log_sum(scores.iter().copied()) - (scores.len() as f64).ln();
        self.state = None;
        Ok(self.score)
    }

    fn score_maxent(&mut self, state: Option<GibbsState>) -> BanyanResult<f64> {
        let cells = self.data.missing_cells();
        let n_missing = cells.len();
        let n_samples = self.data.num_samples();

        let missing_samples: Vec<Vec<usize>> = (0..self.data.num_variables())
            .map(|v| {
                (0..n_samples)
                    .filter(|&s| self.data.missing().at(s, v))
                    .collect()
            })
            .collect();
        let missing_vars: Vec<usize> = (0..self.data.num_variables())
            .filter(|&v| !missing_samples[v].is_empty())
            .collect();

        match &state {
            Some(st) => self.write_assignments(&cells, st)?,
            None => {
                for &var in &missing_vars {
                    self.max_entropy_assignment(var, &missing_samples[var]);
                }
            }
        }
        self.init_state();

        if n_missing == 0 {
            let score = self.score_core();
            self.state = None;
            return Ok(score);
        }

        let stop = self.stop.clone();
        let mut chosen = Vec::new();
        let mut iters: u64 = 0;

        while !stop.should_stop(iters, n_missing) {
            for &var in &missing_vars {
                for k in 0..missing_samples[var].len() {
                    let sample = missing_samples[var][k];
                    let keep_score = self.score_core();
                    let swap = self.swap_cells(var, sample, &missing_samples[var]);
                    let swap_score = self.score_core();
                    let pick =
                        logmath::log_prob_wheel(&mut self.rng, &[keep_score, swap_score]);
                    if pick == 0 {
                        self.undo_swap(var, swap);
                        chosen.push(keep_score);
                    } else {
                        chosen.push(swap_score);
                    }
                }
            }
            iters += n_missing as u64;
        }

        self.finish_run(&cells, &chosen, state.as_ref(), n_missing);
        Ok(self.score)
    }

    /// Assigns this variable's missing cells so its marginal distribution
    /// over all samples is as close to uniform as the observed cells
    /// allow. Leftover slots (when the sample count is not a multiple of
    /// the arity) take consecutive values starting at zero, which biases
    /// ties toward low values.
    fn max_entropy_assignment(&mut self, var: usize, missing_rows: &[usize]) {
        let arity = self.data.arities()[var];
        let n = self.data.num_samples();

        let per_value = n / arity;
        let mut assignments: Vec<i32> = Vec::with_capacity(n);
        for value in 0..arity {
            for _ in 0..per_value {
                assignments.push(value as i32);
            }
        }
        for extra in 0..(n - assignments.len()) {
            assignments.push(extra as i32);
        }

        // observed cells consume their value's slot
        for s in 0..n {
            if self.data.missing().at(s, var) {
                continue;
            }
            let value = self.obs.at(s, var);
            if let Some(pos) = assignments.iter().position(|&a| a == value) {
                assignments.remove(pos);
            }
        }

        assignments.shuffle(&mut self.rng);
        for (k, &row) in missing_rows.iter().enumerate() {
            self.obs.set(row, var, assignments[k]);
        }
    }

    /// Swaps the value at `sample` with another missing sample of the same
    /// variable, retrying a few times to find a differing value. Returns
    /// `(sample, other, old_value, other_value)` for [Self::undo_swap].
    fn swap_cells(
        &mut self,
        var: usize,
        sample: usize,
        choices: &[usize],
    ) -> (usize, usize, i32, i32) {
        let value = self.obs.at(sample, var);
        let mut other = sample;
        let mut other_value = value;

        let tries = (choices.len() / 2).max(1);
        for _ in 0..tries {
            let candidate = choices[self.rng.random_range(0..choices.len())];
            other = candidate;
            other_value = self.obs.at(candidate, var);
            if other_value != value {
                break;
            }
        }

        self.alter_cell(sample, var, other_value);
        self.alter_cell(other, var, value);
        (sample, other, value, other_value)
    }

    fn undo_swap(&mut self, var: usize, (sample, other, value, other_value): (usize, usize, i32, i32)) {
        self.alter_cell(sample, var, value);
        self.alter_cell(other, var, other_value);
    }

    /// Writes a saved sampler state's assignments back into the working
    /// observations, in row-major missing-cell order.
    fn write_assignments(
        &mut self,
        cells: &[(usize, usize)],
        state: &GibbsState,
    ) -> BanyanResult<()> {
        ensure!(
            state.assigned.len() == cells.len(),
            InvalidConfig: "sampler state has {} assignments for {} missing cells",
            state.assigned.len(), cells.len()
        );
        for (&(row, col), &value) in cells.iter().zip(&state.assigned) {
            self.obs.set(row, col, value);
        }
        Ok(())
    }

    /// Averages the recorded scores (discarding burn-in unless resuming)
    /// and persists the sampler state.
    fn finish_run(
        &mut self,
        cells: &[(usize, usize)],
        chosen: &[f64],
        prev: Option<&GibbsState>,
        n_missing: usize,
    ) {
        let (score, count) = if let Some(state) = prev {
            let sum = logmath::log_add(
                logmath::log_sum(chosen.iter().copied()),
                state.score_sum(),
            );
            let count = chosen.len() + state.count;
            (sum - (count as f64).ln(), count)
        } else {
            let burn = self.burnin * n_missing;
            if chosen.len() > burn {
                let kept = &chosen[burn..];
                let sum = logmath::log_sum(kept.iter().copied());
                (sum - (kept.len() as f64).ln(), kept.len())
            } else if let Some(&last) = chosen.last() {
                // fewer iterations than the burn-in period
                (last, 1)
            } else {
                (self.score, 1)
            }
        };

        self.score = score;
        self.state = Some(GibbsState {
            avg_score: score,
            count,
            assigned: cells.iter().map(|&(row, col)| self.obs.at(row, col)).collect(),
        });
    }

    fn alter_impl(&mut self, add: &[Edge], remove: &[Edge]) -> BanyanResult<f64> {
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

        self.saved = Some((added, removed, self.score));
        self.run_sampler(None)
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

impl Evaluate for MissingDataEvaluator {
    fn network(&self) -> &Network {
        &self.net
    }

    fn score_network(&mut self) -> BanyanResult<f64> {
        self.run_sampler(None)
    }

    fn set_network(&mut self, net: &Network) -> BanyanResult<f64> {
        self.replace_with(net)
    }

    fn alter_network(&mut self, add: &[Edge], remove: &[Edge]) -> BanyanResult<f64> {
        self.alter_impl(add, remove)
    }

    fn restore_network(&mut self) -> BanyanResult<f64> {
        if let Some((added, removed, score)) = self.saved.take() {
            for &edge in &added {
                self.net.remove_edge(edge);
            }
            for &edge in &removed {
                self.net.add_edge(edge);
            }
            self.score = score;
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
