//! Sufficient statistics for one node's family.
//!
//! A family is the node plus its parent set in canonical order. Its counts
//! form a table with one row per parent configuration and one column per
//! child value, plus a row-total column. Samples in which the child was
//! intervened on are excluded: their value was forced, not drawn from the
//! conditional distribution.

use crate::dataset::Dataset;
use crate::logmath;
use crate::matrix::Matrix;
use smallvec::SmallVec;
use std::sync::Arc;

/// Borrowed view of the cells a family needs: the observation matrix (the
/// samplers swap in their own working copy), the intervention mask, and
/// per-variable arities.
#[derive(Clone, Copy)]
pub struct DataView<'a> {
    pub observations: &'a Matrix<i32>,
    pub interventions: &'a Matrix<bool>,
    pub arities: &'a [usize],
}

impl<'a> DataView<'a> {
    pub fn from_dataset(data: &'a Dataset) -> Self {
        DataView {
            observations: data.observations(),
            interventions: data.interventions(),
            arities: data.arities(),
        }
    }

    pub fn num_samples(&self) -> usize {
        self.observations.rows()
    }
}

#[derive(Clone, Debug)]
pub struct MultinomialCpt {
    /// Family columns: child first, then parents.
    family: SmallVec<[usize; 8]>,
    /// Row-index multiplier per family column; the child's is 0 so a full
    /// family projection dots directly against this.
    offsets: SmallVec<[usize; 8]>,
    child_arity: usize,
    /// Number of parent configurations.
    rows: usize,
    /// `rows x (child_arity + 1)`, last column is the row total.
    counts: Vec<i64>,
    lnfac: Arc<[f64]>,
}

impl MultinomialCpt {
    pub fn build(view: DataView<'_>, child: usize, parents: &[usize]) -> Self {
        let child_arity = view.arities[child];

        let mut family: SmallVec<[usize; 8]> = SmallVec::with_capacity(parents.len() + 1);
        family.push(child);
        family.extend_from_slice(parents);

        let mut offsets: SmallVec<[usize; 8]> = SmallVec::with_capacity(parents.len() + 1);
        offsets.push(0);
        let mut stride = 1;
        for &parent in parents {
            offsets.push(stride);
            stride *= view.arities[parent];
        }
        let rows = stride;

        let max_arity = family.iter().map(|&v| view.arities[v]).max().unwrap_or(2);
        let lnfac = logmath::ln_factorials(view.num_samples() + max_arity);

        let mut cpt = MultinomialCpt {
            family,
            offsets,
            child_arity,
            rows,
            counts: vec![0; rows * (child_arity + 1)],
            lnfac,
        };

        for sample in 0..view.num_samples() {
            if view.interventions.at(sample, child) {
                continue;
            }
            let mut index = 0;
            for (i, &var) in cpt.family.iter().enumerate() {
                index += view.observations.at(sample, var) as usize * cpt.offsets[i];
            }
            let value = view.observations.at(sample, child) as usize;
            cpt.bump(index, value, 1);
        }

        cpt
    }

    #[inline]
    fn bump(&mut self, row: usize, value: usize, delta: i64) {
        let width = self.child_arity + 1;
        self.counts[row * width + value] += delta;
        self.counts[row * width + self.child_arity] += delta;
    }

    #[inline]
    fn config_index(&self, projection: &[i32]) -> usize {
        projection
            .iter()
            .zip(self.offsets.iter())
            .map(|(&v, &o)| v as usize * o)
            .sum()
    }

    /// Moves one sample's contribution from its old family projection to
    /// its new one after a single-cell edit. Both projections are in
    /// family order (child first). O(1).
    pub fn replace_row(&mut self, old: &[i32], new: &[i32]) {
        let add = self.config_index(new);
        let remove = self.config_index(old);
        self.bump(add, new[0] as usize, 1);
        self.bump(remove, old[0] as usize, -1);
    }

    /// The log of the Cooper-Herskovits g function: the log-marginal
    /// likelihood of the family under a uniform Dirichlet prior,
    ///
    /// `sum_j [ ln((r-1)!) - ln((N_j + r - 1)!) + sum_k ln(N_jk!) ]`
    pub fn log_marginal_likelihood(&self) -> f64 {
        let r = self.child_arity;
        let width = r + 1;
        let lnfac = &self.lnfac;
        let ln_r_minus_1 = lnfac[r - 1];

        let mut total = 0.0;
        for j in 0..self.rows {
            let row = &self.counts[j * width..(j + 1) * width];
            let row_total = row[r] as usize;
            let mut term = ln_r_minus_1 - lnfac[row_total + r - 1];
            for &count in &row[..r] {
                term += lnfac[count as usize];
            }
            total += term;
        }
        total
    }

    /// Family columns, child first then parents in canonical order.
    pub fn family(&self) -> &[usize] {
        &self.family
    }

    pub fn num_configs(&self) -> usize {
        self.rows
    }

    /// Counts for one parent configuration: child-value counts then the
    /// row total.
    pub fn config_counts(&self, row: usize) -> &[i64] {
        let width = self.child_arity + 1;
        &self.counts[row * width..(row + 1) * width]
    }
}
