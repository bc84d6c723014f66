//! Structural priors: soft per-edge energies plus hard constraints.

use crate::matrix::Matrix;
use crate::network::{Edge, Network};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An arbitrary adjacency predicate; a rejecting constraint drives the
/// log-prior to negative infinity. Constraints do not serialize.
pub type Constraint = Arc<dyn Fn(&Network) -> bool + Send + Sync>;

/// Log-prior over network structures.
///
/// Soft preferences come from an energy matrix `W` with weights
/// conventionally in `[0, 1]`; the log-prior of a network is
/// `-weight * sum of W[i,j] over present edges`. Hard constraints are
/// required edges, prohibited edges, and predicates; violating any of
/// them yields `-inf`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Prior {
    energy: Option<Matrix<f64>>,
    required: Vec<Edge>,
    prohibited: Vec<Edge>,
    #[serde(skip)]
    constraints: Vec<Constraint>,
    weight: f64,
}

impl Prior {
    /// The null prior: log-likelihood 0 for every network, as if no prior
    /// were used at all.
    pub fn null() -> Self {
        Prior {
            energy: None,
            required: Vec::new(),
            prohibited: Vec::new(),
            constraints: Vec::new(),
            weight: 1.0,
        }
    }

    /// Every edge equally likely (`W == 0.5`), which still penalizes
    /// edge-heavy networks.
    pub fn uniform(num_nodes: usize) -> Self {
        Prior {
            energy: Some(Matrix::filled(num_nodes, num_nodes, 0.5)),
            ..Prior::null()
        }
    }

    pub fn with_energy(mut self, energy: Matrix<f64>) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_required(mut self, edges: Vec<Edge>) -> Self {
        self.required = edges;
        self
    }

    pub fn with_prohibited(mut self, edges: Vec<Edge>) -> Self {
        self.prohibited = edges;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn required(&self) -> &[Edge] {
        &self.required
    }

    pub fn prohibited(&self) -> &[Edge] {
        &self.prohibited
    }

    pub fn log_likelihood(&self, net: &Network) -> f64 {
        for &edge in &self.required {
            if !net.contains_edge(edge) {
                return f64::NEG_INFINITY;
            }
        }
        for &edge in &self.prohibited {
            if net.contains_edge(edge) {
                return f64::NEG_INFINITY;
            }
        }
        for constraint in &self.constraints {
            if !constraint(net) {
                return f64::NEG_INFINITY;
            }
        }

        match &self.energy {
            None => 0.0,
            Some(weights) => {
                let energy: f64 = net.edges().map(|(src, dst)| weights.at(src, dst)).sum();
                -self.weight * energy
            }
        }
    }
}

impl Default for Prior {
    fn default() -> Self {
        Prior::null()
    }
}

impl fmt::Debug for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prior")
            .field("energy", &self.energy.as_ref().map(|m| (m.rows(), m.cols())))
            .field("required", &self.required)
            .field("prohibited", &self.prohibited)
            .field("constraints", &self.constraints.len())
            .field("weight", &self.weight)
            .finish()
    }
}
