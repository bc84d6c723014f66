pub mod cpt;
pub mod dataset;
pub mod discretize;
pub mod evaluator;
pub mod logmath;
pub mod matrix;
pub mod missing;
pub mod network;
pub mod prior;
pub mod score;

pub use cpt::{DataView, MultinomialCpt};
pub use dataset::{DataTable, Dataset, MergeAxis, Sample, VarKind, Variable};
pub use discretize::maximum_entropy_discretize;
pub use evaluator::{Evaluate, NetworkEvaluator, build_evaluator};
pub use matrix::Matrix;
pub use missing::{
    GibbsState, MissingDataEvaluator, MissingMethod, SamplerConfig, StoppingCriteria,
};
pub use network::{CycleChecker, Edge, Network, NodeSet};
pub use prior::{Constraint, Prior};
pub use score::{FamilyKey, LocalScoreCache, family_score};

pub use banyan_error::{BanyanError, BanyanResult, ErrorCode, banyan_err, banyan_bail, ensure};
