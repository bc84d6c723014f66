//! Local family scores and their cache.
//!
//! Scores are keyed on `(child, sorted parent set)` so that two networks
//! sharing a family share the cache entry regardless of the order the
//! parents were attached in.

use crate::cpt::{DataView, MultinomialCpt};
use smallvec::SmallVec;
use std::collections::HashMap;

pub type SortedParents = SmallVec<[usize; 8]>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FamilyKey {
    child: usize,
    parents: SortedParents,
}

impl FamilyKey {
    pub fn new(child: usize, parents: &[usize]) -> Self {
        let mut sorted: SortedParents = SmallVec::from_slice(parents);
        sorted.sort_unstable();
        FamilyKey {
            child,
            parents: sorted,
        }
    }

    pub fn child(&self) -> usize {
        self.child
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents
    }
}

/// Log-marginal-likelihood of a single family, computed from scratch.
/// The parent order does not matter; the set is canonicalized first.
pub fn family_score(view: DataView<'_>, child: usize, parents: &[usize]) -> f64 {
    let key = FamilyKey::new(child, parents);
    MultinomialCpt::build(view, child, key.parents()).log_marginal_likelihood()
}

/// Cache of local scores. Unbounded unless a capacity is configured, in
/// which case insertion simply stops once the cap is reached; entries are
/// immutable once inserted.
#[derive(Clone, Debug, Default)]
pub struct LocalScoreCache {
    entries: HashMap<FamilyKey, f64>,
    capacity: Option<usize>,
    hits: u64,
    misses: u64,
}

impl LocalScoreCache {
    pub fn new() -> Self {
        LocalScoreCache::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        LocalScoreCache {
            capacity: Some(capacity),
            ..LocalScoreCache::default()
        }
    }

    pub fn get_or_insert_with(
        &mut self,
        child: usize,
        parents: &[usize],
        compute: impl FnOnce() -> f64,
    ) -> f64 {
        let key = FamilyKey::new(child, parents);
        if let Some(&score) = self.entries.get(&key) {
            self.hits += 1;
            return score;
        }

        self.misses += 1;
        let score = compute();
        if self.capacity.map_or(true, |cap| self.entries.len() < cap) {
            self.entries.insert(key, score);
        }
        score
    }

    pub fn insert(&mut self, child: usize, parents: &[usize], score: f64) {
        self.entries.insert(FamilyKey::new(child, parents), score);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
