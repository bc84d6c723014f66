//! Directed acyclic graph over node indices.
//!
//! The graph is stored as two adjacency vectors (outgoing and incoming)
//! indexed by node id, so `parents(v)` and `children(v)` are O(deg) slice
//! reads and structural mutation touches only the two endpoint lists.
//! Parent lists stay in sorted order, which makes `(child, parents(child))`
//! a stable cache key.

use banyan_error::{BanyanResult, banyan_bail, banyan_err};
use rand::RngExt;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

pub type Edge = (usize, usize);

/// A sorted, duplicate-free set of node ids backed by a small vector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSet {
    inner: SmallVec<[usize; 8]>,
}

impl NodeSet {
    pub fn new() -> Self {
        NodeSet {
            inner: SmallVec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn contains(&self, node: usize) -> bool {
        self.inner.binary_search(&node).is_ok()
    }

    /// Inserts keeping sorted order; returns false if already present.
    #[inline]
    pub fn insert(&mut self, node: usize) -> bool {
        match self.inner.binary_search(&node) {
            Ok(_) => false,
            Err(pos) => {
                self.inner.insert(pos, node);
                true
            }
        }
    }

    /// Removes if present; returns whether anything was removed.
    #[inline]
    pub fn remove(&mut self, node: usize) -> bool {
        match self.inner.binary_search(&node) {
            Ok(pos) => {
                self.inner.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.inner
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl FromIterator<usize> for NodeSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut inner: SmallVec<[usize; 8]> = iter.into_iter().collect();
        inner.sort_unstable();
        inner.dedup();
        NodeSet { inner }
    }
}

/// A directed graph over `{0, .., n-1}`. Acyclicity is not an intrinsic
/// invariant of this type; it is enforced by the evaluators through
/// [CycleChecker] on every structural proposal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    outgoing: Vec<NodeSet>,
    incoming: Vec<NodeSet>,
}

impl Network {
    pub fn new(num_nodes: usize) -> Self {
        Network {
            outgoing: vec![NodeSet::new(); num_nodes],
            incoming: vec![NodeSet::new(); num_nodes],
        }
    }

    pub fn with_edges(num_nodes: usize, edges: impl IntoIterator<Item = Edge>) -> Self {
        let mut net = Network::new(num_nodes);
        for edge in edges {
            net.add_edge(edge);
        }
        net
    }

    /// Parses the `src,dst;src,dst;..` wire format. An empty string is a
    /// network with no edges.
    pub fn from_edge_string(num_nodes: usize, text: &str) -> BanyanResult<Self> {
        Ok(Network::with_edges(num_nodes, parse_edge_list(text)?))
    }

    pub fn num_nodes(&self) -> usize {
        self.outgoing.len()
    }

    pub fn num_edges(&self) -> usize {
        self.outgoing.iter().map(NodeSet::len).sum()
    }

    /// Adds an edge, returning false if it was already present.
    pub fn add_edge(&mut self, (src, dst): Edge) -> bool {
        let inserted = self.outgoing[src].insert(dst);
        if inserted {
            self.incoming[dst].insert(src);
        }
        inserted
    }

    /// Removes an edge if present; absent edges are ignored.
    pub fn remove_edge(&mut self, (src, dst): Edge) -> bool {
        let removed = self.outgoing[src].remove(dst);
        if removed {
            self.incoming[dst].remove(src);
        }
        removed
    }

    #[inline]
    pub fn contains_edge(&self, (src, dst): Edge) -> bool {
        src < self.outgoing.len() && self.outgoing[src].contains(dst)
    }

    /// Parents of `node` in canonical (sorted) order.
    #[inline]
    pub fn parents(&self, node: usize) -> &[usize] {
        self.incoming[node].as_slice()
    }

    #[inline]
    pub fn children(&self, node: usize) -> &[usize] {
        self.outgoing[node].as_slice()
    }

    /// Edges ordered by source then destination.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.outgoing
            .iter()
            .enumerate()
            .flat_map(|(src, dsts)| dsts.iter().map(move |&dst| (src, dst)))
    }

    pub fn clear(&mut self) {
        for set in &mut self.outgoing {
            set.clear();
        }
        for set in &mut self.incoming {
            set.clear();
        }
    }

    /// Replaces the edge set with a random one sampled at density `1/n`,
    /// honouring required and prohibited edges. The density halves each
    /// time a batch of attempts fails to produce a DAG.
    pub fn randomize(
        &mut self,
        rng: &mut SmallRng,
        required: &[Edge],
        prohibited: &[Edge],
    ) -> BanyanResult<()> {
        const ATTEMPTS_PER_DENSITY: usize = 50;
        const DENSITY_HALVINGS: usize = 8;

        let n = self.num_nodes();
        if n == 0 {
            return Ok(());
        }

        let mut checker = CycleChecker::new(n);
        let mut density = 1.0 / n as f64;

        for _ in 0..DENSITY_HALVINGS {
            for _ in 0..ATTEMPTS_PER_DENSITY {
                self.clear();
                for src in 0..n {
                    for dst in 0..n {
                        if src != dst && rng.random::<f64>() < density {
                            self.add_edge((src, dst));
                        }
                    }
                }
                for &edge in required {
                    self.add_edge(edge);
                }
                for &edge in prohibited {
                    self.remove_edge(edge);
                }
                if checker.is_acyclic(self) {
                    return Ok(());
                }
            }
            density /= 2.0;
        }

        self.clear();
        banyan_bail!(
            Engine: "failed to sample an acyclic network in {} attempts",
            ATTEMPTS_PER_DENSITY * DENSITY_HALVINGS
        )
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (src, dst) in self.edges() {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{},{}", src, dst)?;
            first = false;
        }
        Ok(())
    }
}

pub fn parse_edge_list(text: &str) -> BanyanResult<Vec<Edge>> {
    let mut edges = Vec::new();
    for part in text.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (src, dst) = part
            .split_once(',')
            .ok_or_else(|| banyan_err!(Parse: "malformed edge '{}', expected 'src,dst'", part))?;
        let src = src
            .trim()
            .parse::<usize>()
            .map_err(|_| banyan_err!(Parse: "invalid node index '{}'", src))?;
        let dst = dst
            .trim()
            .parse::<usize>()
            .map_err(|_| banyan_err!(Parse: "invalid node index '{}'", dst))?;
        edges.push((src, dst));
    }
    Ok(edges)
}

/// Iterative three-colour depth-first cycle detector.
///
/// The two scratch buffers are sized to the node count and reused across
/// calls, so the hot path allocates nothing.
#[derive(Clone, Debug)]
pub struct CycleChecker {
    color: Vec<u8>,
    stack: Vec<(usize, usize)>,
}

const WHITE: u8 = 0;
const GREY: u8 = 1;
const BLACK: u8 = 2;

impl CycleChecker {
    pub fn new(num_nodes: usize) -> Self {
        CycleChecker {
            color: vec![WHITE; num_nodes],
            stack: Vec::with_capacity(num_nodes),
        }
    }

    /// True when the network has no directed cycle. Handles disconnected
    /// graphs by starting a traversal from every unvisited node.
    pub fn is_acyclic(&mut self, net: &Network) -> bool {
        let n = net.num_nodes();
        if self.color.len() != n {
            self.color.resize(n, WHITE);
        }
        self.color.fill(WHITE);
        self.stack.clear();

        for start in 0..n {
            if self.color[start] != WHITE {
                continue;
            }
            self.color[start] = GREY;
            self.stack.push((start, 0));

            while !self.stack.is_empty() {
                let top = self.stack.len() - 1;
                let (node, next) = self.stack[top];
                let children = net.children(node);
                if next < children.len() {
                    self.stack[top].1 += 1;
                    let child = children[next];
                    match self.color[child] {
                        WHITE => {
                            self.color[child] = GREY;
                            self.stack.push((child, 0));
                        }
                        GREY => return false, // back edge
                        _ => {}
                    }
                } else {
                    self.color[node] = BLACK;
                    self.stack.pop();
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn parents_and_children_stay_sorted() {
        let net = Network::with_edges(5, [(3, 0), (1, 0), (2, 0), (0, 4)]);
        assert_eq!(net.parents(0), &[1, 2, 3]);
        assert_eq!(net.children(0), &[4]);
        assert_eq!(net.num_edges(), 4);
    }

    #[test]
    fn add_and_remove_report_effect() {
        let mut net = Network::new(3);
        assert!(net.add_edge((0, 1)));
        assert!(!net.add_edge((0, 1)));
        assert!(net.remove_edge((0, 1)));
        assert!(!net.remove_edge((0, 1)));
        assert_eq!(net.num_edges(), 0);
    }

    #[test]
    fn edge_string_round_trip() {
        let net = Network::from_edge_string(5, "0,1;1,4;2,4;3,2").unwrap();
        assert_eq!(net.to_string(), "0,1;1,4;2,4;3,2");
        assert_eq!(Network::new(4).to_string(), "");
        assert_eq!(Network::from_edge_string(4, "").unwrap().num_edges(), 0);
    }

    #[test]
    fn edge_string_rejects_garbage() {
        assert!(Network::from_edge_string(3, "0-1").is_err());
        assert!(Network::from_edge_string(3, "a,b").is_err());
    }

    #[test]
    fn detects_cycles() {
        let mut checker = CycleChecker::new(4);
        let mut net = Network::with_edges(4, [(0, 1), (1, 2), (2, 3)]);
        assert!(checker.is_acyclic(&net));

        net.add_edge((3, 0));
        assert!(!checker.is_acyclic(&net));

        net.remove_edge((3, 0));
        assert!(checker.is_acyclic(&net));
    }

    #[test]
    fn detects_self_loop() {
        let mut checker = CycleChecker::new(2);
        let net = Network::with_edges(2, [(1, 1)]);
        assert!(!checker.is_acyclic(&net));
    }

    #[test]
    fn handles_disconnected_components() {
        let mut checker = CycleChecker::new(6);
        let net = Network::with_edges(6, [(0, 1), (3, 4), (4, 5), (5, 3)]);
        assert!(!checker.is_acyclic(&net));

        let net = Network::with_edges(6, [(0, 1), (3, 4), (4, 5)]);
        assert!(checker.is_acyclic(&net));
    }

    #[test]
    fn randomize_produces_dag_with_constraints() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut net = Network::new(6);
        let mut checker = CycleChecker::new(6);
        for _ in 0..10 {
            net.randomize(&mut rng, &[(0, 1)], &[(2, 3)]).unwrap();
            assert!(checker.is_acyclic(&net));
            assert!(net.contains_edge((0, 1)));
            assert!(!net.contains_edge((2, 3)));
        }
    }
}
