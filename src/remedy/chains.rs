//! Dependency chain computation.
//!
//! A [`DependencyChain`] records *why* a vulnerable node is in the graph:
//! the path of edges from that node back up to the root manifest. Chains
//! drive two things downstream:
//! - constraint building: the requirement on the edge terminating at the
//!   vulnerable node bounds which replacement versions its dependents accept
//! - dev-only classification: a vulnerability is dev-only when every chain
//!   to it enters through a dev-group direct dependency

use crate::model::{Ecosystem, Edge, Graph, NodeId, Vulnerability, VersionKey, VersionKind};
use crate::traits::{DependencyClient, ManifestClassifier, VulnerabilityMatcher};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// An ordered path of edges from a vulnerable node up to the root.
///
/// Stored root-edge-last: `edges[0]` terminates at the vulnerable node and
/// the last edge originates at the root. Chains are non-empty by
/// construction ([`compute_chains`] seeds each with at least one edge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyChain {
    pub edges: Vec<Edge>,
}

impl DependencyChain {
    /// The root's direct dependency this chain enters through, with the
    /// root manifest's requirement on it.
    pub fn direct_dependency<'g>(&self, graph: &'g Graph) -> Option<(&'g VersionKey, &str)> {
        let edge = self.edges.last()?;
        Some((graph.version_of(edge.to)?, &edge.requirement))
    }

    /// The vulnerable end of the chain: the node the first edge terminates
    /// at, with the immediate dependent's requirement on it. This is the
    /// requirement the constraint builder intersects across chains.
    pub fn end_dependency<'g>(&self, graph: &'g Graph) -> Option<(&'g VersionKey, &str)> {
        let edge = self.edges.first()?;
        Some((graph.version_of(edge.to)?, &edge.requirement))
    }
}

/// Computes all acyclic paths from each target node to the root (node 0).
///
/// Breadth-first expansion over a reverse adjacency index. Self-loop edges
/// are dropped up front; an edge that would revisit a node already on the
/// chain is skipped (cycle guard, set-membership on node id). Every distinct
/// path is retained, so a node reachable two ways yields two chains.
///
/// Exponential in pathological diamond/cyclic graphs; acceptable because
/// only the vulnerable subset of nodes is ever passed in.
///
/// The result is parallel to `targets`; chains appear in queue pop order.
pub fn compute_chains(graph: &Graph, targets: &[NodeId]) -> Vec<Vec<DependencyChain>> {
    // Reverse adjacency: to-node -> incoming edges.
    let mut parent_edges: BTreeMap<NodeId, Vec<&Edge>> = BTreeMap::new();
    for e in &graph.edges {
        if e.from == e.to {
            continue;
        }
        parent_edges.entry(e.to).or_default().push(e);
    }

    let mut all_chains = Vec::with_capacity(targets.len());
    for &target in targets {
        let mut chains = Vec::new();
        // Each queue entry carries the to-nodes already on the chain so the
        // cycle check is a set lookup rather than a scan.
        let mut queue: VecDeque<(Vec<Edge>, BTreeSet<NodeId>)> = VecDeque::new();
        for &edge in parent_edges.get(&target).into_iter().flatten() {
            queue.push_back((vec![edge.clone()], BTreeSet::from([edge.to])));
        }
        while let Some((chain, seen)) = queue.pop_front() {
            let last = &chain[chain.len() - 1];
            if last.from == 0 {
                // Reached the root: this chain is complete.
                chains.push(DependencyChain { edges: chain });
                continue;
            }
            for &edge in parent_edges.get(&last.from).into_iter().flatten() {
                if seen.contains(&edge.to) {
                    continue;
                }
                let mut next = chain.clone();
                next.push(edge.clone());
                let mut next_seen = seen.clone();
                next_seen.insert(edge.to);
                queue.push_back((next, next_seen));
            }
        }
        all_chains.push(chains);
    }

    all_chains
}

/// Whether `groups` marks a dependency as development-only in `ecosystem`.
pub fn is_dev_group(ecosystem: Ecosystem, groups: &[String]) -> bool {
    match ecosystem {
        Ecosystem::Npm | Ecosystem::Cargo | Ecosystem::PyPi => {
            groups.iter().any(|g| g == "dev")
        }
    }
}

/// Whether this chain enters the graph through a dev-group direct
/// dependency. An unclassifiable package is treated as not dev.
pub fn chain_is_dev<M>(graph: &Graph, chain: &DependencyChain, classifier: &M) -> bool
where
    M: ManifestClassifier + ?Sized,
{
    let Some((direct, _)) = chain.direct_dependency(graph) else {
        return false;
    };
    let groups = classifier.dependency_groups(&direct.pkg);
    is_dev_group(direct.pkg.ecosystem, &groups)
}

/// Checks whether a chain is actually forcing the vulnerable version to be
/// chosen: the highest version the immediate dependent's requirement allows
/// is itself affected by the vulnerability.
///
/// This is an approximation with known false positives — a sibling
/// constraint elsewhere in the graph can pin the package even when this
/// chain's own requirement admits a clean version. Lookup failures are
/// treated conservatively as "constrains".
pub async fn chain_constrains<C>(
    client: &C,
    graph: &Graph,
    chain: &DependencyChain,
    vuln: &Vulnerability,
) -> bool
where
    C: DependencyClient + VulnerabilityMatcher + ?Sized,
{
    let Some((vk, req)) = chain.end_dependency(graph) else {
        return false;
    };
    let mut probe = vk.clone();
    probe.version = req.to_string();
    probe.kind = VersionKind::Requirement;

    let vers = match client.matching_versions(&probe).await {
        Ok(v) if !v.is_empty() => v,
        _ => return true,
    };
    let best = &vers[vers.len() - 1];

    client.is_affected(vuln, best)
}
