//! Per-version-key vulnerability aggregation.
//!
//! The orchestrator wants to answer "which versions are vulnerable, which
//! nodes instantiate them, and what do those nodes currently depend on"
//! without walking the graph again per vulnerability. This module builds
//! those aggregates once per invocation.

use crate::model::{Graph, NodeId, Vulnerability, VersionKey, VersionKind};
use crate::remedy::chains::{chain_is_dev, compute_chains, DependencyChain};
use crate::remedy::RemedyError;
use crate::traits::{ManifestClassifier, VulnerabilityMatcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A vulnerability together with every chain making it reachable.
///
/// `dev_only` is true only when *every* contributing chain enters through a
/// dev-group direct dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionVuln {
    pub vulnerability: Vulnerability,
    pub problem_chains: Vec<DependencyChain>,
    pub dev_only: bool,
}

/// Aggregated vulnerability state, keyed deterministically.
#[derive(Debug, Default)]
pub struct VulnAggregates {
    /// Direct-child version keys of every node that hosts a vulnerability.
    pub node_dependencies: BTreeMap<NodeId, Vec<VersionKey>>,
    /// Merged vulnerabilities per distinct resolved version.
    pub vk_vulns: BTreeMap<VersionKey, Vec<ResolutionVuln>>,
    /// Every node instantiating each vulnerable version.
    pub vk_nodes: BTreeMap<VersionKey, Vec<NodeId>>,
}

/// Builds [`VulnAggregates`] from the matcher's per-node vulnerability hits.
///
/// Merge rule: two nodes sharing a version key and reporting the same
/// vulnerability id collapse into one [`ResolutionVuln`] — chains
/// concatenate and `dev_only` is ANDed.
///
/// # Errors
///
/// Fails if the vulnerability matcher fails; nothing else here touches I/O.
pub fn aggregate_vulns<C>(client: &C, graph: &Graph) -> Result<VulnAggregates, RemedyError>
where
    C: VulnerabilityMatcher + ManifestClassifier + ?Sized,
{
    let node_vulns = client.find_vulns(graph)?;

    let mut result = VulnAggregates::default();

    // Direct dependencies of every vulnerable node.
    for e in &graph.edges {
        if node_vulns.get(e.from).is_some_and(|v| !v.is_empty()) {
            if let Some(child) = graph.version_of(e.to) {
                result
                    .node_dependencies
                    .entry(e.from)
                    .or_default()
                    .push(child.clone());
            }
        }
    }

    let node_ids: Vec<NodeId> = node_vulns
        .iter()
        .enumerate()
        .filter(|(_, vulns)| !vulns.is_empty())
        .map(|(id, _)| id)
        .collect();
    // All chains for the vulnerable subset. Possibly overkill — only the
    // end requirements and direct dependencies are consumed downstream.
    let node_chains = compute_chains(graph, &node_ids);

    for (node, chains) in node_ids.iter().zip(node_chains) {
        let Some(vk) = graph.version_of(*node) else {
            continue;
        };
        if vk.kind != VersionKind::Concrete {
            warn!(node, version = %vk, "skipping node with non-concrete resolved version");
            continue;
        }
        result.vk_nodes.entry(vk.clone()).or_default().push(*node);

        let dev_only =
            !chains.is_empty() && chains.iter().all(|c| chain_is_dev(graph, c, client));

        for vuln in &node_vulns[*node] {
            let entry = result.vk_vulns.entry(vk.clone()).or_default();
            match entry
                .iter_mut()
                .find(|rv| rv.vulnerability.id == vuln.id)
            {
                Some(existing) => {
                    existing.problem_chains.extend(chains.iter().cloned());
                    existing.dev_only = existing.dev_only && dev_only;
                }
                None => entry.push(ResolutionVuln {
                    vulnerability: vuln.clone(),
                    problem_chains: chains.clone(),
                    dev_only,
                }),
            }
        }
    }

    Ok(result)
}
