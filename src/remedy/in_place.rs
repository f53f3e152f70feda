//! In-place patch computation.
//!
//! The orchestrator in this module answers: which single-package version
//! bumps fix which vulnerabilities in a resolved graph, without
//! re-resolving anything? It composes the aggregates, constraint sets, and
//! candidate search into one entry point,
//! [`compute_in_place_patches`], with:
//! - Bounded fan-out across vulnerabilities via `futures` (each search
//!   reads only shared immutable aggregates)
//! - Abort-on-error semantics: any collaborator failure discards partial
//!   results; only [`RemedyError::Impossible`] is survivable per vulnerability
//! - A deterministic final sort so identical inputs yield identical output

use crate::model::{PackageKey, Vulnerability, VersionKey, VersionKind};
use crate::remedy::aggregate::{aggregate_vulns, ResolutionVuln, VulnAggregates};
use crate::remedy::constraint::{
    build_constraint_set, cmp_version_strings, is_major_bump, parse_requirement, ConstraintSet,
};
use crate::remedy::RemedyError;
use crate::traits::{DependencyClient, ResolutionClient};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// Upper bound on concurrently running per-vulnerability searches.
const MAX_CONCURRENT_SEARCHES: usize = 8;

// ============================================================================
// Options & Result Types
// ============================================================================

/// Policy configuration for a remediation run.
#[derive(Debug, Clone, Default)]
pub struct RemediationOptions {
    /// Permit bumps that cross a major version boundary.
    pub allow_major: bool,

    /// Packages that must never be touched. Vulnerabilities on them go
    /// straight to the unfixable list.
    pub avoid_pkgs: Vec<PackageKey>,

    /// Consider vulnerabilities only reachable through dev dependencies.
    pub dev_deps: bool,

    /// Vulnerability ids to skip entirely.
    pub ignore_vulns: Vec<String>,

    /// When non-empty, only these vulnerability ids are considered.
    pub explicit_vulns: Vec<String>,
}

impl RemediationOptions {
    /// The caller's vulnerability filter: whether this run should attempt
    /// to remediate `vuln` at all.
    pub fn matches_vuln(&self, vuln: &ResolutionVuln) -> bool {
        let id = &vuln.vulnerability.id;
        if self.ignore_vulns.iter().any(|i| i == id) {
            return false;
        }
        if !self.explicit_vulns.is_empty() && !self.explicit_vulns.iter().any(|i| i == id) {
            return false;
        }
        if vuln.dev_only && !self.dev_deps {
            return false;
        }
        true
    }
}

/// A proposed single-package version change. Identity for patch
/// deduplication is this whole triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPatch {
    pub pkg: PackageKey,
    pub orig_version: String,
    pub new_version: String,
}

/// A dependency patch plus every vulnerability it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InPlacePatch {
    pub patch: DependencyPatch,
    pub resolved_vulns: Vec<ResolutionVuln>,
}

/// Outcome of a remediation run: ranked patches and the vulnerabilities
/// that admit no valid in-place version change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InPlaceResult {
    pub patches: Vec<InPlacePatch>,
    pub unfixable: Vec<ResolutionVuln>,
}

// ============================================================================
// Candidate Version Search
// ============================================================================

/// Boolean acceptance test over a concrete candidate version.
///
/// Implementations must treat internal failures as rejection — a hard error
/// that should abort the run belongs in the version listing, not here.
#[async_trait]
pub trait VersionPredicate: Sync {
    async fn satisfied(&self, candidate: &VersionKey) -> bool;
}

/// Returns the highest concrete version of `pkg` accepted by `predicate`.
///
/// The registry's version list is sorted ascending by the package's version
/// order, then scanned from the top; requirement-kind entries are skipped.
///
/// # Errors
///
/// [`RemedyError::Impossible`] when no version qualifies; the version
/// listing failure otherwise.
pub async fn find_fixed_version<C, P>(
    client: &C,
    pkg: &PackageKey,
    predicate: &P,
) -> Result<VersionKey, RemedyError>
where
    C: DependencyClient + ?Sized,
    P: VersionPredicate + ?Sized,
{
    let mut vers = client.versions(pkg).await?;
    vers.sort_by(|a, b| cmp_version_strings(&a.version, &b.version));

    for vk in vers.iter().rev() {
        if vk.kind == VersionKind::Concrete && predicate.satisfied(vk).await {
            return Ok(vk.clone());
        }
    }

    Err(RemedyError::Impossible)
}

/// The composed in-place acceptance test: bump policy, dependent
/// constraints, child-dependency satisfaction, and a vulnerability
/// re-check, short-circuiting in that order.
struct InPlaceCheck<'a, C: ?Sized> {
    client: &'a C,
    allow_major: bool,
    orig: &'a VersionKey,
    constraint: Option<&'a ConstraintSet>,
    nodes: &'a [usize],
    node_dependencies: &'a BTreeMap<usize, Vec<VersionKey>>,
    vuln: &'a Vulnerability,
}

#[async_trait]
impl<C> VersionPredicate for InPlaceCheck<'_, C>
where
    C: ResolutionClient + ?Sized,
{
    async fn satisfied(&self, candidate: &VersionKey) -> bool {
        // 1. Major-version policy.
        if !self.allow_major {
            match is_major_bump(&self.orig.version, &candidate.version) {
                Ok(false) => {}
                _ => return false,
            }
        }

        // 2. Every current dependent must still accept the candidate. A
        //    missing entry means constraint building was skipped for this
        //    package; proceed unconstrained (already warned about).
        if let Some(set) = self.constraint {
            if !set.matches(&candidate.version).unwrap_or(false) {
                return false;
            }
        }

        // 3. The candidate's own dependencies must already be present under
        //    every node instantiating the original version. One bad node
        //    blocks the fix for all of them.
        for node in self.nodes {
            let children = self
                .node_dependencies
                .get(node)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            match dependencies_satisfied(self.client, candidate, children).await {
                Ok(true) => {}
                _ => return false,
            }
        }

        // 4. The candidate must not itself be affected.
        !self.client.is_affected(self.vuln, candidate)
    }
}

// ============================================================================
// Dependency Satisfaction
// ============================================================================

/// Checks whether `candidate`'s declared dependencies are already met by
/// the `children` currently resolved under the vulnerable node, without
/// installing anything new.
///
/// Optional dependencies count as mandatory only when something already
/// pulled them in: an optional entry whose package is absent from
/// `children` is pruned from the regular set (npm lists such packages in
/// both). Other attributes, e.g. peer dependencies, are not modeled.
///
/// # Errors
///
/// Propagates requirements-fetch failures and unparsable requirement
/// strings on dependencies that must be checked.
pub async fn dependencies_satisfied<C>(
    client: &C,
    candidate: &VersionKey,
    children: &[VersionKey],
) -> Result<bool, RemedyError>
where
    C: DependencyClient + ?Sized,
{
    let reqs = client.requirements(candidate).await?;

    let mut deps = Vec::new();
    let mut opt_deps = Vec::new();
    for r in reqs {
        if r.kind.is_regular() {
            deps.push(r.key);
        } else if r.kind.is_optional() {
            opt_deps.push(r.key);
        }
    }

    // Optional packages nothing has installed are not requirements.
    for opt in &opt_deps {
        if !children.iter().any(|c| c.pkg.name == opt.pkg.name) {
            if let Some(idx) = deps.iter().position(|d| d.pkg.name == opt.pkg.name) {
                deps.remove(idx);
            }
        }
    }

    for dep in &deps {
        let req = parse_requirement(&dep.version)?;
        let met = children.iter().any(|child| {
            child.pkg.name == dep.pkg.name
                && Version::parse(&child.version)
                    .map(|v| req.matches(&v))
                    .unwrap_or(false)
        });
        if !met {
            debug!(candidate = %candidate, dependency = %dep, "unmet dependency");
            return Ok(false);
        }
    }

    Ok(true)
}

// ============================================================================
// Orchestrator
// ============================================================================

enum VulnOutcome {
    Unfixable(ResolutionVuln),
    Fixed(DependencyPatch, ResolutionVuln),
}

/// Finds all in-place version changes that would fix vulnerabilities in a
/// resolved graph.
///
/// Pipeline: aggregate vulnerabilities by version key, intersect dependent
/// constraints per key, then fan out one bounded-concurrency search per
/// vulnerability and merge the outcomes. Searches only read the shared
/// aggregates; ordering between them doesn't matter because the final patch
/// list is sorted deterministically afterwards.
///
/// Vulnerabilities on avoid-listed packages and searches ending in
/// [`RemedyError::Impossible`] land in `unfixable`. Any other error aborts
/// the whole computation — no partial result is returned, and in-flight
/// collaborator calls are dropped.
///
/// Known limitation: vulnerabilities newly introduced by a candidate
/// version are not detected.
#[instrument(skip_all)]
pub async fn compute_in_place_patches<C>(
    client: &C,
    graph: &crate::model::Graph,
    opts: &RemediationOptions,
) -> Result<InPlaceResult, RemedyError>
where
    C: ResolutionClient + ?Sized,
{
    let aggr = aggregate_vulns(client, graph)?;

    // Overall constraint imposed by the dependents of each vulnerable
    // version: the intersection of every distinct requirement string on
    // edges terminating there.
    let mut vk_constraints: BTreeMap<VersionKey, ConstraintSet> = BTreeMap::new();
    for (vk, vulns) in &aggr.vk_vulns {
        let mut req_strs = BTreeSet::new();
        for vuln in vulns {
            for chain in &vuln.problem_chains {
                if let Some((_, req)) = chain.end_dependency(graph) {
                    req_strs.insert(req);
                }
            }
        }
        if req_strs.is_empty() {
            continue;
        }
        match build_constraint_set(req_strs.into_iter()) {
            Ok(set) => {
                vk_constraints.insert(vk.clone(), set);
            }
            // The package proceeds unconstrained. Possibly unsafe (an
            // otherwise-excluded bump can slip through), hence the warning.
            Err(err) => warn!(
                package = %vk.pkg,
                version = %vk.version,
                error = %err,
                "failed to build dependent constraint set; leaving package unconstrained"
            ),
        }
    }

    // One search per vulnerability, fanned out with bounded concurrency and
    // merged back in deterministic key order.
    let searches: Vec<_> = aggr
        .vk_vulns
        .iter()
        .flat_map(|(vk, vulns)| vulns.iter().map(move |v| (vk, v)))
        .filter(|(_, vuln)| opts.matches_vuln(vuln))
        .collect();

    let outcomes: Vec<VulnOutcome> = stream::iter(searches.into_iter().map(|(vk, vuln)| {
        process_vuln(client, opts, &aggr, vk_constraints.get(vk), vk, vuln)
    }))
    .buffered(MAX_CONCURRENT_SEARCHES)
    .try_collect()
    .await?;

    let mut result = InPlaceResult::default();
    for outcome in outcomes {
        match outcome {
            VulnOutcome::Unfixable(vuln) => result.unfixable.push(vuln),
            VulnOutcome::Fixed(patch, vuln) => {
                match result.patches.iter_mut().find(|p| p.patch == patch) {
                    Some(existing) => existing.resolved_vulns.push(vuln),
                    None => result.patches.push(InPlacePatch {
                        patch,
                        resolved_vulns: vec![vuln],
                    }),
                }
            }
        }
    }

    // Rank for priority and stable output. Original-version and new-version
    // tie-breaks are lexical on the stored strings.
    result.patches.sort_by(|a, b| {
        b.resolved_vulns
            .len()
            .cmp(&a.resolved_vulns.len())
            .then_with(|| a.patch.pkg.name.cmp(&b.patch.pkg.name))
            .then_with(|| a.patch.orig_version.cmp(&b.patch.orig_version))
            .then_with(|| b.patch.new_version.cmp(&a.patch.new_version))
    });

    info!(
        patches = result.patches.len(),
        unfixable = result.unfixable.len(),
        "in-place remediation finished"
    );

    Ok(result)
}

async fn process_vuln<C>(
    client: &C,
    opts: &RemediationOptions,
    aggr: &VulnAggregates,
    constraint: Option<&ConstraintSet>,
    vk: &VersionKey,
    vuln: &ResolutionVuln,
) -> Result<VulnOutcome, RemedyError>
where
    C: ResolutionClient + ?Sized,
{
    if opts.avoid_pkgs.contains(&vk.pkg) {
        return Ok(VulnOutcome::Unfixable(vuln.clone()));
    }

    let check = InPlaceCheck {
        client,
        allow_major: opts.allow_major,
        orig: vk,
        constraint,
        nodes: aggr.vk_nodes.get(vk).map(Vec::as_slice).unwrap_or(&[]),
        node_dependencies: &aggr.node_dependencies,
        vuln: &vuln.vulnerability,
    };

    match find_fixed_version(client, &vk.pkg, &check).await {
        Ok(new_vk) => Ok(VulnOutcome::Fixed(
            DependencyPatch {
                pkg: vk.pkg.clone(),
                orig_version: vk.version.clone(),
                new_version: new_vk.version,
            },
            vuln.clone(),
        )),
        Err(RemedyError::Impossible) => Ok(VulnOutcome::Unfixable(vuln.clone())),
        Err(err) => Err(err),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ecosystem, Graph, NodeId, Requirement, RequirementKind};
    use crate::traits::{ClientError, ManifestClassifier, VulnerabilityMatcher};
    use std::collections::BTreeSet;

    fn npm(name: &str) -> PackageKey {
        PackageKey::new(name, Ecosystem::Npm)
    }

    fn vk(name: &str, version: &str) -> VersionKey {
        VersionKey::concrete(npm(name), version)
    }

    fn runtime_req(name: &str, constraint: &str) -> Requirement {
        Requirement {
            key: VersionKey::requirement(npm(name), constraint),
            kind: RequirementKind::Runtime,
        }
    }

    fn optional_req(name: &str, constraint: &str) -> Requirement {
        Requirement {
            key: VersionKey::requirement(npm(name), constraint),
            kind: RequirementKind::Optional,
        }
    }

    #[derive(Default)]
    struct MockClient {
        versions: BTreeMap<PackageKey, Vec<VersionKey>>,
        requirements: BTreeMap<VersionKey, Vec<Requirement>>,
        node_vulns: BTreeMap<NodeId, Vec<Vulnerability>>,
        // (vuln id, package name, version)
        affected: BTreeSet<(String, String, String)>,
        groups: BTreeMap<PackageKey, Vec<String>>,
        fail_versions: bool,
    }

    impl MockClient {
        fn affect(&mut self, vuln_id: &str, pkg: &str, version: &str) {
            self.affected.insert((
                vuln_id.to_string(),
                pkg.to_string(),
                version.to_string(),
            ));
        }
    }

    impl VulnerabilityMatcher for MockClient {
        fn find_vulns(&self, graph: &Graph) -> Result<Vec<Vec<Vulnerability>>, ClientError> {
            Ok((0..graph.nodes.len())
                .map(|id| self.node_vulns.get(&id).cloned().unwrap_or_default())
                .collect())
        }

        fn is_affected(&self, vuln: &Vulnerability, version: &VersionKey) -> bool {
            self.affected.contains(&(
                vuln.id.clone(),
                version.pkg.name.clone(),
                version.version.clone(),
            ))
        }
    }

    #[async_trait]
    impl DependencyClient for MockClient {
        async fn versions(&self, pkg: &PackageKey) -> Result<Vec<VersionKey>, ClientError> {
            if self.fail_versions {
                return Err(ClientError::Network("registry down".to_string()));
            }
            Ok(self.versions.get(pkg).cloned().unwrap_or_default())
        }

        async fn requirements(
            &self,
            version: &VersionKey,
        ) -> Result<Vec<Requirement>, ClientError> {
            Ok(self.requirements.get(version).cloned().unwrap_or_default())
        }

        async fn matching_versions(
            &self,
            _req: &VersionKey,
        ) -> Result<Vec<VersionKey>, ClientError> {
            Ok(vec![])
        }
    }

    impl ManifestClassifier for MockClient {
        fn dependency_groups(&self, pkg: &PackageKey) -> Vec<String> {
            self.groups.get(pkg).cloned().unwrap_or_default()
        }
    }

    /// root(0) -> a(1) -> b(2), with the given requirement on b.
    fn scenario_graph(req_on_b: &str) -> Graph {
        let mut g = Graph::new();
        g.add_node(vk("root", "1.0.0"));
        g.add_node(vk("a", "1.0.0"));
        g.add_node(vk("b", "1.0.0"));
        g.add_edge(0, 1, "^1.0.0");
        g.add_edge(1, 2, req_on_b);
        g
    }

    fn scenario_client() -> MockClient {
        let mut client = MockClient::default();
        client.versions.insert(
            npm("b"),
            vec![vk("b", "2.0.0"), vk("b", "1.0.0"), vk("b", "1.1.0")],
        );
        client.node_vulns.insert(2, vec![Vulnerability::new("GHSA-b")]);
        client.affect("GHSA-b", "b", "1.0.0");
        client
    }

    #[tokio::test]
    async fn test_scenario_a_minor_bump_within_range() {
        crate::logging::init();
        let g = scenario_graph("^1.0.0");
        let client = scenario_client();
        let opts = RemediationOptions::default();

        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();

        assert!(result.unfixable.is_empty());
        assert_eq!(result.patches.len(), 1);
        let p = &result.patches[0];
        assert_eq!(p.patch.pkg, npm("b"));
        assert_eq!(p.patch.orig_version, "1.0.0");
        // 2.0.0 is excluded both by the major-bump policy and by a's range.
        assert_eq!(p.patch.new_version, "1.1.0");
        assert_eq!(p.resolved_vulns.len(), 1);
        assert_eq!(p.resolved_vulns[0].vulnerability.id, "GHSA-b");
    }

    #[tokio::test]
    async fn test_scenario_b_exact_pin_is_unfixable() {
        let g = scenario_graph("1.0.0");
        let client = scenario_client();
        let opts = RemediationOptions::default();

        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();

        assert!(result.patches.is_empty());
        assert_eq!(result.unfixable.len(), 1);
        assert_eq!(result.unfixable[0].vulnerability.id, "GHSA-b");
    }

    #[tokio::test]
    async fn test_scenario_c_unmet_child_dependency() {
        let g = scenario_graph("^1.0.0");
        let mut client = scenario_client();
        // b@1.1.0 needs c@^2.0.0 but b's node has no child c.
        client
            .requirements
            .insert(vk("b", "1.1.0"), vec![runtime_req("c", "^2.0.0")]);

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        // 1.1.0 fails satisfaction, 1.0.0 is vulnerable, 2.0.0 is a major.
        assert!(result.patches.is_empty());
        assert_eq!(result.unfixable.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_c_present_child_satisfies() {
        let mut g = scenario_graph("^1.0.0");
        let c = g.add_node(vk("c", "2.1.0"));
        g.add_edge(2, c, "^2.0.0");

        let mut client = scenario_client();
        client
            .requirements
            .insert(vk("b", "1.1.0"), vec![runtime_req("c", "^2.0.0")]);

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].patch.new_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_absent_optional_dependency_is_pruned() {
        let g = scenario_graph("^1.0.0");
        let mut client = scenario_client();
        // npm lists optional packages in both sets; "fsevents" is not
        // installed, so it must not count as a requirement.
        client.requirements.insert(
            vk("b", "1.1.0"),
            vec![
                runtime_req("fsevents", "^2.0.0"),
                optional_req("fsevents", "^2.0.0"),
            ],
        );

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].patch.new_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_installed_optional_dependency_is_checked() {
        let mut g = scenario_graph("^1.0.0");
        // fsevents@1.0.0 is installed under b but b@1.1.0 wants ^2.0.0.
        let fse = g.add_node(vk("fsevents", "1.0.0"));
        g.add_edge(2, fse, "^1.0.0");

        let mut client = scenario_client();
        client.requirements.insert(
            vk("b", "1.1.0"),
            vec![
                runtime_req("fsevents", "^2.0.0"),
                optional_req("fsevents", "^2.0.0"),
            ],
        );

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        assert!(result.patches.is_empty());
        assert_eq!(result.unfixable.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_d_one_patch_many_vulns() {
        let mut g = Graph::new();
        g.add_node(vk("root", "1.0.0"));
        g.add_node(vk("d", "1.0.0"));
        g.add_edge(0, 1, ">=1.0.0");

        let mut client = MockClient::default();
        client.versions.insert(
            npm("d"),
            vec![vk("d", "1.0.0"), vk("d", "2.0.0"), vk("d", "3.0.0")],
        );
        client.node_vulns.insert(
            1,
            vec![Vulnerability::new("GHSA-1"), Vulnerability::new("GHSA-2")],
        );
        for v in ["1.0.0", "2.0.0"] {
            client.affect("GHSA-1", "d", v);
            client.affect("GHSA-2", "d", v);
        }

        let opts = RemediationOptions {
            allow_major: true,
            ..Default::default()
        };
        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();

        assert_eq!(result.patches.len(), 1);
        let p = &result.patches[0];
        assert_eq!(p.patch.new_version, "3.0.0");
        let ids: Vec<_> = p
            .resolved_vulns
            .iter()
            .map(|v| v.vulnerability.id.as_str())
            .collect();
        assert_eq!(ids, vec!["GHSA-1", "GHSA-2"]);
    }

    #[tokio::test]
    async fn test_major_bump_policy() {
        let g = scenario_graph(">=1.0.0");
        let mut client = scenario_client();
        // Only the major bump is clean.
        client.affect("GHSA-b", "b", "1.1.0");

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();
        assert!(result.patches.is_empty());
        assert_eq!(result.unfixable.len(), 1);

        let opts = RemediationOptions {
            allow_major: true,
            ..Default::default()
        };
        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].patch.new_version, "2.0.0");
    }

    #[tokio::test]
    async fn test_avoided_package_is_unfixable() {
        let g = scenario_graph("^1.0.0");
        let client = scenario_client();
        let opts = RemediationOptions {
            avoid_pkgs: vec![npm("b")],
            ..Default::default()
        };

        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();

        assert!(result.patches.is_empty());
        assert_eq!(result.unfixable.len(), 1);
        assert_eq!(result.unfixable[0].vulnerability.id, "GHSA-b");
    }

    #[tokio::test]
    async fn test_latest_requirement_is_wildcard() {
        let g = scenario_graph("latest");
        let client = scenario_client();

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        // "latest" imposes no range; only the major-bump policy applies.
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].patch.new_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_unparsable_constraint_leaves_package_unconstrained() {
        let g = scenario_graph("not-a-range");
        let client = scenario_client();

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        // The dependent constraint is skipped (warned), so the minor bump
        // still goes through.
        assert_eq!(result.patches.len(), 1);
        assert_eq!(result.patches[0].patch.new_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_dev_only_vulns_are_filtered_by_default() {
        let g = scenario_graph("^1.0.0");
        let mut client = scenario_client();
        client.groups.insert(npm("a"), vec!["dev".to_string()]);

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();
        assert!(result.patches.is_empty());
        assert!(result.unfixable.is_empty());

        let opts = RemediationOptions {
            dev_deps: true,
            ..Default::default()
        };
        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();
        assert_eq!(result.patches.len(), 1);
    }

    #[tokio::test]
    async fn test_ignored_and_explicit_vuln_filters() {
        let g = scenario_graph("^1.0.0");
        let client = scenario_client();

        let opts = RemediationOptions {
            ignore_vulns: vec!["GHSA-b".to_string()],
            ..Default::default()
        };
        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();
        assert!(result.patches.is_empty());
        assert!(result.unfixable.is_empty());

        let opts = RemediationOptions {
            explicit_vulns: vec!["GHSA-other".to_string()],
            ..Default::default()
        };
        let result = compute_in_place_patches(&client, &g, &opts).await.unwrap();
        assert!(result.patches.is_empty());
        assert!(result.unfixable.is_empty());
    }

    #[tokio::test]
    async fn test_version_listing_failure_aborts() {
        let g = scenario_graph("^1.0.0");
        let mut client = scenario_client();
        client.fail_versions = true;

        let err = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemedyError::Client(_)));
    }

    #[tokio::test]
    async fn test_idempotence() {
        let g = scenario_graph("^1.0.0");
        let client = scenario_client();
        let opts = RemediationOptions::default();

        let first = compute_in_place_patches(&client, &g, &opts).await.unwrap();
        let second = compute_in_place_patches(&client, &g, &opts).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_patch_sort_order_and_dedup() {
        // Three independent vulnerable packages: x fixes two vulns with one
        // bump, y and z fix one each.
        let mut g = Graph::new();
        g.add_node(vk("root", "1.0.0"));
        g.add_node(vk("x", "1.0.0"));
        g.add_node(vk("y", "1.0.0"));
        g.add_node(vk("z", "1.0.0"));
        g.add_edge(0, 1, "^1.0.0");
        g.add_edge(0, 2, "^1.0.0");
        g.add_edge(0, 3, "^1.0.0");

        let mut client = MockClient::default();
        for name in ["x", "y", "z"] {
            client
                .versions
                .insert(npm(name), vec![vk(name, "1.0.0"), vk(name, "1.2.0")]);
        }
        client.node_vulns.insert(
            1,
            vec![Vulnerability::new("GHSA-x1"), Vulnerability::new("GHSA-x2")],
        );
        client.node_vulns.insert(2, vec![Vulnerability::new("GHSA-y")]);
        client.node_vulns.insert(3, vec![Vulnerability::new("GHSA-z")]);
        client.affect("GHSA-x1", "x", "1.0.0");
        client.affect("GHSA-x2", "x", "1.0.0");
        client.affect("GHSA-y", "y", "1.0.0");
        client.affect("GHSA-z", "z", "1.0.0");

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        // x first (2 vulns fixed), then y, z by name.
        let names: Vec<_> = result
            .patches
            .iter()
            .map(|p| p.patch.pkg.name.as_str())
            .collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert_eq!(result.patches[0].resolved_vulns.len(), 2);

        // No duplicate (pkg, orig, new) triples.
        let mut triples: Vec<_> = result.patches.iter().map(|p| &p.patch).collect();
        triples.dedup();
        assert_eq!(triples.len(), result.patches.len());
    }

    #[tokio::test]
    async fn test_shared_version_nodes_block_conservatively() {
        // b is instantiated twice at 1.0.0; one instance is missing the
        // child b@1.1.0 needs, which must block the fix for both.
        let mut g = Graph::new();
        g.add_node(vk("root", "1.0.0"));
        g.add_node(vk("a", "1.0.0"));
        g.add_node(vk("b", "1.0.0"));
        g.add_node(vk("c", "1.0.0"));
        g.add_node(vk("b", "1.0.0"));
        g.add_node(vk("dep", "2.0.0"));
        g.add_edge(0, 1, "^1.0.0");
        g.add_edge(1, 2, "^1.0.0");
        g.add_edge(0, 3, "^1.0.0");
        g.add_edge(3, 4, "^1.0.0");
        // Only the first b instance has the child dep@2.0.0.
        g.add_edge(2, 5, "^2.0.0");

        let mut client = MockClient::default();
        client
            .versions
            .insert(npm("b"), vec![vk("b", "1.0.0"), vk("b", "1.1.0")]);
        client
            .requirements
            .insert(vk("b", "1.1.0"), vec![runtime_req("dep", "^2.0.0")]);
        client.node_vulns.insert(2, vec![Vulnerability::new("GHSA-b")]);
        client.node_vulns.insert(4, vec![Vulnerability::new("GHSA-b")]);
        client.affect("GHSA-b", "b", "1.0.0");

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();

        assert!(result.patches.is_empty());
        assert_eq!(result.unfixable.len(), 1);
    }

    #[tokio::test]
    async fn test_requirement_kind_entries_are_skipped_in_search() {
        let g = scenario_graph("^1.0.0");
        let mut client = scenario_client();
        // A dist-tag style entry must never be selected.
        client.versions.get_mut(&npm("b")).unwrap().push(
            VersionKey::requirement(npm("b"), "^1.2.0"),
        );

        let result = compute_in_place_patches(&client, &g, &RemediationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.patches[0].patch.new_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_find_fixed_version_impossible() {
        struct Never;
        #[async_trait]
        impl VersionPredicate for Never {
            async fn satisfied(&self, _candidate: &VersionKey) -> bool {
                false
            }
        }

        let client = scenario_client();
        let err = find_fixed_version(&client, &npm("b"), &Never)
            .await
            .unwrap_err();
        assert!(matches!(err, RemedyError::Impossible));
    }
}
