//! Collaborator contracts consumed by the remediation engine.
//!
//! The engine never talks to a registry, vulnerability database, or manifest
//! parser directly. Everything external comes in through these traits:
//! - [`VulnerabilityMatcher`]: which vulnerabilities affect which versions
//! - [`DependencyClient`]: available versions and declared requirements
//! - [`ManifestClassifier`]: dev/prod grouping of direct dependencies
//!
//! [`ResolutionClient`] bundles all three so the entry point takes a single
//! client capability. Async calls are cancelled by dropping the future;
//! callers wanting deadlines wrap calls in `tokio::time::timeout`.

use crate::model::{Graph, PackageKey, Requirement, Vulnerability, VersionKey};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by external collaborators (registry, database, disk).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Vulnerability database lookups.
pub trait VulnerabilityMatcher: Send + Sync {
    /// Returns, for every node in the graph (indexed by [`NodeId`]), the
    /// vulnerabilities affecting that node's resolved version. The returned
    /// vector must have one entry per graph node.
    ///
    /// [`NodeId`]: crate::model::NodeId
    fn find_vulns(&self, graph: &Graph) -> Result<Vec<Vec<Vulnerability>>, ClientError>;

    /// Pure predicate: does `vuln` affect the package at this concrete
    /// version?
    fn is_affected(&self, vuln: &Vulnerability, version: &VersionKey) -> bool;
}

/// Registry lookups for available versions and declared requirements.
#[async_trait]
pub trait DependencyClient: Send + Sync {
    /// All known versions of a package, concrete releases and otherwise.
    /// Order is not assumed; callers sort.
    async fn versions(&self, pkg: &PackageKey) -> Result<Vec<VersionKey>, ClientError>;

    /// The dependencies declared by a concrete package version.
    async fn requirements(&self, version: &VersionKey) -> Result<Vec<Requirement>, ClientError>;

    /// Concrete versions matching a requirement-kind key, sorted ascending
    /// by the package's version order.
    async fn matching_versions(&self, req: &VersionKey) -> Result<Vec<VersionKey>, ClientError>;
}

/// Maps a direct dependency to its declared manifest groups
/// (e.g. `["dev"]` for an npm devDependency).
pub trait ManifestClassifier: Send + Sync {
    /// Groups the package is declared under in the root manifest. Empty if
    /// unknown — which downstream treats as "not dev" (safe default).
    fn dependency_groups(&self, pkg: &PackageKey) -> Vec<String>;
}

/// The full client capability required by
/// [`compute_in_place_patches`](crate::remedy::in_place::compute_in_place_patches).
///
/// Blanket-implemented for anything providing all three collaborator traits.
pub trait ResolutionClient: VulnerabilityMatcher + DependencyClient + ManifestClassifier {}

impl<T> ResolutionClient for T where
    T: VulnerabilityMatcher + DependencyClient + ManifestClassifier + ?Sized
{
}
