use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of a node in [`Graph::nodes`]. Node 0 is always the root manifest.
pub type NodeId = usize;

/// Package ecosystem a dependency belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ecosystem {
    Npm,
    Cargo,
    PyPi,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::Cargo => write!(f, "cargo"),
            Ecosystem::PyPi => write!(f, "pypi"),
        }
    }
}

/// Ecosystem-qualified package identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub name: String,
    pub ecosystem: Ecosystem,
}

impl PackageKey {
    pub fn new(name: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            ecosystem,
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.name)
    }
}

/// Whether a version string is an actually-resolved release or an
/// unresolved requirement/range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VersionKind {
    Concrete,
    Requirement,
}

/// Identity of a package at a version (or at an unresolved range).
///
/// Only keys with [`VersionKind::Concrete`] may be treated as the resolved
/// version of a graph node. The derived `Ord` compares version strings
/// lexically and exists for deterministic map keys; use
/// [`cmp_version_strings`](crate::remedy::constraint::cmp_version_strings)
/// for actual version ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    pub pkg: PackageKey,
    pub version: String,
    pub kind: VersionKind,
}

impl VersionKey {
    /// Builds a key for a resolved release.
    pub fn concrete(pkg: PackageKey, version: impl Into<String>) -> Self {
        Self {
            pkg,
            version: version.into(),
            kind: VersionKind::Concrete,
        }
    }

    /// Builds a key for an unresolved requirement string (e.g. a range).
    pub fn requirement(pkg: PackageKey, version: impl Into<String>) -> Self {
        Self {
            pkg,
            version: version.into(),
            kind: VersionKind::Requirement,
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pkg, self.version)
    }
}

/// A resolved package-version in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub version: VersionKey,
}

/// "From declares a dependency on To satisfying Requirement."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub requirement: String,
}

/// A resolved dependency graph, as produced by lockfile resolution.
///
/// Node 0 is the root manifest. The graph is read-only input to the
/// remediation engine; cycles are possible and tolerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its id. The first node added is the root.
    pub fn add_node(&mut self, version: VersionKey) -> NodeId {
        self.nodes.push(Node { version });
        self.nodes.len() - 1
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, requirement: impl Into<String>) {
        self.edges.push(Edge {
            from,
            to,
            requirement: requirement.into(),
        });
    }

    /// Resolved version of `node`, or `None` for an out-of-range id.
    pub fn version_of(&self, node: NodeId) -> Option<&VersionKey> {
        self.nodes.get(node).map(|n| &n.version)
    }
}

/// A vulnerability record as reported by the upstream scanner.
///
/// Matching a vulnerability against a package-version is delegated to the
/// [`VulnerabilityMatcher`](crate::traits::VulnerabilityMatcher); this struct
/// only carries identity and display data. `extra` is flattened so advisory
/// fields we don't model (references, aliases, ...) survive round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Advisory identifier, e.g. "GHSA-xxxx" or "CVE-2023-XXXX"
    pub id: String,
    pub severity: Option<String>,
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Vulnerability {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity: None,
            summary: None,
            extra: HashMap::new(),
        }
    }
}

/// Classification of a declared dependency requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementKind {
    /// Required at runtime
    Runtime,
    /// Required only to build the package
    Build,
    /// Development/test only
    Dev,
    /// Carries the optional attribute (e.g. npm optionalDependencies)
    Optional,
}

impl RequirementKind {
    /// A regular dependency must be present for the package to function.
    pub fn is_regular(&self) -> bool {
        matches!(self, RequirementKind::Runtime)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, RequirementKind::Optional)
    }
}

/// One declared dependency of a package version, as returned by the
/// registry client. The key's version field holds the requirement string
/// and its kind is [`VersionKind::Requirement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: VersionKey,
    pub kind: RequirementKind,
}
