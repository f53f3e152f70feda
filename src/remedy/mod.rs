//! Remedy module - in-place patch computation over a resolved graph.
//!
//! This module houses the remediation engine proper:
//! - **Chains**: root-to-node path enumeration via [`chains::compute_chains`]
//! - **Aggregation**: per-version vulnerability state via [`aggregate::aggregate_vulns`]
//! - **Constraints**: dependent requirement intersection via [`constraint::ConstraintSet`]
//! - **Search**: candidate version selection and the orchestrator in [`in_place`]

use thiserror::Error;

pub mod aggregate;
pub mod chains;
pub mod constraint;
pub mod in_place;

// Re-export commonly used types
pub use aggregate::{ResolutionVuln, VulnAggregates};
pub use chains::{compute_chains, DependencyChain};
pub use constraint::ConstraintSet;
pub use in_place::{
    compute_in_place_patches, DependencyPatch, InPlacePatch, InPlaceResult, RemediationOptions,
};

/// Errors produced by the remediation engine.
#[derive(Error, Debug)]
pub enum RemedyError {
    /// No candidate version satisfies the in-place constraints. Expected,
    /// not fatal: the orchestrator records the vulnerability as unfixable
    /// and moves on.
    #[error("cannot find a version satisfying in-place constraints")]
    Impossible,

    /// A collaborator call failed. Fatal to the whole invocation: a partial
    /// answer from an unreliable data source would be misleading for a
    /// security tool.
    #[error("client error: {0}")]
    Client(#[from] crate::traits::ClientError),

    /// A requirement string failed to parse where correctness depends on it.
    #[error("invalid version requirement: {0}")]
    Requirement(#[from] semver::Error),
}
