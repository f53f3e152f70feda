pub mod logging;
pub mod model;
pub mod remedy;
pub mod traits;

// Re-export common types for convenience
pub use model::*;
pub use remedy::{
    compute_in_place_patches, DependencyChain, DependencyPatch, InPlacePatch, InPlaceResult,
    RemediationOptions, RemedyError, ResolutionVuln,
};
pub use traits::*;
