//! Physically constrained spectrum augmentation

pub mod operators;
pub mod sampler;
pub mod spline;

use serde::{Deserialize, Serialize};

pub use operators::PerturbationOperator;
pub use sampler::{AugmentError, AugmentationSampler};
pub use spline::CubicSpline;

/// Records how a sample's spectrum came to be.
///
/// Downstream consumers use this to weight or filter synthetic samples and
/// to audit which operator produced a given training pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// The spectrum is an unmodified library reference
    Reference { index: usize },
    /// The spectrum was synthesized from the listed library references
    Synthesized {
        operator: PerturbationOperator,
        sources: Vec<usize>,
    },
}

impl Provenance {
    /// Stable label used in reports and sidecar metadata
    pub fn label(&self) -> &'static str {
        match self {
            Provenance::Reference { .. } => "reference",
            Provenance::Synthesized { operator, .. } => operator.name(),
        }
    }
}
