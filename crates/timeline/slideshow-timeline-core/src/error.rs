//! Error types for the timeline runner

use crate::formula::FormulaError;
use crate::ids::{NodeId, ShapeId};

/// Errors raised while building or running a timeline.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RunnerError {
    /// A required collaborator (stage or timeline) was not supplied
    #[error("Construct: {0}")]
    Construction(String),

    /// A keyframe formula failed to parse or evaluate
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// The stage has no shape with this id
    #[error("Shape not found: {shape}")]
    LookupMiss { shape: ShapeId },

    /// The timeline document is malformed
    #[error("Invalid timeline: {0}")]
    Timeline(String),
}

impl RunnerError {
    pub(crate) fn lookup_miss(shape: &ShapeId) -> Self {
        RunnerError::LookupMiss {
            shape: shape.clone(),
        }
    }
}

/// A node whose branch was halted by an error during playback.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeFailure {
    pub node: NodeId,
    pub error: RunnerError,
}
