//! Error type shared by the model-building layers.

use crate::tensor::TensorError;
use thiserror::Error;

/// Errors raised while describing, building, running or persisting a network.
#[derive(Error, Debug)]
pub enum InceptionError {
    /// An activation identifier other than `identity` or `rectified-linear`.
    #[error("Unsupported activation: {0:?} (expected \"identity\" or \"rectified-linear\")")]
    UnsupportedActivation(String),

    /// A pooling identifier other than `avg` or `max`.
    #[error("Unsupported pooling: {0:?} (expected \"avg\" or \"max\")")]
    UnsupportedPooling(String),

    /// Branches of a block disagree on a non-channel dimension.
    #[error("Branch shape mismatch in {scope}: {shapes:?}")]
    BranchShapeMismatch {
        scope: String,
        shapes: Vec<Vec<usize>>,
    },

    /// A parameter name was requested again with a different shape.
    #[error("Parameter {name} already registered with shape {existing:?}, requested {requested:?}")]
    ParameterShapeConflict {
        name: String,
        existing: Vec<usize>,
        requested: Vec<usize>,
    },

    /// A stage of the network produced a shape the stage plan did not predict.
    #[error("Stage {stage} produced {got:?}, expected {expected:?}")]
    UnexpectedStageShape {
        stage: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// The network input is unusable (wrong channel count, too small, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An initializer could not produce values (bad distribution parameters, zero fan).
    #[error("Initializer error for {name}: {reason}")]
    Initializer { name: String, reason: String },

    /// A checkpoint could not be encoded or decoded.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Values were requested from a runtime that only tracks shapes.
    #[error("Tensor {0} has no host data on this backend")]
    MissingHostData(String),

    /// Invalid session or model configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InceptionError>;
