//! Error taxonomy of the interface layer.
//!
//! Errors are kept rich inside the crate and only turned into the solvers'
//! integer conventions at the outermost adapter, see [`BehaviourError::status_code`].

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use thiserror::Error;

/// Result type alias used by every fallible operation of the crate.
pub type Result<T> = std::result::Result<T, BehaviourError>;

/// Closed set of failure categories, in the priority order used by the
/// dispatchers. The discriminant is the status code handed to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum ErrorCategory {
    SolverSpecific = -2,
    OutOfBounds = -3,
    Divergence = -4,
    Material = -5,
    Internal = -6,
    Standard = -7,
    Unknown = -8,
}

impl ErrorCategory {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum BehaviourError {
    #[error("behaviour '{behaviour}' is not defined for the modelling hypothesis '{hypothesis}'")]
    InvalidModellingHypothesis {
        behaviour: String,
        hypothesis: String,
    },

    #[error("unmatched number of material properties (expected {expected}, got {got})")]
    UnMatchedNumberOfMaterialProperties { expected: usize, got: usize },

    #[error("unmatched number of state variables (expected {expected}, got {got})")]
    UnMatchedNumberOfStateVariables { expected: usize, got: usize },

    #[error("invalid tensor size (expected {expected}, got {got})")]
    InvalidTensorSize { expected: usize, got: usize },

    #[error("behaviour '{0}' requires a stress-free expansion handler, none was given")]
    UnsupportedStressFreeExpansion(String),

    #[error("negative time step ({0}) given to behaviour '{1}'")]
    NegativeTimeStep(f64, String),

    #[error("consistent tangent operator is not available for behaviour '{0}'")]
    ConsistentTangentOperatorIsNotAvailable(String),

    #[error("prediction operator is not available for behaviour '{0}'")]
    PredictionOperatorIsNotAvailable(String),

    #[error("invalid stiffness request code {0}")]
    InvalidStiffnessRequest(f64),

    #[error("unsupported case: {0}")]
    UnsupportedCase(String),

    #[error("no state variable with the external name 'AxialStrain' in behaviour '{0}'")]
    MissingAxialStrain(String),

    #[error("several state variables with the external name 'AxialStrain' in behaviour '{0}'")]
    AmbiguousAxialStrain(String),

    #[error("integration failed for behaviour '{0}'")]
    IntegrationFailed(String),

    #[error("maximum number of sub-steps reached for behaviour '{0}'")]
    MaximumSubSteppingReached(String),

    #[error("variable '{variable}' is out of bounds ({value} not in {bounds})")]
    OutOfBounds {
        variable: String,
        value: f64,
        bounds: String,
    },

    #[error("no convergence after {iterations} iterations (residual: {residual:.2e})")]
    Divergence { iterations: u32, residual: f64 },

    #[error("material error: {0}")]
    Material(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),

    #[error("invalid parameters file: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Misuse of the crate by the calling code. Never mapped to a status
    /// code by the MTest driver.
    #[error("programming error: {0}")]
    Programming(String),
}

impl BehaviourError {
    pub fn category(&self) -> ErrorCategory {
        use BehaviourError::*;
        match self {
            InvalidModellingHypothesis { .. }
            | UnMatchedNumberOfMaterialProperties { .. }
            | UnMatchedNumberOfStateVariables { .. }
            | InvalidTensorSize { .. }
            | UnsupportedStressFreeExpansion(_)
            | NegativeTimeStep(..)
            | ConsistentTangentOperatorIsNotAvailable(_)
            | PredictionOperatorIsNotAvailable(_)
            | InvalidStiffnessRequest(_)
            | UnsupportedCase(_)
            | MissingAxialStrain(_)
            | AmbiguousAxialStrain(_)
            | IntegrationFailed(_)
            | MaximumSubSteppingReached(_) => ErrorCategory::SolverSpecific,
            OutOfBounds { .. } => ErrorCategory::OutOfBounds,
            Divergence { .. } => ErrorCategory::Divergence,
            Material(_) => ErrorCategory::Material,
            Internal(_) => ErrorCategory::Internal,
            Other(_) | Serialization(_) => ErrorCategory::Standard,
            Programming(_) => ErrorCategory::Unknown,
        }
    }

    pub fn status_code(&self) -> i32 {
        self.category().code()
    }

    /// `true` for errors a caller may recover from by reducing the time step.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            BehaviourError::Divergence { .. } | BehaviourError::IntegrationFailed(_)
        )
    }

    pub(crate) fn invalid_hypothesis(
        behaviour: &str,
        hypothesis: impl std::fmt::Display,
    ) -> Self {
        BehaviourError::InvalidModellingHypothesis {
            behaviour: behaviour.to_string(),
            hypothesis: hypothesis.to_string(),
        }
    }
}

/// Status code for a panic caught at an ABI boundary.
pub const UNKNOWN_ERROR_CODE: i32 = ErrorCategory::Unknown as i32;
