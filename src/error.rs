use thiserror::Error;

/// Result type for propagation operations
pub type Result<T> = std::result::Result<T, PropagationError>;

/// Errors raised while building, filtering or propagating a field.
///
/// All of these are deterministic consequences of the inputs; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationError {
    /// Neither a real nor an imaginary channel was supplied
    #[error("at least one of the real or imaginary channels is required")]
    MissingChannel,

    /// An engine operation needs state that has not been set up yet
    #[error("no {0} available")]
    MissingInput(&'static str),

    /// Two arrays that must share a shape do not
    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    Dimension {
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("wavelength must be positive and finite, got {0}")]
    InvalidWavelength(f64),

    #[error("invalid {which} pitch ({dx}, {dy}): {reason}")]
    InvalidPitch {
        which: &'static str,
        dx: f64,
        dy: f64,
        reason: &'static str,
    },

    #[error("invalid propagation distance {0}")]
    InvalidDistance(f64),

    #[error("curvature radius must be finite and non-zero, got {0}")]
    InvalidCurvature(f64),

    /// Director angles out of range or too steep for the sampling
    #[error("invalid wave direction: {0}")]
    InvalidDirection(String),

    #[error("invalid batch plan: {0}")]
    InvalidPlan(String),

    #[error("at least one output channel must be enabled")]
    NoOutputChannels,

    #[error("region of interest ({x}, {y}, {width}, {height}) is empty or outside the {shape:?} grid")]
    EmptyRoi {
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        shape: [usize; 2],
    },

    /// A kernel constant evaluated to a non-finite number
    #[error("non-finite value while evaluating {0}")]
    NumericOverflow(&'static str),

    #[error("{planes} planes requested, more than the limit of {max}; confirm the batch to continue")]
    PlaneLimit { planes: usize, max: usize },

    #[error("batch cancelled after {completed} planes")]
    Cancelled { completed: usize },
}

impl PropagationError {
    /// True for the errors caused by an out of range numeric parameter.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(
            self,
            PropagationError::InvalidWavelength(_)
                | PropagationError::InvalidPitch { .. }
                | PropagationError::InvalidDistance(_)
                | PropagationError::InvalidCurvature(_)
                | PropagationError::InvalidDirection(_)
                | PropagationError::InvalidPlan(_)
        )
    }
}
