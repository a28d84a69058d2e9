//! Error types for the harness
//!
//! Infrastructure failures (configuration, start-up, worker communication)
//! abort a run before or during synchronization. Numeric failures are raised
//! only by the post-routine variable checks; the advisory scan never errors.

use crate::compare::Tolerance;
use crate::state::HarnessState;
use odiff_model::{AttrValue, ModelError};
use std::fmt;

/// Which instance an error or value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The reimplementation, hosted in-process
    New,
    /// The legacy reference, hosted in the worker process
    Legacy,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// Values that disagreed during a hard check
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// Offending attribute
    pub attribute: String,
    /// Value on the new instance
    pub new: Option<AttrValue>,
    /// Value on the legacy instance
    pub legacy: Option<AttrValue>,
    /// Tolerance in force
    pub tolerance: Tolerance,
    /// What the comparator found
    pub detail: String,
}

fn render(value: Option<&AttrValue>) -> String {
    value.map_or_else(|| "None".to_string(), AttrValue::summary)
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: new={} legacy={} ({}; {})",
            self.attribute,
            render(self.new.as_ref()),
            render(self.legacy.as_ref()),
            self.detail,
            self.tolerance
        )
    }
}

/// Main harness error type
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Missing reference library or malformed listings/config
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Mirrored attribute not addressable on one side
    #[error("no attribute {name} on the {side} instance")]
    Attribute {
        /// Attribute name
        name: String,
        /// Side that rejected it
        side: Side,
    },

    /// Routine absent on one side
    #[error("no routine {name} on the {side} instance")]
    RoutineNotFound {
        /// Routine name
        name: String,
        /// Side that lacks it
        side: Side,
    },

    /// Worker could not be launched or failed to construct its instance
    #[error("legacy worker failed to start with library {library}: {message}")]
    Startup {
        /// Reference library path as configured
        library: String,
        /// Reason reported by the OS or the worker
        message: String,
    },

    /// Values differ beyond tolerance in a hard check
    #[error("comparison mismatch: {0}")]
    ComparisonMismatch(Box<Mismatch>),

    /// Worker crashed, hung up or sent garbage
    #[error("communication with legacy worker failed: {0}")]
    Communication(String),

    /// A model raised while handling a request
    #[error("{side} model error: {message}")]
    Model {
        /// Side that raised
        side: Side,
        /// Error message from the model
        message: String,
    },

    /// The post-routine check reported failure without naming a mismatch
    #[error("check after routine {routine} failed")]
    CheckFailed {
        /// Routine whose check failed
        routine: String,
    },

    /// Engine driven through an illegal state change
    #[error("illegal harness transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: HarnessState,
        /// Requested state
        to: HarnessState,
    },
}

impl HarnessError {
    /// Failure of the harness machinery rather than of the model comparison
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Startup { .. }
                | Self::Communication(_)
                | Self::IllegalTransition { .. }
        )
    }

    /// Numeric disagreement between the two instances
    #[inline]
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::ComparisonMismatch(_) | Self::CheckFailed { .. })
    }

    /// Wrap a mismatch
    #[must_use]
    pub fn mismatch(mismatch: Mismatch) -> Self {
        Self::ComparisonMismatch(Box::new(mismatch))
    }

    /// Translate a model error raised on `side`
    #[must_use]
    pub fn from_model(side: Side, error: ModelError) -> Self {
        match error {
            ModelError::UnknownAttribute(name) => Self::Attribute { name, side },
            ModelError::UnknownRoutine(name) => Self::RoutineNotFound { name, side },
            other => Self::Model {
                side,
                message: other.to_string(),
            },
        }
    }
}

/// Result alias for harness operations
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
