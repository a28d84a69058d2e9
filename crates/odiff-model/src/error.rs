//! Error types raised by model instances
//!
//! Both the reimplementation and the legacy reference report failures through
//! [`ModelError`]. The harness translates them into its own error kinds and
//! tags them with the side that raised them.

/// Failure raised by a model instance
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// No module of the instance exposes this attribute
    #[error("no attribute named {0}")]
    UnknownAttribute(String),

    /// Attribute exists but cannot be assigned
    #[error("attribute {0} is read-only")]
    ReadOnly(String),

    /// No routine with this name
    #[error("no routine named {0}")]
    UnknownRoutine(String),

    /// Value of the wrong kind for the target
    #[error("attribute {name} expects a {expected} value")]
    TypeMismatch {
        /// Attribute or argument name
        name: String,
        /// Expected value description
        expected: &'static str,
    },

    /// Array assignment with a shape that differs from the allocated one
    #[error("attribute {name} has shape {expected:?}, got {found:?}")]
    ShapeMismatch {
        /// Attribute name
        name: String,
        /// Allocated shape
        expected: Vec<usize>,
        /// Shape of the value being assigned
        found: Vec<usize>,
    },

    /// Grid dimensions are fixed once memory has been allocated
    #[error("grid dimension {0} cannot change after allocation")]
    GridFrozen(String),

    /// Routine called without a required argument
    #[error("routine {routine} requires argument {argument}")]
    MissingArgument {
        /// Routine name
        routine: String,
        /// Missing positional index or keyword
        argument: String,
    },

    /// Routine needs allocated state
    #[error("{0} called before memory allocation")]
    NotAllocated(String),

    /// A second instance was requested in a process that already hosts one
    #[error("legacy model state is process-global; an instance is already loaded in this process")]
    NonReentrant,

    /// Reference library missing or unusable
    #[error("reference library {path}: {reason}")]
    Library {
        /// Library path as given
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Operation not offered by this instance
    #[error("operation {0} is not supported by this instance")]
    Unsupported(String),

    /// Settings failed legalization
    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl ModelError {
    /// Shorthand for [`ModelError::TypeMismatch`]
    #[must_use]
    pub fn type_mismatch(name: &str, expected: &'static str) -> Self {
        Self::TypeMismatch {
            name: name.to_string(),
            expected,
        }
    }

    /// Shorthand for [`ModelError::MissingArgument`]
    #[must_use]
    pub fn missing_argument(routine: &str, argument: impl Into<String>) -> Self {
        Self::MissingArgument {
            routine: routine.to_string(),
            argument: argument.into(),
        }
    }

    /// True if the error means the name is not addressable at all
    #[inline]
    #[must_use]
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, Self::UnknownAttribute(_) | Self::UnknownRoutine(_))
    }
}
