//! Routine arguments and per-side call descriptions

use crate::error::ModelError;
use crate::value::{AttrValue, Scalar};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Positional and keyword arguments for one routine invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineArgs {
    /// Positional arguments in call order
    pub positional: Vec<AttrValue>,
    /// Keyword arguments in insertion order
    pub keyword: IndexMap<String, AttrValue>,
}

impl RoutineArgs {
    /// No arguments
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<AttrValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Add a keyword argument
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// True if neither positional nor keyword arguments are present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Positional argument `index`, required by `routine`
    pub fn require_positional(&self, routine: &str, index: usize) -> Result<&AttrValue, ModelError> {
        self.positional
            .get(index)
            .ok_or_else(|| ModelError::missing_argument(routine, format!("#{index}")))
    }

    /// Keyword argument `name`, required by `routine`
    pub fn require_keyword(&self, routine: &str, name: &str) -> Result<&AttrValue, ModelError> {
        self.keyword
            .get(name)
            .ok_or_else(|| ModelError::missing_argument(routine, name))
    }
}

/// A routine under test with the call signature each side expects
///
/// The reimplementation usually takes positional arguments while the legacy
/// reference is called keyword-only; the harness passes each set through
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineSpec {
    /// Routine name, identical on both sides
    pub name: String,
    /// Arguments for the new instance
    pub new_args: RoutineArgs,
    /// Arguments for the legacy instance
    pub legacy_args: RoutineArgs,
}

impl RoutineSpec {
    /// Routine called without arguments on both sides
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            new_args: RoutineArgs::new(),
            legacy_args: RoutineArgs::new(),
        }
    }

    /// With arguments for the new instance
    #[must_use]
    pub fn with_new_args(mut self, args: RoutineArgs) -> Self {
        self.new_args = args;
        self
    }

    /// With arguments for the legacy instance
    #[must_use]
    pub fn with_legacy_args(mut self, args: RoutineArgs) -> Self {
        self.legacy_args = args;
        self
    }
}

/// Configured routine call with scalar positional arguments
///
/// Used for fixed call sequences such as the legacy allocation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineCall {
    /// Routine name
    pub routine: String,
    /// Positional scalar arguments
    #[serde(default)]
    pub args: Vec<Scalar>,
}

impl RoutineCall {
    /// Call without arguments
    #[must_use]
    pub fn new(routine: impl Into<String>) -> Self {
        Self {
            routine: routine.into(),
            args: Vec::new(),
        }
    }

    /// Call with positional scalar arguments
    #[must_use]
    pub fn with_args(routine: impl Into<String>, args: Vec<Scalar>) -> Self {
        Self {
            routine: routine.into(),
            args,
        }
    }

    /// Arguments in routine-call form
    #[must_use]
    pub fn to_args(&self) -> RoutineArgs {
        RoutineArgs {
            positional: self.args.iter().cloned().map(AttrValue::Scalar).collect(),
            keyword: IndexMap::new(),
        }
    }
}
