//! Attribute values
//!
//! Every attribute of a model instance is either a [`Scalar`] or a
//! multi-dimensional `f64` array. Arrays keep whatever memory layout the
//! owning instance uses; equality and iteration are always logical.

use crate::error::ModelError;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Single number, flag or string
    Scalar,
    /// Multi-dimensional numeric array
    Array,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// Scalar attribute value
///
/// Integers and floats compare numerically, so `Int(4) == Float(4.0)`.
/// Floats follow IEEE rules: `NaN` never equals itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean switch
    Bool(bool),
    /// Integer setting such as a grid dimension
    Int(i64),
    /// Floating point setting
    Float(f64),
    /// Free-form text
    Text(String),
}

impl Scalar {
    /// Numeric view of the scalar
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// Value of a named attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Scalar attribute
    Scalar(Scalar),
    /// Array attribute; zero elements means "allocated empty"
    Array(ArrayD<f64>),
}

impl AttrValue {
    /// Kind of the value
    #[inline]
    #[must_use]
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Scalar(_) => AttributeKind::Scalar,
            Self::Array(_) => AttributeKind::Array,
        }
    }

    /// Array with `ndim` zero-length axes
    #[must_use]
    pub fn empty_array(ndim: usize) -> Self {
        Self::Array(ArrayD::zeros(IxDyn(&vec![0; ndim])))
    }

    /// True for arrays holding no elements
    #[inline]
    #[must_use]
    pub fn is_empty_array(&self) -> bool {
        matches!(self, Self::Array(a) if a.is_empty())
    }

    /// Borrow as scalar
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Array(_) => None,
        }
    }

    /// Borrow as array
    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Self::Array(a) => Some(a),
            Self::Scalar(_) => None,
        }
    }

    /// Numeric scalar as `f64`
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_f64)
    }

    /// Integer scalar; floats qualify when they hold an exact integer
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.as_scalar()? {
            Scalar::Int(v) => Some(*v),
            #[allow(clippy::cast_possible_truncation)]
            Scalar::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Largest element of an array, or the numeric value of a scalar
    #[must_use]
    pub fn max_value(&self) -> Option<f64> {
        match self {
            Self::Scalar(s) => s.as_f64(),
            Self::Array(a) if a.is_empty() => None,
            Self::Array(a) => Some(a.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        }
    }

    /// Convert into `f64`, failing with a type mismatch named after `name`
    pub fn into_f64(self, name: &str) -> Result<f64, ModelError> {
        self.as_f64()
            .ok_or_else(|| ModelError::type_mismatch(name, "float"))
    }

    /// Convert into `i64`, failing with a type mismatch named after `name`
    pub fn into_i64(self, name: &str) -> Result<i64, ModelError> {
        self.as_i64()
            .ok_or_else(|| ModelError::type_mismatch(name, "integer"))
    }

    /// Convert into a non-negative grid extent
    pub fn into_usize(self, name: &str) -> Result<usize, ModelError> {
        let v = self.into_i64(name)?;
        usize::try_from(v).map_err(|_| ModelError::type_mismatch(name, "non-negative integer"))
    }

    /// Convert into `bool`
    pub fn into_bool(self, name: &str) -> Result<bool, ModelError> {
        match self {
            Self::Scalar(Scalar::Bool(v)) => Ok(v),
            _ => Err(ModelError::type_mismatch(name, "boolean")),
        }
    }

    /// Convert into an array
    pub fn into_array(self, name: &str) -> Result<ArrayD<f64>, ModelError> {
        match self {
            Self::Array(a) => Ok(a),
            Self::Scalar(_) => Err(ModelError::type_mismatch(name, "array")),
        }
    }

    /// Short human-readable rendering; arrays are summarised by shape and max
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Scalar(s) => s.to_string(),
            Self::Array(a) => match self.max_value() {
                Some(max) => format!("array{:?} max={max:?}", a.shape()),
                None => format!("array{:?} (empty)", a.shape()),
            },
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl From<Scalar> for AttrValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }
}

impl From<usize> for AttrValue {
    fn from(value: usize) -> Self {
        Self::Scalar(Scalar::Int(i64::try_from(value).unwrap_or(i64::MAX)))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::Text(value.to_string()))
    }
}

impl From<ArrayD<f64>> for AttrValue {
    fn from(value: ArrayD<f64>) -> Self {
        Self::Array(value)
    }
}
