//! Numeric comparator
//!
//! Arrays are compared in four steps: presence, halo trim, normalization by
//! the magnitude of the *first* (new) operand, then tolerant elementwise
//! equality. Normalization deliberately looks at one side only, so
//! `compare_arrays(a, b)` and `compare_arrays(b, a)` can disagree.

use crate::error::Side;
use ndarray::{ArrayD, ArrayViewD, Dimension, Slice};
use odiff_model::{AttrValue, Scalar, HALO};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closeness criterion `|x - y| <= atol + rtol * |y|`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Absolute tolerance, applied after normalization
    pub atol: f64,
    /// Relative tolerance with respect to the legacy value
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: 1e-8,
            rtol: 1e-7,
        }
    }
}

impl Tolerance {
    /// Tolerance with both components
    #[must_use]
    pub const fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    /// Purely absolute tolerance
    #[must_use]
    pub const fn absolute(atol: f64) -> Self {
        Self { atol, rtol: 0.0 }
    }

    /// Same absolute tolerance, default relative one
    #[must_use]
    pub fn with_atol(self, atol: f64) -> Self {
        Self { atol, ..self }
    }

    /// True if `x` (new) is close enough to `y` (legacy)
    ///
    /// Two NaNs are equal; infinities must match exactly.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn accepts(&self, x: f64, y: f64) -> bool {
        if x == y || (x.is_nan() && y.is_nan()) {
            return true;
        }
        if x.is_infinite() || y.is_infinite() {
            return false;
        }
        (x - y).abs() <= self.atol + self.rtol * y.abs()
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atol={:e}, rtol={:e}", self.atol, self.rtol)
    }
}

/// Why two values were judged different
#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    /// Value present (non-empty) on one side only
    Presence {
        /// Side that holds a value
        present_on: Side,
    },
    /// One side holds a scalar, the other an array
    Kind,
    /// Scalars differ
    Scalar,
    /// Trimmed arrays differ in shape
    Shape {
        /// Trimmed shape on the new side
        new: Vec<usize>,
        /// Trimmed shape on the legacy side
        legacy: Vec<usize>,
    },
    /// Elements outside tolerance
    Values {
        /// Number of elements outside tolerance
        violations: usize,
        /// Elements compared
        total: usize,
        /// Index (into the trimmed array) of the largest deviation
        index: Vec<usize>,
        /// Raw new value at `index`
        new: f64,
        /// Raw legacy value at `index`
        legacy: f64,
        /// Divisor applied to both sides, if any
        norm: Option<f64>,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence { present_on } => write!(f, "present only on the {present_on} side"),
            Self::Kind => write!(f, "scalar compared with array"),
            Self::Scalar => write!(f, "scalars differ"),
            Self::Shape { new, legacy } => {
                write!(f, "trimmed shapes differ: {new:?} vs {legacy:?}")
            }
            Self::Values {
                violations,
                total,
                index,
                new,
                legacy,
                norm,
            } => {
                write!(
                    f,
                    "{violations}/{total} elements out of tolerance, worst at {index:?}: {new:?} vs {legacy:?}"
                )?;
                if let Some(norm) = norm {
                    write!(f, " (normalized by {norm:?})")?;
                }
                Ok(())
            }
        }
    }
}

/// Strip [`HALO`] cells from both ends of the first two axes
///
/// One-dimensional arrays are returned whole.
#[must_use]
pub fn trim_halo(a: &ArrayD<f64>) -> ArrayViewD<'_, f64> {
    if a.ndim() <= 1 {
        return a.view();
    }
    a.slice_each_axis(|ax| {
        if ax.axis.index() < 2 {
            let lo = HALO.min(ax.len);
            let hi = ax.len.saturating_sub(HALO).max(lo);
            Slice::from(lo..hi)
        } else {
            Slice::from(..)
        }
    })
}

/// Largest magnitude of `a`, or `None` if it is zero or `a` is empty
#[must_use]
pub fn normalization(a: &ArrayViewD<'_, f64>) -> Option<f64> {
    let max = a.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    (max > 0.0).then_some(max)
}

/// Scalar comparison: two absent values agree, one absent value never does
pub fn compare_scalars(new: Option<&Scalar>, legacy: Option<&Scalar>) -> Result<(), Discrepancy> {
    match (new, legacy) {
        (None, None) => Ok(()),
        (Some(_), None) => Err(Discrepancy::Presence { present_on: Side::New }),
        (None, Some(_)) => Err(Discrepancy::Presence {
            present_on: Side::Legacy,
        }),
        (Some(a), Some(b)) if a != b => Err(Discrepancy::Scalar),
        _ => Ok(()),
    }
}

/// Tolerant comparator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Comparator {
    tolerance: Tolerance,
}

impl Comparator {
    /// Comparator with the given default tolerance
    #[must_use]
    pub const fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    /// Tolerance in force
    #[inline]
    #[must_use]
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Same comparator with another tolerance
    #[must_use]
    pub fn with_tolerance(self, tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    /// Compare two optional attribute values of either kind
    pub fn compare(&self, new: Option<&AttrValue>, legacy: Option<&AttrValue>) -> Result<(), Discrepancy> {
        match (new, legacy) {
            (None, None) => Ok(()),
            (Some(_), None) => Err(Discrepancy::Presence { present_on: Side::New }),
            (None, Some(_)) => Err(Discrepancy::Presence {
                present_on: Side::Legacy,
            }),
            (Some(AttrValue::Scalar(a)), Some(AttrValue::Scalar(b))) => self.compare_scalar_values(a, b),
            (Some(AttrValue::Array(a)), Some(AttrValue::Array(b))) => self.compare_arrays(a, b),
            _ => Err(Discrepancy::Kind),
        }
    }

    /// Numbers within tolerance; booleans and text exactly
    pub fn compare_scalar_values(&self, new: &Scalar, legacy: &Scalar) -> Result<(), Discrepancy> {
        match (new.as_f64(), legacy.as_f64()) {
            (Some(x), Some(y)) if self.tolerance.accepts(x, y) => Ok(()),
            (Some(_), Some(_)) => Err(Discrepancy::Scalar),
            _ => compare_scalars(Some(new), Some(legacy)),
        }
    }

    /// Presence, halo trim, normalization, tolerant equality
    pub fn compare_arrays(&self, new: &ArrayD<f64>, legacy: &ArrayD<f64>) -> Result<(), Discrepancy> {
        match (new.is_empty(), legacy.is_empty()) {
            (true, true) => return Ok(()),
            (false, true) => return Err(Discrepancy::Presence { present_on: Side::New }),
            (true, false) => {
                return Err(Discrepancy::Presence {
                    present_on: Side::Legacy,
                })
            }
            (false, false) => {}
        }

        let a = trim_halo(new);
        let b = trim_halo(legacy);
        if a.shape() != b.shape() {
            return Err(Discrepancy::Shape {
                new: a.shape().to_vec(),
                legacy: b.shape().to_vec(),
            });
        }
        if a.is_empty() {
            return Ok(());
        }

        let norm = normalization(&a);
        let scale = norm.unwrap_or(1.0);
        let mut violations = 0;
        let mut worst: Option<(f64, Vec<usize>, f64, f64)> = None;
        for ((index, &x), &y) in a.indexed_iter().zip(b.iter()) {
            let (xn, yn) = (x / scale, y / scale);
            if self.tolerance.accepts(xn, yn) {
                continue;
            }
            violations += 1;
            let deviation = if (xn - yn).is_nan() { f64::INFINITY } else { (xn - yn).abs() };
            if worst.as_ref().map_or(true, |(d, ..)| deviation > *d) {
                worst = Some((deviation, index.slice().to_vec(), x, y));
            }
        }

        match worst {
            None => Ok(()),
            Some((_, index, x, y)) => Err(Discrepancy::Values {
                violations,
                total: a.len(),
                index,
                new: x,
                legacy: y,
                norm,
            }),
        }
    }
}
