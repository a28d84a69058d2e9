//! Console reports
//!
//! Advisory mismatches print as `name, new, legacy` lines. Arrays are shown
//! by their maximum, `None` standing for an empty or absent array.

use odiff_model::{AttrValue, AttributeKind};
use std::fmt;
use std::time::Duration;

/// One attribute that differs after initialization
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryEntry {
    /// Attribute name
    pub name: String,
    /// Listing it came from
    pub kind: AttributeKind,
    /// Value on the new instance
    pub new: Option<AttrValue>,
    /// Value on the legacy instance
    pub legacy: Option<AttrValue>,
}

fn column(kind: AttributeKind, value: Option<&AttrValue>) -> String {
    match (kind, value) {
        (_, None) => "None".to_string(),
        (AttributeKind::Array, Some(v)) => v
            .max_value()
            .map_or_else(|| "None".to_string(), |m| format!("{m:?}")),
        (AttributeKind::Scalar, Some(v)) => v.summary(),
    }
}

impl fmt::Display for AdvisoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}",
            self.name,
            column(self.kind, self.new.as_ref()),
            column(self.kind, self.legacy.as_ref())
        )
    }
}

/// Result of one advisory scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvisoryReport {
    /// Differing scalars, in listing order
    pub scalars: Vec<AdvisoryEntry>,
    /// Differing arrays, in listing order
    pub arrays: Vec<AdvisoryEntry>,
}

impl AdvisoryReport {
    /// True if nothing differed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.scalars.is_empty() && self.arrays.is_empty()
    }

    /// Number of differing attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.scalars.len() + self.arrays.len()
    }

    /// Same as [`AdvisoryReport::is_clean`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_clean()
    }

    /// Entry for `name`, if it differed
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&AdvisoryEntry> {
        self.scalars.iter().chain(&self.arrays).find(|e| e.name == name)
    }
}

impl fmt::Display for AdvisoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return Ok(());
        }
        writeln!(
            f,
            "The following attributes do not match between new and legacy instances after initialization:"
        )?;
        for entry in self.scalars.iter().chain(&self.arrays) {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Timings of one routine under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineReport {
    /// Routine name
    pub name: String,
    /// Time spent in the new instance
    pub new_elapsed: Duration,
    /// Time spent in the legacy instance, including the round trip
    pub legacy_elapsed: Duration,
}

/// Outcome of a harness run that passed every check
///
/// Failures surface as [`crate::HarnessError`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessOutcome {
    /// Test name
    pub test: String,
    /// Per-routine timings, in execution order
    pub routines: Vec<RoutineReport>,
    /// Advisory scans, one per initialization
    pub advisories: Vec<AdvisoryReport>,
}

impl fmt::Display for HarnessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: passed", self.test)?;
        for r in &self.routines {
            writeln!(
                f,
                "  {}: new {:.3}s, legacy {:.3}s",
                r.name,
                r.new_elapsed.as_secs_f64(),
                r.legacy_elapsed.as_secs_f64()
            )?;
        }
        let mismatches: usize = self.advisories.iter().map(AdvisoryReport::len).sum();
        write!(
            f,
            "  {} advisory scan(s), {} attribute mismatch(es)",
            self.advisories.len(),
            mismatches
        )
    }
}
