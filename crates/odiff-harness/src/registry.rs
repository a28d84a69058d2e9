//! Attribute registry
//!
//! The two listings (scalar names, array names) are read once and shared
//! immutably. The bundled listings are compiled into the crate; other
//! listings can be loaded from files named in the configuration.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use odiff_model::AttributeKind;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

const BUNDLED_SCALARS: &str = include_str!("../data/scalar_attributes");
const BUNDLED_ARRAYS: &str = include_str!("../data/array_attributes");

static BUNDLED: OnceCell<Arc<AttributeRegistry>> = OnceCell::new();

/// Ordered scalar and array attribute names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRegistry {
    scalars: Vec<String>,
    arrays: Vec<String>,
}

fn parse_listing(kind: AttributeKind, text: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for (lineno, line) in text.trim().lines().enumerate() {
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(HarnessError::Configuration(format!(
                "{kind} listing line {}: invalid attribute name {name:?}",
                lineno + 1
            )));
        }
        if !seen.insert(name) {
            return Err(HarnessError::Configuration(format!(
                "{kind} listing names {name} twice"
            )));
        }
        names.push(name.to_string());
    }
    if names.is_empty() {
        return Err(HarnessError::Configuration(format!("{kind} listing is empty")));
    }
    Ok(names)
}

fn read_listing(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Configuration(format!("cannot read attribute listing {}: {e}", path.display()))
    })
}

impl AttributeRegistry {
    /// Parse newline-separated listings
    ///
    /// # Errors
    /// [`HarnessError::Configuration`] if a listing is empty, holds an
    /// invalid or duplicate name, or the two listings overlap.
    pub fn parse(scalar_text: &str, array_text: &str) -> Result<Self> {
        let scalars = parse_listing(AttributeKind::Scalar, scalar_text)?;
        let arrays = parse_listing(AttributeKind::Array, array_text)?;
        if let Some(both) = scalars.iter().find(|s| arrays.contains(s)) {
            return Err(HarnessError::Configuration(format!(
                "{both} is listed as both scalar and array"
            )));
        }
        Ok(Self { scalars, arrays })
    }

    /// Load listings from two files
    pub fn from_paths(scalar_path: &Path, array_path: &Path) -> Result<Self> {
        Self::parse(&read_listing(scalar_path)?, &read_listing(array_path)?)
    }

    /// The listings shipped with the crate, parsed once per process
    pub fn bundled() -> Result<Arc<Self>> {
        BUNDLED
            .get_or_try_init(|| Self::parse(BUNDLED_SCALARS, BUNDLED_ARRAYS).map(Arc::new))
            .cloned()
    }

    /// Registry selected by `config`: both listing paths, or neither for the bundled one
    pub fn from_config(config: &HarnessConfig) -> Result<Arc<Self>> {
        match (&config.scalar_listing, &config.array_listing) {
            (None, None) => Self::bundled(),
            (Some(scalars), Some(arrays)) => {
                let registry = Self::from_paths(scalars, arrays)?;
                tracing::debug!(
                    scalars = registry.scalars.len(),
                    arrays = registry.arrays.len(),
                    "attribute listings loaded"
                );
                Ok(Arc::new(registry))
            }
            _ => Err(HarnessError::Configuration(
                "scalar_listing and array_listing must be given together".into(),
            )),
        }
    }

    /// Scalar names in listing order
    #[inline]
    #[must_use]
    pub fn scalar_names(&self) -> &[String] {
        &self.scalars
    }

    /// Array names in listing order
    #[inline]
    #[must_use]
    pub fn array_names(&self) -> &[String] {
        &self.arrays
    }

    /// Names of one kind
    #[must_use]
    pub fn names(&self, kind: AttributeKind) -> &[String] {
        match kind {
            AttributeKind::Scalar => &self.scalars,
            AttributeKind::Array => &self.arrays,
        }
    }

    /// Classification of `name`, if listed
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        if self.scalars.iter().any(|s| s == name) {
            Some(AttributeKind::Scalar)
        } else if self.arrays.iter().any(|s| s == name) {
            Some(AttributeKind::Array)
        } else {
            None
        }
    }

    /// Total number of listed names
    #[must_use]
    pub fn len(&self) -> usize {
        self.scalars.len() + self.arrays.len()
    }

    /// Always false for a parsed registry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn whitespace_and_blank_lines_are_ignored() {
        let registry = AttributeRegistry::parse("\n  nx\nny \n\n nz\n", "temp\r\nsalt\n").unwrap();
        assert_eq!(registry.scalar_names(), &["nx", "ny", "nz"]);
        assert_eq!(registry.array_names(), &["temp", "salt"]);
        assert_eq!(registry.kind_of("salt"), Some(AttributeKind::Array));
        assert_eq!(registry.kind_of("u"), None);
    }

    #[test]
    fn malformed_listings_are_configuration_errors() {
        for (scalars, arrays) in [
            ("", "temp"),
            ("nx", "   \n"),
            ("nx\nnx", "temp"),
            ("nx", "temp\nnx"),
            ("n x", "temp"),
            ("nx", "temp;drop"),
        ] {
            let err = AttributeRegistry::parse(scalars, arrays).unwrap_err();
            assert!(matches!(err, HarnessError::Configuration(_)), "{scalars:?}/{arrays:?}");
        }
    }

    #[test]
    fn bundled_listings_parse_and_are_shared() {
        let a = AttributeRegistry::bundled().unwrap();
        let b = AttributeRegistry::bundled().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&a.scalar_names()[..3], &["nx", "ny", "nz"]);
        assert!(a.array_names().iter().any(|n| n == "temp"));
    }

    #[test]
    fn listings_load_from_files() {
        let mut scalars = tempfile::NamedTempFile::new().unwrap();
        let mut arrays = tempfile::NamedTempFile::new().unwrap();
        writeln!(scalars, "nx\nny").unwrap();
        writeln!(arrays, "temp").unwrap();

        let config = HarnessConfig::default()
            .with_listings(scalars.path().to_path_buf(), arrays.path().to_path_buf());
        let registry = AttributeRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn missing_listing_file_is_a_configuration_error() {
        let err = AttributeRegistry::from_paths(Path::new("/nonexistent/s"), Path::new("/nonexistent/a"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(ref m) if m.contains("/nonexistent/s")));
    }

    #[test]
    fn one_listing_alone_is_rejected() {
        let mut config = HarnessConfig::default();
        config.scalar_listing = Some("/tmp/scalars".into());
        assert!(AttributeRegistry::from_config(&config).is_err());
    }
}
