//! Harness configuration
//!
//! Built in code with the `with_*` methods or read from TOML:
//!
//! ```toml
//! reference_library = "/opt/ocean/libreference.so"
//! seed = 17
//!
//! [tolerance]
//! atol = 1e-8
//!
//! [grid]
//! nx = 4
//! ny = 4
//! nz = 3
//! ```

use crate::compare::Tolerance;
use crate::error::{HarnessError, Result};
use odiff_model::{GridDims, RoutineCall, Scalar};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment fallback for the reference library path
pub const REFERENCE_LIB_ENV: &str = "ODIFF_REFERENCE_LIB";

/// Environment override for the worker executable
pub const WORKER_ENV: &str = "ODIFF_WORKER";

/// Name of the worker executable
pub const WORKER_BIN: &str = "odiff-worker";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path of the reference library loaded by the worker
    pub reference_library: Option<PathBuf>,
    /// Worker executable; located automatically when unset
    pub worker_program: Option<PathBuf>,
    /// Grid dimensions overriding the ones a test declares
    pub grid: Option<GridDims>,
    /// Default tolerance for variable checks
    pub tolerance: Tolerance,
    /// Seed for both instances and for initial-condition hooks
    pub seed: u64,
    /// Scalar attribute listing; bundled listing when unset
    pub scalar_listing: Option<PathBuf>,
    /// Array attribute listing; bundled listing when unset
    pub array_listing: Option<PathBuf>,
    /// Routines the legacy instance runs to legalize and allocate
    pub legacy_init_sequence: Vec<RoutineCall>,
    /// Attribute holding the tracer time step
    pub timestep_attribute: String,
    /// Attribute holding the total run length
    pub runlen_attribute: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            reference_library: None,
            worker_program: None,
            grid: None,
            tolerance: Tolerance::default(),
            seed: 17,
            scalar_listing: None,
            array_listing: None,
            legacy_init_sequence: vec![
                RoutineCall::with_args("my_mpi_init", vec![Scalar::Int(0)]),
                RoutineCall::new("pe_decomposition"),
                RoutineCall::new("set_legacy_parameter"),
                RoutineCall::new("allocate_main_module"),
                RoutineCall::new("allocate_diffusion_module"),
            ],
            timestep_attribute: "dt_tracer".to_string(),
            runlen_attribute: "runlen".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| HarnessError::Configuration(format!("invalid configuration: {e}")))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the reference library path
    #[must_use]
    pub fn with_reference_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_library = Some(path.into());
        self
    }

    /// Set the worker executable
    #[must_use]
    pub fn with_worker_program(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(path.into());
        self
    }

    /// Override grid dimensions
    #[must_use]
    pub fn with_grid(mut self, grid: GridDims) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Set the default tolerance
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Use attribute listings from files
    #[must_use]
    pub fn with_listings(mut self, scalars: impl Into<PathBuf>, arrays: impl Into<PathBuf>) -> Self {
        self.scalar_listing = Some(scalars.into());
        self.array_listing = Some(arrays.into());
        self
    }

    /// Replace the legacy initialization sequence
    #[must_use]
    pub fn with_legacy_init_sequence(mut self, calls: Vec<RoutineCall>) -> Self {
        self.legacy_init_sequence = calls;
        self
    }

    /// Reference library from the configuration or [`REFERENCE_LIB_ENV`]
    ///
    /// # Errors
    /// [`HarnessError::Configuration`] if neither supplies a path.
    pub fn resolve_library(&self) -> Result<PathBuf> {
        library_from(self.reference_library.as_deref(), std::env::var_os(REFERENCE_LIB_ENV))
    }

    /// Worker executable: configured, [`WORKER_ENV`], next to this
    /// executable, or looked up on `PATH`
    #[must_use]
    pub fn resolve_worker(&self) -> PathBuf {
        if let Some(program) = &self.worker_program {
            return program.clone();
        }
        if let Some(program) = std::env::var_os(WORKER_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(program);
        }
        sibling_worker().unwrap_or_else(|| PathBuf::from(WORKER_BIN))
    }
}

fn library_from(explicit: Option<&Path>, env: Option<std::ffi::OsString>) -> Result<PathBuf> {
    explicit
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .ok_or_else(|| {
            HarnessError::Configuration(format!(
                "path to the reference library must be given in the configuration or via {REFERENCE_LIB_ENV}"
            ))
        })
}

/// `odiff-worker` in the directory of the running executable or its parent
/// (test binaries live one level below the build directory)
fn sibling_worker() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?;
    let name = format!("{WORKER_BIN}{}", std::env::consts::EXE_SUFFIX);
    let found = [Some(dir), dir.parent()]
        .into_iter()
        .flatten()
        .map(|d| d.join(&name))
        .find(|candidate| candidate.is_file());
    found
}
