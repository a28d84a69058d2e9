//! Fixtures shared by the worker-backed integration tests.
//!
//! Every test spawns the real `odiff-worker` binary. The reference library
//! only has to exist on disk, so a temporary file stands in for it.

#![allow(dead_code)]

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};
use odiff_harness::prelude::*;
use odiff_harness::Result;
use odiff_testbed::TracerModel;
use rand::Rng;
use std::io::Write;
use tempfile::NamedTempFile;

/// Path of the worker binary built alongside these tests
pub fn worker() -> &'static str {
    env!("CARGO_BIN_EXE_odiff-worker")
}

/// A non-empty file to pass as the reference library
pub fn fake_library() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"\x7fELF reference tracer kernel").unwrap();
    file
}

/// Configuration pointing at `library` and the test worker
pub fn config(library: &NamedTempFile) -> HarnessConfig {
    HarnessConfig::default()
        .with_reference_library(library.path())
        .with_worker_program(worker())
}

/// Padded field shape of the new instance
pub fn field_shape(harness: &Harness) -> Vec<usize> {
    harness
        .new_instance()
        .get_attribute("temp")
        .and_then(|v| v.as_array().map(|a| a.shape().to_vec()))
        .unwrap()
}

/// Diffusion of a random warm anomaly
///
/// The legacy side takes its subdomain bounds as 1-based keyword arguments,
/// the new side takes none.
#[derive(Default)]
pub struct Diffusion {
    pub initializations: usize,
    pub checked: Vec<String>,
    pub seen_scalars: Vec<String>,
}

#[async_trait]
impl ConsistencyTest for Diffusion {
    fn name(&self) -> &str {
        "tracer diffusion"
    }

    fn dims(&self) -> GridDims {
        GridDims::new(6, 5, 2)
    }

    fn extra_settings(&self) -> Vec<(String, AttrValue)> {
        vec![
            ("kappa_h".into(), 800.0.into()),
            ("dt_tracer".into(), 900.0.into()),
            ("enable_diffusion".into(), true.into()),
        ]
    }

    fn routines(&self, dims: GridDims) -> Vec<RoutineSpec> {
        let subdomain = RoutineArgs::new()
            .kwarg("is_pe", 1_i64)
            .kwarg("ie_pe", i64::try_from(dims.nx).unwrap())
            .kwarg("js_pe", 1_i64)
            .kwarg("je_pe", i64::try_from(dims.ny).unwrap());
        vec![
            RoutineSpec::new("diffuse_tracers").with_legacy_args(subdomain),
            RoutineSpec::new("apply_boundary_conditions"),
            RoutineSpec::new("step"),
        ]
    }

    fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
        Ok(Box::new(TracerModel::new(seed)))
    }

    async fn initialize(&mut self, harness: &mut Harness) -> Result<()> {
        self.initializations += 1;
        let shape = field_shape(harness);
        let rng = harness.rng();
        let temp = ArrayD::from_shape_simple_fn(IxDyn(&shape), || 12.0 + 4.0 * rng.random::<f64>());
        let salt = ArrayD::from_shape_simple_fn(IxDyn(&shape), || 34.5 + rng.random::<f64>());
        harness.set_attribute("temp", temp.into()).await?;
        harness.set_attribute("salt", salt.into()).await
    }

    async fn check(&mut self, harness: &mut Harness, routine: &str) -> Result<bool> {
        self.checked.push(routine.to_string());
        let registry_scalars = harness.registry().scalar_names().to_vec();
        let all = harness.get_all_attributes(&registry_scalars).await?;
        self.seen_scalars = all.keys().cloned().collect();

        let mut passed = harness.check_variable("temp", None).await?;
        passed &= harness.check_variable("salt", None).await?;
        if routine != "apply_boundary_conditions" {
            passed &= harness.check_variable("dtemp", None).await?;
        }
        Ok(passed)
    }
}

/// Full run of a named setup
pub struct SetupRun {
    pub setup: &'static str,
    pub steps: u64,
}

#[async_trait]
impl RunTest for SetupRun {
    fn name(&self) -> &str {
        "setup run"
    }

    fn setup_name(&self) -> &str {
        self.setup
    }

    fn timesteps(&self) -> u64 {
        self.steps
    }

    fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
        Ok(Box::new(TracerModel::with_setup(self.setup, seed)?))
    }

    async fn check(&mut self, harness: &mut Harness) -> Result<bool> {
        let mut passed = harness.check_variable("itt", None).await?;
        passed &= harness.check_variable("temp", None).await?;
        passed &= harness.check_variable("salt", None).await?;
        Ok(passed)
    }
}
