//! Routine-by-routine consistency tests against the legacy worker.
//!
//! The new tracer model runs in-process, the legacy one in `odiff-worker`.
//! They differ in array layout, call conventions and initialization order,
//! so a passing run exercises the whole synchronization path.

mod common;

use async_trait::async_trait;
use common::Diffusion;
use odiff_harness::prelude::*;
use odiff_harness::{HarnessState, Result};
use pretty_assertions::assert_eq;
use std::io::Write;

#[tokio::test]
async fn diffusion_agrees_routine_by_routine() {
    let library = common::fake_library();
    let mut test = Diffusion::default();
    let outcome = run_unit(&mut test, common::config(&library)).await.unwrap();

    let ran: Vec<_> = outcome.routines.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(ran, ["diffuse_tracers", "apply_boundary_conditions", "step"]);
    assert_eq!(test.checked, ["diffuse_tracers", "apply_boundary_conditions", "step"]);
    // once up front and once after every routine
    assert_eq!(test.initializations, 4);
    assert_eq!(outcome.advisories.len(), 4);
    assert!(outcome.to_string().starts_with("tracer diffusion: passed"));
}

#[tokio::test]
async fn grid_override_replaces_the_declared_size() {
    let library = common::fake_library();
    let mut test = Diffusion::default();
    let config = common::config(&library).with_grid(GridDims::new(4, 3, 1));
    run_unit(&mut test, config).await.unwrap();
    assert_eq!(test.checked.len(), 3);
}

/// Names listed but unknown to both instances never reach the comparison.
#[tokio::test]
async fn attributes_absent_on_both_sides_are_skipped() {
    let mut scalars = tempfile::NamedTempFile::new().unwrap();
    writeln!(scalars, "nx\nvorticity\nkappa_h").unwrap();
    let mut arrays = tempfile::NamedTempFile::new().unwrap();
    writeln!(arrays, "temp\nsea_ice_fraction").unwrap();

    let library = common::fake_library();
    let config = common::config(&library).with_listings(scalars.path(), arrays.path());
    let mut test = Diffusion::default();
    let outcome = run_unit(&mut test, config).await.unwrap();

    assert_eq!(test.seen_scalars, ["nx", "kappa_h"]);
    assert!(outcome.advisories.iter().all(|a| a.entry("vorticity").is_none()));
}

/// Wraps [`Diffusion`] and corrupts the new instance before checking.
struct Corrupted {
    inner: Diffusion,
    state_at_check: Option<HarnessState>,
}

#[async_trait]
impl ConsistencyTest for Corrupted {
    fn name(&self) -> &str {
        "corrupted diffusion"
    }

    fn dims(&self) -> GridDims {
        self.inner.dims()
    }

    fn routines(&self, dims: GridDims) -> Vec<RoutineSpec> {
        self.inner.routines(dims)
    }

    fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
        self.inner.new_model(seed)
    }

    async fn initialize(&mut self, harness: &mut Harness) -> Result<()> {
        self.inner.initialize(harness).await
    }

    async fn check(&mut self, harness: &mut Harness, _routine: &str) -> Result<bool> {
        self.state_at_check = Some(harness.state());
        let (Some(AttrValue::Array(mut temp)), _) = harness.get_attribute("temp").await? else {
            return Ok(false);
        };
        temp[[3, 3, 0]] += 1.0;
        harness
            .new_instance_mut()
            .set_attribute("temp", temp.into())
            .map_err(|e| HarnessError::from_model(odiff_harness::Side::New, e))?;
        harness.check_variable("temp", None).await
    }
}

#[tokio::test]
async fn numeric_disagreement_aborts_with_the_attribute() {
    let library = common::fake_library();
    let mut test = Corrupted {
        inner: Diffusion::default(),
        state_at_check: None,
    };
    let err = run_unit(&mut test, common::config(&library)).await.unwrap_err();

    assert_eq!(test.state_at_check, Some(HarnessState::Executed));
    assert!(err.is_numeric());
    let HarnessError::ComparisonMismatch(mismatch) = err else {
        panic!("expected a comparison mismatch");
    };
    assert_eq!(mismatch.attribute, "temp");
    assert!(mismatch.new.is_some() && mismatch.legacy.is_some());
    assert_eq!(mismatch.tolerance, Tolerance::default());
}

/// A check that returns false without raising still stops the run.
struct Refusing;

#[async_trait]
impl ConsistencyTest for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }

    fn dims(&self) -> GridDims {
        GridDims::new(4, 4, 1)
    }

    fn routines(&self, _dims: GridDims) -> Vec<RoutineSpec> {
        vec![RoutineSpec::new("apply_boundary_conditions")]
    }

    fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
        Ok(Box::new(odiff_testbed::TracerModel::new(seed)))
    }

    async fn initialize(&mut self, _harness: &mut Harness) -> Result<()> {
        Ok(())
    }

    async fn check(&mut self, harness: &mut Harness, _routine: &str) -> Result<bool> {
        harness.check_variable("vorticity", None).await
    }
}

#[tokio::test]
async fn false_check_aborts_naming_the_routine() {
    let library = common::fake_library();
    let err = run_unit(&mut Refusing, common::config(&library)).await.unwrap_err();
    assert!(matches!(err, HarnessError::CheckFailed { ref routine } if routine == "apply_boundary_conditions"));
}

#[tokio::test]
async fn missing_library_is_reported_before_anything_starts() {
    let mut test = Diffusion::default();
    let config = HarnessConfig::default()
        .with_reference_library("/nonexistent/libreference.so")
        .with_worker_program(common::worker());
    let err = run_unit(&mut test, config).await.unwrap_err();
    assert!(matches!(err, HarnessError::Startup { .. }));
    assert_eq!(test.initializations, 0);
}
