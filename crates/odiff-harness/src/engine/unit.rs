//! Routine-by-routine consistency tests
//!
//! Both instances are configured identically, then for each routine under
//! test: apply the initial condition, scan for drift, run the routine on both
//! sides and let the test decide whether the results agree.

use super::Harness;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result, Side};
use crate::report::HarnessOutcome;
use crate::state::HarnessState;
use async_trait::async_trait;
use odiff_model::{AttrValue, GridDims, ModelError, ModelInstance, RoutineSpec};

/// A consistency test over individual routines
#[async_trait]
pub trait ConsistencyTest: Send {
    /// Name used in reports
    fn name(&self) -> &str;

    /// Grid size, unless the configuration overrides it
    fn dims(&self) -> GridDims;

    /// Settings mirrored into both instances before initialization
    fn extra_settings(&self) -> Vec<(String, AttrValue)> {
        Vec::new()
    }

    /// Routines to exercise, in order, for the effective grid
    fn routines(&self, dims: GridDims) -> Vec<RoutineSpec>;

    /// Construct the in-process instance
    fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError>;

    /// Apply the initial condition; runs before every routine and once after the last
    async fn initialize(&mut self, harness: &mut Harness) -> Result<()>;

    /// Decide whether `routine` produced consistent results
    async fn check(&mut self, harness: &mut Harness, routine: &str) -> Result<bool>;
}

/// Launch both instances and drive `test` to completion
///
/// The worker is shut down on success and killed on any error.
pub async fn run_unit<T>(test: &mut T, config: HarnessConfig) -> Result<HarnessOutcome>
where
    T: ConsistencyTest + ?Sized,
{
    let dims = config.grid.unwrap_or_else(|| test.dims());
    // fail on a missing library before constructing anything
    config.resolve_library()?;
    let new = test
        .new_model(config.seed)
        .map_err(|e| HarnessError::from_model(Side::New, e))?;
    let mut harness = Harness::launch(config, new, None).await?;

    match drive_unit(test, &mut harness, dims).await {
        Ok(outcome) => {
            harness.finish().await?;
            Ok(outcome)
        }
        Err(e) => {
            harness.abort(&e).await;
            Err(e)
        }
    }
}

/// Drive `test` on an assembled harness
pub async fn drive_unit<T>(test: &mut T, harness: &mut Harness, dims: GridDims) -> Result<HarnessOutcome>
where
    T: ConsistencyTest + ?Sized,
{
    tracing::info!(test = test.name(), "unit consistency test starting");
    harness.configure(dims, &test.extra_settings()).await?;

    let mut advisories = Vec::new();
    let mut routines = Vec::new();

    harness.transition(HarnessState::Setup)?;
    test.initialize(harness).await?;
    advisories.push(harness.advisory_scan().await?);

    for spec in test.routines(dims) {
        tracing::info!(routine = %spec.name, "running routine on both sides");
        routines.push(harness.execute(&spec).await?);

        if !test.check(harness, &spec.name).await? {
            return Err(HarnessError::CheckFailed { routine: spec.name });
        }
        harness.transition(HarnessState::Compared)?;

        harness.transition(HarnessState::Setup)?;
        test.initialize(harness).await?;
        advisories.push(harness.advisory_scan().await?);
    }

    harness.transition(HarnessState::Done)?;
    Ok(HarnessOutcome {
        test: test.name().to_string(),
        routines,
        advisories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Tolerance;
    use crate::engine::tests::{in_process_config, in_process_harness};
    use ndarray::{ArrayD, IxDyn};
    use odiff_testbed::TracerModel;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    /// Random warm anomaly written to both sides, then diffused
    #[derive(Default)]
    struct Diffusion {
        initializations: usize,
        checks: Vec<String>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl ConsistencyTest for Diffusion {
        fn name(&self) -> &str {
            "diffusion"
        }

        fn dims(&self) -> GridDims {
            GridDims::new(6, 5, 2)
        }

        fn extra_settings(&self) -> Vec<(String, AttrValue)> {
            vec![("kappa_h".into(), 500.0.into()), ("dt_tracer".into(), 600.0.into())]
        }

        fn routines(&self, _dims: GridDims) -> Vec<RoutineSpec> {
            vec![RoutineSpec::new("diffuse_tracers"), RoutineSpec::new("step")]
        }

        fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
            Ok(Box::new(TracerModel::new(seed)))
        }

        async fn initialize(&mut self, harness: &mut Harness) -> Result<()> {
            self.initializations += 1;
            let shape = self.dims().padded_shape();
            let rng = harness.rng();
            let temp = ArrayD::from_shape_simple_fn(IxDyn(&shape), || 10.0 + rng.random::<f64>());
            harness.set_attribute("temp", temp.into()).await
        }

        async fn check(&mut self, harness: &mut Harness, routine: &str) -> Result<bool> {
            self.checks.push(routine.to_string());
            if self.fail_on == Some(routine) {
                return Ok(false);
            }
            let mut passed = harness.check_variable("temp", None).await?;
            passed &= harness.check_variable("dtemp", Some(Tolerance::absolute(1e-12))).await?;
            Ok(passed)
        }
    }

    #[tokio::test]
    async fn every_routine_is_checked_and_initialization_follows_each() {
        let mut harness = in_process_harness(in_process_config()).await;
        let mut test = Diffusion::default();
        let dims = test.dims();
        let outcome = drive_unit(&mut test, &mut harness, dims).await.unwrap();

        assert_eq!(outcome.test, "diffusion");
        let ran: Vec<_> = outcome.routines.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(ran, ["diffuse_tracers", "step"]);
        assert_eq!(test.checks, ["diffuse_tracers", "step"]);
        assert_eq!(test.initializations, 3);
        assert_eq!(outcome.advisories.len(), 3);
        assert!(outcome.advisories.iter().all(|a| a.is_clean()));
        assert_eq!(harness.state(), HarnessState::Done);
    }

    #[tokio::test]
    async fn extra_settings_reach_both_sides() {
        let mut harness = in_process_harness(in_process_config()).await;
        let mut test = Diffusion::default();
        let dims = test.dims();
        drive_unit(&mut test, &mut harness, dims).await.unwrap();
        let (new, legacy) = harness.get_attribute("kappa_h").await.unwrap();
        assert_eq!(new, Some(AttrValue::from(500.0)));
        assert_eq!(legacy, new);
    }

    #[tokio::test]
    async fn false_check_stops_at_the_routine() {
        let mut harness = in_process_harness(in_process_config()).await;
        let mut test = Diffusion {
            fail_on: Some("diffuse_tracers"),
            ..Diffusion::default()
        };
        let dims = test.dims();
        let err = drive_unit(&mut test, &mut harness, dims).await.unwrap_err();
        assert!(matches!(err, HarnessError::CheckFailed { ref routine } if routine == "diffuse_tracers"));
        assert_eq!(test.checks, ["diffuse_tracers"]);
        assert_eq!(harness.state(), HarnessState::Executed);
    }

    #[tokio::test]
    async fn routines_missing_on_the_new_side_abort_before_checking() {
        struct Missing(Diffusion);

        #[async_trait]
        impl ConsistencyTest for Missing {
            fn name(&self) -> &str {
                "missing"
            }
            fn dims(&self) -> GridDims {
                self.0.dims()
            }
            fn routines(&self, _dims: GridDims) -> Vec<RoutineSpec> {
                vec![RoutineSpec::new("advect_tracers")]
            }
            fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
                self.0.new_model(seed)
            }
            async fn initialize(&mut self, harness: &mut Harness) -> Result<()> {
                self.0.initialize(harness).await
            }
            async fn check(&mut self, harness: &mut Harness, routine: &str) -> Result<bool> {
                self.0.check(harness, routine).await
            }
        }

        let mut harness = in_process_harness(in_process_config()).await;
        let mut test = Missing(Diffusion::default());
        let dims = test.dims();
        let err = drive_unit(&mut test, &mut harness, dims).await.unwrap_err();
        assert!(matches!(err, HarnessError::RoutineNotFound { side: Side::New, .. }));
        assert!(test.0.checks.is_empty());
    }

    #[tokio::test]
    async fn missing_library_is_a_configuration_error() {
        let mut test = Diffusion::default();
        let config = HarnessConfig::default();
        if config.reference_library.is_some() || std::env::var_os(crate::config::REFERENCE_LIB_ENV).is_some() {
            return;
        }
        let err = run_unit(&mut test, config).await.unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
        assert!(err.is_infrastructure());
    }
}
