//! Run-to-completion consistency tests
//!
//! Both instances set up the same named configuration, run for the same
//! number of timesteps and are compared once at the end.

use super::Harness;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result, Side};
use crate::report::{HarnessOutcome, RoutineReport};
use crate::state::HarnessState;
use crate::timer::Timer;
use async_trait::async_trait;
use odiff_model::{AttrValue, ModelError, ModelInstance};

/// A consistency test over a whole model run
#[async_trait]
pub trait RunTest: Send {
    /// Name used in reports
    fn name(&self) -> &str;

    /// Named configuration both instances set up
    fn setup_name(&self) -> &str;

    /// Steps to run; zero compares the freshly set-up states
    fn timesteps(&self) -> u64;

    /// Settings mirrored into both instances after setup
    fn extra_settings(&self) -> Vec<(String, AttrValue)> {
        Vec::new()
    }

    /// Construct the in-process instance for [`RunTest::setup_name`]
    fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError>;

    /// Decide whether the final states agree
    async fn check(&mut self, harness: &mut Harness) -> Result<bool>;
}

/// Set up, run and compare both instances
pub async fn run_to_completion<T>(test: &mut T, config: HarnessConfig) -> Result<HarnessOutcome>
where
    T: RunTest + ?Sized,
{
    config.resolve_library()?;
    let mut new = test
        .new_model(config.seed)
        .map_err(|e| HarnessError::from_model(Side::New, e))?;
    // the new side sets up before the worker starts
    new.setup().map_err(|e| HarnessError::from_model(Side::New, e))?;
    let mut harness = Harness::launch(config, new, Some(test.setup_name())).await?;

    match drive_run(test, &mut harness).await {
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

/// Drive `test` on a harness whose new instance is already set up
pub async fn drive_run<T>(test: &mut T, harness: &mut Harness) -> Result<HarnessOutcome>
where
    T: RunTest + ?Sized,
{
    tracing::info!(test = test.name(), setup = test.setup_name(), "run consistency test starting");
    harness.legacy().setup().await?;
    for (name, value) in test.extra_settings() {
        harness.set_attribute(&name, value).await?;
    }
    harness.transition(HarnessState::Configured)?;

    let mut routines = Vec::new();
    let steps = test.timesteps();
    if steps > 0 {
        let dt_name = harness.config().timestep_attribute.clone();
        let dt = harness
            .new_instance()
            .get_attribute(&dt_name)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HarnessError::Configuration(format!("new instance has no numeric {dt_name}")))?;
        #[allow(clippy::cast_precision_loss)]
        let runlen = steps as f64 * dt;
        let runlen_name = harness.config().runlen_attribute.clone();
        harness.set_attribute(&runlen_name, runlen.into()).await?;
        tracing::info!(steps, runlen, "running both instances");
        routines.push(run_both(harness).await?);
    }
    harness.transition(HarnessState::Executed)?;

    if !test.check(harness).await? {
        return Err(HarnessError::CheckFailed { routine: "run".into() });
    }
    harness.transition(HarnessState::Compared)?;
    harness.transition(HarnessState::Done)?;
    Ok(HarnessOutcome {
        test: test.name().to_string(),
        routines,
        advisories: Vec::new(),
    })
}

async fn run_both(harness: &mut Harness) -> Result<RoutineReport> {
    let mut new_timer = Timer::new("new run");
    let mut legacy_timer = Timer::new("legacy run");
    new_timer
        .time(|| harness.new_instance_mut().run())
        .map_err(|e| HarnessError::from_model(Side::New, e))?;
    println!("{}", new_timer.report());
    legacy_timer.time_async(harness.legacy().run()).await?;
    println!("{}", legacy_timer.report());
    Ok(RoutineReport {
        name: "run".into(),
        new_elapsed: new_timer.total(),
        legacy_elapsed: legacy_timer.total(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{in_process_config, in_process_harness_with};
    use odiff_testbed::TracerModel;
    use pretty_assertions::assert_eq;

    struct Channel {
        steps: u64,
        checked: bool,
    }

    #[async_trait]
    impl RunTest for Channel {
        fn name(&self) -> &str {
            "channel run"
        }

        fn setup_name(&self) -> &str {
            "channel"
        }

        fn timesteps(&self) -> u64 {
            self.steps
        }

        fn new_model(&self, seed: u64) -> std::result::Result<Box<dyn ModelInstance>, ModelError> {
            Ok(Box::new(TracerModel::with_setup(self.setup_name(), seed)?))
        }

        async fn check(&mut self, harness: &mut Harness) -> Result<bool> {
            self.checked = true;
            let mut passed = harness.check_variable("temp", None).await?;
            passed &= harness.check_variable("salt", None).await?;
            passed &= harness.check_variable("itt", None).await?;
            Ok(passed)
        }
    }

    async fn set_up_harness(test: &Channel) -> Harness {
        let mut new = test.new_model(17).unwrap();
        new.setup().unwrap();
        let legacy = TracerModel::with_setup("channel", 17).unwrap();
        in_process_harness_with(in_process_config(), new, legacy).await
    }

    #[tokio::test]
    async fn both_sides_run_the_same_number_of_steps() {
        let mut test = Channel { steps: 3, checked: false };
        let mut harness = set_up_harness(&test).await;
        let outcome = drive_run(&mut test, &mut harness).await.unwrap();

        assert!(test.checked);
        assert_eq!(outcome.routines.len(), 1);
        let (new, legacy) = harness.get_attribute("itt").await.unwrap();
        assert_eq!(new, Some(AttrValue::from(3_i64)));
        assert_eq!(legacy, new);
        let (runlen, _) = harness.get_attribute("runlen").await.unwrap();
        assert_eq!(runlen, Some(AttrValue::from(3.0 * 1800.0)));
        assert_eq!(harness.state(), HarnessState::Done);
    }

    #[tokio::test]
    async fn zero_timesteps_skips_both_runs() {
        let mut test = Channel { steps: 0, checked: false };
        let mut harness = set_up_harness(&test).await;
        let outcome = drive_run(&mut test, &mut harness).await.unwrap();

        assert!(outcome.routines.is_empty());
        let (new, legacy) = harness.get_attribute("itt").await.unwrap();
        assert_eq!(new, Some(AttrValue::from(0_i64)));
        assert_eq!(legacy, new);
    }
}
