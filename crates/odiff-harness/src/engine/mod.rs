//! Synchronization and comparison engine
//!
//! [`Harness`] owns the new instance in-process and the legacy instance
//! through a [`LegacyProxy`]. It mirrors settings into both, reads values
//! back in pairs and compares them. The two drivers, [`unit`] (routine by
//! routine) and [`run`] (run to completion), sequence these operations
//! through the [`HarnessState`] machine.

pub mod run;
pub mod unit;

use crate::compare::{Comparator, Tolerance};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Mismatch, Result, Side};
use crate::proxy::{LegacyProxy, WorkerOptions};
use crate::registry::AttributeRegistry;
use crate::report::{AdvisoryEntry, AdvisoryReport, RoutineReport};
use crate::state::{validate_transition, HarnessState};
use crate::timer::Timer;
use indexmap::IndexMap;
use odiff_model::{AttrValue, AttributeKind, GridDims, ModelError, ModelInstance, RoutineSpec};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Values of one attribute on the new and the legacy side
pub type ValuePair = (Option<AttrValue>, Option<AttrValue>);

fn new_side(error: ModelError) -> HarnessError {
    HarnessError::from_model(Side::New, error)
}

/// Both model instances plus the comparison machinery
pub struct Harness {
    config: HarnessConfig,
    registry: Arc<AttributeRegistry>,
    comparator: Comparator,
    new: Box<dyn ModelInstance>,
    legacy: LegacyProxy,
    rng: StdRng,
    state: HarnessState,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("state", &self.state)
            .field("new", &self.new.label())
            .field("legacy", &self.legacy)
            .field("tolerance", &self.comparator.tolerance())
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Assemble a harness around already-running instances
    #[must_use]
    pub fn new(
        config: HarnessConfig,
        registry: Arc<AttributeRegistry>,
        new: Box<dyn ModelInstance>,
        legacy: LegacyProxy,
    ) -> Self {
        Self {
            comparator: Comparator::new(config.tolerance),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            registry,
            new,
            legacy,
            state: HarnessState::Uninitialized,
        }
    }

    /// Resolve the reference library and listings, then start the worker
    ///
    /// # Errors
    /// [`HarnessError::Configuration`] without a reference library path,
    /// [`HarnessError::Startup`] if the worker does not come up.
    pub async fn launch(config: HarnessConfig, new: Box<dyn ModelInstance>, setup: Option<&str>) -> Result<Self> {
        let library = config.resolve_library()?;
        let registry = AttributeRegistry::from_config(&config)?;
        let mut options = WorkerOptions::new(config.resolve_worker(), library).with_seed(config.seed);
        if let Some(setup) = setup {
            options = options.with_setup(setup);
        }
        let legacy = LegacyProxy::start(&options).await?;
        Ok(Self::new(config, registry, new, legacy))
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub(crate) fn transition(&mut self, to: HarnessState) -> Result<()> {
        validate_transition(self.state, to)?;
        tracing::debug!(from = ?self.state, ?to, "harness transition");
        self.state = to;
        Ok(())
    }

    /// Configuration in force
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Attribute listings
    #[must_use]
    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    /// Comparator with the configured tolerance
    #[must_use]
    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    /// The in-process instance
    #[must_use]
    pub fn new_instance(&self) -> &dyn ModelInstance {
        self.new.as_ref()
    }

    /// The in-process instance, mutably; initial-condition hooks write through it
    pub fn new_instance_mut(&mut self) -> &mut dyn ModelInstance {
        self.new.as_mut()
    }

    /// The worker proxy
    pub fn legacy(&mut self) -> &mut LegacyProxy {
        &mut self.legacy
    }

    /// Seeded generator for initial conditions
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Assign `value` to `name` on both instances, new first
    pub async fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<()> {
        self.new.set_attribute(name, value.clone()).map_err(new_side)?;
        self.legacy.set_attribute(name, &value).await
    }

    /// `(new, legacy)` values of `name`; `None` where a side lacks it
    pub async fn get_attribute(&mut self, name: &str) -> Result<ValuePair> {
        let new = self.new.get_attribute(name);
        let legacy = self.legacy.get_attribute(name).await?;
        Ok((new, legacy))
    }

    /// Pairs for every name present on at least one side
    pub async fn get_all_attributes(&mut self, names: &[String]) -> Result<IndexMap<String, ValuePair>> {
        let mut out = IndexMap::with_capacity(names.len());
        for name in names {
            let pair = self.get_attribute(name).await?;
            if pair.0.is_none() && pair.1.is_none() {
                tracing::trace!(attribute = %name, "absent on both sides");
                continue;
            }
            out.insert(name.clone(), pair);
        }
        Ok(out)
    }

    async fn differing(&mut self, kind: AttributeKind) -> Result<IndexMap<String, ValuePair>> {
        let registry = Arc::clone(&self.registry);
        let mut all = self.get_all_attributes(registry.names(kind)).await?;
        all.retain(|_, (new, legacy)| new != legacy);
        Ok(all)
    }

    /// Listed scalars whose values differ exactly
    pub async fn check_scalar_objects(&mut self) -> Result<IndexMap<String, ValuePair>> {
        self.differing(AttributeKind::Scalar).await
    }

    /// Listed arrays that are not identical in shape and value
    pub async fn check_array_objects(&mut self) -> Result<IndexMap<String, ValuePair>> {
        self.differing(AttributeKind::Array).await
    }

    /// Compare every listed attribute and print what differs
    ///
    /// Disagreement is reported, never raised.
    pub async fn advisory_scan(&mut self) -> Result<AdvisoryReport> {
        let entries = |kind, differing: IndexMap<String, ValuePair>| -> Vec<AdvisoryEntry> {
            differing
                .into_iter()
                .map(|(name, (new, legacy))| AdvisoryEntry {
                    name,
                    kind,
                    new,
                    legacy,
                })
                .collect()
        };
        let scalars = self.check_scalar_objects().await?;
        let arrays = self.check_array_objects().await?;
        let report = AdvisoryReport {
            scalars: entries(AttributeKind::Scalar, scalars),
            arrays: entries(AttributeKind::Array, arrays),
        };
        if !report.is_clean() {
            tracing::info!(mismatches = report.len(), "advisory scan found differences");
            print!("{report}");
        }
        Ok(report)
    }

    /// Hard check of one attribute
    ///
    /// Returns `Ok(false)` if a side lacks the attribute.
    ///
    /// # Errors
    /// [`HarnessError::ComparisonMismatch`] naming the attribute, both values
    /// and the tolerance when the values differ.
    pub async fn check_variable(&mut self, var: &str, tolerance: Option<Tolerance>) -> Result<bool> {
        let (new, legacy) = self.get_attribute(var).await?;
        self.check_values(var, new, legacy, tolerance)
    }

    /// Hard check of a value pair obtained elsewhere
    pub fn check_values(
        &self,
        var: &str,
        new: Option<AttrValue>,
        legacy: Option<AttrValue>,
        tolerance: Option<Tolerance>,
    ) -> Result<bool> {
        let (Some(new), Some(legacy)) = (new, legacy) else {
            println!("Variable {var} is None");
            return Ok(false);
        };
        let comparator = tolerance.map_or(self.comparator, |t| self.comparator.with_tolerance(t));
        match comparator.compare(Some(&new), Some(&legacy)) {
            Ok(()) => Ok(true),
            Err(discrepancy) => Err(HarnessError::mismatch(Mismatch {
                attribute: var.to_string(),
                new: Some(new),
                legacy: Some(legacy),
                tolerance: comparator.tolerance(),
                detail: discrepancy.to_string(),
            })),
        }
    }

    /// Mirror grid and extra settings, then initialize both sides, new first
    pub async fn configure(&mut self, dims: GridDims, extra: &[(String, AttrValue)]) -> Result<()> {
        for (name, value) in dims.attributes() {
            self.set_attribute(name, value).await?;
        }
        for (name, value) in extra {
            self.set_attribute(name, value.clone()).await?;
        }
        self.new.prepare().map_err(new_side)?;
        let sequence = self.config.legacy_init_sequence.clone();
        for call in &sequence {
            self.legacy.call_routine(&call.routine, &call.to_args()).await?;
        }
        tracing::info!(?dims, "both instances configured");
        self.transition(HarnessState::Configured)
    }

    /// Run `spec` on both sides, each in its own timed scope
    pub async fn execute(&mut self, spec: &RoutineSpec) -> Result<RoutineReport> {
        let mut new_timer = Timer::new(format!("new {}", spec.name));
        let mut legacy_timer = Timer::new(format!("legacy {}", spec.name));

        new_timer
            .time(|| self.new.call_routine(&spec.name, &spec.new_args))
            .map_err(new_side)?;
        println!("{}", new_timer.report());

        legacy_timer
            .time_async(self.legacy.call_routine(&spec.name, &spec.legacy_args))
            .await?;
        println!("{}", legacy_timer.report());

        self.transition(HarnessState::Executed)?;
        Ok(RoutineReport {
            name: spec.name.clone(),
            new_elapsed: new_timer.total(),
            legacy_elapsed: legacy_timer.total(),
        })
    }

    /// Shut the worker down after a successful run
    pub async fn finish(&mut self) -> Result<()> {
        self.legacy.shutdown().await
    }

    /// Move to `Failed` and kill the worker
    pub async fn abort(&mut self, error: &HarnessError) {
        tracing::error!(state = ?self.state, "harness run aborted: {}", error);
        if !self.state.is_terminal() {
            self.state = HarnessState::Failed;
        }
        self.legacy.kill().await;
    }
}
