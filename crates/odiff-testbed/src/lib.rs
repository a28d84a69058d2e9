//! # odiff-testbed
//!
//! A halo-2 tracer-diffusion kernel implemented twice: [`TracerModel`] is the
//! reimplementation under test, [`LegacyTracerModel`] plays the compiled
//! reference library that the worker process hosts. The two differ in memory
//! layout, call conventions and initialization order, and agree in results.

pub mod legacy;
pub mod setups;
pub mod tracer;

pub use legacy::LegacyTracerModel;
pub use setups::{SetupSpec, SETUPS};
pub use tracer::TracerModel;

use odiff_model::{ModelError, ModelInstance};

/// Reimplementation instance, optionally bound to a named setup
///
/// # Errors
/// [`ModelError::Invalid`] for an unknown setup name.
pub fn new_instance(setup: Option<&str>, seed: u64) -> Result<Box<dyn ModelInstance>, ModelError> {
    let model = match setup {
        Some(name) => TracerModel::with_setup(name, seed)?,
        None => TracerModel::new(seed),
    };
    Ok(Box::new(model))
}

/// Load the legacy reference from `library`
///
/// # Errors
/// See [`LegacyTracerModel::load`].
pub fn load_legacy(library: &str, setup: Option<&str>, seed: u64) -> Result<Box<dyn ModelInstance>, ModelError> {
    Ok(Box::new(LegacyTracerModel::load(library, setup, seed)?))
}

/// Number of whole tracer steps in `runlen` seconds
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn step_count(runlen: f64, dt: f64) -> Result<u64, ModelError> {
    let steps = (runlen / dt).round();
    if !steps.is_finite() || steps < 0.0 {
        return Err(ModelError::Invalid(format!("runlen {runlen} with dt_tracer {dt}")));
    }
    Ok(steps as u64)
}
