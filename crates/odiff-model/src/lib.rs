//! odiff-model - the subject contract
//!
//! Types shared by the reimplemented ocean model, the legacy reference and
//! the consistency harness that drives both:
//! - [`AttrValue`] / [`Scalar`]: attribute values
//! - [`RoutineArgs`] / [`RoutineSpec`]: routine invocations per side
//! - [`AttributeTable`]: explicit name → accessor registry per model type
//! - [`ModelInstance`]: the surface every instance exposes

pub mod args;
pub mod error;
pub mod instance;
pub mod table;
pub mod value;

pub use args::{RoutineArgs, RoutineCall, RoutineSpec};
pub use error::ModelError;
pub use instance::{GridDims, ModelInstance, GRID_ATTRIBUTES, HALO};
pub use table::{AttributeSlot, AttributeTable, Getter, Setter};
pub use value::{AttrValue, AttributeKind, Scalar};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
