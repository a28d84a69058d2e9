//! odiff-harness - differential consistency testing
//!
//! Runs a reimplemented ocean model in-process and its legacy reference in a
//! worker process, mirrors settings into both and compares their state:
//! - [`AttributeRegistry`]: the attribute listings both sides are scanned over
//! - [`Comparator`]: halo-trimmed, normalized tolerance comparison
//! - [`Timer`]: accumulating timing scopes
//! - [`LegacyProxy`]: the worker process behind a request/response channel
//! - [`Harness`]: synchronization, advisory scans and hard checks
//!
//! # Example
//!
//! ```rust,ignore
//! use odiff_harness::prelude::*;
//!
//! # async fn example(test: &mut impl ConsistencyTest) -> odiff_harness::Result<()> {
//! let config = HarnessConfig::default().with_reference_library("/opt/ocean/libreference.so");
//! let outcome = run_unit(test, config).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod report;
pub mod state;
pub mod timer;
pub mod worker;

pub use compare::{Comparator, Discrepancy, Tolerance};
pub use config::HarnessConfig;
pub use engine::run::{run_to_completion, RunTest};
pub use engine::unit::{run_unit, ConsistencyTest};
pub use engine::{Harness, ValuePair};
pub use error::{HarnessError, Mismatch, Result, Side};
pub use proxy::{LegacyProxy, WorkerOptions};
pub use registry::AttributeRegistry;
pub use report::{AdvisoryEntry, AdvisoryReport, HarnessOutcome, RoutineReport};
pub use state::HarnessState;
pub use timer::{Timer, TimingReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing consistency tests
    pub use crate::{
        run_to_completion, run_unit, ConsistencyTest, Harness, HarnessConfig, HarnessError, RunTest,
        Tolerance,
    };
    pub use odiff_model::{AttrValue, GridDims, ModelError, ModelInstance, RoutineArgs, RoutineSpec};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
