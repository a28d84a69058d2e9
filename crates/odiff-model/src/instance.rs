//! The model-instance contract consumed by the harness

use crate::args::RoutineArgs;
use crate::error::ModelError;
use crate::value::AttrValue;
use serde::{Deserialize, Serialize};

/// Halo width, in cells, on each side of the two horizontal axes
pub const HALO: usize = 2;

/// Attribute names of the grid dimensions, in the order they are set
pub const GRID_ATTRIBUTES: [&str; 3] = ["nx", "ny", "nz"];

/// Grid dimensions, set once on both instances before allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    /// Interior cells along x
    pub nx: usize,
    /// Interior cells along y
    pub ny: usize,
    /// Vertical levels
    pub nz: usize,
}

impl GridDims {
    /// New grid
    #[must_use]
    pub const fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// `(name, value)` pairs in [`GRID_ATTRIBUTES`] order
    #[must_use]
    pub fn attributes(&self) -> [(&'static str, AttrValue); 3] {
        [
            (GRID_ATTRIBUTES[0], self.nx.into()),
            (GRID_ATTRIBUTES[1], self.ny.into()),
            (GRID_ATTRIBUTES[2], self.nz.into()),
        ]
    }

    /// Shape of a 3-d field including halo cells
    #[must_use]
    pub const fn padded_shape(&self) -> [usize; 3] {
        [self.nx + 2 * HALO, self.ny + 2 * HALO, self.nz]
    }
}

/// A model instance with named attributes and routines
///
/// Implemented by the reimplementation under test and by the legacy
/// reference. The trait is object safe so that the worker process can host
/// whichever legacy flavour it was started with.
pub trait ModelInstance: Send {
    /// Short label used in logs
    fn label(&self) -> &str;

    /// Current value of `name`, or `None` if the instance has no such attribute
    fn get_attribute(&self, name: &str) -> Option<AttrValue>;

    /// Assign `value` to `name`
    ///
    /// # Errors
    /// [`ModelError::UnknownAttribute`] if the name is not addressable, or a
    /// type/shape error from the accessor.
    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<(), ModelError>;

    /// Invoke routine `name`
    ///
    /// # Errors
    /// [`ModelError::UnknownRoutine`] if no such routine exists.
    fn call_routine(&mut self, name: &str, args: &RoutineArgs) -> Result<Option<AttrValue>, ModelError>;

    /// Legalize settings and allocate memory for every module
    fn prepare(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Full set-up of a named configuration for run-to-completion mode
    fn setup(&mut self) -> Result<(), ModelError> {
        Err(ModelError::Unsupported("setup".into()))
    }

    /// Integrate for the configured run length
    fn run(&mut self) -> Result<(), ModelError> {
        Err(ModelError::Unsupported("run".into()))
    }
}

impl<M: ModelInstance + ?Sized> ModelInstance for Box<M> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn get_attribute(&self, name: &str) -> Option<AttrValue> {
        (**self).get_attribute(name)
    }

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<(), ModelError> {
        (**self).set_attribute(name, value)
    }

    fn call_routine(&mut self, name: &str, args: &RoutineArgs) -> Result<Option<AttrValue>, ModelError> {
        (**self).call_routine(name, args)
    }

    fn prepare(&mut self) -> Result<(), ModelError> {
        (**self).prepare()
    }

    fn setup(&mut self) -> Result<(), ModelError> {
        (**self).setup()
    }

    fn run(&mut self) -> Result<(), ModelError> {
        (**self).run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_attributes_follow_setting_order() {
        let dims = GridDims::new(4, 4, 3);
        let attrs = dims.attributes();
        assert_eq!(attrs[0], ("nx", AttrValue::from(4_i64)));
        assert_eq!(attrs[2], ("nz", AttrValue::from(3_i64)));
        assert_eq!(dims.padded_shape(), [8, 8, 3]);
    }
}
