//! Reimplemented tracer model
//!
//! C-ordered fields, positional routine arguments and a single `prepare`
//! step that legalizes settings and allocates every module at once.

use crate::setups::{self, SetupSpec};
use ndarray::{s, Array3, ArrayD, Ix3};
use odiff_model::{
    AttrValue, AttributeKind, AttributeTable, GridDims, ModelError, ModelInstance, RoutineArgs,
    HALO,
};
use once_cell::sync::Lazy;

/// Tracer-diffusion model with a halo of [`HALO`] cells
#[derive(Debug, Clone)]
pub struct TracerModel {
    seed: u64,
    setup: Option<&'static SetupSpec>,
    allocated: bool,

    nx: usize,
    ny: usize,
    nz: usize,
    dt_tracer: f64,
    runlen: f64,
    dx: f64,
    dy: f64,
    kappa_h: f64,
    enable_diffusion: bool,
    itt: i64,
    time: f64,

    temp: Array3<f64>,
    salt: Array3<f64>,
    dtemp: Array3<f64>,
    dsalt: Array3<f64>,
    mask_t: Array3<f64>,
    kappa_field: Array3<f64>,
}

fn unallocated() -> Array3<f64> {
    Array3::zeros((0, 0, 0))
}

fn field_value(field: &Array3<f64>) -> AttrValue {
    AttrValue::Array(field.clone().into_dyn())
}

/// In-place assignment; the allocated shape must match
fn assign_field(target: &mut Array3<f64>, name: &str, value: AttrValue) -> Result<(), ModelError> {
    let array: ArrayD<f64> = value.into_array(name)?;
    if array.shape() != target.shape() {
        return Err(ModelError::ShapeMismatch {
            name: name.to_string(),
            expected: target.shape().to_vec(),
            found: array.shape().to_vec(),
        });
    }
    let array = array
        .into_dimensionality::<Ix3>()
        .map_err(|_| ModelError::type_mismatch(name, "3-d array"))?;
    target.assign(&array);
    Ok(())
}

fn set_dim(m: &mut TracerModel, name: &str, value: AttrValue) -> Result<usize, ModelError> {
    if m.allocated {
        return Err(ModelError::GridFrozen(name.to_string()));
    }
    value.into_usize(name)
}

static ATTRIBUTES: Lazy<AttributeTable<TracerModel>> = Lazy::new(|| {
    AttributeTable::<TracerModel>::new()
        .scalar("grid", "nx", |m| m.nx.into(), |m, n, v| {
            m.nx = set_dim(m, n, v)?;
            Ok(())
        })
        .scalar("grid", "ny", |m| m.ny.into(), |m, n, v| {
            m.ny = set_dim(m, n, v)?;
            Ok(())
        })
        .scalar("grid", "nz", |m| m.nz.into(), |m, n, v| {
            m.nz = set_dim(m, n, v)?;
            Ok(())
        })
        .scalar("grid", "dx", |m| m.dx.into(), |m, n, v| {
            m.dx = v.into_f64(n)?;
            Ok(())
        })
        .scalar("grid", "dy", |m| m.dy.into(), |m, n, v| {
            m.dy = v.into_f64(n)?;
            Ok(())
        })
        .scalar("time", "dt_tracer", |m| m.dt_tracer.into(), |m, n, v| {
            m.dt_tracer = v.into_f64(n)?;
            Ok(())
        })
        .scalar("time", "runlen", |m| m.runlen.into(), |m, n, v| {
            m.runlen = v.into_f64(n)?;
            Ok(())
        })
        .scalar("time", "itt", |m| m.itt.into(), |m, n, v| {
            m.itt = v.into_i64(n)?;
            Ok(())
        })
        .read_only("time", "time", AttributeKind::Scalar, |m| m.time.into())
        .read_only("parallel", "my_pe", AttributeKind::Scalar, |_| 0_i64.into())
        .read_only("parallel", "n_pes", AttributeKind::Scalar, |_| 1_i64.into())
        .scalar("diffusion", "kappa_h", |m| m.kappa_h.into(), |m, n, v| {
            m.kappa_h = v.into_f64(n)?;
            Ok(())
        })
        .scalar("diffusion", "enable_diffusion", |m| m.enable_diffusion.into(), |m, n, v| {
            m.enable_diffusion = v.into_bool(n)?;
            Ok(())
        })
        .array("tracers", "temp", |m| field_value(&m.temp), |m, n, v| {
            assign_field(&mut m.temp, n, v)
        })
        .array("tracers", "salt", |m| field_value(&m.salt), |m, n, v| {
            assign_field(&mut m.salt, n, v)
        })
        .array("tracers", "dtemp", |m| field_value(&m.dtemp), |m, n, v| {
            assign_field(&mut m.dtemp, n, v)
        })
        .array("tracers", "dsalt", |m| field_value(&m.dsalt), |m, n, v| {
            assign_field(&mut m.dsalt, n, v)
        })
        .array("grid", "maskT", |m| field_value(&m.mask_t), |m, n, v| {
            assign_field(&mut m.mask_t, n, v)
        })
        .array("diffusion", "kappa_field", |m| field_value(&m.kappa_field), |m, n, v| {
            assign_field(&mut m.kappa_field, n, v)
        })
});

impl TracerModel {
    /// Unconfigured instance; `seed` drives any randomized initial state
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            setup: None,
            allocated: false,
            nx: 0,
            ny: 0,
            nz: 0,
            dt_tracer: 3600.0,
            runlen: 0.0,
            dx: 1.0e5,
            dy: 1.0e5,
            kappa_h: 1.0e3,
            enable_diffusion: true,
            itt: 0,
            time: 0.0,
            temp: unallocated(),
            salt: unallocated(),
            dtemp: unallocated(),
            dsalt: unallocated(),
            mask_t: unallocated(),
            kappa_field: unallocated(),
        }
    }

    /// Instance bound to a named configuration for run-to-completion mode
    pub fn with_setup(name: &str, seed: u64) -> Result<Self, ModelError> {
        let spec = setups::find(name).ok_or_else(|| ModelError::Invalid(format!("unknown setup {name}")))?;
        let mut model = Self::new(seed);
        model.setup = Some(spec);
        Ok(model)
    }

    /// The accessor table shared by all instances
    #[must_use]
    pub fn attribute_table() -> &'static AttributeTable<Self> {
        &ATTRIBUTES
    }

    /// Grid dimensions as currently set
    #[must_use]
    pub fn dims(&self) -> GridDims {
        GridDims::new(self.nx, self.ny, self.nz)
    }

    fn legalize(&self) -> Result<(), ModelError> {
        if self.nx < 2 || self.ny < 2 || self.nz < 1 {
            return Err(ModelError::Invalid(format!(
                "grid {}x{}x{} is too small",
                self.nx, self.ny, self.nz
            )));
        }
        if !(self.dt_tracer.is_finite() && self.dt_tracer > 0.0) {
            return Err(ModelError::Invalid(format!("dt_tracer = {}", self.dt_tracer)));
        }
        if !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(ModelError::Invalid("grid spacing must be positive".into()));
        }
        Ok(())
    }

    fn allocate(&mut self) {
        let shape = self.dims().padded_shape();
        self.temp = Array3::zeros(shape);
        self.salt = Array3::zeros(shape);
        self.dtemp = Array3::zeros(shape);
        self.dsalt = Array3::zeros(shape);
        self.mask_t = setups::tracer_mask(self.dims(), false);
        self.kappa_field = Array3::from_elem(shape, self.kappa_h);
        self.allocated = true;
    }

    fn require_allocated(&self, routine: &str) -> Result<(), ModelError> {
        if self.allocated {
            Ok(())
        } else {
            Err(ModelError::NotAllocated(routine.to_string()))
        }
    }

    fn diffuse_tracers(&mut self) {
        if !self.enable_diffusion {
            self.dtemp.fill(0.0);
            self.dsalt.fill(0.0);
            return;
        }
        let params = (self.dx, self.dy, self.dt_tracer);
        diffuse(&mut self.temp, &mut self.dtemp, &self.mask_t, &self.kappa_field, params);
        diffuse(&mut self.salt, &mut self.dsalt, &self.mask_t, &self.kappa_field, params);
    }

    fn apply_boundary_conditions(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        exchange_halo(&mut self.temp, nx, ny);
        exchange_halo(&mut self.salt, nx, ny);
    }

    fn step(&mut self) {
        self.diffuse_tracers();
        self.apply_boundary_conditions();
        self.itt += 1;
        self.time += self.dt_tracer;
    }
}

/// Flux-form Laplacian diffusion on the interior
///
/// Fills `tendency` first, then advances `field` by one tracer step.
fn diffuse(
    field: &mut Array3<f64>,
    tendency: &mut Array3<f64>,
    mask: &Array3<f64>,
    kappa: &Array3<f64>,
    (dx, dy, dt): (f64, f64, f64),
) {
    let (px, py, nz) = field.dim();
    let face = |a: [usize; 3], b: [usize; 3]| 0.5 * (kappa[a] + kappa[b]) * mask[a] * mask[b];

    for k in 0..nz {
        for j in HALO..py - HALO {
            for i in HALO..px - HALO {
                let c = [i, j, k];
                let (e, w, n, s) = ([i + 1, j, k], [i - 1, j, k], [i, j + 1, k], [i, j - 1, k]);
                let flux_e = face(c, e) * (field[e] - field[c]) / dx;
                let flux_w = face(w, c) * (field[c] - field[w]) / dx;
                let flux_n = face(c, n) * (field[n] - field[c]) / dy;
                let flux_s = face(s, c) * (field[c] - field[s]) / dy;
                tendency[c] = mask[c] * ((flux_e - flux_w) / dx + (flux_n - flux_s) / dy);
            }
        }
    }

    let mut interior = field.slice_mut(s![HALO..px - HALO, HALO..py - HALO, ..]);
    interior.scaled_add(dt, &tendency.slice(s![HALO..px - HALO, HALO..py - HALO, ..]));
}

/// Periodic in x, zero-gradient in y
fn exchange_halo(field: &mut Array3<f64>, nx: usize, ny: usize) {
    for h in 0..HALO {
        let west = field.slice(s![nx + h, .., ..]).to_owned();
        field.slice_mut(s![h, .., ..]).assign(&west);
        let east = field.slice(s![HALO + h, .., ..]).to_owned();
        field.slice_mut(s![nx + HALO + h, .., ..]).assign(&east);
    }
    let south = field.slice(s![.., HALO, ..]).to_owned();
    let north = field.slice(s![.., ny + HALO - 1, ..]).to_owned();
    for h in 0..HALO {
        field.slice_mut(s![.., h, ..]).assign(&south);
        field.slice_mut(s![.., ny + HALO + h, ..]).assign(&north);
    }
}

impl ModelInstance for TracerModel {
    fn label(&self) -> &str {
        "tracer"
    }

    fn get_attribute(&self, name: &str) -> Option<AttrValue> {
        ATTRIBUTES.get(self, name)
    }

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<(), ModelError> {
        ATTRIBUTES.set(self, name, value)
    }

    fn call_routine(&mut self, name: &str, _args: &RoutineArgs) -> Result<Option<AttrValue>, ModelError> {
        match name {
            "diffuse_tracers" => {
                self.require_allocated(name)?;
                self.diffuse_tracers();
            }
            "apply_boundary_conditions" => {
                self.require_allocated(name)?;
                self.apply_boundary_conditions();
            }
            "step" => {
                self.require_allocated(name)?;
                self.step();
            }
            "total_heat" => {
                self.require_allocated(name)?;
                let heat = (&self.temp * &self.mask_t)
                    .slice(s![HALO..self.nx + HALO, HALO..self.ny + HALO, ..])
                    .sum();
                return Ok(Some(heat.into()));
            }
            _ => return Err(ModelError::UnknownRoutine(name.to_string())),
        }
        Ok(None)
    }

    fn prepare(&mut self) -> Result<(), ModelError> {
        self.legalize()?;
        self.allocate();
        tracing::debug!(dims = ?self.dims(), "tracer model allocated");
        Ok(())
    }

    fn setup(&mut self) -> Result<(), ModelError> {
        let spec = self
            .setup
            .ok_or_else(|| ModelError::Unsupported("setup without a named configuration".into()))?;
        self.nx = spec.dims.nx;
        self.ny = spec.dims.ny;
        self.nz = spec.dims.nz;
        self.dt_tracer = spec.dt_tracer;
        self.dx = spec.dx;
        self.dy = spec.dy;
        self.kappa_h = spec.kappa_h;
        self.prepare()?;
        self.mask_t = setups::tracer_mask(spec.dims, spec.land);
        self.temp = setups::initial_temperature(spec, self.seed);
        self.salt = setups::initial_salinity(spec);
        self.apply_boundary_conditions();
        Ok(())
    }

    fn run(&mut self) -> Result<(), ModelError> {
        self.require_allocated("run")?;
        for _ in 0..crate::step_count(self.runlen, self.dt_tracer)? {
            self.step();
        }
        Ok(())
    }
}
