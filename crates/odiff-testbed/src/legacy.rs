//! Legacy reference model
//!
//! Mirrors the behaviour of the original compiled library: column-major
//! fields, module-by-module allocation driven by an explicit call sequence,
//! 1-based subdomain bounds passed as keyword arguments, and process-global
//! state. Only one instance may exist per process; [`LegacyTracerModel::load`]
//! refuses a second one until the first is dropped.

use crate::setups::{self, SetupSpec};
use ndarray::{Array3, ArrayD, Ix3, ShapeBuilder};
use odiff_model::{
    AttrValue, AttributeKind, AttributeTable, GridDims, ModelError, ModelInstance, RoutineArgs,
    HALO,
};
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

static LOADED: AtomicBool = AtomicBool::new(false);

/// Subdomain bounds in padded (0-based) indices, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    is: usize,
    ie: usize,
    js: usize,
    je: usize,
}

/// The reference implementation, one per process
#[derive(Debug)]
pub struct LegacyTracerModel {
    seed: u64,
    setup: Option<&'static SetupSpec>,

    mpi_ready: bool,
    decomposed: bool,
    main_allocated: bool,
    diffusion_allocated: bool,

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

    my_pe: i64,
    n_pes: i64,
    is_pe: i64,
    ie_pe: i64,
    js_pe: i64,
    je_pe: i64,

    temp: Array3<f64>,
    salt: Array3<f64>,
    dtemp: Array3<f64>,
    dsalt: Array3<f64>,
    mask_t: Array3<f64>,
    kappa_field: Array3<f64>,
}

fn unallocated() -> Array3<f64> {
    Array3::zeros([0_usize; 3].f())
}

/// Column-major copy
fn fortran(a: &Array3<f64>) -> Array3<f64> {
    let mut out = Array3::zeros(a.raw_dim().f());
    out.assign(a);
    out
}

fn field_value(field: &Array3<f64>) -> AttrValue {
    AttrValue::Array(field.clone().into_dyn())
}

fn replace_field(target: &mut Array3<f64>, name: &str, value: AttrValue) -> Result<(), ModelError> {
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
    *target = fortran(&array);
    Ok(())
}

fn set_dim(m: &LegacyTracerModel, name: &str, value: AttrValue) -> Result<usize, ModelError> {
    if m.main_allocated {
        return Err(ModelError::GridFrozen(name.to_string()));
    }
    value.into_usize(name)
}

static ATTRIBUTES: Lazy<AttributeTable<LegacyTracerModel>> = Lazy::new(|| {
    AttributeTable::<LegacyTracerModel>::new()
        // main_module
        .scalar("main_module", "nx", |m| m.nx.into(), |m, n, v| {
            m.nx = set_dim(m, n, v)?;
            Ok(())
        })
        .scalar("main_module", "ny", |m| m.ny.into(), |m, n, v| {
            m.ny = set_dim(m, n, v)?;
            Ok(())
        })
        .scalar("main_module", "nz", |m| m.nz.into(), |m, n, v| {
            m.nz = set_dim(m, n, v)?;
            Ok(())
        })
        .scalar("main_module", "dx", |m| m.dx.into(), |m, n, v| {
            m.dx = v.into_f64(n)?;
            Ok(())
        })
        .scalar("main_module", "dy", |m| m.dy.into(), |m, n, v| {
            m.dy = v.into_f64(n)?;
            Ok(())
        })
        .scalar("main_module", "dt_tracer", |m| m.dt_tracer.into(), |m, n, v| {
            m.dt_tracer = v.into_f64(n)?;
            Ok(())
        })
        .scalar("main_module", "runlen", |m| m.runlen.into(), |m, n, v| {
            m.runlen = v.into_f64(n)?;
            Ok(())
        })
        .scalar("main_module", "itt", |m| m.itt.into(), |m, n, v| {
            m.itt = v.into_i64(n)?;
            Ok(())
        })
        .read_only("main_module", "time", AttributeKind::Scalar, |m| m.time.into())
        .read_only("main_module", "my_pe", AttributeKind::Scalar, |m| m.my_pe.into())
        .read_only("main_module", "n_pes", AttributeKind::Scalar, |m| m.n_pes.into())
        .read_only("main_module", "is_pe", AttributeKind::Scalar, |m| m.is_pe.into())
        .read_only("main_module", "ie_pe", AttributeKind::Scalar, |m| m.ie_pe.into())
        .read_only("main_module", "js_pe", AttributeKind::Scalar, |m| m.js_pe.into())
        .read_only("main_module", "je_pe", AttributeKind::Scalar, |m| m.je_pe.into())
        .array("main_module", "temp", |m| field_value(&m.temp), |m, n, v| {
            replace_field(&mut m.temp, n, v)
        })
        .array("main_module", "salt", |m| field_value(&m.salt), |m, n, v| {
            replace_field(&mut m.salt, n, v)
        })
        .array("main_module", "dtemp", |m| field_value(&m.dtemp), |m, n, v| {
            replace_field(&mut m.dtemp, n, v)
        })
        .array("main_module", "dsalt", |m| field_value(&m.dsalt), |m, n, v| {
            replace_field(&mut m.dsalt, n, v)
        })
        .array("main_module", "maskT", |m| field_value(&m.mask_t), |m, n, v| {
            replace_field(&mut m.mask_t, n, v)
        })
        // diffusion_module
        .scalar("diffusion_module", "kappa_h", |m| m.kappa_h.into(), |m, n, v| {
            m.kappa_h = v.into_f64(n)?;
            Ok(())
        })
        .scalar("diffusion_module", "enable_diffusion", |m| m.enable_diffusion.into(), |m, n, v| {
            m.enable_diffusion = v.into_bool(n)?;
            Ok(())
        })
        .array("diffusion_module", "kappa_field", |m| field_value(&m.kappa_field), |m, n, v| {
            replace_field(&mut m.kappa_field, n, v)
        })
});

fn check_library(library: &str) -> Result<(), ModelError> {
    let reason = if library.is_empty() {
        "no path given"
    } else if !Path::new(library).is_file() {
        "no such file"
    } else {
        return Ok(());
    };
    Err(ModelError::Library {
        path: library.to_string(),
        reason: reason.to_string(),
    })
}

impl LegacyTracerModel {
    /// Load the reference library at `library`
    ///
    /// With `setup` given, the instance is bound to that named
    /// configuration for run-to-completion mode.
    ///
    /// # Errors
    /// [`ModelError::Library`] if the library file is missing,
    /// [`ModelError::NonReentrant`] if this process already holds an instance.
    pub fn load(library: &str, setup: Option<&str>, seed: u64) -> Result<Self, ModelError> {
        check_library(library)?;
        let setup = setup
            .map(|name| setups::find(name).ok_or_else(|| ModelError::Invalid(format!("unknown setup {name}"))))
            .transpose()?;
        if LOADED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ModelError::NonReentrant);
        }
        tracing::info!(library, setup = setup.map(|s| s.name), "legacy library loaded");
        Ok(Self {
            seed,
            setup,
            mpi_ready: false,
            decomposed: false,
            main_allocated: false,
            diffusion_allocated: false,
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
            my_pe: -1,
            n_pes: 0,
            is_pe: 0,
            ie_pe: 0,
            js_pe: 0,
            je_pe: 0,
            temp: unallocated(),
            salt: unallocated(),
            dtemp: unallocated(),
            dsalt: unallocated(),
            mask_t: unallocated(),
            kappa_field: unallocated(),
        })
    }

    /// True while some instance is alive in this process
    #[must_use]
    pub fn is_loaded() -> bool {
        LOADED.load(Ordering::Acquire)
    }

    /// The accessor table shared by all instances
    #[must_use]
    pub fn attribute_table() -> &'static AttributeTable<Self> {
        &ATTRIBUTES
    }

    fn dims(&self) -> GridDims {
        GridDims::new(self.nx, self.ny, self.nz)
    }

    fn my_mpi_init(&mut self, args: &RoutineArgs) -> Result<(), ModelError> {
        let comm = args.require_positional("my_mpi_init", 0)?;
        if comm.as_i64().is_none() {
            return Err(ModelError::type_mismatch("comm", "integer"));
        }
        self.my_pe = 0;
        self.n_pes = 1;
        self.mpi_ready = true;
        Ok(())
    }

    fn pe_decomposition(&mut self) -> Result<(), ModelError> {
        if !self.mpi_ready {
            return Err(ModelError::Invalid("pe_decomposition called before my_mpi_init".into()));
        }
        let to_i64 = |n: usize| i64::try_from(n).map_err(|_| ModelError::Invalid(format!("extent {n}")));
        self.is_pe = 1;
        self.ie_pe = to_i64(self.nx)?;
        self.js_pe = 1;
        self.je_pe = to_i64(self.ny)?;
        self.decomposed = true;
        Ok(())
    }

    fn set_legacy_parameter(&self) -> Result<(), ModelError> {
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

    fn allocate_main_module(&mut self) -> Result<(), ModelError> {
        if !self.decomposed {
            return Err(ModelError::NotAllocated("allocate_main_module".into()));
        }
        let shape = self.dims().padded_shape().f();
        self.temp = Array3::zeros(shape);
        self.salt = Array3::zeros(shape);
        self.dtemp = Array3::zeros(shape);
        self.dsalt = Array3::zeros(shape);
        self.mask_t = fortran(&setups::tracer_mask(self.dims(), false));
        self.main_allocated = true;
        Ok(())
    }

    fn allocate_diffusion_module(&mut self) -> Result<(), ModelError> {
        if !self.main_allocated {
            return Err(ModelError::NotAllocated("allocate_diffusion_module".into()));
        }
        self.kappa_field = Array3::from_elem(self.dims().padded_shape().f(), self.kappa_h);
        self.diffusion_allocated = true;
        Ok(())
    }

    fn require_allocated(&self, routine: &str) -> Result<(), ModelError> {
        if self.main_allocated && self.diffusion_allocated {
            Ok(())
        } else {
            Err(ModelError::NotAllocated(routine.to_string()))
        }
    }

    /// Convert 1-based subdomain bounds to padded indices
    fn bounds(&self, is: i64, ie: i64, js: i64, je: i64) -> Result<Bounds, ModelError> {
        let padded = |f: i64, n: usize| -> Option<usize> {
            let f = usize::try_from(f).ok()?;
            (1..=n).contains(&f).then_some(f + HALO - 1)
        };
        match (padded(is, self.nx), padded(ie, self.nx), padded(js, self.ny), padded(je, self.ny)) {
            (Some(is), Some(ie), Some(js), Some(je)) if is <= ie && js <= je => Ok(Bounds { is, ie, js, je }),
            _ => Err(ModelError::Invalid(format!(
                "subdomain {is}:{ie} x {js}:{je} outside 1:{} x 1:{}",
                self.nx, self.ny
            ))),
        }
    }

    fn own_bounds(&self) -> Result<Bounds, ModelError> {
        self.bounds(self.is_pe, self.ie_pe, self.js_pe, self.je_pe)
    }

    fn diffuse_tracers(&mut self, bounds: Bounds) {
        if !self.enable_diffusion {
            self.dtemp.fill(0.0);
            self.dsalt.fill(0.0);
            return;
        }
        let coeffs = Coefficients {
            rdx: 1.0 / self.dx,
            rdy: 1.0 / self.dy,
            dt: self.dt_tracer,
        };
        diffuse(&mut self.temp, &mut self.dtemp, &self.mask_t, &self.kappa_field, bounds, coeffs);
        diffuse(&mut self.salt, &mut self.dsalt, &self.mask_t, &self.kappa_field, bounds, coeffs);
    }

    fn apply_boundary_conditions(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        set_cyclic_x(&mut self.temp, nx);
        set_cyclic_x(&mut self.salt, nx);
        set_zero_gradient_y(&mut self.temp, ny);
        set_zero_gradient_y(&mut self.salt, ny);
    }

    fn step(&mut self) -> Result<(), ModelError> {
        let bounds = self.own_bounds()?;
        self.diffuse_tracers(bounds);
        self.apply_boundary_conditions();
        self.itt += 1;
        self.time += self.dt_tracer;
        Ok(())
    }
}

impl Drop for LegacyTracerModel {
    fn drop(&mut self) {
        LOADED.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
struct Coefficients {
    rdx: f64,
    rdy: f64,
    dt: f64,
}

/// Explicit flux arrays, then divergence, then update
fn diffuse(
    field: &mut Array3<f64>,
    tendency: &mut Array3<f64>,
    mask: &Array3<f64>,
    kappa: &Array3<f64>,
    b: Bounds,
    c: Coefficients,
) {
    let (px, py, nz) = field.dim();
    let mut flux_east = Array3::<f64>::zeros((px, py, nz).f());
    let mut flux_north = Array3::<f64>::zeros((px, py, nz).f());

    for k in 0..nz {
        for j in b.js..=b.je {
            for i in b.is - 1..=b.ie {
                let kf = 0.5 * (kappa[[i, j, k]] + kappa[[i + 1, j, k]]);
                flux_east[[i, j, k]] = kf
                    * mask[[i, j, k]]
                    * mask[[i + 1, j, k]]
                    * (field[[i + 1, j, k]] - field[[i, j, k]])
                    * c.rdx;
            }
        }
        for j in b.js - 1..=b.je {
            for i in b.is..=b.ie {
                let kf = 0.5 * (kappa[[i, j, k]] + kappa[[i, j + 1, k]]);
                flux_north[[i, j, k]] = kf
                    * mask[[i, j, k]]
                    * mask[[i, j + 1, k]]
                    * (field[[i, j + 1, k]] - field[[i, j, k]])
                    * c.rdy;
            }
        }
        for j in b.js..=b.je {
            for i in b.is..=b.ie {
                tendency[[i, j, k]] = mask[[i, j, k]]
                    * ((flux_east[[i, j, k]] - flux_east[[i - 1, j, k]]) * c.rdx
                        + (flux_north[[i, j, k]] - flux_north[[i, j - 1, k]]) * c.rdy);
            }
        }
        for j in b.js..=b.je {
            for i in b.is..=b.ie {
                field[[i, j, k]] += c.dt * tendency[[i, j, k]];
            }
        }
    }
}

fn set_cyclic_x(field: &mut Array3<f64>, nx: usize) {
    let (_, py, nz) = field.dim();
    for k in 0..nz {
        for j in 0..py {
            for h in 0..HALO {
                field[[h, j, k]] = field[[nx + h, j, k]];
                field[[nx + HALO + h, j, k]] = field[[HALO + h, j, k]];
            }
        }
    }
}

fn set_zero_gradient_y(field: &mut Array3<f64>, ny: usize) {
    let (px, _, nz) = field.dim();
    for k in 0..nz {
        for i in 0..px {
            for h in 0..HALO {
                field[[i, h, k]] = field[[i, HALO, k]];
                field[[i, ny + HALO + h, k]] = field[[i, ny + HALO - 1, k]];
            }
        }
    }
}

fn keyword_i64(args: &RoutineArgs, routine: &str, name: &str) -> Result<i64, ModelError> {
    args.require_keyword(routine, name)?
        .as_i64()
        .ok_or_else(|| ModelError::type_mismatch(name, "integer"))
}

impl ModelInstance for LegacyTracerModel {
    fn label(&self) -> &str {
        "legacy"
    }

    fn get_attribute(&self, name: &str) -> Option<AttrValue> {
        ATTRIBUTES.get(self, name)
    }

    fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<(), ModelError> {
        ATTRIBUTES.set(self, name, value)
    }

    fn call_routine(&mut self, name: &str, args: &RoutineArgs) -> Result<Option<AttrValue>, ModelError> {
        match name {
            "my_mpi_init" => self.my_mpi_init(args)?,
            "pe_decomposition" => self.pe_decomposition()?,
            "set_legacy_parameter" => self.set_legacy_parameter()?,
            "allocate_main_module" => self.allocate_main_module()?,
            "allocate_diffusion_module" => self.allocate_diffusion_module()?,
            "diffuse_tracers" => {
                self.require_allocated(name)?;
                let bounds = self.bounds(
                    keyword_i64(args, name, "is_pe")?,
                    keyword_i64(args, name, "ie_pe")?,
                    keyword_i64(args, name, "js_pe")?,
                    keyword_i64(args, name, "je_pe")?,
                )?;
                self.diffuse_tracers(bounds);
            }
            "apply_boundary_conditions" => {
                self.require_allocated(name)?;
                self.apply_boundary_conditions();
            }
            "step" => {
                self.require_allocated(name)?;
                self.step()?;
            }
            _ => return Err(ModelError::UnknownRoutine(name.to_string())),
        }
        Ok(None)
    }

    /// Runs the whole initialization sequence in its required order
    fn prepare(&mut self) -> Result<(), ModelError> {
        self.my_mpi_init(&RoutineArgs::new().arg(0_i64))?;
        self.pe_decomposition()?;
        self.set_legacy_parameter()?;
        self.allocate_main_module()?;
        self.allocate_diffusion_module()
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
        self.mask_t = fortran(&setups::tracer_mask(spec.dims, spec.land));
        self.temp = fortran(&setups::initial_temperature(spec, self.seed));
        self.salt = fortran(&setups::initial_salinity(spec));
        self.apply_boundary_conditions();
        Ok(())
    }

    fn run(&mut self) -> Result<(), ModelError> {
        self.require_allocated("run")?;
        for _ in 0..crate::step_count(self.runlen, self.dt_tracer)? {
            self.step()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static SERIAL: Mutex<()> = Mutex::new(());

    /// Legacy instances are process-global; tests that load one take this lock
    pub(crate) fn exclusive() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn fake_library() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    fn loaded(lib: &tempfile::NamedTempFile) -> LegacyTracerModel {
        LegacyTracerModel::load(lib.path().to_str().unwrap(), None, 17).unwrap()
    }

    fn configure(model: &mut LegacyTracerModel, dims: GridDims) {
        for (name, value) in dims.attributes() {
            model.set_attribute(name, value).unwrap();
        }
    }

    #[test]
    fn second_instance_is_refused_until_the_first_drops() {
        let _guard = exclusive();
        let lib = fake_library();
        let first = loaded(&lib);
        assert!(LegacyTracerModel::is_loaded());
        let err = LegacyTracerModel::load(lib.path().to_str().unwrap(), None, 17).unwrap_err();
        assert_eq!(err, ModelError::NonReentrant);
        drop(first);
        assert!(!LegacyTracerModel::is_loaded());
        let _again = loaded(&lib);
    }

    #[test]
    fn missing_library_is_reported_by_path() {
        let _guard = exclusive();
        let err = LegacyTracerModel::load("/nonexistent/libreference.so", None, 0).unwrap_err();
        assert!(matches!(err, ModelError::Library { ref path, .. } if path == "/nonexistent/libreference.so"));
        assert!(matches!(LegacyTracerModel::load("", None, 0), Err(ModelError::Library { .. })));
        assert!(!LegacyTracerModel::is_loaded());
    }

    #[test]
    fn allocation_follows_the_init_sequence() {
        let _guard = exclusive();
        let lib = fake_library();
        let mut model = loaded(&lib);
        configure(&mut model, GridDims::new(4, 4, 3));
        let none = RoutineArgs::new();

        assert!(matches!(
            model.call_routine("allocate_main_module", &none),
            Err(ModelError::NotAllocated(_))
        ));
        assert!(model.call_routine("pe_decomposition", &none).is_err());

        model.call_routine("my_mpi_init", &RoutineArgs::new().arg(0_i64)).unwrap();
        model.call_routine("pe_decomposition", &none).unwrap();
        model.call_routine("set_legacy_parameter", &none).unwrap();
        model.call_routine("allocate_main_module", &none).unwrap();
        model.call_routine("allocate_diffusion_module", &none).unwrap();

        assert_eq!(model.get_attribute("ie_pe"), Some(AttrValue::from(4_i64)));
        let temp = model.get_attribute("temp").unwrap();
        let temp = temp.as_array().unwrap();
        assert_eq!(temp.shape(), &[8, 8, 3]);
        assert!(temp.t().is_standard_layout());
    }

    #[test]
    fn diffusion_requires_subdomain_keywords() {
        let _guard = exclusive();
        let lib = fake_library();
        let mut model = loaded(&lib);
        configure(&mut model, GridDims::new(4, 4, 1));
        model.prepare().unwrap();

        let err = model.call_routine("diffuse_tracers", &RoutineArgs::new()).unwrap_err();
        assert_eq!(err, ModelError::missing_argument("diffuse_tracers", "is_pe"));

        let out_of_range = RoutineArgs::new()
            .kwarg("is_pe", 0_i64)
            .kwarg("ie_pe", 4_i64)
            .kwarg("js_pe", 1_i64)
            .kwarg("je_pe", 4_i64);
        assert!(matches!(
            model.call_routine("diffuse_tracers", &out_of_range),
            Err(ModelError::Invalid(_))
        ));
    }

    #[test]
    fn matches_the_reimplementation_after_a_step() {
        use crate::TracerModel;

        let _guard = exclusive();
        let lib = fake_library();
        let mut legacy = LegacyTracerModel::load(lib.path().to_str().unwrap(), Some("basin"), 3).unwrap();
        let mut new = TracerModel::with_setup("basin", 3).unwrap();
        legacy.setup().unwrap();
        new.setup().unwrap();

        legacy.call_routine("step", &RoutineArgs::new()).unwrap();
        new.call_routine("step", &RoutineArgs::new()).unwrap();

        let a = new.get_attribute("temp").unwrap();
        let b = legacy.get_attribute("temp").unwrap();
        let (a, b) = (a.as_array().unwrap(), b.as_array().unwrap());
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= 1e-12 * y.abs().max(1.0), "{x} vs {y}");
        }
    }
}
