//! The legacy proxy against a real worker process.
//!
//! Covered here:
//! - values written through the proxy read back unchanged, arrays included
//! - absent attributes read as `None` while writing them fails with the name
//! - routines the legacy side lacks fail as "routine not found"
//! - a missing reference library fails at start-up, before any request

mod common;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use odiff_harness::{HarnessError, LegacyProxy, Side, WorkerOptions};
use odiff_model::{AttrValue, RoutineArgs};
use pretty_assertions::assert_eq;

async fn start(library: &tempfile::NamedTempFile) -> LegacyProxy {
    LegacyProxy::start(&WorkerOptions::new(common::worker(), library.path()))
        .await
        .unwrap()
}

async fn allocate(proxy: &mut LegacyProxy) {
    for (name, value) in [("nx", 4_i64), ("ny", 4), ("nz", 1)] {
        proxy.set_attribute(name, &value.into()).await.unwrap();
    }
    proxy
        .call_routine("my_mpi_init", &RoutineArgs::new().arg(0_i64))
        .await
        .unwrap();
    for routine in [
        "pe_decomposition",
        "set_legacy_parameter",
        "allocate_main_module",
        "allocate_diffusion_module",
    ] {
        proxy.call_routine(routine, &RoutineArgs::new()).await.unwrap();
    }
}

#[tokio::test]
async fn grid_size_round_trips_through_the_worker() {
    let library = common::fake_library();
    let mut proxy = start(&library).await;
    assert!(proxy.pid().is_some());

    proxy.set_attribute("nx", &4_i64.into()).await.unwrap();
    assert_eq!(proxy.get_attribute("nx").await.unwrap(), Some(AttrValue::from(4_i64)));
    proxy.shutdown().await.unwrap();
}

/// Arrays cross the process boundary in column-major order and come back
/// with the same logical values.
#[tokio::test]
async fn arrays_keep_their_values_across_the_boundary() {
    let library = common::fake_library();
    let mut proxy = start(&library).await;
    allocate(&mut proxy).await;

    let c_order = ArrayD::from_shape_fn(IxDyn(&[8, 8, 1]), |ix| (ix[0] * 10 + ix[1]) as f64);
    let mut f_order = ArrayD::zeros(IxDyn(&[8, 8, 1]).f());
    f_order.assign(&c_order);

    proxy.set_attribute("temp", &c_order.clone().into()).await.unwrap();
    assert_eq!(proxy.get_attribute("temp").await.unwrap(), Some(AttrValue::from(c_order.clone())));

    proxy.set_attribute("salt", &f_order.into()).await.unwrap();
    assert_eq!(proxy.get_attribute("salt").await.unwrap(), Some(AttrValue::from(c_order)));
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn lookup_failures_name_the_attribute_or_routine() {
    let library = common::fake_library();
    let mut proxy = start(&library).await;

    assert_eq!(proxy.get_attribute("vorticity").await.unwrap(), None);

    let err = proxy.set_attribute("vorticity", &1.0.into()).await.unwrap_err();
    assert!(matches!(err, HarnessError::Attribute { ref name, side: Side::Legacy } if name == "vorticity"));

    let err = proxy.call_routine("advect_tracers", &RoutineArgs::new()).await.unwrap_err();
    assert!(matches!(err, HarnessError::RoutineNotFound { ref name, side: Side::Legacy } if name == "advect_tracers"));

    // the worker keeps serving after a failed request
    proxy.set_attribute("ny", &3_i64.into()).await.unwrap();
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn out_of_order_initialization_is_a_model_error() {
    let library = common::fake_library();
    let mut proxy = start(&library).await;
    let err = proxy
        .call_routine("allocate_main_module", &RoutineArgs::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Model { side: Side::Legacy, .. }));
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_library_fails_at_startup() {
    let options = WorkerOptions::new(common::worker(), "/nonexistent/libreference.so");
    let err = LegacyProxy::start(&options).await.unwrap_err();
    let HarnessError::Startup { library, message } = &err else {
        panic!("expected a start-up error, got {err}");
    };
    assert_eq!(library, "/nonexistent/libreference.so");
    assert!(message.contains("no such file"), "{message}");
    assert!(err.is_infrastructure());
}

#[tokio::test]
async fn unknown_setup_fails_at_startup() {
    let library = common::fake_library();
    let options = WorkerOptions::new(common::worker(), library.path()).with_setup("abyssal_plain");
    let err = LegacyProxy::start(&options).await.unwrap_err();
    assert!(matches!(err, HarnessError::Startup { .. }));
}
