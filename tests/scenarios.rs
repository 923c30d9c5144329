//! End-to-end scenarios against the process-wide controller, driven
//! directly through the synchronous step loop (not the CLI front-end).
//!
//! Every test owns the controller singleton for its duration, so all of
//! them run serialized against one another.

mod support;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serial_test::serial;

use simhost::adapter::LoopbackAdapter;
use simhost::config::ChannelDef;
use simhost::controller::{self, with_active};
use simhost::error::SimError;

use support::{bare_sim, ArmableAdapter};

fn counting_step(counter: Arc<AtomicU32>) -> impl FnMut(&mut f64, f64) -> i32 {
    move |model_time, stop_time| {
        counter.fetch_add(1, Ordering::SeqCst);
        *model_time = stop_time;
        0
    }
}

#[test]
#[serial]
fn single_instance_runs_to_completion_over_five_ticks() {
    controller::init(Box::new(LoopbackAdapter::new())).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    with_active(|c| c.load_models(bare_sim(1.0, 4.5))).unwrap();
    with_active(|c| c.register_in_process_model("m", 1, &[], counting_step(counter.clone()))).unwrap();

    let result = with_active(|c| c.run());

    assert!(result.is_ok(), "run() should reach end_time cleanly: {result:?}");
    assert_eq!(counter.load(Ordering::SeqCst), 5, "end_time=4.5 at step_size=1.0 takes 5 ticks");

    controller::destroy();
}

#[test]
#[serial]
fn shorter_end_time_stops_after_three_ticks() {
    controller::init(Box::new(LoopbackAdapter::new())).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    with_active(|c| c.load_models(bare_sim(1.0, 2.5))).unwrap();
    with_active(|c| c.register_in_process_model("m", 1, &[], counting_step(counter.clone()))).unwrap();

    with_active(|c| c.run()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    controller::destroy();
}

#[test]
#[serial]
fn open_ended_run_steps_until_stopped() {
    controller::init(Box::new(LoopbackAdapter::new())).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    // end_time of 0.0 means open-ended; the loop only terminates via stop().
    with_active(|c| c.load_models(bare_sim(1.0, 0.0))).unwrap();
    with_active(|c| {
        c.register_in_process_model("m", 1, &[], {
            let counter = counter.clone();
            move |model_time, stop_time| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                *model_time = stop_time;
                if n == 4 {
                    controller::stop();
                }
                0
            }
        })
    })
    .unwrap();

    let result = with_active(|c| c.run());
    assert!(matches!(result, Err(SimError::Cancelled)));
    assert_eq!(counter.load(Ordering::SeqCst), 4);

    controller::destroy();
}

#[test]
#[serial]
fn stop_called_before_run_skips_the_step_loop_entirely() {
    controller::init(Box::new(LoopbackAdapter::new())).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    with_active(|c| c.load_models(bare_sim(1.0, 0.0))).unwrap();
    with_active(|c| c.register_in_process_model("m", 1, &[], counting_step(counter.clone()))).unwrap();

    controller::stop();
    let result = with_active(|c| c.run());

    assert!(matches!(result, Err(SimError::Cancelled)));
    assert_eq!(counter.load(Ordering::SeqCst), 0, "no tick should have run after an early stop");

    controller::destroy();
}

#[test]
#[serial]
fn scalar_signal_becomes_visible_to_a_peer_after_a_step() {
    controller::init(Box::new(LoopbackAdapter::new())).unwrap();

    let channel = vec![ChannelDef {
        name: "c".into(),
        alias: None,
        signals: vec!["x".to_string()],
    }];
    with_active(|c| c.load_models(bare_sim(1.0, 0.0))).unwrap();
    with_active(|c| c.register_in_process_model("a", 1, &channel, |mt, st| { *mt = st; 0 })).unwrap();
    with_active(|c| c.register_in_process_model("b", 2, &channel, |mt, st| { *mt = st; 0 })).unwrap();

    // b hasn't seen anything yet.
    assert_eq!(with_active(|c| c.signal("b", "c", "x")).unwrap(), 0.0);

    with_active(|c| c.set_signal("a", "c", "x", 42.0)).unwrap();
    with_active(|c| c.step()).unwrap();

    assert_eq!(with_active(|c| c.signal("b", "c", "x")).unwrap(), 42.0);

    // without a further set_signal + step, the value does not change again.
    with_active(|c| c.step()).unwrap();
    assert_eq!(with_active(|c| c.signal("b", "c", "x")).unwrap(), 42.0);

    controller::destroy();
}

#[test]
#[serial]
fn binary_transfer_resets_size_but_keeps_capacity_through_the_full_pipeline() {
    controller::init(Box::new(LoopbackAdapter::new())).unwrap();

    let channel = vec![ChannelDef {
        name: "c".into(),
        alias: None,
        signals: vec!["b".to_string()],
    }];
    with_active(|c| c.load_models(bare_sim(1.0, 0.0))).unwrap();
    with_active(|c| c.register_in_process_model("a", 1, &channel, |mt, st| { *mt = st; 0 })).unwrap();
    with_active(|c| c.register_in_process_model("b", 2, &channel, |mt, st| { *mt = st; 0 })).unwrap();

    with_active(|c| c.set_binary_signal("a", "c", "b", b"hello")).unwrap();
    with_active(|c| c.step()).unwrap();

    assert_eq!(with_active(|c| c.binary_signal("b", "c", "b")).unwrap(), b"hello");
    // a's own local buffer was drained by the outbound marshal.
    assert!(with_active(|c| c.binary_signal("a", "c", "b")).unwrap().is_empty());

    // a second step with nothing newly written carries nothing further.
    with_active(|c| c.step()).unwrap();
    assert!(with_active(|c| c.binary_signal("b", "c", "b")).unwrap().is_empty());

    controller::destroy();
}

#[test]
#[serial]
fn bus_timeout_mid_rendezvous_propagates_as_a_clean_error() {
    let (adapter, handle) = ArmableAdapter::new();
    controller::init(Box::new(adapter)).unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    with_active(|c| c.load_models(bare_sim(1.0, 0.0))).unwrap();
    with_active(|c| c.register_in_process_model("m", 1, &[], counting_step(counter.clone()))).unwrap();

    handle.arm();
    let result = with_active(|c| c.step());
    assert!(matches!(result, Err(SimError::Bus(_))));
    // the step aborted at the rendezvous before the model function ran.
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    // the timeout only fires once; the bus recovers on the next tick.
    with_active(|c| c.step()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    controller::destroy();
}

#[test]
#[serial]
fn load_models_aborts_on_first_bad_instance_without_touching_the_rest() {
    use simhost::config::{ModelDefinition, ModelInstanceSpec, SimulationSpec};

    let bad = ModelInstanceSpec {
        name: "bad".into(),
        uid: 1,
        model_definition: ModelDefinition {
            name: "bad".into(),
            path: None,
            file: None,
            full_path: None,
            gateway: false,
            channels: Vec::new(),
        },
    };
    let gateway_instance = ModelInstanceSpec {
        name: "gw".into(),
        uid: 2,
        model_definition: ModelDefinition {
            name: "gw".into(),
            path: None,
            file: None,
            full_path: None,
            gateway: true,
            channels: Vec::new(),
        },
    };
    let sim = SimulationSpec {
        transport: "loopback".into(),
        uri: String::new(),
        uid: 0,
        step_size: 1.0,
        end_time: 0.0,
        timeout: SimulationSpec::DEFAULT_TIMEOUT,
        instances: vec![bad, gateway_instance],
        log_level: None,
    };

    controller::init(Box::new(LoopbackAdapter::new())).unwrap();
    let result = with_active(|c| c.load_models(sim));
    assert!(result.is_err(), "the instance with no dynlib path and no gateway marker must fail to load");

    // the gateway instance listed after it was never attempted.
    let gw_time = with_active(|c| c.model_time("gw"));
    assert!(gw_time.is_err(), "instance after the failing one must not have been registered");

    controller::destroy();
}
