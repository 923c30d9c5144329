//! Shared scaffolding for the integration tests in this directory: a bare
//! [`SimulationSpec`] builder and a [`LoopbackAdapter`] wrapper that can be
//! armed to fail a bus rendezvous from outside, after it has already been
//! moved into the controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use simhost::adapter::{Adapter, AdapterModel, LoopbackAdapter};
use simhost::config::SimulationSpec;
use simhost::error::{BusError, Result, SimError};
use simhost::signal::{SignalMap, SignalStore};

/// An empty, instance-less spec with the given step size and end time.
/// [`simhost::controller::Controller::load_models`] still needs to be
/// called with one of these before [`register_in_process_model`] can be
/// used, since it's what assigns `self.sim`.
///
/// [`register_in_process_model`]: simhost::controller::Controller::register_in_process_model
pub fn bare_sim(step_size: f64, end_time: f64) -> SimulationSpec {
    SimulationSpec {
        transport: "loopback".into(),
        uri: String::new(),
        uid: 0,
        step_size,
        end_time,
        timeout: SimulationSpec::DEFAULT_TIMEOUT,
        instances: Vec::new(),
        log_level: None,
    }
}

/// A [`LoopbackAdapter`] whose rendezvous can be forced to time out from a
/// handle retained outside the controller, simulating a peer leaving the
/// bus mid-wait. `LoopbackAdapter::arm_timeout` already does this, but only
/// before the adapter is boxed into `Controller::init`; this wrapper keeps
/// a shared flag reachable after that move.
pub struct ArmableAdapter {
    inner: LoopbackAdapter,
    armed: Arc<AtomicBool>,
}

/// A handle that can arm an [`ArmableAdapter`] after it has been handed to
/// `Controller::init`.
#[derive(Clone)]
pub struct ArmHandle(Arc<AtomicBool>);

impl ArmHandle {
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ArmableAdapter {
    pub fn new() -> (Self, ArmHandle) {
        let armed = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: LoopbackAdapter::new(),
                armed: armed.clone(),
            },
            ArmHandle(armed),
        )
    }
}

impl Adapter for ArmableAdapter {
    fn connect(&mut self, sim: &SimulationSpec, retries: u32) -> Result<()> {
        self.inner.connect(sim, retries)
    }

    fn register(&mut self, sim: &SimulationSpec) -> Result<()> {
        self.inner.register(sim)
    }

    fn ready(&mut self, sim: &SimulationSpec) -> Result<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            return Err(SimError::Bus(BusError::Timeout));
        }
        self.inner.ready(sim)
    }

    fn interrupt(&self) {
        self.inner.interrupt();
    }

    fn exit(&mut self, sim: &SimulationSpec) -> Result<()> {
        self.inner.exit(sim)
    }

    fn destroy(&mut self) {
        self.inner.destroy();
    }

    fn init_channel(&mut self, uid: u32, channel_name: &str, signal_names: &[String]) -> Result<()> {
        self.inner.init_channel(uid, channel_name, signal_names)
    }

    fn get_signal_map(&self, uid: u32, channel_name: &str, signal_names: &[String]) -> Result<SignalMap> {
        self.inner.get_signal_map(uid, channel_name, signal_names)
    }

    fn model(&self, uid: u32) -> Option<&AdapterModel> {
        self.inner.model(uid)
    }

    fn model_mut(&mut self, uid: u32) -> Option<&mut AdapterModel> {
        self.inner.model_mut(uid)
    }

    fn bind_model(&mut self, uid: u32) {
        self.inner.bind_model(uid);
    }

    fn store(&self) -> &SignalStore {
        self.inner.store()
    }

    fn store_mut(&mut self) -> &mut SignalStore {
        self.inner.store_mut()
    }

    fn dump_debug(&self, sim: &SimulationSpec) {
        self.inner.dump_debug(sim);
    }
}
