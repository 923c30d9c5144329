//!
//! The process-wide controller: owns the simulation spec, the active
//! adapter, and every instance's model functions, and drives the step
//! loop.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use indexmap::IndexMap;

use crate::adapter::Adapter;
use crate::config::SimulationSpec;
use crate::error::{Result, SimError};
use crate::marshal::{self, ModelFunctionChannel};
use crate::model::{self, ModelInterface};

/// One scheduling unit contributed by a model: a step handler plus the
/// channels it exchanges signals on.
///
/// For a dynamically loaded model, exactly one `ModelFunction` is
/// auto-registered by [`Controller::load_models`], its step closure
/// calling straight through to the library's `model_step`. In-process
/// test doubles and the gateway's built-in model register their own
/// step closures directly via [`Controller::register_model_function`].
pub struct ModelFunction {
    name: String,
    step: Box<dyn FnMut(&mut f64, f64) -> i32 + Send>,
    channels: IndexMap<String, ModelFunctionChannel>,
}

impl ModelFunction {
    /// Creates a model function with no bound channels.
    pub fn new(name: impl Into<String>, step: impl FnMut(&mut f64, f64) -> i32 + Send + 'static) -> Self {
        Self {
            name: name.into(),
            step: Box::new(step),
            channels: IndexMap::new(),
        }
    }

    /// Binds a channel this function exchanges signals on.
    #[must_use]
    pub fn with_channel(mut self, channel: ModelFunctionChannel) -> Self {
        self.channels.insert(channel.channel_name.clone(), channel);
        self
    }

    /// The function's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ModelFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFunction")
            .field("name", &self.name)
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-instance controller-side state: the resolved model interface (kept
/// alive for explicit, logged teardown during `exit`) and the function
/// map, in registration order.
struct ControllerModel {
    uid: u32,
    interface: Option<Arc<ModelInterface>>,
    model_functions: IndexMap<String, ModelFunction>,
}

/// The process-wide controller.
///
/// Reached only through [`init`]/[`with_active`]/[`destroy`]; no method
/// outside `stop()` is usable before `init` or after `destroy`.
pub struct Controller {
    sim: Option<SimulationSpec>,
    adapter: Box<dyn Adapter>,
    models: IndexMap<String, ControllerModel>,
    /// The endpoint's optional pre-connect `start` hook (§4.4), captured
    /// at `init` time since the endpoint itself is the caller's concern,
    /// not the controller's — the controller only needs to know whether
    /// there is a hook to run before `connect`.
    endpoint_start: Option<Box<dyn FnMut() -> Result<()> + Send>>,
}

impl Controller {
    fn sim(&self) -> Result<&SimulationSpec> {
        self.sim.as_ref().ok_or(SimError::Config("no simulation loaded".into()))
    }
}

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);
static ACTIVE: OnceLock<Mutex<Option<Controller>>> = OnceLock::new();

fn cell() -> &'static Mutex<Option<Controller>> {
    ACTIVE.get_or_init(|| Mutex::new(None))
}

/// Creates the process-wide controller bound to `adapter`. The simulation
/// itself is assigned later, by [`Controller::load_models`].
///
/// Fails with [`SimError::AlreadyInitialized`] if one is already active;
/// calling twice without an intervening `destroy` is a programming error
/// (also asserted in debug builds).
pub fn init(adapter: Box<dyn Adapter>) -> Result<()> {
    init_with_endpoint_start(adapter, None)
}

/// As [`init`], but also registers the endpoint's pre-connect `start`
/// hook, invoked once by [`Controller::bus_ready`] before the first
/// `connect`. Pass `None` when the endpoint exposes no such hook (the
/// default for transports with nothing to spin up ahead of connecting,
/// e.g. [`crate::adapter::LoopbackAdapter`]).
pub fn init_with_endpoint_start(
    adapter: Box<dyn Adapter>,
    endpoint_start: Option<Box<dyn FnMut() -> Result<()> + Send>>,
) -> Result<()> {
    let mut guard = cell().lock().unwrap();
    debug_assert!(guard.is_none(), "Controller::init called twice without destroy");
    if guard.is_some() {
        return Err(SimError::AlreadyInitialized);
    }
    STOP_REQUESTED.store(false, Ordering::SeqCst);
    *guard = Some(Controller {
        sim: None,
        adapter,
        models: IndexMap::new(),
        endpoint_start,
    });
    Ok(())
}

/// Clears the process-wide controller. Safe to call even if no controller
/// is active.
pub fn destroy() {
    *cell().lock().unwrap() = None;
}

/// Runs `f` with exclusive access to the active controller, or
/// [`SimError::NotInitialized`] if none is active.
pub fn with_active<T>(f: impl FnOnce(&mut Controller) -> Result<T>) -> Result<T> {
    let mut guard = cell().lock().unwrap();
    match guard.as_mut() {
        Some(controller) => f(controller),
        None => Err(SimError::NotInitialized),
    }
}

/// Requests that the run loop stop at the next tick boundary and
/// interrupts any in-flight bus wait.
///
/// Sets a single atomic flag and, if the controller mutex is not
/// currently held, forwards to the adapter's `interrupt` hook through a
/// non-blocking `try_lock` — this never blocks, so it is safe to call
/// from a signal handler even while the step loop holds the lock; in
/// that case the flag alone is observed at the next tick boundary.
pub fn stop() {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
    if let Ok(guard) = cell().try_lock() {
        if let Some(controller) = guard.as_ref() {
            controller.adapter.interrupt();
        }
    }
}

/// True if `stop()` has been observed since the last `init`.
#[must_use]
pub fn is_stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::SeqCst)
}

impl Controller {
    /// Inserts `function` into `instance`'s model-function map. Fails
    /// with [`SimError::Config`] on a duplicate name or unknown instance.
    pub fn register_model_function(&mut self, instance: &str, function: ModelFunction) -> Result<()> {
        let model = self
            .models
            .get_mut(instance)
            .ok_or_else(|| SimError::Config(format!("no such instance: '{instance}'")))?;
        if model.model_functions.contains_key(function.name()) {
            return Err(SimError::Config(format!(
                "model function '{}' already exists on instance '{instance}'",
                function.name()
            )));
        }
        model.model_functions.insert(function.name().to_string(), function);
        Ok(())
    }

    /// Loads every instance named in `sim`: binds its adapter-side state,
    /// resolves its model interface (dynamic library or gateway
    /// built-in), initializes its declared channels, invokes `create`,
    /// and auto-registers the resulting model function.
    ///
    /// Aborts on the first failing instance; later instances in `sim` are
    /// not attempted, matching the "no `create` for subsequent instances"
    /// contract.
    pub fn load_models(&mut self, sim: SimulationSpec) -> Result<()> {
        for instance in &sim.instances {
            self.load_one(instance)?;
        }
        self.sim = Some(sim);
        Ok(())
    }

    /// Registers an in-process model instance directly, bypassing the
    /// Model Loader entirely: `step` is called as a plain Rust closure
    /// instead of through `libloading`.
    ///
    /// Exists for test doubles that implement the model ABI as a Rust
    /// struct rather than a compiled `cdylib` — the rest of the pipeline
    /// (channel init, marshaling, stepping, model time bookkeeping)
    /// behaves identically to a dynamically loaded model. `sim` must
    /// already have been assigned via [`load_models`](Self::load_models)
    /// (an empty-instance `SimulationSpec` is sufficient) before calling
    /// this.
    pub fn register_in_process_model(
        &mut self,
        name: &str,
        uid: u32,
        channels: &[crate::config::ChannelDef],
        step: impl FnMut(&mut f64, f64) -> i32 + Send + 'static,
    ) -> Result<()> {
        self.adapter.bind_model(uid);
        for channel in channels {
            self.adapter.init_channel(uid, &channel.name, &channel.signals)?;
        }

        let mut function = ModelFunction::new(name, step);
        for channel in channels {
            function = function.with_channel(ModelFunctionChannel::new(channel.name.clone(), &channel.signals));
        }

        let mut model = ControllerModel {
            uid,
            interface: None,
            model_functions: IndexMap::new(),
        };
        model.model_functions.insert(function.name().to_string(), function);
        self.models.insert(name.to_string(), model);
        Ok(())
    }

    fn load_one(&mut self, instance: &crate::config::ModelInstanceSpec) -> Result<()> {
        self.adapter.bind_model(instance.uid);

        for channel in &instance.model_definition.channels {
            self.adapter
                .init_channel(instance.uid, &channel.name, &channel.signals)?;
        }

        if instance.model_definition.gateway {
            let mut model = ControllerModel {
                uid: instance.uid,
                interface: None,
                model_functions: IndexMap::new(),
            };
            let mut function = ModelFunction::new("gateway", |model_time, stop_time| {
                *model_time = stop_time;
                0
            });
            for channel in &instance.model_definition.channels {
                function = function.with_channel(ModelFunctionChannel::new(channel.name.clone(), &channel.signals));
            }
            model.model_functions.insert(function.name().to_string(), function);
            self.models.insert(instance.name.clone(), model);
            return Ok(());
        }

        let full_path = instance
            .model_definition
            .full_path
            .as_ref()
            .ok_or_else(|| SimError::Config(format!(
                "instance '{}' has no resolved dynlib path",
                instance.name
            )))?;
        let interface = Arc::new(model::load_model(
            &instance.name,
            &full_path.display().to_string(),
            instance.model_definition.path.as_deref().unwrap_or(""),
        )?);

        let mut model = ControllerModel {
            uid: instance.uid,
            interface: Some(Arc::clone(&interface)),
            model_functions: IndexMap::new(),
        };
        let mut function = ModelFunction::new(instance.name.clone(), move |model_time, stop_time| {
            interface.step(model_time, stop_time)
        });
        for channel in &instance.model_definition.channels {
            function = function.with_channel(ModelFunctionChannel::new(
                channel.name.clone(),
                &channel.signals,
            ));
        }
        model.model_functions.insert(function.name().to_string(), function);
        self.models.insert(instance.name.clone(), model);
        Ok(())
    }

    /// Starts the endpoint (if it exposes one), connects, and registers.
    /// If a stop request arrives between `connect` and `register`, this
    /// returns without registering.
    pub fn bus_ready(&mut self) -> Result<()> {
        if let Some(start) = self.endpoint_start.as_mut() {
            start()?;
        }
        let sim = self.sim()?.clone();
        self.adapter.connect(&sim, 5)?;
        if is_stop_requested() {
            return Ok(());
        }
        self.adapter.register(&sim)
    }

    /// The canonical single tick: marshal model→adapter, rendezvous,
    /// marshal adapter→model, step every instance's model functions, and
    /// report whether the run is complete.
    ///
    /// Returns `Ok(true)` when `sim.end_time` has been reached (terminal,
    /// not an error), `Ok(false)` to continue, and `Err` on adapter
    /// failure or a model-requested exit.
    pub fn step(&mut self) -> Result<bool> {
        let sim = self.sim()?.clone();

        for model in self.models.values_mut() {
            for function in model.model_functions.values_mut() {
                for mfc in function.channels.values_mut() {
                    marshal::model_to_adapter(mfc, self.adapter.store_mut())?;
                }
            }
        }

        self.adapter.ready(&sim)?;

        for model in self.models.values_mut() {
            for function in model.model_functions.values_mut() {
                for mfc in function.channels.values_mut() {
                    marshal::adapter_to_model(mfc, self.adapter.store_mut())?;
                }
            }
        }

        let mut model_requests_exit = false;
        for model in self.models.values_mut() {
            let adapter_model = self
                .adapter
                .model(model.uid)
                .ok_or_else(|| SimError::Config("adapter model missing".into()))?;
            let mut model_time = adapter_model.model_time.as_secs_f64();
            let stop_time = model_time + sim.step_size;

            for function in model.model_functions.values_mut() {
                let rc = (function.step)(&mut model_time, stop_time);
                if rc != 0 {
                    tracing::warn!(
                        function = function.name(),
                        rc,
                        "model function returned non-zero"
                    );
                    if rc > 0 {
                        model_requests_exit = true;
                    }
                }
            }

            if let Some(adapter_model) = self.adapter.model_mut(model.uid) {
                adapter_model.advance_to(crate::time::SimTime::from_secs_f64(stop_time));
            }
        }

        if model_requests_exit {
            return Err(SimError::ModelExit);
        }

        let reported_time = self
            .models
            .values()
            .next()
            .and_then(|m| self.adapter.model(m.uid))
            .map(|m| m.model_time.as_secs_f64())
            .unwrap_or(0.0);

        Ok(sim.end_time > 0.0 && reported_time > sim.end_time)
    }

    /// Runs `bus_ready` then loops `step` until it reports completion or a
    /// stop request is observed.
    pub fn run(&mut self) -> Result<()> {
        self.bus_ready()?;
        loop {
            if is_stop_requested() {
                return Err(SimError::Cancelled);
            }
            if self.step()? {
                return Ok(());
            }
        }
    }

    /// Tears down every instance (logging, not aborting, on a model's own
    /// teardown failure) then exits the adapter.
    pub fn exit(&mut self) -> Result<()> {
        let sim = self.sim()?.clone();
        for (name, model) in &mut self.models {
            model.interface = None;
            tracing::info!(instance = name.as_str(), "instance destroyed");
        }
        self.adapter.exit(&sim)
    }

    /// Delegates to the adapter's debug dump.
    pub fn dump_debug(&self) -> Result<()> {
        self.adapter.dump_debug(self.sim()?);
        Ok(())
    }

    /// The adapter-reported current time for `instance`, used by the
    /// gateway facade to decide whether it is ahead of or behind the
    /// caller's requested time.
    pub fn model_time(&self, instance: &str) -> Result<crate::time::SimTime> {
        let model = self
            .models
            .get(instance)
            .ok_or_else(|| SimError::Config(format!("no such instance: '{instance}'")))?;
        self.adapter
            .model(model.uid)
            .map(|m| m.model_time)
            .ok_or_else(|| SimError::Config("adapter model missing".into()))
    }

    /// Writes into `signal`'s model-local scalar buffer on `channel`, for
    /// whichever of `instance`'s model functions declared it.
    ///
    /// This stands in for what a model's own `step` would write directly
    /// into its linked memory — the fixed three-function loaded-model ABI
    /// (§6) passes a model only `(model_time, stop_time)`, so scalar
    /// exchange for a loaded library happens through its own opaque
    /// state, not through this accessor. It exists for two callers that
    /// *do* need it: an in-process test double, whose step closure only
    /// sees `(model_time, stop_time)` too, and the gateway facade's
    /// external caller, for whom "the work of the gateway" (§4.5) is
    /// exactly writing and reading these buffers between `sync` calls.
    pub fn set_signal(&mut self, instance: &str, channel: &str, signal: &str, value: f64) -> Result<()> {
        let mfs = self.model_function_signal_mut(instance, channel, signal)?;
        mfs.scalar = value;
        mfs.dirty = true;
        Ok(())
    }

    /// Reads `signal`'s model-local scalar buffer on `channel`. See
    /// [`set_signal`](Self::set_signal) for why this accessor exists.
    pub fn signal(&self, instance: &str, channel: &str, signal: &str) -> Result<f64> {
        Ok(self.model_function_signal(instance, channel, signal)?.scalar)
    }

    /// Overwrites `signal`'s model-local binary buffer on `channel`. See
    /// [`set_signal`](Self::set_signal) for why this accessor exists.
    pub fn set_binary_signal(&mut self, instance: &str, channel: &str, signal: &str, bytes: &[u8]) -> Result<()> {
        let mfs = self.model_function_signal_mut(instance, channel, signal)?;
        mfs.binary.clear();
        mfs.binary.extend_from_slice(bytes);
        Ok(())
    }

    /// Reads `signal`'s model-local binary buffer on `channel`. See
    /// [`set_signal`](Self::set_signal) for why this accessor exists.
    pub fn binary_signal(&self, instance: &str, channel: &str, signal: &str) -> Result<Vec<u8>> {
        Ok(self.model_function_signal(instance, channel, signal)?.binary.clone())
    }

    fn model_function_signal(&self, instance: &str, channel: &str, signal: &str) -> Result<&marshal::ModelFunctionSignal> {
        let model = self
            .models
            .get(instance)
            .ok_or_else(|| SimError::Config(format!("no such instance: '{instance}'")))?;
        model
            .model_functions
            .values()
            .find_map(|f| f.channels.get(channel))
            .and_then(|mfc| mfc.signals.iter().find(|s| s.name == signal))
            .ok_or_else(|| SimError::Config(format!("no such signal '{signal}' on channel '{channel}' for instance '{instance}'")))
    }

    fn model_function_signal_mut(
        &mut self,
        instance: &str,
        channel: &str,
        signal: &str,
    ) -> Result<&mut marshal::ModelFunctionSignal> {
        let model = self
            .models
            .get_mut(instance)
            .ok_or_else(|| SimError::Config(format!("no such instance: '{instance}'")))?;
        model
            .model_functions
            .values_mut()
            .find_map(|f| f.channels.get_mut(channel))
            .and_then(|mfc| mfc.signals.iter_mut().find(|s| s.name == signal))
            .ok_or_else(|| SimError::Config(format!("no such signal '{signal}' on channel '{channel}' for instance '{instance}'")))
    }
}
