use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::SimulationSpec;
use crate::error::Result;
use crate::marshal::commit;
use crate::signal::{SignalMap, SignalStore};

use super::{timeout_error, Adapter, AdapterModel, AdapterModels};

/// An in-process bus adapter: every "connected" instance shares one
/// [`SignalStore`] living in this struct, so `ready` is simply "commit
/// every channel's staged values" rather than a network round trip.
///
/// Useful for tests, examples, and single-process demos; a real
/// deployment supplies its own `Adapter` wired to an actual transport.
#[derive(Debug)]
pub struct LoopbackAdapter {
    bus: SignalStore,
    models: AdapterModels,
    interrupted: Arc<AtomicBool>,
    connected: bool,
    /// When set, the next `ready()` call returns a timeout instead of
    /// committing — simulates a peer leaving the simulation, for S6-style
    /// cancellation tests.
    fail_ready_with_timeout: bool,
}

impl LoopbackAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bus: SignalStore::new(),
            models: AdapterModels::default(),
            interrupted: Arc::new(AtomicBool::new(false)),
            connected: false,
            fail_ready_with_timeout: false,
        }
    }

    /// Arms the adapter so the next `ready()` call reports a timeout,
    /// simulating a peer leaving the simulation.
    pub fn arm_timeout(&mut self) {
        self.fail_ready_with_timeout = true;
    }

    /// True if `interrupt()` has been invoked since construction.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Direct access to a bus channel's current signal values, for test
    /// assertions.
    #[must_use]
    pub fn bus(&self) -> &SignalStore {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SignalStore {
        &mut self.bus
    }
}

impl Default for LoopbackAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for LoopbackAdapter {
    fn connect(&mut self, _sim: &SimulationSpec, _retries: u32) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn register(&mut self, _sim: &SimulationSpec) -> Result<()> {
        Ok(())
    }

    fn ready(&mut self, _sim: &SimulationSpec) -> Result<()> {
        if self.fail_ready_with_timeout {
            self.fail_ready_with_timeout = false;
            return Err(timeout_error());
        }
        commit(&mut self.bus);
        Ok(())
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn exit(&mut self, _sim: &SimulationSpec) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn destroy(&mut self) {
        self.bus = SignalStore::new();
    }

    fn init_channel(&mut self, _uid: u32, channel_name: &str, signal_names: &[String]) -> Result<()> {
        self.bus.init_channel(channel_name, signal_names);
        Ok(())
    }

    fn get_signal_map(&self, _uid: u32, channel_name: &str, signal_names: &[String]) -> Result<SignalMap> {
        self.bus.get_signal_map(channel_name, signal_names)
    }

    fn model(&self, uid: u32) -> Option<&AdapterModel> {
        self.models.get(uid)
    }

    fn model_mut(&mut self, uid: u32) -> Option<&mut AdapterModel> {
        self.models.get_mut(uid)
    }

    fn bind_model(&mut self, uid: u32) {
        self.models.bind(uid);
    }

    fn store(&self) -> &SignalStore {
        &self.bus
    }

    fn store_mut(&mut self) -> &mut SignalStore {
        &mut self.bus
    }

    fn dump_debug(&self, _sim: &SimulationSpec) {
        for (name, channel) in self.bus.iter() {
            tracing::debug!(channel = name, signals = channel.iter().count(), "bus channel");
        }
        for uid in self.models.uids() {
            if let Some(model) = self.models.get(uid) {
                tracing::debug!(uid, model_time = %model.model_time, "adapter model");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationSpec;

    fn sim() -> SimulationSpec {
        SimulationSpec {
            transport: "loopback".into(),
            uri: String::new(),
            uid: 0,
            step_size: 0.1,
            end_time: 0.0,
            timeout: 60.0,
            instances: Vec::new(),
            log_level: None,
        }
    }

    #[test]
    fn ready_commits_bus_state() {
        let mut adapter = LoopbackAdapter::new();
        adapter.init_channel(1, "c", &["x".to_string()]).unwrap();
        adapter
            .bus_mut()
            .channel_mut("c")
            .unwrap()
            .signal_mut("x")
            .unwrap()
            .final_val = 7.0;
        adapter.ready(&sim()).unwrap();
        assert_eq!(adapter.bus().channel("c").unwrap().signal("x").unwrap().val, 7.0);
    }

    #[test]
    fn armed_timeout_fires_once() {
        let mut adapter = LoopbackAdapter::new();
        adapter.arm_timeout();
        assert!(adapter.ready(&sim()).is_err());
        assert!(adapter.ready(&sim()).is_ok());
    }

    #[test]
    fn interrupt_is_observable() {
        let adapter = LoopbackAdapter::new();
        assert!(!adapter.was_interrupted());
        adapter.interrupt();
        assert!(adapter.was_interrupted());
    }
}
