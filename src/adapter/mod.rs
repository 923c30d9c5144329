//!
//! The boundary the controller calls to drive the bus lifecycle. The
//! transport implementation itself is external; this crate defines the
//! contract and ships one concrete, in-process implementation
//! ([`loopback::LoopbackAdapter`]) for tests, examples and single-process
//! demos.
//!

mod loopback;
pub use self::loopback::LoopbackAdapter;

use crate::config::SimulationSpec;
use crate::error::{BusError, Result};
use crate::signal::{SignalMap, SignalStore};
use crate::time::SimTime;

/// Per-instance state the adapter maintains on the bus's behalf: current
/// and next-step time for that instance. The channels themselves are
/// bus-wide (shared by every instance that references the same channel
/// name) and live in the adapter implementation, not here — a channel's
/// identity on the bus does not belong to any one instance.
#[derive(Debug, Default)]
pub struct AdapterModel {
    pub uid: u32,
    pub model_time: SimTime,
    pub stop_time: SimTime,
}

impl AdapterModel {
    #[must_use]
    pub fn new(uid: u32) -> Self {
        Self {
            uid,
            model_time: SimTime::ZERO,
            stop_time: SimTime::ZERO,
        }
    }

    /// Advances to `stop_time`, asserting the invariant that time never
    /// runs backwards relative to the instance's own step boundary.
    pub fn advance_to(&mut self, stop_time: SimTime) {
        debug_assert!(self.model_time <= stop_time, "model_time must not exceed stop_time");
        self.model_time = stop_time;
    }
}

/// The bus adapter contract consumed by the controller.
///
/// Every method takes the full [`SimulationSpec`] rather than a single
/// instance because several operations (connect, register, ready) are
/// simulation-wide rendezvous points, not per-instance calls.
pub trait Adapter: Send {
    /// Establishes a transport-level connection, retrying internally up to
    /// `retries` times.
    fn connect(&mut self, sim: &SimulationSpec, retries: u32) -> Result<()>;

    /// Registers every instance's channels with the bus.
    fn register(&mut self, sim: &SimulationSpec) -> Result<()>;

    /// Blocks until the bus rendezvous completes for this tick. Returns
    /// [`BusError::Timeout`] if a peer has left the simulation.
    fn ready(&mut self, sim: &SimulationSpec) -> Result<()>;

    /// Unblocks an in-flight `ready`/`connect`. Must be safe to call from
    /// a signal handler: no allocation, no locking.
    fn interrupt(&self);

    /// Leaves the bus cleanly.
    fn exit(&mut self, sim: &SimulationSpec) -> Result<()>;

    /// Tears down any adapter-owned resources.
    fn destroy(&mut self);

    /// Ensures `channel_name` exists for `uid` and contains each of
    /// `signal_names`, idempotently.
    fn init_channel(&mut self, uid: u32, channel_name: &str, signal_names: &[String]) -> Result<()>;

    /// Resolves `signal_names` against `uid`'s `channel_name`.
    fn get_signal_map(&self, uid: u32, channel_name: &str, signal_names: &[String]) -> Result<SignalMap>;

    /// Per-instance adapter-side state, for the controller's marshaling
    /// and step bookkeeping.
    fn model(&self, uid: u32) -> Option<&AdapterModel>;
    fn model_mut(&mut self, uid: u32) -> Option<&mut AdapterModel>;

    /// Registers `uid`'s adapter-side state, replacing any prior entry.
    fn bind_model(&mut self, uid: u32);

    /// The bus-wide signal store backing every channel. Channel identity
    /// lives on the bus, not any one instance, so this is shared rather
    /// than keyed by `uid`.
    fn store(&self) -> &SignalStore;
    fn store_mut(&mut self) -> &mut SignalStore;

    /// Dumps adapter-internal state for diagnostics.
    fn dump_debug(&self, sim: &SimulationSpec);
}

pub(crate) fn timeout_error() -> crate::error::SimError {
    BusError::Timeout.into()
}

/// Common per-uid storage shared by adapter implementations that keep all
/// state in-process (no real transport to delegate to).
///
/// Keyed by uid with no iteration-order contract (unlike a channel's
/// signal list, uid lookup order is never observable to a model), so
/// this reaches for
/// `FxHashMap` rather than `IndexMap` — the faster non-cryptographic
/// hasher this crate's reference runtime uses for its own non-ordered
/// lookup tables.
#[derive(Debug, Default)]
pub(crate) struct AdapterModels {
    models: fxhash::FxHashMap<u32, AdapterModel>,
}

impl AdapterModels {
    pub(crate) fn bind(&mut self, uid: u32) {
        self.models.insert(uid, AdapterModel::new(uid));
    }

    pub(crate) fn get(&self, uid: u32) -> Option<&AdapterModel> {
        self.models.get(&uid)
    }

    pub(crate) fn get_mut(&mut self, uid: u32) -> Option<&mut AdapterModel> {
        self.models.get_mut(&uid)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&u32, &mut AdapterModel)> {
        self.models.iter_mut()
    }

    pub(crate) fn uids(&self) -> Vec<u32> {
        self.models.keys().copied().collect()
    }
}
