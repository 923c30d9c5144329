//!
//! The signal store: per-instance channels of named signals, kept in sync
//! with the bus and marshaled against model-local buffers.
//!

mod store;
pub use self::store::{SignalMap, SignalMapEntry, SignalStore};

use indexmap::IndexMap;

/// A growable byte buffer with "transfer" semantics: `size` is the logical
/// length of the currently held payload, but `data`'s capacity (and any
/// bytes beyond `size`) are retained across resets so repeated marshaling
/// does not repeatedly reallocate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinarySlot {
    data: Vec<u8>,
    size: usize,
}

impl BinarySlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The logical payload currently held, ignoring any retained capacity
    /// beyond it.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// The logical length of the payload (`0` means "consumed / empty").
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// True if the slot currently holds no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The capacity retained by the underlying buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Overwrites the payload with `bytes`, reusing retained capacity.
    pub fn set(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.size = bytes.len();
    }

    /// Appends `bytes` onto the existing payload (used for the
    /// concatenation half of the transfer discipline) and returns the new
    /// length.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        if self.data.len() > self.size {
            self.data.truncate(self.size);
        }
        self.data.extend_from_slice(bytes);
        self.size = self.data.len();
        self.size
    }

    /// Marks the slot as consumed: the logical size drops to zero but the
    /// backing buffer's capacity is retained for reuse.
    pub fn consume(&mut self) {
        self.size = 0;
    }
}

/// One named scalar/binary value within a [`Channel`].
#[derive(Debug, Clone, Default)]
pub struct Signal {
    name: String,
    /// The value currently visible to models (published after the last
    /// bus rendezvous).
    pub val: f64,
    /// The staging value written by a model during the current tick, made
    /// visible only at the *next* rendezvous.
    pub final_val: f64,
    /// The binary payload, subject to the same two-phase discipline as
    /// scalars (the bus treats it as an opaque transferred byte string).
    pub bin: BinarySlot,
}

impl Signal {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            val: 0.0,
            final_val: 0.0,
            bin: BinarySlot::new(),
        }
    }

    /// The signal's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named, ordered set of signals shared across hosts on the bus.
///
/// Insertion order defines "signal index" and is stable for the lifetime
/// of the channel, matching the data model's iteration-order contract.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    name: String,
    signals: IndexMap<String, Signal>,
}

impl Channel {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: IndexMap::new(),
        }
    }

    /// The channel's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Idempotently ensures each of `signal_names` exists, appending any
    /// that are new in the order given. Existing signals keep their
    /// original index.
    fn ensure_signals(&mut self, signal_names: &[String]) {
        for name in signal_names {
            self.signals
                .entry(name.clone())
                .or_insert_with(|| Signal::new(name.clone()));
        }
    }

    /// Looks up a signal by name.
    #[must_use]
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.get(name)
    }

    /// Looks up a signal by name, mutably.
    pub fn signal_mut(&mut self, name: &str) -> Option<&mut Signal> {
        self.signals.get_mut(name)
    }

    /// The stable index of a signal by name, per insertion order.
    #[must_use]
    pub fn signals_index_of(&self, name: &str) -> Option<usize> {
        self.signals.get_index_of(name)
    }

    /// Iterates signals in stable, insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.values()
    }
}
