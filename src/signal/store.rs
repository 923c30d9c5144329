use indexmap::IndexMap;

use crate::error::{Result, SimError};

use super::Channel;

/// Resolves a signal's name to its stable index within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalMapEntry {
    /// Index into the channel's signal list, per insertion order.
    pub index: usize,
}

/// The result of resolving a requested list of signal names against a
/// channel's current layout.
///
/// Built fresh on each marshaling call rather than cached: channels can
/// grow as later-loading models extend them, and a stale index would
/// silently marshal the wrong signal. This is the Rust analogue of the
/// original's pointer-array signal map, expressed as index resolution
/// instead of raw pointers.
#[derive(Debug, Clone, Default)]
pub struct SignalMap {
    entries: Vec<Option<SignalMapEntry>>,
}

impl SignalMap {
    /// The entry for the `i`th requested name, or `None` if that name is
    /// not present in the channel.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<SignalMapEntry> {
        self.entries.get(i).copied().flatten()
    }

    /// Number of requested names this map was built for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns every channel visible to a single model instance.
///
/// Channels are created lazily and extended idempotently: the first model
/// function to reference a channel name creates it, and later model
/// functions referencing the same channel with new signal names simply
/// append those signals, in the order first seen.
#[derive(Debug, Default)]
pub struct SignalStore {
    channels: IndexMap<String, Channel>,
}

impl SignalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures `channel_name` exists and contains each of `signal_names`,
    /// appending any signal not already present. Safe to call repeatedly
    /// with overlapping signal sets.
    pub fn init_channel(&mut self, channel_name: &str, signal_names: &[String]) {
        let channel = self
            .channels
            .entry(channel_name.to_string())
            .or_insert_with(|| Channel::new(channel_name));
        channel.ensure_signals(signal_names);
    }

    /// Borrows a channel by name.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Borrows a channel by name, mutably.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(name)
    }

    /// Resolves `signal_names` (in the given order) to their indices
    /// within `channel_name`. Returns [`SimError::Config`] if the channel
    /// itself does not exist; an individual name that is not (yet) part
    /// of the channel resolves to `None` in the returned map rather than
    /// failing the whole call, since a model function may reference a
    /// signal that a later-loading model still has to publish.
    pub fn get_signal_map(&self, channel_name: &str, signal_names: &[String]) -> Result<SignalMap> {
        let channel = self.channels.get(channel_name).ok_or_else(|| {
            SimError::Config(format!("no such channel: '{channel_name}'"))
        })?;
        let entries = signal_names
            .iter()
            .map(|name| {
                channel
                    .signals_index_of(name)
                    .map(|index| SignalMapEntry { index })
            })
            .collect();
        Ok(SignalMap { entries })
    }

    /// Iterates all channels in stable, insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Channel)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_channel_extends_idempotently() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["a".to_string()]);
        store.init_channel("c", &["a".to_string(), "b".to_string()]);
        let channel = store.channel("c").unwrap();
        assert_eq!(channel.iter().count(), 2);
    }

    #[test]
    fn signal_map_resolves_known_and_unknown_names() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["a".to_string(), "b".to_string()]);
        let map = store
            .get_signal_map("c", &["b".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(map.get(0).unwrap().index, 1);
        assert!(map.get(1).is_none());
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let store = SignalStore::new();
        assert!(store.get_signal_map("nope", &[]).is_err());
    }
}
