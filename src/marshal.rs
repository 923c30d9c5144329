//!
//! The marshaling engine: copies signal values between a model function's
//! local buffers and the shared bus channels, preserving the two-phase
//! `val` / `final_val` visibility discipline.
//!
//! Direction matters:
//!
//! - `adapter_to_model` ("model inbound"): copies the channel's current,
//!   already-settled `val` into the model's input buffer. Models only ever
//!   read what was visible as of the last rendezvous.
//! - `model_to_adapter` ("model outbound"): copies the model's freshly
//!   computed output into the channel's `final_val`, never directly into
//!   `val`. The store only promotes `final_val` to `val` at the next bus
//!   rendezvous, so one model's writes this tick cannot leak into another
//!   model's reads this same tick.
//!

use crate::signal::{SignalMap, SignalStore};

/// One named signal a model function reads or writes on a channel, plus
/// the scratch slot it marshals through.
#[derive(Debug, Clone)]
pub struct ModelFunctionSignal {
    /// Name as it appears on the channel.
    pub name: String,
    /// Model-local scalar value, written/read by the model's FFI step.
    pub scalar: f64,
    /// Model-local binary payload.
    pub binary: Vec<u8>,
    /// Set when `scalar` has been written since the last publish. A
    /// channel may be shared by several instances, some of which only
    /// read it; only a signal actually written this tick is copied to
    /// `final_val` by [`model_to_adapter`], so a reader's untouched
    /// (default-zero) local value can never clobber a writer's publish.
    pub dirty: bool,
    /// Set by [`model_to_adapter`] when this signal's binary buffer was
    /// just flushed onto the channel. The following [`adapter_to_model`]
    /// call on this same binding checks it and skips reading the channel's
    /// binary slot back, clearing the flag again — without this, a channel
    /// shared by several instances would let the publisher win the single
    /// destructive read before any other reader gets a turn.
    pub just_published: bool,
}

impl ModelFunctionSignal {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scalar: 0.0,
            binary: Vec::new(),
            dirty: false,
            just_published: false,
        }
    }
}

/// One channel as bound into a model function: its name, the signals the
/// model function exchanges on it, and the resolved index map connecting
/// the two.
#[derive(Debug, Clone)]
pub struct ModelFunctionChannel {
    /// Name of the channel on the bus.
    pub channel_name: String,
    /// Signals exchanged on this channel, in the model function's order.
    pub signals: Vec<ModelFunctionSignal>,
    /// Last-resolved mapping from `signals` index to channel signal index.
    /// Rebuilt before every marshal call since the channel may grow.
    map: SignalMap,
}

impl ModelFunctionChannel {
    #[must_use]
    pub fn new(channel_name: impl Into<String>, signal_names: &[String]) -> Self {
        Self {
            channel_name: channel_name.into(),
            signals: signal_names.iter().map(ModelFunctionSignal::new).collect(),
            map: SignalMap::default(),
        }
    }

    fn signal_names(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.name.clone()).collect()
    }

    fn refresh_map(&mut self, store: &SignalStore) -> crate::error::Result<()> {
        self.map = store.get_signal_map(&self.channel_name, &self.signal_names())?;
        Ok(())
    }
}

/// Copies each channel signal's current `val`/`bin` into the model
/// function's local buffers. Signals not (yet) present on the channel are
/// left at their prior model-local value.
///
/// Binary transfer is symmetric with [`model_to_adapter`]: the channel
/// signal's buffer is appended onto the model's (never replacing whatever
/// the model had not yet consumed) and the channel signal's logical size
/// is then reset to zero, capacity retained. A binding that just published
/// this same signal's binary payload this tick (`just_published`) skips
/// this read instead, so a channel bound by several model functions
/// delivers the bytes to another reader rather than consuming its own
/// publish first.
pub fn adapter_to_model(
    mfc: &mut ModelFunctionChannel,
    store: &mut SignalStore,
) -> crate::error::Result<()> {
    mfc.refresh_map(&*store)?;
    let Some(channel) = store.channel_mut(&mfc.channel_name) else {
        return Ok(());
    };
    for (i, sig) in mfc.signals.iter_mut().enumerate() {
        let Some(entry) = mfc.map.get(i) else { continue };
        let Some(channel_signal_name) = channel.iter().nth(entry.index).map(|s| s.name().to_string()) else {
            continue;
        };
        let Some(channel_signal) = channel.signal_mut(&channel_signal_name) else {
            continue;
        };
        sig.scalar = channel_signal.val;
        if sig.just_published {
            // This binding is the one that just flushed these bytes onto
            // the channel in the matching model_to_adapter call; skip the
            // read so another reader bound to the same channel gets the
            // single destructive consume instead of racing its own publish.
            sig.just_published = false;
        } else if !channel_signal.bin.is_empty() {
            sig.binary.extend_from_slice(channel_signal.bin.as_bytes());
            channel_signal.bin.consume();
        }
    }
    Ok(())
}

/// Copies the model function's local buffers into each channel signal's
/// `final_val`/`bin`, to become visible at the next bus rendezvous.
///
/// Only a signal actually written since the last publish (`dirty`) is
/// copied: a channel is frequently shared by several instances, and a
/// pure reader's local scalar otherwise holds whatever it last read back
/// (or `0.0`, before its first read) — publishing that unconditionally
/// would let a later-iterated reader clobber an earlier-iterated
/// writer's value on the very same tick. Binary payloads get the same
/// treatment implicitly: a local buffer nothing wrote into is empty, and
/// an empty buffer is already a no-op.
///
/// Binary payloads use transfer semantics: a non-empty model-local buffer
/// is appended onto the channel's slot (concatenation, matching the wire
/// behavior of multiple producers publishing onto a shared byte stream in
/// the same step) and then the model-local buffer's logical length is
/// reset to zero while its capacity is retained for reuse.
pub fn model_to_adapter(
    mfc: &mut ModelFunctionChannel,
    store: &mut SignalStore,
) -> crate::error::Result<()> {
    mfc.refresh_map(store)?;
    let Some(channel) = store.channel_mut(&mfc.channel_name) else {
        return Ok(());
    };
    for (i, sig) in mfc.signals.iter_mut().enumerate() {
        let Some(entry) = mfc.map.get(i) else { continue };
        let Some(channel_signal) = channel
            .iter()
            .nth(entry.index)
            .map(|s| s.name().to_string())
        else {
            continue;
        };
        let Some(target) = channel.signal_mut(&channel_signal) else {
            continue;
        };
        if sig.dirty {
            target.final_val = sig.scalar;
            sig.dirty = false;
        }
        if !sig.binary.is_empty() {
            target.bin.append(&sig.binary);
            sig.binary.clear();
            sig.just_published = true;
        } else {
            sig.just_published = false;
        }
    }
    Ok(())
}

/// Promotes every channel signal's `final_val` to `val`. Called once per
/// bus rendezvous, after all model functions for the current step have
/// run.
///
/// Does not touch `bin`: a channel signal's binary payload must survive
/// the rendezvous so the following [`adapter_to_model`] can still deliver
/// it to every reader; `adapter_to_model` is the sole consumer that
/// resets a signal's binary size back to zero, once it has actually been
/// read into a model's local buffer.
pub fn commit(store: &mut SignalStore) {
    let names: Vec<String> = store.iter().map(|(name, _)| name.to_string()).collect();
    for name in names {
        if let Some(channel) = store.channel_mut(&name) {
            promote_channel(channel);
        }
    }
}

fn promote_channel(channel: &mut crate::signal::Channel) {
    let signal_names: Vec<String> = channel.iter().map(|s| s.name().to_string()).collect();
    for name in signal_names {
        if let Some(signal) = channel.signal_mut(&name) {
            signal.val = signal.final_val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalStore;

    #[test]
    fn round_trip_through_two_phase_commit() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["x".to_string()]);

        let mut producer = ModelFunctionChannel::new("c", &["x".to_string()]);
        producer.signals[0].scalar = 42.0;
        producer.signals[0].dirty = true;
        model_to_adapter(&mut producer, &mut store).unwrap();

        let mut consumer = ModelFunctionChannel::new("c", &["x".to_string()]);
        adapter_to_model(&mut consumer, &mut store).unwrap();
        assert_eq!(consumer.signals[0].scalar, 0.0, "not visible before commit");

        commit(&mut store);
        adapter_to_model(&mut consumer, &mut store).unwrap();
        assert_eq!(consumer.signals[0].scalar, 42.0, "visible after commit");
    }

    #[test]
    fn untouched_reader_does_not_clobber_a_writer_on_a_shared_channel() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["x".to_string()]);

        let mut writer = ModelFunctionChannel::new("c", &["x".to_string()]);
        writer.signals[0].scalar = 42.0;
        writer.signals[0].dirty = true;
        model_to_adapter(&mut writer, &mut store).unwrap();

        // a reader that never wrote `x` must not publish its default 0.0
        // over the writer's value, regardless of marshaling order.
        let mut reader = ModelFunctionChannel::new("c", &["x".to_string()]);
        model_to_adapter(&mut reader, &mut store).unwrap();

        commit(&mut store);
        adapter_to_model(&mut reader, &mut store).unwrap();
        assert_eq!(reader.signals[0].scalar, 42.0);
    }

    #[test]
    fn binary_transfer_resets_producer_and_retains_channel_payload() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["b".to_string()]);

        let mut producer = ModelFunctionChannel::new("c", &["b".to_string()]);
        producer.signals[0].binary = b"hello".to_vec();
        model_to_adapter(&mut producer, &mut store).unwrap();
        assert!(producer.signals[0].binary.is_empty());

        commit(&mut store);
        let mut consumer = ModelFunctionChannel::new("c", &["b".to_string()]);
        adapter_to_model(&mut consumer, &mut store).unwrap();
        assert_eq!(consumer.signals[0].binary, b"hello");
    }

    #[test]
    fn a_publisher_does_not_steal_its_own_binary_payload_from_a_peer() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["b".to_string()]);

        let mut producer = ModelFunctionChannel::new("c", &["b".to_string()]);
        producer.signals[0].binary = b"hello".to_vec();
        model_to_adapter(&mut producer, &mut store).unwrap();

        commit(&mut store);

        // the producer also binds the channel (it reads it back too on a
        // shared bus), and is marshaled before the peer.
        adapter_to_model(&mut producer, &mut store).unwrap();
        assert!(producer.signals[0].binary.is_empty(), "producer must not re-consume its own publish");

        let mut peer = ModelFunctionChannel::new("c", &["b".to_string()]);
        adapter_to_model(&mut peer, &mut store).unwrap();
        assert_eq!(peer.signals[0].binary, b"hello", "the peer must still receive the bytes");
    }

    #[test]
    fn binary_transfer_into_model_resets_channel_signal_size() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["b".to_string()]);

        let mut producer = ModelFunctionChannel::new("c", &["b".to_string()]);
        producer.signals[0].binary = b"data".to_vec();
        model_to_adapter(&mut producer, &mut store).unwrap();
        commit(&mut store);

        let mut consumer = ModelFunctionChannel::new("c", &["b".to_string()]);
        adapter_to_model(&mut consumer, &mut store).unwrap();
        assert_eq!(consumer.signals[0].binary, b"data");
        assert!(
            store.channel("c").unwrap().signal("b").unwrap().bin.is_empty(),
            "channel signal's binary size must drop to 0 once consumed into a model"
        );

        // a second adapter_to_model call (e.g. next tick, no new commit) sees nothing new
        let mut consumer2 = ModelFunctionChannel::new("c", &["b".to_string()]);
        adapter_to_model(&mut consumer2, &mut store).unwrap();
        assert!(consumer2.signals[0].binary.is_empty());
    }

    #[test]
    fn unresolved_signal_is_skipped_not_fatal() {
        let mut store = SignalStore::new();
        store.init_channel("c", &["x".to_string()]);
        let mut mfc = ModelFunctionChannel::new("c", &["missing".to_string()]);
        assert!(adapter_to_model(&mut mfc, &mut store).is_ok());
    }
}
