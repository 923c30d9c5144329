//!
//! Gateway mode: an alternate entry layer letting an external simulation
//! environment drive time while still using the signal store and bus
//! transport set up by the rest of the crate.
//!

use std::sync::{Mutex, OnceLock};

use crate::adapter::Adapter;
use crate::config::configure;
use crate::controller::{self, with_active};
use crate::error::{Result, SimError};

static GATEWAY_INSTANCE: OnceLock<Mutex<Option<String>>> = OnceLock::new();

fn gateway_instance_cell() -> &'static Mutex<Option<String>> {
    GATEWAY_INSTANCE.get_or_init(|| Mutex::new(None))
}

/// Synthesizes the `["gateway", "--name=<name>", ...yaml_files]` argument
/// vector, configures and loads the simulation through the normal
/// [`configure`] entrypoint, then brings the bus ready and returns without
/// entering the step loop — the controller's run loop is never started;
/// the caller drives time via [`sync`] instead.
pub fn model_gw_setup(adapter: Box<dyn Adapter>, name: &str, yaml_files: &[String]) -> Result<()> {
    let mut argv = vec!["gateway".to_string(), format!("--name={name}")];
    argv.extend(yaml_files.iter().cloned());

    let sim = configure(&argv)?;

    controller::init(adapter)?;
    with_active(|c| {
        c.load_models(sim)?;
        c.bus_ready()
    })?;

    *gateway_instance_cell().lock().unwrap() = Some(name.to_string());
    Ok(())
}

/// Advances the gateway's internal controller up to `model_time`.
///
/// If the bus is already ahead of `model_time`, returns
/// [`SimError::GatewayBehind`] — not a hard failure, the caller should
/// advance its own time and retry. Otherwise loops the controller's
/// `step` until the adapter's reported time exceeds `model_time`,
/// propagating the first non-zero return (a failing step, or the
/// simulation's own end-time terminal) immediately rather than stepping
/// past it.
pub fn sync(model_time: f64) -> Result<()> {
    let instance = gateway_instance_cell()
        .lock()
        .unwrap()
        .clone()
        .ok_or(SimError::NotInitialized)?;

    with_active(|c| {
        let current = c.model_time(&instance)?.as_secs_f64();
        if model_time < current {
            return Err(SimError::GatewayBehind);
        }
        while c.model_time(&instance)?.as_secs_f64() <= model_time {
            if c.step()? {
                // end_time reached: stop driving immediately, same as
                // `Controller::run` treating a terminal step as done
                // rather than an error.
                return Ok(());
            }
        }
        Ok(())
    })
}

/// Writes a scalar value into the gateway model's own signal buffer on
/// `channel` — "the work of the gateway" that §4.5 says happens between
/// `sync` calls in the caller's environment, rather than inside the
/// gateway model's (no-op) step handler.
pub fn set_signal(channel: &str, signal: &str, value: f64) -> Result<()> {
    let instance = gateway_instance_cell()
        .lock()
        .unwrap()
        .clone()
        .ok_or(SimError::NotInitialized)?;
    with_active(|c| c.set_signal(&instance, channel, signal, value))
}

/// Reads the gateway model's own signal buffer on `channel` — whatever
/// the bus delivered as of the last `sync` rendezvous.
pub fn signal(channel: &str, signal_name: &str) -> Result<f64> {
    let instance = gateway_instance_cell()
        .lock()
        .unwrap()
        .clone()
        .ok_or(SimError::NotInitialized)?;
    with_active(|c| c.signal(&instance, channel, signal_name))
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end in `tests/gateway.rs` against a real
    // `LoopbackAdapter`, since a meaningful gateway test needs the whole
    // controller/adapter pipeline wired together.
}
