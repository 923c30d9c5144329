//!
//! `simhost` — the command-line front-end for the model host.
//!
//! ```text
//! simhost run     --name <instance> [--name <instance> ...] <stack.yaml> <model.yaml...>
//! simhost gateway --name <instance>                           <stack.yaml> <model.yaml...>
//! ```
//!
//! `run` owns the step loop end to end. `gateway` is a smoke-test wrapper
//! around the gateway facade: it drives [`simhost::gateway::sync`] from a
//! simple fixed-step loop instead of waiting on a real external caller,
//! so a gateway model can be exercised without one.
//!

use std::process::ExitCode;

use simhost::adapter::LoopbackAdapter;
use simhost::error::SimError;
use simhost::{config, controller, gateway, logging};

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    logging::init(log_level_from_argv(&argv).as_deref().unwrap_or("info"));

    let Some(mode) = argv.first().cloned() else {
        eprintln!("usage: simhost <run|gateway> [options] <stack.yaml> <model.yaml...>");
        return ExitCode::FAILURE;
    };

    let result = match mode.as_str() {
        "run" => run_synchronous(&argv),
        "gateway" => run_gateway(&argv),
        other => {
            eprintln!("unknown subcommand '{other}', expected 'run' or 'gateway'");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(SimError::Cancelled) => {
            tracing::info!("cancelled");
            ExitCode::from(130) // conventional SIGINT-adjacent exit code
        }
        Err(e) => {
            tracing::error!(error = %e, "simhost exited with an error");
            ExitCode::FAILURE
        }
    }
}

/// Scans `argv` by hand for `--log_level=<level>` so the subscriber can be
/// installed before `clap` parsing runs (and can therefore report a
/// `clap` usage error through `tracing` too).
fn log_level_from_argv(argv: &[String]) -> Option<String> {
    argv.iter()
        .find_map(|arg| arg.strip_prefix("--log_level=").map(ToString::to_string))
}

/// Installs a `Controller::stop()` handler on `SIGINT`/`SIGTERM` so an
/// operator can cancel a run cleanly instead of killing the process.
fn install_stop_handler() {
    if let Err(e) = ctrlc::set_handler(controller::stop) {
        tracing::warn!(error = %e, "failed to install interrupt handler");
    }
}

fn run_synchronous(argv: &[String]) -> simhost::Result<()> {
    let sim = config::configure(argv)?;

    controller::init(Box::new(LoopbackAdapter::new()))?;
    install_stop_handler();

    let result = (|| {
        controller::with_active(|c| c.load_models(sim))?;
        controller::with_active(|c| c.run())
    })();

    if let Err(e) = controller::with_active(|c| c.exit()) {
        tracing::warn!(error = %e, "teardown reported an error");
    }
    controller::destroy();

    result
}

fn run_gateway(argv: &[String]) -> simhost::Result<()> {
    let name = argv
        .iter()
        .find_map(|a| a.strip_prefix("--name="))
        .ok_or_else(|| SimError::Config("gateway mode requires --name=<instance>".into()))?
        .to_string();

    let yaml_files: Vec<String> = argv
        .iter()
        .skip(1)
        .filter(|a| !a.starts_with("--"))
        .cloned()
        .collect();

    install_stop_handler();
    gateway::model_gw_setup(Box::new(LoopbackAdapter::new()), &name, &yaml_files)?;

    tracing::info!(instance = name.as_str(), "gateway ready, driving a smoke-test clock");

    let mut model_time = 0.0_f64;
    let step = 0.1_f64;
    loop {
        if controller::is_stop_requested() {
            return Err(SimError::Cancelled);
        }
        model_time += step;
        match gateway::sync(model_time) {
            Ok(()) => {}
            Err(SimError::GatewayBehind) => continue,
            Err(e) => return Err(e),
        }
        tracing::debug!(model_time, "gateway sync complete");
        // A real caller keeps calling `sync` indefinitely; this smoke
        // test front-end stops once it has demonstrated a few ticks.
        if model_time >= 1.0 {
            break;
        }
    }

    Ok(())
}
