use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::{Result, SimError};

use super::{
    ChannelDef, ModelDefinition, ModelDoc, ModelInstanceSpec, SimulationSpec, StackDoc,
};

/// Mirrors the CLI surface from spec.md §6: a subcommand selecting
/// synchronous or gateway mode, the set of instance names to activate, and
/// the simulation-wide options common to both.
#[derive(Debug, Parser)]
#[command(name = "simhost", disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, clap::Subcommand)]
enum Mode {
    /// Run synchronously to completion; the runtime owns the loop.
    Run(RunArgs),
    /// Run as a gateway; the caller drives `sync` per tick.
    Gateway(RunArgs),
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Instance names, from the stack document, to activate. May be given
    /// more than once.
    #[arg(long = "name")]
    name: Vec<String>,

    #[arg(long)]
    transport: Option<String>,
    #[arg(long)]
    uri: Option<String>,
    #[arg(long)]
    uid: Option<u32>,
    #[arg(long)]
    timeout: Option<f64>,
    #[arg(long)]
    step_size: Option<f64>,
    #[arg(long)]
    end_time: Option<f64>,
    #[arg(long)]
    log_level: Option<String>,

    /// YAML documents: one stack document plus any number of model
    /// definition documents.
    yaml_files: Vec<String>,
}

/// Parses `argv` (as `["run"|"gateway", ...flags, stack.yaml, model.yaml, ...]`)
/// into a [`SimulationSpec`], loading and cross-resolving the referenced
/// YAML documents. The single entrypoint shared by the CLI front-end's two
/// subcommands and the gateway facade's synthesized argument vector.
pub fn configure(argv: &[String]) -> Result<SimulationSpec> {
    let cli = Cli::try_parse_from(std::iter::once("simhost".to_string()).chain(argv.iter().cloned()))
        .map_err(|e| SimError::Config(e.to_string()))?;

    let args = match cli.mode {
        Mode::Run(args) | Mode::Gateway(args) => args,
    };

    if args.yaml_files.is_empty() {
        return Err(SimError::Config("no YAML documents given".into()));
    }
    if args.name.is_empty() {
        return Err(SimError::Config("no model instance names given".into()));
    }

    let mut stack: Option<StackDoc> = None;
    let mut model_docs: Vec<ModelDoc> = Vec::new();

    for path in &args.yaml_files {
        let text = fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("reading '{path}': {e}")))?;
        if let Ok(doc) = serde_yml::from_str::<StackDoc>(&text) {
            stack = Some(doc);
            continue;
        }
        let doc: ModelDoc = serde_yml::from_str(&text)
            .map_err(|e| SimError::Config(format!("parsing '{path}': {e}")))?;
        model_docs.push(doc);
    }

    let stack = stack.ok_or_else(|| SimError::Config("no stack document found".into()))?;

    let mut instances = Vec::new();
    for requested_name in &args.name {
        let stack_instance = stack
            .instances
            .iter()
            .find(|i| &i.name == requested_name)
            .ok_or_else(|| {
                SimError::Config(format!("no stack entry named '{requested_name}'"))
            })?;

        let model_doc = model_docs
            .iter()
            .find(|d| d.metadata.name == stack_instance.model)
            .ok_or_else(|| {
                SimError::Config(format!(
                    "no model definition named '{}'",
                    stack_instance.model
                ))
            })?;

        let definition = resolve_model_definition(model_doc)?;
        instances.push(ModelInstanceSpec {
            name: stack_instance.name.clone(),
            uid: stack_instance.uid,
            model_definition: definition,
        });
    }

    let mut spec = SimulationSpec {
        transport: args.transport.unwrap_or_else(|| "loopback".to_string()),
        uri: args.uri.unwrap_or_default(),
        uid: args.uid.unwrap_or(0),
        step_size: args.step_size.unwrap_or(0.1),
        end_time: args.end_time.unwrap_or(0.0),
        timeout: args.timeout.unwrap_or(SimulationSpec::DEFAULT_TIMEOUT),
        instances,
        log_level: args.log_level,
    };
    spec.assign_uids();
    Ok(spec)
}

fn resolve_model_definition(doc: &ModelDoc) -> Result<ModelDefinition> {
    let path = doc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.path.clone());

    let gateway = doc.spec.runtime.gateway;
    let channels: Vec<ChannelDef> = doc.spec.channels.clone();

    if gateway {
        return Ok(ModelDefinition {
            name: doc.metadata.name.clone(),
            path,
            file: None,
            full_path: None,
            gateway: true,
            channels,
        });
    }

    let entry = doc
        .spec
        .runtime
        .dynlib
        .iter()
        .find(|e| e.os == std::env::consts::OS && e.arch == std::env::consts::ARCH)
        .ok_or_else(|| {
            SimError::Config(format!(
                "model '{}' has no dynlib entry for {}/{}",
                doc.metadata.name,
                std::env::consts::OS,
                std::env::consts::ARCH
            ))
        })?;

    let full_path = match &path {
        Some(dir) => Path::new(dir).join(&entry.path),
        None => PathBuf::from(&entry.path),
    };

    Ok(ModelDefinition {
        name: doc.metadata.name.clone(),
        path,
        file: Some(entry.path.clone()),
        full_path: Some(full_path),
        gateway: false,
        channels,
    })
}
