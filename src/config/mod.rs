//!
//! The data model produced by configuration: a [`SimulationSpec`] with its
//! list of [`ModelInstanceSpec`], each resolved against a [`ModelDefinition`].
//!

mod load;
pub use self::load::configure;

use std::path::PathBuf;

use serde::Deserialize;

/// One channel declared by a model definition document.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelDef {
    /// Channel name as it appears on the bus.
    pub name: String,
    /// Optional local alias; unused by the core but carried through for
    /// adapters that need it.
    #[serde(default)]
    pub alias: Option<String>,
    /// Signal names declared for this channel by the model.
    #[serde(default)]
    pub signals: Vec<String>,
}

/// A `(os, arch)`-selected dynamic library entry from a model definition's
/// `spec/runtime/dynlib` list.
#[derive(Debug, Clone, Deserialize)]
pub struct DynlibEntry {
    pub os: String,
    pub arch: String,
    pub path: String,
}

/// The resolved description of one model's code and wiring, independent of
/// any particular instance of it.
#[derive(Debug, Clone, Default)]
pub struct ModelDefinition {
    /// Logical name, matched against a stack entry's `model` reference.
    pub name: String,
    /// Directory the definition document was loaded from, if any.
    pub path: Option<String>,
    /// Dynamic library file selected for the host `(os, arch)`.
    pub file: Option<String>,
    /// Fully resolved path to `file`, relative to `path`.
    pub full_path: Option<PathBuf>,
    /// Whether `spec/runtime/gateway` was present: binds to the built-in
    /// gateway stubs instead of a dynamic library.
    pub gateway: bool,
    /// Channels this model declares.
    pub channels: Vec<ChannelDef>,
}

/// One model being hosted in this process.
#[derive(Debug, Clone)]
pub struct ModelInstanceSpec {
    /// Unique (within the process) instance name.
    pub name: String,
    /// Process-unique identifier; `0` means "assign on load".
    pub uid: u32,
    /// The resolved model code and wiring.
    pub model_definition: ModelDefinition,
}

/// Root configuration object for one run, produced by [`configure`].
#[derive(Debug, Clone)]
pub struct SimulationSpec {
    pub transport: String,
    pub uri: String,
    pub uid: u32,
    pub step_size: f64,
    /// `0.0` means open-ended.
    pub end_time: f64,
    pub timeout: f64,
    pub instances: Vec<ModelInstanceSpec>,
    /// `--log_level`, carried through so the CLI front-end can install
    /// its `tracing` subscriber from the same parse pass that built the
    /// rest of this spec, rather than re-parsing `argv` a second time.
    /// Not otherwise consulted by the core.
    pub log_level: Option<String>,
}

impl SimulationSpec {
    /// Timeout used by an instance's bus rendezvous when not overridden;
    /// mirrors the reference runtime's `MODEL_TIMEOUT` default.
    pub const DEFAULT_TIMEOUT: f64 = 60.0;

    /// Assigns zero-UID instances `10_000 * index + self.uid`, in
    /// instance-list order. Idempotent: instances with a nonzero UID are
    /// left untouched.
    pub fn assign_uids(&mut self) {
        for (index, instance) in self.instances.iter_mut().enumerate() {
            if instance.uid == 0 {
                instance.uid = 10_000 * index as u32 + self.uid;
            }
        }
    }
}

/// Raw shape of a stack document (`serde_yml`-deserialized).
#[derive(Debug, Clone, Deserialize)]
pub struct StackDoc {
    pub instances: Vec<StackInstance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StackInstance {
    pub name: String,
    #[serde(default)]
    pub uid: u32,
    pub model: String,
}

/// Raw shape of a model definition document (`serde_yml`-deserialized).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDoc {
    pub metadata: ModelMetadata,
    pub spec: ModelSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    #[serde(default)]
    pub annotations: Option<ModelAnnotations>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelAnnotations {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub runtime: ModelRuntime,
    #[serde(default)]
    pub channels: Vec<ChannelDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelRuntime {
    #[serde(default)]
    pub dynlib: Vec<DynlibEntry>,
    #[serde(default)]
    pub gateway: bool,
}
