//!
//! Error types produced by the model host.
//!

use std::fmt::{self, Debug, Display};

/// An error encountered while loading a model's dynamic library.
#[derive(Debug)]
pub enum LoadError {
    /// The dynamic library could not be opened (missing file, bad format, ...).
    OpenFailed {
        /// Path that was attempted.
        path: String,
        /// Underlying `libloading` error, rendered to a string since
        /// `libloading::Error` does not implement `Clone`.
        reason: String,
    },
    /// Neither `model_create` nor `model_step` were found in the library.
    IncompleteInterface {
        /// Name of the model instance whose library was loaded.
        instance: String,
    },
    /// The model definition provided neither a dynamic library path nor a
    /// `spec/runtime/gateway` marker.
    NoInterfaceSource {
        /// Name of the model instance.
        instance: String,
    },
}

impl Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed { path, reason } => {
                write!(f, "failed to open dynamic library '{path}': {reason}")
            }
            Self::IncompleteInterface { instance } => {
                write!(
                    f,
                    "model '{instance}' exports neither model_create nor model_step"
                )
            }
            Self::NoInterfaceSource { instance } => {
                write!(
                    f,
                    "model '{instance}' has no dynlib path and is not a gateway model"
                )
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// An error reported by the bus adapter.
#[derive(Debug, Clone)]
pub enum BusError {
    /// `ready` timed out waiting for the bus rendezvous. Recoverable: the
    /// caller may choose to clean-exit.
    Timeout,
    /// Any other adapter-reported failure.
    Other(String),
}

impl Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for bus rendezvous"),
            Self::Other(msg) => write!(f, "bus adapter error: {msg}"),
        }
    }
}

impl std::error::Error for BusError {}

/// The unified error type returned by this crate's public operations.
#[derive(Debug)]
pub enum SimError {
    /// A configuration document was malformed or incomplete.
    Config(String),
    /// A model's dynamic library could not be loaded.
    Load(LoadError),
    /// The bus adapter reported an error.
    Bus(BusError),
    /// A model's `step` handler returned a positive code: "model requests exit".
    ModelExit,
    /// `Controller::stop()` was observed; the run loop exited early by design.
    Cancelled,
    /// Gateway back-pressure: the caller's requested time is behind the bus.
    /// Not a failure — the caller should advance its own time and retry.
    GatewayBehind,
    /// The process-wide controller was used before `init` or after `destroy`.
    NotInitialized,
    /// `Controller::init` was called while a controller was already active.
    AlreadyInitialized,
}

impl Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Load(e) => write!(f, "{e}"),
            Self::Bus(e) => write!(f, "{e}"),
            Self::ModelExit => write!(f, "a model requested exit"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::GatewayBehind => write!(f, "gateway is behind the simulation bus"),
            Self::NotInitialized => write!(f, "controller is not initialized"),
            Self::AlreadyInitialized => write!(f, "controller is already initialized"),
        }
    }
}

impl std::error::Error for SimError {}

impl From<LoadError> for SimError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<BusError> for SimError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SimError>;
