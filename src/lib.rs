//!
//! A host container for co-simulation models.
//!
//! This crate hosts one or more user-supplied simulation "models" inside
//! a single process and couples them to an external simulation bus
//! ("SimBus") that coordinates time advancement and signal exchange
//! across many such hosts. It is a generic container: it loads model
//! code dynamically, drives each model through a synchronized step
//! loop, marshals named signals between model-local buffers and
//! bus-wide buffers under a two-phase "final value" discipline, and
//! supports two execution modes:
//!
//! - **synchronous** ([`controller`]) — the runtime owns the loop
//!   ([`controller::Controller::run`]).
//! - **gateway** ([`gateway`]) — the caller owns the loop and advances
//!   time by calling [`gateway::sync`].
//!
//! The wire transport and bus protocol are external collaborators: this
//! crate defines the [`adapter::Adapter`] boundary they are driven
//! through and ships one concrete, in-process implementation
//! ([`adapter::LoopbackAdapter`]) for tests, examples and single-process
//! demos.
//!

pub mod adapter;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod marshal;
pub mod model;
pub mod signal;
pub mod time;

pub use error::{BusError, LoadError, Result, SimError};
