//! Agent clients for Switchyard.
//!
//! Every worker backend is wrapped in an [`AgentClient`]: one async
//! `invoke` call that takes a prompt, an optional session token and the
//! task's file scope, streams progress through a [`ProgressSink`] and
//! returns a single terminal [`InvocationOutput`].
//!
//! # Main types
//!
//! - [`AgentClient`]: Uniform invocation contract.
//! - [`BackendConfig`] / [`BackendProfile`]: Routing attributes and transport of one backend.
//! - [`AgentRegistry`]: Lookup table of clients keyed by backend id, built once at startup.
//! - [`CommandBackend`], [`HttpBackend`], [`EchoBackend`]: Concrete transports.

/// Concrete backend transports.
pub mod backends;
/// The agent client contract.
pub mod client;
/// Backend configuration.
pub mod config;
/// Progress notifications emitted while a backend runs.
pub mod progress;
/// Backend lookup table.
pub mod registry;
/// Line-oriented wire protocol spoken by command and HTTP backends.
pub mod wire;

pub use backends::{CommandBackend, EchoBackend, HttpBackend};
pub use client::{AgentClient, Invocation, InvocationOutput};
pub use config::{BackendConfig, BackendProfile, Transport};
pub use progress::{Progress, ProgressSink};
pub use registry::{AgentRegistry, BackendEntry};
pub use wire::{WireCollector, WireMessage};
