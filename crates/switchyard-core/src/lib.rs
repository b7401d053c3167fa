//! Core types and error definitions for Switchyard.
//!
//! This crate provides the foundational types shared across all Switchyard
//! crates: the task submitted by callers, the response produced by a backend,
//! the events published while a task runs, and the error taxonomy that every
//! other crate returns.
//!
//! # Main types
//!
//! - [`SwitchyardError`]: Unified error enum; every backend-related variant carries the backend id.
//! - [`SwitchyardResult`]: Convenience alias for `Result<T, SwitchyardError>`.
//! - [`ErrorKind`]: Machine-readable classification of a [`SwitchyardError`].
//! - [`BackendId`]: Identifier of one worker backend.
//! - [`Task`] / [`TaskCategory`]: A unit of work and its routing category.
//! - [`AgentResponse`]: The result of one execution attempt.
//! - [`TaskEvent`] / [`EventKind`]: Progress and outcome notifications.

/// Backend identifiers.
pub mod backend;
/// Error taxonomy.
pub mod error;
/// Task lifecycle events.
pub mod event;
/// Execution results.
pub mod response;
/// Units of work.
pub mod task;

pub use backend::BackendId;
pub use error::{ErrorKind, SwitchyardError, SwitchyardResult};
pub use event::{EventKind, TaskEvent};
pub use response::AgentResponse;
pub use task::{Task, TaskCategory};
