//! Admission control for Switchyard backends.
//!
//! Every call is admitted here before it can reach a backend. Admission is a
//! hard boundary: unknown backends are always rejected, calls that violate a
//! backend's constraints never reach it, and each backend has its own rolling
//! call budget. None of these rejections are treated as backend failures.
//!
//! # Main types
//!
//! - [`AdmissionGuard`]: Allow-list + constraint validation + rate limiting in one check.
//! - [`RateLimiter`]: Rolling-window call budget per backend.
//! - [`Constraint`] / [`ConstraintSet`]: Backend-specific parameter constraints.
//! - [`Sanitizer`]: Path and prompt validation, log-safe text.

/// Backend-specific call constraints.
pub mod constraint;
/// Allow-list guard combining all admission checks.
pub mod guard;
/// Rolling-window rate limiting.
pub mod rate_limit;
/// Input validation utilities.
pub mod sanitizer;

pub use constraint::{Constraint, ConstraintSet};
pub use guard::{AdmissionGuard, ToolCall};
pub use rate_limit::RateLimiter;
pub use sanitizer::Sanitizer;
