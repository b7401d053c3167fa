//! Session continuity for Switchyard.
//!
//! A session record maps a task id to the backend that last served it and
//! the opaque continuation token that backend returned. Records expire after
//! an idle TTL; expired records are never handed out.

/// Session records.
pub mod session;
/// Session store trait and its in-memory and file-backed implementations.
pub mod store;

pub use session::{SessionRecord, DEFAULT_SESSION_TTL};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, DEFAULT_PURGE_INTERVAL};
