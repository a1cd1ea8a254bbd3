//! Durable conversation sessions
//!
//! One JSON document per session under the sessions directory. Every
//! read-modify-write holds a per-session lock, and documents are replaced
//! atomically on disk.

mod model;
mod store;

pub use model::{Message, Role, Session, SessionMetadata, UndoOutcome};
pub use store::{generate_session_id, validate_session_id, SessionStore};
