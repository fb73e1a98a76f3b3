//! Router Persistence - crash-safe session storage.
//!
//! - **atomic**: temp-file-and-rename JSON writes
//! - **session_store**: the [`SessionStore`] capability with in-memory and
//!   JSON-file implementations

pub mod atomic;
pub mod error;
pub mod session_store;

pub use atomic::{load_json, replace_file, write_json};
pub use error::{PersistenceError, Result};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore, StoredSession};
