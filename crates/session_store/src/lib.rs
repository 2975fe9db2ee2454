//! Durable, named conversation sessions plus an index with a "last used" pointer.
//!
//! Every write goes through a temp-file-then-rename replace, so each file is
//! either the old or the new version on disk. The session file and the index
//! are written independently; a session file missing from the index is
//! registered again the next time it is loaded.

mod error;
mod paths;
mod schema;
mod store;

pub use error::SessionStoreError;
pub use paths::{
    default_session_name, sanitize_session_name, session_file_name, session_root, INDEX_FILE,
    MAX_SESSION_NAME_LEN,
};
pub use schema::{IndexEntry, SessionIndex, SessionMeta, SessionRecord, SessionSummary, SCHEMA_VERSION};
pub use store::SessionStore;
