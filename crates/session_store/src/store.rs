use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use agent_provider::Message;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SessionStoreError;
use crate::paths::{default_session_name, sanitize_session_name, session_file_name, INDEX_FILE};
use crate::schema::{IndexEntry, SessionIndex, SessionMeta, SessionRecord, SessionSummary, SCHEMA_VERSION};

/// Session files and their index under one base directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    #[must_use]
    pub fn session_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(session_file_name(name))
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        let name = sanitize_session_name(name);
        !name.is_empty() && self.session_path(&name).is_file()
    }

    /// Creates an empty session and makes it the last-used one.
    ///
    /// An empty or fully invalid `requested` name falls back to a timestamp
    /// name. Collisions get `-2`, `-3`, ... appended.
    pub fn create(&self, requested: Option<&str>) -> Result<String, SessionStoreError> {
        self.ensure_base_dir()?;

        let now_utc = OffsetDateTime::now_utc();
        let now = format_timestamp(now_utc)?;
        let base = requested
            .map(sanitize_session_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_session_name(now_utc));
        let mut index = self.read_index();
        let name = self.unique_name(&index, &base);

        let record = SessionRecord {
            schema_version: SCHEMA_VERSION,
            name: name.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
            messages: Vec::new(),
            meta: SessionMeta::default(),
        };
        write_json_atomic(&self.session_path(&name), &record)?;

        index.sessions.insert(
            name.clone(),
            IndexEntry {
                file: session_file_name(&name),
                created_at: now.clone(),
                updated_at: now,
            },
        );
        index.last_session = Some(name.clone());
        self.write_index(&index)?;

        debug!(session = %name, "created session");
        Ok(name)
    }

    /// Reads a session, registering it in the index if missing and marking it
    /// as last used.
    pub fn load(&self, name: &str) -> Result<SessionRecord, SessionStoreError> {
        let name = require_name(name)?;
        let path = self.session_path(&name);
        if !path.is_file() {
            return Err(SessionStoreError::NotFound { name });
        }

        let record = read_record(&path)?;

        let mut index = self.read_index();
        if !index.sessions.contains_key(&name) {
            debug!(session = %name, "registering session missing from index");
            index.sessions.insert(
                name.clone(),
                IndexEntry {
                    file: session_file_name(&name),
                    created_at: record.created_at.clone(),
                    updated_at: record.updated_at.clone(),
                },
            );
        }
        index.last_session = Some(name);
        self.write_index(&index)?;

        Ok(record)
    }

    /// Writes the full session, keeping `created_at` from any existing file.
    pub fn save(
        &self,
        name: &str,
        messages: &[Message],
        meta: &SessionMeta,
    ) -> Result<(), SessionStoreError> {
        let name = require_name(name)?;
        self.ensure_base_dir()?;

        let path = self.session_path(&name);
        let now = format_timestamp(OffsetDateTime::now_utc())?;
        let created_at = if path.is_file() {
            match read_record(&path) {
                Ok(existing) => existing.created_at,
                Err(error) => {
                    warn!(session = %name, %error, "existing session unreadable; resetting created_at");
                    now.clone()
                }
            }
        } else {
            now.clone()
        };

        let record = SessionRecord {
            schema_version: SCHEMA_VERSION,
            name: name.clone(),
            created_at: created_at.clone(),
            updated_at: now.clone(),
            messages: messages.to_vec(),
            meta: meta.clone(),
        };
        write_json_atomic(&path, &record)?;

        let mut index = self.read_index();
        let entry = index.sessions.entry(name.clone()).or_insert_with(|| IndexEntry {
            file: session_file_name(&name),
            created_at,
            updated_at: now.clone(),
        });
        entry.updated_at = now;
        index.last_session = Some(name);
        self.write_index(&index)
    }

    /// Removes a session. Returns whether a session file existed.
    pub fn delete(&self, name: &str) -> Result<bool, SessionStoreError> {
        let name = require_name(name)?;
        let path = self.session_path(&name);

        let existed = path.is_file();
        if existed {
            fs::remove_file(&path)
                .map_err(|source| SessionStoreError::io("deleting session file", &path, source))?;
        }

        let mut index = self.read_index();
        index.sessions.remove(&name);
        if index.last_session.as_deref() == Some(name.as_str()) {
            index.last_session = None;
        }
        self.write_index(&index)?;

        Ok(existed)
    }

    /// Moves `old` to a unique name derived from `new` and returns that name.
    pub fn rename(&self, old: &str, new: &str) -> Result<String, SessionStoreError> {
        let old = require_name(old)?;
        let requested = require_name(new)?;

        let old_path = self.session_path(&old);
        if !old_path.is_file() {
            return Err(SessionStoreError::NotFound { name: old });
        }
        if requested == old {
            return Ok(old);
        }

        let mut index = self.read_index();
        let new_name = self.unique_name(&index, &requested);
        let new_path = self.session_path(&new_name);
        fs::rename(&old_path, &new_path)
            .map_err(|source| SessionStoreError::io("renaming session file", &old_path, source))?;

        let now = format_timestamp(OffsetDateTime::now_utc())?;
        let created_at = match read_record(&new_path) {
            Ok(mut record) => {
                record.name = new_name.clone();
                record.updated_at = now.clone();
                write_json_atomic(&new_path, &record)?;
                record.created_at
            }
            Err(error) => {
                warn!(session = %new_name, %error, "renamed session unreadable; name field not updated");
                now.clone()
            }
        };

        let previous = index.sessions.remove(&old);
        index.sessions.insert(
            new_name.clone(),
            IndexEntry {
                file: session_file_name(&new_name),
                created_at: previous.map_or(created_at, |entry| entry.created_at),
                updated_at: now,
            },
        );
        if index.last_session.as_deref() == Some(old.as_str()) {
            index.last_session = Some(new_name.clone());
        }
        self.write_index(&index)?;

        Ok(new_name)
    }

    /// Indexed sessions whose file still exists, most recently updated first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let index = self.read_index();
        let mut sessions: Vec<SessionSummary> = index
            .sessions
            .into_iter()
            .filter(|(_, entry)| self.base_dir.join(&entry.file).is_file())
            .map(|(name, entry)| SessionSummary {
                name,
                file: entry.file,
                created_at: entry.created_at,
                updated_at: entry.updated_at,
            })
            .collect();

        sessions.sort_by(|left, right| {
            compare_timestamps(&right.updated_at, &left.updated_at)
                .then_with(|| left.name.cmp(&right.name))
        });
        sessions
    }

    #[must_use]
    pub fn last_session(&self) -> Option<String> {
        self.read_index()
            .last_session
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Loads the index, treating a missing or corrupt file as empty.
    #[must_use]
    pub fn read_index(&self) -> SessionIndex {
        let path = self.index_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return SessionIndex::default();
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "session index unreadable; starting fresh");
                return SessionIndex::default();
            }
        };

        match serde_json::from_str::<SessionIndex>(&text) {
            Ok(index) => index,
            Err(error) => {
                warn!(path = %path.display(), %error, "session index corrupt; starting fresh");
                SessionIndex::default()
            }
        }
    }

    fn write_index(&self, index: &SessionIndex) -> Result<(), SessionStoreError> {
        self.ensure_base_dir()?;
        write_json_atomic(&self.index_path(), index)
    }

    fn ensure_base_dir(&self) -> Result<(), SessionStoreError> {
        fs::create_dir_all(&self.base_dir).map_err(|source| {
            SessionStoreError::io("creating sessions directory", &self.base_dir, source)
        })
    }

    fn unique_name(&self, index: &SessionIndex, base: &str) -> String {
        let taken = |candidate: &str| {
            index.sessions.contains_key(candidate) || self.session_path(candidate).exists()
        };
        if !taken(base) {
            return base.to_string();
        }

        (2usize..)
            .map(|suffix| format!("{base}-{suffix}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| format!("{base}-{}", Uuid::new_v4()))
    }
}

fn require_name(name: &str) -> Result<String, SessionStoreError> {
    let sanitized = sanitize_session_name(name);
    if sanitized.is_empty() {
        return Err(SessionStoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(sanitized)
}

fn read_record(path: &Path) -> Result<SessionRecord, SessionStoreError> {
    let text = fs::read_to_string(path)
        .map_err(|source| SessionStoreError::io("reading session file", path, source))?;
    serde_json::from_str(&text).map_err(|source| SessionStoreError::json_parse(path, source))
}

fn format_timestamp(now: OffsetDateTime) -> Result<String, SessionStoreError> {
    now.format(&Rfc3339).map_err(SessionStoreError::ClockFormat)
}

fn compare_timestamps(left: &str, right: &str) -> Ordering {
    match (
        OffsetDateTime::parse(left, &Rfc3339),
        OffsetDateTime::parse(right, &Rfc3339),
    ) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => left.cmp(right),
    }
}

/// Serializes `value` next to `path` under a unique temp name, syncs it, then
/// renames it over `path`.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionStoreError> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|source| SessionStoreError::json_serialize(path, source))?;
    bytes.push(b'\n');

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.{}.tmp", Uuid::new_v4()));

    let result = (|| {
        let mut file = File::create(&tmp_path)
            .map_err(|source| SessionStoreError::io("creating temp file", &tmp_path, source))?;
        file.write_all(&bytes)
            .map_err(|source| SessionStoreError::io("writing temp file", &tmp_path, source))?;
        file.sync_all()
            .map_err(|source| SessionStoreError::io("syncing temp file", &tmp_path, source))?;
        fs::rename(&tmp_path, path)
            .map_err(|source| SessionStoreError::io("replacing file", path, source))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
