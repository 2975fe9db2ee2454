use std::collections::BTreeMap;

use agent_provider::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Free-form session metadata. `cwd` and `model` are well known; anything else
/// round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk shape of `<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default = "schema_version", alias = "version")]
    pub schema_version: u32,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub meta: SessionMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file: String,
    pub created_at: String,
    pub updated_at: String,
}

/// On-disk shape of `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIndex {
    #[serde(default = "schema_version", alias = "version")]
    pub schema_version: u32,
    #[serde(default)]
    pub last_session: Option<String>,
    #[serde(default)]
    pub sessions: BTreeMap<String, IndexEntry>,
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_session: None,
            sessions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub name: String,
    pub file: String,
    pub created_at: String,
    pub updated_at: String,
}
