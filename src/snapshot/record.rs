//! Decoded snapshot entries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Redis object type of a snapshot entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    String,
    List,
    Set,
    #[serde(alias = "sortedset", alias = "sorted_set")]
    ZSet,
    Hash,
    Stream,
    Module,
}

impl ObjectType {
    pub const ALL: [ObjectType; 7] = [
        ObjectType::String,
        ObjectType::List,
        ObjectType::Set,
        ObjectType::ZSet,
        ObjectType::Hash,
        ObjectType::Stream,
        ObjectType::Module,
    ];

    /// Name used in published payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::String => "string",
            ObjectType::List => "list",
            ObjectType::Set => "set",
            ObjectType::ZSet => "zset",
            ObjectType::Hash => "hash",
            ObjectType::Stream => "stream",
            ObjectType::Module => "module",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical entry decoded from a dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Database index the key lives in
    pub db: u32,
    pub key: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Estimated memory footprint in bytes
    pub size: u64,
    /// Number of elements (1 for strings)
    #[serde(default)]
    pub element_count: u64,
    /// Absolute expiration as Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at_ms: Option<i64>,
}

impl SnapshotRecord {
    pub fn new(db: u32, key: impl Into<String>, object_type: ObjectType, size: u64) -> Self {
        SnapshotRecord {
            db,
            key: key.into(),
            object_type,
            size,
            element_count: 1,
            expire_at_ms: None,
        }
    }

    pub fn with_element_count(mut self, element_count: u64) -> Self {
        self.element_count = element_count;
        self
    }

    pub fn with_expire_at_ms(mut self, expire_at_ms: i64) -> Self {
        self.expire_at_ms = Some(expire_at_ms);
        self
    }
}
