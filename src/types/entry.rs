//! Stream entries and read cursors

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::EntryId;

/// Field/value pairs carried by an entry
pub type Fields = BTreeMap<String, String>;

/// A single log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub fields: Fields,
}

impl Entry {
    pub fn new(id: EntryId, fields: Fields) -> Self {
        Self { id, fields }
    }

    /// Look up a single field value
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Where a group read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadCursor {
    /// `>`: only entries never delivered to this group
    #[default]
    New,
    /// This consumer's own pending history strictly after the id
    After(EntryId),
}

impl ReadCursor {
    /// Cursor over the whole pending history of a consumer
    pub fn history() -> Self {
        ReadCursor::After(EntryId::ZERO)
    }

    pub fn is_history(&self) -> bool {
        matches!(self, ReadCursor::After(_))
    }
}

impl fmt::Display for ReadCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadCursor::New => write!(f, ">"),
            ReadCursor::After(id) => write!(f, "{}", id),
        }
    }
}
