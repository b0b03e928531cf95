//! Records read from the outbox table.

use std::fmt;

/// Identifier of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event row written by a producer, owned by the store until a committed cycle removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub id: RecordId,
    /// Serialized event, forwarded untouched.
    pub payload: String,
}

impl PersistedRecord {
    pub fn new(id: RecordId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Records returned by one locked fetch, in the order the store produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<PersistedRecord>,
}

impl Batch {
    pub fn new(records: Vec<PersistedRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.iter().map(|record| record.id)
    }

    pub fn payloads(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.iter().map(|record| record.payload.as_str())
    }

    pub fn records(&self) -> &[PersistedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PersistedRecord> {
        self.records
    }
}

impl FromIterator<PersistedRecord> for Batch {
    fn from_iter<I: IntoIterator<Item = PersistedRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
