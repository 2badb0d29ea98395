//! Pending operation model: the durable intent log entries

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::{Detention, Student};
use crate::error::{Error, Result};

/// Store-assigned, auto-incrementing key of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(i64);

impl PendingId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of mutation recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "Unknown operation type: {other}"
            ))),
        }
    }
}

/// Remote resource a pending operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Detention,
    Student,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Detention => "detention",
            Self::Student => "student",
        }
    }

    /// Path of the remote collection endpoint, relative to the API base URL
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Detention => "/detentions",
            Self::Student => "/students",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "detention" => Ok(Self::Detention),
            "student" => Ok(Self::Student),
            other => Err(Error::InvalidInput(format!("Unknown entity: {other}"))),
        }
    }
}

/// A mutation waiting for remote acknowledgement, as stored in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: PendingId,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub entity: EntityKind,
    /// Full record for create/update, `{"id": ...}` for delete
    pub data: Value,
    /// Creation time (Unix ms)
    pub timestamp: i64,
}

impl PendingOperation {
    /// The `id` of the record this operation targets, if present in the payload.
    #[must_use]
    pub fn record_id(&self) -> Option<&str> {
        record_id(&self.data)
    }
}

/// A mutation about to be appended; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPendingOperation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub entity: EntityKind,
    pub data: Value,
}

impl NewPendingOperation {
    pub fn new(op_type: OperationType, entity: EntityKind, data: Value) -> Result<Self> {
        if record_id(&data).is_none() {
            return Err(Error::InvalidInput(format!(
                "{entity} {op_type} payload must carry a non-empty string id"
            )));
        }
        Ok(Self {
            op_type,
            entity,
            data,
        })
    }

    pub fn create_student(student: &Student) -> Result<Self> {
        Self::new(
            OperationType::Create,
            EntityKind::Student,
            serde_json::to_value(student)?,
        )
    }

    pub fn create_detention(detention: &Detention) -> Result<Self> {
        Self::new(
            OperationType::Create,
            EntityKind::Detention,
            serde_json::to_value(detention)?,
        )
    }

    pub fn update_detention(detention: &Detention) -> Result<Self> {
        Self::new(
            OperationType::Update,
            EntityKind::Detention,
            serde_json::to_value(detention)?,
        )
    }

    pub fn delete(entity: EntityKind, id: &str) -> Result<Self> {
        Self::new(
            OperationType::Delete,
            entity,
            serde_json::json!({ "id": id }),
        )
    }

    /// Attach the store-assigned key and creation time.
    #[must_use]
    pub fn into_pending(self, id: PendingId, timestamp: i64) -> PendingOperation {
        PendingOperation {
            id,
            op_type: self.op_type,
            entity: self.entity,
            data: self.data,
            timestamp,
        }
    }
}

fn record_id(data: &Value) -> Option<&str> {
    data.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}
