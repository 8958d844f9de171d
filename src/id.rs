//! Prefixed ULID newtypes for type-safe entity IDs.
//!
//! - `TaskId`: `task_01ARZ3NDEKTSV4RRFFQ69G5FAV`
//! - `UserId`: `usr_01ARZ3NDEKTSV4RRFFQ69G5FAV`
//! - `CommentId`: `cmt_01ARZ3NDEKTSV4RRFFQ69G5FAV`
//! - `AttachmentId`: `att_01ARZ3NDEKTSV4RRFFQ69G5FAV`

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdParseError {
    #[error("Invalid ULID format: {0}")]
    InvalidUlid(String),
    #[error("Missing prefix: expected '{expected}', got '{actual}'")]
    MissingPrefix {
        expected: &'static str,
        actual: String,
    },
}

fn validate_ulid(s: &str) -> Result<(), IdParseError> {
    ulid::Ulid::from_string(s)
        .map(|_| ())
        .map_err(|_| IdParseError::InvalidUlid(s.to_string()))
}

/// Defines a prefixed ULID newtype with serde, SQL, and parsing support.
/// IDs are stored with their prefix - single source of truth.
macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new id with a fresh ULID
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, ulid::Ulid::new()))
            }

            /// Extract the ULID part (without prefix)
            pub fn ulid_part(&self) -> &str {
                self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
            }

            /// Full string representation (with prefix)
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = s
                    .strip_prefix(Self::PREFIX)
                    .ok_or_else(|| IdParseError::MissingPrefix {
                        expected: Self::PREFIX,
                        actual: s.to_string(),
                    })?;
                validate_ulid(ulid)?;
                Ok(Self(s.to_string()))
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.clone()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?.to_string();
                Ok(Self(s))
            }
        }
    };
}

prefixed_id!(TaskId, "task_");
prefixed_id!(UserId, "usr_");
prefixed_id!(CommentId, "cmt_");
prefixed_id!(AttachmentId, "att_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_new() {
        let id = TaskId::new();
        assert!(id.as_str().starts_with("task_"));
        assert_eq!(id.ulid_part().len(), 26);
    }

    #[test]
    fn task_id_parse_with_prefix() {
        let id: TaskId = "task_01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        assert_eq!(id.as_str(), "task_01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }

    #[test]
    fn task_id_parse_without_prefix_fails() {
        let result: Result<TaskId, _> = "01ARZ3NDEKTSV4RRFFQ69G5FAV".parse();
        assert!(matches!(result, Err(IdParseError::MissingPrefix { .. })));
    }

    #[test]
    fn task_id_parse_invalid_ulid() {
        let result: Result<TaskId, _> = "task_invalid".parse();
        assert!(matches!(result, Err(IdParseError::InvalidUlid(_))));
    }

    #[test]
    fn task_id_serde() {
        let id = TaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with("\"task_"));
        let parsed: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn user_id_parse_rejects_task_prefix() {
        let result: Result<UserId, _> = "task_01ARZ3NDEKTSV4RRFFQ69G5FAV".parse();
        assert!(matches!(result, Err(IdParseError::MissingPrefix { .. })));
    }

    #[test]
    fn attachment_id_new() {
        let id = AttachmentId::new();
        assert!(id.as_str().starts_with("att_"));
    }

    #[test]
    fn comment_id_roundtrip() {
        let id: CommentId = "cmt_01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        assert_eq!(id.to_string(), "cmt_01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }
}
