use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::id::{AttachmentId, CommentId, TaskId, UserId};

/// Defines a closed string enum stored as TEXT in SQLite.
/// The wire strings match the JSON representation exactly.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|_| FromSqlError::InvalidType)
            }
        }
    };
}

text_enum!(TaskStatus {
    Open => "Open",
    InProgress => "InProgress",
    Completed => "Completed",
    Blocked => "Blocked",
});

text_enum!(TaskKind {
    Bug => "Bug",
    Feature => "Feature",
    Improvement => "Improvement",
});

text_enum!(TaskPriority {
    Low => "Low",
    Medium => "Medium",
    High => "High",
});

// Record lifecycle as an explicit state machine:
// Active -> Trashed -> (restore) Active, or -> Purged (row deleted, terminal).
// Purged never appears in a row; it exists for error reporting.
text_enum!(LifecycleState {
    Active => "Active",
    Trashed => "Trashed",
    Purged => "Purged",
});

text_enum!(LifecycleAction {
    Trash => "trash",
    Restore => "restore",
    Purge => "purge",
});

// Discriminator for records that can own comments or attachments.
// An explicit tagged reference, not a shared base type.
text_enum!(OwnerKind {
    Task => "Task",
    User => "User",
});

/// A reference to the record a comment or attachment belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: String,
}

impl OwnerRef {
    pub fn task(id: &TaskId) -> Self {
        Self {
            kind: OwnerKind::Task,
            id: id.as_str().to_string(),
        }
    }

    pub fn user(id: &UserId) -> Self {
        Self {
            kind: OwnerKind::User,
            id: id.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<UserId>,
    pub lifecycle: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<DateTime<Utc>>,
    /// Optimistic-lock counter, bumped on every persisted write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_trashed(&self) -> bool {
        self.lifecycle == LifecycleState::Trashed
    }
}

/// Directed edge: `task_id` cannot complete until `depends_on_task_id` does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    pub task_id: TaskId,
    pub depends_on_task_id: TaskId,
}

/// Append-only audit record, one row per effective status write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub lifecycle: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub owner: OwnerRef,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    pub owner: OwnerRef,
    /// Name the uploader gave the file, validated but kept verbatim.
    pub file_name: String,
    /// Randomized on-disk name relative to the attachment root.
    pub stored_path: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskInput {
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<UserId>,
}

impl Default for CreateTaskInput {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            kind: TaskKind::Feature,
            status: TaskStatus::Open,
            priority: TaskPriority::Medium,
            due_date: None,
            assigned_to: None,
        }
    }
}

/// Partial update over the non-status fields. The status field is owned
/// by the status engine and is not updatable here.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<TaskKind>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<UserId>,
}

/// Optional equality predicates over the filterable columns.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub kind: Option<TaskKind>,
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<UserId>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_roundtrip() {
        for s in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Blocked,
        ] {
            assert_eq!(s.as_str().parse::<TaskStatus>().unwrap(), s);
        }
    }

    #[test]
    fn status_rejects_unknown() {
        assert!("Done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn status_json_uses_wire_strings() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"InProgress\"");
    }

    #[test]
    fn owner_ref_task() {
        let id = TaskId::new();
        let owner = OwnerRef::task(&id);
        assert_eq!(owner.kind, OwnerKind::Task);
        assert_eq!(owner.id, id.as_str());
    }
}
