//! Append-only status audit trail. Rows are written once per effective
//! status change and never updated or deleted, including after the task
//! itself is purged.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::{TaskId, UserId};
use crate::types::{TaskStatus, TaskStatusUpdate};

pub fn append_status_update(
    conn: &Connection,
    task_id: &TaskId,
    status: TaskStatus,
    updated_by: &UserId,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_status_updates (task_id, status, updated_by, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![task_id, status, updated_by, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Full trail for one task, oldest first. Rowid breaks ties between
/// writes landing in the same timestamp.
pub fn list_status_updates(conn: &Connection, task_id: &TaskId) -> Result<Vec<TaskStatusUpdate>> {
    let mut stmt = conn.prepare(
        "SELECT task_id, status, updated_by, created_at FROM task_status_updates
         WHERE task_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let updates = stmt
        .query_map(params![task_id], |row| {
            Ok(TaskStatusUpdate {
                task_id: row.get(0)?,
                status: row.get(1)?,
                updated_by: row.get(2)?,
                created_at: row
                    .get::<_, String>(3)?
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?
        .collect::<rusqlite::Result<Vec<TaskStatusUpdate>>>()?;
    Ok(updates)
}

pub fn latest_status_update(
    conn: &Connection,
    task_id: &TaskId,
) -> Result<Option<TaskStatusUpdate>> {
    Ok(list_status_updates(conn, task_id)?.pop())
}
