//! Reporting: the daily digest the scheduled job produces, and the
//! ad-hoc filtered report sharing the task filter.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::task_repo;
use crate::error::Result;
use crate::types::{Task, TaskFilter, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDigest {
    pub date: NaiveDate,
    /// Tasks due on the digest date and not yet completed.
    pub due_today: Vec<Task>,
    pub completed: Vec<Task>,
}

/// Collect tasks due on `date` or already completed. Mirrors the daily
/// report job: one query, partitioned for presentation.
pub fn daily_digest(conn: &Connection, date: NaiveDate) -> Result<DailyDigest> {
    let tasks = task_repo::list_due_or_completed(conn, date)?;

    let (completed, due_today): (Vec<Task>, Vec<Task>) = tasks
        .into_iter()
        .partition(|t| t.status == TaskStatus::Completed);

    info!(
        date = %date,
        due = due_today.len(),
        completed = completed.len(),
        "daily task digest"
    );

    Ok(DailyDigest {
        date,
        due_today,
        completed,
    })
}

/// Filtered report over the same predicates as task listing.
pub fn filtered_report(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    task_repo::list_filtered(conn, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status_engine;
    use crate::db::schema;
    use crate::id::UserId;
    use crate::types::CreateTaskInput;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn digest_partitions_due_and_completed() {
        let conn = setup_db();
        let today = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();

        let due = task_repo::create_task(
            &conn,
            &CreateTaskInput {
                title: "Due today".to_string(),
                due_date: Some(today),
                ..Default::default()
            },
        )
        .unwrap();
        let done = task_repo::create_task(
            &conn,
            &CreateTaskInput {
                title: "Already done".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        task_repo::create_task(
            &conn,
            &CreateTaskInput {
                title: "Unrelated".to_string(),
                due_date: today.succ_opt(),
                ..Default::default()
            },
        )
        .unwrap();

        let actor = UserId::new();
        status_engine::set_status(&conn, &done.id, TaskStatus::Completed, &actor).unwrap();

        let digest = daily_digest(&conn, today).unwrap();
        assert_eq!(digest.due_today.len(), 1);
        assert_eq!(digest.due_today[0].id, due.id);
        assert_eq!(digest.completed.len(), 1);
        assert_eq!(digest.completed[0].id, done.id);
    }

    #[test]
    fn completed_task_due_today_counted_once_as_completed() {
        let conn = setup_db();
        let today = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();

        let task = task_repo::create_task(
            &conn,
            &CreateTaskInput {
                title: "Done and due".to_string(),
                due_date: Some(today),
                ..Default::default()
            },
        )
        .unwrap();
        let actor = UserId::new();
        status_engine::set_status(&conn, &task.id, TaskStatus::Completed, &actor).unwrap();

        let digest = daily_digest(&conn, today).unwrap();
        assert!(digest.due_today.is_empty());
        assert_eq!(digest.completed.len(), 1);
    }
}
