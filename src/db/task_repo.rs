use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, TfError};
use crate::id::TaskId;
use crate::types::{
    CreateTaskInput, LifecycleAction, LifecycleState, Task, TaskFilter, TaskStatus, UpdateTaskInput,
};

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| now())
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        kind: row.get("kind")?,
        status: row.get("status")?,
        priority: row.get("priority")?,
        due_date: row
            .get::<_, Option<String>>("due_date")?
            .and_then(|s| s.parse().ok()),
        assigned_to: row.get("assigned_to")?,
        lifecycle: row.get("lifecycle")?,
        trashed_at: row
            .get::<_, Option<String>>("trashed_at")?
            .map(parse_ts),
        version: row.get("version")?,
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

pub fn create_task(conn: &Connection, input: &CreateTaskInput) -> Result<Task> {
    let id = TaskId::new();
    let now_str = now().to_rfc3339();

    conn.execute(
        r#"
        INSERT INTO tasks (id, title, description, kind, status, priority, due_date, assigned_to, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
        params![
            &id,
            input.title,
            input.description,
            input.kind,
            input.status,
            input.priority,
            input.due_date.map(|d| d.to_string()),
            input.assigned_to.as_ref(),
            now_str,
        ],
    )?;

    find_by_id(conn, &id)?.ok_or_else(|| TfError::TaskNotFound(id))
}

/// Fetch a task, excluding trashed records. This is the default lookup;
/// trashed tasks behave as absent everywhere but `find_by_id_any`.
pub fn find_by_id(conn: &Connection, id: &TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1 AND lifecycle = 'Active'",
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// Fetch a task regardless of lifecycle state.
pub fn find_by_id_any(conn: &Connection, id: &TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row("SELECT * FROM tasks WHERE id = ?1", params![id], row_to_task)
        .optional()?;
    Ok(task)
}

pub fn update_task(conn: &Connection, id: &TaskId, input: &UpdateTaskInput) -> Result<Task> {
    let now_str = now().to_rfc3339();

    let mut updates = vec!["updated_at = ?1".to_string(), "version = version + 1".to_string()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now_str)];
    let mut param_idx = 2;

    if let Some(ref title) = input.title {
        updates.push(format!("title = ?{param_idx}"));
        params_vec.push(Box::new(title.clone()));
        param_idx += 1;
    }

    if let Some(ref desc) = input.description {
        updates.push(format!("description = ?{param_idx}"));
        params_vec.push(Box::new(desc.clone()));
        param_idx += 1;
    }

    if let Some(kind) = input.kind {
        updates.push(format!("kind = ?{param_idx}"));
        params_vec.push(Box::new(kind));
        param_idx += 1;
    }

    if let Some(priority) = input.priority {
        updates.push(format!("priority = ?{param_idx}"));
        params_vec.push(Box::new(priority));
        param_idx += 1;
    }

    if let Some(due_date) = input.due_date {
        updates.push(format!("due_date = ?{param_idx}"));
        params_vec.push(Box::new(due_date.to_string()));
        param_idx += 1;
    }

    if let Some(ref assigned_to) = input.assigned_to {
        updates.push(format!("assigned_to = ?{param_idx}"));
        params_vec.push(Box::new(assigned_to.clone()));
        param_idx += 1;
    }

    params_vec.push(Box::new(id.clone()));

    let sql = format!(
        "UPDATE tasks SET {} WHERE id = ?{} AND lifecycle = 'Active'",
        updates.join(", "),
        param_idx
    );

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    conn.execute(&sql, params_refs.as_slice())?;

    find_by_id(conn, id)?.ok_or_else(|| TfError::TaskNotFound(id.clone()))
}

/// Persist a status write only if the row still matches the observed
/// version. Returns false when the snapshot went stale; the caller
/// re-reads and re-evaluates.
pub fn set_status_versioned(
    conn: &Connection,
    id: &TaskId,
    status: TaskStatus,
    expected_version: i64,
) -> Result<bool> {
    let now_str = now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2, version = version + 1
         WHERE id = ?3 AND version = ?4 AND lifecycle = 'Active'",
        params![status, now_str, id, expected_version],
    )?;
    Ok(changed == 1)
}

pub fn task_exists(conn: &Connection, id: &TaskId) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE id = ?1 AND lifecycle = 'Active'",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Check whether a prerequisite satisfies the completion condition.
/// Missing, purged, or trashed prerequisites are treated as incomplete,
/// so a vanished target keeps blocking until the edge itself is removed.
pub fn is_task_completed(conn: &Connection, id: &TaskId) -> Result<bool> {
    let status: Option<TaskStatus> = conn
        .query_row(
            "SELECT status FROM tasks WHERE id = ?1 AND lifecycle = 'Active'",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(status == Some(TaskStatus::Completed))
}

pub fn list_filtered(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut sql = String::from("SELECT * FROM tasks WHERE lifecycle = 'Active'");
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    let mut param_idx = 1;

    if let Some(kind) = filter.kind {
        sql.push_str(&format!(" AND kind = ?{param_idx}"));
        params_vec.push(Box::new(kind));
        param_idx += 1;
    }

    if let Some(status) = filter.status {
        sql.push_str(&format!(" AND status = ?{param_idx}"));
        params_vec.push(Box::new(status));
        param_idx += 1;
    }

    if let Some(ref assigned_to) = filter.assigned_to {
        sql.push_str(&format!(" AND assigned_to = ?{param_idx}"));
        params_vec.push(Box::new(assigned_to.clone()));
        param_idx += 1;
    }

    if let Some(due_date) = filter.due_date {
        sql.push_str(&format!(" AND due_date = ?{param_idx}"));
        params_vec.push(Box::new(due_date.to_string()));
        param_idx += 1;
    }

    if let Some(priority) = filter.priority {
        sql.push_str(&format!(" AND priority = ?{param_idx}"));
        params_vec.push(Box::new(priority));
    }

    sql.push_str(" ORDER BY created_at ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let tasks = stmt
        .query_map(params_refs.as_slice(), row_to_task)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    Ok(tasks)
}

/// Tasks due on the given date or already completed, for the daily digest.
pub fn list_due_or_completed(conn: &Connection, date: chrono::NaiveDate) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks
         WHERE lifecycle = 'Active' AND (due_date = ?1 OR status = 'Completed')
         ORDER BY created_at ASC, id ASC",
    )?;
    let tasks = stmt
        .query_map(params![date.to_string()], row_to_task)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    Ok(tasks)
}

pub fn list_trashed(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE lifecycle = 'Trashed' ORDER BY trashed_at ASC, id ASC",
    )?;
    let tasks = stmt
        .query_map([], row_to_task)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    Ok(tasks)
}

pub fn trash_task(conn: &Connection, id: &TaskId) -> Result<Task> {
    let task = find_by_id_any(conn, id)?.ok_or_else(|| TfError::TaskNotFound(id.clone()))?;
    if task.lifecycle != LifecycleState::Active {
        return Err(TfError::InvalidLifecycle {
            state: task.lifecycle,
            action: LifecycleAction::Trash,
        });
    }

    let now_str = now().to_rfc3339();
    conn.execute(
        "UPDATE tasks SET lifecycle = 'Trashed', trashed_at = ?1, updated_at = ?1, version = version + 1 WHERE id = ?2",
        params![now_str, id],
    )?;
    find_by_id_any(conn, id)?.ok_or_else(|| TfError::TaskNotFound(id.clone()))
}

pub fn restore_task(conn: &Connection, id: &TaskId) -> Result<Task> {
    let task = find_by_id_any(conn, id)?.ok_or_else(|| TfError::TaskNotFound(id.clone()))?;
    if task.lifecycle != LifecycleState::Trashed {
        return Err(TfError::InvalidLifecycle {
            state: task.lifecycle,
            action: LifecycleAction::Restore,
        });
    }

    let now_str = now().to_rfc3339();
    conn.execute(
        "UPDATE tasks SET lifecycle = 'Active', trashed_at = NULL, updated_at = ?1, version = version + 1 WHERE id = ?2",
        params![now_str, id],
    )?;
    find_by_id(conn, id)?.ok_or_else(|| TfError::TaskNotFound(id.clone()))
}

/// Hard delete. Terminal: the row is gone and cannot be restored.
/// Dependency edges where this task is the dependent side cascade away;
/// edges pointing at it as a prerequisite are kept (vanished targets
/// still block) and the audit trail is never touched.
pub fn purge_task(conn: &Connection, id: &TaskId) -> Result<()> {
    let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(TfError::TaskNotFound(id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::types::{TaskKind, TaskPriority};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn make_task(conn: &Connection, title: &str) -> Task {
        create_task(
            conn,
            &CreateTaskInput {
                title: title.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn create_defaults() {
        let conn = setup_db();
        let task = make_task(&conn, "Fix login");
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.lifecycle, LifecycleState::Active);
        assert_eq!(task.version, 0);
        assert!(task.trashed_at.is_none());
    }

    #[test]
    fn versioned_write_rejects_stale_snapshot() {
        let conn = setup_db();
        let task = make_task(&conn, "Contended");

        // Intervening write bumps the version
        update_task(
            &conn,
            &task.id,
            &UpdateTaskInput {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let stale = set_status_versioned(&conn, &task.id, TaskStatus::InProgress, task.version)
            .unwrap();
        assert!(!stale);

        let fresh = find_by_id(&conn, &task.id).unwrap().unwrap();
        let ok = set_status_versioned(&conn, &task.id, TaskStatus::InProgress, fresh.version)
            .unwrap();
        assert!(ok);
        let task = find_by_id(&conn, &task.id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn trash_restore_purge_state_machine() {
        let conn = setup_db();
        let task = make_task(&conn, "Ephemeral");

        // Restore requires Trashed
        assert!(matches!(
            restore_task(&conn, &task.id),
            Err(TfError::InvalidLifecycle { .. })
        ));

        let trashed = trash_task(&conn, &task.id).unwrap();
        assert_eq!(trashed.lifecycle, LifecycleState::Trashed);
        assert!(trashed.trashed_at.is_some());

        // Trashed is absent from the default lookup, present to _any
        assert!(find_by_id(&conn, &task.id).unwrap().is_none());
        assert!(find_by_id_any(&conn, &task.id).unwrap().is_some());

        // Double-trash is rejected
        assert!(matches!(
            trash_task(&conn, &task.id),
            Err(TfError::InvalidLifecycle { .. })
        ));

        let restored = restore_task(&conn, &task.id).unwrap();
        assert_eq!(restored.lifecycle, LifecycleState::Active);
        assert!(restored.trashed_at.is_none());

        purge_task(&conn, &task.id).unwrap();
        assert!(find_by_id_any(&conn, &task.id).unwrap().is_none());
        assert!(matches!(
            purge_task(&conn, &task.id),
            Err(TfError::TaskNotFound(_))
        ));
    }

    #[test]
    fn filter_combines_predicates() {
        let conn = setup_db();
        let bug = create_task(
            &conn,
            &CreateTaskInput {
                title: "Crash on save".to_string(),
                kind: TaskKind::Bug,
                priority: TaskPriority::High,
                ..Default::default()
            },
        )
        .unwrap();
        create_task(
            &conn,
            &CreateTaskInput {
                title: "Dark mode".to_string(),
                kind: TaskKind::Feature,
                priority: TaskPriority::High,
                ..Default::default()
            },
        )
        .unwrap();

        let hits = list_filtered(
            &conn,
            &TaskFilter {
                kind: Some(TaskKind::Bug),
                priority: Some(TaskPriority::High),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, bug.id);
    }

    #[test]
    fn filter_excludes_trashed() {
        let conn = setup_db();
        let task = make_task(&conn, "Gone soon");
        trash_task(&conn, &task.id).unwrap();

        assert!(list_filtered(&conn, &TaskFilter::default())
            .unwrap()
            .is_empty());
        assert_eq!(list_trashed(&conn).unwrap().len(), 1);
    }
}
