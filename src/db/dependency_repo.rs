//! Dependency Graph Accessor: persisted directed edges
//! `(task_id, depends_on_task_id)`. Pure edge storage; blocking semantics
//! live in the status engine.

use std::collections::HashSet;

use rusqlite::{params, Connection};

use crate::error::{Result, TfError};
use crate::id::TaskId;
use crate::types::TaskDependency;

/// All edges where `task_id` is the dependent side.
pub fn dependencies_of(conn: &Connection, task_id: &TaskId) -> Result<Vec<TaskDependency>> {
    let mut stmt = conn.prepare(
        "SELECT task_id, depends_on_task_id FROM task_dependencies WHERE task_id = ?1",
    )?;
    let edges = stmt
        .query_map(params![task_id], |row| {
            Ok(TaskDependency {
                task_id: row.get(0)?,
                depends_on_task_id: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<TaskDependency>>>()?;
    Ok(edges)
}

/// All tasks that declare `task_id` as a prerequisite (reverse edges).
pub fn dependents_of(conn: &Connection, task_id: &TaskId) -> Result<Vec<TaskId>> {
    let mut stmt =
        conn.prepare("SELECT task_id FROM task_dependencies WHERE depends_on_task_id = ?1")?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<TaskId>>>()?;
    Ok(ids)
}

/// Insert an edge. Idempotent on duplicates. Self-loops and cycles are
/// rejected up front: a cycle would make the blocking check permanently
/// true with no path to resolution.
pub fn add_dependency(conn: &Connection, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
    if task_id == depends_on {
        return Err(TfError::SelfDependency(task_id.clone()));
    }

    if would_create_cycle(conn, task_id, depends_on)? {
        return Err(TfError::DependencyCycle {
            task_id: task_id.clone(),
            depends_on: depends_on.clone(),
        });
    }

    conn.execute(
        "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_task_id) VALUES (?1, ?2)",
        params![task_id, depends_on],
    )?;
    Ok(())
}

pub fn remove_dependency(conn: &Connection, task_id: &TaskId, depends_on: &TaskId) -> Result<()> {
    conn.execute(
        "DELETE FROM task_dependencies WHERE task_id = ?1 AND depends_on_task_id = ?2",
        params![task_id, depends_on],
    )?;
    Ok(())
}

/// DFS from the proposed prerequisite along existing edges; a path back
/// to `task_id` means the new edge would close a cycle.
fn would_create_cycle(conn: &Connection, task_id: &TaskId, depends_on: &TaskId) -> Result<bool> {
    let mut visited = HashSet::new();
    let mut stack = vec![depends_on.clone()];

    while let Some(current) = stack.pop() {
        if &current == task_id {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        for edge in dependencies_of(conn, &current)? {
            stack.push(edge.depends_on_task_id);
        }
    }

    Ok(false)
}
