//! Status transition engine and blocking evaluator.
//!
//! A task's status interacts with the directed dependency graph in two
//! ways: a requested status is overridden to `Blocked` while any direct
//! prerequisite is incomplete, and a transition into `Completed` lets the
//! caller reopen direct dependents whose prerequisites are now all done.
//! The reopen cascade is intentionally one hop deep: a dependent flipping
//! to `Open` is not a completion, so it triggers nothing further.

use rusqlite::Connection;
use tracing::{debug, error};

use crate::db::{audit_repo, dependency_repo, task_repo};
use crate::error::{CascadeFailure, Result, TfError};
use crate::id::{TaskId, UserId};
use crate::types::{Task, TaskStatus};

/// Attempts before giving up on the optimistic version check. Contention
/// on a single task row is expected to be rare and short-lived.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// True iff at least one direct prerequisite has status != Completed.
/// Prerequisites that are trashed or purged while the edge remains still
/// block; only removing the edge clears them.
pub fn is_blocked(conn: &Connection, task_id: &TaskId) -> Result<bool> {
    for edge in dependency_repo::dependencies_of(conn, task_id)? {
        if !task_repo::is_task_completed(conn, &edge.depends_on_task_id)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Read-only blocking check for an existing task. Trashed tasks are not
/// visible here and report NotFound like everywhere else.
pub fn is_task_blocked(conn: &Connection, task_id: &TaskId) -> Result<bool> {
    if !task_repo::task_exists(conn, task_id)? {
        return Err(TfError::TaskNotFound(task_id.clone()));
    }
    is_blocked(conn, task_id)
}

/// Apply a requested status change.
///
/// The effective status is `Blocked` when the blocking evaluator says so,
/// otherwise the request verbatim - an explicit request for `Blocked`
/// while unblocked is accepted uncorrected. The status write and its
/// audit row land in one transaction, guarded by an optimistic version
/// check; a stale snapshot is re-read and re-evaluated, so the persisted
/// result is always consistent with a single observed snapshot.
pub fn set_status(
    conn: &Connection,
    task_id: &TaskId,
    requested: TaskStatus,
    actor: &UserId,
) -> Result<Task> {
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let task =
            task_repo::find_by_id(conn, task_id)?.ok_or_else(|| TfError::TaskNotFound(task_id.clone()))?;

        let effective = if is_blocked(conn, task_id)? {
            TaskStatus::Blocked
        } else {
            requested
        };

        match write_status(conn, &task, effective, actor) {
            Ok(true) => {
                if effective != requested {
                    debug!(task = %task_id, requested = %requested, "status overridden to Blocked");
                }
                return task_repo::find_by_id(conn, task_id)?
                    .ok_or_else(|| TfError::TaskNotFound(task_id.clone()));
            }
            Ok(false) => continue, // stale version, re-evaluate
            Err(e) => {
                error!(task = %task_id, requested = %requested, error = %e, "status write failed");
                return Err(e);
            }
        }
    }

    Err(TfError::StaleVersion(task_id.clone()))
}

/// One attempt at the transactional write + audit append. Returns false
/// when the version check lost the race; the transaction is rolled back
/// so no audit row exists without its status write.
fn write_status(
    conn: &Connection,
    snapshot: &Task,
    effective: TaskStatus,
    actor: &UserId,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let written =
        task_repo::set_status_versioned(conn, &snapshot.id, effective, snapshot.version)?;
    if !written {
        return Ok(false); // drop of `tx` rolls back
    }
    audit_repo::append_status_update(conn, &snapshot.id, effective, actor)?;
    tx.commit()?;
    Ok(true)
}

/// Reopen direct dependents of a task that just reached `Completed`.
///
/// Invoked by the caller after the effective status became `Completed`;
/// keeping that trigger at the boundary keeps `set_status` a pure
/// per-task operation. Each dependent whose prerequisites are now all
/// complete is set to `Open` unconditionally - there is no memory of the
/// status it held before it was blocked.
///
/// Best-effort: a dependent that fails to update is recorded and the
/// remaining dependents are still processed; the aggregate failure
/// surfaces afterwards. Trashed dependents are not eligible for status
/// changes and are skipped.
pub fn reopen_dependents(conn: &Connection, task_id: &TaskId, actor: &UserId) -> Result<()> {
    let mut failures = Vec::new();

    for dependent_id in dependency_repo::dependents_of(conn, task_id)? {
        match try_reopen(conn, &dependent_id, actor) {
            Ok(()) | Err(TfError::TaskNotFound(_)) => {}
            Err(e) => {
                error!(task = %task_id, dependent = %dependent_id, error = %e, "reopen failed");
                failures.push(CascadeFailure {
                    task_id: dependent_id,
                    message: e.to_string(),
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TfError::CascadeFailed { failures })
    }
}

fn try_reopen(conn: &Connection, dependent_id: &TaskId, actor: &UserId) -> Result<()> {
    if !task_repo::task_exists(conn, dependent_id)? {
        return Err(TfError::TaskNotFound(dependent_id.clone()));
    }
    if is_blocked(conn, dependent_id)? {
        return Ok(()); // another prerequisite is still incomplete
    }
    set_status(conn, dependent_id, TaskStatus::Open, actor)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::types::CreateTaskInput;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init_schema(&conn).unwrap();
        conn
    }

    fn make_task(conn: &Connection, title: &str) -> Task {
        task_repo::create_task(
            conn,
            &CreateTaskInput {
                title: title.to_string(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn no_dependencies_never_blocked() {
        let conn = setup_db();
        let task = make_task(&conn, "Standalone");
        assert!(!is_task_blocked(&conn, &task.id).unwrap());
    }

    #[test]
    fn incomplete_dependency_blocks() {
        let conn = setup_db();
        let prereq = make_task(&conn, "Prereq");
        let task = make_task(&conn, "Dependent");
        dependency_repo::add_dependency(&conn, &task.id, &prereq.id).unwrap();

        assert!(is_task_blocked(&conn, &task.id).unwrap());

        let actor = UserId::new();
        set_status(&conn, &prereq.id, TaskStatus::Completed, &actor).unwrap();
        assert!(!is_task_blocked(&conn, &task.id).unwrap());
    }

    #[test]
    fn vanished_prerequisite_still_blocks() {
        let conn = setup_db();
        let prereq = make_task(&conn, "Prereq");
        let task = make_task(&conn, "Dependent");
        dependency_repo::add_dependency(&conn, &task.id, &prereq.id).unwrap();

        // Purging the prerequisite leaves the edge behind; the vanished
        // target satisfies "not Completed" and keeps blocking.
        task_repo::purge_task(&conn, &prereq.id).unwrap();
        assert!(is_task_blocked(&conn, &task.id).unwrap());

        // Only removing the edge itself clears the block.
        dependency_repo::remove_dependency(&conn, &task.id, &prereq.id).unwrap();
        assert!(!is_task_blocked(&conn, &task.id).unwrap());
    }

    #[test]
    fn trashed_prerequisite_still_blocks() {
        let conn = setup_db();
        let prereq = make_task(&conn, "Prereq");
        let task = make_task(&conn, "Dependent");
        dependency_repo::add_dependency(&conn, &task.id, &prereq.id).unwrap();

        let actor = UserId::new();
        set_status(&conn, &prereq.id, TaskStatus::Completed, &actor).unwrap();
        assert!(!is_task_blocked(&conn, &task.id).unwrap());

        task_repo::trash_task(&conn, &prereq.id).unwrap();
        assert!(is_task_blocked(&conn, &task.id).unwrap());
    }

    #[test]
    fn requested_status_overridden_to_blocked_and_audited() {
        let conn = setup_db();
        let prereq = make_task(&conn, "Prereq");
        let task = make_task(&conn, "Dependent");
        dependency_repo::add_dependency(&conn, &task.id, &prereq.id).unwrap();

        let actor = UserId::new();
        let updated = set_status(&conn, &task.id, TaskStatus::Open, &actor).unwrap();
        assert_eq!(updated.status, TaskStatus::Blocked);

        // The audit row records the effective status, not the request.
        let latest = audit_repo::latest_status_update(&conn, &task.id)
            .unwrap()
            .unwrap();
        assert_eq!(latest.status, TaskStatus::Blocked);
        assert_eq!(latest.updated_by, actor);
    }

    #[test]
    fn explicit_blocked_request_accepted_when_unblocked() {
        let conn = setup_db();
        let task = make_task(&conn, "Self-declared");
        let actor = UserId::new();

        let updated = set_status(&conn, &task.id, TaskStatus::Blocked, &actor).unwrap();
        assert_eq!(updated.status, TaskStatus::Blocked);
    }

    #[test]
    fn set_status_idempotent_but_each_call_audited() {
        let conn = setup_db();
        let task = make_task(&conn, "Repeat");
        let actor = UserId::new();

        set_status(&conn, &task.id, TaskStatus::InProgress, &actor).unwrap();
        let second = set_status(&conn, &task.id, TaskStatus::InProgress, &actor).unwrap();
        assert_eq!(second.status, TaskStatus::InProgress);

        let trail = audit_repo::list_status_updates(&conn, &task.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].status, trail[1].status);
    }

    #[test]
    fn trashed_task_not_eligible_for_status_change() {
        let conn = setup_db();
        let task = make_task(&conn, "Trashed");
        task_repo::trash_task(&conn, &task.id).unwrap();

        let actor = UserId::new();
        let result = set_status(&conn, &task.id, TaskStatus::InProgress, &actor);
        assert!(matches!(result, Err(TfError::TaskNotFound(_))));
    }

    #[test]
    fn completion_reopens_all_unblocked_dependents() {
        let conn = setup_db();
        let a = make_task(&conn, "A");
        let b = make_task(&conn, "B");
        let c = make_task(&conn, "C");
        dependency_repo::add_dependency(&conn, &b.id, &a.id).unwrap();
        dependency_repo::add_dependency(&conn, &c.id, &a.id).unwrap();

        let actor = UserId::new();
        set_status(&conn, &b.id, TaskStatus::Open, &actor).unwrap();
        set_status(&conn, &c.id, TaskStatus::Open, &actor).unwrap();
        assert_eq!(
            task_repo::find_by_id(&conn, &b.id).unwrap().unwrap().status,
            TaskStatus::Blocked
        );

        let done = set_status(&conn, &a.id, TaskStatus::Completed, &actor).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        reopen_dependents(&conn, &a.id, &actor).unwrap();

        for id in [&b.id, &c.id] {
            assert_eq!(
                task_repo::find_by_id(&conn, id).unwrap().unwrap().status,
                TaskStatus::Open
            );
        }
    }

    #[test]
    fn dependent_with_second_incomplete_prerequisite_stays_blocked() {
        let conn = setup_db();
        let a = make_task(&conn, "A");
        let d = make_task(&conn, "D");
        let b = make_task(&conn, "B");
        dependency_repo::add_dependency(&conn, &b.id, &a.id).unwrap();
        dependency_repo::add_dependency(&conn, &b.id, &d.id).unwrap();

        let actor = UserId::new();
        set_status(&conn, &b.id, TaskStatus::Open, &actor).unwrap();

        set_status(&conn, &a.id, TaskStatus::Completed, &actor).unwrap();
        reopen_dependents(&conn, &a.id, &actor).unwrap();

        assert_eq!(
            task_repo::find_by_id(&conn, &b.id).unwrap().unwrap().status,
            TaskStatus::Blocked
        );

        set_status(&conn, &d.id, TaskStatus::Completed, &actor).unwrap();
        reopen_dependents(&conn, &d.id, &actor).unwrap();
        assert_eq!(
            task_repo::find_by_id(&conn, &b.id).unwrap().unwrap().status,
            TaskStatus::Open
        );
    }

    #[test]
    fn reopen_cascade_is_shallow() {
        let conn = setup_db();
        let a = make_task(&conn, "A");
        let b = make_task(&conn, "B");
        let c = make_task(&conn, "C");
        dependency_repo::add_dependency(&conn, &b.id, &a.id).unwrap();
        dependency_repo::add_dependency(&conn, &c.id, &b.id).unwrap();

        let actor = UserId::new();
        set_status(&conn, &b.id, TaskStatus::Open, &actor).unwrap();
        set_status(&conn, &c.id, TaskStatus::Open, &actor).unwrap();
        let c_before = task_repo::find_by_id(&conn, &c.id).unwrap().unwrap();
        assert_eq!(c_before.status, TaskStatus::Blocked);

        set_status(&conn, &a.id, TaskStatus::Completed, &actor).unwrap();
        reopen_dependents(&conn, &a.id, &actor).unwrap();

        // B reopened, but B becoming Open is not a completion: C keeps
        // whatever state it had, untouched by this call.
        assert_eq!(
            task_repo::find_by_id(&conn, &b.id).unwrap().unwrap().status,
            TaskStatus::Open
        );
        let c_after = task_repo::find_by_id(&conn, &c.id).unwrap().unwrap();
        assert_eq!(c_after.status, TaskStatus::Blocked);
        assert_eq!(c_after.version, c_before.version);
    }

    #[test]
    fn reopen_skips_trashed_dependents() {
        let conn = setup_db();
        let a = make_task(&conn, "A");
        let b = make_task(&conn, "B");
        dependency_repo::add_dependency(&conn, &b.id, &a.id).unwrap();
        task_repo::trash_task(&conn, &b.id).unwrap();

        let actor = UserId::new();
        set_status(&conn, &a.id, TaskStatus::Completed, &actor).unwrap();
        reopen_dependents(&conn, &a.id, &actor).unwrap();

        let b_row = task_repo::find_by_id_any(&conn, &b.id).unwrap().unwrap();
        assert_eq!(b_row.status, TaskStatus::Open); // untouched
    }

    #[test]
    fn failing_dependent_is_reported_not_swallowed() {
        let conn = setup_db();
        let a = make_task(&conn, "A");
        let b = make_task(&conn, "B");
        dependency_repo::add_dependency(&conn, &b.id, &a.id).unwrap();

        let actor = UserId::new();
        set_status(&conn, &a.id, TaskStatus::Completed, &actor).unwrap();

        // Break the audit table so the dependent's write fails mid-cascade
        conn.execute_batch("ALTER TABLE task_status_updates RENAME TO task_status_updates_gone;")
            .unwrap();

        let result = reopen_dependents(&conn, &a.id, &actor);
        match result {
            Err(TfError::CascadeFailed { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].task_id, b.id);
            }
            other => panic!("expected CascadeFailed, got {other:?}"),
        }

        // The failed write rolled back: no partial status landed on B
        let b_row = task_repo::find_by_id(&conn, &b.id).unwrap().unwrap();
        assert_eq!(b_row.status, TaskStatus::Open);
        assert_eq!(b_row.version, b.version);
    }

    #[test]
    fn stale_snapshot_retries_against_fresh_row() {
        let conn = setup_db();
        let task = make_task(&conn, "Contended");
        let actor = UserId::new();

        // Simulate an interleaved writer bumping the version after our
        // snapshot was taken: the first versioned write loses, and the
        // engine re-reads before persisting.
        let snapshot = task_repo::find_by_id(&conn, &task.id).unwrap().unwrap();
        set_status(&conn, &task.id, TaskStatus::InProgress, &actor).unwrap();
        assert!(!task_repo::set_status_versioned(
            &conn,
            &task.id,
            TaskStatus::Open,
            snapshot.version
        )
        .unwrap());

        let updated = set_status(&conn, &task.id, TaskStatus::Completed, &actor).unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        assert!(updated.version > snapshot.version);
    }
}
