use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, TfError};
use crate::id::UserId;
use crate::types::{LifecycleAction, LifecycleState, User};

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| now())
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        lifecycle: row.get("lifecycle")?,
        trashed_at: row
            .get::<_, Option<String>>("trashed_at")?
            .map(parse_ts),
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

pub fn create_user(conn: &Connection, name: &str, email: &str) -> Result<User> {
    let id = UserId::new();
    let now_str = now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (id, name, email, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![&id, name, email, now_str],
    )?;
    find_by_id(conn, &id)?.ok_or_else(|| TfError::UserNotFound(id))
}

pub fn find_by_id(conn: &Connection, id: &UserId) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT * FROM users WHERE id = ?1 AND lifecycle = 'Active'",
            params![id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_id_any(conn: &Connection, id: &UserId) -> Result<Option<User>> {
    let user = conn
        .query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
        .optional()?;
    Ok(user)
}

pub fn user_exists(conn: &Connection, id: &UserId) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE id = ?1 AND lifecycle = 'Active'",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn
        .prepare("SELECT * FROM users WHERE lifecycle = 'Active' ORDER BY created_at ASC, id ASC")?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<rusqlite::Result<Vec<User>>>()?;
    Ok(users)
}

pub fn list_trashed(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM users WHERE lifecycle = 'Trashed' ORDER BY trashed_at ASC, id ASC",
    )?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<rusqlite::Result<Vec<User>>>()?;
    Ok(users)
}

pub fn trash_user(conn: &Connection, id: &UserId) -> Result<User> {
    let user = find_by_id_any(conn, id)?.ok_or_else(|| TfError::UserNotFound(id.clone()))?;
    if user.lifecycle != LifecycleState::Active {
        return Err(TfError::InvalidLifecycle {
            state: user.lifecycle,
            action: LifecycleAction::Trash,
        });
    }
    let now_str = now().to_rfc3339();
    conn.execute(
        "UPDATE users SET lifecycle = 'Trashed', trashed_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now_str, id],
    )?;
    find_by_id_any(conn, id)?.ok_or_else(|| TfError::UserNotFound(id.clone()))
}

pub fn restore_user(conn: &Connection, id: &UserId) -> Result<User> {
    let user = find_by_id_any(conn, id)?.ok_or_else(|| TfError::UserNotFound(id.clone()))?;
    if user.lifecycle != LifecycleState::Trashed {
        return Err(TfError::InvalidLifecycle {
            state: user.lifecycle,
            action: LifecycleAction::Restore,
        });
    }
    let now_str = now().to_rfc3339();
    conn.execute(
        "UPDATE users SET lifecycle = 'Active', trashed_at = NULL, updated_at = ?1 WHERE id = ?2",
        params![now_str, id],
    )?;
    find_by_id(conn, id)?.ok_or_else(|| TfError::UserNotFound(id.clone()))
}

pub fn purge_user(conn: &Connection, id: &UserId) -> Result<()> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(TfError::UserNotFound(id.clone()));
    }
    Ok(())
}
