use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::id::{CommentId, UserId};
use crate::types::{Comment, OwnerRef};

fn row_to_comment(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        owner: OwnerRef {
            kind: row.get("owner_kind")?,
            id: row.get("owner_id")?,
        },
        author_id: row.get("author_id")?,
        body: row.get("body")?,
        created_at: row
            .get::<_, String>("created_at")?
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

pub fn create_comment(
    conn: &Connection,
    owner: &OwnerRef,
    author_id: &UserId,
    body: &str,
) -> Result<Comment> {
    let id = CommentId::new();
    conn.execute(
        "INSERT INTO comments (id, owner_kind, owner_id, author_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &id,
            owner.kind,
            owner.id,
            author_id,
            body,
            Utc::now().to_rfc3339()
        ],
    )?;

    let comment = conn.query_row(
        "SELECT * FROM comments WHERE id = ?1",
        params![&id],
        row_to_comment,
    )?;
    Ok(comment)
}

pub fn list_for_owner(conn: &Connection, owner: &OwnerRef) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM comments WHERE owner_kind = ?1 AND owner_id = ?2
         ORDER BY created_at ASC, id ASC",
    )?;
    let comments = stmt
        .query_map(params![owner.kind, owner.id], row_to_comment)?
        .collect::<rusqlite::Result<Vec<Comment>>>()?;
    Ok(comments)
}
