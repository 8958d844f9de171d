use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::id::AttachmentId;
use crate::types::{Attachment, OwnerRef};

fn row_to_attachment(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get("id")?,
        owner: OwnerRef {
            kind: row.get("owner_kind")?,
            id: row.get("owner_id")?,
        },
        file_name: row.get("file_name")?,
        stored_path: row.get("stored_path")?,
        mime_type: row.get("mime_type")?,
        created_at: row
            .get::<_, String>("created_at")?
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

pub fn create_attachment(
    conn: &Connection,
    owner: &OwnerRef,
    file_name: &str,
    stored_path: &str,
    mime_type: &str,
) -> Result<Attachment> {
    let id = AttachmentId::new();
    conn.execute(
        "INSERT INTO attachments (id, owner_kind, owner_id, file_name, stored_path, mime_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            owner.kind,
            owner.id,
            file_name,
            stored_path,
            mime_type,
            Utc::now().to_rfc3339()
        ],
    )?;

    let attachment = conn.query_row(
        "SELECT * FROM attachments WHERE id = ?1",
        params![&id],
        row_to_attachment,
    )?;
    Ok(attachment)
}

pub fn list_for_owner(conn: &Connection, owner: &OwnerRef) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM attachments WHERE owner_kind = ?1 AND owner_id = ?2
         ORDER BY created_at ASC, id ASC",
    )?;
    let attachments = stmt
        .query_map(params![owner.kind, owner.id], row_to_attachment)?
        .collect::<rusqlite::Result<Vec<Attachment>>>()?;
    Ok(attachments)
}
