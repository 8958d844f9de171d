use std::path::Path;

use rusqlite::Connection;
use tracing::info;

use crate::core::status_engine;
use crate::db::{attachment_repo, comment_repo, dependency_repo, task_repo, user_repo};
use crate::error::{Result, TfError};
use crate::id::{TaskId, UserId};
use crate::types::{
    Attachment, Comment, CreateTaskInput, OwnerKind, OwnerRef, Task, TaskDependency, TaskFilter,
    TaskStatus, UpdateTaskInput,
};

/// PDF and Word only, matching the upload policy at the API boundary.
const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

pub struct TaskService<'a> {
    conn: &'a Connection,
}

impl<'a> TaskService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create(&self, input: &CreateTaskInput) -> Result<Task> {
        if let Some(ref user_id) = input.assigned_to {
            if !user_repo::user_exists(self.conn, user_id)? {
                return Err(TfError::UserNotFound(user_id.clone()));
            }
        }
        task_repo::create_task(self.conn, input)
    }

    pub fn get(&self, id: &TaskId) -> Result<Task> {
        task_repo::find_by_id(self.conn, id)?.ok_or_else(|| TfError::TaskNotFound(id.clone()))
    }

    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        task_repo::list_filtered(self.conn, filter)
    }

    /// Partial update over the non-status fields. Status changes go
    /// through the status engine only.
    pub fn update(&self, id: &TaskId, input: &UpdateTaskInput) -> Result<Task> {
        if !task_repo::task_exists(self.conn, id)? {
            return Err(TfError::TaskNotFound(id.clone()));
        }
        if let Some(ref user_id) = input.assigned_to {
            if !user_repo::user_exists(self.conn, user_id)? {
                return Err(TfError::UserNotFound(user_id.clone()));
            }
        }
        task_repo::update_task(self.conn, id, input)
    }

    /// Apply a status change and, when the effective status became
    /// Completed, reopen direct dependents. The completion trigger lives
    /// here at the boundary, not inside the engine.
    pub fn set_status(&self, id: &TaskId, requested: TaskStatus, actor: &UserId) -> Result<Task> {
        let task = status_engine::set_status(self.conn, id, requested, actor)?;
        if task.status == TaskStatus::Completed {
            status_engine::reopen_dependents(self.conn, id, actor)?;
        }
        Ok(task)
    }

    pub fn is_blocked(&self, id: &TaskId) -> Result<bool> {
        status_engine::is_task_blocked(self.conn, id)
    }

    pub fn dependencies(&self, id: &TaskId) -> Result<Vec<TaskDependency>> {
        if !task_repo::task_exists(self.conn, id)? {
            return Err(TfError::TaskNotFound(id.clone()));
        }
        dependency_repo::dependencies_of(self.conn, id)
    }

    pub fn dependents(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        if !task_repo::task_exists(self.conn, id)? {
            return Err(TfError::TaskNotFound(id.clone()));
        }
        dependency_repo::dependents_of(self.conn, id)
    }

    pub fn add_dependency(&self, id: &TaskId, depends_on: &TaskId) -> Result<()> {
        for task_id in [id, depends_on] {
            if !task_repo::task_exists(self.conn, task_id)? {
                return Err(TfError::TaskNotFound(task_id.clone()));
            }
        }
        dependency_repo::add_dependency(self.conn, id, depends_on)
    }

    pub fn remove_dependency(&self, id: &TaskId, depends_on: &TaskId) -> Result<()> {
        dependency_repo::remove_dependency(self.conn, id, depends_on)
    }

    /// Assign (or reassign) a task to a user. Both sides must exist.
    pub fn assign(&self, task_id: &TaskId, user_id: &UserId) -> Result<Task> {
        if !user_repo::user_exists(self.conn, user_id)? {
            return Err(TfError::UserNotFound(user_id.clone()));
        }
        if !task_repo::task_exists(self.conn, task_id)? {
            return Err(TfError::TaskNotFound(task_id.clone()));
        }
        task_repo::update_task(
            self.conn,
            task_id,
            &UpdateTaskInput {
                assigned_to: Some(user_id.clone()),
                ..Default::default()
            },
        )
    }

    /// Attach a comment to its owner. The author is an explicit
    /// parameter, never ambient state.
    pub fn add_comment(&self, owner: &OwnerRef, author: &UserId, body: &str) -> Result<Comment> {
        if !user_repo::user_exists(self.conn, author)? {
            return Err(TfError::UserNotFound(author.clone()));
        }
        self.check_owner_exists(owner)?;
        comment_repo::create_comment(self.conn, owner, author, body)
    }

    pub fn comments(&self, owner: &OwnerRef) -> Result<Vec<Comment>> {
        comment_repo::list_for_owner(self.conn, owner)
    }

    /// Validate and store an uploaded document, then record its metadata.
    /// Bytes land under `<dir>/Attachments/<ulid>.<ext>`; the original
    /// file name is kept only as metadata.
    pub fn store_attachment(
        &self,
        dir: &Path,
        owner: &OwnerRef,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<Attachment> {
        self.check_owner_exists(owner)?;
        validate_attachment_name(file_name)?;

        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(TfError::InvalidAttachment {
                reason: format!("mime type not allowed: {mime_type}"),
            });
        }

        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("bin");
        let stored_name = format!("{}.{}", ulid::Ulid::new(), extension);
        let attachments_dir = dir.join("Attachments");
        std::fs::create_dir_all(&attachments_dir)?;
        std::fs::write(attachments_dir.join(&stored_name), bytes)?;

        let stored_path = format!("Attachments/{stored_name}");
        let attachment =
            attachment_repo::create_attachment(self.conn, owner, file_name, &stored_path, mime_type)?;
        info!(owner = %owner.id, file = file_name, "attachment stored");
        Ok(attachment)
    }

    pub fn attachments(&self, owner: &OwnerRef) -> Result<Vec<Attachment>> {
        attachment_repo::list_for_owner(self.conn, owner)
    }

    fn check_owner_exists(&self, owner: &OwnerRef) -> Result<()> {
        let exists = match owner.kind {
            OwnerKind::Task => {
                let id: TaskId = owner
                    .id
                    .parse()
                    .map_err(|_| TfError::CommentOwnerNotFound(owner.id.clone()))?;
                task_repo::task_exists(self.conn, &id)?
            }
            OwnerKind::User => {
                let id: UserId = owner
                    .id
                    .parse()
                    .map_err(|_| TfError::CommentOwnerNotFound(owner.id.clone()))?;
                user_repo::user_exists(self.conn, &id)?
            }
        };
        if exists {
            Ok(())
        } else {
            Err(TfError::CommentOwnerNotFound(owner.id.clone()))
        }
    }
}

/// Reject path traversal and double extensions in uploaded file names.
fn validate_attachment_name(file_name: &str) -> Result<()> {
    if file_name.is_empty() {
        return Err(TfError::InvalidAttachment {
            reason: "empty file name".to_string(),
        });
    }
    if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
        return Err(TfError::InvalidAttachment {
            reason: "path traversal detected".to_string(),
        });
    }
    if file_name.matches('.').count() > 1 {
        return Err(TfError::InvalidAttachment {
            reason: "double extension not allowed".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation_rejects_traversal() {
        assert!(validate_attachment_name("../etc/passwd").is_err());
        assert!(validate_attachment_name("a/b.pdf").is_err());
        assert!(validate_attachment_name("a\\b.pdf").is_err());
    }

    #[test]
    fn name_validation_rejects_double_extension() {
        assert!(validate_attachment_name("report.pdf.exe").is_err());
    }

    #[test]
    fn name_validation_accepts_plain_names() {
        assert!(validate_attachment_name("report.pdf").is_ok());
        assert!(validate_attachment_name("notes.docx").is_ok());
    }
}
