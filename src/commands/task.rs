use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use rusqlite::Connection;

use crate::core::TaskService;
use crate::db::{audit_repo, task_repo};
use crate::error::{Result, TfError};
use crate::id::{TaskId, UserId};
use crate::types::{
    Attachment, Comment, CreateTaskInput, OwnerRef, Task, TaskDependency, TaskFilter, TaskKind,
    TaskPriority, TaskStatus, TaskStatusUpdate, UpdateTaskInput,
};

/// Parse TaskId from CLI string (requires prefix)
fn parse_task_id(s: &str) -> std::result::Result<TaskId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_user_id(s: &str) -> std::result::Result<UserId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Subcommand, Clone)]
pub enum TaskCommand {
    Create(CreateArgs),
    Get {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    List(ListArgs),
    Update(UpdateArgs),
    /// Request a status change (may be overridden to Blocked)
    Status(StatusArgs),
    /// Show the append-only status audit trail
    History {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Assign(AssignArgs),
    Comment(CommentArgs),
    Comments {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Attach(AttachArgs),
    Attachments {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// Declare a prerequisite: the task cannot complete until --on does
    Depend(DependArgs),
    Undepend(DependArgs),
    Deps {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Dependents {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Blocked {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Trash {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Restore {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// Hard delete - terminal, cannot be restored
    Purge {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    #[arg(short = 't', long)]
    pub title: String,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long, default_value = "Feature")]
    pub kind: TaskKind,

    #[arg(long, default_value = "Open")]
    pub status: TaskStatus,

    #[arg(long, default_value = "Medium")]
    pub priority: TaskPriority,

    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    pub due: Option<NaiveDate>,

    #[arg(long = "assign", value_parser = parse_user_id)]
    pub assigned_to: Option<UserId>,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    #[arg(long)]
    pub kind: Option<TaskKind>,

    #[arg(long)]
    pub status: Option<TaskStatus>,

    #[arg(long = "assignee", value_parser = parse_user_id)]
    pub assigned_to: Option<UserId>,

    #[arg(long)]
    pub due: Option<NaiveDate>,

    #[arg(long)]
    pub priority: Option<TaskPriority>,

    /// Show trashed tasks instead
    #[arg(long, conflicts_with_all = ["kind", "status", "assigned_to", "due", "priority"])]
    pub trashed: bool,
}

#[derive(Args, Clone)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    #[arg(short = 't', long)]
    pub title: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(long)]
    pub kind: Option<TaskKind>,

    #[arg(long)]
    pub priority: Option<TaskPriority>,

    #[arg(long)]
    pub due: Option<NaiveDate>,

    #[arg(long = "assign", value_parser = parse_user_id)]
    pub assigned_to: Option<UserId>,
}

#[derive(Args, Clone)]
pub struct StatusArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    pub status: TaskStatus,

    /// User recorded in the audit trail
    #[arg(long, value_parser = parse_user_id)]
    pub actor: UserId,
}

#[derive(Args, Clone)]
pub struct AssignArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    #[arg(value_parser = parse_user_id)]
    pub user: UserId,
}

#[derive(Args, Clone)]
pub struct CommentArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    #[arg(short = 'm', long)]
    pub message: String,

    #[arg(long, value_parser = parse_user_id)]
    pub actor: UserId,
}

#[derive(Args, Clone)]
pub struct AttachArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    /// File to attach (PDF or Word)
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long)]
    pub mime: String,
}

#[derive(Args, Clone)]
pub struct DependArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    #[arg(long, value_parser = parse_task_id)]
    pub on: TaskId,
}

pub enum TaskResult {
    One(Task),
    Many(Vec<Task>),
    Blocked(bool),
    Deps(Vec<TaskDependency>),
    Dependents(Vec<TaskId>),
    History(Vec<TaskStatusUpdate>),
    Comment(Comment),
    Comments(Vec<Comment>),
    Attachment(Attachment),
    Attachments(Vec<Attachment>),
    Purged,
}

/// Handle a task subcommand. `data_dir` is where attachment bytes land.
pub fn handle(conn: &Connection, data_dir: &std::path::Path, cmd: TaskCommand) -> Result<TaskResult> {
    let svc = TaskService::new(conn);

    match cmd {
        TaskCommand::Create(args) => {
            let input = CreateTaskInput {
                title: args.title,
                description: args.description,
                kind: args.kind,
                status: args.status,
                priority: args.priority,
                due_date: args.due,
                assigned_to: args.assigned_to,
            };
            Ok(TaskResult::One(svc.create(&input)?))
        }

        TaskCommand::Get { id } => Ok(TaskResult::One(svc.get(&id)?)),

        TaskCommand::List(args) => {
            if args.trashed {
                return Ok(TaskResult::Many(task_repo::list_trashed(conn)?));
            }
            let filter = TaskFilter {
                kind: args.kind,
                status: args.status,
                assigned_to: args.assigned_to,
                due_date: args.due,
                priority: args.priority,
            };
            Ok(TaskResult::Many(svc.list(&filter)?))
        }

        TaskCommand::Update(args) => {
            let input = UpdateTaskInput {
                title: args.title,
                description: args.description,
                kind: args.kind,
                priority: args.priority,
                due_date: args.due,
                assigned_to: args.assigned_to,
            };
            Ok(TaskResult::One(svc.update(&args.id, &input)?))
        }

        TaskCommand::Status(args) => Ok(TaskResult::One(svc.set_status(
            &args.id,
            args.status,
            &args.actor,
        )?)),

        TaskCommand::History { id } => Ok(TaskResult::History(audit_repo::list_status_updates(
            conn, &id,
        )?)),

        TaskCommand::Assign(args) => Ok(TaskResult::One(svc.assign(&args.id, &args.user)?)),

        TaskCommand::Comment(args) => Ok(TaskResult::Comment(svc.add_comment(
            &OwnerRef::task(&args.id),
            &args.actor,
            &args.message,
        )?)),

        TaskCommand::Comments { id } => {
            Ok(TaskResult::Comments(svc.comments(&OwnerRef::task(&id))?))
        }

        TaskCommand::Attach(args) => {
            let file_name = args
                .file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| TfError::InvalidAttachment {
                    reason: "no file name".to_string(),
                })?;
            let bytes = std::fs::read(&args.file)?;
            Ok(TaskResult::Attachment(svc.store_attachment(
                data_dir,
                &OwnerRef::task(&args.id),
                &file_name,
                &args.mime,
                &bytes,
            )?))
        }

        TaskCommand::Attachments { id } => {
            Ok(TaskResult::Attachments(svc.attachments(&OwnerRef::task(&id))?))
        }

        TaskCommand::Depend(args) => {
            svc.add_dependency(&args.id, &args.on)?;
            Ok(TaskResult::One(svc.get(&args.id)?))
        }

        TaskCommand::Undepend(args) => {
            svc.remove_dependency(&args.id, &args.on)?;
            Ok(TaskResult::One(svc.get(&args.id)?))
        }

        TaskCommand::Deps { id } => Ok(TaskResult::Deps(svc.dependencies(&id)?)),

        TaskCommand::Dependents { id } => Ok(TaskResult::Dependents(svc.dependents(&id)?)),

        TaskCommand::Blocked { id } => Ok(TaskResult::Blocked(svc.is_blocked(&id)?)),

        TaskCommand::Trash { id } => Ok(TaskResult::One(task_repo::trash_task(conn, &id)?)),

        TaskCommand::Restore { id } => Ok(TaskResult::One(task_repo::restore_task(conn, &id)?)),

        TaskCommand::Purge { id } => {
            task_repo::purge_task(conn, &id)?;
            Ok(TaskResult::Purged)
        }
    }
}
