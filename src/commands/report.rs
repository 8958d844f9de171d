use chrono::NaiveDate;
use clap::{Args, Subcommand};
use rusqlite::Connection;

use crate::core::report;
use crate::core::DailyDigest;
use crate::error::Result;
use crate::id::UserId;
use crate::types::{Task, TaskFilter, TaskKind, TaskPriority, TaskStatus};

fn parse_user_id(s: &str) -> std::result::Result<UserId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Subcommand, Clone)]
pub enum ReportCommand {
    /// Digest of tasks due today (or on --date) plus completed tasks
    Daily {
        /// Digest date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Filtered task report
    Tasks(TasksArgs),
}

#[derive(Args, Clone)]
pub struct TasksArgs {
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
}

pub enum ReportResult {
    Daily(DailyDigest),
    Tasks(Vec<Task>),
}

pub fn handle(conn: &Connection, cmd: ReportCommand) -> Result<ReportResult> {
    match cmd {
        ReportCommand::Daily { date } => {
            let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
            Ok(ReportResult::Daily(report::daily_digest(conn, date)?))
        }

        ReportCommand::Tasks(args) => {
            let filter = TaskFilter {
                kind: args.kind,
                status: args.status,
                assigned_to: args.assigned_to,
                due_date: args.due,
                priority: args.priority,
            };
            Ok(ReportResult::Tasks(report::filtered_report(conn, &filter)?))
        }
    }
}
