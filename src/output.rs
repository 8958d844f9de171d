use std::io::IsTerminal;

use owo_colors::{OwoColorize, Style};

use crate::commands::{ReportCommand, TaskCommand, UserCommand};
use crate::core::DailyDigest;
use crate::id::TaskId;
use crate::types::{
    Attachment, Comment, Task, TaskDependency, TaskPriority, TaskStatus, TaskStatusUpdate, User,
};
use crate::Command;

/// Color policy: --no-color > NO_COLOR env > TERM=dumb > !isatty > default (color)
fn should_use_color_for(
    no_color_flag: bool,
    no_color_env: bool,
    term_dumb: bool,
    is_tty: bool,
) -> bool {
    if no_color_flag || no_color_env || term_dumb {
        return false;
    }
    is_tty
}

fn env_disables_color() -> (bool, bool) {
    (
        std::env::var("NO_COLOR").is_ok(),
        std::env::var("TERM").ok().as_deref() == Some("dumb"),
    )
}

fn should_use_color(no_color_flag: bool) -> bool {
    let (no_color_env, term_dumb) = env_disables_color();
    should_use_color_for(
        no_color_flag,
        no_color_env,
        term_dumb,
        std::io::stdout().is_terminal(),
    )
}

fn should_use_color_stderr(no_color_flag: bool) -> bool {
    let (no_color_env, term_dumb) = env_disables_color();
    should_use_color_for(
        no_color_flag,
        no_color_env,
        term_dumb,
        std::io::stderr().is_terminal(),
    )
}

struct Colors {
    id: Style,
    open: Style,
    in_progress: Style,
    completed: Style,
    blocked: Style,
    priority_high: Style,
    priority_med: Style,
    error: Style,
}

impl Colors {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                id: Style::new().cyan().dimmed(),
                open: Style::new().yellow(),
                in_progress: Style::new().cyan(),
                completed: Style::new().green(),
                blocked: Style::new().red(),
                priority_high: Style::new().red(),
                priority_med: Style::new().yellow(),
                error: Style::new().red().bold(),
            }
        } else {
            // No-op styles when color disabled
            Self {
                id: Style::new(),
                open: Style::new(),
                in_progress: Style::new(),
                completed: Style::new(),
                blocked: Style::new(),
                priority_high: Style::new(),
                priority_med: Style::new(),
                error: Style::new(),
            }
        }
    }
}

/// Handles human-readable CLI output.
pub struct Printer {
    colors: Colors,
}

impl Printer {
    pub fn new(no_color_flag: bool) -> Self {
        Self {
            colors: Colors::new(should_use_color(no_color_flag)),
        }
    }

    pub fn new_for_stderr(no_color_flag: bool) -> Self {
        Self {
            colors: Colors::new(should_use_color_stderr(no_color_flag)),
        }
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}", message.style(self.colors.error));
    }

    fn fmt_id(&self, id: &impl std::fmt::Display) -> String {
        format!("{}", id.to_string().style(self.colors.id))
    }

    fn status_style(&self, status: TaskStatus) -> Style {
        match status {
            TaskStatus::Open => self.colors.open,
            TaskStatus::InProgress => self.colors.in_progress,
            TaskStatus::Completed => self.colors.completed,
            TaskStatus::Blocked => self.colors.blocked,
        }
    }

    fn status_symbol(status: TaskStatus) -> &'static str {
        match status {
            TaskStatus::Open => "○",
            TaskStatus::InProgress => "◐",
            TaskStatus::Completed => "✓",
            TaskStatus::Blocked => "⊘",
        }
    }

    fn priority_style(&self, priority: TaskPriority) -> Style {
        match priority {
            TaskPriority::High => self.colors.priority_high,
            TaskPriority::Medium => self.colors.priority_med,
            TaskPriority::Low => Style::new(),
        }
    }

    pub fn print(&self, command: &Command, output: &str) {
        match command {
            Command::Init => println!("Initialized taskforge database"),
            Command::Task(TaskCommand::List(_)) => self.print_task_list(output),
            Command::Task(TaskCommand::Blocked { .. }) => self.print_blocked(output),
            Command::Task(TaskCommand::Deps { .. }) => self.print_deps(output),
            Command::Task(TaskCommand::Dependents { .. }) => self.print_dependents(output),
            Command::Task(TaskCommand::History { .. }) => self.print_history(output),
            Command::Task(TaskCommand::Comment(_)) => self.print_comment(output),
            Command::Task(TaskCommand::Comments { .. }) => self.print_comments(output),
            Command::Task(TaskCommand::Attach(_)) => self.print_attachment(output),
            Command::Task(TaskCommand::Attachments { .. }) => self.print_attachments(output),
            Command::Task(TaskCommand::Purge { .. }) => println!("Task purged"),
            Command::Task(_) => self.print_task(output),
            Command::User(UserCommand::List { .. }) => self.print_user_list(output),
            Command::User(UserCommand::Purge { .. }) => println!("User purged"),
            Command::User(_) => self.print_user(output),
            Command::Report(ReportCommand::Daily { .. }) => self.print_digest(output),
            Command::Report(ReportCommand::Tasks(_)) => self.print_task_list(output),
            // PRECONDITION: Completions handled in main() before print() is called
            Command::Completions { .. } => unreachable!("completions handled before print()"),
        }
    }

    fn print_task(&self, output: &str) {
        if let Ok(task) = serde_json::from_str::<Task>(output) {
            println!(
                "Task: {} ({})",
                self.fmt_id(&task.id),
                task.status.as_str().style(self.status_style(task.status))
            );
            println!("  Title: {}", task.title);
            if let Some(ref desc) = task.description {
                println!("  Description: {}", desc);
            }
            println!("  Kind: {}", task.kind);
            println!(
                "  Priority: {}",
                task.priority
                    .as_str()
                    .style(self.priority_style(task.priority))
            );
            if let Some(due) = task.due_date {
                println!("  Due: {}", due);
            }
            if let Some(ref assignee) = task.assigned_to {
                println!("  Assigned to: {}", self.fmt_id(assignee));
            }
            if task.is_trashed() {
                println!("  Lifecycle: {}", "Trashed".style(self.colors.blocked));
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_task_list(&self, output: &str) {
        if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(output) {
            if tasks.is_empty() {
                println!("No tasks found");
                return;
            }
            for t in &tasks {
                println!(
                    "[{}] {} - {}",
                    Self::status_symbol(t.status).style(self.status_style(t.status)),
                    self.fmt_id(&t.id),
                    t.title
                );
            }
            println!("{} task(s)", tasks.len());
        } else {
            println!("{}", output);
        }
    }

    fn print_blocked(&self, output: &str) {
        match serde_json::from_str::<serde_json::Value>(output)
            .ok()
            .and_then(|v| v.get("blocked").and_then(|b| b.as_bool()))
        {
            Some(true) => println!("{}", "blocked".style(self.colors.blocked)),
            Some(false) => println!("{}", "not blocked".style(self.colors.completed)),
            None => println!("{}", output),
        }
    }

    fn print_deps(&self, output: &str) {
        if let Ok(deps) = serde_json::from_str::<Vec<TaskDependency>>(output) {
            if deps.is_empty() {
                println!("No dependencies");
                return;
            }
            for d in &deps {
                println!(
                    "{} depends on {}",
                    self.fmt_id(&d.task_id),
                    self.fmt_id(&d.depends_on_task_id)
                );
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_dependents(&self, output: &str) {
        if let Ok(ids) = serde_json::from_str::<Vec<TaskId>>(output) {
            if ids.is_empty() {
                println!("No dependents");
                return;
            }
            for id in &ids {
                println!("{}", self.fmt_id(id));
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_history(&self, output: &str) {
        if let Ok(updates) = serde_json::from_str::<Vec<TaskStatusUpdate>>(output) {
            if updates.is_empty() {
                println!("No status updates");
                return;
            }
            for u in &updates {
                println!(
                    "{}  {}  by {}",
                    u.created_at.to_rfc3339(),
                    u.status.as_str().style(self.status_style(u.status)),
                    self.fmt_id(&u.updated_by)
                );
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_comment(&self, output: &str) {
        if let Ok(comment) = serde_json::from_str::<Comment>(output) {
            println!(
                "Comment {} by {}: {}",
                self.fmt_id(&comment.id),
                self.fmt_id(&comment.author_id),
                comment.body
            );
        } else {
            println!("{}", output);
        }
    }

    fn print_comments(&self, output: &str) {
        if let Ok(comments) = serde_json::from_str::<Vec<Comment>>(output) {
            if comments.is_empty() {
                println!("No comments");
                return;
            }
            for c in &comments {
                println!("{}  {}: {}", c.created_at.to_rfc3339(), self.fmt_id(&c.author_id), c.body);
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_attachment(&self, output: &str) {
        if let Ok(att) = serde_json::from_str::<Attachment>(output) {
            println!(
                "Attached {} ({}) as {}",
                att.file_name,
                att.mime_type,
                att.stored_path
            );
        } else {
            println!("{}", output);
        }
    }

    fn print_attachments(&self, output: &str) {
        if let Ok(atts) = serde_json::from_str::<Vec<Attachment>>(output) {
            if atts.is_empty() {
                println!("No attachments");
                return;
            }
            for a in &atts {
                println!("{}  {} ({})", self.fmt_id(&a.id), a.file_name, a.mime_type);
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_user(&self, output: &str) {
        if let Ok(user) = serde_json::from_str::<User>(output) {
            println!("User: {}", self.fmt_id(&user.id));
            println!("  Name: {}", user.name);
            println!("  Email: {}", user.email);
            if user.lifecycle == crate::types::LifecycleState::Trashed {
                println!("  Lifecycle: {}", "Trashed".style(self.colors.blocked));
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_user_list(&self, output: &str) {
        if let Ok(users) = serde_json::from_str::<Vec<User>>(output) {
            if users.is_empty() {
                println!("No users found");
                return;
            }
            for u in &users {
                println!("{}  {} <{}>", self.fmt_id(&u.id), u.name, u.email);
            }
        } else {
            println!("{}", output);
        }
    }

    fn print_digest(&self, output: &str) {
        if let Ok(digest) = serde_json::from_str::<DailyDigest>(output) {
            println!("Daily digest for {}", digest.date);
            println!("Due today ({}):", digest.due_today.len());
            for t in &digest.due_today {
                println!(
                    "  [{}] {} - {}",
                    Self::status_symbol(t.status).style(self.status_style(t.status)),
                    self.fmt_id(&t.id),
                    t.title
                );
            }
            println!("Completed ({}):", digest.completed.len());
            for t in &digest.completed {
                println!("  [✓] {} - {}", self.fmt_id(&t.id), t.title);
            }
        } else {
            println!("{}", output);
        }
    }
}
