use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

mod commands;
mod core;
mod db;
mod error;
mod id;
mod output;
mod types;

use commands::{
    report, task, user, ReportCommand, ReportResult, TaskCommand, TaskResult, UserCommand,
    UserResult,
};
use output::Printer;

#[derive(Parser)]
#[command(name = "tf")]
#[command(version)]
#[command(
    about = "Taskforge - task tracking with dependency-aware statuses",
    long_about = r#"
Taskforge (tf) - Task tracking with dependency-aware statuses.

Features:
  • Status changes audited in an append-only trail
  • Tasks with incomplete prerequisites are forced to Blocked
  • Completing a task reopens its direct dependents
  • Trash / restore / purge lifecycle for tasks and users

Environment:
  TASKFORGE_DB_PATH  Override database location
  NO_COLOR           Disable colored output
  RUST_LOG           Log filter (e.g. taskforge=debug)
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output in JSON format (for programmatic use)
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Override database path (default: CWD/.taskforge/tasks.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Task management (CRUD, status, dependencies, comments, attachments)
    #[command(subcommand)]
    Task(TaskCommand),

    /// User management
    #[command(subcommand)]
    User(UserCommand),

    /// Reports (daily digest, filtered listings)
    #[command(subcommand)]
    Report(ReportCommand),

    /// Generate shell completions
    #[command(
        about = "Generate shell completions",
        long_about = r#"
Generate shell completions for the tf CLI.

Examples:
  tf completions bash > ~/.local/share/bash-completion/completions/tf
  tf completions zsh > ~/.zfunc/_tf
  tf completions fish > ~/.config/fish/completions/tf.fish
"#
    )]
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },

    /// Initialize database in current directory
    #[command(
        about = "Initialize database",
        long_about = r#"
Initialize the Taskforge database.

The database is created at:
  1. TASKFORGE_DB_PATH (if set)
  2. CWD/.taskforge/tasks.db (fallback)

Usually runs automatically on first command.
"#
    )]
    Init,
}

/// Determine the default database path.
///
/// Resolution order:
/// 1. TASKFORGE_DB_PATH env var (if set)
/// 2. Current working directory -> .taskforge/tasks.db
fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("TASKFORGE_DB_PATH") {
        return PathBuf::from(path);
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(".taskforge").join("tasks.db")
}

/// Directory for attachment bytes: sibling of the database file.
fn data_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    init_tracing();

    // PRECONDITION: Completions bypass normal output flow - raw shell script to stdout
    if let Command::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "tf", &mut io::stdout());
        return;
    }

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);

    let result = run(&cli.command, &db_path);

    match result {
        Ok(output) => {
            if cli.json {
                println!("{}", output);
            } else {
                let printer = Printer::new(cli.no_color);
                printer.print(&cli.command, &output);
            }
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({ "error": e.to_string() });
                eprintln!("{}", err);
            } else {
                let printer = Printer::new_for_stderr(cli.no_color);
                printer.print_error(&format!("Error: {}", e));
            }
            std::process::exit(1);
        }
    }
}

fn run(command: &Command, db_path: &PathBuf) -> error::Result<String> {
    match command {
        Command::Init => {
            db::open_db(db_path)?;
            Ok(serde_json::json!({ "initialized": true, "path": db_path }).to_string())
        }
        Command::Task(cmd) => {
            let conn = db::open_db(db_path)?;
            let dir = data_dir(db_path);
            match task::handle(&conn, &dir, cmd.clone())? {
                TaskResult::One(t) => Ok(serde_json::to_string_pretty(&t)?),
                TaskResult::Many(ts) => Ok(serde_json::to_string_pretty(&ts)?),
                TaskResult::Blocked(b) => {
                    Ok(serde_json::json!({ "blocked": b }).to_string())
                }
                TaskResult::Deps(deps) => Ok(serde_json::to_string_pretty(&deps)?),
                TaskResult::Dependents(ids) => Ok(serde_json::to_string_pretty(&ids)?),
                TaskResult::History(updates) => Ok(serde_json::to_string_pretty(&updates)?),
                TaskResult::Comment(c) => Ok(serde_json::to_string_pretty(&c)?),
                TaskResult::Comments(cs) => Ok(serde_json::to_string_pretty(&cs)?),
                TaskResult::Attachment(a) => Ok(serde_json::to_string_pretty(&a)?),
                TaskResult::Attachments(atts) => Ok(serde_json::to_string_pretty(&atts)?),
                TaskResult::Purged => Ok(serde_json::json!({ "purged": true }).to_string()),
            }
        }
        Command::User(cmd) => {
            let conn = db::open_db(db_path)?;
            match user::handle(&conn, cmd.clone())? {
                UserResult::One(u) => Ok(serde_json::to_string_pretty(&u)?),
                UserResult::Many(us) => Ok(serde_json::to_string_pretty(&us)?),
                UserResult::Purged => Ok(serde_json::json!({ "purged": true }).to_string()),
            }
        }
        Command::Report(cmd) => {
            let conn = db::open_db(db_path)?;
            match report::handle(&conn, cmd.clone())? {
                ReportResult::Daily(digest) => Ok(serde_json::to_string_pretty(&digest)?),
                ReportResult::Tasks(ts) => Ok(serde_json::to_string_pretty(&ts)?),
            }
        }
        // PRECONDITION: Completions handled in main() before run() is called
        Command::Completions { .. } => unreachable!("completions handled before run()"),
    }
}
