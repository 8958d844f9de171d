use clap::{Args, Subcommand};
use rusqlite::Connection;

use crate::db::user_repo;
use crate::error::{Result, TfError};
use crate::id::UserId;
use crate::types::User;

fn parse_user_id(s: &str) -> std::result::Result<UserId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Subcommand, Clone)]
pub enum UserCommand {
    Add(AddArgs),
    Get {
        #[arg(value_parser = parse_user_id)]
        id: UserId,
    },
    List {
        /// Show trashed users instead
        #[arg(long)]
        trashed: bool,
    },
    Trash {
        #[arg(value_parser = parse_user_id)]
        id: UserId,
    },
    Restore {
        #[arg(value_parser = parse_user_id)]
        id: UserId,
    },
    /// Hard delete - terminal, cannot be restored
    Purge {
        #[arg(value_parser = parse_user_id)]
        id: UserId,
    },
}

#[derive(Args, Clone)]
pub struct AddArgs {
    #[arg(short = 'n', long)]
    pub name: String,

    #[arg(short = 'e', long)]
    pub email: String,
}

pub enum UserResult {
    One(User),
    Many(Vec<User>),
    Purged,
}

pub fn handle(conn: &Connection, cmd: UserCommand) -> Result<UserResult> {
    match cmd {
        UserCommand::Add(args) => Ok(UserResult::One(user_repo::create_user(
            conn,
            &args.name,
            &args.email,
        )?)),

        UserCommand::Get { id } => Ok(UserResult::One(
            user_repo::find_by_id(conn, &id)?.ok_or(TfError::UserNotFound(id))?,
        )),

        UserCommand::List { trashed } => {
            let users = if trashed {
                user_repo::list_trashed(conn)?
            } else {
                user_repo::list_users(conn)?
            };
            Ok(UserResult::Many(users))
        }

        UserCommand::Trash { id } => Ok(UserResult::One(user_repo::trash_user(conn, &id)?)),

        UserCommand::Restore { id } => Ok(UserResult::One(user_repo::restore_user(conn, &id)?)),

        UserCommand::Purge { id } => {
            user_repo::purge_user(conn, &id)?;
            Ok(UserResult::Purged)
        }
    }
}
