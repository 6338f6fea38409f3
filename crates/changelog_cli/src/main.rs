//! CLI entry point.
//!
//! # Responsibility
//! - Verify `changelog_core` linkage with deterministic output.
//! - With a database path, print the most recent changes, newest first.
//!
//! Usage: `changelog [DB_PATH [pending|complete|failed]]`

use changelog_core::{
    open_db, ChangeListQuery, ChangeRecord, ChangeRepository, ChangeStatus,
    SqliteChangeRepository,
};
use std::process::ExitCode;

const RECENT_CHANGES_LIMIT: u32 = 20;

fn main() -> ExitCode {
    println!("changelog_core ping={}", changelog_core::ping());
    println!("changelog_core version={}", changelog_core::core_version());

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        return ExitCode::SUCCESS;
    };
    let status = match args.next() {
        None => None,
        Some(raw) => match ChangeStatus::parse(&raw) {
            Some(status) => Some(status),
            None => {
                eprintln!("unknown status `{raw}`; expected pending|complete|failed");
                return ExitCode::from(2);
            }
        },
    };

    match list_recent(&db_path, status) {
        Ok(changes) => {
            for change in &changes {
                println!("{}", format_change(change));
            }
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn list_recent(db_path: &str, status: Option<ChangeStatus>) -> Result<Vec<ChangeRecord>, String> {
    let conn = open_db(db_path).map_err(|err| format!("failed to open `{db_path}`: {err}"))?;
    let repo = SqliteChangeRepository::try_new(&conn).map_err(|err| err.to_string())?;
    repo.list_changes(&ChangeListQuery {
        status,
        limit: Some(RECENT_CHANGES_LIMIT),
        ..ChangeListQuery::default()
    })
    .map_err(|err| err.to_string())
}

fn format_change(change: &ChangeRecord) -> String {
    format!(
        "{} status={} user={} interface={} created_at={} notes={}",
        change.id,
        change.status.as_str(),
        change
            .user_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        change.interface.as_deref().unwrap_or("-"),
        change.created_at,
        change.notes.as_deref().unwrap_or("-"),
    )
}
