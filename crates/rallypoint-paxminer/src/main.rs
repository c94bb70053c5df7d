//! Operational tooling for the legacy paxminer MySQL store.
//!
//! Usage:
//!   rallypoint-paxminer remap-user <OLD_SLACK_ID> <NEW_SLACK_ID>
//!   rallypoint-paxminer ensure-attendance <SLACK_USER_ID> <AO_CHANNEL_ID> <DATE>
//!   rallypoint-paxminer backup [--out DIR]
//!
//! Connects via the MYSQL_URL environment variable. Exits 0 on success, 1 on
//! usage error or fatal failure.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sea_orm::{Database, DatabaseConnection};

mod attendance;
mod backup;
mod error;
mod remap;

use error::ToolError;

#[derive(Parser)]
#[command(name = "rallypoint-paxminer")]
#[command(about = "One-off migration/backup tooling for the legacy paxminer store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reassign all identity columns from one Slack user id to another
    RemapUser {
        old_slack_id: String,
        new_slack_id: String,
    },

    /// Record attendance for a user at an AO on a date, if a backblast exists
    EnsureAttendance {
        slack_user_id: String,
        ao_channel_id: String,
        /// YYYY-MM-DD
        date: String,
    },

    /// Export the legacy tables to JSON-lines files
    Backup {
        #[arg(long, default_value = "paxminer-backup")]
        out: PathBuf,
    },
}

fn parse_date(raw: &str) -> Result<chrono::NaiveDate, ToolError> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ToolError::Usage(format!("invalid date {raw:?}, expected YYYY-MM-DD")))
}

async fn connect() -> Result<DatabaseConnection, ToolError> {
    let url = std::env::var("MYSQL_URL")
        .map_err(|_| ToolError::Usage("MYSQL_URL is required".to_string()))?;
    Ok(Database::connect(&url).await?)
}

async fn run(cli: Cli) -> Result<(), ToolError> {
    match cli.command {
        Commands::RemapUser {
            old_slack_id,
            new_slack_id,
        } => {
            let db = connect().await?;
            let result = remap::run_remap(&db, &old_slack_id, &new_slack_id).await;
            let _ = db.close().await;
            let outcome = result?;

            println!("remapped {old_slack_id} -> {new_slack_id}");
            for (column, rows) in &outcome.updated {
                println!("  {column}: {rows} row(s)");
            }
            match outcome.user_row {
                remap::UserRowAction::Renamed => println!("  users: primary row renamed"),
                remap::UserRowAction::MergeSkipped => {
                    println!("  users: both identities exist, merge skipped")
                }
                remap::UserRowAction::Absent => println!("  users: no primary row for old id"),
            }
            Ok(())
        }
        Commands::EnsureAttendance {
            slack_user_id,
            ao_channel_id,
            date,
        } => {
            let date = parse_date(&date)?;
            let db = connect().await?;
            let result =
                attendance::run_ensure_attendance(&db, &slack_user_id, &ao_channel_id, date).await;
            let _ = db.close().await;
            result?;

            println!("attendance recorded for {slack_user_id} at AO {ao_channel_id} on {date}");
            Ok(())
        }
        Commands::Backup { out } => {
            let db = connect().await?;
            let result = backup::run_backup(&db, &out).await;
            let _ = db.close().await;
            let counts = result?;

            println!("exported to {}", out.display());
            for (table, rows) in counts {
                println!("  {table}: {rows} row(s)");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Exit 1 on usage errors as well (clap defaults to 2).
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    };
    if let Err(err) = run(cli).await {
        if err.is_fatal_expected() {
            eprintln!("error: {err}");
        } else {
            tracing::error!(?err, "unexpected failure");
            eprintln!("error: {err}");
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parsing() {
        assert!(parse_date("2024-02-29").is_ok());
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("02/29/2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn usage_errors_are_fatal_expected() {
        assert!(parse_date("nope").unwrap_err().is_fatal_expected());
    }
}
