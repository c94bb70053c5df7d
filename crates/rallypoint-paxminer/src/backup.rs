use std::io::Write;
use std::path::Path;

use sea_orm::{DatabaseConnection, DbBackend, FromQueryResult, JsonValue, Statement};

use crate::error::ToolError;

/// Tables exported by `backup`, one JSON-lines file each.
pub const BACKUP_TABLES: &[&str] = &[
    "users",
    "aos",
    "beatdowns",
    "bd_attendance",
    "achievements_awarded",
];

fn io_err(path: &Path, source: std::io::Error) -> ToolError {
    ToolError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read-only export of the legacy tables. Returns (table, row count) pairs.
pub async fn run_backup(
    db: &DatabaseConnection,
    out_dir: &Path,
) -> Result<Vec<(&'static str, usize)>, ToolError> {
    std::fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;

    let mut counts = Vec::new();
    for &table in BACKUP_TABLES {
        let rows = JsonValue::find_by_statement(Statement::from_string(
            DbBackend::MySql,
            format!("SELECT * FROM {table}"),
        ))
        .all(db)
        .await?;

        let path = out_dir.join(format!("{table}.jsonl"));
        let mut file = std::fs::File::create(&path).map_err(|e| io_err(&path, e))?;
        for row in &rows {
            serde_json::to_writer(&mut file, row)
                .map_err(|e| io_err(&path, std::io::Error::other(e)))?;
            file.write_all(b"\n").map_err(|e| io_err(&path, e))?;
        }

        counts.push((table, rows.len()));
    }

    Ok(counts)
}
