use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, FromQueryResult,
    Statement, TransactionTrait,
};

use crate::error::ToolError;

/// Identity columns remapped from the old Slack user id to the new one.
///
/// `users.user_id` is handled separately (rename/merge rules), and the two
/// composite-key tables are collision-checked before any UPDATE runs.
pub const REMAP_COLUMNS: &[(&str, &str)] = &[
    ("beatdowns", "q_user_id"),
    ("beatdowns", "coq_user_id"),
    ("bd_attendance", "user_id"),
    ("bd_attendance", "q_user_id"),
    ("aos", "site_q_user_id"),
    ("achievements_awarded", "pax_id"),
];

const CONFLICT_REPORT_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub table: &'static str,
    pub ao_id: String,
    pub date: chrono::NaiveDate,
}

/// Every row the remap would collide with, rendered capped at
/// [`CONFLICT_REPORT_CAP`] lines plus a remainder count.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub new_user_id: String,
    pub conflicts: Vec<Conflict>,
}

impl std::fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "remap would create {} duplicate row(s) under {}; nothing was changed",
            self.conflicts.len(),
            self.new_user_id
        )?;
        for c in self.conflicts.iter().take(CONFLICT_REPORT_CAP) {
            writeln!(f, "  {}: AO {} on {}", c.table, c.ao_id, c.date)?;
        }
        let rest = self.conflicts.len().saturating_sub(CONFLICT_REPORT_CAP);
        if rest > 0 {
            writeln!(f, "  ... and {rest} more")?;
        }
        Ok(())
    }
}

/// One parameterized UPDATE of the remap plan. Values bind as (new, old).
#[derive(Debug, Clone, PartialEq)]
pub struct RemapStatement {
    pub table: &'static str,
    pub column: &'static str,
    pub sql: String,
}

pub fn remap_statements() -> Vec<RemapStatement> {
    REMAP_COLUMNS
        .iter()
        .map(|&(table, column)| RemapStatement {
            table,
            column,
            sql: format!("UPDATE {table} SET {column} = ? WHERE {column} = ?"),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRowAction {
    /// Only the old row existed; its primary key was renamed.
    Renamed,
    /// Both rows exist; left untouched.
    MergeSkipped,
    /// No old row; nothing to do.
    Absent,
}

#[derive(Debug)]
pub struct RemapOutcome {
    /// (table.column, rows affected) per executed UPDATE, in plan order.
    pub updated: Vec<(String, u64)>,
    pub user_row: UserRowAction,
}

#[derive(Debug, FromQueryResult)]
struct ConflictRow {
    ao_id: String,
    date: chrono::NaiveDate,
}

#[derive(Debug, FromQueryResult)]
struct UserIdRow {
    user_id: String,
}

async fn composite_conflicts(
    txn: &DatabaseTransaction,
    table: &'static str,
    id_column: &str,
    date_column: &str,
    old: &str,
    new: &str,
) -> Result<Vec<Conflict>, ToolError> {
    let sql = format!(
        "SELECT t.ao_id AS ao_id, t.{date_column} AS date FROM {table} t \
         WHERE t.{id_column} = ? AND EXISTS (\
           SELECT 1 FROM {table} c \
           WHERE c.ao_id = t.ao_id AND c.{date_column} = t.{date_column} AND c.{id_column} = ?\
         ) ORDER BY t.{date_column}, t.ao_id"
    );
    let rows = ConflictRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::MySql,
        sql,
        [old.into(), new.into()],
    ))
    .all(txn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Conflict {
            table,
            ao_id: r.ao_id,
            date: r.date,
        })
        .collect())
}

async fn user_rows_present(
    txn: &DatabaseTransaction,
    old: &str,
    new: &str,
) -> Result<(bool, bool), ToolError> {
    let rows = UserIdRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::MySql,
        "SELECT user_id FROM users WHERE user_id IN (?, ?)",
        [old.into(), new.into()],
    ))
    .all(txn)
    .await?;

    let old_present = rows.iter().any(|r| r.user_id == old);
    let new_present = rows.iter().any(|r| r.user_id == new);
    Ok((old_present, new_present))
}

async fn remap_in_txn(
    txn: &DatabaseTransaction,
    old: &str,
    new: &str,
) -> Result<RemapOutcome, ToolError> {
    // Collision pass first. If remapping would produce a duplicate composite
    // key in either table, report and bail before touching anything.
    let mut conflicts =
        composite_conflicts(txn, "beatdowns", "q_user_id", "bd_date", old, new).await?;
    conflicts
        .extend(composite_conflicts(txn, "bd_attendance", "user_id", "date", old, new).await?);

    if !conflicts.is_empty() {
        return Err(ToolError::RemapConflicts(ConflictReport {
            new_user_id: new.to_string(),
            conflicts,
        }));
    }

    let mut updated = Vec::new();
    for stmt in remap_statements() {
        let res = txn
            .execute(Statement::from_sql_and_values(
                DbBackend::MySql,
                stmt.sql.clone(),
                [new.into(), old.into()],
            ))
            .await?;
        updated.push((format!("{}.{}", stmt.table, stmt.column), res.rows_affected()));
    }

    // The users primary row: rename if only the old one exists, keep both if
    // the new identity is already registered, no-op otherwise.
    let user_row = match user_rows_present(txn, old, new).await? {
        (true, false) => {
            txn.execute(Statement::from_sql_and_values(
                DbBackend::MySql,
                "UPDATE users SET user_id = ? WHERE user_id = ?",
                [new.into(), old.into()],
            ))
            .await?;
            UserRowAction::Renamed
        }
        (true, true) => UserRowAction::MergeSkipped,
        _ => UserRowAction::Absent,
    };

    Ok(RemapOutcome { updated, user_row })
}

/// Reassign every identity column from `old` to `new` in one transaction.
///
/// All-or-nothing: any conflict or error rolls the whole thing back. Errors
/// during the rollback itself are swallowed so the original failure is what
/// the operator sees.
pub async fn run_remap(
    db: &DatabaseConnection,
    old: &str,
    new: &str,
) -> Result<RemapOutcome, ToolError> {
    if old == new {
        return Err(ToolError::Usage(
            "old and new Slack user ids must differ".to_string(),
        ));
    }

    let txn = db.begin().await?;
    match remap_in_txn(&txn, old, new).await {
        Ok(outcome) => {
            txn.commit().await?;
            Ok(outcome)
        }
        Err(err) => {
            let _ = txn.rollback().await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> chrono::NaiveDate {
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn plan_covers_exactly_the_identity_columns() {
        let stmts = remap_statements();
        let covered: Vec<(&str, &str)> = stmts.iter().map(|s| (s.table, s.column)).collect();
        assert_eq!(covered, REMAP_COLUMNS.to_vec());
    }

    #[test]
    fn plan_updates_are_scoped_to_the_old_identity() {
        for stmt in remap_statements() {
            assert_eq!(
                stmt.sql,
                format!(
                    "UPDATE {} SET {} = ? WHERE {} = ?",
                    stmt.table, stmt.column, stmt.column
                )
            );
        }
    }

    #[test]
    fn conflict_report_caps_at_ten_rows() {
        let conflicts: Vec<Conflict> = (0..13)
            .map(|i| Conflict {
                table: "beatdowns",
                ao_id: format!("C{i:04}"),
                date: date("2024-01-01"),
            })
            .collect();
        let report = ConflictReport {
            new_user_id: "U_NEW".to_string(),
            conflicts,
        };

        let rendered = report.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        // Header, ten rows, remainder.
        assert_eq!(lines.len(), 12);
        assert!(lines[0].contains("13 duplicate row(s)"));
        assert!(lines[0].contains("U_NEW"));
        assert_eq!(lines.last().unwrap().trim(), "... and 3 more");
    }

    #[test]
    fn conflict_report_without_remainder_has_no_trailer() {
        let report = ConflictReport {
            new_user_id: "U_NEW".to_string(),
            conflicts: vec![Conflict {
                table: "bd_attendance",
                ao_id: "C0001".to_string(),
                date: date("2024-06-15"),
            }],
        };

        let rendered = report.to_string();
        assert!(rendered.contains("bd_attendance: AO C0001 on 2024-06-15"));
        assert!(!rendered.contains("more"));
    }
}
