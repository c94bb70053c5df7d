use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, FromQueryResult,
    Statement, TransactionTrait,
};

use crate::error::ToolError;

#[derive(Debug, FromQueryResult)]
struct BeatdownRow {
    q_user_id: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct ExistsRow {
    #[allow(dead_code)]
    user_id: String,
}

async fn ensure_in_txn(
    txn: &DatabaseTransaction,
    user_id: &str,
    ao_id: &str,
    date: chrono::NaiveDate,
) -> Result<(), ToolError> {
    // A backblast proves the beatdown happened; refuse to record attendance
    // against a workout nobody posted.
    let beatdown = BeatdownRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::MySql,
        "SELECT q_user_id FROM beatdowns WHERE ao_id = ? AND bd_date = ? LIMIT 1",
        [ao_id.into(), date.into()],
    ))
    .one(txn)
    .await?
    .ok_or_else(|| ToolError::NoBackblast {
        ao_id: ao_id.to_string(),
        date,
    })?;

    let existing = ExistsRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::MySql,
        "SELECT user_id FROM bd_attendance WHERE user_id = ? AND ao_id = ? AND date = ? LIMIT 1",
        [user_id.into(), ao_id.into(), date.into()],
    ))
    .one(txn)
    .await?;

    if existing.is_some() {
        return Err(ToolError::AttendanceExists {
            user_id: user_id.to_string(),
            ao_id: ao_id.to_string(),
            date,
        });
    }

    txn.execute(Statement::from_sql_and_values(
        DbBackend::MySql,
        "INSERT INTO bd_attendance (timestamp, ts_edited, user_id, ao_id, date, q_user_id) \
         VALUES (?, NULL, ?, ?, ?, ?)",
        [
            chrono::Utc::now().timestamp().to_string().into(),
            user_id.into(),
            ao_id.into(),
            date.into(),
            beatdown.q_user_id.into(),
        ],
    ))
    .await?;

    Ok(())
}

/// Record attendance for (user, AO, date), verifying a beatdown exists and
/// the row is not already present. Single transaction; both named failure
/// conditions roll back without inserting.
pub async fn run_ensure_attendance(
    db: &DatabaseConnection,
    user_id: &str,
    ao_id: &str,
    date: chrono::NaiveDate,
) -> Result<(), ToolError> {
    let txn = db.begin().await?;
    match ensure_in_txn(&txn, user_id, ao_id, date).await {
        Ok(()) => {
            txn.commit().await?;
            Ok(())
        }
        Err(err) => {
            let _ = txn.rollback().await;
            Err(err)
        }
    }
}
