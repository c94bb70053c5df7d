use crate::remap::ConflictReport;

/// Failures the operator is expected to see.
///
/// Fatal variants carry a clean, named condition and are printed without
/// detail dumps; anything wrapping a database error is treated as unexpected
/// and logged in full. Both abort the transaction and exit nonzero.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Usage(String),

    #[error("no backblast found for AO {ao_id} on {date}")]
    NoBackblast { ao_id: String, date: chrono::NaiveDate },

    #[error("attendance already recorded for {user_id} at AO {ao_id} on {date}")]
    AttendanceExists {
        user_id: String,
        ao_id: String,
        date: chrono::NaiveDate,
    },

    #[error("{0}")]
    RemapConflicts(ConflictReport),

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl ToolError {
    /// Expected operational outcome vs. something genuinely broken.
    pub fn is_fatal_expected(&self) -> bool {
        !matches!(self, ToolError::Db(_) | ToolError::Io { .. })
    }
}
