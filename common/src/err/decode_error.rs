use thiserror::Error;

/// Internal error taxonomy for the datalayer core.
///
/// Everything except `Internal` is considered the direct cause of a
/// user-facing HTTP status in the `web` crate; `Internal` is a catch-all
/// for collaborator failures (io, config parse, etc.) that don't map to
/// one of the named cases.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatalayerError {
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("custom query for dataset is missing the required limit placeholder")]
    BadCustomQuery,

    #[error("failed to open or ping connection: {0}")]
    ConnectionFailed(String),

    #[error("query execution failed: {0}")]
    QueryFailed(String),

    /// SQL Server error 313: LSN past end of log. Callers should treat
    /// this as "no changes since the requested position" rather than a
    /// hard failure.
    #[error("lsn past end of log")]
    LsnPastEndOfLog,

    #[error("row iteration failed: {0}")]
    RowIterError(String),

    /// A driver error that carries a SQL Server error number (§6 "error
    /// objects bearing the SQL Server error number"). Error 313 ("LSN
    /// past end of log") is the one number the Change Extractor treats
    /// specially; everything else surfaces like any other query failure.
    #[error("sql server error {number}: {message}")]
    SqlServerError { number: i32, message: String },

    #[error("row produced an empty entity id")]
    EmptyId,

    #[error("write-back failed: {0}")]
    WriteFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl DatalayerError {
    /// SQL Server error 313: "attempt to access beyond the end of log".
    /// The Change Extractor treats this as "no changes since the
    /// requested position" rather than a hard query failure.
    pub const LSN_PAST_END_OF_LOG: i32 = 313;

    pub fn is_lsn_past_end_of_log(&self) -> bool {
        matches!(self, DatalayerError::SqlServerError { number, .. } if *number == Self::LSN_PAST_END_OF_LOG)
    }
}

/// Wrapper around collaborator errors (io, json, env) that don't carry
/// their own `DatalayerError` variant.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct InternalError(pub String);

impl From<std::io::Error> for DatalayerError {
    fn from(err: std::io::Error) -> Self {
        DatalayerError::Internal(InternalError(err.to_string()))
    }
}

impl From<serde_json::Error> for DatalayerError {
    fn from(err: serde_json::Error) -> Self {
        DatalayerError::Internal(InternalError(err.to_string()))
    }
}

impl From<std::num::ParseIntError> for DatalayerError {
    fn from(err: std::num::ParseIntError) -> Self {
        DatalayerError::Internal(InternalError(err.to_string()))
    }
}

impl From<std::string::FromUtf8Error> for DatalayerError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        DatalayerError::Internal(InternalError(err.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            DatalayerError::UnknownDataset("orders".into()).to_string(),
            "unknown dataset: orders"
        );
        assert_eq!(DatalayerError::EmptyId.to_string(), "row produced an empty entity id");
    }

    #[test]
    fn recognizes_lsn_past_end_of_log_by_number() {
        let e = DatalayerError::SqlServerError { number: 313, message: "lsn range exceeded".into() };
        assert!(e.is_lsn_past_end_of_log());
        let other = DatalayerError::SqlServerError { number: 229, message: "permission denied".into() };
        assert!(!other.is_lsn_past_end_of_log());
    }
}
