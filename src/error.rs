use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("CSV contains unknown columns: {}", .unknown.join(", "))]
    SchemaMismatch { unknown: Vec<String> },

    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("staging table has no dated rows")]
    EmptyStaging,

    #[error("Market '{0}' not found in Markets table.")]
    MissingMarket(String),

    #[error("Bookmaker '{0}' not found in Bookmakers table.")]
    MissingBookmaker(String),

    #[error("invalid csv at line {line}: {message}")]
    InvalidCsv { line: u64, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ETL error: {0}")]
    PipelineFailure(String),

    #[error("Error cleaning tables: {0}")]
    Cleanup(#[source] Box<EtlError>),

    #[error("Error during bookmaker cleanup: {0}")]
    Dedup(#[source] Box<EtlError>),
}

/// Attaches a short description of the failing statement to rusqlite errors.
pub trait StorageContext<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|source| EtlError::Storage {
            context: context.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_lists_columns() {
        let err = EtlError::SchemaMismatch {
            unknown: vec!["Bogus".to_string(), "Extra".to_string()],
        };
        assert_eq!(err.to_string(), "CSV contains unknown columns: Bogus, Extra");
    }

    #[test]
    fn storage_context_wraps_message() {
        let res: std::result::Result<(), rusqlite::Error> =
            Err(rusqlite::Error::InvalidQuery);
        let err = res.context("insert team").unwrap_err();
        assert!(err.to_string().starts_with("insert team: "));
    }

    #[test]
    fn cleanup_wraps_inner_error() {
        let err = EtlError::Cleanup(Box::new(EtlError::EmptyStaging));
        assert_eq!(
            err.to_string(),
            "Error cleaning tables: staging table has no dated rows"
        );
    }
}
