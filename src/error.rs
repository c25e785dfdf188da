use std::path::Path;

use thiserror::Error;

/// Errors raised by the catalog, ingestion pipeline and query layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("entity '{0}' is already defined")]
    DuplicateEntity(String),
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("entity '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },
    #[error("required attribute '{entity}.{attribute}' is missing from the source header")]
    MissingAttribute { entity: String, attribute: String },
    #[error("unsupported type '{type_name}' for column '{column}'")]
    UnsupportedType { column: String, type_name: String },
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("column '{column}': '{token}' is not a valid decimal")]
    MalformedDecimal { column: String, token: String },
    #[error("column '{column}': '{token}' is not a valid integer")]
    MalformedInteger { column: String, token: String },
    #[error("line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("{entity}.{attribute} = {value} has no matching {parent} record")]
    ReferentialIntegrityViolation {
        entity: String,
        attribute: String,
        parent: String,
        value: String,
    },
    #[error("source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Per-row data problems; the pipeline skips the row and keeps going.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedDecimal { .. }
                | Error::MalformedInteger { .. }
                | Error::MalformedRow { .. }
                | Error::ReferentialIntegrityViolation { .. }
        )
    }

    pub(crate) fn source_unavailable(path: &Path, reason: impl ToString) -> Self {
        Error::SourceUnavailable {
            source_name: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_errors_are_recoverable() {
        let err = Error::MalformedDecimal {
            column: "price".into(),
            token: "x".into(),
        };
        assert!(err.is_row_error());
        assert!(!Error::UnknownEntity("shop".into()).is_row_error());
        assert!(!Error::SourceUnavailable {
            source_name: "move.txt".into(),
            reason: "gone".into(),
        }
        .is_row_error());
    }
}
