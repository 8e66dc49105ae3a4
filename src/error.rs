//! Error taxonomy for the import, export and repair pipelines.

use serde::Serialize;
use thiserror::Error;

/// Failures raised by a [`DocumentStore`](crate::store::DocumentStore) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Malformed document in {collection}: {reason}")]
    Malformed { collection: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }

    pub fn malformed(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            collection: collection.into(),
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Terminal errors of an import/export/repair run.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Owner scope was not provided")]
    MissingScope,

    #[error(
        "Invalid header. Required columns: region name and sub-area number. Found: {header}"
    )]
    Schema { header: String },

    #[error("Error on line {line}: {reason}")]
    Row { line: usize, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Writing export failed: {0}")]
    Export(String),
}

impl ImportError {
    /// HTTP-equivalent status for callers that surface the error over a request boundary.
    pub fn status(&self) -> u16 {
        match self {
            ImportError::MissingScope => 400,
            ImportError::Schema { .. } => 422,
            ImportError::Row { .. } | ImportError::Store(_) | ImportError::Export(_) => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(ImportError::MissingScope.status(), 400);
        assert_eq!(
            ImportError::Schema {
                header: "a | b".into()
            }
            .status(),
            422
        );
        assert_eq!(
            ImportError::Row {
                line: 3,
                reason: "boom".into()
            }
            .status(),
            500
        );
        assert_eq!(
            ImportError::from(StoreError::unavailable("down")).status(),
            500
        );
    }

    #[test]
    fn schema_error_carries_header_verbatim() {
        let err = ImportError::Schema {
            header: "Foo | Bar baz".into(),
        };
        assert!(err.body().error.contains("Foo | Bar baz"));
    }

    #[test]
    fn row_error_mentions_line() {
        let err = ImportError::Row {
            line: 7,
            reason: "Store unavailable: timeout".into(),
        };
        assert_eq!(err.to_string(), "Error on line 7: Store unavailable: timeout");
    }
}
