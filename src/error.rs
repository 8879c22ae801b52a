use thiserror::Error;

/// Convenience result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type returned by [`crate::source::DocumentSource`] implementations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type returned by [`crate::warehouse::Warehouse`] implementations.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Result type returned by [`crate::page::PageReader`] implementations.
pub type PageResult<T> = Result<T, PageError>;

/// Failure while reading a table from a document source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A required credential (e.g. an API token) was not provided.
    #[error("missing credential: {name} is not set")]
    MissingCredential { name: String },

    /// The document or table does not exist (or is not visible to the credential).
    #[error("table '{table_id}' not found in document '{document_id}'")]
    NotFound {
        document_id: String,
        table_id: String,
    },

    /// The source rejected the credential.
    #[error("source rejected credentials (http {status})")]
    Auth { status: u16 },

    /// Any other non-success HTTP status.
    #[error("source returned http {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level failure (DNS, TLS, connection reset, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response did not have the expected shape.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// A file-backed table in a format we cannot read.
    #[error("unsupported source format: {message}")]
    UnsupportedFormat { message: String },

    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a warehouse backend.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Embedded SQLite backend error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "redshift")]
    /// Redshift/Postgres backend error (feature-gated behind `redshift`).
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// The blocking runtime driving an async driver could not be created.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// The backend cannot perform the requested operation.
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// A result column could not be converted into a [`crate::types::Value`].
    #[error("cannot decode column '{column}': {message}")]
    Decode { column: String, message: String },
}

/// Failure while reading fields off a page.
#[derive(Debug, Error)]
pub enum PageError {
    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status other than 404.
    #[error("page returned http {status}")]
    Http { status: u16 },

    /// The page body could not be interpreted.
    #[error("malformed page: {message}")]
    Malformed { message: String },
}

/// Error type returned by the sync entry points.
///
/// The variants follow the failure taxonomy of a sync run: configuration problems are detected
/// before any I/O, extraction and precondition failures cost one table, and transactional
/// failures are rolled back before they are reported.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid configuration / credentials.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The source table could not be read.
    #[error("extraction failed for document '{document_id}' table '{table_id}': {source}")]
    Extraction {
        document_id: String,
        table_id: String,
        #[source]
        source: SourceError,
    },

    /// Extracted column names cannot be used as relational columns.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// The snapshot violates a requirement of the sync (missing/null/duplicate key, ...).
    ///
    /// Raised before anything is written to the warehouse.
    #[error("precondition failed for '{target}': {message}")]
    Precondition { target: String, message: String },

    /// Could not connect to (or authenticate with) the warehouse.
    #[error("warehouse connection failed: {0}")]
    Connection(#[source] WarehouseError),

    /// A statement inside the sync transaction failed; the transaction was rolled back.
    #[error("sync of '{target}' failed and was rolled back: {source}")]
    Transaction {
        target: String,
        #[source]
        source: WarehouseError,
    },

    /// A read-only warehouse query failed.
    #[error("warehouse query failed: {0}")]
    Query(#[source] WarehouseError),

    /// A page reader failed.
    #[error("page read failed: {0}")]
    Page(#[from] PageError),

    /// CSV export error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn precondition(target: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Precondition {
            target: target.into(),
            message: message.into(),
        }
    }
}
