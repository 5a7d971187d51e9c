//! Error types for pgfluent

use thiserror::Error;

/// Result type alias for pgfluent operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Error types for the query layer.
///
/// Four families, so callers can decide whether a retry is sensible:
/// - builder-time errors (`Filter`, `Projection`, `Payload`) — malformed input,
///   caught before any SQL is built
/// - compiler invariant failures (`Compiler`) — never reach the database
/// - pool errors (`Pool`, `Connection`) — exhaustion, acquire timeout, broken connection
/// - statement errors — returned by the database itself
#[derive(Clone, Debug, Error)]
pub enum QueryError {
    /// Malformed filter argument (e.g. unknown operator tag in an OR group)
    #[error("Filter error: {0}")]
    Filter(String),

    /// Malformed projection expression
    #[error("Projection error: {0}")]
    Projection(String),

    /// Malformed insert/update/upsert payload
    #[error("Payload error: {0}")]
    Payload(String),

    /// Internal compiler invariant violation (placeholder/parameter mismatch)
    #[error("Compiler error: {0}")]
    Compiler(String),

    /// Pool-level error (exhaustion, acquisition timeout)
    #[error("Pool error: {0}")]
    Pool(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement error reported by the database
    #[error("Statement error [{code}]: {message}")]
    Statement { code: String, message: String },

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Strict single-row request matched zero rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl QueryError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Stable error code for the `{code, message}` caller contract.
    ///
    /// Statement errors carry their SQLSTATE; everything else uses a fixed tag.
    pub fn code(&self) -> &str {
        match self {
            Self::Filter(_) => "filter_error",
            Self::Projection(_) => "projection_error",
            Self::Payload(_) => "payload_error",
            Self::Compiler(_) => "compiler_error",
            Self::Pool(_) => "pool_error",
            Self::Connection(_) => "connection_error",
            Self::Statement { code, .. } => code,
            Self::UniqueViolation(_) => "23505",
            Self::ForeignKeyViolation(_) => "23503",
            Self::CheckViolation(_) => "23514",
            Self::NotFound(_) => "not_found",
            Self::Decode { .. } => "decode_error",
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a pool-level error (a retry may be sensible)
    pub fn is_pool_error(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connection(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Parse a tokio_postgres error into a more specific QueryError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            return match db_err.code().code() {
                "23505" => Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => Self::ForeignKeyViolation(format!("{}: {}", constraint, message)),
                "23514" => Self::CheckViolation(format!("{}: {}", constraint, message)),
                code => Self::Statement {
                    code: code.to_string(),
                    message: message.to_string(),
                },
            };
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::Statement {
            code: "unknown".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<deadpool_postgres::PoolError> for QueryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
