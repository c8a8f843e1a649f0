//! Error types for sqlx-sqlite-session

use db_session::IsolationLevel;

/// Errors that may occur when working with sqlx-sqlite-session
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// The blocking runtime backing the connection could not be started
   #[error("failed to start runtime: {0}")]
   Runtime(#[source] std::io::Error),

   /// Connection is not open (never opened, or already closed)
   #[error("connection is closed")]
   ConnectionClosed,

   /// `open` called on a connection that is already open
   #[error("connection is already open")]
   AlreadyOpen,

   /// A transaction is already pending on this connection
   #[error("a transaction is already active on this connection")]
   TransactionAlreadyActive,

   /// Transaction has already been committed or rolled back
   #[error("transaction has already been finalized (committed or rolled back)")]
   TransactionAlreadyFinalized,

   /// Command executed without a transaction while one is pending
   #[error("command must be enlisted in the pending transaction of its connection")]
   TransactionRequired,

   /// Command is enlisted in a transaction that is not the pending one
   #[error("command is enlisted in a transaction that is no longer active on its connection")]
   TransactionMismatch,

   /// SQLite cannot provide the requested isolation level
   #[error("isolation level not supported by SQLite: {0}")]
   UnsupportedIsolationLevel(IsolationLevel),

   /// SQLite type that cannot be mapped to JSON
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Multiple rows returned from a `fetch_one` command
   #[error("fetch_one() query returned at least {0} rows, expected 0 or 1")]
   MultipleRowsReturned(usize),
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::Runtime(_) => "RUNTIME_ERROR".to_string(),
         Error::ConnectionClosed => "CONNECTION_CLOSED".to_string(),
         Error::AlreadyOpen => "ALREADY_OPEN".to_string(),
         Error::TransactionAlreadyActive => "TRANSACTION_ALREADY_ACTIVE".to_string(),
         Error::TransactionAlreadyFinalized => "TRANSACTION_ALREADY_FINALIZED".to_string(),
         Error::TransactionRequired => "TRANSACTION_REQUIRED".to_string(),
         Error::TransactionMismatch => "TRANSACTION_MISMATCH".to_string(),
         Error::UnsupportedIsolationLevel(_) => "UNSUPPORTED_ISOLATION_LEVEL".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::MultipleRowsReturned(_) => "MULTIPLE_ROWS_RETURNED".to_string(),
      }
   }
}
