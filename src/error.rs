//! Error types for db-session

use crate::isolation::IsolationLevel;

/// Boxed driver error carried as the source of session errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sessions and the registration helpers.
///
/// Driver failures are wrapped with the lifecycle step that triggered them so
/// callers can tell an open failure from a commit failure without knowing the
/// driver's own error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// An argument the session cannot accept (for example a connection that is
   /// already open, or an empty connection string).
   #[error("invalid argument: {0}")]
   InvalidArgument(String),

   /// Opening (or building) the connection failed. No session was created.
   #[error("failed to open connection: {0}")]
   Connection(#[source] BoxError),

   /// Beginning the transaction failed. The connection has been closed again.
   #[error("failed to begin {level} transaction: {source}")]
   BeginTransaction {
      level: IsolationLevel,
      #[source]
      source: BoxError,
   },

   /// The driver could not create a command.
   #[error("failed to create command: {0}")]
   Command(#[source] BoxError),

   /// Committing the transaction failed. The transaction should be treated as
   /// no longer committable; dispose the session.
   #[error("failed to commit transaction: {0}")]
   Commit(#[source] BoxError),

   /// No registration exists for the requested service type.
   #[error("service not registered: {0}")]
   ServiceNotRegistered(&'static str),

   /// A registration produced a value of a different type than requested.
   #[error("service registration produced an unexpected type for {0}")]
   ServiceTypeMismatch(&'static str),

   /// A [`Factory`](crate::registration::Factory) outlived the scope it was
   /// resolved from.
   #[error("scope for {0} has been disposed")]
   ScopeDisposed(&'static str),
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::InvalidArgument(_) => "INVALID_ARGUMENT",
         Error::Connection(_) => "CONNECTION_ERROR",
         Error::BeginTransaction { .. } => "TRANSACTION_BEGIN_ERROR",
         Error::Command(_) => "COMMAND_ERROR",
         Error::Commit(_) => "COMMIT_ERROR",
         Error::ServiceNotRegistered(_) => "SERVICE_NOT_REGISTERED",
         Error::ServiceTypeMismatch(_) => "SERVICE_TYPE_MISMATCH",
         Error::ScopeDisposed(_) => "SCOPE_DISPOSED",
      }
   }
}
