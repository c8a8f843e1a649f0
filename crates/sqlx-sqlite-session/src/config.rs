//! Configuration for SQLite session connections

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings applied on top of the connect options or connection
/// string a [`SqliteConnection`](crate::SqliteConnection) is built from.
///
/// # Examples
///
/// ```
/// use sqlx_sqlite_session::SqliteConnectionConfig;
/// use std::time::Duration;
///
/// // Use defaults
/// let config = SqliteConnectionConfig::default();
///
/// // Override just one field
/// let config = SqliteConnectionConfig {
///     busy_timeout: Duration::from_secs(1),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConnectionConfig {
   /// How long a statement waits on a locked database before failing with
   /// `SQLITE_BUSY`
   ///
   /// This is the only timeout a session has; there is no per-command
   /// cancellation.
   ///
   /// Default: 5 seconds
   pub busy_timeout: Duration,

   /// Enforce foreign key constraints
   ///
   /// Default: true
   pub foreign_keys: bool,

   /// Number of prepared statements cached per connection
   ///
   /// Default: 100
   pub statement_cache_capacity: usize,
}

impl Default for SqliteConnectionConfig {
   fn default() -> Self {
      Self {
         busy_timeout: Duration::from_secs(5),
         foreign_keys: true,
         statement_cache_capacity: 100,
      }
   }
}
