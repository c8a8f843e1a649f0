//! # sqlx-sqlite-session
//!
//! A blocking SQLite driver over SQLx for `db-session`, so sessions can own a
//! SQLite connection, a transaction on it, and the commands run inside it.
//!
//! ## Core Types
//!
//! - **[`SqliteConnection`]**: One SQLite connection, opened and closed by the session
//! - **[`SqliteTransaction`]**: Pending transaction; rolls back on drop unless committed
//! - **[`SqliteCommand`]**: SQL text plus JSON bind values, enlisted in a transaction
//! - **[`SqliteConnectionConfig`]**: Connection settings applied on open
//! - **[`Error`]**: Error type for driver operations
//!
//! ## Isolation Levels
//!
//! SQLite transactions are serializable. `ReadCommitted`, `RepeatableRead` and
//! `Serializable` all begin with `BEGIN IMMEDIATE`. `ReadUncommitted` switches
//! on `PRAGMA read_uncommitted` for the life of the transaction. `Snapshot` is
//! rejected with [`Error::UnsupportedIsolationLevel`].
//!
//! ## Example
//!
//! ```no_run
//! use db_session::Session;
//! use sqlx_sqlite_session::SqliteConnection;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(SqliteConnection::from_path("app.db", None)?)?;
//!
//! let mut command = session.create_command()?;
//! command.set_text("INSERT INTO users (name) VALUES ($1)").bind("Alice");
//! command.execute()?;
//!
//! session.save_changes()?;
//! # Ok(())
//! # }
//! ```

mod command;
mod config;
mod connection;
mod decode;
mod error;
mod transaction;

// Re-export public types
pub use command::{SqliteCommand, WriteQueryResult};
pub use config::SqliteConnectionConfig;
pub use connection::SqliteConnection;
pub use error::{Error, Result};
pub use transaction::SqliteTransaction;

pub use sqlx::sqlite::SqliteConnectOptions;
