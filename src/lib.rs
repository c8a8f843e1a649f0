//! # db-session
//!
//! Session lifecycle over an existing database driver.
//!
//! ## Core Types
//!
//! - **[`ReadOnlySession`]**: Opens its connection at construction and, if asked for an
//!   isolation level, begins a transaction. Vends commands enlisted in that transaction.
//! - **[`Session`]**: Read-write session; begins a serializable transaction by default and
//!   adds [`Session::save_changes`].
//! - **[`SessionScope`]**: Composition seam for repository types that wrap a session.
//! - **[`Connection`]**, **[`Transaction`]**, **[`Command`]**: Driver contracts.
//! - **[`Error`]**: Error type for session operations.
//!
//! ## Lifecycle
//!
//! - **Eager open**: a constructed session always holds an open connection
//! - **One transaction at most**: no nesting; run sequential units of work in sequential sessions
//! - **Ordered disposal**: dropping a session drops its transaction (rolling back anything
//!   not saved) before closing the connection
//! - **No retries**: every failure is returned from the call that caused it
//!
//! ## Registration
//!
//! The [`registration`] module wires connection strings and session types into a small
//! type-keyed registry. Sessions do not depend on it.

pub mod connection;
mod error;
mod isolation;
pub mod registration;
mod session;

pub use connection::{Command, Connection, FromConnectionString, Transaction};
pub use error::{BoxError, Error, Result};
pub use isolation::{IsolationLevel, ParseIsolationLevelError};
pub use session::{CommandOf, ReadOnlySession, Session, SessionOptions, SessionScope};
