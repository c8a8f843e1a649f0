//! Driver contracts consumed by sessions
//!
//! Sessions never talk to a database directly. They drive a [`Connection`]
//! through its lifecycle and hand out its [`Command`]s. Everything below these
//! traits (sockets, SQL, pooling) belongs to the driver.
//!
//! Driver handles take `&self`: like the handles of most client libraries they
//! are references to driver-side state, which lets a connection be shared
//! through an `Arc` when it is registered with a shared lifetime.

use std::sync::Arc;

use crate::isolation::IsolationLevel;

/// A database connection handed to a session, not yet open.
pub trait Connection {
   /// Driver error type.
   type Error: std::error::Error + Send + Sync + 'static;

   /// Transaction handle produced by [`Connection::begin_transaction`].
   ///
   /// Dropping an uncommitted transaction must roll it back.
   type Transaction: Transaction;

   /// Command type produced by [`Connection::create_command`].
   type Command: Command<Transaction = Self::Transaction>;

   /// Whether the connection is currently open.
   fn is_open(&self) -> bool;

   /// Open the connection. Blocks until the driver has connected.
   fn open(&self) -> Result<(), Self::Error>;

   /// Begin a transaction at exactly `level`.
   fn begin_transaction(&self, level: IsolationLevel) -> Result<Self::Transaction, Self::Error>;

   /// Create a command bound to this connection with no transaction set.
   fn create_command(&self) -> Result<Self::Command, Self::Error>;

   /// Close the connection. Closing a closed connection is a no-op.
   fn close(&self) -> Result<(), Self::Error>;
}

/// A driver transaction. Disposal is `Drop`.
pub trait Transaction {
   /// Driver error type.
   type Error: std::error::Error + Send + Sync + 'static;

   /// Level the transaction was begun with.
   fn isolation_level(&self) -> IsolationLevel;

   /// Commit the transaction.
   fn commit(&self) -> Result<(), Self::Error>;
}

/// A driver command.
///
/// Only transaction enlistment is part of the session contract. Setting text,
/// binding parameters and executing are inherent methods of each driver's
/// command type.
pub trait Command {
   /// Transaction type this command can be enlisted in.
   type Transaction;

   /// Enlist the command in `transaction`.
   fn set_transaction(&mut self, transaction: &Self::Transaction);

   /// Whether the command has been enlisted in a transaction.
   fn has_transaction(&self) -> bool;
}

/// Builds an unopened connection from a connection string.
///
/// Used by [`register_connection`](crate::registration::register_connection);
/// sessions themselves are always handed a ready connection.
pub trait FromConnectionString: Sized {
   /// Error returned for a malformed connection string.
   type Error: std::error::Error + Send + Sync + 'static;

   fn from_connection_string(connection_string: &str) -> Result<Self, Self::Error>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
   type Error = C::Error;
   type Transaction = C::Transaction;
   type Command = C::Command;

   fn is_open(&self) -> bool {
      (**self).is_open()
   }

   fn open(&self) -> Result<(), Self::Error> {
      (**self).open()
   }

   fn begin_transaction(&self, level: IsolationLevel) -> Result<Self::Transaction, Self::Error> {
      (**self).begin_transaction(level)
   }

   fn create_command(&self) -> Result<Self::Command, Self::Error> {
      (**self).create_command()
   }

   fn close(&self) -> Result<(), Self::Error> {
      (**self).close()
   }
}
