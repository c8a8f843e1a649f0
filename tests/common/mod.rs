//! Recording mock driver shared by the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use db_session::{Command, Connection, FromConnectionString, IsolationLevel, Transaction};
use parking_lot::Mutex;

/// Driver calls in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
   Open,
   Begin(IsolationLevel),
   CreateCommand(u64),
   Execute {
      command: u64,
      transaction: Option<u64>,
   },
   Commit(u64),
   DisposeTransaction {
      id: u64,
      committed: bool,
   },
   Close,
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
   pub fn new() -> Self {
      Self::default()
   }

   fn push(&self, event: Event) {
      self.0.lock().push(event);
   }

   pub fn events(&self) -> Vec<Event> {
      self.0.lock().clone()
   }

   pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
      self.0.lock().iter().filter(|event| matches(event)).count()
   }

   pub fn position(&self, matches: impl Fn(&Event) -> bool) -> Option<usize> {
      self.0.lock().iter().position(|event| matches(event))
   }
}

#[derive(Debug, thiserror::Error)]
#[error("mock driver: {0}")]
pub struct MockError(pub &'static str);

/// Driver calls the mock should refuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
   pub open: bool,
   pub begin: bool,
   pub create_command: bool,
   pub commit: bool,
   pub close: bool,
}

pub struct MockConnection {
   log: EventLog,
   open: AtomicBool,
   failures: Failures,
   next_id: AtomicU64,
   connection_string: Option<String>,
}

impl MockConnection {
   pub fn new(log: &EventLog) -> Self {
      Self::failing(log, Failures::default())
   }

   pub fn failing(log: &EventLog, failures: Failures) -> Self {
      Self {
         log: log.clone(),
         open: AtomicBool::new(false),
         failures,
         next_id: AtomicU64::new(1),
         connection_string: None,
      }
   }

   /// A connection someone else already opened.
   pub fn already_open(log: &EventLog) -> Self {
      let connection = Self::new(log);
      connection.open.store(true, Ordering::SeqCst);
      connection
   }

   pub fn log(&self) -> &EventLog {
      &self.log
   }

   pub fn connection_string(&self) -> Option<&str> {
      self.connection_string.as_deref()
   }

   fn next_id(&self) -> u64 {
      self.next_id.fetch_add(1, Ordering::SeqCst)
   }
}

impl Connection for MockConnection {
   type Error = MockError;
   type Transaction = MockTransaction;
   type Command = MockCommand;

   fn is_open(&self) -> bool {
      self.open.load(Ordering::SeqCst)
   }

   fn open(&self) -> Result<(), MockError> {
      if self.failures.open {
         return Err(MockError("authentication failed"));
      }
      self.open.store(true, Ordering::SeqCst);
      self.log.push(Event::Open);
      Ok(())
   }

   fn begin_transaction(&self, level: IsolationLevel) -> Result<MockTransaction, MockError> {
      if self.failures.begin {
         return Err(MockError("database is locked"));
      }
      let id = self.next_id();
      self.log.push(Event::Begin(level));
      Ok(MockTransaction {
         id,
         level,
         log: self.log.clone(),
         committed: AtomicBool::new(false),
         fail_commit: self.failures.commit,
      })
   }

   fn create_command(&self) -> Result<MockCommand, MockError> {
      if self.failures.create_command {
         return Err(MockError("connection is busy"));
      }
      let id = self.next_id();
      self.log.push(Event::CreateCommand(id));
      Ok(MockCommand {
         id,
         transaction: None,
         log: self.log.clone(),
      })
   }

   fn close(&self) -> Result<(), MockError> {
      if !self.open.swap(false, Ordering::SeqCst) {
         return Ok(());
      }
      self.log.push(Event::Close);
      if self.failures.close {
         return Err(MockError("socket reset"));
      }
      Ok(())
   }
}

impl FromConnectionString for MockConnection {
   type Error = MockError;

   fn from_connection_string(connection_string: &str) -> Result<Self, MockError> {
      if !connection_string.starts_with("mock://") {
         return Err(MockError("malformed connection string"));
      }
      let mut connection = Self::new(&EventLog::new());
      connection.connection_string = Some(connection_string.to_string());
      Ok(connection)
   }
}

pub struct MockTransaction {
   id: u64,
   level: IsolationLevel,
   log: EventLog,
   committed: AtomicBool,
   fail_commit: bool,
}

impl MockTransaction {
   pub fn id(&self) -> u64 {
      self.id
   }
}

impl Transaction for MockTransaction {
   type Error = MockError;

   fn isolation_level(&self) -> IsolationLevel {
      self.level
   }

   fn commit(&self) -> Result<(), MockError> {
      if self.fail_commit {
         return Err(MockError("could not serialize access"));
      }
      if self.committed.swap(true, Ordering::SeqCst) {
         return Err(MockError("transaction already committed"));
      }
      self.log.push(Event::Commit(self.id));
      Ok(())
   }
}

impl Drop for MockTransaction {
   fn drop(&mut self) {
      self.log.push(Event::DisposeTransaction {
         id: self.id,
         committed: self.committed.load(Ordering::SeqCst),
      });
   }
}

pub struct MockCommand {
   id: u64,
   transaction: Option<u64>,
   log: EventLog,
}

impl MockCommand {
   pub fn id(&self) -> u64 {
      self.id
   }

   pub fn transaction_id(&self) -> Option<u64> {
      self.transaction
   }

   pub fn execute(&self) {
      self.log.push(Event::Execute {
         command: self.id,
         transaction: self.transaction,
      });
   }
}

impl Command for MockCommand {
   type Transaction = MockTransaction;

   fn set_transaction(&mut self, transaction: &MockTransaction) {
      self.transaction = Some(transaction.id());
   }

   fn has_transaction(&self) -> bool {
      self.transaction.is_some()
   }
}

pub fn init_tracing() {
   let _ = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::DEBUG)
      .with_test_writer()
      .try_init();
}
