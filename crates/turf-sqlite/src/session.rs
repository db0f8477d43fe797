//! A single SQLite connection with typed helpers and explicit transactions.

use std::path::{Path, PathBuf};

use rusqlite::params_from_iter;
use tracing::trace;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::scalar::Scalar;

/// One SQLite connection ("session") owned by a Turf connection.
///
/// ## Usage Pattern
///
/// ```text
/// 1. open() — creates the file if needed, switches to WAL mode
/// 2. begin_deferred() / begin_immediate() — start a snapshot or write txn
/// 3. execute() / query_*() — statements run through the statement cache
/// 4. commit() / rollback()
/// ```
///
/// The session performs no locking of its own; callers serialize access.
#[derive(Debug)]
pub struct SqlSession {
   conn: rusqlite::Connection,
   path: PathBuf,
}

impl SqlSession {
   /// Opens (creating if necessary) the database at `path`.
   ///
   /// Switches the database to WAL journal mode so that concurrent sessions
   /// can read at their own snapshot while one writer commits.
   pub fn open(path: &Path, config: &SessionConfig) -> Result<Self> {
      let conn = rusqlite::Connection::open(path)?;
      conn.busy_timeout(config.busy_timeout)?;
      conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);

      // journal_mode returns the resulting mode as a row, so it cannot go
      // through execute().
      conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
      conn.execute_batch("PRAGMA synchronous=NORMAL")?;

      trace!(path = %path.display(), "opened sqlite session");
      Ok(Self {
         conn,
         path: path.to_path_buf(),
      })
   }

   /// Path of the backing database file.
   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Runs one or more statements that take no parameters and return no rows.
   pub fn exec(&self, sql: &str) -> Result<()> {
      self.conn.execute_batch(sql)?;
      Ok(())
   }

   /// Executes a single statement with bound parameters, returning the number
   /// of affected rows.
   pub fn execute(&self, sql: &str, params: &[Scalar]) -> Result<usize> {
      let mut stmt = self.conn.prepare_cached(sql)?;
      let changed = stmt.execute(params_from_iter(params.iter()))?;
      Ok(changed)
   }

   /// Runs a query and returns every row, each as one `Scalar` per column.
   pub fn query_all(&self, sql: &str, params: &[Scalar]) -> Result<Vec<Vec<Scalar>>> {
      let mut stmt = self.conn.prepare_cached(sql)?;
      let column_count = stmt.column_count();
      let mut rows = stmt.query(params_from_iter(params.iter()))?;
      let mut out = Vec::new();
      while let Some(row) = rows.next()? {
         out.push(scalars_from_row(row, column_count)?);
      }
      Ok(out)
   }

   /// Runs a query expected to produce at most one row.
   pub fn query_one(&self, sql: &str, params: &[Scalar]) -> Result<Option<Vec<Scalar>>> {
      let mut stmt = self.conn.prepare_cached(sql)?;
      let column_count = stmt.column_count();
      let mut rows = stmt.query(params_from_iter(params.iter()))?;
      match rows.next()? {
         Some(row) => Ok(Some(scalars_from_row(row, column_count)?)),
         None => Ok(None),
      }
   }

   /// Runs a query expected to produce at most one row of one column.
   pub fn query_scalar(&self, sql: &str, params: &[Scalar]) -> Result<Option<Scalar>> {
      Ok(self
         .query_one(sql, params)?
         .and_then(|row| row.into_iter().next()))
   }

   /// Starts a read (snapshot) transaction.
   pub fn begin_deferred(&self) -> Result<()> {
      self.exec("BEGIN DEFERRED")
   }

   /// Starts a write transaction, taking the database write lock up front.
   pub fn begin_immediate(&self) -> Result<()> {
      self.exec("BEGIN IMMEDIATE")
   }

   /// Commits the open transaction.
   pub fn commit(&self) -> Result<()> {
      self.exec("COMMIT")
   }

   /// Rolls back the open transaction.
   pub fn rollback(&self) -> Result<()> {
      self.exec("ROLLBACK")
   }

   /// True when no explicit transaction is open on this session.
   pub fn is_autocommit(&self) -> bool {
      self.conn.is_autocommit()
   }
}

fn scalars_from_row(row: &rusqlite::Row<'_>, column_count: usize) -> Result<Vec<Scalar>> {
   let mut scalars = Vec::with_capacity(column_count);
   for i in 0..column_count {
      scalars.push(Scalar::from(row.get_ref(i)?));
   }
   Ok(scalars)
}
