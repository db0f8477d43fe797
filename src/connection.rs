//! Connections: the unit of concurrent access to one database.
//!
//! Every connection owns its own SQL session and its own value caches; the
//! writer lock on the shared database core is the only cross-connection
//! mutex. Commits from sibling connections deposit cache invalidation
//! messages into a per-connection mailbox, drained at the start of the next
//! transaction, so an invalidation always happens-before the snapshot that
//! could observe the new row version.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;
use turf_sqlite::SqlSession;

use crate::cache::{CacheSet, Invalidation};
use crate::changeset::ChangeSetBuilder;
use crate::collection::CollectionsContainer;
use crate::database::DatabaseCore;
use crate::error::Result;
use crate::transaction::{ReadTransaction, ReadWriteTransaction};

/// Connection state shared with the database core for invalidation fan-out.
pub(crate) struct ConnectionCore {
   pub(crate) id: u64,
   pub(crate) session: Mutex<SqlSession>,
   pub(crate) caches: Mutex<CacheSet>,
   mailbox: Mutex<Vec<Invalidation>>,
}

impl ConnectionCore {
   pub(crate) fn new(id: u64, session: SqlSession) -> Self {
      Self {
         id,
         session: Mutex::new(session),
         caches: Mutex::new(CacheSet::default()),
         mailbox: Mutex::new(Vec::new()),
      }
   }

   /// Applies every pending invalidation to this connection's caches.
   /// Called before each transaction begins.
   pub(crate) fn drain_mailbox(&self) {
      let pending = std::mem::take(&mut *self.mailbox.lock());
      if pending.is_empty() {
         return;
      }
      let mut caches = self.caches.lock();
      for invalidation in &pending {
         caches.apply(invalidation);
      }
   }

   /// Deposits invalidation messages from a sibling's commit.
   pub(crate) fn push_invalidations(&self, messages: &[Invalidation]) {
      self.mailbox.lock().extend_from_slice(messages);
   }

   /// Clears any transaction left open by a closure that panicked.
   fn clear_stale_transaction(&self, session: &SqlSession) -> Result<()> {
      if !session.is_autocommit() {
         warn!(connection = self.id, "rolling back transaction left open on session");
         session.rollback()?;
      }
      Ok(())
   }
}

/// A handle for reading and writing one database.
///
/// Connections are cheap but not free (each owns a SQL session); the typical
/// application dedicates one to reads, one to writes, and one to
/// observation. A connection may be used from any thread, one transaction at
/// a time; transactions on distinct connections run in parallel.
pub struct Connection<CC: CollectionsContainer> {
   pub(crate) core: Arc<ConnectionCore>,
   pub(crate) db: Arc<DatabaseCore>,
   pub(crate) collections: Arc<CC>,
}

impl<CC: CollectionsContainer> Connection<CC> {
   /// Runs `body` inside a read (snapshot) transaction.
   ///
   /// The transaction sees the latest committed state as of its start and
   /// is rolled back unconditionally when `body` returns; reads never
   /// commit side effects. The transaction reference must not escape the
   /// closure.
   pub fn read_transaction<R>(
      &self,
      body: impl FnOnce(&ReadTransaction<'_>, &CC) -> Result<R>,
   ) -> Result<R> {
      self.core.drain_mailbox();
      let session_guard = self.core.session.lock();
      let session = &*session_guard;
      self.core.clear_stale_transaction(session)?;
      session.begin_deferred()?;

      let tx = ReadTransaction::new(session, &self.core.caches, &self.db);
      let result = body(&tx, &self.collections);
      drop(tx);

      match session.rollback() {
         Ok(()) => result,
         Err(rollback_error) => result.and(Err(rollback_error.into())),
      }
   }

   /// Runs `body` inside the database's single read/write transaction.
   ///
   /// Blocks until the writer lock is available. On success the transaction
   /// commits, the change set is published to observers, and sibling caches
   /// are invalidated — all before the lock is released, so observer
   /// callbacks for this commit finish before any later write begins. An
   /// `Err` from `body` rolls back and publishes nothing.
   pub fn read_write_transaction<R>(
      &self,
      body: impl FnOnce(&ReadWriteTransaction<'_>, &CC) -> Result<R>,
   ) -> Result<R> {
      let mut writer = self.db.writer.lock();
      self.core.drain_mailbox();
      let session_guard = self.core.session.lock();
      let session = &*session_guard;
      self.core.clear_stale_transaction(session)?;
      session.begin_immediate()?;

      let tx = ReadWriteTransaction::new(
         session,
         &self.core.caches,
         &self.db,
         RefCell::new(ChangeSetBuilder::default()),
         Cell::new(writer.next_row_version),
      );
      let result = body(&tx, &self.collections);
      writer.next_row_version = tx.row_version_watermark();

      match result {
         Ok(value) => {
            if let Err(commit_error) = session.commit() {
               let _ = session.rollback();
               self.invalidate_own_cache(&tx);
               return Err(commit_error.into());
            }

            let builder = tx.into_changes();
            drop(session_guard);
            if !builder.is_empty() {
               let commit_seq = writer.next_commit_seq;
               writer.next_commit_seq += 1;
               let invalidations = builder.invalidations();
               let change_set = builder.freeze(commit_seq);
               self
                  .db
                  .fan_out(self.core.id, &invalidations, &change_set);
            }
            Ok(value)
         }
         Err(error) => {
            if let Err(rollback_error) = session.rollback() {
               warn!(%rollback_error, "rollback after failed write transaction also failed");
            }
            self.invalidate_own_cache(&tx);
            Err(error)
         }
      }
   }

   /// Drops own-cache entries touched by an aborted transaction; the values
   /// cached during the transaction were never committed.
   fn invalidate_own_cache(&self, tx: &ReadWriteTransaction<'_>) {
      let invalidations = tx.touched_invalidations();
      if invalidations.is_empty() {
         return;
      }
      let mut caches = self.core.caches.lock();
      for invalidation in &invalidations {
         caches.apply(invalidation);
      }
   }
}
