//! Read and read/write transactions, and the typed collection views exposed
//! inside them.
//!
//! A transaction is bound to one connection and one SQL session and is only
//! valid inside the closure it was handed to; the borrow checker enforces
//! that it cannot escape. Typed views are obtained per collection:
//! [`ReadCollection`] for lookups and queries, [`WriteCollection`] (which
//! derefs to the read view) for mutations.

use std::cell::{Cell, RefCell};
use std::ops::Deref;

use parking_lot::Mutex;
use tracing::{trace, warn};
use turf_sqlite::{Scalar, SqlSession};

use crate::cache::{CacheSet, Invalidation};
use crate::changeset::{ChangeKind, ChangeSetBuilder};
use crate::collection::{IndexedCollection, TurfCollection};
use crate::database::DatabaseCore;
use crate::error::{Error, Result};
use crate::index::{Predicate, PreparedValuesQuery};
use crate::index::query::{count_sql, keys_sql, values_sql};
use crate::schema::{self, quote_identifier, value_table};

/// A snapshot of the database, valid for the duration of one closure.
pub struct ReadTransaction<'a> {
   session: &'a SqlSession,
   caches: &'a Mutex<CacheSet>,
   db: &'a DatabaseCore,
}

impl<'a> ReadTransaction<'a> {
   pub(crate) fn new(
      session: &'a SqlSession,
      caches: &'a Mutex<CacheSet>,
      db: &'a DatabaseCore,
   ) -> Self {
      Self { session, caches, db }
   }

   /// A read-only view of `collection` at this transaction's snapshot.
   pub fn read_only<'t, C: TurfCollection>(
      &'t self,
      collection: &'t C,
   ) -> Result<ReadCollection<'t, C>> {
      ensure_registered(self.db, collection)?;
      Ok(ReadCollection {
         session: self.session,
         caches: self.caches,
         collection,
      })
   }
}

/// The database's single write transaction.
///
/// Offers everything a [`ReadTransaction`] does plus mutable views and
/// collection registration. Mutations become visible to other connections
/// only at commit.
pub struct ReadWriteTransaction<'a> {
   session: &'a SqlSession,
   caches: &'a Mutex<CacheSet>,
   db: &'a DatabaseCore,
   changes: RefCell<ChangeSetBuilder>,
   next_row_version: Cell<u64>,
}

impl<'a> ReadWriteTransaction<'a> {
   pub(crate) fn new(
      session: &'a SqlSession,
      caches: &'a Mutex<CacheSet>,
      db: &'a DatabaseCore,
      changes: RefCell<ChangeSetBuilder>,
      next_row_version: Cell<u64>,
   ) -> Self {
      Self {
         session,
         caches,
         db,
         changes,
         next_row_version,
      }
   }

   /// A read-only view of `collection` at this transaction's state,
   /// including its own uncommitted writes.
   pub fn read_only<'t, C: TurfCollection>(
      &'t self,
      collection: &'t C,
   ) -> Result<ReadCollection<'t, C>> {
      ensure_registered(self.db, collection)?;
      Ok(ReadCollection {
         session: self.session,
         caches: self.caches,
         collection,
      })
   }

   /// A read/write view of `collection`.
   pub fn read_write<'t, C: TurfCollection>(
      &'t self,
      collection: &'t C,
   ) -> Result<WriteCollection<'t, C>> {
      ensure_registered(self.db, collection)?;
      Ok(WriteCollection {
         read: ReadCollection {
            session: self.session,
            caches: self.caches,
            collection,
         },
         tx: self,
      })
   }

   /// Registers `collection` and its extensions with the database.
   ///
   /// Creates the value table (or checks its stored schema version),
   /// installs each extension — dropping, recreating, and backfilling its
   /// storage when its version moved forward — and seeds the row-version
   /// counter from the rows already on disk.
   pub fn register_collection<C: TurfCollection>(&self, collection: &C) -> Result<()> {
      let name = collection.name();
      schema::validate_name(name)?;
      if self.db.registry.read().is_registered(name) {
         return Err(Error::DuplicateCollection(name.to_string()));
      }

      schema::install_collection(self.session, name, collection.schema_version())?;
      self
         .db
         .registry
         .write()
         .register_collection(name, collection.schema_version())?;

      // The writer assigns globally monotonic row versions; continue after
      // the largest one already committed.
      let stored_max = self
         .session
         .query_scalar(
            &format!(
               "SELECT MAX(rowVersion) FROM {}",
               quote_identifier(&value_table(name)),
            ),
            &[],
         )?
         .and_then(|s| s.as_integer());
      if let Some(max) = stored_max {
         let next = (max as u64) + 1;
         if next > self.next_row_version.get() {
            self.next_row_version.set(next);
         }
      }

      for extension in collection.extensions() {
         self
            .db
            .registry
            .write()
            .register_extension(name, extension.name())?;

         let stored = schema::stored_extension_version(self.session, extension.name(), name)?;
         let needs_backfill = match stored {
            None => {
               extension.install(self.session)?;
               true
            }
            Some(_) => extension.reinstall_if_version_mismatch(self.session, stored)?,
         };

         if needs_backfill {
            let raw = self.session.query_all(
               &format!(
                  "SELECT key, valueData FROM {}",
                  quote_identifier(&value_table(name)),
               ),
               &[],
            )?;
            let mut rows = raw.into_iter().filter_map(|row| {
               let mut columns = row.into_iter();
               let key = match columns.next() {
                  Some(Scalar::Text(key)) => key,
                  _ => return None,
               };
               let bytes = match columns.next() {
                  Some(Scalar::Blob(bytes)) => bytes,
                  _ => return None,
               };
               collection.deserialize(&bytes).map(|value| (key, value))
            });
            extension.backfill(self.session, &mut rows)?;
         }

         schema::record_extension_version(
            self.session,
            extension.name(),
            name,
            extension.version(),
         )?;
      }

      trace!(collection = %name, "collection registered");
      Ok(())
   }

   pub(crate) fn allocate_row_version(&self) -> u64 {
      let version = self.next_row_version.get();
      self.next_row_version.set(version + 1);
      version
   }

   pub(crate) fn row_version_watermark(&self) -> u64 {
      self.next_row_version.get()
   }

   pub(crate) fn into_changes(self) -> ChangeSetBuilder {
      self.changes.into_inner()
   }

   pub(crate) fn touched_invalidations(&self) -> Vec<Invalidation> {
      self.changes.borrow().invalidations()
   }
}

fn ensure_registered<C: TurfCollection>(db: &DatabaseCore, collection: &C) -> Result<()> {
   if db.registry.read().is_registered(collection.name()) {
      Ok(())
   } else {
      Err(Error::UnknownCollection(collection.name().to_string()))
   }
}

/// Read access to one collection at one snapshot.
pub struct ReadCollection<'t, C: TurfCollection> {
   session: &'t SqlSession,
   caches: &'t Mutex<CacheSet>,
   collection: &'t C,
}

impl<'t, C: TurfCollection> ReadCollection<'t, C> {
   /// The collection descriptor this view reads.
   pub fn collection(&self) -> &C {
      self.collection
   }

   fn table(&self) -> String {
      quote_identifier(&value_table(self.collection.name()))
   }

   /// The value stored under `key`, if present and deserializable.
   ///
   /// Consults the connection's value cache first: the cache hits only when
   /// its entry matches the row version this snapshot sees, so the bytes
   /// are deserialized at most once per version per connection.
   pub fn value_for(&self, key: &str) -> Result<Option<C::Value>> {
      let version = self
         .session
         .query_scalar(
            &format!("SELECT rowVersion FROM {} WHERE key = ?", self.table()),
            &[Scalar::Text(key.to_string())],
         )?
         .and_then(|s| s.as_integer());
      let Some(version) = version else {
         return Ok(None);
      };
      let version = version as u64;

      if let Some(cached) = self.cached(key, version) {
         trace!(collection = %self.collection.name(), key, "value cache hit");
         return Ok(Some(cached));
      }

      let bytes = self.session.query_scalar(
         &format!("SELECT valueData FROM {} WHERE key = ?", self.table()),
         &[Scalar::Text(key.to_string())],
      )?;
      let Some(Scalar::Blob(bytes)) = bytes else {
         return Ok(None);
      };
      Ok(self.decode_and_cache(key, version, &bytes))
   }

   /// Every value in the collection, in key order. Rows whose bytes no
   /// longer deserialize are skipped.
   pub fn all_values(&self) -> Result<Vec<C::Value>> {
      let rows = self.session.query_all(
         &format!(
            "SELECT key, valueData, rowVersion FROM {} ORDER BY key",
            self.table(),
         ),
         &[],
      )?;
      Ok(self.decode_rows(rows))
   }

   /// Every key in the collection, in key order.
   pub fn all_keys(&self) -> Result<Vec<String>> {
      let rows = self
         .session
         .query_all(&format!("SELECT key FROM {} ORDER BY key", self.table()), &[])?;
      Ok(rows
         .into_iter()
         .filter_map(|row| match row.into_iter().next() {
            Some(Scalar::Text(key)) => Some(key),
            _ => None,
         })
         .collect())
   }

   /// Number of stored rows (deserializable or not).
   pub fn count(&self) -> Result<u64> {
      let count = self
         .session
         .query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table()), &[])?
         .and_then(|s| s.as_integer())
         .unwrap_or(0);
      Ok(count as u64)
   }

   fn cached(&self, key: &str, version: u64) -> Option<C::Value> {
      self
         .caches
         .lock()
         .cache_for::<C::Value>(self.collection.name(), self.collection.value_cache_capacity())?
         .get(key, version)
   }

   fn decode_and_cache(&self, key: &str, version: u64, bytes: &[u8]) -> Option<C::Value> {
      match self.collection.deserialize(bytes) {
         Some(value) => {
            if let Some(cache) = self
               .caches
               .lock()
               .cache_for::<C::Value>(self.collection.name(), self.collection.value_cache_capacity())
            {
               cache.put(key, version, value.clone());
            }
            Some(value)
         }
         None => {
            warn!(
               collection = %self.collection.name(),
               key,
               "stored value failed to deserialize; treating as absent"
            );
            None
         }
      }
   }

   /// Decodes `(key, valueData, rowVersion)` rows through the cache.
   fn decode_rows(&self, rows: Vec<Vec<Scalar>>) -> Vec<C::Value> {
      let mut values = Vec::with_capacity(rows.len());
      for row in rows {
         let mut columns = row.into_iter();
         let Some(Scalar::Text(key)) = columns.next() else {
            continue;
         };
         let Some(Scalar::Blob(bytes)) = columns.next() else {
            continue;
         };
         let Some(Scalar::Integer(version)) = columns.next() else {
            continue;
         };
         let version = version as u64;

         if let Some(cached) = self.cached(&key, version) {
            values.push(cached);
         } else if let Some(value) = self.decode_and_cache(&key, version, &bytes) {
            values.push(value);
         }
      }
      values
   }
}

impl<'t, C: IndexedCollection> ReadCollection<'t, C> {
   /// Number of values matching `predicate`.
   pub fn count_values_where(&self, predicate: &Predicate<C>) -> Result<u64> {
      let count = self
         .session
         .query_scalar(
            &count_sql(self.collection.name(), predicate.sql()),
            predicate.bindings(),
         )?
         .and_then(|s| s.as_integer())
         .unwrap_or(0);
      Ok(count as u64)
   }

   /// Keys of the values matching `predicate`, in key order.
   pub fn find_keys_where(&self, predicate: &Predicate<C>) -> Result<Vec<String>> {
      let rows = self.session.query_all(
         &keys_sql(self.collection.name(), predicate.sql()),
         predicate.bindings(),
      )?;
      Ok(rows
         .into_iter()
         .filter_map(|row| match row.into_iter().next() {
            Some(Scalar::Text(key)) => Some(key),
            _ => None,
         })
         .collect())
   }

   /// Values matching `predicate`, deserialized through the value cache.
   pub fn find_values_where(&self, predicate: &Predicate<C>) -> Result<Vec<C::Value>> {
      let rows = self.session.query_all(
         &values_sql(self.collection.name(), predicate.sql()),
         predicate.bindings(),
      )?;
      Ok(self.decode_rows(rows))
   }

   /// Runs a query prepared earlier with [`PreparedValuesQuery::new`].
   ///
   /// Result set is identical to `find_values_where` with the predicate the
   /// query was prepared from.
   pub fn find_values(&self, query: &PreparedValuesQuery<C>) -> Result<Vec<C::Value>> {
      let rows = self.session.query_all(query.sql(), query.bindings())?;
      Ok(self.decode_rows(rows))
   }
}

/// Read/write access to one collection inside a write transaction.
///
/// Derefs to [`ReadCollection`] for lookups and queries.
pub struct WriteCollection<'t, C: TurfCollection> {
   read: ReadCollection<'t, C>,
   tx: &'t ReadWriteTransaction<'t>,
}

impl<'t, C: TurfCollection> Deref for WriteCollection<'t, C> {
   type Target = ReadCollection<'t, C>;

   fn deref(&self) -> &Self::Target {
      &self.read
   }
}

impl<'t, C: TurfCollection> WriteCollection<'t, C> {
   /// Stores `value` under `key`, replacing any previous value.
   ///
   /// Serializes, upserts the row under a fresh row version, notifies the
   /// collection's extensions, records the change, and keeps the
   /// connection's own cache warm with the value just written.
   pub fn set(&self, key: &str, value: C::Value) -> Result<()> {
      let collection = self.read.collection;
      let name = collection.name();
      let bytes = collection
         .serialize(&value)
         .map_err(|source| Error::Serialization {
            collection: name.to_string(),
            reason: source.to_string(),
         })?;

      let existed = self.exists(key)?;
      let row_version = self.tx.allocate_row_version();
      self.read.session.execute(
         &format!(
            "INSERT INTO {} (key, valueData, rowVersion) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
             valueData = excluded.valueData, rowVersion = excluded.rowVersion",
            self.read.table(),
         ),
         &[
            Scalar::Text(key.to_string()),
            Scalar::Blob(bytes),
            Scalar::Integer(row_version as i64),
         ],
      )?;

      for extension in collection.extensions() {
         if existed {
            extension.on_update(self.read.session, key, &value)?;
         } else {
            extension.on_insert(self.read.session, key, &value)?;
         }
      }

      let kind = if existed {
         ChangeKind::Updated
      } else {
         ChangeKind::Inserted
      };
      self
         .tx
         .changes
         .borrow_mut()
         .record(name, key, kind, row_version);

      if let Some(cache) = self
         .read
         .caches
         .lock()
         .cache_for::<C::Value>(name, collection.value_cache_capacity())
      {
         cache.put(key, row_version, value);
      }
      Ok(())
   }

   /// Removes the value under `key`. Removing an absent key is a no-op.
   pub fn remove_value_for(&self, key: &str) -> Result<()> {
      if !self.exists(key)? {
         return Ok(());
      }
      let collection = self.read.collection;
      self.read.session.execute(
         &format!("DELETE FROM {} WHERE key = ?", self.read.table()),
         &[Scalar::Text(key.to_string())],
      )?;
      for extension in collection.extensions() {
         extension.on_remove(self.read.session, key)?;
      }

      let row_version = self.tx.allocate_row_version();
      self
         .tx
         .changes
         .borrow_mut()
         .record(collection.name(), key, ChangeKind::Removed, row_version);
      self
         .read
         .caches
         .lock()
         .invalidate(collection.name(), key);
      Ok(())
   }

   /// Removes every value of the collection.
   pub fn remove_all_values(&self) -> Result<()> {
      let collection = self.read.collection;
      self
         .read
         .session
         .execute(&format!("DELETE FROM {}", self.read.table()), &[])?;
      for extension in collection.extensions() {
         extension.on_remove_all(self.read.session)?;
      }
      self.tx.changes.borrow_mut().record_all_removed(collection.name());
      self.read.caches.lock().invalidate_all(collection.name());
      Ok(())
   }

   fn exists(&self, key: &str) -> Result<bool> {
      Ok(self
         .read
         .session
         .query_scalar(
            &format!("SELECT 1 FROM {} WHERE key = ?", self.read.table()),
            &[Scalar::Text(key.to_string())],
         )?
         .is_some())
   }
}

impl<'t, C: IndexedCollection> WriteCollection<'t, C> {
   /// Removes every value matching `predicate`; returns how many were
   /// removed.
   pub fn remove_values_where(&self, predicate: &Predicate<C>) -> Result<u64> {
      let keys = self.read.find_keys_where(predicate)?;
      for key in &keys {
         self.remove_value_for(key)?;
      }
      Ok(keys.len() as u64)
   }
}
