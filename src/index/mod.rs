//! Collection extensions and the secondary-index extension.
//!
//! An extension is an auxiliary data structure maintained alongside a
//! collection. The transaction engine drives it: registration runs
//! `install` / `reinstall_if_version_mismatch` / `backfill`, and the write
//! pipeline forwards every mutation through the `on_*` callbacks inside the
//! same transaction, so extension state commits or rolls back atomically
//! with the rows it mirrors.

mod predicate;
mod property;
pub(crate) mod query;

pub use predicate::Predicate;
pub use property::{AnyProperty, IndexScalar, IndexedProperty};
pub use query::PreparedValuesQuery;

use std::sync::Arc;

use tracing::debug;
use turf_sqlite::{Scalar, SqlSession};

use crate::collection::TurfCollection;
use crate::error::{Error, Result};
use crate::schema::{index_table, quote_identifier, validate_name};

/// An auxiliary structure maintained alongside a collection, receiving every
/// mutation of it.
pub trait CollectionExtension: Send + Sync {
   /// Value type of the owning collection.
   type Value;

   /// Name of the extension, unique within its collection.
   fn name(&self) -> &str;

   /// Version of the extension's own storage layout.
   fn version(&self) -> u64;

   /// Creates the extension's storage if it does not exist.
   fn install(&self, session: &SqlSession) -> Result<()>;

   /// Drops and recreates the extension's storage when `stored` predates
   /// [`version`](Self::version). Returns whether a reinstall happened (and
   /// a backfill is therefore required).
   fn reinstall_if_version_mismatch(
      &self,
      session: &SqlSession,
      stored: Option<u64>,
   ) -> Result<bool>;

   /// Streams every live row of the parent collection into freshly created
   /// storage.
   fn backfill(
      &self,
      session: &SqlSession,
      rows: &mut dyn Iterator<Item = (String, Self::Value)>,
   ) -> Result<()>;

   fn on_insert(&self, session: &SqlSession, key: &str, value: &Self::Value) -> Result<()>;

   fn on_update(&self, session: &SqlSession, key: &str, value: &Self::Value) -> Result<()>;

   fn on_remove(&self, session: &SqlSession, key: &str) -> Result<()>;

   fn on_remove_all(&self, session: &SqlSession) -> Result<()>;
}

/// A secondary index over a collection: each value is projected through a
/// list of typed properties into one row of a side table, one column per
/// property, queryable through [`Predicate`]s.
pub struct SecondaryIndex<C: TurfCollection> {
   collection_name: String,
   version: u64,
   properties: Arc<[AnyProperty<C>]>,
}

impl<C: TurfCollection> SecondaryIndex<C> {
   /// Builds the index descriptor for `collection_name` from its lifted
   /// property list.
   pub fn new(
      collection_name: impl Into<String>,
      version: u64,
      properties: Vec<AnyProperty<C>>,
   ) -> Self {
      Self {
         collection_name: collection_name.into(),
         version,
         properties: properties.into(),
      }
   }

   /// The properties projected into the side table, in column order.
   pub fn properties(&self) -> &[AnyProperty<C>] {
      &self.properties
   }

   pub(crate) fn table(&self) -> String {
      index_table(&self.collection_name)
   }

   fn validate_properties(&self) -> Result<()> {
      for property in self.properties.iter() {
         validate_name(property.name())?;
         if matches!(property.name(), "key" | "valueData" | "rowVersion") {
            return Err(Error::ReservedPropertyName(property.name().to_string()));
         }
      }
      Ok(())
   }

   fn create_table_sql(&self) -> String {
      let mut columns = vec!["key TEXT PRIMARY KEY NOT NULL".to_string()];
      columns.extend(
         self
            .properties
            .iter()
            .map(AnyProperty::column_declaration),
      );
      format!(
         "CREATE TABLE IF NOT EXISTS {} ({})",
         quote_identifier(&self.table()),
         columns.join(", "),
      )
   }

   fn upsert_sql(&self) -> String {
      let mut columns = vec!["key".to_string()];
      columns.extend(
         self
            .properties
            .iter()
            .map(|p| quote_identifier(p.name())),
      );
      let placeholders = vec!["?"; columns.len()].join(", ");
      format!(
         "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
         quote_identifier(&self.table()),
         columns.join(", "),
      )
   }

   fn upsert(&self, session: &SqlSession, key: &str, value: &C::Value) -> Result<()> {
      let mut params = Vec::with_capacity(self.properties.len() + 1);
      params.push(Scalar::Text(key.to_string()));
      params.extend(self.properties.iter().map(|p| p.project(value)));
      session.execute(&self.upsert_sql(), &params)?;
      Ok(())
   }
}

impl<C: TurfCollection> Clone for SecondaryIndex<C> {
   fn clone(&self) -> Self {
      Self {
         collection_name: self.collection_name.clone(),
         version: self.version,
         properties: Arc::clone(&self.properties),
      }
   }
}

impl<C: TurfCollection> CollectionExtension for SecondaryIndex<C> {
   type Value = C::Value;

   fn name(&self) -> &str {
      "index"
   }

   fn version(&self) -> u64 {
      self.version
   }

   fn install(&self, session: &SqlSession) -> Result<()> {
      self.validate_properties()?;
      session.exec(&self.create_table_sql())?;
      Ok(())
   }

   fn reinstall_if_version_mismatch(
      &self,
      session: &SqlSession,
      stored: Option<u64>,
   ) -> Result<bool> {
      if stored.is_some_and(|v| v >= self.version) {
         self.install(session)?;
         return Ok(false);
      }
      debug!(
         collection = %self.collection_name,
         stored = ?stored,
         version = self.version,
         "reinstalling index side table"
      );
      session.exec(&format!(
         "DROP TABLE IF EXISTS {}",
         quote_identifier(&self.table()),
      ))?;
      self.install(session)?;
      Ok(true)
   }

   fn backfill(
      &self,
      session: &SqlSession,
      rows: &mut dyn Iterator<Item = (String, Self::Value)>,
   ) -> Result<()> {
      let mut count = 0usize;
      for (key, value) in rows {
         self.upsert(session, &key, &value)?;
         count += 1;
      }
      debug!(collection = %self.collection_name, rows = count, "index backfill complete");
      Ok(())
   }

   fn on_insert(&self, session: &SqlSession, key: &str, value: &Self::Value) -> Result<()> {
      self.upsert(session, key, value)
   }

   fn on_update(&self, session: &SqlSession, key: &str, value: &Self::Value) -> Result<()> {
      self.upsert(session, key, value)
   }

   fn on_remove(&self, session: &SqlSession, key: &str) -> Result<()> {
      session.execute(
         &format!("DELETE FROM {} WHERE key = ?", quote_identifier(&self.table())),
         &[Scalar::Text(key.to_string())],
      )?;
      Ok(())
   }

   fn on_remove_all(&self, session: &SqlSession) -> Result<()> {
      session.execute(
         &format!("DELETE FROM {}", quote_identifier(&self.table())),
         &[],
      )?;
      Ok(())
   }
}
