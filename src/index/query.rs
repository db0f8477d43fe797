//! Compilation of predicates into the SQL statements behind the indexed
//! query surface, and pre-compiled queries.

use std::marker::PhantomData;

use turf_sqlite::Scalar;

use crate::collection::IndexedCollection;
use crate::index::predicate::Predicate;
use crate::schema::{index_table, quote_identifier, value_table};

/// `COUNT(*)` over the side table.
pub(crate) fn count_sql(collection: &str, predicate: &str) -> String {
   format!(
      "SELECT COUNT(*) FROM {} WHERE {predicate}",
      quote_identifier(&index_table(collection)),
   )
}

/// Matching keys, ordered for stable results.
pub(crate) fn keys_sql(collection: &str, predicate: &str) -> String {
   format!(
      "SELECT key FROM {} WHERE {predicate} ORDER BY key",
      quote_identifier(&index_table(collection)),
   )
}

/// Matching rows of the value table, joined through the side table.
///
/// Predicate columns live only on the index side; the value table
/// contributes `key`, `valueData`, and `rowVersion`, so unqualified
/// property names stay unambiguous.
pub(crate) fn values_sql(collection: &str, predicate: &str) -> String {
   format!(
      "SELECT c.key, c.valueData, c.rowVersion FROM {value} AS c \
       JOIN {index} AS i ON i.key = c.key WHERE {predicate} ORDER BY c.key",
      value = quote_identifier(&value_table(collection)),
      index = quote_identifier(&index_table(collection)),
   )
}

/// A values query compiled ahead of time.
///
/// Both the SQL and the bound scalars are fixed when the query is prepared;
/// re-binding placeholders for later executions is not supported. Prepare a
/// new query for different operands.
pub struct PreparedValuesQuery<C: IndexedCollection> {
   sql: String,
   bindings: Vec<Scalar>,
   _collection: PhantomData<fn() -> C>,
}

impl<C: IndexedCollection> PreparedValuesQuery<C> {
   /// Compiles `predicate` into the values query for `collection`.
   pub fn new(collection: &C, predicate: Predicate<C>) -> Self {
      let sql = values_sql(collection.name(), predicate.sql());
      Self {
         sql,
         bindings: predicate.bindings().to_vec(),
         _collection: PhantomData,
      }
   }

   pub(crate) fn sql(&self) -> &str {
      &self.sql
   }

   pub(crate) fn bindings(&self) -> &[Scalar] {
      &self.bindings
   }
}

impl<C: IndexedCollection> Clone for PreparedValuesQuery<C> {
   fn clone(&self) -> Self {
      Self {
         sql: self.sql.clone(),
         bindings: self.bindings.clone(),
         _collection: PhantomData,
      }
   }
}
