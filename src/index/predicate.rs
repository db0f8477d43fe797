//! Typed predicate algebra over indexed properties, compiled to SQL WHERE
//! fragments.
//!
//! Every node carries its SQL fragment plus the ordered scalars bound to its
//! placeholders; combinators concatenate both. Type mismatches are
//! unrepresentable: a predicate on `C` can only be built from `C`'s own
//! properties, comparisons take the property's scalar type, `is_like` exists
//! only on string-typed properties, and `is_nil`/`is_not_nil` only on
//! nullable ones.

use std::marker::PhantomData;

use turf_sqlite::Scalar;

use crate::collection::TurfCollection;
use crate::index::property::{IndexScalar, IndexedProperty};
use crate::schema::quote_identifier;

/// A compiled boolean expression over the indexed properties of `C`.
pub struct Predicate<C: TurfCollection> {
   sql: String,
   bindings: Vec<Scalar>,
   _collection: PhantomData<fn() -> C>,
}

impl<C: TurfCollection> Predicate<C> {
   fn new(sql: String, bindings: Vec<Scalar>) -> Self {
      Self {
         sql,
         bindings,
         _collection: PhantomData,
      }
   }

   /// Both predicates hold.
   pub fn and(self, other: Predicate<C>) -> Predicate<C> {
      self.combine("AND", other)
   }

   /// Either predicate holds.
   pub fn or(self, other: Predicate<C>) -> Predicate<C> {
      self.combine("OR", other)
   }

   /// The predicate does not hold.
   pub fn not(self) -> Predicate<C> {
      Predicate::new(format!("NOT ({})", self.sql), self.bindings)
   }

   fn combine(self, op: &str, other: Predicate<C>) -> Predicate<C> {
      let mut bindings = self.bindings;
      bindings.extend(other.bindings);
      Predicate::new(format!("({}) {op} ({})", self.sql, other.sql), bindings)
   }

   /// The WHERE fragment, with one `?` per binding.
   pub(crate) fn sql(&self) -> &str {
      &self.sql
   }

   /// Scalars bound to the fragment's placeholders, in order.
   pub(crate) fn bindings(&self) -> &[Scalar] {
      &self.bindings
   }
}

impl<C: TurfCollection> Clone for Predicate<C> {
   fn clone(&self) -> Self {
      Self {
         sql: self.sql.clone(),
         bindings: self.bindings.clone(),
         _collection: PhantomData,
      }
   }
}

impl<C: TurfCollection, T: IndexScalar> IndexedProperty<C, T> {
   fn compare(&self, op: &str, value: T) -> Predicate<C> {
      Predicate::new(
         format!("{} {op} ?", quote_identifier(self.name())),
         vec![value.into_scalar()],
      )
   }

   pub fn equals(&self, value: T) -> Predicate<C> {
      self.compare("=", value)
   }

   pub fn not_equals(&self, value: T) -> Predicate<C> {
      self.compare("<>", value)
   }

   pub fn greater_than(&self, value: T) -> Predicate<C> {
      self.compare(">", value)
   }

   pub fn less_than(&self, value: T) -> Predicate<C> {
      self.compare("<", value)
   }

   pub fn at_least(&self, value: T) -> Predicate<C> {
      self.compare(">=", value)
   }

   pub fn at_most(&self, value: T) -> Predicate<C> {
      self.compare("<=", value)
   }

   /// The property's projection is one of `values`.
   ///
   /// An empty list compiles to a constant-false expression.
   pub fn is_in(&self, values: impl IntoIterator<Item = T>) -> Predicate<C> {
      let bindings: Vec<Scalar> = values.into_iter().map(IndexScalar::into_scalar).collect();
      if bindings.is_empty() {
         return Predicate::new("0".to_string(), Vec::new());
      }
      let placeholders = vec!["?"; bindings.len()].join(", ");
      Predicate::new(
         format!("{} IN ({placeholders})", quote_identifier(self.name())),
         bindings,
      )
   }
}

impl<C: TurfCollection> IndexedProperty<C, String> {
   /// SQL LIKE match (`%` and `_` wildcards).
   pub fn is_like(&self, pattern: &str) -> Predicate<C> {
      Predicate::new(
         format!("{} LIKE ?", quote_identifier(self.name())),
         vec![Scalar::Text(pattern.to_string())],
      )
   }

   pub fn is_not_like(&self, pattern: &str) -> Predicate<C> {
      Predicate::new(
         format!("{} NOT LIKE ?", quote_identifier(self.name())),
         vec![Scalar::Text(pattern.to_string())],
      )
   }
}

impl<C: TurfCollection, T: IndexScalar> IndexedProperty<C, Option<T>> {
   /// The projection is NULL.
   ///
   /// Note that `equals(None)` compiles to `= NULL`, which SQL never
   /// satisfies; this is the supported way to match absent values.
   pub fn is_nil(&self) -> Predicate<C> {
      Predicate::new(format!("{} IS NULL", quote_identifier(self.name())), Vec::new())
   }

   /// The projection is non-NULL.
   pub fn is_not_nil(&self) -> Predicate<C> {
      Predicate::new(
         format!("{} IS NOT NULL", quote_identifier(self.name())),
         Vec::new(),
      )
   }
}
