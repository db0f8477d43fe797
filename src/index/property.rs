//! Indexed properties: typed projections from a collection's value to one
//! SQL scalar column.
//!
//! [`IndexedProperty<C, T>`] is the typed front end the application builds
//! predicates against; [`lift`](IndexedProperty::lift) erases `T` into an
//! [`AnyProperty`] so one index can carry a heterogeneous property list.

use std::sync::Arc;

use turf_sqlite::{Scalar, ScalarKind};

use crate::collection::TurfCollection;

/// A Rust type that can be projected into an indexed SQL column.
pub trait IndexScalar: Send + Sync + 'static {
   /// Column type of the projection.
   const KIND: ScalarKind;
   /// Whether the column admits NULL.
   const NULLABLE: bool = false;

   fn into_scalar(self) -> Scalar;
}

impl IndexScalar for i64 {
   const KIND: ScalarKind = ScalarKind::Integer;

   fn into_scalar(self) -> Scalar {
      Scalar::Integer(self)
   }
}

impl IndexScalar for bool {
   const KIND: ScalarKind = ScalarKind::Integer;

   fn into_scalar(self) -> Scalar {
      Scalar::Integer(self as i64)
   }
}

impl IndexScalar for f64 {
   const KIND: ScalarKind = ScalarKind::Real;

   fn into_scalar(self) -> Scalar {
      Scalar::Real(self)
   }
}

impl IndexScalar for String {
   const KIND: ScalarKind = ScalarKind::Text;

   fn into_scalar(self) -> Scalar {
      Scalar::Text(self)
   }
}

impl IndexScalar for Vec<u8> {
   const KIND: ScalarKind = ScalarKind::Blob;

   fn into_scalar(self) -> Scalar {
      Scalar::Blob(self)
   }
}

impl<T: IndexScalar> IndexScalar for Option<T> {
   const KIND: ScalarKind = T::KIND;
   const NULLABLE: bool = true;

   fn into_scalar(self) -> Scalar {
      match self {
         Some(value) => value.into_scalar(),
         None => Scalar::Null,
      }
   }
}

/// A typed indexed property of collection `C`: a column name plus a pure
/// projection from the collection's value.
///
/// Projections must be plain functions of the value (no captured state), so
/// the property stays `Copy` and the projection of a stored row is stable.
pub struct IndexedProperty<C: TurfCollection, T: IndexScalar> {
   name: &'static str,
   project: fn(&C::Value) -> T,
}

impl<C: TurfCollection, T: IndexScalar> IndexedProperty<C, T> {
   pub fn new(name: &'static str, project: fn(&C::Value) -> T) -> Self {
      Self { name, project }
   }

   /// Column name of the property in the index side table.
   pub fn name(&self) -> &'static str {
      self.name
   }

   pub(crate) fn project(&self, value: &C::Value) -> T {
      (self.project)(value)
   }

   /// Erases the property's scalar type so it can join a heterogeneous
   /// property list.
   pub fn lift(&self) -> AnyProperty<C> {
      let project = self.project;
      AnyProperty {
         name: self.name,
         kind: T::KIND,
         nullable: T::NULLABLE,
         project: Arc::new(move |value| project(value).into_scalar()),
      }
   }
}

impl<C: TurfCollection, T: IndexScalar> Clone for IndexedProperty<C, T> {
   fn clone(&self) -> Self {
      *self
   }
}

impl<C: TurfCollection, T: IndexScalar> Copy for IndexedProperty<C, T> {}

/// A type-erased indexed property: column name, column kind, and a
/// projection straight to [`Scalar`].
pub struct AnyProperty<C: TurfCollection> {
   name: &'static str,
   kind: ScalarKind,
   nullable: bool,
   project: Arc<dyn Fn(&C::Value) -> Scalar + Send + Sync>,
}

impl<C: TurfCollection> AnyProperty<C> {
   pub fn name(&self) -> &'static str {
      self.name
   }

   pub fn kind(&self) -> ScalarKind {
      self.kind
   }

   pub fn nullable(&self) -> bool {
      self.nullable
   }

   pub(crate) fn project(&self, value: &C::Value) -> Scalar {
      (self.project)(value)
   }

   /// Column declaration for the side table's CREATE TABLE.
   pub(crate) fn column_declaration(&self) -> String {
      let not_null = if self.nullable { "" } else { " NOT NULL" };
      format!(
         "{} {}{not_null}",
         crate::schema::quote_identifier(self.name),
         self.kind.column_type(),
      )
   }

}

impl<C: TurfCollection> Clone for AnyProperty<C> {
   fn clone(&self) -> Self {
      Self {
         name: self.name,
         kind: self.kind,
         nullable: self.nullable,
         project: Arc::clone(&self.project),
      }
   }
}
