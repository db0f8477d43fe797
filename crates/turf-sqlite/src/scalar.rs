//! The typed scalar set exchanged with SQLite.

use rusqlite::types::{ToSqlOutput, ValueRef};

/// A single column value with its native SQLite type.
///
/// Booleans are stored as `Integer` (0/1) by the layers above; this type only
/// models what the database itself can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl Scalar {
   /// Returns true if this value is null.
   pub fn is_null(&self) -> bool {
      matches!(self, Scalar::Null)
   }

   /// Attempts to get this value as an integer.
   pub fn as_integer(&self) -> Option<i64> {
      match self {
         Scalar::Integer(i) => Some(*i),
         _ => None,
      }
   }

   /// Attempts to get this value as a float.
   pub fn as_real(&self) -> Option<f64> {
      match self {
         Scalar::Real(r) => Some(*r),
         _ => None,
      }
   }

   /// Attempts to get this value as a string reference.
   pub fn as_text(&self) -> Option<&str> {
      match self {
         Scalar::Text(s) => Some(s),
         _ => None,
      }
   }

   /// Attempts to get this value as a blob reference.
   pub fn as_blob(&self) -> Option<&[u8]> {
      match self {
         Scalar::Blob(b) => Some(b),
         _ => None,
      }
   }
}

/// The declared type of an indexed column.
///
/// Nullability is tracked separately; a nullable column keeps the kind of its
/// wrapped type and simply drops the `NOT NULL` constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
   Integer,
   Real,
   Text,
   Blob,
}

impl ScalarKind {
   /// The SQLite column type keyword for this kind.
   pub fn column_type(self) -> &'static str {
      match self {
         ScalarKind::Integer => "INTEGER",
         ScalarKind::Real => "REAL",
         ScalarKind::Text => "TEXT",
         ScalarKind::Blob => "BLOB",
      }
   }
}

impl rusqlite::ToSql for Scalar {
   fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
      Ok(match self {
         Scalar::Null => ToSqlOutput::Borrowed(ValueRef::Null),
         Scalar::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
         Scalar::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
         Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
         Scalar::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
      })
   }
}

impl From<ValueRef<'_>> for Scalar {
   fn from(value: ValueRef<'_>) -> Self {
      match value {
         ValueRef::Null => Scalar::Null,
         ValueRef::Integer(i) => Scalar::Integer(i),
         ValueRef::Real(r) => Scalar::Real(r),
         ValueRef::Text(t) => Scalar::Text(String::from_utf8_lossy(t).into_owned()),
         ValueRef::Blob(b) => Scalar::Blob(b.to_vec()),
      }
   }
}

impl From<i64> for Scalar {
   fn from(value: i64) -> Self {
      Scalar::Integer(value)
   }
}

impl From<f64> for Scalar {
   fn from(value: f64) -> Self {
      Scalar::Real(value)
   }
}

impl From<bool> for Scalar {
   fn from(value: bool) -> Self {
      Scalar::Integer(value as i64)
   }
}

impl From<String> for Scalar {
   fn from(value: String) -> Self {
      Scalar::Text(value)
   }
}

impl From<&str> for Scalar {
   fn from(value: &str) -> Self {
      Scalar::Text(value.to_string())
   }
}

impl From<Vec<u8>> for Scalar {
   fn from(value: Vec<u8>) -> Self {
      Scalar::Blob(value)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_accessors() {
      assert!(Scalar::Null.is_null());
      assert_eq!(Scalar::Integer(7).as_integer(), Some(7));
      assert_eq!(Scalar::Real(1.5).as_real(), Some(1.5));
      assert_eq!(Scalar::Text("a".into()).as_text(), Some("a"));
      assert_eq!(Scalar::Blob(vec![1]).as_blob(), Some(&[1u8][..]));
      assert_eq!(Scalar::Text("a".into()).as_integer(), None);
   }

   #[test]
   fn test_bool_maps_to_integer() {
      assert_eq!(Scalar::from(true), Scalar::Integer(1));
      assert_eq!(Scalar::from(false), Scalar::Integer(0));
   }

   #[test]
   fn test_column_types() {
      assert_eq!(ScalarKind::Integer.column_type(), "INTEGER");
      assert_eq!(ScalarKind::Real.column_type(), "REAL");
      assert_eq!(ScalarKind::Text.column_type(), "TEXT");
      assert_eq!(ScalarKind::Blob.column_type(), "BLOB");
   }
}
