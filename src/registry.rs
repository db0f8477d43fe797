//! In-memory registry of the collections and extensions known to one
//! database. Validates registrations; the on-disk counterpart lives in
//! [`schema`](crate::schema).

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct CollectionRegistry {
   collections: HashMap<String, RegisteredCollection>,
}

#[derive(Debug)]
pub(crate) struct RegisteredCollection {
   pub schema_version: u64,
   pub extensions: Vec<String>,
}

impl CollectionRegistry {
   pub fn register_collection(&mut self, name: &str, schema_version: u64) -> Result<()> {
      if self.collections.contains_key(name) {
         return Err(Error::DuplicateCollection(name.to_string()));
      }
      self.collections.insert(
         name.to_string(),
         RegisteredCollection {
            schema_version,
            extensions: Vec::new(),
         },
      );
      Ok(())
   }

   pub fn register_extension(&mut self, collection: &str, extension: &str) -> Result<()> {
      let registered = self
         .collections
         .get_mut(collection)
         .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;
      if registered.extensions.iter().any(|e| e == extension) {
         return Err(Error::DuplicateExtension {
            collection: collection.to_string(),
            extension: extension.to_string(),
         });
      }
      registered.extensions.push(extension.to_string());
      Ok(())
   }

   pub fn is_registered(&self, name: &str) -> bool {
      self.collections.contains_key(name)
   }

   #[cfg(test)]
   pub fn schema_version(&self, name: &str) -> Option<u64> {
      self.collections.get(name).map(|c| c.schema_version)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_duplicate_collection_rejected() {
      let mut registry = CollectionRegistry::default();
      registry.register_collection("users", 1).unwrap();
      assert_eq!(registry.schema_version("users"), Some(1));

      let err = registry.register_collection("users", 1).unwrap_err();
      assert!(matches!(err, Error::DuplicateCollection(name) if name == "users"));
   }

   #[test]
   fn test_extension_requires_known_collection() {
      let mut registry = CollectionRegistry::default();
      let err = registry.register_extension("users", "index").unwrap_err();
      assert!(matches!(err, Error::UnknownCollection(_)));
   }

   #[test]
   fn test_duplicate_extension_rejected() {
      let mut registry = CollectionRegistry::default();
      registry.register_collection("users", 1).unwrap();
      registry.register_extension("users", "index").unwrap();

      let err = registry.register_extension("users", "index").unwrap_err();
      assert!(matches!(err, Error::DuplicateExtension { .. }));
   }
}
