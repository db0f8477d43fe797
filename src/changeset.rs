//! Change sets: the per-commit record of key-level mutations.
//!
//! A [`ChangeSetBuilder`] accumulates changes while a write transaction runs;
//! commit freezes it into an immutable [`ChangeSet`] stamped with the commit
//! sequence number and hands it to the observation pipeline. Rolled-back
//! transactions discard the builder without publishing.
//!
//! A remove-all supersedes whatever was recorded for its collection before
//! it; changes recorded afterwards follow the marker in commit order, so
//! observers replaying a change set see the same sequence the writer
//! produced.

use indexmap::IndexMap;

use crate::cache::Invalidation;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
   Inserted,
   Updated,
   Removed,
}

/// One key-level mutation within a committed transaction.
#[derive(Debug, Clone)]
pub struct Change {
   pub key: String,
   pub kind: ChangeKind,
   /// Row version assigned to the mutation by the writer.
   pub row_version: u64,
}

/// The changes one committed transaction made to one collection, in commit
/// order.
#[derive(Debug, Clone, Default)]
pub struct CollectionChangeSet {
   all_removed: bool,
   changes: Vec<Change>,
}

impl CollectionChangeSet {
   /// True when the transaction removed every value of the collection
   /// (before any of the per-key changes listed afterwards).
   pub fn all_values_removed(&self) -> bool {
      self.all_removed
   }

   /// Ordered key-level changes.
   pub fn changes(&self) -> &[Change] {
      &self.changes
   }

   /// Whether `key` was touched by this transaction.
   pub fn has_change_for(&self, key: &str) -> bool {
      self.all_removed || self.changes.iter().any(|c| c.key == key)
   }

   pub fn is_empty(&self) -> bool {
      !self.all_removed && self.changes.is_empty()
   }
}

/// The per-commit record of mutations across all collections.
///
/// Collections appear in first-touch order; changes within a collection in
/// commit order.
#[derive(Debug, Clone)]
pub struct ChangeSet {
   commit_seq: u64,
   collections: IndexMap<String, CollectionChangeSet>,
}

impl ChangeSet {
   /// Position of this change set in the database's total commit order.
   pub fn commit_sequence(&self) -> u64 {
      self.commit_seq
   }

   /// The changes made to `collection`, if any.
   pub fn for_collection(&self, collection: &str) -> Option<&CollectionChangeSet> {
      self.collections.get(collection)
   }

   /// Names of the collections this transaction touched, in first-touch
   /// order.
   pub fn collection_names(&self) -> impl Iterator<Item = &str> {
      self.collections.keys().map(String::as_str)
   }

   pub fn is_empty(&self) -> bool {
      self.collections.values().all(CollectionChangeSet::is_empty)
   }
}

/// Accumulates a transaction's changes; frozen into a [`ChangeSet`] on
/// commit.
#[derive(Debug, Default)]
pub(crate) struct ChangeSetBuilder {
   collections: IndexMap<String, CollectionChangeSet>,
}

impl ChangeSetBuilder {
   pub fn record(&mut self, collection: &str, key: &str, kind: ChangeKind, row_version: u64) {
      self
         .collections
         .entry(collection.to_string())
         .or_default()
         .changes
         .push(Change {
            key: key.to_string(),
            kind,
            row_version,
         });
   }

   pub fn record_all_removed(&mut self, collection: &str) {
      let entry = self.collections.entry(collection.to_string()).or_default();
      entry.all_removed = true;
      entry.changes.clear();
   }

   /// Invalidation messages for every sibling connection's cache.
   pub fn invalidations(&self) -> Vec<Invalidation> {
      let mut messages = Vec::new();
      for (name, changes) in &self.collections {
         if changes.all_removed {
            messages.push(Invalidation::All {
               collection: name.clone(),
            });
         }
         for change in &changes.changes {
            messages.push(Invalidation::Key {
               collection: name.clone(),
               key: change.key.clone(),
            });
         }
      }
      messages
   }

   pub fn is_empty(&self) -> bool {
      self.collections.values().all(CollectionChangeSet::is_empty)
   }

   pub fn freeze(self, commit_seq: u64) -> ChangeSet {
      ChangeSet {
         commit_seq,
         collections: self.collections,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_changes_keep_commit_order() {
      let mut builder = ChangeSetBuilder::default();
      builder.record("users", "a", ChangeKind::Inserted, 1);
      builder.record("users", "b", ChangeKind::Inserted, 2);
      builder.record("users", "a", ChangeKind::Updated, 3);

      let set = builder.freeze(1);
      let users = set.for_collection("users").unwrap();
      let kinds: Vec<_> = users.changes().iter().map(|c| (c.key.as_str(), c.kind)).collect();
      assert_eq!(
         kinds,
         vec![
            ("a", ChangeKind::Inserted),
            ("b", ChangeKind::Inserted),
            ("a", ChangeKind::Updated),
         ],
      );
      assert!(users.has_change_for("b"));
      assert!(!users.has_change_for("c"));
   }

   #[test]
   fn test_remove_all_supersedes_earlier_changes() {
      let mut builder = ChangeSetBuilder::default();
      builder.record("users", "a", ChangeKind::Inserted, 1);
      builder.record_all_removed("users");
      builder.record("users", "b", ChangeKind::Inserted, 2);

      let set = builder.freeze(1);
      let users = set.for_collection("users").unwrap();
      assert!(users.all_values_removed());
      assert_eq!(users.changes().len(), 1);
      assert_eq!(users.changes()[0].key, "b");
      // The marker makes every key read as changed.
      assert!(users.has_change_for("a"));
   }

   #[test]
   fn test_collections_in_first_touch_order() {
      let mut builder = ChangeSetBuilder::default();
      builder.record("movies", "m1", ChangeKind::Inserted, 1);
      builder.record("users", "a", ChangeKind::Inserted, 2);
      builder.record("movies", "m2", ChangeKind::Inserted, 3);

      let set = builder.freeze(7);
      assert_eq!(set.commit_sequence(), 7);
      let names: Vec<_> = set.collection_names().collect();
      assert_eq!(names, vec!["movies", "users"]);
   }

   #[test]
   fn test_empty_builder_freezes_empty() {
      let builder = ChangeSetBuilder::default();
      assert!(builder.is_empty());
      assert!(builder.freeze(1).is_empty());
   }
}
