//! The reactive plumbing: subscriber callbacks, disposables, and the
//! [`Observable`] trait tying the pipeline's nodes together.
//!
//! Every emission pairs the value with the borrowed [`ReadTransaction`]
//! that produced it, so a subscriber can fetch related data from other
//! collections at exactly the snapshot of the triggering commit. The
//! borrow ends with the callback; the transaction cannot escape it.

use crate::transaction::ReadTransaction;

use super::collection::ObservingHandle;
use super::operators::{FirstObservable, MapObservable, SharedObservable};

/// A boxed subscriber callback.
pub type Callback<T> = Box<dyn FnMut(&ReadTransaction<'_>, &T) + Send>;

/// A subscription guard.
///
/// Disposing (or dropping) detaches the subscriber; when a multicasting
/// node loses its last subscriber it disposes its own upstream
/// subscription in turn. Disposal is idempotent.
#[must_use = "dropping a Disposable detaches the subscriber immediately"]
pub struct Disposable {
   action: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposable {
   pub(crate) fn new(action: impl FnOnce() + Send + 'static) -> Self {
      Self {
         action: Some(Box::new(action)),
      }
   }

   /// Detaches the subscriber. Calling this twice is a no-op.
   pub fn dispose(&mut self) {
      if let Some(action) = self.action.take() {
         action();
      }
   }

   pub fn is_disposed(&self) -> bool {
      self.action.is_none()
   }

   /// Leaks the subscription: it stays attached for the life of its
   /// observable instead of ending with this guard.
   pub fn forget(mut self) {
      self.action = None;
   }
}

impl Drop for Disposable {
   fn drop(&mut self) {
      self.dispose();
   }
}

/// A node of the observation pipeline, emitting values of type
/// [`Item`](Observable::Item) paired with the read transaction that
/// produced them.
pub trait Observable: Send + Sync + 'static {
   type Item: Send + 'static;

   /// Attaches a boxed subscriber. Prefer [`subscribe_next`](Self::subscribe_next).
   fn subscribe_with(&self, callback: Callback<Self::Item>) -> Disposable;

   /// The observing connection whose commits drive this node.
   fn connection(&self) -> ObservingHandle;

   /// Invokes `f` for every emission until the returned guard is disposed.
   fn subscribe_next<F>(&self, f: F) -> Disposable
   where
      F: FnMut(&ReadTransaction<'_>, &Self::Item) + Send + 'static,
   {
      self.subscribe_with(Box::new(f))
   }

   /// Emits `transform(upstream)` for every upstream emission. Synchronous
   /// and single-threaded; the transform may read other collections through
   /// the transaction it is handed.
   fn map<U, F>(self, transform: F) -> MapObservable<Self, U, F>
   where
      Self: Sized,
      U: Send + 'static,
      F: Fn(&ReadTransaction<'_>, &Self::Item) -> U + Send + Sync + 'static,
   {
      MapObservable::new(self, transform)
   }

   /// Emits the first element of a collection-valued upstream, `None` when
   /// the upstream list is empty.
   fn first<T>(self) -> FirstObservable<Self>
   where
      Self: Observable<Item = Vec<T>> + Sized,
      T: Clone + Send + Sync + 'static,
   {
      FirstObservable::new(self)
   }

   /// Multicasts one upstream subscription to many subscribers. The
   /// upstream is subscribed when the first subscriber attaches and
   /// disposed when the last one detaches.
   fn share(self) -> SharedObservable<Self>
   where
      Self: Sized,
      Self::Item: Clone,
   {
      SharedObservable::new(self, 0)
   }

   /// [`share`](Self::share), additionally replaying the last
   /// `buffer_size` emissions to each new subscriber under a fresh
   /// snapshot.
   fn share_replay(self, buffer_size: usize) -> SharedObservable<Self>
   where
      Self: Sized,
      Self::Item: Clone,
   {
      SharedObservable::new(self, buffer_size)
   }
}

/// One attached subscriber of a multicasting node.
pub(crate) struct Subscriber<T> {
   pub(crate) id: u64,
   pub(crate) callback: std::sync::Arc<parking_lot::Mutex<Callback<T>>>,
}

impl<T> Subscriber<T> {
   pub(crate) fn new(id: u64, callback: Callback<T>) -> Self {
      Self {
         id,
         callback: std::sync::Arc::new(parking_lot::Mutex::new(callback)),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use std::sync::Arc;
   use std::sync::atomic::{AtomicUsize, Ordering};

   #[test]
   fn test_dispose_runs_action_once() {
      let count = Arc::new(AtomicUsize::new(0));
      let witness = Arc::clone(&count);
      let mut disposable = Disposable::new(move || {
         witness.fetch_add(1, Ordering::SeqCst);
      });

      assert!(!disposable.is_disposed());
      disposable.dispose();
      disposable.dispose();
      assert!(disposable.is_disposed());
      assert_eq!(count.load(Ordering::SeqCst), 1);
   }

   #[test]
   fn test_drop_disposes() {
      let count = Arc::new(AtomicUsize::new(0));
      let witness = Arc::clone(&count);
      {
         let _disposable = Disposable::new(move || {
            witness.fetch_add(1, Ordering::SeqCst);
         });
      }
      assert_eq!(count.load(Ordering::SeqCst), 1);
   }

   #[test]
   fn test_forget_skips_action() {
      let count = Arc::new(AtomicUsize::new(0));
      let witness = Arc::clone(&count);
      Disposable::new(move || {
         witness.fetch_add(1, Ordering::SeqCst);
      })
      .forget();
      assert_eq!(count.load(Ordering::SeqCst), 0);
   }
}
