//! The observation pipeline: observing connections, collection observables,
//! and the derived operators built on them.
//!
//! # Data Flow
//!
//! ```text
//! writer commit ──► ChangeSet ──► ObserverHub (per observing connection)
//!                                     │  opens read txn at post-commit
//!                                     │  snapshot, under the writer lock
//!                                     ▼
//!                         CollectionObservable (per observed collection)
//!                                     │
//!                  map / first / values_where / share_replay
//!                                     │
//!                               subscribe_next
//! ```
//!
//! Every emission carries a borrowed read transaction pinned to the
//! snapshot of the triggering commit; subscribers fetch related data
//! through it and must not let it escape the callback.

mod collection;
mod observable;
mod operators;

pub use collection::{CollectionObservable, ObservingConnection, ObservingHandle};
pub use observable::{Callback, Disposable, Observable};
pub use operators::{
   FirstObservable, MapObservable, Prefilter, SharedObservable, ValuesObservable,
};

pub(crate) use collection::ObserverHub;
