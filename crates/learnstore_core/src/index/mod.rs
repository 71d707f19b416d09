//! Secondary indexes.
//!
//! Every declared index is an ordered map from [`IndexKey`] to the set of
//! record ids holding that key. The engine keeps indexes in step with the
//! records on every write and rebuilds them from the records when the
//! store is opened, so index contents are never persisted.

mod key;
mod secondary;

pub use key::IndexKey;
pub use secondary::SecondaryIndex;
