//! Document store gateway.
//!
//! The pipeline only ever talks to [`DocumentStore`]. Two implementations ship:
//! [`MemoryStore`] (process-local, used by tests and `memory` mode) and
//! [`LogStore`] (append-only log on disk, replayed on open).

mod durable;
mod error;
mod memory;
mod wal;

pub use durable::{run_compactor, LogStore};
pub use error::StoreError;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Whole-document access keyed by document id.
///
/// `find` and `update` signal an absent id with [`StoreError::NotFound`];
/// `create` signals a taken id with [`StoreError::AlreadyExists`].
#[async_trait]
pub trait DocumentStore<D>: Send + Sync {
    async fn create(&self, id: &str, document: &D) -> Result<(), StoreError>;

    async fn find(&self, id: &str) -> Result<D, StoreError>;

    async fn update(&self, id: &str, document: &D) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
