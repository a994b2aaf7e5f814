use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{DocumentStore, StoreError};

/// Volatile store. Documents are cloned in and out so callers never share an
/// instance with another request.
pub struct MemoryStore<D> {
    documents: DashMap<String, D>,
}

impl<D> Default for MemoryStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> MemoryStore<D> {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl<D> DocumentStore<D> for MemoryStore<D>
where
    D: Clone + Send + Sync + 'static,
{
    async fn create(&self, id: &str, document: &D) -> Result<(), StoreError> {
        match self.documents.entry(id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(document.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, id: &str) -> Result<D, StoreError> {
        self.documents
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: &str, document: &D) -> Result<(), StoreError> {
        let mut slot = self.documents.get_mut(id).ok_or(StoreError::NotFound)?;
        *slot = document.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.documents
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
