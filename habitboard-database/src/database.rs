use crate::store::DocumentStore;

/// Shared database handle passed across crates.
#[derive(Clone, Debug)]
pub struct Database {
    store: DocumentStore,
}

impl Database {
    /// Create a database handle over an existing document store.
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Database backed by a fresh in-process store.
    pub fn in_memory() -> Self {
        Self::new(DocumentStore::memory())
    }

    /// Expose the document store for query modules.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}
