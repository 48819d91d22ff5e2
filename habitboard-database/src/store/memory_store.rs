use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Mutex;

use super::transaction::Transaction;
use super::write::{Document, DocumentPath, DocumentWrite};

#[derive(Clone, Debug, Default)]
struct StoredDocument {
    data: Document,
    version: u64,
}

/// In-process document store with optimistic version checks.
///
/// Version `0` means "absent"; every committed write bumps the version of
/// the document it touches.
#[derive(Clone, Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<Mutex<HashMap<DocumentPath, StoredDocument>>>,
    forced_conflicts: Arc<AtomicU32>,
}

impl MemoryDocumentStore {
    pub async fn get(&self, path: &DocumentPath) -> anyhow::Result<Option<Document>> {
        let docs = self.docs.lock().await;
        Ok(docs.get(path).map(|stored| stored.data.clone()))
    }

    pub async fn merge(&self, write: &DocumentWrite) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().await;
        let stored = docs.entry(write.path.clone()).or_default();
        write.apply_to(&mut stored.data);
        stored.version += 1;
        Ok(())
    }

    /// Run one transaction attempt. `Ok(None)` signals a commit conflict.
    pub async fn attempt<T, F>(
        &self,
        paths: &[DocumentPath],
        body: &mut F,
    ) -> anyhow::Result<Option<T>>
    where
        F: FnMut(&mut Transaction) -> anyhow::Result<T>,
    {
        let (reads, versions) = {
            let docs = self.docs.lock().await;
            let mut reads = BTreeMap::new();
            let mut versions = Vec::with_capacity(paths.len());
            for path in paths {
                let stored = docs.get(path);
                reads.insert(path.clone(), stored.map(|doc| doc.data.clone()));
                versions.push((path.clone(), stored.map_or(0, |doc| doc.version)));
            }
            (reads, versions)
        };

        let mut tx = Transaction::new(reads);
        let value = body(&mut tx)?;

        let mut docs = self.docs.lock().await;
        if self.take_forced_conflict() {
            return Ok(None);
        }

        let unchanged = versions
            .iter()
            .all(|(path, version)| docs.get(path).map_or(0, |doc| doc.version) == *version);
        if !unchanged {
            return Ok(None);
        }

        for write in tx.into_writes() {
            let stored = docs.entry(write.path.clone()).or_default();
            write.apply_to(&mut stored.data);
            stored.version += 1;
        }

        Ok(Some(value))
    }

    /// Make the next `count` transaction commits fail as if a concurrent
    /// writer had touched the read set.
    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[cfg(test)]
impl MemoryDocumentStore {
    async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
