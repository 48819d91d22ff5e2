mod memory_store;
mod redis_store;
mod transaction;
mod write;

use std::time::Duration;

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use memory_store::MemoryDocumentStore;
use redis_store::RedisDocumentStore;

pub use transaction::Transaction;
pub use write::{Document, DocumentPath, DocumentWrite};

pub const DEFAULT_TRANSACTION_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TRANSACTION_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Retry policy for conflicting transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionSettings {
    pub max_attempts: u32,
    /// Sleep before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_TRANSACTION_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_TRANSACTION_RETRY_BACKOFF,
        }
    }
}

#[derive(Clone, Debug)]
enum StoreBackend {
    Memory(MemoryDocumentStore),
    Redis(RedisDocumentStore),
}

/// Handle to the document store: reads, merge-writes and transactions.
#[derive(Clone, Debug)]
pub struct DocumentStore {
    backend: StoreBackend,
    transactions: TransactionSettings,
}

impl DocumentStore {
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory(MemoryDocumentStore::default()),
            transactions: TransactionSettings::default(),
        }
    }

    pub fn redis(redis_url: &str, prefix: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            backend: StoreBackend::Redis(RedisDocumentStore::from_url(redis_url, prefix)?),
            transactions: TransactionSettings::default(),
        })
    }

    pub fn with_transaction_settings(mut self, settings: TransactionSettings) -> Self {
        self.transactions = settings;
        self
    }

    pub fn transaction_settings(&self) -> TransactionSettings {
        self.transactions
    }

    pub fn is_redis_enabled(&self) -> bool {
        matches!(self.backend, StoreBackend::Redis(_))
    }

    /// Force the next `count` commits to conflict. Only the in-memory
    /// backend supports this; it is a no-op elsewhere.
    pub fn force_conflicts(&self, count: u32) {
        if let StoreBackend::Memory(store) = &self.backend {
            store.force_conflicts(count);
        }
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        match &self.backend {
            StoreBackend::Memory(_) => Ok(()),
            StoreBackend::Redis(store) => store.ping().await,
        }
    }

    pub async fn get(&self, path: &DocumentPath) -> anyhow::Result<Option<Document>> {
        match &self.backend {
            StoreBackend::Memory(store) => store.get(path).await,
            StoreBackend::Redis(store) => store.get(path).await,
        }
    }

    /// Read a document decoded into `T`; an absent document decodes as `T::default()`.
    pub async fn get_as<T>(&self, path: &DocumentPath) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.get(path).await? {
            Some(doc) => serde_json::from_value(Value::Object(doc))
                .with_context(|| format!("failed to decode document `{path}`")),
            None => Ok(T::default()),
        }
    }

    /// Atomic single-document merge-write.
    pub async fn merge(&self, write: DocumentWrite) -> anyhow::Result<()> {
        match &self.backend {
            StoreBackend::Memory(store) => store.merge(&write).await,
            StoreBackend::Redis(_) => {
                let path = write.path.clone();
                self.run_transaction(std::slice::from_ref(&path), |tx| {
                    tx.merge(write.clone());
                    Ok(())
                })
                .await
            }
        }
    }

    /// Read `paths` as one snapshot, run `body` against it and commit the
    /// writes it queued. The whole attempt is retried when any read
    /// document changed before commit.
    pub async fn run_transaction<T, F>(
        &self,
        paths: &[DocumentPath],
        mut body: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut(&mut Transaction) -> anyhow::Result<T>,
    {
        let max_attempts = self.transactions.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = match &self.backend {
                StoreBackend::Memory(store) => store.attempt(paths, &mut body).await,
                StoreBackend::Redis(store) => store.attempt(paths, &mut body).await,
            }?;

            if let Some(value) = outcome {
                return Ok(value);
            }

            warn!(
                attempt,
                max_attempts,
                paths = %format_paths(paths),
                "transaction conflict"
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.transactions.retry_backoff * attempt).await;
            }
        }

        anyhow::bail!(
            "transaction on [{}] aborted after {max_attempts} conflicting attempts",
            format_paths(paths)
        )
    }
}

fn format_paths(paths: &[DocumentPath]) -> String {
    paths
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{DocumentPath, DocumentStore, DocumentWrite, TransactionSettings};

    fn fast_store(max_attempts: u32) -> DocumentStore {
        DocumentStore::memory().with_transaction_settings(TransactionSettings {
            max_attempts,
            retry_backoff: Duration::ZERO,
        })
    }

    #[test]
    fn default_settings_allow_five_attempts() {
        let settings = DocumentStore::memory().transaction_settings();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.retry_backoff, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn get_as_defaults_absent_documents() {
        let store = DocumentStore::memory();
        let doc: serde_json::Map<String, serde_json::Value> = store
            .get_as(&DocumentPath::new("users", "nobody"))
            .await
            .unwrap();
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn transaction_retries_until_commit() {
        let store = fast_store(5);
        let path = DocumentPath::new("leaderboards", "global");
        store.force_conflicts(3);

        let mut runs = 0;
        let value = store
            .run_transaction(std::slice::from_ref(&path), |tx| {
                runs += 1;
                tx.merge(DocumentWrite::merge(path.clone()).set("runs", runs));
                Ok(runs)
            })
            .await
            .unwrap();

        assert_eq!(value, 4);
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.get("runs"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn transaction_gives_up_after_max_attempts() {
        let store = fast_store(2);
        let path = DocumentPath::new("leaderboards", "global");
        store.force_conflicts(2);

        let err = store
            .run_transaction(std::slice::from_ref(&path), |tx| {
                tx.merge(DocumentWrite::merge(path.clone()).set("touched", true));
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("aborted after 2 conflicting attempts"));
        assert!(store.get(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn body_errors_are_not_retried() {
        let store = fast_store(5);
        let path = DocumentPath::new("users", "alice");

        let mut runs = 0;
        let result: anyhow::Result<()> = store
            .run_transaction(std::slice::from_ref(&path), |_tx| {
                runs += 1;
                anyhow::bail!("bad snapshot")
            })
            .await;

        assert!(result.is_err());
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn merge_is_not_subject_to_forced_conflicts() {
        let store = fast_store(1);
        let path = DocumentPath::new("users", "alice");
        store.force_conflicts(1);

        store
            .merge(DocumentWrite::merge(path.clone()).increment("totalXP", 0))
            .await
            .unwrap();

        assert_eq!(
            store.get(&path).await.unwrap().unwrap().get("totalXP"),
            Some(&json!(0))
        );
    }
}
