use std::collections::BTreeMap;

use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::warn;

use super::transaction::Transaction;
use super::write::{Document, DocumentPath, DocumentWrite};

/// Redis-backed document store. Each document is a JSON string under
/// `{prefix}:doc:{collection}/{id}`; transactions use `WATCH`/`MULTI`/`EXEC`.
#[derive(Clone, Debug)]
pub struct RedisDocumentStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisDocumentStore {
    pub fn from_url(redis_url: &str, prefix: impl Into<String>) -> anyhow::Result<Self> {
        let config = Config::from_url(redis_url);
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| anyhow::anyhow!("failed to create redis pool: {e}"))?;

        Ok(Self {
            pool,
            key_prefix: prefix.into(),
        })
    }

    pub fn key(&self, path: &DocumentPath) -> String {
        format!("{}:doc:{path}", self.key_prefix)
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("redis PING failed: {e}"))?;
        Ok(())
    }

    pub async fn get(&self, path: &DocumentPath) -> anyhow::Result<Option<Document>> {
        let key = self.key(path);
        let mut conn = self.connection().await?;

        let raw = conn
            .get::<_, Option<String>>(&key)
            .await
            .map_err(|e| anyhow::anyhow!("redis GET failed for key `{key}`: {e}"))?;

        raw.map(|payload| decode(&key, &payload)).transpose()
    }

    /// Run one transaction attempt. `Ok(None)` signals that a watched key
    /// changed before `EXEC`.
    pub async fn attempt<T, F>(
        &self,
        paths: &[DocumentPath],
        body: &mut F,
    ) -> anyhow::Result<Option<T>>
    where
        F: FnMut(&mut Transaction) -> anyhow::Result<T>,
    {
        let mut conn = self.connection().await?;

        let reads = match self.watch_and_read(&mut conn, paths).await {
            Ok(reads) => reads,
            Err(e) => {
                unwatch(&mut conn).await;
                return Err(e);
            }
        };

        let mut tx = Transaction::new(reads);
        let value = match body(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                unwatch(&mut conn).await;
                return Err(e);
            }
        };

        let (reads, writes) = tx.into_parts();
        let staged = match self.stage_writes(&mut conn, &reads, writes).await {
            Ok(staged) => staged,
            Err(e) => {
                unwatch(&mut conn).await;
                return Err(e);
            }
        };

        let pipe = match commit_pipeline(&staged) {
            Ok(pipe) => pipe,
            Err(e) => {
                unwatch(&mut conn).await;
                return Err(e);
            }
        };

        let committed = pipe
            .query_async::<Option<()>>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("redis EXEC failed: {e}"))?;

        Ok(committed.map(|()| value))
    }

    async fn watch_and_read(
        &self,
        conn: &mut Connection,
        paths: &[DocumentPath],
    ) -> anyhow::Result<BTreeMap<DocumentPath, Option<Document>>> {
        let mut reads = BTreeMap::new();
        if paths.is_empty() {
            return Ok(reads);
        }

        let keys: Vec<String> = paths.iter().map(|path| self.key(path)).collect();
        redis::cmd("WATCH")
            .arg(&keys)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| anyhow::anyhow!("redis WATCH failed: {e}"))?;

        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut *conn)
            .await
            .map_err(|e| anyhow::anyhow!("redis MGET failed: {e}"))?;

        for ((path, key), payload) in paths.iter().zip(&keys).zip(raw) {
            let doc = payload.map(|payload| decode(key, &payload)).transpose()?;
            reads.insert(path.clone(), doc);
        }

        Ok(reads)
    }

    /// Fold queued writes into full document bodies. Paths written without
    /// being read are watched and fetched here so the merge has a base.
    async fn stage_writes(
        &self,
        conn: &mut Connection,
        reads: &BTreeMap<DocumentPath, Option<Document>>,
        writes: Vec<DocumentWrite>,
    ) -> anyhow::Result<BTreeMap<String, Document>> {
        let mut staged: BTreeMap<String, Document> = BTreeMap::new();

        for write in writes {
            let key = self.key(&write.path);
            if !staged.contains_key(&key) {
                let base = match reads.get(&write.path) {
                    Some(doc) => doc.clone().unwrap_or_default(),
                    None => self.watch_and_fetch(conn, &key).await?.unwrap_or_default(),
                };
                staged.insert(key.clone(), base);
            }

            if let Some(doc) = staged.get_mut(&key) {
                write.apply_to(doc);
            }
        }

        Ok(staged)
    }

    async fn watch_and_fetch(
        &self,
        conn: &mut Connection,
        key: &str,
    ) -> anyhow::Result<Option<Document>> {
        redis::cmd("WATCH")
            .arg(key)
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| anyhow::anyhow!("redis WATCH failed for key `{key}`: {e}"))?;

        let raw = conn
            .get::<_, Option<String>>(key)
            .await
            .map_err(|e| anyhow::anyhow!("redis GET failed for key `{key}`: {e}"))?;

        raw.map(|payload| decode(key, &payload)).transpose()
    }

    async fn connection(&self) -> anyhow::Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("failed to get redis connection: {e}"))
    }
}

fn commit_pipeline(staged: &BTreeMap<String, Document>) -> anyhow::Result<redis::Pipeline> {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for (key, doc) in staged {
        let payload = serde_json::to_string(doc)
            .map_err(|e| anyhow::anyhow!("failed to serialize document for `{key}`: {e}"))?;
        pipe.set(key, payload).ignore();
    }
    Ok(pipe)
}

fn decode(key: &str, payload: &str) -> anyhow::Result<Document> {
    serde_json::from_str(payload)
        .map_err(|e| anyhow::anyhow!("failed to deserialize document for `{key}`: {e}"))
}

async fn unwatch(conn: &mut Connection) {
    if let Err(e) = redis::cmd("UNWATCH").query_async::<()>(&mut *conn).await {
        warn!(?e, "redis UNWATCH failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::commit_pipeline;
    use crate::store::write::Document;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn commit_pipeline_wraps_one_set_per_document_in_multi_exec() {
        let mut staged = BTreeMap::new();
        staged.insert(
            "hb:doc:leaderboards/global".to_owned(),
            doc(json!({ "entries": { "alice": { "totalXP": 2.5 } } })),
        );
        staged.insert(
            "hb:doc:users/alice".to_owned(),
            doc(json!({ "displayName": "User", "totalXP": 2.5 })),
        );

        let pipe = commit_pipeline(&staged).unwrap();
        assert_eq!(pipe.cmd_iter().count(), 2);

        let packed = String::from_utf8(pipe.get_packed_pipeline()).unwrap();
        assert!(packed.contains("MULTI"));
        assert!(packed.contains("EXEC"));
        assert!(packed.contains("hb:doc:users/alice"));
        assert!(packed.contains(r#"{"entries":{"alice":{"totalXP":2.5}}}"#));
    }
}
