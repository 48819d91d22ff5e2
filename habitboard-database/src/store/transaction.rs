use std::collections::BTreeMap;

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::write::{Document, DocumentPath, DocumentWrite};

/// One attempt of a transaction: the snapshot read at the start plus the
/// writes queued by the transaction body.
#[derive(Debug)]
pub struct Transaction {
    reads: BTreeMap<DocumentPath, Option<Document>>,
    writes: Vec<DocumentWrite>,
}

impl Transaction {
    pub(crate) fn new(reads: BTreeMap<DocumentPath, Option<Document>>) -> Self {
        Self {
            reads,
            writes: Vec::new(),
        }
    }

    /// Snapshot value of a document read by this transaction.
    pub fn get(&self, path: &DocumentPath) -> anyhow::Result<Option<&Document>> {
        match self.reads.get(path) {
            Some(doc) => Ok(doc.as_ref()),
            None => anyhow::bail!("`{path}` is not part of this transaction's read set"),
        }
    }

    /// Snapshot value decoded into `T`; an absent document decodes as `T::default()`.
    pub fn get_as<T>(&self, path: &DocumentPath) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.get(path)? {
            Some(doc) => serde_json::from_value(Value::Object(doc.clone()))
                .with_context(|| format!("failed to decode document `{path}`")),
            None => Ok(T::default()),
        }
    }

    /// Queue a merge-write to be committed with the transaction.
    pub fn merge(&mut self, write: DocumentWrite) {
        self.writes.push(write);
    }

    pub(crate) fn into_parts(
        self,
    ) -> (BTreeMap<DocumentPath, Option<Document>>, Vec<DocumentWrite>) {
        (self.reads, self.writes)
    }

    pub(crate) fn into_writes(self) -> Vec<DocumentWrite> {
        self.writes
    }
}
