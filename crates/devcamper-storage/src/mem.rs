use crate::eval::{compare_docs, matches, project};
use crate::traits::{DocumentStore, FindOptions};
use devcamper_core::{Document, Fields, Filter, Result, StoreError, ID_FIELD};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Collections held in memory. Each collection is keyed by insertion
/// sequence, so iteration order is insertion order.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<u64, Document>>,
    // (collection, _id) -> seq
    ids: HashMap<(String, String), u64>,
    last_seq: u64,
}

impl Inner {
    fn seq_of(&self, collection: &str, id: &str) -> Result<u64> {
        self.ids
            .get(&(collection.to_string(), id.to_string()))
            .copied()
            .ok_or(StoreError::NotFound)
    }

    fn put(&mut self, doc: Document) {
        self.last_seq = self.last_seq.max(doc.seq);
        self.ids
            .insert((doc.collection.clone(), doc.id().to_string()), doc.seq);
        self.collections
            .entry(doc.collection.clone())
            .or_default()
            .insert(doc.seq, doc);
    }

    fn build(&self, collection: &str, fields: Fields) -> Result<Document> {
        if let Some(JsonValue::String(id)) = fields.get(ID_FIELD) {
            if self.ids.contains_key(&(collection.to_string(), id.clone())) {
                return Err(StoreError::Conflict(format!(
                    "duplicate _id {id} in {collection}"
                )));
            }
        }
        Ok(Document::new_with_seq(collection, fields, self.last_seq + 1))
    }

    fn take(&mut self, collection: &str, id: &str) -> Result<Document> {
        let seq = self.seq_of(collection, id)?;
        self.ids.remove(&(collection.to_string(), id.to_string()));
        self.collections
            .get_mut(collection)
            .and_then(|c| c.remove(&seq))
            .ok_or_else(|| StoreError::Internal(format!("id index out of sync for {id}")))
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, fields: Fields) -> Result<Document> {
        let mut inner = self.inner.write();
        let doc = inner.build(collection, fields)?;
        inner.put(doc.clone());
        Ok(doc)
    }

    /// The document `insert` would store, without storing it.
    pub fn prepare_insert(&self, collection: &str, fields: Fields) -> Result<Document> {
        self.inner.read().build(collection, fields)
    }

    pub fn search(&self, collection: &str, filter: &Filter, opts: &FindOptions) -> Vec<Document> {
        let inner = self.inner.read();
        let Some(docs) = inner.collections.get(collection) else {
            return Vec::new();
        };
        let mut hits: Vec<&Document> = docs
            .values()
            .filter(|d| matches(&d.fields, filter))
            .collect();
        if !opts.sort.is_empty() {
            // stable: ties keep insertion order
            hits.sort_by(|a, b| compare_docs(&a.fields, &b.fields, &opts.sort));
        }
        let skip = usize::try_from(opts.skip).unwrap_or(usize::MAX);
        let limit = opts
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        hits.into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| Document {
                collection: d.collection.clone(),
                seq: d.seq,
                fields: project(&d.fields, &opts.projection),
            })
            .collect()
    }

    pub fn count(&self, collection: &str, filter: &Filter) -> u64 {
        let inner = self.inner.read();
        inner
            .collections
            .get(collection)
            .map(|docs| docs.values().filter(|d| matches(&d.fields, filter)).count() as u64)
            .unwrap_or(0)
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Document> {
        let inner = self.inner.read();
        let seq = inner.seq_of(collection, id)?;
        inner
            .collections
            .get(collection)
            .and_then(|c| c.get(&seq))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    pub fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<Document> {
        let mut inner = self.inner.write();
        let seq = inner.seq_of(collection, id)?;
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(&seq))
            .ok_or(StoreError::NotFound)?;
        doc.merge(patch);
        Ok(doc.clone())
    }

    /// The document `update` would store, without storing it.
    pub fn prepare_update(&self, collection: &str, id: &str, patch: Fields) -> Result<Document> {
        let mut doc = self.get(collection, id)?;
        doc.merge(patch);
        Ok(doc)
    }

    pub fn remove(&self, collection: &str, id: &str) -> Result<Document> {
        self.inner.write().take(collection, id)
    }

    pub fn remove_matching(&self, collection: &str, filter: &Filter) -> Vec<Document> {
        let mut inner = self.inner.write();
        let ids: Vec<String> = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|d| matches(&d.fields, filter))
                    .map(|d| d.id().to_string())
                    .collect()
            })
            .unwrap_or_default();
        ids.iter()
            .filter_map(|id| inner.take(collection, id).ok())
            .collect()
    }

    pub fn all_documents(&self) -> Vec<Document> {
        let inner = self.inner.read();
        let mut out: Vec<Document> = inner
            .collections
            .values()
            .flat_map(|c| c.values().cloned())
            .collect();
        out.sort_by_key(|d| d.seq);
        out
    }

    /// Re-applies a stored document (snapshot load, WAL replay). Replaces
    /// any previous version with the same `_id`.
    pub fn replay_put(&self, doc: Document) {
        let mut inner = self.inner.write();
        let _ = inner.take(&doc.collection, doc.id());
        inner.put(doc);
    }

    pub fn replay_delete(&self, collection: &str, id: &str) {
        let _ = self.inner.write().take(collection, id);
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document> {
        self.insert(collection, fields)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        opts: FindOptions,
    ) -> Result<Vec<Document>> {
        Ok(self.search(collection, filter, &opts))
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.count(collection, filter))
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document> {
        self.get(collection, id)
    }

    async fn find_by_id_and_update(
        &self,
        collection: &str,
        id: &str,
        patch: Fields,
    ) -> Result<Document> {
        self.update(collection, id, patch)
    }

    async fn find_by_id_and_delete(&self, collection: &str, id: &str) -> Result<Document> {
        self.remove(collection, id)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.remove_matching(collection, filter).len() as u64)
    }

    fn all_documents(&self) -> Vec<Document> {
        InMemoryStore::all_documents(self)
    }
}
