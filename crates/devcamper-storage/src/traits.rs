use devcamper_core::{Document, Fields, Filter, Projection, Result, SortKey};

/// Cursor options applied by [`DocumentStore::find`]: projection, then sort,
/// then skip/limit.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Projection,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document>;
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        opts: FindOptions,
    ) -> Result<Vec<Document>>;
    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64>;
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document>;
    async fn find_by_id_and_update(
        &self,
        collection: &str,
        id: &str,
        patch: Fields,
    ) -> Result<Document>;
    async fn find_by_id_and_delete(&self, collection: &str, id: &str) -> Result<Document>;
    // returns removed count
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    // Export all documents in insertion order (admin dump, snapshots)
    fn all_documents(&self) -> Vec<Document> {
        Vec::new()
    }
}
