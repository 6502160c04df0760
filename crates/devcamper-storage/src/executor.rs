use crate::traits::{DocumentStore, FindOptions};
use devcamper_core::{Document, Page, Result, StructuredQuery};
use serde::Serialize;

/// Pagination metadata for a list response. `next`/`prev` are present
/// only when such a page exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Page>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<Page>,
}

impl Pagination {
    pub fn compute(page: Page, total: u64) -> Self {
        let next = (page.end_index() < total).then(|| Page {
            page: page.page + 1,
            limit: page.limit,
        });
        let prev = (page.start_index() > 0).then(|| Page {
            page: page.page - 1,
            limit: page.limit,
        });
        Self { total, next, prev }
    }
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub items: Vec<Document>,
    pub pagination: Pagination,
}

/// Runs a translated query: counts matches for the pagination total,
/// then fetches the requested page.
pub async fn execute(
    store: &dyn DocumentStore,
    collection: &str,
    query: &StructuredQuery,
) -> Result<PageResult> {
    let total = store.count_documents(collection, &query.filter).await?;
    let items = store
        .find(
            collection,
            &query.filter,
            FindOptions {
                projection: query.projection.clone(),
                sort: query.sort.clone(),
                skip: query.page.start_index(),
                limit: Some(query.page.limit),
            },
        )
        .await?;
    Ok(PageResult {
        items,
        pagination: Pagination::compute(query.page, total),
    })
}
