use crate::mem::InMemoryStore;
use crate::snapshot::{read_snapshot, write_snapshot, SnapshotManifest};
use crate::traits::{DocumentStore, FindOptions};
use crate::wal::{Wal, WalRecord};
use devcamper_core::{Document, Fields, Filter, Result, StoreError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

pub const WAL_DIR: &str = "wal";

/// In-memory store made durable by a JSON-lines WAL plus periodic zstd
/// snapshots. Every mutation is logged and then applied while holding the
/// WAL lock, so log order always equals apply order and a failed append
/// leaves memory untouched.
pub struct PersistentStore {
    mem: InMemoryStore,
    wal: Mutex<Wal>,
    // one snapshot at a time
    snapshotting: Mutex<()>,
    data_dir: PathBuf,
}

fn io_err(e: std::io::Error) -> StoreError {
    StoreError::Internal(e.to_string())
}

impl PersistentStore {
    pub fn open(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let mem = InMemoryStore::new();
        let snap = read_snapshot(&data_dir)?;
        let from_snapshot = snap.len();
        for doc in snap {
            mem.replay_put(doc);
        }
        let wal_dir = data_dir.join(WAL_DIR);
        let recs = Wal::replay(&wal_dir)?;
        let from_wal = recs.len();
        for rec in recs {
            match rec {
                WalRecord::Put { doc } => mem.replay_put(doc),
                WalRecord::Delete { collection, id } => mem.replay_delete(&collection, &id),
            }
        }
        let wal = Wal::open(&wal_dir)?;
        info!(dir = %data_dir.display(), from_snapshot, from_wal, "store recovered");
        Ok(Self {
            mem,
            wal: Mutex::new(wal),
            snapshotting: Mutex::new(()),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Writes a full snapshot and drops the WAL segments it covers. Writers
    /// are blocked only while documents are copied and the segment is rolled;
    /// later writes land in the new segment and replay on top of the snapshot.
    pub fn snapshot(&self) -> std::io::Result<SnapshotManifest> {
        let _one = self.snapshotting.lock();
        let (docs, covered) = {
            let mut wal = self.wal.lock();
            (self.mem.all_documents(), wal.roll()?)
        };
        let manifest = write_snapshot(&self.data_dir, &docs)?;
        Wal::remove_segments(&covered)?;
        info!(documents = manifest.documents, segments = covered.len(), "snapshot written");
        Ok(manifest)
    }

    fn log(wal: &mut Wal, rec: &WalRecord) -> Result<()> {
        wal.append(rec).map_err(io_err)
    }
}

#[async_trait::async_trait]
impl DocumentStore for PersistentStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<Document> {
        let mut wal = self.wal.lock();
        let doc = self.mem.prepare_insert(collection, fields)?;
        Self::log(&mut wal, &WalRecord::Put { doc: doc.clone() })?;
        self.mem.replay_put(doc.clone());
        Ok(doc)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        opts: FindOptions,
    ) -> Result<Vec<Document>> {
        Ok(self.mem.search(collection, filter, &opts))
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64> {
        Ok(self.mem.count(collection, filter))
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Document> {
        self.mem.get(collection, id)
    }

    async fn find_by_id_and_update(
        &self,
        collection: &str,
        id: &str,
        patch: Fields,
    ) -> Result<Document> {
        let mut wal = self.wal.lock();
        let doc = self.mem.prepare_update(collection, id, patch)?;
        Self::log(&mut wal, &WalRecord::Put { doc: doc.clone() })?;
        self.mem.replay_put(doc.clone());
        Ok(doc)
    }

    async fn find_by_id_and_delete(&self, collection: &str, id: &str) -> Result<Document> {
        let mut wal = self.wal.lock();
        self.mem.get(collection, id)?;
        Self::log(
            &mut wal,
            &WalRecord::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        )?;
        self.mem.remove(collection, id)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut wal = self.wal.lock();
        let matched = self
            .mem
            .search(collection, filter, &FindOptions::default());
        // each delete is logged before it is applied, so a failed append
        // stops the loop with memory and log still agreeing
        for doc in &matched {
            Self::log(
                &mut wal,
                &WalRecord::Delete {
                    collection: collection.to_string(),
                    id: doc.id().to_string(),
                },
            )?;
            self.mem.replay_delete(collection, doc.id());
        }
        Ok(matched.len() as u64)
    }

    fn all_documents(&self) -> Vec<Document> {
        self.mem.all_documents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcamper_core::{BOOTCAMPS, COURSES};
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (kept, gone) = {
            let store = PersistentStore::open(dir.path()).unwrap();
            let kept = store
                .create(BOOTCAMPS, fields(json!({"name": "Devworks"})))
                .await
                .unwrap();
            let gone = store
                .create(BOOTCAMPS, fields(json!({"name": "ModernTech"})))
                .await
                .unwrap();
            store
                .find_by_id_and_update(BOOTCAMPS, kept.id(), fields(json!({"housing": true})))
                .await
                .unwrap();
            store.find_by_id_and_delete(BOOTCAMPS, gone.id()).await.unwrap();
            (kept, gone)
        };
        let store = PersistentStore::open(dir.path()).unwrap();
        let doc = store.find_by_id(BOOTCAMPS, kept.id()).await.unwrap();
        assert_eq!(doc.get("housing"), Some(&json!(true)));
        assert_eq!(doc.seq, kept.seq);
        assert_eq!(
            store.find_by_id(BOOTCAMPS, gone.id()).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn failed_append_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let kept = store
            .create(BOOTCAMPS, fields(json!({"name": "Devworks"})))
            .await
            .unwrap();
        store.wal.lock().make_read_only().unwrap();

        let err = store
            .create(BOOTCAMPS, fields(json!({"name": "ModernTech"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
        assert!(store
            .find_by_id_and_update(BOOTCAMPS, kept.id(), fields(json!({"housing": true})))
            .await
            .is_err());
        assert!(store.find_by_id_and_delete(BOOTCAMPS, kept.id()).await.is_err());
        assert!(store.delete_many(BOOTCAMPS, &Filter::all()).await.is_err());

        let all = store.all_documents();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("housing"), None);
        assert_eq!(all[0].get("name"), Some(&json!("Devworks")));

        drop(store);
        let reopened = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.all_documents(), all);
    }

    #[tokio::test]
    async fn snapshot_keeps_writes_made_after_it() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            store
                .create(BOOTCAMPS, fields(json!({"name": "Devworks"})))
                .await
                .unwrap();
            store.snapshot().unwrap();
            store
                .create(BOOTCAMPS, fields(json!({"name": "ModernTech"})))
                .await
                .unwrap();
            let manifest = store.snapshot().unwrap();
            assert_eq!(manifest.documents, 2);
        }
        let store = PersistentStore::open(dir.path()).unwrap();
        assert_eq!(store.count_documents(BOOTCAMPS, &Filter::all()).await.unwrap(), 2);
        let segs = std::fs::read_dir(dir.path().join(WAL_DIR)).unwrap().count();
        // the segment live at the last snapshot plus the one opened on reopen
        assert_eq!(segs, 2);
    }

    #[tokio::test]
    async fn snapshot_then_wal_tail_recovers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStore::open(dir.path()).unwrap();
            for t in ["Front End", "Back End"] {
                store
                    .create(COURSES, fields(json!({"title": t, "bootcamp": "b1"})))
                    .await
                    .unwrap();
            }
            let manifest = store.snapshot().unwrap();
            assert_eq!(manifest.documents, 2);
            store
                .create(COURSES, fields(json!({"title": "Full Stack", "bootcamp": "b2"})))
                .await
                .unwrap();
            let removed = store
                .delete_many(COURSES, &Filter::eq("bootcamp", json!("b1")))
                .await
                .unwrap();
            assert_eq!(removed, 2);
        }
        let store = PersistentStore::open(dir.path()).unwrap();
        let all = store.all_documents();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("title"), Some(&json!("Full Stack")));
        // sequence continues past recovered documents
        let next = store.create(COURSES, Fields::new()).await.unwrap();
        assert_eq!(next.seq, 4);
    }
}
