use devcamper_core::Document;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::warn;

pub const SNAPSHOT_FILE: &str = "snapshot.ndjson.zst";
pub const MANIFEST_FILE: &str = "manifest.json";

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub created_ts: i64,
    pub documents: usize,
    pub path: String,
}

/// zstd-compressed NDJSON, one document per line.
pub struct SnapshotWriter {
    out: zstd::Encoder<'static, BufWriter<File>>,
    count: usize,
}

impl SnapshotWriter {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let out = zstd::Encoder::new(BufWriter::new(File::create(path)?), ZSTD_LEVEL)?;
        Ok(Self { out, count: 0 })
    }

    pub fn write_doc(&mut self, doc: &Document) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, doc)?;
        self.out.write_all(b"\n")?;
        self.count += 1;
        Ok(())
    }

    pub fn finish(self) -> std::io::Result<usize> {
        let mut inner = self.out.finish()?;
        inner.flush()?;
        inner.get_ref().sync_all()?;
        Ok(self.count)
    }
}

/// Writes `docs` to `dir/snapshot.ndjson.zst` through a temp file and an
/// atomic rename, then records the manifest next to it.
pub fn write_snapshot(dir: &Path, docs: &[Document]) -> std::io::Result<SnapshotManifest> {
    let path = dir.join(SNAPSHOT_FILE);
    let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    let mut w = SnapshotWriter::create(&tmp)?;
    for d in docs {
        w.write_doc(d)?;
    }
    let documents = w.finish()?;
    std::fs::rename(&tmp, &path)?;

    let manifest = SnapshotManifest {
        created_ts: chrono::Utc::now().timestamp(),
        documents,
        path: SNAPSHOT_FILE.to_string(),
    };
    let man_tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    std::fs::write(&man_tmp, serde_json::to_vec_pretty(&manifest)?)?;
    std::fs::rename(man_tmp, dir.join(MANIFEST_FILE))?;
    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> std::io::Result<Option<SnapshotManifest>> {
    match std::fs::read(dir.join(MANIFEST_FILE)) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Documents from the snapshot in `dir`, or none if no snapshot exists yet.
pub fn read_snapshot(dir: &Path) -> std::io::Result<Vec<Document>> {
    let path: PathBuf = dir.join(SNAPSHOT_FILE);
    let fh = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let br = BufReader::new(zstd::Decoder::new(fh)?);
    let mut out = Vec::new();
    for line in br.lines() {
        let line = line?;
        match serde_json::from_str(&line) {
            Ok(doc) => out.push(doc),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping undecodable snapshot line"),
        }
    }
    Ok(out)
}
