use devcamper_core::Document;
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};
use tracing::warn;

/// One mutation, one JSON line. Applying a record twice has the same
/// effect as applying it once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalRecord {
    /// Full document after create or update.
    Put { doc: Document },
    Delete { collection: String, id: String },
}

pub struct Wal {
    dir: PathBuf,
    path: PathBuf,
    file: File,
}

fn segment_index(p: &Path) -> Option<u64> {
    p.file_name()?
        .to_str()?
        .strip_prefix("wal-")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

fn next_segment(dir: &Path) -> std::io::Result<PathBuf> {
    let next = segments(dir)?
        .last()
        .and_then(|p| segment_index(p))
        .map_or(1, |i| i + 1);
    Ok(dir.join(format!("wal-{next:010}.log")))
}

/// Segments in creation order.
fn segments(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| segment_index(p).is_some())
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    files.sort_by_key(|p| segment_index(p));
    Ok(files)
}

impl Wal {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = next_segment(dir)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            file,
        })
    }

    pub fn append(&mut self, rec: &WalRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(rec)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()
    }

    /// Starts a fresh segment and returns the older ones, which stay on
    /// disk until [`Wal::remove_segments`] is called.
    pub fn roll(&mut self) -> std::io::Result<Vec<PathBuf>> {
        let path = next_segment(&self.dir)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.file.sync_all()?;
        self.file = file;
        self.path = path;
        Ok(segments(&self.dir)?
            .into_iter()
            .filter(|seg| *seg != self.path)
            .collect())
    }

    /// Deletes segments returned by [`Wal::roll`]. Call only after a
    /// snapshot covering them has been written.
    pub fn remove_segments(segs: &[PathBuf]) -> std::io::Result<()> {
        for seg in segs {
            match std::fs::remove_file(seg) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Swaps the segment handle for a read-only one so appends fail.
    #[cfg(test)]
    pub(crate) fn make_read_only(&mut self) -> std::io::Result<()> {
        self.file = File::open(&self.path)?;
        Ok(())
    }

    pub fn current_segment(&self) -> &Path {
        &self.path
    }

    /// Reads every record in `dir`. Lines that fail to decode (a torn
    /// final write) are skipped.
    pub fn replay(dir: &Path) -> std::io::Result<Vec<WalRecord>> {
        let mut out = Vec::new();
        for seg in segments(dir)? {
            let br = BufReader::new(File::open(&seg)?);
            for (n, line) in br.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WalRecord>(&line) {
                    Ok(rec) => out.push(rec),
                    Err(e) => warn!(segment = %seg.display(), line = n + 1, error = %e, "skipping undecodable wal record"),
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcamper_core::BOOTCAMPS;
    use serde_json::json;

    fn doc(id: &str, seq: u64) -> Document {
        Document::new_with_seq(
            BOOTCAMPS,
            json!({"_id": id, "name": id}).as_object().cloned().unwrap(),
            seq,
        )
    }

    #[test]
    fn records_are_tagged_json_lines() {
        let rec = WalRecord::Delete {
            collection: "courses".into(),
            id: "c1".into(),
        };
        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({"op": "delete", "collection": "courses", "id": "c1"})
        );
    }

    #[test]
    fn replay_returns_appended_records_and_skips_torn_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(&WalRecord::Put { doc: doc("a", 1) }).unwrap();
        wal.append(&WalRecord::Delete {
            collection: BOOTCAMPS.into(),
            id: "a".into(),
        })
        .unwrap();
        let seg = wal.current_segment().to_path_buf();
        drop(wal);
        let mut f = OpenOptions::new().append(true).open(&seg).unwrap();
        f.write_all(br#"{"op":"put","doc":{"coll"#).unwrap();

        let recs = Wal::replay(dir.path()).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(matches!(&recs[0], WalRecord::Put { doc } if doc.id() == "a" && doc.seq == 1));
    }

    #[test]
    fn reopening_starts_a_later_segment() {
        let dir = tempfile::tempdir().unwrap();
        let first = Wal::open(dir.path()).unwrap();
        let second = Wal::open(dir.path()).unwrap();
        assert!(first.current_segment().ends_with("wal-0000000001.log"));
        assert!(second.current_segment().ends_with("wal-0000000002.log"));
    }

    #[test]
    fn roll_keeps_old_segments_until_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path()).unwrap();
        wal.append(&WalRecord::Put { doc: doc("a", 1) }).unwrap();
        let older = wal.roll().unwrap();
        assert_eq!(older.len(), 1);
        wal.append(&WalRecord::Put { doc: doc("b", 2) }).unwrap();
        assert_eq!(Wal::replay(dir.path()).unwrap().len(), 2);

        Wal::remove_segments(&older).unwrap();
        let recs = Wal::replay(dir.path()).unwrap();
        assert_eq!(recs.len(), 1);
        assert!(matches!(&recs[0], WalRecord::Put { doc } if doc.id() == "b"));
    }

    #[test]
    fn append_to_read_only_segment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path()).unwrap();
        wal.make_read_only().unwrap();
        assert!(wal.append(&WalRecord::Put { doc: doc("a", 1) }).is_err());
        assert!(Wal::replay(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn replay_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Wal::replay(&dir.path().join("nope")).unwrap().is_empty());
    }
}
