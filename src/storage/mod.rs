use anyhow::Context;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};

/// A row of the `remixes` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemixRecord {
    pub cache_key: String,
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub mood: String,
    pub mode: String,
    pub created_at: i64,
}

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        let s = Self { conn };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS lyrics_cache (
  query_key TEXT PRIMARY KEY,
  bundle_json TEXT NOT NULL,
  fetched_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS remixes (
  cache_key TEXT PRIMARY KEY,
  path TEXT NOT NULL,
  title TEXT NOT NULL,
  artist TEXT NOT NULL,
  mood TEXT NOT NULL,
  mode TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_remixes_created_at ON remixes(created_at DESC);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    /// Cache a serialized lyrics bundle
    pub fn cache_lyrics(
        &self,
        query_key: &str,
        bundle_json: &str,
        now_unix: i64,
    ) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO lyrics_cache(query_key, bundle_json, fetched_at)
VALUES(?1, ?2, ?3)
ON CONFLICT(query_key) DO UPDATE SET
  bundle_json=excluded.bundle_json,
  fetched_at=excluded.fetched_at
"#,
                params![query_key, bundle_json, now_unix],
            )
            .context("cache lyrics")?;
        Ok(())
    }

    pub fn get_lyrics(&self, query_key: &str) -> anyhow::Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT bundle_json FROM lyrics_cache WHERE query_key=?1")
            .context("prepare lyrics cache")?;
        let mut rows = stmt.query(params![query_key]).context("query lyrics cache")?;
        if let Some(row) = rows.next().context("read lyrics cache row")? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn record_remix(&self, r: &RemixRecord) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO remixes(cache_key, path, title, artist, mood, mode, created_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(cache_key) DO UPDATE SET
  path=excluded.path,
  title=excluded.title,
  artist=excluded.artist,
  mood=excluded.mood,
  mode=excluded.mode,
  created_at=excluded.created_at
"#,
                params![
                    r.cache_key,
                    r.path.to_string_lossy(),
                    r.title,
                    r.artist,
                    r.mood,
                    r.mode,
                    r.created_at
                ],
            )
            .context("record remix")?;
        Ok(())
    }

    pub fn get_remix(&self, cache_key: &str) -> anyhow::Result<Option<RemixRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT cache_key, path, title, artist, mood, mode, created_at FROM remixes WHERE cache_key=?1",
            )
            .context("prepare remix lookup")?;
        let mut rows = stmt.query(params![cache_key]).context("query remix")?;
        if let Some(row) = rows.next().context("read remix row")? {
            Ok(Some(row_to_record(row)?))
        } else {
            Ok(None)
        }
    }

    /// Recent remixes, newest first
    pub fn history(&self, limit: usize) -> anyhow::Result<Vec<RemixRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
SELECT cache_key, path, title, artist, mood, mode, created_at
FROM remixes
ORDER BY created_at DESC
LIMIT ?1
"#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// Delete cache rows older than `cutoff_unix`. Returns the output files the
    /// deleted remix rows pointed at, for the caller to remove.
    pub fn prune_before(&self, cutoff_unix: i64) -> anyhow::Result<Vec<PathBuf>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM remixes WHERE created_at < ?1")
            .context("prepare prune")?;
        let paths: Vec<PathBuf> = stmt
            .query_map(params![cutoff_unix], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .map(PathBuf::from)
            .collect();

        self.conn
            .execute("DELETE FROM remixes WHERE created_at < ?1", params![cutoff_unix])
            .context("prune remixes")?;
        self.conn
            .execute("DELETE FROM lyrics_cache WHERE fetched_at < ?1", params![cutoff_unix])
            .context("prune lyrics")?;
        Ok(paths)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RemixRecord> {
    let path: String = row.get(1)?;
    Ok(RemixRecord {
        cache_key: row.get(0)?,
        path: PathBuf::from(path),
        title: row.get(2)?,
        artist: row.get(3)?,
        mood: row.get(4)?,
        mode: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// rusqlite from async code: open a connection per operation, call from
// spawn_blocking.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    path: PathBuf,
}

impl StorageHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> anyhow::Result<Storage> {
        Storage::open(&self.path)
    }

    pub fn get_lyrics(&self, query_key: &str) -> anyhow::Result<Option<String>> {
        self.open()?.get_lyrics(query_key)
    }

    pub fn cache_lyrics(
        &self,
        query_key: &str,
        bundle_json: &str,
        now_unix: i64,
    ) -> anyhow::Result<()> {
        self.open()?.cache_lyrics(query_key, bundle_json, now_unix)
    }

    pub fn get_remix(&self, cache_key: &str) -> anyhow::Result<Option<RemixRecord>> {
        self.open()?.get_remix(cache_key)
    }

    pub fn record_remix(&self, record: &RemixRecord) -> anyhow::Result<()> {
        self.open()?.record_remix(record)
    }

    pub fn history(&self, limit: usize) -> anyhow::Result<Vec<RemixRecord>> {
        self.open()?.history(limit)
    }

    pub fn prune_before(&self, cutoff_unix: i64) -> anyhow::Result<Vec<PathBuf>> {
        self.open()?.prune_before(cutoff_unix)
    }
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, created_at: i64) -> RemixRecord {
        RemixRecord {
            cache_key: key.to_string(),
            path: PathBuf::from(format!("/tmp/{key}.wav")),
            title: "Hello".to_string(),
            artist: "Adele".to_string(),
            mood: "melancholic".to_string(),
            mode: "fast".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_remix_round_trip_and_history_order() {
        let dir = tempfile::tempdir().unwrap();
        let handle = StorageHandle::new(dir.path().join("cache.sqlite3"));

        handle.record_remix(&record("old", 100)).unwrap();
        handle.record_remix(&record("new", 200)).unwrap();

        assert_eq!(handle.get_remix("old").unwrap(), Some(record("old", 100)));
        assert!(handle.get_remix("missing").unwrap().is_none());

        let keys: Vec<String> = handle
            .history(10)
            .unwrap()
            .into_iter()
            .map(|r| r.cache_key)
            .collect();
        assert_eq!(keys, vec!["new", "old"]);
        assert_eq!(handle.history(1).unwrap().len(), 1);
    }

    #[test]
    fn test_record_overwrites_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("c.db")).unwrap();
        storage.record_remix(&record("k", 1)).unwrap();
        let mut again = record("k", 2);
        again.mode = "quick".to_string();
        storage.record_remix(&again).unwrap();
        assert_eq!(storage.get_remix("k").unwrap().unwrap().mode, "quick");
        assert_eq!(storage.history(10).unwrap().len(), 1);
    }

    #[test]
    fn test_lyrics_cache_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("nested/c.db")).unwrap();
        storage.cache_lyrics("q1", r#"{"a":1}"#, 50).unwrap();
        storage.cache_lyrics("q2", r#"{"a":2}"#, 500).unwrap();
        storage.record_remix(&record("old", 50)).unwrap();
        storage.record_remix(&record("new", 500)).unwrap();

        let removed = storage.prune_before(100).unwrap();
        assert_eq!(removed, vec![PathBuf::from("/tmp/old.wav")]);
        assert!(storage.get_lyrics("q1").unwrap().is_none());
        assert_eq!(storage.get_lyrics("q2").unwrap().as_deref(), Some(r#"{"a":2}"#));
        assert!(storage.get_remix("old").unwrap().is_none());
        assert!(storage.get_remix("new").unwrap().is_some());
    }
}
