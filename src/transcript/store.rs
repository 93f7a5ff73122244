//! JSONL-backed transcript store

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::OwnedMutexGuard;

use super::{Turn, UserKey};
use crate::Result;

/// Append-only store of per-user transcripts
///
/// Each user gets one `<key>.jsonl` file under the root directory, one
/// encoded [`Turn`] per line. Files are created on first append and never
/// rewritten.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    root: PathBuf,
    /// Per-user exchange locks
    locks: Arc<Mutex<HashMap<UserKey, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TranscriptStore {
    /// Open a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        tracing::info!(root = %root.display(), "opened transcript store");

        Ok(Self {
            root,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Directory holding the transcript files
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one user's transcript file
    #[must_use]
    pub fn path(&self, key: &UserKey) -> PathBuf {
        self.root.join(format!("{key}.jsonl"))
    }

    /// Append one turn to the end of a user's transcript
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or written
    pub async fn append(&self, key: &UserKey, turn: &Turn) -> Result<()> {
        self.append_all(key, std::slice::from_ref(turn)).await
    }

    /// Append several turns with a single write
    ///
    /// Used for the user/model pair of one exchange so a crash between the
    /// two records cannot leave a dangling user turn.
    ///
    /// # Errors
    ///
    /// Returns error if any record cannot be encoded or the write fails
    pub async fn append_all(&self, key: &UserKey, turns: &[Turn]) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for turn in turns {
            serde_json::to_writer(&mut buf, turn)?;
            buf.push(b'\n');
        }

        let path = self.path(key);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        if ends_mid_record(&mut file).await? {
            tracing::warn!(user = %key, "transcript ends in a partial record, starting a new line");
            buf.insert(0, b'\n');
        }
        file.write_all(&buf).await?;
        file.sync_data().await?;

        tracing::debug!(user = %key, turns = turns.len(), "appended to transcript");
        Ok(())
    }

    /// Read a user's transcript in write order
    ///
    /// A missing transcript reads as empty. Records that fail to decode are
    /// skipped with a warning so one damaged line does not hide the rest.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read
    pub async fn read(&self, key: &UserKey) -> Result<Vec<Turn>> {
        let bytes = match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(decode_records(key, &bytes))
    }

    /// Acquire the exchange lock for one user
    ///
    /// Holding the guard serializes read-generate-append sequences for the
    /// same user; different users never contend.
    pub async fn lock(&self, key: &UserKey) -> OwnedMutexGuard<()> {
        let user_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if !locks.contains_key(key) {
                // Drop locks nobody holds or waits on
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        user_lock.lock_owned().await
    }
}

/// Decode JSONL records, skipping blank and malformed lines
/// Whether a non-empty file lacks its final newline
async fn ends_mid_record(file: &mut tokio::fs::File) -> std::io::Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

fn decode_records(key: &UserKey, bytes: &[u8]) -> Vec<Turn> {
    let mut turns = Vec::new();

    for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::warn!(user = %key, line = index + 1, "skipping non-UTF-8 transcript record");
            continue;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Turn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                tracing::warn!(
                    user = %key,
                    line = index + 1,
                    error = %e,
                    "skipping malformed transcript record"
                );
            }
        }
    }

    turns
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::transcript::Role;

    fn setup() -> (tempfile::TempDir, TranscriptStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::open(dir.path().join("chat_history")).unwrap();
        (dir, store)
    }

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn missing_transcript_reads_empty() {
        let (_dir, store) = setup();
        let key = UserKey::from_id(1);

        assert!(store.read(&key).await.unwrap().is_empty());
        assert!(!store.path(&key).exists());
    }

    #[tokio::test]
    async fn appends_are_read_back_in_order() {
        let (_dir, store) = setup();
        let key = UserKey::from_handle("alice").unwrap();

        let turns = vec![
            Turn::user("one", at(0)),
            Turn::model("two", at(1)),
            Turn::user("three", at(2)),
        ];

        store.append(&key, &turns[0]).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), turns[..1]);

        store.append(&key, &turns[1]).await.unwrap();
        store.append(&key, &turns[2]).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), turns);
    }

    #[tokio::test]
    async fn round_trip_preserves_fields() {
        let (_dir, store) = setup();
        let key = UserKey::from_id(7);
        let ts = Utc.timestamp_opt(1_714_557_600, 123_000_000).unwrap();
        let turn = Turn::user("héllo, wörld ✨", ts);

        store.append(&key, &turn).await.unwrap();

        let read = store.read(&key).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].role, Role::User);
        assert_eq!(read[0].content, "héllo, wörld ✨");
        assert_eq!(read[0].timestamp, ts);
    }

    #[tokio::test]
    async fn records_are_one_per_line() {
        let (_dir, store) = setup();
        let key = UserKey::from_id(7);

        store
            .append_all(&key, &[Turn::user("a\nb", at(0)), Turn::model("c", at(1))])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path(&key)).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));
    }

    #[tokio::test]
    async fn skips_malformed_record() {
        let (_dir, store) = setup();
        let key = UserKey::from_id(9);

        store.append(&key, &Turn::user("first", at(0))).await.unwrap();
        {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(store.path(&key))
                .unwrap();
            writeln!(f, "{{\"role\":\"user\",\"content\":").unwrap();
            f.write_all(&[0xff, 0xfe, b'\n']).unwrap();
            writeln!(f).unwrap();
        }
        store.append(&key, &Turn::model("second", at(1))).await.unwrap();

        let read = store.read(&key).await.unwrap();
        let contents: Vec<_> = read.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (_dir, store) = setup();
        let alice = UserKey::from_handle("alice").unwrap();
        let bob = UserKey::from_id(2);

        store.append(&alice, &Turn::user("for alice", at(0))).await.unwrap();

        assert!(store.read(&bob).await.unwrap().is_empty());
        assert_eq!(store.read(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lock_serializes_same_user_only() {
        let (_dir, store) = setup();
        let alice = UserKey::from_handle("alice").unwrap();
        let bob = UserKey::from_handle("bob").unwrap();
        let wait = std::time::Duration::from_millis(50);

        let guard = store.lock(&alice).await;

        // A different user is not blocked
        let other = tokio::time::timeout(wait, store.lock(&bob)).await;
        assert!(other.is_ok());

        // The same user waits until the guard drops
        let same = tokio::time::timeout(wait, store.lock(&alice)).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(wait, store.lock(&alice)).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_released() {
        let (_dir, store) = setup();
        for name in ["alice", "bob", "carol"] {
            let key = UserKey::from_handle(name).unwrap();
            drop(store.lock(&key).await);
        }

        let held = store.lock(&UserKey::from_handle("dave").unwrap()).await;
        let tracked: Vec<_> = store.locks.lock().unwrap().keys().cloned().collect();
        assert_eq!(tracked, [UserKey::from_handle("dave").unwrap()]);

        // A held lock survives the next insert
        let _other = store.lock(&UserKey::from_handle("erin").unwrap()).await;
        assert_eq!(store.locks.lock().unwrap().len(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn torn_tail_does_not_swallow_next_record() {
        let (_dir, store) = setup();
        let key = UserKey::from_handle("alice").unwrap();
        store.append(&key, &Turn::user("first", at(0))).await.unwrap();

        // A crash mid-write leaves a record without its newline
        let mut raw = std::fs::read(store.path(&key)).unwrap();
        raw.extend_from_slice(br#"{"role":"user","cont"#);
        std::fs::write(store.path(&key), raw).unwrap();

        store
            .append_all(
                &key,
                &[Turn::user("second", at(1)), Turn::model("third", at(2))],
            )
            .await
            .unwrap();

        let contents: Vec<_> = store
            .read(&key)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }
}
