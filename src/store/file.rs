//! File tier: a JSON counter record and one JSONL log per event kind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::counter::CounterBackend;
use super::events::EventBackend;
use super::{join_error, CounterState, EventKind, EventRecord, FeedbackEntry, Tier};
use crate::error::{IntoStorageError, PredictorError, Result};

/// Default counter file name.
pub const COUNTER_FILE: &str = "counter.json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// Counter persisted as `{"total_users": .., "predictions": ..}`.
#[derive(Debug, Clone)]
pub struct FileCounter {
    path: PathBuf,
}

impl FileCounter {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Reads the record. A missing or unparseable file reads as zero.
    fn read(&self) -> Result<CounterState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CounterState::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    "Corrupted counter file at {}: {}. Treating as zero.",
                    self.path.display(),
                    e
                );
                Ok(CounterState::default())
            }
        }
    }

    /// Writes the record through a temporary file and rename.
    fn write(&self, state: &CounterState) -> Result<()> {
        let tmp_path = self.sibling(TMP_SUFFIX);
        let json = serde_json::to_string(state)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Runs `update` on the record under an exclusive lock and persists it.
    fn update_locked(&self, update: impl FnOnce(&mut CounterState)) -> Result<CounterState> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = File::create(self.sibling(LOCK_SUFFIX))?;
        FileExt::lock_exclusive(&lock_file).into_storage(Tier::File)?;

        let mut state = self.read()?;
        update(&mut state);
        let written = self.write(&state);

        let _ = FileExt::unlock(&lock_file);
        written.map(|()| state)
    }

    async fn blocking<T: Send + 'static>(
        &self,
        op: impl FnOnce(FileCounter) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(this))
            .await
            .map_err(|e| join_error(Tier::File, e))?
    }
}

#[async_trait]
impl CounterBackend for FileCounter {
    fn tier(&self) -> Tier {
        Tier::File
    }

    async fn load(&self) -> Result<CounterState> {
        self.blocking(|c| c.read()).await
    }

    async fn increment(&self, is_new_user: bool) -> Result<CounterState> {
        self.blocking(move |c| c.update_locked(|s| s.record_prediction(is_new_user)))
            .await
    }

    async fn store(&self, state: CounterState) -> Result<()> {
        self.blocking(move |c| c.update_locked(|s| *s = state).map(|_| ()))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.blocking(|c| {
            c.read()?;
            let dir = match c.path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let meta = fs::metadata(&dir).into_storage(Tier::File)?;
            if meta.permissions().readonly() {
                return Err(PredictorError::storage(
                    Tier::File,
                    format!("{} is read-only", dir.display()),
                ));
            }
            Ok(())
        })
        .await
    }
}

/// Event logs as `<dir>/<kind>.jsonl`.
#[derive(Debug, Clone)]
pub struct FileEvents {
    dir: PathBuf,
}

impl FileEvents {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the log for `kind`.
    #[must_use]
    pub fn log_path(&self, kind: EventKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind.name()))
    }

    fn append_line(&self, record: &EventRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let line = match record {
            EventRecord::Visit(e) => serde_json::to_string(e)?,
            EventRecord::Prediction(e) => serde_json::to_string(e)?,
            EventRecord::Feedback(e) => serde_json::to_string(e)?,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(record.kind()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Reads every parseable line of a log; bad lines are skipped.
    fn read_all<T: DeserializeOwned>(&self, kind: EventKind) -> Result<Vec<T>> {
        let file = match File::open(self.log_path(kind)) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines().map_while(std::io::Result::ok) {
            if let Ok(record) = serde_json::from_str::<T>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn blocking<T: Send + 'static>(
        &self,
        op: impl FnOnce(FileEvents) -> Result<T> + Send + 'static,
    ) -> Result<T> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(this))
            .await
            .map_err(|e| join_error(Tier::File, e))?
    }
}

#[async_trait]
impl EventBackend for FileEvents {
    fn tier(&self) -> Tier {
        Tier::File
    }

    async fn append(&self, record: &EventRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |f| f.append_line(&record)).await
    }

    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackEntry>> {
        self.blocking(move |f| {
            let mut entries: Vec<FeedbackEntry> = f.read_all(EventKind::Feedback)?;
            entries.reverse();
            entries.truncate(limit);
            Ok(entries)
        })
        .await
    }

    async fn feedback_count(&self) -> Result<u64> {
        self.blocking(|f| {
            let entries: Vec<FeedbackEntry> = f.read_all(EventKind::Feedback)?;
            Ok(entries.len() as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VisitorEvent;
    use chrono::Utc;
    use tempfile::TempDir;

    fn counter() -> (FileCounter, TempDir) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let counter = FileCounter::new(temp.path().join("data").join(COUNTER_FILE));
        (counter, temp)
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_zero() {
        let (counter, _temp) = counter();
        assert_eq!(counter.load().await.unwrap(), CounterState::default());
        assert!(!counter.path().exists());
    }

    #[tokio::test]
    async fn test_increment_creates_directory_and_file() {
        let (counter, _temp) = counter();
        let state = counter.increment(true).await.unwrap();
        assert_eq!(state, CounterState::new(1, 1));
        assert!(counter.path().exists());

        let raw = fs::read_to_string(counter.path()).unwrap();
        assert_eq!(raw, r#"{"total_users":1,"predictions":1}"#);
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_after_write() {
        let (counter, _temp) = counter();
        counter.increment(false).await.unwrap();
        assert!(!counter.sibling(TMP_SUFFIX).exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_reads_as_zero_and_is_overwritten() {
        let (counter, _temp) = counter();
        fs::create_dir_all(counter.path().parent().unwrap()).unwrap();
        fs::write(counter.path(), "not valid json {{{").unwrap();

        assert_eq!(counter.load().await.unwrap(), CounterState::default());
        assert_eq!(counter.increment(true).await.unwrap(), CounterState::new(1, 1));
    }

    #[tokio::test]
    async fn test_store_overwrites_counts() {
        let (counter, _temp) = counter();
        counter.increment(true).await.unwrap();
        counter.store(CounterState::new(40, 90)).await.unwrap();
        assert_eq!(counter.load().await.unwrap(), CounterState::new(40, 90));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        // A directory where the file should be can't be read as a file.
        let path = temp.path().join("counter.json");
        fs::create_dir_all(&path).unwrap();

        let counter = FileCounter::new(&path);
        assert!(counter.load().await.is_err());
        assert!(counter.increment(true).await.is_err());
    }

    #[tokio::test]
    async fn test_events_append_per_kind() {
        let temp = TempDir::new().unwrap();
        let events = FileEvents::new(temp.path());

        events
            .append(&EventRecord::Visit(VisitorEvent {
                visitor_id: "abc".into(),
                path: "/".into(),
                user_agent: Some("curl/8".into()),
                timestamp: Utc::now(),
            }))
            .await
            .unwrap();

        let visits = fs::read_to_string(events.log_path(EventKind::Visits)).unwrap();
        assert!(visits.contains("\"visitor_id\":\"abc\""));
        assert!(!events.log_path(EventKind::Feedback).exists());
        assert_eq!(events.feedback_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feedback_log_skips_bad_lines() {
        let temp = TempDir::new().unwrap();
        let events = FileEvents::new(temp.path());

        let entry = FeedbackEntry {
            visitor_id: None,
            name: "Ravi".into(),
            email: "ravi@example.com".into(),
            message: "close to my offer".into(),
            rating: 5,
            timestamp: Utc::now(),
        };
        events
            .append(&EventRecord::Feedback(entry.clone()))
            .await
            .unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(events.log_path(EventKind::Feedback))
            .unwrap();
        writeln!(file, "{{truncated").unwrap();

        let recent = events.recent_feedback(10).await.unwrap();
        assert_eq!(recent, vec![entry]);
    }
}
