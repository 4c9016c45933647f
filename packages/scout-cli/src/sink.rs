//! JSON Lines output for finalized profiles.

use async_trait::async_trait;
use faculty_scout::{ProfileBatch, ProfileSink, SinkError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Appends one JSON object per profile to a file.
///
/// Concurrent runs share the file; the lock keeps each batch contiguous.
pub struct JsonLinesSink {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct Line<'a> {
    run_id: String,
    root_url: &'a str,
    #[serde(flatten)]
    profile: &'a faculty_scout::ProfileCandidate,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ProfileSink for JsonLinesSink {
    async fn store(&self, batch: &ProfileBatch) -> Result<(), SinkError> {
        let mut buffer = Vec::new();
        for profile in &batch.records {
            let line = Line {
                run_id: batch.run_id.to_string(),
                root_url: &batch.root_url,
                profile,
            };
            serde_json::to_writer(&mut buffer, &line)?;
            buffer.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::Storage(Box::new(e)))?;
        file.write_all(&buffer)
            .await
            .map_err(|e| SinkError::Storage(Box::new(e)))?;
        file.flush().await.map_err(|e| SinkError::Storage(Box::new(e)))?;

        debug!(path = %self.path.display(), records = batch.records.len(), "Profiles written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use faculty_scout::{ExtractionTier, ProfileCandidate};
    use uuid::Uuid;

    fn batch(names: &[&str]) -> ProfileBatch {
        ProfileBatch {
            run_id: Uuid::new_v4(),
            root_url: "https://x.edu/".to_string(),
            produced_at: Utc::now(),
            records: names
                .iter()
                .map(|n| ProfileCandidate::new(*n, "https://x.edu/people", ExtractionTier::Structural))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_appends_one_line_per_profile() {
        let path = std::env::temp_dir().join(format!("faculty-scout-{}.jsonl", Uuid::new_v4()));
        let sink = JsonLinesSink::new(&path);

        sink.store(&batch(&["Jane Doe", "John Roe"])).await.unwrap();
        sink.store(&batch(&["Ada Lovelace"])).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["name"], "Jane Doe");
        assert_eq!(lines[0]["root_url"], "https://x.edu/");
        assert_eq!(lines[2]["name"], "Ada Lovelace");
        assert_ne!(lines[0]["run_id"], lines[2]["run_id"]);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_unwritable_path_is_storage_error() {
        let sink = JsonLinesSink::new(std::env::temp_dir().join("missing-dir").join("out.jsonl"));
        let err = sink.store(&batch(&["Jane Doe"])).await.unwrap_err();
        assert!(matches!(err, SinkError::Storage(_)));
    }
}
