use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::common::{ApplicationError, ApplicationResult, EventEnvelope, EventJournal};

/// Event journal in JSON Lines format, one file per aggregate.
///
/// Lines are only ever appended, so a journal directory can be tailed by
/// another process while the coordinator runs.
pub struct FileEventJournal {
    base_path: PathBuf,
}

impl FileEventJournal {
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self { base_path: base_path.into() }
    }

    fn file_path(&self, aggregate_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", aggregate_id))
    }

    async fn ensure_base_dir(&self) -> ApplicationResult<()> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| ApplicationError::EventJournal(format!("Failed to create journal directory: {}", e)))
    }
}

#[async_trait]
impl EventJournal for FileEventJournal {
    async fn append(&self, aggregate_id: &str, events: Vec<EventEnvelope>) -> ApplicationResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.ensure_base_dir().await?;

        let file_path = self.file_path(aggregate_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await
            .map_err(|e| {
                ApplicationError::EventJournal(format!("Failed to open journal {}: {}", file_path.display(), e))
            })?;

        let mut buffer = Vec::new();
        for event in &events {
            serde_json::to_writer(&mut buffer, event)
                .map_err(|e| ApplicationError::EventJournal(format!("Failed to serialize event: {}", e)))?;
            buffer.push(b'\n');
        }
        file.write_all(&buffer)
            .await
            .map_err(|e| ApplicationError::EventJournal(format!("Failed to write events: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ApplicationError::EventJournal(format!("Failed to flush journal: {}", e)))
    }

    async fn load(&self, aggregate_id: &str) -> ApplicationResult<Vec<EventEnvelope>> {
        let file_path = self.file_path(aggregate_id);
        if !file_path.exists() {
            return Ok(vec![]);
        }

        let file = File::open(&file_path).await.map_err(|e| {
            ApplicationError::EventJournal(format!("Failed to open journal {}: {}", file_path.display(), e))
        })?;
        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_number = 0u64;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ApplicationError::EventJournal(format!("Failed to read line: {}", e)))?
        {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: EventEnvelope = serde_json::from_str(&line).map_err(|e| {
                ApplicationError::EventJournal(format!("Failed to deserialize event at line {}: {}", line_number, e))
            })?;
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EventMetadata;
    use crate::domains::navigation::events::CoordinatorEvent;
    use crate::domains::navigation::types::Mode;
    use chrono::Utc;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_file_event_journal() {
        let temp_dir = TempDir::new().unwrap();
        let journal = FileEventJournal::new(temp_dir.path().join("journal"));

        let event = CoordinatorEvent::ModeChanged {
            entity_id: "robot_01".to_string(),
            from: Mode::Standby,
            to: Mode::Navi,
            timestamp: Utc::now(),
        };
        let envelope = EventEnvelope::new(&event, "NavigationCoordinator", EventMetadata::from_source("test")).unwrap();

        assert_ok!(journal.append("robot_01", vec![envelope.clone()]).await);
        assert_ok!(journal.append("robot_01", vec![envelope.clone()]).await);
        assert_ok!(journal.append("robot_01", Vec::new()).await);

        let loaded = journal.load("robot_01").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].event_id, envelope.event_id);
        assert_eq!(loaded[0].event_type, "ModeChanged");

        assert!(journal.load("someone_else").await.unwrap().is_empty());
    }
}
