//! Record sinks
//!
//! The pipeline hands each serialized record to a [`Sink`] and never looks
//! at the transport behind it. Implementations here cover the broker
//! ([`crate::redis::RedisSink`]), stdout for dry runs, an append-only JSONL
//! file used for dead letters, and an in-memory sink for tests.

use crate::error::DeliveryError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

/// Accepts one serialized record per call.
///
/// Sinks must tolerate concurrent `emit` calls; the pipeline may emit from a
/// bounded pool.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    async fn emit(&self, payload: &[u8]) -> Result<(), DeliveryError>;
}

/// Collects payloads in memory. Failures can be scripted for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Vec<u8>>>,
    scripted_failures: Mutex<VecDeque<DeliveryError>>,
    attempts: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next emits, in order, with the given errors.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = DeliveryError>) {
        if let Ok(mut queue) = self.scripted_failures.lock() {
            queue.extend(errors);
        }
    }

    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of emit calls, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.lock().map(|a| *a).unwrap_or(0)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn emit(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }

        let scripted = self
            .scripted_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        self.records
            .lock()
            .map_err(|_| DeliveryError::Rejected("memory sink poisoned".to_string()))?
            .push(payload.to_vec());
        Ok(())
    }
}

/// Writes each record as one line on stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn emit(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Appends each record as one line to a file. Used for dead letters.
#[derive(Debug)]
pub struct JsonLinesFileSink {
    path: PathBuf,
    name: String,
    // Serializes appends so concurrent emits never interleave lines
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonLinesFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = format!("file:{}", path.display());
        Self {
            path,
            name,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for JsonLinesFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn emit(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_scripted_failures() {
        let sink = MemorySink::new();
        sink.fail_next([DeliveryError::Transport("down".to_string())]);

        assert!(sink.emit(b"one").await.is_err());
        sink.emit(b"two").await.unwrap();

        assert_eq!(sink.attempts(), 2);
        assert_eq!(sink.records(), vec![b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!("txflow-sink-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = JsonLinesFileSink::new(&path);

        sink.emit(br#"{"a":1}"#).await.unwrap();
        sink.emit(br#"{"a":2}"#).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "{\"a\":1}\n{\"a\":2}\n");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
