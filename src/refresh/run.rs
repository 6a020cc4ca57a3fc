//! Per-request run record and output capture.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{trace, warn};
use uuid::Uuid;

use super::launcher::OutputStream;

const READ_CHUNK: usize = 8 * 1024;

/// Append-only byte buffer shared between a reader task and the supervisor.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn append(&self, chunk: &[u8]) {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
    }

    /// Snapshot of everything captured so far, decoded as lossy UTF-8.
    pub fn text(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ephemeral record of one invocation of the external script.
#[derive(Debug, Clone)]
pub struct RefreshRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
}

impl RefreshRun {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            stdout: OutputBuffer::default(),
            stderr: OutputBuffer::default(),
        }
    }
}

/// Drain `stream` into `buffer` on a background task, chunk by chunk.
///
/// Finishes at EOF. Read errors end the capture early.
pub fn capture(mut stream: OutputStream, buffer: OutputBuffer, name: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    trace!(stream = name, bytes = n, "captured output chunk");
                    buffer.append(&chunk[..n]);
                }
                Err(e) => {
                    warn!(stream = name, error = %e, "output capture stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_capture_keeps_chunk_order() {
        let stream = tokio_test::io::Builder::new()
            .read(b"fetch ")
            .read(b"analyze ")
            .wait(Duration::from_millis(5))
            .read(b"optimize\n")
            .build();
        let buffer = OutputBuffer::default();
        capture(Box::pin(stream), buffer.clone(), "stdout")
            .await
            .unwrap();
        assert_eq!(buffer.text(), "fetch analyze optimize\n");
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let bytes = "✅ done".as_bytes();
        let stream = tokio_test::io::Builder::new()
            .read(&bytes[..2])
            .read(&bytes[2..])
            .build();
        let buffer = OutputBuffer::default();
        capture(Box::pin(stream), buffer.clone(), "stdout")
            .await
            .unwrap();
        assert_eq!(buffer.text(), "✅ done");
    }

    #[test]
    fn test_buffer_clones_share_storage() {
        let buffer = OutputBuffer::default();
        assert!(buffer.is_empty());
        let other = buffer.clone();
        other.append(b"abc");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.text(), "abc");
    }

    #[test]
    fn test_runs_get_distinct_ids() {
        assert_ne!(RefreshRun::new().id, RefreshRun::new().id);
    }
}
