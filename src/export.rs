//! Streaming export of full (unpaginated) result sets.
//!
//! An export runs the same predicates as the search it came from, with the
//! row window removed, and encodes batches incrementally so a large result
//! set never has to fit in memory. The consumer pulls encoded chunks from an
//! [`ExportHandle`]; dropping the handle or calling [`ExportHandle::cancel`]
//! stops the worker mid-stream.

use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::SearchError;
use crate::query_builder::build_export_plan;
use crate::registry::DatasetDescriptor;
use crate::retrieval::result_page::shape_rows;
use crate::retrieval::RetrievalExecutor;

/// Encoded chunks buffered between the worker and a slow consumer.
const CHUNK_BUFFER: usize = 2;

/// Wire format of an export artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One CSV document, header row first.
    Csv,
    /// One JSON object per line.
    JsonLines,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::JsonLines => "jsonl",
        }
    }
}

/// Terminal state of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { rows: u64 },
    Cancelled,
    Failed { reason: String },
}

/// Consumer side of a running export.
///
/// Chunks arrive in encoding order. After the chunk stream ends,
/// [`finish`](ExportHandle::finish) reports whether the export completed,
/// was cancelled, or failed mid-stream.
pub struct ExportHandle {
    /// Suggested artifact file name, timestamped per export.
    pub filename: String,
    chunks: mpsc::Receiver<Bytes>,
    cancel_flag: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
    outcome: oneshot::Receiver<ExportOutcome>,
}

impl ExportHandle {
    /// Next encoded chunk, `None` once the worker is done.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.recv().await
    }

    /// Requests cancellation. The worker stops at its next chunk boundary;
    /// already-buffered chunks may still be delivered.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Waits for the worker's terminal state, draining any remaining chunks.
    pub async fn finish(mut self) -> ExportOutcome {
        while self.chunks.recv().await.is_some() {}
        self.outcome.await.unwrap_or(ExportOutcome::Failed {
            reason: "export task ended unexpectedly".to_string(),
        })
    }

    /// Drains the whole export into memory.
    ///
    /// Convenience for small exports and the CLI path. Cancellation surfaces
    /// as [`SearchError::ExportCancelled`].
    pub async fn collect(mut self) -> Result<(Vec<Bytes>, u64), SearchError> {
        let mut collected = Vec::new();
        while let Some(chunk) = self.chunks.recv().await {
            collected.push(chunk);
        }
        match self.outcome.await {
            Ok(ExportOutcome::Completed { rows }) => Ok((collected, rows)),
            Ok(ExportOutcome::Cancelled) => Err(SearchError::ExportCancelled),
            Ok(ExportOutcome::Failed { reason }) => Err(SearchError::Retrieval { reason }),
            Err(_) => Err(SearchError::retrieval("export task ended unexpectedly")),
        }
    }
}

/// Spawns and tracks export workers.
pub struct ExportPipeline {
    executor: Arc<RetrievalExecutor>,
}

impl ExportPipeline {
    pub fn new(executor: Arc<RetrievalExecutor>) -> Self {
        ExportPipeline { executor }
    }

    /// Starts an export of every row matching the keyword.
    ///
    /// Plan building and query planning run before this returns, so invalid
    /// keywords and unreadable files fail synchronously. Encoding and
    /// delivery happen on a background task.
    pub async fn stream_export(
        &self,
        descriptor: &DatasetDescriptor,
        locator: &str,
        keyword: &str,
        field_selector: &str,
        format: ExportFormat,
    ) -> Result<ExportHandle, SearchError> {
        let plan = build_export_plan(descriptor, keyword, field_selector)?;
        let stream = self.executor.stream(locator, &plan).await?;

        let filename = format!(
            "{}_export_{}.{}",
            descriptor.key().slug(),
            Utc::now().format("%Y%m%d_%H%M%S"),
            format.extension()
        );

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let cancel_notify = Arc::new(Notify::new());

        let worker = ExportWorker {
            descriptor: descriptor.clone(),
            format,
            chunks: chunk_tx,
            cancel_flag: Arc::clone(&cancel_flag),
            cancel_notify: Arc::clone(&cancel_notify),
        };
        tokio::spawn(async move {
            let outcome = worker.run(stream).await;
            let _ = outcome_tx.send(outcome);
        });

        Ok(ExportHandle {
            filename,
            chunks: chunk_rx,
            cancel_flag,
            cancel_notify,
            outcome: outcome_rx,
        })
    }
}

struct ExportWorker {
    descriptor: DatasetDescriptor,
    format: ExportFormat,
    chunks: mpsc::Sender<Bytes>,
    cancel_flag: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

impl ExportWorker {
    async fn run(
        self,
        mut stream: datafusion::execution::SendableRecordBatchStream,
    ) -> ExportOutcome {
        let mut rows: u64 = 0;
        let mut first_chunk = true;

        loop {
            if self.cancel_flag.load(Ordering::SeqCst) {
                return ExportOutcome::Cancelled;
            }

            let batch = tokio::select! {
                _ = self.cancel_notify.notified() => return ExportOutcome::Cancelled,
                batch = stream.next() => batch,
            };
            let batch = match batch {
                Some(Ok(batch)) => batch,
                Some(Err(err)) => {
                    return ExportOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
                None => return ExportOutcome::Completed { rows },
            };
            if batch.num_rows() == 0 {
                continue;
            }

            let chunk = match self.encode(&batch, first_chunk) {
                Ok(chunk) => chunk,
                Err(err) => {
                    return ExportOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            first_chunk = false;
            rows += batch.num_rows() as u64;

            tokio::select! {
                _ = self.cancel_notify.notified() => return ExportOutcome::Cancelled,
                sent = self.chunks.send(chunk) => {
                    // A dropped receiver counts as cancellation.
                    if sent.is_err() {
                        return ExportOutcome::Cancelled;
                    }
                }
            }
        }
    }

    fn encode(
        &self,
        batch: &arrow::record_batch::RecordBatch,
        first_chunk: bool,
    ) -> Result<Bytes, SearchError> {
        match self.format {
            ExportFormat::Csv => {
                let mut writer = arrow::csv::WriterBuilder::new()
                    .with_header(first_chunk)
                    .build(Vec::new());
                writer.write(batch).map_err(SearchError::retrieval)?;
                Ok(Bytes::from(writer.into_inner()))
            }
            ExportFormat::JsonLines => {
                let rows = shape_rows(std::slice::from_ref(batch), &self.descriptor)?;
                let mut encoded = Vec::new();
                for row in rows {
                    let line = serde_json::to_vec(&row).map_err(SearchError::retrieval)?;
                    encoded.extend_from_slice(&line);
                    encoded.push(b'\n');
                }
                Ok(Bytes::from(encoded))
            }
        }
    }
}

// Link to test module (only compiled during tests)
#[cfg(test)]
#[path = "export/tests/mod.rs"]
mod tests;
