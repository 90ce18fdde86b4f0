//! Conversion audit logging port.
//!
//! Logging is fire-and-forget relative to the conversion: converters call
//! [`record_quietly`], which traces a failure and moves on.

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::model::ConversionLog;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("conversion log write failed: {0}")]
pub struct LogSinkError(pub String);

/// Append-only destination for [`ConversionLog`] records.
pub trait ConversionLogSink: Send + Sync {
    fn record(&self, entry: ConversionLog) -> Result<(), LogSinkError>;
}

impl<S> ConversionLogSink for Arc<S>
where
    S: ConversionLogSink + ?Sized,
{
    fn record(&self, entry: ConversionLog) -> Result<(), LogSinkError> {
        (**self).record(entry)
    }
}

/// Write to `sink`, swallowing (but tracing) any failure.
pub fn record_quietly(sink: &dyn ConversionLogSink, entry: ConversionLog) {
    let log_id = entry.id;
    if let Err(err) = sink.record(entry) {
        tracing::warn!(%log_id, error = %err, "dropping conversion log entry");
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryConversionLog {
    entries: RwLock<Vec<ConversionLog>>,
}

impl InMemoryConversionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn entries(&self) -> Vec<ConversionLog> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConversionLogSink for InMemoryConversionLog {
    fn record(&self, entry: ConversionLog) -> Result<(), LogSinkError> {
        self.entries
            .write()
            .map_err(|_| LogSinkError("lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}
