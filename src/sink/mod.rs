//! Call sinks.
//!
//! A sink receives finalized calls. The CSV sink writes the canonical
//! per-leg layout (UTF-8 with BOM, RFC 4180 escaping); the in-memory sink
//! backs tests and hosted callers.

mod csv;

pub use csv::{CsvCallSink, LEG_COLUMNS};

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::call::Call;

/// Sink errors are fatal to the run: an output that cannot be written
/// invalidates the batch.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives finalized calls.
#[async_trait]
pub trait CallSink: Send {
    async fn write_call(&mut self, call: &Call) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;
}

/// Collects calls in memory.
#[derive(Debug, Default)]
pub struct MemoryCallSink {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MemoryCallSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected calls, usable after the engine run.
    pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CallSink for MemoryCallSink {
    async fn write_call(&mut self, call: &Call) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push(call.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
