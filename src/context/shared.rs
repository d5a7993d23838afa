//! Shared handle to a conversation buffer
//!
//! `ContextCompressor` takes `&mut self`, so within one task the borrow
//! checker already rules out concurrent mutation. When a buffer has to be
//! reachable from several tasks, `SharedContext` guards it with a tokio
//! mutex and fails fast: an operation that finds the buffer held (in
//! practice by an in-flight compression, the only step that suspends)
//! gets `ContextError::ConcurrentMutation` instead of queuing.

use crate::context::compressor::{AppendReport, CompressionOutcome, ContextCompressor, ContextInfo};
use crate::errors::{ContextError, ContextResult};
use crate::types::Turn;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Cloneable, fail-fast handle to one compressor
#[derive(Clone)]
pub struct SharedContext {
    inner: Arc<Mutex<ContextCompressor>>,
}

impl SharedContext {
    pub fn new(compressor: ContextCompressor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(compressor)),
        }
    }

    /// Append a turn; rejected while another operation holds the buffer
    pub async fn append(&self, turn: Turn) -> ContextResult<AppendReport> {
        let mut compressor = self.acquire("append")?;
        compressor.append(turn).await
    }

    /// Compress now; rejected while another operation holds the buffer
    pub async fn compress(&self) -> ContextResult<CompressionOutcome> {
        let mut compressor = self.acquire("compress")?;
        Ok(compressor.compress().await)
    }

    /// Accounting snapshot
    pub fn info(&self) -> ContextResult<ContextInfo> {
        Ok(self.acquire("read")?.info())
    }

    /// Copy of the buffer for building a model request
    pub fn snapshot(&self) -> ContextResult<Vec<Turn>> {
        Ok(self.acquire("read")?.snapshot())
    }

    fn acquire(&self, operation: &'static str) -> ContextResult<MutexGuard<'_, ContextCompressor>> {
        self.inner
            .try_lock()
            .map_err(|_| ContextError::ConcurrentMutation { operation })
    }
}
