//! Shared record source: one reassembler, many feeders, one collector
//!
//! Producers call [`RecordSource::feed`] (never blocks on the consumer).
//! The window collector awaits [`RecordSource::next`], which suspends on a
//! `Notify` instead of polling and returns `None` as soon as the session's
//! cancellation token fires.

use super::reassembler::{ReassemblerConfig, ReassemblerStats, StreamReassembler};
use crate::types::Record;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct SourceInner {
    /// Guards the carry-over buffer against concurrent feeders
    reassembler: Mutex<StreamReassembler>,
    /// Signalled whenever a feed enqueues at least one record
    records_available: Notify,
}

/// Cloneable handle to a shared [`StreamReassembler`]
#[derive(Clone)]
pub struct RecordSource {
    inner: Arc<SourceInner>,
}

impl RecordSource {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                reassembler: Mutex::new(StreamReassembler::new(config)),
                records_available: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamReassembler> {
        // Reassembler state stays consistent even if a holder panicked
        self.inner
            .reassembler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed one raw transport chunk; returns records enqueued
    pub fn feed(&self, chunk: &[u8]) -> usize {
        let enqueued = self.lock().feed(chunk);
        if enqueued > 0 {
            self.inner.records_available.notify_one();
        }
        enqueued
    }

    /// Pop a record if one is queued
    pub fn try_next(&self) -> Option<Record> {
        self.lock().pop()
    }

    /// Wait for the next record, or `None` once `cancel` fires
    pub async fn next(&self, cancel: &CancellationToken) -> Option<Record> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(record) = self.try_next() {
                return Some(record);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = self.inner.records_available.notified() => {}
            }
        }
    }

    pub fn queue_size(&self) -> usize {
        self.lock().queue_size()
    }

    pub fn set_active(&self, active: bool) {
        self.lock().set_active(active);
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_active()
    }

    pub fn take_control_lines(&self) -> Vec<String> {
        self.lock().take_control_lines()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.lock().stats()
    }
}

impl Default for RecordSource {
    fn default() -> Self {
        Self::new(ReassemblerConfig::default())
    }
}
