//! Window buffer: accumulates records into fixed-shape inference windows
//!
//! Two access patterns share one buffer:
//! - collect-until-full ([`WindowBuffer::collect_batch`]) for batch mode
//! - FIFO-bounded push ([`WindowBuffer::push`]) for sliding mode
//!
//! Inference always receives a [`Window`] snapshot, never the live buffer,
//! so accumulation can continue while models run.

use crate::stream::RecordSource;
use crate::types::{Record, RECORD_ARITY};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Immutable, ordered copy of buffered records handed to inference
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    records: Vec<Record>,
}

impl Window {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Row-major `[len, 10]` tensor data for the sequence model
    pub fn tensor(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.records.len() * RECORD_ARITY);
        for record in &self.records {
            data.extend_from_slice(record.values());
        }
        data
    }

    /// Flattened feature vector for the tree ensemble
    ///
    /// `len * 10` record values followed by one trailing residual slot.
    pub fn flatten_with_residual(&self, residual: f32) -> Vec<f32> {
        let mut features = self.tensor();
        features.push(residual);
        features
    }
}

/// Bounded record accumulator
///
/// Owned by exactly one task (the session's consumer loop).
#[derive(Debug)]
pub struct WindowBuffer {
    records: VecDeque<Record>,
    capacity: usize,
}

impl WindowBuffer {
    /// Create a buffer holding at most `capacity` records (contract: 75)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Buffer holds a full window
    pub fn is_ready(&self) -> bool {
        self.records.len() == self.capacity
    }

    /// Append a record, evicting the oldest when over capacity
    ///
    /// Returns the evicted record, if any.
    pub fn push(&mut self, record: Record) -> Option<Record> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    /// Pull records from `source` until `target` are buffered or `cancel` fires
    ///
    /// Suspends between records rather than spinning. Returns the number of
    /// records buffered when it stopped; on cancellation that may be short
    /// of `target` and the caller decides what to do with a partial batch.
    /// `target` is clamped to the buffer capacity.
    pub async fn collect_batch(
        &mut self,
        source: &RecordSource,
        target: usize,
        cancel: &CancellationToken,
    ) -> usize {
        let target = target.min(self.capacity);
        while self.records.len() < target {
            match source.next(cancel).await {
                Some(record) => {
                    self.push(record);
                }
                None => {
                    trace!("Batch collection cancelled at {}/{} records", self.records.len(), target);
                    break;
                }
            }
        }
        self.records.len()
    }

    /// Fixed-shape window of exactly `target` records
    ///
    /// With at least `target` records buffered, returns the most recent
    /// `target`. With fewer, returns the buffered records in the leading
    /// positions followed by all-zero rows.
    pub fn to_fixed_length(&self, target: usize) -> Window {
        let len = self.records.len();
        let mut records = Vec::with_capacity(target);
        if len >= target {
            records.extend(self.records.iter().skip(len - target).copied());
        } else {
            records.extend(self.records.iter().copied());
            records.resize(target, Record::zero());
        }
        Window::new(records)
    }

    /// Copy of the buffered records as they are
    pub fn snapshot(&self) -> Window {
        Window::new(self.records.iter().copied().collect())
    }

    /// Empty the buffer
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
