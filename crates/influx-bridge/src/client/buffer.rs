// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching buffer for Line Protocol lines.
//!
//! Accumulates lines for one `(bucket, org)` destination and hands them
//! back when the batch is full or when the destination changes.

/// Default number of lines per write request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A batching buffer that collects Line Protocol strings.
pub struct BatchBuffer {
    lines: Vec<String>,
    max_size: usize,
    destination: Option<(String, String)>,
}

/// A full batch ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub bucket: String,
    pub org: String,
    pub lines: Vec<String>,
}

impl Batch {
    /// Newline-joined request body.
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

impl BatchBuffer {
    /// Create a new batch buffer holding at most `max_size` lines (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            lines: Vec::with_capacity(max_size.min(DEFAULT_BATCH_SIZE)),
            max_size,
            destination: None,
        }
    }

    /// Add a line for `bucket`/`org`.
    ///
    /// Returns the batches that must be sent now: the pending batch of a
    /// previous destination, and/or this destination's batch once full.
    pub fn add(&mut self, bucket: &str, org: &str, line: String) -> Vec<Batch> {
        let mut ready = Vec::new();

        let same = matches!(&self.destination, Some((b, o)) if b == bucket && o == org);
        if !same {
            ready.extend(self.take());
            self.destination = Some((bucket.to_string(), org.to_string()));
        }

        self.lines.push(line);
        if self.lines.len() >= self.max_size {
            ready.extend(self.take());
        }
        ready
    }

    /// Take whatever is buffered.
    pub fn take(&mut self) -> Option<Batch> {
        if self.lines.is_empty() {
            return None;
        }
        let (bucket, org) = self.destination.clone().unwrap_or_default();
        Some(Batch {
            bucket,
            org,
            lines: std::mem::take(&mut self.lines),
        })
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
