// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process client.
//!
//! Keeps written points and their Line Protocol, answers queries from a
//! queue of canned responses, and counts open write handles so callers can
//! check that handles are released.

use super::{Bucket, ClientError};
use crate::decode::Table;
use crate::line_protocol;
use crate::point::Point;
use crate::ports::{PointWriter, Settled, TimeSeriesClient};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A point accepted by the memory client.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenPoint {
    pub bucket: String,
    pub org: String,
    pub point: Point,
    pub line: String,
}

#[derive(Default)]
pub struct MemoryClient {
    buckets: Vec<Bucket>,
    written: Mutex<Vec<WrittenPoint>>,
    queries: Mutex<Vec<(String, String)>>,
    responses: Mutex<VecDeque<Result<Vec<Table>, String>>>,
    failing_writes: Mutex<HashSet<usize>>,
    write_attempts: AtomicUsize,
    open_writers: AtomicUsize,
    writers_opened: AtomicUsize,
    compression: AtomicBool,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buckets(mut self, names: &[&str]) -> Self {
        self.buckets = names.iter().map(|n| Bucket::named(*n)).collect();
        self
    }

    /// Queue the tables returned by the next query.
    pub fn push_response(&self, tables: Vec<Table>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Ok(tables));
        }
    }

    /// Make the next query fail with `message`.
    pub fn push_query_error(&self, message: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Err(message.into()));
        }
    }

    /// Make the `n`th write attempt (0-based, across all handles) fail.
    pub fn fail_write(&self, n: usize) {
        if let Ok(mut failing) = self.failing_writes.lock() {
            failing.insert(n);
        }
    }

    pub fn written(&self) -> Vec<WrittenPoint> {
        self.written.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Line Protocol of everything written, in order.
    pub fn lines(&self) -> Vec<String> {
        self.written().into_iter().map(|w| w.line).collect()
    }

    /// `(query, org)` per query call.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Write handles currently held.
    pub fn open_writers(&self) -> usize {
        self.open_writers.load(Ordering::SeqCst)
    }

    /// Write handles handed out so far.
    pub fn writers_opened(&self) -> usize {
        self.writers_opened.load(Ordering::SeqCst)
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.load(Ordering::Relaxed)
    }
}

impl TimeSeriesClient for MemoryClient {
    fn list_buckets(&self, _org: &str) -> Result<Vec<Bucket>, ClientError> {
        Ok(self.buckets.clone())
    }

    fn open_writer(&self) -> Result<Box<dyn PointWriter + '_>, ClientError> {
        self.open_writers.fetch_add(1, Ordering::SeqCst);
        self.writers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryWriter { client: self }))
    }

    fn run_query(&self, query: &str, org: &str) -> Result<Vec<Table>, ClientError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((query.to_string(), org.to_string()));
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        match next {
            Some(Ok(tables)) => Ok(tables),
            Some(Err(message)) => Err(ClientError::Query(message)),
            None => Ok(Vec::new()),
        }
    }

    fn set_compression(&self, enabled: bool) {
        self.compression.store(enabled, Ordering::Relaxed);
    }
}

struct MemoryWriter<'a> {
    client: &'a MemoryClient,
}

impl PointWriter for MemoryWriter<'_> {
    fn write_point(
        &mut self,
        bucket: &str,
        org: &str,
        point: &Point,
    ) -> Result<Vec<Settled>, ClientError> {
        let attempt = self.client.write_attempts.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .client
            .failing_writes
            .lock()
            .map(|f| f.contains(&attempt))
            .unwrap_or(false);
        if fails {
            return Err(ClientError::Write(format!("write {} rejected", attempt)));
        }

        let line = line_protocol::encode(point)?;
        if let Ok(mut written) = self.client.written.lock() {
            written.push(WrittenPoint {
                bucket: bucket.to_string(),
                org: org.to_string(),
                point: point.clone(),
                line,
            });
        }
        Ok(vec![Settled::accepted(1)])
    }

    fn flush(&mut self) -> Vec<Settled> {
        Vec::new()
    }
}

impl Drop for MemoryWriter<'_> {
    fn drop(&mut self) {
        self.client.open_writers.fetch_sub(1, Ordering::SeqCst);
    }
}
