// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborator interfaces injected into the shells.
//!
//! The writer and reader shells never reach for ambient host state; every
//! outside interaction goes through one of these traits, passed in at
//! construction.
//!
//! # Integration
//!
//! To embed the shells in a host, implement the ports over the host's
//! callbacks:
//!
//! ```ignore
//! impl SecretResolver for HostCallbacks {
//!     fn resolve_variable(&self, name: &str) -> Result<String, PortError> {
//!         self.host.variable(name).ok_or_else(|| PortError::new(name))
//!     }
//!     fn decrypt(&self, ciphertext: &str) -> Result<String, PortError> {
//!         Ok(self.host.decrypt(ciphertext))
//!     }
//! }
//! ```

use crate::client::{Bucket, ClientError};
use crate::decode::Table;
use crate::point::Point;
use crate::value::{Attribute, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;

/// Failure reported by a host collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PortError {
    pub message: String,
}

impl PortError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Host variable lookup and secret decryption.
pub trait SecretResolver: Send + Sync {
    fn resolve_variable(&self, name: &str) -> Result<String, PortError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, PortError>;
}

/// Variables from the process environment; secrets stored in plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSecrets;

impl SecretResolver for PlainSecrets {
    fn resolve_variable(&self, name: &str) -> Result<String, PortError> {
        std::env::var(name).map_err(|e| PortError::new(format!("variable {}: {}", name, e)))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, PortError> {
        Ok(ciphertext.to_string())
    }
}

/// Upstream attribute discovery.
pub trait AttributeSource: Send + Sync {
    /// Attributes produced upstream of `endpoint`.
    fn request_upstream_attributes(&self, endpoint: &str) -> Result<Vec<Attribute>, PortError>;
}

/// Fixed attribute list.
#[derive(Debug, Clone, Default)]
pub struct StaticAttributes(pub Vec<Attribute>);

impl AttributeSource for StaticAttributes {
    fn request_upstream_attributes(&self, _endpoint: &str) -> Result<Vec<Attribute>, PortError> {
        Ok(self.0.clone())
    }
}

/// Asynchronous error notification for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub agent_id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub message: String,
    pub inner_message: String,
}

impl ErrorEvent {
    /// Build an event stamped now.
    pub fn now(
        agent_id: i64,
        operation: impl Into<String>,
        message: impl Into<String>,
        inner_message: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            timestamp: Utc::now(),
            operation: operation.into(),
            message: message.into(),
            inner_message: inner_message.into(),
        }
    }
}

/// Publish and error sinks.
pub trait EventSink: Send + Sync {
    fn publish(&self, records: &[Record], endpoint: &str);

    fn publish_error(&self, event: ErrorEvent);
}

/// Sink that keeps everything it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    published: Mutex<Vec<(String, Vec<Record>)>>,
    errors: Mutex<Vec<ErrorEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(endpoint, records)` per publish call.
    pub fn published(&self) -> Vec<(String, Vec<Record>)> {
        self.published
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.errors.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, records: &[Record], endpoint: &str) {
        if let Ok(mut published) = self.published.lock() {
            published.push((endpoint.to_string(), records.to_vec()));
        }
    }

    fn publish_error(&self, event: ErrorEvent) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(event);
        }
    }
}

/// Time-series store client.
pub trait TimeSeriesClient: Send + Sync {
    /// Buckets visible to `org`.
    fn list_buckets(&self, org: &str) -> Result<Vec<Bucket>, ClientError>;

    /// Acquire a write handle. It is released when dropped.
    fn open_writer(&self) -> Result<Box<dyn PointWriter + '_>, ClientError>;

    /// Run a Flux query, blocking until the response is complete.
    fn run_query(&self, query: &str, org: &str) -> Result<Vec<Table>, ClientError>;

    fn set_compression(&self, enabled: bool);
}

/// One store request settled by a write handle: how many points it carried
/// and whether the store took them.
#[derive(Debug)]
pub struct Settled {
    pub points: usize,
    pub outcome: Result<(), ClientError>,
}

impl Settled {
    pub fn accepted(points: usize) -> Self {
        Self {
            points,
            outcome: Ok(()),
        }
    }

    pub fn rejected(points: usize, error: ClientError) -> Self {
        Self {
            points,
            outcome: Err(error),
        }
    }
}

/// Scoped write handle.
///
/// Points may be buffered. Every call returns the requests it settled, in
/// the order the points were handed over, so a point only counts as written
/// once the request carrying it succeeded.
pub trait PointWriter {
    /// Queue one point. `Err` means this point was not queued at all.
    fn write_point(
        &mut self,
        bucket: &str,
        org: &str,
        point: &Point,
    ) -> Result<Vec<Settled>, ClientError>;

    /// Push anything still buffered to the store.
    fn flush(&mut self) -> Vec<Settled>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeType;

    #[test]
    fn test_plain_secrets_decrypt_is_identity() {
        assert_eq!(PlainSecrets.decrypt("abc").expect("decrypt"), "abc");
    }

    #[test]
    fn test_plain_secrets_missing_variable() {
        let err = PlainSecrets
            .resolve_variable("INFLUX_BRIDGE_SURELY_UNSET_VARIABLE")
            .unwrap_err();
        assert!(err.message.contains("INFLUX_BRIDGE_SURELY_UNSET_VARIABLE"));
    }

    #[test]
    fn test_static_attributes() {
        let source = StaticAttributes(vec![Attribute::new("temp", AttributeType::Double)]);
        let attrs = source.request_upstream_attributes("Input").expect("attrs");
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.publish(&[Record::new().with("a", 1i64)], "Output");
        sink.publish_error(ErrorEvent::now(7, "Receive", "boom", ""));

        assert_eq!(sink.published().len(), 1);
        assert_eq!(sink.published()[0].0, "Output");
        assert_eq!(sink.errors()[0].agent_id, 7);
    }
}
