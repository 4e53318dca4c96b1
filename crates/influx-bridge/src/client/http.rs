// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking InfluxDB v2 HTTP API client.
//!
//! - `GET  /api/v2/buckets?org=`: bucket listing
//! - `POST /api/v2/write?org=&bucket=&precision=ns`: Line Protocol, optionally gzip
//! - `POST /api/v2/query?org=`: Flux, answered with annotated CSV
//!
//! Calls block the caller until the response is complete. The request
//! timeout comes from `ReadWriteTimeout`, the connect timeout from
//! `SocketTimeout`.

use super::annotated_csv;
use super::buffer::{Batch, BatchBuffer, DEFAULT_BATCH_SIZE};
use super::{Bucket, ClientError};
use crate::config::ConnectionSettings;
use crate::decode::Table;
use crate::line_protocol;
use crate::point::Point;
use crate::ports::{PointWriter, Settled, TimeSeriesClient};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Deserialize;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

const BUCKET_PAGE_LIMIT: &str = "100";

/// InfluxDB v2 client over the blocking reqwest client.
pub struct HttpClient {
    base_url: String,
    token: String,
    http: Client,
    gzip: AtomicBool,
    batch_size: usize,
}

#[derive(Deserialize)]
struct BucketsResponse {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

impl HttpClient {
    /// Build a client for the given connection. No request is made.
    pub fn connect(settings: &ConnectionSettings) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(settings.read_write_timeout)
            .connect_timeout(settings.socket_timeout)
            .build()?;

        tracing::debug!(url = %settings.url, org = %settings.org, gzip = settings.enable_gzip, "influx client created");

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            http,
            gzip: AtomicBool::new(settings.enable_gzip),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Lines per write request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn is_compressed(&self) -> bool {
        self.gzip.load(Ordering::Relaxed)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Token {}", self.token))
    }

    /// Send a Line Protocol body to `bucket`.
    pub fn write_lines(&self, bucket: &str, org: &str, body: &str) -> Result<(), ClientError> {
        let request = self
            .authorized(self.http.post(self.endpoint("/api/v2/write")))
            .query(&[("org", org), ("bucket", bucket), ("precision", "ns")])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8");

        let request = if self.is_compressed() {
            request
                .header(CONTENT_ENCODING, "gzip")
                .body(gzip(body.as_bytes())?)
        } else {
            request.body(body.to_string())
        };

        check(request.send()?)?;
        Ok(())
    }

    fn send_batch(&self, batch: &Batch) -> Settled {
        let points = batch.lines.len();
        tracing::debug!(bucket = %batch.bucket, lines = points, "writing batch");
        match self.write_lines(&batch.bucket, &batch.org, &batch.body()) {
            Ok(()) => Settled::accepted(points),
            Err(e) => {
                tracing::warn!(bucket = %batch.bucket, lines = points, error = %e, "batch rejected");
                Settled::rejected(points, e)
            }
        }
    }
}

impl TimeSeriesClient for HttpClient {
    fn list_buckets(&self, org: &str) -> Result<Vec<Bucket>, ClientError> {
        let response = self
            .authorized(self.http.get(self.endpoint("/api/v2/buckets")))
            .query(&[("org", org), ("limit", BUCKET_PAGE_LIMIT)])
            .send()?;
        let parsed: BucketsResponse = check(response)?.json()?;
        Ok(parsed.buckets)
    }

    fn open_writer(&self) -> Result<Box<dyn PointWriter + '_>, ClientError> {
        Ok(Box::new(HttpPointWriter {
            client: self,
            buffer: BatchBuffer::new(self.batch_size),
        }))
    }

    fn run_query(&self, query: &str, org: &str) -> Result<Vec<Table>, ClientError> {
        let payload = serde_json::json!({
            "query": query,
            "type": "flux",
            "dialect": {
                "header": true,
                "delimiter": ",",
                "annotations": ["datatype", "group", "default"],
            },
        });

        let response = self
            .authorized(self.http.post(self.endpoint("/api/v2/query")))
            .query(&[("org", org)])
            .header(ACCEPT, "application/csv")
            .json(&payload)
            .send()?;

        let body = check(response)?.text()?;
        annotated_csv::parse(&body)
    }

    fn set_compression(&self, enabled: bool) {
        self.gzip.store(enabled, Ordering::Relaxed);
    }
}

/// Write handle buffering Line Protocol until a batch fills or the handle
/// is flushed. Dropping the handle sends whatever is left.
struct HttpPointWriter<'a> {
    client: &'a HttpClient,
    buffer: BatchBuffer,
}

impl PointWriter for HttpPointWriter<'_> {
    fn write_point(
        &mut self,
        bucket: &str,
        org: &str,
        point: &Point,
    ) -> Result<Vec<Settled>, ClientError> {
        let line = line_protocol::encode(point)?;
        Ok(self
            .buffer
            .add(bucket, org, line)
            .iter()
            .map(|batch| self.client.send_batch(batch))
            .collect())
    }

    fn flush(&mut self) -> Vec<Settled> {
        self.buffer
            .take()
            .map(|batch| self.client.send_batch(&batch))
            .into_iter()
            .collect()
    }
}

impl Drop for HttpPointWriter<'_> {
    fn drop(&mut self) {
        for settled in self.flush() {
            if let Err(e) = settled.outcome {
                tracing::warn!(points = settled.points, error = %e, "failed to flush pending points on release");
            }
        }
    }
}

fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Gzip-compress a request body.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>, ClientError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
