// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// HttpClient against a local HTTP/1.1 stub: batching, status handling,
// compression, flush on release and query decoding.

use flate2::read::GzDecoder;
use influx_bridge::client::{ClientError, HttpClient};
use influx_bridge::config::{ConnectionSettings, MEASUREMENT_TITLE};
use influx_bridge::ports::{CollectingSink, PlainSecrets, StaticAttributes};
use influx_bridge::{
    ActionAgent, Attribute, AttributeType, FieldValue, Parameters, Point, PointWriter, Record,
    Scalar, TimeSeriesClient,
};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// One request as seen by the stub.
#[derive(Debug, Clone)]
struct Captured {
    /// Request line and headers, lowercased.
    head: String,
    body: Vec<u8>,
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn gunzipped(&self) -> String {
        let mut text = String::new();
        GzDecoder::new(self.body.as_slice())
            .read_to_string(&mut text)
            .expect("gunzip");
        text
    }
}

/// Answers requests in order from a script; the last answer repeats.
struct Stub {
    url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl Stub {
    fn start(script: &[(u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}", listener.local_addr().expect("addr"));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let script: Arc<Mutex<VecDeque<(u16, String)>>> = Arc::new(Mutex::new(
            script
                .iter()
                .map(|(status, body)| (*status, body.to_string()))
                .collect(),
        ));

        let seen = captured.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let seen = seen.clone();
                let script = script.clone();
                thread::spawn(move || serve(stream, &script, &seen));
            }
        });

        Self { url, captured }
    }

    fn requests(&self) -> Vec<Captured> {
        self.captured.lock().expect("lock").clone()
    }
}

fn serve(
    stream: TcpStream,
    script: &Mutex<VecDeque<(u16, String)>>,
    seen: &Mutex<Vec<Captured>>,
) {
    let Ok(read_half) = stream.try_clone() else { return };
    let mut reader = BufReader::new(read_half);
    let mut stream = stream;

    loop {
        let mut head = String::new();
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => return,
                Ok(_) if line == "\r\n" => break,
                Ok(_) => head.push_str(&line.to_ascii_lowercase()),
            }
        }

        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }
        seen.lock().expect("lock").push(Captured { head, body });

        let (status, reply) = {
            let mut script = script.lock().expect("lock");
            if script.len() > 1 {
                script.pop_front().expect("answer")
            } else {
                script.front().cloned().unwrap_or((200, String::new()))
            }
        };
        let response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
            status,
            reply.len(),
            reply
        );
        if stream.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

fn connection(url: &str, gzip: bool) -> ConnectionSettings {
    ConnectionSettings {
        url: url.to_string(),
        token: "dev-token".to_string(),
        org: "lab".to_string(),
        read_write_timeout: Duration::from_secs(5),
        socket_timeout: Duration::from_secs(5),
        enable_gzip: gzip,
    }
}

fn agent(stub: &Stub, batch_size: usize, sink: &Arc<CollectingSink>, gzip: bool) -> ActionAgent {
    let client = HttpClient::connect(&connection(&stub.url, gzip))
        .expect("client")
        .with_batch_size(batch_size);
    let params = Parameters::new()
        .with("URL", stub.url.as_str())
        .with("Token", "dev-token")
        .with("Org", "lab")
        .with("Bucket", "telemetry")
        .with("EnableGZip", if gzip { "true" } else { "false" })
        .with("FieldMappings", r#"[{"FieldKey":"temp","FieldName":"temperature"}]"#);
    let attributes = StaticAttributes(vec![Attribute::new("temp", AttributeType::Double)]);

    ActionAgent::initialize(
        &params,
        &PlainSecrets,
        Arc::new(client),
        &attributes,
        sink.clone(),
        7,
    )
    .expect("initialize")
}

fn events(n: usize) -> Vec<Record> {
    (0..n).map(|i| Record::new().with("temp", i as f64)).collect()
}

fn mapped(n: usize) -> Vec<Record> {
    (0..n)
        .map(|_| Record::new().with(MEASUREMENT_TITLE, "climate"))
        .collect()
}

#[test]
fn test_points_are_sent_in_batches() {
    let stub = Stub::start(&[(204, "")]);
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&stub, 2, &sink, false);

    let report = agent.receive(&events(3), &mapped(3));

    assert_eq!(report.written, 3);
    assert!(report.write_failures.is_empty());
    assert!(sink.errors().is_empty());

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].head.starts_with("post /api/v2/write?"));
    assert!(requests[0].head.contains("org=lab"));
    assert!(requests[0].head.contains("bucket=telemetry"));
    assert!(requests[0].head.contains("precision=ns"));
    assert!(requests[0].head.contains("authorization: token dev-token"));
    assert_eq!(requests[0].text().lines().count(), 2);
    assert_eq!(requests[1].text().lines().count(), 1);
    assert!(requests[1].text().starts_with("climate temperature=2 "));
}

#[test]
fn test_rejected_request_charges_every_point() {
    let stub = Stub::start(&[(500, r#"{"code":"internal error"}"#)]);
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&stub, 1000, &sink, false);

    let report = agent.receive(&events(3), &mapped(3));

    assert_eq!(report.written, 0);
    assert_eq!(report.write_failures.len(), 3);
    assert!(report.write_failures[0].starts_with("event 0: server returned 500"));
    assert_eq!(stub.requests().len(), 1);

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "3 of 3 point(s) failed to write");
    assert_eq!(sink.published().len(), 1);
    assert_eq!(agent.stats().points_written, 0);
    assert_eq!(agent.stats().points_failed, 3);
}

#[test]
fn test_partial_rejection_counts_only_acknowledged_batches() {
    let stub = Stub::start(&[(204, ""), (503, "busy")]);
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&stub, 2, &sink, false);

    let report = agent.receive(&events(3), &mapped(3));

    assert_eq!(report.written, 2);
    assert_eq!(report.write_failures, vec!["event 2: server returned 503: busy"]);
    assert_eq!(sink.errors()[0].message, "1 of 3 point(s) failed to write");
}

#[test]
fn test_abort_flushes_points_already_mapped() {
    let stub = Stub::start(&[(204, "")]);
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&stub, 1000, &sink, false);

    let report = agent.receive(&events(3), &mapped(2));

    assert!(report.aborted.is_some());
    assert_eq!(report.written, 2);
    assert!(sink.published().is_empty());

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text().lines().count(), 2);
}

#[test]
fn test_abort_reports_failed_flush() {
    let stub = Stub::start(&[(401, "unauthorized")]);
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&stub, 1000, &sink, false);

    let report = agent.receive(&events(2), &mapped(1));

    assert!(report.aborted.is_some());
    assert_eq!(report.written, 0);
    assert_eq!(report.write_failures.len(), 1);

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "event 1: no MeasurementTitle in mapped event");
    assert!(errors[0]
        .inner_message
        .contains("event 0: server returned 401: unauthorized"));
}

#[test]
fn test_gzip_write_sets_content_encoding() {
    let stub = Stub::start(&[(204, "")]);
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&stub, 1000, &sink, true);

    let report = agent.receive(&events(1), &mapped(1));
    assert_eq!(report.written, 1);

    let requests = stub.requests();
    assert!(requests[0].head.contains("content-encoding: gzip"));
    assert!(requests[0].gunzipped().starts_with("climate temperature=0 "));
}

#[test]
fn test_released_writer_sends_buffered_points() {
    let stub = Stub::start(&[(204, "")]);
    let client = HttpClient::connect(&connection(&stub.url, false)).expect("client");
    let point = Point::new("m").field("v", FieldValue::Integer(1));

    {
        let mut writer = client.open_writer().expect("writer");
        let settled = writer.write_point("b", "lab", &point).expect("queue");
        assert!(settled.is_empty());
        assert!(stub.requests().is_empty());
    }

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].text().starts_with("m v=1i "));
}

#[test]
fn test_query_response_is_decoded() {
    let body = "\
#datatype,string,long,dateTime:RFC3339,double,string\r
#group,false,false,false,false,true\r
#default,_result,,,,\r
,result,table,_time,_value,_field\r
,,0,2024-01-01T10:00:00Z,21.5,temperature\r
\r
";
    let stub = Stub::start(&[(200, body)]);
    let client = HttpClient::connect(&connection(&stub.url, false)).expect("client");

    let tables = client
        .run_query("from(bucket: \"telemetry\")", "lab")
        .expect("query");

    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].records[0].lookup("_value"), Some(&Scalar::Float(21.5)));

    let requests = stub.requests();
    assert!(requests[0].head.starts_with("post /api/v2/query?org=lab"));
    assert!(requests[0].head.contains("accept: application/csv"));
    let payload: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json");
    assert_eq!(payload["query"], "from(bucket: \"telemetry\")");
    assert_eq!(payload["type"], "flux");
}

#[test]
fn test_query_status_error() {
    let stub = Stub::start(&[(400, "bad flux")]);
    let client = HttpClient::connect(&connection(&stub.url, false)).expect("client");

    match client.run_query("nonsense", "lab") {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad flux");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[test]
fn test_list_buckets() {
    let stub = Stub::start(&[(200, r#"{"buckets":[{"id":"01","orgID":"9f","name":"telemetry"}]}"#)]);
    let client = HttpClient::connect(&connection(&stub.url, false)).expect("client");

    let buckets = client.list_buckets("lab").expect("buckets");
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].name, "telemetry");
    assert!(stub.requests()[0].head.starts_with("get /api/v2/buckets?org=lab&limit=100"));
}
