// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Event records through the writer shell into Line Protocol.

use chrono::Utc;
use influx_bridge::agent::OUTPUT_ENDPOINT;
use influx_bridge::client::MemoryClient;
use influx_bridge::config::MEASUREMENT_TITLE;
use influx_bridge::line_protocol;
use influx_bridge::ports::{CollectingSink, PlainSecrets, StaticAttributes};
use influx_bridge::validate::validate_writer;
use influx_bridge::{
    ActionAgent, Attribute, AttributeType, FieldValue, GridLayout, MappingError, MappingTable,
    Parameters, PointBuilder, Record, TypeDictionary,
};
use serde_json::json;
use std::sync::Arc;

const CONFIG: &str = r#"
URL: "http://localhost:8086"
Token: "dev-token"
Org: lab
Bucket: telemetry
EnableGZip: false
TagMappings:
  - { TagName: loc, TagValue: location }
  - { TagName: unit, TagValue: unit }
FieldMappings:
  - { FieldKey: temp, FieldName: temperature }
  - { FieldKey: count, FieldName: samples }
  - { FieldKey: ok, FieldName: healthy }
"#;

fn record(value: serde_json::Value) -> Record {
    Record::from_json(value).expect("object")
}

fn mapped(n: usize) -> Vec<Record> {
    (0..n)
        .map(|_| Record::new().with(MEASUREMENT_TITLE, "climate"))
        .collect()
}

fn attributes() -> StaticAttributes {
    StaticAttributes(vec![
        Attribute::new("temp", AttributeType::Double),
        Attribute::new("count", AttributeType::Long),
        Attribute::new("ok", AttributeType::Boolean),
        Attribute::new("loc", AttributeType::String),
    ])
}

fn agent(client: &Arc<MemoryClient>, sink: &Arc<CollectingSink>) -> ActionAgent {
    let params: Parameters = serde_yaml::from_str(CONFIG).expect("yaml");
    ActionAgent::initialize(
        &params,
        &PlainSecrets,
        client.clone(),
        &attributes(),
        sink.clone(),
        3,
    )
    .expect("initialize")
}

#[test]
fn test_end_to_end_single_event() {
    let tags = MappingTable::from_pairs([("loc", "location")], true).expect("tags");
    let fields = MappingTable::from_pairs([("temp", "temperature")], true).expect("fields");
    let types: TypeDictionary = [("temp".to_string(), AttributeType::Double)]
        .into_iter()
        .collect();

    let before = Utc::now();
    let point = PointBuilder::new(&tags, &fields, &types)
        .build("climate", &record(json!({"temp": "23.5", "loc": "room1"})), 0)
        .expect("build");
    let after = Utc::now();

    assert_eq!(point.tag_value("location"), Some("room1"));
    assert_eq!(point.field_value("temperature"), Some(&FieldValue::Float(23.5)));
    assert!(point.timestamp >= before && point.timestamp <= after);
}

#[test]
fn test_unparsable_double_names_field() {
    let tags = MappingTable::default();
    let fields = MappingTable::from_pairs([("temp", "temperature")], true).expect("fields");
    let types: TypeDictionary = [("temp".to_string(), AttributeType::Double)]
        .into_iter()
        .collect();

    let err = PointBuilder::new(&tags, &fields, &types)
        .build("climate", &record(json!({"temp": "abc"})), 4)
        .unwrap_err();
    match err {
        MappingError::TypeCoercion { key, target, index, .. } => {
            assert_eq!(key, "temp");
            assert_eq!(target, "temperature");
            assert_eq!(index, 4);
        }
        other => panic!("expected TypeCoercion, got {:?}", other),
    }
}

#[test]
fn test_tags_are_strings_whatever_the_source_shape() {
    let tags = MappingTable::parse(
        r#"[{"TagName":"n","TagValue":"num"},{"TagName":"b","TagValue":"flag"},{"TagName":"z","TagValue":"nothing"}]"#,
        GridLayout::WRITER_TAGS,
    )
    .expect("tags");
    let fields = MappingTable::from_pairs([("v", "v")], true).expect("fields");
    let types = TypeDictionary::new();

    let point = PointBuilder::new(&tags, &fields, &types)
        .build(
            "m",
            &record(json!({"n": 12, "b": true, "z": null, "v": "x"})),
            0,
        )
        .expect("build");

    assert_eq!(point.tag_value("num"), Some("12"));
    assert_eq!(point.tag_value("flag"), Some("true"));
    assert_eq!(point.tag_value("nothing"), Some(""));
}

#[test]
fn test_line_protocol_keeps_mapping_order() {
    let client = Arc::new(MemoryClient::new());
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&client, &sink);

    let events = vec![record(json!({
        "ok": "TRUE",
        "count": "7",
        "temp": 21,
        "unit": "",
        "loc": "lab 1",
    }))];
    agent.receive(&events, &mapped(1));

    let written = client.written();
    assert_eq!(written.len(), 1);
    let line = &written[0].line;
    let expected_prefix = "climate,location=lab\\ 1 temperature=21,samples=7i,healthy=true ";
    assert!(line.starts_with(expected_prefix), "got {}", line);
    assert_eq!(
        line_protocol::encode(&written[0].point).expect("encode"),
        *line
    );
    assert!(line.ends_with(&written[0].point.timestamp_ns().to_string()));
}

#[test]
fn test_tag_value_with_line_break_is_not_written() {
    let client = Arc::new(MemoryClient::new());
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&client, &sink);

    let events = vec![
        record(json!({
            "temp": 1.0,
            "count": 1,
            "ok": true,
            "unit": "",
            "loc": "lab\nclimate,location=x temperature=99",
        })),
        record(json!({"temp": 2.0, "count": 2, "ok": true, "unit": "", "loc": "lab"})),
    ];
    let report = agent.receive(&events, &mapped(2));

    assert_eq!(report.written, 1);
    assert_eq!(report.write_failures.len(), 1);
    assert!(report.write_failures[0].contains("line break"));

    let lines = client.lines();
    assert_eq!(lines.len(), 1);
    assert!(!lines[0].contains('\n'));
    assert!(lines[0].starts_with("climate,location=lab temperature=2,"));
}

#[test]
fn test_mid_batch_failure_aborts_and_reports_once() {
    let client = Arc::new(MemoryClient::new());
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&client, &sink);

    let good = json!({"temp": 20.0, "count": 1, "ok": false, "loc": "a", "unit": "c"});
    let bad = json!({"temp": "warm", "count": 1, "ok": false, "loc": "b", "unit": "c"});
    let events = vec![record(good.clone()), record(bad), record(good)];

    let report = agent.receive(&events, &mapped(3));

    assert_eq!(report.written, 1);
    assert!(report.aborted.is_some());
    assert_eq!(client.written().len(), 1);
    assert_eq!(client.writers_opened(), 1);
    assert_eq!(client.open_writers(), 0);
    assert!(sink.published().is_empty());

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].operation, "Receive");
    assert_eq!(errors[0].agent_id, 3);
    assert!(errors[0].inner_message.contains("temp"));
    assert_eq!(agent.stats().batches_aborted, 1);
}

#[test]
fn test_missing_source_key_aborts() {
    let client = Arc::new(MemoryClient::new());
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&client, &sink);

    let events = vec![record(json!({"temp": 1.0, "count": 1, "ok": true, "loc": "a"}))];
    let report = agent.receive(&events, &mapped(1));

    assert!(report.aborted.expect("aborted").contains("unit"));
    assert!(client.written().is_empty());
}

#[test]
fn test_whole_batch_is_published_downstream() {
    let client = Arc::new(MemoryClient::new());
    let sink = Arc::new(CollectingSink::new());
    let mut agent = agent(&client, &sink);

    let events: Vec<Record> = (0..5)
        .map(|i| record(json!({"temp": i, "count": i, "ok": true, "loc": "a", "unit": "c"})))
        .collect();
    let report = agent.receive(&events, &mapped(5));

    assert_eq!(report.written, 5);
    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, OUTPUT_ENDPOINT);
    assert_eq!(published[0].1.len(), 5);
    assert!(client
        .written()
        .iter()
        .all(|w| w.bucket == "telemetry" && w.org == "lab"));
}

#[test]
fn test_empty_configuration_validation() {
    let errors = validate_writer(&Parameters::new(), &PlainSecrets);
    assert_eq!(errors.len(), 4);
    assert_eq!(errors[0], "Error 1: Url is not specified.");
    assert_eq!(errors[3], "Error 4: Bucket is not specified.");
}

#[test]
fn test_duplicate_source_key_is_rejected() {
    let result = MappingTable::parse(
        r#"[{"FieldKey":"temp","FieldName":"a"},{"FieldKey":"temp","FieldName":"b"}]"#,
        GridLayout::WRITER_FIELDS,
    );
    assert!(matches!(
        result,
        Err(MappingError::DuplicateSourceKey { row: 2, .. })
    ));
}
