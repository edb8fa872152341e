use std::path::PathBuf;

use haforward_node::HaConfig;
use haforward_transport::BackendKind;
use haforward_types::{EntityKind, InstanceId};
use pretty_assertions::assert_eq;

// ── Loading ──────────────────────────────────────────────────────

#[test]
fn empty_document_takes_defaults() {
    let config = HaConfig::from_json("{}").unwrap();
    assert_eq!(config, HaConfig::default());
    assert_eq!(config.forwarder.backend, BackendKind::Http);
    assert!(!config.auto_reindex.enabled);
    config.validate().unwrap();
}

#[test]
fn sections_override_defaults() {
    let config = HaConfig::from_json(
        r#"{
            "instance_id": "0190a6b2-7c1e-7a3e-9d2f-5b8c4e6f1a20",
            "forwarder": {
                "backend": "pubsub",
                "retry": { "max_tries": 3 },
                "pubsub": { "topic": "ha-events" }
            },
            "apply": { "threads": 8 },
            "auto_reindex": {
                "enabled": true,
                "period_secs": 300,
                "kinds": ["change", "project"]
            }
        }"#,
    )
    .unwrap();

    assert_eq!(
        config.instance_id(),
        "0190a6b2-7c1e-7a3e-9d2f-5b8c4e6f1a20".parse::<InstanceId>().unwrap()
    );
    assert_eq!(config.forwarder.backend, BackendKind::Pubsub);
    assert_eq!(config.forwarder.retry.max_tries, 3);
    assert_eq!(config.forwarder.retry.retry_interval_ms, 1000);
    assert_eq!(config.forwarder.pubsub.topic, "ha-events");
    assert_eq!(config.apply.threads, 8);
    assert_eq!(config.apply.batch_threads, 1);
    assert_eq!(config.auto_reindex.period_secs, 300);
    assert_eq!(
        config.auto_reindex.kinds,
        vec![EntityKind::Change, EntityKind::Project]
    );
    assert_eq!(
        config.auto_reindex.data_dir,
        PathBuf::from("data/high-availability")
    );
    config.validate().unwrap();
}

#[test]
fn missing_instance_id_is_generated() {
    let config = HaConfig::default();
    assert_ne!(config.instance_id(), config.instance_id());
}

#[test]
fn malformed_document_is_an_error() {
    assert!(HaConfig::from_json("{ \"forwarder\": ").is_err());
    assert!(HaConfig::from_json(r#"{ "forwarder": { "backend": "carrier-pigeon" } }"#).is_err());
}

#[test]
fn load_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ha.json");
    std::fs::write(&path, r#"{ "forwarder": { "http": { "peers": ["http://node-b:8080"] } } }"#)
        .unwrap();

    let config = HaConfig::load(&path).unwrap();
    assert_eq!(config.forwarder.http.peers, vec!["http://node-b:8080"]);
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = HaConfig::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn invalid_forwarder_section_is_rejected() {
    let config = HaConfig::from_json(r#"{ "forwarder": { "http": { "peers": ["not a url"] } } }"#)
        .unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn zero_index_tries_are_rejected() {
    let config = HaConfig::from_json(r#"{ "apply": { "index": { "max_tries": 0 } } }"#).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn enabled_catch_up_needs_kinds() {
    let config =
        HaConfig::from_json(r#"{ "auto_reindex": { "enabled": true, "kinds": [] } }"#).unwrap();
    assert!(config.validate().is_err());

    let disabled = HaConfig::from_json(r#"{ "auto_reindex": { "kinds": [] } }"#).unwrap();
    disabled.validate().unwrap();
}
