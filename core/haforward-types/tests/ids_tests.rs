use haforward_types::{AccountId, ChangeId, EntityKind, InstanceId, Timestamp};
use std::str::FromStr;
use std::time::Duration;

// ── ChangeId ─────────────────────────────────────────────────────

#[test]
fn change_id_display() {
    assert_eq!(ChangeId::new("foo", 100).to_string(), "foo~100");
}

#[test]
fn change_id_parse_splits_on_last_tilde() {
    let id = ChangeId::parse("odd~name~42").unwrap();
    assert_eq!(id.project().as_str(), "odd~name");
    assert_eq!(id.number(), 42);
}

#[test]
fn change_id_parse_rejects_bad_input() {
    assert!(ChangeId::parse("foo").is_none());
    assert!(ChangeId::parse("~1").is_none());
    assert!(ChangeId::parse("foo~bar").is_none());
    assert!(ChangeId::from_str("foo~").is_err());
}

// ── AccountId ────────────────────────────────────────────────────

#[test]
fn account_id_from_str() {
    assert_eq!(AccountId::from_str("1000001").unwrap().get(), 1_000_001);
    assert!(AccountId::from_str("-1").is_err());
}

// ── EntityKind ───────────────────────────────────────────────────

#[test]
fn entity_kind_serde_is_lowercase() {
    assert_eq!(serde_json::to_string(&EntityKind::Change).unwrap(), "\"change\"");
    let kind: EntityKind = serde_json::from_str("\"group\"").unwrap();
    assert_eq!(kind, EntityKind::Group);
}

#[test]
fn entity_kind_all_scans_changes_last() {
    assert_eq!(EntityKind::ALL.len(), 4);
    assert_eq!(EntityKind::ALL[3], EntityKind::Change);
}

// ── InstanceId ───────────────────────────────────────────────────

#[test]
fn instance_id_unique() {
    assert_ne!(InstanceId::new(), InstanceId::new());
}

#[test]
fn instance_id_display_roundtrip() {
    let id = InstanceId::new();
    let parsed: InstanceId = id.to_string().parse().unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn instance_id_invalid() {
    assert!(InstanceId::parse("not-a-uuid").is_err());
}

// ── Timestamp ────────────────────────────────────────────────────

#[test]
fn timestamp_now_is_known() {
    assert!(!Timestamp::now().is_unknown());
}

#[test]
fn timestamp_seconds_conversion() {
    let ts = Timestamp::from_secs(12);
    assert_eq!(ts.as_millis(), 12_000);
    assert_eq!(Timestamp::from_millis(12_999).as_secs(), 12);
}

#[test]
fn elapsed_until_handles_skew_and_unknown() {
    let sent = Timestamp::from_millis(1_000);
    assert_eq!(
        sent.elapsed_until(Timestamp::from_millis(1_250)),
        Some(Duration::from_millis(250))
    );
    assert_eq!(sent.elapsed_until(Timestamp::from_millis(900)), None);
    assert_eq!(Timestamp::UNKNOWN.elapsed_until(sent), None);
}
