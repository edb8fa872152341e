use haforward_types::{
    AccountId, CacheEntry, CacheKey, CacheKeyCodec, CacheKeyRegistry, ChangeId, CodecError,
    GroupUuid, ProjectName, DEFAULT_PLUGIN_NAMESPACE,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

// ── default registry ─────────────────────────────────────────────

#[test]
fn accounts_decode_numbers_and_strings() {
    let registry = CacheKeyRegistry::default();
    assert_eq!(
        registry.decode("accounts", "1000001").unwrap(),
        CacheKey::Account(AccountId::new(1_000_001))
    );
    assert_eq!(
        registry.decode("accounts", "\"7\"").unwrap(),
        CacheKey::Account(AccountId::new(7))
    );
}

#[test]
fn every_group_cache_decodes_uuid() {
    let registry = CacheKeyRegistry::default();
    for cache in ["groups", "groups_byuuid", "groups_members", "groups_bysubgroup"] {
        assert_eq!(
            registry.decode(cache, "\"abc\"").unwrap(),
            CacheKey::Group(GroupUuid::new("abc")),
            "{cache}"
        );
    }
}

#[test]
fn projects_and_changes_decode() {
    let registry = CacheKeyRegistry::default();
    assert_eq!(
        registry.decode("projects", "\"foo\"").unwrap(),
        CacheKey::Project(ProjectName::new("foo"))
    );
    assert_eq!(
        registry.decode("changes", "\"foo~3\"").unwrap(),
        CacheKey::Change(ChangeId::new("foo", 3))
    );
}

#[test]
fn project_list_has_a_single_key() {
    let registry = CacheKeyRegistry::default();
    assert_eq!(
        registry.decode("project_list", "\"ALL\"").unwrap(),
        CacheKey::ProjectList
    );
    assert_eq!(
        registry.encode("project_list", &CacheKey::ProjectList).unwrap(),
        "\"ALL\""
    );
}

#[test]
fn unknown_cache_falls_back_to_raw() {
    let registry = CacheKeyRegistry::default();
    assert_eq!(
        registry.decode("web_sessions", "{\"id\":\"s\"}").unwrap(),
        CacheKey::Raw(json!({"id": "s"}))
    );
}

#[test]
fn shape_mismatch_is_invalid_key() {
    let registry = CacheKeyRegistry::default();
    assert!(matches!(
        registry.decode("accounts", "\"bob\""),
        Err(CodecError::InvalidKey { .. })
    ));
    assert!(matches!(
        registry.decode("changes", "\"nochange\""),
        Err(CodecError::InvalidKey { .. })
    ));
    assert!(matches!(
        registry.decode("projects", "not json"),
        Err(CodecError::InvalidKey { .. })
    ));
}

#[test]
fn encode_rejects_key_of_other_cache() {
    let registry = CacheKeyRegistry::default();
    let err = registry
        .encode("accounts", &CacheKey::Project(ProjectName::new("foo")))
        .unwrap_err();
    assert!(matches!(err, CodecError::InvalidKey { .. }));
}

#[test]
fn encode_then_decode_typed_keys() {
    let registry = CacheKeyRegistry::default();
    let key = CacheKey::Change(ChangeId::new("a/b", 12));
    let json = registry.encode("changes", &key).unwrap();
    assert_eq!(json, "\"a/b~12\"");
    assert_eq!(registry.decode("changes", &json).unwrap(), key);
}

// ── custom codecs ────────────────────────────────────────────────

fn encode_upper(key: &CacheKey) -> Option<Value> {
    match key {
        CacheKey::Project(p) => Some(Value::String(p.as_str().to_uppercase())),
        _ => None,
    }
}

fn decode_lower(value: &Value) -> Option<CacheKey> {
    value
        .as_str()
        .map(|s| CacheKey::Project(ProjectName::new(s.to_lowercase())))
}

#[test]
fn registered_codec_replaces_fallback() {
    let mut registry = CacheKeyRegistry::empty();
    assert!(!registry.contains("plugin_projects"));
    registry.register(
        "plugin_projects",
        CacheKeyCodec {
            encode: encode_upper,
            decode: decode_lower,
        },
    );
    assert!(registry.contains("plugin_projects"));
    assert_eq!(
        registry.decode("plugin_projects", "\"FOO\"").unwrap(),
        CacheKey::Project(ProjectName::new("foo"))
    );
}

// ── CacheEntry ───────────────────────────────────────────────────

#[test]
fn cache_entry_splits_plugin_namespace() {
    let entry = CacheEntry::new("ldap.groups_byinclude", CacheKey::Raw(json!("x")));
    assert_eq!(entry.plugin_namespace, "ldap");
    assert_eq!(entry.cache_name, "groups_byinclude");
    assert_eq!(entry.full_name(), "ldap.groups_byinclude");
}

#[test]
fn cache_entry_without_dot_belongs_to_host() {
    let entry = CacheEntry::new("accounts", CacheKey::Account(AccountId::new(1)));
    assert_eq!(entry.plugin_namespace, DEFAULT_PLUGIN_NAMESPACE);
    assert_eq!(entry.full_name(), "accounts");
}
