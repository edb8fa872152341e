//! Per-cache key decoding for forwarded evictions.
//!
//! The key of an `evict-cache` command is a JSON document whose shape depends
//! on the cache it belongs to. [`CacheKeyRegistry`] maps cache names to an
//! encode/decode pair; names without an entry fall back to the raw value.

use crate::error::{CodecError, CodecResult};
use crate::ids::{AccountId, ChangeId, GroupUuid, ProjectName};
use serde_json::Value;
use std::collections::HashMap;

/// Namespace of caches owned by the host application itself.
pub const DEFAULT_PLUGIN_NAMESPACE: &str = "gerrit";

const PROJECT_LIST_KEY: &str = "ALL";

/// A decoded cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    Account(AccountId),
    Group(GroupUuid),
    Project(ProjectName),
    Change(ChangeId),
    /// The single key of the project list cache.
    ProjectList,
    /// Key of a cache without a registered codec.
    Raw(Value),
}

/// Encode/decode functions for one cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyCodec {
    pub encode: fn(&CacheKey) -> Option<Value>,
    pub decode: fn(&Value) -> Option<CacheKey>,
}

fn encode_account(key: &CacheKey) -> Option<Value> {
    match key {
        CacheKey::Account(id) => Some(Value::from(id.get())),
        _ => None,
    }
}

fn decode_account(value: &Value) -> Option<CacheKey> {
    let id = match value {
        Value::Number(n) => u32::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    Some(CacheKey::Account(AccountId::new(id)))
}

fn encode_group(key: &CacheKey) -> Option<Value> {
    match key {
        CacheKey::Group(uuid) => Some(Value::String(uuid.to_string())),
        _ => None,
    }
}

fn decode_group(value: &Value) -> Option<CacheKey> {
    match value {
        Value::String(s) if !s.is_empty() => Some(CacheKey::Group(GroupUuid::new(s.as_str()))),
        _ => None,
    }
}

fn encode_project(key: &CacheKey) -> Option<Value> {
    match key {
        CacheKey::Project(name) => Some(Value::String(name.to_string())),
        _ => None,
    }
}

fn decode_project(value: &Value) -> Option<CacheKey> {
    match value {
        Value::String(s) if !s.is_empty() => Some(CacheKey::Project(ProjectName::new(s.as_str()))),
        _ => None,
    }
}

fn encode_change(key: &CacheKey) -> Option<Value> {
    match key {
        CacheKey::Change(id) => Some(Value::String(id.to_string())),
        _ => None,
    }
}

fn decode_change(value: &Value) -> Option<CacheKey> {
    value.as_str().and_then(ChangeId::parse).map(CacheKey::Change)
}

fn encode_project_list(key: &CacheKey) -> Option<Value> {
    match key {
        CacheKey::ProjectList => Some(Value::String(PROJECT_LIST_KEY.to_string())),
        _ => None,
    }
}

fn decode_project_list(_value: &Value) -> Option<CacheKey> {
    Some(CacheKey::ProjectList)
}

const ACCOUNT_CODEC: CacheKeyCodec = CacheKeyCodec {
    encode: encode_account,
    decode: decode_account,
};
const GROUP_CODEC: CacheKeyCodec = CacheKeyCodec {
    encode: encode_group,
    decode: decode_group,
};
const PROJECT_CODEC: CacheKeyCodec = CacheKeyCodec {
    encode: encode_project,
    decode: decode_project,
};
const CHANGE_CODEC: CacheKeyCodec = CacheKeyCodec {
    encode: encode_change,
    decode: decode_change,
};
const PROJECT_LIST_CODEC: CacheKeyCodec = CacheKeyCodec {
    encode: encode_project_list,
    decode: decode_project_list,
};

/// Cache name → key codec lookup.
#[derive(Debug, Clone)]
pub struct CacheKeyRegistry {
    codecs: HashMap<String, CacheKeyCodec>,
}

impl CacheKeyRegistry {
    /// A registry with no codecs; every key decodes as [`CacheKey::Raw`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registers (or replaces) the codec for a cache.
    pub fn register(&mut self, cache_name: impl Into<String>, codec: CacheKeyCodec) {
        self.codecs.insert(cache_name.into(), codec);
    }

    /// Whether a codec is registered for the cache.
    #[must_use]
    pub fn contains(&self, cache_name: &str) -> bool {
        self.codecs.contains_key(cache_name)
    }

    /// Decodes the `keyJson` of an eviction for `cache_name`.
    pub fn decode(&self, cache_name: &str, key_json: &str) -> CodecResult<CacheKey> {
        let value: Value = serde_json::from_str(key_json).map_err(|e| CodecError::InvalidKey {
            cache_name: cache_name.to_string(),
            reason: e.to_string(),
        })?;
        match self.codecs.get(cache_name) {
            Some(codec) => (codec.decode)(&value).ok_or_else(|| CodecError::InvalidKey {
                cache_name: cache_name.to_string(),
                reason: format!("unexpected key {value}"),
            }),
            None => Ok(CacheKey::Raw(value)),
        }
    }

    /// Encodes a key into the `keyJson` form for `cache_name`.
    pub fn encode(&self, cache_name: &str, key: &CacheKey) -> CodecResult<String> {
        let value = match (self.codecs.get(cache_name), key) {
            (_, CacheKey::Raw(value)) => value.clone(),
            (Some(codec), key) => (codec.encode)(key).ok_or_else(|| CodecError::InvalidKey {
                cache_name: cache_name.to_string(),
                reason: format!("{key:?} does not belong to this cache"),
            })?,
            (None, key) => {
                return Err(CodecError::InvalidKey {
                    cache_name: cache_name.to_string(),
                    reason: format!("no codec registered for typed key {key:?}"),
                });
            }
        };
        Ok(serde_json::to_string(&value)?)
    }
}

impl Default for CacheKeyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("accounts", ACCOUNT_CODEC);
        for name in ["groups", "groups_byuuid", "groups_members", "groups_bysubgroup"] {
            registry.register(name, GROUP_CODEC);
        }
        registry.register("projects", PROJECT_CODEC);
        registry.register("changes", CHANGE_CODEC);
        registry.register("project_list", PROJECT_LIST_CODEC);
        registry
    }
}

/// A cache entry addressed by namespace, cache name and key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub plugin_namespace: String,
    pub cache_name: String,
    pub key: CacheKey,
}

impl CacheEntry {
    /// Splits a `plugin.cache` name; names without a dot belong to the host.
    pub fn new(full_cache_name: &str, key: CacheKey) -> Self {
        let (plugin_namespace, cache_name) = match full_cache_name.split_once('.') {
            Some((plugin, cache)) => (plugin.to_string(), cache.to_string()),
            None => (
                DEFAULT_PLUGIN_NAMESPACE.to_string(),
                full_cache_name.to_string(),
            ),
        };
        Self {
            plugin_namespace,
            cache_name,
            key,
        }
    }

    /// The name as it appears on the wire.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.plugin_namespace == DEFAULT_PLUGIN_NAMESPACE {
            self.cache_name.clone()
        } else {
            format!("{}.{}", self.plugin_namespace, self.cache_name)
        }
    }
}
