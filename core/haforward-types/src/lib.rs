//! Core type definitions for cross-node forwarding.
//!
//! This crate defines the transport-agnostic pieces shared by the sending and
//! the receiving side:
//! - Entity identifiers (changes, accounts, groups, projects) and instance ids
//! - Millisecond timestamps used for `eventCreatedOn`
//! - The [`Command`] model: one forwardable operation plus its creation time
//! - The JSON wire codec with an explicit discriminator table
//! - The per-cache key registry used to decode `keyJson` for cache evictions
//!
//! Nothing here performs I/O.

mod cache_key;
pub mod codec;
mod command;
mod error;
mod ids;
mod timestamp;

pub use cache_key::{CacheEntry, CacheKey, CacheKeyCodec, CacheKeyRegistry, DEFAULT_PLUGIN_NAMESPACE};
pub use codec::{decode, encode, from_value, to_value};
pub use command::{Command, CommandPayload, IndexEntity, IndexEvent};
pub use error::{CodecError, CodecResult, DecodeError};
pub use ids::{AccountId, ChangeId, EntityKind, GroupUuid, IndexOperation, InstanceId, ProjectName};
pub use timestamp::Timestamp;
