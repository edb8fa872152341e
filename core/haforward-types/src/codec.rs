//! JSON wire codec for commands.
//!
//! Every command travels as a JSON object with a string `type`
//! discriminator, the variant's own fields and a numeric `eventCreatedOn`
//! (milliseconds). Decoding looks the discriminator up in [`DECODERS`];
//! unknown discriminators are rejected, unknown fields are ignored.

use crate::command::{Command, CommandPayload, IndexEntity, IndexEvent};
use crate::error::{CodecError, CodecResult, DecodeError};
use crate::ids::{ChangeId, EntityKind, IndexOperation};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const TYPE_FIELD: &str = "type";
const CREATED_ON_FIELD: &str = "eventCreatedOn";

pub type DecodeFn = fn(&Value, &str) -> Result<CommandPayload, DecodeError>;

/// Discriminator → decoder lookup table.
pub const DECODERS: &[(&str, DecodeFn)] = &[
    ("update-change", decode_update_change),
    ("delete-change", decode_delete_change),
    ("index-account", decode_index_account),
    ("index-group", decode_index_group),
    ("index-project", decode_index_project),
    ("delete-project", decode_delete_project),
    ("delete-all-project-changes", decode_delete_all),
    ("evict-cache", decode_evict_cache),
    ("post-event", decode_post_event),
    ("add-to-project-list", decode_add_to_project_list),
    ("remove-from-project-list", decode_remove_from_project_list),
];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(rename = "eventCreatedOn", default)]
    created_on: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeWire {
    project_name: String,
    id: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    batch_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_event: Option<IndexEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountWire {
    id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_event: Option<IndexEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupWire {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_event: Option<IndexEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectWire {
    project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_event: Option<IndexEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheWire {
    cache_name: String,
    key_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventWire {
    event: Value,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn fields<'a, T: Deserialize<'a>>(value: &'a Value, type_name: &str) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(|source| DecodeError::InvalidFields {
        type_name: type_name.to_string(),
        source,
    })
}

fn non_empty(value: String, field: &str, type_name: &str) -> Result<String, DecodeError> {
    if value.is_empty() {
        return Err(DecodeError::InvalidValue {
            type_name: type_name.to_string(),
            reason: format!("`{field}` must not be empty"),
        });
    }
    Ok(value)
}

/// Deletes never carry a batch flag or an event, whatever the sender put
/// on the wire.
fn index_payload(
    kind: EntityKind,
    entity_id: String,
    operation: IndexOperation,
    batch_mode: bool,
    index_event: Option<IndexEvent>,
) -> CommandPayload {
    let (batch_mode, index_event) = match operation {
        IndexOperation::Index => (batch_mode, index_event),
        IndexOperation::Delete => (false, None),
    };
    CommandPayload::IndexEntity(IndexEntity {
        kind,
        entity_id,
        operation,
        batch_mode,
        index_event,
    })
}

fn decode_change(
    value: &Value,
    type_name: &str,
    operation: IndexOperation,
) -> Result<CommandPayload, DecodeError> {
    let wire: ChangeWire = fields(value, type_name)?;
    let project = non_empty(wire.project_name, "projectName", type_name)?;
    let id = ChangeId::new(project, wire.id);
    Ok(index_payload(
        EntityKind::Change,
        id.to_string(),
        operation,
        wire.batch_mode,
        wire.index_event,
    ))
}

fn decode_update_change(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    decode_change(value, type_name, IndexOperation::Index)
}

fn decode_delete_change(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    decode_change(value, type_name, IndexOperation::Delete)
}

fn decode_index_account(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    let wire: AccountWire = fields(value, type_name)?;
    Ok(index_payload(
        EntityKind::Account,
        wire.id.to_string(),
        IndexOperation::Index,
        false,
        wire.index_event,
    ))
}

fn decode_index_group(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    let wire: GroupWire = fields(value, type_name)?;
    let id = non_empty(wire.id, "id", type_name)?;
    Ok(index_payload(
        EntityKind::Group,
        id,
        IndexOperation::Index,
        false,
        wire.index_event,
    ))
}

fn decode_project(
    value: &Value,
    type_name: &str,
    operation: IndexOperation,
) -> Result<CommandPayload, DecodeError> {
    let wire: ProjectWire = fields(value, type_name)?;
    let project = non_empty(wire.project_name, "projectName", type_name)?;
    Ok(index_payload(
        EntityKind::Project,
        project,
        operation,
        false,
        wire.index_event,
    ))
}

fn decode_index_project(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    decode_project(value, type_name, IndexOperation::Index)
}

fn decode_delete_project(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    decode_project(value, type_name, IndexOperation::Delete)
}

fn decode_project_name(value: &Value, type_name: &str) -> Result<String, DecodeError> {
    let wire: ProjectWire = fields(value, type_name)?;
    non_empty(wire.project_name, "projectName", type_name)
}

fn decode_delete_all(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    Ok(CommandPayload::DeleteAllForProject {
        project: decode_project_name(value, type_name)?,
    })
}

fn decode_evict_cache(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    let wire: CacheWire = fields(value, type_name)?;
    Ok(CommandPayload::EvictCache {
        cache_name: non_empty(wire.cache_name, "cacheName", type_name)?,
        key_json: wire.key_json,
    })
}

fn decode_post_event(value: &Value, type_name: &str) -> Result<CommandPayload, DecodeError> {
    let wire: EventWire = fields(value, type_name)?;
    if !wire.event.is_object() {
        return Err(DecodeError::InvalidValue {
            type_name: type_name.to_string(),
            reason: "`event` must be an object".to_string(),
        });
    }
    Ok(CommandPayload::PostEvent { event: wire.event })
}

fn decode_add_to_project_list(
    value: &Value,
    type_name: &str,
) -> Result<CommandPayload, DecodeError> {
    Ok(CommandPayload::ProjectListChange {
        project: decode_project_name(value, type_name)?,
        added: true,
    })
}

fn decode_remove_from_project_list(
    value: &Value,
    type_name: &str,
) -> Result<CommandPayload, DecodeError> {
    Ok(CommandPayload::ProjectListChange {
        project: decode_project_name(value, type_name)?,
        added: false,
    })
}

/// Converts a parsed JSON value into a command.
pub fn from_value(value: Value) -> Result<Command, DecodeError> {
    if !value.is_object() {
        return Err(DecodeError::Malformed("expected a JSON object".to_string()));
    }
    match value.get(TYPE_FIELD) {
        Some(Value::String(_)) => {}
        _ => return Err(DecodeError::MissingType),
    }
    let envelope = Envelope::deserialize(&value)
        .map_err(|e| DecodeError::Malformed(format!("invalid envelope: {e}")))?;

    let decoder = DECODERS
        .iter()
        .find(|(name, _)| *name == envelope.type_name)
        .map(|(_, decoder)| *decoder)
        .ok_or_else(|| DecodeError::UnknownType(envelope.type_name.clone()))?;

    let payload = decoder(&value, &envelope.type_name)?;
    Ok(Command::with_created_at(
        payload,
        Timestamp::from_millis(envelope.created_on),
    ))
}

/// Decodes a command from bytes.
pub fn decode(bytes: &[u8]) -> Result<Command, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    from_value(value)
}

fn change_wire(entity: &IndexEntity) -> CodecResult<ChangeWire> {
    let id = ChangeId::parse(&entity.entity_id).ok_or_else(|| {
        CodecError::Unencodable(format!("not a change id: {}", entity.entity_id))
    })?;
    Ok(ChangeWire {
        project_name: id.project().to_string(),
        id: id.number(),
        batch_mode: entity.batch_mode,
        index_event: entity.index_event.clone(),
    })
}

fn index_value(entity: &IndexEntity) -> CodecResult<Value> {
    let value = match (entity.kind, entity.operation) {
        (EntityKind::Change, IndexOperation::Index) => serde_json::to_value(change_wire(entity)?)?,
        (EntityKind::Change, IndexOperation::Delete) => {
            let mut wire = change_wire(entity)?;
            wire.batch_mode = false;
            wire.index_event = None;
            serde_json::to_value(wire)?
        }
        (EntityKind::Account, IndexOperation::Index) => {
            let id = entity.entity_id.parse().map_err(|_| {
                CodecError::Unencodable(format!("not an account id: {}", entity.entity_id))
            })?;
            serde_json::to_value(AccountWire {
                id,
                index_event: entity.index_event.clone(),
            })?
        }
        (EntityKind::Group, IndexOperation::Index) => serde_json::to_value(GroupWire {
            id: entity.entity_id.clone(),
            index_event: entity.index_event.clone(),
        })?,
        (EntityKind::Project, IndexOperation::Index) => serde_json::to_value(ProjectWire {
            project_name: entity.entity_id.clone(),
            index_event: entity.index_event.clone(),
        })?,
        (EntityKind::Project, IndexOperation::Delete) => serde_json::to_value(ProjectWire {
            project_name: entity.entity_id.clone(),
            index_event: None,
        })?,
        (kind @ (EntityKind::Account | EntityKind::Group), IndexOperation::Delete) => {
            return Err(CodecError::Unencodable(format!(
                "{kind} entries cannot be deleted from the index"
            )));
        }
    };
    Ok(value)
}

/// Converts a command into its JSON representation.
pub fn to_value(command: &Command) -> CodecResult<Value> {
    let body = match &command.payload {
        CommandPayload::IndexEntity(entity) => index_value(entity)?,
        CommandPayload::EvictCache {
            cache_name,
            key_json,
        } => serde_json::to_value(CacheWire {
            cache_name: cache_name.clone(),
            key_json: key_json.clone(),
        })?,
        CommandPayload::PostEvent { event } => serde_json::to_value(EventWire {
            event: event.clone(),
        })?,
        CommandPayload::ProjectListChange { project, .. }
        | CommandPayload::DeleteAllForProject { project } => serde_json::to_value(ProjectWire {
            project_name: project.clone(),
            index_event: None,
        })?,
    };

    let mut object = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    object.insert(
        TYPE_FIELD.to_string(),
        Value::String(command.type_name().to_string()),
    );
    object.insert(
        CREATED_ON_FIELD.to_string(),
        Value::from(command.created_at.as_millis()),
    );
    Ok(Value::Object(object))
}

/// Encodes a command to bytes.
pub fn encode(command: &Command) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(&to_value(command)?)?)
}
