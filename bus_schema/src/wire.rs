use std::str::FromStr;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::command::{Command, CommandKind, Params};
use crate::signature::CommandSignature;

/// Canonical on-disk content of a mailbox with nothing pending.
pub const EMPTY_MAILBOX: &str = "{}";

/// Error returned when mailbox content cannot be decoded into a [`Command`].
#[derive(Debug, Error)]
pub enum CommandDecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("command is empty")]
    Empty,
    #[error("mailbox content is not a JSON object")]
    NotAnObject,
    #[error("command is missing an 'action' or 'type' field")]
    MissingAction,
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("conflicting fields '{first}' and '{second}'")]
    ConflictingFields {
        first: &'static str,
        second: &'static str,
    },
    #[error("invalid params for {action}: {source}")]
    InvalidParams {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode raw mailbox text.
///
/// Blank text and `{}` are the empty slot and decode to `Ok(None)`; anything
/// else must be a command object with an action. A known verb with ill-typed
/// params is kept as [`CommandKind::Custom`] so pollers still consume it.
pub fn decode_mailbox(text: &str) -> Result<Option<Command>, CommandDecodeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let JsonValue::Object(object) = serde_json::from_str::<JsonValue>(trimmed)? else {
        return Err(CommandDecodeError::NotAnObject);
    };
    if object.is_empty() {
        return Ok(None);
    }
    Command::from_wire_object_lenient(object).map(Some)
}

impl Command {
    /// Decode a wire object, accepting the historical field spellings.
    ///
    /// `type` stands in for `action` and `data` for `params`. Arguments written
    /// beside the discriminant instead of inside the bag are folded into it.
    ///
    /// Known verbs must carry well-typed params; this is the producer-side check.
    pub fn from_wire_object(object: Params) -> Result<Self, CommandDecodeError> {
        let (action, target, params) = split_wire_object(object)?;
        let kind = CommandKind::from_parts(action, params)?;
        Ok(Command { target, kind })
    }

    /// Like [`Command::from_wire_object`], but ill-typed params of a known verb
    /// yield [`CommandKind::Custom`] instead of an error.
    pub fn from_wire_object_lenient(object: Params) -> Result<Self, CommandDecodeError> {
        let (action, target, params) = split_wire_object(object)?;
        let kind = CommandKind::from_parts_lenient(action, params);
        Ok(Command { target, kind })
    }

    /// Decode a single command; an empty slot is an error here.
    pub fn from_json_str(text: &str) -> Result<Self, CommandDecodeError> {
        decode_mailbox(text)?.ok_or(CommandDecodeError::Empty)
    }

    /// Canonical wire form: `action`, optional `target`, and `params` when non-empty.
    pub fn to_wire(&self) -> Result<JsonValue, serde_json::Error> {
        let mut object = Params::new();
        object.insert(
            "action".to_string(),
            JsonValue::String(self.action().to_string()),
        );
        if let Some(target) = &self.target {
            object.insert("target".to_string(), JsonValue::String(target.clone()));
        }
        let params = self.kind.params()?;
        if !params.is_empty() {
            object.insert("params".to_string(), JsonValue::Object(params));
        }
        Ok(JsonValue::Object(object))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_wire()?)
    }

    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_wire()?)
    }

    pub fn signature(&self) -> Result<CommandSignature, serde_json::Error> {
        CommandSignature::of(self)
    }
}

impl FromStr for Command {
    type Err = CommandDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::from_json_str(s)
    }
}

fn split_wire_object(
    mut object: Params,
) -> Result<(String, Option<String>, Params), CommandDecodeError> {
    let action = take_action(&mut object)?;
    let target = take_target(&mut object)?;
    let mut params = take_params(&mut object)?;
    for (key, value) in object {
        params.entry(key).or_insert(value);
    }
    Ok((action, target, params))
}

fn take_action(object: &mut Params) -> Result<String, CommandDecodeError> {
    let action = object
        .remove("action")
        .map(|value| action_string(value, "action"))
        .transpose()?;
    let legacy = object
        .remove("type")
        .map(|value| action_string(value, "type"))
        .transpose()?;
    match (action, legacy) {
        (Some(action), Some(legacy)) if action != legacy => {
            Err(CommandDecodeError::ConflictingFields {
                first: "action",
                second: "type",
            })
        }
        (Some(action), _) => Ok(action),
        (None, Some(legacy)) => Ok(legacy),
        (None, None) => Err(CommandDecodeError::MissingAction),
    }
}

fn action_string(value: JsonValue, field: &'static str) -> Result<String, CommandDecodeError> {
    match value {
        JsonValue::String(action) if !action.trim().is_empty() => Ok(action.trim().to_string()),
        _ => Err(CommandDecodeError::InvalidField {
            field,
            expected: "a non-empty string",
        }),
    }
}

fn take_target(object: &mut Params) -> Result<Option<String>, CommandDecodeError> {
    match object.remove("target") {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(target)) => Ok(Some(target)),
        Some(_) => Err(CommandDecodeError::InvalidField {
            field: "target",
            expected: "a string",
        }),
    }
}

fn take_params(object: &mut Params) -> Result<Params, CommandDecodeError> {
    let params = object.remove("params");
    let legacy = object.remove("data");
    let (field, value) = match (params, legacy) {
        (Some(_), Some(_)) => {
            return Err(CommandDecodeError::ConflictingFields {
                first: "params",
                second: "data",
            })
        }
        (Some(value), None) => ("params", value),
        (None, Some(value)) => ("data", value),
        (None, None) => return Ok(Params::new()),
    };
    match value {
        JsonValue::Object(params) => Ok(params),
        JsonValue::Null => Ok(Params::new()),
        _ => Err(CommandDecodeError::InvalidField {
            field,
            expected: "a JSON object",
        }),
    }
}
