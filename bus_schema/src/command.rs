use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::wire::CommandDecodeError;

/// Verb-specific arguments as they appear on the wire.
pub type Params = JsonMap<String, JsonValue>;

/// Target value that addresses every poller.
pub const BROADCAST_TARGET: &str = "all";

/// Wire discriminants for the verbs with a typed payload.
pub mod actions {
    pub const PING: &str = "PING";
    pub const START: &str = "START";
    pub const PAUSE: &str = "PAUSE";
    pub const RESUME: &str = "RESUME";
    pub const STOP_ALL: &str = "STOP_ALL";
    pub const BUILD_WALL: &str = "BUILD_WALL";
    pub const START_WORK: &str = "START_WORK";
    pub const STOP_WORK: &str = "STOP_WORK";
    pub const REGISTER_BOT: &str = "REGISTER_BOT";
    pub const TASK_COMPLETE: &str = "TASK_COMPLETE";
    pub const CHAT: &str = "CHAT";
    pub const START_RECORDING: &str = "START_RECORDING";
    pub const STOP_RECORDING: &str = "STOP_RECORDING";
    pub const EXECUTE_SHOT: &str = "EXECUTE_SHOT";
}

/// High-level representation of one mailbox command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Logical recipient. Every poller sees every command; handlers filter on this.
    pub target: Option<String>,
    pub kind: CommandKind,
}

/// Supported command payloads.
///
/// Verbs without a typed variant are carried through [`CommandKind::Custom`]
/// untouched, so producers can introduce new verbs without a schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Ping,
    Start(ProjectInput),
    Pause,
    Resume,
    StopAll { reason: Option<String> },
    BuildWall(BuildWallParams),
    StartWork(WorkAssignment),
    StopWork,
    RegisterBot(BotRegistration),
    TaskComplete(TaskReport),
    Chat { message: String },
    StartRecording(RecordingRequest),
    StopRecording,
    ExecuteShot(CameraShot),
    /// Any verb without a typed variant, or a known verb whose params do not
    /// fit its typed shape. Build it with [`CommandKind::custom`]: a value
    /// constructed directly with a known verb or untrimmed action decodes
    /// back differently.
    Custom { action: String, params: Params },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: JsonValue,
    #[serde(flatten)]
    pub extra: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildWallParams {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub z: i32,
    #[serde(default = "default_wall_height")]
    pub height: u32,
    /// Legacy payloads spell this `block`; it is renamed on decode.
    #[serde(default = "default_wall_material")]
    pub material: String,
    /// Keys this model does not know about, kept so they survive a round trip.
    #[serde(flatten)]
    pub extra: Params,
}

impl Default for BuildWallParams {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            height: default_wall_height(),
            material: default_wall_material(),
            extra: Params::new(),
        }
    }
}

fn default_wall_height() -> u32 {
    5
}

fn default_wall_material() -> String {
    "stone_bricks".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    /// Zone descriptor; producers send either a name or a region object.
    #[serde(default)]
    pub zone: JsonValue,
    #[serde(default)]
    pub quota: u32,
    /// Assignment details beyond zone and quota (`section`, `crops`, `strategy`, ...).
    #[serde(flatten)]
    pub extra: Params,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotRegistration {
    pub name: String,
    #[serde(rename = "type", default)]
    pub role: String,
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Params,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub bot_name: String,
    pub task_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: JsonValue,
    #[serde(flatten)]
    pub extra: Params,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(rename = "duration", default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: Params,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraShot {
    #[serde(rename = "type")]
    pub kind: String,
    /// Shot length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(flatten)]
    pub extra: Params,
}

impl CameraShot {
    /// Bot id of the camera assigned to this shot, if the shot names one.
    pub fn camera_target(&self) -> Option<String> {
        match self.extra.get("camera")? {
            JsonValue::String(id) if !id.is_empty() => Some(format!("camera_bot_{id}")),
            JsonValue::Number(number) => number.as_u64().map(|id| format!("camera_bot_{id:02}")),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct StartParams {
    input: ProjectInput,
}

#[derive(Deserialize)]
struct StopAllParams {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatParams {
    message: String,
}

impl Command {
    /// A command with no target, delivered to every handler.
    pub fn new(kind: CommandKind) -> Self {
        Self { target: None, kind }
    }

    /// A command addressed to one logical recipient.
    pub fn targeted(target: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            target: Some(target.into()),
            kind,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn action(&self) -> &str {
        self.kind.action()
    }

    /// Returns true when a bot with the given id should act on this command.
    ///
    /// Untargeted commands and commands for [`BROADCAST_TARGET`] address everyone.
    pub fn is_addressed_to(&self, bot_id: &str) -> bool {
        match self.target.as_deref() {
            None => true,
            Some(target) => target == BROADCAST_TARGET || target == bot_id,
        }
    }
}

impl CommandKind {
    pub fn action(&self) -> &str {
        match self {
            CommandKind::Ping => actions::PING,
            CommandKind::Start(_) => actions::START,
            CommandKind::Pause => actions::PAUSE,
            CommandKind::Resume => actions::RESUME,
            CommandKind::StopAll { .. } => actions::STOP_ALL,
            CommandKind::BuildWall(_) => actions::BUILD_WALL,
            CommandKind::StartWork(_) => actions::START_WORK,
            CommandKind::StopWork => actions::STOP_WORK,
            CommandKind::RegisterBot(_) => actions::REGISTER_BOT,
            CommandKind::TaskComplete(_) => actions::TASK_COMPLETE,
            CommandKind::Chat { .. } => actions::CHAT,
            CommandKind::StartRecording(_) => actions::START_RECORDING,
            CommandKind::StopRecording => actions::STOP_RECORDING,
            CommandKind::ExecuteShot(_) => actions::EXECUTE_SHOT,
            CommandKind::Custom { action, .. } => action.as_str(),
        }
    }

    /// Build a payload from a wire discriminant and its argument bag.
    ///
    /// Known verbs must decode into their typed payload. If the typed form
    /// would drop or alter any of the given params, the command is kept as
    /// [`CommandKind::Custom`] instead so nothing published is lost. Unknown
    /// verbs always become `Custom`.
    pub fn from_parts(action: String, params: Params) -> Result<Self, CommandDecodeError> {
        let params = rename_legacy_keys(&action, params);
        let Some(kind) = Self::decode_typed(&action, params.clone())? else {
            return Ok(CommandKind::Custom { action, params });
        };
        let lossless = kind
            .params()
            .map(|encoded| preserves(&JsonValue::Object(params.clone()), &JsonValue::Object(encoded)))
            .unwrap_or(false);
        if lossless {
            Ok(kind)
        } else {
            Ok(CommandKind::Custom { action, params })
        }
    }

    /// [`CommandKind::from_parts`] for content read back from a mailbox: a
    /// known verb whose params are ill-typed is kept as
    /// [`CommandKind::Custom`] rather than rejected, so it is still delivered
    /// and consumed.
    pub fn from_parts_lenient(action: String, params: Params) -> Self {
        match Self::from_parts(action.clone(), params.clone()) {
            Ok(kind) => kind,
            Err(_) => CommandKind::Custom { action, params },
        }
    }

    /// Build a payload for an arbitrary verb, normalised the same way a
    /// mailbox read would normalise it.
    pub fn custom(action: impl Into<String>, params: Params) -> Result<Self, CommandDecodeError> {
        let action = action.into().trim().to_string();
        if action.is_empty() {
            return Err(CommandDecodeError::InvalidField {
                field: "action",
                expected: "a non-empty string",
            });
        }
        Ok(Self::from_parts_lenient(action, params))
    }

    fn decode_typed(action: &str, params: Params) -> Result<Option<Self>, CommandDecodeError> {
        let kind = match action {
            actions::PING => CommandKind::Ping,
            actions::START => {
                let start: StartParams = decode_params(action, params)?;
                CommandKind::Start(start.input)
            }
            actions::PAUSE => CommandKind::Pause,
            actions::RESUME => CommandKind::Resume,
            actions::STOP_ALL => {
                let stop: StopAllParams = decode_params(action, params)?;
                CommandKind::StopAll {
                    reason: stop.reason,
                }
            }
            actions::BUILD_WALL => CommandKind::BuildWall(decode_params(action, params)?),
            actions::START_WORK => CommandKind::StartWork(decode_params(action, params)?),
            actions::STOP_WORK => CommandKind::StopWork,
            actions::REGISTER_BOT => CommandKind::RegisterBot(decode_params(action, params)?),
            actions::TASK_COMPLETE => CommandKind::TaskComplete(decode_params(action, params)?),
            actions::CHAT => {
                let chat: ChatParams = decode_params(action, params)?;
                CommandKind::Chat {
                    message: chat.message,
                }
            }
            actions::START_RECORDING => {
                CommandKind::StartRecording(decode_params(action, params)?)
            }
            actions::STOP_RECORDING => CommandKind::StopRecording,
            actions::EXECUTE_SHOT => CommandKind::ExecuteShot(decode_params(action, params)?),
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    /// Encode the payload into its wire argument bag.
    pub fn params(&self) -> Result<Params, serde_json::Error> {
        match self {
            CommandKind::Ping
            | CommandKind::Pause
            | CommandKind::Resume
            | CommandKind::StopWork
            | CommandKind::StopRecording => Ok(Params::new()),
            CommandKind::Start(input) => encode_params(&json!({ "input": input })),
            CommandKind::StopAll { reason } => match reason {
                Some(reason) => encode_params(&json!({ "reason": reason })),
                None => Ok(Params::new()),
            },
            CommandKind::BuildWall(params) => encode_params(params),
            CommandKind::StartWork(params) => encode_params(params),
            CommandKind::RegisterBot(params) => encode_params(params),
            CommandKind::TaskComplete(params) => encode_params(params),
            CommandKind::Chat { message } => encode_params(&json!({ "message": message })),
            CommandKind::StartRecording(params) => encode_params(params),
            CommandKind::ExecuteShot(params) => encode_params(params),
            CommandKind::Custom { params, .. } => Ok(params.clone()),
        }
    }
}

fn decode_params<T: DeserializeOwned>(action: &str, params: Params) -> Result<T, CommandDecodeError> {
    serde_json::from_value(JsonValue::Object(params)).map_err(|source| {
        CommandDecodeError::InvalidParams {
            action: action.to_string(),
            source,
        }
    })
}

/// `block` is the historical spelling of the BUILD_WALL `material` key.
fn rename_legacy_keys(action: &str, mut params: Params) -> Params {
    if action == actions::BUILD_WALL && !params.contains_key("material") {
        if let Some(block) = params.remove("block") {
            params.insert("material".to_string(), block);
        }
    }
    params
}

/// True when `encoded` carries every value of `original`. Defaults the typed
/// form adds are fine; a missing key is fine only where the original was
/// `null`. Numbers compare by value, so `8` and `8.0` match.
fn preserves(original: &JsonValue, encoded: &JsonValue) -> bool {
    match (original, encoded) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        (JsonValue::Object(a), JsonValue::Object(b)) => a.iter().all(|(key, value)| match b.get(key) {
            Some(encoded) => preserves(value, encoded),
            None => value.is_null(),
        }),
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| preserves(a, b))
        }
        _ => original == encoded,
    }
}

fn encode_params<T: Serialize>(value: &T) -> Result<Params, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(value)?)
}
