use std::num::ParseIntError;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{
    BuildWallParams, Command, CommandDecodeError, CommandKind, Params, ProjectInput,
    WorkAssignment,
};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("expected key=value, got '{0}'")]
    InvalidParam(String),
    #[error("unknown key '{key}' for {verb}")]
    UnknownKey { verb: &'static str, key: String },
    #[error("invalid project input '{0}' (expected story or image)")]
    InvalidInput(String),
    #[error(transparent)]
    Decode(#[from] CommandDecodeError),
}

/// Parse an operator command line into a [`Command`].
///
/// Verbs are case-insensitive; see the match arms for the accepted shapes.
pub fn parse_command_line(input: &str) -> Result<Command, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "ping" => Ok(optionally_targeted(parts.next(), CommandKind::Ping)),
        "pause" => Ok(optionally_targeted(parts.next(), CommandKind::Pause)),
        "resume" => Ok(optionally_targeted(parts.next(), CommandKind::Resume)),
        "stop_work" => Ok(optionally_targeted(parts.next(), CommandKind::StopWork)),
        "stop_recording" => Ok(optionally_targeted(
            parts.next(),
            CommandKind::StopRecording,
        )),
        "stop_all" => {
            let reason = join_rest(parts);
            Ok(Command::new(CommandKind::StopAll {
                reason: (!reason.is_empty()).then_some(reason),
            }))
        }
        "chat" => {
            let message = join_rest(parts);
            if message.is_empty() {
                return Err(CommandParseError::MissingArgument("message"));
            }
            Ok(Command::new(CommandKind::Chat { message }))
        }
        "build_wall" => {
            let target = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("target"))?;
            let mut wall = BuildWallParams::default();
            for token in parts {
                let (key, value) = split_pair(token)?;
                match key {
                    "x" => wall.x = parse_i32(value, "build_wall x")?,
                    "y" => wall.y = parse_i32(value, "build_wall y")?,
                    "z" => wall.z = parse_i32(value, "build_wall z")?,
                    "height" => wall.height = parse_u32(value, "build_wall height")?,
                    "material" | "block" => wall.material = value.to_string(),
                    other => {
                        return Err(CommandParseError::UnknownKey {
                            verb: "build_wall",
                            key: other.to_string(),
                        })
                    }
                }
            }
            Ok(Command::targeted(target, CommandKind::BuildWall(wall)))
        }
        "start_work" => {
            let target = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("target"))?;
            let quota_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("quota"))?;
            let quota = parse_u32(quota_str, "start_work quota")?;
            let zone = parts
                .next()
                .map(|zone| JsonValue::String(zone.to_string()))
                .unwrap_or(JsonValue::Null);
            Ok(Command::targeted(
                target,
                CommandKind::StartWork(WorkAssignment {
                    zone,
                    quota,
                    ..WorkAssignment::default()
                }),
            ))
        }
        "start" => {
            let kind = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("input type"))?
                .to_ascii_lowercase();
            if kind != "story" && kind != "image" {
                return Err(CommandParseError::InvalidInput(kind));
            }
            let text = join_rest(parts);
            if text.is_empty() {
                return Err(CommandParseError::MissingArgument("input text"));
            }
            Ok(Command::new(CommandKind::Start(ProjectInput {
                kind,
                data: JsonValue::String(text),
                ..ProjectInput::default()
            })))
        }
        "raw" => {
            let action = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("action"))?
                .to_ascii_uppercase();
            let mut target = None;
            let mut params = Params::new();
            for (index, token) in parts.enumerate() {
                if index == 0 && !token.contains('=') {
                    target = Some(token.to_string());
                    continue;
                }
                let (key, value) = split_pair(token)?;
                params.insert(key.to_string(), loose_json(value));
            }
            let kind = CommandKind::from_parts(action, params)?;
            Ok(Command { target, kind })
        }
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn optionally_targeted(target: Option<&str>, kind: CommandKind) -> Command {
    match target {
        Some(target) => Command::targeted(target, kind),
        None => Command::new(kind),
    }
}

fn join_rest<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

fn split_pair(token: &str) -> Result<(&str, &str), CommandParseError> {
    match token.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(CommandParseError::InvalidParam(token.to_string())),
    }
}

/// Values that parse as JSON keep their type; everything else is a string.
fn loose_json(value: &str) -> JsonValue {
    serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()))
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_i32(value: &str, context: &'static str) -> Result<i32, CommandParseError> {
    value
        .parse::<i32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_line_is_empty() {
        assert!(matches!(
            parse_command_line("   "),
            Err(CommandParseError::Empty)
        ));
    }

    #[test]
    fn control_verbs_take_an_optional_target() {
        let pause = parse_command_line("PAUSE").expect("pause parses");
        assert_eq!(pause, Command::new(CommandKind::Pause));

        let ping = parse_command_line("ping farmer_01").expect("ping parses");
        assert_eq!(ping, Command::targeted("farmer_01", CommandKind::Ping));
    }

    #[test]
    fn build_wall_reads_key_value_pairs() {
        let command =
            parse_command_line("build_wall wall_builder_01 x=0 y=64 z=-4 height=5 material=stone_bricks")
                .expect("build_wall parses");
        assert_eq!(command.target.as_deref(), Some("wall_builder_01"));
        let CommandKind::BuildWall(wall) = command.kind else {
            panic!("expected BuildWall");
        };
        assert_eq!((wall.x, wall.y, wall.z), (0, 64, -4));
        assert_eq!(wall.height, 5);
        assert_eq!(wall.material, "stone_bricks");
    }

    #[test]
    fn build_wall_rejects_bad_values() {
        let err = parse_command_line("build_wall wall_builder_01 height=tall")
            .expect_err("height must be numeric");
        assert!(err.to_string().contains("build_wall height"), "{err}");

        let err = parse_command_line("build_wall wall_builder_01 colour=red")
            .expect_err("unknown key");
        assert!(matches!(err, CommandParseError::UnknownKey { .. }));

        let err = parse_command_line("build_wall").expect_err("target required");
        assert!(matches!(err, CommandParseError::MissingArgument("target")));
    }

    #[test]
    fn start_work_carries_quota_and_zone() {
        let command =
            parse_command_line("start_work lumberjack_worker_03 40 north_forest").expect("parses");
        assert_eq!(
            command,
            Command::targeted(
                "lumberjack_worker_03",
                CommandKind::StartWork(WorkAssignment {
                    zone: json!("north_forest"),
                    quota: 40,
                    ..WorkAssignment::default()
                })
            )
        );
    }

    #[test]
    fn start_joins_the_story_text() {
        let command = parse_command_line("start story A quiet village by the river")
            .expect("start parses");
        assert_eq!(
            command.kind,
            CommandKind::Start(ProjectInput {
                kind: "story".to_string(),
                data: json!("A quiet village by the river"),
                ..ProjectInput::default()
            })
        );
        let err = parse_command_line("start video clip").expect_err("unsupported input");
        assert!(matches!(err, CommandParseError::InvalidInput(kind) if kind == "video"));
    }

    #[test]
    fn chat_and_stop_all_keep_whole_text() {
        let chat = parse_command_line("chat Welcome to the new city").expect("chat parses");
        assert_eq!(
            chat.kind,
            CommandKind::Chat {
                message: "Welcome to the new city".to_string()
            }
        );
        let stop = parse_command_line("stop_all").expect("stop_all parses");
        assert_eq!(stop.kind, CommandKind::StopAll { reason: None });
    }

    #[test]
    fn raw_builds_custom_and_typed_commands() {
        let custom = parse_command_line("raw set_phase resource_manager phase=harvest round=2")
            .expect("raw parses");
        assert_eq!(custom.target.as_deref(), Some("resource_manager"));
        assert_eq!(custom.action(), "SET_PHASE");
        assert_eq!(
            custom.kind.params().expect("encode"),
            serde_json::from_value::<Params>(json!({ "phase": "harvest", "round": 2 }))
                .expect("object literal")
        );

        let typed = parse_command_line("raw BUILD_WALL height=9").expect("raw typed parses");
        assert!(typed.target.is_none());
        let CommandKind::BuildWall(wall) = typed.kind else {
            panic!("known verbs decode to their typed payload");
        };
        assert_eq!(wall.height, 9);

        let err = parse_command_line("raw CHAT").expect_err("chat needs a message");
        assert!(matches!(err, CommandParseError::Decode(_)));
    }

    #[test]
    fn unknown_verb_is_reported() {
        let err = parse_command_line("teleport 1 2 3").expect_err("unknown");
        assert!(matches!(err, CommandParseError::UnknownCommand(verb) if verb == "teleport"));
    }
}
