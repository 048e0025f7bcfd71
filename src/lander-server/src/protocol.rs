// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-lines command protocol spoken by plan executor clients.
//!
//! Requests are objects tagged by `cmd`; every request gets exactly one
//! `ClientResponse` line. Command completions are pushed asynchronously as
//! `{"status":{"id":..,"success":..}}` lines.

use serde::{Deserialize, Serialize};

use lander_core::{Axis, CommandId, Goal, LanderCommand, LanderSnapshot, Point};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    GuardedMove {
        id: Option<CommandId>,
        start: Point,
        normal: Point,
        search_distance: f64,
    },
    DigCircular {
        id: Option<CommandId>,
        x: f64,
        y: f64,
        depth: f64,
        ground_position: f64,
        #[serde(default)]
        parallel: bool,
    },
    DigLinear {
        id: Option<CommandId>,
        x: f64,
        y: f64,
        depth: f64,
        length: f64,
        ground_position: f64,
    },
    Deliver {
        id: Option<CommandId>,
        x: f64,
        y: f64,
        z: f64,
    },
    Grind {
        id: Option<CommandId>,
        x: f64,
        y: f64,
        depth: f64,
        length: f64,
        #[serde(default)]
        parallel: bool,
        ground_position: f64,
    },
    Stow {
        id: Option<CommandId>,
    },
    Unstow {
        id: Option<CommandId>,
    },
    OwlatStow {
        id: Option<CommandId>,
    },
    OwlatUnstow {
        id: Option<CommandId>,
    },
    PanAntenna {
        id: Option<CommandId>,
        degrees: f64,
    },
    TiltAntenna {
        id: Option<CommandId>,
        degrees: f64,
    },
    TakePicture {
        id: Option<CommandId>,
    },
    /// Query whether an operation (by catalog name) is running.
    Running {
        op: String,
    },
    GetState,
    /// Inject a fault bitmask snapshot for a domain.
    FaultSnapshot {
        domain: String,
        value: u64,
    },
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Submit(LanderCommand, Option<CommandId>),
    Running(String),
    GetState,
    FaultSnapshot { domain: String, value: u64 },
}

impl From<ClientCommand> for Request {
    fn from(cmd: ClientCommand) -> Self {
        let submit = |command: LanderCommand, id| Request::Submit(command, id);
        match cmd {
            ClientCommand::GuardedMove {
                id,
                start,
                normal,
                search_distance,
            } => submit(
                Goal::GuardedMove {
                    start,
                    normal,
                    search_distance,
                }
                .into(),
                id,
            ),
            ClientCommand::DigCircular {
                id,
                x,
                y,
                depth,
                ground_position,
                parallel,
            } => submit(
                Goal::DigCircular {
                    x,
                    y,
                    depth,
                    ground_position,
                    parallel,
                }
                .into(),
                id,
            ),
            ClientCommand::DigLinear {
                id,
                x,
                y,
                depth,
                length,
                ground_position,
            } => submit(
                Goal::DigLinear {
                    x,
                    y,
                    depth,
                    length,
                    ground_position,
                }
                .into(),
                id,
            ),
            ClientCommand::Deliver { id, x, y, z } => submit(
                Goal::Deliver {
                    target: Point::new(x, y, z),
                }
                .into(),
                id,
            ),
            ClientCommand::Grind {
                id,
                x,
                y,
                depth,
                length,
                parallel,
                ground_position,
            } => submit(
                Goal::Grind {
                    x,
                    y,
                    depth,
                    length,
                    parallel,
                    ground_position,
                }
                .into(),
                id,
            ),
            ClientCommand::Stow { id } => submit(Goal::Stow.into(), id),
            ClientCommand::Unstow { id } => submit(Goal::Unstow.into(), id),
            ClientCommand::OwlatStow { id } => submit(Goal::OwlatStow.into(), id),
            ClientCommand::OwlatUnstow { id } => submit(Goal::OwlatUnstow.into(), id),
            ClientCommand::PanAntenna { id, degrees } => submit(
                LanderCommand::Antenna {
                    axis: Axis::Pan,
                    degrees,
                },
                id,
            ),
            ClientCommand::TiltAntenna { id, degrees } => submit(
                LanderCommand::Antenna {
                    axis: Axis::Tilt,
                    degrees,
                },
                id,
            ),
            ClientCommand::TakePicture { id } => submit(LanderCommand::TakePicture, id),
            ClientCommand::Running { op } => Request::Running(op),
            ClientCommand::GetState => Request::GetState,
            ClientCommand::FaultSnapshot { domain, value } => {
                Request::FaultSnapshot { domain, value }
            }
        }
    }
}

pub fn parse_request(line: &str) -> Result<Request, serde_json::Error> {
    serde_json::from_str::<ClientCommand>(line).map(Request::from)
}

/// Response sent for every request line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientResponse {
    /// For commands: whether the command was admitted.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<LanderSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Completion of an admitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: CommandId,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusPush {
    pub status: StatusReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dig_linear() {
        let line = r#"{"cmd":"dig_linear","id":7,"x":1.5,"y":0.0,"depth":0.05,"length":0.3,"ground_position":-0.155}"#;
        let request = parse_request(line).unwrap();
        assert_eq!(
            request,
            Request::Submit(
                LanderCommand::Action(Goal::DigLinear {
                    x: 1.5,
                    y: 0.0,
                    depth: 0.05,
                    length: 0.3,
                    ground_position: -0.155
                }),
                Some(CommandId(7))
            )
        );
    }

    #[test]
    fn test_missing_id_is_none() {
        let request = parse_request(r#"{"cmd":"stow"}"#).unwrap();
        assert_eq!(
            request,
            Request::Submit(LanderCommand::Action(Goal::Stow), None)
        );
    }

    #[test]
    fn test_parse_antenna_and_guarded_move() {
        let request = parse_request(r#"{"cmd":"tilt_antenna","id":3,"degrees":-12.5}"#).unwrap();
        assert_eq!(
            request,
            Request::Submit(
                LanderCommand::Antenna {
                    axis: Axis::Tilt,
                    degrees: -12.5
                },
                Some(CommandId(3))
            )
        );

        let line = r#"{"cmd":"guarded_move","id":1,"start":{"x":2.0,"y":0.0,"z":0.3},"normal":{"x":0.0,"y":0.0,"z":1.0},"search_distance":0.5}"#;
        let Request::Submit(command, _) = parse_request(line).unwrap() else {
            panic!("expected a command");
        };
        assert_eq!(command.operation().name(), "Guarded_move");
    }

    #[test]
    fn test_parse_queries() {
        assert_eq!(
            parse_request(r#"{"cmd":"running","op":"DigLinear"}"#).unwrap(),
            Request::Running("DigLinear".to_string())
        );
        assert_eq!(
            parse_request(r#"{"cmd":"get_state"}"#).unwrap(),
            Request::GetState
        );
        assert_eq!(
            parse_request(r#"{"cmd":"fault_snapshot","domain":"arm","value":4}"#).unwrap(),
            Request::FaultSnapshot {
                domain: "arm".to_string(),
                value: 4
            }
        );
    }

    #[test]
    fn test_reject_unknown_or_incomplete() {
        assert!(parse_request(r#"{"cmd":"moonwalk"}"#).is_err());
        assert!(parse_request(r#"{"cmd":"deliver","id":1,"x":0.5}"#).is_err());
        assert!(parse_request("not json").is_err());
    }

    #[test]
    fn test_response_encoding() {
        let json = serde_json::to_string(&ClientResponse::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);

        let json = serde_json::to_string(&ClientResponse::error("busy")).unwrap();
        assert_eq!(json, r#"{"success":false,"error":"busy"}"#);

        let push = StatusPush {
            status: StatusReport {
                id: CommandId(7),
                success: true,
            },
        };
        assert_eq!(
            serde_json::to_string(&push).unwrap(),
            r#"{"status":{"id":7,"success":true}}"#
        );
    }
}
