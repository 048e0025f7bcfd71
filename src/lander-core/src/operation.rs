// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The fixed catalog of lander operations.
//!
//! Operation names must match the ones used by the plan executor and by the
//! action servers on the lander, so they are kept verbatim (including the odd
//! `Guarded_move` spelling and the lowercase OWLAT names).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::completion::Axis;
use crate::error::LanderError;

/// Opaque command identifier supplied by the plan executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub i64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CommandId {
    fn from(value: i64) -> Self {
        CommandId(value)
    }
}

/// Long-running lander operation, mutually exclusive with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "Guarded_move")]
    GuardedMove,
    DigCircular,
    DigLinear,
    Deliver,
    PanAntenna,
    TiltAntenna,
    Grind,
    Stow,
    Unstow,
    TakePicture,
    #[serde(rename = "owlat_unstow")]
    OwlatUnstow,
    #[serde(rename = "owlat_stow")]
    OwlatStow,
}

/// How an operation's completion is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Terminal callback from an action server, bounded by the action timeout.
    Action,
    /// Joint samples compared against a goal angle, bounded by the pan/tilt timeout.
    Sample(Axis),
    /// Arrival of the next camera image.
    Image,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::GuardedMove,
        Operation::DigCircular,
        Operation::DigLinear,
        Operation::Deliver,
        Operation::PanAntenna,
        Operation::TiltAntenna,
        Operation::Grind,
        Operation::Stow,
        Operation::Unstow,
        Operation::TakePicture,
        Operation::OwlatUnstow,
        Operation::OwlatStow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GuardedMove => "Guarded_move",
            Self::DigCircular => "DigCircular",
            Self::DigLinear => "DigLinear",
            Self::Deliver => "Deliver",
            Self::PanAntenna => "PanAntenna",
            Self::TiltAntenna => "TiltAntenna",
            Self::Grind => "Grind",
            Self::Stow => "Stow",
            Self::Unstow => "Unstow",
            Self::TakePicture => "TakePicture",
            Self::OwlatUnstow => "owlat_unstow",
            Self::OwlatStow => "owlat_stow",
        }
    }

    pub fn completion(&self) -> Completion {
        match self {
            Self::PanAntenna => Completion::Sample(Axis::Pan),
            Self::TiltAntenna => Completion::Sample(Axis::Tilt),
            Self::TakePicture => Completion::Image,
            _ => Completion::Action,
        }
    }

    /// Operations served by an action server.
    pub fn actions() -> impl Iterator<Item = Operation> {
        Self::ALL
            .into_iter()
            .filter(|op| op.completion() == Completion::Action)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = LanderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| LanderError::UnknownOperation(s.to_string()))
    }
}
