// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

use crate::completion::Axis;
use crate::operation::Operation;

/// Cartesian point in the lander frame (meters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Goal payload for operations served by an action server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum Goal {
    GuardedMove {
        start: Point,
        normal: Point,
        search_distance: f64,
    },
    DigCircular {
        x: f64,
        y: f64,
        depth: f64,
        ground_position: f64,
        parallel: bool,
    },
    DigLinear {
        x: f64,
        y: f64,
        depth: f64,
        length: f64,
        ground_position: f64,
    },
    Deliver {
        target: Point,
    },
    Grind {
        x: f64,
        y: f64,
        depth: f64,
        length: f64,
        parallel: bool,
        ground_position: f64,
    },
    Stow,
    Unstow,
    OwlatStow,
    OwlatUnstow,
}

impl Goal {
    pub fn operation(&self) -> Operation {
        match self {
            Self::GuardedMove { .. } => Operation::GuardedMove,
            Self::DigCircular { .. } => Operation::DigCircular,
            Self::DigLinear { .. } => Operation::DigLinear,
            Self::Deliver { .. } => Operation::Deliver,
            Self::Grind { .. } => Operation::Grind,
            Self::Stow => Operation::Stow,
            Self::Unstow => Operation::Unstow,
            Self::OwlatStow => Operation::OwlatStow,
            Self::OwlatUnstow => Operation::OwlatUnstow,
        }
    }
}

/// Command issued by the plan executor for one catalog operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LanderCommand {
    Action(Goal),
    Antenna { axis: Axis, degrees: f64 },
    TakePicture,
}

impl LanderCommand {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Action(goal) => goal.operation(),
            Self::Antenna { axis, .. } => axis.operation(),
            Self::TakePicture => Operation::TakePicture,
        }
    }
}

impl From<Goal> for LanderCommand {
    fn from(goal: Goal) -> Self {
        LanderCommand::Action(goal)
    }
}
