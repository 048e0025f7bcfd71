// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Interfaces the core expects from the execution backend.
//!
//! Backends own the transport to the lander (action servers, command
//! publishers). The core only submits goals and set-points; telemetry flows
//! back through the `Lander` ingest methods.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{Goal, Point};
use crate::completion::Axis;
use crate::operation::Operation;
use crate::DynResult;

/// Terminal state reported by an action server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalState {
    Succeeded,
    Aborted,
    Preempted,
    Rejected,
    Recalled,
    Lost,
}

impl GoalState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for GoalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Aborted => "ABORTED",
            Self::Preempted => "PREEMPTED",
            Self::Rejected => "REJECTED",
            Self::Recalled => "RECALLED",
            Self::Lost => "LOST",
        };
        f.write_str(s)
    }
}

/// Result payload delivered with the done callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GoalResult {
    GuardedMove { success: bool, final_position: Point },
    Empty,
}

/// Intermediate progress published by an action server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalFeedback {
    pub current: Point,
}

pub type ActiveCallback = Box<dyn FnOnce() + Send>;
pub type FeedbackCallback = Box<dyn FnMut(GoalFeedback) + Send>;
pub type DoneCallback = Box<dyn FnOnce(GoalState, GoalResult) + Send>;

/// Callback slots registered with a goal.
///
/// `on_active` fires at most once, `on_feedback` any number of times and
/// `on_done` exactly once for an accepted goal.
pub struct GoalCallbacks {
    pub on_active: ActiveCallback,
    pub on_feedback: FeedbackCallback,
    pub on_done: DoneCallback,
}

impl fmt::Debug for GoalCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalCallbacks").finish_non_exhaustive()
    }
}

/// Client side of a single action server.
pub trait ActionClient: Send + Sync {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Wait until the server is reachable. Returns `false` on timeout.
    fn wait_for_server<'a>(
        &'a self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// Submit a goal. Returns once the goal has been handed to the server;
    /// progress and the terminal state arrive through `callbacks`.
    fn send_goal<'a>(
        &'a self,
        goal: Goal,
        callbacks: GoalCallbacks,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>>;
}

/// Static description of a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub description: String,
}

/// Execution backend for the whole lander.
pub trait LanderBackend: Send + Sync {
    fn info(&self) -> &BackendInfo;

    /// Action client for `op`, or `None` when the backend has not connected one.
    fn action_client(&self, op: Operation) -> Option<Arc<dyn ActionClient>>;

    /// Publish a position set-point for an antenna axis.
    fn command_antenna(&self, axis: Axis, radians: f64) -> DynResult<()>;

    /// Trigger a left stereo camera capture.
    fn trigger_image(&self) -> DynResult<()>;
}
