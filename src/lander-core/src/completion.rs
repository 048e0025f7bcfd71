// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Completion detection.
//!
//! Two policies decide when a running operation is finished:
//!
//! - the *event* policy waits for the action server's terminal callback,
//!   bounded by a timeout (see [`done_channel`]);
//! - the *sample* policy compares joint samples against a goal angle,
//!   bounded by a timeout (see [`PanTiltTracker`]).

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::error;

use crate::backend::GoalState;
use crate::operation::{CommandId, Operation};
use crate::registry::OperationRegistry;
use crate::telemetry::Joint;

/// Antenna axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Pan,
    Tilt,
}

impl Axis {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Pan => Operation::PanAntenna,
            Self::Tilt => Operation::TiltAntenna,
        }
    }

    /// Joint whose samples drive this axis' completion.
    pub fn joint(&self) -> Joint {
        match self {
            Self::Pan => Joint::AntennaPan,
            Self::Tilt => Joint::AntennaTilt,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pan => "pan",
            Self::Tilt => "tilt",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of feeding one sample to a [`PanTiltTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleVerdict {
    /// No goal armed, or the operation is not running.
    Ignored,
    /// Goal not reached and not yet expired.
    Pending,
    /// Goal reached within the tolerance; the operation was completed.
    Reached,
    /// Timeout elapsed; the operation was completed.
    Expired { reached: bool },
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    id: Option<CommandId>,
    goal: f64,
    start: Instant,
}

#[derive(Debug, Default)]
struct TrackerState {
    current: f64,
    armed: Option<Armed>,
}

/// Sample-driven completion for one antenna axis.
pub struct PanTiltTracker {
    axis: Axis,
    tolerance: f64,
    timeout: Duration,
    report_failures: bool,
    state: Mutex<TrackerState>,
}

impl PanTiltTracker {
    pub fn new(axis: Axis, tolerance: f64, timeout: Duration, report_failures: bool) -> Self {
        Self {
            axis,
            tolerance,
            timeout,
            report_failures,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Record the goal for a freshly admitted command.
    pub fn arm(&self, id: Option<CommandId>, goal: f64, start: Instant) {
        let mut state = self.state.lock().expect("tracker poisoned");
        state.armed = Some(Armed { id, goal, start });
    }

    /// Drop the goal armed for command `id`. A goal armed for a later
    /// command is kept.
    pub fn disarm(&self, id: Option<CommandId>) -> bool {
        let mut state = self.state.lock().expect("tracker poisoned");
        match state.armed {
            Some(armed) if armed.id == id => {
                state.armed = None;
                true
            }
            _ => false,
        }
    }

    /// Last observed angle in degrees.
    pub fn current(&self) -> f64 {
        self.state.lock().expect("tracker poisoned").current
    }

    /// Armed goal angle in degrees.
    pub fn goal(&self) -> Option<f64> {
        self.state
            .lock()
            .expect("tracker poisoned")
            .armed
            .map(|armed| armed.goal)
    }

    /// Feed one sample (degrees) observed at `now`.
    ///
    /// At most one call completes the armed command: the goal is taken out of
    /// the slot under the tracker lock before the registry is touched.
    pub fn observe(&self, registry: &OperationRegistry, current: f64, now: Instant) -> SampleVerdict {
        let op = self.axis.operation();
        let armed = {
            let mut state = self.state.lock().expect("tracker poisoned");
            state.current = current;
            let Some(armed) = state.armed else {
                return SampleVerdict::Ignored;
            };
            if !registry.is_running(op) {
                return SampleVerdict::Ignored;
            }
            let reached = (current - armed.goal).abs() <= self.tolerance;
            let expired = now > armed.start + self.timeout;
            if !reached && !expired {
                return SampleVerdict::Pending;
            }
            state.armed = None;
            armed
        };

        let reached = (current - armed.goal).abs() <= self.tolerance;
        let expired = now > armed.start + self.timeout;
        if expired {
            error!("{} timed out", op);
        }
        if !reached {
            error!(
                "{} failed. Ended at {} degrees, goal was {}.",
                op, current, armed.goal
            );
        }
        registry.complete_with(op, armed.id, reached || !self.report_failures);

        if expired {
            SampleVerdict::Expired { reached }
        } else {
            SampleVerdict::Reached
        }
    }
}

/// How an event-policy wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVerdict {
    Done(GoalState),
    TimedOut,
    /// The backend dropped the done callback without calling it.
    Dropped,
}

impl EventVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done(state) if state.is_success())
    }
}

/// Sending half of the done signal, moved into the goal's done callback.
#[derive(Debug)]
pub struct DoneNotifier(oneshot::Sender<GoalState>);

impl DoneNotifier {
    pub fn notify(self, state: GoalState) {
        // Receiver gone means the waiter already timed out.
        let _ = self.0.send(state);
    }
}

/// Receiving half of the done signal.
#[derive(Debug)]
pub struct DoneSignal(oneshot::Receiver<GoalState>);

impl DoneSignal {
    /// Race the terminal callback against `timeout`.
    pub async fn wait(self, timeout: Duration) -> EventVerdict {
        match tokio::time::timeout(timeout, self.0).await {
            Ok(Ok(state)) => EventVerdict::Done(state),
            Ok(Err(_)) => EventVerdict::Dropped,
            Err(_) => EventVerdict::TimedOut,
        }
    }
}

pub fn done_channel() -> (DoneNotifier, DoneSignal) {
    let (tx, rx) = oneshot::channel();
    (DoneNotifier(tx), DoneSignal(rx))
}
