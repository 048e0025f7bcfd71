// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod backend;
pub mod command;
pub mod completion;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod faults;
pub mod lander;
pub mod operation;
pub mod policies;
pub mod registry;
pub mod telemetry;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use backend::{ActionClient, GoalCallbacks, GoalResult, GoalState, LanderBackend};
pub use command::{Goal, LanderCommand, Point};
pub use completion::{Axis, SampleVerdict};
pub use error::LanderError;
pub use events::{LanderEventEmitter, LanderListener, ListenerId};
pub use faults::{FaultDomain, FaultTracker, FaultTransition};
pub use lander::{Lander, LanderSnapshot};
pub use operation::{CommandId, Operation};
pub use policies::{BackendUnavailablePolicy, LanderPolicies};
pub use registry::{OperationRegistry, RunState, StatusCallback};
pub use telemetry::{Joint, JointSample, JointTelemetry, PowerSample, PowerState, TelemetryTable};
