// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operational policies for completion detection.
//!
//! Timeouts and tolerances used by the dispatcher and the pan/tilt sample
//! policy, plus the two decisions the lander interface leaves open: what to do
//! when the backend cannot take a goal, and whether action failures are
//! reported to the plan executor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time allowed for an action server to report a terminal state.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(180);
/// Time allowed for an antenna to reach its goal angle.
pub const PAN_TILT_TIMEOUT: Duration = Duration::from_secs(5);
/// Time allowed for each action server to connect at startup.
pub const ACTION_SERVER_TIMEOUT: Duration = Duration::from_secs(10);
/// Antenna goal tolerance in degrees.
pub const ANGLE_TOLERANCE_DEG: f64 = 0.2;

/// What to do with an admitted operation whose backend cannot accept it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendUnavailablePolicy {
    /// Return the operation to idle and report failure to the issuer.
    #[default]
    RollBack,
    /// Log and leave the operation marked running, with no status report.
    /// The operation can never be admitted again.
    LeaveRunning,
}

/// Policy values shared by the dispatcher and completion detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanderPolicies {
    pub action_timeout: Duration,
    pub pan_tilt_timeout: Duration,
    pub server_timeout: Duration,
    pub angle_tolerance_deg: f64,
    pub on_backend_unavailable: BackendUnavailablePolicy,
    /// Report non-successful terminal states and timeouts as failures.
    /// When `false` every completed command is reported as a success.
    pub report_action_failures: bool,
}

impl Default for LanderPolicies {
    fn default() -> Self {
        Self {
            action_timeout: ACTION_TIMEOUT,
            pan_tilt_timeout: PAN_TILT_TIMEOUT,
            server_timeout: ACTION_SERVER_TIMEOUT,
            angle_tolerance_deg: ANGLE_TOLERANCE_DEG,
            on_backend_unavailable: BackendUnavailablePolicy::default(),
            report_action_failures: false,
        }
    }
}
