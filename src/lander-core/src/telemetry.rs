// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Joint and power telemetry.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::LanderError;
use crate::events::LanderEventEmitter;

/// Lander joint with a known telemetry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Joint {
    ShoulderYaw,
    ShoulderPitch,
    ProximalPitch,
    DistalPitch,
    HandYaw,
    ScoopYaw,
    AntennaPan,
    AntennaTilt,
    Grinder,
}

/// `(middleware name, plan name, soft torque limit, hard torque limit)`
struct JointProps(&'static str, &'static str, f64, f64);

impl Joint {
    pub const ALL: [Joint; 9] = [
        Joint::ShoulderYaw,
        Joint::ShoulderPitch,
        Joint::ProximalPitch,
        Joint::DistalPitch,
        Joint::HandYaw,
        Joint::ScoopYaw,
        Joint::AntennaPan,
        Joint::AntennaTilt,
        Joint::Grinder,
    ];

    fn props(&self) -> JointProps {
        match self {
            Self::ShoulderYaw => JointProps("j_shou_yaw", "ShoulderYaw", 60.0, 80.0),
            Self::ShoulderPitch => JointProps("j_shou_pitch", "ShoulderPitch", 60.0, 80.0),
            Self::ProximalPitch => JointProps("j_prox_pitch", "ProximalPitch", 60.0, 80.0),
            Self::DistalPitch => JointProps("j_dist_pitch", "DistalPitch", 60.0, 80.0),
            Self::HandYaw => JointProps("j_hand_yaw", "HandYaw", 60.0, 80.0),
            Self::ScoopYaw => JointProps("j_scoop_yaw", "ScoopYaw", 60.0, 80.0),
            Self::AntennaPan => JointProps("j_ant_pan", "AntennaPan", 30.0, 30.0),
            Self::AntennaTilt => JointProps("j_ant_tilt", "AntennaTilt", 30.0, 30.0),
            Self::Grinder => JointProps("j_grinder", "Grinder", 30.0, 30.0),
        }
    }

    /// Name used by the joint-state publisher.
    pub fn middleware_name(&self) -> &'static str {
        self.props().0
    }

    /// Name used by the plan executor.
    pub fn plan_name(&self) -> &'static str {
        self.props().1
    }

    pub fn soft_torque_limit(&self) -> f64 {
        self.props().2
    }

    pub fn hard_torque_limit(&self) -> f64 {
        self.props().3
    }

    pub fn from_middleware_name(name: &str) -> Result<Self, LanderError> {
        Self::ALL
            .into_iter()
            .find(|j| j.middleware_name() == name)
            .ok_or_else(|| LanderError::UnknownJoint(name.to_string()))
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plan_name())
    }
}

impl FromStr for Joint {
    type Err = LanderError;

    /// Accepts either the plan name or the middleware name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|j| j.plan_name() == s)
            .map(Ok)
            .unwrap_or_else(|| Self::from_middleware_name(s))
    }
}

/// One entry of a joint-state batch, keyed by middleware name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub name: String,
    /// Radians.
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
}

impl JointSample {
    pub fn new(name: impl Into<String>, position: f64, velocity: f64, effort: f64) -> Self {
        Self {
            name: name.into(),
            position,
            velocity,
            effort,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JointTelemetry {
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
}

/// Partial power reading; `None` fields keep their previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub voltage: Option<f64>,
    pub remaining_useful_life: Option<f64>,
    pub battery_temperature: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerState {
    /// State of charge.
    pub voltage: f64,
    pub remaining_useful_life: f64,
    pub battery_temperature: f64,
}

impl Default for PowerState {
    fn default() -> Self {
        Self {
            voltage: f64::NAN,
            remaining_useful_life: f64::NAN,
            battery_temperature: f64::NAN,
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    joints: HashMap<Joint, JointTelemetry>,
    hard_limit: BTreeSet<&'static str>,
    soft_limit: BTreeSet<&'static str>,
    power: PowerState,
    ground_found: bool,
    ground_position: f64,
}

/// Last known joint, power and guarded-move telemetry.
pub struct TelemetryTable {
    table: Mutex<Table>,
    emitter: Arc<LanderEventEmitter>,
}

impl TelemetryTable {
    pub fn new(emitter: Arc<LanderEventEmitter>) -> Self {
        let table = Table {
            joints: Joint::ALL
                .into_iter()
                .map(|j| (j, JointTelemetry::default()))
                .collect(),
            ..Table::default()
        };
        Self {
            table: Mutex::new(table),
            emitter,
        }
    }

    /// Store one sample. Unknown joints are logged and skipped.
    pub fn record_joint(&self, sample: &JointSample) -> Option<(Joint, JointTelemetry)> {
        let joint = match Joint::from_middleware_name(&sample.name) {
            Ok(joint) => joint,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };
        let telemetry = JointTelemetry {
            position: sample.position,
            velocity: sample.velocity,
            effort: sample.effort,
        };

        {
            let mut table = self.table.lock().expect("telemetry table poisoned");
            table.joints.insert(joint, telemetry);

            let effort = sample.effort.abs();
            let name = joint.plan_name();
            // Crossing the hard limit leaves the soft flag as it was.
            if effort >= joint.hard_torque_limit() {
                table.hard_limit.insert(name);
            } else if effort >= joint.soft_torque_limit() {
                table.soft_limit.insert(name);
            } else {
                table.hard_limit.remove(name);
                table.soft_limit.remove(name);
            }
        }

        self.emitter.notify_joint_update(joint, &telemetry);
        Some((joint, telemetry))
    }

    pub fn record_power(&self, sample: &PowerSample) -> PowerState {
        let power = {
            let mut table = self.table.lock().expect("telemetry table poisoned");
            if let Some(v) = sample.voltage {
                table.power.voltage = v;
            }
            if let Some(v) = sample.remaining_useful_life {
                table.power.remaining_useful_life = v;
            }
            if let Some(v) = sample.battery_temperature {
                table.power.battery_temperature = v;
            }
            table.power
        };
        self.emitter.notify_power_update(&power);
        power
    }

    pub fn record_ground_result(&self, found: bool, position: f64) {
        {
            let mut table = self.table.lock().expect("telemetry table poisoned");
            table.ground_found = found;
            table.ground_position = position;
        }
        self.emitter.notify_ground_result(found, position);
    }

    fn read<T>(&self, f: impl FnOnce(&Table) -> T) -> T {
        f(&self.table.lock().expect("telemetry table poisoned"))
    }

    pub fn joint(&self, joint: Joint) -> JointTelemetry {
        self.read(|t| t.joints.get(&joint).copied().unwrap_or_default())
    }

    pub fn pan_velocity(&self) -> f64 {
        self.joint(Joint::AntennaPan).velocity
    }

    pub fn tilt_velocity(&self) -> f64 {
        self.joint(Joint::AntennaTilt).velocity
    }

    pub fn power(&self) -> PowerState {
        self.read(|t| t.power)
    }

    pub fn voltage(&self) -> f64 {
        self.read(|t| t.power.voltage)
    }

    pub fn remaining_useful_life(&self) -> f64 {
        self.read(|t| t.power.remaining_useful_life)
    }

    pub fn battery_temperature(&self) -> f64 {
        self.read(|t| t.power.battery_temperature)
    }

    pub fn ground_found(&self) -> bool {
        self.read(|t| t.ground_found)
    }

    pub fn ground_position(&self) -> f64 {
        self.read(|t| t.ground_position)
    }

    pub fn hard_torque_limit_reached(&self, plan_name: &str) -> bool {
        self.read(|t| t.hard_limit.contains(plan_name))
    }

    pub fn soft_torque_limit_reached(&self, plan_name: &str) -> bool {
        self.read(|t| t.soft_limit.contains(plan_name))
    }

    /// Plan names currently at or above their hard torque limit.
    pub fn hard_limited(&self) -> Vec<&'static str> {
        self.read(|t| t.hard_limit.iter().copied().collect())
    }

    /// Plan names currently at or above their soft torque limit.
    pub fn soft_limited(&self) -> Vec<&'static str> {
        self.read(|t| t.soft_limit.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TelemetryTable {
        TelemetryTable::new(Arc::new(LanderEventEmitter::new()))
    }

    #[test]
    fn test_torque_limit_membership() {
        let table = table();

        table.record_joint(&JointSample::new("j_shou_pitch", 0.1, 0.0, 65.0));
        assert!(table.soft_torque_limit_reached("ShoulderPitch"));
        assert!(!table.hard_torque_limit_reached("ShoulderPitch"));

        table.record_joint(&JointSample::new("j_shou_pitch", 0.1, 0.0, 85.0));
        assert!(table.hard_torque_limit_reached("ShoulderPitch"));
        assert!(table.soft_torque_limit_reached("ShoulderPitch"));

        table.record_joint(&JointSample::new("j_shou_pitch", 0.1, 0.0, 10.0));
        assert!(!table.hard_torque_limit_reached("ShoulderPitch"));
        assert!(!table.soft_torque_limit_reached("ShoulderPitch"));
    }

    #[test]
    fn test_negative_effort_uses_magnitude() {
        let table = table();
        table.record_joint(&JointSample::new("j_grinder", 0.0, 0.0, -31.0));
        assert!(table.hard_torque_limit_reached("Grinder"));
        assert_eq!(table.hard_limited(), vec!["Grinder"]);
    }

    #[test]
    fn test_unknown_joint_skipped() {
        let table = table();
        assert!(table
            .record_joint(&JointSample::new("j_wheel", 1.0, 1.0, 100.0))
            .is_none());
        assert!(table.hard_limited().is_empty());
    }

    #[test]
    fn test_joint_values_recorded() {
        let table = table();
        let (joint, telemetry) = table
            .record_joint(&JointSample::new("j_ant_tilt", 0.5, -0.25, 1.0))
            .unwrap();
        assert_eq!(joint, Joint::AntennaTilt);
        assert_eq!(telemetry.position, 0.5);
        assert_eq!(table.tilt_velocity(), -0.25);
        assert_eq!(table.pan_velocity(), 0.0);
    }

    #[test]
    fn test_power_defaults_to_nan_and_merges() {
        let table = table();
        assert!(table.voltage().is_nan());
        assert!(table.remaining_useful_life().is_nan());

        table.record_power(&PowerSample {
            voltage: Some(0.92),
            ..PowerSample::default()
        });
        table.record_power(&PowerSample {
            battery_temperature: Some(21.5),
            ..PowerSample::default()
        });
        assert_eq!(table.voltage(), 0.92);
        assert_eq!(table.battery_temperature(), 21.5);
        assert!(table.remaining_useful_life().is_nan());
    }

    #[test]
    fn test_ground_result() {
        let table = table();
        assert!(!table.ground_found());
        table.record_ground_result(true, -0.155);
        assert!(table.ground_found());
        assert_eq!(table.ground_position(), -0.155);
    }

    #[test]
    fn test_joint_name_lookup() {
        assert_eq!("ScoopYaw".parse::<Joint>().unwrap(), Joint::ScoopYaw);
        assert_eq!("j_hand_yaw".parse::<Joint>().unwrap(), Joint::HandYaw);
        assert!(matches!(
            Joint::from_middleware_name("nope"),
            Err(LanderError::UnknownJoint(_))
        ));
    }
}
