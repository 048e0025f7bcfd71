// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated lander backend for development and testing.
//!
//! Every action server accepts its goal and succeeds after a fixed duration.
//! The antenna slews toward its set-points at a fixed rate and the joint
//! states, power readings and (all-clear) fault snapshots are published on
//! the telemetry channel. No hardware or middleware required.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, warn};

use lander_core::backend::{BackendInfo, GoalFeedback};
use lander_core::{
    ActionClient, Axis, FaultDomain, Goal, GoalCallbacks, GoalResult, GoalState, Joint,
    JointSample, LanderBackend, LanderError, Operation, Point, PowerSample,
};
use lander_core::DynResult;

use crate::TelemetryEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Simulation parameters, read from the `[sim]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Time every action takes to succeed.
    pub action_duration_ms: u64,
    /// Height of the terrain under the arm, in the lander frame (meters).
    pub ground_z: f64,
    /// Antenna slew rate in degrees per second.
    pub slew_rate_deg_s: f64,
    pub joint_state_interval_ms: u64,
    /// Period of fault and power snapshots; 0 disables them.
    pub fault_interval_ms: u64,
    /// Delay between an image trigger and the image arriving.
    pub image_delay_ms: u64,
    /// Delay before each action server reports itself connected.
    pub connect_delay_ms: u64,
    /// Operations whose action server is not available.
    pub disconnected: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            action_duration_ms: 2000,
            ground_z: -0.155,
            slew_rate_deg_s: 15.0,
            joint_state_interval_ms: 100,
            fault_interval_ms: 1000,
            image_delay_ms: 500,
            connect_delay_ms: 0,
            disconnected: Vec::new(),
        }
    }
}

/// Antenna angles in degrees.
#[derive(Debug, Default)]
struct Antenna {
    pan: f64,
    tilt: f64,
    pan_target: f64,
    tilt_target: f64,
}

fn approach(current: f64, target: f64, max_step: f64) -> f64 {
    let delta = target - current;
    if delta.abs() <= max_step {
        target
    } else {
        current + max_step.copysign(delta)
    }
}

pub struct SimLander {
    info: BackendInfo,
    config: SimConfig,
    clients: HashMap<Operation, Arc<SimActionClient>>,
    antenna: Arc<Mutex<Antenna>>,
    events: mpsc::Sender<TelemetryEvent>,
    runtime: Handle,
}

impl SimLander {
    /// Start the simulation on the current tokio runtime.
    ///
    /// Telemetry stops once the returned receiver is dropped.
    pub fn start(config: SimConfig) -> DynResult<(Arc<Self>, mpsc::Receiver<TelemetryEvent>)> {
        let runtime =
            Handle::try_current().map_err(|_| "sim backend requires a tokio runtime".to_string())?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut disconnected = Vec::new();
        for name in &config.disconnected {
            match name.parse::<Operation>() {
                Ok(op) => disconnected.push(op),
                Err(e) => warn!("sim: ignoring disconnected entry: {}", e),
            }
        }
        let clients = Operation::actions()
            .filter(|op| !disconnected.contains(op))
            .map(|op| {
                let client = SimActionClient {
                    op,
                    duration: Duration::from_millis(config.action_duration_ms),
                    connect_delay: Duration::from_millis(config.connect_delay_ms),
                    ground_z: config.ground_z,
                    runtime: runtime.clone(),
                };
                (op, Arc::new(client))
            })
            .collect();

        let antenna = Arc::new(Mutex::new(Antenna::default()));
        runtime.spawn(run_telemetry(config.clone(), Arc::clone(&antenna), tx.clone()));

        let sim = Arc::new(Self {
            info: BackendInfo {
                name: "sim".to_string(),
                description: "Simulated lander".to_string(),
            },
            config,
            clients,
            antenna,
            events: tx,
            runtime,
        });
        Ok((sim, rx))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current antenna angles `(pan, tilt)` in degrees.
    pub fn antenna_degrees(&self) -> (f64, f64) {
        let antenna = self.antenna.lock().expect("antenna state poisoned");
        (antenna.pan, antenna.tilt)
    }
}

impl LanderBackend for SimLander {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn action_client(&self, op: Operation) -> Option<Arc<dyn ActionClient>> {
        self.clients
            .get(&op)
            .map(|client| Arc::clone(client) as Arc<dyn ActionClient>)
    }

    fn command_antenna(&self, axis: Axis, radians: f64) -> DynResult<()> {
        if !radians.is_finite() {
            return Err(format!("invalid {} set-point: {}", axis, radians).into());
        }
        let mut antenna = self.antenna.lock().expect("antenna state poisoned");
        match axis {
            Axis::Pan => antenna.pan_target = radians.to_degrees(),
            Axis::Tilt => antenna.tilt_target = radians.to_degrees(),
        }
        Ok(())
    }

    fn trigger_image(&self) -> DynResult<()> {
        if self.events.is_closed() {
            return Err(LanderError::BackendUnavailable("camera".to_string()).into());
        }
        let events = self.events.clone();
        let delay = Duration::from_millis(self.config.image_delay_ms);
        self.runtime.spawn(async move {
            sleep(delay).await;
            if events.send(TelemetryEvent::CameraImage).await.is_err() {
                debug!("sim: image dropped, telemetry receiver closed");
            }
        });
        Ok(())
    }
}

async fn run_telemetry(
    config: SimConfig,
    antenna: Arc<Mutex<Antenna>>,
    events: mpsc::Sender<TelemetryEvent>,
) {
    let period = Duration::from_millis(config.joint_state_interval_ms.max(1));
    let max_step = config.slew_rate_deg_s * period.as_secs_f64();
    let mut joints = interval(period);
    joints.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let faults_enabled = config.fault_interval_ms > 0;
    let mut faults = interval(Duration::from_millis(config.fault_interval_ms.max(1)));
    let mut state_of_charge = 1.0_f64;

    loop {
        let event = tokio::select! {
            _ = joints.tick() => {
                let samples = {
                    let mut antenna = antenna.lock().expect("antenna state poisoned");
                    let (pan, tilt) = (antenna.pan, antenna.tilt);
                    antenna.pan = approach(pan, antenna.pan_target, max_step);
                    antenna.tilt = approach(tilt, antenna.tilt_target, max_step);
                    let pan_rate = (antenna.pan - pan).to_radians() / period.as_secs_f64();
                    let tilt_rate = (antenna.tilt - tilt).to_radians() / period.as_secs_f64();
                    joint_states(antenna.pan.to_radians(), pan_rate, antenna.tilt.to_radians(), tilt_rate)
                };
                TelemetryEvent::JointStates(samples)
            }
            _ = faults.tick(), if faults_enabled => {
                for domain in FaultDomain::ALL {
                    if events.send(TelemetryEvent::Faults { domain, bitmask: 0 }).await.is_err() {
                        break;
                    }
                }
                state_of_charge = (state_of_charge - 0.0001).max(0.0);
                TelemetryEvent::Power(PowerSample {
                    voltage: Some(state_of_charge),
                    remaining_useful_life: Some(state_of_charge * 86_400.0),
                    battery_temperature: Some(20.0),
                })
            }
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!("sim: telemetry receiver closed, stopping");
}

fn joint_states(pan: f64, pan_rate: f64, tilt: f64, tilt_rate: f64) -> Vec<JointSample> {
    Joint::ALL
        .into_iter()
        .map(|joint| match joint {
            Joint::AntennaPan => JointSample::new(joint.middleware_name(), pan, pan_rate, 0.0),
            Joint::AntennaTilt => JointSample::new(joint.middleware_name(), tilt, tilt_rate, 0.0),
            _ => JointSample::new(joint.middleware_name(), 0.0, 0.0, 0.0),
        })
        .collect()
}

/// Search along `-normal` from `start` for terrain at height `ground_z`.
fn guarded_move_result(start: Point, normal: Point, search_distance: f64, ground_z: f64) -> GoalResult {
    let end = Point::new(
        start.x - normal.x * search_distance,
        start.y - normal.y * search_distance,
        start.z - normal.z * search_distance,
    );
    let descent = start.z - end.z;
    if descent > 0.0 && end.z <= ground_z && ground_z <= start.z {
        let t = (start.z - ground_z) / descent;
        GoalResult::GuardedMove {
            success: true,
            final_position: Point::new(
                start.x + (end.x - start.x) * t,
                start.y + (end.y - start.y) * t,
                ground_z,
            ),
        }
    } else {
        GoalResult::GuardedMove {
            success: false,
            final_position: end,
        }
    }
}

/// Rough tool position reported as feedback halfway through a goal.
fn feedback_point(goal: &Goal) -> Point {
    match goal {
        Goal::GuardedMove { start, .. } => *start,
        Goal::DigCircular {
            x,
            y,
            ground_position,
            ..
        }
        | Goal::DigLinear {
            x,
            y,
            ground_position,
            ..
        }
        | Goal::Grind {
            x,
            y,
            ground_position,
            ..
        } => Point::new(*x, *y, *ground_position),
        Goal::Deliver { target } => *target,
        Goal::Stow | Goal::Unstow | Goal::OwlatStow | Goal::OwlatUnstow => Point::default(),
    }
}

struct SimActionClient {
    op: Operation,
    duration: Duration,
    connect_delay: Duration,
    ground_z: f64,
    runtime: Handle,
}

impl SimActionClient {
    fn execute(&self, goal: Goal, callbacks: GoalCallbacks) -> DynResult<()> {
        if goal.operation() != self.op {
            return Err(format!("{} server cannot run a {} goal", self.op, goal.operation()).into());
        }
        let GoalCallbacks {
            on_active,
            mut on_feedback,
            on_done,
        } = callbacks;

        let current = feedback_point(&goal);
        let result = match goal {
            Goal::GuardedMove {
                start,
                normal,
                search_distance,
            } => guarded_move_result(start, normal, search_distance, self.ground_z),
            _ => GoalResult::Empty,
        };

        on_active();
        let (op, half) = (self.op, self.duration / 2);
        let rest = self.duration - half;
        self.runtime.spawn(async move {
            sleep(half).await;
            on_feedback(GoalFeedback { current });
            sleep(rest).await;
            debug!("sim: {} goal done", op);
            on_done(GoalState::Succeeded, result);
        });
        Ok(())
    }
}

impl ActionClient for SimActionClient {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn wait_for_server<'a>(
        &'a self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            sleep(self.connect_delay).await;
            true
        })
    }

    fn send_goal<'a>(
        &'a self,
        goal: Goal,
        callbacks: GoalCallbacks,
    ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>> {
        Box::pin(async move { self.execute(goal, callbacks) })
    }
}
