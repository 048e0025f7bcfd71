// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The lander core object.
//!
//! `Lander` owns the registry, the fault and telemetry tables, the pan/tilt
//! trackers and the set of in-flight dispatch tasks. Command entry points are
//! fire-and-forget: they return whether the command was admitted and report
//! completion later through the status callback.

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::backend::LanderBackend;
use crate::command::{Goal, LanderCommand, Point};
use crate::completion::{Axis, PanTiltTracker, SampleVerdict};
use crate::dispatch::Dispatcher;
use crate::error::LanderError;
use crate::events::{LanderEventEmitter, LanderListener, ListenerId};
use crate::faults::{FaultDomain, FaultTracker, FaultTransition};
use crate::operation::{CommandId, Operation};
use crate::policies::LanderPolicies;
use crate::registry::{OperationRegistry, RunState, StatusCallback};
use crate::telemetry::{Joint, JointSample, JointTelemetry, PowerSample, PowerState, TelemetryTable};

pub struct Lander {
    backend: Arc<dyn LanderBackend>,
    policies: LanderPolicies,
    emitter: Arc<LanderEventEmitter>,
    registry: Arc<OperationRegistry>,
    faults: FaultTracker,
    telemetry: Arc<TelemetryTable>,
    pan: Arc<PanTiltTracker>,
    tilt: Arc<PanTiltTracker>,
    dispatcher: Dispatcher,
    runtime: Handle,
    tasks: Mutex<JoinSet<()>>,
}

impl Lander {
    /// Build the core around `backend`. Must be called from within a tokio
    /// runtime; dispatch tasks are spawned onto that runtime.
    pub fn new(backend: Arc<dyn LanderBackend>, policies: LanderPolicies) -> Result<Self, LanderError> {
        let runtime = Handle::try_current().map_err(|_| LanderError::NoRuntime)?;
        let emitter = Arc::new(LanderEventEmitter::new());
        let registry = Arc::new(OperationRegistry::new(Arc::clone(&emitter)));
        let telemetry = Arc::new(TelemetryTable::new(Arc::clone(&emitter)));
        let tracker = |axis| {
            Arc::new(PanTiltTracker::new(
                axis,
                policies.angle_tolerance_deg,
                policies.pan_tilt_timeout,
                policies.report_action_failures,
            ))
        };
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&telemetry), policies);

        info!("Lander core using backend '{}'", backend.info().name);
        Ok(Self {
            backend,
            policies,
            faults: FaultTracker::new(Arc::clone(&emitter)),
            emitter,
            registry,
            telemetry,
            pan: tracker(Axis::Pan),
            tilt: tracker(Axis::Tilt),
            dispatcher,
            runtime,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    pub fn policies(&self) -> &LanderPolicies {
        &self.policies
    }

    pub fn backend_name(&self) -> &str {
        &self.backend.info().name
    }

    pub fn set_command_status_callback(&self, callback: StatusCallback) {
        self.registry.set_status_callback(callback);
    }

    pub fn register_listener(&self, listener: Arc<dyn LanderListener>) -> ListenerId {
        self.emitter.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        self.emitter.unregister(id);
    }

    /// Wait for every action server to connect, returning the operations
    /// whose server did not.
    pub async fn wait_for_servers(&self) -> Vec<Operation> {
        let mut missing = Vec::new();
        for op in Operation::actions() {
            let connected = match self.backend.action_client(op) {
                Some(client) => client.wait_for_server(self.policies.server_timeout).await,
                None => false,
            };
            if connected {
                debug!("{} action server connected", op);
            } else {
                error!("{} action server did not connect!", op);
                missing.push(op);
            }
        }
        missing
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Admit `command` and start it in the background.
    ///
    /// Returns `false` when the operation is already running; the command is
    /// then dropped without a status report.
    pub fn submit(&self, command: LanderCommand, id: Option<CommandId>) -> bool {
        let op = command.operation();
        if !self.registry.admit(op, id) {
            return false;
        }

        match command {
            LanderCommand::Action(goal) => {
                let client = self.backend.action_client(op);
                let dispatcher = self.dispatcher.clone();
                self.spawn(async move {
                    dispatcher.run_action(op, goal, client, id).await;
                });
            }
            LanderCommand::Antenna { axis, degrees } => {
                let tracker = Arc::clone(self.tracker(axis));
                tracker.arm(id, degrees, Instant::now());
                let radians = degrees.to_radians();
                info!("Starting {}: {} degrees ({} radians)", op, degrees, radians);

                let backend = Arc::clone(&self.backend);
                let dispatcher = self.dispatcher.clone();
                self.spawn(async move {
                    dispatcher
                        .run_publisher(op, id, move || {
                            let published = backend.command_antenna(axis, radians);
                            if published.is_err() {
                                tracker.disarm(id);
                            }
                            published
                        })
                        .await;
                });
            }
            LanderCommand::TakePicture => {
                let backend = Arc::clone(&self.backend);
                let dispatcher = self.dispatcher.clone();
                self.spawn(async move {
                    dispatcher
                        .run_publisher(op, id, move || backend.trigger_image())
                        .await;
                });
            }
        }
        true
    }

    pub fn guarded_move(
        &self,
        start: Point,
        normal: Point,
        search_distance: f64,
        id: Option<CommandId>,
    ) -> bool {
        self.submit(
            Goal::GuardedMove {
                start,
                normal,
                search_distance,
            }
            .into(),
            id,
        )
    }

    pub fn dig_circular(
        &self,
        x: f64,
        y: f64,
        depth: f64,
        ground_position: f64,
        parallel: bool,
        id: Option<CommandId>,
    ) -> bool {
        self.submit(
            Goal::DigCircular {
                x,
                y,
                depth,
                ground_position,
                parallel,
            }
            .into(),
            id,
        )
    }

    pub fn dig_linear(
        &self,
        x: f64,
        y: f64,
        depth: f64,
        length: f64,
        ground_position: f64,
        id: Option<CommandId>,
    ) -> bool {
        self.submit(
            Goal::DigLinear {
                x,
                y,
                depth,
                length,
                ground_position,
            }
            .into(),
            id,
        )
    }

    pub fn deliver(&self, x: f64, y: f64, z: f64, id: Option<CommandId>) -> bool {
        self.submit(
            Goal::Deliver {
                target: Point::new(x, y, z),
            }
            .into(),
            id,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn grind(
        &self,
        x: f64,
        y: f64,
        depth: f64,
        length: f64,
        parallel: bool,
        ground_position: f64,
        id: Option<CommandId>,
    ) -> bool {
        self.submit(
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
        )
    }

    pub fn stow(&self, id: Option<CommandId>) -> bool {
        self.submit(Goal::Stow.into(), id)
    }

    pub fn unstow(&self, id: Option<CommandId>) -> bool {
        self.submit(Goal::Unstow.into(), id)
    }

    pub fn owlat_stow(&self, id: Option<CommandId>) -> bool {
        self.submit(Goal::OwlatStow.into(), id)
    }

    pub fn owlat_unstow(&self, id: Option<CommandId>) -> bool {
        self.submit(Goal::OwlatUnstow.into(), id)
    }

    pub fn pan_antenna(&self, degrees: f64, id: Option<CommandId>) -> bool {
        self.submit(
            LanderCommand::Antenna {
                axis: Axis::Pan,
                degrees,
            },
            id,
        )
    }

    pub fn tilt_antenna(&self, degrees: f64, id: Option<CommandId>) -> bool {
        self.submit(
            LanderCommand::Antenna {
                axis: Axis::Tilt,
                degrees,
            },
            id,
        )
    }

    pub fn take_picture(&self, id: Option<CommandId>) -> bool {
        self.submit(LanderCommand::TakePicture, id)
    }

    // ---------------------------------------------------------------------
    // Ingest
    // ---------------------------------------------------------------------

    pub fn on_joint_states(&self, samples: &[JointSample]) {
        self.on_joint_states_at(samples, Instant::now());
    }

    /// Record a joint-state batch observed at `now` and feed the antenna
    /// samples to the pan/tilt trackers.
    pub fn on_joint_states_at(&self, samples: &[JointSample], now: Instant) {
        for sample in samples {
            let Some((joint, telemetry)) = self.telemetry.record_joint(sample) else {
                continue;
            };
            let tracker = match joint {
                Joint::AntennaPan => &self.pan,
                Joint::AntennaTilt => &self.tilt,
                _ => continue,
            };
            let verdict = tracker.observe(&self.registry, telemetry.position.to_degrees(), now);
            if verdict != SampleVerdict::Ignored && verdict != SampleVerdict::Pending {
                debug!("{} sample verdict: {:?}", tracker.axis(), verdict);
            }
        }
    }

    pub fn on_fault_snapshot(&self, domain: FaultDomain, bitmask: u64) -> Vec<FaultTransition> {
        self.faults.update(domain, bitmask)
    }

    pub fn on_power(&self, sample: &PowerSample) -> PowerState {
        self.telemetry.record_power(sample)
    }

    /// A camera image arrived; completes a running picture capture.
    pub fn on_camera_image(&self) -> bool {
        self.registry.finish_if_running(Operation::TakePicture)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Whether the operation named `name` is running. Unknown names are
    /// logged and reported as not running.
    pub fn running(&self, name: &str) -> bool {
        self.registry.running_by_name(name)
    }

    pub fn is_running(&self, op: Operation) -> bool {
        self.registry.is_running(op)
    }

    pub fn state(&self, op: Operation) -> RunState {
        self.registry.state(op)
    }

    pub fn pan_degrees(&self) -> f64 {
        self.pan.current()
    }

    pub fn tilt_degrees(&self) -> f64 {
        self.tilt.current()
    }

    pub fn pan_velocity(&self) -> f64 {
        self.telemetry.pan_velocity()
    }

    pub fn tilt_velocity(&self) -> f64 {
        self.telemetry.tilt_velocity()
    }

    pub fn joint(&self, joint: Joint) -> JointTelemetry {
        self.telemetry.joint(joint)
    }

    pub fn voltage(&self) -> f64 {
        self.telemetry.voltage()
    }

    pub fn remaining_useful_life(&self) -> f64 {
        self.telemetry.remaining_useful_life()
    }

    pub fn battery_temperature(&self) -> f64 {
        self.telemetry.battery_temperature()
    }

    pub fn ground_found(&self) -> bool {
        self.telemetry.ground_found()
    }

    pub fn ground_position(&self) -> f64 {
        self.telemetry.ground_position()
    }

    pub fn hard_torque_limit_reached(&self, joint_name: &str) -> bool {
        self.telemetry.hard_torque_limit_reached(joint_name)
    }

    pub fn soft_torque_limit_reached(&self, joint_name: &str) -> bool {
        self.telemetry.soft_torque_limit_reached(joint_name)
    }

    pub fn fault_asserted(&self, domain: FaultDomain, name: &str) -> Option<bool> {
        self.faults.is_asserted(domain, name)
    }

    pub fn asserted_faults(&self, domain: FaultDomain) -> Vec<&'static str> {
        self.faults.asserted(domain)
    }

    pub fn any_fault(&self, domain: FaultDomain) -> bool {
        self.faults.any_asserted(domain)
    }

    pub fn snapshot(&self) -> LanderSnapshot {
        LanderSnapshot {
            backend: self.backend.info().name.clone(),
            operations: self
                .registry
                .snapshot()
                .into_iter()
                .map(|(op, state)| OperationStatus {
                    op,
                    running: state.is_running(),
                    id: match state {
                        RunState::Running(id) => id,
                        RunState::Idle => None,
                    },
                })
                .collect(),
            faults: FaultDomain::ALL
                .into_iter()
                .map(|domain| DomainFaults {
                    domain,
                    asserted: self.faults.asserted(domain),
                })
                .collect(),
            pan_degrees: self.pan_degrees(),
            tilt_degrees: self.tilt_degrees(),
            power: self.telemetry.power(),
            ground_found: self.ground_found(),
            ground_position: self.ground_position(),
            hard_torque_limits: self.telemetry.hard_limited(),
            soft_torque_limits: self.telemetry.soft_limited(),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Wait for every in-flight dispatch task to finish.
    pub async fn shutdown(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().expect("task set poisoned"));
        if !tasks.is_empty() {
            info!("Waiting for {} dispatch task(s)", tasks.len());
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("Dispatch task failed: {}", e);
            }
        }
    }

    fn tracker(&self, axis: Axis) -> &Arc<PanTiltTracker> {
        match axis {
            Axis::Pan => &self.pan,
            Axis::Tilt => &self.tilt,
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().expect("task set poisoned");
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res {
                error!("Dispatch task failed: {}", e);
            }
        }
        tasks.spawn_on(task, &self.runtime);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationStatus {
    pub op: Operation,
    pub running: bool,
    pub id: Option<CommandId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainFaults {
    pub domain: FaultDomain,
    pub asserted: Vec<&'static str>,
}

/// Point-in-time view of the lander state, as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct LanderSnapshot {
    pub backend: String,
    pub operations: Vec<OperationStatus>,
    pub faults: Vec<DomainFaults>,
    pub pan_degrees: f64,
    pub tilt_degrees: f64,
    pub power: PowerState,
    pub ground_found: bool,
    pub ground_position: f64,
    pub hard_torque_limits: Vec<&'static str>,
    pub soft_torque_limits: Vec<&'static str>,
}
