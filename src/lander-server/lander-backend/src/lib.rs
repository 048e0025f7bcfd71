// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;
use std::sync::Arc;

use lander_app::normalize_name;
use lander_core::{FaultDomain, JointSample, Lander, LanderBackend, PowerSample};
use lander_core::DynResult;
use tokio::sync::mpsc;

pub mod sim;

pub use sim::{SimConfig, SimLander};

/// Telemetry produced by a backend, to be fed into the lander core.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    JointStates(Vec<JointSample>),
    CameraImage,
    Faults { domain: FaultDomain, bitmask: u64 },
    Power(PowerSample),
}

impl TelemetryEvent {
    /// Hand the event to the matching ingest method of `lander`.
    pub fn deliver_to(self, lander: &Lander) {
        match self {
            Self::JointStates(samples) => lander.on_joint_states(&samples),
            Self::CameraImage => {
                lander.on_camera_image();
            }
            Self::Faults { domain, bitmask } => {
                lander.on_fault_snapshot(domain, bitmask);
            }
            Self::Power(sample) => {
                lander.on_power(&sample);
            }
        }
    }
}

/// Options for instantiating a backend.
#[derive(Debug, Clone)]
pub enum BackendAccess {
    Sim(SimConfig),
}

/// A running backend together with its telemetry stream.
pub struct BackendHandle {
    pub backend: Arc<dyn LanderBackend>,
    pub events: mpsc::Receiver<TelemetryEvent>,
}

pub type BackendFactory = fn(BackendAccess) -> DynResult<BackendHandle>;

/// Context for registering and instantiating lander backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "sim").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(normalize_name(name), factory);
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate the backend registered as `name`.
    pub fn build_backend(&self, name: &str, access: BackendAccess) -> DynResult<BackendHandle> {
        let factory = self
            .factories
            .get(&normalize_name(name))
            .ok_or_else(|| format!("Unknown lander backend: {}", name))?;
        factory(access)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all built-in backends on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("sim", sim_factory);
}

fn sim_factory(access: BackendAccess) -> DynResult<BackendHandle> {
    match access {
        BackendAccess::Sim(config) => {
            let (backend, events) = SimLander::start(config)?;
            Ok(BackendHandle { backend, events })
        }
    }
}
