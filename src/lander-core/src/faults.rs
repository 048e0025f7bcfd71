// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Edge-triggered fault tracking.
//!
//! Each hardware subsystem reports its faults as a bitmask snapshot. The
//! tracker keeps one asserted flag per known fault and only logs (and
//! notifies) when a flag flips.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::LanderError;
use crate::events::LanderEventEmitter;

/// Subsystem reporting its own fault bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultDomain {
    System,
    Arm,
    Power,
    PanTilt,
}

const SYSTEM_FAULTS: &[(&str, u64)] = &[
    ("SYSTEM", 1),
    ("ARM_GOAL_ERROR", 2),
    ("ARM_EXECUTION_ERROR", 4),
    ("TASK_GOAL_ERROR", 8),
    ("CAMERA_GOAL_ERROR", 16),
    ("CAMERA_EXECUTION_ERROR", 32),
    ("PT_GOAL_ERROR", 64),
    ("PT_EXECUTION_ERROR", 128),
    ("LANDER_EXECUTION_ERROR", 256),
    ("POWER_EXECUTION_ERROR", 512),
];

const ARM_FAULTS: &[(&str, u64)] = &[
    ("HARDWARE", 1),
    ("TRAJECTORY_GENERATION", 2),
    ("COLLISION", 4),
    ("E_STOP", 8),
    ("POSITION_LIMIT", 16),
    ("TORQUE_LIMIT", 32),
    ("VELOCITY_LIMIT", 64),
    ("NO_FORCE_DATA", 128),
];

const POWER_FAULTS: &[(&str, u64)] = &[
    ("HARDWARE", 1),
    ("LOW_STATE_OF_CHARGE", 2),
    ("INSTANTANEOUS_CAPACITY_LOSS", 4),
    ("THERMAL_FAULT", 8),
];

const PAN_TILT_FAULTS: &[(&str, u64)] = &[("HARDWARE", 1), ("JOINT_LIMIT", 2)];

impl FaultDomain {
    pub const ALL: [FaultDomain; 4] = [
        FaultDomain::System,
        FaultDomain::Arm,
        FaultDomain::Power,
        FaultDomain::PanTilt,
    ];

    /// Label used in fault log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Arm => "ARM",
            Self::Power => "POWER",
            Self::PanTilt => "ANTENNA",
        }
    }

    /// Known `(fault name, bit value)` pairs for this domain.
    pub fn catalog(&self) -> &'static [(&'static str, u64)] {
        match self {
            Self::System => SYSTEM_FAULTS,
            Self::Arm => ARM_FAULTS,
            Self::Power => POWER_FAULTS,
            Self::PanTilt => PAN_TILT_FAULTS,
        }
    }
}

impl fmt::Display for FaultDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FaultDomain {
    type Err = LanderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "arm" => Ok(Self::Arm),
            "power" => Ok(Self::Power),
            "pan_tilt" | "pantilt" | "antenna" => Ok(Self::PanTilt),
            _ => Err(LanderError::UnknownFaultDomain(s.to_string())),
        }
    }
}

/// A single fault flag flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultTransition {
    pub domain: FaultDomain,
    pub name: &'static str,
    pub asserted: bool,
}

#[derive(Debug)]
struct FaultEntry {
    name: &'static str,
    bit: u64,
    asserted: bool,
}

pub struct FaultTracker {
    domains: HashMap<FaultDomain, Mutex<Vec<FaultEntry>>>,
    emitter: Arc<LanderEventEmitter>,
}

impl FaultTracker {
    pub fn new(emitter: Arc<LanderEventEmitter>) -> Self {
        let domains = FaultDomain::ALL
            .into_iter()
            .map(|domain| {
                let entries = domain
                    .catalog()
                    .iter()
                    .map(|&(name, bit)| FaultEntry {
                        name,
                        bit,
                        asserted: false,
                    })
                    .collect();
                (domain, Mutex::new(entries))
            })
            .collect();
        Self { domains, emitter }
    }

    /// Apply a new bitmask snapshot for `domain` and return the flags that flipped.
    pub fn update(&self, domain: FaultDomain, bitmask: u64) -> Vec<FaultTransition> {
        let Some(entries) = self.domains.get(&domain) else {
            return Vec::new();
        };
        let mut entries = entries.lock().expect("fault table poisoned");
        let mut transitions = Vec::new();

        for entry in entries.iter_mut() {
            let hit = bitmask & entry.bit == entry.bit;
            if !entry.asserted && hit {
                error!("{} ERROR: {}", domain.label(), entry.name);
            } else if entry.asserted && !hit {
                info!("RESOLVED {} ERROR: {}", domain.label(), entry.name);
            } else {
                continue;
            }
            entry.asserted = hit;
            transitions.push(FaultTransition {
                domain,
                name: entry.name,
                asserted: hit,
            });
        }
        drop(entries);

        for transition in &transitions {
            self.emitter.notify_fault_change(transition);
        }
        transitions
    }

    /// Asserted state of a named fault, or `None` if the domain has no such fault.
    pub fn is_asserted(&self, domain: FaultDomain, name: &str) -> Option<bool> {
        let entries = self.domains.get(&domain)?;
        let entries = entries.lock().expect("fault table poisoned");
        entries.iter().find(|e| e.name == name).map(|e| e.asserted)
    }

    /// Names of the currently asserted faults in `domain`, in catalog order.
    pub fn asserted(&self, domain: FaultDomain) -> Vec<&'static str> {
        self.domains
            .get(&domain)
            .map(|entries| {
                entries
                    .lock()
                    .expect("fault table poisoned")
                    .iter()
                    .filter(|e| e.asserted)
                    .map(|e| e.name)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn any_asserted(&self, domain: FaultDomain) -> bool {
        !self.asserted(domain).is_empty()
    }
}
