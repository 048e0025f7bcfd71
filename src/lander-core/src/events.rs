// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Lander event notification system.
//!
//! Listeners receive the state the plan executor observes: operation
//! running/finished flags, fault flips and telemetry updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::faults::FaultTransition;
use crate::operation::Operation;
use crate::telemetry::{Joint, JointTelemetry, PowerState};

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Trait for components that want to receive lander events.
///
/// All methods have default no-op implementations, so listeners can
/// selectively override only the events they care about.
///
/// Operation notifications are delivered in transition order with the
/// registry table unlocked. A listener may query the lander from a callback
/// but must not submit or complete operations there.
pub trait LanderListener: Send + Sync {
    /// Called when an operation is admitted (`true`) or leaves the running state.
    fn on_running_change(&self, _op: Operation, _running: bool) {}

    /// Called when an operation completes.
    fn on_finished(&self, _op: Operation) {}

    /// Called when a fault is asserted or resolved.
    fn on_fault_change(&self, _transition: &FaultTransition) {}

    /// Called for every accepted joint sample.
    fn on_joint_update(&self, _joint: Joint, _telemetry: &JointTelemetry) {}

    /// Called when power telemetry changes.
    fn on_power_update(&self, _power: &PowerState) {}

    /// Called when a guarded move reports its ground search result.
    fn on_ground_result(&self, _found: bool, _position: f64) {}
}

/// Manages registered listeners and dispatches events.
pub struct LanderEventEmitter {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn LanderListener>)>>,
}

impl Default for LanderEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl LanderEventEmitter {
    /// Create a new event emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener to receive events.
    /// Returns an ID that can be used to unregister the listener.
    pub fn register(&self, listener: Arc<dyn LanderListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .write()
            .expect("listener table poisoned")
            .push((id, listener));
        id
    }

    /// Unregister a listener by its ID.
    pub fn unregister(&self, id: ListenerId) {
        self.listeners
            .write()
            .expect("listener table poisoned")
            .retain(|(lid, _)| *lid != id);
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().expect("listener table poisoned").len()
    }

    fn each(&self, f: impl Fn(&dyn LanderListener)) {
        // Snapshot first so a listener may (un)register from its callback.
        let listeners: Vec<Arc<dyn LanderListener>> = self
            .listeners
            .read()
            .expect("listener table poisoned")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            f(listener.as_ref());
        }
    }

    pub fn notify_running_change(&self, op: Operation, running: bool) {
        self.each(|l| l.on_running_change(op, running));
    }

    pub fn notify_finished(&self, op: Operation) {
        self.each(|l| l.on_finished(op));
    }

    pub fn notify_fault_change(&self, transition: &FaultTransition) {
        self.each(|l| l.on_fault_change(transition));
    }

    pub fn notify_joint_update(&self, joint: Joint, telemetry: &JointTelemetry) {
        self.each(|l| l.on_joint_update(joint, telemetry));
    }

    pub fn notify_power_update(&self, power: &PowerState) {
        self.each(|l| l.on_power_update(power));
    }

    pub fn notify_ground_result(&self, found: bool, position: f64) {
        self.each(|l| l.on_ground_result(found, position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestListener {
        running: Mutex<Vec<(Operation, bool)>>,
        finished: AtomicBool,
    }

    impl LanderListener for TestListener {
        fn on_running_change(&self, op: Operation, running: bool) {
            self.running.lock().unwrap().push((op, running));
        }

        fn on_finished(&self, _op: Operation) {
            self.finished.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_register_and_notify() {
        let emitter = LanderEventEmitter::new();
        let listener = Arc::new(TestListener::default());
        let id = emitter.register(listener.clone());

        assert_eq!(emitter.listener_count(), 1);

        emitter.notify_running_change(Operation::Stow, true);
        assert_eq!(
            *listener.running.lock().unwrap(),
            vec![(Operation::Stow, true)]
        );
        assert!(!listener.finished.load(Ordering::Relaxed));

        emitter.notify_finished(Operation::Stow);
        assert!(listener.finished.load(Ordering::Relaxed));

        emitter.unregister(id);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_register_from_callback() {
        struct Spawner {
            emitter: Arc<LanderEventEmitter>,
            child: Arc<TestListener>,
        }
        impl LanderListener for Spawner {
            fn on_finished(&self, _op: Operation) {
                self.emitter.register(self.child.clone());
            }
        }

        let emitter = Arc::new(LanderEventEmitter::new());
        let child = Arc::new(TestListener::default());
        emitter.register(Arc::new(Spawner {
            emitter: Arc::clone(&emitter),
            child: child.clone(),
        }));

        emitter.notify_finished(Operation::Deliver);
        assert_eq!(emitter.listener_count(), 2);
        assert!(!child.finished.load(Ordering::Relaxed));
    }

    #[test]
    fn test_multiple_listeners() {
        let emitter = LanderEventEmitter::new();
        let listener1 = Arc::new(TestListener::default());
        let listener2 = Arc::new(TestListener::default());

        emitter.register(listener1.clone());
        emitter.register(listener2.clone());

        emitter.notify_finished(Operation::Grind);

        assert!(listener1.finished.load(Ordering::Relaxed));
        assert!(listener2.finished.load(Ordering::Relaxed));
    }
}
