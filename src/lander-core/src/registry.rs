// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operation registry: admission control and completion marking.
//!
//! One entry per catalog operation, created up front and never removed. The
//! whole table sits behind a single mutex; contention is limited to the
//! handful of catalog entries and the lock is never held across an await.
//! Listeners are notified after the table lock is released, so they may
//! query the registry from a callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tracing::{error, warn};

use crate::events::LanderEventEmitter;
use crate::operation::{CommandId, Operation};

/// Callback reporting `(command id, success)` back to the plan executor.
pub type StatusCallback = Arc<dyn Fn(CommandId, bool) + Send + Sync>;

/// Run state of a single operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "id")]
pub enum RunState {
    #[default]
    Idle,
    /// Running on behalf of a command. `None` means no issuer is waiting
    /// for a status report.
    Running(Option<CommandId>),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

pub struct OperationRegistry {
    table: Mutex<HashMap<Operation, RunState>>,
    /// Serializes transitions with their notifications. Always taken before
    /// `table`, and released before the status callback runs.
    order: Mutex<()>,
    emitter: Arc<LanderEventEmitter>,
    status: RwLock<Option<StatusCallback>>,
}

impl OperationRegistry {
    pub fn new(emitter: Arc<LanderEventEmitter>) -> Self {
        let table = Operation::ALL
            .into_iter()
            .map(|op| (op, RunState::Idle))
            .collect();
        Self {
            table: Mutex::new(table),
            order: Mutex::new(()),
            emitter,
            status: RwLock::new(None),
        }
    }

    /// Install the callback used to report command completion.
    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self.status.write().expect("status callback poisoned") = Some(callback);
    }

    /// Mark `op` running for command `id`.
    ///
    /// Returns `false` without touching any state when `op` is already
    /// running; exactly one of any set of concurrent admits can succeed.
    pub fn admit(&self, op: Operation, id: Option<CommandId>) -> bool {
        let _order = self.order.lock().expect("transition order poisoned");
        {
            let mut table = self.table.lock().expect("operation table poisoned");
            let entry = table.entry(op).or_default();
            if entry.is_running() {
                warn!("{} already running, ignoring duplicate request.", op);
                return false;
            }
            *entry = RunState::Running(id);
        }
        self.emitter.notify_running_change(op, true);
        true
    }

    /// Mark `op` finished and report success for `id`.
    pub fn complete(&self, op: Operation, id: Option<CommandId>) -> bool {
        self.complete_with(op, id, true)
    }

    /// Mark `op` finished and report `success` for `id`.
    ///
    /// Completing an idle operation, or one running on behalf of another
    /// command, is a protocol violation: it is logged and otherwise ignored,
    /// so no command can be reported twice.
    pub fn complete_with(&self, op: Operation, id: Option<CommandId>, success: bool) -> bool {
        {
            let _order = self.order.lock().expect("transition order poisoned");
            if !self.release(op, id, "completion") {
                return false;
            }
            self.emitter.notify_running_change(op, false);
            self.emitter.notify_finished(op);
        }
        // Reported outside the locks so the issuer may resubmit from the callback.
        if let Some(id) = id {
            self.report(id, success);
        }
        true
    }

    /// Complete `op` on behalf of whichever command is running it.
    /// Returns `false` when `op` is idle.
    pub fn finish_if_running(&self, op: Operation) -> bool {
        let id = {
            let _order = self.order.lock().expect("transition order poisoned");
            let id = {
                let mut table = self.table.lock().expect("operation table poisoned");
                let entry = table.entry(op).or_default();
                let RunState::Running(id) = *entry else {
                    return false;
                };
                *entry = RunState::Idle;
                id
            };
            self.emitter.notify_running_change(op, false);
            self.emitter.notify_finished(op);
            id
        };
        if let Some(id) = id {
            self.report(id, true);
        }
        true
    }

    /// Return an admitted operation to idle without marking it finished,
    /// reporting failure for `id`. Ignored unless `op` is running for `id`.
    pub fn abort(&self, op: Operation, id: Option<CommandId>) -> bool {
        {
            let _order = self.order.lock().expect("transition order poisoned");
            if !self.release(op, id, "roll back") {
                return false;
            }
            self.emitter.notify_running_change(op, false);
        }
        if let Some(id) = id {
            self.report(id, false);
        }
        true
    }

    pub fn is_running(&self, op: Operation) -> bool {
        self.state(op).is_running()
    }

    /// Look up an operation by its catalog name. Unknown names are logged
    /// and reported as not running.
    pub fn running_by_name(&self, name: &str) -> bool {
        match name.parse::<Operation>() {
            Ok(op) => self.is_running(op),
            Err(e) => {
                error!("running: {}", e);
                false
            }
        }
    }

    pub fn state(&self, op: Operation) -> RunState {
        self.table
            .lock()
            .expect("operation table poisoned")
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    /// Command currently running `op`, if any.
    pub fn command_id(&self, op: Operation) -> Option<CommandId> {
        match self.state(op) {
            RunState::Running(id) => id,
            RunState::Idle => None,
        }
    }

    /// Copy of the whole table in catalog order.
    pub fn snapshot(&self) -> Vec<(Operation, RunState)> {
        let table = self.table.lock().expect("operation table poisoned");
        Operation::ALL
            .into_iter()
            .map(|op| (op, table.get(&op).copied().unwrap_or_default()))
            .collect()
    }

    /// Move `op` from `Running(id)` to idle. Any other state is logged as a
    /// protocol violation and left untouched.
    fn release(&self, op: Operation, id: Option<CommandId>, what: &str) -> bool {
        let mut table = self.table.lock().expect("operation table poisoned");
        let entry = table.entry(op).or_default();
        match *entry {
            RunState::Running(current) if current == id => {
                *entry = RunState::Idle;
                true
            }
            RunState::Running(current) => {
                error!(
                    "{} is running command {:?}, ignoring {} for command {:?}.",
                    op, current, what, id
                );
                false
            }
            RunState::Idle => {
                error!("{} was not running, ignoring {}. Should never happen.", op, what);
                false
            }
        }
    }

    fn report(&self, id: CommandId, success: bool) {
        let callback = self.status.read().expect("status callback poisoned").clone();
        match callback {
            Some(callback) => callback(id, success),
            None => warn!(
                "No command status callback registered, dropping status of command {}",
                id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LanderListener;
    use std::sync::Weak;

    type Reports = Arc<Mutex<Vec<(CommandId, bool)>>>;

    fn registry_with_reports() -> (OperationRegistry, Reports) {
        let registry = OperationRegistry::new(Arc::new(LanderEventEmitter::new()));
        let reports: Reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        registry.set_status_callback(Arc::new(move |id, ok| {
            sink.lock().unwrap().push((id, ok));
        }));
        (registry, reports)
    }

    #[test]
    fn test_all_operations_start_idle() {
        let (registry, _) = registry_with_reports();
        for (op, state) in registry.snapshot() {
            assert_eq!(state, RunState::Idle, "{} should start idle", op);
        }
    }

    #[test]
    fn test_duplicate_admit_keeps_first_id() {
        let (registry, _) = registry_with_reports();
        for op in Operation::ALL {
            assert!(registry.admit(op, Some(CommandId(1))));
            assert!(!registry.admit(op, Some(CommandId(2))));
            assert_eq!(registry.command_id(op), Some(CommandId(1)));
        }
    }

    #[test]
    fn test_dig_linear_lifecycle() {
        let (registry, reports) = registry_with_reports();
        let op = Operation::DigLinear;

        assert!(registry.admit(op, Some(CommandId(7))));
        assert!(!registry.admit(op, Some(CommandId(8))));
        assert_eq!(registry.state(op), RunState::Running(Some(CommandId(7))));

        assert!(registry.complete(op, Some(CommandId(7))));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(7), true)]);
        assert!(!registry.is_running(op));

        assert!(registry.admit(op, Some(CommandId(9))));
    }

    #[test]
    fn test_complete_idle_is_noop() {
        let (registry, reports) = registry_with_reports();
        assert!(registry.admit(Operation::Stow, Some(CommandId(3))));
        assert!(registry.complete(Operation::Stow, Some(CommandId(3))));
        assert!(!registry.complete(Operation::Stow, Some(CommandId(3))));
        assert_eq!(reports.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_id_skips_status_report() {
        let (registry, reports) = registry_with_reports();
        assert!(registry.admit(Operation::Unstow, None));
        assert!(registry.complete(Operation::Unstow, None));
        assert!(reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_abort_reports_failure_without_finish() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl LanderListener for Recorder {
            fn on_running_change(&self, op: Operation, running: bool) {
                self.0.lock().unwrap().push(format!("{}:running={}", op, running));
            }
            fn on_finished(&self, op: Operation) {
                self.0.lock().unwrap().push(format!("{}:finished", op));
            }
        }

        let emitter = Arc::new(LanderEventEmitter::new());
        let recorder = Arc::new(Recorder::default());
        emitter.register(recorder.clone());
        let registry = OperationRegistry::new(emitter);
        let reports: Reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        registry.set_status_callback(Arc::new(move |id, ok| sink.lock().unwrap().push((id, ok))));

        assert!(registry.admit(Operation::Deliver, Some(CommandId(4))));
        assert!(registry.abort(Operation::Deliver, Some(CommandId(4))));
        assert!(!registry.is_running(Operation::Deliver));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(4), false)]);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["Deliver:running=true", "Deliver:running=false"]
        );
    }

    #[test]
    fn test_notifications_in_transition_order() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl LanderListener for Recorder {
            fn on_running_change(&self, op: Operation, running: bool) {
                self.0.lock().unwrap().push(format!("{}:running={}", op, running));
            }
            fn on_finished(&self, op: Operation) {
                self.0.lock().unwrap().push(format!("{}:finished", op));
            }
        }

        let emitter = Arc::new(LanderEventEmitter::new());
        let recorder = Arc::new(Recorder::default());
        emitter.register(recorder.clone());
        let registry = OperationRegistry::new(emitter);

        registry.admit(Operation::Grind, Some(CommandId(1)));
        registry.complete(Operation::Grind, Some(CommandId(1)));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["Grind:running=true", "Grind:running=false", "Grind:finished"]
        );
    }

    #[test]
    fn test_status_callback_may_resubmit() {
        let registry = Arc::new(OperationRegistry::new(Arc::new(LanderEventEmitter::new())));
        let weak = Arc::downgrade(&registry);
        registry.set_status_callback(Arc::new(move |id, _| {
            if let Some(registry) = weak.upgrade() {
                if id == CommandId(1) {
                    assert!(registry.admit(Operation::Stow, Some(CommandId(2))));
                }
            }
        }));

        registry.admit(Operation::Stow, Some(CommandId(1)));
        registry.complete(Operation::Stow, Some(CommandId(1)));
        assert_eq!(registry.command_id(Operation::Stow), Some(CommandId(2)));
    }

    #[test]
    fn test_stale_command_cannot_release_newer_one() {
        let (registry, reports) = registry_with_reports();
        let op = Operation::TakePicture;

        assert!(registry.admit(op, Some(CommandId(3))));
        assert!(registry.finish_if_running(op));
        assert!(registry.admit(op, Some(CommandId(4))));

        assert!(!registry.abort(op, Some(CommandId(3))));
        assert!(!registry.complete_with(op, Some(CommandId(3)), false));
        assert_eq!(registry.state(op), RunState::Running(Some(CommandId(4))));

        assert!(registry.complete(op, Some(CommandId(4))));
        assert_eq!(
            *reports.lock().unwrap(),
            vec![(CommandId(3), true), (CommandId(4), true)]
        );
    }

    #[test]
    fn test_listener_may_query_registry() {
        #[derive(Default)]
        struct Observer {
            registry: Mutex<Weak<OperationRegistry>>,
            seen: Mutex<Vec<(bool, bool)>>,
        }
        impl LanderListener for Observer {
            fn on_running_change(&self, op: Operation, running: bool) {
                let registry = self.registry.lock().unwrap().upgrade().unwrap();
                self.seen.lock().unwrap().push((running, registry.is_running(op)));
            }
        }

        let emitter = Arc::new(LanderEventEmitter::new());
        let observer = Arc::new(Observer::default());
        emitter.register(observer.clone());
        let registry = Arc::new(OperationRegistry::new(emitter));
        *observer.registry.lock().unwrap() = Arc::downgrade(&registry);

        registry.admit(Operation::Unstow, Some(CommandId(1)));
        registry.complete(Operation::Unstow, Some(CommandId(1)));
        assert_eq!(*observer.seen.lock().unwrap(), vec![(true, true), (false, false)]);
    }

    #[test]
    fn test_concurrent_admits_single_winner() {
        let (registry, _) = registry_with_reports();
        let winners = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let registry = &registry;
                    s.spawn(move || registry.admit(Operation::Grind, Some(CommandId(i))))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|admitted| *admitted)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_running_by_name() {
        let (registry, _) = registry_with_reports();
        registry.admit(Operation::GuardedMove, Some(CommandId(5)));
        assert!(registry.running_by_name("Guarded_move"));
        assert!(!registry.running_by_name("DigLinear"));
        assert!(!registry.running_by_name("Moonwalk"));
    }
}
