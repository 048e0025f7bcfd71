// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Generic operation dispatch.
//!
//! Admission happens in the caller before a dispatch task is spawned; the
//! functions here run inside that task and always leave the registry entry
//! completed, aborted or (under `LeaveRunning`) untouched.

use std::sync::Arc;

use tracing::{error, info, trace, warn};

use crate::backend::{ActionClient, GoalCallbacks, GoalFeedback, GoalResult, GoalState};
use crate::command::Goal;
use crate::completion::{done_channel, EventVerdict};
use crate::operation::{CommandId, Operation};
use crate::policies::{BackendUnavailablePolicy, LanderPolicies};
use crate::registry::OperationRegistry;
use crate::telemetry::TelemetryTable;
use crate::DynResult;

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    telemetry: Arc<TelemetryTable>,
    policies: LanderPolicies,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<OperationRegistry>,
        telemetry: Arc<TelemetryTable>,
        policies: LanderPolicies,
    ) -> Self {
        Self {
            registry,
            telemetry,
            policies,
        }
    }

    pub fn policies(&self) -> &LanderPolicies {
        &self.policies
    }

    /// Send `goal` to the action server and complete `op` once it reports a
    /// terminal state or the action timeout elapses.
    pub async fn run_action(
        &self,
        op: Operation,
        goal: Goal,
        client: Option<Arc<dyn ActionClient>>,
        id: Option<CommandId>,
    ) -> EventVerdict {
        let watch = tokio::spawn(watch_faults(op));

        let Some(client) = client else {
            error!("{} action client was null!", op);
            self.backend_unavailable(op, id);
            join_watch(op, watch).await;
            return EventVerdict::Dropped;
        };

        let (notifier, signal) = done_channel();
        let telemetry = Arc::clone(&self.telemetry);
        let callbacks = GoalCallbacks {
            on_active: Box::new(move || info!("{} started...", op)),
            on_feedback: Box::new(move |feedback: GoalFeedback| {
                trace!("{} feedback: {:?}", op, feedback.current)
            }),
            on_done: Box::new(move |state: GoalState, result: GoalResult| {
                info!("{} finished in state {}", op, state);
                if let GoalResult::GuardedMove {
                    success,
                    final_position,
                } = result
                {
                    telemetry.record_ground_result(success, final_position.z);
                }
                notifier.notify(state);
            }),
        };

        if let Err(e) = client.send_goal(goal, callbacks).await {
            error!("{} goal was not accepted by {}: {}", op, client.name(), e);
            self.backend_unavailable(op, id);
            join_watch(op, watch).await;
            return EventVerdict::Dropped;
        }

        let verdict = signal.wait(self.policies.action_timeout).await;
        match verdict {
            EventVerdict::TimedOut => {
                warn!("{} action did not finish before the time out.", op)
            }
            EventVerdict::Dropped => warn!("{} action ended without a result", op),
            EventVerdict::Done(_) => {}
        }

        let success = !self.policies.report_action_failures || verdict.is_success();
        self.registry.complete_with(op, id, success);
        join_watch(op, watch).await;
        verdict
    }

    /// Hand a set-point or trigger to the backend's publisher side.
    ///
    /// Completion is detected elsewhere (joint samples or image arrival), so
    /// only a publish failure touches the registry here.
    pub async fn run_publisher<F>(&self, op: Operation, id: Option<CommandId>, publish: F) -> bool
    where
        F: FnOnce() -> DynResult<()> + Send,
    {
        let watch = tokio::spawn(watch_faults(op));
        let published = match publish() {
            Ok(()) => true,
            Err(e) => {
                error!("{} command could not be published: {}", op, e);
                self.backend_unavailable(op, id);
                false
            }
        };
        join_watch(op, watch).await;
        published
    }

    /// Apply the configured policy to an admitted operation the backend
    /// cannot take.
    pub fn backend_unavailable(&self, op: Operation, id: Option<CommandId>) {
        match self.policies.on_backend_unavailable {
            BackendUnavailablePolicy::RollBack => {
                self.registry.abort(op, id);
            }
            BackendUnavailablePolicy::LeaveRunning => {
                warn!("{} left running; it will not accept further commands", op);
            }
        }
    }
}

/// Fault monitoring for the lifetime of one dispatched operation.
///
/// Faults are currently tracked from the periodic snapshots only, so there
/// is nothing to do per operation.
async fn watch_faults(op: Operation) {
    trace!("{} fault watch started", op);
}

async fn join_watch(op: Operation, watch: tokio::task::JoinHandle<()>) {
    if let Err(e) = watch.await {
        error!("{} fault watch failed: {}", op, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Point;
    use crate::events::LanderEventEmitter;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    type Reports = Arc<Mutex<Vec<(CommandId, bool)>>>;

    struct MockClient {
        outcome: Option<(GoalState, GoalResult)>,
        reject: bool,
    }

    impl MockClient {
        fn finishing(state: GoalState, result: GoalResult) -> Arc<dyn ActionClient> {
            Arc::new(Self {
                outcome: Some((state, result)),
                reject: false,
            })
        }

        fn silent() -> Arc<dyn ActionClient> {
            Arc::new(Self {
                outcome: None,
                reject: false,
            })
        }

        fn rejecting() -> Arc<dyn ActionClient> {
            Arc::new(Self {
                outcome: None,
                reject: true,
            })
        }
    }

    impl ActionClient for MockClient {
        fn name(&self) -> &str {
            "mock"
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn wait_for_server<'a>(
            &'a self,
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
            Box::pin(async { true })
        }

        fn send_goal<'a>(
            &'a self,
            _goal: Goal,
            callbacks: GoalCallbacks,
        ) -> Pin<Box<dyn Future<Output = DynResult<()>> + Send + 'a>> {
            Box::pin(async move { self.accept(callbacks).await })
        }
    }

    impl MockClient {
        async fn accept(&self, callbacks: GoalCallbacks) -> DynResult<()> {
            if self.reject {
                return Err("goal rejected".into());
            }
            (callbacks.on_active)();
            let on_done = callbacks.on_done;
            match self.outcome.clone() {
                Some((state, result)) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        on_done(state, result);
                    });
                }
                None => {
                    // Hold the callback forever without calling it.
                    tokio::spawn(async move {
                        std::future::pending::<()>().await;
                        drop(on_done);
                    });
                }
            }
            Ok(())
        }
    }

    fn setup(policies: LanderPolicies) -> (Dispatcher, Arc<OperationRegistry>, Arc<TelemetryTable>, Reports) {
        let emitter = Arc::new(LanderEventEmitter::new());
        let registry = Arc::new(OperationRegistry::new(Arc::clone(&emitter)));
        let telemetry = Arc::new(TelemetryTable::new(emitter));
        let reports: Reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        registry.set_status_callback(Arc::new(move |id, ok| sink.lock().unwrap().push((id, ok))));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&telemetry), policies);
        (dispatcher, registry, telemetry, reports)
    }

    fn dig() -> Goal {
        Goal::DigLinear {
            x: 1.5,
            y: 0.0,
            depth: 0.05,
            length: 0.3,
            ground_position: -0.155,
        }
    }

    #[tokio::test]
    async fn test_action_completes_on_done() {
        let (dispatcher, registry, _, reports) = setup(LanderPolicies::default());
        let id = Some(CommandId(7));
        assert!(registry.admit(Operation::DigLinear, id));

        let client = MockClient::finishing(GoalState::Succeeded, GoalResult::Empty);
        let verdict = dispatcher
            .run_action(Operation::DigLinear, dig(), Some(client), id)
            .await;

        assert_eq!(verdict, EventVerdict::Done(GoalState::Succeeded));
        assert!(!registry.is_running(Operation::DigLinear));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(7), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_timeout_still_completes() {
        let (dispatcher, registry, _, reports) = setup(LanderPolicies::default());
        let id = Some(CommandId(11));
        registry.admit(Operation::Stow, id);

        let verdict = dispatcher
            .run_action(Operation::Stow, Goal::Stow, Some(MockClient::silent()), id)
            .await;

        assert_eq!(verdict, EventVerdict::TimedOut);
        assert!(!registry.is_running(Operation::Stow));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(11), true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_reported_when_enabled() {
        let policies = LanderPolicies {
            report_action_failures: true,
            ..LanderPolicies::default()
        };
        let (dispatcher, registry, _, reports) = setup(policies);

        registry.admit(Operation::Unstow, Some(CommandId(1)));
        dispatcher
            .run_action(Operation::Unstow, Goal::Unstow, Some(MockClient::silent()), Some(CommandId(1)))
            .await;

        registry.admit(Operation::Grind, Some(CommandId(2)));
        let aborted = MockClient::finishing(GoalState::Aborted, GoalResult::Empty);
        dispatcher
            .run_action(
                Operation::Grind,
                Goal::Grind {
                    x: 1.6,
                    y: 0.1,
                    depth: 0.05,
                    length: 0.4,
                    parallel: true,
                    ground_position: -0.155,
                },
                Some(aborted),
                Some(CommandId(2)),
            )
            .await;

        assert_eq!(
            *reports.lock().unwrap(),
            vec![(CommandId(1), false), (CommandId(2), false)]
        );
    }

    #[tokio::test]
    async fn test_missing_client_rolls_back() {
        let (dispatcher, registry, _, reports) = setup(LanderPolicies::default());
        let id = Some(CommandId(3));
        registry.admit(Operation::Deliver, id);

        let goal = Goal::Deliver {
            target: Point::new(0.55, -0.3, 0.82),
        };
        dispatcher.run_action(Operation::Deliver, goal, None, id).await;

        assert!(!registry.is_running(Operation::Deliver));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(3), false)]);
        assert!(registry.admit(Operation::Deliver, Some(CommandId(4))));
    }

    #[tokio::test]
    async fn test_missing_client_left_running() {
        let policies = LanderPolicies {
            on_backend_unavailable: BackendUnavailablePolicy::LeaveRunning,
            ..LanderPolicies::default()
        };
        let (dispatcher, registry, _, reports) = setup(policies);
        let id = Some(CommandId(3));
        registry.admit(Operation::Deliver, id);

        let goal = Goal::Deliver {
            target: Point::default(),
        };
        dispatcher.run_action(Operation::Deliver, goal, None, id).await;

        assert!(registry.is_running(Operation::Deliver));
        assert!(reports.lock().unwrap().is_empty());
        assert!(!registry.admit(Operation::Deliver, Some(CommandId(4))));
    }

    #[tokio::test]
    async fn test_rejected_goal_rolls_back() {
        let (dispatcher, registry, _, reports) = setup(LanderPolicies::default());
        registry.admit(Operation::OwlatStow, Some(CommandId(9)));
        dispatcher
            .run_action(
                Operation::OwlatStow,
                Goal::OwlatStow,
                Some(MockClient::rejecting()),
                Some(CommandId(9)),
            )
            .await;
        assert!(!registry.is_running(Operation::OwlatStow));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(9), false)]);
    }

    #[tokio::test]
    async fn test_guarded_move_records_ground() {
        let (dispatcher, registry, telemetry, _) = setup(LanderPolicies::default());
        registry.admit(Operation::GuardedMove, None);

        let client = MockClient::finishing(
            GoalState::Succeeded,
            GoalResult::GuardedMove {
                success: true,
                final_position: Point::new(2.0, 0.0, -0.155),
            },
        );
        let goal = Goal::GuardedMove {
            start: Point::new(2.0, 0.0, 0.3),
            normal: Point::new(0.0, 0.0, 1.0),
            search_distance: 0.5,
        };
        dispatcher
            .run_action(Operation::GuardedMove, goal, Some(client), None)
            .await;

        assert!(telemetry.ground_found());
        assert_eq!(telemetry.ground_position(), -0.155);
    }

    #[tokio::test]
    async fn test_publisher_failure_rolls_back() {
        let (dispatcher, registry, _, reports) = setup(LanderPolicies::default());
        registry.admit(Operation::TakePicture, Some(CommandId(5)));

        let published = dispatcher
            .run_publisher(Operation::TakePicture, Some(CommandId(5)), || {
                Err("camera offline".into())
            })
            .await;

        assert!(!published);
        assert!(!registry.is_running(Operation::TakePicture));
        assert_eq!(*reports.lock().unwrap(), vec![(CommandId(5), false)]);
    }

    #[tokio::test]
    async fn test_publisher_success_leaves_running() {
        let (dispatcher, registry, _, reports) = setup(LanderPolicies::default());
        registry.admit(Operation::PanAntenna, Some(CommandId(6)));
        assert!(
            dispatcher
                .run_publisher(Operation::PanAntenna, Some(CommandId(6)), || Ok(()))
                .await
        );
        assert!(registry.is_running(Operation::PanAntenna));
        assert!(reports.lock().unwrap().is_empty());
    }
}
