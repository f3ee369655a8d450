use crate::events::{EventBridge, WaitFlag};
use crate::experiment::Experiment;
use crate::protocol::{ExperimentId, ExperimentStatus, HostEvent, NOTIFY_CAP};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, trace};

/// Delivered to every subscriber of [`AstraAdmin::subscribe`](crate::AstraAdmin::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StatusChanged(Experiment),
    Closed(Experiment),
    InstrumentsDetected,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub open: BTreeMap<ExperimentId, Experiment>,
    /// Experiments whose close was requested but not yet acknowledged.
    pub closing: BTreeMap<ExperimentId, Experiment>,
}

/// State shared by the client handle and the event pump. The registry mutex is the sync root:
/// host calls and event dispatch both run under it.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    registry: Mutex<Registry>,
    pub bridge: EventBridge,
    subscribers: Mutex<Vec<Sender<Notification>>>,
    disposed: AtomicBool,
}

impl Shared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = bounded(NOTIFY_CAP);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, notification: Notification) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("subscriber queue full; notification dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispatch(&self, event: HostEvent) {
        if self.is_disposed() {
            debug!(?event, "session disposed; event dropped");
            return;
        }
        let mut registry = self.lock_registry();
        match event {
            HostEvent::InstrumentDetectionCompleted => {
                debug!("instrument detection completed");
                self.bridge.set(WaitFlag::InstrumentsDetected);
                self.publish(Notification::InstrumentsDetected);
            }
            HostEvent::ExperimentClosed { experiment_id } => {
                let Some(experiment) = registry.closing.remove(&experiment_id) else {
                    error!(experiment_id, "close acknowledged for an experiment nobody closed");
                    return;
                };
                debug!(experiment_id, "experiment closed");
                self.bridge.set(WaitFlag::ExperimentClosed);
                self.publish(Notification::Closed(experiment));
            }
            other => {
                let (Some(experiment_id), Some((status, flag))) =
                    (other.experiment_id(), transition(&other))
                else {
                    return;
                };
                let Some(experiment) = registry.open.get_mut(&experiment_id) else {
                    if !registry.closing.contains_key(&experiment_id) {
                        error!(experiment_id, event = ?other, "event for an experiment that is not open");
                    }
                    return;
                };
                experiment.status = status;
                if matches!(other, HostEvent::CollectionStarted { .. }) {
                    experiment.has_data = true;
                }
                debug!(experiment_id, %flag, ?status, "host event");
                self.bridge.set(flag);
                self.publish(Notification::StatusChanged(experiment.clone()));
            }
        }
    }
}

/// Status an experiment moves to and the flag raised for each per-experiment event.
fn transition(event: &HostEvent) -> Option<(ExperimentStatus, WaitFlag)> {
    let step = match event {
        HostEvent::ExperimentReady { .. } => (ExperimentStatus::Ready, WaitFlag::ExperimentReady),
        HostEvent::ExperimentRead { .. } => (ExperimentStatus::Ready, WaitFlag::ExperimentRead),
        HostEvent::ExperimentWrite { .. } => (ExperimentStatus::Ready, WaitFlag::ExperimentWrite),
        HostEvent::ExperimentRun { .. } => (ExperimentStatus::Ready, WaitFlag::ExperimentRun),
        HostEvent::PreparingForCollection { .. } => {
            (ExperimentStatus::Busy, WaitFlag::PreparingForCollection)
        }
        HostEvent::WaitingForAutoInject { .. } => (
            ExperimentStatus::WaitingForAutoInject,
            WaitFlag::WaitingForAutoInject,
        ),
        HostEvent::CollectionStarted { .. } => {
            (ExperimentStatus::Busy, WaitFlag::CollectionStarted)
        }
        HostEvent::CollectionFinished { .. } | HostEvent::CollectionAborted { .. } => {
            (ExperimentStatus::Ready, WaitFlag::CollectionFinished)
        }
        HostEvent::ExperimentClosed { .. } | HostEvent::InstrumentDetectionCompleted => {
            return None
        }
    };
    Some(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_open(id: ExperimentId) -> Shared {
        let shared = Shared::new();
        shared.lock_registry().open.insert(
            id,
            Experiment::new(id, "run".to_string(), ExperimentStatus::Ready),
        );
        shared
    }

    #[test]
    fn collection_events_move_status_and_raise_flags() {
        let shared = with_open(4);
        let notifications = shared.subscribe();

        shared.dispatch(HostEvent::WaitingForAutoInject { experiment_id: 4 });
        assert_eq!(
            shared.lock_registry().open[&4].status(),
            ExperimentStatus::WaitingForAutoInject
        );

        shared.dispatch(HostEvent::CollectionStarted { experiment_id: 4 });
        {
            let registry = shared.lock_registry();
            assert_eq!(registry.open[&4].status(), ExperimentStatus::Busy);
            assert!(registry.open[&4].has_data());
        }
        assert!(shared.bridge.is_set(WaitFlag::WaitingForAutoInject));
        assert!(shared.bridge.is_set(WaitFlag::CollectionStarted));
        assert_eq!(notifications.try_iter().count(), 2);
    }

    #[test]
    fn abort_counts_as_finished() {
        let shared = with_open(2);
        shared.dispatch(HostEvent::CollectionStarted { experiment_id: 2 });
        shared.dispatch(HostEvent::CollectionAborted { experiment_id: 2 });
        assert!(shared.bridge.is_set(WaitFlag::CollectionFinished));
        assert_eq!(
            shared.lock_registry().open[&2].status(),
            ExperimentStatus::Ready
        );
    }

    #[test]
    fn close_ack_drains_closing_set_and_notifies() {
        let shared = Shared::new();
        shared.lock_registry().closing.insert(
            9,
            Experiment::new(9, "done".to_string(), ExperimentStatus::Ready),
        );
        let notifications = shared.subscribe();

        shared.dispatch(HostEvent::ExperimentRun { experiment_id: 9 });
        assert!(!shared.bridge.is_set(WaitFlag::ExperimentRun));

        shared.dispatch(HostEvent::ExperimentClosed { experiment_id: 9 });
        assert!(shared.bridge.is_set(WaitFlag::ExperimentClosed));
        assert!(shared.lock_registry().closing.is_empty());
        match notifications.try_recv() {
            Ok(Notification::Closed(experiment)) => assert_eq!(experiment.id(), 9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn events_for_unknown_experiments_raise_nothing() {
        let shared = Shared::new();
        shared.dispatch(HostEvent::ExperimentRead { experiment_id: 77 });
        assert!(!shared.bridge.is_set(WaitFlag::ExperimentRead));
    }

    #[test]
    fn disposed_session_ignores_events() {
        let shared = with_open(1);
        assert!(shared.mark_disposed());
        assert!(!shared.mark_disposed());
        shared.dispatch(HostEvent::ExperimentRun { experiment_id: 1 });
        assert!(!shared.bridge.is_set(WaitFlag::ExperimentRun));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let shared = Shared::new();
        drop(shared.subscribe());
        let live = shared.subscribe();
        shared.dispatch(HostEvent::InstrumentDetectionCompleted);
        assert_eq!(live.try_recv(), Ok(Notification::InstrumentsDetected));
        assert_eq!(
            shared
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            1
        );
    }
}
