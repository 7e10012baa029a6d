//! Outstanding ownership requests
//!
//! Each neuron has at most one request in flight to the arbitration
//! service. Later callers asking about the same neuron join it and receive
//! the same answer; requests about different neurons never interfere.

use crate::models::Id;
use crate::operations::EditError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

/// What was asked of the arbitration service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipRequestKind {
    /// Ownership for the local user
    Ownership,
    /// Hand the neuron to another user
    Assignment { target_user: String },
}

/// An outstanding request taken out of the broker, ready to be answered
#[derive(Debug)]
pub struct PendingRequest {
    kind: OwnershipRequestKind,
    waiters: Vec<oneshot::Sender<bool>>,
}

impl PendingRequest {
    pub fn kind(&self) -> &OwnershipRequestKind {
        &self.kind
    }

    /// Wake every waiter with `granted`; returns how many were still listening.
    pub fn answer(self, granted: bool) -> usize {
        self.waiters
            .into_iter()
            .filter_map(|waiter| waiter.send(granted).ok())
            .count()
    }
}

/// A waiter's place in an outstanding request
#[derive(Debug)]
pub struct Registration {
    pub receiver: oneshot::Receiver<bool>,
    /// True for the first waiter, who must forward the request to the port
    pub is_new: bool,
}

#[derive(Debug, Default)]
pub struct OwnershipBroker {
    pending: Mutex<HashMap<Id, PendingRequest>>,
}

impl OwnershipBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a waiter for `neuron_id`, opening a request if none is outstanding.
    pub async fn register(&self, neuron_id: Id, kind: OwnershipRequestKind) -> Registration {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;

        match pending.get_mut(&neuron_id) {
            Some(request) => {
                if request.kind != kind {
                    tracing::debug!(
                        "Joining outstanding {:?} request for neuron {} with {:?}",
                        request.kind,
                        neuron_id,
                        kind
                    );
                }
                request.waiters.push(tx);
                Registration {
                    receiver: rx,
                    is_new: false,
                }
            }
            None => {
                pending.insert(
                    neuron_id,
                    PendingRequest {
                        kind,
                        waiters: vec![tx],
                    },
                );
                Registration {
                    receiver: rx,
                    is_new: true,
                }
            }
        }
    }

    /// Remove the outstanding request for `neuron_id` without answering it yet
    pub async fn take(&self, neuron_id: Id) -> Option<PendingRequest> {
        self.pending.lock().await.remove(&neuron_id)
    }

    /// Abandon the request for `neuron_id`; its waiters see `OwnershipCancelled`.
    pub async fn cancel(&self, neuron_id: Id) -> usize {
        self.pending
            .lock()
            .await
            .remove(&neuron_id)
            .map_or(0, |request| request.waiters.len())
    }

    /// Forget waiters that stopped listening; drops the request once none remain.
    pub async fn prune(&self, neuron_id: Id) {
        let mut pending = self.pending.lock().await;
        if let Some(request) = pending.get_mut(&neuron_id) {
            request.waiters.retain(|waiter| !waiter.is_closed());
            if request.waiters.is_empty() {
                pending.remove(&neuron_id);
                tracing::debug!("Dropped abandoned ownership request for neuron {}", neuron_id);
            }
        }
    }

    /// Wait for the answer to a registration, giving up after `timeout`.
    pub async fn wait(
        &self,
        neuron_id: Id,
        receiver: oneshot::Receiver<bool>,
        timeout: Duration,
    ) -> Result<bool, EditError> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(granted)) => Ok(granted),
            Ok(Err(_)) => Err(EditError::OwnershipCancelled { neuron_id }),
            Err(_) => {
                self.prune(neuron_id).await;
                tracing::warn!(
                    "Ownership request for neuron {} timed out after {:?}",
                    neuron_id,
                    timeout
                );
                Err(EditError::OwnershipTimeout {
                    neuron_id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    pub async fn is_pending(&self, neuron_id: Id) -> bool {
        self.pending.lock().await.contains_key(&neuron_id)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_second_request_joins_first() {
        let broker = OwnershipBroker::new();
        let first = broker
            .register(Id(5), OwnershipRequestKind::Ownership)
            .await;
        let second = broker
            .register(Id(5), OwnershipRequestKind::Ownership)
            .await;

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(broker.pending_count().await, 1);

        let request = broker.take(Id(5)).await.unwrap();
        assert_eq!(request.kind(), &OwnershipRequestKind::Ownership);
        assert_eq!(request.answer(true), 2);
        assert!(first.receiver.await.unwrap());
        assert!(second.receiver.await.unwrap());
        assert!(!broker.is_pending(Id(5)).await);
    }

    #[tokio::test]
    async fn test_requests_for_different_neurons_are_independent() {
        let broker = OwnershipBroker::new();
        let a = broker
            .register(Id(1), OwnershipRequestKind::Ownership)
            .await;
        let b = broker
            .register(
                Id(2),
                OwnershipRequestKind::Assignment {
                    target_user: "user:bob".to_string(),
                },
            )
            .await;
        assert!(a.is_new && b.is_new);

        broker.take(Id(2)).await.unwrap().answer(false);
        assert!(!b.receiver.await.unwrap());
        assert!(broker.is_pending(Id(1)).await);

        broker.take(Id(1)).await.unwrap().answer(true);
        assert!(a.receiver.await.unwrap());
    }

    #[tokio::test]
    async fn test_take_without_request() {
        let broker = OwnershipBroker::new();
        assert!(broker.take(Id(9)).await.is_none());
    }

    #[tokio::test]
    async fn test_wait_stays_pending_until_resolved() {
        let broker = OwnershipBroker::new();
        let registration = broker
            .register(Id(3), OwnershipRequestKind::Ownership)
            .await;

        let mut wait = tokio_test::task::spawn(broker.wait(
            Id(3),
            registration.receiver,
            Duration::from_secs(30),
        ));
        assert_pending!(wait.poll());

        broker.take(Id(3)).await.unwrap().answer(true);
        assert!(wait.is_woken());
        let answer = assert_ready!(wait.poll());
        assert_eq!(answer, Ok(true));
    }

    #[tokio::test]
    async fn test_wait_times_out_and_prunes() {
        let broker = OwnershipBroker::new();
        let registration = broker
            .register(Id(4), OwnershipRequestKind::Ownership)
            .await;

        let result = broker
            .wait(Id(4), registration.receiver, Duration::from_millis(50))
            .await;

        assert_eq!(
            result,
            Err(EditError::OwnershipTimeout {
                neuron_id: Id(4),
                timeout_ms: 50
            })
        );
        assert!(!broker.is_pending(Id(4)).await);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters_with_error() {
        let broker = OwnershipBroker::new();
        let registration = broker
            .register(Id(6), OwnershipRequestKind::Ownership)
            .await;

        assert_eq!(broker.cancel(Id(6)).await, 1);
        let result = broker
            .wait(Id(6), registration.receiver, Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(EditError::OwnershipCancelled { neuron_id: Id(6) }));
    }
}
