use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::{CancellationToken, DropGuard};

const SUCCESS_PAYLOAD: &str = "successfully migrated";
const FAILURE_PAYLOAD: &str = "failed to migrate";

/// Outcome a migrating process announces to the others waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationSignal {
    Success,
    Failure,
}

impl MigrationSignal {
    pub fn payload(self) -> &'static str {
        match self {
            MigrationSignal::Success => SUCCESS_PAYLOAD,
            MigrationSignal::Failure => FAILURE_PAYLOAD,
        }
    }

    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload {
            SUCCESS_PAYLOAD => Some(MigrationSignal::Success),
            FAILURE_PAYLOAD => Some(MigrationSignal::Failure),
            _ => None,
        }
    }
}

/// Live subscription to migration signals. Dropping it stops whatever task
/// feeds it.
pub struct SignalSubscription {
    receiver: broadcast::Receiver<MigrationSignal>,
    _guard: DropGuard,
}

impl SignalSubscription {
    pub fn new(receiver: broadcast::Receiver<MigrationSignal>, token: CancellationToken) -> Self {
        Self {
            receiver,
            _guard: token.drop_guard(),
        }
    }

    /// Next signal, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<MigrationSignal> {
        loop {
            match self.receiver.recv().await {
                Ok(signal) => return Some(signal),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
