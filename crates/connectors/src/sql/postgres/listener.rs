use tokio::sync::broadcast::{self, error::RecvError};
use tokio_postgres::{Client, Notification};
use tracing::warn;

/// A session subscribed to one notification channel. Dropping it closes the
/// session.
pub struct PgListener {
    // Keeps the session open.
    _client: Client,
    receiver: broadcast::Receiver<Notification>,
    channel: String,
}

impl PgListener {
    pub(crate) fn new(
        client: Client,
        receiver: broadcast::Receiver<Notification>,
        channel: &str,
    ) -> Self {
        PgListener {
            _client: client,
            receiver,
            channel: channel.to_string(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next notification on this channel; `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.channel() == self.channel => {
                    return Some(notification);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Notification listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
