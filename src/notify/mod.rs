use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub channel_key: String,
    pub message: String,
}

/// Best-effort push channel. Delivery is never awaited and never
/// fails the operation that triggered it.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size);
        Self { tx }
    }

    pub fn driver_channel(driver_id: Uuid) -> String {
        format!("driver_{driver_id}")
    }

    pub fn push(&self, channel_key: &str, message: &str) {
        let notification = Notification {
            channel_key: channel_key.to_string(),
            message: message.to_string(),
        };

        if let Err(err) = self.tx.send(notification) {
            debug!(channel_key, error = %err, "notification dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}
