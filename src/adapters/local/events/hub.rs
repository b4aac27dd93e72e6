use crate::domain::alerts::AlertEvent;
use crate::ports::alerts::AlertPublisher;
use tokio::sync::broadcast;

/// Fan-out point for alert events. Publishing never waits on subscribers.
#[derive(Debug)]
pub struct AlertHub {
    sender: broadcast::Sender<AlertEvent>,
}

impl AlertHub {
    pub fn new() -> Self {
        // Slow listeners lag and skip rather than blocking workers
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Returns the number of listeners that received the event (zero is fine).
    pub fn publish(&self, event: AlertEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }
}

impl AlertPublisher for AlertHub {
    fn publish(&self, event: AlertEvent) -> usize {
        AlertHub::publish(self, event)
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new()
    }
}
