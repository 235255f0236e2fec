use tokio::sync::broadcast;

use crate::error::ErrorKind;

const CHANNEL_CAPACITY: usize = 16;

/// What subscribers are told after an update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherEvent {
    /// Snapshot or error state changed; re-read the store.
    Changed,
    Error(ErrorKind),
}

/// Fan-out of [`WeatherEvent`]s. Sending with no subscribers is not an
/// error.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<WeatherEvent>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WeatherEvent> {
        self.tx.subscribe()
    }

    pub fn changed(&self) {
        self.send(WeatherEvent::Changed);
    }

    pub fn error(&self, kind: ErrorKind) {
        self.send(WeatherEvent::Error(kind));
    }

    fn send(&self, event: WeatherEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(?event, "No subscribers for weather event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.error(ErrorKind::Network);
        notifier.changed();

        assert_eq!(rx.recv().await.unwrap(), WeatherEvent::Error(ErrorKind::Network));
        assert_eq!(rx.recv().await.unwrap(), WeatherEvent::Changed);
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        ChangeNotifier::new().changed();
    }
}
