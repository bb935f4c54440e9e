//! Typed event bus between the session/command layer and widget surfaces.
//!
//! One-to-many notification without ambient global state: the widget root
//! owns a `WidgetBus`, independent surfaces (results panel, map, toasts)
//! subscribe, and the command dispatcher publishes.

use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{Facility, MapRequest};

/// Closed set of notifications the command layer can publish.
#[derive(Debug, Clone)]
pub enum WidgetEvent {
    /// Show the search results panel.
    SearchResults {
        facilities: Vec<Facility>,
        summary: String,
    },
    /// Show facilities on the map for a tag/location filter.
    FacilitiesOnMap { tags: String, location: String },
    /// Render an interactive map from explicit markers.
    MapDisplayed(MapRequest),
    /// Navigate to another widget surface.
    Navigated { path: String },
    /// Show a transient toast message.
    Toast { message: String },
}

/// Broadcast channel carrying [`WidgetEvent`]s to any number of surfaces.
#[derive(Debug, Clone)]
pub struct WidgetBus {
    sender: broadcast::Sender<WidgetEvent>,
}

impl WidgetBus {
    /// Create a bus buffering up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe a new surface. Events published before the subscription are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers. Publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: WidgetEvent) {
        if self.sender.send(event).is_err() {
            debug!("widget event published with no subscribers");
        }
    }
}

impl Default for WidgetBus {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus = WidgetBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(WidgetEvent::Toast {
            message: "saved".into(),
        });

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.unwrap() {
                WidgetEvent::Toast { message } => assert_eq!(message, "saved"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn publishing_without_subscribers_does_not_panic() {
        let bus = WidgetBus::default();
        bus.publish(WidgetEvent::Navigated {
            path: "/find-care".into(),
        });
    }
}
