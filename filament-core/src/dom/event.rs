//! Element event handlers.
//!
//! Native element properties change when the user interacts with the page,
//! not through a setter the core can intercept. Element observers therefore
//! rely on a handler that turns DOM events into notifications.

use std::sync::Arc;

use smallvec::SmallVec;

use super::ElementRef;
use crate::observation::Subscription;

/// Subscribes a callback to the DOM events that signal a property change.
pub trait ElementHandler: Send + Sync {
    fn subscribe(&self, element: &ElementRef, callback: Arc<dyn Fn() + Send + Sync>) -> Subscription;
}

/// Handler listening to a fixed list of DOM events.
#[derive(Debug, Clone)]
pub struct EventHandler {
    events: Vec<String>,
}

impl EventHandler {
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }
}

impl ElementHandler for EventHandler {
    fn subscribe(&self, element: &ElementRef, callback: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        let ids: SmallVec<[_; 2]> = self
            .events
            .iter()
            .map(|event| {
                let callback = callback.clone();
                element.add_event_listener(event, move |_| callback())
            })
            .collect();

        let element = element.downgrade();
        Subscription::new(move || {
            if let Some(element) = element.upgrade() {
                for id in ids {
                    element.remove_event_listener(id);
                }
            }
        })
    }
}
