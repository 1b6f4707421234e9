//! Observation of properties that do not exist yet.
//!
//! A binding to `user.nickname` may be connected before `nickname` is ever
//! assigned. The placeholder keeps the subscriptions until the property
//! appears, then moves them onto the real observer.
//!
//! # Migration
//!
//! 1. `subscribe` re-checks the object first; if the property exists now,
//!    the callback goes straight to the real observer.
//! 2. Otherwise the callback is parked and the object dispatcher starts
//!    listening to change records.
//! 3. The change record that defines the property reaches the placeholder,
//!    which takes itself out of the dispatcher, resolves the real observer,
//!    rebinds every parked callback onto it and notifies each parked
//!    callback once. Later changes come from the real observer only.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::change_records::ObjectObserver;
use super::subscription::{Callback, Subscription, SubscriptionId};
use super::Observer;
use crate::error::Result;
use crate::value::{ObjectRef, Value, WeakObjectRef};

struct Parked {
    callback: Callback,
    disposer: Option<Subscription>,
}

#[derive(Default)]
struct PlaceholderState {
    actual: Option<Observer>,
    parked: IndexMap<SubscriptionId, Parked>,
}

/// Placeholder observer for a property the object does not have yet.
pub struct UndefinedPropertyObserver {
    this: Weak<UndefinedPropertyObserver>,
    owner: Weak<ObjectObserver>,
    object: WeakObjectRef,
    property: String,
    state: Mutex<PlaceholderState>,
}

impl UndefinedPropertyObserver {
    pub(crate) fn new(owner: Weak<ObjectObserver>, object: &ObjectRef, property: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            owner,
            object: object.downgrade(),
            property: property.to_string(),
            state: Mutex::new(PlaceholderState::default()),
        })
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// The real observer, once the property exists.
    pub fn actual(&self) -> Option<Observer> {
        self.state.lock().actual.clone()
    }

    /// Number of callbacks waiting for the property (or already migrated).
    pub fn parked_count(&self) -> usize {
        self.state.lock().parked.len()
    }

    pub fn get_value(&self) -> Value {
        if let Some(actual) = self.actual() {
            return actual.get_value();
        }
        self.object
            .upgrade()
            .map(|object| object.get(&self.property))
            .unwrap_or_default()
    }

    /// Write the value, defining the property if needed.
    ///
    /// The change record produced by the write notifies subscribers.
    pub fn set_value(&self, value: Value) -> Result<()> {
        if let Some(actual) = self.actual() {
            return actual.set_value(value);
        }
        if let Some(object) = self.object.upgrade() {
            object.set(&self.property, value);
        }
        Ok(())
    }

    pub fn subscribe(&self, callback: Callback) -> Result<Subscription> {
        if self.actual().is_none() {
            self.resolve();
        }
        if let Some(actual) = self.actual() {
            return actual.subscribe(callback);
        }

        if let Some(owner) = self.owner.upgrade() {
            owner.start_observing();
        }

        let id = SubscriptionId::new();
        self.state.lock().parked.insert(
            id,
            Parked {
                callback,
                disposer: None,
            },
        );

        let this = self.this.clone();
        Ok(Subscription::new(move || {
            let Some(observer) = this.upgrade() else {
                return;
            };
            let parked = observer.state.lock().parked.shift_remove(&id);
            if let Some(Parked {
                disposer: Some(disposer),
                ..
            }) = parked
            {
                disposer.dispose();
            }
        }))
    }

    /// Called by the dispatcher when a record for the property arrives.
    pub(crate) fn trigger(&self, new_value: &Value, old_value: &Value) {
        self.resolve();

        let callbacks: Vec<Callback> = self
            .state
            .lock()
            .parked
            .values()
            .map(|p| p.callback.clone())
            .collect();
        for callback in callbacks {
            callback(new_value, old_value);
        }
    }

    /// Switch to the real observer if the property exists now.
    fn resolve(&self) {
        if self.actual().is_some() {
            return;
        }
        let (Some(object), Some(owner)) = (self.object.upgrade(), self.owner.upgrade()) else {
            return;
        };
        if !object.has_own(&self.property) {
            return;
        }

        owner.remove_observer(&self.property);
        let actual = owner.get_observer(&self.property);

        let pending: Vec<(SubscriptionId, Callback)> = {
            let mut state = self.state.lock();
            state.actual = Some(actual.clone());
            state.parked.iter().map(|(id, p)| (*id, p.callback.clone())).collect()
        };

        debug!(property = %self.property, callbacks = pending.len(), "property defined, migrating callbacks");

        for (id, callback) in pending {
            let Ok(disposer) = actual.subscribe(callback) else {
                continue;
            };
            let mut state = self.state.lock();
            match state.parked.get_mut(&id) {
                Some(parked) => parked.disposer = Some(disposer),
                None => {
                    drop(state);
                    disposer.dispose();
                }
            }
        }
    }
}
