//! Change-record observation.
//!
//! One [`ObjectObserver`] per object listens to the object's change records
//! and dispatches each batch to per-property observers. Properties the
//! object does not have yet get an
//! [`UndefinedPropertyObserver`](super::UndefinedPropertyObserver)
//! placeholder instead.
//!
//! # Batches
//!
//! A batch may contain several records for the same property. Records are
//! scanned newest-first and only the first record seen for a property is
//! dispatched, with the property's current value as the new value.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::subscription::{Callback, CallbackList, Subscription};
use super::undefined::UndefinedPropertyObserver;
use super::Observer;
use crate::task_queue::TaskQueue;
use crate::value::{ChangeRecord, ListenerId, ObjectRef, Value, WeakObjectRef};

/// Shared per-object dispatcher of change records.
pub struct ObjectObserver {
    this: Weak<ObjectObserver>,
    task_queue: TaskQueue,
    object: WeakObjectRef,
    observers: Mutex<HashMap<String, Observer>>,
    listener: Mutex<Option<ListenerId>>,
}

impl ObjectObserver {
    pub fn new(task_queue: TaskQueue, object: &ObjectRef) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            task_queue,
            object: object.downgrade(),
            observers: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
        })
    }

    /// The observer for `property`, created on first request.
    ///
    /// Existing properties get a [`PropertyObserver`]; missing ones get an
    /// undefined-property placeholder.
    pub fn get_observer(&self, property: &str) -> Observer {
        let mut observers = self.observers.lock();
        if let Some(observer) = observers.get(property) {
            return observer.clone();
        }

        let object = self.object.upgrade().unwrap_or_default();
        let observer = if object.has_own(property) {
            Observer::Property(PropertyObserver::new(self.this.clone(), &object, property))
        } else {
            Observer::Undefined(UndefinedPropertyObserver::new(self.this.clone(), &object, property))
        };
        observers.insert(property.to_string(), observer.clone());
        observer
    }

    /// Forget the cached observer for `property`.
    pub(crate) fn remove_observer(&self, property: &str) {
        self.observers.lock().remove(property);
    }

    /// Whether the object's change records are being listened to.
    pub fn is_observing(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Start listening to the object's change records. Idempotent.
    pub(crate) fn start_observing(&self) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return;
        }
        let Some(object) = self.object.upgrade() else {
            return;
        };
        let this = self.this.clone();
        *listener = Some(object.observe_changes(&self.task_queue, move |records| {
            if let Some(observer) = this.upgrade() {
                observer.handle_changes(records);
            }
        }));
        trace!(object = object.id().raw(), "observing change records");
    }

    fn handle_changes(&self, records: &[ChangeRecord]) {
        let Some(object) = self.object.upgrade() else {
            return;
        };

        let targets: SmallVec<[(Observer, String, Value); 4]> = {
            let observers = self.observers.lock();
            let mut seen = HashSet::new();
            records
                .iter()
                .rev()
                .filter(|record| seen.insert(record.name.as_str()))
                .filter_map(|record| {
                    observers
                        .get(&record.name)
                        .map(|o| (o.clone(), record.name.clone(), record.old_value.clone()))
                })
                .collect()
        };

        for (observer, name, old_value) in targets {
            let new_value = object.get(&name);
            match observer {
                Observer::Property(property) => property.trigger(&new_value, &old_value),
                Observer::Undefined(placeholder) => placeholder.trigger(&new_value, &old_value),
                _ => {}
            }
        }
    }
}

impl Drop for ObjectObserver {
    fn drop(&mut self) {
        if let (Some(id), Some(object)) = (self.listener.get_mut().take(), self.object.upgrade()) {
            object.unobserve_changes(id);
        }
    }
}

/// Observes one existing property through its object's change records.
pub struct PropertyObserver {
    this: Weak<PropertyObserver>,
    owner: Weak<ObjectObserver>,
    object: WeakObjectRef,
    property: String,
    callbacks: CallbackList,
}

impl PropertyObserver {
    pub(crate) fn new(owner: Weak<ObjectObserver>, object: &ObjectRef, property: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            owner,
            object: object.downgrade(),
            property: property.to_string(),
            callbacks: CallbackList::new(),
        })
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn get_value(&self) -> Value {
        self.object
            .upgrade()
            .map(|object| object.get(&self.property))
            .unwrap_or_default()
    }

    pub fn set_value(&self, value: Value) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.property, value);
        }
    }

    pub fn subscribe(&self, callback: Callback) -> Subscription {
        let id = self.callbacks.add(callback);
        if let Some(owner) = self.owner.upgrade() {
            owner.start_observing();
        }
        let this = self.this.clone();
        Subscription::new(move || {
            if let Some(observer) = this.upgrade() {
                observer.callbacks.remove(id);
            }
        })
    }

    pub(crate) fn trigger(&self, new_value: &Value, old_value: &Value) {
        self.callbacks.notify(new_value, old_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::callback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn existing_properties_get_property_observers() {
        let queue = TaskQueue::new();
        let object = ObjectRef::from_pairs([("a", 1)]);
        let owner = ObjectObserver::new(queue, &object);

        assert!(matches!(owner.get_observer("a"), Observer::Property(_)));
        assert!(matches!(owner.get_observer("b"), Observer::Undefined(_)));
        assert!(owner.get_observer("a").ptr_eq(&owner.get_observer("a")));
    }

    #[test]
    fn notifies_once_per_property_per_batch() {
        let queue = TaskQueue::new();
        let object = ObjectRef::from_pairs([("a", 1)]);
        let owner = ObjectObserver::new(queue.clone(), &object);
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        let _subscription = owner
            .get_observer("a")
            .subscribe(callback(move |new, old| c.lock().push((new.clone(), old.clone()))))
            .unwrap();
        assert!(owner.is_observing());

        object.set("a", 2.into());
        object.set("a", 3.into());
        queue.flush_micro_task_queue();

        // newest record wins: old value 2, current value 3
        assert_eq!(*calls.lock(), vec![(Value::from(3), Value::from(2))]);
    }

    #[test]
    fn unobserved_properties_are_ignored() {
        let queue = TaskQueue::new();
        let object = ObjectRef::from_pairs([("a", 1), ("b", 1)]);
        let owner = ObjectObserver::new(queue.clone(), &object);
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let _subscription = owner
            .get_observer("a")
            .subscribe(callback(move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        object.set("b", 2.into());
        queue.flush_micro_task_queue();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
