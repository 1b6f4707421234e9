//! Observer Locator
//!
//! The locator decides how a property is observed and hands out the same
//! observer every time the same property is asked for.
//!
//! | target                        | observer                              |
//! |-------------------------------|---------------------------------------|
//! | frozen object                 | [`DirtyCheckProperty`]                |
//! | object, `change-records`      | per-object [`ObjectObserver`] dispatch |
//! | object, `setter`              | [`SetterObserver`]                    |
//! | `<select>` `value`            | [`SelectValueObserver`]               |
//! | other element property        | [`ElementObserver`]                   |
//! | array contents                | [`ArrayObserver`]                     |
//! | primitives, `null`            | not observable                        |
//!
//! Caches hold objects weakly. [`ObserverLocator::prune`] drops the entries
//! whose object is gone; it also runs on its own whenever the caches have
//! doubled since the last prune, so dead entries never pile up.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use super::array::ArrayObserver;
use super::change_records::ObjectObserver;
use super::dirty::{DirtyCheckProperty, DirtyChecker};
use super::element::ElementObserver;
use super::select::SelectValueObserver;
use super::setter::SetterObserver;
use super::Observer;
use crate::config::{BindingConfig, ObservationStrategy};
use crate::dom::{ElementHandler, ElementRef, EventHandler, WeakElementRef};
use crate::task_queue::TaskQueue;
use crate::value::{ArrayRef, ObjectId, ObjectRef, Value, WeakArrayRef, WeakObjectRef};

type PropertyKey = (ObjectId, String);

/// Cache size below which no automatic prune runs.
const PRUNE_FLOOR: usize = 256;

/// Finds (and caches) the observer for a property.
pub struct ObserverLocator {
    this: Weak<ObserverLocator>,
    task_queue: TaskQueue,
    config: BindingConfig,
    dirty_checker: Arc<DirtyChecker>,
    event_handler: Arc<dyn ElementHandler>,
    select_handler: Arc<dyn ElementHandler>,
    object_observers: DashMap<ObjectId, (WeakObjectRef, Arc<ObjectObserver>)>,
    property_observers: DashMap<PropertyKey, (WeakObjectRef, Observer)>,
    element_observers: DashMap<PropertyKey, (WeakElementRef, Observer)>,
    array_observers: DashMap<ObjectId, (WeakArrayRef, Arc<ArrayObserver>)>,
    prune_at: AtomicUsize,
}

impl ObserverLocator {
    pub fn new(task_queue: TaskQueue, config: BindingConfig) -> Arc<Self> {
        let event_handler: Arc<dyn ElementHandler> =
            Arc::new(EventHandler::new(config.observed_events.iter().cloned()));
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            dirty_checker: DirtyChecker::new(task_queue.clone()),
            task_queue,
            config,
            event_handler,
            select_handler: Arc::new(EventHandler::new(["change"])),
            object_observers: DashMap::new(),
            property_observers: DashMap::new(),
            element_observers: DashMap::new(),
            array_observers: DashMap::new(),
            prune_at: AtomicUsize::new(PRUNE_FLOOR),
        })
    }

    pub fn task_queue(&self) -> &TaskQueue {
        &self.task_queue
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn dirty_checker(&self) -> &Arc<DirtyChecker> {
        &self.dirty_checker
    }

    /// The observer for `property` of `object`, or `None` when the value
    /// cannot be observed.
    pub fn get_observer(&self, object: &Value, property: &str) -> Option<Observer> {
        match object {
            Value::Object(object) => Some(self.get_object_observer(object, property)),
            _ => None,
        }
    }

    fn get_object_observer(&self, object: &ObjectRef, property: &str) -> Observer {
        if object.is_frozen() {
            return self.cached_property_observer(object, property, || {
                debug!(property, object = object.id().raw(), "frozen object, falling back to dirty checking");
                Observer::DirtyCheck(DirtyCheckProperty::new(self.dirty_checker.clone(), object, property))
            });
        }

        match self.config.observation_strategy {
            ObservationStrategy::ChangeRecords => self.object_observer(object).get_observer(property),
            ObservationStrategy::Setter => self.cached_property_observer(object, property, || {
                Observer::Setter(SetterObserver::new(self.task_queue.clone(), object, property))
            }),
        }
    }

    fn cached_property_observer<F>(&self, object: &ObjectRef, property: &str, create: F) -> Observer
    where
        F: FnOnce() -> Observer,
    {
        let mut created = false;
        let observer = self
            .property_observers
            .entry((object.id(), property.to_string()))
            .or_insert_with(|| {
                created = true;
                (object.downgrade(), create())
            })
            .1
            .clone();
        self.after_lookup(created);
        observer
    }

    /// The change-record dispatcher of `object`.
    pub fn object_observer(&self, object: &ObjectRef) -> Arc<ObjectObserver> {
        let mut created = false;
        let observer = self
            .object_observers
            .entry(object.id())
            .or_insert_with(|| {
                created = true;
                (object.downgrade(), ObjectObserver::new(self.task_queue.clone(), object))
            })
            .1
            .clone();
        self.after_lookup(created);
        observer
    }

    /// The observer for a property of a DOM element.
    pub fn get_element_observer(&self, element: &ElementRef, property: &str) -> Observer {
        let mut created = false;
        let observer = self
            .element_observers
            .entry((element.id(), property.to_string()))
            .or_insert_with(|| {
                created = true;
                (element.downgrade(), self.create_element_observer(element, property))
            })
            .1
            .clone();
        self.after_lookup(created);
        observer
    }

    fn create_element_observer(&self, element: &ElementRef, property: &str) -> Observer {
        if element.is_select() && property == "value" {
            return Observer::SelectValue(SelectValueObserver::new(
                element,
                self.select_handler.clone(),
                self.this.clone(),
            ));
        }

        let handler = self
            .config
            .is_observable_element_property(property)
            .then(|| self.event_handler.clone());
        Observer::Element(ElementObserver::new(element, property, handler))
    }

    /// The observer for the contents of `array`.
    pub fn get_array_observer(&self, array: &ArrayRef) -> Arc<ArrayObserver> {
        let mut created = false;
        let observer = self
            .array_observers
            .entry(array.id())
            .or_insert_with(|| {
                created = true;
                (array.downgrade(), ArrayObserver::new(self.task_queue.clone(), array))
            })
            .1
            .clone();
        self.after_lookup(created);
        observer
    }

    /// Prune once the caches have grown to twice their last live size.
    ///
    /// Must run after the entry guard of the lookup is released.
    fn after_lookup(&self, created: bool) {
        if !created {
            return;
        }
        let cached = self.cached_count();
        if cached < self.prune_at.load(Ordering::Relaxed) {
            return;
        }
        let live = cached - self.prune();
        self.prune_at.store((live * 2).max(PRUNE_FLOOR), Ordering::Relaxed);
    }

    /// Drop cache entries whose object has been dropped.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let before = self.cached_count();
        self.object_observers.retain(|_, (object, _)| object.upgrade().is_some());
        self.property_observers.retain(|_, (object, _)| object.upgrade().is_some());
        self.element_observers.retain(|_, (element, _)| element.upgrade().is_some());
        self.array_observers.retain(|_, (array, _)| array.upgrade().is_some());
        let removed = before - self.cached_count();
        if removed > 0 {
            debug!(removed, "pruned observer caches");
        }
        removed
    }

    /// Number of cached observers and dispatchers.
    pub fn cached_count(&self) -> usize {
        self.object_observers.len()
            + self.property_observers.len()
            + self.element_observers.len()
            + self.array_observers.len()
    }
}
