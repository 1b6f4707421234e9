//! Dirty checking.
//!
//! Frozen objects cannot take an accessor trap and emit no change records,
//! so the only way to see their properties change is to look. The
//! [`DirtyChecker`] polls every tracked property once per animation frame
//! and notifies the ones whose value differs from the last look.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::subscription::{Callback, CallbackList, Subscription};
use crate::task_queue::TaskQueue;
use crate::value::{ObjectRef, Value, WeakObjectRef};

/// Polls tracked properties on animation frames.
pub struct DirtyChecker {
    this: Weak<DirtyChecker>,
    task_queue: TaskQueue,
    tracked: Mutex<Vec<Weak<DirtyCheckProperty>>>,
    scheduled: AtomicBool,
}

impl DirtyChecker {
    pub fn new(task_queue: TaskQueue) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            task_queue,
            tracked: Mutex::new(Vec::new()),
            scheduled: AtomicBool::new(false),
        })
    }

    /// Number of properties currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.tracked.lock().len()
    }

    fn add_property(&self, property: Weak<DirtyCheckProperty>) {
        self.tracked.lock().push(property);
        self.schedule();
    }

    fn remove_property(&self, property: &Weak<DirtyCheckProperty>) {
        self.tracked.lock().retain(|p| !p.ptr_eq(property));
    }

    fn schedule(&self) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.this.clone();
        self.task_queue.request_animation_frame(move |_| {
            if let Some(checker) = this.upgrade() {
                checker.check();
            }
        });
    }

    /// Compare every tracked property and notify the changed ones.
    pub fn check(&self) {
        self.scheduled.store(false, Ordering::SeqCst);

        let properties: Vec<Arc<DirtyCheckProperty>> = {
            let mut tracked = self.tracked.lock();
            tracked.retain(|p| p.strong_count() > 0);
            tracked.iter().filter_map(Weak::upgrade).collect()
        };

        let mut changed = 0;
        for property in &properties {
            if property.is_dirty() {
                changed += 1;
                property.call();
            }
        }
        trace!(tracked = properties.len(), changed, "dirty check");

        if !self.tracked.lock().is_empty() {
            self.schedule();
        }
    }
}

/// Observes one property by polling.
pub struct DirtyCheckProperty {
    this: Weak<DirtyCheckProperty>,
    checker: Arc<DirtyChecker>,
    object: WeakObjectRef,
    property: String,
    callbacks: CallbackList,
    old_value: Mutex<Option<Value>>,
}

impl DirtyCheckProperty {
    pub fn new(checker: Arc<DirtyChecker>, object: &ObjectRef, property: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            checker,
            object: object.downgrade(),
            property: property.to_string(),
            callbacks: CallbackList::new(),
            old_value: Mutex::new(None),
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

    /// Whether the value differs from the last one seen.
    pub fn is_dirty(&self) -> bool {
        match &*self.old_value.lock() {
            Some(old) => !old.strict_eq(&self.get_value()),
            None => false,
        }
    }

    pub fn call(&self) {
        let new_value = self.get_value();
        let old_value = self
            .old_value
            .lock()
            .replace(new_value.clone())
            .unwrap_or_default();
        self.callbacks.notify(&new_value, &old_value);
    }

    pub fn subscribe(&self, callback: Callback) -> Subscription {
        let start = self.callbacks.is_empty();
        let id = self.callbacks.add(callback);
        if start {
            *self.old_value.lock() = Some(self.get_value());
            self.checker.add_property(self.this.clone());
        }

        let this = self.this.clone();
        Subscription::new(move || {
            if let Some(observer) = this.upgrade() {
                if observer.callbacks.remove(id) && observer.callbacks.is_empty() {
                    *observer.old_value.lock() = None;
                    observer.checker.remove_property(&observer.this);
                }
            }
        })
    }
}
