//! Setter-based observation.
//!
//! The observer replaces the property with an accessor the first time
//! someone subscribes. Until then reads and writes go straight to the
//! object. After that, every write lands in [`SetterObserver::set_value`]
//! through the accessor.
//!
//! # Coalescing
//!
//! A write that changes the value queues one microtask and remembers the
//! value from before the write. Further writes before the task runs only
//! update the current value, so subscribers see one `(new, old)` pair per
//! tick, where `old` is the value the tick started with.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::subscription::{Callback, CallbackList, Subscription};
use crate::task_queue::TaskQueue;
use crate::value::{ObjectRef, PropertyAccessor, Value, WeakObjectRef};

#[derive(Default)]
struct SetterState {
    observing: bool,
    install_failed: bool,
    queued: bool,
    current_value: Value,
    old_value: Value,
}

/// Observes one object property through an accessor trap.
pub struct SetterObserver {
    this: Weak<SetterObserver>,
    task_queue: TaskQueue,
    object: WeakObjectRef,
    property: String,
    callbacks: CallbackList,
    state: Mutex<SetterState>,
}

impl SetterObserver {
    pub fn new(task_queue: TaskQueue, object: &ObjectRef, property: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            task_queue,
            object: object.downgrade(),
            property: property.to_string(),
            callbacks: CallbackList::new(),
            state: Mutex::new(SetterState::default()),
        })
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// Whether the accessor trap is installed.
    pub fn is_observing(&self) -> bool {
        self.state.lock().observing
    }

    pub fn get_value(&self) -> Value {
        {
            let state = self.state.lock();
            if state.observing {
                return state.current_value.clone();
            }
        }
        self.object
            .upgrade()
            .map(|object| object.get(&self.property))
            .unwrap_or_default()
    }

    pub fn set_value(&self, value: Value) {
        if self.is_observing() {
            self.setter_value(value);
        } else if let Some(object) = self.object.upgrade() {
            object.set(&self.property, value);
        }
    }

    pub fn subscribe(&self, callback: Callback) -> Subscription {
        let id = self.callbacks.add(callback);

        let convert = {
            let state = self.state.lock();
            !state.observing && !state.install_failed
        };
        if convert {
            self.convert_property();
        }

        let this = self.this.clone();
        Subscription::new(move || {
            if let Some(observer) = this.upgrade() {
                observer.callbacks.remove(id);
            }
        })
    }

    /// Deliver the coalesced change to subscribers.
    pub fn call(&self) {
        let (new_value, old_value) = {
            let mut state = self.state.lock();
            state.queued = false;
            (state.current_value.clone(), state.old_value.clone())
        };
        self.callbacks.notify(&new_value, &old_value);
    }

    fn setter_value(&self, new_value: Value) {
        let schedule = {
            let mut state = self.state.lock();
            if state.current_value.strict_eq(&new_value) {
                return;
            }
            let schedule = !state.queued;
            if schedule {
                state.old_value = state.current_value.clone();
                state.queued = true;
            }
            state.current_value = new_value;
            schedule
        };

        if schedule {
            let this = self.this.clone();
            self.task_queue.queue_micro_task(Arc::new(move || {
                if let Some(observer) = this.upgrade() {
                    observer.call();
                }
            }));
        }
    }

    fn convert_property(&self) {
        let (Some(object), Some(this)) = (self.object.upgrade(), self.this.upgrade()) else {
            return;
        };

        let current = object.get(&self.property);
        self.state.lock().current_value = current;

        let installed = object.define_accessor(&self.property, this);
        let mut state = self.state.lock();
        if installed {
            state.observing = true;
            debug!(property = %self.property, object = object.id().raw(), "installed accessor trap");
        } else {
            state.install_failed = true;
            warn!(property = %self.property, object = object.id().raw(), "cannot install accessor trap, property stays plain data");
        }
    }
}

impl PropertyAccessor for SetterObserver {
    fn get(&self) -> Value {
        self.state.lock().current_value.clone()
    }

    fn set(&self, value: Value) {
        self.setter_value(value);
    }
}
