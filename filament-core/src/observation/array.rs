//! Array observation.
//!
//! Arrays report every mutation synchronously as a splice. The observer
//! collects the splices of one tick and notifies its callbacks once, from a
//! microtask, with the array as both the new and the old value.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::subscription::{Callback, CallbackList, Subscription};
use crate::task_queue::TaskQueue;
use crate::value::{ArrayRef, ArraySplice, ListenerId, Value, WeakArrayRef};

#[derive(Default)]
struct ArrayObserverState {
    listener: Option<ListenerId>,
    queued: bool,
    pending: Vec<ArraySplice>,
    last_splices: Vec<ArraySplice>,
}

/// Observes the contents of one array.
pub struct ArrayObserver {
    this: Weak<ArrayObserver>,
    task_queue: TaskQueue,
    array: WeakArrayRef,
    callbacks: CallbackList,
    state: Mutex<ArrayObserverState>,
}

impl ArrayObserver {
    pub fn new(task_queue: TaskQueue, array: &ArrayRef) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            task_queue,
            array: array.downgrade(),
            callbacks: CallbackList::new(),
            state: Mutex::new(ArrayObserverState::default()),
        })
    }

    pub fn array(&self) -> Option<ArrayRef> {
        self.array.upgrade()
    }

    pub fn get_value(&self) -> Value {
        self.array.upgrade().map(Value::Array).unwrap_or_default()
    }

    /// Splices delivered with the most recent notification.
    pub fn last_splices(&self) -> Vec<ArraySplice> {
        self.state.lock().last_splices.clone()
    }

    pub fn subscribe(&self, callback: Callback) -> Subscription {
        let id = self.callbacks.add(callback);
        self.start_listening();

        let this = self.this.clone();
        Subscription::new(move || {
            if let Some(observer) = this.upgrade() {
                observer.callbacks.remove(id);
                if observer.callbacks.is_empty() {
                    observer.stop_listening();
                }
            }
        })
    }

    /// Deliver the splices collected since the last notification.
    pub fn call(&self) {
        {
            let mut state = self.state.lock();
            state.queued = false;
            state.last_splices = std::mem::take(&mut state.pending);
        }
        let value = self.get_value();
        self.callbacks.notify(&value, &value);
    }

    fn start_listening(&self) {
        let mut state = self.state.lock();
        if state.listener.is_some() {
            return;
        }
        let Some(array) = self.array.upgrade() else {
            return;
        };
        let this = self.this.clone();
        state.listener = Some(array.add_listener(move |splice| {
            if let Some(observer) = this.upgrade() {
                observer.handle_splice(splice);
            }
        }));
        trace!(array = array.id().raw(), "observing array mutations");
    }

    fn stop_listening(&self) {
        let listener = self.state.lock().listener.take();
        if let (Some(id), Some(array)) = (listener, self.array.upgrade()) {
            array.remove_listener(id);
        }
    }

    fn handle_splice(&self, splice: &ArraySplice) {
        let schedule = {
            let mut state = self.state.lock();
            state.pending.push(splice.clone());
            !std::mem::replace(&mut state.queued, true)
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
}

impl Drop for ArrayObserver {
    fn drop(&mut self) {
        if let (Some(id), Some(array)) = (self.state.get_mut().listener.take(), self.array.upgrade()) {
            array.remove_listener(id);
        }
    }
}
