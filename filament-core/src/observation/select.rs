//! `<select>` value observation.
//!
//! The value of a select is not a native property here: it is whatever the
//! binding assigned, and the options are kept in sync with it.
//!
//! # Synchronization
//!
//! - Assigning a value selects the matching options. When the value is an
//!   array, the observer also subscribes to the array, so mutating it
//!   re-selects options on the next microtask.
//! - A `change` event rebuilds the value from the selected options and
//!   notifies subscribers.
//! - While bound, adding or removing options re-selects them.
//!
//! An option's value is its `model` property when it has one, otherwise its
//! native `value`.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::locator::ObserverLocator;
use super::subscription::{callback, Callback, CallbackList, Subscription};
use crate::dom::{ElementHandler, ElementRef, WeakElementRef};
use crate::error::{BindingError, Result};
use crate::value::{ArrayRef, ListenerId, Value};

#[derive(Default)]
struct SelectState {
    value: Value,
    old_value: Value,
    array_subscription: Option<Subscription>,
    handler_subscription: Option<Subscription>,
    child_list: Option<ListenerId>,
}

/// Observes the bound value of a `<select>` element.
pub struct SelectValueObserver {
    this: Weak<SelectValueObserver>,
    element: WeakElementRef,
    handler: Arc<dyn ElementHandler>,
    locator: Weak<ObserverLocator>,
    callbacks: CallbackList,
    state: Mutex<SelectState>,
}

fn option_value(option: &ElementRef) -> Value {
    if option.has_property("model") {
        option.get_property("model")
    } else {
        option.get_property("value")
    }
}

impl SelectValueObserver {
    pub fn new(element: &ElementRef, handler: Arc<dyn ElementHandler>, locator: Weak<ObserverLocator>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            element: element.downgrade(),
            handler,
            locator,
            callbacks: CallbackList::new(),
            state: Mutex::new(SelectState::default()),
        })
    }

    pub fn get_value(&self) -> Value {
        self.state.lock().value.clone()
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        let Some(element) = self.element.upgrade() else {
            return Ok(());
        };
        if !value.is_nullish() && element.is_multiple() && value.as_array().is_none() {
            return Err(BindingError::InvalidBindingValue);
        }

        let previous = {
            let mut state = self.state.lock();
            if state.value.strict_eq(&value) {
                return Ok(());
            }
            state.array_subscription.take()
        };
        if let Some(subscription) = previous {
            subscription.dispose();
        }

        let array_subscription = value.as_array().and_then(|array| self.observe_array(array));
        {
            let mut state = self.state.lock();
            state.array_subscription = array_subscription;
            state.value = value;
        }
        self.synchronize_options();
        Ok(())
    }

    fn observe_array(&self, array: &ArrayRef) -> Option<Subscription> {
        let locator = self.locator.upgrade()?;
        let this = self.this.clone();
        let subscription = locator.get_array_observer(array).subscribe(callback(move |_, _| {
            if let Some(observer) = this.upgrade() {
                observer.synchronize_options();
            }
        }));
        Some(subscription)
    }

    /// Select the options matching the current value.
    pub fn synchronize_options(&self) {
        let Some(element) = self.element.upgrade() else {
            return;
        };
        let value = self.get_value();
        let options = element.options();
        for option in options.iter().rev() {
            let selected = match &value {
                Value::Undefined | Value::Null => false,
                Value::Array(array) => array.contains(&option_value(option)),
                other => other.strict_eq(&option_value(option)),
            };
            option.set_property("selected", selected.into());
        }
        trace!(options = options.len(), "synchronized select options");
    }

    /// Rebuild the value from the selected options and notify.
    pub fn synchronize_value(&self) {
        let Some(element) = self.element.upgrade() else {
            return;
        };
        let selected = element.selected_options();
        let value = if element.is_multiple() {
            Value::Array(ArrayRef::new(selected.iter().map(option_value).collect()))
        } else {
            selected.first().map(option_value).unwrap_or(Value::Null)
        };

        {
            let mut state = self.state.lock();
            state.old_value = std::mem::replace(&mut state.value, value);
        }
        self.call();
    }

    pub fn call(&self) {
        let (new_value, old_value) = {
            let state = self.state.lock();
            (state.value.clone(), state.old_value.clone())
        };
        self.callbacks.notify(&new_value, &old_value);
    }

    pub fn subscribe(&self, callback: Callback) -> Subscription {
        let needs_handler = self.state.lock().handler_subscription.is_none();
        if let (true, Some(element)) = (needs_handler, self.element.upgrade()) {
            let this = self.this.clone();
            let subscription = self.handler.subscribe(
                &element,
                Arc::new(move || {
                    if let Some(observer) = this.upgrade() {
                        observer.synchronize_value();
                    }
                }),
            );
            self.state.lock().handler_subscription = Some(subscription);
        }

        let id = self.callbacks.add(callback);
        let this = self.this.clone();
        Subscription::new(move || {
            let Some(observer) = this.upgrade() else {
                return;
            };
            observer.callbacks.remove(id);
            if observer.callbacks.is_empty() {
                let handler_subscription = observer.state.lock().handler_subscription.take();
                if let Some(subscription) = handler_subscription {
                    subscription.dispose();
                }
            }
        })
    }

    /// Start re-synchronizing options when the option list changes.
    pub fn bind(&self) {
        let Some(element) = self.element.upgrade() else {
            return;
        };
        let mut state = self.state.lock();
        if state.child_list.is_some() {
            return;
        }
        let this = self.this.clone();
        state.child_list = Some(element.observe_child_list(move || {
            if let Some(observer) = this.upgrade() {
                observer.synchronize_options();
            }
        }));
    }

    /// Stop watching the option list and release the array subscription.
    pub fn unbind(&self) {
        let (child_list, array_subscription) = {
            let mut state = self.state.lock();
            (state.child_list.take(), state.array_subscription.take())
        };
        if let (Some(id), Some(element)) = (child_list, self.element.upgrade()) {
            element.disconnect_child_list(id);
        }
        if let Some(subscription) = array_subscription {
            subscription.dispose();
        }
    }
}
