//! Element property observation.
//!
//! How a value is read and written depends on the property name:
//!
//! | name                               | access                       |
//! |------------------------------------|------------------------------|
//! | `xlink:href`                       | attribute in the xlink namespace |
//! | `prefix:name`, `data-*`, `aria-*`  | plain attribute              |
//! | anything on an SVG element         | plain attribute              |
//! | `style`, `css`                     | inline CSS text              |
//! | everything else                    | element property             |
//!
//! Element properties change under user interaction, so subscribing needs
//! an [`ElementHandler`] that reports those changes.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::subscription::{Callback, CallbackList, Subscription};
use crate::dom::{ElementHandler, ElementRef, WeakElementRef, XLINK_NAMESPACE};
use crate::error::{BindingError, Result};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ElementAccess {
    NamespacedAttribute(String),
    Attribute,
    Style,
    Property,
}

impl ElementAccess {
    fn for_property(element: &ElementRef, property: &str) -> Self {
        if let Some(name) = property.strip_prefix("xlink:") {
            return Self::NamespacedAttribute(name.to_string());
        }
        if has_namespace_prefix(property)
            || property.starts_with("data-")
            || property.starts_with("aria-")
            || element.is_svg()
        {
            return Self::Attribute;
        }
        if property == "style" || property == "css" {
            return Self::Style;
        }
        Self::Property
    }
}

/// `word:` at the start of the name.
fn has_namespace_prefix(name: &str) -> bool {
    match name.find(':') {
        Some(end) if end > 0 => name[..end]
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Flatten a style object into `name: value; ` pairs.
fn flatten_css(value: &Value) -> String {
    let Some(object) = value.as_object() else {
        return css_string(value);
    };
    object
        .keys()
        .into_iter()
        .map(|key| format!("{}: {}; ", key, object.get(&key).to_display_string()))
        .collect()
}

fn css_string(value: &Value) -> String {
    if value.is_nullish() {
        String::new()
    } else {
        value.to_display_string()
    }
}

struct ElementState {
    old_value: Value,
    handler_subscription: Option<Subscription>,
}

/// Observes one property of a DOM element.
pub struct ElementObserver {
    this: Weak<ElementObserver>,
    element: WeakElementRef,
    property: String,
    access: ElementAccess,
    handler: Option<Arc<dyn ElementHandler>>,
    callbacks: CallbackList,
    state: Mutex<ElementState>,
}

impl ElementObserver {
    pub fn new(element: &ElementRef, property: &str, handler: Option<Arc<dyn ElementHandler>>) -> Arc<Self> {
        let access = ElementAccess::for_property(element, property);
        Arc::new_cyclic(|this| {
            let mut observer = Self {
                this: this.clone(),
                element: element.downgrade(),
                property: property.to_string(),
                access,
                handler,
                callbacks: CallbackList::new(),
                state: Mutex::new(ElementState {
                    old_value: Value::Undefined,
                    handler_subscription: None,
                }),
            };
            let initial = observer.get_value();
            observer.state.get_mut().old_value = initial;
            observer
        })
    }

    pub fn element(&self) -> Option<ElementRef> {
        self.element.upgrade()
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn get_value(&self) -> Value {
        let Some(element) = self.element.upgrade() else {
            return Value::Undefined;
        };
        match &self.access {
            ElementAccess::NamespacedAttribute(name) => element.get_attribute_ns(Some(XLINK_NAMESPACE), name),
            ElementAccess::Attribute => element.get_attribute(&self.property),
            ElementAccess::Style => Value::String(element.css_text()),
            ElementAccess::Property => element.get_property(&self.property),
        }
    }

    pub fn set_value(&self, value: Value) {
        let Some(element) = self.element.upgrade() else {
            return;
        };
        match &self.access {
            ElementAccess::NamespacedAttribute(name) => {
                set_attribute(&element, Some(XLINK_NAMESPACE), name, &value)
            }
            ElementAccess::Attribute => set_attribute(&element, None, &self.property, &value),
            ElementAccess::Style => element.set_css_text(&flatten_css(&value)),
            ElementAccess::Property => {
                element.set_property(&self.property, value);
                if self.handler.is_some() {
                    self.call();
                }
            }
        }
    }

    /// Notify subscribers with the current value and the last one seen.
    pub fn call(&self) {
        let new_value = self.get_value();
        let old_value = std::mem::replace(&mut self.state.lock().old_value, new_value.clone());
        self.callbacks.notify(&new_value, &old_value);
    }

    pub fn subscribe(&self, callback: Callback) -> Result<Subscription> {
        let Some(handler) = &self.handler else {
            return Err(BindingError::UnsupportedObservation(self.property.clone()));
        };

        let needs_handler = self.state.lock().handler_subscription.is_none();
        if let (true, Some(element)) = (needs_handler, self.element.upgrade()) {
            let this = self.this.clone();
            let subscription = handler.subscribe(
                &element,
                Arc::new(move || {
                    if let Some(observer) = this.upgrade() {
                        observer.call();
                    }
                }),
            );
            self.state.lock().handler_subscription = Some(subscription);
        }

        let id = self.callbacks.add(callback);
        let this = self.this.clone();
        Ok(Subscription::new(move || {
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
        }))
    }
}

fn set_attribute(element: &ElementRef, namespace: Option<&str>, name: &str, value: &Value) {
    if value.is_nullish() {
        element.remove_attribute_ns(namespace, name);
    } else {
        element.set_attribute_ns(namespace, name, &value.to_display_string());
    }
}
