//! Observation
//!
//! Observers watch one value and tell subscribers when it changes. Every
//! observer has the same surface:
//!
//! - `get_value()` reads the current value;
//! - `set_value(value)` writes it back where that makes sense;
//! - `subscribe(callback)` registers a `(new_value, old_value)` callback and
//!   returns a [`Subscription`] that removes it again.
//!
//! The strategy is picked once, by the [`ObserverLocator`], and carried in
//! the closed [`Observer`] enum.
//!
//! # Lifetimes
//!
//! Observers are shared through `Arc`. Anything an observer registers
//! somewhere else (an accessor, an event listener, a child subscription)
//! refers back to it weakly, so dropping the last handle releases it even if
//! a subscription was never disposed.

mod array;
mod change_records;
mod composite;
mod dirty;
mod element;
mod locator;
mod path;
mod select;
mod setter;
mod subscription;
mod undefined;

pub use array::ArrayObserver;
pub use change_records::{ObjectObserver, PropertyObserver};
pub use composite::{ChildCondition, CompositeObserver};
pub use dirty::{DirtyCheckProperty, DirtyChecker};
pub use element::ElementObserver;
pub use locator::ObserverLocator;
pub use path::{ObserverResolver, PathObserver};
pub use select::SelectValueObserver;
pub use setter::SetterObserver;
pub use subscription::{callback, Callback, Subscription, SubscriptionId};
pub use undefined::UndefinedPropertyObserver;

use std::fmt;
use std::sync::Arc;

use crate::error::{BindingError, Result};
use crate::value::Value;

/// Any observer the locator or the connect protocol can produce.
#[derive(Clone)]
pub enum Observer {
    Setter(Arc<SetterObserver>),
    Property(Arc<PropertyObserver>),
    Undefined(Arc<UndefinedPropertyObserver>),
    Element(Arc<ElementObserver>),
    SelectValue(Arc<SelectValueObserver>),
    Array(Arc<ArrayObserver>),
    DirtyCheck(Arc<DirtyCheckProperty>),
    Path(Arc<PathObserver>),
    Composite(Arc<CompositeObserver>),
}

impl Observer {
    pub fn get_value(&self) -> Value {
        match self {
            Observer::Setter(o) => o.get_value(),
            Observer::Property(o) => o.get_value(),
            Observer::Undefined(o) => o.get_value(),
            Observer::Element(o) => o.get_value(),
            Observer::SelectValue(o) => o.get_value(),
            Observer::Array(o) => o.get_value(),
            Observer::DirtyCheck(o) => o.get_value(),
            Observer::Path(o) => o.get_value(),
            Observer::Composite(o) => o.get_value(),
        }
    }

    /// Write through the observer.
    ///
    /// Fails for observers of computed values (composites, array contents)
    /// and for invalid select values.
    pub fn set_value(&self, value: Value) -> Result<()> {
        match self {
            Observer::Setter(o) => o.set_value(value),
            Observer::Property(o) => o.set_value(value),
            Observer::Undefined(o) => return o.set_value(value),
            Observer::Element(o) => o.set_value(value),
            Observer::SelectValue(o) => return o.set_value(value),
            Observer::Array(_) => return Err(BindingError::NotAssignable("array contents".to_string())),
            Observer::DirtyCheck(o) => o.set_value(value),
            Observer::Path(o) => return o.set_value(value),
            Observer::Composite(o) => return o.set_value(value),
        }
        Ok(())
    }

    pub fn subscribe(&self, callback: Callback) -> Result<Subscription> {
        match self {
            Observer::Setter(o) => Ok(o.subscribe(callback)),
            Observer::Property(o) => Ok(o.subscribe(callback)),
            Observer::Undefined(o) => o.subscribe(callback),
            Observer::Element(o) => o.subscribe(callback),
            Observer::SelectValue(o) => Ok(o.subscribe(callback)),
            Observer::Array(o) => Ok(o.subscribe(callback)),
            Observer::DirtyCheck(o) => Ok(o.subscribe(callback)),
            Observer::Path(o) => o.subscribe(callback),
            Observer::Composite(o) => o.subscribe(callback),
        }
    }

    /// Short name of the strategy, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Observer::Setter(_) => "setter",
            Observer::Property(_) => "property",
            Observer::Undefined(_) => "undefined",
            Observer::Element(_) => "element",
            Observer::SelectValue(_) => "select-value",
            Observer::Array(_) => "array",
            Observer::DirtyCheck(_) => "dirty-check",
            Observer::Path(_) => "path",
            Observer::Composite(_) => "composite",
        }
    }

    /// Whether both handles point at the same observer.
    pub fn ptr_eq(&self, other: &Observer) -> bool {
        match (self, other) {
            (Observer::Setter(a), Observer::Setter(b)) => Arc::ptr_eq(a, b),
            (Observer::Property(a), Observer::Property(b)) => Arc::ptr_eq(a, b),
            (Observer::Undefined(a), Observer::Undefined(b)) => Arc::ptr_eq(a, b),
            (Observer::Element(a), Observer::Element(b)) => Arc::ptr_eq(a, b),
            (Observer::SelectValue(a), Observer::SelectValue(b)) => Arc::ptr_eq(a, b),
            (Observer::Array(a), Observer::Array(b)) => Arc::ptr_eq(a, b),
            (Observer::DirtyCheck(a), Observer::DirtyCheck(b)) => Arc::ptr_eq(a, b),
            (Observer::Path(a), Observer::Path(b)) => Arc::ptr_eq(a, b),
            (Observer::Composite(a), Observer::Composite(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("kind", &self.kind())
            .field("value", &self.get_value())
            .finish()
    }
}
