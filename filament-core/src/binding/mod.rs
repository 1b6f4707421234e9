//! Bindings
//!
//! A binding ties a source expression, evaluated against a [`Scope`], to a
//! property of a target element. The [`BindingEngine`] owns the shared
//! machinery (task queue, observer locator, converters and the connect
//! queue) and hands out [`BindingExpression`]s that create bindings.
//!
//! # Modes
//!
//! | mode       | source to target | target to source |
//! |------------|------------------|------------------|
//! | `OneTime`  | once, at bind    | no               |
//! | `ToView`   | yes              | no               |
//! | `FromView` | no               | yes              |
//! | `TwoWay`   | yes              | yes              |
//!
//! [`Scope`]: crate::scope::Scope

mod connect_queue;
mod engine;
mod property;

pub use connect_queue::ConnectQueue;
pub use engine::BindingEngine;
pub use property::{BindingExpression, BindingId, PropertyBinding};

use serde::{Deserialize, Serialize};

use crate::expression::ConverterLookup;
use crate::observation::Observer;
use crate::value::Value;

/// What an expression needs from its binding while connecting.
pub trait Binding: Send + Sync {
    /// The observer for `name` on `object`, if it can be observed.
    fn get_observer(&self, object: &Value, name: &str) -> Option<Observer>;

    /// Converters available to pipes in the expression.
    fn converters(&self) -> &dyn ConverterLookup;
}

/// Direction of data flow for a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingMode {
    OneTime,
    #[default]
    ToView,
    FromView,
    TwoWay,
}

impl BindingMode {
    /// Whether the source updates the target.
    pub fn updates_target(self) -> bool {
        !matches!(self, BindingMode::FromView)
    }

    /// Whether the target updates the source.
    pub fn updates_source(self) -> bool {
        matches!(self, BindingMode::FromView | BindingMode::TwoWay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_serialize_camel_case() {
        assert_eq!(serde_json::to_string(&BindingMode::TwoWay).unwrap(), "\"twoWay\"");
        let mode: BindingMode = serde_json::from_str("\"fromView\"").unwrap();
        assert_eq!(mode, BindingMode::FromView);
    }

    #[test]
    fn mode_directions() {
        assert!(BindingMode::OneTime.updates_target());
        assert!(!BindingMode::OneTime.updates_source());
        assert!(!BindingMode::FromView.updates_target());
        assert!(BindingMode::TwoWay.updates_source());
    }
}
