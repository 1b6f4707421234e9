//! Binding Engine
//!
//! Owns the pieces every binding shares and is the entry point for
//! creating bindings or observing values outside of a binding.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::connect_queue::ConnectQueue;
use super::property::BindingExpression;
use super::{Binding, BindingMode};
use crate::config::BindingConfig;
use crate::error::Result;
use crate::expression::{ConnectInfo, ConverterLookup, Expression, ValueConverterRegistry};
use crate::observation::{Observer, ObserverLocator};
use crate::scope::Scope;
use crate::task_queue::TaskQueue;
use crate::value::Value;

/// Binding context for expressions observed directly through the engine.
struct EngineBinding {
    locator: Arc<ObserverLocator>,
    converters: Arc<ValueConverterRegistry>,
}

impl Binding for EngineBinding {
    fn get_observer(&self, object: &Value, name: &str) -> Option<Observer> {
        self.locator.get_observer(object, name)
    }

    fn converters(&self) -> &dyn ConverterLookup {
        &*self.converters
    }
}

/// Shared state for a family of bindings.
pub struct BindingEngine {
    config: BindingConfig,
    task_queue: TaskQueue,
    observer_locator: Arc<ObserverLocator>,
    converters: Arc<ValueConverterRegistry>,
    connect_queue: Arc<ConnectQueue>,
    expression_binding: Arc<dyn Binding>,
}

impl BindingEngine {
    pub fn new(config: BindingConfig) -> Self {
        let task_queue = TaskQueue::new();
        let observer_locator = ObserverLocator::new(task_queue.clone(), config.clone());
        let converters = Arc::new(ValueConverterRegistry::new());
        let connect_queue = ConnectQueue::new(
            task_queue.clone(),
            config.connect_queue_threshold,
            Duration::from_millis(config.frame_budget_ms),
        );
        let expression_binding: Arc<dyn Binding> = Arc::new(EngineBinding {
            locator: observer_locator.clone(),
            converters: converters.clone(),
        });

        info!(
            threshold = config.connect_queue_threshold,
            strategy = ?config.observation_strategy,
            "binding engine created"
        );
        Self {
            config,
            task_queue,
            observer_locator,
            converters,
            connect_queue,
            expression_binding,
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn task_queue(&self) -> &TaskQueue {
        &self.task_queue
    }

    pub fn observer_locator(&self) -> &Arc<ObserverLocator> {
        &self.observer_locator
    }

    pub fn value_converters(&self) -> &Arc<ValueConverterRegistry> {
        &self.converters
    }

    pub fn connect_queue(&self) -> &Arc<ConnectQueue> {
        &self.connect_queue
    }

    /// Describe a binding of `target_property` to `source_expression`.
    pub fn create_binding_expression(
        &self,
        target_property: &str,
        source_expression: Expression,
        mode: BindingMode,
    ) -> BindingExpression {
        BindingExpression::new(
            target_property,
            source_expression,
            mode,
            self.observer_locator.clone(),
            self.converters.clone(),
            self.connect_queue.clone(),
        )
    }

    /// The observer for one property of an object.
    pub fn property_observer(&self, object: &Value, property: &str) -> Option<Observer> {
        self.observer_locator.get_observer(object, property)
    }

    /// Connect `expression` against `scope` without a target.
    ///
    /// The returned observer stays usable as long as the engine lives.
    pub fn expression_observer(&self, scope: &Scope, expression: &Expression) -> Result<ConnectInfo> {
        expression.connect(&self.expression_binding, scope)
    }
}

impl Default for BindingEngine {
    fn default() -> Self {
        Self::new(BindingConfig::default())
    }
}
