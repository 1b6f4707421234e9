//! Composite Observer
//!
//! A composite stands for one expression node whose value depends on several
//! sub-expressions. It connects each sub-expression (its children), listens
//! to the ones that matter right now, and re-evaluates the node whenever one
//! of them changes.
//!
//! # How Conditional Connection Works
//!
//! A composite may have one primary child. Every other child carries a
//! [`ChildCondition`] tested against the primary's current value:
//!
//! ```text
//! cond ? yes : no        primary = cond, yes: Truthy, no: Falsy
//! left && right          primary = left, right: Truthy
//! left || right          primary = left, right: Falsy
//! f(a, b)                primary = f,    a, b: IsFunction
//! ```
//!
//! A child whose condition fails is neither connected nor subscribed, so a
//! change only the untaken branch depends on never re-evaluates the node.
//! After every notification the composite runs a connect pass that
//! subscribes children whose condition now holds and unsubscribes the rest.
//!
//! # States
//!
//! ```text
//! Idle --subscribe--> Subscribed --last unsubscribe--> Idle
//! ```
//!
//! Children are only subscribed in the Subscribed state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use super::subscription::{callback, Callback, CallbackList, Subscription};
use super::Observer;
use crate::binding::Binding;
use crate::error::{BindingError, Result};
use crate::expression::{ConnectInfo, Expression, ValueConverterRegistry};
use crate::scope::Scope;
use crate::value::Value;

/// When a non-primary child is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildCondition {
    Always,
    /// The primary value is truthy.
    Truthy,
    /// The primary value is falsy.
    Falsy,
    /// The primary value is a function.
    IsFunction,
}

impl ChildCondition {
    /// Test against the primary value; `None` means the composite has no
    /// primary child.
    pub fn holds(self, primary: Option<&Value>) -> bool {
        match (self, primary) {
            (ChildCondition::Always, _) | (_, None) => true,
            (ChildCondition::Truthy, Some(value)) => value.is_truthy(),
            (ChildCondition::Falsy, Some(value)) => !value.is_truthy(),
            (ChildCondition::IsFunction, Some(value)) => value.is_function(),
        }
    }
}

struct Child {
    expression: Expression,
    condition: ChildCondition,
    info: Option<ConnectInfo>,
    subscription: Option<Subscription>,
}

#[derive(Default)]
struct CompositeState {
    value: Value,
    primary: Option<ConnectInfo>,
    children: Vec<Child>,
    calling: bool,
    rerun: bool,
}

/// Observer for an expression node built from several observable parts.
pub struct CompositeObserver {
    this: Weak<CompositeObserver>,
    expression: Expression,
    scope: Scope,
    binding: Weak<dyn Binding>,
    callbacks: CallbackList,
    state: Mutex<CompositeState>,
}

impl CompositeObserver {
    /// Create a composite for `expression`, evaluating it once.
    pub fn new(expression: &Expression, scope: &Scope, binding: &Arc<dyn Binding>) -> Result<Arc<Self>> {
        let value = expression.eval(scope, binding.converters())?;
        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            expression: expression.clone(),
            scope: scope.clone(),
            binding: Arc::downgrade(binding),
            callbacks: CallbackList::new(),
            state: Mutex::new(CompositeState {
                value,
                ..CompositeState::default()
            }),
        }))
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn get_value(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Composites compute their value and cannot be written.
    pub fn set_value(&self, _value: Value) -> Result<()> {
        Err(BindingError::NotAssignable(self.expression.to_string()))
    }

    /// Whether any child is observable.
    pub fn is_observable(&self) -> bool {
        !self.state.lock().children.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().children.len()
    }

    /// Number of children currently subscribed.
    pub fn subscribed_count(&self) -> usize {
        self.state
            .lock()
            .children
            .iter()
            .filter(|child| child.subscription.is_some())
            .count()
    }

    /// Add the child whose value gates every other child.
    pub fn add_primary(&self, expression: &Expression) -> Result<ConnectInfo> {
        let info = self.add_child(expression, ChildCondition::Always)?;
        self.state.lock().primary = Some(info.clone());
        Ok(info)
    }

    /// Add a child, connecting it now if its condition holds.
    ///
    /// Returns the connect info when the child was connected.
    pub fn add_child(&self, expression: &Expression, condition: ChildCondition) -> Result<ConnectInfo> {
        let primary = self.primary_value();
        let mut info = None;
        if condition.holds(primary.as_ref()) {
            let connected = self.connect_expression(expression)?;
            if connected.observer.is_none() {
                return Ok(connected);
            }
            info = Some(connected);
        }

        let result = info.clone().unwrap_or_default();
        self.state.lock().children.push(Child {
            expression: expression.clone(),
            condition,
            info,
            subscription: None,
        });
        Ok(result)
    }

    pub fn subscribe(&self, callback: Callback) -> Result<Subscription> {
        let id = self.callbacks.add(callback);
        if self.callbacks.len() == 1 {
            if let Err(error) = self.connect(true) {
                self.callbacks.remove(id);
                self.connect(false)?;
                return Err(error);
            }
        }

        // The subscription keeps the composite alive until it is disposed.
        let owner = self.this.upgrade();
        Ok(Subscription::new(move || {
            let Some(observer) = owner else {
                return;
            };
            if observer.callbacks.remove(id) && observer.callbacks.is_empty() {
                if let Err(error) = observer.connect(false) {
                    error!(%error, expression = %observer.expression, "failed to disconnect composite");
                }
            }
        }))
    }

    /// Handle a change of one of the children.
    ///
    /// A change reported while a previous one is still being handled is
    /// picked up once the current pass completes.
    pub fn call(&self) {
        {
            let mut state = self.state.lock();
            if state.calling {
                state.rerun = true;
                return;
            }
            state.calling = true;
        }

        loop {
            self.evaluate_and_notify();

            let subscribed = !self.callbacks.is_empty();
            if let Err(error) = self.connect(subscribed) {
                error!(%error, expression = %self.expression, "failed to reconnect composite");
            }

            let mut state = self.state.lock();
            if !std::mem::take(&mut state.rerun) {
                state.calling = false;
                break;
            }
        }
    }

    fn evaluate_and_notify(&self) {
        let new_value = match self.binding.upgrade() {
            Some(binding) => self.expression.eval(&self.scope, binding.converters()),
            None => self.expression.eval(&self.scope, &ValueConverterRegistry::new()),
        };
        let new_value = match new_value {
            Ok(value) => value,
            Err(error) => {
                error!(%error, expression = %self.expression, "failed to evaluate expression");
                return;
            }
        };
        let old_value = std::mem::replace(&mut self.state.lock().value, new_value.clone());
        self.callbacks.notify(&new_value, &old_value);
    }

    /// Synchronize child subscriptions with the current primary value.
    ///
    /// With `connect` set, children whose condition holds are connected (if
    /// they were not yet) and subscribed; every other child is unsubscribed.
    pub fn connect(&self, connect: bool) -> Result<()> {
        let primary = self.primary_value();
        let count = self.state.lock().children.len();
        trace!(children = count, connect, "composite connect pass");

        for index in 0..count {
            let (expression, condition, observer, subscribed) = {
                let state = self.state.lock();
                let child = &state.children[index];
                (
                    child.expression.clone(),
                    child.condition,
                    child.info.as_ref().map(|info| info.observer.clone()),
                    child.subscription.is_some(),
                )
            };

            if connect && condition.holds(primary.as_ref()) {
                let observer = match observer {
                    Some(observer) => observer,
                    None => {
                        let info = self.connect_expression(&expression)?;
                        let observer = info.observer.clone();
                        self.state.lock().children[index].info = Some(info);
                        observer
                    }
                };
                if let (false, Some(observer)) = (subscribed, observer) {
                    self.subscribe_child(index, &observer)?;
                }
                continue;
            }

            if subscribed {
                let subscription = self.state.lock().children[index].subscription.take();
                if let Some(subscription) = subscription {
                    subscription.dispose();
                }
            }
        }
        Ok(())
    }

    fn subscribe_child(&self, index: usize, observer: &Observer) -> Result<()> {
        let this = self.this.clone();
        let subscription = observer.subscribe(callback(move |_, _| {
            if let Some(composite) = this.upgrade() {
                composite.call();
            }
        }))?;

        let mut state = self.state.lock();
        let child = &mut state.children[index];
        if child.subscription.is_none() {
            child.subscription = Some(subscription);
        } else {
            // a nested pass subscribed this child first
            drop(state);
            subscription.dispose();
        }
        Ok(())
    }

    fn primary_value(&self) -> Option<Value> {
        let primary = self.state.lock().primary.clone()?;
        Some(match &primary.observer {
            Some(observer) => observer.get_value(),
            None => primary.value,
        })
    }

    fn connect_expression(&self, expression: &Expression) -> Result<ConnectInfo> {
        match self.binding.upgrade() {
            Some(binding) => expression.connect(&binding, &self.scope),
            None => Ok(ConnectInfo::default()),
        }
    }
}

impl Drop for CompositeObserver {
    fn drop(&mut self) {
        for child in self.state.get_mut().children.drain(..) {
            if let Some(subscription) = child.subscription {
                subscription.dispose();
            }
        }
    }
}
