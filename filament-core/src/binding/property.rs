//! Property bindings between a source expression and an element property.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error};

use super::connect_queue::ConnectQueue;
use super::{Binding, BindingMode};
use crate::dom::ElementRef;
use crate::error::Result;
use crate::expression::{ConverterLookup, Expression, ValueConverterRegistry};
use crate::observation::{callback, Observer, ObserverLocator, Subscription};
use crate::scope::Scope;
use crate::value::Value;

/// Identity of a binding, used to deduplicate queued connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl BindingId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

/// A reusable description of a binding; creates one binding per target.
pub struct BindingExpression {
    target_property: String,
    source_expression: Expression,
    mode: BindingMode,
    locator: Arc<ObserverLocator>,
    converters: Arc<ValueConverterRegistry>,
    connect_queue: Arc<ConnectQueue>,
}

impl BindingExpression {
    pub(crate) fn new(
        target_property: &str,
        source_expression: Expression,
        mode: BindingMode,
        locator: Arc<ObserverLocator>,
        converters: Arc<ValueConverterRegistry>,
        connect_queue: Arc<ConnectQueue>,
    ) -> Self {
        Self {
            target_property: target_property.to_string(),
            source_expression,
            mode,
            locator,
            converters,
            connect_queue,
        }
    }

    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    pub fn source_expression(&self) -> &Expression {
        &self.source_expression
    }

    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    /// Create a binding for `target`. The binding is inert until bound.
    pub fn create_binding(&self, target: &ElementRef) -> Arc<PropertyBinding> {
        let target_observer = self.locator.get_element_observer(target, &self.target_property);
        Arc::new_cyclic(|this| PropertyBinding {
            this: this.clone(),
            id: BindingId::new(),
            source_expression: self.source_expression.clone(),
            target: target.clone(),
            target_property: self.target_property.clone(),
            mode: self.mode,
            locator: self.locator.clone(),
            converters: self.converters.clone(),
            connect_queue: self.connect_queue.clone(),
            target_observer,
            state: Mutex::new(BindingState::default()),
        })
    }
}

#[derive(Default)]
struct BindingState {
    source: Option<Scope>,
    source_observer: Option<Observer>,
    source_subscription: Option<Subscription>,
    target_subscription: Option<Subscription>,
}

/// Keeps one element property in sync with a source expression.
pub struct PropertyBinding {
    this: Weak<PropertyBinding>,
    id: BindingId,
    source_expression: Expression,
    target: ElementRef,
    target_property: String,
    mode: BindingMode,
    locator: Arc<ObserverLocator>,
    converters: Arc<ValueConverterRegistry>,
    connect_queue: Arc<ConnectQueue>,
    target_observer: Observer,
    state: Mutex<BindingState>,
}

impl PropertyBinding {
    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    pub fn target(&self) -> &ElementRef {
        &self.target
    }

    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    pub fn source_expression(&self) -> &Expression {
        &self.source_expression
    }

    pub fn target_observer(&self) -> &Observer {
        &self.target_observer
    }

    pub fn is_bound(&self) -> bool {
        self.state.lock().source.is_some()
    }

    /// Bind to `source`, rebinding if already bound.
    ///
    /// On failure the binding is left unbound.
    pub fn bind(&self, source: &Scope) -> Result<()> {
        if self.is_bound() {
            self.unbind();
        }
        self.state.lock().source = Some(source.clone());

        if let Observer::SelectValue(select) = &self.target_observer {
            select.bind();
        }

        if let Err(error) = self.start(source) {
            self.unbind();
            return Err(error);
        }

        debug!(
            binding = self.id.raw(),
            property = %self.target_property,
            expression = %self.source_expression,
            mode = ?self.mode,
            "bound"
        );
        Ok(())
    }

    fn start(&self, source: &Scope) -> Result<()> {
        if self.mode.updates_target() {
            let value = self.source_expression.eval(source, &*self.converters)?;
            self.update_target(value)?;
        }

        match self.mode {
            BindingMode::OneTime => {}
            BindingMode::ToView => match self.this.upgrade() {
                Some(this) => self.connect_queue.enqueue(this),
                None => self.connect(false)?,
            },
            BindingMode::TwoWay => {
                self.connect(false)?;
                self.subscribe_target()?;
            }
            BindingMode::FromView => self.subscribe_target()?,
        }
        Ok(())
    }

    /// Connect the source expression and follow its observer.
    ///
    /// With `evaluate` set, the target is updated first. Does nothing once
    /// the binding is unbound.
    pub fn connect(&self, evaluate: bool) -> Result<()> {
        let Some(source) = self.state.lock().source.clone() else {
            return Ok(());
        };
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };

        if evaluate {
            let value = self.source_expression.eval(&source, &*self.converters)?;
            self.update_target(value)?;
        }

        let binding: Arc<dyn Binding> = this;
        let info = self.source_expression.connect(&binding, &source)?;
        let Some(observer) = info.observer else {
            return Ok(());
        };

        let weak = self.this.clone();
        let subscription = observer.subscribe(callback(move |new_value, _| {
            if let Some(binding) = weak.upgrade() {
                binding.source_changed(new_value);
            }
        }))?;

        let previous = {
            let mut state = self.state.lock();
            if state.source.is_none() {
                drop(state);
                subscription.dispose();
                return Ok(());
            }
            state.source_observer = Some(observer);
            state.source_subscription.replace(subscription)
        };
        if let Some(previous) = previous {
            previous.dispose();
        }
        Ok(())
    }

    /// Dispose every subscription. Pending queued connects become no-ops.
    pub fn unbind(&self) {
        let (observer, source_subscription, target_subscription) = {
            let mut state = self.state.lock();
            if state.source.take().is_none() {
                return;
            }
            (
                state.source_observer.take(),
                state.source_subscription.take(),
                state.target_subscription.take(),
            )
        };

        for subscription in [source_subscription, target_subscription].into_iter().flatten() {
            subscription.dispose();
        }
        drop(observer);

        if let Observer::SelectValue(select) = &self.target_observer {
            select.unbind();
        }
        debug!(binding = self.id.raw(), property = %self.target_property, "unbound");
    }

    /// Write `value` to the target property.
    pub fn update_target(&self, value: Value) -> Result<()> {
        self.target_observer.set_value(value)
    }

    /// Assign `value` back through the source expression.
    pub fn update_source(&self, value: Value) -> Result<()> {
        let Some(source) = self.state.lock().source.clone() else {
            return Ok(());
        };
        self.source_expression.assign(&source, value, &*self.converters)?;
        Ok(())
    }

    fn source_changed(&self, new_value: &Value) {
        if !self.is_bound() {
            return;
        }
        if new_value.strict_eq(&self.target_observer.get_value()) {
            return;
        }
        if let Err(error) = self.update_target(new_value.clone()) {
            error!(%error, binding = self.id.raw(), property = %self.target_property, "failed to update target");
        }
    }

    fn subscribe_target(&self) -> Result<()> {
        let weak = self.this.clone();
        let subscription = self.target_observer.subscribe(callback(move |new_value, _| {
            let Some(binding) = weak.upgrade() else {
                return;
            };
            if let Err(error) = binding.update_source(new_value.clone()) {
                error!(%error, binding = binding.id.raw(), "failed to update source");
            }
        }))?;

        let previous = self.state.lock().target_subscription.replace(subscription);
        if let Some(previous) = previous {
            previous.dispose();
        }
        Ok(())
    }
}

impl Binding for PropertyBinding {
    fn get_observer(&self, object: &Value, name: &str) -> Option<Observer> {
        self.locator.get_observer(object, name)
    }

    fn converters(&self) -> &dyn ConverterLookup {
        &*self.converters
    }
}

impl Drop for PropertyBinding {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for subscription in [state.source_subscription.take(), state.target_subscription.take()]
            .into_iter()
            .flatten()
        {
            subscription.dispose();
        }
    }
}
