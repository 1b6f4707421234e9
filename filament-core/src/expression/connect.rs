//! Connecting expressions to observers.
//!
//! `connect` evaluates a node and returns the observer that reports when
//! that value changes, if any. Leaves observe a property through the
//! binding's locator; inner nodes wrap their children in a
//! [`CompositeObserver`] that connects only the children the current
//! values make reachable.

use std::sync::Arc;

use tracing::trace;

use super::{Expression, ExpressionKind};
use crate::binding::Binding;
use crate::error::Result;
use crate::observation::{ChildCondition, CompositeObserver, Observer, ObserverResolver, PathObserver};
use crate::scope::Scope;
use crate::value::Value;

/// The result of connecting an expression.
#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    /// The value at connect time.
    pub value: Value,
    /// Reports changes of the value; `None` when nothing can change it.
    pub observer: Option<Observer>,
}

impl ConnectInfo {
    fn constant(value: Value) -> Self {
        Self { value, observer: None }
    }
}

impl Expression {
    /// Connect this expression for `binding`.
    ///
    /// `Assign` and `Chain` are not observable and are not evaluated here.
    pub fn connect(&self, binding: &Arc<dyn Binding>, scope: &Scope) -> Result<ConnectInfo> {
        let info = match self.kind() {
            ExpressionKind::Assign { .. } | ExpressionKind::Chain { .. } => ConnectInfo::default(),
            ExpressionKind::LiteralPrimitive { value } => ConnectInfo::constant((*value).into()),
            ExpressionKind::LiteralString { value } => ConnectInfo::constant(Value::String(value.clone())),
            ExpressionKind::AccessScope { name } => {
                let context = scope.context_for(name);
                ConnectInfo {
                    value: context.get_property(name),
                    observer: binding.get_observer(&context, name),
                }
            }
            ExpressionKind::AccessMember { object, name } => self.connect_member(binding, scope, object, name)?,
            ExpressionKind::ValueConverter { all_args, .. } => {
                self.connect_composite(binding, scope, |composite| {
                    for arg in all_args {
                        composite.add_child(arg, ChildCondition::Always)?;
                    }
                    Ok(())
                })?
            }
            ExpressionKind::Conditional { condition, yes, no } => {
                self.connect_composite(binding, scope, |composite| {
                    composite.add_primary(condition)?;
                    composite.add_child(yes, ChildCondition::Truthy)?;
                    composite.add_child(no, ChildCondition::Falsy)?;
                    Ok(())
                })?
            }
            ExpressionKind::AccessKeyed { object, key } => self.connect_composite(binding, scope, |composite| {
                composite.add_child(object, ChildCondition::Always)?;
                composite.add_child(key, ChildCondition::Always)?;
                Ok(())
            })?,
            ExpressionKind::CallScope { name, args } => {
                let callee = Expression::access_scope(name);
                self.connect_call(binding, scope, &callee, args)?
            }
            ExpressionKind::CallMember { object, name, args } => {
                let callee = Expression::access_member(object.clone(), name);
                self.connect_call(binding, scope, &callee, args)?
            }
            ExpressionKind::CallFunction { func, args } => self.connect_call(binding, scope, func, args)?,
            ExpressionKind::Binary { operation, left, right } => {
                self.connect_composite(binding, scope, |composite| match operation.as_str() {
                    "&&" => {
                        composite.add_primary(left)?;
                        composite.add_child(right, ChildCondition::Truthy)?;
                        Ok(())
                    }
                    "||" => {
                        composite.add_primary(left)?;
                        composite.add_child(right, ChildCondition::Falsy)?;
                        Ok(())
                    }
                    _ => {
                        composite.add_child(left, ChildCondition::Always)?;
                        composite.add_child(right, ChildCondition::Always)?;
                        Ok(())
                    }
                })?
            }
            ExpressionKind::PrefixNot { expression, .. } => self.connect_composite(binding, scope, |composite| {
                composite.add_child(expression, ChildCondition::Always)?;
                Ok(())
            })?,
            ExpressionKind::LiteralArray { elements } => self.connect_composite(binding, scope, |composite| {
                for element in elements {
                    composite.add_child(element, ChildCondition::Always)?;
                }
                Ok(())
            })?,
            ExpressionKind::LiteralObject { values, .. } => self.connect_composite(binding, scope, |composite| {
                for value in values {
                    composite.add_child(value, ChildCondition::Always)?;
                }
                Ok(())
            })?,
        };

        trace!(
            expression = %self,
            observer = info.observer.as_ref().map(Observer::kind).unwrap_or("none"),
            "connected expression"
        );
        Ok(info)
    }

    fn connect_member(
        &self,
        binding: &Arc<dyn Binding>,
        scope: &Scope,
        object: &Expression,
        name: &str,
    ) -> Result<ConnectInfo> {
        let object_info = object.connect(binding, scope)?;
        let value = if object_info.value.is_nullish() {
            Value::Null
        } else {
            object_info.value.get_property(name)
        };

        let observer = match object_info.observer {
            Some(left) => {
                let weak = Arc::downgrade(binding);
                let member = name.to_string();
                let resolve: ObserverResolver =
                    Arc::new(move |object: &Value| weak.upgrade()?.get_observer(object, &member));
                Some(Observer::Path(PathObserver::new(left, resolve)))
            }
            None => binding.get_observer(&object_info.value, name),
        };
        Ok(ConnectInfo { value, observer })
    }

    /// `callee(args)`: the arguments are connected only while the callee is
    /// a function.
    fn connect_call(
        &self,
        binding: &Arc<dyn Binding>,
        scope: &Scope,
        callee: &Expression,
        args: &[Expression],
    ) -> Result<ConnectInfo> {
        self.connect_composite(binding, scope, |composite| {
            composite.add_primary(callee)?;
            for arg in args {
                composite.add_child(arg, ChildCondition::IsFunction)?;
            }
            Ok(())
        })
    }

    fn connect_composite<F>(&self, binding: &Arc<dyn Binding>, scope: &Scope, add_children: F) -> Result<ConnectInfo>
    where
        F: FnOnce(&CompositeObserver) -> Result<()>,
    {
        let composite = CompositeObserver::new(self, scope, binding)?;
        add_children(&composite)?;
        let observer = composite.is_observable().then(|| Observer::Composite(composite.clone()));
        Ok(ConnectInfo {
            value: composite.get_value(),
            observer,
        })
    }
}
