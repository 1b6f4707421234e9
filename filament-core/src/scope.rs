//! Scope
//!
//! Expressions evaluate against a two-level scope: the binding context (the
//! view-model) and an override context carrying per-activation values such
//! as `$index` in a repeater. Override contexts chain to their parent, so a
//! nested view can still see names defined further out.
//!
//! # Name resolution
//!
//! For a name, walk the override chain from the innermost level:
//!
//! 1. the level's own override values (`locals`);
//! 2. the level's binding context;
//! 3. the parent level.
//!
//! When no level defines the name, the scope's own binding context is the
//! owner, so assignments to unknown names land on the view-model.

use std::sync::Arc;

use crate::value::{ObjectRef, Value};

/// One level of the override chain.
#[derive(Debug, Clone)]
pub struct OverrideContext {
    binding_context: Value,
    parent: Option<Arc<OverrideContext>>,
    locals: ObjectRef,
}

impl OverrideContext {
    /// Create an override context for `binding_context`, optionally
    /// chained to a parent.
    pub fn new(binding_context: Value, parent: Option<Arc<OverrideContext>>) -> Self {
        Self {
            binding_context,
            parent,
            locals: ObjectRef::new(),
        }
    }

    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    pub fn parent_override_context(&self) -> Option<&Arc<OverrideContext>> {
        self.parent.as_ref()
    }

    /// The override values of this level.
    pub fn locals(&self) -> &ObjectRef {
        &self.locals
    }
}

/// The context an expression evaluates against.
#[derive(Debug, Clone)]
pub struct Scope {
    binding_context: Value,
    override_context: Arc<OverrideContext>,
}

impl Scope {
    /// Create a root scope with a fresh override context.
    pub fn new(binding_context: impl Into<Value>) -> Self {
        let binding_context = binding_context.into();
        let override_context = Arc::new(OverrideContext::new(binding_context.clone(), None));
        Self {
            binding_context,
            override_context,
        }
    }

    /// Create a scope whose override context chains to `parent`.
    pub fn child(binding_context: impl Into<Value>, parent: &Scope) -> Self {
        let binding_context = binding_context.into();
        let override_context = Arc::new(OverrideContext::new(
            binding_context.clone(),
            Some(parent.override_context.clone()),
        ));
        Self {
            binding_context,
            override_context,
        }
    }

    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    pub fn override_context(&self) -> &Arc<OverrideContext> {
        &self.override_context
    }

    /// The object that owns `name` in this scope.
    pub fn context_for(&self, name: &str) -> Value {
        let mut current = Some(&self.override_context);
        while let Some(context) = current {
            if context.locals.has_own(name) {
                return Value::Object(context.locals.clone());
            }
            if let Value::Object(object) = &context.binding_context {
                if object.has_own(name) {
                    return context.binding_context.clone();
                }
            }
            current = context.parent.as_ref();
        }

        if self.binding_context.is_nullish() {
            Value::Object(self.override_context.locals.clone())
        } else {
            self.binding_context.clone()
        }
    }

    /// Read `name` from its owner.
    pub fn get(&self, name: &str) -> Value {
        self.context_for(name).get_property(name)
    }
}
