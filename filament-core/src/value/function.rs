//! Host functions callable from expressions.

use std::fmt;
use std::sync::Arc;

use super::Value;
use crate::error::Result;

/// Signature of a host function: `(this, args) -> result`.
pub type HostFn = dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync;

/// A named, shared host function.
#[derive(Clone)]
pub struct FunctionRef {
    name: Arc<str>,
    func: Arc<HostFn>,
}

impl FunctionRef {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the function with `this` bound to `this`.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        (self.func)(this, args)
    }

    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_passes_this_and_args() {
        let sum = FunctionRef::new("sum", |_, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).sum()))
        });
        let result = sum.call(&Value::Undefined, &[1.into(), 2.into()]).unwrap();
        assert_eq!(result, Value::from(3));
        assert_eq!(sum.name(), "sum");
        assert!(sum.ptr_eq(&sum.clone()));
    }
}
