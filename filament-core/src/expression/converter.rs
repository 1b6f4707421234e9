//! Value converters.
//!
//! A converter sits in a pipe (`amount | currency:'EUR'`). On the way to the
//! view it formats the value; on the way back from the view it parses it.
//! Either direction is optional.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::value::Value;

/// Converts values between the model and the view.
///
/// Returning `None` means the converter does not handle that direction and
/// the value passes through unchanged.
pub trait ValueConverter: Send + Sync {
    fn to_view(&self, _value: &Value, _args: &[Value]) -> Option<Value> {
        None
    }

    fn from_view(&self, _value: &Value, _args: &[Value]) -> Option<Value> {
        None
    }
}

/// Finds converters by name.
pub trait ConverterLookup {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ValueConverter>>;
}

impl<F> ConverterLookup for F
where
    F: Fn(&str) -> Option<Arc<dyn ValueConverter>>,
{
    fn lookup(&self, name: &str) -> Option<Arc<dyn ValueConverter>> {
        self(name)
    }
}

/// Registered converters, by name.
#[derive(Default)]
pub struct ValueConverterRegistry {
    converters: RwLock<IndexMap<String, Arc<dyn ValueConverter>>>,
}

impl ValueConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C>(&self, name: &str, converter: C)
    where
        C: ValueConverter + 'static,
    {
        self.register_arc(name, Arc::new(converter));
    }

    pub fn register_arc(&self, name: &str, converter: Arc<dyn ValueConverter>) {
        debug!(converter = name, "registered value converter");
        self.converters.write().insert(name.to_string(), converter);
    }

    /// Register under the name derived from a type name.
    ///
    /// `DateFormatValueConverter` registers as `date-format`. Returns the
    /// name used, or `None` when the type name does not follow the
    /// convention.
    pub fn register_by_convention<C>(&self, type_name: &str, converter: C) -> Option<String>
    where
        C: ValueConverter + 'static,
    {
        let name = convention_name(type_name)?;
        self.register(&name, converter);
        Some(name)
    }

    pub fn len(&self) -> usize {
        self.converters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.converters.read().keys().cloned().collect()
    }
}

impl ConverterLookup for ValueConverterRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ValueConverter>> {
        self.converters.read().get(name).cloned()
    }
}

/// The converter name for a `...ValueConverter` type name.
pub fn convention_name(type_name: &str) -> Option<String> {
    let base = type_name.strip_suffix("ValueConverter")?;
    if base.is_empty() {
        return None;
    }

    let mut name = String::with_capacity(base.len() + 4);
    for (i, c) in base.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                name.push('-');
            }
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    Some(name)
}
