//! Expressions
//!
//! A binding expression is a small tree (`user.name`, `a && b`,
//! `amount | currency:'EUR'`). The tree can be evaluated against a
//! [`Scope`](crate::scope::Scope), assigned through when it names a
//! location, connected to observers, and printed back in a canonical form.
//!
//! # Node kinds
//!
//! | kind               | example              |
//! |--------------------|----------------------|
//! | `Chain`            | `a; b`               |
//! | `ValueConverter`   | `a \| upper:1`       |
//! | `Assign`           | `a = b`              |
//! | `Conditional`      | `c ? y : n`          |
//! | `AccessScope`      | `a`                  |
//! | `AccessMember`     | `a.b`                |
//! | `AccessKeyed`      | `a[k]`               |
//! | `CallScope`        | `f(x)`               |
//! | `CallMember`       | `a.f(x)`             |
//! | `CallFunction`     | `a.b(x)(y)`          |
//! | `Binary`           | `a + b`              |
//! | `PrefixNot`        | `!a`                 |
//! | `LiteralPrimitive` | `1`, `true`, `null`  |
//! | `LiteralString`    | `'text'`             |
//! | `LiteralArray`     | `[a, b]`             |
//! | `LiteralObject`    | `{'k': v}`           |
//!
//! Trees are immutable and cheap to clone. They serialize with serde,
//! tagged by `type`:
//!
//! ```json
//! { "type": "AccessMember", "object": { "type": "AccessScope", "name": "user" }, "name": "name" }
//! ```

mod connect;
mod converter;
mod eval;
mod unparse;

pub use connect::ConnectInfo;
pub use converter::{convention_name, ConverterLookup, ValueConverter, ValueConverterRegistry};

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

/// Shared handle to an expression node.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(Arc<ExpressionKind>);

/// A literal that is not a string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
}

/// The node variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExpressionKind {
    Chain {
        expressions: Vec<Expression>,
    },
    ValueConverter {
        expression: Expression,
        name: String,
        args: Vec<Expression>,
        all_args: Vec<Expression>,
    },
    Assign {
        target: Expression,
        value: Expression,
    },
    Conditional {
        condition: Expression,
        yes: Expression,
        no: Expression,
    },
    AccessScope {
        name: String,
    },
    AccessMember {
        object: Expression,
        name: String,
    },
    AccessKeyed {
        object: Expression,
        key: Expression,
    },
    CallScope {
        name: String,
        args: Vec<Expression>,
    },
    CallMember {
        object: Expression,
        name: String,
        args: Vec<Expression>,
    },
    CallFunction {
        func: Expression,
        args: Vec<Expression>,
    },
    Binary {
        operation: String,
        left: Expression,
        right: Expression,
    },
    PrefixNot {
        operation: String,
        expression: Expression,
    },
    LiteralPrimitive {
        value: Primitive,
    },
    LiteralString {
        value: String,
    },
    LiteralArray {
        elements: Vec<Expression>,
    },
    LiteralObject {
        keys: Vec<String>,
        values: Vec<Expression>,
    },
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn kind(&self) -> &ExpressionKind {
        &self.0
    }

    pub fn chain(expressions: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Chain { expressions })
    }

    /// `expression | name:arg1:arg2`
    pub fn value_converter(expression: Expression, name: &str, args: Vec<Expression>) -> Self {
        let mut all_args = Vec::with_capacity(args.len() + 1);
        all_args.push(expression.clone());
        all_args.extend(args.iter().cloned());
        Self::new(ExpressionKind::ValueConverter {
            expression,
            name: name.to_string(),
            args,
            all_args,
        })
    }

    pub fn assignment(target: Expression, value: Expression) -> Self {
        Self::new(ExpressionKind::Assign { target, value })
    }

    pub fn conditional(condition: Expression, yes: Expression, no: Expression) -> Self {
        Self::new(ExpressionKind::Conditional { condition, yes, no })
    }

    pub fn access_scope(name: &str) -> Self {
        Self::new(ExpressionKind::AccessScope { name: name.to_string() })
    }

    pub fn access_member(object: Expression, name: &str) -> Self {
        Self::new(ExpressionKind::AccessMember {
            object,
            name: name.to_string(),
        })
    }

    pub fn access_keyed(object: Expression, key: Expression) -> Self {
        Self::new(ExpressionKind::AccessKeyed { object, key })
    }

    pub fn call_scope(name: &str, args: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::CallScope {
            name: name.to_string(),
            args,
        })
    }

    pub fn call_member(object: Expression, name: &str, args: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::CallMember {
            object,
            name: name.to_string(),
            args,
        })
    }

    pub fn call_function(func: Expression, args: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::CallFunction { func, args })
    }

    pub fn binary(operation: &str, left: Expression, right: Expression) -> Self {
        Self::new(ExpressionKind::Binary {
            operation: operation.to_string(),
            left,
            right,
        })
    }

    pub fn not(expression: Expression) -> Self {
        Self::new(ExpressionKind::PrefixNot {
            operation: "!".to_string(),
            expression,
        })
    }

    pub fn primitive(value: Primitive) -> Self {
        Self::new(ExpressionKind::LiteralPrimitive { value })
    }

    pub fn null() -> Self {
        Self::primitive(Primitive::Null)
    }

    pub fn undefined() -> Self {
        Self::primitive(Primitive::Undefined)
    }

    pub fn number(value: f64) -> Self {
        Self::primitive(Primitive::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::primitive(Primitive::Bool(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(ExpressionKind::LiteralString {
            value: value.to_string(),
        })
    }

    pub fn array(elements: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::LiteralArray { elements })
    }

    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Expression)>,
        K: Into<String>,
    {
        let (keys, values) = entries.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self::new(ExpressionKind::LiteralObject { keys, values })
    }

    /// Whether the node names a location that can be assigned to.
    pub fn is_assignable(&self) -> bool {
        matches!(
            &*self.0,
            ExpressionKind::AccessScope { .. }
                | ExpressionKind::AccessMember { .. }
                | ExpressionKind::AccessKeyed { .. }
        )
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Encode as MessagePack, with struct fields as named map entries.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

impl Deref for Expression {
    type Target = ExpressionKind;

    fn deref(&self) -> &ExpressionKind {
        &self.0
    }
}

impl From<ExpressionKind> for Expression {
    fn from(kind: ExpressionKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<Primitive> for Value {
    fn from(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Null => Value::Null,
            Primitive::Undefined => Value::Undefined,
            Primitive::Bool(b) => Value::Bool(b),
            Primitive::Number(n) => Value::Number(n),
        }
    }
}
