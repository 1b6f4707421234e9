//! Evaluation and assignment.

use std::cmp::Ordering;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::{ConverterLookup, Expression, ExpressionKind, ValueConverter};
use crate::error::{BindingError, Result};
use crate::scope::Scope;
use crate::value::{ObjectRef, Value};

type Args = SmallVec<[Value; 4]>;

impl Expression {
    /// Evaluate against `scope`.
    ///
    /// Nothing is written except through an `Assign` node.
    pub fn eval(&self, scope: &Scope, converters: &dyn ConverterLookup) -> Result<Value> {
        match self.kind() {
            ExpressionKind::Chain { expressions } => {
                let mut result = Value::Undefined;
                for expression in expressions {
                    let last = expression.eval(scope, converters)?;
                    if !last.is_nullish() {
                        result = last;
                    }
                }
                Ok(result)
            }
            ExpressionKind::ValueConverter { name, all_args, .. } => {
                let converter = find_converter(converters, name)?;
                let args = eval_list(all_args, scope, converters)?;
                let (input, rest) = match args.split_first() {
                    Some((input, rest)) => (input.clone(), rest),
                    None => (Value::Undefined, &[][..]),
                };
                Ok(converter.to_view(&input, rest).unwrap_or(input))
            }
            ExpressionKind::Assign { target, value } => {
                let value = value.eval(scope, converters)?;
                target.assign(scope, value, converters)
            }
            ExpressionKind::Conditional { condition, yes, no } => {
                if condition.eval(scope, converters)?.is_truthy() {
                    yes.eval(scope, converters)
                } else {
                    no.eval(scope, converters)
                }
            }
            ExpressionKind::AccessScope { name } => Ok(scope.get(name)),
            ExpressionKind::AccessMember { object, name } => {
                let instance = object.eval(scope, converters)?;
                if instance.is_nullish() {
                    return Ok(Value::Null);
                }
                Ok(instance.get_property(name))
            }
            ExpressionKind::AccessKeyed { object, key } => {
                let instance = object.eval(scope, converters)?;
                let key = key.eval(scope, converters)?;
                get_keyed(&instance, &key)
            }
            ExpressionKind::CallScope { name, args } => {
                let args = eval_list(args, scope, converters)?;
                let context = scope.context_for(name);
                let func = context.get_property(name);
                call_named(&func, name, &context, &args)
            }
            ExpressionKind::CallMember { object, name, args } => {
                let instance = object.eval(scope, converters)?;
                let args = eval_list(args, scope, converters)?;
                let func = instance.get_property(name);
                call_named(&func, name, &instance, &args)
            }
            ExpressionKind::CallFunction { func, args } => match func.eval(scope, converters)? {
                Value::Function(f) => {
                    let args = eval_list(args, scope, converters)?;
                    f.call(&Value::Undefined, &args)
                }
                _ => Err(BindingError::NotAFunction(func.to_string())),
            },
            ExpressionKind::Binary { operation, left, right } => {
                let left = left.eval(scope, converters)?;
                match operation.as_str() {
                    "&&" => return Ok(Value::Bool(left.is_truthy() && right.eval(scope, converters)?.is_truthy())),
                    "||" => return Ok(Value::Bool(left.is_truthy() || right.eval(scope, converters)?.is_truthy())),
                    _ => {}
                }
                let right = right.eval(scope, converters)?;
                binary(operation, &left, &right)
            }
            ExpressionKind::PrefixNot { expression, .. } => Ok(Value::Bool(!expression.eval(scope, converters)?.is_truthy())),
            ExpressionKind::LiteralPrimitive { value } => Ok((*value).into()),
            ExpressionKind::LiteralString { value } => Ok(Value::String(value.clone())),
            ExpressionKind::LiteralArray { elements } => {
                let items = eval_list(elements, scope, converters)?;
                Ok(Value::from(items.into_vec()))
            }
            ExpressionKind::LiteralObject { keys, values } => {
                let instance = ObjectRef::new();
                for (key, value) in keys.iter().zip(values) {
                    instance.set(key, value.eval(scope, converters)?);
                }
                Ok(Value::Object(instance))
            }
        }
    }

    /// Write `value` to the location this expression names.
    ///
    /// Returns the value written. A converter pipe runs `from_view` on the
    /// value first.
    pub fn assign(&self, scope: &Scope, value: Value, converters: &dyn ConverterLookup) -> Result<Value> {
        match self.kind() {
            ExpressionKind::AccessScope { name } => {
                let context = scope.context_for(name);
                self.set_named(&context, name, value)
            }
            ExpressionKind::AccessMember { object, name } => {
                let mut instance = object.eval(scope, converters)?;
                if !instance.is_truthy() {
                    trace!(expression = %object, "creating missing object for member assignment");
                    instance = Value::Object(ObjectRef::new());
                    object.assign(scope, instance.clone(), converters)?;
                }
                self.set_named(&instance, name, value)
            }
            ExpressionKind::AccessKeyed { object, key } => {
                let instance = object.eval(scope, converters)?;
                let key = key.eval(scope, converters)?;
                set_keyed(&instance, &key, value)
            }
            ExpressionKind::ValueConverter { expression, name, args, .. } => {
                let converter = find_converter(converters, name)?;
                let args = eval_list(args, scope, converters)?;
                let value = converter.from_view(&value, &args).unwrap_or(value);
                expression.assign(scope, value, converters)
            }
            _ => Err(BindingError::NotAssignable(self.to_string())),
        }
    }

    fn set_named(&self, target: &Value, name: &str, value: Value) -> Result<Value> {
        match target {
            Value::Object(object) => {
                object.set(name, value.clone());
                Ok(value)
            }
            Value::Array(_) => set_keyed(target, &Value::from(name), value),
            Value::Undefined | Value::Null => Err(BindingError::NullObjectAccess),
            _ => Err(BindingError::NotAssignable(self.to_string())),
        }
    }
}

fn find_converter(converters: &dyn ConverterLookup, name: &str) -> Result<Arc<dyn ValueConverter>> {
    converters.lookup(name).ok_or_else(|| {
        debug!(converter = name, "value converter not found");
        BindingError::MissingConverter(name.to_string())
    })
}

fn eval_list(list: &[Expression], scope: &Scope, converters: &dyn ConverterLookup) -> Result<Args> {
    list.iter().map(|expression| expression.eval(scope, converters)).collect()
}

fn call_named(func: &Value, name: &str, this: &Value, args: &[Value]) -> Result<Value> {
    match func {
        Value::Function(f) => f.call(this, args),
        Value::Undefined | Value::Null => Err(BindingError::UndefinedFunction(name.to_string())),
        _ => Err(BindingError::NotAFunction(name.to_string())),
    }
}

/// Integer prefix of a key, the way array indices are parsed. Saturates at
/// `usize::MAX`.
fn parse_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if n.is_finite() && *n >= 0.0 => Some(n.trunc() as usize),
        Value::Number(_) => None,
        other => {
            let text = other.to_display_string();
            let text = text.trim_start();
            let digits = text.len() - text.trim_start_matches(|c: char| c.is_ascii_digit()).len();
            // digit runs too long for usize are past any valid index
            text[..digits].parse().ok().or((digits > 0).then_some(usize::MAX))
        }
    }
}

fn get_keyed(instance: &Value, key: &Value) -> Result<Value> {
    match instance {
        Value::Array(array) => Ok(parse_index(key).map(|i| array.get(i)).unwrap_or_default()),
        Value::Undefined | Value::Null => Err(BindingError::NullObjectAccess),
        other => Ok(other.get_property(&key.to_display_string())),
    }
}

fn set_keyed(instance: &Value, key: &Value, value: Value) -> Result<Value> {
    match instance {
        Value::Array(array) => match parse_index(key) {
            Some(index) => array.set(index, value.clone())?,
            None => trace!(key = %key, "ignoring non-index write to array"),
        },
        Value::Object(object) => object.set(&key.to_display_string(), value.clone()),
        Value::Undefined | Value::Null => return Err(BindingError::NullObjectAccess),
        _ => trace!(key = %key, kind = instance.type_name(), "ignoring keyed write to primitive"),
    }
    Ok(value)
}

fn binary(operation: &str, left: &Value, right: &Value) -> Result<Value> {
    if left.is_nullish() || right.is_nullish() {
        let value = match operation {
            "+" if !left.is_nullish() => left.clone(),
            "+" if !right.is_nullish() => right.clone(),
            "-" if !left.is_nullish() => left.clone(),
            "-" if !right.is_nullish() => Value::Number(0.0 - right.to_number()),
            "+" | "-" => Value::Number(0.0),
            _ => Value::Null,
        };
        return Ok(value);
    }

    let l = || left.to_number();
    let r = || right.to_number();
    let value = match operation {
        "+" => add(left, right),
        "-" => Value::Number(l() - r()),
        "*" => Value::Number(l() * r()),
        "/" => Value::Number(l() / r()),
        "~/" => Value::Number((l() / r()).floor()),
        "%" => Value::Number(l() % r()),
        "==" => Value::Bool(left.loose_eq(right)),
        "!=" => Value::Bool(!left.loose_eq(right)),
        "<" => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        ">" => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        "<=" => Value::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        ">=" => Value::Bool(matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal))),
        "^" => Value::Number(f64::from(to_int32(l()) ^ to_int32(r()))),
        "&" => Value::Number(f64::from(to_int32(l()) & to_int32(r()))),
        _ => return Err(BindingError::UnknownOperator(operation.to_string())),
    };
    Ok(value)
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Bool(_))
}

/// `+`: numbers add, anything else concatenates as strings.
fn add(left: &Value, right: &Value) -> Value {
    if is_numeric(left) && is_numeric(right) {
        Value::Number(left.to_number() + right.to_number())
    } else {
        Value::String(left.to_display_string() + &right.to_display_string())
    }
}

/// Relational comparison: two non-numeric operands compare as strings,
/// otherwise both are compared as numbers (`NaN` is unordered).
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if !is_numeric(left) && !is_numeric(right) {
        return Some(left.to_display_string().cmp(&right.to_display_string()));
    }
    left.to_number().partial_cmp(&right.to_number())
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    if wrapped >= 2_147_483_648.0 {
        (wrapped - 4_294_967_296.0) as i32
    } else {
        wrapped as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ValueConverterRegistry;
    use crate::value::{ArrayRef, FunctionRef};

    struct Upper;

    impl ValueConverter for Upper {
        fn to_view(&self, value: &Value, _args: &[Value]) -> Option<Value> {
            Some(value.to_display_string().to_uppercase().into())
        }

        fn from_view(&self, value: &Value, _args: &[Value]) -> Option<Value> {
            Some(value.to_display_string().to_lowercase().into())
        }
    }

    struct Suffix;

    impl ValueConverter for Suffix {
        fn to_view(&self, value: &Value, args: &[Value]) -> Option<Value> {
            let suffix = args.first().map(Value::to_display_string).unwrap_or_default();
            Some(format!("{}{}", value.to_display_string(), suffix).into())
        }
    }

    struct Passthrough;

    impl ValueConverter for Passthrough {}

    fn converters() -> ValueConverterRegistry {
        let registry = ValueConverterRegistry::new();
        registry.register("upper", Upper);
        registry.register("suffix", Suffix);
        registry.register("same", Passthrough);
        registry
    }

    fn scope() -> (ObjectRef, Scope) {
        let vm = ObjectRef::from_pairs([("a", Value::from(2)), ("b", Value::from(3)), ("name", Value::from("ann"))]);
        let scope = Scope::new(vm.clone());
        (vm, scope)
    }

    fn eval(expression: &Expression, scope: &Scope) -> Result<Value> {
        expression.eval(scope, &converters())
    }

    fn scope_var(name: &str) -> Expression {
        Expression::access_scope(name)
    }

    #[test]
    fn arithmetic_and_comparison() {
        let (_, scope) = scope();
        let cases = [
            ("+", 5.0),
            ("-", -1.0),
            ("*", 6.0),
            ("%", 2.0),
            ("~/", 0.0),
            ("^", 1.0),
            ("&", 2.0),
        ];
        for (operation, expected) in cases {
            let expression = Expression::binary(operation, scope_var("a"), scope_var("b"));
            assert_eq!(eval(&expression, &scope).unwrap(), Value::from(expected), "{operation}");
        }

        let less = Expression::binary("<", scope_var("a"), scope_var("b"));
        assert_eq!(eval(&less, &scope).unwrap(), Value::Bool(true));
        let loose = Expression::binary("==", Expression::number(2.0), Expression::string("2"));
        assert_eq!(eval(&loose, &scope).unwrap(), Value::Bool(true));
        let strings = Expression::binary(">", Expression::string("b"), Expression::string("a"));
        assert_eq!(eval(&strings, &scope).unwrap(), Value::Bool(true));
    }

    #[test]
    fn plus_concatenates_strings() {
        let (_, scope) = scope();
        let expression = Expression::binary("+", scope_var("name"), scope_var("a"));
        assert_eq!(eval(&expression, &scope).unwrap(), Value::from("ann2"));
        let expression = Expression::binary("+", Expression::number(1.0), Expression::string("x"));
        assert_eq!(eval(&expression, &scope).unwrap(), Value::from("1x"));
    }

    #[test]
    fn nullish_operands() {
        let (_, scope) = scope();
        let missing = || scope_var("missing");
        let cases = [
            (Expression::binary("+", scope_var("a"), missing()), Value::from(2)),
            (Expression::binary("+", missing(), scope_var("b")), Value::from(3)),
            (Expression::binary("+", missing(), Expression::null()), Value::from(0)),
            (Expression::binary("-", scope_var("a"), missing()), Value::from(2)),
            (Expression::binary("-", missing(), scope_var("b")), Value::from(-3)),
            (Expression::binary("-", missing(), missing()), Value::from(0)),
            (Expression::binary("*", missing(), scope_var("b")), Value::Null),
            (Expression::binary("==", missing(), Expression::null()), Value::Null),
        ];
        for (expression, expected) in cases {
            assert_eq!(eval(&expression, &scope).unwrap(), expected, "{expression}");
        }
    }

    #[test]
    fn logical_operators_short_circuit_and_yield_booleans() {
        let (_, scope) = scope();
        let boom = Expression::call_scope("boom", vec![]);
        let and = Expression::binary("&&", Expression::boolean(false), boom.clone());
        let or = Expression::binary("||", scope_var("name"), boom);
        assert_eq!(eval(&and, &scope).unwrap(), Value::Bool(false));
        assert_eq!(eval(&or, &scope).unwrap(), Value::Bool(true));
    }

    #[test]
    fn unknown_operator_fails() {
        let (_, scope) = scope();
        let expression = Expression::binary("<<", scope_var("a"), scope_var("b"));
        assert!(matches!(
            eval(&expression, &scope),
            Err(BindingError::UnknownOperator(op)) if op == "<<"
        ));
    }

    #[test]
    fn member_access_on_null_yields_null() {
        let (_, scope) = scope();
        let expression = Expression::access_member(scope_var("missing"), "x");
        assert_eq!(eval(&expression, &scope).unwrap(), Value::Null);
    }

    #[test]
    fn keyed_access() {
        let (vm, scope) = scope();
        vm.set("items", Value::from(vec!["x".into(), "y".into()]));
        vm.set("map", Value::Object(ObjectRef::from_pairs([("1", "one")])));

        let by_string = Expression::access_keyed(scope_var("items"), Expression::string("1"));
        let by_number = Expression::access_keyed(scope_var("map"), Expression::number(1.0));
        assert_eq!(eval(&by_string, &scope).unwrap(), Value::from("y"));
        assert_eq!(eval(&by_number, &scope).unwrap(), Value::from("one"));

        let on_null = Expression::access_keyed(scope_var("missing"), Expression::number(0.0));
        assert!(matches!(eval(&on_null, &scope), Err(BindingError::NullObjectAccess)));
    }

    #[test]
    fn keyed_assignment_grows_arrays() {
        let (vm, scope) = scope();
        let items = ArrayRef::new(vec!["x".into()]);
        vm.set("items", items.clone().into());

        let expression = Expression::access_keyed(scope_var("items"), Expression::number(3.0));
        expression.assign(&scope, "z".into(), &converters()).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items.get(3), Value::from("z"));
        assert_eq!(items.get(2), Value::Undefined);
    }

    #[test]
    fn member_assignment_creates_missing_object() {
        let (vm, scope) = scope();
        let expression = Expression::access_member(scope_var("address"), "city");
        expression.assign(&scope, "Oslo".into(), &converters()).unwrap();
        assert_eq!(vm.get("address").get_property("city"), Value::from("Oslo"));
    }

    #[test]
    fn member_assignment_replaces_falsy_objects() {
        let (vm, scope) = scope();
        vm.set("flag", 0.into());
        vm.set("label", "".into());

        Expression::access_member(scope_var("flag"), "on")
            .assign(&scope, true.into(), &converters())
            .unwrap();
        Expression::access_member(scope_var("label"), "text")
            .assign(&scope, "hi".into(), &converters())
            .unwrap();
        assert_eq!(vm.get("flag").get_property("on"), Value::Bool(true));
        assert_eq!(vm.get("label").get_property("text"), Value::from("hi"));
    }

    #[test]
    fn keyed_assignment_past_the_maximum_length_fails() {
        let (vm, scope) = scope();
        let items = ArrayRef::new(vec!["x".into()]);
        vm.set("items", items.clone().into());

        let keys = [
            Expression::number(1e300),
            Expression::number(4294967295.0),
            Expression::string("99999999999999999999999"),
        ];
        for key in keys {
            let error = Expression::access_keyed(scope_var("items"), key)
                .assign(&scope, "z".into(), &converters())
                .unwrap_err();
            assert!(matches!(error, BindingError::InvalidArrayLength));
        }
        assert_eq!(items.to_vec(), vec![Value::from("x")]);

        let read = Expression::access_keyed(scope_var("items"), Expression::number(1e300));
        assert_eq!(read.eval(&scope, &converters()).unwrap(), Value::Undefined);
    }

    #[test]
    fn assign_node_writes_through_target() {
        let (vm, scope) = scope();
        let expression = Expression::assignment(scope_var("a"), Expression::number(9.0));
        assert_eq!(eval(&expression, &scope).unwrap(), Value::from(9));
        assert_eq!(vm.get("a"), Value::from(9));
    }

    #[test]
    fn non_assignable_nodes_fail() {
        let (_, scope) = scope();
        let expression = Expression::binary("+", scope_var("a"), scope_var("b"));
        let error = expression.assign(&scope, 1.into(), &converters()).unwrap_err();
        assert_eq!(error.to_string(), "Cannot assign to (a+b)");
    }

    #[test]
    fn chain_returns_last_non_null() {
        let (_, scope) = scope();
        let expression = Expression::chain(vec![scope_var("a"), Expression::null(), scope_var("missing")]);
        assert_eq!(eval(&expression, &scope).unwrap(), Value::from(2));
    }

    #[test]
    fn conditional_evaluates_one_branch() {
        let (_, scope) = scope();
        let boom = Expression::call_scope("boom", vec![]);
        let expression = Expression::conditional(scope_var("a"), Expression::string("yes"), boom);
        assert_eq!(eval(&expression, &scope).unwrap(), Value::from("yes"));
    }

    #[test]
    fn calls() {
        let (vm, scope) = scope();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = calls.clone();
        vm.set(
            "greet",
            FunctionRef::new("greet", move |this, args| {
                seen.lock().push(this.get_property("name"));
                Ok(format!("hi {}", args[0].to_display_string()).into())
            })
            .into(),
        );

        let call = Expression::call_scope("greet", vec![Expression::string("bob")]);
        assert_eq!(eval(&call, &scope).unwrap(), Value::from("hi bob"));
        assert_eq!(calls.lock().as_slice(), &[Value::from("ann")]);

        let missing = Expression::call_scope("nope", vec![]);
        assert_eq!(eval(&missing, &scope).unwrap_err().to_string(), "Undefined function nope");
        let on_missing = Expression::call_member(scope_var("missing"), "a", vec![]);
        assert!(matches!(eval(&on_missing, &scope), Err(BindingError::UndefinedFunction(_))));
        let callee = Expression::call_function(scope_var("a"), vec![]);
        assert_eq!(eval(&callee, &scope).unwrap_err().to_string(), "a is not a function");
        let member = Expression::call_member(Expression::object([("a", Expression::number(1.0))]), "a", vec![]);
        assert_eq!(eval(&member, &scope).unwrap_err().to_string(), "a is not a function");
    }

    #[test]
    fn host_errors_propagate() {
        let (vm, scope) = scope();
        vm.set("fail", FunctionRef::new("fail", |_, _| Err(BindingError::host("nope"))).into());
        let call = Expression::call_scope("fail", vec![]);
        assert!(matches!(eval(&call, &scope), Err(BindingError::Host(message)) if message == "nope"));
    }

    #[test]
    fn converters_in_both_directions() {
        let (vm, scope) = scope();
        let upper = Expression::value_converter(scope_var("name"), "upper", vec![]);
        assert_eq!(eval(&upper, &scope).unwrap(), Value::from("ANN"));

        upper.assign(&scope, "BOB".into(), &converters()).unwrap();
        assert_eq!(vm.get("name"), Value::from("bob"));

        let suffix = Expression::value_converter(scope_var("name"), "suffix", vec![Expression::string("!")]);
        assert_eq!(eval(&suffix, &scope).unwrap(), Value::from("bob!"));
        suffix.assign(&scope, "eve".into(), &converters()).unwrap();
        assert_eq!(vm.get("name"), Value::from("eve"));

        let same = Expression::value_converter(scope_var("a"), "same", vec![]);
        assert_eq!(eval(&same, &scope).unwrap(), Value::from(2));

        let missing = Expression::value_converter(scope_var("a"), "nope", vec![]);
        assert!(matches!(eval(&missing, &scope), Err(BindingError::MissingConverter(name)) if name == "nope"));
    }

    #[test]
    fn literals() {
        let (_, scope) = scope();
        let array = eval(&Expression::array(vec![scope_var("a"), Expression::string("s")]), &scope).unwrap();
        assert_eq!(array.get_property("length"), Value::from(2));
        assert_eq!(array.get_property("1"), Value::from("s"));

        let object = eval(&Expression::object([("k", scope_var("b"))]), &scope).unwrap();
        assert_eq!(object.get_property("k"), Value::from(3));
        assert_eq!(eval(&Expression::not(scope_var("a")), &scope).unwrap(), Value::Bool(false));
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(f64::NAN), 0);
    }
}
