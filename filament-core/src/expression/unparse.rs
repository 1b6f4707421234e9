//! Canonical text form of an expression.
//!
//! Binaries and prefixes are parenthesized and strings single-quoted. A
//! conditional or assignment nested as an operand, object, callee or
//! converter argument is parenthesized too, so the output never depends on
//! operator precedence.

use std::fmt::{self, Write};

use super::{Expression, ExpressionKind, Primitive};
use crate::value::format_number;

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExpressionKind::Chain { expressions } => write_list(f, expressions, ";"),
            ExpressionKind::ValueConverter { expression, name, args, .. } => {
                write!(f, "({expression}|{name}")?;
                for arg in args {
                    write!(f, " :{}", Operand(arg))?;
                }
                f.write_char(')')
            }
            ExpressionKind::Assign { target, value } => write!(f, "{}={value}", Operand(target)),
            ExpressionKind::Conditional { condition, yes, no } => {
                write!(f, "{}?{}:{}", Operand(condition), Operand(yes), Nested(no))
            }
            ExpressionKind::AccessScope { name } => f.write_str(name),
            ExpressionKind::AccessMember { object, name } => write!(f, "{}.{name}", Operand(object)),
            ExpressionKind::AccessKeyed { object, key } => write!(f, "{}[{key}]", Operand(object)),
            ExpressionKind::CallScope { name, args } => {
                f.write_str(name)?;
                write_args(f, args)
            }
            ExpressionKind::CallMember { object, name, args } => {
                write!(f, "{}.{name}", Operand(object))?;
                write_args(f, args)
            }
            ExpressionKind::CallFunction { func, args } => {
                write!(f, "{}", Operand(func))?;
                write_args(f, args)
            }
            ExpressionKind::Binary { operation, left, right } => {
                write!(f, "({}{operation}{})", Operand(left), Operand(right))
            }
            ExpressionKind::PrefixNot { operation, expression } => write!(f, "({operation}{})", Operand(expression)),
            ExpressionKind::LiteralPrimitive { value } => match value {
                Primitive::Null => f.write_str("null"),
                Primitive::Undefined => f.write_str("undefined"),
                Primitive::Bool(b) => write!(f, "{b}"),
                Primitive::Number(n) => f.write_str(&format_number(*n)),
            },
            ExpressionKind::LiteralString { value } => write_quoted(f, value),
            ExpressionKind::LiteralArray { elements } => {
                f.write_char('[')?;
                write_list(f, elements, ",")?;
                f.write_char(']')
            }
            ExpressionKind::LiteralObject { keys, values } => {
                f.write_char('{')?;
                for (i, (key, value)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ":{value}")?;
                }
                f.write_char('}')
            }
        }
    }
}

/// Prints a sub-expression, parenthesizing conditionals and assignments.
struct Operand<'a>(&'a Expression);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind() {
            ExpressionKind::Conditional { .. } | ExpressionKind::Assign { .. } | ExpressionKind::Chain { .. } => {
                write!(f, "({})", self.0)
            }
            _ => write!(f, "{}", self.0),
        }
    }
}

/// The `no` branch of a conditional: only assignments need parentheses.
struct Nested<'a>(&'a Expression);

impl fmt::Display for Nested<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind() {
            ExpressionKind::Assign { .. } | ExpressionKind::Chain { .. } => write!(f, "({})", self.0),
            _ => write!(f, "{}", self.0),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, list: &[Expression], separator: &str) -> fmt::Result {
    for (i, expression) in list.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{expression}")?;
    }
    Ok(())
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expression]) -> fmt::Result {
    f.write_char('(')?;
    write_list(f, args, ",")?;
    f.write_char(')')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str) -> Expression {
        Expression::access_scope(name)
    }

    #[test]
    fn binaries_and_prefixes_are_parenthesized() {
        let expression = Expression::binary(
            "*",
            Expression::binary("+", scope("a"), scope("b")),
            Expression::not(scope("c")),
        );
        assert_eq!(expression.to_string(), "((a+b)*(!c))");
    }

    #[test]
    fn access_and_calls() {
        let expression = Expression::call_member(
            Expression::access_keyed(Expression::access_member(scope("user"), "tags"), Expression::number(0.0)),
            "trim",
            vec![scope("x"), Expression::number(1.5)],
        );
        assert_eq!(expression.to_string(), "user.tags[0].trim(x,1.5)");
        assert_eq!(Expression::call_scope("go", vec![]).to_string(), "go()");
        assert_eq!(
            Expression::call_function(Expression::call_scope("make", vec![]), vec![scope("y")]).to_string(),
            "make()(y)"
        );
    }

    #[test]
    fn converters_and_conditionals() {
        let expression = Expression::conditional(
            scope("ok"),
            Expression::value_converter(scope("amount"), "currency", vec![Expression::string("EUR"), scope("digits")]),
            Expression::undefined(),
        );
        assert_eq!(expression.to_string(), "ok?(amount|currency :'EUR' :digits):undefined");
    }

    #[test]
    fn literals_are_quoted() {
        let expression = Expression::object([
            ("it's", Expression::string(r"a\b")),
            ("list", Expression::array(vec![Expression::null(), Expression::boolean(true)])),
        ]);
        assert_eq!(expression.to_string(), r"{'it\'s':'a\\b','list':[null,true]}");
    }

    #[test]
    fn chains_and_assignments() {
        let expression = Expression::chain(vec![
            Expression::assignment(scope("a"), Expression::number(1.0)),
            scope("b"),
        ]);
        assert_eq!(expression.to_string(), "a=1;b");
    }

    #[test]
    fn nested_conditionals_and_assignments_keep_their_grouping() {
        let choice = || Expression::conditional(scope("a"), scope("b"), scope("c"));

        assert_eq!(Expression::access_member(choice(), "x").to_string(), "(a?b:c).x");
        assert_eq!(
            Expression::conditional(choice(), scope("d"), scope("e")).to_string(),
            "(a?b:c)?d:e"
        );
        assert_eq!(
            Expression::conditional(scope("d"), scope("e"), choice()).to_string(),
            "d?e:a?b:c"
        );
        assert_eq!(
            Expression::binary("+", Expression::assignment(scope("a"), Expression::number(1.0)), scope("b"))
                .to_string(),
            "((a=1)+b)"
        );
        assert_eq!(
            Expression::call_function(choice(), vec![Expression::assignment(scope("x"), scope("y"))]).to_string(),
            "(a?b:c)(x=y)"
        );
    }
}
