use crate::types::{Primitive, Type};
use std::fmt;

/// A runtime value. Its variant always matches the static [`Type`] of the
/// node that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    /// Element primitive plus the items, so empty lists still know their type.
    List(Primitive, Vec<Value>),
    Void,
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::INT,
            Value::Double(_) => Type::DOUBLE,
            Value::Bool(_) => Type::BOOL,
            Value::String(_) => Type::STRING,
            Value::List(element, _) => Type::list_of(*element),
            Value::Void => Type::VOID,
        }
    }

    /// Widens Int to Double when the target type asks for it.
    pub fn coerce_to(self, target: Type) -> Value {
        match self {
            Value::Int(n) if target == Type::DOUBLE => Value::Double(n as f64),
            Value::List(Primitive::Int, items) if target == Type::list_of(Primitive::Double) => Value::List(
                Primitive::Double,
                items.into_iter().map(|item| item.coerce_to(Type::DOUBLE)).collect(),
            ),
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view used for mixed Int/Double arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(n) => {
                // Always show at least one decimal place for doubles
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::List(_, items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Void => write!(f, "void"),
        }
    }
}
