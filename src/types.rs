use crate::ast::{BinaryOp, UnaryOp};
use crate::value::Value;
use std::fmt;

/// The non-list part of a [`Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Double,
    Bool,
    String,
    Void,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Primitive::Int => "int",
            Primitive::Double => "double",
            Primitive::Bool => "bool",
            Primitive::String => "string",
            Primitive::Void => "void",
        };
        f.write_str(name)
    }
}

/// Static type of a node or declaration: a primitive, optionally as a list.
///
/// Lists are one level deep. `Void` only marks statements and functions that
/// return nothing; it is never an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub primitive: Primitive,
    pub is_list: bool,
}

impl Type {
    pub const INT: Type = Type::scalar(Primitive::Int);
    pub const DOUBLE: Type = Type::scalar(Primitive::Double);
    pub const BOOL: Type = Type::scalar(Primitive::Bool);
    pub const STRING: Type = Type::scalar(Primitive::String);
    pub const VOID: Type = Type::scalar(Primitive::Void);

    pub const fn scalar(primitive: Primitive) -> Self {
        Self {
            primitive,
            is_list: false,
        }
    }

    pub const fn list_of(primitive: Primitive) -> Self {
        Self {
            primitive,
            is_list: true,
        }
    }

    /// Type of a single element of this list type.
    pub fn element(self) -> Type {
        Type::scalar(self.primitive)
    }

    pub fn is_void(self) -> bool {
        self == Type::VOID
    }

    pub fn is_numeric(self) -> bool {
        self == Type::INT || self == Type::DOUBLE
    }

    /// Whether a value of type `source` may be stored where `self` is expected.
    ///
    /// Int widens to Double; everything else must match exactly.
    pub fn accepts(self, source: Type) -> bool {
        if self.is_void() || source.is_void() {
            return false;
        }
        self == source || (self == Type::DOUBLE && source == Type::INT)
    }

    /// Zero value for a declaration without an initializer.
    pub fn default_value(self) -> Value {
        if self.is_list {
            return Value::List(self.primitive, Vec::new());
        }
        match self.primitive {
            Primitive::Int => Value::Int(0),
            Primitive::Double => Value::Double(0.0),
            Primitive::Bool => Value::Bool(false),
            Primitive::String => Value::String(String::new()),
            Primitive::Void => Value::Void,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_list {
            write!(f, "{}[]", self.primitive)
        } else {
            write!(f, "{}", self.primitive)
        }
    }
}

fn widen(left: Type, right: Type) -> Type {
    if left == Type::DOUBLE || right == Type::DOUBLE {
        Type::DOUBLE
    } else {
        Type::INT
    }
}

/// Result type of `left op right`, or `None` if the operator does not apply.
pub fn binary_result(op: BinaryOp, left: Type, right: Type) -> Option<Type> {
    let numeric = left.is_numeric() && right.is_numeric();
    match op {
        BinaryOp::Add => {
            if numeric {
                Some(widen(left, right))
            } else if (left == Type::STRING && (right.is_numeric() || right == Type::STRING))
                || (right == Type::STRING && left.is_numeric())
            {
                Some(Type::STRING)
            } else {
                None
            }
        }
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Power => numeric.then(|| widen(left, right)),
        BinaryOp::Divide => numeric.then_some(Type::DOUBLE),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            numeric.then_some(Type::BOOL)
        }
        BinaryOp::Equal | BinaryOp::NotEqual => {
            let comparable = numeric
                || (left == Type::STRING && right == Type::STRING)
                || (left == Type::BOOL && right == Type::BOOL);
            comparable.then_some(Type::BOOL)
        }
        BinaryOp::And | BinaryOp::Or => (left == Type::BOOL && right == Type::BOOL).then_some(Type::BOOL),
    }
}

/// Result type of `op operand`, or `None` if the operator does not apply.
pub fn unary_result(op: UnaryOp, operand: Type) -> Option<Type> {
    match op {
        UnaryOp::Negate => operand.is_numeric().then_some(operand),
        UnaryOp::Not => (operand == Type::BOOL).then_some(Type::BOOL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arithmetic_widens_to_double() {
        for op in [BinaryOp::Add, BinaryOp::Subtract, BinaryOp::Multiply, BinaryOp::Power] {
            assert_eq!(binary_result(op, Type::INT, Type::INT), Some(Type::INT));
            assert_eq!(binary_result(op, Type::INT, Type::DOUBLE), Some(Type::DOUBLE));
            assert_eq!(binary_result(op, Type::DOUBLE, Type::INT), Some(Type::DOUBLE));
            assert_eq!(binary_result(op, Type::DOUBLE, Type::DOUBLE), Some(Type::DOUBLE));
        }
        assert_eq!(binary_result(BinaryOp::Divide, Type::INT, Type::INT), Some(Type::DOUBLE));
    }

    #[test]
    fn string_concatenation_is_symmetric() {
        assert_eq!(binary_result(BinaryOp::Add, Type::STRING, Type::INT), Some(Type::STRING));
        assert_eq!(binary_result(BinaryOp::Add, Type::INT, Type::STRING), Some(Type::STRING));
        assert_eq!(binary_result(BinaryOp::Add, Type::DOUBLE, Type::STRING), Some(Type::STRING));
        assert_eq!(binary_result(BinaryOp::Add, Type::BOOL, Type::INT), None);
        assert_eq!(binary_result(BinaryOp::Add, Type::STRING, Type::BOOL), None);
        assert_eq!(binary_result(BinaryOp::Subtract, Type::STRING, Type::STRING), None);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(binary_result(BinaryOp::Less, Type::INT, Type::DOUBLE), Some(Type::BOOL));
        assert_eq!(binary_result(BinaryOp::Less, Type::STRING, Type::STRING), None);
        assert_eq!(binary_result(BinaryOp::Equal, Type::BOOL, Type::BOOL), Some(Type::BOOL));
        assert_eq!(binary_result(BinaryOp::Equal, Type::BOOL, Type::INT), None);
        assert_eq!(binary_result(BinaryOp::And, Type::BOOL, Type::BOOL), Some(Type::BOOL));
        assert_eq!(binary_result(BinaryOp::Or, Type::BOOL, Type::INT), None);
    }

    #[test]
    fn lists_and_void_are_never_operands() {
        let ints = Type::list_of(Primitive::Int);
        assert_eq!(binary_result(BinaryOp::Add, ints, ints), None);
        assert_eq!(binary_result(BinaryOp::Equal, ints, ints), None);
        assert_eq!(binary_result(BinaryOp::Add, Type::VOID, Type::INT), None);
        assert_eq!(unary_result(UnaryOp::Negate, ints), None);
    }

    #[test]
    fn unary_rules() {
        assert_eq!(unary_result(UnaryOp::Negate, Type::DOUBLE), Some(Type::DOUBLE));
        assert_eq!(unary_result(UnaryOp::Negate, Type::BOOL), None);
        assert_eq!(unary_result(UnaryOp::Not, Type::BOOL), Some(Type::BOOL));
        assert_eq!(unary_result(UnaryOp::Not, Type::INT), None);
    }

    #[test]
    fn assignment_compatibility() {
        assert!(Type::DOUBLE.accepts(Type::INT));
        assert!(!Type::INT.accepts(Type::DOUBLE));
        assert!(Type::list_of(Primitive::String).accepts(Type::list_of(Primitive::String)));
        assert!(!Type::list_of(Primitive::Double).accepts(Type::list_of(Primitive::Int)));
        assert!(!Type::VOID.accepts(Type::VOID));
        assert_eq!(Type::list_of(Primitive::Bool).to_string(), "bool[]");
    }
}
