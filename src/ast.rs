use crate::position::Span;
use crate::types::Type;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// A compiled program: a single top-level block of type void.
#[derive(Debug, Clone)]
pub struct Program {
    pub root: Node,
}

impl Program {
    pub fn statements(&self) -> &[Node] {
        match &self.root.kind {
            NodeKind::Block { statements } => statements,
            _ => std::slice::from_ref(&self.root),
        }
    }
}

/// A typed syntax tree node. `ty` is void for statements.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Type,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn statement(kind: NodeKind, span: Span) -> Self {
        Self::new(kind, Type::VOID, span)
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Literal {
        value: Value,
    },
    Identifier {
        name: String,
    },
    Unary {
        operator: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        left: Box<Node>,
        operator: BinaryOp,
        right: Box<Node>,
    },
    Block {
        statements: Vec<Node>,
    },
    Jump {
        jump: Jump,
        value: Option<Box<Node>>,
    },
    DefineVariable {
        name: String,
        declared: Type,
        initializer: Option<Box<Node>>,
    },
    /// `x = e`, compound forms, and `x ++` / `x --` (which carry no value).
    Assign {
        name: String,
        operator: AssignOp,
        value: Option<Box<Node>>,
    },
    DefineFunction(Rc<FunctionDef>),
    /// Native or user function, resolved by name at run time.
    Call {
        name: String,
        args: Vec<Node>,
    },
    Index {
        name: String,
        index: Box<Node>,
    },
    List {
        elements: Vec<Node>,
    },
    Loop {
        initializer: Box<Node>,
        condition: Box<Node>,
        step: Box<Node>,
        body: Box<Node>,
    },
    Repeat {
        count: Box<Node>,
        body: Box<Node>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    /// if/elif/try/eltry chain. As a statement the bodies are blocks and
    /// `otherwise` is optional; as an expression the bodies are expressions,
    /// `otherwise` is always present and the node carries the result type.
    Conditional {
        branches: Vec<Branch>,
        otherwise: Option<Box<Node>>,
    },
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub body: Node,
}

impl FunctionDef {
    /// Body statements; the call frame is their scope.
    pub fn statements(&self) -> &[Node] {
        match &self.body.kind {
            NodeKind::Block { statements } => statements,
            _ => std::slice::from_ref(&self.body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub guard: Guard,
    pub body: Node,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Guard {
    /// `if` / `elif`: taken when the condition is true.
    Condition(Node),
    /// `try` / `eltry`: taken unless the body fails with a recoverable error.
    Attempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    Return,
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "^",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Negate => f.write_str("-"),
            UnaryOp::Not => f.write_str("not"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Compound(BinaryOp),
    Increment,
    Decrement,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssignOp::Set => f.write_str("="),
            AssignOp::Compound(op) => write!(f, "={}", op),
            AssignOp::Increment => f.write_str("++"),
            AssignOp::Decrement => f.write_str("--"),
        }
    }
}
