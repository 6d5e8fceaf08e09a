use crate::ast::{AssignOp, BinaryOp, Branch, FunctionDef, Guard, Jump, Node, NodeKind, Program, UnaryOp};
use crate::config::RunConfig;
use crate::error::{BotError, Span};
use crate::natives::NativeTable;
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub type ScopeRef = Rc<RefCell<Scope>>;

/// One level of the runtime symbol table.
#[derive(Debug, Default)]
pub struct Scope {
    variables: HashMap<String, Value>,
    functions: HashMap<String, Rc<Function>>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: Some(Rc::clone(parent)),
            ..Scope::default()
        }))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.variables.get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref()?.borrow().get(name),
        }
    }

    pub fn define(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Overwrites the nearest binding of `name`. Returns false if there is none.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.variables.get_mut(name) {
            *slot = value;
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().assign(name, value)
        } else {
            false
        }
    }

    pub fn function(&self, name: &str) -> Option<Rc<Function>> {
        match self.functions.get(name) {
            Some(function) => Some(Rc::clone(function)),
            None => self.parent.as_ref()?.borrow().function(name),
        }
    }

    pub fn define_function(&mut self, function: Function) {
        self.functions
            .insert(function.def.name.clone(), Rc::new(function));
    }
}

/// A user function bound to the scope it was defined in.
///
/// The link is weak: a function is only reachable from inside its defining
/// scope, so that scope is alive whenever the function can be called.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub closure: Weak<RefCell<Scope>>,
}

/// How evaluation of a node finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

/// Unwraps a normal result or hands any other flow straight back to the caller.
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Normal(value) => value,
            other => return Ok(other),
        }
    };
}

type StepHook<'a> = Box<dyn FnMut(u64) -> bool + 'a>;

pub struct Evaluator<'a, H> {
    natives: &'a NativeTable<H>,
    host: &'a mut H,
    config: RunConfig,
    steps: u64,
    depth: usize,
    step_hook: Option<StepHook<'a>>,
}

impl<'a, H> Evaluator<'a, H> {
    pub fn new(natives: &'a NativeTable<H>, host: &'a mut H) -> Self {
        Self {
            natives,
            host,
            config: RunConfig::default(),
            steps: 0,
            depth: 0,
            step_hook: None,
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Called with the running step count before every statement and loop
    /// iteration. Returning `false` aborts the run.
    pub fn with_step_hook(mut self, hook: impl FnMut(u64) -> bool + 'a) -> Self {
        self.step_hook = Some(Box::new(hook));
        self
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn run(&mut self, program: &Program) -> Result<Value, BotError> {
        let scope = Scope::root();
        self.run_in(program, &scope)
    }

    /// Runs the top-level statements in `scope` and yields the value of the
    /// last one.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run_in(&mut self, program: &Program, scope: &ScopeRef) -> Result<Value, BotError> {
        let mut last = Value::Void;

        for statement in program.statements() {
            self.tick(statement.span)?;
            match self.evaluate(statement, scope)? {
                Flow::Normal(value) => last = value,
                Flow::Return(_) => {
                    return Err(BotError::runtime_error(
                        statement.span,
                        "'return' outside of a function".to_string(),
                    ));
                }
                Flow::Break | Flow::Continue => {
                    return Err(BotError::runtime_error(
                        statement.span,
                        "Jump outside of a loop".to_string(),
                    ));
                }
            }
        }

        tracing::debug!(steps = self.steps, "run finished");
        Ok(last)
    }

    pub fn evaluate(&mut self, node: &Node, scope: &ScopeRef) -> Result<Flow, BotError> {
        ensure_sufficient_stack(|| self.evaluate_node(node, scope))
    }

    fn evaluate_node(&mut self, node: &Node, scope: &ScopeRef) -> Result<Flow, BotError> {
        match &node.kind {
            NodeKind::Literal { value } => Ok(Flow::Normal(value.clone())),

            NodeKind::Identifier { name } => Ok(Flow::Normal(self.read(scope, name, node.span)?)),

            NodeKind::Unary { operator, operand } => {
                let operand = value!(self.evaluate(operand, scope)?);
                Ok(Flow::Normal(self.unary(*operator, operand, node.span)?))
            }

            NodeKind::Binary {
                left,
                operator: operator @ (BinaryOp::And | BinaryOp::Or),
                right,
            } => {
                let first = value!(self.evaluate(left, scope)?);
                let first = self.truth(&first, left.span)?;
                // and/or stop as soon as the left side decides
                if (*operator == BinaryOp::And && !first) || (*operator == BinaryOp::Or && first) {
                    return Ok(Flow::Normal(Value::Bool(first)));
                }
                let right_value = value!(self.evaluate(right, scope)?);
                Ok(Flow::Normal(Value::Bool(self.truth(&right_value, right.span)?)))
            }

            NodeKind::Binary { left, operator, right } => {
                let left = value!(self.evaluate(left, scope)?);
                let right = value!(self.evaluate(right, scope)?);
                Ok(Flow::Normal(self.binary(*operator, left, right, node.span)?))
            }

            NodeKind::Block { statements } => {
                let inner = Scope::child(scope);
                self.block(statements, &inner)
            }

            NodeKind::Jump { jump, value } => match jump {
                Jump::Return => {
                    let result = match value {
                        Some(value) => value!(self.evaluate(value, scope)?),
                        None => Value::Void,
                    };
                    Ok(Flow::Return(result))
                }
                Jump::Break => Ok(Flow::Break),
                Jump::Continue => Ok(Flow::Continue),
            },

            NodeKind::DefineVariable {
                name,
                declared,
                initializer,
            } => {
                let value = match initializer {
                    Some(initializer) => value!(self.evaluate(initializer, scope)?).coerce_to(*declared),
                    None => declared.default_value(),
                };
                scope.borrow_mut().define(name, value);
                Ok(Flow::Normal(Value::Void))
            }

            NodeKind::Assign { name, operator, value } => {
                let rhs = match value {
                    Some(value) => Some(value!(self.evaluate(value, scope)?)),
                    None => None,
                };
                let current = self.read(scope, name, node.span)?;
                let target = current.ty();

                let updated = match (*operator, rhs) {
                    (AssignOp::Set, Some(rhs)) => rhs,
                    (AssignOp::Compound(op), Some(rhs)) => self.binary(op, current, rhs, node.span)?,
                    (AssignOp::Increment, _) => self.binary(BinaryOp::Add, current, Value::Int(1), node.span)?,
                    (AssignOp::Decrement, _) => self.binary(BinaryOp::Subtract, current, Value::Int(1), node.span)?,
                    (operator, None) => {
                        return Err(BotError::fatal_error(
                            node.span,
                            format!("Assignment \"{}\" to '{}' has no value", operator, name),
                        ));
                    }
                };

                let updated = updated.coerce_to(target);
                if !scope.borrow_mut().assign(name, updated.clone()) {
                    return Err(BotError::fatal_error(node.span, format!("Variable '{}' is not defined", name)));
                }
                Ok(Flow::Normal(updated))
            }

            NodeKind::DefineFunction(def) => {
                scope.borrow_mut().define_function(Function {
                    def: Rc::clone(def),
                    closure: Rc::downgrade(scope),
                });
                Ok(Flow::Normal(Value::Void))
            }

            NodeKind::Call { name, args } => self.call(name, args, node, scope),

            NodeKind::Index { name, index } => {
                let position = value!(self.evaluate(index, scope)?);
                let list = self.read(scope, name, node.span)?;
                Ok(Flow::Normal(self.index(name, &list, &position, node.span)?))
            }

            NodeKind::List { elements } => {
                let element_type = node.ty.element();
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(value!(self.evaluate(element, scope)?).coerce_to(element_type));
                }
                Ok(Flow::Normal(Value::List(node.ty.primitive, items)))
            }

            NodeKind::Loop {
                initializer,
                condition,
                step,
                body,
            } => {
                let header = Scope::child(scope);
                value!(self.evaluate(initializer, &header)?);

                loop {
                    self.tick(node.span)?;
                    let keep_going = value!(self.evaluate(condition, &header)?);
                    if !self.truth(&keep_going, condition.span)? {
                        break;
                    }
                    match self.evaluate(body, &header)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    // Runs after `continue` too
                    value!(self.evaluate(step, &header)?);
                }

                Ok(Flow::Normal(Value::Void))
            }

            NodeKind::Repeat { count, body } => {
                let count_value = value!(self.evaluate(count, scope)?);
                let times = count_value.as_int().ok_or_else(|| {
                    BotError::fatal_error(count.span, format!("Repeat count must be int, found {}", count_value.ty()))
                })?;

                for _ in 0..times.max(0) {
                    self.tick(node.span)?;
                    match self.evaluate(body, scope)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }

                Ok(Flow::Normal(Value::Void))
            }

            NodeKind::While { condition, body } => {
                loop {
                    self.tick(node.span)?;
                    let keep_going = value!(self.evaluate(condition, scope)?);
                    if !self.truth(&keep_going, condition.span)? {
                        break;
                    }
                    match self.evaluate(body, scope)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }

                Ok(Flow::Normal(Value::Void))
            }

            NodeKind::Conditional { branches, otherwise } => self.conditional(branches, otherwise.as_deref(), scope),
        }
    }

    fn block(&mut self, statements: &[Node], scope: &ScopeRef) -> Result<Flow, BotError> {
        for statement in statements {
            self.tick(statement.span)?;
            match self.evaluate(statement, scope)? {
                Flow::Normal(_) => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(Value::Void))
    }

    fn conditional(
        &mut self,
        branches: &[Branch],
        otherwise: Option<&Node>,
        scope: &ScopeRef,
    ) -> Result<Flow, BotError> {
        for branch in branches {
            match &branch.guard {
                Guard::Condition(condition) => {
                    let taken = value!(self.evaluate(condition, scope)?);
                    if self.truth(&taken, condition.span)? {
                        return self.evaluate(&branch.body, scope);
                    }
                }
                Guard::Attempt => match self.evaluate(&branch.body, scope) {
                    Err(error) if error.is_recoverable() => {
                        tracing::debug!(%error, "try branch failed, moving on");
                    }
                    result => return result,
                },
            }
        }

        match otherwise {
            Some(node) => self.evaluate(node, scope),
            None => Ok(Flow::Normal(Value::Void)),
        }
    }

    fn call(&mut self, name: &str, args: &[Node], node: &Node, scope: &ScopeRef) -> Result<Flow, BotError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(value!(self.evaluate(arg, scope)?));
        }

        let natives = self.natives;
        if let Some(native) = natives.get(name) {
            let signature = &native.signature;
            if !signature.variadic {
                values = values
                    .into_iter()
                    .zip(&signature.params)
                    .map(|(value, param)| value.coerce_to(*param))
                    .collect();
            }

            let result = (native.callable)(&values, &mut *self.host)
                .map_err(|message| BotError::runtime_error(node.span, format!("'{}' failed: {}", name, message)))?
                .coerce_to(signature.return_type);
            if result.ty() != signature.return_type {
                return Err(BotError::fatal_error(
                    node.span,
                    format!(
                        "Native function '{}' returned {} instead of {}",
                        name,
                        result.ty(),
                        signature.return_type
                    ),
                ));
            }
            return Ok(Flow::Normal(result));
        }

        let function = scope.borrow().function(name).ok_or_else(|| {
            BotError::fatal_error(node.span, format!("Function '{}' is not defined", name))
        })?;
        let closure = function.closure.upgrade().ok_or_else(|| {
            BotError::fatal_error(
                node.span,
                format!("Function '{}' outlived the scope it was defined in", name),
            )
        })?;

        if self.depth >= self.config.max_call_depth {
            return Err(BotError::fatal_error(
                node.span,
                format!("Call depth limit of {} exceeded", self.config.max_call_depth),
            ));
        }

        let def = &function.def;
        let frame = Scope::child(&closure);
        for (param, value) in def.params.iter().zip(values) {
            frame.borrow_mut().define(&param.name, value.coerce_to(param.ty));
        }

        tracing::trace!(function = name, depth = self.depth, "call");
        self.depth += 1;
        let result = self.block(def.statements(), &frame);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(Flow::Normal(value.coerce_to(def.return_type))),
            _ if def.return_type.is_void() => Ok(Flow::Normal(Value::Void)),
            _ => Err(BotError::runtime_error(
                node.span,
                format!(
                    "Function '{}' ended without returning a {}",
                    name, def.return_type
                ),
            )),
        }
    }

    fn read(&self, scope: &ScopeRef, name: &str, span: Span) -> Result<Value, BotError> {
        scope
            .borrow()
            .get(name)
            .ok_or_else(|| BotError::fatal_error(span, format!("Variable '{}' is not defined", name)))
    }

    fn index(&self, name: &str, list: &Value, position: &Value, span: Span) -> Result<Value, BotError> {
        let (Value::List(_, items), Some(position)) = (list, position.as_int()) else {
            return Err(BotError::fatal_error(span, format!("'{}' cannot be indexed", name)));
        };

        usize::try_from(position)
            .ok()
            .and_then(|position| items.get(position))
            .cloned()
            .ok_or_else(|| {
                BotError::runtime_error(
                    span,
                    format!(
                        "Index {} is out of range for '{}' of length {}",
                        position,
                        name,
                        items.len()
                    ),
                )
            })
    }

    fn truth(&self, value: &Value, span: Span) -> Result<bool, BotError> {
        value
            .as_bool()
            .ok_or_else(|| BotError::fatal_error(span, format!("Expected bool, found {}", value.ty())))
    }

    fn unary(&self, operator: UnaryOp, operand: Value, span: Span) -> Result<Value, BotError> {
        match (operator, &operand) {
            (UnaryOp::Negate, Value::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| BotError::runtime_error(span, "Integer overflow in \"-\"".to_string())),
            (UnaryOp::Negate, Value::Double(n)) => Ok(Value::Double(-n)),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            _ => Err(BotError::fatal_error(
                span,
                format!("Operator \"{}\" cannot be applied to {}", operator, operand.ty()),
            )),
        }
    }

    fn binary(&self, operator: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, BotError> {
        match operator {
            BinaryOp::Add => match (&left, &right) {
                (Value::String(a), _) => Ok(Value::String(format!("{}{}", a, right))),
                (_, Value::String(b)) => Ok(Value::String(format!("{}{}", left, b))),
                _ => self.arithmetic(operator, &left, &right, span),
            },
            BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Power => {
                self.arithmetic(operator, &left, &right, span)
            }
            BinaryOp::Divide => {
                let (a, b) = self.numbers(operator, &left, &right, span)?;
                if b == 0.0 {
                    return Err(BotError::runtime_error(
                        span,
                        format!("Division by zero in \"{}\"", operator),
                    ));
                }
                Ok(Value::Double(a / b))
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let equal = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => a == b,
                    _ => match (left.as_f64(), right.as_f64()) {
                        (Some(a), Some(b)) => a == b,
                        _ => left == right,
                    },
                };
                Ok(Value::Bool(equal == (operator == BinaryOp::Equal)))
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                let (a, b) = self.numbers(operator, &left, &right, span)?;
                let result = match operator {
                    BinaryOp::Less => a < b,
                    BinaryOp::LessEqual => a <= b,
                    BinaryOp::Greater => a > b,
                    _ => a >= b,
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::And | BinaryOp::Or => {
                let a = self.truth(&left, span)?;
                let b = self.truth(&right, span)?;
                Ok(Value::Bool(if operator == BinaryOp::And { a && b } else { a || b }))
            }
        }
    }

    fn arithmetic(&self, operator: BinaryOp, left: &Value, right: &Value, span: Span) -> Result<Value, BotError> {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            let result = match operator {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Subtract => a.checked_sub(*b),
                BinaryOp::Multiply => a.checked_mul(*b),
                _ => {
                    if *b < 0 {
                        return Err(BotError::runtime_error(
                            span,
                            format!("Negative exponent in \"{}\"", operator),
                        ));
                    }
                    match (*a, u32::try_from(*b)) {
                        (_, Ok(exponent)) => a.checked_pow(exponent),
                        (0 | 1, Err(_)) => Some(*a),
                        (-1, Err(_)) => Some(if b % 2 == 0 { 1 } else { -1 }),
                        (_, Err(_)) => {
                            return Err(BotError::runtime_error(
                                span,
                                format!("Exponent {} is too large in \"{}\"", b, operator),
                            ));
                        }
                    }
                }
            };
            return result
                .map(Value::Int)
                .ok_or_else(|| BotError::runtime_error(span, format!("Integer overflow in \"{}\"", operator)));
        }

        let (a, b) = self.numbers(operator, left, right, span)?;
        let result = match operator {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            _ => a.powf(b),
        };
        Ok(Value::Double(result))
    }

    fn numbers(&self, operator: BinaryOp, left: &Value, right: &Value, span: Span) -> Result<(f64, f64), BotError> {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(BotError::fatal_error(
                span,
                format!(
                    "Operator \"{}\" cannot be applied to {} and {}",
                    operator,
                    left.ty(),
                    right.ty()
                ),
            )),
        }
    }

    fn tick(&mut self, span: Span) -> Result<(), BotError> {
        self.steps += 1;

        if let Some(max_steps) = self.config.max_steps {
            if self.steps > max_steps {
                return Err(BotError::fatal_error(
                    span,
                    format!("Step limit of {} exceeded", max_steps),
                ));
            }
        }

        if let Some(hook) = self.step_hook.as_mut() {
            if !hook(self.steps) {
                return Err(BotError::fatal_error(span, "Execution interrupted by host".to_string()));
            }
        }

        Ok(())
    }
}
