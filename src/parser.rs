use crate::ast::{AssignOp, BinaryOp, Branch, FunctionDef, Guard, Jump, Node, NodeKind, Param, Program, UnaryOp};
use crate::context::{DeclareError, FunctionSignature, IdentifierContext};
use crate::error::{BotError, Span};
use crate::lexer::{Token, TokenType};
use crate::stack::ensure_sufficient_stack;
use crate::types::{binary_result, unary_result, Primitive, Type};
use crate::value::Value;
use std::rc::Rc;

/// Saved parser state for speculative alternatives.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    current: usize,
    depth: usize,
}

/// Recursive-descent parser that type-checks every node as it builds it.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    context: IdentifierContext,
    loop_depth: usize,
    return_types: Vec<Type>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>, context: IdentifierContext) -> Self {
        if tokens.last().map(|token| token.token_type) != Some(TokenType::Eof) {
            let end = tokens.last().map(|token| token.span.end).unwrap_or_default();
            tokens.push(Token::new(TokenType::Eof, String::new(), Span::new(end, end)));
        }

        Self {
            tokens,
            current: 0,
            context,
            loop_depth: 0,
            return_types: Vec::new(),
        }
    }

    pub fn parse(&mut self) -> Result<Program, BotError> {
        let start = self.peek().span;
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        let span = start.to(self.peek().span);
        tracing::debug!(statements = statements.len(), "parsed program");
        Ok(Program {
            root: Node::statement(NodeKind::Block { statements }, span),
        })
    }

    /// Hands the identifier context back, including every global declaration.
    pub fn into_context(self) -> IdentifierContext {
        self.context
    }

    // ----------------------------------------------------------------------
    // Statements
    // ----------------------------------------------------------------------

    fn statement(&mut self) -> Result<Node, BotError> {
        ensure_sufficient_stack(|| self.statement_inner())
    }

    fn statement_inner(&mut self) -> Result<Node, BotError> {
        let token_type = self.peek().token_type;
        match token_type {
            TokenType::Repeat => self.repeat_statement(),
            TokenType::Loop => self.loop_statement(),
            TokenType::While => self.while_statement(),
            TokenType::Func => self.function_definition(),
            TokenType::IntType | TokenType::DoubleType | TokenType::BoolType | TokenType::StringType => {
                let node = self.variable_definition()?;
                self.end_statement()?;
                Ok(node)
            }
            TokenType::VoidType => Err(BotError::syntax_error(
                self.peek().span,
                "Variables cannot be declared void".to_string(),
            )
            .with_help("'void' is only allowed as the return type of a function.")),
            TokenType::Return | TokenType::Break | TokenType::Continue => self.jump_statement(),
            TokenType::If | TokenType::Try if self.starts_chain_statement()? => self.chain_statement(),
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> Result<Node, BotError> {
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(expr)
    }

    fn end_statement(&mut self) -> Result<(), BotError> {
        self.consume_with_help(
            TokenType::Semicolon,
            "Expected \";\"",
            "Statements end with ';'.",
        )?;
        Ok(())
    }

    /// Statements that end in a block may be followed by a stray ';'.
    fn end_block_statement(&mut self) {
        self.match_types(&[TokenType::Semicolon]);
    }

    fn block(&mut self) -> Result<Node, BotError> {
        let open = self.consume_with_help(
            TokenType::LeftBrace,
            "Expected \"{\"",
            "Blocks are written as { statements }.",
        )?;

        self.context.push_scope();
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }
        let close = self.consume_with_help(
            TokenType::RightBrace,
            "Expected \"}\" after block",
            "Every '{' needs a matching '}'.",
        )?;
        self.context.pop_scope();

        Ok(Node::statement(NodeKind::Block { statements }, open.to(close)))
    }

    fn loop_body(&mut self) -> Result<Node, BotError> {
        self.loop_depth += 1;
        let body = self.block();
        self.loop_depth -= 1;
        body
    }

    fn repeat_statement(&mut self) -> Result<Node, BotError> {
        let keyword = self.advance().span;
        let count = self.expression()?;
        if count.ty != Type::INT {
            return Err(BotError::type_error(
                count.span,
                format!("Repeat count must be int, found {}", count.ty),
            ));
        }
        let body = self.loop_body()?;
        self.end_block_statement();

        let span = keyword.to(body.span);
        Ok(Node::statement(
            NodeKind::Repeat {
                count: Box::new(count),
                body: Box::new(body),
            },
            span,
        ))
    }

    fn while_statement(&mut self) -> Result<Node, BotError> {
        let keyword = self.advance().span;
        let condition = self.expression()?;
        self.expect_condition(&condition, "while")?;
        let body = self.loop_body()?;
        self.end_block_statement();

        let span = keyword.to(body.span);
        Ok(Node::statement(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
            span,
        ))
    }

    /// `loop (init, condition, step) { ... }`. The header has its own scope so
    /// a counter declared in `init` is visible to the whole loop only.
    fn loop_statement(&mut self) -> Result<Node, BotError> {
        let keyword = self.advance().span;
        self.consume_with_help(
            TokenType::LeftParen,
            "Expected \"(\" after 'loop'",
            "Loops are written as loop (int i = 0, i < 10, i ++) { ... }.",
        )?;

        self.context.push_scope();
        let initializer = if self.check_type_keyword() {
            self.variable_definition()?
        } else {
            self.expression()?
        };
        self.consume(TokenType::Comma, "Expected \",\" after loop initializer")?;
        let condition = self.expression()?;
        self.expect_condition(&condition, "loop")?;
        self.consume(TokenType::Comma, "Expected \",\" after loop condition")?;
        let step = self.expression()?;
        self.consume(TokenType::RightParen, "Expected \")\" after loop step")?;
        let body = self.loop_body()?;
        self.context.pop_scope();
        self.end_block_statement();

        let span = keyword.to(body.span);
        Ok(Node::statement(
            NodeKind::Loop {
                initializer: Box::new(initializer),
                condition: Box::new(condition),
                step: Box::new(step),
                body: Box::new(body),
            },
            span,
        ))
    }

    fn variable_definition(&mut self) -> Result<Node, BotError> {
        let start = self.peek().span;
        let declared = self.parse_type(false)?;
        let name = self.consume(TokenType::Identifier, "Expected variable name")?;

        let initializer = if self.match_types(&[TokenType::Equal]) {
            let value = self.expression()?;
            if !declared.accepts(value.ty) {
                return Err(BotError::type_error(
                    value.span,
                    format!("Cannot initialize '{}' of type {} with {}", name.lexeme, declared, value.ty),
                ));
            }
            Some(Box::new(value))
        } else {
            None
        };

        if self.context.define_variable(&name.lexeme, declared).is_err() {
            return Err(BotError::type_error(
                name.span,
                format!("Variable '{}' is already declared in this scope", name.lexeme),
            ));
        }

        let end = initializer.as_ref().map_or(name.span, |value| value.span);
        Ok(Node::statement(
            NodeKind::DefineVariable {
                name: name.lexeme,
                declared,
                initializer,
            },
            start.to(end),
        ))
    }

    fn function_definition(&mut self) -> Result<Node, BotError> {
        let keyword = self.advance().span;
        let return_type = self.parse_type(true)?;
        let name = self.consume(TokenType::Identifier, "Expected function name")?;
        self.consume_with_help(
            TokenType::LeftParen,
            "Expected \"(\" after function name",
            "Functions are written as func int name(int a, double b) { ... }.",
        )?;

        let mut params: Vec<Param> = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                let ty = self.parse_type(false)?;
                let param = self.consume(TokenType::Identifier, "Expected parameter name")?;
                if params.iter().any(|existing| existing.name == param.lexeme) {
                    return Err(BotError::type_error(
                        param.span,
                        format!("Duplicate parameter '{}'", param.lexeme),
                    ));
                }
                params.push(Param { name: param.lexeme, ty });
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expected \")\" after parameters")?;

        // Registered before the body so the function can call itself.
        let signature = FunctionSignature::new(return_type, params.iter().map(|param| param.ty).collect());
        match self.context.define_function(&name.lexeme, signature) {
            Ok(()) => {}
            Err(DeclareError::Duplicate) => {
                return Err(BotError::type_error(
                    name.span,
                    format!("Function '{}' is already declared in this scope", name.lexeme),
                ));
            }
            Err(DeclareError::Native) => {
                return Err(BotError::type_error(
                    name.span,
                    format!("'{}' is a native function and cannot be redefined", name.lexeme),
                ));
            }
        }

        let body = self.function_body(return_type, &params)?;
        self.end_block_statement();

        let span = keyword.to(body.span);
        Ok(Node::statement(
            NodeKind::DefineFunction(Rc::new(FunctionDef {
                name: name.lexeme,
                return_type,
                params,
                body,
            })),
            span,
        ))
    }

    fn function_body(&mut self, return_type: Type, params: &[Param]) -> Result<Node, BotError> {
        let open = self.consume_with_help(
            TokenType::LeftBrace,
            "Expected \"{\" before function body",
            "Functions are written as func int name(int a, double b) { ... }.",
        )?;

        self.context.push_scope();
        for param in params {
            // Duplicates were rejected above.
            let _ = self.context.define_variable(&param.name, param.ty);
        }

        let outer_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.return_types.push(return_type);

        let mut statements = Vec::new();
        let mut result = Ok(());
        while !self.check(TokenType::RightBrace) && !self.is_at_end() {
            match self.statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }

        self.return_types.pop();
        self.loop_depth = outer_loop_depth;
        result?;

        let close = self.consume_with_help(
            TokenType::RightBrace,
            "Expected \"}\" after function body",
            "Every '{' needs a matching '}'.",
        )?;
        self.context.pop_scope();

        Ok(Node::statement(NodeKind::Block { statements }, open.to(close)))
    }

    fn jump_statement(&mut self) -> Result<Node, BotError> {
        let keyword = self.advance().clone();

        let (jump, value) = match keyword.token_type {
            TokenType::Return => (Jump::Return, self.return_value(&keyword)?),
            TokenType::Break | TokenType::Continue => {
                if self.loop_depth == 0 {
                    return Err(BotError::syntax_error(
                        keyword.span,
                        format!("'{}' outside of a loop", keyword.lexeme),
                    ));
                }
                let jump = if keyword.token_type == TokenType::Break {
                    Jump::Break
                } else {
                    Jump::Continue
                };
                (jump, None)
            }
            _ => {
                return Err(BotError::syntax_error(
                    keyword.span,
                    format!("Unexpected '{}'", keyword.lexeme),
                ));
            }
        };

        let end = value.as_ref().map_or(keyword.span, |value| value.span);
        self.end_statement()?;
        Ok(Node::statement(
            NodeKind::Jump {
                jump,
                value: value.map(Box::new),
            },
            keyword.span.to(end),
        ))
    }

    fn return_value(&mut self, keyword: &Token) -> Result<Option<Node>, BotError> {
        let expected = self.return_types.last().copied();

        if self.check(TokenType::Semicolon) {
            return match expected {
                Some(ty) if !ty.is_void() => Err(BotError::type_error(
                    keyword.span,
                    format!("Function must return a {}", ty),
                )),
                _ => Ok(None),
            };
        }

        let value = self.expression()?;
        match expected {
            Some(ty) if ty.is_void() => Err(BotError::type_error(
                value.span,
                "Void functions cannot return a value".to_string(),
            )),
            Some(ty) if !ty.accepts(value.ty) => Err(BotError::type_error(
                value.span,
                format!("Expected return type {}, found {}", ty, value.ty),
            )),
            // A top-level return is reported when it runs.
            _ => Ok(Some(value)),
        }
    }

    /// Peeks past an `if` condition: a following `{` means the statement
    /// form. `try {` is always the statement form.
    fn starts_chain_statement(&mut self) -> Result<bool, BotError> {
        if self.check(TokenType::Try) {
            return Ok(self.check_next(TokenType::LeftBrace));
        }

        let checkpoint = self.checkpoint();
        self.advance();
        let condition = self.expression();
        let is_statement = self.check(TokenType::LeftBrace);
        self.restore(checkpoint);
        condition.map(|_| is_statement)
    }

    fn chain_statement(&mut self) -> Result<Node, BotError> {
        let start = self.peek().span;
        let mut branches = Vec::new();

        while let Some(guard) = self.branch_keyword(branches.is_empty()) {
            let keyword = self.advance().clone();
            let guard = match guard {
                GuardKind::Condition => {
                    let condition = self.expression()?;
                    self.expect_condition(&condition, &keyword.lexeme)?;
                    Guard::Condition(condition)
                }
                GuardKind::Attempt => Guard::Attempt,
            };
            let body = self.block()?;
            branches.push(Branch {
                guard,
                span: keyword.span.to(body.span),
                body,
            });
        }

        let otherwise = if self.match_types(&[TokenType::Else]) {
            Some(Box::new(self.block()?))
        } else {
            None
        };
        self.end_block_statement();

        let end = match (&otherwise, branches.last()) {
            (Some(node), _) => node.span,
            (None, Some(branch)) => branch.span,
            (None, None) => start,
        };
        Ok(Node::statement(
            NodeKind::Conditional { branches, otherwise },
            start.to(end),
        ))
    }

    /// Which guard the current token opens, if it continues a chain.
    fn branch_keyword(&self, first: bool) -> Option<GuardKind> {
        match (self.peek().token_type, first) {
            (TokenType::If, true) | (TokenType::Elif, false) => Some(GuardKind::Condition),
            (TokenType::Try, true) | (TokenType::Eltry, false) => Some(GuardKind::Attempt),
            _ => None,
        }
    }

    // ----------------------------------------------------------------------
    // Expressions
    // ----------------------------------------------------------------------

    /// Nested parentheses, chains and unary runs all come back through here.
    fn expression(&mut self) -> Result<Node, BotError> {
        ensure_sufficient_stack(|| self.logic())
    }

    fn logic(&mut self) -> Result<Node, BotError> {
        let mut expr = self.negation()?;

        while let Some(operator) = self.binary_operator(&[(TokenType::And, BinaryOp::And), (TokenType::Or, BinaryOp::Or)]) {
            let right = self.negation()?;
            expr = self.binary(expr, operator, right)?;
        }

        Ok(expr)
    }

    fn negation(&mut self) -> Result<Node, BotError> {
        if self.check(TokenType::Not) {
            let operator = self.advance().span;
            let operand = ensure_sufficient_stack(|| self.negation())?;
            return self.unary(UnaryOp::Not, operator, operand);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Node, BotError> {
        let mut expr = self.additive()?;

        while let Some(operator) = self.binary_operator(&[
            (TokenType::EqualEqual, BinaryOp::Equal),
            (TokenType::BangEqual, BinaryOp::NotEqual),
            (TokenType::Less, BinaryOp::Less),
            (TokenType::LessEqual, BinaryOp::LessEqual),
            (TokenType::Greater, BinaryOp::Greater),
            (TokenType::GreaterEqual, BinaryOp::GreaterEqual),
        ]) {
            let right = self.additive()?;
            expr = self.binary(expr, operator, right)?;
        }

        Ok(expr)
    }

    fn additive(&mut self) -> Result<Node, BotError> {
        let mut expr = self.multiplicative()?;

        while let Some(operator) =
            self.binary_operator(&[(TokenType::Plus, BinaryOp::Add), (TokenType::Minus, BinaryOp::Subtract)])
        {
            let right = self.multiplicative()?;
            expr = self.binary(expr, operator, right)?;
        }

        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Node, BotError> {
        let mut expr = self.power()?;

        while let Some(operator) =
            self.binary_operator(&[(TokenType::Star, BinaryOp::Multiply), (TokenType::Slash, BinaryOp::Divide)])
        {
            let right = self.power()?;
            expr = self.binary(expr, operator, right)?;
        }

        Ok(expr)
    }

    fn power(&mut self) -> Result<Node, BotError> {
        let mut expr = self.negate()?;

        while let Some(operator) = self.binary_operator(&[(TokenType::Caret, BinaryOp::Power)]) {
            let right = self.negate()?;
            expr = self.binary(expr, operator, right)?;
        }

        Ok(expr)
    }

    fn negate(&mut self) -> Result<Node, BotError> {
        if self.check(TokenType::Minus) {
            let operator = self.advance().span;
            let operand = ensure_sufficient_stack(|| self.negate())?;
            return self.unary(UnaryOp::Negate, operator, operand);
        }
        self.atom()
    }

    fn binary_operator(&mut self, operators: &[(TokenType, BinaryOp)]) -> Option<(BinaryOp, Span)> {
        let token = self.peek();
        let found = operators
            .iter()
            .find(|(token_type, _)| *token_type == token.token_type)
            .map(|(_, op)| (*op, token.span));
        if found.is_some() {
            self.advance();
        }
        found
    }

    fn binary(&self, left: Node, (operator, operator_span): (BinaryOp, Span), right: Node) -> Result<Node, BotError> {
        let ty = binary_result(operator, left.ty, right.ty).ok_or_else(|| {
            BotError::type_error(
                operator_span,
                format!("Operator \"{}\" cannot be applied to {} and {}", operator, left.ty, right.ty),
            )
        })?;

        let span = left.span.to(right.span);
        Ok(Node::new(
            NodeKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            ty,
            span,
        ))
    }

    fn unary(&self, operator: UnaryOp, operator_span: Span, operand: Node) -> Result<Node, BotError> {
        let ty = unary_result(operator, operand.ty).ok_or_else(|| {
            BotError::type_error(
                operator_span,
                format!("Operator \"{}\" cannot be applied to {}", operator, operand.ty),
            )
        })?;

        let span = operator_span.to(operand.span);
        Ok(Node::new(
            NodeKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            ty,
            span,
        ))
    }

    fn atom(&mut self) -> Result<Node, BotError> {
        let token = self.peek().clone();

        match token.token_type {
            TokenType::Int => {
                self.advance();
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    BotError::syntax_error(token.span, format!("Invalid int: {}", token.lexeme))
                })?;
                Ok(Node::new(NodeKind::Literal { value: Value::Int(value) }, Type::INT, token.span))
            }
            TokenType::Double => {
                self.advance();
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    BotError::syntax_error(token.span, format!("Invalid double: {}", token.lexeme))
                })?;
                Ok(Node::new(NodeKind::Literal { value: Value::Double(value) }, Type::DOUBLE, token.span))
            }
            TokenType::Bool => {
                self.advance();
                let value = Value::Bool(token.lexeme == "true");
                Ok(Node::new(NodeKind::Literal { value }, Type::BOOL, token.span))
            }
            TokenType::String => {
                self.advance();
                let value = Value::String(token.lexeme);
                Ok(Node::new(NodeKind::Literal { value }, Type::STRING, token.span))
            }
            TokenType::LeftParen => {
                self.advance();
                let mut expr = self.expression()?;
                let close = self.consume_with_help(
                    TokenType::RightParen,
                    "Expected \")\" after expression",
                    "Every '(' needs a matching ')'.",
                )?;
                expr.span = token.span.to(close);
                Ok(expr)
            }
            TokenType::LeftBracket => self.list_literal(),
            TokenType::If | TokenType::Try => self.expression_chain(),
            TokenType::Identifier => self.identifier_form(),
            TokenType::Eof => Err(BotError::syntax_error(
                token.span,
                "Unexpected end of input".to_string(),
            )
            .with_help("Expected an expression here. Check for an unfinished statement.")),
            _ => Err(BotError::syntax_error(
                token.span,
                format!("Expected expression, found \"{}\"", token.lexeme),
            )),
        }
    }

    fn list_literal(&mut self) -> Result<Node, BotError> {
        let open = self.advance().span;

        if self.check(TokenType::RightBracket) {
            return Err(BotError::syntax_error(
                open.to(self.peek().span),
                "List literals need at least one element".to_string(),
            )
            .with_help("Declare an empty list without an initializer: int[] xs;"));
        }

        let mut elements: Vec<Node> = Vec::new();
        let mut element_type: Option<Type> = None;
        loop {
            let element = self.expression()?;
            if element.ty.is_list || element.ty.is_void() {
                return Err(BotError::type_error(
                    element.span,
                    format!("List elements cannot be {}", element.ty),
                ));
            }
            element_type = match element_type {
                None => Some(element.ty),
                Some(current) if current == element.ty => Some(current),
                Some(current) if current.is_numeric() && element.ty.is_numeric() => Some(Type::DOUBLE),
                Some(current) => {
                    return Err(BotError::type_error(
                        element.span,
                        format!("List elements must share one type, found {} and {}", current, element.ty),
                    ));
                }
            };
            elements.push(element);
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }

        let close = self.consume_with_help(
            TokenType::RightBracket,
            "Expected \"]\" after list elements",
            "List literals are written as [1, 2, 3].",
        )?;

        let primitive = element_type.map_or(Primitive::Int, |ty| ty.primitive);
        Ok(Node::new(
            NodeKind::List { elements },
            Type::list_of(primitive),
            open.to(close),
        ))
    }

    /// `if c a elif d b else e` / `try a eltry b else c` used as a value.
    fn expression_chain(&mut self) -> Result<Node, BotError> {
        let start = self.peek().span;
        let mut branches = Vec::new();
        let mut result_type: Option<Type> = None;

        while let Some(guard) = self.branch_keyword(branches.is_empty()) {
            let keyword = self.advance().clone();
            let guard = match guard {
                GuardKind::Condition => {
                    let condition = self.expression()?;
                    self.expect_condition(&condition, &keyword.lexeme)?;
                    Guard::Condition(condition)
                }
                GuardKind::Attempt => Guard::Attempt,
            };
            let body = self.expression()?;
            result_type = Some(Self::unify_branch(result_type, &body)?);
            branches.push(Branch {
                guard,
                span: keyword.span.to(body.span),
                body,
            });
        }

        if !self.match_types(&[TokenType::Else]) {
            return Err(BotError::syntax_error(
                self.peek().span,
                "Conditional expressions must have a catching else expression".to_string(),
            )
            .with_help("Add a final 'else' so the expression always has a value."));
        }
        let otherwise = self.expression()?;
        let ty = Self::unify_branch(result_type, &otherwise)?;

        let span = start.to(otherwise.span);
        Ok(Node::new(
            NodeKind::Conditional {
                branches,
                otherwise: Some(Box::new(otherwise)),
            },
            ty,
            span,
        ))
    }

    fn unify_branch(current: Option<Type>, body: &Node) -> Result<Type, BotError> {
        if body.ty.is_void() {
            return Err(BotError::type_error(
                body.span,
                "Branches of a conditional expression must produce a value".to_string(),
            ));
        }
        match current {
            Some(ty) if ty != body.ty => Err(BotError::type_error(
                body.span,
                format!("Branches of a conditional expression must share one type, found {} and {}", ty, body.ty),
            )),
            _ => Ok(body.ty),
        }
    }

    /// Call, index, assignment, then plain variable, in that order.
    fn identifier_form(&mut self) -> Result<Node, BotError> {
        if let Some(node) = self.attempt(Self::call)? {
            return Ok(node);
        }
        if let Some(node) = self.attempt(Self::index)? {
            return Ok(node);
        }
        if let Some(node) = self.attempt(Self::assignment)? {
            return Ok(node);
        }
        self.variable()
    }

    fn call(&mut self) -> Result<Option<Node>, BotError> {
        let name = self.advance().clone();
        if !self.match_types(&[TokenType::LeftParen]) {
            return Ok(None);
        }

        let signature = self.context.lookup_function(&name.lexeme).cloned().ok_or_else(|| {
            BotError::identifier_error(name.span, format!("Function '{}' does not exist", name.lexeme))
        })?;

        let mut args = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        let close = self.consume_with_help(
            TokenType::RightParen,
            "Expected \")\" after arguments",
            "Calls are written as name(arg1, arg2).",
        )?;
        let span = name.span.to(close);

        if signature.variadic {
            if let Some(arg) = args.iter().find(|arg| arg.ty.is_void()) {
                return Err(BotError::type_error(
                    arg.span,
                    format!("Argument to '{}' has no value", name.lexeme),
                ));
            }
        } else {
            if args.len() != signature.params.len() {
                return Err(BotError::type_error(
                    span,
                    format!(
                        "Function '{}' expects {} argument(s) but got {}",
                        name.lexeme,
                        signature.params.len(),
                        args.len()
                    ),
                ));
            }
            for (position, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
                if !param.accepts(arg.ty) {
                    return Err(BotError::type_error(
                        arg.span,
                        format!(
                            "Argument {} of '{}' must be {}, found {}",
                            position + 1,
                            name.lexeme,
                            param,
                            arg.ty
                        ),
                    ));
                }
            }
        }

        Ok(Some(Node::new(
            NodeKind::Call { name: name.lexeme, args },
            signature.return_type,
            span,
        )))
    }

    fn index(&mut self) -> Result<Option<Node>, BotError> {
        let name = self.advance().clone();
        if !self.match_types(&[TokenType::LeftBracket]) {
            return Ok(None);
        }

        let ty = self.lookup_variable(&name)?;
        if !ty.is_list {
            return Err(BotError::type_error(
                name.span,
                format!("'{}' is a {}, not a list", name.lexeme, ty),
            ));
        }

        let index = self.expression()?;
        if index.ty != Type::INT {
            return Err(BotError::type_error(
                index.span,
                format!("List index must be int, found {}", index.ty),
            ));
        }
        let close = self.consume(TokenType::RightBracket, "Expected \"]\" after index")?.span;

        Ok(Some(Node::new(
            NodeKind::Index {
                name: name.lexeme,
                index: Box::new(index),
            },
            ty.element(),
            name.span.to(close),
        )))
    }

    fn assignment(&mut self) -> Result<Option<Node>, BotError> {
        let name = self.advance().clone();
        let operator_token = self.peek().clone();
        let operator = match operator_token.token_type {
            TokenType::Equal => AssignOp::Set,
            TokenType::EqualPlus => AssignOp::Compound(BinaryOp::Add),
            TokenType::EqualMinus => AssignOp::Compound(BinaryOp::Subtract),
            TokenType::EqualStar => AssignOp::Compound(BinaryOp::Multiply),
            TokenType::EqualSlash => AssignOp::Compound(BinaryOp::Divide),
            TokenType::EqualCaret => AssignOp::Compound(BinaryOp::Power),
            TokenType::PlusPlus => AssignOp::Increment,
            TokenType::MinusMinus => AssignOp::Decrement,
            _ => return Ok(None),
        };
        self.advance();

        let target = self.lookup_variable(&name)?;

        let value = match operator {
            AssignOp::Increment | AssignOp::Decrement => {
                if !target.is_numeric() {
                    return Err(BotError::type_error(
                        operator_token.span,
                        format!("Operator \"{}\" needs an int or double, found {}", operator, target),
                    ));
                }
                None
            }
            AssignOp::Set => {
                let value = self.expression()?;
                if !target.accepts(value.ty) {
                    return Err(BotError::type_error(
                        value.span,
                        format!("Cannot assign {} to '{}' of type {}", value.ty, name.lexeme, target),
                    ));
                }
                Some(value)
            }
            AssignOp::Compound(op) => {
                let value = self.expression()?;
                let compatible = binary_result(op, target, value.ty).is_some_and(|result| target.accepts(result));
                if !compatible {
                    return Err(BotError::type_error(
                        operator_token.span,
                        format!("Operator \"{}\" cannot combine '{}' of type {} with {}", operator, name.lexeme, target, value.ty),
                    ));
                }
                Some(value)
            }
        };

        let end = value.as_ref().map_or(operator_token.span, |value| value.span);
        Ok(Some(Node::new(
            NodeKind::Assign {
                name: name.lexeme,
                operator,
                value: value.map(Box::new),
            },
            target,
            name.span.to(end),
        )))
    }

    fn variable(&mut self) -> Result<Node, BotError> {
        let name = self.advance().clone();
        let ty = self.lookup_variable(&name)?;
        Ok(Node::new(NodeKind::Identifier { name: name.lexeme }, ty, name.span))
    }

    fn lookup_variable(&self, name: &Token) -> Result<Type, BotError> {
        self.context.lookup_variable(&name.lexeme).ok_or_else(|| {
            BotError::identifier_error(name.span, format!("Variable '{}' does not exist", name.lexeme))
        })
    }

    // ----------------------------------------------------------------------
    // Helpers
    // ----------------------------------------------------------------------

    fn expect_condition(&self, condition: &Node, keyword: &str) -> Result<(), BotError> {
        if condition.ty == Type::BOOL {
            Ok(())
        } else {
            Err(BotError::type_error(
                condition.span,
                format!("Condition of '{}' must be bool, found {}", keyword, condition.ty),
            ))
        }
    }

    fn check_type_keyword(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::IntType | TokenType::DoubleType | TokenType::BoolType | TokenType::StringType
        )
    }

    /// `int`, `string[]`, ... and `void` where a function return type is read.
    fn parse_type(&mut self, allow_void: bool) -> Result<Type, BotError> {
        let token = self.peek().clone();
        let primitive = match token.token_type {
            TokenType::IntType => Primitive::Int,
            TokenType::DoubleType => Primitive::Double,
            TokenType::BoolType => Primitive::Bool,
            TokenType::StringType => Primitive::String,
            TokenType::VoidType if allow_void => Primitive::Void,
            TokenType::VoidType => {
                return Err(BotError::syntax_error(
                    token.span,
                    "'void' is only allowed as a function return type".to_string(),
                ));
            }
            _ => {
                return Err(BotError::syntax_error(
                    token.span,
                    format!("Expected a type, found \"{}\"", token.lexeme),
                )
                .with_help("Types are int, double, bool and string, optionally followed by [] for a list."));
            }
        };
        self.advance();

        if self.check(TokenType::LeftBracket) && self.check_next(TokenType::RightBracket) {
            if primitive == Primitive::Void {
                return Err(BotError::syntax_error(
                    token.span,
                    "There are no void lists".to_string(),
                ));
            }
            self.advance();
            self.advance();
            return Ok(Type::list_of(primitive));
        }

        Ok(Type::scalar(primitive))
    }

    /// Runs one speculative alternative. `Ok(None)` means its shape did not
    /// match; the parser is rewound and nothing is reported.
    fn attempt(
        &mut self,
        alternative: fn(&mut Self) -> Result<Option<Node>, BotError>,
    ) -> Result<Option<Node>, BotError> {
        let checkpoint = self.checkpoint();
        let result = alternative(self);
        if matches!(result, Ok(None)) {
            self.restore(checkpoint);
        }
        result
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current: self.current,
            depth: self.context.depth(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.current = checkpoint.current;
        self.context.truncate(checkpoint.depth);
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(*token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.peek().token_type == token_type
    }

    fn check_next(&self, token_type: TokenType) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|token| token.token_type == token_type)
    }

    fn advance(&mut self) -> &Token {
        let index = self.current;
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[index]
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, BotError> {
        if self.check(token_type) {
            Ok(self.advance().clone())
        } else {
            Err(BotError::syntax_error(self.error_span(), message.to_string()))
        }
    }

    fn consume_with_help(&mut self, token_type: TokenType, message: &str, help: &str) -> Result<Span, BotError> {
        if self.check(token_type) {
            Ok(self.advance().span)
        } else {
            Err(BotError::syntax_error(self.error_span(), message.to_string()).with_help(help))
        }
    }

    /// Points at the offending token, or just past the last real token at EOF.
    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            let end = self.tokens[self.current - 1].span.end;
            Span::new(end, end)
        } else {
            self.peek().span
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GuardKind {
    Condition,
    Attempt,
}
