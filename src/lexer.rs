use crate::error::BotError;
use crate::position::{Position, Span};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Star,
    Slash,
    Caret,

    // One or two character tokens
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Equal,
    EqualEqual,
    EqualPlus,
    EqualMinus,
    EqualStar,
    EqualSlash,
    EqualCaret,
    BangEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Int,
    Double,
    Bool,

    // Type keywords
    IntType,
    DoubleType,
    BoolType,
    StringType,
    VoidType,

    // Keywords
    And,
    Or,
    Not,
    If,
    Elif,
    Try,
    Eltry,
    Else,
    Repeat,
    Loop,
    While,
    Return,
    Continue,
    Break,
    Func,

    // Special
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
        }
    }
}

/// Scans `source` in one pass. Convenience wrapper over [`Lexer`].
pub fn scan(source: &str) -> Result<Vec<Token>, BotError> {
    Lexer::new(source).scan_tokens()
}

pub struct Lexer {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: Position,
    current: Position,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("true", TokenType::Bool);
        keywords.insert("false", TokenType::Bool);
        keywords.insert("and", TokenType::And);
        keywords.insert("or", TokenType::Or);
        keywords.insert("not", TokenType::Not);
        keywords.insert("if", TokenType::If);
        keywords.insert("elif", TokenType::Elif);
        keywords.insert("try", TokenType::Try);
        keywords.insert("eltry", TokenType::Eltry);
        keywords.insert("else", TokenType::Else);
        keywords.insert("repeat", TokenType::Repeat);
        keywords.insert("loop", TokenType::Loop);
        keywords.insert("while", TokenType::While);
        keywords.insert("return", TokenType::Return);
        keywords.insert("continue", TokenType::Continue);
        keywords.insert("break", TokenType::Break);
        keywords.insert("func", TokenType::Func);
        keywords.insert("int", TokenType::IntType);
        keywords.insert("double", TokenType::DoubleType);
        keywords.insert("bool", TokenType::BoolType);
        keywords.insert("string", TokenType::StringType);
        keywords.insert("void", TokenType::VoidType);

        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: Position::default(),
            current: Position::default(),
            keywords,
        }
    }

    pub fn scan_tokens(mut self) -> Result<Vec<Token>, BotError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            String::new(),
            Span::new(self.current, self.current),
        ));

        tracing::debug!(tokens = self.tokens.len(), "scanned source");
        Ok(self.tokens)
    }

    fn is_at_end(&self) -> bool {
        self.current.index >= self.source.len()
    }

    fn scan_token(&mut self) -> Result<(), BotError> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            '[' => self.add_token(TokenType::LeftBracket),
            ']' => self.add_token(TokenType::RightBracket),
            ',' => self.add_token(TokenType::Comma),
            ':' => self.add_token(TokenType::Colon),
            '.' => self.add_token(TokenType::Dot),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            '/' => self.add_token(TokenType::Slash),
            '^' => self.add_token(TokenType::Caret),
            '&' => self.add_token(TokenType::And),
            '|' => self.add_token(TokenType::Or),
            '+' => {
                let token_type = if self.match_char('+') {
                    TokenType::PlusPlus
                } else {
                    TokenType::Plus
                };
                self.add_token(token_type);
            }
            '-' => {
                let token_type = if self.match_char('-') {
                    TokenType::MinusMinus
                } else {
                    TokenType::Minus
                };
                self.add_token(token_type);
            }
            '=' => {
                let token_type = match self.peek() {
                    Some('=') => TokenType::EqualEqual,
                    Some('+') => TokenType::EqualPlus,
                    Some('-') => TokenType::EqualMinus,
                    Some('*') => TokenType::EqualStar,
                    Some('/') => TokenType::EqualSlash,
                    Some('^') => TokenType::EqualCaret,
                    _ => TokenType::Equal,
                };
                if token_type != TokenType::Equal {
                    self.advance();
                }
                self.add_token(token_type);
            }
            '!' => {
                let token_type = if self.match_char('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Not
                };
                self.add_token(token_type);
            }
            '<' => {
                let token_type = if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(token_type);
            }
            '>' => {
                let token_type = if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(token_type);
            }
            '#' => {
                // Comments run until the next '#', across lines
                while let Some(c) = self.peek() {
                    self.advance();
                    if c == '#' {
                        break;
                    }
                }
            }
            '"' => self.string()?,
            c if c.is_whitespace() => {}
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            _ => {
                return Err(BotError::lex_error(
                    Span::new(self.start, self.current),
                    format!("Illegal character \"{}\"", c),
                ));
            }
        }

        Ok(())
    }

    fn advance(&mut self) -> char {
        let c = self.source.get(self.current.index).copied().unwrap_or('\0');
        self.current.advance(c);
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.current.index).copied()
    }

    fn text(&self) -> String {
        self.source[self.start.index..self.current.index].iter().collect()
    }

    fn string(&mut self) -> Result<(), BotError> {
        let mut content = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(BotError::lex_error(
                        Span::new(self.start, self.current),
                        "Unterminated string".to_string(),
                    )
                    .with_help("Close the string with a matching '\"'."));
                }
                Some('"') => break,
                Some('\\') => {
                    // A backslash keeps the next character verbatim
                    self.advance();
                    if self.is_at_end() {
                        continue;
                    }
                    content.push(self.advance());
                }
                Some(_) => content.push(self.advance()),
            }
        }

        // Consume the closing "
        self.advance();
        self.add_token_with_content(TokenType::String, content);
        Ok(())
    }

    fn number(&mut self) -> Result<(), BotError> {
        let mut has_point = false;

        while let Some(c) = self.peek() {
            if c == '.' {
                // A second point ends the number; it starts the next token
                if has_point {
                    break;
                }
                has_point = true;
            } else if !c.is_ascii_digit() {
                break;
            }
            self.advance();
        }

        let number = self.text();
        let span = Span::new(self.start, self.current);

        if has_point {
            if number.parse::<f64>().is_err() {
                return Err(BotError::lex_error(span, format!("Invalid double: {}", number)));
            }
            self.add_token_with_content(TokenType::Double, number);
        } else {
            if number.parse::<i64>().is_err() {
                return Err(BotError::lex_error(span, format!("Integer literal out of range: {}", number)));
            }
            self.add_token_with_content(TokenType::Int, number);
        }

        Ok(())
    }

    fn identifier(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_alphabetic() || c == '_') {
            self.advance();
        }

        let text = self.text();
        let token_type = self
            .keywords
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenType::Identifier);

        self.add_token_with_content(token_type, text);
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text = self.text();
        self.add_token_with_content(token_type, text);
    }

    fn add_token_with_content(&mut self, token_type: TokenType, lexeme: String) {
        self.tokens.push(Token::new(
            token_type,
            lexeme,
            Span::new(self.start, self.current),
        ));
    }
}
