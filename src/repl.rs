use crate::ast::NodeKind;
use crate::config::RunConfig;
use crate::context::IdentifierContext;
use crate::error::BotError;
use crate::evaluator::{Evaluator, Scope, ScopeRef};
use crate::lexer::Lexer;
use crate::natives::NativeTable;
use crate::parser::Parser;
use crate::value::Value;
use std::io::{self, Write};

/// Declarations and values that persist between REPL entries.
pub struct Session<H> {
    natives: NativeTable<H>,
    host: H,
    context: IdentifierContext,
    scope: ScopeRef,
    config: RunConfig,
}

impl<H> Session<H> {
    pub fn new(natives: NativeTable<H>, host: H) -> Self {
        let context = natives.context();
        Self {
            natives,
            host,
            context,
            scope: Scope::root(),
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Compiles and runs one entry. Yields the value when the entry is a single
    /// expression with a value worth echoing.
    ///
    /// Declarations only reach the session's context once the whole entry has
    /// compiled and run, so a failed entry leaves its names free.
    pub fn eval(&mut self, source: &str) -> Result<Option<Value>, BotError> {
        let tokens = Lexer::new(source).scan_tokens()?;
        let mut parser = Parser::new(tokens, self.context.clone());
        let program = parser.parse()?;
        let context = parser.into_context();

        let echo = match program.statements() {
            [single] => !single.ty.is_void() && !matches!(single.kind, NodeKind::Assign { .. }),
            _ => false,
        };

        let value = Evaluator::new(&self.natives, &mut self.host)
            .with_config(self.config)
            .run_in(&program, &self.scope)?;
        self.context = context;

        Ok(echo.then_some(value))
    }
}

pub fn start<H>(session: &mut Session<H>) {
    println!("botlang v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                // EOF reached (Ctrl+D or piped input ended)
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    println!("Goodbye!");
                    break;
                }

                match session.eval(line) {
                    Ok(Some(value)) => println!("{}", value),
                    Ok(None) => {}
                    Err(error) => error.report(line, None),
                }
            }
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                break;
            }
        }
    }
}
