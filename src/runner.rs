use crate::ast::Program;
use crate::config::RunConfig;
use crate::error::BotError;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::natives::NativeTable;
use crate::parser::Parser;
use crate::value::Value;

/// Lexes and parses `source`, checking calls against the natives in `natives`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn compile<H>(source: &str, natives: &NativeTable<H>) -> Result<Program, BotError> {
    let tokens = Lexer::new(source).scan_tokens()?;
    let mut parser = Parser::new(tokens, natives.context());
    parser.parse()
}

/// Runs a compiled program once in a fresh scope with the default limits.
pub fn run<H>(program: &Program, natives: &NativeTable<H>, host: &mut H) -> Result<Value, BotError> {
    run_with_config(program, natives, host, &RunConfig::default())
}

pub fn run_with_config<H>(
    program: &Program,
    natives: &NativeTable<H>,
    host: &mut H,
    config: &RunConfig,
) -> Result<Value, BotError> {
    Evaluator::new(natives, host).with_config(*config).run(program)
}

/// Outcome of [`run_turns`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnSummary {
    pub compiled: bool,
    pub completed: u64,
    pub failed: u64,
}

/// Compiles `source` once, then runs it `turns` times, reporting every error
/// against the source. `before_turn` lets the host update its state for the
/// coming turn (numbered from 1).
pub fn run_turns<H>(
    source: &str,
    filename: Option<&str>,
    natives: &NativeTable<H>,
    host: &mut H,
    config: &RunConfig,
    turns: u64,
    mut before_turn: impl FnMut(&mut H, u64),
) -> TurnSummary {
    let mut summary = TurnSummary::default();

    let program = match compile(source, natives) {
        Ok(program) => program,
        Err(error) => {
            error.report(source, filename);
            return summary;
        }
    };
    summary.compiled = true;

    for turn in 1..=turns {
        before_turn(host, turn);
        match run_with_config(&program, natives, host, config) {
            Ok(value) => {
                tracing::debug!(turn, %value, "turn finished");
                summary.completed += 1;
            }
            Err(error) => {
                tracing::debug!(turn, %error, "turn failed");
                error.report(source, filename);
                summary.failed += 1;
            }
        }
    }

    summary
}
