use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

pub use crate::position::{Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Type,
    Identifier,
    Runtime,
}

impl ErrorKind {
    /// Lexical, syntax, type and identifier errors all stop compilation.
    pub fn is_static(self) -> bool {
        !matches!(self, ErrorKind::Runtime)
    }

    fn color(self) -> Color {
        match self {
            ErrorKind::Lexical => Color::Red,
            ErrorKind::Syntax => Color::Yellow,
            ErrorKind::Type | ErrorKind::Identifier => Color::Blue,
            ErrorKind::Runtime => Color::Magenta,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::Lexical => "Lexical Error",
            ErrorKind::Syntax => "Syntax Error",
            ErrorKind::Type => "Type Error",
            ErrorKind::Identifier => "Identifier Error",
            ErrorKind::Runtime => "Runtime Error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message} ({} to {}).", .span.start, .span.end)]
pub struct BotError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
    /// Runtime errors that a `try` branch is not allowed to catch.
    pub fatal: bool,
}

impl BotError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
            fatal: false,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Lexical, span, message)
    }

    pub fn syntax_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Syntax, span, message)
    }

    pub fn type_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Type, span, message)
    }

    pub fn identifier_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Identifier, span, message)
    }

    pub fn runtime_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::Runtime, span, message)
    }

    pub fn fatal_error(span: Span, message: String) -> Self {
        Self {
            fatal: true,
            ..Self::new(ErrorKind::Runtime, span, message)
        }
    }

    /// Whether a `try` branch may swallow this error and move on.
    pub fn is_recoverable(&self) -> bool {
        self.kind == ErrorKind::Runtime && !self.fatal
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");
        let color = self.kind.color();
        let range = self.span.char_range(source.chars().count());

        let mut report_builder = Report::build(ReportKind::Error, filename, range.start)
            .with_message(format!("{}: {}", self.kind.fg(color), self.message))
            .with_label(
                Label::new((filename, range))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder = report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        // Fall back to the plain one-line form if the terminal write fails.
        if report_builder
            .finish()
            .eprint((filename, Source::from(source)))
            .is_err()
        {
            eprintln!("{}", self);
        }
    }
}
