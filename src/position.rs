use std::fmt;

/// A location in the source text.
///
/// All fields are 0-based. `index` counts characters, not bytes, which is
/// also what ariadne expects for its label offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(index: usize, line: usize, column: usize) -> Self {
        Self { index, line, column }
    }

    /// Moves past `c`, starting a new line after `'\n'`.
    pub fn advance(&mut self, c: char) {
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[line: {}, Column: {}]", self.line + 1, self.column + 1)
    }
}

/// Half-open source range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Covers both spans, assuming `self` starts first.
    pub fn to(self, other: Span) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }

    /// Character range for ariadne labels, clamped to the source length.
    pub fn char_range(&self, source_len: usize) -> std::ops::Range<usize> {
        let start = self.start.index.min(source_len);
        let end = self.end.index.clamp(start, source_len);
        start..end
    }
}
