/// Limits applied to a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Statements plus loop iterations allowed per run. `None` is unbounded.
    pub max_steps: Option<u64>,
    /// Nested user-function calls allowed before the run is aborted.
    pub max_call_depth: usize,
}

impl RunConfig {
    pub const DEFAULT_CALL_DEPTH: usize = 200;

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_call_depth: Self::DEFAULT_CALL_DEPTH,
        }
    }
}
