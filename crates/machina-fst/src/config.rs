// Per-call traversal switches.

use crate::MAX_STEP_COUNT;

/// Switches for one traversal call.
///
/// Per-automaton settings (direction, unification, filter) live on
/// [`crate::Fst`]; everything here may differ between calls against the
/// same automaton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalConfig {
    /// Only seed branches at the start cursor.
    pub start_anchor: bool,
    /// Only accept once the whole sequence has been consumed.
    pub end_anchor: bool,
    /// Fill unspecified candidate features from requirement defaults.
    pub use_defaults: bool,
    /// Keep searching later start positions after a successful one.
    pub all_matches: bool,
    /// Main-loop iteration limit per traversal call.
    pub max_steps: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            start_anchor: false,
            end_anchor: false,
            use_defaults: false,
            all_matches: false,
            max_steps: MAX_STEP_COUNT,
        }
    }
}

impl TraversalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start- and end-anchored.
    pub fn anchored() -> Self {
        Self {
            start_anchor: true,
            end_anchor: true,
            ..Self::default()
        }
    }

    pub fn start_anchor(mut self, on: bool) -> Self {
        self.start_anchor = on;
        self
    }

    pub fn end_anchor(mut self, on: bool) -> Self {
        self.end_anchor = on;
        self
    }

    pub fn use_defaults(mut self, on: bool) -> Self {
        self.use_defaults = on;
        self
    }

    pub fn all_matches(mut self, on: bool) -> Self {
        self.all_matches = on;
        self
    }

    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }
}
