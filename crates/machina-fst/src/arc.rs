// Automaton arcs: input requirements, outputs, tag commands and priorities.

use machina_core::{FeatureStruct, VariableBindings};

use crate::output::OutputAction;
use crate::register::TagMapCommand;
use crate::state::StateId;

/// Index of an arc in its automaton's arc arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArcId(pub(crate) usize);

impl ArcId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// What an arc consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Consumes nothing.
    Epsilon,
    /// Consumes one annotation whose feature structure matches `fs`.
    /// `enqueue_count` copies of that annotation are queued for the arc's
    /// output actions (transducers only).
    Constraint {
        fs: FeatureStruct,
        enqueue_count: usize,
    },
}

impl Input {
    pub fn constraint(fs: FeatureStruct) -> Self {
        Input::Constraint {
            fs,
            enqueue_count: 1,
        }
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Input::Epsilon)
    }

    pub fn enqueue_count(&self) -> usize {
        match self {
            Input::Epsilon => 0,
            Input::Constraint { enqueue_count, .. } => *enqueue_count,
        }
    }
}

/// Coarse ordering class for the arcs leaving one state.
///
/// Arcs are tried class by class; within a class, in the order they were
/// added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ArcPriority {
    High,
    #[default]
    Medium,
    Low,
    VeryLow,
}

/// An edge of the automaton graph.
#[derive(Debug, Clone)]
pub struct Arc {
    pub(crate) source: StateId,
    pub(crate) target: StateId,
    pub(crate) input: Input,
    pub(crate) outputs: Vec<OutputAction>,
    pub(crate) commands: Vec<TagMapCommand>,
    pub(crate) tag: Option<usize>,
    pub(crate) priority_class: ArcPriority,
    pub(crate) priority: i32,
}

impl Arc {
    pub fn new(source: StateId, target: StateId, input: Input) -> Self {
        Self {
            source,
            target,
            input,
            outputs: Vec::new(),
            commands: Vec::new(),
            tag: None,
            priority_class: ArcPriority::default(),
            priority: 0,
        }
    }

    pub fn epsilon(source: StateId, target: StateId) -> Self {
        Self::new(source, target, Input::Epsilon)
    }

    /// Record the traversal position in register row `tag` whenever this
    /// arc is taken.
    pub fn with_tag(mut self, tag: usize) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_output(mut self, output: OutputAction) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_command(mut self, command: TagMapCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// Priority recorded on the priority path; lower is preferred.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_class(mut self, class: ArcPriority) -> Self {
        self.priority_class = class;
        self
    }

    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn outputs(&self) -> &[OutputAction] {
        &self.outputs
    }

    pub fn commands(&self) -> &[TagMapCommand] {
        &self.commands
    }

    pub fn tag(&self) -> Option<usize> {
        self.tag
    }

    pub fn priority_class(&self) -> ArcPriority {
        self.priority_class
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Whether `arc` can be taken with `candidate` as the current annotation's
/// feature structure (`None` at the end of the sequence).
///
/// Epsilon arcs always match. A constraint arc never matches past the end.
/// On success `bindings` receives any newly bound variables; on failure it
/// is left as it was.
pub fn check_input_match(
    arc: &Arc,
    candidate: Option<&FeatureStruct>,
    use_unification: bool,
    use_defaults: bool,
    bindings: &mut VariableBindings,
) -> bool {
    match (&arc.input, candidate) {
        (Input::Epsilon, _) => true,
        (Input::Constraint { fs, .. }, Some(candidate)) => {
            fs.matches(candidate, use_unification, use_defaults, bindings)
        }
        (Input::Constraint { .. }, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(s: &str) -> FeatureStruct {
        s.parse().unwrap()
    }

    fn arc(req: &str) -> Arc {
        Arc::new(StateId(0), StateId(1), Input::constraint(fs(req)))
    }

    #[test]
    fn epsilon_matches_everywhere() {
        let a = Arc::epsilon(StateId(0), StateId(0));
        let mut b = VariableBindings::new();
        assert!(check_input_match(&a, None, false, false, &mut b));
        let any = fs("x=y");
        assert!(check_input_match(&a, Some(&any), false, false, &mut b));
        assert_eq!(a.input().enqueue_count(), 0);
    }

    #[test]
    fn constraint_matches_by_subsumption() {
        let a = arc("type=segment");
        let mut b = VariableBindings::new();
        let segment = fs("type=segment cons=+");
        let other = fs("type=boundary");
        assert!(check_input_match(&a, Some(&segment), false, false, &mut b));
        assert!(!check_input_match(&a, Some(&other), false, false, &mut b));
        assert!(!check_input_match(&a, None, false, false, &mut b));
    }

    #[test]
    fn constraint_binds_variables() {
        let a = arc("voice=$v");
        let mut b = VariableBindings::new();
        let plus = fs("voice=+");
        let minus = fs("voice=-");
        assert!(check_input_match(&a, Some(&plus), false, false, &mut b));
        assert!(b.contains("v"));
        assert!(!check_input_match(&a, Some(&minus), false, false, &mut b));
    }

    #[test]
    fn builder_defaults() {
        let a = arc("type=segment").with_tag(3).with_priority(2);
        assert_eq!(a.tag(), Some(3));
        assert_eq!(a.priority(), 2);
        assert_eq!(a.priority_class(), ArcPriority::Medium);
        assert!(ArcPriority::High < ArcPriority::VeryLow);
    }
}
