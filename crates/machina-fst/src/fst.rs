// The immutable automaton, its builder and the transduce loop.

use std::cmp::Ordering;

use hashbrown::HashSet;
use machina_core::{AnnotatedData, Annotation, Direction, Range, VariableBindings};

use crate::FstError;
use crate::arc::{Arc, ArcId};
use crate::config::TraversalConfig;
use crate::instance::OutputTrack;
use crate::output::FstOperations;
use crate::ranking::compare_results;
use crate::register::{Registers, TagMapCommand};
use crate::result::FstResult;
use crate::state::{AcceptInfo, State, StateId};
use crate::traversal::{
    DeterministicFsaTraversal, DeterministicFstTraversal, Mode, NondeterministicFsaTraversal,
    NondeterministicFstTraversal, TraversalMethod,
};

/// Predicate selecting the annotations a traversal sees.
pub type AnnotationFilter = Box<dyn Fn(&Annotation) -> bool + Send + Sync>;

/// A finite-state acceptor or transducer over annotated data.
///
/// States and arcs live in arenas addressed by [`StateId`] and [`ArcId`].
/// An `Fst` is immutable once built and can be shared between threads;
/// every traversal keeps its mutable state in its own driver.
pub struct Fst<D> {
    states: Vec<State<D>>,
    arcs: Vec<Arc>,
    start: StateId,
    direction: Direction,
    filter: Option<AnnotationFilter>,
    use_unification: bool,
    ignore_variables: bool,
    register_count: usize,
    operations: Option<Box<dyn FstOperations<D>>>,
    groups: Vec<(String, usize)>,
    initializers: Vec<TagMapCommand>,
    deterministic: bool,
}

impl<D> std::fmt::Debug for Fst<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fst")
            .field("state_count", &self.states.len())
            .field("arc_count", &self.arcs.len())
            .field("start", &self.start)
            .field("direction", &self.direction)
            .field("register_count", &self.register_count)
            .field("deterministic", &self.deterministic)
            .field("transducer", &self.operations.is_some())
            .finish()
    }
}

impl<D> Fst<D> {
    pub fn start(&self) -> StateId {
        self.start
    }

    /// Panics if `id` does not belong to this automaton.
    pub fn state(&self, id: StateId) -> &State<D> {
        &self.states[id.0]
    }

    /// Panics if `id` does not belong to this automaton.
    pub fn arc(&self, id: ArcId) -> &Arc {
        &self.arcs[id.0]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of register rows (tags) every bank for this automaton has.
    pub fn register_count(&self) -> usize {
        self.register_count
    }

    pub fn uses_unification(&self) -> bool {
        self.use_unification
    }

    pub fn ignores_variables(&self) -> bool {
        self.ignore_variables
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Whether traversals rewrite their output.
    pub fn is_transducer(&self) -> bool {
        self.operations.is_some()
    }

    pub fn operations(&self) -> Option<&dyn FstOperations<D>> {
        self.operations.as_deref()
    }

    /// Commands run at the start position of every transduce round.
    pub fn initializers(&self) -> &[TagMapCommand] {
        &self.initializers
    }

    /// An all-absent register bank sized for this automaton.
    pub fn new_registers(&self) -> Registers {
        Registers::new(self.register_count)
    }

    /// Whether a traversal includes `annotation`.
    pub fn accepts_annotation(&self, annotation: &Annotation) -> bool {
        self.filter.as_ref().is_none_or(|f| f(annotation))
    }

    /// (start tag, end tag) of a named group.
    pub fn group_tags(&self, name: &str) -> Option<(usize, usize)> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, tag)| (tag, tag + 1))
    }

    /// Offsets captured by a named group, in left-to-right order, or `None`
    /// if the group is unknown or did not take part in the derivation.
    pub fn group_offsets(&self, name: &str, registers: &Registers) -> Option<Range> {
        let (start_tag, end_tag) = self.group_tags(name)?;
        let a = registers.get(start_tag, 0).offset()?;
        let b = registers.get(end_tag, 1).offset()?;
        Some(Range::new(a.min(b), a.max(b)))
    }
}

impl<D: AnnotatedData + PartialEq> Fst<D> {
    /// Run the automaton over `data` from position `start` of the filtered
    /// annotation sequence, ordering each round's results with
    /// [`compare_results`].
    pub fn transduce(
        &self,
        data: &D,
        start: usize,
        bindings: &VariableBindings,
        config: &TraversalConfig,
    ) -> Vec<FstResult<D>> {
        self.transduce_with(data, start, bindings, config, compare_results)
    }

    /// Like [`transduce`](Self::transduce) with a caller-supplied ordering.
    ///
    /// Each round seeds fresh registers through the initializers at the
    /// cursor. The loop stops after the first round with results unless
    /// `all_matches` is set, and after the first round whenever
    /// `start_anchor` is set.
    pub fn transduce_with<F>(
        &self,
        data: &D,
        start: usize,
        bindings: &VariableBindings,
        config: &TraversalConfig,
        mut compare: F,
    ) -> Vec<FstResult<D>>
    where
        F: FnMut(&FstResult<D>, &FstResult<D>) -> Ordering,
    {
        let cfg = config.clone();
        match (self.deterministic, self.is_transducer()) {
            (true, false) => self.run(
                DeterministicFsaTraversal::new(self, data, bindings, cfg),
                start,
                &mut compare,
            ),
            (true, true) => self.run(
                DeterministicFstTraversal::new(self, data, bindings, cfg),
                start,
                &mut compare,
            ),
            (false, false) => self.run(
                NondeterministicFsaTraversal::new(self, data, bindings, cfg),
                start,
                &mut compare,
            ),
            (false, true) => self.run(
                NondeterministicFstTraversal::new(self, data, bindings, cfg),
                start,
                &mut compare,
            ),
        }
    }

    fn run<M, T>(
        &self,
        mut method: TraversalMethod<'_, D, M, T>,
        start: usize,
        compare: &mut dyn FnMut(&FstResult<D>, &FstResult<D>) -> Ordering,
    ) -> Vec<FstResult<D>>
    where
        M: Mode,
        T: OutputTrack<D>,
    {
        let len = method.annotations().len();
        let start_anchor = method.config().start_anchor;
        let all_matches = method.config().all_matches;
        let mut index = start;
        let mut seeded = HashSet::new();
        let mut results: Vec<FstResult<D>> = Vec::new();
        let mut rounds = 0usize;
        while index < len {
            rounds += 1;
            let registers = self.new_registers();
            let mut round =
                method.traverse(&mut index, &registers, &self.initializers, &mut seeded);
            if !round.is_empty() {
                round.sort_by(|x, y| compare(x, y));
                for result in round {
                    let duplicate = all_matches
                        && results
                            .iter()
                            .any(|r| r.registers == result.registers && r.output == result.output);
                    if !duplicate {
                        results.push(result);
                    }
                }
                if !all_matches {
                    break;
                }
            }
            if start_anchor {
                break;
            }
        }
        log::debug!("transduce: {rounds} rounds, {} results", results.len());
        results
    }
}

/// Validating constructor for [`Fst`].
pub struct FstBuilder<D> {
    states: Vec<State<D>>,
    arcs: Vec<Arc>,
    start: Option<StateId>,
    direction: Direction,
    filter: Option<AnnotationFilter>,
    use_unification: bool,
    ignore_variables: bool,
    declared_registers: usize,
    next_tag: usize,
    operations: Option<Box<dyn FstOperations<D>>>,
    groups: Vec<(String, usize)>,
    initializers: Vec<TagMapCommand>,
    deterministic: bool,
}

impl<D> Default for FstBuilder<D> {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            arcs: Vec::new(),
            start: None,
            direction: Direction::LeftToRight,
            filter: None,
            use_unification: true,
            ignore_variables: false,
            declared_registers: 0,
            next_tag: 0,
            operations: None,
            groups: Vec::new(),
            initializers: Vec::new(),
            deterministic: false,
        }
    }
}

impl<D> FstBuilder<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a non-accepting state. The first state added is the start state
    /// unless [`set_start`](Self::set_start) says otherwise.
    pub fn add_state(&mut self) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State::new());
        if self.start.is_none() {
            self.start = Some(id);
        }
        id
    }

    /// Add a state with an anonymous acceptance.
    pub fn add_accepting_state(&mut self) -> StateId {
        let id = self.add_state();
        self.states[id.0].accept_infos.push(AcceptInfo::anonymous());
        id
    }

    pub fn set_start(&mut self, state: StateId) -> &mut Self {
        self.start = Some(state);
        self
    }

    /// Add a named acceptance to `state`. Panics if `state` was not added
    /// by this builder.
    pub fn accept(&mut self, state: StateId, info: AcceptInfo<D>) -> &mut Self {
        let infos = &mut self.states[state.0].accept_infos;
        infos.retain(|i| i.id.is_some());
        infos.push(info);
        self
    }

    pub fn finisher(&mut self, state: StateId, command: TagMapCommand) -> &mut Self {
        self.states[state.0].finishers.push(command);
        self
    }

    pub fn lazy(&mut self, state: StateId) -> &mut Self {
        self.states[state.0].is_lazy = true;
        self
    }

    /// Add an arc. Arc endpoints are checked by [`build`](Self::build).
    pub fn add_arc(&mut self, arc: Arc) -> ArcId {
        let id = ArcId(self.arcs.len());
        self.arcs.push(arc);
        id
    }

    /// Allocate a fresh tag (register row).
    pub fn tag(&mut self) -> usize {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    /// Allocate a named group: a start tag and the end tag after it.
    pub fn group(&mut self, name: impl Into<String>) -> (usize, usize) {
        let start = self.tag();
        let end = self.tag();
        self.groups.push((name.into(), start));
        (start, end)
    }

    /// Declare at least `count` register rows.
    pub fn registers(&mut self, count: usize) -> &mut Self {
        self.declared_registers = self.declared_registers.max(count);
        self
    }

    /// Command run at the start of every transduce round.
    pub fn initializer(&mut self, command: TagMapCommand) -> &mut Self {
        self.initializers.push(command);
        self
    }

    pub fn direction(&mut self, direction: Direction) -> &mut Self {
        self.direction = direction;
        self
    }

    pub fn filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&Annotation) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn use_unification(&mut self, on: bool) -> &mut Self {
        self.use_unification = on;
        self
    }

    pub fn ignore_variables(&mut self, on: bool) -> &mut Self {
        self.ignore_variables = on;
        self
    }

    /// Declare that at most one arc matches per state and position.
    pub fn deterministic(&mut self, on: bool) -> &mut Self {
        self.deterministic = on;
        self
    }

    /// Make the automaton a transducer that edits output through `ops`.
    pub fn operations<O>(&mut self, ops: O) -> &mut Self
    where
        O: FstOperations<D> + 'static,
    {
        self.operations = Some(Box::new(ops));
        self
    }

    pub fn build(self) -> Result<Fst<D>, FstError> {
        let FstBuilder {
            mut states,
            mut arcs,
            start,
            direction,
            filter,
            use_unification,
            ignore_variables,
            declared_registers,
            next_tag,
            operations,
            groups,
            initializers,
            deterministic,
        } = self;

        let start = start.ok_or(FstError::MissingStartState)?;
        let state_count = states.len();
        let register_count = declared_registers.max(next_tag);
        let check_state = |s: StateId| {
            if s.0 < state_count {
                Ok(())
            } else {
                Err(FstError::UnknownState {
                    state: s.0,
                    count: state_count,
                })
            }
        };
        let check_commands = |cmds: &[TagMapCommand]| {
            match cmds.iter().map(TagMapCommand::max_row).find(|&r| r >= register_count) {
                Some(row) => Err(FstError::RegisterOutOfRange {
                    register: row,
                    count: register_count,
                }),
                None => Ok(()),
            }
        };

        check_state(start)?;
        check_commands(&initializers)?;
        for state in &states {
            check_commands(&state.finishers)?;
        }
        for (i, arc) in arcs.iter_mut().enumerate() {
            check_state(arc.source)?;
            check_state(arc.target)?;
            if let Some(tag) = arc.tag {
                arc.commands.insert(0, TagMapCommand::current_position(tag));
            }
            check_commands(&arc.commands)?;
            if !arc.outputs.is_empty() && operations.is_none() {
                return Err(FstError::MissingOperations { arc: i });
            }
        }

        for (i, arc) in arcs.iter().enumerate() {
            states[arc.source.0].arcs.push(ArcId(i));
        }
        for state in &mut states {
            state.arcs.sort_by_key(|id| arcs[id.0].priority_class);
        }

        Ok(Fst {
            states,
            arcs,
            start,
            direction,
            filter,
            use_unification,
            ignore_variables,
            register_count,
            operations,
            groups,
            initializers,
            deterministic,
        })
    }
}
