// Traversal of an automaton over an annotation sequence.
//
// One driver serves all four variants. `Mode` decides whether a state's
// arcs are explored exhaustively (with memoized merging) or the first
// matching symbol arc wins; `OutputTrack` decides whether branches carry
// rewritten output.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use log::{debug, trace, warn};
use machina_core::{
    AnnotatedData, AnnotationId, Direction, FeatureStruct, Offset, Range, VariableBindings,
};

use crate::arc::{Arc, ArcId, check_input_match};
use crate::config::TraversalConfig;
use crate::fst::Fst;
use crate::instance::{Branch, InstancePool, OutputTrack, Recognition, Transduction};
use crate::register::{Register, Registers, TagMapCommand, execute_commands};
use crate::result::FstResult;
use crate::state::StateId;

/// Search strategy of a traversal.
pub trait Mode {
    /// Explore every matching arc and merge equivalent branches.
    const EXHAUSTIVE: bool;
    const NAME: &'static str;
}

/// At most one arc matches per state and position; the first matching
/// symbol arc is taken and the branch is reused in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deterministic;

/// Every matching arc is explored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nondeterministic;

impl Mode for Deterministic {
    const EXHAUSTIVE: bool = false;
    const NAME: &'static str = "deterministic";
}

impl Mode for Nondeterministic {
    const EXHAUSTIVE: bool = true;
    const NAME: &'static str = "nondeterministic";
}

pub type DeterministicFsaTraversal<'a, D> = TraversalMethod<'a, D, Deterministic, Recognition>;
pub type DeterministicFstTraversal<'a, D> =
    TraversalMethod<'a, D, Deterministic, Transduction<D>>;
pub type NondeterministicFsaTraversal<'a, D> =
    TraversalMethod<'a, D, Nondeterministic, Recognition>;
pub type NondeterministicFstTraversal<'a, D> =
    TraversalMethod<'a, D, Nondeterministic, Transduction<D>>;

/// Identity of a branch for merging: state, position, bindings and the
/// output-bearing arcs taken.
type MemoKey = (StateId, usize, VariableBindings, Vec<ArcId>);

/// A frontier entry pointing at a slot. The heap pops the smallest
/// priority path first and, among equal paths, the latest push.
#[derive(Debug)]
struct Queued {
    path: Vec<i32>,
    seq: u64,
    slot: usize,
    generation: u32,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .path
            .cmp(&self.path)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

struct Slot<T> {
    generation: u32,
    branch: Option<Branch<T>>,
}

/// The live branches of one traversal call.
///
/// Branches sit in reusable slots so a memoized branch that has not been
/// expanded yet can be replaced by a better one. An ordered frontier
/// expands branches by ascending priority path, so once a configuration
/// is expanded no later branch can reach it along a better path. An
/// unordered frontier is a plain stack.
struct Frontier<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    queue: BinaryHeap<Queued>,
    memo: HashMap<MemoKey, (usize, u32, Vec<i32>)>,
    ordered: bool,
    pushed: u64,
    merges: usize,
}

impl<T> Frontier<T> {
    fn new(ordered: bool) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            queue: BinaryHeap::new(),
            memo: HashMap::new(),
            ordered,
            pushed: 0,
            merges: 0,
        }
    }

    fn push(&mut self, branch: Branch<T>) -> (usize, u32) {
        let path = if self.ordered {
            branch.priorities.clone()
        } else {
            Vec::new()
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot];
                entry.generation = entry.generation.wrapping_add(1);
                entry.branch = Some(branch);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    branch: Some(branch),
                });
                self.slots.len() - 1
            }
        };
        let generation = self.slots[slot].generation;
        self.pushed += 1;
        self.queue.push(Queued {
            path,
            seq: self.pushed,
            slot,
            generation,
        });
        (slot, generation)
    }

    fn pop(&mut self) -> Option<Branch<T>> {
        while let Some(queued) = self.queue.pop() {
            if let Some(branch) = self.take(queued.slot, queued.generation) {
                return Some(branch);
            }
        }
        None
    }

    /// Empty `slot` if it still holds the branch pushed as `generation`.
    fn take(&mut self, slot: usize, generation: u32) -> Option<Branch<T>> {
        let entry = &mut self.slots[slot];
        if entry.generation != generation {
            return None;
        }
        let branch = entry.branch.take()?;
        self.free.push(slot);
        Some(branch)
    }

    fn drain(&mut self) -> impl Iterator<Item = Branch<T>> + '_ {
        self.queue.clear();
        self.free.clear();
        self.slots.drain(..).filter_map(|slot| slot.branch)
    }
}

impl<T: Clone> Frontier<T> {
    /// Push `branch` unless an equivalent branch with a priority path at
    /// least as good was already pushed. A better branch replaces a
    /// memoized one that is still waiting.
    fn offer(&mut self, branch: Branch<T>, trail: Vec<ArcId>, pool: &mut InstancePool<T>) {
        let key: MemoKey = (branch.state, branch.index, branch.bindings.clone(), trail);
        let known = self
            .memo
            .get(&key)
            .map(|(slot, generation, best)| (*slot, *generation, branch.priorities < *best));
        if let Some((slot, generation, better)) = known {
            self.merges += 1;
            if !better {
                trace!(
                    "merged branch at state {} index {}",
                    branch.state.index(),
                    branch.index
                );
                pool.release(branch);
                return;
            }
            match self.take(slot, generation) {
                Some(old) => pool.release(old),
                None => {
                    // Already expanded along a path no worse than this one.
                    pool.release(branch);
                    return;
                }
            }
        }
        let best = branch.priorities.clone();
        let (slot, generation) = self.push(branch);
        self.memo.insert(key, (slot, generation, best));
    }
}

/// Results collected by one traversal call.
///
/// When merging, an accepting configuration reached along several paths
/// yields one result per accept info, carrying the smallest priority path.
struct Harvest<D> {
    results: Vec<FstResult<D>>,
    accepted: HashMap<(MemoKey, usize), usize>,
}

impl<D> Harvest<D> {
    fn new() -> Self {
        Self {
            results: Vec::new(),
            accepted: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.results.len()
    }

    fn record(&mut self, key: Option<(MemoKey, usize)>, mut candidate: FstResult<D>) {
        let Some(key) = key else {
            self.results.push(candidate);
            return;
        };
        match self.accepted.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(self.results.len());
                self.results.push(candidate);
            }
            Entry::Occupied(entry) => {
                let existing = &mut self.results[*entry.get()];
                if candidate.priority_path < existing.priority_path {
                    candidate.sequence_no = existing.sequence_no;
                    *existing = candidate;
                }
            }
        }
    }
}

/// Search driver over one automaton and one piece of data.
///
/// The filtered annotation sequence is computed once at construction;
/// [`traverse`](Self::traverse) may then be called repeatedly with
/// different start positions. The driver owns its instance pool, so
/// concurrent traversals need one driver each while sharing the `Fst`.
pub struct TraversalMethod<'a, D, M, T> {
    fst: &'a Fst<D>,
    data: &'a D,
    config: TraversalConfig,
    annotations: Vec<AnnotationId>,
    end_offset: Offset,
    template: Branch<T>,
    pool: InstancePool<T>,
    _mode: PhantomData<M>,
}

impl<D, M, T> std::fmt::Debug for TraversalMethod<'_, D, M, T>
where
    M: Mode,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalMethod")
            .field("mode", &M::NAME)
            .field("annotation_count", &self.annotations.len())
            .field("end_offset", &self.end_offset)
            .field("config", &self.config)
            .finish()
    }
}

impl<'a, D, M, T> TraversalMethod<'a, D, M, T>
where
    D: AnnotatedData,
    M: Mode,
    T: OutputTrack<D>,
{
    pub fn new(
        fst: &'a Fst<D>,
        data: &'a D,
        bindings: &VariableBindings,
        config: TraversalConfig,
    ) -> Self {
        let dir = fst.direction();
        let list = data.annotations();
        let mut annotations: Vec<AnnotationId> = list
            .depth_first(dir)
            .into_iter()
            .filter(|&id| fst.accepts_annotation(&list[id]))
            .collect();
        annotations.sort_by(|&x, &y| {
            list[x]
                .range()
                .cmp_in(&list[y].range(), dir)
                .then_with(|| list.depth(x).cmp(&list.depth(y)))
        });
        let end_offset = annotations
            .iter()
            .map(|&id| list[id].range().end_in(dir))
            .reduce(|a, b| match dir {
                Direction::LeftToRight => a.max(b),
                Direction::RightToLeft => a.min(b),
            })
            .unwrap_or(0);
        let bindings = if fst.ignores_variables() {
            VariableBindings::new()
        } else {
            bindings.clone()
        };
        let template = Branch::new(
            fst.start(),
            Registers::new(fst.register_count()),
            bindings,
            T::start(data),
        );
        Self {
            fst,
            data,
            config,
            annotations,
            end_offset,
            template,
            pool: InstancePool::new(),
            _mode: PhantomData,
        }
    }

    /// The filtered annotation sequence in traversal order.
    pub fn annotations(&self) -> &[AnnotationId] {
        &self.annotations
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    /// Run the automaton from the annotations starting at the same offset
    /// as `annotations()[*index]`.
    ///
    /// `init_registers` seeds every branch after `init_commands` ran against
    /// it at the start position. Positions recorded in `seeded` are not
    /// seeded again, and every position seeded here is added to it. On
    /// return `*index` points past the positions sharing the start offset.
    ///
    /// Panics if the sequence is empty, `*index` is past its end, or the
    /// register bank does not match the automaton's tag count.
    pub fn traverse(
        &mut self,
        index: &mut usize,
        init_registers: &Registers,
        init_commands: &[TagMapCommand],
        seeded: &mut HashSet<usize>,
    ) -> Vec<FstResult<D>> {
        assert!(
            !self.annotations.is_empty(),
            "cannot traverse an empty annotation sequence"
        );
        assert!(
            *index < self.annotations.len(),
            "start index {} is past the end of a {}-annotation sequence",
            *index,
            self.annotations.len()
        );
        assert_eq!(
            init_registers.tag_count(),
            self.fst.register_count(),
            "register bank does not match the automaton's tag count"
        );

        let mut harvest = Harvest::new();
        let mut frontier = Frontier::new(M::EXHAUSTIVE);
        let seeds = self.initialize(index, init_registers, init_commands, seeded);
        debug!("{} traversal seeded {} branches", M::NAME, seeds.len());
        for seed in seeds.into_iter().rev() {
            if M::EXHAUSTIVE {
                self.offer(&mut frontier, seed);
            } else {
                frontier.push(seed);
            }
        }

        let mut steps = 0usize;
        while let Some(branch) = frontier.pop() {
            if steps >= self.config.max_steps {
                warn!(
                    "{} traversal stopped after {} steps with {} results",
                    M::NAME,
                    steps,
                    harvest.len()
                );
                self.pool.release(branch);
                break;
            }
            steps += 1;
            if M::EXHAUSTIVE {
                self.step_exhaustive(branch, &mut frontier, &mut harvest);
            } else {
                self.step_first_match(branch, &mut frontier, &mut harvest);
            }
        }
        let merges = frontier.merges;
        for branch in frontier.drain() {
            self.pool.release(branch);
        }
        let (created, reused) = self.pool.stats();
        debug!(
            "{} traversal: {steps} steps, {} results, {merges} merges, {created} branches allocated, {reused} reused",
            M::NAME,
            harvest.len()
        );
        harvest.results
    }

    fn initialize(
        &mut self,
        index: &mut usize,
        init_registers: &Registers,
        init_commands: &[TagMapCommand],
        seeded: &mut HashSet<usize>,
    ) -> Vec<Branch<T>> {
        let len = self.annotations.len();
        let mut seeds = Vec::new();
        let mut starts = vec![*index];
        let mut first = true;
        while let Some(start) = starts.pop() {
            let mut cursor = start;
            let offset = self.start_of(cursor);
            if self.config.start_anchor {
                let mut i = cursor;
                while i < len && self.start_of(i) == offset {
                    if self.is_optional(i) {
                        let next = self.next_nonoverlapping(i);
                        if next != len {
                            starts.push(next);
                        }
                    }
                    i += 1;
                }
            }
            let mut registers = init_registers.clone();
            execute_commands(
                &mut registers,
                init_commands,
                Register::at(offset, true),
                Register::ABSENT,
            );
            while cursor < len && self.start_of(cursor) == offset {
                if seeded.insert(cursor) {
                    let mut branch = self.pool.copy(&self.template);
                    branch.index = cursor;
                    branch.registers.clone_from(&registers);
                    seeds.push(branch);
                }
                cursor += 1;
            }
            if first {
                *index = cursor;
                first = false;
            }
        }
        seeds
    }

    /// Deterministic step: epsilon arcs fork, the first matching symbol arc
    /// advances the branch in place and ends the step.
    fn step_first_match(
        &mut self,
        branch: Branch<T>,
        frontier: &mut Frontier<T>,
        harvest: &mut Harvest<D>,
    ) {
        let fst = self.fst;
        let arcs = fst.state(branch.state).arcs();
        let mut current = Some(branch);
        for (i, &arc_id) in arcs.iter().enumerate() {
            let Some(inst) = current.as_ref() else { break };
            let last = i + 1 == arcs.len();
            let arc = fst.arc(arc_id);
            if arc.input.is_epsilon() {
                let mut ti = self.fork(&mut current, last);
                trace!(
                    "epsilon arc {} from state {}",
                    arc_id.index(),
                    arc.source.index()
                );
                self.take_epsilon(&mut ti, arc_id, arc, harvest);
                frontier.push(ti);
            } else {
                let mut bindings = inst.bindings.clone();
                if self.check_match(arc, inst.index, &mut bindings) {
                    let Some(mut ti) = current.take() else { break };
                    ti.bindings = bindings;
                    trace!("arc {} matched annotation {}", arc_id.index(), ti.index);
                    for next in self.take_symbol(ti, arc_id, arc, harvest) {
                        frontier.push(next);
                    }
                    break;
                }
            }
        }
        if let Some(inst) = current {
            self.pool.release(inst);
        }
    }

    /// Nondeterministic step: every matching arc forks a branch, and
    /// branches are merged through the frontier's memo.
    fn step_exhaustive(
        &mut self,
        branch: Branch<T>,
        frontier: &mut Frontier<T>,
        harvest: &mut Harvest<D>,
    ) {
        let fst = self.fst;
        let arcs = fst.state(branch.state).arcs();
        let mut current = Some(branch);
        for (i, &arc_id) in arcs.iter().enumerate() {
            let Some(inst) = current.as_ref() else { break };
            let last = i + 1 == arcs.len();
            let arc = fst.arc(arc_id);
            if arc.input.is_epsilon() {
                if inst.visited.contains(&arc.target) {
                    continue;
                }
                let mut ti = self.fork(&mut current, last);
                ti.visited.insert(arc.target);
                self.take_epsilon(&mut ti, arc_id, arc, harvest);
                self.offer(frontier, ti);
            } else {
                let mut bindings = inst.bindings.clone();
                if self.check_match(arc, inst.index, &mut bindings) {
                    let mut ti = self.fork(&mut current, last);
                    ti.bindings = bindings;
                    for mut next in self.take_symbol(ti, arc_id, arc, harvest) {
                        next.visited.clear();
                        self.offer(frontier, next);
                    }
                }
            }
        }
        if let Some(inst) = current {
            self.pool.release(inst);
        }
    }

    fn offer(&mut self, frontier: &mut Frontier<T>, branch: Branch<T>) {
        let trail = branch.track.trail().to_vec();
        frontier.offer(branch, trail, &mut self.pool);
    }

    /// The branch to continue on an arc: the branch itself when this is
    /// the state's last arc, otherwise a copy.
    fn fork(&mut self, current: &mut Option<Branch<T>>, last: bool) -> Branch<T> {
        match current.take() {
            Some(inst) if last => inst,
            Some(inst) => {
                let copy = self.pool.copy(&inst);
                *current = Some(inst);
                copy
            }
            None => unreachable!("fork called without a live branch"),
        }
    }

    fn take_epsilon(
        &mut self,
        ti: &mut Branch<T>,
        arc_id: ArcId,
        arc: &Arc,
        harvest: &mut Harvest<D>,
    ) {
        ti.priorities.push(arc.priority);
        let current = self.output_anchor(ti.index);
        ti.track.execute(arc_id, &arc.outputs, current, self.fst.operations());
        self.epsilon_advance(ti, arc, harvest);
    }

    fn take_symbol(
        &mut self,
        mut ti: Branch<T>,
        arc_id: ArcId,
        arc: &Arc,
        harvest: &mut Harvest<D>,
    ) -> Vec<Branch<T>> {
        let input = self.annotations[ti.index];
        ti.track.enqueue(input, arc.input.enqueue_count());
        ti.track.execute(arc_id, &arc.outputs, Some(input), self.fst.operations());
        ti.priorities.push(arc.priority);
        self.advance(ti, arc, harvest)
    }

    /// Move a branch that just matched `arc` past its current annotation.
    ///
    /// If optional annotations start at the next position, one extra branch
    /// is produced per optional annotation that is skipped, and one branch
    /// per annotation that is taken.
    fn advance(&mut self, inst: Branch<T>, arc: &Arc, harvest: &mut Harvest<D>) -> Vec<Branch<T>> {
        let dir = self.fst.direction();
        let len = self.annotations.len();
        let mut out = Vec::new();
        let mut pending: Vec<(Branch<T>, bool, Vec<usize>)> = vec![(inst, false, Vec::new())];

        while let Some((mut inst, optional, skipped)) = pending.pop() {
            let next = self.next_nonoverlapping(inst.index);
            let end = self.range(inst.index).end_in(dir);
            let (next_offset, next_start) = if next < len {
                (self.start_of(next), true)
            } else {
                (self.end_offset, false)
            };

            if next < len {
                let mut taken = Vec::new();
                let mut i = next;
                while i < len && self.start_of(i) == next_offset {
                    if self.is_optional(i) {
                        let mut skip = self.pool.copy(&inst);
                        skip.index = i;
                        let mut now_skipped = skipped.clone();
                        now_skipped.push(i);
                        pending.push((skip, true, now_skipped));
                        // An annotation equal to one skipped earlier in this
                        // chain cannot be taken now.
                        let fs = self.fs(i);
                        if skipped.iter().any(|&s| self.fs(s) == fs) {
                            i += 1;
                            continue;
                        }
                    }
                    taken.push(i);
                    i += 1;
                }

                execute_commands(
                    &mut inst.registers,
                    &arc.commands,
                    Register::at(next_offset, next_start),
                    Register::at(end, false),
                );
                if !optional || self.config.end_anchor {
                    inst.index = next;
                    self.check_accepting(&inst, arc, harvest);
                }
                inst.state = arc.target;

                match taken.pop() {
                    Some(last) => {
                        for &idx in &taken {
                            let mut branch = self.pool.copy(&inst);
                            branch.index = idx;
                            out.push(branch);
                        }
                        inst.index = last;
                        out.push(inst);
                    }
                    None => self.pool.release(inst),
                }
            } else {
                inst.state = arc.target;
                inst.index = next;
                execute_commands(
                    &mut inst.registers,
                    &arc.commands,
                    Register::at(next_offset, next_start),
                    Register::at(end, false),
                );
                self.check_accepting(&inst, arc, harvest);
                out.push(inst);
            }
        }
        out
    }

    fn epsilon_advance(&mut self, inst: &mut Branch<T>, arc: &Arc, harvest: &mut Harvest<D>) {
        let dir = self.fst.direction();
        let start = if inst.index < self.annotations.len() {
            self.start_of(inst.index)
        } else {
            self.end_offset
        };
        let prev_end = match self.prev_nonoverlapping(inst.index) {
            Some(prev) => Register::at(self.range(prev).end_in(dir), false),
            None => Register::ABSENT,
        };
        execute_commands(
            &mut inst.registers,
            &arc.commands,
            Register::at(start, true),
            prev_end,
        );
        self.check_accepting(inst, arc, harvest);
        inst.state = arc.target;
    }

    fn check_accepting(&self, inst: &Branch<T>, arc: &Arc, harvest: &mut Harvest<D>) {
        let target = self.fst.state(arc.target);
        let at_end = inst.index == self.annotations.len();
        if !target.is_accepting() || (self.config.end_anchor && !at_end) {
            return;
        }
        let mut registers = inst.registers.clone();
        execute_commands(
            &mut registers,
            &target.finishers,
            Register::ABSENT,
            Register::ABSENT,
        );
        let trail = inst.track.trail().to_vec();
        let config_key: Option<MemoKey> =
            M::EXHAUSTIVE.then(|| (arc.target, inst.index, inst.bindings.clone(), trail));
        for (i, info) in target.accept_infos.iter().enumerate() {
            let candidate = FstResult {
                accept_id: info.id.clone(),
                registers: registers.clone(),
                output: inst.track.output().cloned(),
                bindings: inst.bindings.clone(),
                priority: info.priority,
                is_lazy: target.is_lazy,
                end_annotation: self.annotations.get(inst.index).copied(),
                end_index: inst.index,
                priority_path: inst.priorities.clone(),
                sequence_no: harvest.len(),
            };
            if info.accepts(self.data, &candidate) {
                trace!(
                    "accepted {:?} at state {} index {}",
                    info.id,
                    arc.target.index(),
                    inst.index
                );
                harvest.record(config_key.clone().map(|key| (key, i)), candidate);
            } else {
                trace!("accept info {:?} rejected its candidate", info.id);
            }
        }
    }

    fn check_match(&self, arc: &Arc, index: usize, bindings: &mut VariableBindings) -> bool {
        let candidate = self.annotations.get(index).map(|&id| self.fs_of(id));
        let use_unification = self.fst.uses_unification();
        let use_defaults = self.config.use_defaults;
        if self.fst.ignores_variables() {
            let mut scratch = VariableBindings::new();
            check_input_match(arc, candidate, use_unification, use_defaults, &mut scratch)
        } else {
            check_input_match(arc, candidate, use_unification, use_defaults, bindings)
        }
    }

    /// Input annotation an output action falls back to when its queue is
    /// empty.
    fn output_anchor(&self, index: usize) -> Option<AnnotationId> {
        self.annotations
            .get(index)
            .or_else(|| self.annotations.last())
            .copied()
    }

    fn next_nonoverlapping(&self, index: usize) -> usize {
        let cur = self.range(index);
        (index + 1..self.annotations.len())
            .find(|&i| !cur.overlaps(&self.range(i)))
            .unwrap_or(self.annotations.len())
    }

    fn prev_nonoverlapping(&self, index: usize) -> Option<usize> {
        let cur = if index < self.annotations.len() {
            self.range(index)
        } else {
            Range::new(self.end_offset, self.end_offset)
        };
        (0..index.min(self.annotations.len()))
            .rev()
            .find(|&i| !cur.overlaps(&self.range(i)))
    }

    #[inline]
    fn range(&self, index: usize) -> Range {
        self.data.annotations()[self.annotations[index]].range()
    }

    #[inline]
    fn start_of(&self, index: usize) -> Offset {
        self.range(index).start_in(self.fst.direction())
    }

    #[inline]
    fn is_optional(&self, index: usize) -> bool {
        self.data.annotations()[self.annotations[index]].is_optional()
    }

    #[inline]
    fn fs(&self, index: usize) -> &'a FeatureStruct {
        self.fs_of(self.annotations[index])
    }

    #[inline]
    fn fs_of(&self, id: AnnotationId) -> &'a FeatureStruct {
        let data: &'a D = self.data;
        data.annotations()[id].fs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arc::Input;
    use crate::fst::FstBuilder;
    use crate::state::AcceptInfo;
    use machina_core::{AnnotationList, FeatureValue};

    fn fs(s: &str) -> FeatureStruct {
        s.parse().unwrap()
    }

    fn segments(n: usize) -> AnnotationList {
        let mut list = AnnotationList::new();
        for i in 0..n {
            list.add(Range::unit(i), fs("type=segment"));
        }
        list
    }

    /// Accepting start state with a tagged self-loop over segments.
    fn self_loop(dir: Direction) -> Fst<AnnotationList> {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        b.direction(dir);
        let s = b.add_accepting_state();
        let (start, end) = b.group("all");
        b.initializer(TagMapCommand::current_position(start));
        let arc = Arc::new(s, s, Input::constraint(fs("type=segment")));
        b.add_arc(arc.with_tag(end));
        b.build().unwrap()
    }

    fn run<M: Mode>(
        fst: &Fst<AnnotationList>,
        data: &AnnotationList,
        config: TraversalConfig,
    ) -> Vec<FstResult<AnnotationList>> {
        let mut method: TraversalMethod<'_, _, M, Recognition> =
            TraversalMethod::new(fst, data, &VariableBindings::new(), config);
        let mut index = 0;
        let mut seeded = HashSet::new();
        let registers = fst.new_registers();
        method.traverse(&mut index, &registers, fst.initializers(), &mut seeded)
    }

    #[test]
    fn right_to_left_captures_whole_sequence() {
        let fst = self_loop(Direction::RightToLeft);
        let data = segments(3);
        let results = run::<Deterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(
            fst.group_offsets("all", results[0].registers()),
            Some(Range::new(0, 3))
        );
        assert_eq!(results[0].end_annotation(), None);
        assert_eq!(results[0].priority_path(), &[0, 0, 0]);
    }

    #[test]
    fn unanchored_accepts_after_every_step() {
        let fst = self_loop(Direction::LeftToRight);
        let data = segments(3);
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::new());
        let ends: Vec<usize> = results.iter().map(|r| r.end_index()).collect();
        assert_eq!(ends, vec![1, 2, 3]);
        let seq: Vec<usize> = results.iter().map(|r| r.sequence_no()).collect();
        assert_eq!(seq, vec![0, 1, 2]);
    }

    #[test]
    fn step_limit_returns_partial_results() {
        let fst = self_loop(Direction::LeftToRight);
        let data = segments(3);
        let results = run::<Deterministic>(&fst, &data, TraversalConfig::new().max_steps(1));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn seeding_advances_cursor_and_skips_seeded_positions() {
        let fst = self_loop(Direction::LeftToRight);
        let data = segments(2);
        let mut method: DeterministicFsaTraversal<'_, _> = TraversalMethod::new(
            &fst,
            &data,
            &VariableBindings::new(),
            TraversalConfig::new(),
        );
        let mut seeded = HashSet::new();
        let mut index = 0;
        let first = method.traverse(&mut index, &fst.new_registers(), &[], &mut seeded);
        assert_eq!(index, 1);
        assert!(seeded.contains(&0));
        assert!(!first.is_empty());
        let mut again = 0;
        let second = method.traverse(&mut again, &fst.new_registers(), &[], &mut seeded);
        assert!(second.is_empty());
    }

    #[test]
    fn epsilon_at_first_position_leaves_end_register_absent() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_accepting_state();
        let t = b.tag();
        b.add_arc(Arc::epsilon(s0, s1).with_tag(t));
        let fst = b.build().unwrap();
        let data = segments(1);
        let results = run::<Deterministic>(&fst, &data, TraversalConfig::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].registers().get(t, 0), Register::at(0, true));
        assert_eq!(results[0].registers().get(t, 1), Register::ABSENT);
    }

    #[test]
    fn equivalent_branches_merge_keeping_better_path() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_accepting_state();
        b.add_arc(Arc::epsilon(s0, s1).with_priority(5));
        b.add_arc(Arc::epsilon(s0, s1).with_priority(1));
        b.add_arc(Arc::new(s1, s2, Input::constraint(fs("type=segment"))));
        let fst = b.build().unwrap();
        let data = segments(1);
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].priority_path(), &[1, 0]);
    }

    #[test]
    fn converging_epsilon_paths_yield_one_result() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let worse = b.add_state();
        let better = b.add_state();
        let join = b.add_state();
        let end = b.add_accepting_state();
        b.add_arc(Arc::epsilon(s0, worse).with_priority(5));
        b.add_arc(Arc::epsilon(s0, better).with_priority(1));
        b.add_arc(Arc::epsilon(worse, join));
        b.add_arc(Arc::epsilon(better, join));
        b.add_arc(Arc::new(join, end, Input::constraint(fs("type=segment"))));
        let fst = b.build().unwrap();
        let data = segments(1);
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].priority_path(), &[1, 0, 0]);
    }

    #[test]
    fn accepting_configuration_reached_twice_keeps_best_path() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_accepting_state();
        let segment = || Input::constraint(fs("type=segment"));
        b.add_arc(Arc::new(s0, s1, segment()).with_priority(4));
        b.add_arc(Arc::new(s0, s1, segment()).with_priority(2));
        let fst = b.build().unwrap();
        let data = segments(1);
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].priority_path(), &[2]);
        assert_eq!(results[0].sequence_no(), 0);
    }

    #[test]
    fn epsilon_cycle_terminates() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_accepting_state();
        b.add_arc(Arc::epsilon(s0, s1));
        b.add_arc(Arc::epsilon(s1, s0));
        b.add_arc(Arc::new(s0, s0, Input::constraint(fs("type=segment"))));
        let fst = b.build().unwrap();
        let data = segments(2);
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].end_index(), 2);
        assert_eq!(results[0].priority_path(), &[0, 0, 0]);
    }

    #[test]
    fn frontier_reuses_slots_and_pops_best_path_first() {
        let mut pool = InstancePool::new();
        let mut frontier = Frontier::new(true);
        let with_path = |path: &[i32]| {
            let mut branch = Branch::new(
                StateId(0),
                Registers::new(0),
                VariableBindings::new(),
                Recognition,
            );
            branch.priorities = path.to_vec();
            branch
        };
        for _ in 0..10 {
            frontier.push(with_path(&[0]));
            assert!(frontier.pop().is_some());
        }
        assert_eq!(frontier.slots.len(), 1);

        frontier.push(with_path(&[5]));
        frontier.push(with_path(&[1, 9]));
        assert_eq!(frontier.pop().map(|b| b.priorities), Some(vec![1, 9]));
        assert_eq!(frontier.pop().map(|b| b.priorities), Some(vec![5]));

        frontier.offer(with_path(&[3]), Vec::new(), &mut pool);
        frontier.offer(with_path(&[2]), Vec::new(), &mut pool);
        frontier.offer(with_path(&[4]), Vec::new(), &mut pool);
        assert_eq!(frontier.merges, 2);
        assert_eq!(frontier.pop().map(|b| b.priorities), Some(vec![2]));
        assert!(frontier.pop().is_none());
        assert_eq!(frontier.slots.len(), 2);
    }

    #[test]
    fn deterministic_takes_first_matching_arc_only() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        b.deterministic(true);
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_state();
        b.accept(s1, AcceptInfo::new("first", 0));
        b.accept(s2, AcceptInfo::new("second", 0));
        b.add_arc(Arc::new(s0, s1, Input::constraint(fs("type=segment"))));
        b.add_arc(Arc::new(s0, s2, Input::constraint(fs("type=segment"))));
        let fst = b.build().unwrap();
        let data = segments(1);
        let det = run::<Deterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(det.len(), 1);
        assert_eq!(det[0].accept_id(), Some("first"));
        let nondet = run::<Nondeterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(nondet.len(), 2);
    }

    #[test]
    fn acceptable_predicate_filters_results() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let info = AcceptInfo::new("short", 0);
        b.accept(s1, info.with_acceptable(|_, r| r.end_index() > 1));
        b.add_arc(Arc::new(s0, s1, Input::constraint(fs("type=segment"))));
        b.add_arc(Arc::new(s1, s1, Input::constraint(fs("type=segment"))));
        let fst = b.build().unwrap();
        let data = segments(3);
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::new());
        let ends: Vec<usize> = results.iter().map(|r| r.end_index()).collect();
        assert_eq!(ends, vec![2, 3]);
    }

    #[test]
    fn variables_bind_across_arcs() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        let s0 = b.add_state();
        let s1 = b.add_state();
        let s2 = b.add_accepting_state();
        b.add_arc(Arc::new(s0, s1, Input::constraint(fs("voice=$v"))));
        b.add_arc(Arc::new(s1, s2, Input::constraint(fs("voice=$v"))));
        let fst = b.build().unwrap();

        let mut same = AnnotationList::new();
        same.add(Range::unit(0), fs("voice=+"));
        same.add(Range::unit(1), fs("voice=+"));
        let results = run::<Nondeterministic>(&fst, &same, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
        assert!(results[0].bindings().contains("v"));

        let mut differ = AnnotationList::new();
        differ.add(Range::unit(0), fs("voice=+"));
        differ.add(Range::unit(1), fs("voice=-"));
        let results = run::<Nondeterministic>(&fst, &differ, TraversalConfig::anchored());
        assert!(results.is_empty());
    }

    #[test]
    fn filter_hides_annotations() {
        let mut b: FstBuilder<AnnotationList> = FstBuilder::new();
        b.filter(|a| a.fs().get("type") == Some(&FeatureValue::symbol("segment")));
        let s0 = b.add_state();
        let s1 = b.add_accepting_state();
        b.add_arc(Arc::new(s0, s1, Input::constraint(fs("type=segment"))));
        b.add_arc(Arc::new(s1, s1, Input::constraint(fs("type=segment"))));
        let fst = b.build().unwrap();
        let mut data = AnnotationList::new();
        data.add(Range::unit(0), fs("type=segment"));
        data.add(Range::unit(1), fs("type=boundary"));
        data.add(Range::unit(2), fs("type=segment"));
        let results = run::<Nondeterministic>(&fst, &data, TraversalConfig::anchored());
        assert_eq!(results.len(), 1);
    }

    #[test]
    #[should_panic(expected = "empty annotation sequence")]
    fn empty_sequence_panics() {
        let fst = self_loop(Direction::LeftToRight);
        let data = AnnotationList::new();
        run::<Deterministic>(&fst, &data, TraversalConfig::new());
    }

    #[test]
    #[should_panic(expected = "tag count")]
    fn mismatched_register_bank_panics() {
        let fst = self_loop(Direction::LeftToRight);
        let data = segments(1);
        let mut method: NondeterministicFsaTraversal<'_, _> = TraversalMethod::new(
            &fst,
            &data,
            &VariableBindings::new(),
            TraversalConfig::new(),
        );
        let mut index = 0;
        method.traverse(&mut index, &Registers::new(5), &[], &mut HashSet::new());
    }
}
