// Traversal branches, output tracking and the per-call instance pool.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use machina_core::{AnnotatedData, AnnotationId, Direction, VariableBindings};

use crate::arc::ArcId;
use crate::output::{FstOperations, OutputAction};
use crate::register::Registers;
use crate::state::StateId;

/// What a branch carries besides its position and captures: nothing for
/// acceptors, the rewritten data for transducers.
///
/// Cloning must copy every part together; a branch never shares mutable
/// output state with a sibling.
pub trait OutputTrack<D>: Clone {
    /// The track every branch of a traversal over `data` starts from.
    fn start(data: &D) -> Self;

    /// Queue `count` copies of `input` for later output actions.
    fn enqueue(&mut self, input: AnnotationId, count: usize);

    /// Run the output actions of arc `arc`. `current` is used when the
    /// queue is empty.
    fn execute(
        &mut self,
        arc: ArcId,
        outputs: &[OutputAction],
        current: Option<AnnotationId>,
        ops: Option<&dyn FstOperations<D>>,
    );

    fn output(&self) -> Option<&D>;

    /// Output-bearing arcs taken so far, in order. Part of a branch's
    /// identity during nondeterministic search.
    fn trail(&self) -> &[ArcId];
}

/// Output track of an acceptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recognition;

impl<D> OutputTrack<D> for Recognition {
    fn start(_data: &D) -> Self {
        Recognition
    }

    fn enqueue(&mut self, _input: AnnotationId, _count: usize) {}

    fn execute(
        &mut self,
        _arc: ArcId,
        _outputs: &[OutputAction],
        _current: Option<AnnotationId>,
        _ops: Option<&dyn FstOperations<D>>,
    ) {
    }

    fn output(&self) -> Option<&D> {
        None
    }

    fn trail(&self) -> &[ArcId] {
        &[]
    }
}

/// Output track of a transducer: the branch's own copy of the data, the
/// map from input annotations to their counterparts in that copy, and the
/// input annotations waiting for an output action.
#[derive(Debug)]
pub struct Transduction<D> {
    output: D,
    mapping: HashMap<AnnotationId, AnnotationId>,
    queue: VecDeque<AnnotationId>,
    trail: Vec<ArcId>,
}

impl<D> Transduction<D> {
    /// Output annotation `input` currently maps to.
    pub fn mapped(&self, input: AnnotationId) -> Option<AnnotationId> {
        self.mapping.get(&input).copied()
    }

    pub fn queue(&self) -> impl Iterator<Item = AnnotationId> + '_ {
        self.queue.iter().copied()
    }
}

impl<D: Clone> Clone for Transduction<D> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
            mapping: self.mapping.clone(),
            queue: self.queue.clone(),
            trail: self.trail.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.output.clone_from(&source.output);
        self.mapping.clone_from(&source.mapping);
        self.queue.clone_from(&source.queue);
        self.trail.clone_from(&source.trail);
    }
}

impl<D: AnnotatedData> OutputTrack<D> for Transduction<D> {
    fn start(data: &D) -> Self {
        let mapping = data
            .annotations()
            .depth_first(Direction::LeftToRight)
            .into_iter()
            .map(|id| (id, id))
            .collect();
        Self {
            output: data.clone(),
            mapping,
            queue: VecDeque::new(),
            trail: Vec::new(),
        }
    }

    fn enqueue(&mut self, input: AnnotationId, count: usize) {
        for _ in 0..count {
            self.queue.push_back(input);
        }
    }

    fn execute(
        &mut self,
        arc: ArcId,
        outputs: &[OutputAction],
        current: Option<AnnotationId>,
        ops: Option<&dyn FstOperations<D>>,
    ) {
        let Some(ops) = ops else { return };
        if outputs.is_empty() {
            return;
        }
        let mut prev_new: Option<AnnotationId> = None;
        for action in outputs {
            let target = match prev_new {
                Some(new) if action.uses_prev_new_annotation() => new,
                _ => {
                    let Some(input) = self.queue.pop_front().or(current) else {
                        log::debug!("no input annotation left for arc {} output", arc.index());
                        continue;
                    };
                    match self.mapping.get(&input) {
                        Some(&target) => target,
                        None => {
                            log::trace!("input {input} has no output counterpart");
                            prev_new = None;
                            continue;
                        }
                    }
                }
            };
            prev_new = action.apply(&mut self.output, target, ops);
            if !action.is_insert() {
                let live = self.output.annotations();
                self.mapping.retain(|_, out| live.contains(*out));
            }
        }
        self.trail.push(arc);
    }

    fn output(&self) -> Option<&D> {
        Some(&self.output)
    }

    fn trail(&self) -> &[ArcId] {
        &self.trail
    }
}

/// One live thread of execution.
///
/// Everything a branch may mutate is owned here and copied as one unit by
/// [`Clone`], so sibling branches can never observe each other's registers,
/// bindings or output.
#[derive(Debug)]
pub struct Branch<T> {
    pub(crate) state: StateId,
    pub(crate) index: usize,
    pub(crate) registers: Registers,
    pub(crate) bindings: VariableBindings,
    pub(crate) visited: HashSet<StateId>,
    pub(crate) priorities: Vec<i32>,
    pub(crate) track: T,
}

impl<T> Branch<T> {
    pub(crate) fn new(
        state: StateId,
        registers: Registers,
        bindings: VariableBindings,
        track: T,
    ) -> Self {
        Self {
            state,
            index: 0,
            registers,
            bindings,
            visited: HashSet::new(),
            priorities: Vec::new(),
            track,
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn bindings(&self) -> &VariableBindings {
        &self.bindings
    }

    pub fn priorities(&self) -> &[i32] {
        &self.priorities
    }

    pub fn track(&self) -> &T {
        &self.track
    }
}

impl<T: Clone> Clone for Branch<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            index: self.index,
            registers: self.registers.clone(),
            bindings: self.bindings.clone(),
            visited: self.visited.clone(),
            priorities: self.priorities.clone(),
            track: self.track.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.state = source.state;
        self.index = source.index;
        self.registers.clone_from(&source.registers);
        self.bindings.clone_from(&source.bindings);
        self.visited.clone_from(&source.visited);
        self.priorities.clone_from(&source.priorities);
        self.track.clone_from(&source.track);
    }
}

/// Free list of released branches, reused by copying into their existing
/// allocations.
#[derive(Debug)]
pub struct InstancePool<T> {
    free: Vec<Branch<T>>,
    created: usize,
    reused: usize,
}

impl<T> Default for InstancePool<T> {
    fn default() -> Self {
        Self {
            free: Vec::new(),
            created: 0,
            reused: 0,
        }
    }
}

impl<T: Clone> InstancePool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A branch equal to `source`.
    pub fn copy(&mut self, source: &Branch<T>) -> Branch<T> {
        match self.free.pop() {
            Some(mut branch) => {
                branch.clone_from(source);
                self.reused += 1;
                branch
            }
            None => {
                self.created += 1;
                source.clone()
            }
        }
    }

    pub fn release(&mut self, branch: Branch<T>) {
        self.free.push(branch);
    }

    /// Drop every pooled branch and reset the counters.
    pub fn reset(&mut self) {
        self.free.clear();
        self.created = 0;
        self.reused = 0;
    }

    /// (branches allocated, branches reused) since the last reset.
    pub fn stats(&self) -> (usize, usize) {
        (self.created, self.reused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SpliceOperations;
    use machina_core::{AnnotationList, FeatureStruct, Range};

    fn fs(s: &str) -> FeatureStruct {
        s.parse().unwrap()
    }

    fn word() -> (AnnotationList, Vec<AnnotationId>) {
        let mut list = AnnotationList::new();
        let ids = (0..3)
            .map(|i| list.add(Range::unit(i), fs(&format!("pos={i}"))))
            .collect();
        (list, ids)
    }

    #[test]
    fn transduction_starts_with_identity_mapping() {
        let (list, ids) = word();
        let t = Transduction::start(&list);
        for id in ids {
            assert_eq!(t.mapped(id), Some(id));
        }
        assert_eq!(t.output(), Some(&list));
    }

    #[test]
    fn outputs_dequeue_in_order() {
        let (list, ids) = word();
        let mut t = Transduction::start(&list);
        t.enqueue(ids[0], 1);
        t.enqueue(ids[2], 1);
        let ops: &dyn FstOperations<AnnotationList> = &SpliceOperations;
        t.execute(
            ArcId(0),
            &[
                OutputAction::replace(fs("x=a")),
                OutputAction::replace(fs("x=b")),
            ],
            None,
            Some(ops),
        );
        let out = OutputTrack::<AnnotationList>::output(&t).unwrap();
        assert_eq!(out[ids[0]].fs(), &fs("pos=0 x=a"));
        assert_eq!(out[ids[2]].fs(), &fs("pos=2 x=b"));
        assert_eq!(t.queue().count(), 0);
        assert_eq!(OutputTrack::<AnnotationList>::trail(&t), &[ArcId(0)]);
    }

    #[test]
    fn empty_queue_falls_back_to_current() {
        let (list, ids) = word();
        let mut t = Transduction::start(&list);
        let ops: &dyn FstOperations<AnnotationList> = &SpliceOperations;
        let remove = [OutputAction::remove()];
        t.execute(ArcId(1), &remove, Some(ids[1]), Some(ops));
        assert_eq!(t.mapped(ids[1]), None);
        assert_eq!(t.mapped(ids[2]), Some(ids[2]));
        let out = OutputTrack::<AnnotationList>::output(&t).unwrap();
        assert!(!out.contains(ids[1]));
    }

    #[test]
    fn branch_clone_is_deep() {
        let (list, ids) = word();
        let mut a = Branch::new(
            StateId(0),
            Registers::new(1),
            VariableBindings::new(),
            Transduction::start(&list),
        );
        let mut b = a.clone();
        let ops: &dyn FstOperations<AnnotationList> = &SpliceOperations;
        let remove = [OutputAction::remove()];
        b.track.execute(ArcId(0), &remove, Some(ids[0]), Some(ops));
        b.priorities.push(1);
        assert_eq!(a.track.mapped(ids[0]), Some(ids[0]));
        assert!(a.priorities.is_empty());
        a.clone_from(&b);
        assert_eq!(a.track.mapped(ids[0]), None);
        assert_eq!(a.priorities, vec![1]);
    }

    #[test]
    fn pool_reuses_released_branches() {
        let mut pool = InstancePool::new();
        let template = Branch::new(
            StateId(0),
            Registers::new(2),
            VariableBindings::new(),
            Recognition,
        );
        let a = pool.copy(&template);
        pool.release(a);
        let b = pool.copy(&template);
        assert_eq!(b.state(), StateId(0));
        assert_eq!(pool.stats(), (1, 1));
        pool.reset();
        assert_eq!(pool.stats(), (0, 0));
    }
}
