// Automaton states and acceptance information.

use crate::arc::ArcId;
use crate::register::TagMapCommand;
use crate::result::FstResult;

/// Index of a state in its automaton's state arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Predicate deciding whether a candidate result is kept.
pub type Acceptable<D> = Box<dyn Fn(&D, &FstResult<D>) -> bool + Send + Sync>;

/// One way a state can accept.
pub struct AcceptInfo<D> {
    pub id: Option<String>,
    pub priority: i32,
    pub acceptable: Option<Acceptable<D>>,
}

impl<D> AcceptInfo<D> {
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: Some(id.into()),
            priority,
            acceptable: None,
        }
    }

    /// Acceptance without an id; yields results with priority -1.
    pub fn anonymous() -> Self {
        Self {
            id: None,
            priority: -1,
            acceptable: None,
        }
    }

    pub fn with_acceptable<F>(mut self, acceptable: F) -> Self
    where
        F: Fn(&D, &FstResult<D>) -> bool + Send + Sync + 'static,
    {
        self.acceptable = Some(Box::new(acceptable));
        self
    }

    /// Whether `candidate` passes this accept info's predicate.
    pub(crate) fn accepts(&self, data: &D, candidate: &FstResult<D>) -> bool {
        self.acceptable.as_ref().is_none_or(|f| f(data, candidate))
    }
}

impl<D> std::fmt::Debug for AcceptInfo<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptInfo")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("has_predicate", &self.acceptable.is_some())
            .finish()
    }
}

/// A node of the automaton graph.
pub struct State<D> {
    pub(crate) arcs: Vec<ArcId>,
    pub(crate) accept_infos: Vec<AcceptInfo<D>>,
    pub(crate) finishers: Vec<TagMapCommand>,
    pub(crate) is_lazy: bool,
}

impl<D> State<D> {
    pub(crate) fn new() -> Self {
        Self {
            arcs: Vec::new(),
            accept_infos: Vec::new(),
            finishers: Vec::new(),
            is_lazy: false,
        }
    }

    /// Outgoing arcs in the order they are tried.
    pub fn arcs(&self) -> &[ArcId] {
        &self.arcs
    }

    pub fn accept_infos(&self) -> &[AcceptInfo<D>] {
        &self.accept_infos
    }

    /// Commands run against a copy of the register bank on acceptance.
    pub fn finishers(&self) -> &[TagMapCommand] {
        &self.finishers
    }

    pub fn is_accepting(&self) -> bool {
        !self.accept_infos.is_empty()
    }

    pub fn is_lazy(&self) -> bool {
        self.is_lazy
    }
}

impl<D> std::fmt::Debug for State<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("arc_count", &self.arcs.len())
            .field("accept_infos", &self.accept_infos)
            .field("finisher_count", &self.finishers.len())
            .field("is_lazy", &self.is_lazy)
            .finish()
    }
}
