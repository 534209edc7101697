// Snapshots of successful derivations.

use machina_core::{AnnotationId, VariableBindings};

use crate::register::Registers;

/// One successful derivation, owned by the caller once returned.
#[derive(Debug, Clone)]
pub struct FstResult<D> {
    pub(crate) accept_id: Option<String>,
    pub(crate) registers: Registers,
    pub(crate) output: Option<D>,
    pub(crate) bindings: VariableBindings,
    pub(crate) priority: i32,
    pub(crate) is_lazy: bool,
    pub(crate) end_annotation: Option<AnnotationId>,
    pub(crate) end_index: usize,
    pub(crate) priority_path: Vec<i32>,
    pub(crate) sequence_no: usize,
}

impl<D> FstResult<D> {
    /// Id of the accept info that produced this result; `None` for an
    /// anonymous acceptance.
    pub fn accept_id(&self) -> Option<&str> {
        self.accept_id.as_deref()
    }

    /// Register bank after the accepting state's finishers ran.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// The rewritten data (transducers only).
    pub fn output(&self) -> Option<&D> {
        self.output.as_ref()
    }

    pub fn into_output(self) -> Option<D> {
        self.output
    }

    pub fn bindings(&self) -> &VariableBindings {
        &self.bindings
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_lazy(&self) -> bool {
        self.is_lazy
    }

    /// The annotation the derivation stopped at, or `None` at the end of
    /// the sequence.
    pub fn end_annotation(&self) -> Option<AnnotationId> {
        self.end_annotation
    }

    /// Position in the traversal's filtered annotation sequence the
    /// derivation stopped at.
    pub fn end_index(&self) -> usize {
        self.end_index
    }

    /// Priorities of every arc taken, in order.
    pub fn priority_path(&self) -> &[i32] {
        &self.priority_path
    }

    /// Order in which the result was produced within its traversal call.
    pub fn sequence_no(&self) -> usize {
        self.sequence_no
    }
}
