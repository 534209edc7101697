// Transducer output actions and the operations that apply them.

use machina_core::{AnnotatedData, AnnotationId, FeatureStruct, Range};

/// What an output action does to its target annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Insert a new annotation carrying the feature structure after the
    /// target.
    Insert(FeatureStruct),
    /// Remove the target and close its range.
    Remove,
    /// Overwrite features of the target in place. An empty structure makes
    /// this a pass-through that only notifies [`FstOperations::replace`].
    Replace(FeatureStruct),
}

/// One transduction step attached to an arc.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputAction {
    kind: OutputKind,
    uses_prev_new_annotation: bool,
}

impl OutputAction {
    pub fn insert(fs: FeatureStruct) -> Self {
        Self {
            kind: OutputKind::Insert(fs),
            uses_prev_new_annotation: false,
        }
    }

    pub fn remove() -> Self {
        Self {
            kind: OutputKind::Remove,
            uses_prev_new_annotation: false,
        }
    }

    pub fn replace(fs: FeatureStruct) -> Self {
        Self {
            kind: OutputKind::Replace(fs),
            uses_prev_new_annotation: false,
        }
    }

    pub fn pass_through() -> Self {
        Self::replace(FeatureStruct::new())
    }

    /// Target the annotation created by the previous action on the same
    /// arc instead of dequeuing an input annotation.
    pub fn chained(mut self) -> Self {
        self.uses_prev_new_annotation = true;
        self
    }

    pub fn kind(&self) -> &OutputKind {
        &self.kind
    }

    pub fn uses_prev_new_annotation(&self) -> bool {
        self.uses_prev_new_annotation
    }

    pub fn is_insert(&self) -> bool {
        matches!(self.kind, OutputKind::Insert(_))
    }

    /// Apply this action to `target` in `output`.
    ///
    /// Returns the id of a newly inserted annotation, if any. A target that
    /// is no longer live in `output` is skipped.
    pub(crate) fn apply<D: AnnotatedData>(
        &self,
        output: &mut D,
        target: AnnotationId,
        ops: &dyn FstOperations<D>,
    ) -> Option<AnnotationId> {
        if !output.annotations().contains(target) {
            log::debug!("output target {target} is gone, skipping {:?}", self.kind);
            return None;
        }
        match &self.kind {
            OutputKind::Insert(fs) => Some(ops.insert(output, target, fs)),
            OutputKind::Remove => {
                let removed = output.annotations_mut().remove(target)?;
                ops.remove(output, removed.range());
                None
            }
            OutputKind::Replace(fs) => {
                if let Some(target_fs) = output.annotations_mut().fs_mut(target) {
                    target_fs.priority_union(fs);
                }
                ops.replace(output, target);
                None
            }
        }
    }
}

/// Collaborator that edits a transducer's output data.
///
/// Implementations decide how offsets move when annotations are inserted
/// or removed; the engine only keeps track of identities.
pub trait FstOperations<D>: Send + Sync {
    /// Called after `annotation` was updated in place.
    fn replace(&self, data: &mut D, annotation: AnnotationId);

    /// Insert a new annotation carrying `fs` directly after `after` and
    /// return its id.
    fn insert(&self, data: &mut D, after: AnnotationId, fs: &FeatureStruct) -> AnnotationId;

    /// Close the gap left by an annotation that covered `range` and has
    /// already been detached.
    fn remove(&self, data: &mut D, range: Range);
}

/// [`FstOperations`] over any [`AnnotatedData`]: inserts shift later
/// offsets right by one, removals excise the range.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpliceOperations;

impl<D: AnnotatedData> FstOperations<D> for SpliceOperations {
    fn replace(&self, _data: &mut D, _annotation: AnnotationId) {}

    fn insert(&self, data: &mut D, after: AnnotationId, fs: &FeatureStruct) -> AnnotationId {
        data.annotations_mut().insert_after(after, fs.clone())
    }

    fn remove(&self, data: &mut D, range: Range) {
        data.annotations_mut().excise(range);
    }
}
