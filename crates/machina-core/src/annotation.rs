// Arena-backed annotation lists with parent/child nesting.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::feature::FeatureStruct;
use crate::range::{Offset, Range};

/// Stable handle to an annotation inside one [`AnnotationList`].
///
/// Handles survive cloning the list, so a clone's annotations are addressed
/// by the same ids as the original's. Handles are never reused after a
/// removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(usize);

impl AnnotationId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One symbol or segment of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    range: Range,
    fs: FeatureStruct,
    optional: bool,
    parent: Option<AnnotationId>,
    children: Vec<AnnotationId>,
}

impl Annotation {
    pub fn range(&self) -> Range {
        self.range
    }

    pub fn fs(&self) -> &FeatureStruct {
        &self.fs
    }

    /// Whether this annotation is one branch of an ambiguous segmentation
    /// and may be skipped.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn parent(&self) -> Option<AnnotationId> {
        self.parent
    }

    /// Children in left-to-right order.
    pub fn children(&self) -> &[AnnotationId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An ordered forest of annotations stored in an arena.
///
/// Siblings are kept sorted by [`Range`] order; annotations with equal
/// ranges keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationList {
    slots: Vec<Option<Annotation>>,
    roots: Vec<AnnotationId>,
}

impl AnnotationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level annotation.
    pub fn add(&mut self, range: Range, fs: FeatureStruct) -> AnnotationId {
        self.insert_node(None, range, fs, false)
    }

    /// Add a top-level annotation that may be skipped during traversal.
    pub fn add_optional(&mut self, range: Range, fs: FeatureStruct) -> AnnotationId {
        self.insert_node(None, range, fs, true)
    }

    /// Add an annotation nested under `parent`.
    ///
    /// Panics if `parent` is not live or does not contain `range`.
    pub fn add_child(
        &mut self,
        parent: AnnotationId,
        range: Range,
        fs: FeatureStruct,
    ) -> AnnotationId {
        let outer = self[parent].range;
        assert!(
            outer.contains(&range),
            "child range {range} is not inside parent range {outer}"
        );
        self.insert_node(Some(parent), range, fs, false)
    }

    fn insert_node(
        &mut self,
        parent: Option<AnnotationId>,
        range: Range,
        fs: FeatureStruct,
        optional: bool,
    ) -> AnnotationId {
        let pos = self
            .siblings(parent)
            .partition_point(|&s| self.slots[s.0].as_ref().is_some_and(|a| a.range <= range));
        let id = AnnotationId(self.slots.len());
        self.slots.push(Some(Annotation {
            range,
            fs,
            optional,
            parent,
            children: Vec::new(),
        }));
        self.siblings_mut(parent).insert(pos, id);
        id
    }

    fn siblings(&self, parent: Option<AnnotationId>) -> &[AnnotationId] {
        match parent {
            Some(p) => &self[p].children,
            None => &self.roots,
        }
    }

    fn siblings_mut(&mut self, parent: Option<AnnotationId>) -> &mut Vec<AnnotationId> {
        match parent {
            Some(p) => match self.slots.get_mut(p.0).and_then(Option::as_mut) {
                Some(ann) => &mut ann.children,
                None => panic!("annotation {p} is not in this list"),
            },
            None => &mut self.roots,
        }
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.get(id).is_some()
    }

    /// Mutable access to an annotation's feature structure. Ranges and
    /// nesting are only changed through the list so sibling order holds.
    pub fn fs_mut(&mut self, id: AnnotationId) -> Option<&mut FeatureStruct> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|a| &mut a.fs)
    }

    pub fn set_optional(&mut self, id: AnnotationId, optional: bool) {
        if let Some(ann) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            ann.optional = optional;
        }
    }

    /// Remove an annotation together with all of its descendants.
    ///
    /// Returns the removed annotation, or `None` if it was not live.
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let ann = self.slots.get_mut(id.0)?.take()?;
        match ann.parent {
            Some(p) => {
                if let Some(parent) = self.slots.get_mut(p.0).and_then(Option::as_mut) {
                    parent.children.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }
        let mut stack = ann.children.clone();
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.slots.get_mut(child.0).and_then(Option::take) {
                stack.extend(removed.children);
            }
        }
        Some(ann)
    }

    /// Number of ancestors of `id` (0 for a top-level annotation).
    pub fn depth(&self, id: AnnotationId) -> usize {
        let mut depth = 0;
        let mut cur = self.get(id).and_then(|a| a.parent);
        while let Some(p) = cur {
            depth += 1;
            cur = self.get(p).and_then(|a| a.parent);
        }
        depth
    }

    /// Number of live annotations, nested ones included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Top-level annotations in `dir` order.
    pub fn roots(&self, dir: Direction) -> Vec<AnnotationId> {
        let mut roots = self.roots.clone();
        if !dir.is_left_to_right() {
            roots.reverse();
        }
        roots
    }

    /// Every live annotation, each parent before its children, siblings
    /// visited in `dir` order.
    pub fn depth_first(&self, dir: Direction) -> Vec<AnnotationId> {
        let mut out = Vec::with_capacity(self.slots.len());
        let mut stack: Vec<AnnotationId> = self.roots.clone();
        if dir.is_left_to_right() {
            stack.reverse();
        }
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = &self[id].children;
            if dir.is_left_to_right() {
                stack.extend(children.iter().rev());
            } else {
                stack.extend(children.iter());
            }
        }
        out
    }

    /// Insert a new annotation of length one directly after `anchor`.
    ///
    /// Every offset at or past the anchor's end moves one step to the
    /// right, ancestors of the anchor grow to keep containing the new
    /// annotation, and the new annotation becomes the anchor's sibling.
    pub fn insert_after(&mut self, anchor: AnnotationId, fs: FeatureStruct) -> AnnotationId {
        let (pivot, parent) = {
            let ann = &self[anchor];
            (ann.range.end, ann.parent)
        };
        let mut ancestors = Vec::new();
        let mut cur = parent;
        while let Some(p) = cur {
            ancestors.push(p);
            cur = self.get(p).and_then(|a| a.parent);
        }
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(ann) = slot else { continue };
            let shift_start = ann.range.start >= pivot;
            let shift_end = ann.range.end > pivot
                || (ann.range.end == pivot
                    && (shift_start || ancestors.contains(&AnnotationId(i))));
            ann.range = Range::new(
                ann.range.start + usize::from(shift_start),
                ann.range.end + usize::from(shift_end),
            );
        }
        self.insert_node(parent, Range::unit(pivot), fs, false)
    }

    /// Remove the offsets of `range` from the list.
    ///
    /// Non-empty annotations lying inside `range` are removed, offsets past
    /// it move left by its length, and annotations straddling it shrink.
    pub fn excise(&mut self, range: Range) {
        if range.is_empty() {
            return;
        }
        let inside: Vec<AnnotationId> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref()
                    .filter(|a| !a.range.is_empty() && range.contains(&a.range))
                    .map(|_| AnnotationId(i))
            })
            .collect();
        for id in inside {
            self.remove(id);
        }
        let shift = |o: Offset| -> Offset {
            if o >= range.end {
                o - range.len()
            } else if o > range.start {
                range.start
            } else {
                o
            }
        };
        for ann in self.slots.iter_mut().flatten() {
            ann.range = Range::new(shift(ann.range.start), shift(ann.range.end));
        }
    }

    /// The first live annotation (depth-first, left to right) with exactly
    /// this range.
    pub fn find(&self, range: Range) -> Option<AnnotationId> {
        self.depth_first(Direction::LeftToRight)
            .into_iter()
            .find(|&id| self[id].range == range)
    }
}

impl Index<AnnotationId> for AnnotationList {
    type Output = Annotation;

    /// Panics if `id` is not live in this list.
    fn index(&self, id: AnnotationId) -> &Annotation {
        match self.get(id) {
            Some(ann) => ann,
            None => panic!("annotation {id} is not in this list"),
        }
    }
}

/// Data that carries an annotation list, as seen by the traversal engine.
///
/// Transducers clone the data once per branch and rewrite the clone, so
/// cloning must keep annotation ids stable.
pub trait AnnotatedData: Clone {
    fn annotations(&self) -> &AnnotationList;
    fn annotations_mut(&mut self) -> &mut AnnotationList;
}

impl AnnotatedData for AnnotationList {
    fn annotations(&self) -> &AnnotationList {
        self
    }

    fn annotations_mut(&mut self) -> &mut AnnotationList {
        self
    }
}
