//! Shared data types for the machina automaton engine.
//!
//! This crate holds the collaborators the traversal engine in `machina-fst`
//! consumes but does not own: ordered annotation sequences, offsets and
//! ranges, feature structures with unification, and variable bindings.
//!
//! # Architecture
//!
//! - [`direction`] -- Traversal direction over an offset space
//! - [`range`] -- Half-open offset ranges and their canonical order
//! - [`feature`] -- Feature values, feature structures and matching
//! - [`bindings`] -- Variable bindings threaded through unification
//! - [`annotation`] -- Arena-backed, nestable annotation lists

pub mod annotation;
pub mod bindings;
pub mod direction;
pub mod feature;
pub mod range;

pub use annotation::{AnnotatedData, Annotation, AnnotationId, AnnotationList};
pub use bindings::VariableBindings;
pub use direction::Direction;
pub use feature::{FeatureStruct, FeatureValue};
pub use range::{Offset, Range};

/// Error type for malformed feature notation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("expected `feature=value`, got {0:?}")]
    MissingEquals(String),
    #[error("empty feature name in {0:?}")]
    EmptyFeature(String),
    #[error("empty value for feature {0:?}")]
    EmptyValue(String),
    #[error("duplicate feature {0:?}")]
    DuplicateFeature(String),
}
