//! Tagged finite-state traversal over annotated data.
//!
//! This crate runs an already-built automaton over an ordered, possibly
//! ambiguous annotation sequence. One traversal decides acceptance,
//! captures subsequence boundaries in registers, ranks competing
//! derivations by priority and, for transducers, rewrites a copy of the
//! input through insert, remove and replace actions.
//!
//! # Architecture
//!
//! - [`register`] -- Capture registers and tag-map commands
//! - [`arc`] -- Arcs, input requirements and arc matching
//! - [`state`] -- States and acceptance information
//! - [`output`] -- Output actions and the output-operations collaborator
//! - [`fst`] -- The immutable automaton, its builder and the transduce loop
//! - [`config`] -- Per-call traversal switches
//! - [`instance`] -- Branches, output tracking and the instance pool
//! - [`traversal`] -- The explicit-stack search driver and its four variants
//! - [`result`] -- Snapshots of successful derivations
//! - [`ranking`] -- Result orderings

pub mod arc;
pub mod config;
pub mod fst;
pub mod instance;
pub mod output;
pub mod ranking;
pub mod register;
pub mod result;
pub mod state;
pub mod traversal;

pub use arc::{Arc, ArcId, ArcPriority, Input, check_input_match};
pub use config::TraversalConfig;
pub use fst::{Fst, FstBuilder};
pub use instance::{Branch, OutputTrack, Recognition, Transduction};
pub use output::{FstOperations, OutputAction, OutputKind, SpliceOperations};
pub use ranking::{compare_longest, compare_results};
pub use register::{CommandSource, Register, Registers, TagMapCommand, execute_commands};
pub use result::FstResult;
pub use state::{AcceptInfo, State, StateId};
pub use traversal::{
    Deterministic, DeterministicFsaTraversal, DeterministicFstTraversal, Mode, Nondeterministic,
    NondeterministicFsaTraversal, NondeterministicFstTraversal, TraversalMethod,
};

/// Error type for automaton construction.
#[derive(Debug, thiserror::Error)]
pub enum FstError {
    #[error("automaton has no start state")]
    MissingStartState,
    #[error("state {state} does not exist (automaton has {count} states)")]
    UnknownState { state: usize, count: usize },
    #[error("register {register} is out of range (automaton has {count} registers)")]
    RegisterOutOfRange { register: usize, count: usize },
    #[error("arc {arc} has output actions but the automaton has no output operations")]
    MissingOperations { arc: usize },
}

/// Maximum number of main-loop iterations in one traversal call.
/// Acts as a safety limit against runaway searches.
pub const MAX_STEP_COUNT: usize = 1_000_000;
