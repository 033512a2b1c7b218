//! # pbsat - A Pseudo-Boolean Theory Plugin Core
//!
//! `pbsat` implements the core of a pseudo-Boolean theory plugin for CDCL(T)-style
//! SAT/SMT solvers. The plugin decides conjunctions of linear integer constraints
//! over Boolean literals of the form `sum c_i * l_i >= k` (with positive integer
//! coefficients), including the cardinality specialisation where every `c_i = 1`.
//!
//! The crate provides four cooperating pieces that share one inequality
//! representation and its normalisation rules:
//!
//! - [`theory::TheoryPb`], the plugin façade: internalises PB atoms, reacts to
//!   assignments from the host solver, and manages backtracking scopes,
//! - a watched-literal propagation engine for weighted sums,
//! - a cutting-planes conflict analyser that generalises 1-UIP resolution from
//!   clauses to PB inequalities,
//! - [`encodings::sortnet::Sorter`], a parametric odd-even sorting/merging
//!   network after Abío et al. (CP 2013) that compiles frequently-propagating
//!   cardinality constraints into clauses.
//!
//! The host CDCL engine is external: the plugin talks to it through the
//! [`theory::Context`] trait, which provides the assignment oracle, the trail,
//! clause emission, justification lookup, and fresh-variable allocation.
//!
//! ## Example
//!
//! ```
//! use pbsat::{lit, types::constraints::PbAtom};
//!
//! // x0 + x1 + x2 >= 2
//! let atom = PbAtom::new_ge([(lit![0], 1), (lit![1], 1), (lit![2], 1)], 2);
//! assert_eq!(atom.len(), 3);
//! ```
//!
//! ## Features
//!
//! | Feature name | Description |
//! | --- | --- |
//! | `fxhash` | Use the faster firefox hash function from `rustc-hash` in `pbsat`. |

#![warn(clippy::pedantic)]
#![warn(missing_docs)]

use std::collections::TryReserveError;

use thiserror::Error;

pub mod encodings;
pub mod instances;
pub mod theory;
pub mod types;

pub(crate) mod utils;

/// Error returned when an operation ran out of memory
///
/// Collecting clauses from the sorting-network compiler is done through
/// `try_reserve` so that a host running close to the memory limit gets an error
/// rather than an abort.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OutOfMemory {
    /// A `try_reserve` operation in Rust ran out of memory
    #[error("try reserve error: {0}")]
    TryReserve(#[from] TryReserveError),
}
