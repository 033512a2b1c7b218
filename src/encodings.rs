//! # Clausal Encodings
//!
//! CNF encodings used by the theory plugin, most importantly the sorting
//! network that cardinality constraints are compiled into.

use crate::{types::Clause, OutOfMemory};

pub mod atomics;
pub mod sortnet;

/// Trait for types that clauses can be collected into
pub trait CollectClauses {
    /// Gets the number of clauses in the collection
    fn n_clauses(&self) -> usize;

    /// Extends the clause collector with an iterator of clauses
    ///
    /// # Errors
    ///
    /// If the collector runs out of memory, returns an [`OutOfMemory`] error.
    fn extend_clauses<T>(&mut self, cl_iter: T) -> Result<(), OutOfMemory>
    where
        T: IntoIterator<Item = Clause>;

    /// Adds one clause to the collector
    ///
    /// # Errors
    ///
    /// If the collector runs out of memory, returns an [`OutOfMemory`] error.
    fn add_clause(&mut self, cl: Clause) -> Result<(), OutOfMemory> {
        self.extend_clauses([cl])
    }
}

/// Trait for encodings that track statistics.
pub trait EncodeStats {
    /// Gets the number of clauses in the encoding
    fn n_clauses(&self) -> usize;

    /// Gets the number of variables in the encoding
    fn n_vars(&self) -> u32;
}
