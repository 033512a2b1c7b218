//! # Constraint Types
//!
//! The clausal constraint type [`Clause`] and the input-side pseudo-Boolean
//! atom type [`PbAtom`] handed to the theory plugin for internalisation.

use std::{fmt, ops};

use itertools::Itertools;

use super::{Assignment, Lit, TernaryVal};

/// Type representing a clause.
/// Wrapper around a std collection to allow for changing the data structure.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Default, Hash)]
pub struct Clause {
    lits: Vec<Lit>,
}

impl Clause {
    /// Creates a new empty clause
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty clause with at least the specified capacity.
    ///
    /// Uses [`Vec::with_capacity`] internally.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lits: Vec::with_capacity(capacity),
        }
    }

    /// Gets the length of the clause
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    /// Checks if the clause is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    /// Adds a literal to the clause
    pub fn add(&mut self, lit: Lit) {
        self.lits.push(lit);
    }

    /// Gets an iterator over the clause
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Lit> {
        self.lits.iter()
    }

    /// Normalizes the clause. This includes sorting the literals, removing
    /// duplicates and removing the entire clause if it is a tautology.
    /// Comparing two normalized clauses checks their logical equivalence.
    #[must_use]
    pub fn normalize(mut self) -> Option<Self> {
        if self.len() <= 1 {
            return Some(self);
        }
        // Sort and filter duplicates
        self.lits.sort_unstable();
        self.lits.dedup();
        // Check for tautology
        let mut neg_last = None;
        for l in &self.lits {
            if let Some(neg_last) = neg_last {
                if l == &neg_last {
                    // Positive lits always come first
                    return None;
                }
            }
            neg_last = Some(!*l);
        }
        Some(self)
    }

    /// Evaluates a clause under a given assignment
    #[must_use]
    pub fn evaluate(&self, assignment: &Assignment) -> TernaryVal {
        self.iter()
            .fold(TernaryVal::False, |val, l| match assignment.lit_value(*l) {
                TernaryVal::True => TernaryVal::True,
                TernaryVal::DontCare => {
                    if val == TernaryVal::False {
                        TernaryVal::DontCare
                    } else {
                        val
                    }
                }
                TernaryVal::False => val,
            })
    }

    /// Checks whether the clause is satisfied by an assignment
    #[must_use]
    pub fn is_sat(&self, assignment: &Assignment) -> bool {
        self.evaluate(assignment) == TernaryVal::True
    }
}

impl ops::Index<usize> for Clause {
    type Output = Lit;

    fn index(&self, index: usize) -> &Self::Output {
        &self.lits[index]
    }
}

impl AsRef<[Lit]> for Clause {
    fn as_ref(&self) -> &[Lit] {
        &self.lits
    }
}

impl<const N: usize> From<[Lit; N]> for Clause {
    fn from(value: [Lit; N]) -> Self {
        Self {
            lits: Vec::from(value),
        }
    }
}

impl From<&[Lit]> for Clause {
    fn from(value: &[Lit]) -> Self {
        Self {
            lits: Vec::from(value),
        }
    }
}

impl Extend<Lit> for Clause {
    fn extend<T: IntoIterator<Item = Lit>>(&mut self, iter: T) {
        self.lits.extend(iter);
    }
}

impl IntoIterator for Clause {
    type Item = Lit;

    type IntoIter = std::vec::IntoIter<Lit>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.lits.into_iter()
    }
}

impl FromIterator<Lit> for Clause {
    fn from_iter<T: IntoIterator<Item = Lit>>(iter: T) -> Self {
        Self {
            lits: Vec::from_iter(iter),
        }
    }
}

impl<'a> IntoIterator for &'a Clause {
    type Item = &'a Lit;

    type IntoIter = std::slice::Iter<'a, Lit>;

    fn into_iter(self) -> Self::IntoIter {
        self.lits.iter()
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.iter().format("|"))
    }
}

impl fmt::Debug for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.iter().format("|"))
    }
}

/// Creates a clause from a list of literals
#[macro_export]
macro_rules! clause {
    () => {
        $crate::types::Clause::new()
    };
    ( $($l:expr),* ) => {
        {
            let mut tmp_clause = $crate::types::Clause::new();
            $(
                tmp_clause.add($l);
            )*
            tmp_clause
        }
    };
}

/// Identifier of an opaque non-Boolean subterm owned by the host's expression
/// manager. Arguments of this form are abstracted by fresh proxy literals
/// during internalisation.
#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug)]
#[repr(transparent)]
pub struct TermId(pub u32);

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// An argument of a pseudo-Boolean atom
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum AtomArg {
    /// An already Boolean-reified argument
    Lit(Lit),
    /// A non-Boolean subterm that needs a proxy literal
    Term(TermId),
    /// A constant argument, folded away during internalisation
    Const(bool),
}

impl From<Lit> for AtomArg {
    fn from(value: Lit) -> Self {
        AtomArg::Lit(value)
    }
}

impl From<TermId> for AtomArg {
    fn from(value: TermId) -> Self {
        AtomArg::Term(value)
    }
}

impl From<bool> for AtomArg {
    fn from(value: bool) -> Self {
        AtomArg::Const(value)
    }
}

/// The comparison operator of a pseudo-Boolean atom
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum AtomBound {
    /// The weighted sum is upper-bounded (`<= k`)
    Ub,
    /// The weighted sum is lower-bounded (`>= k`)
    Lb,
    /// The weighted sum equals `k`
    Eq,
}

/// Type representing a pseudo-Boolean atom `sum c_i * a_i <op> k` as handed to
/// the theory plugin for internalisation.
///
/// Coefficients may be negative; internalisation lifts them out by negating
/// the corresponding (proxied) literal and shifting the bound.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct PbAtom {
    args: Vec<(AtomArg, isize)>,
    bound: AtomBound,
    k: isize,
}

impl PbAtom {
    /// Constructs a new upper bound pseudo-Boolean atom (`weighted sum of args <= k`)
    pub fn new_ub<AI: IntoIterator<Item = (impl Into<AtomArg>, isize)>>(args: AI, k: isize) -> Self {
        PbAtom {
            args: args.into_iter().map(|(a, w)| (a.into(), w)).collect(),
            bound: AtomBound::Ub,
            k,
        }
    }

    /// Constructs a new lower bound pseudo-Boolean atom (`weighted sum of args >= k`)
    pub fn new_lb<AI: IntoIterator<Item = (impl Into<AtomArg>, isize)>>(args: AI, k: isize) -> Self {
        PbAtom {
            args: args.into_iter().map(|(a, w)| (a.into(), w)).collect(),
            bound: AtomBound::Lb,
            k,
        }
    }

    /// Alias for [`PbAtom::new_lb`]
    pub fn new_ge<AI: IntoIterator<Item = (impl Into<AtomArg>, isize)>>(args: AI, k: isize) -> Self {
        Self::new_lb(args, k)
    }

    /// Alias for [`PbAtom::new_ub`]
    pub fn new_le<AI: IntoIterator<Item = (impl Into<AtomArg>, isize)>>(args: AI, k: isize) -> Self {
        Self::new_ub(args, k)
    }

    /// Constructs a new equality pseudo-Boolean atom (`weighted sum of args = k`)
    pub fn new_eq<AI: IntoIterator<Item = (impl Into<AtomArg>, isize)>>(args: AI, k: isize) -> Self {
        PbAtom {
            args: args.into_iter().map(|(a, w)| (a.into(), w)).collect(),
            bound: AtomBound::Eq,
            k,
        }
    }

    /// Gets the number of arguments of the atom
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Checks whether the atom has no arguments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Gets the bound operator of the atom
    #[must_use]
    pub fn bound(&self) -> AtomBound {
        self.bound
    }

    /// Gets the threshold of the atom
    #[must_use]
    pub fn k(&self) -> isize {
        self.k
    }

    /// Gets an iterator over the weighted arguments
    pub fn iter(&self) -> std::slice::Iter<'_, (AtomArg, isize)> {
        self.args.iter()
    }
}

impl<'a> IntoIterator for &'a PbAtom {
    type Item = &'a (AtomArg, isize);

    type IntoIter = std::slice::Iter<'a, (AtomArg, isize)>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

impl fmt::Display for PbAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (a, w)) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            match a {
                AtomArg::Lit(l) => write!(f, "{w} {l}")?,
                AtomArg::Term(t) => write!(f, "{w} {t}")?,
                AtomArg::Const(c) => write!(f, "{w} {}", u8::from(*c))?,
            }
        }
        match self.bound {
            AtomBound::Ub => write!(f, " <= {}", self.k),
            AtomBound::Lb => write!(f, " >= {}", self.k),
            AtomBound::Eq => write!(f, " = {}", self.k),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Clause, PbAtom};
    use crate::{clause, lit, types::TernaryVal};

    #[test]
    fn clause_normalize() {
        let taut = clause![lit![0], lit![1], !lit![0]];
        assert_eq!(taut.normalize(), None);
        let cl = clause![lit![1], lit![0], lit![1]];
        assert_eq!(cl.normalize(), Some(clause![lit![0], lit![1]]));
    }

    #[test]
    fn clause_evaluate() {
        let cl = clause![lit![0], lit![1]];
        let assign = vec![!lit![0], !lit![1]].into_iter().collect();
        assert_eq!(cl.evaluate(&assign), TernaryVal::False);
        let assign = vec![!lit![0]].into_iter().collect();
        assert_eq!(cl.evaluate(&assign), TernaryVal::DontCare);
        let assign = vec![!lit![0], lit![1]].into_iter().collect();
        assert!(cl.is_sat(&assign));
    }

    #[test]
    fn atom_construction() {
        let atom = PbAtom::new_ge([(lit![0], 2), (lit![1], 1)], 2);
        assert_eq!(atom.len(), 2);
        assert_eq!(atom.k(), 2);
        assert_eq!(format!("{atom}"), "2 x0 + 1 x1 >= 2");
    }

    #[test]
    fn empty_clause_is_falsified() {
        let cl = Clause::new();
        let assign = std::iter::empty().collect();
        assert_eq!(cl.evaluate(&assign), TernaryVal::False);
    }
}
