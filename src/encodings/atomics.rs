//! # "Atomic"/"Trivial" Encodings

use std::ops::Not;

use crate::{
    clause,
    types::{Clause, Lit},
};

/// Implication of form `a -> b`
#[must_use]
pub fn lit_impl_lit(a: Lit, b: Lit) -> Clause {
    clause![!a, b]
}

/// Implication of form `a -> (b1 | b2 | ... | bm)`
#[must_use]
pub fn lit_impl_clause(a: Lit, b: &[Lit]) -> Clause {
    let mut cl = Clause::from(b);
    cl.add(!a);
    cl
}

/// Implication of form `(a1 & a2 & ... & an) -> b`
#[must_use]
pub fn cube_impl_lit(a: &[Lit], b: Lit) -> Clause {
    let mut cl: Clause = a.iter().copied().map(Not::not).collect();
    cl.add(b);
    cl
}

/// Implication of form `a -> (b1 & b2 & ... & bm)`
pub fn lit_impl_cube(a: Lit, b: &[Lit]) -> impl Iterator<Item = Clause> + '_ {
    b.iter().map(move |bi| clause![!a, *bi])
}

/// Implication of form `(a1 | a2 | ... | an) -> b`
pub fn clause_impl_lit(a: &[Lit], b: Lit) -> impl Iterator<Item = Clause> + '_ {
    a.iter().map(move |ai| clause![!*ai, b])
}

#[cfg(test)]
mod tests {
    use crate::{clause, lit};

    #[test]
    fn implications() {
        assert_eq!(super::lit_impl_lit(lit![0], lit![1]), clause![!lit![0], lit![1]]);
        assert_eq!(
            super::cube_impl_lit(&[lit![0], lit![1]], lit![2]),
            clause![!lit![0], !lit![1], lit![2]]
        );
        let cls: Vec<_> = super::clause_impl_lit(&[lit![0], lit![1]], lit![2]).collect();
        assert_eq!(cls, vec![clause![!lit![0], lit![2]], clause![!lit![1], lit![2]]]);
    }
}
