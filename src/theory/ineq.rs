//! # Normalised Inequalities
//!
//! The internal representation `sum c_i * l_i >= k` shared by stored
//! constraints and the conflict-analysis lemma, together with the
//! normalisation pipeline `unique` / `normalize` / `prune`.

use num_integer::Integer;

use crate::types::{Lit, Var};

/// Coefficient and threshold type of internal inequalities
pub(crate) type Coeff = isize;

/// Outcome of normalising an inequality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Normalize {
    /// The inequality holds trivially
    Sat,
    /// The inequality cannot be satisfied
    Unsat,
    /// The inequality remains open and is well-formed
    Undecided,
}

/// Compilation state of a stored inequality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Compiled {
    /// Not compiled and not scheduled
    #[default]
    No,
    /// On the compile queue for the next restart
    Pending,
    /// Replaced by its clausal encoding
    Yes,
}

/// Lifts negative coefficients (`c * l == c - c * ~l`), sorts the terms by
/// variable, merges duplicates, and applies the `x + ~x = 1` substitution for
/// opposite-sign pairs.
pub(crate) fn unique(args: &mut Vec<(Lit, Coeff)>, k: &mut Coeff) {
    for (l, c) in args.iter_mut() {
        if *c < 0 {
            *l = !*l;
            *k -= *c;
            *c = -*c;
        }
    }
    args.sort_unstable_by_key(|(l, _)| *l);
    let mut merged: Vec<(Lit, Coeff)> = Vec::with_capacity(args.len());
    for (l, c) in args.drain(..) {
        match merged.last_mut() {
            Some((l2, c2)) if *l2 == l => *c2 += c,
            Some((l2, c2)) if l2.var() == l.var() => {
                // x + ~x = 1
                let m = (*c2).min(c);
                *k -= m;
                if *c2 > m {
                    *c2 -= m;
                } else if c > m {
                    *l2 = l;
                    *c2 = c - m;
                } else {
                    merged.pop();
                }
            }
            _ => merged.push((l, c)),
        }
    }
    *args = merged;
}

/// Drops zero coefficients and saturates coefficients exceeding the threshold.
/// In a 0/1 context a contribution above `k` is indistinguishable from `k`.
pub(crate) fn prune(args: &mut Vec<(Lit, Coeff)>, k: &mut Coeff) {
    args.retain(|(_, c)| *c != 0);
    for (_, c) in args.iter_mut() {
        if *c > *k {
            *c = *k;
        }
    }
}

/// Simplifies the inequality and decides trivial outcomes. On
/// [`Normalize::Undecided`] all coefficients are positive, divided by their
/// gcd, and sum to at least the (positive) threshold.
pub(crate) fn normalize(args: &mut Vec<(Lit, Coeff)>, k: &mut Coeff) -> Normalize {
    args.retain(|(_, c)| *c != 0);
    if *k <= 0 {
        return Normalize::Sat;
    }
    debug_assert!(args.iter().all(|(_, c)| *c > 0));
    let sum: Coeff = args.iter().map(|(_, c)| *c).sum();
    if sum < *k {
        return Normalize::Unsat;
    }
    let g = args.iter().fold(0, |g, (_, c)| c.gcd(&g));
    if g > 1 {
        for (_, c) in args.iter_mut() {
            *c /= g;
        }
        // round up, the sound integer strengthening
        *k = num_integer::Integer::div_ceil(k, &g);
    }
    Normalize::Undecided
}

/// A stored inequality `sum c_i * l_i >= k` with watch metadata.
///
/// The sign convention of the reifying literal: when `lit` is true the
/// inequality must hold; when it is false the negated inequality (obtained by
/// [`Ineq::negate`]) must hold.
#[derive(Debug, Clone)]
pub(crate) struct Ineq {
    /// The reifying literal
    pub lit: Lit,
    /// The weighted terms; the watched literals form the prefix
    /// `args[..watch_sz]`
    pub args: Vec<(Lit, Coeff)>,
    /// The threshold
    pub k: Coeff,
    /// Length of the watched prefix
    pub watch_sz: usize,
    /// Sum of the watched coefficients
    pub watch_sum: Coeff,
    /// Maximum watched coefficient
    pub max_watch: Coeff,
    /// Number of times this inequality has propagated or conflicted
    pub num_propagations: usize,
    /// Propagation count that schedules compilation; `usize::MAX` disables it
    pub compilation_threshold: usize,
    /// Compilation state
    pub compiled: Compiled,
}

impl Ineq {
    pub fn new(lit: Lit, args: Vec<(Lit, Coeff)>, k: Coeff) -> Ineq {
        Ineq {
            lit,
            args,
            k,
            watch_sz: 0,
            watch_sum: 0,
            max_watch: 0,
            num_propagations: 0,
            compilation_threshold: usize::MAX,
            compiled: Compiled::No,
        }
    }

    pub fn size(&self) -> usize {
        self.args.len()
    }

    pub fn lit_at(&self, i: usize) -> Lit {
        self.args[i].0
    }

    pub fn coeff(&self, i: usize) -> Coeff {
        self.args[i].1
    }

    /// Sum of all coefficients
    pub fn sum(&self) -> Coeff {
        self.args.iter().map(|(_, c)| *c).sum()
    }

    /// Index of the term over `v` within `args[..end]`
    pub fn find_var(&self, v: Var, end: usize) -> Option<usize> {
        self.args[..end].iter().position(|(l, _)| l.var() == v)
    }

    /// Flips the reifying literal and replaces the inequality by its negation
    /// `sum c_i * ~l_i >= sum c_i - k + 1` (the Knuth transformation),
    /// renormalising afterwards.
    pub fn negate(&mut self) {
        self.lit = !self.lit;
        let mut sum = 0;
        for (l, c) in self.args.iter_mut() {
            *l = !*l;
            sum += *c;
        }
        self.k = sum - self.k + 1;
        let res = normalize(&mut self.args, &mut self.k);
        debug_assert_eq!(res, Normalize::Undecided);
        prune(&mut self.args, &mut self.k);
        debug_assert!(self.well_formed());
    }

    /// Checks the invariants of a well-formed inequality (only used in debug
    /// assertions)
    pub fn well_formed(&self) -> bool {
        if self.k <= 0 {
            return false;
        }
        let mut vars = crate::types::RsHashSet::default();
        let mut sum = 0;
        for &(l, c) in &self.args {
            if c < 1 || c > self.k {
                return false;
            }
            if !vars.insert(l.var()) {
                return false;
            }
            sum += c;
        }
        sum >= self.k
    }
}
