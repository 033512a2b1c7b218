//! # Watched-Literal Propagation for Weighted Sums
//!
//! Every inequality whose reifying literal is true is watched on a prefix of
//! its terms. The watched prefix is kept large enough that
//! `watch_sum >= k + max_watch` whenever possible; `watch_sum < k` signals a
//! conflict and `k <= watch_sum < k + max_watch` signals that unassigned
//! watched literals with large-enough coefficients are forced.

use log::trace;

use crate::types::{Lit, RsHashMap, TernaryVal, Var};

use super::{
    ineq::{Coeff, Ineq},
    Context, TheoryPb,
};

/// What a watch update on a single inequality amounts to
enum Update {
    /// The watch sum cannot reach the threshold any more
    Conflict,
    /// Some unassigned literals may be forced; carries `watch_sum - k`
    Propagate(Coeff),
    /// The watch prefix covers the threshold again
    Covered,
}

impl TheoryPb {
    /// Activates inequality `v` whose reifying variable was assigned
    ///
    /// If the assignment disagrees with the sign of the reifying literal, the
    /// stored inequality is replaced by its negation first, so that all
    /// subsequent reasoning works with a constraint that must hold.
    pub(super) fn assign_ineq<C: Context>(&mut self, ctx: &mut C, v: Var, is_true: bool) {
        {
            let c = self.ineqs.get_mut(&v).expect("assigned inequality exists");
            if c.lit.is_neg() == is_true {
                c.negate();
            }
            debug_assert!(c.well_formed());
        }

        let (k, clit, maxsum, mininc) = {
            let c = &self.ineqs[&v];
            let mut maxsum = 0;
            let mut mininc = 0;
            for &(l, coeff) in &c.args {
                let val = ctx.value(l);
                if val != TernaryVal::False {
                    maxsum += coeff;
                }
                if val == TernaryVal::DontCare && (mininc == 0 || mininc > coeff) {
                    mininc = coeff;
                }
            }
            (c.k, c.lit, maxsum, mininc)
        };
        trace!("activate {clit}: maxsum {maxsum}, k {k}");

        if maxsum < k {
            // the false literals already exceed the slack
            let mut lits = self.unhelpful_literals(ctx, v, false);
            lits.push(!clit);
            self.add_conflict(ctx, v, &lits);
        } else {
            let c = self.ineqs.get_mut(&v).expect("assigned inequality exists");
            c.watch_sum = 0;
            c.watch_sz = 0;
            c.max_watch = 0;
            let mut i = 0;
            while c.watch_sum < c.k + c.max_watch && i < c.size() {
                if ctx.value(c.lit_at(i)) != TernaryVal::False {
                    add_watch(&mut self.watch, c, i, v);
                }
                i += 1;
            }
            debug_assert!(c.watch_sum >= c.k);
            self.active_trail.push(v);
            #[cfg(debug_assertions)]
            self.validate_watch(v);
        }

        // unit propagation: every unassigned literal is needed
        if maxsum >= k && maxsum - mininc < k {
            let mut reason = self.unhelpful_literals(ctx, v, true);
            reason.push(clit);
            let targets: Vec<Lit> = self.ineqs[&v]
                .args
                .iter()
                .filter(|&&(l, _)| ctx.value(l) == TernaryVal::DontCare)
                .map(|&(l, _)| l)
                .collect();
            for l in targets {
                self.add_assign(ctx, v, &reason, l);
            }
        }
    }

    /// Updates inequality `list[idx]` after its watched literal `nlit` became
    /// false; returns whether the entry was removed from the watch list
    pub(super) fn assign_watch<C: Context>(
        &mut self,
        ctx: &mut C,
        nlit: Lit,
        list: &mut Vec<Var>,
        idx: usize,
    ) -> bool {
        let v = list[idx];
        let update = {
            let c = self.ineqs.get_mut(&v).expect("watched inequality exists");
            debug_assert_eq!(ctx.value(c.lit), TernaryVal::True);
            let w = c
                .find_var(nlit.var(), c.watch_sz)
                .expect("falsified literal is watched");
            debug_assert_eq!(c.lit_at(w), nlit);
            let k = c.k;
            let coeff = c.coeff(w);

            // grow the watch prefix to make up for the lost coefficient
            let mut add_more = c.watch_sum - coeff < k + c.max_watch;
            let mut i = c.watch_sz;
            while add_more && i < c.size() {
                if ctx.value(c.lit_at(i)) != TernaryVal::False {
                    add_watch(&mut self.watch, c, i, v);
                    add_more = c.watch_sum - coeff < k + c.max_watch;
                }
                i += 1;
            }

            if c.watch_sum - coeff < k {
                // L: 3 x1 + 2 x2 + x4 >= 3 with x1 <- 0, x2 <- 0
                // gives clause x1 | x2 | ~L
                Update::Conflict
            } else {
                del_watch(list, idx, c, w);
                if c.watch_sum < k + c.max_watch {
                    Update::Propagate(c.watch_sum - k)
                } else {
                    Update::Covered
                }
            }
        };

        match update {
            Update::Conflict => {
                let mut lits = self.unhelpful_literals(ctx, v, false);
                lits.push(!self.ineqs[&v].lit);
                self.add_conflict(ctx, v, &lits);
                false
            }
            Update::Covered => {
                #[cfg(debug_assertions)]
                self.validate_watch(v);
                true
            }
            Update::Propagate(deficit) => {
                // L: 3 x1 + 2 x2 + x4 >= 3 with x1 <- 0
                // gives clauses x1 | ~L | x2 and x1 | ~L | x4
                let mut reason = self.unhelpful_literals(ctx, v, true);
                reason.push(self.ineqs[&v].lit);
                let targets: Vec<Lit> = self.ineqs[&v]
                    .args
                    .iter()
                    .filter(|&&(l, coeff)| ctx.value(l) == TernaryVal::DontCare && deficit < coeff)
                    .map(|&(l, _)| l)
                    .collect();
                for l in targets {
                    self.add_assign(ctx, v, &reason, l);
                }
                #[cfg(debug_assertions)]
                self.validate_watch(v);
                true
            }
        }
    }

    /// Checks the watch invariants of inequality `v`
    #[cfg(debug_assertions)]
    pub(super) fn validate_watch(&self, v: Var) {
        let c = &self.ineqs[&v];
        let sum: Coeff = c.args[..c.watch_sz].iter().map(|&(_, co)| co).sum();
        let max: Coeff = c.args[..c.watch_sz]
            .iter()
            .map(|&(_, co)| co)
            .max()
            .unwrap_or(0);
        debug_assert_eq!(c.watch_sum, sum);
        debug_assert!(sum >= c.k);
        debug_assert_eq!(c.max_watch, max);
        for i in 0..c.watch_sz {
            let l = c.lit_at(i);
            let count = self
                .watch
                .get(&l.lidx())
                .map_or(0, |list| list.iter().filter(|&&key| key == v).count());
            debug_assert_eq!(count, 1, "watch list of {l} inconsistent");
        }
    }
}

/// Moves term `i` of `c` into the watched prefix and registers the watch
fn add_watch(watch: &mut RsHashMap<usize, Vec<Var>>, c: &mut Ineq, i: usize, key: Var) {
    let lit = c.lit_at(i);
    let coeff = c.coeff(i);
    c.watch_sum += coeff;
    debug_assert!(i >= c.watch_sz);
    if i > c.watch_sz {
        c.args.swap(i, c.watch_sz);
    }
    c.watch_sz += 1;
    if coeff > c.max_watch {
        c.max_watch = coeff;
    }
    watch.entry(lit.lidx()).or_default().push(key);
}

/// Removes watched term `w` of `c` and its watch-list entry `list[list_idx]`
fn del_watch(list: &mut Vec<Var>, list_idx: usize, c: &mut Ineq, w: usize) {
    list.swap_remove(list_idx);
    let coeff = c.coeff(w);
    if w + 1 < c.watch_sz {
        c.args.swap(w, c.watch_sz - 1);
    }
    c.watch_sz -= 1;
    c.watch_sum -= coeff;
    if c.max_watch == coeff {
        c.max_watch = c.args[..c.watch_sz]
            .iter()
            .map(|&(_, co)| co)
            .max()
            .unwrap_or(0);
    }
}
