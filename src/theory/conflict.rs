//! # Cutting-Planes Conflict Analysis
//!
//! Generalises 1-UIP resolution from clauses to PB inequalities: the conflict
//! inequality seeds a lemma which is repeatedly resolved with the antecedents
//! of marked variables on the trail, scaling both sides to a common
//! coefficient. Antecedents outside this theory escape into a side list of
//! literals that either justify the learned inequality or, if the lemma
//! collapses, form a learned clause.

use log::{debug, trace};
use num_integer::Integer;

use crate::types::{Lit, TernaryVal, Var};

use super::{
    ineq::{normalize, prune, Coeff, Normalize},
    Antecedent, ClauseKind, Context, Just, Reified, TheoryPb,
};

/// Data of an inequality participating in a resolution step
struct ResolvedIneq {
    lit: Lit,
    args: Vec<(Lit, Coeff)>,
    k: Coeff,
}

impl TheoryPb {
    /// Runs cutting-planes resolution from the conflicting inequality `v0`
    ///
    /// Returns false when analysis is abandoned; the host's clausal conflict
    /// analysis remains authoritative in that case. This happens when the
    /// conflict is below the activation level of the inequality, when the
    /// lemma normalises to a tautology, or when the marked chain runs out
    /// because PB propagation is not synchronised with the trail order. The
    /// last case loses a lemma but is not a correctness problem.
    pub(super) fn resolve_conflict<C: Context>(&mut self, ctx: &mut C, v0: Var) -> bool {
        let c0 = {
            let c = &self.ineqs[&v0];
            ResolvedIneq {
                lit: c.lit,
                args: c.args.clone(),
                k: c.k,
            }
        };

        let mut lvl = 0;
        for &(l, _) in &c0.args {
            if ctx.value(l) == TernaryVal::False {
                lvl = lvl.max(ctx.level(l.var()));
            }
        }
        if lvl < ctx.level(c0.lit.var()) || lvl == ctx.base_level() {
            return false;
        }
        self.conflict_lvl = lvl;

        // reset the scratch state
        for v in std::mem::take(&mut self.marked) {
            self.conseq_index[v.idx()] = usize::MAX;
        }
        self.num_marks = 0;
        self.lemma_args.clear();
        self.lemma_k = 0;
        self.ineq_literals.clear();
        self.process_ineq(ctx, &c0, None, 1);

        let trail_len = ctx.trail().len();
        debug_assert!(trail_len > 0);
        let mut idx = trail_len - 1;

        while self.num_marks > 0 {
            match normalize(&mut self.lemma_args, &mut self.lemma_k) {
                Normalize::Unsat => break,
                Normalize::Sat => {
                    debug!("lemma already evaluated, abandoning analysis");
                    return false;
                }
                Normalize::Undecided => (),
            }

            // find the next marked variable on the trail
            let found = loop {
                let conseq = ctx.trail()[idx];
                let v = conseq.var();
                if self.is_marked(v) {
                    break Some((conseq, v));
                }
                if idx == 0 {
                    break None;
                }
                idx -= 1;
            };
            let Some((conseq, v)) = found else {
                // PB unit propagation does not follow the trail order, so the
                // chain can run out; the lemma is missed, not wrong
                debug!("marked chain ran out, abandoning analysis");
                return false;
            };
            idx = idx.saturating_sub(1);

            let conseq_idx = self.conseq_index[v.idx()];
            let conseq_coeff = self.lemma_args[conseq_idx].1;
            debug_assert_eq!(self.lemma_args[conseq_idx].0, !conseq);
            self.remove_from_lemma(conseq_idx, true);

            match ctx.antecedent(v) {
                Antecedent::Clause(cls) => {
                    trace!("resolve {conseq} with clause {cls:?}");
                    let mut skipped = false;
                    for &l in cls {
                        if l == conseq && !skipped {
                            skipped = true;
                            continue;
                        }
                        self.process_antecedent(ctx, l, conseq_coeff);
                    }
                }
                Antecedent::Binary(other) => {
                    trace!("resolve {conseq} with binary clause");
                    self.process_antecedent(ctx, other, conseq_coeff);
                }
                Antecedent::Axiom => {
                    if ctx.level(v) > ctx.base_level() {
                        self.ineq_literals.push(conseq);
                    }
                }
                Antecedent::External { theory, handle } if theory == self.id => {
                    match self.justs[handle] {
                        Just::Ineq(av) => {
                            let c = &self.ineqs[&av];
                            let ante = ResolvedIneq {
                                lit: c.lit,
                                args: c.args.clone(),
                                k: c.k,
                            };
                            trace!("resolve {conseq} with inequality of {av}");
                            self.process_ineq(ctx, &ante, Some(conseq), conseq_coeff);
                        }
                        // a learned lemma is only explained by its escape
                        // literals; keep the consequent
                        Just::Lemma => self.ineq_literals.push(conseq),
                    }
                }
                Antecedent::External { .. } => {
                    // another theory justified this literal; keep it for the
                    // learned clause
                    self.ineq_literals.push(conseq);
                }
            }
        }

        self.hoist_maximal_values();
        let res = normalize(&mut self.lemma_args, &mut self.lemma_k);
        prune(&mut self.lemma_args, &mut self.lemma_k);

        match res {
            Normalize::Sat => {
                debug!("resolved lemma is a tautology, abandoning analysis");
                false
            }
            Normalize::Unsat => {
                // the escape literals alone are contradictory
                self.inc_propagations(v0);
                self.stats.num_conflicts += 1;
                let clause: Vec<Lit> = self.ineq_literals.iter().map(|&l| !l).collect();
                debug!("learned clause {clause:?}");
                ctx.add_clause(&clause, ClauseKind::Lemma);
                true
            }
            Normalize::Undecided => {
                let args = std::mem::take(&mut self.lemma_args);
                let k = self.lemma_k;
                match self.reify_ge(ctx, None, args, k) {
                    Reified::Lit(l) => {
                        debug!("learned inequality reified as {l}");
                        self.inc_propagations(v0);
                        self.stats.num_propagations += 1;
                        let handle = self.justs.len();
                        self.justs.push(Just::Lemma);
                        ctx.assign(l, &self.ineq_literals, self.id, handle);
                        true
                    }
                    // re-normalisation cannot flip an open lemma
                    Reified::Const(_) => false,
                }
            }
        }
    }

    /// Adds `g * C'` into the lemma, after scaling the lemma so that the
    /// coefficients of `conseq` align through their lcm
    fn process_ineq<C: Context>(
        &mut self,
        ctx: &C,
        c: &ResolvedIneq,
        conseq: Option<Lit>,
        coeff1: Coeff,
    ) {
        let coeff2 = match conseq {
            None => 1,
            Some(cq) => {
                c.args
                    .iter()
                    .find(|&&(l, _)| l == cq)
                    .expect("consequent appears in its antecedent inequality")
                    .1
            }
        };
        debug_assert!(coeff1 > 0);
        debug_assert!(coeff2 > 0);
        let lc = coeff1.lcm(&coeff2);
        let g = lc / coeff1;
        if g > 1 {
            for (_, co) in &mut self.lemma_args {
                *co *= g;
            }
            self.lemma_k *= g;
        }
        let g = lc / coeff2;
        self.lemma_k += g * c.k;
        for &(l, co) in &c.args {
            self.process_antecedent(ctx, l, g * co);
        }

        debug_assert_eq!(ctx.value(c.lit), TernaryVal::True);
        if ctx.level(c.lit.var()) > ctx.base_level() {
            self.ineq_literals.push(c.lit);
        }
    }

    /// Merges one antecedent term `coeff * l` into the lemma
    fn process_antecedent<C: Context>(&mut self, ctx: &C, l: Lit, coeff: Coeff) {
        let v = l.var();
        let lvl = ctx.level(v);

        if ctx.value(l) != TernaryVal::False {
            self.lemma_k -= coeff;
            if self.config.learn_complements && self.is_marked(v) {
                // the lemma holds the complement of l; cancel against it
                let at_idx = self.conseq_index[v.idx()];
                self.lemma_args[at_idx].1 -= coeff;
                if self.lemma_args[at_idx].1 <= 0 {
                    self.remove_from_lemma(at_idx, lvl == self.conflict_lvl);
                }
            }
        } else if lvl > ctx.base_level() {
            if self.is_marked(v) {
                let at_idx = self.conseq_index[v.idx()];
                self.lemma_args[at_idx].1 += coeff;
                debug_assert!(self.lemma_args[at_idx].1 > 0);
            } else {
                if lvl == self.conflict_lvl {
                    trace!("mark {l} with {coeff}");
                    self.num_marks += 1;
                }
                self.set_mark(v, self.lemma_args.len());
                self.lemma_args.push((l, coeff));
            }
        }
    }

    /// Removes terms whose coefficient reaches the threshold: the lemma is
    /// implied by the remainder together with the negation of such a literal
    fn hoist_maximal_values(&mut self) {
        let mut i = 0;
        while i < self.lemma_args.len() {
            if self.lemma_args[i].1 >= self.lemma_k {
                self.ineq_literals.push(!self.lemma_args[i].0);
                self.lemma_args.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn is_marked(&self, v: Var) -> bool {
        v.idx() < self.conseq_index.len() && self.conseq_index[v.idx()] != usize::MAX
    }

    fn set_mark(&mut self, v: Var, idx: usize) {
        if v.idx() >= self.conseq_index.len() {
            self.conseq_index.resize(v.idx() + 1, usize::MAX);
        }
        debug_assert!(!self.is_marked(v) || self.conseq_index[v.idx()] == idx);
        self.marked.push(v);
        self.conseq_index[v.idx()] = idx;
    }

    /// Removes lemma term `idx`, keeping the mark index consistent for the
    /// term swapped into its place
    fn remove_from_lemma(&mut self, idx: usize, at_conflict_lvl: bool) {
        let lit = self.lemma_args[idx].0;
        self.lemma_args.swap_remove(idx);
        if idx < self.lemma_args.len() {
            self.conseq_index[self.lemma_args[idx].0.var().idx()] = idx;
        }
        self.conseq_index[lit.var().idx()] = usize::MAX;
        if at_conflict_lvl {
            self.num_marks -= 1;
        }
    }
}
