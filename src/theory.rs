//! # The Pseudo-Boolean Theory Plugin
//!
//! [`TheoryPb`] decides conjunctions of constraints `sum c_i * l_i >= k` over
//! Boolean literals inside a host CDCL(T) search. The host drives the plugin
//! through assignment, scope, and restart events and is abstracted by the
//! [`Context`] trait.
//!
//! Internalised atoms are reduced to a normalised inequality which is either
//! axiomatised away, encoded clausally (thresholds of 1), or stored and
//! watched. Active inequalities propagate through a dynamic watched-literal
//! scheme; conflicts go through cutting-planes resolution; inequalities that
//! propagate often are compiled into a sorting network at the next restart.

use log::{debug, trace};

use crate::{
    encodings::{atomics, sortnet, EncodeStats},
    instances::{Cnf, ManageVars},
    types::{
        constraints::{AtomArg, AtomBound, PbAtom, TermId},
        Assignment, Lit, RsHashMap, TernaryVal, Var,
    },
    utils, OutOfMemory,
};

mod conflict;
mod ineq;
mod watch;

use ineq::{normalize, prune, unique, Coeff, Compiled, Ineq, Normalize};

/// Identifier of a theory within the host solver
pub type TheoryId = u32;

/// Kind of a clause emitted to the host
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClauseKind {
    /// A theory axiom, valid independently of the current assignment
    Axiom,
    /// An auxiliary clause of a clausal encoding
    Aux,
    /// A learned lemma
    Lemma,
}

/// Tagged antecedent of an assigned variable, as reported by the host
///
/// Only [`Antecedent::External`] entries carrying this plugin's theory id
/// reveal an inner inequality through the plugin's justification registry.
#[derive(Clone, Copy, Debug)]
pub enum Antecedent<'a> {
    /// Propagated by a clause; the slice holds the clause literals
    Clause(&'a [Lit]),
    /// Propagated by a binary clause; the literal is the other (false) literal
    /// of the clause
    Binary(Lit),
    /// A decision or top-level axiom
    Axiom,
    /// Propagated by a theory with an opaque justification handle
    External {
        /// The propagating theory
        theory: TheoryId,
        /// The justification handle the theory passed to [`Context::assign`]
        handle: usize,
    },
}

/// The host solver interface consumed by the plugin
///
/// All entry points of [`TheoryPb`] are callbacks from the host's search loop;
/// the context gives them access to the current assignment, the trail, and
/// clause/variable creation. The host must never call the plugin concurrently.
pub trait Context {
    /// Gets the current assignment of a literal
    fn value(&self, lit: Lit) -> TernaryVal;

    /// Gets the decision level at which a variable was assigned
    fn level(&self, var: Var) -> u32;

    /// Gets the base (root) decision level
    fn base_level(&self) -> u32;

    /// Gets the assignment trail in assignment order
    fn trail(&self) -> &[Lit];

    /// Gets the antecedent of an assigned variable
    fn antecedent(&self, var: Var) -> Antecedent<'_>;

    /// Adds a clause over the given literals
    fn add_clause(&mut self, lits: &[Lit], kind: ClauseKind);

    /// Assigns `lit` to true as a theory propagation
    ///
    /// `reason` holds currently-true literals implying `lit`. The
    /// `(theory, handle)` pair must be reported back through
    /// [`Context::antecedent`] when the variable's justification is queried.
    fn assign(&mut self, lit: Lit, reason: &[Lit], theory: TheoryId, handle: usize);

    /// Allocates a fresh Boolean variable
    fn new_var(&mut self) -> Var;

    /// Gets the literal a non-Boolean subterm is already reified to, if any
    fn term_lit(&self, term: TermId) -> Option<Lit>;

    /// Binds a non-Boolean subterm to a proxy literal; the host emits the
    /// defining biconditional `proxy <-> term`
    fn bind_term(&mut self, term: TermId, lit: Lit);
}

/// Result of a final check; the plugin is complete over Boolean assignments,
/// so the check always succeeds
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FinalCheck {
    /// No outstanding theory work
    Done,
}

/// Configuration of the plugin
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Cancel complement literals against the lemma during conflict analysis
    pub learn_complements: bool,
    /// Only run cutting-planes analysis on every n-th conflict of a
    /// constraint; 0 analyses every conflict
    pub conflict_frequency: usize,
    /// Compile frequently-propagating small-coefficient inequalities into
    /// sorting networks
    pub enable_compilation: bool,
    /// Gates of the sorting-network constructions
    pub sorter: sortnet::SorterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            learn_complements: true,
            conflict_frequency: 0,
            enable_compilation: true,
            sorter: sortnet::SorterConfig::default(),
        }
    }
}

/// Statistics counters of the plugin
#[derive(Clone, Copy, Default, Debug)]
pub struct Stats {
    /// Number of conflicts raised
    pub num_conflicts: usize,
    /// Number of literals propagated
    pub num_propagations: usize,
    /// Number of internalised predicates
    pub num_predicates: usize,
    /// Number of inequalities compiled to sorting networks
    pub num_compiles: usize,
    /// Number of clauses emitted by compilation
    pub num_compiled_clauses: usize,
    /// Number of variables introduced by compilation
    pub num_compiled_vars: usize,
}

/// Model-evaluation form of an internalised atom
#[derive(Clone, Debug)]
struct StoredAtom {
    args: Vec<(Lit, Coeff)>,
    bound: AtomBound,
    k: Coeff,
}

impl StoredAtom {
    fn eval(&self, model: &Assignment) -> TernaryVal {
        let mut sum = 0;
        for &(l, c) in &self.args {
            match model.lit_value(l) {
                TernaryVal::True => sum += c,
                TernaryVal::False => (),
                TernaryVal::DontCare => return TernaryVal::DontCare,
            }
        }
        match self.bound {
            AtomBound::Ub => (sum <= self.k).into(),
            AtomBound::Lb => (sum >= self.k).into(),
            AtomBound::Eq => (sum == self.k).into(),
        }
    }
}

/// Outcome of reifying a normalised inequality
#[derive(Clone, Copy, Debug)]
enum Reified {
    /// The inequality is trivially true or false
    Const(bool),
    /// The literal reifying the (stored or clausally encoded) inequality
    Lit(Lit),
}

/// What a propagation's justification handle resolves back to
#[derive(Clone, Copy, Debug)]
enum Just {
    /// Propagated by a stored inequality; resolution cuts through it
    Ineq(Var),
    /// A learned lemma assigned true over its escape literals; resolution
    /// keeps the propagated literal instead of resolving through it
    Lemma,
}

/// The pseudo-Boolean theory plugin
///
/// One instance belongs to one solver instance; all mutable state (inequality
/// table, watch lists, compile queue, conflict scratch) lives here and is
/// unwound through [`TheoryPb::push_scope`] / [`TheoryPb::pop_scope`].
#[derive(Debug)]
pub struct TheoryPb {
    id: TheoryId,
    config: Config,
    stats: Stats,
    /// Inequalities by reifying variable; the sole owner of [`Ineq`] values
    ineqs: RsHashMap<Var, Ineq>,
    /// Model-evaluation forms by atom variable
    atoms: RsHashMap<Var, StoredAtom>,
    /// Watch lists by watched-literal index, holding reifying-variable keys
    watch: RsHashMap<usize, Vec<Var>>,
    /// Creation trail of table entries and its scope marks
    atoms_trail: Vec<Var>,
    atoms_lim: Vec<usize>,
    /// Activation trail of watched inequalities and its scope marks
    active_trail: Vec<Var>,
    active_lim: Vec<usize>,
    /// Justification registry: propagation handles to their antecedents
    justs: Vec<Just>,
    justs_lim: Vec<usize>,
    /// Inequalities compiled above the base level, reverted on backtracking
    compiled_trail: Vec<Var>,
    compiled_lim: Vec<usize>,
    /// Inequalities scheduled for compilation at the next restart
    to_compile: Vec<Var>,
    // conflict-analysis scratch, reset at the start of every resolution
    lemma_args: Vec<(Lit, Coeff)>,
    lemma_k: Coeff,
    conseq_index: Vec<usize>,
    marked: Vec<Var>,
    num_marks: usize,
    conflict_lvl: u32,
    ineq_literals: Vec<Lit>,
}

impl TheoryPb {
    /// Creates a plugin instance with the theory id assigned by the host
    #[must_use]
    pub fn new(id: TheoryId, config: Config) -> TheoryPb {
        TheoryPb {
            id,
            config,
            stats: Stats::default(),
            ineqs: RsHashMap::default(),
            atoms: RsHashMap::default(),
            watch: RsHashMap::default(),
            atoms_trail: Vec::new(),
            atoms_lim: Vec::new(),
            active_trail: Vec::new(),
            active_lim: Vec::new(),
            justs: Vec::new(),
            justs_lim: Vec::new(),
            compiled_trail: Vec::new(),
            compiled_lim: Vec::new(),
            to_compile: Vec::new(),
            lemma_args: Vec::new(),
            lemma_k: 0,
            conseq_index: Vec::new(),
            marked: Vec::new(),
            num_marks: 0,
            conflict_lvl: 0,
            ineq_literals: Vec::new(),
        }
    }

    /// Gets the theory id of the plugin
    #[must_use]
    pub fn id(&self) -> TheoryId {
        self.id
    }

    /// Gets the statistics counters
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Reports the statistics counters under their stable names
    pub fn collect_statistics<Sink: FnMut(&'static str, usize)>(&self, mut sink: Sink) {
        sink("pb conflicts", self.stats.num_conflicts);
        sink("pb propagations", self.stats.num_propagations);
        sink("pb predicates", self.stats.num_predicates);
        sink("pb compilations", self.stats.num_compiles);
        sink("pb compiled clauses", self.stats.num_compiled_clauses);
        sink("pb compiled vars", self.stats.num_compiled_vars);
    }

    /// Internalises a pseudo-Boolean atom and returns its reifying literal
    ///
    /// Allocates the atom's Boolean variable, proxies non-Boolean subterms,
    /// folds constants, and reduces the atom to normalised `>=` form. Trivial
    /// atoms are axiomatised away, thresholds of 1 are encoded clausally, and
    /// everything else is stored for watched-literal propagation. Equality
    /// atoms split into a reified `>=` and `<=` side conjoined to the atom
    /// literal.
    pub fn internalize_atom<C: Context>(&mut self, ctx: &mut C, atom: &PbAtom) -> Lit {
        self.stats.num_predicates += 1;
        let v = ctx.new_var();
        let lit = v.pos_lit();

        // resolve arguments to literals and fold constants
        let mut k = atom.k();
        let mut args = Vec::with_capacity(atom.len());
        for &(arg, c) in atom {
            match arg {
                AtomArg::Lit(l) => args.push((l, c)),
                AtomArg::Term(t) => {
                    let l = if let Some(l) = ctx.term_lit(t) {
                        l
                    } else {
                        let proxy = ctx.new_var().pos_lit();
                        ctx.bind_term(t, proxy);
                        proxy
                    };
                    args.push((l, c));
                }
                AtomArg::Const(true) => k -= c,
                AtomArg::Const(false) => (),
            }
        }
        self.atoms.insert(
            v,
            StoredAtom {
                args: args.clone(),
                bound: atom.bound(),
                k,
            },
        );
        self.atoms_trail.push(v);
        debug!("internalize: {atom} := {lit}");

        match atom.bound() {
            AtomBound::Lb => {
                self.reify_ge(ctx, Some(v), args, k);
            }
            AtomBound::Ub => {
                // turn sum <= k into -sum >= -k
                for (_, c) in &mut args {
                    *c = -*c;
                }
                self.reify_ge(ctx, Some(v), args, -k);
            }
            AtomBound::Eq => {
                let ge = self.reify_ge(ctx, None, args.clone(), k);
                for (_, c) in &mut args {
                    *c = -*c;
                }
                let le = self.reify_ge(ctx, None, args, -k);
                match (ge, le) {
                    (Reified::Const(false), _) | (_, Reified::Const(false)) => {
                        ctx.add_clause(&[!lit], ClauseKind::Axiom);
                    }
                    (Reified::Const(true), Reified::Const(true)) => {
                        ctx.add_clause(&[lit], ClauseKind::Axiom);
                    }
                    (Reified::Const(true), Reified::Lit(l))
                    | (Reified::Lit(l), Reified::Const(true)) => {
                        ctx.add_clause(&[!lit, l], ClauseKind::Axiom);
                        ctx.add_clause(&[lit, !l], ClauseKind::Axiom);
                    }
                    (Reified::Lit(a), Reified::Lit(b)) => {
                        ctx.add_clause(&[!lit, a], ClauseKind::Axiom);
                        ctx.add_clause(&[!lit, b], ClauseKind::Axiom);
                        ctx.add_clause(&[lit, !a, !b], ClauseKind::Axiom);
                    }
                }
            }
        }
        lit
    }

    /// Reduces `sum args >= k` to normal form and reifies it with `var` (or a
    /// fresh variable when `None` and one is needed)
    fn reify_ge<C: Context>(
        &mut self,
        ctx: &mut C,
        var: Option<Var>,
        mut args: Vec<(Lit, Coeff)>,
        mut k: Coeff,
    ) -> Reified {
        unique(&mut args, &mut k);
        let res = normalize(&mut args, &mut k);
        prune(&mut args, &mut k);
        match res {
            Normalize::Sat => {
                if let Some(v) = var {
                    ctx.add_clause(&[v.pos_lit()], ClauseKind::Axiom);
                }
                Reified::Const(true)
            }
            Normalize::Unsat => {
                if let Some(v) = var {
                    ctx.add_clause(&[v.neg_lit()], ClauseKind::Axiom);
                }
                Reified::Const(false)
            }
            Normalize::Undecided => {
                let v = var.unwrap_or_else(|| ctx.new_var());
                let lit = v.pos_lit();
                if k == 1 {
                    // clausal encoding: lit <-> (l1 | ... | ln)
                    debug_assert!(args.iter().all(|&(_, c)| c == 1));
                    let arg_lits: Vec<Lit> = args.iter().map(|&(l, _)| l).collect();
                    ctx.add_clause(
                        atomics::lit_impl_clause(lit, &arg_lits).as_ref(),
                        ClauseKind::Axiom,
                    );
                    for cl in atomics::clause_impl_lit(&arg_lits, lit) {
                        ctx.add_clause(cl.as_ref(), ClauseKind::Axiom);
                    }
                    return Reified::Lit(lit);
                }
                let mut c = Ineq::new(lit, args, k);
                let small_coeffs = c.args.iter().all(|&(_, co)| co < 8);
                if self.config.enable_compilation && small_coeffs {
                    c.compilation_threshold = c.size() * utils::digits(c.size(), 2) as usize;
                    trace!(
                        "compilation threshold for {lit}: {}",
                        c.compilation_threshold
                    );
                }
                debug_assert!(c.well_formed());
                self.ineqs.insert(v, c);
                self.atoms_trail.push(v);
                Reified::Lit(lit)
            }
        }
    }

    /// Reacts to the host assigning variable `v`
    ///
    /// Updates the watched inequalities of the falsified literal and, if `v`
    /// reifies an inequality, activates it.
    pub fn assign<C: Context>(&mut self, ctx: &mut C, v: Var, is_true: bool) {
        // the literal that became false
        let nlit = v.lit(is_true);
        trace!("assign: {} is false", nlit);
        if let Some(mut list) = self.watch.remove(&nlit.lidx()) {
            let mut i = 0;
            while i < list.len() {
                if !self.assign_watch(ctx, nlit, &mut list, i) {
                    // not removed from the watch list
                    i += 1;
                }
            }
            if !list.is_empty() {
                self.watch.insert(nlit.lidx(), list);
            }
        }
        if self.ineqs.contains_key(&v) {
            self.assign_ineq(ctx, v, is_true);
        }
    }

    /// Opens a backtracking scope
    pub fn push_scope(&mut self) {
        self.atoms_lim.push(self.atoms_trail.len());
        self.active_lim.push(self.active_trail.len());
        self.justs_lim.push(self.justs.len());
        self.compiled_lim.push(self.compiled_trail.len());
    }

    /// Pops `num_scopes` backtracking scopes, deactivating and destroying
    /// everything created inside them
    ///
    /// # Panics
    ///
    /// If more scopes are popped than were pushed
    pub fn pop_scope(&mut self, num_scopes: usize) {
        let new_lim = self.active_lim.len() - num_scopes;

        // remove watch-list entries of inequalities activated in the popped scopes
        let sz = self.active_lim[new_lim];
        while self.active_trail.len() > sz {
            let v = self.active_trail.pop().expect("trail at least as long as mark");
            let c = &self.ineqs[&v];
            for i in 0..c.watch_sz {
                let w = c.lit_at(i);
                let list = self
                    .watch
                    .get_mut(&w.lidx())
                    .expect("watched literal has a watch list");
                let pos = list
                    .iter()
                    .position(|&key| key == v)
                    .expect("watch list contains the watching inequality");
                list.swap_remove(pos);
            }
        }
        self.active_lim.truncate(new_lim);

        // revert compilation flags set in the popped scopes; the host garbage
        // collects the auxiliary clauses
        let sz = self.compiled_lim[new_lim];
        while self.compiled_trail.len() > sz {
            let v = self.compiled_trail.pop().expect("trail at least as long as mark");
            if let Some(c) = self.ineqs.get_mut(&v) {
                c.compiled = Compiled::No;
            }
        }
        self.compiled_lim.truncate(new_lim);

        self.justs.truncate(self.justs_lim[new_lim]);
        self.justs_lim.truncate(new_lim);

        // destroy inequalities and atoms created in the popped scopes
        let sz = self.atoms_lim[new_lim];
        while self.atoms_trail.len() > sz {
            let v = self.atoms_trail.pop().expect("trail at least as long as mark");
            self.ineqs.remove(&v);
            self.atoms.remove(&v);
        }
        self.atoms_lim.truncate(new_lim);
    }

    /// Drains the compile queue, replacing frequently-propagating
    /// inequalities by sorting-network encodings
    ///
    /// # Errors
    ///
    /// If clause collection runs out of memory
    pub fn restart<C: Context>(&mut self, ctx: &mut C) -> Result<(), OutOfMemory> {
        let queue = std::mem::take(&mut self.to_compile);
        for v in queue {
            if matches!(self.ineqs.get(&v), Some(c) if c.compiled == Compiled::Pending) {
                self.compile_ineq(ctx, v)?;
            }
        }
        Ok(())
    }

    /// Performs a final consistency check; all violations have already raised
    /// conflicts, so there is never outstanding work
    #[must_use]
    pub fn final_check(&self) -> FinalCheck {
        FinalCheck::Done
    }

    /// Evaluates an internalised atom under a model, summing the coefficients
    /// of true arguments and comparing against the bound
    ///
    /// Returns `None` if `v` is not an internalised atom.
    #[must_use]
    pub fn mk_value(&self, v: Var, model: &Assignment) -> Option<TernaryVal> {
        self.atoms.get(&v).map(|atom| atom.eval(model))
    }

    /// Compiles inequality `v` into a sorting-network encoding
    fn compile_ineq<C: Context>(&mut self, ctx: &mut C, v: Var) -> Result<(), OutOfMemory> {
        self.stats.num_compiles += 1;
        let (thl, k, in_lits) = {
            let c = &self.ineqs[&v];
            // unroll the weighted sum into a multiset; the threshold gate
            // ensures coefficients are small
            let mut in_lits = Vec::new();
            for &(l, coeff) in &c.args {
                for _ in 0..coeff {
                    in_lits.push(l);
                }
            }
            let k = usize::try_from(c.k).expect("well-formed threshold is positive");
            (c.lit, k, in_lits)
        };
        debug!(
            "compile sorting network bound: {k} literals: {}",
            in_lits.len()
        );

        // if the constraint already holds at base level, half reification is
        // enough; the auxiliary clauses are garbage collected by the host on
        // backtracking
        let full = !(ctx.value(thl) == TernaryVal::True
            && ctx.level(thl.var()) == ctx.base_level());
        let mut sorter = sortnet::Sorter::new(self.config.sorter);
        let mut cnf = Cnf::new();
        let out = {
            let mut vars = HostVars {
                ctx: &mut *ctx,
                fresh: 0,
            };
            sorter.ge(full, k, &in_lits, &mut cnf, &mut vars)?
        };
        self.stats.num_compiled_vars += sorter.n_vars() as usize;
        self.stats.num_compiled_clauses += sorter.n_clauses();
        for cl in &cnf {
            ctx.add_clause(cl.as_ref(), ClauseKind::Aux);
        }
        match out {
            sortnet::Output::Lit(y) => {
                ctx.add_clause(&[!thl, y], ClauseKind::Aux);
                if full {
                    ctx.add_clause(&[!y, thl], ClauseKind::Aux);
                }
            }
            sortnet::Output::Const(true) => {
                if full {
                    ctx.add_clause(&[thl], ClauseKind::Aux);
                }
            }
            sortnet::Output::Const(false) => {
                ctx.add_clause(&[!thl], ClauseKind::Aux);
            }
        }

        let c = self.ineqs.get_mut(&v).expect("compiled inequality exists");
        c.compiled = Compiled::Yes;
        if !self.compiled_lim.is_empty() {
            self.compiled_trail.push(v);
        }
        Ok(())
    }

    /// Bumps the propagation counter of inequality `v` and schedules it for
    /// compilation once it crosses its threshold
    fn inc_propagations(&mut self, v: Var) {
        let c = self.ineqs.get_mut(&v).expect("inequality exists");
        c.num_propagations += 1;
        if c.compiled == Compiled::No && c.num_propagations > c.compilation_threshold {
            c.compiled = Compiled::Pending;
            self.to_compile.push(v);
        }
    }

    /// Emits a propagation of `l` with the given explanation, registering the
    /// antecedent inequality under a fresh justification handle
    fn add_assign<C: Context>(&mut self, ctx: &mut C, v: Var, reason: &[Lit], l: Lit) {
        self.inc_propagations(v);
        self.stats.num_propagations += 1;
        trace!("propagate {l} from {v} with reason {reason:?}");
        let handle = self.justs.len();
        self.justs.push(Just::Ineq(v));
        ctx.assign(l, reason, self.id, handle);
    }

    /// Emits the conflict clause of inequality `v`, first running
    /// cutting-planes analysis
    fn add_conflict<C: Context>(&mut self, ctx: &mut C, v: Var, lits: &[Lit]) {
        self.inc_propagations(v);
        self.stats.num_conflicts += 1;
        debug!("conflict on {v}: {lits:?}");
        let freq = self.config.conflict_frequency;
        let props = self.ineqs[&v].num_propagations;
        if freq == 0 || props % freq == 0 {
            self.resolve_conflict(ctx, v);
        }
        ctx.add_clause(lits, ClauseKind::Lemma);
    }

    /// Collects the false literals of inequality `v`, negated on demand
    fn unhelpful_literals<C: Context>(&self, ctx: &C, v: Var, negate: bool) -> Vec<Lit> {
        let c = &self.ineqs[&v];
        let mut lits = Vec::new();
        for &(l, _) in &c.args {
            if ctx.value(l) == TernaryVal::False {
                lits.push(if negate { !l } else { l });
            }
        }
        lits
    }
}

/// Adapter allocating encoding variables from the host
struct HostVars<'ctx, C: Context> {
    ctx: &'ctx mut C,
    fresh: u32,
}

impl<C: Context> ManageVars for HostVars<'_, C> {
    fn new_var(&mut self) -> Var {
        self.fresh += 1;
        self.ctx.new_var()
    }

    fn n_used(&self) -> u32 {
        self.fresh
    }
}
