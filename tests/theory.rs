//! End-to-end scenarios driving the theory plugin through a mock host
//! context: activation, watched-literal propagation, conflicts,
//! cutting-planes resolution, scopes, and restart compilation.

use pbsat::{
    theory::{Antecedent, ClauseKind, Config, Context, FinalCheck, TheoryId, TheoryPb},
    types::{
        constraints::{AtomArg, PbAtom, TermId},
        Assignment, Lit, TernaryVal, Var,
    },
};

const PB: TheoryId = 7;

#[derive(Clone, Debug, Default)]
enum Ante {
    #[default]
    None,
    Axiom,
    Clause(Vec<Lit>),
    Binary(Lit),
    External(TheoryId, usize),
}

/// Minimal host solver state: assignment, trail, levels, antecedents, and the
/// clauses the plugin emits
#[derive(Default)]
struct MockContext {
    vals: Vec<TernaryVal>,
    levels: Vec<u32>,
    antes: Vec<Ante>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    level: u32,
    clauses: Vec<(Vec<Lit>, ClauseKind)>,
    terms: std::collections::HashMap<TermId, Lit>,
    delivered: usize,
    inconsistent: bool,
}

impl MockContext {
    fn new_lit(&mut self) -> Lit {
        self.new_var().pos_lit()
    }

    fn set(&mut self, lit: Lit, ante: Ante) {
        assert_eq!(self.value(lit), TernaryVal::DontCare, "{lit} already set");
        self.vals[lit.vidx()] = TernaryVal::from(lit.is_pos());
        self.levels[lit.vidx()] = self.level;
        self.antes[lit.vidx()] = ante;
        self.trail.push(lit);
    }

    /// Sets a literal true at the current level as a decision/assumption
    fn assume(&mut self, lit: Lit) {
        self.set(lit, Ante::Axiom);
    }

    fn new_level(&mut self) {
        self.level += 1;
        self.trail_lim.push(self.trail.len());
    }

    fn backtrack(&mut self, levels: u32) {
        for _ in 0..levels {
            let lim = self.trail_lim.pop().unwrap();
            while self.trail.len() > lim {
                let l = self.trail.pop().unwrap();
                self.vals[l.vidx()] = TernaryVal::DontCare;
                self.antes[l.vidx()] = Ante::None;
            }
            self.level -= 1;
        }
        self.delivered = self.delivered.min(self.trail.len());
    }

    /// Clauses of a given kind
    fn clauses_of(&self, kind: ClauseKind) -> Vec<&Vec<Lit>> {
        self.clauses
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(c, _)| c)
            .collect()
    }

    fn has_clause(&self, lits: &[Lit], kind: ClauseKind) -> bool {
        let mut sorted: Vec<Lit> = lits.to_vec();
        sorted.sort_unstable();
        self.clauses_of(kind).iter().any(|c| {
            let mut cs: Vec<Lit> = (*c).clone();
            cs.sort_unstable();
            cs.dedup();
            cs == sorted
        })
    }
}

impl Context for MockContext {
    fn value(&self, lit: Lit) -> TernaryVal {
        let val = self.vals[lit.vidx()];
        if lit.is_neg() {
            !val
        } else {
            val
        }
    }

    fn level(&self, var: Var) -> u32 {
        self.levels[var.idx()]
    }

    fn base_level(&self) -> u32 {
        0
    }

    fn trail(&self) -> &[Lit] {
        &self.trail
    }

    fn antecedent(&self, var: Var) -> Antecedent<'_> {
        match &self.antes[var.idx()] {
            Ante::None | Ante::Axiom => Antecedent::Axiom,
            Ante::Clause(cls) => Antecedent::Clause(cls),
            Ante::Binary(l) => Antecedent::Binary(*l),
            Ante::External(theory, handle) => Antecedent::External {
                theory: *theory,
                handle: *handle,
            },
        }
    }

    fn add_clause(&mut self, lits: &[Lit], kind: ClauseKind) {
        self.clauses.push((lits.to_vec(), kind));
    }

    fn assign(&mut self, lit: Lit, reason: &[Lit], theory: TheoryId, handle: usize) {
        for &r in reason {
            assert_eq!(self.value(r), TernaryVal::True, "reason literal {r} not true");
        }
        match self.value(lit) {
            TernaryVal::True => (),
            TernaryVal::False => self.inconsistent = true,
            TernaryVal::DontCare => self.set(lit, Ante::External(theory, handle)),
        }
    }

    fn new_var(&mut self) -> Var {
        let v = Var::new(u32::try_from(self.vals.len()).unwrap());
        self.vals.push(TernaryVal::DontCare);
        self.levels.push(0);
        self.antes.push(Ante::None);
        v
    }

    fn term_lit(&self, term: TermId) -> Option<Lit> {
        self.terms.get(&term).copied()
    }

    fn bind_term(&mut self, term: TermId, lit: Lit) {
        self.terms.insert(term, lit);
    }
}

/// Delivers every undelivered trail entry to the plugin, including the
/// propagations it enqueues along the way
fn drive(th: &mut TheoryPb, ctx: &mut MockContext) {
    while ctx.delivered < ctx.trail.len() {
        let l = ctx.trail[ctx.delivered];
        ctx.delivered += 1;
        th.assign(ctx, l.var(), l.is_pos());
    }
}

fn setup() -> (TheoryPb, MockContext) {
    (TheoryPb::new(PB, Config::default()), MockContext::default())
}

/// S1: `x + y + z >= 2` with `x` false forces `y` and `z`
#[test]
fn cardinality_propagates_remaining() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(x, 1), (y, 1), (z, 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.assume(!x);
    drive(&mut th, &mut ctx);

    assert_eq!(ctx.value(y), TernaryVal::True);
    assert_eq!(ctx.value(z), TernaryVal::True);
    assert!(matches!(ctx.antes[y.vidx()], Ante::External(PB, _)));
    assert!(matches!(ctx.antes[z.vidx()], Ante::External(PB, _)));
    assert_eq!(th.stats().num_propagations, 2);
}

/// S1 continued: `x` and `y` both false raise a conflict and resolution
/// learns the clause `x | y`
#[test]
fn cardinality_conflict_learns_clause() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(x, 1), (y, 1), (z, 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    // the host enqueues both assignments before the theory sees either
    ctx.new_level();
    ctx.assume(!x);
    ctx.assume(!y);
    drive(&mut th, &mut ctx);

    assert!(th.stats().num_conflicts >= 1);
    // the theory never tried to flip an already-false literal
    assert!(!ctx.inconsistent);
    // the direct conflict clause over the falsified literals
    assert!(ctx.has_clause(&[!alit, x, y], ClauseKind::Lemma));
    // the resolved lemma collapses to a clause over the decisions
    assert!(ctx.has_clause(&[x, y], ClauseKind::Lemma));
}

/// S2: `3 x + 2 y + z >= 3` with `x` false forces `y` and `z`
#[test]
fn weighted_propagation() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(x, 3), (y, 2), (z, 1)], 3);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.assume(!x);
    drive(&mut th, &mut ctx);

    // 2 y + z >= 3 needs both remaining literals
    assert_eq!(ctx.value(y), TernaryVal::True);
    assert_eq!(ctx.value(z), TernaryVal::True);
}

/// S2 variant: `3 x + 2 y + z >= 3` with only `y` false keeps the rest open
/// but forces `x`
#[test]
fn weighted_propagation_partial() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(x, 3), (y, 2), (z, 1)], 3);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.assume(!y);
    drive(&mut th, &mut ctx);

    // 3 x + z >= 3 forces x but not z
    assert_eq!(ctx.value(x), TernaryVal::True);
    assert_eq!(ctx.value(z), TernaryVal::DontCare);
}

/// S3: `x + y <= 1` is internalised as `~x + ~y >= 1` and encoded clausally
#[test]
fn at_most_one_becomes_clauses() {
    let (mut th, mut ctx) = setup();
    let (x, y) = (ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ub([(x, 1), (y, 1)], 1);
    let alit = th.internalize_atom(&mut ctx, &atom);

    assert!(ctx.has_clause(&[!alit, !x, !y], ClauseKind::Axiom));
    assert!(ctx.has_clause(&[alit, x], ClauseKind::Axiom));
    assert!(ctx.has_clause(&[alit, y], ClauseKind::Axiom));
    // nothing left to propagate through watches
    ctx.assume(alit);
    drive(&mut th, &mut ctx);
    assert_eq!(th.stats().num_propagations, 0);
}

/// Activation of an inequality whose false literals already exceed the slack
/// raises an immediate conflict
#[test]
fn activation_conflict() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    // internalised as 2 ~x + 2 ~y + ~z >= 4
    let atom = PbAtom::new_ub([(x, 2), (y, 2), (z, 1)], 1);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.new_level();
    ctx.assume(x);
    ctx.assume(y);
    drive(&mut th, &mut ctx);
    // the atom only becomes active now; maxsum = 1 < 4
    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    assert!(th.stats().num_conflicts >= 1);
    assert!(ctx.has_clause(&[!alit, !x, !y], ClauseKind::Lemma));
    // cutting planes reduces the conflict to a binary consequence
    assert!(ctx.has_clause(&[!alit, !y], ClauseKind::Lemma));
}

/// S4: `x + y + z + w = 2` splits into both bounds; two true literals force
/// the other two false
#[test]
fn equality_forces_complement() {
    let (mut th, mut ctx) = setup();
    let (x, y, z, w) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_eq([(x, 1), (y, 1), (z, 1), (w, 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);

    // the linking clauses (~alit | side) reveal the reified bound literals
    let sides: Vec<Lit> = ctx
        .clauses_of(ClauseKind::Axiom)
        .iter()
        .filter(|c| c.len() == 2 && c[0] == !alit)
        .map(|c| c[1])
        .collect();
    assert_eq!(sides.len(), 2);

    // the host would derive the sides from alit through those clauses
    for &s in &sides {
        ctx.assume(s);
    }
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.assume(x);
    drive(&mut th, &mut ctx);
    ctx.new_level();
    ctx.assume(y);
    drive(&mut th, &mut ctx);

    assert_eq!(ctx.value(z), TernaryVal::False);
    assert_eq!(ctx.value(w), TernaryVal::False);
}

/// S5: a frequently-propagating cardinality constraint is compiled into a
/// sorting network at the next restart
#[test]
fn compilation_after_threshold() {
    let (mut th, mut ctx) = setup();
    let xs: Vec<Lit> = (0..6).map(|_| ctx.new_lit()).collect();
    let atom = PbAtom::new_ge(xs.iter().map(|&l| (l, 1)), 3);
    let alit = th.internalize_atom(&mut ctx, &atom);

    // each round activates the constraint and forces the last three literals,
    // three propagations a time; the threshold for six inputs is
    // 6 * ceil(log2(7)) = 18
    for _ in 0..7 {
        th.push_scope();
        ctx.new_level();
        ctx.assume(alit);
        drive(&mut th, &mut ctx);
        for l in &xs[..3] {
            ctx.assume(!*l);
            drive(&mut th, &mut ctx);
        }
        assert_eq!(ctx.value(xs[5]), TernaryVal::True);
        ctx.backtrack(1);
        th.pop_scope(1);
    }
    assert!(th.stats().num_propagations > 18);
    assert_eq!(th.stats().num_compiles, 0);

    // the constraint holds at base level from here on
    ctx.assume(alit);
    drive(&mut th, &mut ctx);
    th.restart(&mut ctx).unwrap();

    assert_eq!(th.stats().num_compiles, 1);
    assert!(th.stats().num_compiled_clauses > 0);
    assert!(th.stats().num_compiled_vars > 0);
    // alit holds at base level, so half reification suffices: auxiliary
    // clauses bind alit to the network output but never derive it back
    let aux = ctx.clauses_of(ClauseKind::Aux);
    assert!(!aux.is_empty());
    assert!(aux.iter().any(|c| c.contains(&!alit)));
    assert!(!aux.iter().any(|c| c.contains(&alit)));

    // a second restart compiles nothing further
    th.restart(&mut ctx).unwrap();
    assert_eq!(th.stats().num_compiles, 1);
}

/// Conflict resolution resolves through clause antecedents reported by the
/// host
#[test]
fn resolution_through_clause_antecedent() {
    let (mut th, mut ctx) = setup();
    let (a, b, c, d) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(a, 2), (b, 1), (c, 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    // the host decides ~d and ~b and propagates ~a through the clause d | ~a
    ctx.new_level();
    ctx.assume(!d);
    ctx.set(!a, Ante::Clause(vec![d, !a]));
    ctx.assume(!b);
    drive(&mut th, &mut ctx);

    // 2 a + b + c >= 2 with a and b false is conflicting; resolving through
    // the clause antecedent of ~a reaches the decisions
    assert!(th.stats().num_conflicts >= 1);
    assert!(ctx.has_clause(&[b, d], ClauseKind::Lemma));
}

/// Conflict resolution resolves through binary-clause antecedents
#[test]
fn resolution_through_binary_antecedent() {
    let (mut th, mut ctx) = setup();
    let (a, b, c, d) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(a, 2), (b, 1), (c, 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.assume(!d);
    // binary clause d | ~a, reported as the other (false) literal d
    ctx.set(!a, Ante::Binary(d));
    ctx.assume(!b);
    drive(&mut th, &mut ctx);

    assert!(ctx.has_clause(&[b, d], ClauseKind::Lemma));
}

/// A conflict whose resolution leaves lower-level literals learns a new
/// pseudo-Boolean inequality instead of a clause
#[test]
fn resolution_learns_inequality() {
    let (mut th, mut ctx) = setup();
    let (a, f) = (ctx.new_lit(), ctx.new_lit());
    let (d, e) = (ctx.new_lit(), ctx.new_lit());
    let (h1, h2) = (ctx.new_lit(), ctx.new_lit());
    // 3 a + 2 f >= 3 forces a once f is false
    let lit1 = th.internalize_atom(&mut ctx, &PbAtom::new_ge([(a, 3), (f, 2)], 3));
    // 2 ~a + d + e + h1 + h2 >= 2 conflicts once a is forced
    let lit2 = th.internalize_atom(
        &mut ctx,
        &PbAtom::new_ge([(!a, 2), (d, 1), (e, 1), (h1, 1), (h2, 1)], 2),
    );
    ctx.assume(lit1);
    ctx.assume(lit2);
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.assume(!d);
    ctx.assume(!e);
    drive(&mut th, &mut ctx);

    // the conflict level is 2; d and e stay below it, so cutting planes
    // resolves a, f, h1, h2 away and is left with the open lemma d + e >= 2
    ctx.new_level();
    ctx.assume(!f);
    ctx.assume(!h1);
    ctx.assume(!h2);
    drive(&mut th, &mut ctx);

    assert!(th.stats().num_conflicts >= 1);
    let llit = ctx
        .trail
        .iter()
        .copied()
        .find(|l| l.vidx() > lit2.vidx())
        .expect("a lemma literal was assigned");
    assert!(matches!(ctx.antes[llit.vidx()], Ante::External(PB, _)));
    // activating d + e >= 2 under the false d and e raises a follow-up
    // conflict naming the lemma
    assert!(ctx.has_clause(&[d, e, !llit], ClauseKind::Lemma));
}

/// Literals justified by another theory escape into the learned clause
#[test]
fn resolution_with_external_justification() {
    let (mut th, mut ctx) = setup();
    let (a, b, c) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let atom = PbAtom::new_ge([(a, 2), (b, 1), (c, 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);

    ctx.assume(alit);
    drive(&mut th, &mut ctx);

    ctx.new_level();
    ctx.set(!a, Ante::External(99, 0));
    ctx.assume(!b);
    drive(&mut th, &mut ctx);

    // ~a cannot be resolved within this theory and is kept
    assert!(ctx.has_clause(&[b, a], ClauseKind::Lemma));
}

/// Trivial atoms are axiomatised away
#[test]
fn trivial_atoms() {
    let (mut th, mut ctx) = setup();
    let (x, y) = (ctx.new_lit(), ctx.new_lit());
    // sum >= 0 always holds
    let taut = th.internalize_atom(&mut ctx, &PbAtom::new_ge([(x, 1), (y, 1)], 0));
    assert!(ctx.has_clause(&[taut], ClauseKind::Axiom));
    // sum >= 3 never holds
    let unsat = th.internalize_atom(&mut ctx, &PbAtom::new_ge([(x, 1), (y, 1)], 3));
    assert!(ctx.has_clause(&[!unsat], ClauseKind::Axiom));
}

/// Non-Boolean subterms are abstracted by proxy literals bound in the host
#[test]
fn term_arguments_get_proxies() {
    let (mut th, mut ctx) = setup();
    let x = ctx.new_lit();
    let t = TermId(42);
    let atom = PbAtom::new_ge([(AtomArg::Term(t), 1), (AtomArg::Lit(x), 1)], 2);
    let alit = th.internalize_atom(&mut ctx, &atom);
    let proxy = ctx.term_lit(t).expect("term bound to a proxy");

    ctx.assume(alit);
    drive(&mut th, &mut ctx);
    // k = n forces every argument
    assert_eq!(ctx.value(proxy), TernaryVal::True);
    assert_eq!(ctx.value(x), TernaryVal::True);

    // internalising another atom over the same term reuses the proxy
    let atom2 = PbAtom::new_ge([(AtomArg::Term(t), 1)], 1);
    th.internalize_atom(&mut ctx, &atom2);
    assert_eq!(ctx.term_lit(t), Some(proxy));
}

/// Scope pops destroy inequalities created inside the scope
#[test]
fn pop_scope_destroys_atoms() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let outer = th.internalize_atom(&mut ctx, &PbAtom::new_ge([(x, 1), (y, 1), (z, 1)], 2));

    th.push_scope();
    ctx.new_level();
    let inner = th.internalize_atom(&mut ctx, &PbAtom::new_ge([(x, 2), (y, 1), (z, 1)], 3));
    ctx.assume(inner);
    drive(&mut th, &mut ctx);
    assert!(th.mk_value(inner.var(), &Assignment::default()).is_some());

    ctx.backtrack(1);
    th.pop_scope(1);
    assert!(th.mk_value(inner.var(), &Assignment::default()).is_none());

    // the outer inequality is still functional
    ctx.assume(outer);
    ctx.new_level();
    ctx.assume(!x);
    drive(&mut th, &mut ctx);
    assert_eq!(ctx.value(y), TernaryVal::True);
    assert_eq!(ctx.value(z), TernaryVal::True);
}

/// Model values sum true arguments against the recorded bound
#[test]
fn model_values() {
    let (mut th, mut ctx) = setup();
    let (x, y, z) = (ctx.new_lit(), ctx.new_lit(), ctx.new_lit());
    let ge = th.internalize_atom(&mut ctx, &PbAtom::new_ge([(x, 2), (y, 1), (z, 1)], 2));
    let eq = th.internalize_atom(&mut ctx, &PbAtom::new_eq([(x, 1), (y, 1), (z, 1)], 2));

    let model: Assignment = vec![x, !y, z].into_iter().collect();
    assert_eq!(th.mk_value(ge.var(), &model), Some(TernaryVal::True));
    assert_eq!(th.mk_value(eq.var(), &model), Some(TernaryVal::True));
    let model: Assignment = vec![!x, !y, z].into_iter().collect();
    assert_eq!(th.mk_value(ge.var(), &model), Some(TernaryVal::False));
    assert_eq!(th.mk_value(eq.var(), &model), Some(TernaryVal::False));
    // unknown variable
    assert_eq!(th.mk_value(z.var(), &model), None);
}

#[test]
fn final_check_is_complete() {
    let (th, _) = setup();
    assert_eq!(th.final_check(), FinalCheck::Done);
}

#[test]
fn statistics_names() {
    let (mut th, mut ctx) = setup();
    let (x, y) = (ctx.new_lit(), ctx.new_lit());
    th.internalize_atom(&mut ctx, &PbAtom::new_ge([(x, 1), (y, 1)], 2));

    let mut names = Vec::new();
    th.collect_statistics(|name, _| names.push(name));
    assert_eq!(
        names,
        vec![
            "pb conflicts",
            "pb propagations",
            "pb predicates",
            "pb compilations",
            "pb compiled clauses",
            "pb compiled vars"
        ]
    );
    let mut predicates = 0;
    th.collect_statistics(|name, val| {
        if name == "pb predicates" {
            predicates = val;
        }
    });
    assert_eq!(predicates, 1);
}
