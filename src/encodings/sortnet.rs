//! # Parametric Sorting Network
//!
//! Clausal encoding of cardinality bounds through a parametric odd-even
//! sorting/merging network \[1\]. Every construction is costed as
//! `5 * vertices + clauses` and compared against a direct (subset-enumeration)
//! encoding of the same block; the cheaper one is emitted. The direct
//! encodings are exponential in the block size and therefore only considered
//! for blocks of fewer than 10 literals.
//!
//! The network is polarity-aware: for a half-reified bound only one direction
//! of each comparator is emitted.
//!
//! ## References
//!
//! - \[1\] Ignasi Abío and Robert Nieuwenhuis and Albert Oliveras and Enric
//!   Rodríguez-Carbonell: _A Parametric Approach for Smaller and Better
//!   Encodings of Cardinality Constraints_, CP 2013.

use std::ops;

use itertools::Itertools;
use log::trace;

use crate::{
    clause,
    encodings::{atomics, CollectClauses, EncodeStats},
    instances::ManageVars,
    types::{Clause, Lit, RsHashMap},
    OutOfMemory,
};

/// Polarity of the network under construction
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mode {
    /// Output literals only need to imply their rank (`y -> count >= rank`)
    Ge,
    /// Output literals only need to be implied by their rank
    Le,
    /// Both directions
    Eq,
    /// [`Mode::Ge`] with full reification
    GeFull,
    /// [`Mode::Le`] with full reification
    LeFull,
}

impl Mode {
    /// Whether the `count >= rank -> y` clauses must be emitted
    fn needs_if(self) -> bool {
        !matches!(self, Mode::Ge)
    }

    /// Whether the `y -> count >= rank` clauses must be emitted
    fn needs_only_if(self) -> bool {
        !matches!(self, Mode::Le)
    }
}

/// Cost of a (sub-)network as a weighted sum of fresh variables and clauses
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Vc {
    v: usize,
    c: usize,
}

impl Vc {
    const LAMBDA: usize = 5;

    fn new(v: usize, c: usize) -> Vc {
        Vc { v, c }
    }

    fn to_int(self) -> usize {
        Self::LAMBDA * self.v + self.c
    }

    /// Compares two costs by their weighted value
    fn cheaper_than(self, other: Vc) -> bool {
        self.to_int() < other.to_int()
    }
}

impl ops::Add for Vc {
    type Output = Vc;

    fn add(self, rhs: Vc) -> Vc {
        Vc::new(self.v + rhs.v, self.c + rhs.c)
    }
}

impl ops::Mul<usize> for Vc {
    type Output = Vc;

    fn mul(self, n: usize) -> Vc {
        Vc::new(n * self.v, n * self.c)
    }
}

/// Gates for the direct constructions, to aid differential testing
#[derive(Clone, Copy, Default, Debug)]
pub struct SorterConfig {
    /// Never use the direct cardinality (sorting) construction at the `card` level
    pub disable_dcard: bool,
    /// Never use the direct sorting construction
    pub disable_dsorting: bool,
    /// Never use the direct simplified-merge construction
    pub disable_dsmerge: bool,
    /// Always use the direct cardinality construction where applicable
    pub force_dcard: bool,
    /// Always use the direct sorting construction where applicable
    pub force_dsorting: bool,
    /// Always use the direct simplified-merge construction where applicable
    pub force_dsmerge: bool,
}

/// Result literal of a top-level network construction
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Output {
    /// The bound is trivially true or false
    Const(bool),
    /// The literal reifying the bound
    Lit(Lit),
}

/// Kind of a memoised comparator output
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Gate {
    Or,
    And,
}

/// Builder for parametric sorting-network encodings of cardinality bounds.
///
/// One instance encodes one top-level bound ([`Sorter::ge`], [`Sorter::le`],
/// or [`Sorter::eq`]); comparator outputs are memoised per instance so that
/// shared subnetworks reuse their output literals.
#[derive(Default, Debug)]
pub struct Sorter {
    mode: Option<Mode>,
    config: SorterConfig,
    n_vars: u32,
    n_clauses: usize,
    cache: RsHashMap<(Lit, Lit, Gate), Lit>,
}

impl Sorter {
    /// Creates a sorter with the given construction gates
    #[must_use]
    pub fn new(config: SorterConfig) -> Sorter {
        Sorter {
            config,
            ..Sorter::default()
        }
    }

    /// Encodes `y <- (sum xs >= k)`, or `y <-> (sum xs >= k)` when `full`, and
    /// returns `y`.
    ///
    /// If `2k > n`, the dual bound over the negated inputs is encoded instead,
    /// keeping the network small.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory
    pub fn ge<Col: CollectClauses>(
        &mut self,
        full: bool,
        k: usize,
        xs: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Output, OutOfMemory> {
        if k > xs.len() {
            return Ok(Output::Const(false));
        }
        if k == 0 {
            return Ok(Output::Const(true));
        }
        if let Some((k, xs)) = dualize(k, xs) {
            return self.le(full, k, &xs, collector, var_manager);
        }
        self.mode = Some(if full { Mode::GeFull } else { Mode::Ge });
        trace!("sorting network ge: k {k} n {} full {full}", xs.len());
        let out = self.card(k, xs, collector, var_manager)?;
        Ok(Output::Lit(out[k - 1]))
    }

    /// Encodes `y <- (sum xs <= k)`, or `y <-> (sum xs <= k)` when `full`, and
    /// returns `y`.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory
    pub fn le<Col: CollectClauses>(
        &mut self,
        full: bool,
        k: usize,
        xs: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Output, OutOfMemory> {
        if k >= xs.len() {
            return Ok(Output::Const(true));
        }
        if let Some((k, xs)) = dualize(k, xs) {
            return self.ge(full, k, &xs, collector, var_manager);
        }
        self.mode = Some(if full { Mode::LeFull } else { Mode::Le });
        trace!("sorting network le: k {k} n {} full {full}", xs.len());
        let out = self.card(k + 1, xs, collector, var_manager)?;
        Ok(Output::Lit(!out[k]))
    }

    /// Encodes `y <-> (sum xs = k)` and returns `y`.
    ///
    /// The result is the conjunction of the `>= k` output and the negated
    /// `>= k + 1` output of the same network.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory
    pub fn eq<Col: CollectClauses>(
        &mut self,
        k: usize,
        xs: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Output, OutOfMemory> {
        if k > xs.len() {
            return Ok(Output::Const(false));
        }
        if xs.is_empty() {
            return Ok(Output::Const(k == 0));
        }
        if let Some((k, xs)) = dualize(k, xs) {
            return self.eq(k, &xs, collector, var_manager);
        }
        self.mode = Some(Mode::Eq);
        let out = self.card(k + 1, xs, collector, var_manager)?;
        if k == 0 {
            return Ok(Output::Lit(!out[0]));
        }
        let lower = out[k - 1];
        if k >= out.len() {
            return Ok(Output::Lit(lower));
        }
        let upper = out[k];
        let y = self.fresh(var_manager);
        for cl in atomics::lit_impl_cube(y, &[lower, !upper]) {
            self.add_clause(cl, collector)?;
        }
        self.add_clause(clause![y, !lower, upper], collector)?;
        Ok(Output::Lit(y))
    }

    fn mode(&self) -> Mode {
        self.mode.expect("network mode must be set by the entry point")
    }

    fn fresh(&mut self, var_manager: &mut dyn ManageVars) -> Lit {
        self.n_vars += 1;
        var_manager.new_var().pos_lit()
    }

    /// Gets the (memoised) literal for `max(a, b)`. The defining clauses come
    /// from the comparator that uses the output.
    fn max_lit(&mut self, a: Lit, b: Lit, var_manager: &mut dyn ManageVars) -> Lit {
        if a == b {
            return a;
        }
        let key = if a < b {
            (a, b, Gate::Or)
        } else {
            (b, a, Gate::Or)
        };
        if let Some(&y) = self.cache.get(&key) {
            return y;
        }
        let y = self.fresh(var_manager);
        self.cache.insert(key, y);
        y
    }

    /// Gets the (memoised) literal for `min(a, b)`
    fn min_lit(&mut self, a: Lit, b: Lit, var_manager: &mut dyn ManageVars) -> Lit {
        if a == b {
            return a;
        }
        let key = if a < b {
            (a, b, Gate::And)
        } else {
            (b, a, Gate::And)
        };
        if let Some(&y) = self.cache.get(&key) {
            return y;
        }
        let y = self.fresh(var_manager);
        self.cache.insert(key, y);
        y
    }

    fn add_clause<Col: CollectClauses>(
        &mut self,
        cl: Clause,
        collector: &mut Col,
    ) -> Result<(), OutOfMemory> {
        self.n_clauses += 1;
        collector.add_clause(cl)
    }

    /// Encodes a comparator `(y1, y2) = (max(x1, x2), min(x1, x2))` in the
    /// current polarity
    fn cmp<Col: CollectClauses>(
        &mut self,
        x1: Lit,
        x2: Lit,
        y1: Lit,
        y2: Lit,
        collector: &mut Col,
    ) -> Result<(), OutOfMemory> {
        if self.mode().needs_only_if() {
            self.add_clause(atomics::lit_impl_lit(y2, x1), collector)?;
            self.add_clause(atomics::lit_impl_lit(y2, x2), collector)?;
            self.add_clause(atomics::lit_impl_clause(y1, &[x1, x2]), collector)?;
        }
        if self.mode().needs_if() {
            self.add_clause(atomics::lit_impl_lit(x1, y1), collector)?;
            self.add_clause(atomics::lit_impl_lit(x2, y1), collector)?;
            self.add_clause(atomics::cube_impl_lit(&[x1, x2], y2), collector)?;
        }
        Ok(())
    }

    fn vc_cmp(&self) -> Vc {
        Vc::new(
            2,
            if self.mode().needs_if() && self.mode().needs_only_if() {
                6
            } else {
                3
            },
        )
    }

    /// Returns the first `k` rank outputs of a sorting network over `xs`
    fn card<Col: CollectClauses>(
        &mut self,
        k: usize,
        xs: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        let n = xs.len();
        if n <= k {
            self.sorting(xs, collector, var_manager)
        } else if self.use_dcard(k, n) {
            self.dsorting(k, xs, collector, var_manager)
        } else {
            let l = n / 2;
            let out1 = self.card(k, &xs[..l], collector, var_manager)?;
            let out2 = self.card(k, &xs[l..], collector, var_manager)?;
            self.smerge(k, &out1, &out2, collector, var_manager)
        }
    }

    fn vc_card(&self, k: usize, n: usize) -> Vc {
        if n <= k {
            self.vc_sorting(n)
        } else if self.use_dcard(k, n) {
            self.vc_dsorting(k, n)
        } else {
            self.vc_card_rec(k, n)
        }
    }

    fn vc_card_rec(&self, k: usize, n: usize) -> Vc {
        let l = n / 2;
        self.vc_card(k, l) + self.vc_card(k, n - l) + self.vc_smerge(k.min(l), k.min(n - l), k)
    }

    fn use_dcard(&self, k: usize, n: usize) -> bool {
        self.config.force_dcard
            || (!self.config.disable_dcard
                && n < 10
                && self.vc_dsorting(k, n).cheaper_than(self.vc_card_rec(k, n)))
    }

    /// Odd-even merge of two sorted sequences
    fn merge<Col: CollectClauses>(
        &mut self,
        aa: &[Lit],
        bb: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        let (a, b) = (aa.len(), bb.len());
        if a == 1 && b == 1 {
            let y1 = self.max_lit(aa[0], bb[0], var_manager);
            let y2 = self.min_lit(aa[0], bb[0], var_manager);
            self.cmp(aa[0], bb[0], y1, y2, collector)?;
            Ok(vec![y1, y2])
        } else if a == 0 {
            Ok(bb.to_vec())
        } else if b == 0 {
            Ok(aa.to_vec())
        } else if self.use_dsmerge(a, b, a + b) {
            self.dsmerge(a + b, aa, bb, collector, var_manager)
        } else if a % 2 == 0 && b % 2 == 1 {
            self.merge(bb, aa, collector, var_manager)
        } else {
            let (even_a, odd_a) = split(aa);
            let (even_b, odd_b) = split(bb);
            let out1 = self.merge(&even_a, &even_b, collector, var_manager)?;
            let out2 = self.merge(&odd_a, &odd_b, collector, var_manager)?;
            self.interleave(&out1, &out2, collector, var_manager)
        }
    }

    fn vc_merge(&self, a: usize, b: usize) -> Vc {
        if a == 1 && b == 1 {
            self.vc_cmp()
        } else if a == 0 || b == 0 {
            Vc::new(0, 0)
        } else if self.use_dsmerge(a, b, a + b) {
            self.vc_dsmerge(a, b, a + b)
        } else {
            self.vc_merge_rec(a, b)
        }
    }

    fn vc_merge_rec(&self, a: usize, b: usize) -> Vc {
        self.vc_merge(ceil2(a), ceil2(b))
            + self.vc_merge(floor2(a), floor2(b))
            + self.vc_interleave(ceil2(a) + ceil2(b), floor2(a) + floor2(b))
    }

    /// Combines the outputs of the even and odd submerges with one comparator
    /// per adjacent pair
    fn interleave<Col: CollectClauses>(
        &mut self,
        aa: &[Lit],
        bb: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        debug_assert!(aa.len() >= bb.len());
        debug_assert!(aa.len() <= bb.len() + 2);
        debug_assert!(!aa.is_empty());
        let mut out = Vec::with_capacity(aa.len() + bb.len());
        out.push(aa[0]);
        let sz = (aa.len() - 1).min(bb.len());
        for i in 0..sz {
            let y1 = self.max_lit(aa[i + 1], bb[i], var_manager);
            let y2 = self.min_lit(aa[i + 1], bb[i], var_manager);
            self.cmp(aa[i + 1], bb[i], y1, y2, collector)?;
            out.push(y1);
            out.push(y2);
        }
        if aa.len() == bb.len() {
            out.push(bb[sz]);
        } else if aa.len() == bb.len() + 2 {
            out.push(aa[sz + 1]);
        }
        debug_assert_eq!(out.len(), aa.len() + bb.len());
        Ok(out)
    }

    fn vc_interleave(&self, a: usize, b: usize) -> Vc {
        self.vc_cmp() * (a - 1).min(b)
    }

    /// Full sorting network over `xs`
    fn sorting<Col: CollectClauses>(
        &mut self,
        xs: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        let n = xs.len();
        match n {
            0 => Ok(vec![]),
            1 => Ok(vec![xs[0]]),
            2 => self.merge(&xs[..1], &xs[1..], collector, var_manager),
            _ => {
                if self.use_dsorting(n) {
                    self.dsorting(n, xs, collector, var_manager)
                } else {
                    let l = n / 2;
                    let out1 = self.sorting(&xs[..l], collector, var_manager)?;
                    let out2 = self.sorting(&xs[l..], collector, var_manager)?;
                    self.merge(&out1, &out2, collector, var_manager)
                }
            }
        }
    }

    fn vc_sorting(&self, n: usize) -> Vc {
        match n {
            0 | 1 => Vc::new(0, 0),
            2 => self.vc_merge(1, 1),
            _ => {
                if self.use_dsorting(n) {
                    self.vc_dsorting(n, n)
                } else {
                    self.vc_sorting_rec(n)
                }
            }
        }
    }

    fn vc_sorting_rec(&self, n: usize) -> Vc {
        debug_assert!(n > 2);
        let l = n / 2;
        self.vc_sorting(l) + self.vc_sorting(n - l) + self.vc_merge(l, n - l)
    }

    fn use_dsorting(&self, n: usize) -> bool {
        debug_assert!(n > 2);
        self.config.force_dsorting
            || (!self.config.disable_dsorting
                && n < 10
                && self.vc_dsorting(n, n).cheaper_than(self.vc_sorting_rec(n)))
    }

    /// Simplified merge returning at most `min(a + b, c)` outputs; only the
    /// top `c` ranks are relevant to the caller
    fn smerge<Col: CollectClauses>(
        &mut self,
        c: usize,
        aa: &[Lit],
        bb: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        let (a, b) = (aa.len(), bb.len());
        let out = if a == 1 && b == 1 && c == 1 {
            let y = self.max_lit(aa[0], bb[0], var_manager);
            if self.mode().needs_if() {
                // x1 -> max(x1,x2), x2 -> max(x1,x2)
                self.add_clause(atomics::lit_impl_lit(aa[0], y), collector)?;
                self.add_clause(atomics::lit_impl_lit(bb[0], y), collector)?;
            }
            if self.mode().needs_only_if() {
                // max(x1,x2) -> x1 | x2
                self.add_clause(atomics::lit_impl_clause(y, &[aa[0], bb[0]]), collector)?;
            }
            vec![y]
        } else if a == 0 {
            bb[..c.min(b)].to_vec()
        } else if b == 0 {
            aa[..c.min(a)].to_vec()
        } else if a > c {
            self.smerge(c, &aa[..c], bb, collector, var_manager)?
        } else if b > c {
            self.smerge(c, aa, &bb[..c], collector, var_manager)?
        } else if a + b <= c {
            self.merge(aa, bb, collector, var_manager)?
        } else if self.use_dsmerge(a, b, c) {
            self.dsmerge(c, aa, bb, collector, var_manager)?
        } else {
            let (even_a, odd_a) = split(aa);
            let (even_b, odd_b) = split(bb);
            let (c1, c2) = if c % 2 == 0 {
                (1 + c / 2, c / 2)
            } else {
                ((c + 1) / 2, (c - 1) / 2)
            };
            let mut out1 = self.smerge(c1, &even_a, &even_b, collector, var_manager)?;
            let mut out2 = self.smerge(c2, &odd_a, &odd_b, collector, var_manager)?;
            debug_assert_eq!(out1.len(), (even_a.len() + even_b.len()).min(c1));
            debug_assert_eq!(out2.len(), (odd_a.len() + odd_b.len()).min(c2));
            let mut tail = None;
            if c % 2 == 0 {
                let z1 = out1.pop().expect("even submerge has at least one output");
                let z2 = out2.pop().expect("odd submerge has at least one output");
                let y = self.max_lit(z1, z2, var_manager);
                if self.mode().needs_if() {
                    self.add_clause(atomics::lit_impl_lit(z1, y), collector)?;
                    self.add_clause(atomics::lit_impl_lit(z2, y), collector)?;
                }
                if self.mode().needs_only_if() {
                    self.add_clause(atomics::lit_impl_clause(y, &[z1, z2]), collector)?;
                }
                tail = Some(y);
            }
            let mut out = self.interleave(&out1, &out2, collector, var_manager)?;
            out.extend(tail);
            out
        };
        debug_assert_eq!(out.len(), (a + b).min(c));
        Ok(out)
    }

    fn vc_smerge(&self, a: usize, b: usize, c: usize) -> Vc {
        if a == 1 && b == 1 && c == 1 {
            let mut v = Vc::new(1, 0);
            if self.mode().needs_if() {
                v = v + Vc::new(0, 2);
            }
            if self.mode().needs_only_if() {
                v = v + Vc::new(0, 1);
            }
            return v;
        }
        if a == 0 || b == 0 {
            return Vc::new(0, 0);
        }
        if a > c {
            return self.vc_smerge(c, b, c);
        }
        if b > c {
            return self.vc_smerge(a, c, c);
        }
        if a + b <= c {
            return self.vc_merge(a, b);
        }
        if self.use_dsmerge(a, b, c) {
            return self.vc_dsmerge(a, b, c);
        }
        self.vc_smerge_rec(a, b, c)
    }

    fn vc_smerge_rec(&self, a: usize, b: usize, c: usize) -> Vc {
        let (c1, c2) = if c % 2 == 0 {
            (1 + c / 2, c / 2)
        } else {
            ((c + 1) / 2, (c - 1) / 2)
        };
        self.vc_smerge(ceil2(a), ceil2(b), c1)
            + self.vc_smerge(floor2(a), floor2(b), c2)
            + self.vc_interleave(ceil2(a) + ceil2(b), floor2(a) + floor2(b))
            + Vc::new(1, 0)
            + if self.mode().needs_if() {
                Vc::new(0, 2)
            } else {
                Vc::new(0, 0)
            }
            + if self.mode().needs_only_if() {
                Vc::new(0, 1)
            } else {
                Vc::new(0, 0)
            }
    }

    fn use_dsmerge(&self, a: usize, b: usize, c: usize) -> bool {
        self.config.force_dsmerge
            || (!self.config.disable_dsmerge
                && a < (1 << 15)
                && b < (1 << 15)
                && self.vc_dsmerge(a, b, c).cheaper_than(self.vc_smerge_rec(a, b, c)))
    }

    /// Direct simplified merge with `c` fresh outputs
    fn dsmerge<Col: CollectClauses>(
        &mut self,
        c: usize,
        aa: &[Lit],
        bb: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        let (a, b) = (aa.len(), bb.len());
        debug_assert!(a <= c);
        debug_assert!(b <= c);
        debug_assert!(a + b >= c);
        let out: Vec<_> = (0..c).map(|_| self.fresh(var_manager)).collect();
        if self.mode().needs_if() {
            for i in 0..a {
                self.add_clause(atomics::lit_impl_lit(aa[i], out[i]), collector)?;
            }
            for i in 0..b {
                self.add_clause(atomics::lit_impl_lit(bb[i], out[i]), collector)?;
            }
            for i in 1..=a {
                for j in 1..=b {
                    if i + j > c {
                        break;
                    }
                    let cl = atomics::cube_impl_lit(&[aa[i - 1], bb[j - 1]], out[i + j - 1]);
                    self.add_clause(cl, collector)?;
                }
            }
        }
        if self.mode().needs_only_if() {
            // y_{k-1} -> a_i | b_{k+1-i} for every split of k + 1, with
            // out-of-range input literals dropped
            for k in 1..=c {
                let lo = 1.max((k + 1).saturating_sub(b + 1));
                let hi = (a + 1).min(k);
                for i in lo..=hi {
                    let j = k + 1 - i;
                    let mut cl = clause![!out[k - 1]];
                    if i <= a {
                        cl.add(aa[i - 1]);
                    }
                    if j <= b {
                        cl.add(bb[j - 1]);
                    }
                    debug_assert!(cl.len() > 1);
                    self.add_clause(cl, collector)?;
                }
            }
        }
        Ok(out)
    }

    fn vc_dsmerge(&self, a: usize, b: usize, c: usize) -> Vc {
        let mut v = Vc::new(c, 0);
        if self.mode().needs_if() {
            v = v + Vc::new(0, a + b + a.min(c) * b.min(c) / 2);
        }
        if self.mode().needs_only_if() {
            v = v + Vc::new(0, a.min(c) * b.min(c) / 2);
        }
        v
    }

    /// Direct sorting network with `m` fresh outputs over subsets of the `n`
    /// inputs
    fn dsorting<Col: CollectClauses>(
        &mut self,
        m: usize,
        xs: &[Lit],
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Vec<Lit>, OutOfMemory> {
        let n = xs.len();
        debug_assert!(m <= n);
        let out: Vec<_> = (0..m).map(|_| self.fresh(var_manager)).collect();
        if self.mode().needs_if() {
            for k in 1..=m {
                for subset in xs.iter().combinations(k) {
                    let mut cl = clause![out[k - 1]];
                    cl.extend(subset.into_iter().map(|&l| !l));
                    self.add_clause(cl, collector)?;
                }
            }
        }
        if self.mode().needs_only_if() {
            for k in 1..=m {
                for subset in xs.iter().combinations(n - k + 1) {
                    let mut cl = clause![!out[k - 1]];
                    cl.extend(subset.into_iter().copied());
                    self.add_clause(cl, collector)?;
                }
            }
        }
        Ok(out)
    }

    fn vc_dsorting(&self, m: usize, n: usize) -> Vc {
        debug_assert!(m <= n && n < 10);
        let mut v = Vc::new(m, 0);
        if self.mode().needs_if() {
            v = v + Vc::new(0, 1 << (n - 1));
        }
        if self.mode().needs_only_if() {
            v = v + Vc::new(0, 1 << (n - 1));
        }
        v
    }
}

impl EncodeStats for Sorter {
    fn n_clauses(&self) -> usize {
        self.n_clauses
    }

    fn n_vars(&self) -> u32 {
        self.n_vars
    }
}

/// Rewrites `sum xs >= k` as `sum ~xs <= n - k` when `2k > n`, bounding the
/// network size by `2k <= n`
fn dualize(k: usize, xs: &[Lit]) -> Option<(usize, Vec<Lit>)> {
    if 2 * k <= xs.len() {
        return None;
    }
    Some((xs.len() - k, xs.iter().map(|&l| !l).collect()))
}

fn split(lits: &[Lit]) -> (Vec<Lit>, Vec<Lit>) {
    let even = lits.iter().copied().step_by(2).collect();
    let odd = lits.iter().copied().skip(1).step_by(2).collect();
    (even, odd)
}

fn ceil2(n: usize) -> usize {
    n / 2 + n % 2
}

fn floor2(n: usize) -> usize {
    n / 2
}

#[cfg(test)]
mod tests {
    use super::{dualize, split, Output, Sorter, SorterConfig, Vc};
    use crate::{
        encodings::EncodeStats,
        instances::{BasicVarManager, Cnf, ManageVars},
        lit,
        types::Lit,
        var,
    };

    #[test]
    fn cost_ordering() {
        assert!(Vc::new(0, 4).cheaper_than(Vc::new(1, 0)));
        assert_eq!((Vc::new(1, 2) + Vc::new(2, 3)).to_int(), 5 * 3 + 5);
        assert_eq!((Vc::new(1, 1) * 3).to_int(), 18);
    }

    #[test]
    fn dualize_bound() {
        let xs = [lit![0], lit![1], lit![2]];
        assert_eq!(dualize(1, &xs), None);
        let (k, neg) = dualize(2, &xs).unwrap();
        assert_eq!(k, 1);
        assert_eq!(neg, vec![!lit![0], !lit![1], !lit![2]]);
    }

    #[test]
    fn split_even_odd() {
        let xs = [lit![0], lit![1], lit![2], lit![3], lit![4]];
        let (even, odd) = split(&xs);
        assert_eq!(even, vec![lit![0], lit![2], lit![4]]);
        assert_eq!(odd, vec![lit![1], lit![3]]);
    }

    #[test]
    fn trivial_bounds() {
        let mut sorter = Sorter::default();
        let mut cnf = Cnf::new();
        let mut vm = BasicVarManager::default();
        let xs = [lit![0], lit![1]];
        assert_eq!(
            sorter.ge(false, 0, &xs, &mut cnf, &mut vm).unwrap(),
            Output::Const(true)
        );
        assert_eq!(
            sorter.ge(false, 3, &xs, &mut cnf, &mut vm).unwrap(),
            Output::Const(false)
        );
        assert_eq!(
            sorter.le(false, 2, &xs, &mut cnf, &mut vm).unwrap(),
            Output::Const(true)
        );
        assert!(cnf.is_empty());
    }

    #[test]
    fn single_input() {
        let mut sorter = Sorter::default();
        let mut cnf = Cnf::new();
        let mut vm = BasicVarManager::from_next_free(var![1]);
        let out = sorter.ge(false, 1, &[lit![0]], &mut cnf, &mut vm).unwrap();
        // a single input is its own rank-1 output
        assert_eq!(out, Output::Lit(lit![0]));
        assert!(cnf.is_empty());
    }

    #[test]
    fn counts_vars_and_clauses() {
        let mut sorter = Sorter::new(SorterConfig::default());
        let mut cnf = Cnf::new();
        let mut vm = BasicVarManager::from_next_free(var![4]);
        let xs: Vec<Lit> = (0..4).map(Lit::positive).collect();
        let out = sorter.ge(false, 2, &xs, &mut cnf, &mut vm).unwrap();
        assert!(matches!(out, Output::Lit(_)));
        assert_eq!(sorter.n_clauses(), cnf.len());
        assert_eq!(u64::from(sorter.n_vars()), u64::from(vm.n_used()) - 4);
        assert!(sorter.n_clauses() > 0);
    }
}
