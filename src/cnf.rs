// ----------------------------- CNF utilities -----------------------------

use itertools::Itertools;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

/// Signed variable reference, DIMACS style: `v` or `-v`, never 0.
pub type Lit = i32;
pub type Clause = Vec<Lit>;

/// Hands out fresh variable ids.
#[derive(Debug, Clone)]
pub struct Counter {
    cnt: i32,
}
impl Counter {
    /// Ids start right after `last`.
    pub fn new(last: i32) -> Self {
        Self { cnt: last }
    }
    #[inline]
    pub fn next(&mut self) -> i32 {
        self.cnt += 1;
        self.cnt
    }
    pub fn last(&self) -> i32 {
        self.cnt
    }
}

// ------------------------ Naive cardinality encodings --------------------

/// At most `n` of `vars` are true: every (n+1)-subset of the negations.
pub fn at_most(n: usize, vars: &[Lit]) -> Vec<Clause> {
    if n >= vars.len() {
        return vec![];
    }
    vars.iter().map(|&v| -v).combinations(n + 1).collect()
}

/// At least `n` of `vars` are true: every (|vars|-n+1)-subset of the positives.
pub fn at_least(n: usize, vars: &[Lit]) -> Vec<Clause> {
    if n == 0 {
        return vec![];
    }
    if n > vars.len() {
        return vec![vec![]];
    }
    vars.iter().copied().combinations(vars.len() - n + 1).collect()
}

/// Exactly `n` of `vars` are true.
pub fn exactly(n: usize, vars: &[Lit]) -> Vec<Clause> {
    if n > vars.len() {
        return vec![vec![]];
    }
    if vars.is_empty() {
        return vec![];
    }
    if n == 0 {
        return at_most(0, vars);
    }
    if n == vars.len() {
        return at_least(n, vars);
    }
    let mut clauses = at_most(n, vars);
    clauses.extend(at_least(n, vars));
    clauses
}

pub fn binomial(n: usize, k: usize) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut r: u128 = 1;
    for i in 0..k {
        r = r * (n - i) as u128 / (i + 1) as u128;
    }
    r
}

/// Number of clauses `exactly(n, vars)` would produce for `len` variables.
pub fn exactly_size(n: usize, len: usize) -> u128 {
    if n > len || len == 0 {
        return 1;
    }
    let most = if n < len { binomial(len, n + 1) } else { 0 };
    let least = if n > 0 { binomial(len, len - n + 1) } else { 0 };
    most + least
}

// --------------------- Sequential counter (Sinz 2005) --------------------

/// At most `k` of `xs` are true, with `(|xs|-1)*k` auxiliary variables.
pub fn at_most_sequential(k: usize, xs: &[Lit], id: &mut Counter) -> Vec<Clause> {
    let n = xs.len();
    if k >= n {
        return vec![];
    }
    if k == 0 {
        return xs.iter().map(|&x| vec![-x]).collect();
    }
    // s[i][j]: at least j+1 of xs[0..=i] are true
    let s = (0..n - 1)
        .map(|_| (0..k).map(|_| id.next()).collect_vec())
        .collect_vec();
    let mut clauses = vec![vec![-xs[0], s[0][0]]];
    for j in 1..k {
        clauses.push(vec![-s[0][j]]);
    }
    for i in 1..n - 1 {
        clauses.push(vec![-xs[i], s[i][0]]);
        clauses.push(vec![-s[i - 1][0], s[i][0]]);
        for j in 1..k {
            clauses.push(vec![-xs[i], -s[i - 1][j - 1], s[i][j]]);
            clauses.push(vec![-s[i - 1][j], s[i][j]]);
        }
        clauses.push(vec![-xs[i], -s[i - 1][k - 1]]);
    }
    clauses.push(vec![-xs[n - 1], -s[n - 2][k - 1]]);
    clauses
}

/// At least `k` of `xs` are true: at most `|xs|-k` of the negations.
pub fn at_least_sequential(k: usize, xs: &[Lit], id: &mut Counter) -> Vec<Clause> {
    if k == 0 {
        return vec![];
    }
    if k > xs.len() {
        return vec![vec![]];
    }
    let negated = xs.iter().map(|&x| -x).collect_vec();
    at_most_sequential(xs.len() - k, &negated, id)
}

pub fn exactly_sequential(k: usize, xs: &[Lit], id: &mut Counter) -> Vec<Clause> {
    if k > xs.len() {
        return vec![vec![]];
    }
    let mut clauses = at_most_sequential(k, xs, id);
    clauses.extend(at_least_sequential(k, xs, id));
    clauses
}

/// `exactly`, switching to the sequential counter once the naive encoding
/// would exceed `limit` clauses.
pub fn exactly_within(limit: u128, n: usize, vars: &[Lit], id: &mut Counter) -> Vec<Clause> {
    if exactly_size(n, vars.len()) <= limit {
        exactly(n, vars)
    } else {
        exactly_sequential(n, vars, id)
    }
}

pub fn at_least_within(limit: u128, n: usize, vars: &[Lit], id: &mut Counter) -> Vec<Clause> {
    if n == 0 || n > vars.len() || binomial(vars.len(), vars.len() - n + 1) <= limit {
        at_least(n, vars)
    } else {
        at_least_sequential(n, vars, id)
    }
}

pub fn at_most_within(limit: u128, n: usize, vars: &[Lit], id: &mut Counter) -> Vec<Clause> {
    if n >= vars.len() || binomial(vars.len(), n + 1) <= limit {
        at_most(n, vars)
    } else {
        at_most_sequential(n, vars, id)
    }
}

// -------------------------------- Formula --------------------------------

/// An append-only conjunction of clauses.
///
/// Temporary clauses go through [`Formula::scope`]; they are removed when the
/// returned guard is dropped, whichever way the caller leaves.
#[derive(Debug, Clone, Default)]
pub struct Formula {
    clauses: Vec<Clause>,
    max_var: i32,
}

impl Formula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, clause: Clause) {
        debug_assert!(clause.iter().all(|&l| l != 0));
        if let Some(m) = clause.iter().map(|l| l.abs()).max() {
            self.max_var = self.max_var.max(m);
        }
        self.clauses.push(clause);
    }

    pub fn extend<I: IntoIterator<Item = Clause>>(&mut self, clauses: I) {
        for c in clauses {
            self.add(c);
        }
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn max_var(&self) -> i32 {
        self.max_var
    }

    pub fn scope(&mut self) -> Scope<'_> {
        let mark = self.clauses.len();
        let max_var = self.max_var;
        Scope {
            formula: self,
            mark,
            max_var,
        }
    }

    pub fn write_dimacs<W: Write>(&self, w: &mut W, num_vars: i32) -> io::Result<()> {
        writeln!(w, "c hitman knowledge base")?;
        writeln!(w, "p cnf {} {}", num_vars.max(self.max_var), self.clauses.len())?;
        for clause in &self.clauses {
            writeln!(w, "{} 0", clause.iter().join(" "))?;
        }
        Ok(())
    }
}

/// Speculative clauses on top of a [`Formula`], rolled back on drop.
pub struct Scope<'a> {
    formula: &'a mut Formula,
    mark: usize,
    max_var: i32,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.formula.clauses.truncate(self.mark);
        self.formula.max_var = self.max_var;
    }
}

impl Deref for Scope<'_> {
    type Target = Formula;
    fn deref(&self) -> &Formula {
        &*self.formula
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Formula {
        &mut *self.formula
    }
}
