//! # Constraint encoder
//!
//! Keeps a CNF knowledge base over one boolean per `(cell, value)` pair and
//! turns observations into clauses. Questions are answered by refutation: a
//! literal is forced when the knowledge base plus its negation is UNSAT.
//!
//! Variable layout:
//! * `1 ..= W*H*13`: `(cell, value)`, see [`VarMap::encode`].
//! * the next `W*H*2`: per-cell presence of a guard / civilian, equivalent to
//!   the disjunction of the four facings.
//! * everything above: auxiliary variables of sequential counters.

use crate::cnf::{self, Clause, Counter, Formula, Lit};
use crate::error::Result;
use crate::grid::{Knowledge, KnowledgeGrid};
use crate::oracle::Oracle;
use crate::types::{Agent, Cell, CellValue};
use itertools::Itertools;
use tracing::{debug, info, warn};

/// Chebyshev radius of hearing.
pub const NOISE_RADIUS: i32 = 2;
/// Readings at this level only give a lower bound.
pub const NOISE_SATURATION: u32 = 5;
pub const DEFAULT_NAIVE_CLAUSE_LIMIT: u128 = 50_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarMap {
    width: i32,
    height: i32,
}

impl VarMap {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn cell_index(&self, cell: Cell) -> i32 {
        debug_assert!(cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height);
        cell.x * self.height + cell.y
    }

    pub fn num_domain_vars(&self) -> i32 {
        self.width * self.height * CellValue::COUNT as i32
    }

    pub fn encode(&self, cell: Cell, value: CellValue) -> Lit {
        self.cell_index(cell) * CellValue::COUNT as i32 + value.index() as i32 + 1
    }

    /// Inverse of [`VarMap::encode`]; `None` outside the domain range.
    pub fn decode(&self, var: Lit) -> Option<(Cell, CellValue)> {
        if var < 1 || var > self.num_domain_vars() {
            return None;
        }
        let v = var - 1;
        let value = CellValue::from_index((v % CellValue::COUNT as i32) as usize)?;
        let idx = v / CellValue::COUNT as i32;
        Some((Cell::new(idx / self.height, idx % self.height), value))
    }

    pub fn presence(&self, cell: Cell, agent: Agent) -> Lit {
        let k = match agent {
            Agent::Guard => 0,
            Agent::Civilian => 1,
        };
        self.num_domain_vars() + self.cell_index(cell) * 2 + k + 1
    }

    /// Last variable with a fixed meaning.
    pub fn last_fixed(&self) -> i32 {
        self.num_domain_vars() + self.width * self.height * 2
    }

    /// One value per cell, plus the presence definitions.
    pub fn cell_constraints(&self, cell: Cell) -> Vec<Clause> {
        let all = CellValue::ALL.map(|v| self.encode(cell, v));
        let mut clauses = cnf::exactly(1, &all);
        for agent in [Agent::Guard, Agent::Civilian] {
            let p = self.presence(cell, agent);
            let facings = CellValue::variants_of(agent).map(|v| self.encode(cell, v));
            let mut some = vec![-p];
            some.extend(facings);
            clauses.push(some);
            for f in facings {
                clauses.push(vec![-f, p]);
            }
        }
        clauses
    }
}

/// What the grid knows around a listening position, detached from the grid.
#[derive(Clone, Debug)]
pub struct LocalEvidence {
    pub center: Cell,
    pub intensity: u32,
    pub window: Vec<Cell>,
    /// Window cells that are not `Unknown`.
    pub facts: Vec<(Cell, Knowledge)>,
    /// Window cells proven to hold a guard of unknown facing.
    pub threats: Vec<Cell>,
    pub located_guards: usize,
    pub located_civilians: usize,
}

impl LocalEvidence {
    pub fn gather(grid: &KnowledgeGrid, center: Cell, intensity: u32) -> Self {
        let window = grid.window(center, NOISE_RADIUS);
        let facts = window
            .iter()
            .map(|&c| (c, grid.get(c)))
            .filter(|&(_, k)| k != Knowledge::Unknown)
            .collect();
        let threats = window.iter().copied().filter(|&c| grid.is_threat(c)).collect();
        Self {
            center,
            intensity,
            window,
            facts,
            threats,
            located_guards: grid.located_guards(),
            located_civilians: grid.located_civilians(),
        }
    }

    fn knowledge(&self, cell: Cell) -> Knowledge {
        self.facts
            .iter()
            .find(|&&(c, _)| c == cell)
            .map_or(Knowledge::Unknown, |&(_, k)| k)
    }

    /// Presence variables still open in the window, and the number of agents
    /// the window is already known to hold.
    fn open_presence(&self, vars: &VarMap) -> (Vec<Lit>, usize) {
        let mut open = vec![];
        let mut known = 0;
        for &c in &self.window {
            if self.threats.contains(&c) {
                known += 1;
                continue;
            }
            match self.knowledge(c) {
                Knowledge::Known(v) => known += v.agent().is_some() as usize,
                Knowledge::KnownEmptyOfAgents => {}
                Knowledge::Unknown => {
                    open.push(vars.presence(c, Agent::Guard));
                    open.push(vars.presence(c, Agent::Civilian));
                }
            }
        }
        (open, known)
    }
}

pub struct Encoder {
    vars: VarMap,
    formula: Formula,
    aux: Counter,
    oracle: Box<dyn Oracle>,
    guard_count: usize,
    civilian_count: usize,
    naive_clause_limit: u128,
    queries: usize,
}

impl Encoder {
    pub fn new(
        width: i32,
        height: i32,
        guard_count: usize,
        civilian_count: usize,
        oracle: Box<dyn Oracle>,
    ) -> Self {
        let vars = VarMap::new(width, height);
        Self {
            vars,
            formula: Formula::new(),
            aux: Counter::new(vars.last_fixed()),
            oracle,
            guard_count,
            civilian_count,
            naive_clause_limit: DEFAULT_NAIVE_CLAUSE_LIMIT,
            queries: 0,
        }
    }

    pub fn with_naive_clause_limit(mut self, limit: u128) -> Self {
        self.naive_clause_limit = limit;
        self
    }

    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn guard_count(&self) -> usize {
        self.guard_count
    }

    pub fn civilian_count(&self) -> usize {
        self.civilian_count
    }

    /// Oracle calls made so far.
    pub fn queries(&self) -> usize {
        self.queries
    }

    pub fn var(&self, cell: Cell, value: CellValue) -> Lit {
        self.vars.encode(cell, value)
    }

    pub fn guard_at(&self, cell: Cell) -> Lit {
        self.vars.presence(cell, Agent::Guard)
    }

    pub fn civilian_at(&self, cell: Cell) -> Lit {
        self.vars.presence(cell, Agent::Civilian)
    }

    fn num_vars(&self) -> i32 {
        self.aux.last().max(self.formula.max_var())
    }

    /// Domain, global counts and the start cell.
    pub fn add_initial_constraints(&mut self, grid: &KnowledgeGrid, start: Cell) {
        let limit = self.naive_clause_limit;
        let cells = grid.cells().collect_vec();
        for &c in &cells {
            self.formula.extend(self.vars.cell_constraints(c));
        }
        let guards = cells.iter().map(|&c| self.guard_at(c)).collect_vec();
        let civilians = cells.iter().map(|&c| self.civilian_at(c)).collect_vec();
        let clauses = cnf::exactly_within(limit, self.guard_count, &guards, &mut self.aux);
        self.formula.extend(clauses);
        let clauses = cnf::exactly_within(limit, self.civilian_count, &civilians, &mut self.aux);
        self.formula.extend(clauses);
        for item in [CellValue::Target, CellValue::Disguise, CellValue::Weapon] {
            let xs = cells.iter().map(|&c| self.var(c, item)).collect_vec();
            let clauses = cnf::exactly_within(limit, 1, &xs, &mut self.aux);
            self.formula.extend(clauses);
        }
        self.formula.add(vec![self.var(start, CellValue::Empty)]);
        info!(
            clauses = self.formula.len(),
            vars = self.num_vars(),
            "knowledge base initialised"
        );
    }

    /// Adds a unit clause without consulting the oracle.
    pub fn commit(&mut self, lit: Lit) {
        self.formula.add(vec![lit]);
    }

    /// Records a sighting in both the grid and the formula. Returns whether
    /// the cell was new.
    pub fn assert_fact(&mut self, grid: &mut KnowledgeGrid, cell: Cell, value: CellValue) -> Result<bool> {
        if grid.value(cell) == Some(value) {
            return Ok(false);
        }
        grid.set(cell, Knowledge::Known(value))?;
        self.formula.add(vec![self.var(cell, value)]);
        Ok(true)
    }

    /// Returns the number of cells that were not known before.
    pub fn ingest_vision(&mut self, grid: &mut KnowledgeGrid, vision: &[(Cell, CellValue)]) -> Result<usize> {
        let mut fresh = 0;
        for &(cell, value) in vision {
            if self.assert_fact(grid, cell, value)? {
                debug!(%cell, %value, "seen");
                fresh += 1;
            }
        }
        Ok(fresh)
    }

    /// Cardinality constraint on the agents around `center`, net of the agents
    /// already located.
    fn noise_clauses(&self, evidence: &LocalEvidence, aux: &mut Counter) -> Vec<Clause> {
        let (open, known) = evidence.open_presence(&self.vars);
        let heard = evidence.intensity as usize;
        if evidence.intensity >= NOISE_SATURATION {
            cnf::at_least_within(self.naive_clause_limit, heard.saturating_sub(known), &open, aux)
        } else if known > heard {
            warn!(
                center = %evidence.center,
                heard, known, "more agents located than heard, ignoring reading"
            );
            vec![]
        } else {
            cnf::exactly_within(self.naive_clause_limit, heard - known, &open, aux)
        }
    }

    pub fn ingest_noise(&mut self, grid: &mut KnowledgeGrid, position: Cell, intensity: u32) -> Result<()> {
        if intensity == 0 {
            for c in grid.window(position, NOISE_RADIUS) {
                if grid.value(c).is_some_and(|v| v.agent().is_some()) || grid.is_threat(c) {
                    warn!(%position, cell = %c, "silence next to a located agent");
                    continue;
                }
                self.formula.add(vec![-self.guard_at(c)]);
                self.formula.add(vec![-self.civilian_at(c)]);
                if !grid.is_known(c) {
                    grid.set(c, Knowledge::KnownEmptyOfAgents)?;
                }
            }
            return Ok(());
        }
        let evidence = LocalEvidence::gather(grid, position, intensity);
        let mut aux = self.aux.clone();
        let clauses = self.noise_clauses(&evidence, &mut aux);
        self.aux = aux;
        debug!(%position, intensity, clauses = clauses.len(), "noise");
        self.formula.extend(clauses);
        Ok(())
    }

    /// Whether the knowledge base still has a model.
    pub fn is_consistent(&mut self) -> Result<bool> {
        self.is_satisfiable_with(&[])
    }

    /// Whether the knowledge base has a model where every literal of
    /// `assumptions` holds. Nothing is committed.
    pub fn is_satisfiable_with(&mut self, assumptions: &[Lit]) -> Result<bool> {
        self.queries += 1;
        let num_vars = self.num_vars();
        let mut scope = self.formula.scope();
        for &l in assumptions {
            scope.add(vec![l]);
        }
        self.oracle.solve(&scope, num_vars)
    }

    /// Whether every model satisfies `lit`. A forced literal is committed as a
    /// unit clause; otherwise the formula is left as it was.
    pub fn query_forced(&mut self, lit: Lit) -> Result<bool> {
        let forced = !self.is_satisfiable_with(&[-lit])?;
        if forced {
            debug!(lit, "forced");
            self.commit(lit);
        }
        Ok(forced)
    }

    /// Tries to prove from local evidence alone that one of `candidates`
    /// holds a guard. Returns the first such cell.
    ///
    /// The side formula only spans the hearing window: value domains, known
    /// facts, the noise reading and the number of agents not located yet.
    pub fn query_cell_forced_unsafe(
        &mut self,
        evidence: &LocalEvidence,
        candidates: &[Cell],
    ) -> Result<Option<Cell>> {
        if evidence.intensity == 0 || evidence.located_guards >= self.guard_count {
            return Ok(None);
        }
        let mut aux = Counter::new(self.num_vars());
        let mut side = Formula::new();
        for &c in &evidence.window {
            side.extend(self.vars.cell_constraints(c));
        }
        for &(c, k) in &evidence.facts {
            match k {
                Knowledge::Known(v) => side.add(vec![self.var(c, v)]),
                Knowledge::KnownEmptyOfAgents => {
                    side.add(vec![-self.guard_at(c)]);
                    side.add(vec![-self.civilian_at(c)]);
                }
                Knowledge::Unknown => {}
            }
        }
        for &c in &evidence.threats {
            side.add(vec![self.guard_at(c)]);
        }
        side.extend(self.noise_clauses(evidence, &mut aux));
        let unknown = evidence
            .window
            .iter()
            .copied()
            .filter(|&c| evidence.knowledge(c) == Knowledge::Unknown && !evidence.threats.contains(&c))
            .collect_vec();
        let open_guards = unknown.iter().map(|&c| self.guard_at(c)).collect_vec();
        let open_civilians = unknown.iter().map(|&c| self.civilian_at(c)).collect_vec();
        side.extend(cnf::at_most_within(
            self.naive_clause_limit,
            self.guard_count - evidence.located_guards,
            &open_guards,
            &mut aux,
        ));
        side.extend(cnf::at_most_within(
            self.naive_clause_limit,
            self.civilian_count.saturating_sub(evidence.located_civilians),
            &open_civilians,
            &mut aux,
        ));
        let num_vars = aux.last().max(side.max_var());
        for &cand in candidates {
            self.queries += 1;
            let mut scope = side.scope();
            scope.add(vec![-self.guard_at(cand)]);
            if !self.oracle.solve(&scope, num_vars)? {
                debug!(cell = %cand, "guard proven from local evidence");
                return Ok(Some(cand));
            }
        }
        Ok(None)
    }

    /// Learns from `unexplained` penalty points' worth of unseen watchers: at
    /// least that many of `candidates` hold a guard looking at `position`.
    /// Candidates proven to be such a guard are marked in the grid and returned.
    pub fn ingest_exposure(
        &mut self,
        grid: &mut KnowledgeGrid,
        position: Cell,
        candidates: &[Cell],
        unexplained: usize,
    ) -> Result<Vec<Cell>> {
        if unexplained == 0 || candidates.is_empty() {
            return Ok(vec![]);
        }
        let watchers = candidates
            .iter()
            .filter_map(|&c| Some((c, CellValue::Guard(c.direction_to(position)?))))
            .collect_vec();
        if unexplained > watchers.len() {
            warn!(
                %position,
                unexplained,
                candidates = watchers.len(),
                "more watchers than candidates, ignoring exposure"
            );
            return Ok(vec![]);
        }
        let xs = watchers.iter().map(|&(c, v)| self.var(c, v)).collect_vec();
        let clauses = cnf::at_least_within(self.naive_clause_limit, unexplained, &xs, &mut self.aux);
        self.formula.extend(clauses);
        let mut found = vec![];
        for (c, v) in watchers {
            if grid.is_known(c) {
                continue;
            }
            if self.query_forced(self.var(c, v))? {
                grid.set(c, Knowledge::Known(v))?;
                info!(cell = %c, value = %v, "guard located from exposure");
                found.push(c);
            }
        }
        Ok(found)
    }

    /// Settles an unseen cell when a single value is left possible for it.
    pub fn resolve_cell(&mut self, grid: &mut KnowledgeGrid, cell: Cell) -> Result<Option<CellValue>> {
        if grid.is_known(cell) {
            return Ok(grid.value(cell));
        }
        let mut possible = vec![];
        for v in CellValue::ALL {
            if grid.get(cell) == Knowledge::KnownEmptyOfAgents && v.agent().is_some() {
                continue;
            }
            if grid.is_threat(cell) && !v.is_guard() {
                continue;
            }
            if self.is_satisfiable_with(&[self.var(cell, v)])? {
                possible.push(v);
                if possible.len() > 1 {
                    return Ok(None);
                }
            }
        }
        match possible[..] {
            [v] => {
                self.assert_fact(grid, cell, v)?;
                info!(%cell, value = %v, "cell resolved by elimination");
                Ok(Some(v))
            }
            _ => Ok(None),
        }
    }
}
