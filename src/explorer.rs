//! # Movement executor
//!
//! Replays a planned path against the referee one action at a time, feeding
//! every answer back into the knowledge grid (and the encoder, when SAT is
//! on). Each step re-checks the next cell, so a plan made on stale knowledge
//! is abandoned as soon as it hits something.

use crate::cost::guard_candidates_watching;
use crate::encoder::{Encoder, LocalEvidence, NOISE_RADIUS};
use crate::error::{Error, Result};
use crate::grid::{Knowledge, KnowledgeGrid};
use crate::oracle::Oracle;
use crate::referee::{InitialStatus, Referee, Status};
use crate::types::{Cell, CellValue, Orientation, Rotation};
use itertools::Itertools;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    GoalReached,
    UnreachableGoal,
    /// The next cell of the path turned out to be a wall or a guard.
    BlockedUnsafe,
}

#[derive(Clone, Copy, Debug)]
pub struct ExplorerOptions {
    /// Probe the cell after the next one for guards proven by hearing.
    pub lookahead_sat: bool,
    /// Turn towards rays that still hide unknown cells.
    pub look_around: bool,
    pub naive_clause_limit: u128,
}

impl Default for ExplorerOptions {
    fn default() -> Self {
        Self {
            lookahead_sat: true,
            look_around: true,
            naive_clause_limit: crate::encoder::DEFAULT_NAIVE_CLAUSE_LIMIT,
        }
    }
}

pub struct Explorer<'r> {
    referee: &'r mut dyn Referee,
    grid: KnowledgeGrid,
    encoder: Option<Encoder>,
    options: ExplorerOptions,
    phase: u8,
    position: Cell,
    orientation: Orientation,
    penalties: u32,
    hear: u32,
    disguised: bool,
    moves: usize,
    trail: Vec<Cell>,
}

impl<'r> Explorer<'r> {
    /// Takes over a freshly started phase. With an oracle, a knowledge base is
    /// built for the whole grid.
    pub fn new(
        referee: &'r mut dyn Referee,
        init: &InitialStatus,
        grid: KnowledgeGrid,
        oracle: Option<Box<dyn Oracle>>,
        options: ExplorerOptions,
    ) -> Result<Self> {
        let start = init.status.position;
        let encoder = oracle.map(|oracle| {
            let mut enc = Encoder::new(
                init.width,
                init.height,
                init.guard_count,
                init.civilian_count,
                oracle,
            )
            .with_naive_clause_limit(options.naive_clause_limit);
            enc.add_initial_constraints(&grid, start);
            enc
        });
        let mut ex = Self {
            referee,
            grid,
            encoder,
            options,
            phase: init.status.phase,
            position: start,
            orientation: init.status.orientation,
            penalties: init.status.penalties,
            hear: init.status.hear,
            disguised: false,
            moves: 0,
            trail: vec![start],
        };
        ex.learn(start, CellValue::Empty)?;
        ex.ingest(&init.status)?;
        Ok(ex)
    }

    pub fn grid(&self) -> &KnowledgeGrid {
        &self.grid
    }

    pub fn into_grid(self) -> KnowledgeGrid {
        self.grid
    }

    pub fn position(&self) -> Cell {
        self.position
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn penalties(&self) -> u32 {
        self.penalties
    }

    pub fn is_disguised(&self) -> bool {
        self.disguised
    }

    pub fn moves(&self) -> usize {
        self.moves
    }

    /// Cells visited, starting with the start cell.
    pub fn trail(&self) -> &[Cell] {
        &self.trail
    }

    pub fn oracle_queries(&self) -> usize {
        self.encoder.as_ref().map_or(0, Encoder::queries)
    }

    fn learn(&mut self, cell: Cell, value: CellValue) -> Result<bool> {
        match &mut self.encoder {
            Some(enc) => enc.assert_fact(&mut self.grid, cell, value),
            None => self.grid.set(cell, Knowledge::Known(value)),
        }
    }

    /// Checks an answer of the referee and learns from it.
    fn apply_status(&mut self, status: &Status, action: &'static str) -> Result<()> {
        if status.is_err() {
            return Err(Error::InvalidMove {
                action,
                position: self.position,
                orientation: self.orientation,
                status: status.status.clone(),
            });
        }
        self.ingest(status)
    }

    fn ingest(&mut self, status: &Status) -> Result<()> {
        self.position = status.position;
        self.orientation = status.orientation;
        match &mut self.encoder {
            Some(enc) => {
                enc.ingest_vision(&mut self.grid, &status.vision)?;
            }
            None => {
                for &(cell, value) in &status.vision {
                    if self.grid.set(cell, Knowledge::Known(value))? {
                        debug!(%cell, %value, "seen");
                    }
                }
            }
        }
        let delta = status.penalties.saturating_sub(self.penalties);
        self.penalties = status.penalties;
        self.hear = status.hear;
        if delta > 1 && !self.disguised {
            self.deduce_watchers(((delta - 1) / crate::cost::EXPOSURE_PENALTY) as usize)?;
        }
        self.ingest_noise()
    }

    fn ingest_noise(&mut self) -> Result<()> {
        match &mut self.encoder {
            Some(enc) => enc.ingest_noise(&mut self.grid, self.position, self.hear),
            None if self.hear == 0 => {
                for c in self.grid.window(self.position, NOISE_RADIUS) {
                    if !self.grid.is_known(c) && !self.grid.is_threat(c) {
                        self.grid.set(c, Knowledge::KnownEmptyOfAgents)?;
                    }
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// `seen_by` guards looked at the agent after the last action.
    fn deduce_watchers(&mut self, seen_by: usize) -> Result<()> {
        let watch = guard_candidates_watching(&self.grid, self.position);
        let unexplained = seen_by.saturating_sub(watch.confirmed.len());
        if unexplained == 0 {
            return Ok(());
        }
        let candidates = watch.possible.iter().chain(&watch.threats).copied().collect_vec();
        debug!(position = %self.position, seen_by, ?candidates, "unexplained exposure");
        match candidates.as_slice() {
            [] => warn!(position = %self.position, seen_by, "exposure without any candidate guard"),
            &[c] => {
                if let Some(facing) = c.direction_to(self.position) {
                    info!(cell = %c, "guard located from exposure");
                    self.learn(c, CellValue::Guard(facing))?;
                }
            }
            _ => {
                if let Some(enc) = &mut self.encoder {
                    enc.ingest_exposure(&mut self.grid, self.position, &candidates, unexplained)?;
                }
            }
        }
        Ok(())
    }

    fn turn(&mut self, clockwise: bool) -> Result<()> {
        let (status, action) = if clockwise {
            (self.referee.turn_clockwise()?, "turn_clockwise")
        } else {
            (self.referee.turn_anticlockwise()?, "turn_anticlockwise")
        };
        self.apply_status(&status, action)
    }

    pub fn rotate_towards(&mut self, target: Orientation) -> Result<()> {
        match Rotation::between(self.orientation, target) {
            Rotation::Forward => {}
            Rotation::Clockwise => self.turn(true)?,
            Rotation::Anticlockwise => self.turn(false)?,
            Rotation::DoubleClockwise => {
                self.turn(true)?;
                self.turn(true)?;
            }
        }
        Ok(())
    }

    /// Whether looking along `o` would reveal a cell that is not known yet.
    fn ray_hides_unknown(&self, o: Orientation) -> bool {
        for d in 1..=crate::referee::VISION_RANGE {
            let c = self.position.step(o, d);
            if !self.grid.in_bounds(c) {
                return false;
            }
            match self.grid.value(c) {
                None => return true,
                Some(v) if v.blocks_sight() => return false,
                Some(_) => {}
            }
        }
        false
    }

    /// Sweeps clockwise from the current orientation, turning towards every
    /// ray that still hides something.
    pub fn look_around(&mut self) -> Result<()> {
        if !self.options.look_around {
            return Ok(());
        }
        let o = self.orientation;
        for dir in [o.clockwise(), o.opposite(), o.anticlockwise()] {
            if self.ray_hides_unknown(dir) {
                self.rotate_towards(dir)?;
            }
        }
        Ok(())
    }

    fn goal_resolved(&self, goal: Cell) -> bool {
        self.position == goal || (self.phase == 1 && self.grid.is_known(goal))
    }

    /// Tries to prove that a guard watches `cell` before going there.
    fn probe(&mut self, cell: Cell) -> Result<()> {
        let Some(enc) = &mut self.encoder else {
            return Ok(());
        };
        let candidates = guard_candidates_watching(&self.grid, cell).possible;
        if candidates.is_empty() {
            return Ok(());
        }
        let evidence = LocalEvidence::gather(&self.grid, self.position, self.hear);
        if let Some(c) = enc.query_cell_forced_unsafe(&evidence, &candidates)? {
            enc.commit(enc.guard_at(c));
            self.grid.mark_threat(c)?;
            info!(cell = %c, next = %cell, "guard proven near the path");
        }
        Ok(())
    }

    /// Follows `path` (which starts at the current cell) until `goal` is
    /// resolved: reached, or in exploration, seen.
    pub fn move_to_goal(&mut self, goal: Cell, path: &[Cell]) -> Result<MoveOutcome> {
        self.look_around()?;
        if self.goal_resolved(goal) {
            return Ok(MoveOutcome::GoalReached);
        }
        let steps = match path.iter().position(|&c| c == self.position) {
            Some(i) => &path[i + 1..],
            None => path,
        };
        for (i, &next) in steps.iter().enumerate() {
            let Some(dir) = self.position.direction_to(next) else {
                continue;
            };
            if self.position.manhattan(next) != 1 {
                return Ok(MoveOutcome::BlockedUnsafe);
            }
            self.rotate_towards(dir)?;
            if self.goal_resolved(goal) {
                return Ok(MoveOutcome::GoalReached);
            }
            if !self.grid.is_traversable(next) {
                debug!(%next, "path blocked");
                return Ok(MoveOutcome::BlockedUnsafe);
            }
            let status = self.referee.move_forward()?;
            self.apply_status(&status, "move_forward")?;
            self.moves += 1;
            self.trail.push(self.position);
            if self.options.lookahead_sat && self.phase == 1 {
                if let Some(&after) = steps.get(i + 1) {
                    self.probe(after)?;
                }
            }
            self.look_around()?;
            if self.goal_resolved(goal) {
                return Ok(MoveOutcome::GoalReached);
            }
        }
        Ok(if self.goal_resolved(goal) {
            MoveOutcome::GoalReached
        } else {
            MoveOutcome::UnreachableGoal
        })
    }

    /// Settles cells that were never seen but admit a single value. Returns
    /// how many were settled; always 0 without an oracle.
    pub fn resolve_unknown(&mut self) -> Result<usize> {
        let Some(enc) = &mut self.encoder else {
            return Ok(0);
        };
        let mut settled = 0;
        for c in self.grid.unknown_cells() {
            if enc.resolve_cell(&mut self.grid, c)?.is_some() {
                settled += 1;
            }
        }
        Ok(settled)
    }

    pub fn take_item(&mut self) -> Result<()> {
        let status = self.referee.take_item()?;
        self.apply_status(&status, "take_item")
    }

    pub fn wear_disguise(&mut self) -> Result<()> {
        let status = self.referee.wear_disguise()?;
        self.apply_status(&status, "wear_disguise")?;
        self.disguised = true;
        Ok(())
    }

    pub fn act_on_target(&mut self) -> Result<()> {
        let status = self.referee.act_on_target()?;
        self.apply_status(&status, "act_on_target")
    }
}
