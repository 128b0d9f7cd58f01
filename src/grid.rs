//! # Knowledge grid
//!
//! Everything the agent believes about the world, one entry per cell. The grid
//! is the single authoritative store: the encoder, the cost model and the
//! planner all read it, and only monotone transitions are accepted.

use crate::error::{Error, Result};
use crate::mat;
use crate::types::{Agent, Cell, CellValue, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Knowledge {
    Unknown,
    /// Hearing ruled out guards and civilians, the exact value is still open.
    KnownEmptyOfAgents,
    Known(CellValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGrid {
    width: i32,
    height: i32,
    // cells[x][y]
    cells: Vec<Vec<Knowledge>>,
    /// Cells proven to hold a guard whose facing is still open.
    #[serde(default)]
    threats: BTreeSet<Cell>,
}

impl KnowledgeGrid {
    pub fn new(width: i32, height: i32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::InvalidWorld(format!("size {}x{}", width, height)));
        }
        Ok(Self {
            width,
            height,
            cells: mat![Knowledge::Unknown; width as usize; height as usize],
            threats: BTreeSet::new(),
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// All cells, x-major.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.width).flat_map(move |x| (0..self.height).map(move |y| Cell::new(x, y)))
    }

    /// Out-of-grid cells read as `Unknown`; callers check bounds where it matters.
    pub fn get(&self, cell: Cell) -> Knowledge {
        if !self.in_bounds(cell) {
            return Knowledge::Unknown;
        }
        self.cells[cell.x as usize][cell.y as usize]
    }

    pub fn value(&self, cell: Cell) -> Option<CellValue> {
        match self.get(cell) {
            Knowledge::Known(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_known(&self, cell: Cell) -> bool {
        self.value(cell).is_some()
    }

    /// Records `knowledge` for `cell`. Returns whether anything changed.
    ///
    /// Accepted: `Unknown -> *`, `KnownEmptyOfAgents -> Known(non-agent)`, and
    /// restating what is already known. Anything else is a conflict.
    pub fn set(&mut self, cell: Cell, knowledge: Knowledge) -> Result<bool> {
        if !self.in_bounds(cell) {
            return Err(Error::OutOfBounds(cell));
        }
        let current = self.get(cell);
        let conflict = || Error::KnowledgeConflict {
            cell,
            known: current,
            new: knowledge,
        };
        let next = match (current, knowledge) {
            (_, Knowledge::Unknown) => return Ok(false),
            (Knowledge::Unknown, k) => k,
            (Knowledge::KnownEmptyOfAgents, Knowledge::KnownEmptyOfAgents) => return Ok(false),
            (Knowledge::KnownEmptyOfAgents, Knowledge::Known(v)) => {
                if v.agent().is_some() {
                    return Err(conflict());
                }
                knowledge
            }
            (Knowledge::Known(v), Knowledge::Known(w)) => {
                if v != w {
                    return Err(conflict());
                }
                return Ok(false);
            }
            (Knowledge::Known(v), Knowledge::KnownEmptyOfAgents) => {
                if v.agent().is_some() {
                    return Err(conflict());
                }
                return Ok(false);
            }
        };
        if let Knowledge::Known(v) = next {
            if self.threats.remove(&cell) && !v.is_guard() {
                tracing::warn!(%cell, value = %v, "deduced guard turned out to be something else");
            }
        }
        self.cells[cell.x as usize][cell.y as usize] = next;
        Ok(true)
    }

    /// Records that `cell` holds a guard without knowing where it looks.
    pub fn mark_threat(&mut self, cell: Cell) -> Result<bool> {
        if !self.in_bounds(cell) {
            return Err(Error::OutOfBounds(cell));
        }
        match self.get(cell) {
            Knowledge::Unknown => Ok(self.threats.insert(cell)),
            Knowledge::Known(v) if v.is_guard() => Ok(false),
            known => Err(Error::KnowledgeConflict {
                cell,
                known,
                new: Knowledge::Known(CellValue::Guard(Orientation::N)),
            }),
        }
    }

    pub fn is_threat(&self, cell: Cell) -> bool {
        self.threats.contains(&cell)
    }

    pub fn threats(&self) -> impl Iterator<Item = Cell> + '_ {
        self.threats.iter().copied()
    }

    /// Guards whose cell is known, with or without their facing.
    pub fn located_guards(&self) -> usize {
        self.count_known(CellValue::is_guard) + self.threats.len()
    }

    pub fn located_civilians(&self) -> usize {
        self.count_known(|v| v.agent() == Some(Agent::Civilian))
    }

    /// Optimistic: unknown cells are assumed walkable.
    pub fn is_traversable(&self, cell: Cell) -> bool {
        if !self.in_bounds(cell) {
            return false;
        }
        match self.get(cell) {
            Knowledge::Known(v) => !v.is_obstacle(),
            Knowledge::Unknown => !self.is_threat(cell),
            Knowledge::KnownEmptyOfAgents => true,
        }
    }

    pub fn unknown_cells(&self) -> Vec<Cell> {
        self.cells().filter(|&c| !self.is_known(c)).collect()
    }

    pub fn find(&self, value: CellValue) -> Option<Cell> {
        self.cells().find(|&c| self.value(c) == Some(value))
    }

    /// Cells within Chebyshev distance `radius` of `center`, clipped to the grid.
    pub fn window(&self, center: Cell, radius: i32) -> Vec<Cell> {
        let mut ret = vec![];
        for x in center.x - radius..=center.x + radius {
            for y in center.y - radius..=center.y + radius {
                let c = Cell::new(x, y);
                if self.in_bounds(c) {
                    ret.push(c);
                }
            }
        }
        ret
    }

    pub fn count_known(&self, pred: impl Fn(CellValue) -> bool) -> usize {
        self.cells()
            .filter(|&c| self.value(c).is_some_and(&pred))
            .count()
    }

    /// The map handed to the referee at the end of exploration.
    pub fn to_submission(&self) -> Vec<(Cell, CellValue)> {
        self.cells()
            .map(|c| (c, self.value(c).unwrap_or(CellValue::Empty)))
            .collect()
    }

    pub fn snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn restore(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// One row per line, north at the top.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let s = match self.get(Cell::new(x, y)) {
                    Knowledge::Unknown => "?".to_owned(),
                    Knowledge::KnownEmptyOfAgents => "_".to_owned(),
                    Knowledge::Known(v) => v.to_string(),
                };
                out.push_str(&format!("{:<3}", s));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_monotone() {
        let mut g = KnowledgeGrid::new(3, 3).unwrap();
        let c = Cell::new(1, 1);
        assert!(g.set(c, Knowledge::KnownEmptyOfAgents).unwrap());
        assert!(!g.set(c, Knowledge::KnownEmptyOfAgents).unwrap());
        assert!(g.set(c, Knowledge::Known(CellValue::Wall)).unwrap());
        assert!(!g.set(c, Knowledge::Known(CellValue::Wall)).unwrap());
        assert!(!g.set(c, Knowledge::KnownEmptyOfAgents).unwrap());
        assert!(!g.set(c, Knowledge::Unknown).unwrap());
        assert_eq!(g.get(c), Knowledge::Known(CellValue::Wall));
        assert!(matches!(
            g.set(c, Knowledge::Known(CellValue::Empty)),
            Err(Error::KnowledgeConflict { .. })
        ));
    }

    #[test]
    fn empty_size_is_rejected() {
        assert!(matches!(KnowledgeGrid::new(0, 3), Err(Error::InvalidWorld(_))));
        assert!(matches!(KnowledgeGrid::new(4, -1), Err(Error::InvalidWorld(_))));
    }

    #[test]
    fn agents_conflict_with_empty_of_agents() {
        let mut g = KnowledgeGrid::new(2, 2).unwrap();
        let c = Cell::new(0, 1);
        g.set(c, Knowledge::KnownEmptyOfAgents).unwrap();
        assert!(g.set(c, Knowledge::Known(CellValue::Guard(Orientation::S))).is_err());
        let d = Cell::new(1, 1);
        g.set(d, Knowledge::Known(CellValue::Civilian(Orientation::N))).unwrap();
        assert!(g.set(d, Knowledge::KnownEmptyOfAgents).is_err());
        assert!(g.set(Cell::new(5, 0), Knowledge::KnownEmptyOfAgents).is_err());
    }

    #[test]
    fn traversability() {
        let mut g = KnowledgeGrid::new(4, 1).unwrap();
        g.set(Cell::new(0, 0), Knowledge::Known(CellValue::Wall)).unwrap();
        g.set(Cell::new(1, 0), Knowledge::Known(CellValue::Guard(Orientation::E))).unwrap();
        g.set(Cell::new(2, 0), Knowledge::Known(CellValue::Civilian(Orientation::E))).unwrap();
        assert!(!g.is_traversable(Cell::new(0, 0)));
        assert!(!g.is_traversable(Cell::new(1, 0)));
        assert!(g.is_traversable(Cell::new(2, 0)));
        assert!(g.is_traversable(Cell::new(3, 0)));
        assert!(!g.is_traversable(Cell::new(4, 0)));
        assert!(!g.is_traversable(Cell::new(-1, 0)));
    }

    #[test]
    fn threats_block_until_seen() {
        let mut g = KnowledgeGrid::new(3, 3).unwrap();
        let c = Cell::new(2, 2);
        assert!(g.mark_threat(c).unwrap());
        assert!(!g.is_traversable(c));
        assert_eq!(g.located_guards(), 1);
        g.set(c, Knowledge::Known(CellValue::Guard(Orientation::W))).unwrap();
        assert!(!g.is_threat(c));
        assert_eq!(g.located_guards(), 1);
        g.set(Cell::new(0, 0), Knowledge::KnownEmptyOfAgents).unwrap();
        assert!(g.mark_threat(Cell::new(0, 0)).is_err());
    }

    #[test]
    fn window_is_clipped() {
        let g = KnowledgeGrid::new(4, 4).unwrap();
        assert_eq!(g.window(Cell::new(0, 0), 2).len(), 9);
        assert_eq!(g.window(Cell::new(2, 2), 1).len(), 9);
        assert_eq!(g.window(Cell::new(1, 1), 2).len(), 16);
    }

    #[test]
    fn snapshot_restores_grid() {
        let mut g = KnowledgeGrid::new(2, 3).unwrap();
        g.set(Cell::new(1, 2), Knowledge::Known(CellValue::Target)).unwrap();
        g.set(Cell::new(0, 2), Knowledge::KnownEmptyOfAgents).unwrap();
        let restored = KnowledgeGrid::restore(&g.snapshot().unwrap()).unwrap();
        assert_eq!(restored, g);
        assert_eq!(restored.find(CellValue::Target), Some(Cell::new(1, 2)));
        let sub = restored.to_submission();
        assert_eq!(sub.len(), 6);
        assert!(sub.contains(&(Cell::new(0, 2), CellValue::Empty)));
    }
}
