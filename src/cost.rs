//! Exposure and step costs, read off the knowledge grid.

use crate::grid::{Knowledge, KnowledgeGrid};
use crate::types::{Cell, CellValue, Orientation, Rotation};

/// Guards see this many cells ahead.
pub const SIGHT_RANGE: i32 = 2;
/// Penalty per guard watching the agent.
pub const EXPOSURE_PENALTY: u32 = 5;

/// Who may be looking at a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Watch {
    /// Unknown cells that could hold a guard looking this way.
    pub possible: Vec<Cell>,
    /// Known guards looking at the cell.
    pub confirmed: Vec<Cell>,
    /// Known civilians looking at the cell. Harmless.
    pub civilians: Vec<Cell>,
    /// Proven guards of unknown facing with a clear line to the cell.
    pub threats: Vec<Cell>,
}

impl Watch {
    pub fn is_safe(&self) -> bool {
        self.confirmed.is_empty() && self.threats.is_empty()
    }
}

pub fn guard_candidates_watching(grid: &KnowledgeGrid, cell: Cell) -> Watch {
    let mut w = Watch::default();
    for o in Orientation::ALL {
        for d in 1..=SIGHT_RANGE {
            let c = cell.step(o, d);
            if !grid.in_bounds(c) {
                break;
            }
            match grid.get(c) {
                Knowledge::Unknown if grid.is_threat(c) => {
                    w.threats.push(c);
                    break;
                }
                Knowledge::Unknown => w.possible.push(c),
                Knowledge::KnownEmptyOfAgents | Knowledge::Known(CellValue::Empty) => {}
                Knowledge::Known(v) => {
                    if v.facing() == Some(o.opposite()) {
                        match v {
                            CellValue::Guard(_) => w.confirmed.push(c),
                            _ => w.civilians.push(c),
                        }
                    }
                    break;
                }
            }
        }
    }
    w
}

pub fn exposure_count(grid: &KnowledgeGrid, cell: Cell) -> usize {
    guard_candidates_watching(grid, cell).confirmed.len()
}

/// Turn needed at `from` (facing `orientation`) to face the neighbour `to`,
/// and the resulting orientation.
pub fn rotation(from: Cell, orientation: Orientation, to: Cell) -> (Rotation, Orientation) {
    let target = from.direction_to(to).unwrap_or(orientation);
    (Rotation::between(orientation, target), target)
}

/// Penalty for turning towards `to` and stepping onto it.
pub fn step_cost(
    grid: &KnowledgeGrid,
    from: Cell,
    orientation: Orientation,
    to: Cell,
    disguise: bool,
) -> (u32, Orientation) {
    let (rot, next) = rotation(from, orientation, to);
    let mut penalty = rot.quarter_turns() + 1;
    if !disguise {
        penalty += EXPOSURE_PENALTY * exposure_count(grid, to) as u32;
    }
    (penalty, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(grid: &mut KnowledgeGrid, x: i32, y: i32, v: CellValue) {
        grid.set(Cell::new(x, y), Knowledge::Known(v)).unwrap();
    }

    #[test]
    fn guard_two_cells_north_costs_five() {
        let mut g = KnowledgeGrid::new(5, 5).unwrap();
        for y in 0..4 {
            known(&mut g, 2, y, CellValue::Empty);
        }
        known(&mut g, 2, 4, CellValue::Guard(Orientation::S));
        let (p, o) = step_cost(&g, Cell::new(2, 1), Orientation::N, Cell::new(2, 2), false);
        assert_eq!((p, o), (1 + 5, Orientation::N));
        let (p, _) = step_cost(&g, Cell::new(2, 1), Orientation::N, Cell::new(2, 2), true);
        assert_eq!(p, 1);
        // out of range from one cell further south
        assert_eq!(exposure_count(&g, Cell::new(2, 1)), 0);
    }

    #[test]
    fn rays_stop_at_obstacles() {
        let mut g = KnowledgeGrid::new(5, 5).unwrap();
        let c = Cell::new(2, 2);
        known(&mut g, 2, 3, CellValue::Wall);
        known(&mut g, 2, 4, CellValue::Guard(Orientation::S));
        known(&mut g, 3, 2, CellValue::Empty);
        known(&mut g, 4, 2, CellValue::Civilian(Orientation::W));
        known(&mut g, 1, 2, CellValue::Guard(Orientation::N));
        g.set(Cell::new(2, 1), Knowledge::KnownEmptyOfAgents).unwrap();
        let w = guard_candidates_watching(&g, c);
        assert!(w.confirmed.is_empty());
        assert_eq!(w.civilians, vec![Cell::new(4, 2)]);
        assert_eq!(w.possible, vec![Cell::new(2, 0)]);
        assert!(w.is_safe());

        g.mark_threat(Cell::new(2, 0)).unwrap();
        let w = guard_candidates_watching(&g, c);
        assert_eq!(w.threats, vec![Cell::new(2, 0)]);
        assert!(w.possible.is_empty());
        assert!(!w.is_safe());
    }

    #[test]
    fn rotations() {
        let c = Cell::new(1, 1);
        assert_eq!(rotation(c, Orientation::N, Cell::new(1, 2)), (Rotation::Forward, Orientation::N));
        assert_eq!(rotation(c, Orientation::N, Cell::new(2, 1)), (Rotation::Clockwise, Orientation::E));
        assert_eq!(rotation(c, Orientation::N, Cell::new(0, 1)), (Rotation::Anticlockwise, Orientation::W));
        assert_eq!(
            rotation(c, Orientation::N, Cell::new(1, 0)),
            (Rotation::DoubleClockwise, Orientation::S)
        );
        let g = KnowledgeGrid::new(3, 3).unwrap();
        assert_eq!(step_cost(&g, c, Orientation::N, Cell::new(1, 0), false).0, 3);
    }
}
