//! # Path planner
//!
//! A* over cells. The search key is the cell alone; the orientation of the best
//! known arrival travels with each frontier entry, so turn costs are only
//! approximated. `g` is the accumulated [`step_cost`], the heuristic the
//! Euclidean distance to the goal.

use crate::cost::{guard_candidates_watching, step_cost};
use crate::error::{Error, Result};
use crate::grid::KnowledgeGrid;
use crate::types::{Cell, Orientation};
use core::cmp::Ordering;
use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BinaryHeap;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SuccessorPolicy {
    /// Any traversable neighbour, unknown cells included.
    Optimistic,
    /// Traversable neighbours no known guard is looking at.
    Safe,
}

#[derive(Debug)]
struct OpenNode {
    f: OrderedFloat<f64>,
    g: u32,
    cell: Cell,
    orientation: Orientation,
    tie: u64,
}

impl OpenNode {
    fn key(&self) -> (OrderedFloat<f64>, u64) {
        (self.f, self.tie)
    }
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap behave like a min-heap.
        other.key().cmp(&self.key())
    }
}

/// Neighbours of `cell` in N, E, S, W order.
pub fn successors(grid: &KnowledgeGrid, cell: Cell, policy: SuccessorPolicy) -> Vec<Cell> {
    cell.neighbors()
        .into_iter()
        .filter(|&n| grid.is_traversable(n))
        .filter(|&n| match policy {
            SuccessorPolicy::Optimistic => true,
            SuccessorPolicy::Safe => guard_candidates_watching(grid, n).is_safe(),
        })
        .collect()
}

/// Runs A* and returns the predecessor map once `goal` is popped.
pub fn search(
    grid: &KnowledgeGrid,
    start: Cell,
    orientation: Orientation,
    goal: Cell,
    policy: SuccessorPolicy,
    disguise: bool,
) -> Option<FxHashMap<Cell, Cell>> {
    if !grid.in_bounds(start) || !grid.in_bounds(goal) {
        return None;
    }
    let mut open = BinaryHeap::<OpenNode>::new();
    let mut tie: u64 = 0;
    let mut g_score = FxHashMap::<Cell, u32>::default();
    let mut came_from = FxHashMap::<Cell, Cell>::default();
    let mut closed = FxHashSet::<Cell>::default();

    g_score.insert(start, 0);
    open.push(OpenNode {
        f: OrderedFloat(start.euclidean(goal)),
        g: 0,
        cell: start,
        orientation,
        tie,
    });

    while let Some(node) = open.pop() {
        if node.cell == goal {
            return Some(came_from);
        }
        if !closed.insert(node.cell) {
            continue;
        }
        for n in successors(grid, node.cell, policy) {
            if closed.contains(&n) {
                continue;
            }
            let (cost, o) = step_cost(grid, node.cell, node.orientation, n, disguise);
            let g = node.g + cost;
            if g_score.get(&n).is_some_and(|&old| g >= old) {
                continue;
            }
            g_score.insert(n, g);
            came_from.insert(n, node.cell);
            tie += 1;
            open.push(OpenNode {
                f: OrderedFloat(g as f64 + n.euclidean(goal)),
                g,
                cell: n,
                orientation: o,
                tie,
            });
        }
    }
    None
}

/// Walks `came_from` back from `goal`. The result starts at `start`; it is
/// empty when `goal` was never reached.
pub fn reconstruct_path(came_from: &FxHashMap<Cell, Cell>, start: Cell, goal: Cell) -> Vec<Cell> {
    if goal != start && !came_from.contains_key(&goal) {
        return vec![];
    }
    let mut out = vec![goal];
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&prev) => {
                current = prev;
                out.push(current);
            }
            None => return vec![],
        }
    }
    out.reverse();
    out
}

pub fn plan(
    grid: &KnowledgeGrid,
    start: Cell,
    orientation: Orientation,
    goal: Cell,
    policy: SuccessorPolicy,
    disguise: bool,
) -> Option<Vec<Cell>> {
    let came_from = search(grid, start, orientation, goal, policy, disguise)?;
    let path = reconstruct_path(&came_from, start, goal);
    (!path.is_empty()).then_some(path)
}

/// Total penalty of following `path` (which starts at the agent's cell) and
/// the orientation at its end.
pub fn valuate_path(
    grid: &KnowledgeGrid,
    path: &[Cell],
    orientation: Orientation,
    disguise: bool,
) -> Result<(u32, Orientation)> {
    let mut penalty = 0;
    let mut o = orientation;
    for w in path.windows(2) {
        if !grid.is_traversable(w[1]) {
            return Err(Error::UntraversablePath(w[1]));
        }
        let (p, next) = step_cost(grid, w[0], o, w[1], disguise);
        penalty += p;
        o = next;
    }
    Ok((penalty, o))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedPath {
    pub cells: Vec<Cell>,
    pub penalty: u32,
    pub orientation: Orientation,
    pub policy: SuccessorPolicy,
}

/// Plans with both policies and keeps the cheaper path, the safe one on ties.
pub fn best_path(
    grid: &KnowledgeGrid,
    goal: Cell,
    start: Cell,
    orientation: Orientation,
    disguise: bool,
) -> Result<Option<PlannedPath>> {
    let mut best: Option<PlannedPath> = None;
    for policy in [SuccessorPolicy::Safe, SuccessorPolicy::Optimistic] {
        let Some(cells) = plan(grid, start, orientation, goal, policy, disguise) else {
            continue;
        };
        let (penalty, o) = valuate_path(grid, &cells, orientation, disguise)?;
        if best.as_ref().is_none_or(|b| penalty < b.penalty) {
            best = Some(PlannedPath {
                cells,
                penalty,
                orientation: o,
                policy,
            });
        }
    }
    if let Some(b) = &best {
        debug!(%start, %goal, penalty = b.penalty, policy = ?b.policy, "path");
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Knowledge;
    use crate::types::CellValue;
    use rand::prelude::*;
    use rand_chacha::ChaCha12Rng;
    use std::cmp::Reverse;

    #[test]
    fn open_field_turns_once() {
        let g = KnowledgeGrid::new(5, 5).unwrap();
        let path = plan(&g, Cell::new(0, 0), Orientation::N, Cell::new(3, 2), SuccessorPolicy::Optimistic, false)
            .unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path[0], Cell::new(0, 0));
        assert_eq!(path[5], Cell::new(3, 2));
        let (penalty, o) = valuate_path(&g, &path, Orientation::N, false).unwrap();
        assert_eq!(penalty, 6);
        assert_eq!(o, Orientation::E);
    }

    #[test]
    fn safe_policy_avoids_watched_cells() {
        let mut g = KnowledgeGrid::new(5, 5).unwrap();
        let guard = Cell::new(2, 4);
        g.set(guard, Knowledge::Known(CellValue::Guard(Orientation::S))).unwrap();
        for c in g.cells().collect::<Vec<_>>() {
            if c != guard {
                g.set(c, Knowledge::Known(CellValue::Empty)).unwrap();
            }
        }
        let (start, goal) = (Cell::new(0, 2), Cell::new(4, 2));
        let safe = plan(&g, start, Orientation::E, goal, SuccessorPolicy::Safe, false).unwrap();
        assert!(!safe.contains(&Cell::new(2, 2)) && !safe.contains(&Cell::new(2, 3)));
        let best = best_path(&g, goal, start, Orientation::E, false).unwrap().unwrap();
        assert_eq!(best.penalty, 9);
        assert_eq!(best.policy, SuccessorPolicy::Safe);
        let disguised = best_path(&g, goal, start, Orientation::E, true).unwrap().unwrap();
        assert_eq!(disguised.penalty, 4);
        assert_eq!(disguised.cells.len(), 5);
    }

    #[test]
    fn walled_off_goal_is_unreachable() {
        let mut g = KnowledgeGrid::new(3, 3).unwrap();
        for y in 0..3 {
            g.set(Cell::new(1, y), Knowledge::Known(CellValue::Wall)).unwrap();
        }
        let (start, goal) = (Cell::new(0, 0), Cell::new(2, 2));
        assert_eq!(plan(&g, start, Orientation::N, goal, SuccessorPolicy::Optimistic, false), None);
        assert_eq!(best_path(&g, goal, start, Orientation::N, false).unwrap(), None);
        assert!(reconstruct_path(&FxHashMap::default(), start, goal).is_empty());
        assert_eq!(
            plan(&g, start, Orientation::N, start, SuccessorPolicy::Safe, false),
            Some(vec![start])
        );
    }

    #[test]
    fn valuating_through_wall_fails() {
        let mut g = KnowledgeGrid::new(3, 1).unwrap();
        g.set(Cell::new(1, 0), Knowledge::Known(CellValue::Wall)).unwrap();
        let path = [Cell::new(0, 0), Cell::new(1, 0), Cell::new(2, 0)];
        assert!(matches!(
            valuate_path(&g, &path, Orientation::E, false),
            Err(Error::UntraversablePath(c)) if c == Cell::new(1, 0)
        ));
    }

    /// Dijkstra over (cell, orientation) with the same step costs.
    fn exact_cost(g: &KnowledgeGrid, start: Cell, o: Orientation, goal: Cell) -> Option<u32> {
        let mut dist = FxHashMap::<(Cell, Orientation), u32>::default();
        let mut heap = BinaryHeap::new();
        dist.insert((start, o), 0);
        heap.push(Reverse((0u32, start, o)));
        while let Some(Reverse((d, c, o))) = heap.pop() {
            if c == goal {
                return Some(d);
            }
            if dist.get(&(c, o)).is_some_and(|&best| d > best) {
                continue;
            }
            for n in successors(g, c, SuccessorPolicy::Optimistic) {
                let (cost, no) = step_cost(g, c, o, n, false);
                let nd = d + cost;
                if dist.get(&(n, no)).is_none_or(|&best| nd < best) {
                    dist.insert((n, no), nd);
                    heap.push(Reverse((nd, n, no)));
                }
            }
        }
        None
    }

    #[test]
    fn planner_cost_never_beats_exact_optimum() {
        let mut rng = ChaCha12Rng::seed_from_u64(0x5EED_0A57);
        for _ in 0..60 {
            let (w, h) = (rng.random_range(3..=7), rng.random_range(3..=7));
            let mut g = KnowledgeGrid::new(w, h).unwrap();
            let start = Cell::new(0, 0);
            let goal = Cell::new(w - 1, h - 1);
            for c in g.cells().collect::<Vec<_>>() {
                let v = if c == start || c == goal {
                    CellValue::Empty
                } else {
                    match rng.random_range(0..10) {
                        0 | 1 => CellValue::Wall,
                        2 => CellValue::Guard(Orientation::ALL[rng.random_range(0..4)]),
                        _ => CellValue::Empty,
                    }
                };
                g.set(c, Knowledge::Known(v)).unwrap();
            }
            let o = Orientation::ALL[rng.random_range(0..4)];
            let exact = exact_cost(&g, start, o, goal);
            let path = plan(&g, start, o, goal, SuccessorPolicy::Optimistic, false);
            assert_eq!(exact.is_some(), path.is_some());
            if let (Some(exact), Some(path)) = (exact, path) {
                let (penalty, _) = valuate_path(&g, &path, o, false).unwrap();
                assert!(penalty >= exact, "{penalty} < {exact}\n{}", g.render_text());
            }
        }
    }
}
