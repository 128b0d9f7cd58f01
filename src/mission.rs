//! # Mission driver
//!
//! Phase 1 maps the whole grid by repeatedly walking to the cheapest cell that
//! is not known yet. Phase 2 prices a fixed set of objective orderings on the
//! mapped grid, runs the cheapest one and walks back to the start.

use crate::config::AgentConfig;
use crate::cost::{exposure_count, EXPOSURE_PENALTY};
use crate::error::Result;
use crate::explorer::{Explorer, ExplorerOptions, MoveOutcome};
use crate::grid::{Knowledge, KnowledgeGrid};
use crate::planner::{best_path, PlannedPath};
use crate::referee::{PhaseSummary, Referee, ACTION_PENALTY};
use crate::types::{Cell, CellValue, Orientation};
use itertools::Itertools;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Replans allowed for a single objective in phase 2.
const MAX_REPLANS: usize = 16;

#[derive(Clone, Debug)]
pub struct ExplorationReport {
    pub grid: KnowledgeGrid,
    pub penalties: u32,
    pub moves: usize,
    pub trail: Vec<Cell>,
    pub oracle_queries: usize,
    /// Cells settled by the oracle without ever being seen.
    pub resolved: usize,
    pub map_ok: bool,
    pub summary: PhaseSummary,
}

/// Runs phase 1 and submits the map.
pub fn explore_map(referee: &mut dyn Referee, config: &AgentConfig) -> Result<ExplorationReport> {
    let init = referee.start_phase(1)?;
    let grid = KnowledgeGrid::new(init.width, init.height)?;
    let oracle = config.use_sat.then(|| config.oracle.build());
    let options = ExplorerOptions {
        lookahead_sat: config.lookahead_sat,
        look_around: true,
        naive_clause_limit: config.naive_clause_limit,
    };
    let mut ex = Explorer::new(referee, &init, grid, oracle, options)?;

    let max_rounds = (init.width * init.height) as usize * 4;
    let mut unreachable = FxHashSet::default();
    for round in 0..max_rounds {
        let Some((goal, plan)) = next_frontier(&ex, &mut unreachable)? else {
            break;
        };
        debug!(round, %goal, penalty = plan.penalty, "exploring");
        let outcome = ex.move_to_goal(goal, &plan.cells)?;
        if outcome != MoveOutcome::GoalReached {
            debug!(%goal, ?outcome, "replanning");
        }
    }
    let resolved = ex.resolve_unknown()?;
    let penalties = ex.penalties();
    let moves = ex.moves();
    let trail = ex.trail().to_vec();
    let oracle_queries = ex.oracle_queries();
    let grid = ex.into_grid();
    let left = grid.unknown_cells().len();
    if left > 0 {
        warn!(left, "cells still unknown, submitted as empty");
    }
    let map_ok = referee.submit_map(&grid.to_submission())?;
    let summary = referee.end_phase()?;
    info!(penalties, moves, map_ok, resolved, oracle_queries, "exploration done");
    Ok(ExplorationReport {
        grid,
        penalties,
        moves,
        trail,
        oracle_queries,
        resolved,
        map_ok,
        summary,
    })
}

/// Path to a spot from which `cell` can be looked at: the cell itself, or for
/// a proven guard, the cheapest of its walkable neighbours.
fn plan_towards(grid: &KnowledgeGrid, cell: Cell, start: Cell, orientation: Orientation) -> Result<Option<PlannedPath>> {
    if grid.is_traversable(cell) {
        return best_path(grid, cell, start, orientation, false);
    }
    let mut best: Option<PlannedPath> = None;
    for n in cell.neighbors() {
        if !grid.is_traversable(n) {
            continue;
        }
        if let Some(plan) = best_path(grid, n, start, orientation, false)? {
            if best.as_ref().is_none_or(|b| plan.penalty < b.penalty) {
                best = Some(plan);
            }
        }
    }
    Ok(best)
}

/// The cheapest cell to look at next, with the path to it. Cells found
/// unreachable are remembered: knowledge only ever removes edges.
fn next_frontier(ex: &Explorer<'_>, unreachable: &mut FxHashSet<Cell>) -> Result<Option<(Cell, PlannedPath)>> {
    let grid = ex.grid();
    let mut best: Option<(u32, Cell, PlannedPath)> = None;
    for c in grid.unknown_cells() {
        if unreachable.contains(&c) {
            continue;
        }
        let Some(plan) = plan_towards(grid, c, ex.position(), ex.orientation())? else {
            unreachable.insert(c);
            continue;
        };
        if best.as_ref().is_none_or(|(p, b, _)| (plan.penalty, c) < (*p, *b)) {
            best = Some((plan.penalty, c, plan));
        }
    }
    Ok(best.map(|(_, c, plan)| (c, plan)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Objective {
    Weapon,
    Disguise,
    Target,
    Start,
}

/// Orderings tried in phase 2.
pub const STRATEGIES: [&[Objective]; 3] = [
    &[Objective::Weapon, Objective::Disguise, Objective::Target, Objective::Start],
    &[Objective::Disguise, Objective::Weapon, Objective::Target, Objective::Start],
    &[Objective::Weapon, Objective::Target, Objective::Start],
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyPlan {
    pub objectives: Vec<Objective>,
    pub legs: Vec<PlannedPath>,
    /// Estimated penalty, moves and item actions included.
    pub cost: u32,
}

fn locate(grid: &KnowledgeGrid, objective: Objective, start: Cell) -> Option<Cell> {
    match objective {
        Objective::Weapon => grid.find(CellValue::Weapon),
        Objective::Disguise => grid.find(CellValue::Disguise),
        Objective::Target => grid.find(CellValue::Target),
        Objective::Start => Some(start),
    }
}

/// Referee actions performed once `objective` is reached.
fn actions_at(objective: Objective) -> u32 {
    match objective {
        Objective::Weapon | Objective::Target => 1,
        Objective::Disguise => 2,
        Objective::Start => 0,
    }
}

/// Prices `objectives` in order from `start`. `None` when one of them cannot
/// be located or reached.
pub fn plan_strategy(
    grid: &KnowledgeGrid,
    objectives: &[Objective],
    start: Cell,
    orientation: Orientation,
) -> Result<Option<StrategyPlan>> {
    let mut position = start;
    let mut o = orientation;
    let mut disguised = false;
    let mut legs = vec![];
    let mut cost = 0;
    for &objective in objectives {
        let Some(goal) = locate(grid, objective, start) else {
            return Ok(None);
        };
        let Some(leg) = best_path(grid, goal, position, o, disguised)? else {
            return Ok(None);
        };
        cost += leg.penalty;
        let actions = actions_at(objective);
        cost += actions * ACTION_PENALTY;
        if objective == Objective::Disguise {
            // taking the suit is still seen, wearing it is not
            disguised = true;
            cost += EXPOSURE_PENALTY * exposure_count(grid, goal) as u32;
        } else if !disguised {
            cost += actions * EXPOSURE_PENALTY * exposure_count(grid, goal) as u32;
        }
        position = goal;
        o = leg.orientation;
        legs.push(leg);
    }
    Ok(Some(StrategyPlan {
        objectives: objectives.to_vec(),
        legs,
        cost,
    }))
}

/// The cheapest feasible strategy; earlier ones win ties.
pub fn choose_strategy(grid: &KnowledgeGrid, start: Cell, orientation: Orientation) -> Result<Option<StrategyPlan>> {
    let mut best: Option<StrategyPlan> = None;
    for objectives in STRATEGIES {
        let plan = plan_strategy(grid, objectives, start, orientation)?;
        match &plan {
            Some(p) => info!(objectives = ?p.objectives, cost = p.cost, "strategy"),
            None => info!(?objectives, "strategy infeasible"),
        }
        if let Some(p) = plan {
            if best.as_ref().is_none_or(|b| p.cost < b.cost) {
                best = Some(p);
            }
        }
    }
    Ok(best)
}

/// Builds the phase 2 grid from the map revealed by the referee, or from
/// what phase 1 learned.
pub fn grid_for_phase_two(exploration: &ExplorationReport) -> Result<KnowledgeGrid> {
    let Some(map) = &exploration.summary.map else {
        return Ok(exploration.grid.clone());
    };
    let mut grid = KnowledgeGrid::new(exploration.grid.width(), exploration.grid.height())?;
    for &(c, v) in map {
        grid.set(c, Knowledge::Known(v))?;
    }
    Ok(grid)
}

#[derive(Clone, Debug)]
pub struct ObjectiveReport {
    pub strategy: Option<StrategyPlan>,
    pub penalties: u32,
    pub moves: usize,
    pub trail: Vec<Cell>,
    pub summary: PhaseSummary,
}

/// Walks to `goal`, replanning whenever the path turns out to be blocked.
fn drive_to(ex: &mut Explorer<'_>, goal: Cell) -> Result<bool> {
    for _ in 0..MAX_REPLANS {
        if ex.position() == goal {
            return Ok(true);
        }
        let Some(plan) = best_path(ex.grid(), goal, ex.position(), ex.orientation(), ex.is_disguised())? else {
            return Ok(false);
        };
        if ex.move_to_goal(goal, &plan.cells)? == MoveOutcome::GoalReached {
            return Ok(true);
        }
    }
    Ok(ex.position() == goal)
}

/// Runs phase 2 on a mapped grid.
pub fn run_objectives(referee: &mut dyn Referee, grid: KnowledgeGrid) -> Result<ObjectiveReport> {
    let init = referee.start_phase(2)?;
    let start = init.status.position;
    let strategy = choose_strategy(&grid, start, init.status.orientation)?;
    let options = ExplorerOptions {
        lookahead_sat: false,
        look_around: false,
        ..ExplorerOptions::default()
    };
    let mut ex = Explorer::new(referee, &init, grid, None, options)?;
    match &strategy {
        Some(plan) => {
            info!(objectives = ?plan.objectives, cost = plan.cost, "running strategy");
            for &objective in &plan.objectives {
                let Some(goal) = locate(ex.grid(), objective, start) else {
                    break;
                };
                if !drive_to(&mut ex, goal)? {
                    warn!(?objective, %goal, "objective unreachable, giving up");
                    break;
                }
                match objective {
                    Objective::Weapon => ex.take_item()?,
                    Objective::Disguise => {
                        ex.take_item()?;
                        ex.wear_disguise()?;
                    }
                    Objective::Target => ex.act_on_target()?,
                    Objective::Start => {}
                }
                debug!(?objective, penalties = ex.penalties(), "objective done");
            }
        }
        None => warn!("no feasible strategy"),
    }
    let penalties = ex.penalties();
    let moves = ex.moves();
    let trail = ex.trail().to_vec();
    drop(ex);
    let summary = referee.end_phase()?;
    info!(penalties, moves, success = summary.success, "objectives done");
    Ok(ObjectiveReport {
        strategy,
        penalties,
        moves,
        trail,
        summary,
    })
}

#[derive(Clone, Debug)]
pub struct MissionReport {
    pub exploration: ExplorationReport,
    pub objectives: ObjectiveReport,
}

impl MissionReport {
    pub fn success(&self) -> bool {
        self.exploration.summary.success && self.objectives.summary.success
    }

    pub fn total_penalties(&self) -> u32 {
        self.exploration.penalties + self.objectives.penalties
    }

    pub fn summary_line(&self) -> String {
        [
            format!("phase1={}", self.exploration.summary.message),
            format!("phase2={}", self.objectives.summary.message),
            format!("moves={}", self.exploration.moves + self.objectives.moves),
        ]
        .iter()
        .join(" ")
    }
}

/// Both phases, back to back.
pub fn run_mission(referee: &mut dyn Referee, config: &AgentConfig) -> Result<MissionReport> {
    let exploration = explore_map(referee, config)?;
    let grid = grid_for_phase_two(&exploration)?;
    let objectives = run_objectives(referee, grid)?;
    Ok(MissionReport {
        exploration,
        objectives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapgen::random_world;
    use crate::oracle::OracleKind;
    use crate::referee::tests::small_world;
    use crate::referee::{LocalReferee, World};

    fn config(use_sat: bool) -> AgentConfig {
        AgentConfig {
            use_sat,
            oracle: OracleKind::Cadical,
            ..AgentConfig::default()
        }
    }

    fn known_grid(world: &World) -> KnowledgeGrid {
        let mut g = KnowledgeGrid::new(world.width, world.height).unwrap();
        for (c, v) in world.to_map() {
            g.set(c, Knowledge::Known(v)).unwrap();
        }
        g
    }

    /// Everything the grid claims holds in `world`.
    fn assert_sound(grid: &KnowledgeGrid, world: &World) {
        for (c, v) in world.to_map() {
            match grid.get(c) {
                Knowledge::Known(k) => assert_eq!(k, v, "cell {c}\n{}", grid.render_text()),
                Knowledge::KnownEmptyOfAgents => assert!(v.agent().is_none(), "cell {c}"),
                Knowledge::Unknown => {}
            }
            if grid.is_threat(c) {
                assert!(v.is_guard(), "cell {c}");
            }
        }
    }

    #[test]
    fn exploration_maps_small_world() {
        for sat in [false, true] {
            let world = small_world();
            let mut r = LocalReferee::new(world.clone()).unwrap();
            let report = explore_map(&mut r, &config(sat)).unwrap();
            assert!(report.map_ok, "{}", report.grid.render_text());
            assert!(report.summary.success);
            assert_eq!(report.grid.to_submission().len(), 12);
            assert_eq!(report.penalties, r.penalties());
        }
    }

    #[test]
    fn strategies_are_priced_on_known_map() {
        let world = small_world();
        let grid = known_grid(&world);
        let plan = choose_strategy(&grid, world.start, world.orientation).unwrap().unwrap();
        // the disguise detour never pays off here
        assert_eq!(plan.objectives, STRATEGIES[2].to_vec());
        assert_eq!(plan.legs.len(), 3);
        assert_eq!(plan.legs.last().unwrap().cells.last(), Some(&world.start));
        for objectives in STRATEGIES {
            let p = plan_strategy(&grid, objectives, world.start, world.orientation).unwrap().unwrap();
            assert!(p.cost >= plan.cost);
        }
    }

    #[test]
    fn unreachable_objective_makes_strategy_infeasible() {
        let mut world = small_world();
        // wall the target in
        world.set(Cell::new(3, 1), CellValue::Wall);
        let grid = known_grid(&world);
        assert_eq!(
            plan_strategy(&grid, STRATEGIES[2], world.start, world.orientation).unwrap(),
            None
        );
        assert_eq!(choose_strategy(&grid, world.start, world.orientation).unwrap(), None);
    }

    #[test]
    fn phase_two_completes_on_known_map() {
        let world = small_world();
        let mut r = LocalReferee::new(world.clone()).unwrap();
        let report = run_objectives(&mut r, known_grid(&world)).unwrap();
        assert!(report.summary.success, "{}", report.summary.message);
        assert_eq!(report.trail.last(), Some(&world.start));
        assert_eq!(report.penalties, r.penalties());
    }

    #[test]
    fn full_mission_on_random_worlds() {
        for seed in 0..4 {
            let world = random_world(6, 5, 2, 1, seed).unwrap();
            let mut r = LocalReferee::new(world.clone()).unwrap();
            let report = run_mission(&mut r, &config(seed % 2 == 0)).unwrap();
            assert_sound(&report.exploration.grid, &world);
            assert!(report.exploration.map_ok, "seed {seed}\n{}", report.exploration.grid.render_text());
            assert!(report.exploration.summary.success);
            assert!(report.exploration.summary.map.is_some());
            assert!(report.objectives.strategy.is_some(), "{}", world.render_text());
            assert!(report.objectives.summary.success, "{}", report.summary_line());
        }
    }

    #[test]
    fn exploration_among_civilians() {
        for seed in 0..6 {
            let world = random_world(6, 5, 1, 5, seed).unwrap();
            let mut r = LocalReferee::new(world.clone()).unwrap();
            let report = explore_map(&mut r, &config(true)).unwrap();
            assert_sound(&report.grid, &world);
            assert!(report.map_ok, "seed {seed}\n{}", report.grid.render_text());
            assert!(report.summary.success);
        }
    }
}
