//! The referee protocol and a local simulation of it.
//!
//! [`LocalReferee`] plays the game against a fully known [`World`]; the agent
//! only ever talks to it through the [`Referee`] trait.

use crate::error::{Error, Result};
use crate::mapgen;
use crate::types::{Cell, CellValue, Orientation};
use crate::{mat, SetMinMax};
use itertools::Itertools;
use proconio::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Cells the agent sees ahead of it.
pub const VISION_RANGE: i32 = 3;
pub const HEARING_RADIUS: i32 = 2;
pub const HEARING_CAP: u32 = 5;
pub const GUARD_RANGE: i32 = 2;
pub const ACTION_PENALTY: u32 = 1;
pub const SEEN_PENALTY: u32 = 5;

/// Answer to every action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// `"OK"`, or a message starting with `"Err"`.
    pub status: String,
    pub phase: u8,
    pub position: Cell,
    pub orientation: Orientation,
    pub vision: Vec<(Cell, CellValue)>,
    pub hear: u32,
    pub penalties: u32,
}

impl Status {
    pub fn is_err(&self) -> bool {
        self.status.starts_with("Err")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialStatus {
    pub width: i32,
    pub height: i32,
    pub guard_count: usize,
    pub civilian_count: usize,
    pub status: Status,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: u8,
    pub success: bool,
    pub penalties: u32,
    pub message: String,
    /// The true map, revealed once exploration is over.
    pub map: Option<Vec<(Cell, CellValue)>>,
}

pub trait Referee {
    fn start_phase(&mut self, phase: u8) -> Result<InitialStatus>;
    fn move_forward(&mut self) -> Result<Status>;
    fn turn_clockwise(&mut self) -> Result<Status>;
    fn turn_anticlockwise(&mut self) -> Result<Status>;
    /// Picks up the weapon or the disguise lying on the agent's cell.
    fn take_item(&mut self) -> Result<Status>;
    fn wear_disguise(&mut self) -> Result<Status>;
    fn act_on_target(&mut self) -> Result<Status>;
    /// Hands in the explored map. Returns whether it matches the world.
    fn submit_map(&mut self, map: &[(Cell, CellValue)]) -> Result<bool>;
    fn end_phase(&mut self) -> Result<PhaseSummary>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub width: i32,
    pub height: i32,
    pub start: Cell,
    pub orientation: Orientation,
    // cells[x][y]
    pub cells: Vec<Vec<CellValue>>,
}

impl World {
    pub fn empty(width: i32, height: i32, start: Cell, orientation: Orientation) -> Self {
        Self {
            width,
            height,
            start,
            orientation,
            cells: mat![CellValue::Empty; width as usize; height as usize],
        }
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    pub fn get(&self, cell: Cell) -> Option<CellValue> {
        self.in_bounds(cell)
            .then(|| self.cells[cell.x as usize][cell.y as usize])
    }

    pub fn set(&mut self, cell: Cell, value: CellValue) {
        self.cells[cell.x as usize][cell.y as usize] = value;
    }

    pub fn all_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.width).flat_map(move |x| (0..self.height).map(move |y| Cell::new(x, y)))
    }

    pub fn count(&self, pred: impl Fn(CellValue) -> bool) -> usize {
        self.cells.iter().flatten().filter(|&&v| pred(v)).count()
    }

    pub fn guard_count(&self) -> usize {
        self.count(|v| matches!(v, CellValue::Guard(_)))
    }

    pub fn civilian_count(&self) -> usize {
        self.count(|v| matches!(v, CellValue::Civilian(_)))
    }

    pub fn find(&self, value: CellValue) -> Option<Cell> {
        self.all_cells().find(|&c| self.get(c) == Some(value))
    }

    pub fn to_map(&self) -> Vec<(Cell, CellValue)> {
        self.all_cells()
            .filter_map(|c| Some((c, self.get(c)?)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidWorld(msg));
        if self.width <= 0 || self.height <= 0 {
            return bad(format!("size {}x{}", self.width, self.height));
        }
        if self.cells.len() != self.width as usize
            || self.cells.iter().any(|col| col.len() != self.height as usize)
        {
            return bad("cells do not match the declared size".to_owned());
        }
        if self.get(self.start) != Some(CellValue::Empty) {
            return bad(format!("start {} is not an empty cell", self.start));
        }
        for item in [CellValue::Target, CellValue::Disguise, CellValue::Weapon] {
            let n = self.count(|v| v == item);
            if n != 1 {
                return bad(format!("{} copies of {:?}", n, item));
            }
        }
        Ok(())
    }

    /// Guards whose line of sight reaches `cell`.
    pub fn watchers(&self, cell: Cell) -> usize {
        let mut n = 0;
        for g in self.all_cells() {
            let Some(CellValue::Guard(f)) = self.get(g) else {
                continue;
            };
            for d in 1..=GUARD_RANGE {
                let c = g.step(f, d);
                if c == cell {
                    n += 1;
                    break;
                }
                if self.get(c) != Some(CellValue::Empty) {
                    break;
                }
            }
        }
        n
    }

    pub fn vision(&self, position: Cell, orientation: Orientation) -> Vec<(Cell, CellValue)> {
        let mut ret = vec![];
        for d in 1..=VISION_RANGE {
            let c = position.step(orientation, d);
            let Some(v) = self.get(c) else {
                break;
            };
            ret.push((c, v));
            if v.blocks_sight() {
                break;
            }
        }
        ret
    }

    /// Guards and civilians within Chebyshev distance `HEARING_RADIUS`,
    /// including one standing on `position` itself, capped at `HEARING_CAP`.
    pub fn hear(&self, position: Cell) -> u32 {
        let mut n = 0;
        for x in position.x - HEARING_RADIUS..=position.x + HEARING_RADIUS {
            for y in position.y - HEARING_RADIUS..=position.y + HEARING_RADIUS {
                let c = Cell::new(x, y);
                if self.get(c).is_some_and(|v| v.agent().is_some()) {
                    n += 1;
                }
            }
        }
        n.min(HEARING_CAP)
    }

    pub fn render_text(&self) -> String {
        (0..self.height)
            .rev()
            .map(|y| {
                (0..self.width)
                    .map(|x| format!("{:<3}", self.cells[x as usize][y as usize].to_string()))
                    .join("")
            })
            .join("\n")
    }
}

/// Simulates the game for a known world.
pub struct LocalReferee {
    world: World,
    phase: u8,
    position: Cell,
    orientation: Orientation,
    penalties: u32,
    actions: usize,
    has_weapon: bool,
    has_disguise: bool,
    disguised: bool,
    target_down: bool,
    map_ok: Option<bool>,
}

impl LocalReferee {
    pub fn new(world: World) -> Result<Self> {
        world.validate()?;
        Ok(Self {
            phase: 0,
            position: world.start,
            orientation: world.orientation,
            world,
            penalties: 0,
            actions: 0,
            has_weapon: false,
            has_disguise: false,
            disguised: false,
            target_down: false,
            map_ok: None,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn penalties(&self) -> u32 {
        self.penalties
    }

    pub fn actions(&self) -> usize {
        self.actions
    }

    fn status(&self, status: &str) -> Status {
        Status {
            status: status.to_owned(),
            phase: self.phase,
            position: self.position,
            orientation: self.orientation,
            vision: self.world.vision(self.position, self.orientation),
            hear: self.world.hear(self.position),
            penalties: self.penalties,
        }
    }

    /// Charges an action and the guards looking at the agent afterwards.
    fn charge(&mut self) {
        self.actions += 1;
        self.penalties += ACTION_PENALTY;
        if !self.disguised {
            self.penalties += SEEN_PENALTY * self.world.watchers(self.position) as u32;
        }
    }

    fn phase2_only(&self, action: &str) -> Option<Status> {
        (self.phase != 2).then(|| self.status(&format!("Err: {} is not allowed in phase {}", action, self.phase)))
    }
}

impl Referee for LocalReferee {
    fn start_phase(&mut self, phase: u8) -> Result<InitialStatus> {
        self.phase = phase;
        self.position = self.world.start;
        self.orientation = self.world.orientation;
        self.penalties = 0;
        self.actions = 0;
        self.has_weapon = false;
        self.has_disguise = false;
        self.disguised = false;
        self.target_down = false;
        self.map_ok = None;
        info!(phase, width = self.world.width, height = self.world.height, "phase started");
        Ok(InitialStatus {
            width: self.world.width,
            height: self.world.height,
            guard_count: self.world.guard_count(),
            civilian_count: self.world.civilian_count(),
            status: self.status("OK"),
        })
    }

    fn move_forward(&mut self) -> Result<Status> {
        let next = self.position.step(self.orientation, 1);
        if self.world.get(next).is_none_or(|v| v.is_obstacle()) {
            self.charge();
            return Ok(self.status("Err: invalid move"));
        }
        self.position = next;
        self.charge();
        debug!(position = %self.position, penalties = self.penalties, "moved");
        Ok(self.status("OK"))
    }

    fn turn_clockwise(&mut self) -> Result<Status> {
        self.orientation = self.orientation.clockwise();
        self.charge();
        Ok(self.status("OK"))
    }

    fn turn_anticlockwise(&mut self) -> Result<Status> {
        self.orientation = self.orientation.anticlockwise();
        self.charge();
        Ok(self.status("OK"))
    }

    fn take_item(&mut self) -> Result<Status> {
        if let Some(err) = self.phase2_only("take_item") {
            return Ok(err);
        }
        let picked = match self.world.get(self.position) {
            Some(CellValue::Weapon) => self.has_weapon.setmax(true),
            Some(CellValue::Disguise) => self.has_disguise.setmax(true),
            _ => false,
        };
        self.charge();
        if !picked {
            return Ok(self.status("Err: nothing to take"));
        }
        Ok(self.status("OK"))
    }

    fn wear_disguise(&mut self) -> Result<Status> {
        if let Some(err) = self.phase2_only("wear_disguise") {
            return Ok(err);
        }
        if !self.has_disguise {
            self.charge();
            return Ok(self.status("Err: no disguise"));
        }
        self.disguised = true;
        self.charge();
        Ok(self.status("OK"))
    }

    fn act_on_target(&mut self) -> Result<Status> {
        if let Some(err) = self.phase2_only("act_on_target") {
            return Ok(err);
        }
        let ok = self.has_weapon && self.world.get(self.position) == Some(CellValue::Target);
        self.charge();
        if !ok {
            return Ok(self.status("Err: no target or no weapon"));
        }
        self.target_down = true;
        Ok(self.status("OK"))
    }

    fn submit_map(&mut self, map: &[(Cell, CellValue)]) -> Result<bool> {
        let mut expected = self.world.to_map();
        let mut got = map.to_vec();
        expected.sort_by_key(|&(c, _)| c);
        got.sort_by_key(|&(c, _)| c);
        let ok = expected == got;
        if !ok {
            let wrong = expected
                .iter()
                .filter(|e| !got.contains(e))
                .map(|(c, v)| format!("{}={}", c, v))
                .join(" ");
            debug!(%wrong, "submitted map differs");
        }
        self.map_ok = Some(ok);
        Ok(ok)
    }

    fn end_phase(&mut self) -> Result<PhaseSummary> {
        let (success, message, map) = match self.phase {
            1 => {
                let ok = self.map_ok == Some(true);
                let msg = match self.map_ok {
                    Some(true) => "map correct",
                    Some(false) => "map incorrect",
                    None => "no map submitted",
                };
                (ok, msg.to_owned(), Some(self.world.to_map()))
            }
            _ => {
                let home = self.position == self.world.start;
                let ok = self.target_down && home;
                let msg = format!("target eliminated: {}, back at start: {}", self.target_down, home);
                (ok, msg, None)
            }
        };
        info!(phase = self.phase, success, penalties = self.penalties, actions = self.actions, "phase ended");
        Ok(PhaseSummary {
            phase: self.phase,
            success,
            penalties: self.penalties,
            message,
            map,
        })
    }
}

/// Reads a world from stdin: either a JSON [`World`], or a line
/// `random <width> <height> <guards> <civilians> <seed>`.
pub fn get_referee_from_stdin() -> Result<Box<dyn Referee>> {
    use std::io::Read;
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(Box::new(parse_world(&input).and_then(LocalReferee::new)?))
}

pub fn parse_world(input: &str) -> Result<World> {
    let s = input.trim_start();
    if s.starts_with('{') {
        return Ok(serde_json::from_str(s)?);
    }
    use proconio::source::once::OnceSource;
    let mut src = OnceSource::from(s);
    input! { from &mut src, mode: String }
    match mode.as_str() {
        "random" => {
            input! { from &mut src,
                width: i32,
                height: i32,
                guards: usize,
                civilians: usize,
                seed: u64,
            }
            mapgen::random_world(width, height, guards, civilians, seed)
        }
        other => Err(Error::InvalidWorld(format!("unknown mode {:?}", other))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 4x3, guard at (3,2) looking west, civilian at (0,2) looking south.
    pub(crate) fn small_world() -> World {
        let mut w = World::empty(4, 3, Cell::new(0, 0), Orientation::N);
        w.set(Cell::new(3, 2), CellValue::Guard(Orientation::W));
        w.set(Cell::new(0, 2), CellValue::Civilian(Orientation::S));
        w.set(Cell::new(2, 0), CellValue::Wall);
        w.set(Cell::new(3, 0), CellValue::Target);
        w.set(Cell::new(1, 0), CellValue::Weapon);
        w.set(Cell::new(0, 1), CellValue::Disguise);
        w
    }

    #[test]
    fn vision_stops_at_first_object() {
        let w = small_world();
        assert_eq!(
            w.vision(Cell::new(0, 0), Orientation::N),
            vec![(Cell::new(0, 1), CellValue::Disguise)]
        );
        assert_eq!(
            w.vision(Cell::new(1, 1), Orientation::E),
            vec![(Cell::new(2, 1), CellValue::Empty), (Cell::new(3, 1), CellValue::Empty)]
        );
        assert_eq!(w.vision(Cell::new(3, 1), Orientation::E), vec![]);
    }

    #[test]
    fn hearing_counts_agents_nearby() {
        let w = small_world();
        assert_eq!(w.hear(Cell::new(0, 0)), 1);
        assert_eq!(w.hear(Cell::new(1, 1)), 2);
        assert_eq!(w.hear(Cell::new(3, 1)), 1);
        // the cell under the listener counts too
        assert_eq!(w.hear(Cell::new(0, 2)), 1);
        assert_eq!(w.hear(Cell::new(3, 2)), 1);
    }

    #[test]
    fn guards_see_two_cells_unless_blocked() {
        let w = small_world();
        assert_eq!(w.watchers(Cell::new(2, 2)), 1);
        assert_eq!(w.watchers(Cell::new(1, 2)), 1);
        assert_eq!(w.watchers(Cell::new(0, 2)), 0);
        let mut blocked = w.clone();
        blocked.set(Cell::new(2, 2), CellValue::Wall);
        assert_eq!(blocked.watchers(Cell::new(1, 2)), 0);
    }

    #[test]
    fn local_referee_charges_moves_and_exposure() {
        let mut r = LocalReferee::new(small_world()).unwrap();
        let init = r.start_phase(1).unwrap();
        assert_eq!((init.width, init.height, init.guard_count, init.civilian_count), (4, 3, 1, 1));
        assert_eq!(init.status.hear, 1);
        r.turn_clockwise().unwrap();
        let s = r.move_forward().unwrap();
        assert_eq!((s.position, s.penalties), (Cell::new(1, 0), 2));
        let s = r.move_forward().unwrap();
        assert!(s.is_err());
        assert_eq!((s.position, s.penalties), (Cell::new(1, 0), 3));
        r.turn_anticlockwise().unwrap();
        r.move_forward().unwrap();
        let s = r.move_forward().unwrap();
        // (1,2) is watched by the guard at (3,2)
        assert_eq!(s.position, Cell::new(1, 2));
        assert_eq!(s.penalties, 3 + 1 + 1 + 1 + SEEN_PENALTY);
        assert!(r.take_item().unwrap().is_err());
    }

    #[test]
    fn phase_two_objectives() {
        let mut r = LocalReferee::new(small_world()).unwrap();
        r.start_phase(2).unwrap();
        assert!(r.act_on_target().unwrap().is_err());
        r.turn_clockwise().unwrap();
        r.move_forward().unwrap();
        assert!(!r.take_item().unwrap().is_err());
        assert!(r.wear_disguise().unwrap().is_err());
        let summary = r.end_phase().unwrap();
        assert!(!summary.success);
        assert!(summary.map.is_none());
    }

    #[test]
    fn phase_one_map_check() {
        let world = small_world();
        let mut r = LocalReferee::new(world.clone()).unwrap();
        r.start_phase(1).unwrap();
        let mut map = world.to_map();
        assert!(r.submit_map(&map).unwrap());
        map[0].1 = CellValue::Wall;
        assert!(!r.submit_map(&map).unwrap());
        assert!(r.submit_map(&world.to_map()).unwrap());
        let summary = r.end_phase().unwrap();
        assert!(summary.success);
        assert_eq!(summary.map.unwrap().len(), 12);
    }

    #[test]
    fn parses_world_descriptions() {
        let world = small_world();
        let json = serde_json::to_string(&world).unwrap();
        assert_eq!(parse_world(&json).unwrap(), world);
        let w = parse_world("random 6 5 2 1 42\n").unwrap();
        assert_eq!((w.width, w.height, w.guard_count(), w.civilian_count()), (6, 5, 2, 1));
        assert!(matches!(parse_world("remote foo"), Err(Error::InvalidWorld(_))));
        let mut bad = small_world();
        bad.set(Cell::new(0, 0), CellValue::Wall);
        assert!(LocalReferee::new(bad).is_err());
    }
}
