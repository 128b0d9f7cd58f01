use serde::{Deserialize, Serialize};
use std::fmt;

/// A grid coordinate. North is `y + 1`, East is `x + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The cell `k` steps away in direction `o`.
    pub fn step(self, o: Orientation, k: i32) -> Cell {
        let (dx, dy) = o.offset();
        Cell::new(self.x + dx * k, self.y + dy * k)
    }

    pub fn chebyshev(self, other: Cell) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn manhattan(self, other: Cell) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn euclidean(self, other: Cell) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Direction to take from `self` to get closer to `other` along an axis.
    ///
    /// When both coordinates differ the y axis wins.
    pub fn direction_to(self, other: Cell) -> Option<Orientation> {
        if self.y == other.y {
            if other.x < self.x {
                Some(Orientation::W)
            } else if other.x > self.x {
                Some(Orientation::E)
            } else {
                None
            }
        } else if other.y > self.y {
            Some(Orientation::N)
        } else {
            Some(Orientation::S)
        }
    }

    pub fn neighbors(self) -> [Cell; 4] {
        Orientation::ALL.map(|o| self.step(o, 1))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Orientation {
    N,
    E,
    S,
    W,
}

impl Orientation {
    /// Fixed order for determinism: N, E, S, W.
    pub const ALL: [Orientation; 4] = [Orientation::N, Orientation::E, Orientation::S, Orientation::W];

    pub fn index(self) -> usize {
        match self {
            Orientation::N => 0,
            Orientation::E => 1,
            Orientation::S => 2,
            Orientation::W => 3,
        }
    }

    pub fn clockwise(self) -> Self {
        Self::ALL[(self.index() + 1) % 4]
    }

    pub fn anticlockwise(self) -> Self {
        Self::ALL[(self.index() + 3) % 4]
    }

    pub fn opposite(self) -> Self {
        Self::ALL[(self.index() + 2) % 4]
    }

    pub fn offset(self) -> (i32, i32) {
        match self {
            Orientation::N => (0, 1),
            Orientation::E => (1, 0),
            Orientation::S => (0, -1),
            Orientation::W => (-1, 0),
        }
    }
}

/// The turn the agent has to make before stepping towards a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Forward,
    Clockwise,
    Anticlockwise,
    /// Two clockwise quarter turns.
    DoubleClockwise,
}

impl Rotation {
    pub fn between(from: Orientation, to: Orientation) -> Self {
        match (to.index() + 4 - from.index()) % 4 {
            0 => Rotation::Forward,
            1 => Rotation::Clockwise,
            2 => Rotation::DoubleClockwise,
            _ => Rotation::Anticlockwise,
        }
    }

    pub fn quarter_turns(self) -> u32 {
        match self {
            Rotation::Forward => 0,
            Rotation::Clockwise | Rotation::Anticlockwise => 1,
            Rotation::DoubleClockwise => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agent {
    Guard,
    Civilian,
}

/// What occupies a cell. Exactly one value holds per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Wall,
    Guard(Orientation),
    Civilian(Orientation),
    Target,
    Disguise,
    Weapon,
}

impl CellValue {
    pub const COUNT: usize = 13;

    pub const ALL: [CellValue; CellValue::COUNT] = [
        CellValue::Empty,
        CellValue::Wall,
        CellValue::Guard(Orientation::N),
        CellValue::Guard(Orientation::E),
        CellValue::Guard(Orientation::S),
        CellValue::Guard(Orientation::W),
        CellValue::Civilian(Orientation::N),
        CellValue::Civilian(Orientation::E),
        CellValue::Civilian(Orientation::S),
        CellValue::Civilian(Orientation::W),
        CellValue::Target,
        CellValue::Disguise,
        CellValue::Weapon,
    ];

    pub fn index(self) -> usize {
        match self {
            CellValue::Empty => 0,
            CellValue::Wall => 1,
            CellValue::Guard(o) => 2 + o.index(),
            CellValue::Civilian(o) => 6 + o.index(),
            CellValue::Target => 10,
            CellValue::Disguise => 11,
            CellValue::Weapon => 12,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn agent(self) -> Option<Agent> {
        match self {
            CellValue::Guard(_) => Some(Agent::Guard),
            CellValue::Civilian(_) => Some(Agent::Civilian),
            _ => None,
        }
    }

    pub fn is_guard(self) -> bool {
        matches!(self, CellValue::Guard(_))
    }

    /// Cells the agent can never step on.
    pub fn is_obstacle(self) -> bool {
        matches!(self, CellValue::Wall | CellValue::Guard(_))
    }

    /// Anything but an empty cell breaks a line of sight.
    pub fn blocks_sight(self) -> bool {
        self != CellValue::Empty
    }

    /// Facing of a guard or civilian.
    pub fn facing(self) -> Option<Orientation> {
        match self {
            CellValue::Guard(o) | CellValue::Civilian(o) => Some(o),
            _ => None,
        }
    }

    pub fn variants_of(agent: Agent) -> [CellValue; 4] {
        match agent {
            Agent::Guard => Orientation::ALL.map(CellValue::Guard),
            Agent::Civilian => Orientation::ALL.map(CellValue::Civilian),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = |o: Orientation| match o {
            Orientation::N => '^',
            Orientation::E => '>',
            Orientation::S => 'v',
            Orientation::W => '<',
        };
        match *self {
            CellValue::Empty => write!(f, "."),
            CellValue::Wall => write!(f, "#"),
            CellValue::Guard(o) => write!(f, "G{}", arrow(o)),
            CellValue::Civilian(o) => write!(f, "C{}", arrow(o)),
            CellValue::Target => write!(f, "T"),
            CellValue::Disguise => write!(f, "D"),
            CellValue::Weapon => write!(f, "W"),
        }
    }
}
