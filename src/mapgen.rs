//! # Random World Generation
//!
//! Generates worlds for the local referee. Walls are scattered with a fixed
//! density, then the three objects, the guards and the civilians are dropped on
//! distinct empty cells. A world is only accepted when it can be fully mapped:
//! every cell the agent can walk on is reachable from the start, and every
//! other cell is adjacent to one of them, so it can be looked at.

use crate::error::{Error, Result};
use crate::referee::World;
use crate::types::{Cell, CellValue, Orientation};
use itertools::Itertools;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use std::collections::VecDeque;

/// Fraction of cells turned into walls.
pub const WALL_DENSITY: f64 = 0.15;
const MAX_ATTEMPTS: usize = 1000;

/// Generates a random world.
///
/// # Arguments
/// * `width`, `height` - Grid size.
/// * `guards`, `civilians` - Number of agents to place.
/// * `seed` - Seed of the random number generator, for reproducibility.
///
/// # Errors
/// `Error::InvalidWorld` if the grid is too small for the requested content,
/// or if no fully explorable layout was found.
pub fn random_world(width: i32, height: i32, guards: usize, civilians: usize, seed: u64) -> Result<World> {
    if width <= 0 || height <= 0 {
        return Err(Error::InvalidWorld(format!("size {}x{}", width, height)));
    }
    let needed = guards + civilians + 4;
    if needed > (width * height) as usize {
        return Err(Error::InvalidWorld(format!(
            "{}x{} cannot hold {} guards and {} civilians",
            width, height, guards, civilians
        )));
    }
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    for _ in 0..MAX_ATTEMPTS {
        let world = generate(width, height, guards, civilians, &mut rng);
        if is_explorable(&world) {
            return Ok(world);
        }
    }
    Err(Error::InvalidWorld(format!(
        "no explorable {}x{} world after {} attempts",
        width, height, MAX_ATTEMPTS
    )))
}

fn generate<R: Rng>(width: i32, height: i32, guards: usize, civilians: usize, rng: &mut R) -> World {
    let start = Cell::new(0, 0);
    let orientation = *Orientation::ALL.choose(rng).unwrap_or(&Orientation::N);
    let mut world = World::empty(width, height, start, orientation);

    // Shuffle all cells except the start, then hand them out in order.
    let mut free = world.all_cells().filter(|&c| c != start).collect_vec();
    free.shuffle(rng);
    let mut free = free.into_iter();

    let mut content = vec![CellValue::Target, CellValue::Disguise, CellValue::Weapon];
    for _ in 0..guards {
        content.push(CellValue::Guard(*Orientation::ALL.choose(rng).unwrap_or(&Orientation::N)));
    }
    for _ in 0..civilians {
        content.push(CellValue::Civilian(*Orientation::ALL.choose(rng).unwrap_or(&Orientation::N)));
    }
    for (v, c) in content.into_iter().zip(free.by_ref()) {
        world.set(c, v);
    }
    for c in free {
        if rng.random_bool(WALL_DENSITY) {
            world.set(c, CellValue::Wall);
        }
    }
    world
}

/// Whether a full exploration of `world` can see every cell.
pub fn is_explorable(world: &World) -> bool {
    let w = world.width as usize;
    let idx = |c: Cell| c.x as usize * world.height as usize + c.y as usize;
    let mut reached = vec![false; w * world.height as usize];
    let mut queue = VecDeque::from([world.start]);
    reached[idx(world.start)] = true;
    while let Some(c) = queue.pop_front() {
        for n in c.neighbors() {
            if world.get(n).is_some_and(|v| !v.is_obstacle()) && !reached[idx(n)] {
                reached[idx(n)] = true;
                queue.push_back(n);
            }
        }
    }
    world.all_cells().all(|c| {
        reached[idx(c)]
            || c
                .neighbors()
                .into_iter()
                .any(|n| world.in_bounds(n) && reached[idx(n)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_worlds_are_valid() {
        for seed in 0..20 {
            let w = random_world(7, 5, 3, 2, seed).unwrap();
            w.validate().unwrap();
            assert_eq!(w.guard_count(), 3);
            assert_eq!(w.civilian_count(), 2);
            assert!(is_explorable(&w));
        }
    }

    #[test]
    fn same_seed_same_world() {
        assert_eq!(random_world(6, 6, 2, 2, 7).unwrap(), random_world(6, 6, 2, 2, 7).unwrap());
    }

    #[test]
    fn too_small_is_rejected() {
        assert!(random_world(2, 2, 1, 0, 0).is_err());
        assert!(random_world(0, 3, 0, 0, 0).is_err());
    }

    #[test]
    fn walled_in_start_is_not_explorable() {
        let mut w = World::empty(3, 3, Cell::new(0, 0), Orientation::N);
        w.set(Cell::new(1, 0), CellValue::Wall);
        w.set(Cell::new(0, 1), CellValue::Wall);
        assert!(!is_explorable(&w));
    }
}
