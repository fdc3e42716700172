//! Arena layout run once before the listener accepts traffic.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Point;

use crate::config::ServerConfig;
use crate::consumables;
use crate::world::WorldState;

/// Builds the static arena: obstacles, corridors and the initial food.
pub trait LayoutGenerator {
    /// Returns the number of consumables seeded.
    fn generate(&mut self, world: &mut WorldState, now: u64) -> usize;
}

/// Random horizontal and vertical wall runs with a clear cross through the
/// centre, then an initial scatter of food.
pub struct RoomLayout {
    rng: StdRng,
    wall_runs: usize,
    initial_consumables: usize,
    config: ServerConfig,
}

impl RoomLayout {
    pub fn new(config: ServerConfig, wall_runs: usize, initial_consumables: usize) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            wall_runs,
            initial_consumables,
            config,
        }
    }

    fn place_run(&mut self, world: &mut WorldState) -> usize {
        let (columns, rows) = (world.columns(), world.rows());
        if columns == 0 || rows == 0 {
            return 0;
        }
        let length = self.rng.gen_range(3..=8);
        let column = self.rng.gen_range(0..columns);
        let row = self.rng.gen_range(0..rows);
        let horizontal = self.rng.gen_bool(0.5);

        let cells: Vec<Point> = (0..length)
            .map(|step| {
                if horizontal {
                    world.cell(column + step, row)
                } else {
                    world.cell(column, row + step)
                }
            })
            .collect();
        cells
            .into_iter()
            .filter(|&cell| world.add_obstacle(cell))
            .count()
    }
}

impl LayoutGenerator for RoomLayout {
    fn generate(&mut self, world: &mut WorldState, now: u64) -> usize {
        let placed: usize = (0..self.wall_runs).map(|_| self.place_run(world)).sum();

        let centre_column = world.columns() / 2;
        let centre_row = world.rows() / 2;
        let cleared = world.clear_corridor(
            world.cell(0, centre_row),
            world.cell(world.columns() - 1, centre_row),
            1,
        ) + world.clear_corridor(
            world.cell(centre_column, 0),
            world.cell(centre_column, world.rows() - 1),
            1,
        );
        debug!("Layout placed {} wall cells, cleared {}", placed, cleared);

        let count = self.initial_consumables.min(self.config.max_consumables);
        consumables::spawn_batch(world, &mut self.rng, count, now, &self.config)
    }
}
