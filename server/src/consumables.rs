//! Consumable lifecycle: category draws, placement, aging and replenishment.

use log::debug;
use rand::Rng;
use shared::{Boost, BoostKind, Category, Point};

use crate::config::ServerConfig;
use crate::world::{Consumable, WorldState};

/// One row of the category table. Weights across the table sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryWeight {
    pub category: Category,
    pub boost: Option<Boost>,
    pub weight: f64,
    pub value: i64,
}

pub const CATEGORY_TABLE: [CategoryWeight; 6] = [
    CategoryWeight {
        category: Category::Plain,
        boost: None,
        weight: 0.70,
        value: 10,
    },
    CategoryWeight {
        category: Category::Bonus,
        boost: None,
        weight: 0.12,
        value: 25,
    },
    CategoryWeight {
        category: Category::Rare,
        boost: None,
        weight: 0.05,
        value: 50,
    },
    CategoryWeight {
        category: Category::PowerUp,
        boost: Some(Boost {
            kind: BoostKind::Speed,
            duration_ms: 5_000,
        }),
        weight: 0.05,
        value: 10,
    },
    CategoryWeight {
        category: Category::PowerUp,
        boost: Some(Boost {
            kind: BoostKind::Invincibility,
            duration_ms: 8_000,
        }),
        weight: 0.03,
        value: 10,
    },
    CategoryWeight {
        category: Category::PowerUp,
        boost: Some(Boost {
            kind: BoostKind::ScoreMultiplier,
            duration_ms: 10_000,
        }),
        weight: 0.05,
        value: 10,
    },
];

/// Picks the first row whose cumulative weight reaches `r` (in `[0, 1)`).
pub fn draw_category(r: f64) -> &'static CategoryWeight {
    let mut cumulative = 0.0;
    for entry in &CATEGORY_TABLE {
        cumulative += entry.weight;
        if cumulative >= r {
            return entry;
        }
    }
    // rounding can leave the total a hair under 1
    &CATEGORY_TABLE[CATEGORY_TABLE.len() - 1]
}

/// Table row for a boost requested by name.
pub fn entry_for_boost(kind: BoostKind) -> &'static CategoryWeight {
    CATEGORY_TABLE
        .iter()
        .find(|entry| entry.boost.map(|b| b.kind) == Some(kind))
        .unwrap_or(&CATEGORY_TABLE[0])
}

/// Table row for a category, falling back to plain food.
pub fn entry_for_category(category: Category) -> &'static CategoryWeight {
    CATEGORY_TABLE
        .iter()
        .find(|entry| entry.category == category)
        .unwrap_or(&CATEGORY_TABLE[0])
}

/// Lifetime drawn uniformly from `base * [1 - jitter, 1 + jitter]`.
pub fn random_lifetime<R: Rng>(rng: &mut R, config: &ServerConfig) -> u64 {
    let base = config.base_lifetime.as_millis() as f64;
    let jitter = config.lifetime_jitter.clamp(0.0, 1.0);
    if jitter == 0.0 {
        return base as u64;
    }
    rng.gen_range(base * (1.0 - jitter)..=base * (1.0 + jitter)) as u64
}

/// Accept/reject sampling over the grid, bounded by `max_placement_attempts`.
pub fn find_free_cell<R: Rng>(
    world: &WorldState,
    rng: &mut R,
    config: &ServerConfig,
) -> Option<Point> {
    let (columns, rows) = (world.columns(), world.rows());
    if columns <= 0 || rows <= 0 {
        return None;
    }
    for _ in 0..config.max_placement_attempts {
        let cell = world.cell(rng.gen_range(0..columns), rng.gen_range(0..rows));
        if world.is_cell_free(cell) {
            return Some(cell);
        }
    }
    None
}

/// Builds a consumable of the given table row at `position`.
pub fn make_consumable<R: Rng>(
    rng: &mut R,
    entry: &CategoryWeight,
    position: Point,
    now: u64,
    config: &ServerConfig,
) -> Consumable {
    let mut consumable = Consumable {
        position,
        value: entry.value,
        category: entry.category,
        boost: entry.boost,
        created_at: now,
        lifetime_ms: random_lifetime(rng, config),
        remaining_seconds: 0,
        blinking: false,
        safe_zone: false,
    };
    consumable.refresh(now, config.blink_threshold.as_millis() as u64);
    consumable
}

/// Places one randomly drawn consumable.
///
/// Returns false when the cap is reached or no free cell turned up within
/// the attempt budget. A failed search is logged and the spawn skipped;
/// the next tick tries again.
pub fn spawn_one<R: Rng>(
    world: &mut WorldState,
    rng: &mut R,
    now: u64,
    config: &ServerConfig,
) -> bool {
    if world.consumables.len() >= config.max_consumables {
        return false;
    }
    let Some(position) = find_free_cell(world, rng, config) else {
        debug!(
            "No free cell after {} attempts, skipping spawn",
            config.max_placement_attempts
        );
        return false;
    };
    let entry = draw_category(rng.gen::<f64>());
    let consumable = make_consumable(rng, entry, position, now, config);
    world.consumables.push(consumable);
    true
}

/// Spawns up to `count` consumables and returns how many were placed.
pub fn spawn_batch<R: Rng>(
    world: &mut WorldState,
    rng: &mut R,
    count: usize,
    now: u64,
    config: &ServerConfig,
) -> usize {
    let mut spawned = 0;
    for _ in 0..count {
        if !spawn_one(world, rng, now, config) {
            break;
        }
        spawned += 1;
    }
    spawned
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    pub expired: usize,
    pub spawned: usize,
}

/// One lifecycle tick.
///
/// Expired consumables are dropped first, then the arena is topped up by a
/// random batch of `1..=replenish_batch_max` (never past the cap), and
/// finally every countdown and blink hint is recomputed against `now`.
pub fn tick<R: Rng>(
    world: &mut WorldState,
    rng: &mut R,
    now: u64,
    config: &ServerConfig,
) -> LifecycleReport {
    let before = world.consumables.len();
    world.consumables.retain(|c| !c.is_expired(now));
    let expired = before - world.consumables.len();

    let missing = config.max_consumables.saturating_sub(world.consumables.len());
    let spawned = if missing > 0 && config.replenish_batch_max > 0 {
        let batch = rng.gen_range(1..=config.replenish_batch_max).min(missing);
        spawn_batch(world, rng, batch, now, config)
    } else {
        0
    };

    refresh_hints(world, now, config);
    LifecycleReport { expired, spawned }
}

/// Recomputes `remaining_seconds` and `blinking` for every consumable.
pub fn refresh_hints(world: &mut WorldState, now: u64, config: &ServerConfig) {
    let threshold = config.blink_threshold.as_millis() as u64;
    for consumable in &mut world.consumables {
        consumable.refresh(now, threshold);
    }
}
