//! Runtime configuration for the arena server.
//!
//! Every timing, cap and scoring constant lives here so the binary can expose
//! them on the command line and tests can shrink them.

use shared::{GRID_SIZE, WORLD_HEIGHT, WORLD_WIDTH};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the websocket listener binds to.
    pub host: String,
    pub port: u16,
    /// Connections accepted beyond this count are closed immediately.
    pub max_connections: usize,
    /// Per-connection outbound queue; snapshots are dropped when it is full.
    pub outbound_queue: usize,
    /// Admitted frames waiting for the run loop, across all connections.
    /// Readers wait when it is full.
    pub inbound_queue: usize,
    /// Largest websocket message or frame accepted from a client.
    pub max_message_bytes: usize,
    /// How long a forced close waits for queued frames to flush before the
    /// socket is torn down.
    pub close_grace: Duration,

    pub world_width: i32,
    pub world_height: i32,
    pub grid_size: i32,

    /// Rate limiter window length and the number of frames admitted per window.
    pub rate_window: Duration,
    pub rate_threshold: u32,

    pub ping_interval: Duration,
    pub pong_timeout: Duration,

    pub snapshot_interval: Duration,
    pub consumable_interval: Duration,
    pub sweep_interval: Duration,
    /// Agents silent for longer than this are removed by the sweep.
    pub inactivity_timeout: Duration,

    /// Grace periods between an agent being marked dead and its removal.
    pub collision_grace: Duration,
    pub eaten_grace: Duration,
    pub death_grace: Duration,
    pub long_death_grace: Duration,

    pub max_consumables: usize,
    pub max_safe_zone_consumables: usize,
    pub replenish_batch_max: usize,
    pub base_lifetime: Duration,
    pub lifetime_jitter: f64,
    pub blink_threshold: Duration,
    pub max_placement_attempts: u32,
    /// Upper bound for client-requested food points.
    pub max_food_points: i64,
    pub points_per_segment: i64,

    /// Seed for the world rng; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 256,
            outbound_queue: 64,
            inbound_queue: 1024,
            max_message_bytes: 128 * 1024,
            close_grace: Duration::from_secs(1),
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            grid_size: GRID_SIZE,
            rate_window: Duration::from_millis(1000),
            rate_threshold: 30,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            snapshot_interval: Duration::from_millis(50),
            consumable_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(1),
            inactivity_timeout: Duration::from_secs(15),
            collision_grace: Duration::from_millis(500),
            eaten_grace: Duration::from_millis(1000),
            death_grace: Duration::from_millis(2000),
            long_death_grace: Duration::from_millis(3000),
            max_consumables: 50,
            max_safe_zone_consumables: 20,
            replenish_batch_max: 3,
            base_lifetime: Duration::from_secs(20),
            lifetime_jitter: 0.25,
            blink_threshold: Duration::from_secs(3),
            max_placement_attempts: 100,
            max_food_points: 50,
            points_per_segment: 10,
            seed: None,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Grace period for an explicit client-reported death.
    pub fn grace_for_reason(&self, reason: &str) -> Duration {
        match reason {
            "wall" | "self" | "obstacle" => self.long_death_grace,
            _ => self.death_grace,
        }
    }
}
