//! The shared world aggregate: agents, consumables and obstacles.
//!
//! `WorldState` holds data and the invariants that can be checked locally
//! (bounds, cell occupancy). It is owned by exactly one task; everything
//! that mutates it goes through [`crate::game::Game`] or the layout surface
//! used once at boot.

use log::info;
use shared::{
    ActiveBoost, Boost, Category, FoodView, PlayerView, Point, ServerMessage,
};
use std::collections::{HashMap, HashSet};

use crate::utils::remaining_seconds;

/// Server-assigned identifier of a transport connection.
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    /// Head first.
    pub segments: Vec<Point>,
    pub score: i64,
    pub level: u32,
    pub last_update: u64,
    pub owner: ConnectionId,
    pub active_boost: Option<ActiveBoost>,
    pub dead: bool,
    pub death_reason: Option<String>,
    pub death_time: Option<u64>,
    /// Pose at the moment of death, shown until removal.
    pub frozen_segments: Option<Vec<Point>>,
    /// Generation token; a new one is issued every time the id is created.
    pub life: u64,
}

impl Agent {
    /// A live agent with no segments yet. The first update fills them in.
    pub fn new(id: String, owner: ConnectionId, life: u64, now: u64) -> Self {
        Self {
            id,
            segments: Vec::new(),
            score: 0,
            level: 1,
            last_update: now,
            owner,
            active_boost: None,
            dead: false,
            death_reason: None,
            death_time: None,
            frozen_segments: None,
            life,
        }
    }

    /// The first segment, if any.
    pub fn head(&self) -> Option<Point> {
        self.segments.first().copied()
    }

    /// Marks the agent dead and freezes its pose. `pose` overrides the
    /// current segments when the client reported its own final position.
    pub fn kill(&mut self, reason: &str, now: u64, pose: Option<Vec<Point>>) {
        self.dead = true;
        self.death_reason = Some(reason.to_string());
        self.death_time = Some(now);
        self.frozen_segments = Some(pose.unwrap_or_else(|| self.segments.clone()));
    }

    pub fn occupies(&self, cell: Point) -> bool {
        self.segments.contains(&cell)
    }

    /// Wire view for snapshots. Dead agents show their frozen pose.
    pub fn view(&self) -> PlayerView {
        let snake = match (&self.frozen_segments, self.dead) {
            (Some(frozen), true) => frozen.clone(),
            _ => self.segments.clone(),
        };
        PlayerView {
            snake,
            score: self.score,
            level: self.level,
            active_power_up: self.active_boost,
            dead: self.dead,
            death_reason: self.death_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consumable {
    pub position: Point,
    pub value: i64,
    pub category: Category,
    pub boost: Option<Boost>,
    pub created_at: u64,
    pub lifetime_ms: u64,
    pub remaining_seconds: u64,
    pub blinking: bool,
    pub safe_zone: bool,
}

impl Consumable {
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.lifetime_ms)
    }

    /// Strictly past its lifetime.
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.lifetime_ms
    }

    /// Recomputes the derived countdown fields.
    pub fn refresh(&mut self, now: u64, blink_threshold_ms: u64) {
        let remaining_ms = self.expires_at().saturating_sub(now);
        self.remaining_seconds = remaining_seconds(self.expires_at(), now);
        self.blinking = remaining_ms < blink_threshold_ms;
    }

    pub fn view(&self) -> FoodView {
        FoodView {
            x: self.position.x,
            y: self.position.y,
            points: self.value,
            category: self.category,
            power_up: self.boost,
            created_at: self.created_at,
            lifetime: self.lifetime_ms,
            remaining_seconds: self.remaining_seconds,
            blinking: self.blinking,
            safe_zone: self.safe_zone,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorldState {
    pub width: i32,
    pub height: i32,
    pub grid_size: i32,
    pub agents: HashMap<String, Agent>,
    pub consumables: Vec<Consumable>,
    obstacles: HashSet<Point>,
}

impl WorldState {
    /// An empty arena of `width` by `height` pixels.
    ///
    /// A non-positive `grid_size` is clamped to 1 so cell arithmetic never
    /// divides by zero.
    pub fn new(width: i32, height: i32, grid_size: i32) -> Self {
        Self {
            width,
            height,
            grid_size: grid_size.max(1),
            agents: HashMap::new(),
            consumables: Vec::new(),
            obstacles: HashSet::new(),
        }
    }

    pub fn columns(&self) -> i32 {
        self.width / self.grid_size
    }

    pub fn rows(&self) -> i32 {
        self.height / self.grid_size
    }

    /// Top-left pixel of the cell at (`column`, `row`).
    pub fn cell(&self, column: i32, row: i32) -> Point {
        Point::new(column * self.grid_size, row * self.grid_size)
    }

    pub fn in_bounds(&self, p: Point) -> bool {
        p.x >= 0 && p.y >= 0 && p.x < self.width && p.y < self.height
    }

    /// Removes and returns the agent, logging when one was present.
    pub fn remove_agent(&mut self, id: &str) -> Option<Agent> {
        let removed = self.agents.remove(id);
        if removed.is_some() {
            info!("Removed agent {}", id);
        }
        removed
    }

    /// Removes every agent owned by `owner` and returns their ids.
    pub fn remove_agents_owned_by(&mut self, owner: ConnectionId) -> Vec<String> {
        let ids: Vec<String> = self
            .agents
            .values()
            .filter(|agent| agent.owner == owner)
            .map(|agent| agent.id.clone())
            .collect();
        for id in &ids {
            self.remove_agent(id);
        }
        ids
    }

    pub fn is_obstacle(&self, p: Point) -> bool {
        self.obstacles.contains(&p)
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    pub fn has_consumable_at(&self, p: Point) -> bool {
        self.consumables.iter().any(|c| c.position == p)
    }

    pub fn safe_zone_count(&self) -> usize {
        self.consumables.iter().filter(|c| c.safe_zone).count()
    }

    /// True when no obstacle, consumable or agent segment occupies `p`.
    pub fn is_cell_free(&self, p: Point) -> bool {
        self.in_bounds(p)
            && !self.is_obstacle(p)
            && !self.has_consumable_at(p)
            && !self.agents.values().any(|agent| agent.occupies(p))
    }

    /// Layout surface: adds a static obstacle. Out-of-bounds cells are ignored.
    pub fn add_obstacle(&mut self, p: Point) -> bool {
        self.in_bounds(p) && self.obstacles.insert(p)
    }

    /// Layout surface: removes every obstacle inside the axis-aligned band
    /// from `from` to `to`, widened by `half_width` cells on each side.
    pub fn clear_corridor(&mut self, from: Point, to: Point, half_width: i32) -> usize {
        let pad = half_width * self.grid_size;
        let (min_x, max_x) = (from.x.min(to.x) - pad, from.x.max(to.x) + pad);
        let (min_y, max_y) = (from.y.min(to.y) - pad, from.y.max(to.y) + pad);
        let before = self.obstacles.len();
        self.obstacles
            .retain(|p| p.x < min_x || p.x > max_x || p.y < min_y || p.y > max_y);
        before - self.obstacles.len()
    }

    /// Builds the full `state` message.
    ///
    /// Walls are sorted so identical worlds serialize identically.
    pub fn snapshot(&self) -> ServerMessage {
        let mut walls: Vec<Point> = self.obstacles.iter().copied().collect();
        walls.sort();
        ServerMessage::State {
            players: self
                .agents
                .iter()
                .map(|(id, agent)| (id.clone(), agent.view()))
                .collect(),
            foods: self.consumables.iter().map(Consumable::view).collect(),
            walls,
        }
    }
}
