use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{ActiveBoost, ClientMessage, FoodRequest, Point, ServerMessage};
use std::time::Duration;

use crate::collision::{self, EatOutcome};
use crate::config::ServerConfig;
use crate::consumables::{self, LifecycleReport};
use crate::error::DispatchError;
use crate::world::{Agent, ConnectionId, WorldState};

/// Follow-up work a handler asks the runtime to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Push a snapshot now instead of waiting for the next tick.
    Broadcast,
    /// Remove `agent_id` after `delay`, but only if it is still the same life.
    ScheduleRemoval {
        agent_id: String,
        life: u64,
        delay: Duration,
    },
    /// A new life started under `agent_id`; older removal timers are void.
    CancelRemoval { agent_id: String },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub boosts_cleared: usize,
}

/// The authoritative game: world state, rng and rules. Every mutation of the
/// world enters through this type.
pub struct Game {
    world: WorldState,
    config: ServerConfig,
    rng: StdRng,
    next_life: u64,
}

impl Game {
    /// Takes ownership of a laid-out world.
    ///
    /// A configured seed makes every random draw reproducible. Without one
    /// the generator is seeded from the OS.
    pub fn new(world: WorldState, config: ServerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world,
            config,
            rng,
            next_life: 1,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Mutable access for the one-off layout pass before serving.
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    /// True while at least one agent, alive or awaiting removal, exists.
    pub fn has_agents(&self) -> bool {
        !self.world.agents.is_empty()
    }

    pub fn snapshot(&self) -> ServerMessage {
        self.world.snapshot()
    }

    /// Routes one validated message from `connection` to its handler.
    ///
    /// Messages that name an agent are checked for ownership first: an id
    /// belongs to the connection that created it. The returned effects tell
    /// the caller what to broadcast and which removal timers to arm or cancel.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the message turns out to be a no-op,
    /// such as a foreign agent or an index out of range. The world is left
    /// untouched in that case.
    pub fn dispatch(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
        now: u64,
    ) -> Result<Vec<Effect>, DispatchError> {
        if let Some(id) = message.agent_id() {
            self.check_owner(connection, id)?;
        }

        match message {
            ClientMessage::Update {
                id,
                snake,
                score,
                level,
                active_power_up,
            } => Ok(self.handle_update(connection, id, snake, score, level, active_power_up, now)),
            ClientMessage::FoodEaten { id, food_index } => {
                self.handle_food_eaten(&id, food_index, now)
            }
            ClientMessage::BatchFoodRequest { requests } => {
                Ok(self.handle_batch_food_request(&requests, now))
            }
            ClientMessage::GameOver {
                id,
                reason,
                score,
                level,
                final_position,
            } => self.handle_game_over(&id, &reason, score, level, final_position, now),
            ClientMessage::EatSnake {
                id,
                target,
                segment_index,
            } => self.handle_eat_snake(&id, &target, segment_index, now),
        }
    }

    /// An existing agent id may only be driven by the connection that created it.
    fn check_owner(&self, connection: ConnectionId, id: &str) -> Result<(), DispatchError> {
        match self.world.agents.get(id) {
            Some(agent) if agent.owner != connection => {
                Err(DispatchError::NotOwner(id.to_string()))
            }
            _ => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_update(
        &mut self,
        connection: ConnectionId,
        id: String,
        snake: Vec<Point>,
        score: i64,
        level: u32,
        active_power_up: Option<ActiveBoost>,
        now: u64,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();

        if !self.world.agents.contains_key(&id) {
            let life = self.next_life;
            self.next_life += 1;
            info!("Agent {} joined on connection {}", id, connection);
            self.world
                .agents
                .insert(id.clone(), Agent::new(id.clone(), connection, life, now));
            effects.push(Effect::CancelRemoval {
                agent_id: id.clone(),
            });
        }

        let Some(agent) = self.world.agents.get_mut(&id) else {
            return effects;
        };
        agent.score = score;
        agent.level = level;
        agent.last_update = now;
        if active_power_up.is_some() {
            agent.active_boost = active_power_up;
        }
        if agent.dead {
            // frozen pose stays until removal
            return effects;
        }
        agent.segments = snake;

        if let Some(victim_of) = collision::find_body_collision(&self.world, &id) {
            if let Some(agent) = self.world.agents.get_mut(&id) {
                debug!("Agent {} ran into {}", id, victim_of);
                agent.kill("collision", now, None);
                effects.push(Effect::Broadcast);
                effects.push(Effect::ScheduleRemoval {
                    agent_id: id,
                    life: agent.life,
                    delay: self.config.collision_grace,
                });
            }
        }
        effects
    }

    fn handle_food_eaten(
        &mut self,
        id: &str,
        food_index: usize,
        now: u64,
    ) -> Result<Vec<Effect>, DispatchError> {
        match self.world.agents.get(id) {
            None => return Err(DispatchError::UnknownAgent(id.to_string())),
            Some(agent) if agent.dead => return Err(DispatchError::AgentDead(id.to_string())),
            Some(_) => {}
        }
        let len = self.world.consumables.len();
        if food_index >= len {
            return Err(DispatchError::FoodIndexOutOfRange {
                index: food_index,
                len,
            });
        }
        let food = self.world.consumables.remove(food_index);

        if let (Some(boost), Some(agent)) = (food.boost, self.world.agents.get_mut(id)) {
            agent.active_boost = Some(ActiveBoost {
                kind: boost.kind,
                expires_at: now + boost.duration_ms,
            });
            debug!("Agent {} picked up {:?}", id, boost.kind);
        }
        Ok(vec![Effect::Broadcast])
    }

    fn handle_batch_food_request(&mut self, requests: &[FoodRequest], now: u64) -> Vec<Effect> {
        let mut placed = 0;
        for request in requests {
            if self.world.consumables.len() >= self.config.max_consumables {
                break;
            }
            let cell = Point::new(request.x, request.y);
            if !self.world.in_bounds(cell)
                || self.world.is_obstacle(cell)
                || self.world.has_consumable_at(cell)
            {
                continue;
            }
            if request.safe_zone_food
                && self.world.safe_zone_count() >= self.config.max_safe_zone_consumables
            {
                continue;
            }

            let entry = match (request.power_up, request.special_food) {
                (Some(kind), _) => consumables::entry_for_boost(kind),
                (None, true) => consumables::entry_for_category(shared::Category::Bonus),
                (None, false) => consumables::entry_for_category(shared::Category::Plain),
            };
            let mut food = consumables::make_consumable(&mut self.rng, entry, cell, now, &self.config);
            if let Some(points) = request.points {
                food.value = points.clamp(1, self.config.max_food_points.max(1));
            }
            food.safe_zone = request.safe_zone_food;
            self.world.consumables.push(food);
            placed += 1;
        }

        debug!("Placed {}/{} requested foods", placed, requests.len());
        if placed > 0 {
            vec![Effect::Broadcast]
        } else {
            Vec::new()
        }
    }

    fn handle_game_over(
        &mut self,
        id: &str,
        reason: &str,
        score: Option<i64>,
        level: Option<u32>,
        final_position: Option<Vec<Point>>,
        now: u64,
    ) -> Result<Vec<Effect>, DispatchError> {
        let agent = self
            .world
            .agents
            .get_mut(id)
            .ok_or_else(|| DispatchError::UnknownAgent(id.to_string()))?;
        if agent.dead {
            return Err(DispatchError::AgentDead(id.to_string()));
        }

        if let Some(score) = score {
            agent.score = score;
        }
        if let Some(level) = level {
            agent.level = level;
        }
        agent.last_update = now;
        agent.kill(reason, now, final_position.filter(|p| !p.is_empty()));
        info!("Agent {} died: {}", id, reason);

        Ok(vec![
            Effect::Broadcast,
            Effect::ScheduleRemoval {
                agent_id: id.to_string(),
                life: agent.life,
                delay: self.config.grace_for_reason(reason),
            },
        ])
    }

    fn handle_eat_snake(
        &mut self,
        id: &str,
        target: &str,
        segment_index: usize,
        now: u64,
    ) -> Result<Vec<Effect>, DispatchError> {
        let attacker = self
            .world
            .agents
            .get(id)
            .ok_or_else(|| DispatchError::UnknownAgent(id.to_string()))?;
        if attacker.dead {
            return Err(DispatchError::AgentDead(id.to_string()));
        }

        let outcome = collision::eat_agent(
            &mut self.world,
            id,
            target,
            segment_index,
            self.config.points_per_segment,
            now,
        )?;

        let mut effects = vec![Effect::Broadcast];
        if let EatOutcome::Killed { .. } = outcome {
            info!("Agent {} ate {}", id, target);
            if let Some(victim) = self.world.agents.get(target) {
                effects.push(Effect::ScheduleRemoval {
                    agent_id: target.to_string(),
                    life: victim.life,
                    delay: self.config.eaten_grace,
                });
            }
        }
        Ok(effects)
    }

    /// Runs one consumable lifecycle step. The caller decides whether the
    /// arena has an audience.
    pub fn tick_consumables(&mut self, now: u64) -> LifecycleReport {
        consumables::tick(&mut self.world, &mut self.rng, now, &self.config)
    }

    /// Removes idle agents and clears boosts that have run out.
    ///
    /// An agent is idle once `inactivity_timeout` has passed since its last
    /// update. Dead agents are swept by the same rule.
    pub fn sweep(&mut self, now: u64) -> SweepReport {
        let timeout = self.config.inactivity_timeout.as_millis() as u64;
        let idle: Vec<String> = self
            .world
            .agents
            .values()
            .filter(|agent| now.saturating_sub(agent.last_update) > timeout)
            .map(|agent| agent.id.clone())
            .collect();
        for id in &idle {
            info!("Agent {} timed out", id);
            self.world.remove_agent(id);
        }

        let mut boosts_cleared = 0;
        for agent in self.world.agents.values_mut() {
            if agent.active_boost.is_some_and(|boost| boost.expires_at <= now) {
                agent.active_boost = None;
                boosts_cleared += 1;
            }
        }

        SweepReport {
            removed: idle.len(),
            boosts_cleared,
        }
    }

    /// Delayed removal after a death. A no-op if the agent is gone or a new
    /// life has started under the same id.
    pub fn remove_dead_agent(&mut self, id: &str, life: u64) -> bool {
        match self.world.agents.get(id) {
            Some(agent) if agent.life == life => self.world.remove_agent(id).is_some(),
            _ => false,
        }
    }

    /// Drops every agent owned by a closed connection.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<String> {
        self.world.remove_agents_owned_by(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Boost, BoostKind, Category};
    use crate::world::Consumable;

    fn test_game() -> Game {
        let config = ServerConfig {
            world_width: 400,
            world_height: 400,
            grid_size: 20,
            max_consumables: 5,
            max_safe_zone_consumables: 2,
            seed: Some(42),
            ..ServerConfig::default()
        };
        let world = WorldState::new(config.world_width, config.world_height, config.grid_size);
        Game::new(world, config)
    }

    fn update(id: &str, cells: &[(i32, i32)], score: i64) -> ClientMessage {
        ClientMessage::Update {
            id: id.to_string(),
            snake: cells.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            score,
            level: 1,
            active_power_up: None,
        }
    }

    fn food(x: i32, y: i32, boost: Option<Boost>) -> Consumable {
        Consumable {
            position: Point::new(x, y),
            value: 10,
            category: if boost.is_some() {
                Category::PowerUp
            } else {
                Category::Plain
            },
            boost,
            created_at: 0,
            lifetime_ms: 20_000,
            remaining_seconds: 20,
            blinking: false,
            safe_zone: false,
        }
    }

    fn players(game: &Game) -> std::collections::HashMap<String, shared::PlayerView> {
        match game.snapshot() {
            ServerMessage::State { players, .. } => players,
        }
    }

    fn foods(game: &Game) -> Vec<shared::FoodView> {
        match game.snapshot() {
            ServerMessage::State { foods, .. } => foods,
        }
    }

    fn removal_of(effects: &[Effect]) -> Option<(String, u64, Duration)> {
        effects.iter().find_map(|effect| match effect {
            Effect::ScheduleRemoval {
                agent_id,
                life,
                delay,
            } => Some((agent_id.clone(), *life, *delay)),
            _ => None,
        })
    }

    #[test]
    fn test_update_creates_agent() {
        let mut game = test_game();
        let effects = game.dispatch(1, update("p1", &[(100, 100)], 0), 1_000).unwrap();
        assert_eq!(
            effects,
            vec![Effect::CancelRemoval {
                agent_id: "p1".to_string()
            }]
        );
        let players = players(&game);
        assert_eq!(players["p1"].snake[0], Point::new(100, 100));
        assert!(!players["p1"].dead);
        assert_eq!(game.world().agents["p1"].owner, 1);
    }

    #[test]
    fn test_collision_scenario() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 0), 1_000).unwrap();
        let effects = game.dispatch(2, update("p2", &[(100, 100)], 0), 1_050).unwrap();

        let (agent_id, life, delay) = removal_of(&effects).expect("removal scheduled");
        assert_eq!(agent_id, "p2");
        assert_eq!(delay, Duration::from_millis(500));
        assert!(effects.contains(&Effect::Broadcast));

        let players = players(&game);
        assert!(players["p2"].dead);
        assert_eq!(players["p2"].death_reason.as_deref(), Some("collision"));
        assert!(!players["p1"].dead);

        assert!(game.remove_dead_agent("p2", life));
        assert!(!players_contains(&game, "p2"));
        assert!(players_contains(&game, "p1"));
    }

    fn players_contains(game: &Game, id: &str) -> bool {
        players(game).contains_key(id)
    }

    #[test]
    fn test_dead_agent_keeps_frozen_pose() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 0), 0).unwrap();
        game.dispatch(2, update("p2", &[(100, 100), (120, 100)], 0), 10)
            .unwrap();
        assert!(game.world().agents["p2"].dead);

        let mut late = update("p2", &[(300, 300)], 70);
        if let ClientMessage::Update { level, .. } = &mut late {
            *level = 4;
        }
        let effects = game.dispatch(2, late, 20).unwrap();
        assert!(removal_of(&effects).is_none());

        let view = &players(&game)["p2"];
        assert_eq!(view.snake, vec![Point::new(100, 100), Point::new(120, 100)]);
        assert_eq!(view.score, 70);
        assert_eq!(view.level, 4);
        assert!(view.dead);
    }

    #[test]
    fn test_stale_removal_does_not_hit_new_life() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 0), 0).unwrap();
        let effects = game.dispatch(2, update("p2", &[(100, 100)], 0), 0).unwrap();
        let (_, old_life, _) = removal_of(&effects).unwrap();

        // p2 disappears through its connection closing and comes back
        assert_eq!(game.disconnect(2), vec!["p2".to_string()]);
        game.dispatch(2, update("p2", &[(200, 200)], 0), 100).unwrap();

        assert!(!game.remove_dead_agent("p2", old_life));
        assert!(players_contains(&game, "p2"));
        assert!(!players(&game)["p2"].dead);
    }

    #[test]
    fn test_ownership_is_pinned_to_creator() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 5), 0).unwrap();
        assert_eq!(
            game.dispatch(2, update("p1", &[(0, 0)], 999), 10),
            Err(DispatchError::NotOwner("p1".to_string()))
        );
        let view = &players(&game)["p1"];
        assert_eq!(view.score, 5);
        assert_eq!(view.snake, vec![Point::new(100, 100)]);
    }

    #[test]
    fn test_food_eaten_removes_item() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 0), 0).unwrap();
        game.world_mut().consumables.push(food(20, 20, None));

        let effects = game
            .dispatch(
                1,
                ClientMessage::FoodEaten {
                    id: "p1".to_string(),
                    food_index: 0,
                },
                10,
            )
            .unwrap();
        assert_eq!(effects, vec![Effect::Broadcast]);
        assert!(foods(&game).is_empty());

        // the next lifecycle tick tops the population back up
        let report = game.tick_consumables(1_000);
        assert!(report.spawned >= 1);
        assert!(game.world().consumables.len() <= 5);
    }

    #[test]
    fn test_food_index_out_of_range_is_noop() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 0), 0).unwrap();
        game.world_mut().consumables.push(food(20, 20, None));
        assert_eq!(
            game.dispatch(
                1,
                ClientMessage::FoodEaten {
                    id: "p1".to_string(),
                    food_index: 1,
                },
                0,
            ),
            Err(DispatchError::FoodIndexOutOfRange { index: 1, len: 1 })
        );
        assert_eq!(game.world().consumables.len(), 1);
    }

    #[test]
    fn test_food_eaten_needs_a_live_agent() {
        let mut game = test_game();
        game.world_mut().consumables.push(food(20, 20, None));
        let eat = |id: &str| ClientMessage::FoodEaten {
            id: id.to_string(),
            food_index: 0,
        };

        assert_eq!(
            game.dispatch(7, eat("nobody"), 0),
            Err(DispatchError::UnknownAgent("nobody".to_string()))
        );
        assert_eq!(game.world().consumables.len(), 1);

        game.dispatch(7, update("p1", &[(100, 100)], 0), 0).unwrap();
        game.world_mut()
            .agents
            .get_mut("p1")
            .unwrap()
            .kill("wall", 5, None);
        assert_eq!(
            game.dispatch(7, eat("p1"), 10),
            Err(DispatchError::AgentDead("p1".to_string()))
        );
        assert_eq!(game.world().consumables.len(), 1);
    }

    #[test]
    fn test_boost_installed_then_swept() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100)], 0), 0).unwrap();
        let boost = Boost {
            kind: BoostKind::Speed,
            duration_ms: 5_000,
        };
        game.world_mut().consumables.push(food(20, 20, Some(boost)));

        game.dispatch(
            1,
            ClientMessage::FoodEaten {
                id: "p1".to_string(),
                food_index: 0,
            },
            1_000,
        )
        .unwrap();
        assert_eq!(
            game.world().agents["p1"].active_boost,
            Some(ActiveBoost {
                kind: BoostKind::Speed,
                expires_at: 6_000
            })
        );

        // updates without a power-up do not wipe the server-installed boost
        game.dispatch(1, update("p1", &[(120, 100)], 10), 2_000).unwrap();
        assert!(game.world().agents["p1"].active_boost.is_some());

        assert_eq!(game.sweep(5_999).boosts_cleared, 0);
        assert!(game.world().agents["p1"].active_boost.is_some());
        assert_eq!(game.sweep(6_000).boosts_cleared, 1);
        assert!(players(&game)["p1"].active_power_up.is_none());
    }

    #[test]
    fn test_sweep_removes_idle_agents() {
        let mut game = test_game();
        game.dispatch(1, update("idle", &[(100, 100)], 0), 0).unwrap();
        game.dispatch(2, update("busy", &[(200, 200)], 0), 0).unwrap();
        game.dispatch(2, update("busy", &[(220, 200)], 0), 14_000)
            .unwrap();

        assert_eq!(game.sweep(15_000).removed, 0);
        let report = game.sweep(15_001);
        assert_eq!(report.removed, 1);
        assert!(!players_contains(&game, "idle"));
        assert!(players_contains(&game, "busy"));
    }

    #[test]
    fn test_batch_request_placement_rules() {
        let mut game = test_game();
        game.world_mut().add_obstacle(Point::new(40, 40));
        game.world_mut().consumables.push(food(60, 60, None));

        let requests = vec![
            FoodRequest {
                x: 40,
                y: 40,
                safe_zone_food: false,
                special_food: false,
                points: None,
                power_up: None,
            },
            FoodRequest {
                x: 60,
                y: 60,
                safe_zone_food: false,
                special_food: false,
                points: None,
                power_up: None,
            },
            FoodRequest {
                x: 80,
                y: 80,
                safe_zone_food: true,
                special_food: true,
                points: Some(10_000),
                power_up: None,
            },
            FoodRequest {
                x: 100,
                y: 80,
                safe_zone_food: true,
                special_food: false,
                points: None,
                power_up: Some(BoostKind::Invincibility),
            },
            FoodRequest {
                x: 120,
                y: 80,
                safe_zone_food: true,
                special_food: false,
                points: None,
                power_up: None,
            },
            FoodRequest {
                x: 9_999,
                y: 80,
                safe_zone_food: false,
                special_food: false,
                points: None,
                power_up: None,
            },
        ];
        let effects = game
            .dispatch(3, ClientMessage::BatchFoodRequest { requests }, 0)
            .unwrap();
        assert_eq!(effects, vec![Effect::Broadcast]);

        let foods = foods(&game);
        assert_eq!(foods.len(), 3);
        let bonus = foods.iter().find(|f| f.x == 80).unwrap();
        assert_eq!(bonus.category, Category::Bonus);
        assert_eq!(bonus.points, 50);
        assert!(bonus.safe_zone);
        let power = foods.iter().find(|f| f.x == 100).unwrap();
        assert_eq!(power.power_up.map(|b| b.kind), Some(BoostKind::Invincibility));
        // safe-zone sub-cap of two rejected the third
        assert!(foods.iter().all(|f| f.x != 120));
    }

    #[test]
    fn test_batch_request_respects_global_cap() {
        let mut game = test_game();
        let requests = (0..10)
            .map(|i| FoodRequest {
                x: i * 20,
                y: 0,
                safe_zone_food: false,
                special_food: false,
                points: None,
                power_up: None,
            })
            .collect();
        game.dispatch(1, ClientMessage::BatchFoodRequest { requests }, 0)
            .unwrap();
        assert_eq!(game.world().consumables.len(), 5);
    }

    #[test]
    fn test_game_over_freezes_and_schedules_long_grace() {
        let mut game = test_game();
        game.dispatch(1, update("p1", &[(100, 100), (80, 100)], 40), 0)
            .unwrap();
        let effects = game
            .dispatch(
                1,
                ClientMessage::GameOver {
                    id: "p1".to_string(),
                    reason: "wall".to_string(),
                    score: Some(55),
                    level: Some(3),
                    final_position: Some(vec![Point::new(120, 100), Point::new(100, 100)]),
                },
                500,
            )
            .unwrap();
        assert_eq!(effects[0], Effect::Broadcast);
        let (_, _, delay) = removal_of(&effects).unwrap();
        assert_eq!(delay, Duration::from_millis(3000));

        let view = &players(&game)["p1"];
        assert!(view.dead);
        assert_eq!(view.score, 55);
        assert_eq!(view.level, 3);
        assert_eq!(view.snake, vec![Point::new(120, 100), Point::new(100, 100)]);

        // a second report for the same death is ignored
        assert_eq!(
            game.dispatch(
                1,
                ClientMessage::GameOver {
                    id: "p1".to_string(),
                    reason: "quit".to_string(),
                    score: None,
                    level: None,
                    final_position: None,
                },
                600,
            ),
            Err(DispatchError::AgentDead("p1".to_string()))
        );
    }

    #[test]
    fn test_game_over_for_unknown_agent() {
        let mut game = test_game();
        assert_eq!(
            game.dispatch(
                1,
                ClientMessage::GameOver {
                    id: "ghost".to_string(),
                    reason: "wall".to_string(),
                    score: None,
                    level: None,
                    final_position: None,
                },
                0,
            ),
            Err(DispatchError::UnknownAgent("ghost".to_string()))
        );
    }

    #[test]
    fn test_eat_snake_head_and_body() {
        let mut game = test_game();
        game.dispatch(1, update("hunter", &[(0, 0)], 0), 0).unwrap();
        game.dispatch(
            2,
            update("prey", &[(200, 200), (180, 200), (160, 200), (140, 200)], 0),
            0,
        )
        .unwrap();

        let eat = |index| ClientMessage::EatSnake {
            id: "hunter".to_string(),
            target: "prey".to_string(),
            segment_index: index,
        };

        let effects = game.dispatch(1, eat(2), 10).unwrap();
        assert_eq!(effects, vec![Effect::Broadcast]);
        assert_eq!(game.world().agents["prey"].segments.len(), 2);
        assert_eq!(game.world().agents["hunter"].score, 20);

        let effects = game.dispatch(1, eat(0), 20).unwrap();
        let (agent_id, _, delay) = removal_of(&effects).unwrap();
        assert_eq!(agent_id, "prey");
        assert_eq!(delay, Duration::from_millis(1000));
        assert!(game.world().agents["prey"].dead);
        assert_eq!(game.world().agents["hunter"].score, 40);
    }

    #[test]
    fn test_eat_snake_requires_own_live_attacker() {
        let mut game = test_game();
        game.dispatch(1, update("hunter", &[(0, 0)], 0), 0).unwrap();
        game.dispatch(2, update("prey", &[(200, 200)], 0), 0).unwrap();
        let eat = ClientMessage::EatSnake {
            id: "hunter".to_string(),
            target: "prey".to_string(),
            segment_index: 0,
        };
        assert_eq!(
            game.dispatch(2, eat, 0),
            Err(DispatchError::NotOwner("hunter".to_string()))
        );
        assert!(!game.world().agents["prey"].dead);
    }

    #[test]
    fn test_disconnect_drops_owned_agents() {
        let mut game = test_game();
        game.dispatch(1, update("a", &[(0, 0)], 0), 0).unwrap();
        game.dispatch(1, update("b", &[(20, 0)], 0), 0).unwrap();
        game.dispatch(2, update("c", &[(40, 0)], 0), 0).unwrap();

        let mut removed = game.disconnect(1);
        removed.sort();
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        let players = players(&game);
        assert_eq!(players.len(), 1);
        assert!(players.contains_key("c"));
    }
}
