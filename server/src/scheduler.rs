//! Periodic cadences and one-shot timers for the run loop.
//!
//! The four cadences are polled from the run loop through [`Scheduler::next`].
//! One-shot timers (death removals, pong watchdogs) are small tasks that
//! sleep and then post a [`ServerEvent`] back to the run loop, so the world
//! is still only touched by its owner.

use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::network::ServerEvent;
use crate::world::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Snapshot,
    Consumables,
    Liveness,
    IdleSweep,
}

pub struct Scheduler {
    snapshot: Interval,
    consumables: Interval,
    liveness: Interval,
    idle_sweep: Interval,
    /// Pending death removals keyed by agent id, with the life they target.
    pending_removals: HashMap<String, (u64, JoinHandle<()>)>,
}

fn cadence(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

impl Scheduler {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            snapshot: cadence(config.snapshot_interval),
            consumables: cadence(config.consumable_interval),
            liveness: cadence(config.ping_interval),
            idle_sweep: cadence(config.sweep_interval),
            pending_removals: HashMap::new(),
        }
    }

    /// Waits for whichever cadence is due next.
    pub async fn next(&mut self) -> Tick {
        tokio::select! {
            biased;
            _ = self.snapshot.tick() => Tick::Snapshot,
            _ = self.consumables.tick() => Tick::Consumables,
            _ = self.idle_sweep.tick() => Tick::IdleSweep,
            _ = self.liveness.tick() => Tick::Liveness,
        }
    }

    /// Arms a delayed removal for one life of `agent_id`, replacing any
    /// older timer for the same id.
    pub fn schedule_removal(
        &mut self,
        events: &UnboundedSender<ServerEvent>,
        agent_id: String,
        life: u64,
        delay: Duration,
    ) {
        let tx = events.clone();
        let id = agent_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ServerEvent::RemovalDue { agent_id: id, life });
        });
        if let Some((_, old)) = self.pending_removals.insert(agent_id, (life, timer)) {
            old.abort();
        }
    }

    pub fn cancel_removal(&mut self, agent_id: &str) {
        if let Some((life, timer)) = self.pending_removals.remove(agent_id) {
            debug!("Cancelled removal of {} (life {})", agent_id, life);
            timer.abort();
        }
    }

    /// Forgets the timer that just fired, if it is still the current one.
    pub fn removal_fired(&mut self, agent_id: &str, life: u64) {
        if matches!(self.pending_removals.get(agent_id), Some((pending, _)) if *pending == life) {
            self.pending_removals.remove(agent_id);
        }
    }

    pub fn pending_removals(&self) -> usize {
        self.pending_removals.len()
    }
}

/// Spawns a pong watchdog for probe `seq` of `connection_id`.
pub fn spawn_watchdog(
    events: &UnboundedSender<ServerEvent>,
    connection_id: ConnectionId,
    seq: u64,
    timeout: Duration,
) -> JoinHandle<()> {
    let tx = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = tx.send(ServerEvent::WatchdogExpired { connection_id, seq });
    })
}
