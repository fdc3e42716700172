//! # Snake Arena Server Library
//!
//! Authoritative state server for a real-time multiplayer snake game. Clients
//! simulate their own snake and report it over a websocket; the server keeps
//! the shared world (agents, consumables, obstacles), judges interactions
//! between agents and pushes the merged world back to everyone.
//!
//! ## Core Responsibilities
//!
//! ### Shared World
//! One world holds every agent's last reported body, the food on the board
//! and the static walls. Only the server decides who is dead, what food
//! exists and where it spawns.
//!
//! ### Connection Hygiene
//! Every connection is rate limited before its frames are decoded and is
//! probed periodically; silent peers are closed and their agents dropped.
//!
//! ### State Broadcasting
//! A full snapshot goes to every connection on a fixed cadence, and
//! immediately after deaths and consumption.
//!
//! ## Architecture Design
//!
//! ### Single Owner Run Loop
//! The world and all per-connection state are owned by one run loop in
//! [`network::Server`]. Socket reader/writer tasks and timers only post
//! [`network::ServerEvent`] values to it, so every message and tick is
//! processed to completion before the next one starts.
//!
//! ### Time
//! Game logic takes the current time in epoch milliseconds as an argument,
//! which keeps [`game::Game`] deterministic under test.
//!
//! ## Module Organization
//!
//! - `world`: the world aggregate and its view types
//! - `game`: message dispatch and the rules behind each message
//! - `collision`: agent-vs-agent contact and eating
//! - `consumables`: food categories, placement and the lifecycle tick
//! - `layout`: the arena generator run once at startup
//! - `rate_limiter`, `liveness`: per-connection gates
//! - `client_manager`: the connection registry
//! - `scheduler`: periodic cadences and one-shot timers
//! - `network`: websocket transport and the run loop
//! - `config`, `error`, `utils`: shared plumbing

pub mod client_manager;
pub mod collision;
pub mod config;
pub mod consumables;
pub mod error;
pub mod game;
pub mod layout;
pub mod liveness;
pub mod network;
pub mod rate_limiter;
pub mod scheduler;
pub mod utils;
pub mod world;
