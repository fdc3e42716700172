use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::game::Game;
use server::layout::{LayoutGenerator, RoomLayout};
use server::network::Server;
use server::utils::get_timestamp;
use server::world::WorldState;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Maximum simultaneous connections
    #[clap(long, default_value = "256")]
    max_connections: usize,
    /// Snapshot broadcast interval in milliseconds
    #[clap(long, default_value = "50")]
    snapshot_ms: u64,
    /// Frames admitted per connection per second
    #[clap(long, default_value = "30")]
    rate_limit: u32,
    /// Number of random wall runs in the arena
    #[clap(long, default_value = "40")]
    wall_runs: usize,
    /// Consumables placed before the first connection
    #[clap(long, default_value = "30")]
    initial_food: usize,
    /// Maximum consumables on the board
    #[clap(long, default_value = "50")]
    max_food: usize,
    /// Seed for reproducible layouts and spawns
    #[clap(long)]
    seed: Option<u64>,
}

/// Main-method of the application.
/// Parses command-line arguments, builds the arena and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_connections: args.max_connections,
        snapshot_interval: Duration::from_millis(args.snapshot_ms.max(1)),
        rate_threshold: args.rate_limit,
        max_consumables: args.max_food,
        seed: args.seed,
        ..ServerConfig::default()
    };

    let mut world = WorldState::new(config.world_width, config.world_height, config.grid_size);
    let seeded = RoomLayout::new(config.clone(), args.wall_runs, args.initial_food)
        .generate(&mut world, get_timestamp());
    info!(
        "Arena {}x{} ready: {} wall cells, {} consumables",
        world.width,
        world.height,
        world.obstacle_count(),
        seeded
    );

    let game = Game::new(world, config.clone());
    let server = Server::bind(config, game).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
