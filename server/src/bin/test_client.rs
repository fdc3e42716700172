use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{ClientMessage, Point, ServerMessage, GRID_SIZE};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Walks one snake across the arena and logs snapshots")]
struct Args {
    /// Server websocket URL
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// Agent id to report under
    #[clap(short, long, default_value = "bot")]
    id: String,
    /// Number of moves to send before leaving
    #[clap(short, long, default_value = "20")]
    moves: u32,
    /// Delay between moves in milliseconds
    #[clap(long, default_value = "200")]
    delay_ms: u64,
}

fn describe(text: &str) -> String {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::State {
            players,
            foods,
            walls,
        }) => {
            let dead = players.values().filter(|p| p.dead).count();
            format!(
                "{} players ({} dead), {} foods, {} walls",
                players.len(),
                dead,
                foods.len(),
                walls.len()
            )
        }
        Err(e) => format!("unreadable snapshot: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut write, mut read) = ws_stream.split();

    // log every snapshot until the socket closes
    let reader = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    received += 1;
                    if received % 20 == 1 {
                        info!("Snapshot #{}: {}", received, describe(&text));
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Read error: {}", e);
                    break;
                }
            }
        }
        received
    });

    // head moves right along the middle row, body trails behind
    let row = 50 * GRID_SIZE;
    let mut body: Vec<Point> = (0..3).map(|i| Point::new((2 - i) * GRID_SIZE, row)).collect();
    for step in 0..args.moves {
        let update = ClientMessage::Update {
            id: args.id.clone(),
            snake: body.clone(),
            score: step as i64,
            level: 1,
            active_power_up: None,
        };
        write
            .send(Message::Text(serde_json::to_string(&update)?))
            .await?;

        let head = body[0];
        body.insert(0, Point::new(head.x + GRID_SIZE, head.y));
        body.pop();
        sleep(Duration::from_millis(args.delay_ms)).await;
    }

    let game_over = ClientMessage::GameOver {
        id: args.id.clone(),
        reason: "wall".to_string(),
        score: Some(args.moves as i64),
        level: Some(1),
        final_position: Some(body.clone()),
    };
    write
        .send(Message::Text(serde_json::to_string(&game_over)?))
        .await?;
    sleep(Duration::from_millis(500)).await;

    write.send(Message::Close(None)).await?;
    let received = reader.await?;
    info!("Test client finished after {} snapshots", received);
    Ok(())
}
