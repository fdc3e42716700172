use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const GRID_SIZE: i32 = 20;
pub const WORLD_WIDTH: i32 = 2000;
pub const WORLD_HEIGHT: i32 = 2000;
pub const MAX_SEGMENTS: usize = 2000;
pub const MAX_ID_LEN: usize = 64;

/// A cell position in world pixels. Two points collide when they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoostKind {
    Speed,
    Invincibility,
    ScoreMultiplier,
}

/// A boost carried by a consumable, not yet started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boost {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

/// A boost running on an agent until `expires_at` (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBoost {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Plain,
    Bonus,
    Rare,
    PowerUp,
}

/// One cell of a client-driven food seeding request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodRequest {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub safe_zone_food: bool,
    #[serde(default)]
    pub special_food: bool,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub power_up: Option<BoostKind>,
}

/// Frames a client may send, discriminated by their `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Update {
        id: String,
        snake: Vec<Point>,
        score: i64,
        level: u32,
        #[serde(default)]
        active_power_up: Option<ActiveBoost>,
    },
    FoodEaten {
        id: String,
        food_index: usize,
    },
    BatchFoodRequest {
        requests: Vec<FoodRequest>,
    },
    GameOver {
        id: String,
        reason: String,
        #[serde(default)]
        score: Option<i64>,
        #[serde(default)]
        level: Option<u32>,
        #[serde(default)]
        final_position: Option<Vec<Point>>,
    },
    EatSnake {
        id: String,
        target: String,
        segment_index: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("agent id must be 1..={max} bytes, got {len}")]
    BadId { len: usize, max: usize },
    #[error("snake must not be empty")]
    EmptySnake,
    #[error("snake has {len} segments, limit is {max}")]
    TooManySegments { len: usize, max: usize },
}

impl ClientMessage {
    /// Decodes a text frame and checks the shape constraints serde cannot express.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Update { id, snake, .. } => {
                check_id(id)?;
                check_segments(snake)?;
                if snake.is_empty() {
                    return Err(ProtocolError::EmptySnake);
                }
            }
            ClientMessage::FoodEaten { id, .. } => check_id(id)?,
            ClientMessage::BatchFoodRequest { .. } => {}
            ClientMessage::GameOver {
                id, final_position, ..
            } => {
                check_id(id)?;
                if let Some(position) = final_position {
                    check_segments(position)?;
                }
            }
            ClientMessage::EatSnake { id, target, .. } => {
                check_id(id)?;
                check_id(target)?;
            }
        }
        Ok(())
    }

    /// The agent id the sender acts as, if the message names one.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Update { id, .. }
            | ClientMessage::FoodEaten { id, .. }
            | ClientMessage::GameOver { id, .. }
            | ClientMessage::EatSnake { id, .. } => Some(id),
            ClientMessage::BatchFoodRequest { .. } => None,
        }
    }
}

fn check_id(id: &str) -> Result<(), ProtocolError> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(ProtocolError::BadId {
            len: id.len(),
            max: MAX_ID_LEN,
        });
    }
    Ok(())
}

fn check_segments(segments: &[Point]) -> Result<(), ProtocolError> {
    if segments.len() > MAX_SEGMENTS {
        return Err(ProtocolError::TooManySegments {
            len: segments.len(),
            max: MAX_SEGMENTS,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub snake: Vec<Point>,
    pub score: i64,
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_power_up: Option<ActiveBoost>,
    pub dead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodView {
    pub x: i32,
    pub y: i32,
    pub points: i64,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_up: Option<Boost>,
    pub created_at: u64,
    pub lifetime: u64,
    pub remaining_seconds: u64,
    pub blinking: bool,
    pub safe_zone: bool,
}

/// Frames the server pushes to every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    State {
        players: HashMap<String, PlayerView>,
        foods: Vec<FoodView>,
        walls: Vec<Point>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_update() {
        let text = r#"{"type":"update","id":"p1","snake":[{"x":100,"y":100},{"x":80,"y":100}],"score":30,"level":2}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::Update {
                id,
                snake,
                score,
                level,
                active_power_up,
            } => {
                assert_eq!(id, "p1");
                assert_eq!(snake, vec![Point::new(100, 100), Point::new(80, 100)]);
                assert_eq!(score, 30);
                assert_eq!(level, 2);
                assert!(active_power_up.is_none());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_update_with_power_up() {
        let text = r#"{"type":"update","id":"p1","snake":[{"x":0,"y":0}],"score":0,"level":1,
            "activePowerUp":{"type":"invincibility","expiresAt":5000}}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::Update {
                active_power_up, ..
            } => {
                assert_eq!(
                    active_power_up,
                    Some(ActiveBoost {
                        kind: BoostKind::Invincibility,
                        expires_at: 5000
                    })
                );
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_food_eaten_and_eat_snake() {
        let eaten = ClientMessage::parse(r#"{"type":"foodEaten","id":"p1","foodIndex":3}"#).unwrap();
        assert_eq!(
            eaten,
            ClientMessage::FoodEaten {
                id: "p1".to_string(),
                food_index: 3
            }
        );

        let eat = ClientMessage::parse(
            r#"{"type":"eatSnake","id":"p1","target":"p2","segmentIndex":4}"#,
        )
        .unwrap();
        assert_eq!(eat.agent_id(), Some("p1"));
        match eat {
            ClientMessage::EatSnake {
                target,
                segment_index,
                ..
            } => {
                assert_eq!(target, "p2");
                assert_eq!(segment_index, 4);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_batch_request_defaults() {
        let text = r#"{"type":"batchFoodRequest","requests":[
            {"x":20,"y":40},
            {"x":60,"y":40,"safeZoneFood":true,"points":15,"powerUp":"speed"}
        ]}"#;
        match ClientMessage::parse(text).unwrap() {
            ClientMessage::BatchFoodRequest { requests } => {
                assert_eq!(requests.len(), 2);
                assert!(!requests[0].safe_zone_food);
                assert!(!requests[0].special_food);
                assert_eq!(requests[0].points, None);
                assert!(requests[1].safe_zone_food);
                assert_eq!(requests[1].points, Some(15));
                assert_eq!(requests[1].power_up, Some(BoostKind::Speed));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_game_over_optional_fields() {
        let bare = ClientMessage::parse(r#"{"type":"gameOver","id":"p1","reason":"wall"}"#).unwrap();
        assert_eq!(
            bare,
            ClientMessage::GameOver {
                id: "p1".to_string(),
                reason: "wall".to_string(),
                score: None,
                level: None,
                final_position: None,
            }
        );

        let full = ClientMessage::parse(
            r#"{"type":"gameOver","id":"p1","reason":"self","score":90,"level":3,"finalPosition":[{"x":1,"y":2}]}"#,
        )
        .unwrap();
        match full {
            ClientMessage::GameOver {
                score,
                level,
                final_position,
                ..
            } => {
                assert_eq!(score, Some(90));
                assert_eq!(level, Some(3));
                assert_eq!(final_position, Some(vec![Point::new(1, 2)]));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_frames() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"teleport","id":"p1"}"#),
            Err(ProtocolError::Json(_))
        ));
        // missing foodIndex
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"foodEaten","id":"p1"}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"update","id":"p1","snake":[],"score":0,"level":1}"#),
            Err(ProtocolError::EmptySnake)
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"update","id":"","snake":[{"x":0,"y":0}],"score":0,"level":1}"#),
            Err(ProtocolError::BadId { len: 0, .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_snake() {
        let message = ClientMessage::Update {
            id: "p1".to_string(),
            snake: vec![Point::new(0, 0); MAX_SEGMENTS + 1],
            score: 0,
            level: 1,
            active_power_up: None,
        };
        assert!(matches!(
            message.validate(),
            Err(ProtocolError::TooManySegments { len, max }) if len == MAX_SEGMENTS + 1 && max == MAX_SEGMENTS
        ));
    }

    #[test]
    fn test_state_message_shape() {
        let mut players = HashMap::new();
        players.insert(
            "p1".to_string(),
            PlayerView {
                snake: vec![Point::new(100, 100)],
                score: 10,
                level: 1,
                active_power_up: None,
                dead: true,
                death_reason: Some("collision".to_string()),
            },
        );
        let message = ServerMessage::State {
            players,
            foods: vec![FoodView {
                x: 20,
                y: 40,
                points: 10,
                category: Category::PowerUp,
                power_up: Some(Boost {
                    kind: BoostKind::ScoreMultiplier,
                    duration_ms: 10_000,
                }),
                created_at: 1,
                lifetime: 20_000,
                remaining_seconds: 20,
                blinking: false,
                safe_zone: false,
            }],
            walls: vec![Point::new(0, 0)],
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["players"]["p1"]["deathReason"], "collision");
        assert_eq!(value["players"]["p1"]["dead"], true);
        assert!(value["players"]["p1"].get("activePowerUp").is_none());
        assert_eq!(value["foods"][0]["type"], "powerUp");
        assert_eq!(value["foods"][0]["powerUp"]["type"], "scoreMultiplier");
        assert_eq!(value["foods"][0]["powerUp"]["duration"], 10_000);
        assert_eq!(value["foods"][0]["remainingSeconds"], 20);
        assert_eq!(value["walls"][0]["x"], 0);
    }
}
