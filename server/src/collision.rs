//! Agent-vs-agent interactions.
//!
//! Only inter-agent body contact is judged here. Self and obstacle hits are
//! reported by clients through an explicit death message.

use crate::error::DispatchError;
use crate::world::WorldState;

/// Returns the id of the first other live agent whose body contains the
/// head of `id`. Dead agents and the mover itself are skipped.
pub fn find_body_collision(world: &WorldState, id: &str) -> Option<String> {
    let head = world.agents.get(id)?.head()?;
    world
        .agents
        .values()
        .filter(|other| other.id != id && !other.dead)
        .find(|other| other.occupies(head))
        .map(|other| other.id.clone())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EatOutcome {
    /// Head hit: the whole target dies.
    Killed { points: i64 },
    /// Body hit: the target loses every segment from the index on.
    Truncated { removed: usize, points: i64 },
}

/// Applies one agent eating part of another and credits the attacker.
///
/// Callers check that the attacker exists and may act; this validates the
/// target and the segment index.
pub fn eat_agent(
    world: &mut WorldState,
    attacker: &str,
    target: &str,
    segment_index: usize,
    points_per_segment: i64,
    now: u64,
) -> Result<EatOutcome, DispatchError> {
    if attacker == target {
        return Err(DispatchError::SelfTarget(attacker.to_string()));
    }
    let victim = world
        .agents
        .get_mut(target)
        .ok_or_else(|| DispatchError::UnknownAgent(target.to_string()))?;
    if victim.dead {
        return Err(DispatchError::AgentDead(target.to_string()));
    }
    let len = victim.segments.len();
    if segment_index >= len {
        return Err(DispatchError::SegmentIndexOutOfRange {
            target: target.to_string(),
            index: segment_index,
            len,
        });
    }

    let outcome = if segment_index == 0 {
        victim.kill("eaten", now, None);
        EatOutcome::Killed {
            points: len as i64 * points_per_segment,
        }
    } else {
        victim.segments.truncate(segment_index);
        let removed = len - segment_index;
        EatOutcome::Truncated {
            removed,
            points: removed as i64 * points_per_segment,
        }
    };

    let points = match outcome {
        EatOutcome::Killed { points } | EatOutcome::Truncated { points, .. } => points,
    };
    if let Some(attacker) = world.agents.get_mut(attacker) {
        attacker.score += points;
    }
    Ok(outcome)
}
