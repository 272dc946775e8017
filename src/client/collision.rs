//! Client-only pushback between overlapping cars.
//!
//! Runs on each client's own copy of the world and is never sent to the
//! server, so two clients may resolve the same pair differently.

use crate::game::state::SessionId;

/// Default car footprint width
pub const CAR_WIDTH: f32 = 70.0;
/// Velocity nudge applied to the local car on contact
pub const PUSH_FORCE: f32 = 0.5;

/// One car as the client currently displays it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBody {
    pub id: SessionId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// Push overlapping pairs apart and nudge the local car's velocity.
///
/// Returns the number of overlapping pairs resolved.
pub fn resolve_collisions(
    bodies: &mut [LocalBody],
    local_id: SessionId,
    local_velocity: &mut (f32, f32),
) -> usize {
    let mut resolved = 0;

    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let (a, b) = (bodies[i], bodies[j]);
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            let dist = (dx * dx + dy * dy).sqrt();
            let min_dist = (a.width + b.width) / 2.0;

            if dist >= min_dist {
                continue;
            }

            // Coincident centers: separate along +x
            let (nx, ny) = if dist < 0.001 {
                (1.0, 0.0)
            } else {
                (dx / dist, dy / dist)
            };

            if a.id == local_id {
                local_velocity.0 -= nx * PUSH_FORCE;
                local_velocity.1 -= ny * PUSH_FORCE;
            }
            if b.id == local_id {
                local_velocity.0 += nx * PUSH_FORCE;
                local_velocity.1 += ny * PUSH_FORCE;
            }

            let push = (min_dist - dist) * 0.5;
            bodies[i].x -= nx * push;
            bodies[i].y -= ny * push;
            bodies[j].x += nx * push;
            bodies[j].y += ny * push;

            resolved += 1;
        }
    }

    resolved
}
