//! Authoritative fixed-step simulation

use std::time::Duration;
use tracing::debug;

use crate::util::time::FixedTimestep;

use super::input::InputFrame;
use super::registry::SessionRegistry;
use super::state::PlayerState;

/// What a single tick did, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub frames_applied: usize,
    pub players_moved: usize,
}

/// Server-side integrator.
///
/// Each tick drains every session's input channel completely and integrates
/// the client-reported velocity once per frame. Sessions with no pending
/// frames are left untouched; velocity never decays on the server.
#[derive(Debug, Default)]
pub struct AuthoritativeSimulator {
    clock: FixedTimestep,
    tick: u64,
}

impl AuthoritativeSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server ticks executed so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Add wall-clock time measured by the host loop
    pub fn accumulate(&mut self, elapsed: Duration) {
        self.clock.accumulate(elapsed);
    }

    /// Run one tick if a full step has accumulated.
    ///
    /// Callers loop on this so each tick can be replicated before the next.
    pub fn step_due(&mut self, registry: &mut SessionRegistry) -> Option<TickReport> {
        if self.clock.consume_step() {
            Some(self.run_tick(registry))
        } else {
            None
        }
    }

    /// Execute exactly one discrete tick
    pub fn run_tick(&mut self, registry: &mut SessionRegistry) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        registry.for_each_with_input(|player, channel| {
            let mut applied = 0;
            while let Some(frame) = channel.next_frame() {
                apply_frame(player, &frame);
                applied += 1;
            }
            if applied > 0 {
                player.touch();
                report.frames_applied += applied;
                report.players_moved += 1;
            }
        });

        report
    }
}

/// Integrate one frame into a player's state
fn apply_frame(player: &mut PlayerState, frame: &InputFrame) {
    player.velocity_x = frame.velocity_x;
    player.velocity_y = frame.velocity_y;

    player.x += player.velocity_x;
    player.y += player.velocity_y;

    if frame.tick >= player.last_applied_tick {
        player.last_applied_tick = frame.tick;
    } else {
        debug!(
            session_id = %player.id,
            frame_tick = frame.tick,
            last_applied_tick = player.last_applied_tick,
            "Applied stale input frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::InputSender;
    use crate::game::registry::{SPAWN_BASE_X, SPAWN_BASE_Y, SPAWN_SPACING};
    use crate::game::state::RoomState;
    use uuid::Uuid;

    fn moving(tick: u64, velocity_x: f32, velocity_y: f32) -> InputFrame {
        InputFrame {
            up: true,
            tick,
            velocity_x,
            velocity_y,
            ..Default::default()
        }
    }

    fn joined(registry: &mut SessionRegistry) -> (Uuid, InputSender) {
        let id = Uuid::new_v4();
        let (_, tx) = registry.join(id).unwrap();
        (id, tx)
    }

    fn player(registry: &SessionRegistry, id: &Uuid) -> PlayerState {
        registry.state().players[id].clone()
    }

    #[test]
    fn position_is_initial_plus_sum_of_frame_velocities() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();
        let (id, tx) = joined(&mut registry);
        let start = player(&registry, &id);

        let velocities = [(1.5, -2.0), (0.0, 3.0), (-4.25, 0.5), (2.0, 2.0)];
        for (i, (vx, vy)) in velocities.iter().enumerate() {
            tx.push(moving(i as u64 + 1, *vx, *vy)).unwrap();
        }

        let report = sim.run_tick(&mut registry);
        assert_eq!(report.frames_applied, velocities.len());
        assert_eq!(report.players_moved, 1);

        let end = player(&registry, &id);
        let sum_x: f32 = velocities.iter().map(|v| v.0).sum();
        let sum_y: f32 = velocities.iter().map(|v| v.1).sum();
        assert!((end.x - (start.x + sum_x)).abs() < 1e-4);
        assert!((end.y - (start.y + sum_y)).abs() < 1e-4);
        assert_eq!(end.velocity_x, 2.0);
        assert_eq!(end.velocity_y, 2.0);
        assert_eq!(end.last_applied_tick, 4);
    }

    #[test]
    fn empty_queue_leaves_player_unchanged() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();
        let (id, tx) = joined(&mut registry);

        tx.push(moving(1, 3.0, 0.0)).unwrap();
        sim.run_tick(&mut registry);
        let after_input = player(&registry, &id);

        let report = sim.run_tick(&mut registry);
        assert_eq!(report.frames_applied, 0);
        // Velocity is kept as-is, and it is not integrated without a frame
        assert_eq!(player(&registry, &id), after_input);
    }

    #[test]
    fn frames_spread_over_ticks_apply_in_order() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();
        let (id, tx) = joined(&mut registry);
        let start_x = player(&registry, &id).x;

        tx.push(moving(1, 1.0, 0.0)).unwrap();
        sim.run_tick(&mut registry);
        tx.push(moving(2, 5.0, 0.0)).unwrap();
        tx.push(moving(3, -2.0, 0.0)).unwrap();
        sim.run_tick(&mut registry);

        let end = player(&registry, &id);
        assert_eq!(end.x, start_x + 4.0);
        assert_eq!(end.velocity_x, -2.0);
        assert_eq!(end.last_applied_tick, 3);
    }

    #[test]
    fn last_applied_tick_never_decreases() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();
        let (id, tx) = joined(&mut registry);
        let start_x = player(&registry, &id).x;

        tx.push(moving(10, 1.0, 0.0)).unwrap();
        tx.push(moving(4, 1.0, 0.0)).unwrap();
        sim.run_tick(&mut registry);

        let end = player(&registry, &id);
        assert_eq!(end.last_applied_tick, 10);
        // The stale frame is still integrated
        assert_eq!(end.x, start_x + 2.0);
    }

    #[test]
    fn sessions_are_simulated_independently() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();
        let (a, tx_a) = joined(&mut registry);
        let (b, _tx_b) = joined(&mut registry);
        let b_before = player(&registry, &b);

        tx_a.push(moving(1, 0.0, 1.0)).unwrap();
        sim.run_tick(&mut registry);

        assert_eq!(player(&registry, &a).y, SPAWN_BASE_Y + 1.0);
        assert_eq!(player(&registry, &b), b_before);
    }

    #[test]
    fn accumulated_time_drives_whole_ticks() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();

        sim.accumulate(Duration::from_millis(40));
        let mut ticks = 0;
        while sim.step_due(&mut registry).is_some() {
            ticks += 1;
        }
        assert_eq!(ticks, 2);
        assert_eq!(sim.tick(), 2);
    }

    #[test]
    fn two_clients_end_to_end() {
        let mut registry = SessionRegistry::new(RoomState::default());
        let mut sim = AuthoritativeSimulator::new();
        let (a, tx_a) = joined(&mut registry);
        let (b, _tx_b) = joined(&mut registry);

        let a_start = player(&registry, &a);
        let b_start = player(&registry, &b);
        assert_eq!(a_start.x, SPAWN_BASE_X);
        assert_eq!(b_start.x, a_start.x - SPAWN_SPACING);

        for tick in 1..=3 {
            tx_a.push(moving(tick, 2.0, 0.0)).unwrap();
        }
        sim.run_tick(&mut registry);

        let a_end = player(&registry, &a);
        assert_eq!(a_end.x, a_start.x + 6.0);
        assert_eq!(a_end.last_applied_tick, 3);

        registry.leave(a).unwrap();
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));

        // A removed player is simply absent from the next tick
        let report = sim.run_tick(&mut registry);
        assert_eq!(report.frames_applied, 0);
    }
}
