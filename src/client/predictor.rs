//! Client-side prediction of the locally controlled car

use std::sync::Arc;

use crate::game::input::InputFrame;
use crate::game::track::TrackGrid;
use crate::ws::protocol::PlayerSnapshot;

use super::input::DirectionalInput;
use super::lap::{LapEvent, LapProgress};

/// Movement tuning for the local car
#[derive(Debug, Clone, Copy)]
pub struct PredictionConfig {
    /// Radians turned per tick while steering
    pub rotation_speed: f32,
    /// Speed set per tick while accelerating or reversing
    pub move_speed: f32,
    /// Per-tick velocity multiplier with no throttle input
    pub idle_decay: f32,
    /// Distance beyond which a server position overrides the prediction
    pub reconcile_threshold: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            rotation_speed: 0.05,
            move_speed: 10.0,
            idle_decay: 0.95,
            reconcile_threshold: 10.0,
        }
    }
}

/// Result of one local tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedTick {
    pub lap: LapEvent,
    /// Frame to send to the server; `None` once the race is finished
    pub frame: Option<InputFrame>,
}

/// What reconciliation did with a server position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Within threshold, prediction kept
    Kept,
    /// Diverged, prediction replaced with the server state
    Snapped,
}

/// Predicts the local car ahead of server confirmation
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    config: PredictionConfig,
    track: Arc<TrackGrid>,
    lap: LapProgress,
    tick: u64,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
}

impl ClientPredictor {
    pub fn new(
        config: PredictionConfig,
        track: Arc<TrackGrid>,
        lap: LapProgress,
        x: f32,
        y: f32,
    ) -> Self {
        Self {
            config,
            track,
            lap,
            tick: 0,
            x,
            y,
            heading: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn lap(&self) -> &LapProgress {
        &self.lap
    }

    pub fn is_finished(&self) -> bool {
        self.lap.is_finished()
    }

    /// Run one fixed step with the directions held this tick
    pub fn fixed_tick(&mut self, input: DirectionalInput) -> PredictedTick {
        self.tick += 1;

        if self.lap.is_finished() {
            return PredictedTick {
                lap: LapEvent::None,
                frame: None,
            };
        }

        let lap = self.lap.check(self.x, self.y);
        if lap == LapEvent::Finished {
            self.velocity_x = 0.0;
            self.velocity_y = 0.0;
            return PredictedTick { lap, frame: None };
        }

        // Left wins over right, up wins over down
        if input.left {
            self.heading -= self.config.rotation_speed;
        } else if input.right {
            self.heading += self.config.rotation_speed;
        }

        if input.up {
            self.velocity_x = self.heading.cos() * self.config.move_speed;
            self.velocity_y = self.heading.sin() * self.config.move_speed;
        } else if input.down {
            self.velocity_x = -self.heading.cos() * self.config.move_speed;
            self.velocity_y = -self.heading.sin() * self.config.move_speed;
        } else {
            self.velocity_x *= self.config.idle_decay;
            self.velocity_y *= self.config.idle_decay;
        }

        let friction = self.track.friction_at(self.x, self.y);
        self.velocity_x *= friction;
        self.velocity_y *= friction;

        let frame = InputFrame {
            left: input.left,
            right: input.right,
            up: input.up,
            down: input.down,
            tick: self.tick,
            velocity_x: self.velocity_x,
            velocity_y: self.velocity_y,
        };

        self.x += self.velocity_x;
        self.y += self.velocity_y;

        PredictedTick {
            lap,
            frame: Some(frame),
        }
    }

    /// Compare a server-confirmed state for the local car with the prediction
    pub fn reconcile(&mut self, server: &PlayerSnapshot) -> Reconciliation {
        let dx = server.x - self.x;
        let dy = server.y - self.y;
        if (dx * dx + dy * dy).sqrt() > self.config.reconcile_threshold {
            self.x = server.x;
            self.y = server.y;
            self.velocity_x = server.velocity_x;
            self.velocity_y = server.velocity_y;
            Reconciliation::Snapped
        } else {
            Reconciliation::Kept
        }
    }
}
