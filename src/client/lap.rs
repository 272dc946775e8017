//! Lap and checkpoint progress for the local car

use crate::game::track::CheckpointSequence;

/// Distance under which a checkpoint counts as reached
pub const CHECKPOINT_RADIUS: f32 = 50.0;
/// Laps needed to finish the race
pub const TARGET_LAPS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RacePhase {
    Racing {
        lap_count: u32,
        next_checkpoint: usize,
    },
    Finished,
}

/// Outcome of one progress check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapEvent {
    None,
    Checkpoint(usize),
    LapCompleted(u32),
    Finished,
}

#[derive(Debug, Clone)]
pub struct LapProgress {
    checkpoints: CheckpointSequence,
    phase: RacePhase,
    target_laps: u32,
}

impl LapProgress {
    pub fn new(checkpoints: CheckpointSequence) -> Self {
        Self::with_target(checkpoints, TARGET_LAPS)
    }

    pub fn with_target(checkpoints: CheckpointSequence, target_laps: u32) -> Self {
        Self {
            checkpoints,
            phase: RacePhase::Racing {
                lap_count: 0,
                next_checkpoint: 0,
            },
            target_laps,
        }
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RacePhase::Finished
    }

    pub fn lap_count(&self) -> u32 {
        match self.phase {
            RacePhase::Racing { lap_count, .. } => lap_count,
            RacePhase::Finished => self.target_laps,
        }
    }

    /// Advance the state machine for the car's current position
    pub fn check(&mut self, x: f32, y: f32) -> LapEvent {
        let RacePhase::Racing {
            lap_count,
            next_checkpoint,
        } = self.phase
        else {
            return LapEvent::None;
        };

        let target = self.checkpoints.get(next_checkpoint);
        let (dx, dy) = (x - target.x, y - target.y);
        if (dx * dx + dy * dy).sqrt() >= CHECKPOINT_RADIUS {
            return LapEvent::None;
        }

        let next_checkpoint = (next_checkpoint + 1) % self.checkpoints.len();
        if next_checkpoint != 0 {
            self.phase = RacePhase::Racing {
                lap_count,
                next_checkpoint,
            };
            return LapEvent::Checkpoint(next_checkpoint);
        }

        let lap_count = lap_count + 1;
        if lap_count >= self.target_laps {
            self.phase = RacePhase::Finished;
            LapEvent::Finished
        } else {
            self.phase = RacePhase::Racing {
                lap_count,
                next_checkpoint,
            };
            LapEvent::LapCompleted(lap_count)
        }
    }
}
