//! Smoothing of remote cars toward their last server position

/// Fraction of the remaining distance covered each tick
pub const BLEND_FACTOR: f32 = 0.2;
/// Per-axis displacement under which heading is left alone
pub const HEADING_EPSILON: f32 = 0.1;

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Displayed state of one remote car.
///
/// The displayed position trails the server position; each tick it closes a
/// fixed fraction of the gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteInterpolator {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    target: Option<(f32, f32)>,
}

impl RemoteInterpolator {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            heading: 0.0,
            target: None,
        }
    }

    /// Record the latest server position; last write wins
    pub fn set_target(&mut self, x: f32, y: f32) {
        self.target = Some((x, y));
    }

    pub fn target(&self) -> Option<(f32, f32)> {
        self.target
    }

    pub fn tick(&mut self) {
        let Some((target_x, target_y)) = self.target else {
            return;
        };

        self.x = lerp(self.x, target_x, BLEND_FACTOR);
        self.y = lerp(self.y, target_y, BLEND_FACTOR);

        let dx = target_x - self.x;
        let dy = target_y - self.y;
        if dx.abs() > HEADING_EPSILON || dy.abs() > HEADING_EPSILON {
            self.heading = lerp(self.heading, dy.atan2(dx), BLEND_FACTOR);
        }
    }
}
