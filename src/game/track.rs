//! Static track definition: occupancy grid and checkpoint sequence

/// Side length of one track cell in world units
pub const TILE_SIZE: f32 = 92.0;
/// Velocity multiplier applied each tick while off the track
pub const OFF_TRACK_MULTIPLIER: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    #[error("track grid has no cells")]
    Empty,

    #[error("track row {row} has {len} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        len: usize,
        expected: usize,
    },

    #[error("checkpoint sequence is empty")]
    NoCheckpoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    OffTrack,
    OnTrack,
}

/// Immutable occupancy grid, row-major, origin at the top-left corner
#[derive(Debug, Clone)]
pub struct TrackGrid {
    cells: Vec<Cell>,
    width: usize,
    height: usize,
    tile_size: f32,
}

const DEFAULT_LAYOUT: [[u8; 21]; 17] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0],
    [0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 0],
    [0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 1, 1, 0],
    [0, 1, 1, 1, 0, 0, 1, 1, 1, 1, 0, 1, 0, 0, 1, 0, 0, 0, 0, 1, 0],
    [0, 1, 0, 0, 0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 0, 0, 1, 0],
    [0, 1, 0, 0, 0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 0, 0, 0, 1, 0],
    [0, 1, 0, 0, 0, 0, 1, 0, 0, 1, 1, 1, 0, 0, 1, 1, 1, 1, 1, 1, 0],
    [0, 1, 1, 1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 1, 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 1, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 1, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0],
    [0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
];

impl TrackGrid {
    /// Build a grid from rows of 0 (off-track) / non-zero (on-track)
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R], tile_size: f32) -> Result<Self, TrackError> {
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if width == 0 {
            return Err(TrackError::Empty);
        }

        let mut cells = Vec::with_capacity(width * rows.len());
        for (row, cols) in rows.iter().enumerate() {
            let cols = cols.as_ref();
            if cols.len() != width {
                return Err(TrackError::RaggedRow {
                    row,
                    len: cols.len(),
                    expected: width,
                });
            }
            cells.extend(cols.iter().map(|&c| {
                if c == 0 {
                    Cell::OffTrack
                } else {
                    Cell::OnTrack
                }
            }));
        }

        Ok(Self {
            cells,
            width,
            height: rows.len(),
            tile_size,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Cell under a world position; anything outside the grid is off-track
    pub fn cell_at(&self, x: f32, y: f32) -> Cell {
        let col = (x / self.tile_size).floor();
        let row = (y / self.tile_size).floor();
        if col < 0.0 || row < 0.0 {
            return Cell::OffTrack;
        }

        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return Cell::OffTrack;
        }
        self.cells[row * self.width + col]
    }

    pub fn is_on_track(&self, x: f32, y: f32) -> bool {
        self.cell_at(x, y) == Cell::OnTrack
    }

    /// Velocity multiplier for an entity at this position
    pub fn friction_at(&self, x: f32, y: f32) -> f32 {
        match self.cell_at(x, y) {
            Cell::OnTrack => 1.0,
            Cell::OffTrack => OFF_TRACK_MULTIPLIER,
        }
    }
}

impl Default for TrackGrid {
    fn default() -> Self {
        Self::from_rows(&DEFAULT_LAYOUT, TILE_SIZE).expect("default layout is rectangular")
    }
}

/// A point the car must pass within the detection radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub x: f32,
    pub y: f32,
}

/// Ordered, non-empty list of checkpoints; index 0 is the start/finish line
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSequence {
    points: Vec<Checkpoint>,
}

impl CheckpointSequence {
    pub fn new(points: Vec<Checkpoint>) -> Result<Self, TrackError> {
        if points.is_empty() {
            return Err(TrackError::NoCheckpoints);
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Checkpoint {
        self.points[index % self.points.len()]
    }
}

impl Default for CheckpointSequence {
    fn default() -> Self {
        Self {
            points: vec![Checkpoint {
                x: 1400.0,
                y: 1380.0,
            }],
        }
    }
}
