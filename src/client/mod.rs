//! Client-side netcode: prediction, interpolation and local-only physics

pub mod collision;
pub mod input;
pub mod interpolator;
pub mod lap;
pub mod predictor;
pub mod session;

pub use input::{DirectionalInput, Key, KeyboardState};
pub use interpolator::RemoteInterpolator;
pub use lap::{LapEvent, LapProgress, RacePhase};
pub use predictor::{ClientPredictor, PredictionConfig, Reconciliation};
pub use session::{ClientConfig, ClientError, ClientSession, ConnectionStatus, PresentationHooks};
