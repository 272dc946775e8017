//! Race Sync - authoritative room server and client netcode for multiplayer racing
//!
//! The server side (`game`) runs one fixed-step simulation per room and
//! replicates player state over WebSockets (`ws`, `http`). The client side
//! (`client`) predicts the local car, smooths remote cars and tracks laps.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
