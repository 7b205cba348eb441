//! Wire protocol for the client-facing WebSocket channel (spec §6.1).
//!
//! This crate is deliberately thin: framing types only, no transport and
//! no orchestration logic. `voice-gateway` owns the axum WebSocket
//! handler; `voice-core` never imports this crate directly, it just
//! hands `voice-gateway` the values to encode.

pub mod client;
pub mod server;

pub use client::{AudioFormat, ClientMessage, SettingsPatch};
pub use server::{ServerMessage, TelemetrySnapshot, TurnOutcome, WireState};
