//! The voice-gateway binary crate: axum HTTP/WebSocket server, CLI, config
//! loading, and per-connection wiring of `voice-core::TurnController` to
//! its adapters (spec §6, SPEC_FULL.md §6 "Additional ambient surface").

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
pub mod ws;
