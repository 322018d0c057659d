//! `DevChat` Relay Server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! The relay accepts WebSocket connections per project room, fans chat
//! messages out to the room, and answers `@ai` messages through a
//! generative model.

pub mod ai;
pub mod api;
pub mod config;
pub mod relay;
pub mod rooms;
pub mod session;
