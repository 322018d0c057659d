//! Shared protocol definitions for the `DevChat` wire format.

pub mod codec;
pub mod command;
pub mod envelope;
pub mod message;
