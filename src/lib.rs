//! News Relay — filters and rewrites channel posts for an audience.

pub mod api;
pub mod channels;
pub mod config;
pub mod control;
pub mod error;
pub mod llm;
pub mod pipeline;
