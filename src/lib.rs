//! Mixer Bot: a Discord music bot with per-guild queues, playback modes and a
//! JSON-backed server playlist.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
