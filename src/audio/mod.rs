//! # Audio Module
//!
//! Queue and playback core of Mixer Bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Store
//! - Ordered track queue with a capacity limit
//! - Loop snapshot used to refill the queue in queue-loop mode
//! - Title-based removal, repositioning and deduplication
//!
//! ### [`player`] - Playback Controller
//! - Per-guild state machine (idle, playing, paused)
//! - Loop, random and queue-loop modes
//! - Elapsed-time tracking across seek, rewind, forward and pause
//! - Busy flags serializing structural queue and playlist edits
//!
//! ### [`delivery`] - Audio Delivery
//! - Songbird-backed streaming with generation-tagged completion events
//!
//! ### [`manager`] - Music Manager
//! - Player registry and the command-level operations built on top of it
//!
//! Playlists ([`playlist`]) and the live queue share title matching through [`titles`].

pub mod delivery;
pub mod manager;
pub mod player;
pub mod playlist;
pub mod queue;
pub mod titles;
