//! Discord message rendering: embeds for playback, queue and playlist replies.

pub mod embeds;
