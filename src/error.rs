use std::fmt;

use thiserror::Error;

/// Which structural resource a busy flag protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Queue,
    Playlist,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Queue => f.write_str("queue"),
            Resource::Playlist => f.write_str("playlist"),
        }
    }
}

/// Errors surfaced by queue, playback and playlist operations.
///
/// User-input variants (`Busy`, `NotFound`, `InvalidPosition`, `QueueFull`, ...) are
/// reported back to whoever issued the command and never leave state half-modified.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("queue limit of {0} tracks reached, remove a track to free a slot")]
    QueueFull(usize),

    #[error("the {0} is currently being modified, please wait")]
    Busy(Resource),

    #[error("track `{0}` not found")]
    NotFound(String),

    #[error("cannot reposition a track to the same index")]
    NoOp,

    #[error("invalid index, expected a value between 1 and {len}")]
    InvalidIndex { len: usize },

    #[error("invalid position {requested}s, expected a value between 0:00 and {duration}s")]
    InvalidPosition { requested: i64, duration: u64 },

    #[error("invalid query type for `{0}`, only YouTube search queries and URLs are supported")]
    InvalidQuery(String),

    #[error("no entry found for `{0}`")]
    NoEntry(String),

    #[error("nothing is playing")]
    NotPlaying,

    #[error("the player is not paused")]
    NotPaused,

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("the queue is empty")]
    QueueEmpty,

    #[error("no tracks found in playlist")]
    PlaylistEmpty,

    #[error("`{0}` is already in the playlist")]
    AlreadyInPlaylist(String),

    #[error("{0}")]
    ModeConflict(&'static str),

    #[error("audio delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("unexpected error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl MusicError {
    /// True for errors caused by the invoking user rather than the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            MusicError::Delivery(_) | MusicError::Persistence(_) | MusicError::Unknown(_)
        )
    }
}

/// Failures reading or writing the shared playlist document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("playlist file not found")]
    NotFound,

    #[error("failed to read playlist, the playlist file might be corrupted: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("playlist for guild {guild} is missing, the file might be structured improperly")]
    SchemaMismatch { guild: u64 },

    #[error("playlist file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown error while handling playlist file: {0}")]
    Unknown(String),
}
