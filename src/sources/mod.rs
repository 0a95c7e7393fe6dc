pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::MusicError;

pub use youtube::YtDlpResolver;

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|music\.|m\.)?(youtube\.com|youtu\.be)/(watch|playlist\?v|list=|embed/|v/|.+\?v=)?([^&=%\?]{11})")
        .expect("static YouTube pattern is valid")
});

/// How a user query is handed to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Recognized video-platform link, resolved directly.
    Url,
    /// Free text, resolved by taking the first search result.
    Search,
}

impl QueryKind {
    pub fn classify(query: &str) -> Self {
        if YOUTUBE_URL.is_match(query.trim()) {
            QueryKind::Url
        } else {
            QueryKind::Search
        }
    }
}

/// Resolves queries and links into playable tracks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Fails with `NoEntry` when nothing matches and `InvalidQuery` when the query can't be
    /// handled at all.
    async fn resolve(&self, query: &str) -> Result<Track, MusicError>;

    /// Metadata for the first match of `query`, without queueing anything.
    async fn details(&self, query: &str) -> Result<VideoDetails, MusicError>;
}

/// Información de un video para `ytsearch`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoDetails {
    pub title: String,
    pub webpage_url: String,
    pub uploader: Option<String>,
    pub duration: u64,
    pub views: Option<u64>,
    pub likes: Option<u64>,
    /// Raw `YYYYMMDD` date as reported by the platform.
    pub upload_date: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

/// A playable track as stored in the live queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    source_url: String,
    webpage_url: String,
    duration: u64,
    thumbnail: Option<String>,
}

impl Track {
    pub fn new(title: String, webpage_url: String, source_url: String) -> Self {
        Self {
            title,
            source_url,
            webpage_url,
            duration: 0,
            thumbnail: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Stream URI handed to the audio delivery. These expire after a few hours.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn webpage_url(&self) -> &str {
        &self.webpage_url
    }

    /// Duration in whole seconds, 0 when unknown.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        assert_eq!(
            QueryKind::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            QueryKind::Url
        );
        assert_eq!(QueryKind::classify("https://youtu.be/dQw4w9WgXcQ"), QueryKind::Url);
        assert_eq!(QueryKind::classify("youtube.com/watch?v=dQw4w9WgXcQ"), QueryKind::Url);
        assert_eq!(
            QueryKind::classify("https://example.com/video"),
            QueryKind::Search
        );
        assert_eq!(QueryKind::classify("undertale megalovania"), QueryKind::Search);
    }

    #[test]
    fn test_track_builder_defaults() {
        let track = Track::new("Song".into(), "https://youtu.be/x".into(), "https://cdn/x".into());
        assert_eq!(track.duration(), 0);
        assert_eq!(track.thumbnail(), None);

        let track = track.with_duration(212).with_thumbnail("https://img/x.jpg".into());
        assert_eq!(track.duration(), 212);
        assert_eq!(track.thumbnail(), Some("https://img/x.jpg"));
    }
}
