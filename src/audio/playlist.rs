use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::{
    audio::titles::{self, RemoveReport, Titled},
    error::MusicError,
    sources::Track,
};

/// A stored playlist entry. Serialized as a `[title, webpage_url]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct PlaylistEntry {
    pub title: String,
    pub webpage_url: String,
}

impl PlaylistEntry {
    pub fn new(title: impl Into<String>, webpage_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            webpage_url: webpage_url.into(),
        }
    }
}

impl From<(String, String)> for PlaylistEntry {
    fn from((title, webpage_url): (String, String)) -> Self {
        Self { title, webpage_url }
    }
}

impl From<PlaylistEntry> for (String, String) {
    fn from(entry: PlaylistEntry) -> Self {
        (entry.title, entry.webpage_url)
    }
}

impl From<&Track> for PlaylistEntry {
    fn from(track: &Track) -> Self {
        Self::new(track.title(), track.webpage_url())
    }
}

impl Titled for PlaylistEntry {
    fn title(&self) -> &str {
        &self.title
    }
}

/// One guild's durable playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(default)]
    pub queue: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn from_tracks(tracks: &[Track]) -> Self {
        Self {
            queue: tracks.iter().map(PlaylistEntry::from).collect(),
        }
    }

    /// Appends unless the exact `(title, url)` pair is already stored.
    pub fn push_unique(&mut self, entry: PlaylistEntry) -> bool {
        if self.queue.contains(&entry) {
            return false;
        }
        self.queue.push(entry);
        true
    }

    /// Case and whitespace insensitive title equality.
    pub fn contains_title_loosely(&self, title: &str) -> bool {
        let wanted = titles::normalize(title);
        self.queue
            .iter()
            .any(|entry| titles::normalize(&entry.title) == wanted)
    }

    pub fn remove(&mut self, names: &[String]) -> RemoveReport<PlaylistEntry> {
        titles::remove_matching(&mut self.queue, names)
    }

    pub fn reposition(&mut self, query: &str, new_index: usize) -> Result<PlaylistEntry, MusicError> {
        titles::reposition(&mut self.queue, query, new_index)?;
        Ok(self.queue[new_index].clone())
    }

    pub fn shuffle(&mut self) {
        self.queue.shuffle(&mut rand::thread_rng());
    }

    pub fn position(&self, query: &str) -> Option<usize> {
        titles::position_of(&self.queue, query)
    }

    /// URLs of every entry matching any of `names`, one pass per name.
    pub fn matching_urls(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .flat_map(|name| {
                self.queue
                    .iter()
                    .filter(move |entry| titles::matches(&entry.title, name))
                    .map(|entry| entry.webpage_url.clone())
            })
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.queue.iter().map(|e| e.webpage_url.clone()).collect()
    }

    pub fn render(&self, limit: usize) -> String {
        titles::render_titles(&self.queue, limit)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn playlist(names: &[&str]) -> Playlist {
        Playlist {
            queue: names
                .iter()
                .map(|n| PlaylistEntry::new(*n, format!("https://youtu.be/{}", n.replace(' ', ""))))
                .collect(),
        }
    }

    #[test]
    fn test_serializes_as_pairs() {
        let list = playlist(&["Song"]);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json, serde_json::json!({ "queue": [["Song", "https://youtu.be/Song"]] }));

        let back: Playlist = serde_json::from_value(json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_push_unique_compares_exact_pairs() {
        let mut list = playlist(&["Song"]);
        assert!(!list.push_unique(PlaylistEntry::new("Song", "https://youtu.be/Song")));
        assert!(list.push_unique(PlaylistEntry::new("Song", "https://youtu.be/other")));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_loose_title_equality() {
        let list = playlist(&["Never Gonna Give You Up"]);
        assert!(list.contains_title_loosely("nevergonna giveyou up"));
        assert!(!list.contains_title_loosely("Never Gonna"));
    }

    #[test]
    fn test_matching_urls_per_name() {
        let list = playlist(&["Daft Punk One", "Daft Punk Two", "Other"]);
        let urls = list.matching_urls(&["daft punk".to_string(), "two".to_string()]);

        assert_eq!(
            urls,
            vec![
                "https://youtu.be/DaftPunkOne".to_string(),
                "https://youtu.be/DaftPunkTwo".to_string(),
                "https://youtu.be/DaftPunkTwo".to_string(),
            ]
        );
    }

    #[test]
    fn test_reposition_and_remove() {
        let mut list = playlist(&["A", "B", "C"]);
        assert_eq!(list.reposition("c", 0).unwrap().title, "C");
        assert_eq!(list.position("a"), Some(1));

        let report = list.remove(&["B".to_string(), "Z".to_string()]);
        assert_eq!(report.removed_titles(), vec!["B".to_string()]);
        assert_eq!(report.not_found, vec!["Z".to_string()]);
        assert_eq!(list.render(1024), "C, A");
    }
}
