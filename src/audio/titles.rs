//! Title matching shared by the live queue and stored playlists.
//!
//! Users refer to tracks by fragments of their titles, so every lookup goes through
//! [`normalize`]: case is folded and all whitespace is dropped before a substring test.
//! Duplicate detection is stricter and compares titles exactly.

use std::collections::HashSet;

use crate::error::MusicError;
use crate::sources::Track;

/// Appended to rendered lists that had to be cut short.
pub const MORE_MARKER: &str = "**[+ More]**";

/// Anything that can be looked up by title.
pub trait Titled {
    fn title(&self) -> &str;
}

impl Titled for Track {
    fn title(&self) -> &str {
        Track::title(self)
    }
}

impl Titled for String {
    fn title(&self) -> &str {
        self
    }
}

pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Loose match: the normalized query is contained in the normalized title.
pub fn matches(title: &str, query: &str) -> bool {
    normalize(title).contains(&normalize(query))
}

pub fn position_of<T: Titled>(items: &[T], query: &str) -> Option<usize> {
    let needle = normalize(query);
    items
        .iter()
        .position(|item| normalize(item.title()).contains(&needle))
}

/// Outcome of a multi-name removal.
#[derive(Debug)]
pub struct RemoveReport<T> {
    pub removed: Vec<T>,
    /// Names that matched nothing, deduplicated and in request order.
    pub not_found: Vec<String>,
}

impl<T: Titled> RemoveReport<T> {
    pub fn removed_titles(&self) -> Vec<String> {
        self.removed.iter().map(|t| t.title().to_string()).collect()
    }
}

/// Removes at most one matching entry per name.
pub fn remove_matching<T: Titled>(items: &mut Vec<T>, names: &[String]) -> RemoveReport<T> {
    let mut removed = Vec::new();
    let mut not_found: Vec<String> = Vec::new();

    for name in names {
        match position_of(items, name) {
            Some(index) => removed.push(items.remove(index)),
            None => {
                if !not_found.contains(name) {
                    not_found.push(name.clone());
                }
            }
        }
    }

    RemoveReport { removed, not_found }
}

/// Moves the first entry matching `query` to `new_index` and returns its previous index.
pub fn reposition<T: Titled>(
    items: &mut Vec<T>,
    query: &str,
    new_index: usize,
) -> Result<usize, MusicError> {
    let current = position_of(items, query).ok_or_else(|| MusicError::NotFound(query.to_string()))?;

    if new_index >= items.len() {
        return Err(MusicError::InvalidIndex { len: items.len() });
    }
    if new_index == current {
        return Err(MusicError::NoOp);
    }

    let item = items.remove(current);
    items.insert(new_index, item);
    Ok(current)
}

/// Keeps the first occurrence of every exact title. Returns how many entries were dropped.
pub fn dedupe_by_title<T: Titled>(items: &mut Vec<T>) -> usize {
    let before = items.len();
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.title().to_string()));
    before - items.len()
}

/// Joins titles with ", ", truncating so the result never exceeds `limit` characters.
pub fn render_titles<T: Titled>(items: &[T], limit: usize) -> String {
    let joined = items
        .iter()
        .map(Titled::title)
        .collect::<Vec<_>>()
        .join(", ");

    truncate(&joined, limit)
}

/// Corta `text` a `limit` caracteres, marcador incluido
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(MORE_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(MORE_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn titles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_folds_case_and_whitespace() {
        assert_eq!(normalize("  Never Gonna\tGive You Up "), "nevergonnagiveyouup");
        assert!(matches("Never Gonna Give You Up", "gonna give"));
        assert!(matches("Never Gonna Give You Up", "GONNAGIVE"));
        assert!(!matches("Never Gonna Give You Up", "let you down"));
    }

    #[test]
    fn test_remove_reports_removed_and_missing() {
        let mut items = titles(&["A", "B"]);
        let report = remove_matching(&mut items, &titles(&["a"]));

        assert_eq!(items, titles(&["B"]));
        assert_eq!(report.removed_titles(), titles(&["A"]));
        assert!(report.not_found.is_empty());
    }

    #[test]
    fn test_remove_removes_one_entry_per_name() {
        let mut items = titles(&["Song", "Song", "Other"]);
        let report = remove_matching(&mut items, &titles(&["song", "zzz", "zzz"]));

        assert_eq!(items, titles(&["Song", "Other"]));
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.not_found, titles(&["zzz"]));
    }

    #[test]
    fn test_reposition_moves_first_match() {
        let mut items = titles(&["A", "B", "C"]);
        assert_eq!(reposition(&mut items, "B", 0).unwrap(), 1);
        assert_eq!(items, titles(&["B", "A", "C"]));
    }

    #[test]
    fn test_repeated_reposition_is_noop() {
        let mut items = titles(&["A", "B", "C"]);
        reposition(&mut items, "C", 1).unwrap();
        let after_first = items.clone();

        assert!(matches!(reposition(&mut items, "C", 1), Err(MusicError::NoOp)));
        assert_eq!(items, after_first);
    }

    #[test]
    fn test_reposition_errors() {
        let mut items = titles(&["A", "B"]);
        assert!(matches!(reposition(&mut items, "Z", 0), Err(MusicError::NotFound(_))));
        assert!(matches!(
            reposition(&mut items, "A", 2),
            Err(MusicError::InvalidIndex { len: 2 })
        ));
        assert_eq!(items, titles(&["A", "B"]));
    }

    #[test]
    fn test_dedupe_is_exact_and_idempotent() {
        let mut items = titles(&["A", "B", "a", "A", "B"]);
        assert_eq!(dedupe_by_title(&mut items), 2);
        assert_eq!(items, titles(&["A", "B", "a"]));

        assert_eq!(dedupe_by_title(&mut items), 0);
        assert_eq!(items, titles(&["A", "B", "a"]));
    }

    #[test]
    fn test_render_truncates_with_marker() {
        let items = titles(&["A", "B", "C"]);
        assert_eq!(render_titles(&items, 1024), "A, B, C");

        let long: Vec<String> = (0..200).map(|i| format!("Track number {}", i)).collect();
        let rendered = render_titles(&long, 1024);
        assert!(rendered.ends_with(MORE_MARKER));
        assert_eq!(rendered.chars().count(), 1024);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("corto", 64), "corto");

        let text = "ñ".repeat(2000);
        let cut = truncate(&text, 1024);
        assert_eq!(cut.chars().count(), 1024);
        assert!(cut.starts_with('ñ'));
        assert!(cut.ends_with(MORE_MARKER));
    }
}
