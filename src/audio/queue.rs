use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info};

use crate::{
    audio::titles::{self, RemoveReport},
    error::MusicError,
    sources::Track,
};

/// Cola de reproducción de un servidor.
///
/// Junto a la cola vive `loop_snapshot`, la copia que se usa para rellenarla cuando el
/// loop de cola está activo y la cola se vacía.
#[derive(Debug)]
pub struct QueueStore {
    items: Vec<Track>,
    loop_snapshot: Vec<Track>,
    max_size: usize,
}

impl QueueStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            loop_snapshot: Vec::new(),
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn add(&mut self, track: Track) -> Result<(), MusicError> {
        if self.items.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        // La copia crece también con el loop de cola apagado; se vacía cuando la cola
        // se agota y se resincroniza al activar el loop
        if !self.loop_snapshot.contains(&track) {
            self.loop_snapshot.push(track.clone());
        }
        self.items.push(track);

        Ok(())
    }

    /// Reinserta un track al inicio (playnow)
    pub fn insert_front(&mut self, track: Track) -> Result<(), MusicError> {
        if self.items.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        debug!("⏮️ Reinsertado al inicio: {}", track.title());
        self.items.insert(0, track);
        Ok(())
    }

    /// Elimina un track por cada nombre dado
    pub fn remove(&mut self, names: &[String]) -> RemoveReport<Track> {
        let report = titles::remove_matching(&mut self.items, names);

        for track in &report.removed {
            if let Some(index) = self.loop_snapshot.iter().position(|t| t == track) {
                self.loop_snapshot.remove(index);
            }
        }

        if !report.removed.is_empty() {
            info!("❌ Eliminados {} tracks de la cola", report.removed.len());
        }
        report
    }

    /// Mueve un track a una nueva posición
    pub fn reposition(&mut self, query: &str, new_index: usize) -> Result<Track, MusicError> {
        let from = titles::reposition(&mut self.items, query, new_index)?;
        let moved = self.items[new_index].clone();

        if let Some(index) = self.loop_snapshot.iter().position(|t| t == &moved) {
            let track = self.loop_snapshot.remove(index);
            let target = new_index.min(self.loop_snapshot.len());
            self.loop_snapshot.insert(target, track);
        }

        debug!("📍 Track movido de posición {} a {}", from, new_index);
        Ok(moved)
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.shuffle(&mut rng);
        self.loop_snapshot = self.items.clone();
        info!("🔀 Cola mezclada");
    }

    /// Ordena la cola por título. La copia de loop no se toca.
    pub fn sort(&mut self) {
        self.items.sort_by(|a, b| a.title().cmp(b.title()));
        info!("🔤 Cola ordenada");
    }

    /// Limpia duplicados
    pub fn dedupe(&mut self) -> Vec<Track> {
        let before = self.items.clone();
        let removed = titles::dedupe_by_title(&mut self.items);
        self.loop_snapshot = self.items.clone();

        if removed > 0 {
            info!("🗑️ Eliminados {} duplicados", removed);
        }

        // Entradas eliminadas, sin contar la primera aparición
        let mut kept = self.items.iter().peekable();
        before
            .into_iter()
            .filter(|track| match kept.peek() {
                Some(next) if **next == *track => {
                    kept.next();
                    false
                }
                _ => true,
            })
            .collect()
    }

    pub fn render(&self, limit: usize) -> String {
        titles::render_titles(&self.items, limit)
    }

    pub fn render_snapshot(&self, limit: usize) -> String {
        titles::render_titles(&self.loop_snapshot, limit)
    }

    pub fn position(&self, query: &str) -> Option<usize> {
        titles::position_of(&self.items, query)
    }

    /// Saca de la cola (y de la copia de loop) el primer track que coincida
    pub fn take(&mut self, query: &str) -> Option<Track> {
        let index = self.position(query)?;
        let track = self.items.remove(index);

        if let Some(pos) = self.loop_snapshot.iter().position(|t| t == &track) {
            self.loop_snapshot.remove(pos);
        }
        Some(track)
    }

    /// Obtiene el siguiente track, aleatorio si `random` está activo
    pub fn pop_next(&mut self, random: bool) -> Option<Track> {
        if self.items.is_empty() {
            return None;
        }

        let index = if random {
            rand::thread_rng().gen_range(0..self.items.len())
        } else {
            0
        };

        let track = self.items.remove(index);
        if random {
            info!("🔀 Seleccionado aleatoriamente: {}", track.title());
        } else {
            info!("➡️ Siguiente en cola: {}", track.title());
        }
        Some(track)
    }

    /// Rellena la cola desde la copia de loop si está vacía
    pub fn refill_from_snapshot(&mut self) -> bool {
        if !self.items.is_empty() || self.loop_snapshot.is_empty() {
            return false;
        }

        self.items = self.loop_snapshot.clone();
        info!("🔁 Cola rellenada con {} tracks", self.items.len());
        true
    }

    pub fn sync_snapshot(&mut self) {
        if self.loop_snapshot != self.items {
            self.loop_snapshot = self.items.clone();
        }
    }

    pub fn clear_snapshot(&mut self) {
        self.loop_snapshot.clear();
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        self.loop_snapshot.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn tracks(&self) -> &[Track] {
        &self.items
    }

    pub fn snapshot(&self) -> &[Track] {
        &self.loop_snapshot
    }

    /// Hay algo que reproducir después del track actual
    pub fn has_next(&self) -> bool {
        !self.items.is_empty() || !self.loop_snapshot.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn track(title: &str) -> Track {
        let slug = titles::normalize(title);
        Track::new(
            title.to_string(),
            format!("https://www.youtube.com/watch?v={}", slug),
            format!("https://cdn.example/{}", slug),
        )
        .with_duration(180)
    }

    fn store(names: &[&str]) -> QueueStore {
        let mut store = QueueStore::new(100);
        for name in names {
            store.add(track(name)).unwrap();
        }
        store
    }

    fn names(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.title()).collect()
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut store = QueueStore::new(100);
        for i in 0..100 {
            store.add(track(&format!("Track {}", i))).unwrap();
        }

        let result = store.add(track("One too many"));
        assert!(matches!(result, Err(MusicError::QueueFull(100))));
        assert_eq!(store.len(), 100);
        assert!(matches!(
            store.insert_front(track("Also too many")),
            Err(MusicError::QueueFull(100))
        ));
    }

    #[test]
    fn test_add_mirrors_snapshot_without_duplicates() {
        let mut store = store(&["A", "B"]);
        store.add(track("A")).unwrap();

        assert_eq!(names(store.tracks()), vec!["A", "B", "A"]);
        assert_eq!(names(store.snapshot()), vec!["A", "B"]);
    }

    #[test]
    fn test_snapshot_keeps_played_tracks_until_cleared() {
        let mut store = store(&["A", "B"]);
        store.pop_next(false).unwrap();
        store.pop_next(false).unwrap();
        store.add(track("C")).unwrap();

        assert_eq!(names(store.tracks()), vec!["C"]);
        assert_eq!(names(store.snapshot()), vec!["A", "B", "C"]);

        store.clear_snapshot();
        store.add(track("D")).unwrap();
        assert_eq!(names(store.snapshot()), vec!["D"]);

        store.sync_snapshot();
        assert_eq!(names(store.snapshot()), vec!["C", "D"]);
    }

    #[test]
    fn test_remove_updates_snapshot() {
        let mut store = store(&["A", "B"]);
        let report = store.remove(&["A".to_string()]);

        assert_eq!(report.removed_titles(), vec!["A".to_string()]);
        assert_eq!(names(store.tracks()), vec!["B"]);
        assert_eq!(names(store.snapshot()), vec!["B"]);
    }

    #[test]
    fn test_reposition_mirrors_snapshot() {
        let mut store = store(&["A", "B", "C"]);
        let moved = store.reposition("B", 0).unwrap();

        assert_eq!(moved.title(), "B");
        assert_eq!(names(store.tracks()), vec!["B", "A", "C"]);
        assert_eq!(names(store.snapshot()), vec!["B", "A", "C"]);
        assert!(matches!(store.reposition("B", 0), Err(MusicError::NoOp)));
        assert_eq!(names(store.tracks()), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let titles: Vec<String> = (0..30).map(|i| format!("Track {}", i)).collect();
        let mut store = QueueStore::new(100);
        for title in &titles {
            store.add(track(title)).unwrap();
        }

        store.shuffle();

        let mut shuffled: Vec<String> = store.tracks().iter().map(|t| t.title().to_string()).collect();
        shuffled.sort();
        let mut expected = titles.clone();
        expected.sort();
        assert_eq!(shuffled, expected);
        assert_eq!(store.snapshot(), store.tracks());
    }

    #[test]
    fn test_sort_leaves_snapshot_stale() {
        let mut store = store(&["C", "A", "B"]);
        store.sort();

        assert_eq!(names(store.tracks()), vec!["A", "B", "C"]);
        assert_eq!(names(store.snapshot()), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_dedupe_reports_dropped_entries() {
        let mut store = store(&["A", "B", "A", "C", "B"]);
        let dropped = store.dedupe();

        assert_eq!(names(&dropped), vec!["A", "B"]);
        assert_eq!(names(store.tracks()), vec!["A", "B", "C"]);
        assert_eq!(store.snapshot(), store.tracks());

        assert!(store.dedupe().is_empty());
        assert_eq!(names(store.tracks()), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_take_removes_from_queue_and_snapshot() {
        let mut store = store(&["Alpha", "Beta"]);
        let taken = store.take("beta").unwrap();

        assert_eq!(taken.title(), "Beta");
        assert_eq!(names(store.tracks()), vec!["Alpha"]);
        assert_eq!(names(store.snapshot()), vec!["Alpha"]);
        assert!(store.take("gamma").is_none());
    }

    #[test]
    fn test_refill_only_when_empty() {
        let mut store = store(&["A", "B"]);
        assert!(!store.refill_from_snapshot());

        store.pop_next(false);
        store.pop_next(false);
        assert!(store.is_empty());
        assert!(store.has_next());

        assert!(store.refill_from_snapshot());
        assert_eq!(names(store.tracks()), vec!["A", "B"]);
    }

    #[test]
    fn test_random_pop_takes_a_queued_track() {
        let mut store = store(&["A", "B", "C"]);
        let popped = store.pop_next(true).unwrap();

        assert_eq!(store.len(), 2);
        assert!(!store.tracks().contains(&popped));
    }
}
