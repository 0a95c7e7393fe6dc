use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::{fs, sync::Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    audio::playlist::Playlist,
    error::{MusicError, PersistenceError},
};

/// Whole playlist file: guild id (as a string key) to that guild's playlist.
pub type PlaylistDocument = BTreeMap<String, Playlist>;

/// Almacenamiento de playlists en un único archivo JSON compartido.
///
/// Every access, reads included, runs under one process-wide lock, so a
/// read-modify-write on one guild can never interleave with another guild's.
pub struct PlaylistStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PlaylistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("📁 Playlists almacenadas en: {}", path.display());
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lee la playlist de un servidor
    pub async fn read(&self, guild_id: u64) -> Result<Playlist, PersistenceError> {
        let _guard = self.lock.lock().await;
        let document = self.load_or_create(guild_id).await?;
        Self::guild_entry(&document, guild_id)
    }

    /// Guarda la playlist de un servidor sin tocar las de otros servidores
    pub async fn write(&self, guild_id: u64, playlist: Playlist) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_or_create(guild_id).await?;
        document.insert(guild_id.to_string(), playlist);
        self.save(&document).await
    }

    /// Read-modify-write of one guild's playlist inside the global critical section.
    ///
    /// Nothing is written when `f` fails. The guild key must already exist.
    pub async fn update<R, F>(&self, guild_id: u64, f: F) -> Result<R, MusicError>
    where
        F: FnOnce(&mut Playlist) -> Result<R, MusicError>,
    {
        let _guard = self.lock.lock().await;
        let mut document = self.load_or_create(guild_id).await?;
        let mut playlist = Self::guild_entry(&document, guild_id)?;

        let result = f(&mut playlist)?;

        document.insert(guild_id.to_string(), playlist);
        self.save(&document).await?;
        Ok(result)
    }

    /// Borra el archivo y lo recrea con una playlist vacía para este servidor
    pub async fn rewrite(&self, guild_id: u64) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock().await;

        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.save(&Self::empty_document(guild_id)).await?;
        warn!("♻️ Archivo de playlists reescrito por guild {}", guild_id);
        Ok(())
    }

    fn guild_entry(document: &PlaylistDocument, guild_id: u64) -> Result<Playlist, PersistenceError> {
        document
            .get(&guild_id.to_string())
            .cloned()
            .ok_or(PersistenceError::SchemaMismatch { guild: guild_id })
    }

    fn empty_document(guild_id: u64) -> PlaylistDocument {
        let mut document = PlaylistDocument::new();
        document.insert(guild_id.to_string(), Playlist::default());
        document
    }

    /// Loads the document, creating it for `guild_id` when absent or empty.
    async fn load_or_create(&self, guild_id: u64) -> Result<PlaylistDocument, PersistenceError> {
        match self.load().await {
            Err(PersistenceError::NotFound) => {
                info!("📝 Archivo de playlists creado para guild {}", guild_id);
                let document = Self::empty_document(guild_id);
                self.save(&document).await?;
                Ok(document)
            }
            other => other,
        }
    }

    async fn load(&self) -> Result<PlaylistDocument, PersistenceError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(PersistenceError::NotFound),
            Err(e) => {
                error!("Error leyendo {}: {}", self.path.display(), e);
                return Err(e.into());
            }
        };

        if content.trim().is_empty() {
            return Err(PersistenceError::NotFound);
        }

        serde_json::from_str(&content).map_err(|e| {
            error!("Archivo de playlists corrupto {}: {}", self.path.display(), e);
            PersistenceError::Corrupt(e)
        })
    }

    async fn save(&self, document: &PlaylistDocument) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| PersistenceError::Unknown(e.to_string()))?;
        fs::write(&self.path, content).await?;
        debug!("💾 Playlists guardadas ({} servidores)", document.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playlist::PlaylistEntry;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    const GUILD: u64 = 111;
    const OTHER: u64 = 222;

    fn store_in(dir: &TempDir) -> PlaylistStore {
        PlaylistStore::new(dir.path().join("playlists.json"))
    }

    fn sample() -> Playlist {
        Playlist {
            queue: vec![
                PlaylistEntry::new("A", "https://youtu.be/a"),
                PlaylistEntry::new("B", "https://youtu.be/b"),
            ],
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let playlist = store.read(GUILD).await.unwrap();
        assert!(playlist.is_empty());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({ "111": { "queue": [] } }));
    }

    #[tokio::test]
    async fn test_empty_file_is_treated_as_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "  \n").unwrap();

        assert!(store.read(GUILD).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.write(GUILD, sample()).await.unwrap();
        assert_eq!(store.read(GUILD).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_write_preserves_other_guilds() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.write(OTHER, sample()).await.unwrap();
        store.write(GUILD, Playlist::default()).await.unwrap();

        assert_eq!(store.read(OTHER).await.unwrap(), sample());
        assert!(store.read(GUILD).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_guild_key_is_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(OTHER, sample()).await.unwrap();

        let result = store.read(GUILD).await;
        assert!(matches!(result, Err(PersistenceError::SchemaMismatch { guild: GUILD })));
    }

    #[tokio::test]
    async fn test_corrupt_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(store.read(GUILD).await, Err(PersistenceError::Corrupt(_))));
        assert!(matches!(
            store.write(GUILD, sample()).await,
            Err(PersistenceError::Corrupt(_))
        ));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(GUILD, sample()).await.unwrap();

        let result: Result<(), MusicError> = store
            .update(GUILD, |playlist| {
                playlist.queue.clear();
                Err(MusicError::NoOp)
            })
            .await;

        assert!(matches!(result, Err(MusicError::NoOp)));
        assert_eq!(store.read(GUILD).await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_rewrite_resets_whole_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.write(OTHER, sample()).await.unwrap();
        std::fs::write(store.path(), "garbage").unwrap();

        store.rewrite(GUILD).await.unwrap();

        assert!(store.read(GUILD).await.unwrap().is_empty());
        assert!(matches!(
            store.read(OTHER).await,
            Err(PersistenceError::SchemaMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store_in(&dir));
        store.write(GUILD, Playlist::default()).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(GUILD, |playlist| {
                        playlist.push_unique(PlaylistEntry::new(
                            format!("Track {}", i),
                            format!("https://youtu.be/{}", i),
                        ));
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.read(GUILD).await.unwrap().len(), 20);
    }
}
