use std::sync::Arc;

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::Songbird;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        delivery::{AudioDelivery, DeliveryEvent, SongbirdDelivery},
        player::{ClearSummary, GuildEvent, GuildPlayer, PlaybackPhase, PlayerStatus},
        playlist::{Playlist, PlaylistEntry},
        titles::RemoveReport,
    },
    config::Config,
    error::{MusicError, Resource},
    sources::{Track, TrackResolver, VideoDetails},
    storage::PlaylistStore,
};

/// Result of enqueueing several queries at once.
#[derive(Debug, Default)]
pub struct AddReport {
    pub added: Vec<Track>,
    pub failed: Vec<(String, MusicError)>,
    /// Set when the add kicked off playback.
    pub started: Option<Track>,
}

#[derive(Debug)]
pub struct PlaylistAddReport {
    pub added: Vec<String>,
    pub failed: Vec<(String, MusicError)>,
    pub playlist: Playlist,
}

/// Registro de reproductores por servidor y punto de entrada de los comandos.
pub struct MusicManager {
    config: Arc<Config>,
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    resolver: Arc<dyn TrackResolver>,
    playlists: Arc<PlaylistStore>,
    http: reqwest::Client,
    events: mpsc::UnboundedSender<GuildEvent>,
}

impl MusicManager {
    /// Returns the manager and the receiving end of every guild's player events.
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<dyn TrackResolver>,
        playlists: Arc<PlaylistStore>,
        http: reqwest::Client,
    ) -> (Self, mpsc::UnboundedReceiver<GuildEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            config,
            players: DashMap::new(),
            resolver,
            playlists,
            http,
            events,
        };
        (manager, rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn player(&self, guild_id: GuildId) -> Arc<GuildPlayer> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(GuildPlayer::new(
                    guild_id,
                    self.config.max_queue_size,
                    self.config.render_limit,
                    self.events.clone(),
                ))
            })
            .clone()
    }

    // Conexión de voz

    /// Joins `channel_id` and wires a songbird delivery into the guild's player.
    pub async fn connect(
        &self,
        songbird: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), MusicError> {
        let call = songbird.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            MusicError::Delivery(format!("error al conectar al canal de voz: {}", e))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let delivery = SongbirdDelivery::new(
            songbird,
            guild_id,
            call,
            self.http.clone(),
            self.config.default_volume,
            tx,
        );
        self.attach(guild_id, Arc::new(delivery), rx).await;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// Installs `delivery` and forwards its completion notices to the player.
    pub async fn attach(
        &self,
        guild_id: GuildId,
        delivery: Arc<dyn AudioDelivery>,
        mut completions: mpsc::UnboundedReceiver<DeliveryEvent>,
    ) {
        let player = self.player(guild_id);
        player.attach(delivery).await;

        tokio::spawn(async move {
            while let Some(event) = completions.recv().await {
                player.handle_delivery_event(event).await;
            }
            debug!("Canal de eventos de audio cerrado para guild {}", player.guild_id());
        });
    }

    pub async fn disconnect(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.player(guild_id).disconnect().await
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.players.get(&guild_id).map(|p| p.clone()) {
            Some(player) => player.is_connected().await,
            None => false,
        }
    }

    /// Leaves the voice channel once the bot is the only member left in it.
    pub async fn on_channel_members(&self, guild_id: GuildId, members: usize) -> bool {
        if members > 1 || !self.is_connected(guild_id).await {
            return false;
        }

        info!("🚪 Sin usuarios en el canal, desconectando en guild {}", guild_id);
        match self.disconnect(guild_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Error en auto-desconexión: {}", e);
                false
            }
        }
    }

    // Cola

    async fn connected_player(&self, guild_id: GuildId) -> Result<Arc<GuildPlayer>, MusicError> {
        let player = self.player(guild_id);
        if !player.is_connected().await {
            return Err(MusicError::NotConnected);
        }
        Ok(player)
    }

    async fn resolve_into(&self, player: &GuildPlayer, queries: &[String], report: &mut AddReport) {
        for query in queries {
            match self.resolver.resolve(query).await {
                Ok(track) => match player.enqueue(track.clone()).await {
                    Ok(_) => report.added.push(track),
                    Err(e) => report.failed.push((query.clone(), e)),
                },
                Err(e) => {
                    if !e.is_user_error() {
                        error!("Error resolviendo {}: {}", query, e);
                    }
                    report.failed.push((query.clone(), e));
                }
            }
        }
    }

    async fn start_after_add(&self, player: &GuildPlayer, report: &mut AddReport) {
        if report.added.is_empty() {
            return;
        }
        match player.start_if_idle().await {
            Ok(started) => report.started = started,
            Err(e) => warn!("No se pudo iniciar la reproducción: {}", e),
        }
    }

    /// Resolves every query and appends the results; starts playback when idle.
    pub async fn add(&self, guild_id: GuildId, queries: &[String]) -> Result<AddReport, MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.is_queue_full().await {
            return Err(MusicError::QueueFull(self.config.max_queue_size));
        }

        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;

        let mut report = AddReport::default();
        self.resolve_into(&player, queries, &mut report).await;
        self.start_after_add(&player, &mut report).await;
        Ok(report)
    }

    pub async fn play_now(&self, guild_id: GuildId, query: &str) -> Result<Track, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let track = self.resolver.resolve(query).await?;
        player.play_now(track.clone()).await?;
        Ok(track)
    }

    pub async fn remove(&self, guild_id: GuildId, names: &[String]) -> Result<RemoveReport<Track>, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        Ok(player.remove(names).await)
    }

    pub async fn reposition(&self, guild_id: GuildId, query: &str, index: usize) -> Result<Track, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        player.reposition(query, index).await
    }

    pub async fn select(&self, guild_id: GuildId, query: &str) -> Result<Track, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        player.select(query).await
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        player.shuffle().await
    }

    pub async fn sort(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        player.sort().await
    }

    pub async fn dedupe(&self, guild_id: GuildId) -> Result<Vec<Track>, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        player.dedupe().await
    }

    pub async fn clear(&self, guild_id: GuildId) -> Result<ClearSummary, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        Ok(player.clear().await)
    }

    /// 0-based index and full title of the first queued match.
    pub async fn position(&self, guild_id: GuildId, query: &str) -> Result<(usize, String), MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.queue_busy().is_held() {
            return Err(MusicError::Busy(Resource::Queue));
        }

        let tracks = player.queue_tracks().await;
        if tracks.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        let index = player
            .position(query)
            .await
            .ok_or_else(|| MusicError::NotFound(query.to_string()))?;
        let title = tracks
            .get(index)
            .map(|t| t.title().to_string())
            .unwrap_or_default();
        Ok((index, title))
    }

    // Reproducción

    pub async fn skip(&self, guild_id: GuildId) -> Result<Option<Track>, MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.queue_busy().is_held() {
            return Err(MusicError::Busy(Resource::Queue));
        }
        player.skip().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<Track, MusicError> {
        self.connected_player(guild_id).await?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<Track, MusicError> {
        self.connected_player(guild_id).await?.resume().await
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<Option<Track>, MusicError> {
        self.connected_player(guild_id).await?.stop().await
    }

    pub async fn restart(&self, guild_id: GuildId) -> Result<Track, MusicError> {
        self.connected_player(guild_id).await?.restart().await
    }

    pub async fn seek(&self, guild_id: GuildId, position: u64) -> Result<u64, MusicError> {
        self.connected_player(guild_id).await?.seek(position).await
    }

    pub async fn rewind(&self, guild_id: GuildId, amount: u64) -> Result<u64, MusicError> {
        self.connected_player(guild_id).await?.rewind(amount).await
    }

    pub async fn forward(&self, guild_id: GuildId, amount: u64) -> Result<u64, MusicError> {
        self.connected_player(guild_id).await?.forward(amount).await
    }

    pub async fn toggle_loop(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.queue_busy().is_held() {
            return Err(MusicError::Busy(Resource::Queue));
        }
        player.toggle_loop().await
    }

    pub async fn toggle_random(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.queue_busy().is_held() {
            return Err(MusicError::Busy(Resource::Queue));
        }
        player.toggle_random().await
    }

    pub async fn toggle_loop_queue(&self, guild_id: GuildId) -> Result<bool, MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.queue_busy().is_held() {
            return Err(MusicError::Busy(Resource::Queue));
        }
        player.toggle_loop_queue().await
    }

    pub async fn status(&self, guild_id: GuildId) -> Result<PlayerStatus, MusicError> {
        Ok(self.connected_player(guild_id).await?.status().await)
    }

    /// Track que suena ahora mismo; uno en pausa no cuenta
    pub async fn now_playing(&self, guild_id: GuildId) -> Result<Track, MusicError> {
        let status = self.status(guild_id).await?;
        match (status.current, status.phase) {
            (Some(track), PlaybackPhase::Playing) => Ok(track),
            _ => Err(MusicError::NotPlaying),
        }
    }

    /// Looks a video up without touching any queue.
    pub async fn lookup(&self, query: &str) -> Result<VideoDetails, MusicError> {
        self.resolver.details(query).await
    }

    pub async fn history(&self, guild_id: GuildId) -> Result<Vec<String>, MusicError> {
        Ok(self.connected_player(guild_id).await?.history().await)
    }

    pub async fn render_queue(&self, guild_id: GuildId) -> Result<String, MusicError> {
        let player = self.connected_player(guild_id).await?;
        if player.queue_tracks().await.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        Ok(player.render_queue().await)
    }

    // Playlists

    /// Replaces the stored playlist with the live queue.
    pub async fn playlist_create(&self, guild_id: GuildId) -> Result<Playlist, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let tracks = player.queue_tracks().await;
        if tracks.is_empty() {
            return Err(MusicError::QueueEmpty);
        }

        let playlist = Playlist::from_tracks(&tracks);
        self.playlists.write(guild_id.get(), playlist.clone()).await?;
        info!("💾 Playlist creada con {} tracks en guild {}", playlist.len(), guild_id);
        Ok(playlist)
    }

    pub async fn playlist_add(&self, guild_id: GuildId, queries: &[String]) -> Result<PlaylistAddReport, MusicError> {
        let mut resolved = Vec::new();
        let mut failed = Vec::new();
        for query in queries {
            match self.resolver.resolve(query).await {
                Ok(track) => resolved.push(PlaylistEntry::from(&track)),
                Err(e) => failed.push((query.clone(), e)),
            }
        }

        let (added, playlist) = self
            .playlists
            .update(guild_id.get(), |playlist| {
                let mut added = Vec::new();
                for entry in resolved {
                    let title = entry.title.clone();
                    if playlist.push_unique(entry) {
                        added.push(title);
                    }
                }
                Ok((added, playlist.clone()))
            })
            .await?;

        Ok(PlaylistAddReport {
            added,
            failed,
            playlist,
        })
    }

    pub async fn playlist_add_current(&self, guild_id: GuildId) -> Result<(PlaylistEntry, Playlist), MusicError> {
        let player = self.connected_player(guild_id).await?;
        let current = player.current().await.ok_or(MusicError::NotPlaying)?;
        let entry = PlaylistEntry::from(&current);

        self.playlists
            .update(guild_id.get(), |playlist| {
                if playlist.contains_title_loosely(&entry.title) {
                    return Err(MusicError::AlreadyInPlaylist(entry.title.clone()));
                }
                playlist.queue.push(entry.clone());
                Ok((entry.clone(), playlist.clone()))
            })
            .await
    }

    pub async fn playlist_delete(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.playlists.write(guild_id.get(), Playlist::default()).await?;
        info!("🗑️ Playlist eliminada en guild {}", guild_id);
        Ok(())
    }

    /// Clears the live queue and loads every stored track into it.
    pub async fn playlist_select(&self, guild_id: GuildId) -> Result<AddReport, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let playlist = self.playlists.read(guild_id.get()).await?;
        if playlist.is_empty() {
            return Err(MusicError::PlaylistEmpty);
        }

        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        if !player.queue_tracks().await.is_empty() {
            player.clear().await;
        }

        let mut report = AddReport::default();
        self.resolve_into(&player, &playlist.urls(), &mut report).await;
        self.start_after_add(&player, &mut report).await;
        Ok(report)
    }

    pub async fn playlist_queue(&self, guild_id: GuildId) -> Result<Playlist, MusicError> {
        let playlist = self.playlists.read(guild_id.get()).await?;
        if playlist.is_empty() {
            return Err(MusicError::PlaylistEmpty);
        }
        Ok(playlist)
    }

    /// Enqueues every stored entry matching any of `names`.
    pub async fn playlist_fetch(&self, guild_id: GuildId, names: &[String]) -> Result<AddReport, MusicError> {
        let player = self.connected_player(guild_id).await?;
        let playlist = self.playlist_queue(guild_id).await?;

        let urls = playlist.matching_urls(names);
        if urls.is_empty() {
            return Err(MusicError::NotFound(names.join(", ")));
        }

        let _guard = player.queue_busy().try_acquire(Resource::Queue)?;
        let mut report = AddReport::default();
        self.resolve_into(&player, &urls, &mut report).await;
        self.start_after_add(&player, &mut report).await;
        Ok(report)
    }

    pub async fn playlist_remove(
        &self,
        guild_id: GuildId,
        names: &[String],
    ) -> Result<(RemoveReport<PlaylistEntry>, Playlist), MusicError> {
        self.playlists
            .update(guild_id.get(), |playlist| {
                if playlist.is_empty() {
                    return Err(MusicError::PlaylistEmpty);
                }
                let report = playlist.remove(names);
                Ok((report, playlist.clone()))
            })
            .await
    }

    pub async fn playlist_reposition(
        &self,
        guild_id: GuildId,
        query: &str,
        index: usize,
    ) -> Result<(PlaylistEntry, Playlist), MusicError> {
        let player = self.player(guild_id);
        let _guard = player.playlist_busy().try_acquire(Resource::Playlist)?;

        self.playlists
            .update(guild_id.get(), |playlist| {
                let entry = playlist.reposition(query, index)?;
                Ok((entry, playlist.clone()))
            })
            .await
    }

    pub async fn playlist_shuffle(&self, guild_id: GuildId) -> Result<Playlist, MusicError> {
        let player = self.player(guild_id);
        let _guard = player.playlist_busy().try_acquire(Resource::Playlist)?;

        self.playlists
            .update(guild_id.get(), |playlist| {
                if playlist.is_empty() {
                    return Err(MusicError::PlaylistEmpty);
                }
                playlist.shuffle();
                Ok(playlist.clone())
            })
            .await
    }

    /// Deletes the whole playlist file and recreates it for this guild only.
    pub async fn playlist_rewrite(&self, guild_id: GuildId) -> Result<(), MusicError> {
        let player = self.player(guild_id);
        let _guard = player.playlist_busy().try_acquire(Resource::Playlist)?;
        self.playlists.rewrite(guild_id.get()).await?;
        Ok(())
    }

    pub async fn playlist_position(&self, guild_id: GuildId, query: &str) -> Result<(usize, String), MusicError> {
        let player = self.player(guild_id);
        if player.playlist_busy().is_held() {
            return Err(MusicError::Busy(Resource::Playlist));
        }

        let playlist = self.playlist_queue(guild_id).await?;
        let index = playlist
            .position(query)
            .ok_or_else(|| MusicError::NotFound(query.to_string()))?;
        Ok((index, playlist.queue[index].title.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::delivery::fake::FakeDelivery;
    use crate::audio::queue::tests::track;
    use crate::sources::MockTrackResolver;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    const GUILD: GuildId = GuildId::new(42);

    struct Harness {
        manager: Arc<MusicManager>,
        delivery: Arc<FakeDelivery>,
        completions: mpsc::UnboundedSender<DeliveryEvent>,
        _dir: TempDir,
    }

    fn resolver_echo() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query| {
            if query.starts_with("missing") {
                Err(MusicError::NoEntry(query.to_string()))
            } else {
                Ok(track(query.trim_start_matches("https://www.youtube.com/watch?v=")))
            }
        });
        resolver
    }

    async fn harness_with(resolver: MockTrackResolver, max_queue_size: usize) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = Config {
            discord_token: "token".into(),
            max_queue_size,
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = Arc::new(PlaylistStore::new(config.playlist_path()));
        let (manager, _events) = MusicManager::new(
            Arc::new(config),
            Arc::new(resolver),
            store,
            reqwest::Client::new(),
        );
        let manager = Arc::new(manager);

        let delivery = Arc::new(FakeDelivery::default());
        let (completions, rx) = mpsc::unbounded_channel();
        manager.attach(GUILD, delivery.clone(), rx).await;

        Harness {
            manager,
            delivery,
            completions,
            _dir: dir,
        }
    }

    async fn harness() -> Harness {
        harness_with(resolver_echo(), 100).await
    }

    fn queries(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    async fn queue_titles(h: &Harness) -> Vec<String> {
        h.manager
            .player(GUILD)
            .queue_tracks()
            .await
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_add_starts_playback_and_reports_failures() {
        let h = harness().await;

        let report = h
            .manager
            .add(GUILD, &queries(&["A", "missing one", "B"]))
            .await
            .unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, MusicError::NoEntry(_)));
        assert_eq!(report.started.map(|t| t.title().to_string()), Some("A".to_string()));
        assert_eq!(queue_titles(&h).await, vec!["B".to_string()]);
        assert_eq!(h.delivery.play_count(), 1);
    }

    #[tokio::test]
    async fn test_add_rejected_while_queue_busy() {
        let h = harness().await;
        let player = h.manager.player(GUILD);
        let _held = player.queue_busy().try_acquire(Resource::Queue).unwrap();

        let result = h.manager.add(GUILD, &queries(&["A"])).await;
        assert!(matches!(result, Err(MusicError::Busy(Resource::Queue))));
        assert!(queue_titles(&h).await.is_empty());
    }

    #[tokio::test]
    async fn test_busy_flag_released_after_failure() {
        let h = harness().await;
        let result = h.manager.reposition(GUILD, "nothing", 0).await;
        assert!(matches!(result, Err(MusicError::NotFound(_))));
        assert!(!h.manager.player(GUILD).queue_busy().is_held());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_before_resolving() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .times(2)
            .returning(|query| Ok(track(query)));
        let h = harness_with(resolver, 2).await;

        // First track starts playing, the next two fill the queue
        h.manager.add(GUILD, &queries(&["A"])).await.unwrap();
        let player = h.manager.player(GUILD);
        player.enqueue(track("B")).await.unwrap();
        h.manager.add(GUILD, &queries(&["C"])).await.unwrap();

        let result = h.manager.add(GUILD, &queries(&["D"])).await;
        assert!(matches!(result, Err(MusicError::QueueFull(2))));
        assert_eq!(queue_titles(&h).await.len(), 2);
    }

    #[tokio::test]
    async fn test_commands_need_voice_connection() {
        let h = harness().await;
        let other = GuildId::new(7);

        assert!(matches!(
            h.manager.add(other, &queries(&["A"])).await,
            Err(MusicError::NotConnected)
        ));
        assert!(matches!(h.manager.skip(other).await, Err(MusicError::NotConnected)));
    }

    #[tokio::test]
    async fn test_completion_events_drive_the_queue() {
        let h = harness().await;
        h.manager.add(GUILD, &queries(&["A", "B"])).await.unwrap();
        let generation = h.delivery.last_play().unwrap().generation;

        h.completions
            .send(DeliveryEvent {
                generation,
                reason: crate::audio::delivery::EndReason::Finished,
            })
            .unwrap();

        let player = h.manager.player(GUILD);
        let mut current = None;
        for _ in 0..50 {
            current = player.current().await.map(|t| t.title().to_string());
            if current.as_deref() == Some("B") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(current.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_now_playing_skips_paused_tracks() {
        let h = harness().await;
        assert!(matches!(h.manager.now_playing(GUILD).await, Err(MusicError::NotPlaying)));

        h.manager.add(GUILD, &queries(&["A"])).await.unwrap();
        assert_eq!(h.manager.now_playing(GUILD).await.unwrap().title(), "A");

        h.manager.pause(GUILD).await.unwrap();
        assert!(matches!(h.manager.now_playing(GUILD).await, Err(MusicError::NotPlaying)));
        assert!(matches!(
            h.manager.now_playing(GuildId::new(7)).await,
            Err(MusicError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_lookup_leaves_queue_alone() {
        let mut resolver = resolver_echo();
        resolver.expect_details().returning(|query| {
            Ok(VideoDetails {
                title: query.to_string(),
                webpage_url: "https://www.youtube.com/watch?v=abcdefghijk".into(),
                views: Some(10),
                ..VideoDetails::default()
            })
        });
        let h = harness_with(resolver, 100).await;

        let details = h.manager.lookup("lofi").await.unwrap();
        assert_eq!(details.title, "lofi");
        assert_eq!(details.views, Some(10));
        assert!(queue_titles(&h).await.is_empty());
        assert_eq!(h.delivery.play_count(), 0);
    }

    #[tokio::test]
    async fn test_skip_reports_skipped_and_next() {
        let h = harness().await;
        h.manager.add(GUILD, &queries(&["A", "B"])).await.unwrap();

        let skipped = h.manager.skip(GUILD).await.unwrap();
        assert_eq!(skipped.map(|t| t.title().to_string()), Some("A".to_string()));
        let next = h.manager.player(GUILD).current().await;
        assert_eq!(next.map(|t| t.title().to_string()), Some("B".to_string()));
    }

    #[tokio::test]
    async fn test_position_is_zero_based_with_full_title() {
        let h = harness().await;
        h.manager.add(GUILD, &queries(&["Intro", "Alpha Song", "Beta Song"])).await.unwrap();

        let (index, title) = h.manager.position(GUILD, "beta").await.unwrap();
        assert_eq!((index, title.as_str()), (1, "Beta Song"));
    }

    #[tokio::test]
    async fn test_playlist_create_and_queue() {
        let h = harness().await;
        assert!(matches!(
            h.manager.playlist_create(GUILD).await,
            Err(MusicError::QueueEmpty)
        ));

        h.manager.add(GUILD, &queries(&["Now", "A", "B"])).await.unwrap();
        let created = h.manager.playlist_create(GUILD).await.unwrap();
        assert_eq!(created.len(), 2);

        let stored = h.manager.playlist_queue(GUILD).await.unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn test_playlist_add_skips_exact_duplicates() {
        let h = harness().await;

        let first = h.manager.playlist_add(GUILD, &queries(&["A", "A", "missing"])).await.unwrap();
        assert_eq!(first.added, vec!["A".to_string()]);
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.playlist.len(), 1);
    }

    #[tokio::test]
    async fn test_playlist_add_current_rejects_loose_duplicate() {
        let h = harness().await;
        h.manager.add(GUILD, &queries(&["Some Song"])).await.unwrap();

        let (entry, playlist) = h.manager.playlist_add_current(GUILD).await.unwrap();
        assert_eq!(entry.title, "Some Song");
        assert_eq!(playlist.len(), 1);

        assert!(matches!(
            h.manager.playlist_add_current(GUILD).await,
            Err(MusicError::AlreadyInPlaylist(_))
        ));
    }

    #[tokio::test]
    async fn test_playlist_select_replaces_queue() {
        let h = harness().await;
        h.manager.playlist_add(GUILD, &queries(&["X", "Y"])).await.unwrap();
        h.manager.add(GUILD, &queries(&["Playing", "Old"])).await.unwrap();

        let report = h.manager.playlist_select(GUILD).await.unwrap();

        assert_eq!(report.added.len(), 2);
        // Stored URLs resolve back through the watch page slug
        assert_eq!(queue_titles(&h).await, vec!["x".to_string(), "y".to_string()]);
        assert!(report.started.is_none());
    }

    #[tokio::test]
    async fn test_playlist_fetch_enqueues_matches() {
        let h = harness().await;
        h.manager
            .playlist_add(GUILD, &queries(&["Daft One", "Daft Two", "Other"]))
            .await
            .unwrap();

        let report = h.manager.playlist_fetch(GUILD, &queries(&["daft"])).await.unwrap();
        assert_eq!(report.added.len(), 2);
        assert!(matches!(
            h.manager.playlist_fetch(GUILD, &queries(&["nothing"])).await,
            Err(MusicError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_playlist_reposition_respects_busy_flag() {
        let h = harness().await;
        h.manager.playlist_add(GUILD, &queries(&["A", "B", "C"])).await.unwrap();

        let player = h.manager.player(GUILD);
        {
            let _held = player.playlist_busy().try_acquire(Resource::Playlist).unwrap();
            assert!(matches!(
                h.manager.playlist_reposition(GUILD, "C", 0).await,
                Err(MusicError::Busy(Resource::Playlist))
            ));
        }

        let (entry, playlist) = h.manager.playlist_reposition(GUILD, "C", 0).await.unwrap();
        assert_eq!(entry.title, "C");
        assert_eq!(playlist.render(1024), "C, A, B");
        assert_eq!(h.manager.playlist_position(GUILD, "b").await.unwrap(), (2, "B".to_string()));
    }

    #[tokio::test]
    async fn test_playlist_remove_and_delete() {
        let h = harness().await;
        h.manager.playlist_add(GUILD, &queries(&["A", "B"])).await.unwrap();

        let (report, playlist) = h.manager.playlist_remove(GUILD, &queries(&["a"])).await.unwrap();
        assert_eq!(report.removed_titles(), vec!["A".to_string()]);
        assert_eq!(playlist.len(), 1);

        h.manager.playlist_delete(GUILD).await.unwrap();
        assert!(matches!(
            h.manager.playlist_queue(GUILD).await,
            Err(MusicError::PlaylistEmpty)
        ));
        assert!(matches!(
            h.manager.playlist_remove(GUILD, &queries(&["b"])).await,
            Err(MusicError::PlaylistEmpty)
        ));
    }

    #[tokio::test]
    async fn test_auto_disconnect_when_alone() {
        let h = harness().await;
        h.manager.add(GUILD, &queries(&["A"])).await.unwrap();

        assert!(!h.manager.on_channel_members(GUILD, 2).await);
        assert!(h.manager.is_connected(GUILD).await);

        assert!(h.manager.on_channel_members(GUILD, 1).await);
        assert!(!h.manager.is_connected(GUILD).await);
        assert!(h.delivery.left.load(std::sync::atomic::Ordering::SeqCst));
    }
}
