use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use serenity::model::id::GuildId;
use tokio::{
    sync::{mpsc, Mutex},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        delivery::{AudioDelivery, DeliveryEvent, EndReason},
        queue::QueueStore,
        titles::RemoveReport,
    },
    error::{MusicError, Resource},
    sources::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
}

/// How a track is (re)started. Only `Default` announces the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Default,
    Seek,
    Rewind,
    Forward,
}

/// Notifications for the chat layer.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    NowPlaying(Track),
    QueueEmpty,
    PlaybackFailed { title: String, reason: String },
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct GuildEvent {
    pub guild_id: GuildId,
    pub event: PlayerEvent,
}

/// Try-lock marking a structural mutation in flight.
#[derive(Debug, Default)]
pub struct BusyFlag(AtomicBool);

impl BusyFlag {
    pub fn try_acquire(&self, resource: Resource) -> Result<BusyGuard<'_>, MusicError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard { flag: &self.0 })
            .map_err(|_| MusicError::Busy(resource))
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases its [`BusyFlag`] on drop.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Read-only view used by `nowplaying`, `duration` and `list`.
#[derive(Debug, Clone)]
pub struct PlayerStatus {
    pub current: Option<Track>,
    pub phase: PlaybackPhase,
    pub elapsed: u64,
    pub is_looping: bool,
    pub is_random: bool,
    pub is_looping_queue: bool,
    pub queue_len: usize,
    pub next_title: Option<String>,
    /// Queue titles, or the loop snapshot when the queue is empty and looping.
    pub up_next: String,
}

/// Values replaced by `clear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearSummary {
    pub queue_len: usize,
    pub history_len: usize,
    pub was_looping: bool,
    pub was_random: bool,
    pub was_looping_queue: bool,
}

struct PlayerState {
    queue: QueueStore,
    current: Option<Track>,
    track_to_loop: Option<Track>,
    phase: PlaybackPhase,
    started_at: Instant,
    start_offset: u64,
    last_elapsed: u64,
    is_looping: bool,
    is_random: bool,
    is_looping_queue: bool,
    history: Vec<String>,
    generation: u64,
    delivery: Option<Arc<dyn AudioDelivery>>,
}

impl PlayerState {
    fn new(max_queue_size: usize) -> Self {
        Self {
            queue: QueueStore::new(max_queue_size),
            current: None,
            track_to_loop: None,
            phase: PlaybackPhase::Idle,
            started_at: Instant::now(),
            start_offset: 0,
            last_elapsed: 0,
            is_looping: false,
            is_random: false,
            is_looping_queue: false,
            history: Vec::new(),
            generation: 0,
            delivery: None,
        }
    }

    fn elapsed(&self) -> u64 {
        match self.phase {
            PlaybackPhase::Playing => self.start_offset + self.started_at.elapsed().as_secs(),
            PlaybackPhase::Paused => self.last_elapsed,
            PlaybackPhase::Idle => 0,
        }
    }

    fn delivery(&self) -> Result<Arc<dyn AudioDelivery>, MusicError> {
        self.delivery.clone().ok_or(MusicError::NotConnected)
    }

    fn playing_track(&self) -> Result<Track, MusicError> {
        match (&self.current, self.phase) {
            (Some(track), PlaybackPhase::Playing) => Ok(track.clone()),
            _ => Err(MusicError::NotPlaying),
        }
    }

    fn go_idle(&mut self) {
        self.current = None;
        self.phase = PlaybackPhase::Idle;
        self.start_offset = 0;
        self.last_elapsed = 0;
    }

    /// Wipes everything but the voice connection and the generation counter.
    fn reset(&mut self) {
        self.queue.clear();
        self.go_idle();
        self.track_to_loop = None;
        self.is_looping = false;
        self.is_random = false;
        self.is_looping_queue = false;
        self.history.clear();
    }
}

/// Estado de reproducción de un servidor.
///
/// All state sits behind one async mutex. Completion notices from the delivery carry
/// the generation of the track they belong to and are dropped unless they match the
/// track currently playing.
pub struct GuildPlayer {
    guild_id: GuildId,
    render_limit: usize,
    state: Mutex<PlayerState>,
    queue_busy: BusyFlag,
    playlist_busy: BusyFlag,
    events: mpsc::UnboundedSender<GuildEvent>,
}

impl GuildPlayer {
    pub fn new(
        guild_id: GuildId,
        max_queue_size: usize,
        render_limit: usize,
        events: mpsc::UnboundedSender<GuildEvent>,
    ) -> Self {
        Self {
            guild_id,
            render_limit,
            state: Mutex::new(PlayerState::new(max_queue_size)),
            queue_busy: BusyFlag::default(),
            playlist_busy: BusyFlag::default(),
            events,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn queue_busy(&self) -> &BusyFlag {
        &self.queue_busy
    }

    pub fn playlist_busy(&self) -> &BusyFlag {
        &self.playlist_busy
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(GuildEvent {
            guild_id: self.guild_id,
            event,
        });
    }

    // Conexión

    /// Conecta una nueva salida de audio y reinicia el estado
    pub async fn attach(&self, delivery: Arc<dyn AudioDelivery>) {
        let mut state = self.state.lock().await;
        state.reset();
        state.delivery = Some(delivery);
        info!("🔗 Reproductor conectado en guild {}", self.guild_id);
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.delivery.is_some()
    }

    /// Sale del canal de voz y reinicia el estado
    pub async fn disconnect(&self) -> Result<(), MusicError> {
        let delivery = {
            let mut state = self.state.lock().await;
            let delivery = state.delivery.take().ok_or(MusicError::NotConnected)?;
            state.reset();
            state.generation += 1;
            delivery
        };

        delivery.leave().await?;
        self.emit(PlayerEvent::Disconnected);
        Ok(())
    }

    // Máquina de estados

    async fn start(
        &self,
        state: &mut PlayerState,
        track: Track,
        offset: u64,
        mode: StartMode,
    ) -> Result<(), MusicError> {
        let delivery = state.delivery()?;
        state.generation += 1;
        let generation = state.generation;

        if let Err(e) = delivery
            .play(track.source_url(), Duration::from_secs(offset), generation)
            .await
        {
            error!("❌ Error al reproducir {}: {}", track.title(), e);
            state.go_idle();
            self.emit(PlayerEvent::PlaybackFailed {
                title: track.title().to_string(),
                reason: e.to_string(),
            });
            return Err(e);
        }

        state.phase = PlaybackPhase::Playing;
        state.started_at = Instant::now();
        state.start_offset = offset;
        state.last_elapsed = offset;
        if !state.history.iter().any(|t| t == track.title()) {
            state.history.push(track.title().to_string());
        }
        state.current = Some(track.clone());

        if mode == StartMode::Default {
            info!("🎵 Reproduciendo: {}", track.title());
            self.emit(PlayerEvent::NowPlaying(track));
        } else {
            debug!("⏩ {:?} a {}s en {}", mode, offset, track.title());
        }
        Ok(())
    }

    async fn advance(&self, state: &mut PlayerState) -> Result<Option<Track>, MusicError> {
        if state.is_looping && !state.is_random {
            if let Some(track) = state.track_to_loop.clone() {
                info!("🔂 Repitiendo track: {}", track.title());
                self.start(state, track.clone(), 0, StartMode::Default).await?;
                return Ok(Some(track));
            }
        }

        if state.is_looping_queue {
            state.queue.refill_from_snapshot();
        }

        let random = state.is_random;
        match state.queue.pop_next(random) {
            Some(track) => {
                state.track_to_loop = Some(track.clone());
                self.start(state, track.clone(), 0, StartMode::Default).await?;
                Ok(Some(track))
            }
            None => {
                info!("📭 Cola vacía, no hay siguiente track");
                state.queue.clear_snapshot();
                state.is_looping_queue = false;
                state.go_idle();
                self.emit(PlayerEvent::QueueEmpty);
                Ok(None)
            }
        }
    }

    /// Reproduce el siguiente track según los modos activos
    pub async fn play_next(&self) -> Result<Option<Track>, MusicError> {
        let mut state = self.state.lock().await;
        self.advance(&mut state).await
    }

    /// Starts playback when nothing is loaded. Paused tracks stay paused.
    pub async fn start_if_idle(&self) -> Result<Option<Track>, MusicError> {
        let mut state = self.state.lock().await;
        if state.phase != PlaybackPhase::Idle {
            return Ok(None);
        }
        self.advance(&mut state).await
    }

    /// Reacts to a completion notice from the audio delivery.
    pub async fn handle_delivery_event(&self, event: DeliveryEvent) {
        let mut state = self.state.lock().await;
        if event.generation != state.generation {
            debug!(
                "Evento obsoleto ignorado (gen {} != {})",
                event.generation, state.generation
            );
            return;
        }

        match event.reason {
            EndReason::StoppedExplicitly => {}
            EndReason::Finished => {
                if let Err(e) = self.advance(&mut state).await {
                    error!("Error al reproducir siguiente track: {}", e);
                }
            }
            EndReason::Failed => {
                let title = state.current.as_ref().map(|t| t.title().to_string()).unwrap_or_default();
                warn!("⚠️ Falló el stream de {}, saltando", title);
                state.is_looping = false;
                self.emit(PlayerEvent::PlaybackFailed {
                    title,
                    reason: "stream error".to_string(),
                });
                if let Err(e) = self.advance(&mut state).await {
                    error!("Error al reproducir siguiente track: {}", e);
                }
            }
        }
    }

    /// Interrumpe lo actual y reproduce `track`; lo interrumpido vuelve al inicio de la cola
    pub async fn play_now(&self, track: Track) -> Result<(), MusicError> {
        let mut state = self.state.lock().await;
        state.delivery()?;

        if state.phase != PlaybackPhase::Idle {
            if let Some(old) = state.current.clone() {
                if let Err(e) = state.queue.insert_front(old) {
                    warn!("No se pudo reinsertar el track interrumpido: {}", e);
                }
            }
        }

        state.track_to_loop = Some(track.clone());
        self.start(&mut state, track, 0, StartMode::Default).await
    }

    pub async fn select(&self, query: &str) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        state.delivery()?;

        let track = state
            .queue
            .take(query)
            .ok_or_else(|| MusicError::NotFound(query.to_string()))?;
        state.track_to_loop = Some(track.clone());
        self.start(&mut state, track.clone(), 0, StartMode::Default).await?;
        Ok(track)
    }

    pub async fn restart(&self) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        let track = match (&state.current, state.phase) {
            (Some(track), PlaybackPhase::Playing | PlaybackPhase::Paused) => track.clone(),
            _ => return Err(MusicError::NotPlaying),
        };
        self.start(&mut state, track.clone(), 0, StartMode::Default).await?;
        Ok(track)
    }

    /// Salta a la siguiente canción
    pub async fn skip(&self) -> Result<Option<Track>, MusicError> {
        let mut state = self.state.lock().await;
        let delivery = state.delivery()?;

        if state.phase == PlaybackPhase::Idle {
            return Err(MusicError::NotPlaying);
        }
        if !state.queue.has_next() {
            return Err(MusicError::QueueEmpty);
        }

        let skipped = state.current.clone();
        state.is_looping = false;
        state.generation += 1;
        delivery.stop().await;

        if let Some(track) = &skipped {
            info!("⏭️ Saltado: {}", track.title());
        }
        self.advance(&mut state).await?;
        Ok(skipped)
    }

    /// Detiene la reproducción y reinicia todo el estado
    pub async fn stop(&self) -> Result<Option<Track>, MusicError> {
        let mut state = self.state.lock().await;
        let delivery = state.delivery()?;

        if !delivery.is_playing() || (state.current.is_some() && delivery.is_paused()) {
            return Err(MusicError::NotPlaying);
        }

        let stopped = state.current.clone();
        state.reset();
        state.generation += 1;
        delivery.stop().await;

        info!("⏹️ Reproducción detenida");
        Ok(stopped)
    }

    /// Pausa la reproducción actual
    pub async fn pause(&self) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        let delivery = state.delivery()?;
        let track = state.playing_track()?;

        delivery.pause().await?;
        state.last_elapsed = state.elapsed();
        state.phase = PlaybackPhase::Paused;

        info!("⏸️ Reproducción pausada en {}s", state.last_elapsed);
        Ok(track)
    }

    /// Reanuda la reproducción
    pub async fn resume(&self) -> Result<Track, MusicError> {
        let mut state = self.state.lock().await;
        let delivery = state.delivery()?;
        let track = match (&state.current, state.phase) {
            (Some(track), PlaybackPhase::Paused) => track.clone(),
            _ => return Err(MusicError::NotPaused),
        };

        delivery.resume().await?;
        state.start_offset = state.last_elapsed;
        state.started_at = Instant::now();
        state.phase = PlaybackPhase::Playing;

        info!("▶️ Reproducción reanudada");
        Ok(track)
    }

    pub async fn seek(&self, position: u64) -> Result<u64, MusicError> {
        let mut state = self.state.lock().await;
        let track = state.playing_track()?;

        if position > track.duration() {
            return Err(MusicError::InvalidPosition {
                requested: position as i64,
                duration: track.duration(),
            });
        }

        self.start(&mut state, track, position, StartMode::Seek).await?;
        Ok(position)
    }

    pub async fn rewind(&self, amount: u64) -> Result<u64, MusicError> {
        self.shift(amount, StartMode::Rewind).await
    }

    pub async fn forward(&self, amount: u64) -> Result<u64, MusicError> {
        self.shift(amount, StartMode::Forward).await
    }

    async fn shift(&self, amount: u64, mode: StartMode) -> Result<u64, MusicError> {
        let mut state = self.state.lock().await;
        let track = state.playing_track()?;
        let elapsed = state.elapsed();
        let duration = track.duration();

        let target = match mode {
            StartMode::Rewind => elapsed.checked_sub(amount),
            _ => elapsed.checked_add(amount),
        };

        let target = match target {
            Some(target) if amount > 0 && target <= duration => target,
            _ => {
                return Err(MusicError::InvalidPosition {
                    requested: requested_position(elapsed, amount, mode),
                    duration,
                })
            }
        };

        self.start(&mut state, track, target, mode).await?;
        Ok(target)
    }

    // Modos

    pub async fn toggle_loop(&self) -> Result<bool, MusicError> {
        let mut state = self.state.lock().await;

        if !state.is_looping {
            if state.is_random {
                return Err(MusicError::ModeConflict(
                    "loop cannot be enabled while random selection is on",
                ));
            }
            if state.is_looping_queue {
                return Err(MusicError::ModeConflict("loop cannot be enabled while the queue loops"));
            }
            state.playing_track()?;
        }

        state.is_looping = !state.is_looping;
        if state.is_looping {
            info!("🔂 Repetir canción activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
        Ok(state.is_looping)
    }

    pub async fn toggle_random(&self) -> Result<bool, MusicError> {
        let mut state = self.state.lock().await;

        if !state.is_random && state.is_looping {
            return Err(MusicError::ModeConflict(
                "random selection cannot be enabled while loop is on",
            ));
        }

        state.is_random = !state.is_random;
        if state.is_random {
            info!("🔀 Modo aleatorio activado");
        } else {
            info!("➡️ Modo aleatorio desactivado");
        }
        Ok(state.is_random)
    }

    pub async fn toggle_loop_queue(&self) -> Result<bool, MusicError> {
        let mut state = self.state.lock().await;

        if !state.is_looping_queue {
            if state.is_looping {
                return Err(MusicError::ModeConflict(
                    "queue loop cannot be enabled while loop is on",
                ));
            }
            if state.queue.is_empty() && state.queue.snapshot().is_empty() {
                return Err(MusicError::QueueEmpty);
            }
            state.is_looping_queue = true;
            state.queue.sync_snapshot();
            info!("🔁 Repetir cola activado");
        } else {
            state.is_looping_queue = false;
            state.queue.clear_snapshot();
            info!("➡️ Repetir cola desactivado");
        }
        Ok(state.is_looping_queue)
    }

    // Cola

    pub async fn enqueue(&self, track: Track) -> Result<usize, MusicError> {
        let mut state = self.state.lock().await;
        state.queue.add(track)?;
        Ok(state.queue.len())
    }

    pub async fn is_queue_full(&self) -> bool {
        self.state.lock().await.queue.is_full()
    }

    pub async fn remove(&self, names: &[String]) -> RemoveReport<Track> {
        self.state.lock().await.queue.remove(names)
    }

    pub async fn reposition(&self, query: &str, new_index: usize) -> Result<Track, MusicError> {
        self.state.lock().await.queue.reposition(query, new_index)
    }

    pub async fn shuffle(&self) -> Result<(), MusicError> {
        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        state.queue.shuffle();
        Ok(())
    }

    pub async fn sort(&self) -> Result<(), MusicError> {
        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        state.queue.sort();
        Ok(())
    }

    pub async fn dedupe(&self) -> Result<Vec<Track>, MusicError> {
        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        Ok(state.queue.dedupe())
    }

    /// Vacía cola, historial y copia de loop, y desactiva todos los modos
    pub async fn clear(&self) -> ClearSummary {
        let mut state = self.state.lock().await;
        let summary = ClearSummary {
            queue_len: state.queue.len(),
            history_len: state.history.len(),
            was_looping: state.is_looping,
            was_random: state.is_random,
            was_looping_queue: state.is_looping_queue,
        };

        state.queue.clear();
        state.history.clear();
        state.is_looping = false;
        state.is_random = false;
        state.is_looping_queue = false;
        summary
    }

    pub async fn position(&self, query: &str) -> Option<usize> {
        self.state.lock().await.queue.position(query)
    }

    // Vistas

    pub async fn queue_tracks(&self) -> Vec<Track> {
        self.state.lock().await.queue.tracks().to_vec()
    }

    pub async fn render_queue(&self) -> String {
        self.state.lock().await.queue.render(self.render_limit)
    }

    pub async fn history(&self) -> Vec<String> {
        self.state.lock().await.history.clone()
    }

    pub async fn current(&self) -> Option<Track> {
        self.state.lock().await.current.clone()
    }

    pub async fn elapsed(&self) -> u64 {
        self.state.lock().await.elapsed()
    }

    pub async fn status(&self) -> PlayerStatus {
        let state = self.state.lock().await;
        let up_next = if state.queue.is_empty() && state.is_looping_queue {
            state.queue.render_snapshot(self.render_limit)
        } else {
            state.queue.render(self.render_limit)
        };

        PlayerStatus {
            current: state.current.clone(),
            phase: state.phase,
            elapsed: state.elapsed(),
            is_looping: state.is_looping,
            is_random: state.is_random,
            is_looping_queue: state.is_looping_queue,
            queue_len: state.queue.len(),
            next_title: state.queue.tracks().first().map(|t| t.title().to_string()),
            up_next,
        }
    }
}

/// Posición pedida por rewind/forward, saturada al rango de `i64`
fn requested_position(elapsed: u64, amount: u64, mode: StartMode) -> i64 {
    let elapsed = i128::from(elapsed);
    let amount = i128::from(amount);
    let requested = match mode {
        StartMode::Rewind => elapsed - amount,
        _ => elapsed + amount,
    };
    requested.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
