use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    input::HttpRequest, tracks::TrackHandle, Call, Event, EventContext,
    EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::MusicError;

/// Why a delivered track stopped producing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end of the stream.
    Finished,
    /// Replaced or stopped on request.
    StoppedExplicitly,
    /// The stream errored out.
    Failed,
}

/// Completion notice for the track started with `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub generation: u64,
    pub reason: EndReason,
}

/// Plays audio into a guild's voice connection.
///
/// `play` replaces whatever was playing. The replaced track reports
/// [`EndReason::StoppedExplicitly`] so it never advances the queue.
#[async_trait]
pub trait AudioDelivery: Send + Sync {
    async fn play(&self, source_url: &str, offset: Duration, generation: u64) -> Result<(), MusicError>;
    async fn stop(&self);
    async fn pause(&self) -> Result<(), MusicError>;
    async fn resume(&self) -> Result<(), MusicError>;
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;
    async fn leave(&self) -> Result<(), MusicError>;
}

struct ActiveTrack {
    handle: TrackHandle,
    generation: u64,
    stopping: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    paused: bool,
}

impl ActiveTrack {
    fn is_live(&self) -> bool {
        !self.ended.load(Ordering::SeqCst)
    }
}

/// [`AudioDelivery`] backed by a songbird call streaming over HTTP.
pub struct SongbirdDelivery {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    events: mpsc::UnboundedSender<DeliveryEvent>,
    active: SyncMutex<Option<ActiveTrack>>,
}

impl SongbirdDelivery {
    pub fn new(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        call: Arc<Mutex<Call>>,
        http: reqwest::Client,
        volume: f32,
        events: mpsc::UnboundedSender<DeliveryEvent>,
    ) -> Self {
        Self {
            manager,
            guild_id,
            call,
            http,
            volume,
            events,
            active: SyncMutex::new(None),
        }
    }

    fn stop_active(&self) {
        if let Some(active) = self.active.lock().take() {
            active.stopping.store(true, Ordering::SeqCst);
            if active.is_live() {
                let _ = active.handle.stop();
                debug!("⏹️ Track {} detenido", active.generation);
            }
        }
    }

    fn register_events(
        &self,
        handle: &TrackHandle,
        generation: u64,
        stopping: &Arc<AtomicBool>,
        ended: &Arc<AtomicBool>,
    ) -> Result<(), MusicError> {
        for (event, on_error) in [(TrackEvent::End, false), (TrackEvent::Error, true)] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        generation,
                        on_error,
                        stopping: stopping.clone(),
                        ended: ended.clone(),
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| MusicError::Delivery(format!("error al agregar event handler: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AudioDelivery for SongbirdDelivery {
    async fn play(&self, source_url: &str, offset: Duration, generation: u64) -> Result<(), MusicError> {
        self.stop_active();

        let input = HttpRequest::new(self.http.clone(), source_url.to_string());
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input.into())
        };

        if let Err(e) = prepare(&handle, self.volume, offset).await {
            let _ = handle.stop();
            return Err(e);
        }

        let stopping = Arc::new(AtomicBool::new(false));
        let ended = Arc::new(AtomicBool::new(false));
        self.register_events(&handle, generation, &stopping, &ended)?;

        *self.active.lock() = Some(ActiveTrack {
            handle,
            generation,
            stopping,
            ended,
            paused: false,
        });

        info!("🎵 Stream iniciado (gen {}) en {}s", generation, offset.as_secs());
        Ok(())
    }

    async fn stop(&self) {
        self.stop_active();
    }

    async fn pause(&self) -> Result<(), MusicError> {
        let mut active = self.active.lock();
        match active.as_mut() {
            Some(track) if track.is_live() && !track.paused => {
                track
                    .handle
                    .pause()
                    .map_err(|e| MusicError::Delivery(e.to_string()))?;
                track.paused = true;
                Ok(())
            }
            _ => Err(MusicError::NotPlaying),
        }
    }

    async fn resume(&self) -> Result<(), MusicError> {
        let mut active = self.active.lock();
        match active.as_mut() {
            Some(track) if track.is_live() && track.paused => {
                track
                    .handle
                    .play()
                    .map_err(|e| MusicError::Delivery(e.to_string()))?;
                track.paused = false;
                Ok(())
            }
            _ => Err(MusicError::NotPaused),
        }
    }

    fn is_playing(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|t| t.is_live() && !t.paused)
    }

    fn is_paused(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|t| t.is_live() && t.paused)
    }

    async fn leave(&self) -> Result<(), MusicError> {
        self.stop_active();
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| MusicError::Delivery(format!("error al salir del canal: {}", e)))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Aplica volumen y posición inicial antes de registrar los eventos del track
async fn prepare(handle: &TrackHandle, volume: f32, offset: Duration) -> Result<(), MusicError> {
    handle
        .set_volume(volume)
        .map_err(|e| MusicError::Delivery(format!("error al ajustar volumen: {}", e)))?;
    if !offset.is_zero() {
        handle
            .seek_async(offset)
            .await
            .map_err(|e| MusicError::Delivery(format!("error al buscar {}s: {}", offset.as_secs(), e)))?;
    }
    Ok(())
}

/// Handler para cuando termina una canción
struct TrackEndNotifier {
    generation: u64,
    on_error: bool,
    stopping: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<DeliveryEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if matches!(ctx, EventContext::Track(_)) {
            self.notify();
        }
        None
    }
}

impl TrackEndNotifier {
    /// Sends the completion notice once per track; later calls return `None`.
    fn notify(&self) -> Option<EndReason> {
        // End and Error can both fire for one track
        if self.ended.swap(true, Ordering::SeqCst) {
            return None;
        }

        let reason = if self.stopping.load(Ordering::SeqCst) {
            EndReason::StoppedExplicitly
        } else if self.on_error {
            warn!("❌ Error de reproducción en track {}", self.generation);
            EndReason::Failed
        } else {
            EndReason::Finished
        };

        debug!("Track {} terminado: {:?}", self.generation, reason);
        let _ = self.events.send(DeliveryEvent {
            generation: self.generation,
            reason,
        });
        Some(reason)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct PlayCall {
        pub source_url: String,
        pub offset: Duration,
        pub generation: u64,
    }

    /// In-memory delivery that records what it was asked to do.
    #[derive(Default)]
    pub(crate) struct FakeDelivery {
        pub plays: SyncMutex<Vec<PlayCall>>,
        pub stops: SyncMutex<usize>,
        pub left: AtomicBool,
        pub fail_next_play: AtomicBool,
        state: SyncMutex<(bool, bool)>,
    }

    impl FakeDelivery {
        pub fn last_play(&self) -> Option<PlayCall> {
            self.plays.lock().last().cloned()
        }

        pub fn play_count(&self) -> usize {
            self.plays.lock().len()
        }
    }

    #[async_trait]
    impl AudioDelivery for FakeDelivery {
        async fn play(&self, source_url: &str, offset: Duration, generation: u64) -> Result<(), MusicError> {
            if self.fail_next_play.swap(false, Ordering::SeqCst) {
                return Err(MusicError::Delivery("stream refused".into()));
            }
            self.plays.lock().push(PlayCall {
                source_url: source_url.to_string(),
                offset,
                generation,
            });
            *self.state.lock() = (true, false);
            Ok(())
        }

        async fn stop(&self) {
            *self.stops.lock() += 1;
            *self.state.lock() = (false, false);
        }

        async fn pause(&self) -> Result<(), MusicError> {
            let mut state = self.state.lock();
            if !state.0 {
                return Err(MusicError::NotPlaying);
            }
            *state = (false, true);
            Ok(())
        }

        async fn resume(&self) -> Result<(), MusicError> {
            let mut state = self.state.lock();
            if !state.1 {
                return Err(MusicError::NotPaused);
            }
            *state = (true, false);
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.state.lock().0
        }

        fn is_paused(&self) -> bool {
            self.state.lock().1
        }

        async fn leave(&self) -> Result<(), MusicError> {
            self.left.store(true, Ordering::SeqCst);
            *self.state.lock() = (false, false);
            Ok(())
        }
    }
}
