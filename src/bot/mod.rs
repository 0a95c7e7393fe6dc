//! # Bot Module
//!
//! Discord side of Mixer Bot: the serenity [`EventHandler`], prefix command parsing and
//! dispatch, and the task that posts player announcements back to chat.
//!
//! ## Architecture
//!
//! [`MixerBot`] owns a [`MusicManager`] and reacts to three gateway events:
//!
//! - `message`: parses prefix commands and dispatches them through [`handlers`]
//! - `ready`: sets the "listening to" presence and starts the announcement task fed by
//!   the players' [`GuildEvent`]s
//! - `voice_state_update`: leaves empty channels and resets players the bot was kicked from
//!
//! Announcements go to the text channel where the guild last issued a command.

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serenity::{
    all::{ActivityData, ChannelId, Context, EventHandler, GuildId, Message, OnlineStatus, Ready, VoiceState},
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    http::Http,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        manager::MusicManager,
        player::{GuildEvent, PlayerEvent},
    },
    config::Config,
    ui::embeds,
};

/// Main Discord event handler.
pub struct MixerBot {
    pub(crate) config: Arc<Config>,
    pub(crate) manager: Arc<MusicManager>,
    /// Último canal de texto usado por cada servidor
    pub(crate) announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<GuildEvent>>>,
}

impl MixerBot {
    pub fn new(
        config: Arc<Config>,
        manager: Arc<MusicManager>,
        events: mpsc::UnboundedReceiver<GuildEvent>,
    ) -> Self {
        Self {
            config,
            manager,
            announce_channels: Arc::new(DashMap::new()),
            events: Mutex::new(Some(events)),
        }
    }

    /// Number of members (the bot included) in the voice channel the bot sits in.
    fn members_with_bot(ctx: &Context, guild_id: GuildId) -> Option<usize> {
        let bot_id = ctx.cache.current_user().id;
        let guild = ctx.cache.guild(guild_id)?;
        let channel_id = guild.voice_states.get(&bot_id)?.channel_id?;

        Some(
            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(channel_id))
                .count(),
        )
    }
}

#[async_trait]
impl EventHandler for MixerBot {
    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Some(activity) = &self.config.activity {
            let statuses = [OnlineStatus::DoNotDisturb, OnlineStatus::Idle, OnlineStatus::Online];
            let status = statuses
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(OnlineStatus::Online);
            ctx.set_presence(Some(ActivityData::listening(activity.as_str())), status);
        }

        // Reconnects fire `ready` again; the receiver is only taken once
        if let Some(events) = self.events.lock().take() {
            let http = ctx.http.clone();
            let channels = self.announce_channels.clone();
            tokio::spawn(async move {
                announce_events(http, channels, events).await;
            });
        }
    }

    /// Resets the player when the bot is disconnected and leaves channels left empty.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let bot_id = ctx.cache.current_user().id;
        if new.user_id == bot_id {
            if old.is_some() && new.channel_id.is_none() && self.manager.is_connected(guild_id).await {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                if let Err(e) = self.manager.disconnect(guild_id).await {
                    warn!("Error al limpiar estado tras desconexión: {}", e);
                }
            }
            return;
        }

        if let Some(members) = Self::members_with_bot(&ctx, guild_id) {
            debug!("👥 {} miembros en el canal de voz de guild {}", members, guild_id);
            self.manager.on_channel_members(guild_id, members).await;
        }
    }
}

/// Publica los eventos de los reproductores en el último canal de texto usado
async fn announce_events(
    http: Arc<Http>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
    mut events: mpsc::UnboundedReceiver<GuildEvent>,
) {
    while let Some(GuildEvent { guild_id, event }) = events.recv().await {
        let Some(channel_id) = channels.get(&guild_id).map(|c| *c) else {
            debug!("Sin canal de anuncios para guild {}", guild_id);
            continue;
        };

        let embed: CreateEmbed = match event {
            PlayerEvent::NowPlaying(track) => embeds::now_playing_embed(&track),
            PlayerEvent::QueueEmpty => embeds::info_embed("Cola terminada", "📭 No quedan canciones en la cola"),
            PlayerEvent::PlaybackFailed { title, reason } => embeds::error_embed(
                "Error de reproducción",
                &format!("No se pudo reproducir **{}** ({}), saltando", title, reason),
            ),
            PlayerEvent::Disconnected => embeds::info_embed("Desconectado", "👋 Salí del canal de voz"),
        };

        if let Err(e) = channel_id
            .send_message(&http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("No se pudo enviar anuncio en guild {}: {}", guild_id, e);
        }
    }
    info!("Canal de eventos de reproductores cerrado");
}
