use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::{
    audio::titles::render_titles,
    bot::{
        commands::{Command, ParseError},
        MixerBot,
    },
    error::MusicError,
    sources::Track,
    ui::embeds::{self, format_time},
};

/// Punto de entrada para mensajes con prefijo
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &MixerBot) -> Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let command = match Command::parse(&msg.content, &bot.config.command_prefix) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(()),
        Err(e) => return reply_parse_error(ctx, msg, bot, e).await,
    };

    info!(
        "📝 Comando {:?} usado por {} en guild {}",
        command, msg.author.name, guild_id
    );

    if let Some(role) = &bot.config.required_role {
        if !has_required_role(ctx, msg, guild_id, role).await {
            return send(
                ctx,
                msg.channel_id,
                embeds::error_embed("Sin permiso", "No tienes el rol requerido para usar este comando"),
            )
            .await;
        }
    }

    bot.announce_channels.insert(guild_id, msg.channel_id);

    if !command.is_offline() {
        if let Err(reply) = ensure_voice(ctx, msg, bot, guild_id, &command).await {
            return send(ctx, msg.channel_id, reply).await;
        }
    }

    let embed = match run(ctx, msg, bot, guild_id, command).await {
        Ok(embed) => embed,
        Err(e) => error_reply(&e),
    };
    send(ctx, msg.channel_id, embed).await
}

async fn reply_parse_error(ctx: &Context, msg: &Message, bot: &MixerBot, e: ParseError) -> Result<()> {
    let prefix = &bot.config.command_prefix;
    let description = match &e {
        ParseError::UnknownCommand(_) => format!("{}\nUsa `{}help` para ver los comandos", e, prefix),
        _ => e.to_string(),
    };
    send(ctx, msg.channel_id, embeds::error_embed("Comando inválido", &description)).await
}

async fn send(ctx: &Context, channel_id: ChannelId, embed: CreateEmbed) -> Result<()> {
    channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

fn error_reply(e: &MusicError) -> CreateEmbed {
    if e.is_user_error() {
        return embeds::error_embed("Error", &e.to_string());
    }

    error!("❌ Error ejecutando comando: {}", e);
    match e {
        MusicError::Unknown(_) => embeds::error_embed("Error inesperado", "Algo salió mal, inténtalo de nuevo"),
        _ => embeds::error_embed("Error", &e.to_string()),
    }
}

/// A role that doesn't exist in the guild is ignored.
async fn has_required_role(ctx: &Context, msg: &Message, guild_id: GuildId, role_name: &str) -> bool {
    let role_id = ctx.cache.guild(guild_id).and_then(|guild| {
        guild
            .roles
            .values()
            .find(|role| role.name == role_name)
            .map(|role| role.id)
    });

    let Some(role_id) = role_id else {
        warn!("Ignorando rol inexistente \"{}\" en guild {}", role_name, guild_id);
        return true;
    };

    if let Some(member) = &msg.member {
        return member.roles.contains(&role_id);
    }

    match guild_id.member(ctx, msg.author.id).await {
        Ok(member) => member.roles.contains(&role_id),
        Err(e) => {
            warn!("No se pudo obtener el miembro {}: {}", msg.author.id, e);
            false
        }
    }
}

fn voice_channel_of(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id))
}

/// Connects when the command allows it and checks the caller shares the bot's channel.
async fn ensure_voice(
    ctx: &Context,
    msg: &Message,
    bot: &MixerBot,
    guild_id: GuildId,
    command: &Command,
) -> Result<(), CreateEmbed> {
    let user_channel = voice_channel_of(ctx, guild_id, msg.author.id);
    let bot_channel = voice_channel_of(ctx, guild_id, ctx.cache.current_user().id);
    let connected = bot.manager.is_connected(guild_id).await;

    match (user_channel, connected) {
        (None, _) => Err(embeds::error_embed("Sin canal", "Únete a un canal de voz primero")),
        (Some(channel_id), false) if command.joins_voice() => {
            let songbird = songbird::get(ctx)
                .await
                .ok_or_else(|| embeds::error_embed("Error", "Songbird no inicializado"))?;
            bot.manager
                .connect(songbird, guild_id, channel_id)
                .await
                .map_err(|e| error_reply(&e))
        }
        (Some(_), false) => Err(error_reply(&MusicError::NotConnected)),
        (Some(channel_id), true) if bot_channel.is_some_and(|c| c != channel_id) => {
            Err(embeds::error_embed("Canal distinto", "Entra a mi canal de voz primero"))
        }
        (Some(_), true) => Ok(()),
    }
}

fn toggled(name: &str, enabled: bool) -> CreateEmbed {
    let state = if enabled { "activado" } else { "desactivado" };
    embeds::success_embed(name, &format!("{} **{}**", name, state))
}

/// User indices are 1-based; 0 is out of range like any index past the end.
fn zero_based(index: usize) -> usize {
    index.checked_sub(1).unwrap_or(usize::MAX)
}

fn removal_summary(removed: &[String], not_found: &[String], limit: usize) -> String {
    let mut lines = Vec::new();
    if !removed.is_empty() {
        lines.push(format!("Eliminadas: {}", render_titles(removed, limit)));
    }
    if !not_found.is_empty() {
        lines.push(format!("No encontradas: {}", render_titles(not_found, limit)));
    }
    lines.join("\n")
}

fn skip_summary(skipped: Option<&Track>, next: Option<&Track>) -> String {
    let skipped = match skipped {
        Some(track) => format!("⏭️ Saltado **{}**", track.title()),
        None => "⏭️ Saltado".to_string(),
    };
    match next {
        Some(track) => format!("{}\n▶️ Ahora suena **{}**", skipped, track.title()),
        None => format!("{}\n📭 No quedan canciones en la cola", skipped),
    }
}

fn bitrate_text(bitrate: u32) -> String {
    format!("🎚️ Bitrate: **{}kbps**", bitrate / 1000)
}

/// Envía el track actual por mensaje directo a quien lo pidió
async fn yoink(
    ctx: &Context,
    msg: &Message,
    bot: &MixerBot,
    guild_id: GuildId,
) -> Result<CreateEmbed, MusicError> {
    let track = bot.manager.now_playing(guild_id).await?;

    let dm = CreateMessage::new().embed(embeds::track_info_embed(&track));
    if let Err(e) = msg.author.direct_message(ctx, dm).await {
        warn!("No se pudo enviar DM a {}: {}", msg.author.name, e);
        return Ok(embeds::error_embed(
            "Sin mensajes directos",
            "No puedo enviarte mensajes directos",
        ));
    }

    Ok(embeds::success_embed("Enviado", &format!("📬 **{}** enviado por mensaje directo", track.title())))
}

/// Bitrate of the voice channel the bot sits in, read from the cache.
fn bitrate(ctx: &Context, guild_id: GuildId) -> Result<CreateEmbed, MusicError> {
    let bot_id = ctx.cache.current_user().id;
    let bot_channel = voice_channel_of(ctx, guild_id, bot_id).ok_or(MusicError::NotConnected)?;
    let bitrate = ctx
        .cache
        .guild(guild_id)
        .and_then(|guild| guild.channels.get(&bot_channel).and_then(|c| c.bitrate))
        .ok_or(MusicError::NotConnected)?;

    Ok(embeds::info_embed("Bitrate", &bitrate_text(bitrate)))
}

async fn ping(ctx: &Context) -> Result<CreateEmbed, MusicError> {
    let started = Instant::now();
    ctx.http
        .get_current_user()
        .await
        .map_err(|e| MusicError::Unknown(e.into()))?;
    let latency = started.elapsed();

    Ok(embeds::info_embed(
        "Pong!",
        &format!("🏓 Latencia: **{:.1}ms**", latency.as_secs_f64() * 1000.0),
    ))
}

async fn run(
    ctx: &Context,
    msg: &Message,
    bot: &MixerBot,
    guild_id: GuildId,
    command: Command,
) -> Result<CreateEmbed, MusicError> {
    let manager = &bot.manager;
    let limit = bot.config.render_limit;

    let embed = match command {
        Command::Help => embeds::help_embed(&bot.config.command_prefix),
        Command::Join => embeds::success_embed("Conectado", "🔊 Listo para reproducir música"),
        Command::Leave => {
            manager.disconnect(guild_id).await?;
            embeds::info_embed("Desconectado", "👋 Hasta luego")
        }

        Command::Add(queries) => {
            let report = manager.add(guild_id, &queries).await?;
            let rendered = manager.player(guild_id).render_queue().await;
            embeds::add_report_embed(&report, &rendered, limit)
        }
        Command::PlayNow(query) => {
            let track = manager.play_now(guild_id, &query).await?;
            embeds::success_embed("Reproducción inmediata", &format!("▶️ **{}**", track.title()))
        }
        Command::Remove(names) => {
            let report = manager.remove(guild_id, &names).await?;
            let description = removal_summary(&report.removed_titles(), &report.not_found, limit);
            embeds::info_embed("Cola actualizada", &description)
        }
        Command::Reposition { query, index } => {
            let track = manager.reposition(guild_id, &query, zero_based(index)).await?;
            embeds::success_embed(
                "Cola actualizada",
                &format!("**{}** movida a la posición **{}**", track.title(), index),
            )
        }
        Command::Select(query) => {
            let track = manager.select(guild_id, &query).await?;
            embeds::success_embed("Seleccionada", &format!("▶️ **{}**", track.title()))
        }
        Command::Skip => {
            let skipped = manager.skip(guild_id).await?;
            let next = manager.player(guild_id).current().await;
            embeds::success_embed("Saltado", &skip_summary(skipped.as_ref(), next.as_ref()))
        }
        Command::Pause => {
            let track = manager.pause(guild_id).await?;
            embeds::info_embed("Pausado", &format!("⏸️ **{}**", track.title()))
        }
        Command::Resume => {
            let track = manager.resume(guild_id).await?;
            embeds::info_embed("Reanudado", &format!("▶️ **{}**", track.title()))
        }
        Command::Stop => {
            manager.stop(guild_id).await?;
            embeds::info_embed("Detenido", "⏹️ Reproducción detenida y modos reiniciados")
        }
        Command::Restart => {
            let track = manager.restart(guild_id).await?;
            embeds::info_embed("Reiniciado", &format!("🔄 **{}**", track.title()))
        }
        Command::Clear => embeds::clear_embed(&manager.clear(guild_id).await?),
        Command::RemoveDupes => {
            let removed = manager.dedupe(guild_id).await?;
            embeds::success_embed(
                "Duplicados eliminados",
                &format!("Se eliminaron **{}** canciones duplicadas", removed.len()),
            )
        }
        Command::Loop => toggled("Bucle", manager.toggle_loop(guild_id).await?),
        Command::Random => toggled("Aleatorio", manager.toggle_random(guild_id).await?),
        Command::LoopQueue => toggled("Bucle de cola", manager.toggle_loop_queue(guild_id).await?),
        Command::Shuffle => {
            manager.shuffle(guild_id).await?;
            let rendered = manager.render_queue(guild_id).await?;
            embeds::success_embed("Cola mezclada", &rendered)
        }
        Command::Sort => {
            manager.sort(guild_id).await?;
            let rendered = manager.render_queue(guild_id).await?;
            embeds::success_embed("Cola ordenada", &rendered)
        }
        Command::List => {
            let rendered = manager.render_queue(guild_id).await?;
            let len = manager.player(guild_id).queue_tracks().await.len();
            embeds::queue_embed(&rendered, len)
        }
        Command::History => embeds::history_embed(&manager.history(guild_id).await?, limit),
        Command::Seek(position) => {
            let at = manager.seek(guild_id, position).await?;
            embeds::info_embed("Posición", &format!("⏩ Posición ajustada a **{}**", format_time(at)))
        }
        Command::Rewind(amount) => {
            let at = manager.rewind(guild_id, amount).await?;
            embeds::info_embed("Retroceso", &format!("⏪ Retrocedido a **{}**", format_time(at)))
        }
        Command::Forward(amount) => {
            let at = manager.forward(guild_id, amount).await?;
            embeds::info_embed("Avance", &format!("⏩ Avanzado a **{}**", format_time(at)))
        }
        Command::Duration => {
            let status = manager.status(guild_id).await?;
            let track = status.current.as_ref().ok_or(MusicError::NotPlaying)?;
            embeds::info_embed(
                "Duración",
                &format!(
                    "**{}**\n{} / {}",
                    track.title(),
                    format_time(status.elapsed),
                    format_time(track.duration())
                ),
            )
        }
        Command::NowPlaying => {
            let status = manager.status(guild_id).await?;
            embeds::status_embed(&status).ok_or(MusicError::NotPlaying)?
        }
        Command::GetIndex(query) => {
            let (index, title) = manager.position(guild_id, &query).await?;
            embeds::info_embed("Posición", &format!("**{}** está en la posición **{}**", title, index + 1))
        }

        Command::PlaylistCreate => {
            let playlist = manager.playlist_create(guild_id).await?;
            embeds::playlist_embed(&playlist, limit)
        }
        Command::PlaylistAdd(queries) => {
            let report = manager.playlist_add(guild_id, &queries).await?;
            embeds::playlist_add_embed(&report, limit)
        }
        Command::PlaylistAddCurrent => {
            let (entry, _) = manager.playlist_add_current(guild_id).await?;
            embeds::success_embed("Playlist actualizada", &format!("**{}** agregada a la playlist", entry.title))
        }
        Command::PlaylistDelete => {
            manager.playlist_delete(guild_id).await?;
            embeds::success_embed("Playlist eliminada", "🗑️ La playlist del servidor está vacía")
        }
        Command::PlaylistSelect => {
            let report = manager.playlist_select(guild_id).await?;
            let rendered = manager.player(guild_id).render_queue().await;
            embeds::add_report_embed(&report, &rendered, limit)
        }
        Command::PlaylistQueue => embeds::playlist_embed(&manager.playlist_queue(guild_id).await?, limit),
        Command::PlaylistFetch(names) => {
            let report = manager.playlist_fetch(guild_id, &names).await?;
            let rendered = manager.player(guild_id).render_queue().await;
            embeds::add_report_embed(&report, &rendered, limit)
        }
        Command::PlaylistRemove(names) => {
            let (report, playlist) = manager.playlist_remove(guild_id, &names).await?;
            let description = removal_summary(&report.removed_titles(), &report.not_found, limit);
            embeds::playlist_embed(&playlist, limit).title("💾 Playlist Actualizada").description(description)
        }
        Command::PlaylistReposition { query, index } => {
            let (entry, playlist) = manager
                .playlist_reposition(guild_id, &query, zero_based(index))
                .await?;
            embeds::playlist_embed(&playlist, limit).description(format!(
                "**{}** movida a la posición **{}**\n\n{}",
                entry.title,
                index,
                playlist.render(limit)
            ))
        }
        Command::PlaylistShuffle => embeds::playlist_embed(&manager.playlist_shuffle(guild_id).await?, limit),
        Command::PlaylistRewrite => {
            manager.playlist_rewrite(guild_id).await?;
            embeds::success_embed("Archivo reescrito", "♻️ El archivo de playlists fue recreado")
        }
        Command::PlaylistGetIndex(query) => {
            let (index, title) = manager.playlist_position(guild_id, &query).await?;
            embeds::info_embed("Posición", &format!("**{}** está en la posición **{}**", title, index + 1))
        }

        Command::Yoink => yoink(ctx, msg, bot, guild_id).await?,
        Command::YtSearch(query) => embeds::video_details_embed(&manager.lookup(&query).await?),
        Command::Bitrate => bitrate(ctx, guild_id)?,
        Command::Ping => ping(ctx).await?,
    };

    Ok(embed)
}
