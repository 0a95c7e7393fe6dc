use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{
        manager::{AddReport, PlaylistAddReport},
        player::{ClearSummary, PlaybackPhase, PlayerStatus},
        playlist::Playlist,
        titles::{render_titles, truncate},
    },
    error::MusicError,
    sources::{Track, VideoDetails},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Mixer Bot";

/// Límites de Discord por campo y por descripción
const FIELD_LIMIT: usize = 1024;
const DESCRIPTION_LIMIT: usize = 4096;

fn footer() -> CreateEmbedFooter {
    CreateEmbedFooter::new(STANDARD_FOOTER)
}

fn or_empty(value: &str) -> &str {
    if value.is_empty() {
        "Vacía"
    } else {
        value
    }
}

/// Texto de un campo, recortado al límite de Discord
fn field_text(value: &str) -> String {
    truncate(or_empty(value), FIELD_LIMIT)
}

fn failures_text(failed: &[(String, MusicError)]) -> String {
    let joined = failed
        .iter()
        .map(|(query, error)| format!("`{}`: {}", query, error))
        .collect::<Vec<_>>()
        .join("\n");
    truncate(&joined, FIELD_LIMIT)
}

/// Formats seconds as `M:SS`; minutes are not wrapped into hours.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Anuncio de la canción que empezó a sonar
pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", format_time(track.duration()), true)
        .url(track.webpage_url());

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed.timestamp(Timestamp::now()).footer(footer())
}

/// Full player view for `nowplaying`.
///
/// "Next Track" reflects the active modes: a looping player repeats the current
/// title, a random one cannot know what comes next.
pub fn status_embed(status: &PlayerStatus) -> Option<CreateEmbed> {
    let track = status.current.as_ref()?;
    if status.phase == PlaybackPhase::Idle {
        return None;
    }

    let next = if status.is_looping {
        format!("{} (en bucle)", track.title())
    } else if status.is_random {
        "Aleatorio".to_string()
    } else {
        status.next_title.clone().unwrap_or_else(|| "Ninguna".to_string())
    };

    let title = match status.phase {
        PlaybackPhase::Paused => "⏸️ En Pausa",
        _ => "🎵 Reproduciendo Ahora",
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .color(colors::MUSIC_PURPLE)
        .field("Canción actual", track.title(), false)
        .field("⏱️ Duración", format_time(track.duration()), true)
        .field("⌛ Transcurrido", format_time(status.elapsed), true)
        .field("⏭️ Siguiente", next, false)
        .field("📋 Cola", field_text(&status.up_next), false)
        .field(
            "⚙️ Modos",
            format!(
                "Bucle: **{}**\nAleatorio: **{}**\nBucle de cola: **{}**",
                status.is_looping, status.is_random, status.is_looping_queue
            ),
            false,
        )
        .url(track.webpage_url());

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.image(thumbnail);
    }

    Some(embed.timestamp(Timestamp::now()).footer(footer()))
}

pub fn queue_embed(rendered: &str, len: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(or_empty(rendered))
        .color(colors::INFO_BLUE)
        .field("Canciones", len.to_string(), true)
        .timestamp(Timestamp::now())
        .footer(footer())
}

pub fn history_embed(titles: &[String], limit: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("🕘 Historial")
        .description(or_empty(&crate::audio::titles::render_titles(titles, limit)))
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(footer())
}

pub fn playlist_embed(playlist: &Playlist, limit: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("💾 Playlist del Servidor")
        .description(or_empty(&playlist.render(limit)))
        .color(colors::MUSIC_PURPLE)
        .field("Canciones", playlist.len().to_string(), true)
        .timestamp(Timestamp::now())
        .footer(footer())
}

/// Resumen de un `add`: lo agregado, lo que falló y si empezó a sonar algo
pub fn add_report_embed(report: &AddReport, queue_rendered: &str, limit: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canciones Agregadas")
        .color(colors::SUCCESS_GREEN);

    if report.added.is_empty() {
        embed = embed.title("⚠️ Nada Agregado").color(colors::WARNING_ORANGE);
    } else {
        embed = embed.description(added_text("Agregadas", &render_titles(&report.added, limit)));
    }

    if !report.failed.is_empty() {
        embed = embed.field("❌ Fallidas", failures_text(&report.failed), false);
    }

    if let Some(track) = &report.started {
        embed = embed.field("▶️ Reproduciendo", field_text(track.title()), false);
    }

    embed
        .field("📋 Cola", field_text(queue_rendered), false)
        .timestamp(Timestamp::now())
        .footer(footer())
}

fn added_text(label: &str, rendered: &str) -> String {
    truncate(&format!("{}: {}", label, rendered), DESCRIPTION_LIMIT)
}

pub fn playlist_add_embed(report: &PlaylistAddReport, limit: usize) -> CreateEmbed {
    let description = if report.added.is_empty() {
        "No se agregó ninguna canción nueva".to_string()
    } else {
        added_text("Agregadas a la playlist", &render_titles(&report.added, limit))
    };

    let mut embed = CreateEmbed::default()
        .title("💾 Playlist Actualizada")
        .description(description)
        .color(colors::SUCCESS_GREEN);

    if !report.failed.is_empty() {
        embed = embed.field("❌ Fallidas", failures_text(&report.failed), false);
    }

    embed
        .field("Playlist", field_text(&report.playlist.render(limit)), false)
        .timestamp(Timestamp::now())
        .footer(footer())
}

/// Datos del track actual, enviados por mensaje directo con `yoink`
pub fn track_info_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎧 Información del Track")
        .color(colors::MUSIC_PURPLE)
        .field("Nombre", field_text(track.title()), false)
        .field("URL", field_text(track.webpage_url()), false);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.image(thumbnail);
    }

    embed.timestamp(Timestamp::now()).footer(footer())
}

fn format_count(count: Option<u64>) -> String {
    count
        .map(|n| n.to_formatted_string(&Locale::en))
        .unwrap_or_else(|| "Desconocido".to_string())
}

/// `YYYYMMDD` as `DD/MM/YYYY`.
fn format_upload_date(raw: Option<&str>) -> String {
    raw.and_then(|raw| NaiveDate::parse_from_str(raw, "%Y%m%d").ok())
        .map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "Fecha desconocida".to_string())
}

/// Ficha de un video para `ytsearch`
pub fn video_details_embed(details: &VideoDetails) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🔎 Búsqueda en YouTube")
        .color(colors::INFO_BLUE)
        .field("Título", field_text(&format!("`{}`", details.title)), true)
        .field(
            "Autor",
            field_text(&format!("`{}`", details.uploader.as_deref().unwrap_or("Desconocido"))),
            true,
        )
        .field("👁️ Vistas", format!("`{}`", format_count(details.views)), true)
        .field("👍 Me gusta", format!("`{}`", format_count(details.likes)), true)
        .field("⏱️ Duración", format!("`{}`", format_time(details.duration)), true)
        .field(
            "📅 Publicado",
            format!("`{}`", format_upload_date(details.upload_date.as_deref())),
            true,
        );

    if let Some(description) = &details.description {
        embed = embed.field("Descripción", field_text(description), false);
    }

    embed = embed
        .field("URL", field_text(&details.webpage_url), false)
        .url(&details.webpage_url);

    if let Some(thumbnail) = &details.thumbnail {
        embed = embed.image(thumbnail);
    }

    embed.timestamp(Timestamp::now()).footer(footer())
}

pub fn clear_embed(summary: &ClearSummary) -> CreateEmbed {
    CreateEmbed::default()
        .title("🧹 Cola Limpiada")
        .description(format!(
            "Se eliminaron **{}** canciones y **{}** entradas del historial",
            summary.queue_len, summary.history_len
        ))
        .field(
            "⚙️ Modos desactivados",
            format!(
                "Bucle: **{}**\nAleatorio: **{}**\nBucle de cola: **{}**",
                summary.was_looping, summary.was_random, summary.was_looping_queue
            ),
            false,
        )
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(footer())
}

pub fn help_embed(prefix: &str) -> CreateEmbed {
    let p = prefix;
    CreateEmbed::default()
        .title("🎵 Mixer Bot - Guía de Comandos")
        .color(colors::INFO_BLUE)
        .description(format!("Prefijo de comandos: **{}**", p))
        .field(
            "🔊 Conexión",
            format!("• `{p}join` - Entra a tu canal de voz\n• `{p}leave` - Sale del canal"),
            false,
        )
        .field(
            "🎵 Reproducción",
            format!(
                "• `{p}add <búsqueda|url> ...` - Agrega canciones\n\
                • `{p}playnow <búsqueda|url>` - Reproduce de inmediato\n\
                • `{p}select <nombre>` - Reproduce una canción de la cola\n\
                • `{p}skip` / `{p}pause` / `{p}resume` / `{p}stop` / `{p}restart`\n\
                • `{p}seek <MM:SS>` / `{p}rewind <MM:SS>` / `{p}forward <MM:SS>`\n\
                • `{p}duration` / `{p}nowplaying`"
            ),
            false,
        )
        .field(
            "📜 Cola",
            format!(
                "• `{p}list` / `{p}history` / `{p}getindex <nombre>`\n\
                • `{p}remove <nombre> ...` / `{p}reposition <nombre> <índice>`\n\
                • `{p}shuffle` / `{p}sort` / `{p}removedupes` / `{p}clear`\n\
                • `{p}loop` / `{p}random` / `{p}loopqueue`"
            ),
            false,
        )
        .field(
            "💾 Playlist",
            format!(
                "• `{p}playlistcreate` / `{p}playlistadd <búsqueda|url> ...` / `{p}playlistaddcurrent`\n\
                • `{p}playlistselect` / `{p}playlistfetch <nombre> ...` / `{p}playlistqueue`\n\
                • `{p}playlistremove <nombre> ...` / `{p}playlistreposition <nombre> <índice>`\n\
                • `{p}playlistshuffle` / `{p}playlistgetindex <nombre>`\n\
                • `{p}playlistdelete` / `{p}playlistrewrite`"
            ),
            false,
        )
        .field(
            "🛠️ Utilidades",
            format!(
                "• `{p}yoink` - Te envía el track actual por mensaje directo\n\
                • `{p}ytsearch <búsqueda|url>` - Muestra la ficha de un video\n\
                • `{p}bitrate` - Bitrate de mi canal de voz\n\
                • `{p}ping` - Latencia del bot"
            ),
            false,
        )
        .timestamp(Timestamp::now())
        .footer(footer())
}

/// Crea un embed de error
pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(footer())
}

/// Crea un embed de éxito
pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(footer())
}

/// Crea un embed de información
pub fn info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(footer())
}
