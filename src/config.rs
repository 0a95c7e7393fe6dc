use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub required_role: Option<String>, // Rol requerido para comandos de música
    pub activity: Option<String>,      // "Escuchando ..." al iniciar, `none` lo desactiva

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Paths
    pub data_dir: PathBuf,
    pub playlist_file: String,

    // yt-dlp
    pub ytdlp_path: String,
    pub resolver_concurrency: usize,

    // Límites
    pub render_limit: usize, // Caracteres por campo de embed
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("no se pudo crear {}", config.data_dir.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Builds a configuration from an arbitrary variable source.
    ///
    /// Unset or blank variables fall back to [`Config::default`]; `DISCORD_TOKEN` is the
    /// only required one.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: get("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),
            required_role: get("REQUIRED_ROLE"),
            activity: get("BOT_ACTIVITY")
                .or(defaults.activity)
                .filter(|a| !a.eq_ignore_ascii_case("none")),

            default_volume: parse_or(get("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(get("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            playlist_file: get("PLAYLIST_FILE").unwrap_or(defaults.playlist_file),

            ytdlp_path: get("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            resolver_concurrency: parse_or(
                get("RESOLVER_CONCURRENCY"),
                "RESOLVER_CONCURRENCY",
                defaults.resolver_concurrency,
            )?,

            render_limit: parse_or(get("RENDER_LIMIT"), "RENDER_LIMIT", defaults.render_limit)?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and resolver concurrency must be greater than 0
    /// - The render limit must leave room for the truncation marker and fit in an embed field
    /// - The command prefix cannot be empty or contain whitespace
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolver_concurrency == 0 {
            anyhow::bail!("Resolver concurrency must be greater than 0");
        }

        if self.render_limit < 64 {
            anyhow::bail!("Render limit too low, minimum 64 characters, got: {}", self.render_limit);
        }

        if self.render_limit > 1024 {
            anyhow::bail!(
                "Render limit cannot exceed 1024 characters (Discord field limit), got: {}",
                self.render_limit
            );
        }

        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace) {
            anyhow::bail!("Command prefix cannot be empty or contain whitespace");
        }

        if self.playlist_file.trim().is_empty() {
            anyhow::bail!("Playlist file name cannot be empty");
        }

        Ok(())
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.data_dir.join(&self.playlist_file)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix '{}', required role {}\n  \
            Audio: {}% vol, {} tracks max queue\n  \
            Storage: {}\n  \
            Resolver: {} ({} concurrent)",
            self.command_prefix,
            self.required_role.as_deref().unwrap_or("none"),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.playlist_path().display(),
            self.ytdlp_path,
            self.resolver_concurrency,
        )
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("valor inválido para {}: {}", key, raw)),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: ">".to_string(),
            required_role: None,
            activity: Some("lofi music".to_string()),
            default_volume: 0.5,
            max_queue_size: 100,
            data_dir: PathBuf::from("./data"),
            playlist_file: "playlists.json".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            resolver_concurrency: 3,
            render_limit: 1024,
        }
    }
}
