use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

use mixer_bot::{
    audio::manager::MusicManager,
    bot::MixerBot,
    config::Config,
    sources::{TrackResolver, YtDlpResolver},
    storage::PlaylistStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mixer_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Mixer Bot v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let resolver = YtDlpResolver::new(config.ytdlp_path.clone(), config.resolver_concurrency);
    match resolver.verify().await {
        Ok(version) => info!("✅ yt-dlp {}", version),
        Err(e) => error!("❌ yt-dlp no disponible, las búsquedas fallarán: {:?}", e),
    }
    let resolver: Arc<dyn TrackResolver> = Arc::new(resolver);

    let playlists = Arc::new(PlaylistStore::new(config.playlist_path()));

    let http = reqwest::Client::builder()
        .user_agent(concat!("mixer-bot/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let (manager, events) = MusicManager::new(config.clone(), resolver, playlists, http);
    let manager = Arc::new(manager);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = MixerBot::new(config.clone(), manager, events);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    dotenvy::dotenv().ok();
    let binary = std::env::var("YTDLP_PATH").unwrap_or_else(|_| Config::default().ytdlp_path);

    let version = YtDlpResolver::new(binary, 1).verify().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
