use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::{
    pipeline::TranscodePipeline, player::AudioPlayer, store::ItemStore,
    transcode::FfmpegTranscoder,
};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::{DirectUrlFetcher, SmartFetcher, YtDlpFetcher};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Directorio de artefactos
    let store = Arc::new(ItemStore::new(&config.download_dir)?);
    if config.cleanup_on_start {
        if let Err(e) = store.sweep_stale().await {
            warn!("No se pudo limpiar {}: {}", store.dir().display(), e);
        }
    }

    let fetcher = SmartFetcher::new(
        DirectUrlFetcher::new(),
        YtDlpFetcher::new(config.ytdlp_path.clone()),
    );
    let transcoder = FfmpegTranscoder::new(config.ffmpeg_path.clone(), config.audio_bitrate_kbps);
    let pipeline = TranscodePipeline::new(
        store,
        Arc::new(fetcher),
        Arc::new(transcoder),
        config.transcode_timeout(),
    );
    let player = Arc::new(AudioPlayer::new(pipeline, config.max_queue_size));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let config = Arc::new(config);
    let handler = JukeboxBot::new(config.clone(), player.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful: cerrar sesiones borra los artefactos
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

    player.leave_all().await;
    info!("👋 Bot detenido");

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
