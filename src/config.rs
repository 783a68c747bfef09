use anyhow::Result;
use ::config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Archivo de configuración opcional, en el directorio de trabajo.
const CONFIG_FILE: &str = "jukebox";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub download_dir: PathBuf,
    pub max_queue_size: usize,
    pub transcode_timeout_secs: u64,
    pub audio_bitrate_kbps: u32,

    // Herramientas externas
    pub ffmpeg_path: String,
    pub ytdlp_path: String,

    /// Borra al iniciar los artefactos que quedaron de una ejecución anterior
    pub cleanup_on_start: bool,
}

impl Config {
    /// Carga `.env`, luego `jukebox.toml` (si existe) y por último las
    /// variables de entorno (`DISCORD_TOKEN`, `MAX_QUEUE_SIZE`, ...).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = ::config::Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Configuración a partir de un TOML, sin tocar el entorno.
    #[cfg(test)]
    fn from_toml(source: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(File::from_str(source, ::config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Validates configuration values for correctness.
    ///
    /// - A Discord token must be present
    /// - The command prefix must not be empty
    /// - Queue size and transcode timeout must be greater than 0
    /// - Bitrate must be a valid MP3 bitrate range (32 to 320 kbps)
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is required");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.transcode_timeout_secs == 0 {
            anyhow::bail!("Transcode timeout must be greater than 0");
        }

        if !(32..=320).contains(&self.audio_bitrate_kbps) {
            anyhow::bail!(
                "Audio bitrate must be between 32 and 320 kbps, got: {}",
                self.audio_bitrate_kbps
            );
        }

        Ok(())
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}kbps MP3 in {}\n  \
            Limits: {} queue, {}s transcode timeout\n  \
            Tools: ffmpeg='{}', yt-dlp='{}'\n  \
            Cleanup on start: {}",
            self.command_prefix,
            self.audio_bitrate_kbps,
            self.download_dir.display(),
            self.max_queue_size,
            self.transcode_timeout_secs,
            self.ffmpeg_path,
            self.ytdlp_path,
            self.cleanup_on_start
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valor por defecto)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            download_dir: "./downloads".into(),
            max_queue_size: 50,
            transcode_timeout_secs: 300, // 5 minutos
            audio_bitrate_kbps: 192,

            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),

            cleanup_on_start: true,
        }
    }
}
