//! Fuentes de audio.
//!
//! Un [`SourceFetcher`] convierte un localizador remoto en un flujo de bytes
//! crudo que luego alimenta al transcodificador.

pub mod direct_url;
pub mod ytdlp;

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tracing::debug;
use url::Url;

pub use direct_url::DirectUrlFetcher;
pub use ytdlp::YtDlpFetcher;

use crate::error::{PlaybackError, Result};

/// Flujo de bytes del medio remoto.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Trait común para todas las fuentes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Abre el localizador. Falla con `SourceUnavailable` si es inválido o
    /// inaccesible.
    async fn open(&self, locator: &str) -> Result<ByteStream>;
}

/// Elige la fuente según la URL: archivos de audio directos por HTTP, todo
/// lo demás a través de yt-dlp.
pub struct SmartFetcher {
    direct: DirectUrlFetcher,
    ytdlp: YtDlpFetcher,
}

impl SmartFetcher {
    pub fn new(direct: DirectUrlFetcher, ytdlp: YtDlpFetcher) -> Self {
        Self { direct, ytdlp }
    }
}

/// Valida que el localizador sea una URL http(s).
pub fn parse_locator(locator: &str) -> Result<Url> {
    let url = Url::parse(locator).map_err(|e| PlaybackError::source_unavailable(locator, e))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(PlaybackError::source_unavailable(
            locator,
            format!("esquema no soportado: {}", other),
        )),
    }
}

#[async_trait]
impl SourceFetcher for SmartFetcher {
    async fn open(&self, locator: &str) -> Result<ByteStream> {
        let url = parse_locator(locator)?;

        if DirectUrlFetcher::is_direct_audio(&url) {
            debug!("🎯 URL directa de audio: {}", locator);
            self.direct.open(locator).await
        } else {
            debug!("📺 Usando yt-dlp para: {}", locator);
            self.ytdlp.open(locator).await
        }
    }
}
