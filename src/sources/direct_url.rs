use async_trait::async_trait;
use futures::TryStreamExt;
use std::{io, time::Duration};
use tokio_util::io::StreamReader;
use tracing::info;
use url::Url;

use super::{ByteStream, SourceFetcher};
use crate::error::{PlaybackError, Result};

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".ogg", ".flac", ".m4a", ".opus"];

/// Descarga archivos de audio servidos directamente por HTTP.
pub struct DirectUrlFetcher {
    client: reqwest::Client,
}

impl DirectUrlFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Verifica si la URL apunta a un archivo de audio
    pub fn is_direct_audio(url: &Url) -> bool {
        let path = url.path().to_lowercase();
        AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

impl Default for DirectUrlFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for DirectUrlFetcher {
    async fn open(&self, locator: &str) -> Result<ByteStream> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PlaybackError::source_unavailable(locator, e))?;

        info!(
            "🌐 Descargando {} ({} bytes)",
            locator,
            response
                .content_length()
                .map_or("?".to_string(), |len| len.to_string())
        );

        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }
}
