use async_trait::async_trait;
use std::{
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, ReadBuf},
    process::{Child, ChildStdout, Command},
};
use tracing::{debug, info, warn};

use super::{ByteStream, SourceFetcher};
use crate::error::{PlaybackError, Result};

/// Extrae el audio de sitios de video con yt-dlp, leyendo su salida estándar.
pub struct YtDlpFetcher {
    binary: String,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Busca archivo de cookies disponible
    async fn find_cookies_file(&self) -> Option<String> {
        let cookies_paths = [
            format!(
                "{}/.config/yt-dlp/cookies.txt",
                std::env::var("HOME").unwrap_or_default()
            ),
            "./cookies.txt".to_string(),
        ];

        for path in cookies_paths {
            if tokio::fs::metadata(&path).await.is_ok() {
                debug!("🍪 Cookies encontradas en: {}", path);
                return Some(path);
            }
        }

        None
    }
}

#[async_trait]
impl SourceFetcher for YtDlpFetcher {
    async fn open(&self, locator: &str) -> Result<ByteStream> {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--format", "bestaudio/best",
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--socket-timeout", "15",
            "--retries", "2",
            "--output", "-",
        ]);

        if let Some(cookies) = self.find_cookies_file().await {
            cmd.args(["--cookies", &cookies]);
        }

        let mut child = cmd
            .arg(locator)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::source_unavailable(locator, format!("yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlaybackError::source_unavailable(locator, "yt-dlp sin stdout"))?;
        let mut stderr = child.stderr.take();
        let mut reader = BufReader::new(stdout);

        // Esperar el primer bloque: si yt-dlp termina sin escribir nada, la
        // URL no es válida o no está disponible
        let first_chunk = reader
            .fill_buf()
            .await
            .map_err(|e| PlaybackError::source_unavailable(locator, e))?
            .len();

        if first_chunk == 0 {
            let mut detail = String::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_string(&mut detail).await;
            }
            let _ = child.wait().await;
            warn!("❌ yt-dlp no devolvió audio para {}: {}", locator, detail.trim());

            let reason = detail.lines().last().unwrap_or("sin datos").to_string();
            return Err(PlaybackError::source_unavailable(locator, reason));
        }

        // Drenar stderr para que yt-dlp nunca se bloquee escribiendo
        if let Some(mut stderr) = stderr {
            tokio::spawn(async move {
                let mut detail = String::new();
                if stderr.read_to_string(&mut detail).await.is_ok() && !detail.trim().is_empty() {
                    debug!("yt-dlp stderr: {}", detail.trim());
                }
            });
        }

        info!("📥 yt-dlp transmitiendo: {}", locator);
        Ok(Box::pin(ChildStream {
            _child: child,
            reader,
        }))
    }
}

/// Salida de yt-dlp; el proceso se mata si el flujo se suelta antes de terminar.
struct ChildStream {
    _child: Child,
    reader: BufReader<ChildStdout>,
}

impl AsyncRead for ChildStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}
