//! Conversión de cualquier flujo de entrada a un MP3 local.

use async_trait::async_trait;
use std::{
    io,
    path::Path,
    process::Stdio,
    time::Duration,
};
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    error::{PlaybackError, Result},
    sources::ByteStream,
};

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Consume `input` y escribe el audio convertido en `destination`.
    async fn transcode(&self, input: ByteStream, destination: &Path) -> Result<()>;

    /// Comprueba el archivo producido y devuelve su duración.
    async fn probe(&self, path: &Path) -> Result<Option<Duration>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || probe_artifact(&path))
            .await
            .map_err(|e| PlaybackError::Transcode(format!("probe abortado: {}", e)))?
    }
}

/// Transcodificador basado en FFmpeg (`libmp3lame`).
pub struct FfmpegTranscoder {
    binary: String,
    bitrate_kbps: u32,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>, bitrate_kbps: u32) -> Self {
        Self {
            binary: binary.into(),
            bitrate_kbps,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, mut input: ByteStream, destination: &Path) -> Result<()> {
        let bitrate = format!("{}k", self.bitrate_kbps);

        let mut child = Command::new(&self.binary)
            .args([
                "-hide_banner",
                "-loglevel", "error",
                "-y",
                "-i", "pipe:0",
                "-vn",
                "-acodec", "libmp3lame",
                "-b:a", &bitrate,
                "-f", "mp3",
            ])
            .arg(destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Transcode(format!("no se pudo iniciar ffmpeg: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PlaybackError::Transcode("ffmpeg sin stdin".to_string()))?;

        let feed = async move {
            let copied = tokio::io::copy(&mut input, &mut stdin).await;
            // Cerrar stdin para que ffmpeg vea EOF
            drop(stdin);
            copied
        };

        let (copied, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| PlaybackError::Transcode(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("sin detalle").to_string();
            warn!("❌ ffmpeg terminó con {}: {}", output.status, stderr.trim());
            return Err(PlaybackError::Transcode(reason));
        }

        match copied {
            Ok(bytes) => {
                debug!("🎚️ ffmpeg procesó {} bytes de entrada", bytes);
                Ok(())
            }
            // ffmpeg puede cerrar la entrada antes de tiempo sin que sea un error
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(PlaybackError::Transcode(format!("entrada interrumpida: {}", e))),
        }
    }
}

/// Verifica con Symphonia que el artefacto se puede decodificar y obtiene su
/// duración, si el contenedor la declara.
pub fn probe_artifact(path: &Path) -> Result<Option<Duration>> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Los artefactos siempre son MP3, aunque el temporal tenga otra extensión
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlaybackError::Transcode(format!("artefacto ilegible: {}", e)))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| PlaybackError::Transcode("artefacto sin pista de audio".to_string()))?;

    let params = &track.codec_params;
    let duration = match (params.time_base, params.n_frames) {
        (Some(tb), Some(frames)) => {
            let time = tb.calc_time(frames);
            Some(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac))
        }
        _ => None,
    };

    Ok(duration)
}
