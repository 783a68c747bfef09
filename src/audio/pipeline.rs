//! Descarga + transcodificación en segundo plano.
//!
//! `submit` reserva la ruta del artefacto y regresa de inmediato; el trabajo
//! corre en su propia tarea y termina con un único evento `Ready` o `Failed`
//! enviado a la sesión. Un transcode cancelado no envía nada.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    queue::{QueueItem, TrackId},
    session::SessionEvent,
    store::ItemStore,
    transcode::Transcoder,
};
use crate::{
    error::{PlaybackError, Result},
    sources::SourceFetcher,
};

/// Pedido aceptado que todavía no tiene audio.
#[derive(Debug, Clone)]
pub struct PendingTrack {
    pub id: TrackId,
    pub locator: String,
    pub requested_by: String,
}

#[derive(Clone)]
pub struct TranscodePipeline {
    store: Arc<ItemStore>,
    fetcher: Arc<dyn SourceFetcher>,
    transcoder: Arc<dyn Transcoder>,
    timeout: Duration,
}

impl TranscodePipeline {
    pub fn new(
        store: Arc<ItemStore>,
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            transcoder,
            timeout,
        }
    }

    /// Inicia el trabajo para `track` y devuelve la ruta de su artefacto.
    pub fn submit(
        &self,
        track: PendingTrack,
        generation: u64,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> PathBuf {
        let path = self.store.reserve();
        let pipeline = self.clone();
        let artifact_path = path.clone();

        tokio::spawn(async move {
            let seq = track.id;
            let locator = track.locator.clone();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("🚫 Transcode cancelado: {}", locator);
                    return;
                }
                result = tokio::time::timeout(pipeline.timeout, pipeline.produce(&track, &artifact_path)) => {
                    result.unwrap_or_else(|_| {
                        Err(PlaybackError::Transcode(format!(
                            "tiempo agotado tras {}s",
                            pipeline.timeout.as_secs()
                        )))
                    })
                }
            };

            let event = match outcome {
                Ok(item) => {
                    info!("✅ Listo para reproducir: {}", locator);
                    SessionEvent::Ready { generation, seq, item }
                }
                Err(error) => {
                    warn!("❌ Falló {}: {}", locator, error);
                    SessionEvent::Failed {
                        generation,
                        seq,
                        locator,
                        error,
                    }
                }
            };

            // Si la sesión ya no existe el item se suelta aquí y su archivo se borra
            if events.send(event).is_err() {
                debug!("Sesión cerrada, resultado descartado (pista {})", seq);
            }
        });

        path
    }

    async fn produce(&self, track: &PendingTrack, path: &Path) -> Result<QueueItem> {
        let input = self.fetcher.open(&track.locator).await?;

        // El temporal se borra solo si algo falla antes del commit
        let staging = self.store.staging()?;
        self.transcoder.transcode(input, staging.path()).await?;
        let duration = self.transcoder.probe(staging.path()).await?;
        let artifact = self.store.commit(staging, path)?;

        Ok(QueueItem::new(
            track.id,
            track.locator.clone(),
            track.requested_by.clone(),
            artifact,
            duration,
        ))
    }
}
