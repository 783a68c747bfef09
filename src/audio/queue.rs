use std::{
    collections::VecDeque,
    path::PathBuf,
    time::Duration,
};
use tracing::{debug, info};

use super::store::Artifact;

/// Identificador de una pista dentro de su sesión.
pub type TrackId = u64;

/// Referencia al audio decodificable de una pista lista.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableHandle {
    pub path: PathBuf,
    pub duration: Option<Duration>,
}

/// Datos de una pista que se muestran al usuario.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub id: TrackId,
    pub locator: String,
    pub requested_by: String,
    pub duration: Option<Duration>,
}

/// Una pista transcodificada, lista para reproducirse.
///
/// Es dueña de su [`Artifact`]: soltar el item borra el archivo.
#[derive(Debug)]
pub struct QueueItem {
    pub id: TrackId,
    pub locator: String,
    pub requested_by: String,
    handle: PlayableHandle,
    artifact: Artifact,
}

impl QueueItem {
    pub fn new(
        id: TrackId,
        locator: String,
        requested_by: String,
        artifact: Artifact,
        duration: Option<Duration>,
    ) -> Self {
        let handle = PlayableHandle {
            path: artifact.path().to_path_buf(),
            duration,
        };

        Self {
            id,
            locator,
            requested_by,
            handle,
            artifact,
        }
    }

    pub fn handle(&self) -> &PlayableHandle {
        &self.handle
    }

    #[cfg(test)]
    pub fn artifact_path(&self) -> &std::path::Path {
        self.artifact.path()
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id,
            locator: self.locator.clone(),
            requested_by: self.requested_by.clone(),
            duration: self.handle.duration,
        }
    }
}

/// Cola FIFO de pistas listas. Solo la sesión la modifica.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola
    pub fn append(&mut self, item: QueueItem) {
        info!("➕ Agregado a la cola: {}", item.locator);
        self.items.push_back(item);
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn pop_front(&mut self) -> Option<QueueItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola (FIFO): {}", item.locator),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.items.iter().map(QueueItem::info).collect()
    }

    /// Vacía la cola y entrega los items; al soltarlos se borran sus artefactos.
    pub fn drain(&mut self) -> Vec<QueueItem> {
        let drained: Vec<_> = self.items.drain(..).collect();
        if !drained.is_empty() {
            info!("🗑️ Cola limpiada ({} canciones)", drained.len());
        }
        drained
    }

    /// Duración total conocida de la cola
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|item| item.handle.duration).sum()
    }
}
