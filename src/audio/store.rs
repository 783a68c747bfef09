//! Almacén de artefactos temporales.
//!
//! Cada pista descargada vive en un archivo único dentro de `download_dir`.
//! El archivo pertenece a un [`Artifact`]: al soltar el guard se borra el
//! archivo, de modo que cada artefacto se elimina exactamente una vez sin
//! importar si la pista terminó, se saltó o se descartó con stop/leave.

use chrono::Utc;
use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::Result;

const ARTIFACT_PREFIX: &str = "audio_";
const ARTIFACT_EXTENSION: &str = ".mp3";
const STAGING_PREFIX: &str = ".staging_";

#[derive(Debug)]
pub struct ItemStore {
    dir: PathBuf,
    counter: AtomicU64,
    released: Arc<AtomicU64>,
}

impl ItemStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("📁 Almacén de audio en: {}", dir.display());

        Ok(Self {
            dir,
            counter: AtomicU64::new(0),
            released: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserva una ruta única para un artefacto.
    ///
    /// El contador es monotónico durante toda la vida del proceso, así que dos
    /// reservas nunca colisionan aunque ocurran en el mismo milisegundo.
    pub fn reserve(&self) -> PathBuf {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let name = format!(
            "{}{}_{}{}",
            ARTIFACT_PREFIX,
            Utc::now().timestamp_millis(),
            seq,
            ARTIFACT_EXTENSION
        );
        self.dir.join(name)
    }

    /// Archivo temporal en el mismo directorio que los artefactos.
    ///
    /// Se borra solo al soltarse, así que un transcode fallido o cancelado no
    /// deja archivos parciales.
    pub fn staging(&self) -> Result<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        Ok(file)
    }

    /// Mueve el archivo temporal a su ruta definitiva y entrega el guard.
    pub fn commit(&self, staging: NamedTempFile, path: &Path) -> Result<Artifact> {
        staging.persist(path).map_err(|e| e.error)?;
        debug!("💾 Artefacto listo: {}", path.display());

        Ok(Artifact {
            path: path.to_path_buf(),
            released: self.released.clone(),
        })
    }

    /// Cantidad de artefactos liberados desde que se creó el almacén.
    #[cfg(test)]
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Borra artefactos y temporales que quedaron de una ejecución anterior.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_artifact =
                name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_EXTENSION);

            if is_artifact || name.starts_with(STAGING_PREFIX) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("No se pudo borrar {}: {}", name, e),
                }
            }
        }

        if removed > 0 {
            info!("🧹 Eliminados {} archivos antiguos de {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

/// Archivo de audio transcodificado de una pista.
///
/// Borra el archivo en `Drop`. Un borrado fallido se registra y nunca bloquea
/// el avance de la cola.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    released: Arc<AtomicU64>,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("🗑️ Artefacto eliminado: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("El artefacto ya no existe: {}", self.path.display())
            }
            Err(e) => warn!("Error al eliminar {}: {}", self.path.display(), e),
        }
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
