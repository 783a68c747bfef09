//! Errores del núcleo de reproducción.
//!
//! Todas las variantes se recuperan en el borde del pedido: el fallo de un
//! item no cierra la sesión ni corrompe la cola.

use thiserror::Error;

/// Comandos rechazados por el estado actual de la sesión.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidState {
    NothingToPause,
    NothingToResume,
    NothingPlaying,
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// El localizador no se pudo abrir (URL inválida o inaccesible)
    #[error("Fuente no disponible: {locator}: {reason}")]
    SourceUnavailable { locator: String, reason: String },

    /// La conversión falló; no queda ningún artefacto parcial
    #[error("Error de conversión: {0}")]
    Transcode(String),

    #[error("Comando inválido en este estado: {0:?}")]
    InvalidCommandState(InvalidState),

    #[error("Quien dio el comando no está en un canal de voz")]
    NotInVoiceChannel,

    #[error("No hay sesión activa")]
    NoSession,

    #[error("Cola llena (máximo {0} canciones)")]
    QueueFull(usize),

    /// Error del canal de voz (conexión, control de la pista)
    #[error("Error de salida de audio: {0}")]
    Output(String),

    /// El actor de la sesión ya terminó
    #[error("Sesión cerrada")]
    SessionClosed,

    #[error("Error de E/S de archivo: {0}")]
    Io(#[from] std::io::Error),
}

impl PlaybackError {
    pub fn source_unavailable(locator: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Mensaje corto para responder al usuario en el canal de texto.
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceUnavailable { locator, .. } => {
                format!("❌ No se pudo abrir: {}", locator)
            }
            Self::Transcode(_) => "❌ Error al convertir el audio".to_string(),
            Self::InvalidCommandState(InvalidState::NothingToPause) => {
                "⚠️ Nada que pausar...".to_string()
            }
            Self::InvalidCommandState(InvalidState::NothingToResume) => {
                "⚠️ Nada que reanudar...".to_string()
            }
            Self::InvalidCommandState(InvalidState::NothingPlaying) => {
                "⚠️ No se está reproduciendo nada...".to_string()
            }
            Self::NotInVoiceChannel => "🔇 Entra a un canal de voz...".to_string(),
            Self::NoSession => "⚠️ No estoy en ningún canal de voz".to_string(),
            Self::QueueFull(max) => format!("❌ La cola está llena (máximo {} canciones)", max),
            Self::Output(_) => "❌ Error en el canal de voz".to_string(),
            Self::SessionClosed | Self::Io(_) => "❌ Error interno del reproductor".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
