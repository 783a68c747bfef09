use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{future::Future, path::PathBuf};
use tracing::{debug, info, warn};

use super::{
    pipeline::TranscodePipeline,
    session::{SessionHandle, SessionParts, SessionStatus},
};
use crate::error::{InvalidState, PlaybackError, Result};

/// Registro de sesiones de reproducción, una por guild.
pub struct AudioPlayer {
    sessions: DashMap<GuildId, SessionHandle>,
    pipeline: TranscodePipeline,
    max_queue_size: usize,
}

impl AudioPlayer {
    pub fn new(pipeline: TranscodePipeline, max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            pipeline,
            max_queue_size,
        }
    }

    /// Devuelve la sesión de la guild, creándola si no existe.
    ///
    /// `connect` abre la salida en el canal de voz de quien dio el comando;
    /// solo se llama cuando hace falta una sesión nueva.
    pub async fn join<F, Fut>(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        connect: F,
    ) -> Result<SessionHandle>
    where
        F: FnOnce(ChannelId) -> Fut,
        Fut: Future<Output = Result<SessionParts>>,
    {
        let channel_id = voice_channel.ok_or(PlaybackError::NotInVoiceChannel)?;

        // Una sesión que terminó sola (p. ej. desconexión) se reemplaza
        self.sessions.remove_if(&guild_id, |_, session| session.is_closed());

        if let Some(session) = self.session(guild_id) {
            return Ok(session);
        }

        let parts = connect(channel_id).await?;
        let pipeline = self.pipeline.clone();
        let max_queue_size = self.max_queue_size;

        let session = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 Nueva sesión para guild {}", guild_id);
                SessionHandle::spawn(guild_id, parts, pipeline, max_queue_size)
            })
            .clone();

        Ok(session)
    }

    /// Acepta un pedido de reproducción y devuelve la ruta reservada para su
    /// artefacto. Crea la sesión con el primer pedido.
    pub async fn request_play<F, Fut>(
        &self,
        guild_id: GuildId,
        locator: String,
        requested_by: String,
        voice_channel: Option<ChannelId>,
        connect: F,
    ) -> Result<PathBuf>
    where
        F: FnOnce(ChannelId) -> Fut,
        Fut: Future<Output = Result<SessionParts>>,
    {
        self.join(guild_id, voice_channel, connect)
            .await?
            .play(locator, requested_by)
            .await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<()> {
        self.existing(guild_id, InvalidState::NothingToPause)?
            .pause()
            .await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<()> {
        self.existing(guild_id, InvalidState::NothingToResume)?
            .resume()
            .await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<()> {
        self.existing(guild_id, InvalidState::NothingPlaying)?
            .skip()
            .await
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<()> {
        self.existing(guild_id, InvalidState::NothingPlaying)?
            .stop()
            .await
    }

    /// Cierra la sesión de la guild: desconecta la salida y borra todos sus
    /// artefactos.
    pub async fn leave(&self, guild_id: GuildId) -> Result<()> {
        let (_, session) = self
            .sessions
            .remove(&guild_id)
            .ok_or(PlaybackError::NoSession)?;

        match session.leave().await {
            Err(PlaybackError::SessionClosed) => Err(PlaybackError::NoSession),
            other => other,
        }
    }

    /// Estado de la sesión, `None` si la guild no tiene una activa.
    pub async fn status(&self, guild_id: GuildId) -> Option<SessionStatus> {
        self.session(guild_id)?.status().await.ok()
    }

    #[cfg(test)]
    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.session(guild_id).is_some()
    }

    /// Cierra todas las sesiones (apagado del bot).
    pub async fn leave_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        info!("🧹 Cerrando {} sesiones", guilds.len());

        for guild_id in guilds {
            if let Err(e) = self.leave(guild_id).await {
                warn!("Error al cerrar la sesión de guild {}: {}", guild_id, e);
            }
        }
    }

    fn session(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.is_closed())
    }

    fn existing(&self, guild_id: GuildId, missing: InvalidState) -> Result<SessionHandle> {
        self.session(guild_id).ok_or_else(|| {
            debug!("Guild {} sin sesión activa", guild_id);
            PlaybackError::InvalidCommandState(missing)
        })
    }
}
