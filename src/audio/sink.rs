//! Salida de audio de una sesión.
//!
//! El núcleo solo conoce [`OutputSink`]: enlazar un audio, pausar, reanudar,
//! detener y desconectar. [`SongbirdSink`] es la implementación para un
//! canal de voz de Discord.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{File as FileInput, Input},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::{
    queue::{PlayableHandle, TrackId},
    session::SessionEvent,
};
use crate::error::{PlaybackError, Result};

/// Avisa a la sesión que terminó una pista concreta.
///
/// Cada enlace recibe su propio notificador con el id de la pista; la sesión
/// descarta avisos de pistas que ya no son la actual.
#[derive(Debug, Clone)]
pub struct TrackEndNotifier {
    track: TrackId,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl TrackEndNotifier {
    pub fn new(track: TrackId, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { track, events }
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn notify(&self) {
        if self.events.send(SessionEvent::TrackEnded(self.track)).is_err() {
            debug!("Sesión cerrada, aviso de fin descartado (pista {})", self.track);
        }
    }
}

#[async_trait]
pub trait OutputSink: Send {
    /// Reemplaza lo que suena por `handle`. `on_end` se dispara cuando la
    /// pista termina sola, se detiene o falla.
    async fn bind(&mut self, handle: &PlayableHandle, on_end: TrackEndNotifier) -> Result<()>;
    async fn pause(&mut self) -> Result<()>;
    async fn resume(&mut self) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
    /// Cierra la conexión de voz; no se vuelve a usar después.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Canal de voz de songbird para una guild.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    current: Option<TrackHandle>,
}

impl SongbirdSink {
    /// Conecta el bot al canal de voz.
    pub async fn connect(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Self> {
        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::Output(format!("no se pudo unir al canal: {}", e)))?;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(Self {
            manager,
            guild_id,
            call,
            current: None,
        })
    }

    fn current(&self) -> Result<&TrackHandle> {
        self.current
            .as_ref()
            .ok_or_else(|| PlaybackError::Output("no hay pista enlazada".to_string()))
    }
}

fn control_error(e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::Output(e.to_string())
}

/// Pista recién enlazada a la que se le cuelgan los avisos de fin.
trait BoundTrack {
    fn watch(&self, event: TrackEvent, notifier: &TrackEndNotifier) -> Result<()>;
    fn halt(&self);
}

impl BoundTrack for TrackHandle {
    fn watch(&self, event: TrackEvent, notifier: &TrackEndNotifier) -> Result<()> {
        self.add_event(Event::Track(event), TrackEndHandler {
            notifier: notifier.clone(),
        })
        .map_err(control_error)
    }

    fn halt(&self) {
        let _ = self.stop();
    }
}

fn watch_end(track: &impl BoundTrack, on_end: &TrackEndNotifier) -> Result<()> {
    for event in [TrackEvent::End, TrackEvent::Error] {
        // Sin aviso de fin la pista no puede quedar sonando: el artefacto
        // se borra en cuanto la sesión descarta el item
        if let Err(e) = track.watch(event, on_end) {
            track.halt();
            return Err(e);
        }
    }
    Ok(())
}

#[async_trait]
impl OutputSink for SongbirdSink {
    async fn bind(&mut self, handle: &PlayableHandle, on_end: TrackEndNotifier) -> Result<()> {
        let input: Input = FileInput::new(handle.path.clone()).into();

        let track = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        // Un handler por pista: vive en el TrackHandle y se cancela al disparar
        watch_end(&track, &on_end)?;

        debug!("🔗 Pista {} enlazada en guild {}", on_end.track(), self.guild_id);
        self.current = Some(track);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.current()?.pause().map_err(control_error)
    }

    async fn resume(&mut self) -> Result<()> {
        self.current()?.play().map_err(control_error)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(track) = self.current.take() {
            // Una pista que ya terminó devuelve error; no importa
            let _ = track.stop();
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop().await?;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| PlaybackError::Output(format!("error al salir del canal: {}", e)))?;

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Handler para cuando termina (o falla) una canción
struct TrackEndHandler {
    notifier: TrackEndNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                debug!("Pista {} terminó: {:?}", self.notifier.track(), state.playing);
            }
        }

        self.notifier.notify();
        Some(Event::Cancel)
    }
}
