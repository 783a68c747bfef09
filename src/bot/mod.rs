//! # Bot Module
//!
//! Capa de Discord del bot: recibe los mensajes con prefijo, los traduce a
//! operaciones del [`AudioPlayer`] y responde en el mismo canal.
//!
//! - [`commands`]: parser de `!join`, `!play <url>`, `!pause`, `!resume`,
//!   `!skip`, `!stop`, `!leave`, `!queue` y `!help`
//! - [`events`]: avisos asíncronos de la sesión (now playing, fallos)
//!
//! La conexión de voz se abre con el primer `!join` o `!play` aceptado y se
//! cierra con `!leave` o cuando alguien desconecta al bot.

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;

use crate::{
    audio::{
        player::AudioPlayer,
        session::SessionParts,
        sink::SongbirdSink,
    },
    config::Config,
    error::{PlaybackError, Result},
};
use events::ChannelAnnouncer;

/// Handler de eventos de Discord.
pub struct JukeboxBot {
    config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, player: Arc<AudioPlayer>) -> Self {
        Self { config, player }
    }
}

/// Canal de voz en el que está el autor del mensaje, según la caché.
fn author_voice_channel(ctx: &Context, msg: &Message) -> Option<ChannelId> {
    let guild = msg.guild(&ctx.cache)?;
    guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|state| state.channel_id)
}

/// Abre la salida de audio de una sesión nueva: se une al canal de voz y
/// anuncia en el canal de texto donde llegó el comando.
async fn connect_session(
    ctx: &Context,
    guild_id: GuildId,
    voice_channel: ChannelId,
    text_channel: ChannelId,
) -> Result<SessionParts> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| PlaybackError::Output("Songbird no inicializado".to_string()))?;

    let sink = SongbirdSink::connect(manager, guild_id, voice_channel).await?;

    Ok(SessionParts {
        sink: Box::new(sink),
        announcer: Arc::new(ChannelAnnouncer::new(ctx.http.clone(), text_channel)),
    })
}

/// Hay una llamada viva para la guild; un aviso de desconexión atrasado (p. ej.
/// `!leave` seguido de `!play`) no debe cerrar la sesión nueva.
async fn still_connected(manager: &Songbird, guild_id: GuildId) -> bool {
    match manager.get(guild_id) {
        Some(call) => call.lock().await.current_channel().is_some(),
        None => false,
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Ignorar bots y mensajes fuera de un servidor
        if msg.author.bot || msg.guild_id.is_none() {
            return;
        }

        let Some(command) = commands::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };

        if let Err(e) = commands::handle(self, &ctx, &msg, command).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    /// Si alguien desconecta al bot del canal de voz, la sesión se cierra y
    /// sus archivos se borran.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if let Some(manager) = songbird::get(&ctx).await {
            if still_connected(&manager, guild_id).await {
                debug!("Aviso de desconexión atrasado en guild {}, se ignora", guild_id);
                return;
            }
        }

        info!("🔌 Bot desconectado en guild {}", guild_id);
        match self.player.leave(guild_id).await {
            Ok(()) => info!("🧹 Sesión limpiada en guild {}", guild_id),
            // Ya se cerró con !leave
            Err(PlaybackError::NoSession) => debug!("Guild {} sin sesión", guild_id),
            Err(e) => warn!("Error al cerrar la sesión de guild {}: {}", guild_id, e),
        }
    }
}
