use anyhow::Result;
use serenity::{model::channel::Message, prelude::Context};
use tracing::{debug, info};

use super::JukeboxBot;
use crate::audio::session::{PlayerState, SessionStatus};

/// Comandos de texto que entiende el bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Join,
    /// URL tal como la escribió el usuario; vacía si no dio ninguna
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Leave,
    Queue,
    Help,
}

/// Interpreta un mensaje. El nombre del comando no distingue mayúsculas,
/// el argumento se conserva tal cual.
pub fn parse(prefix: &str, content: &str) -> Option<BotCommand> {
    let body = content.trim().strip_prefix(prefix)?;
    let (name, argument) = match body.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "join" => BotCommand::Join,
        "play" | "p" => BotCommand::Play(argument.to_string()),
        "pause" => BotCommand::Pause,
        "resume" => BotCommand::Resume,
        "skip" => BotCommand::Skip,
        "stop" => BotCommand::Stop,
        "leave" => BotCommand::Leave,
        "queue" | "q" | "np" | "nowplaying" => BotCommand::Queue,
        "help" => BotCommand::Help,
        _ => return None,
    };

    Some(command)
}

/// Ejecuta un comando y responde en el canal del mensaje.
pub async fn handle(bot: &JukeboxBot, ctx: &Context, msg: &Message, command: BotCommand) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };
    let player = &bot.player;

    debug!("Comando {:?} de {} en guild {}", command, msg.author.name, guild_id);

    let reply = match command {
        BotCommand::Join => {
            let channel = super::author_voice_channel(ctx, msg);
            match player
                .join(guild_id, channel, |channel_id| {
                    super::connect_session(ctx, guild_id, channel_id, msg.channel_id)
                })
                .await
            {
                Ok(_) => "🔊 Aquí estoy :)".to_string(),
                Err(e) => e.user_message(),
            }
        }
        BotCommand::Play(url) if url.is_empty() => "🔗 Dame un enlace...".to_string(),
        BotCommand::Play(url) => {
            let channel = super::author_voice_channel(ctx, msg);
            let result = player
                .request_play(
                    guild_id,
                    url.clone(),
                    msg.author.name.clone(),
                    channel,
                    |channel_id| super::connect_session(ctx, guild_id, channel_id, msg.channel_id),
                )
                .await;

            match result {
                Ok(path) => {
                    info!("📥 {} pidió {} ({})", msg.author.name, url, path.display());
                    format!("➕ Agregado a la cola: {}", url)
                }
                Err(e) => e.user_message(),
            }
        }
        BotCommand::Pause => match player.pause(guild_id).await {
            Ok(()) => "⏸️ Pausado".to_string(),
            Err(e) => e.user_message(),
        },
        BotCommand::Resume => match player.resume(guild_id).await {
            Ok(()) => "▶️ Reanudado".to_string(),
            Err(e) => e.user_message(),
        },
        BotCommand::Skip => match player.skip(guild_id).await {
            Ok(()) => "⏭️ Saltando canción...".to_string(),
            Err(e) => e.user_message(),
        },
        BotCommand::Stop => match player.stop(guild_id).await {
            Ok(()) => "⏹️ Reproducción detenida y cola vaciada".to_string(),
            Err(e) => e.user_message(),
        },
        BotCommand::Leave => match player.leave(guild_id).await {
            Ok(()) => "👋 Saliendo...".to_string(),
            Err(e) => e.user_message(),
        },
        BotCommand::Queue => match player.status(guild_id).await {
            Some(status) => format_status(&status),
            None => "📭 No hay nada en la cola".to_string(),
        },
        BotCommand::Help => help_text(&bot.config.command_prefix),
    };

    msg.reply(&ctx.http, reply).await?;
    Ok(())
}

/// Listado de `!queue`: pista actual, siguientes y pedidos en conversión.
pub fn format_status(status: &SessionStatus) -> String {
    let mut lines = Vec::new();

    match (&status.current, status.state) {
        (Some(track), PlayerState::Paused) => {
            lines.push(format!("⏸️ En pausa: {}", track.locator));
        }
        (Some(track), _) => lines.push(format!("🎵 Sonando: {}", track.locator)),
        (None, _) => lines.push("🔇 No se está reproduciendo nada".to_string()),
    }

    for (position, track) in status.queued.iter().enumerate() {
        lines.push(format!(
            "`{}.` {} (pedida por {})",
            position + 1,
            track.locator,
            track.requested_by
        ));
    }

    if !status.queued.is_empty() {
        lines.push(format!(
            "📋 {} en cola, {}",
            status.queued.len(),
            humantime::format_duration(status.queued_duration)
        ));
    }
    if status.pending > 0 {
        lines.push(format!("⏳ {} convirtiéndose...", status.pending));
    }

    lines.join("\n")
}

fn help_text(prefix: &str) -> String {
    [
        ("join", "Entra a tu canal de voz"),
        ("play <url>", "Agrega una canción a la cola"),
        ("pause", "Pausa la reproducción"),
        ("resume", "Reanuda la reproducción"),
        ("skip", "Salta a la siguiente canción"),
        ("stop", "Detiene todo y vacía la cola"),
        ("queue", "Muestra la cola"),
        ("leave", "Sale del canal de voz"),
    ]
    .iter()
    .map(|(name, description)| format!("`{}{}` - {}", prefix, name, description))
    .collect::<Vec<_>>()
    .join("\n")
}
