use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::audio::session::{Announcer, Notice};

/// Publica los avisos de la sesión en el canal de texto donde se pidió la
/// primera canción.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

impl Announcer for ChannelAnnouncer {
    fn announce(&self, notice: Notice) {
        let text = describe(&notice);
        let http = self.http.clone();
        let channel_id = self.channel_id;

        // El actor de la sesión no espera a Discord
        tokio::spawn(async move {
            match channel_id.say(&*http, text).await {
                Ok(_) => debug!("Aviso enviado al canal {}", channel_id),
                Err(e) => error!("Error al enviar aviso al canal {}: {:?}", channel_id, e),
            }
        });
    }
}

/// Texto del aviso para el canal.
pub fn describe(notice: &Notice) -> String {
    match notice {
        Notice::NowPlaying(track) => {
            let duration = track
                .duration
                .map(|d| format!(" `[{}]`", humantime::format_duration(d)))
                .unwrap_or_default();
            format!(
                "🎵 Reproduciendo: {}{} (pedida por {})",
                track.locator, duration, track.requested_by
            )
        }
        Notice::Failed { locator, reason } => {
            format!("❌ No se pudo reproducir {}: {}", locator, reason)
        }
        Notice::QueueEnded => "📭 La cola terminó".to_string(),
    }
}
