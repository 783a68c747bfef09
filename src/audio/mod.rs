//! # Audio Module
//!
//! Núcleo de reproducción: cola por guild, conversión de fuentes remotas a
//! archivos locales y ciclo de vida de cada artefacto.
//!
//! ## Architecture
//!
//! ### [`player`] - Registro de sesiones
//! - Una sesión por guild, creada con el primer `!play` aceptado
//! - Traduce los comandos del bot a mensajes para la sesión
//!
//! ### [`session`] - Sesión de reproducción
//! - Actor con la máquina de estados `Empty` / `Playing` / `Paused`
//! - Reordena los resultados de conversión para mantener el orden FIFO
//!
//! ### [`pipeline`] / [`transcode`] - Conversión
//! - Descarga y convierte a MP3 en tareas independientes
//! - Cancelable y con tiempo máximo por pista
//!
//! ### [`store`] - Artefactos
//! - Nombres únicos y archivos temporales en el directorio de descargas
//! - Cada artefacto se borra exactamente una vez al soltarse
//!
//! ### [`sink`] - Salida
//! - Canal de voz de songbird detrás del trait [`sink::OutputSink`]
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let player = AudioPlayer::new(pipeline, 50);
//!
//! player
//!     .request_play(guild_id, url, user, Some(channel_id), |channel| connect(channel))
//!     .await?;
//! player.pause(guild_id).await?;
//! player.skip(guild_id).await?;
//! ```

pub mod pipeline;
pub mod player;
pub mod queue;
pub mod session;
pub mod sink;
pub mod store;
pub mod transcode;

#[cfg(test)]
mod testing;
