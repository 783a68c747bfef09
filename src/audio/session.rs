//! Sesión de reproducción de una guild.
//!
//! La sesión es un actor: una única tarea consume un canal de
//! [`SessionEvent`] y aplica cada evento completo antes de leer el siguiente.
//! Comandos de usuario, resultados de transcode y avisos de fin de pista
//! pasan todos por el mismo canal, así que las transiciones de estado, la
//! cola y el borrado de artefactos nunca se intercalan.
//!
//! ## Estados
//!
//! ```text
//! Empty  --ready-->        Playing
//! Playing --pause-->       Paused
//! Paused  --resume-->      Playing
//! Playing/Paused --fin/skip--> Playing (siguiente) | Empty
//! Playing/Paused --stop--> Empty (cola vaciada, conexión conservada)
//! cualquiera --leave-->    sesión terminada
//! ```
//!
//! ## Orden de la cola
//!
//! Los transcodes corren en paralelo y pueden terminar en cualquier orden.
//! Cada pedido recibe un número de secuencia y los resultados se reordenan
//! en `pending` antes de tocar la cola, de modo que el orden de reproducción
//! es siempre el orden en que se aceptaron los pedidos.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};
use serenity::model::id::GuildId;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    pipeline::{PendingTrack, TranscodePipeline},
    queue::{MusicQueue, QueueItem, TrackId, TrackInfo},
    sink::{OutputSink, TrackEndNotifier},
};
use crate::error::{InvalidState, PlaybackError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Empty,
    Playing,
    Paused,
}

/// Mensajes que consume el actor de la sesión.
#[derive(Debug)]
pub enum SessionEvent {
    Command(Command),
    Ready {
        generation: u64,
        seq: TrackId,
        item: QueueItem,
    },
    Failed {
        generation: u64,
        seq: TrackId,
        locator: String,
        error: PlaybackError,
    },
    TrackEnded(TrackId),
}

#[derive(Debug)]
pub enum Command {
    Play {
        locator: String,
        requested_by: String,
        reply: oneshot::Sender<Result<PathBuf>>,
    },
    Pause(oneshot::Sender<Result<()>>),
    Resume(oneshot::Sender<Result<()>>),
    Skip(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<()>>),
    Leave(oneshot::Sender<Result<()>>),
    Status(oneshot::Sender<SessionStatus>),
}

/// Foto del estado de la sesión para `!queue`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: PlayerState,
    pub current: Option<TrackInfo>,
    pub queued: Vec<TrackInfo>,
    pub pending: usize,
    pub queued_duration: Duration,
}

/// Resultados asíncronos que se reportan al canal de texto.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying(TrackInfo),
    Failed { locator: String, reason: String },
    QueueEnded,
}

/// Destino de los avisos de la sesión. No debe bloquear: el actor lo llama
/// dentro de su ciclo.
pub trait Announcer: Send + Sync {
    fn announce(&self, notice: Notice);
}

/// Lo que se necesita para abrir una sesión: la salida de audio y a quién
/// avisar.
pub struct SessionParts {
    pub sink: Box<dyn OutputSink>,
    pub announcer: Arc<dyn Announcer>,
}

/// Handle clonable para hablar con el actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Arranca el actor de la sesión.
    pub fn spawn(
        guild_id: GuildId,
        parts: SessionParts,
        pipeline: TranscodePipeline,
        max_queue_size: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = PlaybackSession {
            guild_id,
            sink: parts.sink,
            announcer: parts.announcer,
            pipeline,
            events: tx.clone(),
            state: PlayerState::Empty,
            current: None,
            queue: MusicQueue::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
            generation: 0,
            cancel: CancellationToken::new(),
            max_queue_size,
        };

        tokio::spawn(session.run(rx));
        Self { events: tx }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(SessionEvent::Command(command(tx)))
            .map_err(|_| PlaybackError::SessionClosed)?;
        rx.await.map_err(|_| PlaybackError::SessionClosed)
    }

    /// Acepta un pedido y devuelve la ruta reservada para su artefacto.
    pub async fn play(&self, locator: String, requested_by: String) -> Result<PathBuf> {
        self.request(|reply| Command::Play {
            locator,
            requested_by,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await?
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Command::Resume).await?
    }

    pub async fn skip(&self) -> Result<()> {
        self.request(Command::Skip).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await?
    }

    pub async fn leave(&self) -> Result<()> {
        self.request(Command::Leave).await?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(Command::Status).await
    }
}

struct PlaybackSession {
    guild_id: GuildId,
    sink: Box<dyn OutputSink>,
    announcer: Arc<dyn Announcer>,
    pipeline: TranscodePipeline,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: PlayerState,
    current: Option<QueueItem>,
    queue: MusicQueue,
    /// Pedidos aceptados aún no entregados a la cola, por secuencia.
    /// `None` mientras el transcode sigue en curso.
    pending: BTreeMap<TrackId, Option<QueueItem>>,
    next_seq: TrackId,
    /// Se incrementa en stop/leave; los resultados de generaciones
    /// anteriores se descartan.
    generation: u64,
    cancel: CancellationToken,
    max_queue_size: usize,
}

impl PlaybackSession {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        info!("🎛️ Sesión iniciada en guild {}", self.guild_id);

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Command(Command::Leave(reply)) => {
                    self.leave().await;
                    let _ = reply.send(Ok(()));
                    break;
                }
                event => self.handle(event).await,
            }
        }

        // Limpieza final: lo que quedó en el canal se suelta aquí, incluidos
        // items listos cuyos artefactos se borran al soltarse
        events.close();
        let mut discarded = 0;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Ready { item, .. } = event {
                debug!("Descartando pista {} tras salir", item.locator);
                discarded += 1;
            }
        }

        info!(
            "🔚 Sesión terminada en guild {} ({} resultados descartados)",
            self.guild_id, discarded
        );
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(command) => self.handle_command(command).await,
            SessionEvent::Ready {
                generation,
                seq,
                item,
            } => {
                if generation != self.generation {
                    debug!("Resultado obsoleto descartado: {}", item.locator);
                    return;
                }
                if let Some(slot) = self.pending.get_mut(&seq) {
                    *slot = Some(item);
                }
                self.flush_ready().await;
            }
            SessionEvent::Failed {
                generation,
                seq,
                locator,
                error,
            } => {
                if generation != self.generation {
                    return;
                }
                self.pending.remove(&seq);
                warn!("⚠️ No se pudo agregar {}: {}", locator, error);
                self.announcer.announce(Notice::Failed {
                    locator,
                    reason: error.to_string(),
                });
                self.flush_ready().await;
            }
            SessionEvent::TrackEnded(track) => self.on_track_end(track).await,
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Play {
                locator,
                requested_by,
                reply,
            } => {
                let _ = reply.send(self.submit(locator, requested_by));
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause().await);
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.resume().await);
            }
            Command::Skip(reply) => {
                let _ = reply.send(self.skip().await);
            }
            Command::Stop(reply) => {
                let _ = reply.send(self.stop().await);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            // `run` atiende Leave antes de llegar aquí
            Command::Leave(reply) => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn submit(&mut self, locator: String, requested_by: String) -> Result<PathBuf> {
        if self.pending.len() + self.queue.len() >= self.max_queue_size {
            return Err(PlaybackError::QueueFull(self.max_queue_size));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let track = PendingTrack {
            id: seq,
            locator,
            requested_by,
        };
        info!("📥 Pedido #{} aceptado: {}", seq, track.locator);

        let path = self.pipeline.submit(
            track,
            self.generation,
            self.cancel.child_token(),
            self.events.clone(),
        );
        self.pending.insert(seq, None);
        Ok(path)
    }

    /// Entrega a la cola los resultados listos respetando el orden de pedido.
    async fn flush_ready(&mut self) {
        while let Some(entry) = self.pending.first_entry() {
            if entry.get().is_none() {
                break;
            }
            if let Some(item) = entry.remove() {
                self.on_ready(item).await;
            }
        }
    }

    async fn on_ready(&mut self, item: QueueItem) {
        match self.state {
            PlayerState::Empty => self.start(item).await,
            PlayerState::Playing | PlayerState::Paused => self.queue.append(item),
        }
    }

    /// Enlaza `item` a la salida. Si el enlace falla, la pista se descarta y
    /// se intenta con la siguiente de la cola.
    async fn start(&mut self, item: QueueItem) {
        let mut next = Some(item);

        while let Some(item) = next.take() {
            let on_end = TrackEndNotifier::new(item.id, self.events.clone());

            match self.sink.bind(item.handle(), on_end).await {
                Ok(()) => {
                    info!("🎵 Reproduciendo: {}", item.locator);
                    self.announcer.announce(Notice::NowPlaying(item.info()));
                    self.current = Some(item);
                    self.state = PlayerState::Playing;
                    return;
                }
                Err(e) => {
                    error!("Error al reproducir {}: {}", item.locator, e);
                    self.announcer.announce(Notice::Failed {
                        locator: item.locator.clone(),
                        reason: e.to_string(),
                    });
                    next = self.queue.pop_front();
                }
            }
        }

        self.state = PlayerState::Empty;
    }

    /// Libera la pista actual y pasa a la siguiente, o queda en `Empty`.
    async fn advance(&mut self) {
        if let Some(finished) = self.current.take() {
            debug!("🗑️ Liberando pista #{}: {}", finished.id, finished.locator);
        }
        self.state = PlayerState::Empty;

        match self.queue.pop_front() {
            Some(next) => self.start(next).await,
            None => {
                info!("📭 Cola terminada en guild {}", self.guild_id);
                self.announcer.announce(Notice::QueueEnded);
            }
        }
    }

    async fn on_track_end(&mut self, track: TrackId) {
        match &self.current {
            Some(current) if current.id == track => {
                debug!("Pista #{} terminó", track);
                self.advance().await;
            }
            // Avisos repetidos o de pistas ya saltadas/detenidas
            _ => debug!("Aviso de fin ignorado para pista #{}", track),
        }
    }

    async fn pause(&mut self) -> Result<()> {
        if self.state != PlayerState::Playing {
            return Err(PlaybackError::InvalidCommandState(InvalidState::NothingToPause));
        }

        self.sink.pause().await?;
        self.state = PlayerState::Paused;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        if self.state != PlayerState::Paused {
            return Err(PlaybackError::InvalidCommandState(InvalidState::NothingToResume));
        }

        self.sink.resume().await?;
        self.state = PlayerState::Playing;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    async fn skip(&mut self) -> Result<()> {
        if self.state == PlayerState::Empty {
            return Err(PlaybackError::InvalidCommandState(InvalidState::NothingPlaying));
        }

        if let Err(e) = self.sink.stop().await {
            warn!("Error al detener la pista actual: {}", e);
        }
        info!("⏭️ Saltando canción");
        self.advance().await;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state == PlayerState::Empty {
            return Err(PlaybackError::InvalidCommandState(InvalidState::NothingPlaying));
        }

        if let Err(e) = self.sink.stop().await {
            warn!("Error al detener la pista actual: {}", e);
        }
        self.discard_all();
        info!("⏹️ Reproducción detenida");
        Ok(())
    }

    async fn leave(&mut self) {
        if let Err(e) = self.sink.disconnect().await {
            warn!("Error al desconectar la salida: {}", e);
        }
        self.discard_all();
        info!("👋 Sesión cerrada en guild {}", self.guild_id);
    }

    /// Suelta la pista actual, la cola y los pedidos en curso. Cada item
    /// soltado borra su artefacto.
    fn discard_all(&mut self) {
        self.current = None;
        self.state = PlayerState::Empty;
        let queued = self.queue.drain().len();

        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        let pending = self.pending.len();
        self.pending.clear();

        debug!(
            "Descartadas {} pistas en cola y {} pedidos en curso",
            queued, pending
        );
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            current: self.current.as_ref().map(QueueItem::info),
            queued: self.queue.tracks(),
            pending: self.pending.len(),
            queued_duration: self.queue.total_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        store::ItemStore,
        testing::{wait_until, FakeFetcher, FakeSink, FakeTranscoder, RecordingAnnouncer, SinkCall},
    };
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        store: Arc<ItemStore>,
        sink: FakeSink,
        announcer: Arc<RecordingAnnouncer>,
        session: SessionHandle,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_limit(100)
        }

        fn with_limit(max_queue_size: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(ItemStore::new(dir.path()).unwrap());
            let pipeline = TranscodePipeline::new(
                store.clone(),
                Arc::new(FakeFetcher),
                Arc::new(FakeTranscoder::default()),
                Duration::from_secs(5),
            );
            let sink = FakeSink::default();
            let announcer = Arc::new(RecordingAnnouncer::default());
            let session = SessionHandle::spawn(
                GuildId::new(1),
                SessionParts {
                    sink: Box::new(sink.clone()),
                    announcer: announcer.clone(),
                },
                pipeline,
                max_queue_size,
            );

            Self {
                dir,
                store,
                sink,
                announcer,
                session,
            }
        }

        async fn play(&self, locator: &str) -> PathBuf {
            self.session
                .play(locator.to_string(), "tester".to_string())
                .await
                .unwrap()
        }

        async fn status(&self) -> SessionStatus {
            self.session.status().await.unwrap()
        }

        async fn wait_for(&self, check: impl Fn(&SessionStatus) -> bool) -> SessionStatus {
            let session = &self.session;
            wait_until(|| async move { session.status().await.ok() }, check).await
        }

        fn files(&self) -> usize {
            std::fs::read_dir(self.dir.path()).unwrap().count()
        }
    }

    fn current(status: &SessionStatus) -> Option<&str> {
        status.current.as_ref().map(|t| t.locator.as_str())
    }

    fn queued(status: &SessionStatus) -> Vec<&str> {
        status.queued.iter().map(|t| t.locator.as_str()).collect()
    }

    #[tokio::test]
    async fn test_first_ready_plays_immediately_then_queue_advances() {
        let h = Harness::new();

        let a = h.play("https://x/a").await;
        let status = h.wait_for(|s| s.state == PlayerState::Playing).await;
        assert_eq!(current(&status), Some("https://x/a"));
        assert!(status.queued.is_empty());

        let b = h.play("https://x/b").await;
        let status = h.wait_for(|s| s.queued.len() == 1).await;
        assert_eq!(queued(&status), vec!["https://x/b"]);
        assert_eq!(status.state, PlayerState::Playing);

        h.sink.end_current();
        let status = h.wait_for(|s| current(s) == Some("https://x/b")).await;
        assert_eq!(status.state, PlayerState::Playing);
        assert!(status.queued.is_empty());
        assert!(!a.exists());
        assert!(b.exists());
        assert_eq!(h.store.released_count(), 1);
    }

    #[tokio::test]
    async fn test_pause_twice_is_rejected() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;

        h.session.pause().await.unwrap();
        assert_eq!(h.status().await.state, PlayerState::Paused);

        let err = h.session.pause().await.unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::InvalidCommandState(InvalidState::NothingToPause)
        ));
        assert_eq!(h.status().await.state, PlayerState::Paused);

        h.session.resume().await.unwrap();
        assert_eq!(h.status().await.state, PlayerState::Playing);
        assert!(matches!(
            h.session.resume().await,
            Err(PlaybackError::InvalidCommandState(InvalidState::NothingToResume))
        ));
        assert_eq!(
            h.sink.calls().iter().filter(|c| **c == SinkCall::Pause).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_commands_on_empty_session() {
        let h = Harness::new();

        for result in [
            h.session.pause().await,
            h.session.resume().await,
            h.session.skip().await,
            h.session.stop().await,
        ] {
            assert!(matches!(result, Err(PlaybackError::InvalidCommandState(_))));
        }
        assert_eq!(h.status().await.state, PlayerState::Empty);
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_skip_advances_and_deletes_current() {
        let h = Harness::new();
        let a = h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        h.play("https://x/b").await;
        h.play("https://x/c").await;
        h.wait_for(|s| s.queued.len() == 2).await;

        h.session.skip().await.unwrap();

        // El stop del sink dispara el aviso de fin de A; no debe saltar otra vez
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = h.status().await;
        assert_eq!(status.state, PlayerState::Playing);
        assert_eq!(current(&status), Some("https://x/b"));
        assert_eq!(queued(&status), vec!["https://x/c"]);
        assert!(!a.exists());
        assert_eq!(h.store.released_count(), 1);
    }

    #[tokio::test]
    async fn test_skip_while_paused_resumes_with_next() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        h.play("https://x/b").await;
        h.wait_for(|s| s.queued.len() == 1).await;

        h.session.pause().await.unwrap();
        h.session.skip().await.unwrap();

        let status = h.status().await;
        assert_eq!(status.state, PlayerState::Playing);
        assert_eq!(current(&status), Some("https://x/b"));
    }

    #[tokio::test]
    async fn test_duplicate_end_notifications_advance_once() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        h.play("https://x/b").await;
        h.play("https://x/c").await;
        h.wait_for(|s| s.queued.len() == 2).await;

        let first = h.sink.notifier(0);
        first.notify();
        first.notify();
        first.notify();

        let status = h.wait_for(|s| current(s) == Some("https://x/b")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status_after = h.status().await;
        assert_eq!(status, status_after);
        assert_eq!(queued(&status_after), vec!["https://x/c"]);
        assert_eq!(h.store.released_count(), 1);
    }

    #[tokio::test]
    async fn test_natural_end_with_empty_queue_goes_empty() {
        let h = Harness::new();
        let a = h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;

        h.sink.end_current();
        let status = h.wait_for(|s| s.state == PlayerState::Empty).await;
        assert_eq!(status.current, None);
        assert!(!a.exists());
        assert!(h.announcer.notices().contains(&Notice::QueueEnded));

        // Una nueva petición vuelve a reproducir de inmediato
        h.play("https://x/b").await;
        let status = h.wait_for(|s| s.state == PlayerState::Playing).await;
        assert_eq!(current(&status), Some("https://x/b"));
    }

    #[tokio::test]
    async fn test_queue_keeps_submission_order_when_transcodes_finish_out_of_order() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;

        h.play("https://x/slow-b").await;
        h.play("https://x/c").await;
        h.play("https://x/d").await;

        let status = h.wait_for(|s| s.queued.len() == 3).await;
        assert_eq!(
            queued(&status),
            vec!["https://x/slow-b", "https://x/c", "https://x/d"]
        );
    }

    #[tokio::test]
    async fn test_first_request_plays_first_even_if_slower() {
        let h = Harness::new();
        h.play("https://x/slow-a").await;
        h.play("https://x/b").await;

        let status = h
            .wait_for(|s| s.state == PlayerState::Playing && s.queued.len() == 1)
            .await;
        assert_eq!(current(&status), Some("https://x/slow-a"));
        assert_eq!(queued(&status), vec!["https://x/b"]);
    }

    #[tokio::test]
    async fn test_failed_items_never_enter_queue() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;

        h.play("https://x/missing-b").await;
        h.play("https://x/corrupt-c").await;
        h.play("https://x/d").await;

        let status = h
            .wait_for(|s| s.pending == 0 && s.queued.len() == 1)
            .await;
        assert_eq!(queued(&status), vec!["https://x/d"]);
        assert_eq!(h.files(), 2);

        let mut failed: Vec<_> = h
            .announcer
            .notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Failed { locator, .. } => Some(locator),
                _ => None,
            })
            .collect();
        failed.sort();
        assert_eq!(failed, vec!["https://x/corrupt-c", "https://x/missing-b"]);
    }

    #[tokio::test]
    async fn test_failure_on_empty_session_stays_empty() {
        let h = Harness::new();
        h.play("https://x/corrupt").await;

        let status = h.wait_for(|s| s.pending == 0).await;
        assert_eq!(status.state, PlayerState::Empty);
        assert_eq!(h.files(), 0);
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_drains_queue_and_keeps_connection() {
        let h = Harness::new();
        let a = h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        let b = h.play("https://x/b").await;
        h.wait_for(|s| s.queued.len() == 1).await;

        h.session.stop().await.unwrap();
        let status = h.status().await;
        assert_eq!(status.state, PlayerState::Empty);
        assert!(status.queued.is_empty());
        assert!(!a.exists() && !b.exists());
        assert_eq!(h.store.released_count(), 2);

        assert!(matches!(
            h.session.stop().await,
            Err(PlaybackError::InvalidCommandState(InvalidState::NothingPlaying))
        ));

        h.play("https://x/c").await;
        let status = h.wait_for(|s| s.state == PlayerState::Playing).await;
        assert_eq!(current(&status), Some("https://x/c"));
        assert!(!h.sink.calls().contains(&SinkCall::Disconnect));
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_transcodes() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        h.play("https://x/slow-b").await;

        h.session.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let status = h.status().await;
        assert_eq!(status.state, PlayerState::Empty);
        assert_eq!(status.pending, 0);
        assert!(status.queued.is_empty());
        assert_eq!(h.files(), 0);
    }

    #[tokio::test]
    async fn test_leave_deletes_current_and_queued_artifacts() {
        let h = Harness::new();
        let a = h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        let b = h.play("https://x/b").await;
        let c = h.play("https://x/c").await;
        h.wait_for(|s| s.queued.len() == 2).await;

        h.session.leave().await.unwrap();

        for path in [&a, &b, &c] {
            assert!(!Path::new(path).exists());
        }
        assert_eq!(h.store.released_count(), 3);
        assert!(h.sink.calls().contains(&SinkCall::Disconnect));

        let session = &h.session;
        wait_until(|| async move { Some(session.is_closed()) }, |closed| *closed).await;
        assert!(matches!(
            h.session.pause().await,
            Err(PlaybackError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_leave_cancels_in_flight_transcodes() {
        let h = Harness::new();
        h.play("https://x/a").await;
        h.wait_for(|s| s.state == PlayerState::Playing).await;
        h.play("https://x/slow-b").await;
        h.play("https://x/slow-c").await;

        h.session.leave().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(h.files(), 0);
        assert!(h.sink.calls().contains(&SinkCall::Disconnect));
    }

    /// Contador de reserva del artefacto: `audio_<millis>_<n>.mp3`.
    fn reservation(path: &Path) -> u64 {
        let stem = path.file_stem().unwrap().to_str().unwrap();
        stem.rsplit('_').next().unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_requests_queue_in_acceptance_order() {
        let h = Harness::new();

        let mut tasks = Vec::new();
        for i in 0..12 {
            let session = h.session.clone();
            let locator = if i % 3 == 0 {
                format!("https://x/slow-{}", i)
            } else {
                format!("https://x/{}", i)
            };
            tasks.push(tokio::spawn(async move {
                let path = session.play(locator.clone(), "tester".to_string()).await.unwrap();
                (reservation(&path), locator)
            }));
        }

        let mut accepted = Vec::new();
        for task in tasks {
            accepted.push(task.await.unwrap());
        }
        accepted.sort();
        let expected: Vec<&str> = accepted.iter().map(|(_, l)| l.as_str()).collect();

        let status = h
            .wait_for(|s| s.current.is_some() && s.queued.len() == expected.len() - 1)
            .await;
        let mut order = vec![current(&status).unwrap()];
        order.extend(queued(&status));
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_queue_limit_counts_pending_transcodes() {
        let h = Harness::with_limit(2);
        h.play("https://x/slow-a").await;
        h.play("https://x/slow-b").await;

        let err = h
            .session
            .play("https://x/c".to_string(), "tester".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::QueueFull(2)));
    }

    #[tokio::test]
    async fn test_every_played_item_deleted_exactly_once() {
        let h = Harness::new();
        let mut paths = Vec::new();
        for name in ["a", "b", "c", "d"] {
            paths.push(h.play(&format!("https://x/{}", name)).await);
        }
        h.wait_for(|s| s.state == PlayerState::Playing && s.queued.len() == 3)
            .await;

        h.session.skip().await.unwrap();
        h.sink.end_current();
        h.wait_for(|s| current(s) == Some("https://x/c")).await;
        h.session.skip().await.unwrap();
        h.sink.end_current();

        h.wait_for(|s| s.state == PlayerState::Empty).await;
        // Los avisos tardíos de pistas saltadas no borran nada más
        for index in 0..4 {
            h.sink.notifier(index).notify();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.store.released_count(), 4);
        assert!(paths.iter().all(|p| !p.exists()));
        assert_eq!(h.sink.bound(), paths);
    }
}
