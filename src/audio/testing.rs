//! Dobles de prueba para el núcleo de reproducción.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::io::AsyncReadExt;

use super::{
    queue::PlayableHandle,
    session::{Announcer, Notice},
    sink::{OutputSink, TrackEndNotifier},
    transcode::Transcoder,
};
use crate::{
    error::{PlaybackError, Result},
    sources::{ByteStream, SourceFetcher},
};

/// Devuelve el propio localizador como contenido. Los que contienen
/// `missing` no existen.
pub struct FakeFetcher;

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn open(&self, locator: &str) -> Result<ByteStream> {
        if locator.contains("missing") {
            return Err(PlaybackError::source_unavailable(locator, "404"));
        }
        Ok(Box::pin(std::io::Cursor::new(locator.as_bytes().to_vec())))
    }
}

/// Copia la entrada al destino. `corrupt` falla dejando un archivo parcial y
/// `slow` tarda 200ms.
#[derive(Default)]
pub struct FakeTranscoder;

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, mut input: ByteStream, destination: &Path) -> Result<()> {
        let mut data = Vec::new();
        input.read_to_end(&mut data).await?;
        let text = String::from_utf8_lossy(&data).to_string();

        if text.contains("slow") {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::fs::write(destination, &data).await?;

        if text.contains("corrupt") {
            return Err(PlaybackError::Transcode("datos inválidos".to_string()));
        }
        Ok(())
    }

    async fn probe(&self, _path: &Path) -> Result<Option<Duration>> {
        Ok(Some(Duration::from_secs(30)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Bind(PathBuf),
    Pause,
    Resume,
    Stop,
    Disconnect,
}

#[derive(Default)]
struct FakeSinkState {
    calls: Vec<SinkCall>,
    notifiers: Vec<TrackEndNotifier>,
    playing: Option<TrackEndNotifier>,
}

/// Salida que registra las llamadas. Igual que songbird, detener o
/// reemplazar una pista dispara su aviso de fin.
#[derive(Clone, Default)]
pub struct FakeSink {
    state: Arc<Mutex<FakeSinkState>>,
}

impl FakeSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().calls.clone()
    }

    pub fn bound(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Bind(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Notificador de la pista enlazada en la posición `index`.
    pub fn notifier(&self, index: usize) -> TrackEndNotifier {
        self.state.lock().notifiers[index].clone()
    }

    /// Simula el final natural de la pista que suena.
    pub fn end_current(&self) {
        let playing = self.state.lock().playing.take();
        if let Some(notifier) = playing {
            notifier.notify();
        }
    }
}

#[async_trait]
impl OutputSink for FakeSink {
    async fn bind(&mut self, handle: &PlayableHandle, on_end: TrackEndNotifier) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(previous) = state.playing.take() {
            previous.notify();
        }
        state.calls.push(SinkCall::Bind(handle.path.clone()));
        state.notifiers.push(on_end.clone());
        state.playing = Some(on_end);
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.state.lock().calls.push(SinkCall::Pause);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.state.lock().calls.push(SinkCall::Resume);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Stop);
        if let Some(previous) = state.playing.take() {
            previous.notify();
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Disconnect);
        state.playing = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingAnnouncer {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Consulta `probe` hasta que `check` se cumpla (máximo 3s).
pub async fn wait_until<T, F, Fut>(mut poll: F, check: impl Fn(&T) -> bool) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(value) = poll().await {
            if check(&value) {
                return value;
            }
        }
        assert!(Instant::now() < deadline, "condición no alcanzada a tiempo");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
