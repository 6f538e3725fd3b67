use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voxtalk_core::{AudioFeed, AuthorizationStatus, EngineUpdate, RecognitionRequest, SpeechError};

/// A speech-to-text engine.
///
/// Implementations are registered via [`EngineRegistry`](crate::EngineRegistry).
/// Each call to [`recognition_task`](Self::recognition_task) opens one task
/// that reports through `updates` in emission order and drops the sender
/// when the task is over.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;
    /// One-time initialisation with engine-specific TOML configuration.
    async fn initialize(&mut self, config: toml::Value) -> Result<(), SpeechError>;
    async fn request_authorization(&self) -> AuthorizationStatus;
    fn is_available(&self) -> bool;
    fn supports_locale(&self, _locale: &str) -> bool {
        true
    }
    fn recognition_task(
        &self,
        request: &RecognitionRequest,
        feed: AudioFeed,
        updates: mpsc::UnboundedSender<EngineUpdate>,
    ) -> Result<Box<dyn RecognitionTask>, SpeechError>;
}

/// Handle to one in-flight recognition.
pub trait RecognitionTask: Send {
    /// Stop producing results. Calling it again is a no-op.
    fn cancel(&mut self);
}

/// A task backed by a spawned tokio future; cancelling or dropping aborts it.
pub struct SpawnedTask {
    handle: Option<JoinHandle<()>>,
}

impl SpawnedTask {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl RecognitionTask for SpawnedTask {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SpawnedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
