use crate::engine_trait::{RecognitionTask, SpawnedTask, SpeechEngine};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use voxtalk_core::{AudioFeed, AuthorizationStatus, EngineUpdate, RecognitionRequest, SpeechError};

/// Reports sample counts instead of words. Useful for checking the audio path.
pub struct NullSpeechEngine {
    feed_count: Arc<AtomicUsize>,
}

impl NullSpeechEngine {
    pub fn new() -> Self {
        Self {
            feed_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Chunks consumed across all tasks.
    pub fn feed_count(&self) -> usize {
        self.feed_count.load(Ordering::Relaxed)
    }
}

impl Default for NullSpeechEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechEngine for NullSpeechEngine {
    fn name(&self) -> &str {
        "null"
    }

    async fn initialize(&mut self, _config: toml::Value) -> Result<(), SpeechError> {
        Ok(())
    }

    async fn request_authorization(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    fn is_available(&self) -> bool {
        true
    }

    fn recognition_task(
        &self,
        request: &RecognitionRequest,
        feed: AudioFeed,
        updates: mpsc::UnboundedSender<EngineUpdate>,
    ) -> Result<Box<dyn RecognitionTask>, SpeechError> {
        let report_partial = request.report_partial_results;
        let feed_count = Arc::clone(&self.feed_count);

        let handle = tokio::spawn(async move {
            match feed {
                AudioFeed::Buffers(mut rx) => {
                    let mut total = 0usize;
                    while let Some(chunk) = rx.recv().await {
                        let count = feed_count.fetch_add(1, Ordering::Relaxed) + 1;
                        total += chunk.samples.len();
                        tracing::trace!("NullSpeechEngine fed chunk #{count}, {} samples", chunk.samples.len());
                        if report_partial {
                            let _ = updates.send(EngineUpdate::Transcript {
                                text: format!("[null] {} samples", chunk.samples.len()),
                                is_final: false,
                            });
                        }
                    }
                    let _ = updates.send(EngineUpdate::Transcript {
                        text: format!("[null] {total} samples"),
                        is_final: true,
                    });
                }
                AudioFeed::File(path) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let _ = updates.send(EngineUpdate::Transcript {
                        text: format!("[null] {name}"),
                        is_final: true,
                    });
                }
            }
        });

        Ok(Box::new(SpawnedTask::new(handle)))
    }
}
