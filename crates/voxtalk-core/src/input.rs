use crate::error::SpeechError;
use crate::types::{AudioChunk, VoiceActivity};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Where a recognition task reads its audio from.
#[derive(Debug)]
pub enum AudioFeed {
    /// Live PCM buffers, ending when the sender side is dropped.
    Buffers(mpsc::UnboundedReceiver<AudioChunk>),
    /// A pre-recorded file handed to the engine as a whole.
    File(PathBuf),
}

/// Which kind of input a provider should build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSourceKind {
    Microphone,
    AudioFile(PathBuf),
    CustomStream,
}

/// A source of audio for exactly one recognition task at a time.
///
/// `initialize` acquires the underlying resource (e.g. opens the capture
/// device) and `stop` must release it before returning.
pub trait InputSource: Send {
    fn name(&self) -> &str;
    fn initialize(&mut self) -> Result<AudioFeed, SpeechError>;
    fn stop(&mut self);

    /// Push a caller-supplied buffer. Only custom streams accept audio this way.
    fn append(&self, _chunk: AudioChunk) -> bool {
        false
    }
}

/// Builds fresh input sources, e.g. after the active input device changed.
pub trait InputProvider: Send + Sync {
    fn create(
        &self,
        device_name: Option<&str>,
        activity: Option<mpsc::UnboundedSender<VoiceActivity>>,
    ) -> Result<Box<dyn InputSource>, SpeechError>;
}
