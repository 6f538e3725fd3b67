use tokio::sync::mpsc;
use voxtalk_core::{AudioChunk, AudioFeed, InputSource, SpeechError};

/// Audio pushed by the caller through [`InputSource::append`].
///
/// Stopping drops the sender, which the engine observes as end of audio.
#[derive(Default)]
pub struct CustomStreamInput {
    sender: Option<mpsc::UnboundedSender<AudioChunk>>,
}

impl CustomStreamInput {
    pub fn new() -> Self {
        Self { sender: None }
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_some()
    }
}

impl InputSource for CustomStreamInput {
    fn name(&self) -> &str {
        "custom-stream"
    }

    fn initialize(&mut self) -> Result<AudioFeed, SpeechError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sender = Some(tx);
        Ok(AudioFeed::Buffers(rx))
    }

    fn stop(&mut self) {
        self.sender = None;
    }

    fn append(&self, chunk: AudioChunk) -> bool {
        match self.sender {
            Some(ref tx) => tx.send(chunk).is_ok(),
            None => false,
        }
    }
}
