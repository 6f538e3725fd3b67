use async_trait::async_trait;
use std::ops::Range;
use tokio::sync::mpsc;
use voxtalk_core::{SpeechError, Voice};

/// Where an engine may cut off the utterance it is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBoundary {
    Immediate,
    Word,
}

/// One bounded unit of text handed to a synthesis engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub language: String,
    /// Voice identifier; the engine picks a voice for `language` when unset.
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub is_markup: bool,
}

/// Progress reported by an engine, tagged with the utterance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisNotification {
    Started(u64),
    Finished(u64),
    Cancelled(u64),
    /// Byte range of the utterance text about to be spoken.
    WillSpeak { id: u64, range: Range<usize> },
}

impl SynthesisNotification {
    pub fn utterance_id(&self) -> u64 {
        match self {
            SynthesisNotification::Started(id)
            | SynthesisNotification::Finished(id)
            | SynthesisNotification::Cancelled(id)
            | SynthesisNotification::WillSpeak { id, .. } => *id,
        }
    }
}

/// A text-to-speech engine.
///
/// Implementations are registered via [`SynthesisRegistry`](crate::SynthesisRegistry).
/// Every accepted utterance ends with exactly one `Finished` or `Cancelled`
/// notification.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    fn name(&self) -> &str;
    /// One-time initialisation with engine-specific TOML configuration.
    async fn initialize(&mut self, config: toml::Value) -> Result<(), SpeechError>;
    fn set_notification_sender(&mut self, sender: mpsc::UnboundedSender<SynthesisNotification>);
    fn speak(&self, utterance: Utterance) -> Result<(), SpeechError>;
    fn stop_speaking(&self, boundary: SpeechBoundary);
    fn is_speaking(&self) -> bool;
    fn available_voices(&self) -> Vec<Voice>;
}
