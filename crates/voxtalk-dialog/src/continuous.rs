use crate::listener::{Action, RecognizerHandle, RecognizerSetup, TurnPolicy};
use tokio::sync::mpsc;
use voxtalk_core::{
    AudioChunk, PartialPolicy, RecognitionConfig, SpeechError, SpeechEvent, TaskHint,
    TranscriptAccumulator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContinuousOptions {
    pub partial_policy: PartialPolicy,
    /// Start over when the engine ends dictation after a long silence.
    pub keep_alive: bool,
}

impl ContinuousOptions {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            partial_policy: config.partial_policy,
            keep_alive: config.keep_alive,
        }
    }
}

struct DictationPolicy {
    accumulator: TranscriptAccumulator,
    keep_alive: bool,
}

impl TurnPolicy for DictationPolicy {
    fn name(&self) -> &'static str {
        "continuous"
    }

    fn on_text(&mut self, text: String, is_final: bool) -> Action {
        Action {
            emit: Some(self.accumulator.apply(&text, is_final)),
            stop: false,
        }
    }

    fn on_silence(&mut self) -> Action {
        Action::default()
    }

    fn restart_after_timeout(&self) -> bool {
        self.keep_alive
    }

    fn reset(&mut self) {
        self.accumulator.clear();
    }
}

/// Long-form dictation. Every partial and final transcript is delivered on
/// the result channel.
pub struct ContinuousRecognizer {
    handle: RecognizerHandle,
}

impl ContinuousRecognizer {
    /// Spawns the recognizer task; must be called inside a tokio runtime.
    pub fn spawn(mut setup: RecognizerSetup, options: ContinuousOptions) -> Self {
        setup.settings.task_hint = TaskHint::Dictation;
        setup.settings.stop_on_inactivity = false;
        let policy = DictationPolicy {
            accumulator: TranscriptAccumulator::new(options.partial_policy),
            keep_alive: options.keep_alive,
        };
        Self {
            handle: RecognizerHandle::spawn(setup, policy),
        }
    }

    pub async fn start(&self) -> Result<(), SpeechError> {
        self.handle.start().await
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn process_audio(&self, chunk: AudioChunk) {
        self.handle.process_audio(chunk);
    }

    pub fn take_result_receiver(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<Result<String, SpeechError>>> {
        self.handle.take_result_receiver()
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SpeechEvent>> {
        self.handle.take_event_receiver()
    }

    pub async fn shutdown(mut self) {
        self.handle.shutdown().await;
    }
}
