use crate::listener::{Action, RecognizerHandle, RecognizerSetup, TurnPolicy};
use std::time::Duration;
use tokio::sync::mpsc;
use voxtalk_core::{AudioChunk, SpeechError, SpeechEvent, TaskHint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    /// Silence after the last partial that ends the command.
    pub silence_timeout: Duration,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            silence_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct CommandPolicy {
    last_partial: Option<String>,
    committed: bool,
}

impl CommandPolicy {
    fn commit(&mut self, text: String) -> Action {
        if self.committed {
            return Action {
                emit: None,
                stop: true,
            };
        }
        self.committed = true;
        Action {
            emit: Some(text),
            stop: true,
        }
    }
}

impl TurnPolicy for CommandPolicy {
    fn name(&self) -> &'static str {
        "command"
    }

    fn on_text(&mut self, text: String, is_final: bool) -> Action {
        if is_final {
            return self.commit(text);
        }
        self.last_partial = Some(text);
        Action::default()
    }

    fn on_silence(&mut self) -> Action {
        match self.last_partial.take() {
            Some(text) if !text.trim().is_empty() => self.commit(text),
            _ => Action {
                emit: None,
                stop: true,
            },
        }
    }

    fn reset(&mut self) {
        self.last_partial = None;
        self.committed = false;
    }
}

/// Short voice commands. Delivers one command per `start` and then stops:
/// either the engine's final result or, after a silence, the last partial.
pub struct CommandRecognizer {
    handle: RecognizerHandle,
}

impl CommandRecognizer {
    /// Spawns the recognizer task; must be called inside a tokio runtime.
    pub fn spawn(mut setup: RecognizerSetup, options: CommandOptions) -> Self {
        setup.settings.task_hint = TaskHint::Query;
        setup.settings.inactivity_timeout = options.silence_timeout;
        setup.settings.stop_on_inactivity = false;
        Self {
            handle: RecognizerHandle::spawn(setup, CommandPolicy::default()),
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
