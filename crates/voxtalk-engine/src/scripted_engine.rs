use crate::engine_trait::{RecognitionTask, SpawnedTask, SpeechEngine};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use voxtalk_core::{
    AudioFeed, AuthorizationStatus, EngineFailure, EngineUpdate, RecognitionRequest, SpeechError,
};

/// Plays back a fixed transcript one word at a time.
///
/// With a buffer feed every received chunk reveals the next word; with a file
/// feed words are revealed on a timer. The final result carries the whole
/// transcript unless the engine is configured to hold the task open.
///
/// ```toml
/// [engines.scripted]
/// transcript = "turn on the lights"
/// word_delay_ms = 120
/// authorization = "authorized"   # denied | restricted | not_determined
/// available = true
/// locales = ["en-US"]
/// hold_open = false
/// ```
pub struct ScriptedSpeechEngine {
    words: Vec<String>,
    authorization: AuthorizationStatus,
    available: bool,
    locales: Option<Vec<String>>,
    word_delay: Duration,
    hold_open: bool,
    failure: Option<(usize, EngineFailure)>,
    tasks_started: AtomicUsize,
    last_request: Mutex<Option<RecognitionRequest>>,
}

impl ScriptedSpeechEngine {
    pub fn new(transcript: &str) -> Self {
        Self {
            words: split_words(transcript),
            authorization: AuthorizationStatus::Authorized,
            available: true,
            locales: None,
            word_delay: Duration::ZERO,
            hold_open: false,
            failure: None,
            tasks_started: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_authorization(mut self, status: AuthorizationStatus) -> Self {
        self.authorization = status;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_locales(mut self, locales: &[&str]) -> Self {
        self.locales = Some(locales.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_word_delay(mut self, delay: Duration) -> Self {
        self.word_delay = delay;
        self
    }

    /// Never send a final result; the task stays open until cancelled or the
    /// feed closes.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Report `failure` once `words` words have been revealed.
    pub fn fail_after(mut self, words: usize, failure: EngineFailure) -> Self {
        self.failure = Some((words, failure));
        self
    }

    pub fn tasks_started(&self) -> usize {
        self.tasks_started.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<RecognitionRequest> {
        self.last_request.lock().ok().and_then(|r| (*r).clone())
    }

    fn script(&self, request: &RecognitionRequest) -> Script {
        Script {
            words: self.words.clone(),
            report_partial: request.report_partial_results,
            hold_open: self.hold_open,
            word_delay: self.word_delay,
            failure: self.failure.clone(),
        }
    }
}

impl Default for ScriptedSpeechEngine {
    fn default() -> Self {
        Self::new("")
    }
}

fn split_words(transcript: &str) -> Vec<String> {
    transcript.split_whitespace().map(str::to_string).collect()
}

fn parse_authorization(value: &str) -> Result<AuthorizationStatus, SpeechError> {
    match value {
        "authorized" => Ok(AuthorizationStatus::Authorized),
        "denied" => Ok(AuthorizationStatus::Denied),
        "restricted" => Ok(AuthorizationStatus::Restricted),
        "not_determined" => Ok(AuthorizationStatus::NotDetermined),
        other => Err(SpeechError::Recognition(format!(
            "unknown authorization status '{other}'"
        ))),
    }
}

#[async_trait]
impl SpeechEngine for ScriptedSpeechEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn initialize(&mut self, config: toml::Value) -> Result<(), SpeechError> {
        if let Some(transcript) = config.get("transcript").and_then(|v| v.as_str()) {
            self.words = split_words(transcript);
        }
        if let Some(status) = config.get("authorization").and_then(|v| v.as_str()) {
            self.authorization = parse_authorization(status)?;
        }
        if let Some(available) = config.get("available").and_then(|v| v.as_bool()) {
            self.available = available;
        }
        if let Some(locales) = config.get("locales").and_then(|v| v.as_array()) {
            self.locales = Some(
                locales
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect(),
            );
        }
        if let Some(ms) = config.get("word_delay_ms").and_then(|v| v.as_integer()) {
            self.word_delay = Duration::from_millis(ms.max(0) as u64);
        }
        if let Some(hold) = config.get("hold_open").and_then(|v| v.as_bool()) {
            self.hold_open = hold;
        }
        tracing::debug!(words = self.words.len(), "scripted engine initialized");
        Ok(())
    }

    async fn request_authorization(&self) -> AuthorizationStatus {
        self.authorization
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn supports_locale(&self, locale: &str) -> bool {
        match &self.locales {
            Some(locales) => locales.iter().any(|l| l == locale),
            None => true,
        }
    }

    fn recognition_task(
        &self,
        request: &RecognitionRequest,
        feed: AudioFeed,
        updates: mpsc::UnboundedSender<EngineUpdate>,
    ) -> Result<Box<dyn RecognitionTask>, SpeechError> {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        let script = self.script(request);
        let handle = tokio::spawn(async move {
            match feed {
                AudioFeed::Buffers(rx) => script.play_buffers(rx, updates).await,
                AudioFeed::File(_) => script.play_timed(updates).await,
            }
        });
        Ok(Box::new(SpawnedTask::new(handle)))
    }
}

struct Script {
    words: Vec<String>,
    report_partial: bool,
    hold_open: bool,
    word_delay: Duration,
    failure: Option<(usize, EngineFailure)>,
}

impl Script {
    fn prefix(&self, count: usize) -> String {
        self.words[..count].join(" ")
    }

    /// Sends the failure scheduled after `revealed` words, if any.
    fn fail_if_due(&self, revealed: usize, updates: &mpsc::UnboundedSender<EngineUpdate>) -> bool {
        match &self.failure {
            Some((at, failure)) if *at == revealed => {
                let _ = updates.send(EngineUpdate::Failed(failure.clone()));
                true
            }
            _ => false,
        }
    }

    /// Reveals word `revealed`; returns false once the task is complete.
    fn reveal(&self, revealed: usize, updates: &mpsc::UnboundedSender<EngineUpdate>) -> bool {
        if revealed == self.words.len() && !self.hold_open {
            let _ = updates.send(EngineUpdate::Transcript {
                text: self.prefix(revealed),
                is_final: true,
            });
            return false;
        }
        if self.report_partial {
            let _ = updates.send(EngineUpdate::Transcript {
                text: self.prefix(revealed),
                is_final: false,
            });
        }
        !self.fail_if_due(revealed, updates)
    }

    async fn play_buffers(
        self,
        mut rx: mpsc::UnboundedReceiver<voxtalk_core::AudioChunk>,
        updates: mpsc::UnboundedSender<EngineUpdate>,
    ) {
        if self.fail_if_due(0, &updates) {
            return;
        }
        let mut revealed = 0;
        while rx.recv().await.is_some() {
            if revealed == self.words.len() {
                continue;
            }
            revealed += 1;
            if !self.reveal(revealed, &updates) {
                return;
            }
        }
        if revealed > 0 && !self.hold_open {
            let _ = updates.send(EngineUpdate::Transcript {
                text: self.prefix(revealed),
                is_final: true,
            });
        }
    }

    async fn play_timed(self, updates: mpsc::UnboundedSender<EngineUpdate>) {
        if self.fail_if_due(0, &updates) {
            return;
        }
        for revealed in 1..=self.words.len() {
            if !self.word_delay.is_zero() {
                tokio::time::sleep(self.word_delay).await;
            }
            if !self.reveal(revealed, &updates) {
                return;
            }
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
    }
}
