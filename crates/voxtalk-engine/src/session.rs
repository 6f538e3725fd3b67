use crate::engine_trait::{RecognitionTask, SpeechEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use voxtalk_core::{
    AudioChunk, EngineFailure, EngineUpdate, InputSource, RecognitionConfig, RecognitionEvent,
    RecognitionRequest, SpeechError, TaskHint,
};

/// How a [`RecognitionSession`] builds its requests and times silence.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionSettings {
    pub locale: String,
    pub task_hint: TaskHint,
    pub report_partial_results: bool,
    pub on_device_only: bool,
    pub inactivity_timeout: Duration,
    /// Wire the inactivity timer to `stop()`. Off by default: the timer only
    /// signals through [`RecognitionSession::drive`].
    pub stop_on_inactivity: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            task_hint: TaskHint::Unspecified,
            report_partial_results: true,
            on_device_only: false,
            inactivity_timeout: Duration::from_millis(800),
            stop_on_inactivity: false,
        }
    }
}

impl RecognitionSettings {
    pub fn from_config(locale: &str, config: &RecognitionConfig, task_hint: TaskHint) -> Self {
        Self {
            locale: locale.to_string(),
            task_hint,
            report_partial_results: config.report_partial_results,
            on_device_only: config.on_device_only,
            inactivity_timeout: config.inactivity_timeout(),
            stop_on_inactivity: false,
        }
    }

    fn request(&self) -> RecognitionRequest {
        RecognitionRequest {
            locale: self.locale.clone(),
            task_hint: self.task_hint,
            report_partial_results: self.report_partial_results,
            on_device_only: self.on_device_only,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Authorizing,
    Starting,
    Running,
    Finished,
    Failed,
}

/// Returned by [`RecognitionSession::drive`] when a policy hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// No result arrived within the inactivity timeout after a partial.
    InactivityElapsed,
}

struct ActiveTask {
    request: RecognitionRequest,
    task: Box<dyn RecognitionTask>,
    updates: mpsc::UnboundedReceiver<EngineUpdate>,
    inactivity_deadline: Option<Instant>,
}

enum TaskState {
    Idle,
    Authorizing,
    Starting,
    Running(ActiveTask),
    Finished { timed_out: bool },
    Failed,
}

/// Runs one recognition task at a time against one input source.
///
/// All state transitions happen on the owner's task: callers `await`
/// [`drive`](Self::drive) in their event loop to apply engine updates and
/// fire the inactivity timer. Events go out on the channel given at
/// construction, with `Started` first and `Finished` last for every task.
pub struct RecognitionSession {
    engine: Arc<dyn SpeechEngine>,
    input: Box<dyn InputSource>,
    settings: RecognitionSettings,
    state: TaskState,
    events: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RecognitionSession {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        input: Box<dyn InputSource>,
        settings: RecognitionSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<Self, SpeechError> {
        if !engine.supports_locale(&settings.locale) {
            tracing::warn!(engine = engine.name(), locale = %settings.locale, "locale not supported");
            return Err(SpeechError::EngineUnavailable);
        }
        Ok(Self {
            engine,
            input,
            settings,
            state: TaskState::Idle,
            events,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            TaskState::Idle => SessionPhase::Idle,
            TaskState::Authorizing => SessionPhase::Authorizing,
            TaskState::Starting => SessionPhase::Starting,
            TaskState::Running(_) => SessionPhase::Running,
            TaskState::Finished { .. } => SessionPhase::Finished,
            TaskState::Failed => SessionPhase::Failed,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TaskState::Running(_))
    }

    /// The last task ended because the engine gave up on silence.
    pub fn ended_by_inactivity(&self) -> bool {
        matches!(self.state, TaskState::Finished { timed_out: true })
    }

    pub fn request(&self) -> Option<&RecognitionRequest> {
        match &self.state {
            TaskState::Running(active) => Some(&active.request),
            _ => None,
        }
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    pub fn input_name(&self) -> &str {
        self.input.name()
    }

    /// Authorize, open the input source and start a new task.
    ///
    /// A running task is stopped first. On failure the session is back to
    /// `Idle` and no event has been emitted.
    pub async fn start(&mut self) -> Result<(), SpeechError> {
        self.stop();

        self.state = TaskState::Authorizing;
        let status = self.engine.request_authorization().await;
        if let Err(e) = status.into_result() {
            tracing::warn!(engine = self.engine.name(), "authorization failed: {e}");
            self.state = TaskState::Idle;
            return Err(e);
        }
        if !self.engine.is_available() {
            tracing::warn!(engine = self.engine.name(), "engine unavailable");
            self.state = TaskState::Idle;
            return Err(SpeechError::EngineUnavailable);
        }

        self.state = TaskState::Starting;
        let feed = match self.input.initialize() {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(input = self.input.name(), "input source failed: {e}");
                self.state = TaskState::Idle;
                return Err(e);
            }
        };

        let request = self.settings.request();
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let task = match self.engine.recognition_task(&request, feed, updates_tx) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(engine = self.engine.name(), "recognition task not created: {e}");
                self.input.stop();
                self.state = TaskState::Idle;
                return Err(e);
            }
        };

        tracing::debug!(
            engine = self.engine.name(),
            input = self.input.name(),
            locale = %request.locale,
            hint = ?request.task_hint,
            "recognition started"
        );
        self.emit(RecognitionEvent::Started);
        self.state = TaskState::Running(ActiveTask {
            request,
            task,
            updates,
            inactivity_deadline: None,
        });
        Ok(())
    }

    /// Hand a caller-fed buffer to the active task. Returns whether it was
    /// accepted; without a running task this is a no-op.
    pub fn process_audio(&self, chunk: AudioChunk) -> bool {
        if !self.is_running() {
            return false;
        }
        self.input.append(chunk)
    }

    /// Cancel the running task and release the input source. Idempotent;
    /// emits `Finished` only when a task was running.
    pub fn stop(&mut self) {
        if let TaskState::Running(mut active) = std::mem::replace(&mut self.state, TaskState::Idle)
        {
            active.task.cancel();
            self.input.stop();
            tracing::debug!(engine = self.engine.name(), "recognition stopped");
            self.emit(RecognitionEvent::Finished);
        }
    }

    /// Wait for the next engine update or timer expiry and apply it.
    ///
    /// Cancel safe. Pends forever while no task is running, so it can sit in
    /// a `select!` next to command channels.
    pub async fn drive(&mut self) -> Option<SessionSignal> {
        let TaskState::Running(active) = &mut self.state else {
            std::future::pending::<()>().await;
            return None;
        };
        let deadline = active.inactivity_deadline;
        let next = tokio::select! {
            update = active.updates.recv() => Some(update),
            _ = sleep_until(deadline) => None,
        };
        match next {
            Some(Some(update)) => {
                self.apply(update);
                None
            }
            Some(None) => {
                self.complete();
                None
            }
            None => self.inactivity_elapsed(),
        }
    }

    fn apply(&mut self, update: EngineUpdate) {
        match update {
            EngineUpdate::Transcript { text, is_final } => self.on_transcript(text, is_final),
            EngineUpdate::Failed(failure) => self.on_failure(failure),
            EngineUpdate::AvailabilityChanged(available) => {
                tracing::info!(engine = self.engine.name(), available, "availability changed");
                self.emit(RecognitionEvent::AvailabilityChanged(available));
            }
        }
    }

    fn on_transcript(&mut self, text: String, is_final: bool) {
        if !is_final && !self.settings.report_partial_results {
            return;
        }
        if let TaskState::Running(active) = &mut self.state {
            if self.settings.task_hint.arms_inactivity_timer() {
                active.inactivity_deadline = if is_final {
                    None
                } else {
                    Some(Instant::now() + self.settings.inactivity_timeout)
                };
            }
        }
        let event = if is_final {
            RecognitionEvent::FinalResult(text)
        } else {
            RecognitionEvent::PartialResult(text)
        };
        self.emit(event);
    }

    fn on_failure(&mut self, failure: EngineFailure) {
        self.clean();
        if failure.is_benign() {
            tracing::info!(engine = self.engine.name(), "recognition ended after inactivity");
            self.state = TaskState::Finished { timed_out: true };
            self.emit(RecognitionEvent::Finished);
        } else {
            tracing::warn!(engine = self.engine.name(), "recognition failed: {}", failure.message);
            self.state = TaskState::Failed;
            self.emit(RecognitionEvent::Error(SpeechError::Recognition(failure.message)));
            self.emit(RecognitionEvent::Finished);
        }
    }

    /// The engine closed its update stream.
    fn complete(&mut self) {
        self.clean();
        tracing::debug!(engine = self.engine.name(), "recognition finished");
        self.state = TaskState::Finished { timed_out: false };
        self.emit(RecognitionEvent::Finished);
    }

    fn inactivity_elapsed(&mut self) -> Option<SessionSignal> {
        if let TaskState::Running(active) = &mut self.state {
            active.inactivity_deadline = None;
        }
        tracing::debug!(
            timeout_ms = self.settings.inactivity_timeout.as_millis() as u64,
            "inactivity timeout elapsed"
        );
        if self.settings.stop_on_inactivity {
            self.stop();
        }
        Some(SessionSignal::InactivityElapsed)
    }

    /// Drop the running task and release the input without emitting.
    fn clean(&mut self) {
        if let TaskState::Running(mut active) = std::mem::replace(&mut self.state, TaskState::Idle)
        {
            active.task.cancel();
            self.input.stop();
        }
    }

    fn emit(&self, event: RecognitionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.clean();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedSpeechEngine;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voxtalk_core::{AudioFeed, AuthorizationStatus};

    /// Input source that counts lifecycle calls.
    struct RecordingInput {
        file: bool,
        sender: Option<mpsc::UnboundedSender<AudioChunk>>,
        initialized: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    impl RecordingInput {
        fn buffers() -> Self {
            Self {
                file: false,
                sender: None,
                initialized: Arc::new(AtomicUsize::new(0)),
                stopped: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn file() -> Self {
            Self {
                file: true,
                ..Self::buffers()
            }
        }
    }

    impl InputSource for RecordingInput {
        fn name(&self) -> &str {
            "recording"
        }

        fn initialize(&mut self) -> Result<AudioFeed, SpeechError> {
            self.initialized.fetch_add(1, Ordering::Relaxed);
            if self.file {
                return Ok(AudioFeed::File(PathBuf::from("utterance.wav")));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.sender = Some(tx);
            Ok(AudioFeed::Buffers(rx))
        }

        fn stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::Relaxed);
            self.sender = None;
        }

        fn append(&self, chunk: AudioChunk) -> bool {
            self.sender.as_ref().is_some_and(|tx| tx.send(chunk).is_ok())
        }
    }

    fn chunk() -> AudioChunk {
        AudioChunk {
            samples: vec![0.2; 160],
            sample_rate: 16000,
            channels: 1,
        }
    }

    fn query_settings() -> RecognitionSettings {
        RecognitionSettings {
            task_hint: TaskHint::Query,
            ..RecognitionSettings::default()
        }
    }

    fn session(
        engine: ScriptedSpeechEngine,
        input: RecordingInput,
        settings: RecognitionSettings,
    ) -> (RecognitionSession, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = RecognitionSession::new(Arc::new(engine), Box::new(input), settings, tx)
            .unwrap();
        (session, rx)
    }

    async fn drive_until_idle(session: &mut RecognitionSession) {
        while session.is_running() {
            session.drive().await;
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RecognitionEvent>) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_file_session_emits_started_results_finished_in_order() {
        let (mut session, mut rx) = session(
            ScriptedSpeechEngine::new("book a table"),
            RecordingInput::file(),
            RecognitionSettings::default(),
        );
        session.start().await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Running);
        drive_until_idle(&mut session).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                RecognitionEvent::Started,
                RecognitionEvent::PartialResult("book".to_string()),
                RecognitionEvent::PartialResult("book a".to_string()),
                RecognitionEvent::FinalResult("book a table".to_string()),
                RecognitionEvent::Finished,
            ]
        );
        assert_eq!(session.phase(), SessionPhase::Finished);
        assert!(!session.ended_by_inactivity());
    }

    #[tokio::test]
    async fn test_stop_without_task_is_silent_noop() {
        let (mut session, mut rx) = session(
            ScriptedSpeechEngine::new("hi"),
            RecordingInput::buffers(),
            RecognitionSettings::default(),
        );
        session.stop();
        session.stop();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_stop_twice_emits_one_finished_and_releases_input() {
        let input = RecordingInput::buffers();
        let stopped = Arc::clone(&input.stopped);
        let (mut session, mut rx) = session(
            ScriptedSpeechEngine::new("hi there"),
            input,
            RecognitionSettings::default(),
        );
        session.start().await.unwrap();
        session.stop();
        session.stop();

        assert_eq!(stopped.load(Ordering::Relaxed), 1);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(
            drain(&mut rx),
            vec![RecognitionEvent::Started, RecognitionEvent::Finished]
        );
        assert!(!session.process_audio(chunk()));
    }

    #[tokio::test]
    async fn test_authorization_failures_surface_from_start() {
        for (status, expected) in [
            (AuthorizationStatus::Denied, SpeechError::PermissionDenied),
            (AuthorizationStatus::Restricted, SpeechError::PermissionRestricted),
            (AuthorizationStatus::NotDetermined, SpeechError::PermissionNotDetermined),
        ] {
            let input = RecordingInput::buffers();
            let initialized = Arc::clone(&input.initialized);
            let (mut session, mut rx) = session(
                ScriptedSpeechEngine::new("hi").with_authorization(status),
                input,
                RecognitionSettings::default(),
            );
            assert_eq!(session.start().await, Err(expected));
            assert_eq!(session.phase(), SessionPhase::Idle);
            assert_eq!(initialized.load(Ordering::Relaxed), 0);
            assert!(drain(&mut rx).is_empty());
        }
    }

    #[tokio::test]
    async fn test_unavailable_engine_fails_start() {
        let (mut session, _rx) = session(
            ScriptedSpeechEngine::new("hi").unavailable(),
            RecordingInput::buffers(),
            RecognitionSettings::default(),
        );
        assert_eq!(session.start().await, Err(SpeechError::EngineUnavailable));
    }

    #[test]
    fn test_unsupported_locale_is_rejected_at_construction() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = ScriptedSpeechEngine::new("hola").with_locales(&["es-ES"]);
        let result = RecognitionSession::new(
            Arc::new(engine),
            Box::new(RecordingInput::buffers()),
            RecognitionSettings::default(),
            tx,
        );
        assert!(matches!(result, Err(SpeechError::EngineUnavailable)));
    }

    #[tokio::test]
    async fn test_request_carries_settings() {
        let engine = Arc::new(ScriptedSpeechEngine::new("hi"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = RecognitionSettings {
            locale: "es-ES".to_string(),
            task_hint: TaskHint::Dictation,
            report_partial_results: false,
            on_device_only: true,
            ..RecognitionSettings::default()
        };
        let shared: Arc<dyn SpeechEngine> = engine.clone();
        let mut session =
            RecognitionSession::new(shared, Box::new(RecordingInput::buffers()), settings, tx)
                .unwrap();
        session.start().await.unwrap();
        let expected = RecognitionRequest {
            locale: "es-ES".to_string(),
            task_hint: TaskHint::Dictation,
            report_partial_results: false,
            on_device_only: true,
        };
        assert_eq!(session.request(), Some(&expected));
        assert_eq!(engine.last_request(), Some(expected));
    }

    #[tokio::test]
    async fn test_benign_timeout_finishes_without_error() {
        let input = RecordingInput::file();
        let stopped = Arc::clone(&input.stopped);
        let (mut session, mut rx) = session(
            ScriptedSpeechEngine::new("anyone there").fail_after(0, EngineFailure::inactivity()),
            input,
            RecognitionSettings::default(),
        );
        session.start().await.unwrap();
        drive_until_idle(&mut session).await;

        assert_eq!(
            drain(&mut rx),
            vec![RecognitionEvent::Started, RecognitionEvent::Finished]
        );
        assert!(session.ended_by_inactivity());
        assert_eq!(stopped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_reports_error_then_finished() {
        let input = RecordingInput::file();
        let stopped = Arc::clone(&input.stopped);
        let (mut session, mut rx) = session(
            ScriptedSpeechEngine::new("call mom now").fail_after(1, EngineFailure::other("lost")),
            input,
            RecognitionSettings::default(),
        );
        session.start().await.unwrap();
        drive_until_idle(&mut session).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                RecognitionEvent::Started,
                RecognitionEvent::PartialResult("call".to_string()),
                RecognitionEvent::Error(SpeechError::Recognition("lost".to_string())),
                RecognitionEvent::Finished,
            ]
        );
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(stopped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_restart_cancels_previous_task_first() {
        let engine = Arc::new(ScriptedSpeechEngine::new("one two"));
        let input = RecordingInput::buffers();
        let stopped = Arc::clone(&input.stopped);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared: Arc<dyn SpeechEngine> = engine.clone();
        let mut session = RecognitionSession::new(
            shared,
            Box::new(input),
            RecognitionSettings::default(),
            tx,
        )
        .unwrap();

        session.start().await.unwrap();
        session.start().await.unwrap();

        assert_eq!(engine.tasks_started(), 2);
        assert_eq!(stopped.load(Ordering::Relaxed), 1);
        assert_eq!(
            drain(&mut rx),
            vec![
                RecognitionEvent::Started,
                RecognitionEvent::Finished,
                RecognitionEvent::Started
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_hook_fires_once_after_partial() {
        let (mut session, mut rx) = session(
            ScriptedSpeechEngine::new("lights off please").hold_open(),
            RecordingInput::buffers(),
            RecognitionSettings {
                stop_on_inactivity: true,
                ..query_settings()
            },
        );
        session.start().await.unwrap();
        assert!(session.process_audio(chunk()));
        assert_eq!(session.drive().await, None);

        let partial_at = Instant::now();
        assert_eq!(session.drive().await, Some(SessionSignal::InactivityElapsed));
        assert!(partial_at.elapsed() >= Duration::from_millis(800));
        assert_eq!(session.phase(), SessionPhase::Idle);

        assert_eq!(
            drain(&mut rx),
            vec![
                RecognitionEvent::Started,
                RecognitionEvent::PartialResult("lights".to_string()),
                RecognitionEvent::Finished,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_partial_restarts_inactivity_timer() {
        let (mut session, _rx) = session(
            ScriptedSpeechEngine::new("lights off please").hold_open(),
            RecordingInput::buffers(),
            query_settings(),
        );
        session.start().await.unwrap();
        let started_at = Instant::now();

        session.process_audio(chunk());
        assert_eq!(session.drive().await, None);
        tokio::time::advance(Duration::from_millis(500)).await;

        session.process_audio(chunk());
        assert_eq!(session.drive().await, None);
        let second_partial_at = Instant::now();

        assert_eq!(session.drive().await, Some(SessionSignal::InactivityElapsed));
        assert!(second_partial_at.elapsed() >= Duration::from_millis(800));
        assert!(started_at.elapsed() >= Duration::from_millis(1300));
        // The hook is inert by default: the task keeps running.
        assert!(session.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dictation_never_arms_inactivity_timer() {
        let (mut session, _rx) = session(
            ScriptedSpeechEngine::new("dear diary").hold_open(),
            RecordingInput::buffers(),
            RecognitionSettings {
                task_hint: TaskHint::Dictation,
                stop_on_inactivity: true,
                ..RecognitionSettings::default()
            },
        );
        session.start().await.unwrap();
        session.process_audio(chunk());
        assert_eq!(session.drive().await, None);

        let waited = tokio::time::timeout(Duration::from_secs(5), session.drive()).await;
        assert!(waited.is_err());
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_availability_changes_are_forwarded() {
        struct FlappingEngine;

        #[async_trait::async_trait]
        impl SpeechEngine for FlappingEngine {
            fn name(&self) -> &str {
                "flapping"
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
                _request: &RecognitionRequest,
                _feed: voxtalk_core::AudioFeed,
                updates: mpsc::UnboundedSender<EngineUpdate>,
            ) -> Result<Box<dyn RecognitionTask>, SpeechError> {
                let handle = tokio::spawn(async move {
                    let _ = updates.send(EngineUpdate::AvailabilityChanged(false));
                });
                Ok(Box::new(crate::SpawnedTask::new(handle)))
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = RecognitionSession::new(
            Arc::new(FlappingEngine),
            Box::new(RecordingInput::buffers()),
            RecognitionSettings::default(),
            tx,
        )
        .unwrap();
        session.start().await.unwrap();
        drive_until_idle(&mut session).await;
        assert_eq!(
            drain(&mut rx),
            vec![
                RecognitionEvent::Started,
                RecognitionEvent::AvailabilityChanged(false),
                RecognitionEvent::Finished,
            ]
        );
    }
}
