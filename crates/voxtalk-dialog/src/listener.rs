use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use voxtalk_core::{
    AudioChunk, InputProvider, RecognitionEvent, SpeechError, SpeechEvent, VoiceActivity,
};
use voxtalk_engine::{RecognitionSession, RecognitionSettings, SessionSignal, SpeechEngine};

/// Everything needed to open recognition sessions.
#[derive(Clone)]
pub struct RecognizerSetup {
    pub engine: Arc<dyn SpeechEngine>,
    pub inputs: Arc<dyn InputProvider>,
    pub settings: RecognitionSettings,
}

impl RecognizerSetup {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        inputs: Arc<dyn InputProvider>,
        settings: RecognitionSettings,
    ) -> Self {
        Self {
            engine,
            inputs,
            settings,
        }
    }

    /// A fresh input source and session bound to `device`.
    pub(crate) fn open(
        &self,
        device: Option<&str>,
        activity: Option<mpsc::UnboundedSender<VoiceActivity>>,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<RecognitionSession, SpeechError> {
        let input = self.inputs.create(device, activity)?;
        RecognitionSession::new(
            Arc::clone(&self.engine),
            input,
            self.settings.clone(),
            events,
        )
    }
}

pub(crate) async fn drive_session(session: &mut Option<RecognitionSession>) -> Option<SessionSignal> {
    match session {
        Some(session) => session.drive().await,
        None => std::future::pending().await,
    }
}

fn actor_gone() -> SpeechError {
    SpeechError::Closed("recognizer")
}

// ── Turn policies ─────────────────────────────────────────────

/// What a policy wants done with a result or a silence.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Action {
    pub emit: Option<String>,
    pub stop: bool,
}

pub(crate) trait TurnPolicy: Send + 'static {
    fn name(&self) -> &'static str;
    fn on_text(&mut self, text: String, is_final: bool) -> Action;
    fn on_silence(&mut self) -> Action;
    /// Start a new task when the engine ended the last one for inactivity.
    fn restart_after_timeout(&self) -> bool {
        false
    }
    fn reset(&mut self);
}

// ── Actor ─────────────────────────────────────────────────────

pub(crate) enum ListenCommand {
    Start(oneshot::Sender<Result<(), SpeechError>>),
    Stop,
    ProcessAudio(AudioChunk),
    Shutdown,
}

enum Wake {
    Command(Option<ListenCommand>),
    Signal(Option<SessionSignal>),
    Event(RecognitionEvent),
}

struct ListenerActor<P> {
    setup: RecognizerSetup,
    policy: P,
    session: Option<RecognitionSession>,
    recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
    recognition_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    results: mpsc::UnboundedSender<Result<String, SpeechError>>,
    events: mpsc::UnboundedSender<SpeechEvent>,
    listening: bool,
}

impl<P: TurnPolicy> ListenerActor<P> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ListenCommand>) {
        loop {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                signal = drive_session(&mut self.session) => Wake::Signal(signal),
                Some(event) = self.recognition_rx.recv() => Wake::Event(event),
            };
            match wake {
                Wake::Command(None) | Wake::Command(Some(ListenCommand::Shutdown)) => break,
                Wake::Command(Some(command)) => self.on_command(command).await,
                Wake::Signal(Some(SessionSignal::InactivityElapsed)) => {
                    let action = self.policy.on_silence();
                    self.apply(action);
                }
                Wake::Signal(None) => {}
                Wake::Event(event) => self.on_event(event).await,
            }
        }

        self.listening = false;
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        while let Ok(event) = self.recognition_rx.try_recv() {
            self.on_event(event).await;
        }
        tracing::debug!(recognizer = self.policy.name(), "recognizer shut down");
    }

    async fn on_command(&mut self, command: ListenCommand) {
        match command {
            ListenCommand::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            ListenCommand::Stop => self.stop(),
            ListenCommand::ProcessAudio(chunk) => {
                if let Some(session) = &self.session {
                    session.process_audio(chunk);
                }
            }
            ListenCommand::Shutdown => {}
        }
    }

    async fn start(&mut self) -> Result<(), SpeechError> {
        if self.session.is_none() {
            self.session = Some(self.setup.open(None, None, self.recognition_tx.clone())?);
        }
        self.policy.reset();
        let Some(session) = self.session.as_mut() else {
            return Err(actor_gone());
        };
        session.start().await?;
        self.listening = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.listening = false;
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }

    fn apply(&mut self, action: Action) {
        if let Some(text) = action.emit {
            let _ = self.results.send(Ok(text));
        }
        if action.stop {
            self.stop();
        }
    }

    async fn on_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => {
                let _ = self.events.send(SpeechEvent::StartedListening);
            }
            RecognitionEvent::PartialResult(text) => {
                let action = self.policy.on_text(text, false);
                self.apply(action);
            }
            RecognitionEvent::FinalResult(text) => {
                let action = self.policy.on_text(text, true);
                self.apply(action);
            }
            RecognitionEvent::Error(e) => {
                let _ = self.results.send(Err(e));
            }
            RecognitionEvent::Finished => {
                let _ = self.events.send(SpeechEvent::StoppedListening);
                self.after_finished().await;
            }
            RecognitionEvent::AvailabilityChanged(available) => {
                tracing::info!(recognizer = self.policy.name(), available, "recognizer availability changed");
            }
        }
    }

    async fn after_finished(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_running() {
            return;
        }
        if self.listening && self.policy.restart_after_timeout() && session.ended_by_inactivity() {
            tracing::info!(recognizer = self.policy.name(), "restarting after inactivity timeout");
            if let Err(e) = session.start().await {
                self.listening = false;
                let _ = self.results.send(Err(e));
            }
            return;
        }
        self.listening = false;
    }
}

// ── Handle ────────────────────────────────────────────────────

/// Caller side of a recognizer actor.
pub(crate) struct RecognizerHandle {
    commands: mpsc::UnboundedSender<ListenCommand>,
    results: Option<mpsc::UnboundedReceiver<Result<String, SpeechError>>>,
    events: Option<mpsc::UnboundedReceiver<SpeechEvent>>,
    task: Option<JoinHandle<()>>,
}

impl RecognizerHandle {
    pub fn spawn<P: TurnPolicy>(setup: RecognizerSetup, policy: P) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (results_tx, results) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
        let actor = ListenerActor {
            setup,
            policy,
            session: None,
            recognition_tx,
            recognition_rx,
            results: results_tx,
            events: events_tx,
            listening: false,
        };
        let task = tokio::spawn(actor.run(commands_rx));
        Self {
            commands,
            results: Some(results),
            events: Some(events),
            task: Some(task),
        }
    }

    pub async fn start(&self) -> Result<(), SpeechError> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(ListenCommand::Start(reply))
            .map_err(|_| actor_gone())?;
        done.await.map_err(|_| actor_gone())?
    }

    pub fn stop(&self) {
        let _ = self.commands.send(ListenCommand::Stop);
    }

    pub fn process_audio(&self, chunk: AudioChunk) {
        let _ = self.commands.send(ListenCommand::ProcessAudio(chunk));
    }

    pub fn take_result_receiver(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<Result<String, SpeechError>>> {
        self.results.take()
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SpeechEvent>> {
        self.events.take()
    }

    pub async fn shutdown(&mut self) {
        let _ = self.commands.send(ListenCommand::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
