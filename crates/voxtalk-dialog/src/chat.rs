use crate::listener::{drive_session, RecognizerSetup};
use crate::recovery::{DeviceRecovery, RecoverySettings};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use voxtalk_audio::{DeviceChange, DeviceMonitor};
use voxtalk_core::{
    AudioChunk, RecognitionEvent, SpeechError, SpeechEvent, SpeechTurn,
    TranscriptAccumulator, Voice, VoiceActivity,
};
use voxtalk_engine::{RecognitionSession, SessionSignal};
use voxtalk_synthesis::{SynthesisEngine, SynthesisEvent, SynthesisSession, SynthesisSettings};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub recovery: RecoverySettings,
    /// Cut off synthesis as soon as the input detects voice, before any
    /// transcript arrives.
    pub barge_in_on_voice_activity: bool,
    /// When the inactivity timer fires, commit the last partial as a final
    /// turn and listen for the next one.
    pub finalize_on_silence: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            recovery: RecoverySettings::default(),
            barge_in_on_voice_activity: true,
            finalize_on_silence: true,
        }
    }
}

/// The synthesis side of a chat: an engine plus the settings its session
/// starts with.
pub struct SynthesisSetup {
    pub engine: Box<dyn SynthesisEngine>,
    pub settings: SynthesisSettings,
}

impl SynthesisSetup {
    pub fn new(engine: Box<dyn SynthesisEngine>, settings: SynthesisSettings) -> Self {
        Self { engine, settings }
    }
}

enum Synthesizer {
    Pending(SynthesisSetup),
    Ready(SynthesisSession),
    Vacant,
}

impl Synthesizer {
    fn session(
        &mut self,
        events: &mpsc::UnboundedSender<SynthesisEvent>,
    ) -> Option<&mut SynthesisSession> {
        if matches!(self, Synthesizer::Pending(_)) {
            if let Synthesizer::Pending(setup) = std::mem::replace(self, Synthesizer::Vacant) {
                tracing::debug!(engine = setup.engine.name(), "creating synthesis session");
                *self = Synthesizer::Ready(SynthesisSession::new(
                    setup.engine,
                    setup.settings,
                    events.clone(),
                ));
            }
        }
        match self {
            Synthesizer::Ready(session) => Some(session),
            _ => None,
        }
    }

    fn stop(&mut self) {
        if let Synthesizer::Ready(session) = self {
            session.stop();
        }
    }

    fn voices(&self) -> Vec<Voice> {
        match self {
            Synthesizer::Pending(setup) => setup.engine.available_voices(),
            Synthesizer::Ready(session) => session.voices(),
            Synthesizer::Vacant => Vec::new(),
        }
    }

    fn update(&mut self, settings: SynthesisSettings) {
        match self {
            Synthesizer::Pending(setup) => setup.settings = settings,
            Synthesizer::Ready(session) => session.update_settings(settings),
            Synthesizer::Vacant => {}
        }
    }
}

fn chat_gone() -> SpeechError {
    SpeechError::Closed("chat")
}

async fn drive_synthesizer(synthesizer: &mut Synthesizer) -> Result<(), SpeechError> {
    match synthesizer {
        Synthesizer::Ready(session) => session.drive().await,
        _ => std::future::pending().await,
    }
}

async fn next_change(
    changes: &mut Option<mpsc::UnboundedReceiver<DeviceChange>>,
) -> Option<DeviceChange> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ── Actor ─────────────────────────────────────────────────────

enum ChatCommand {
    Start(oneshot::Sender<Result<(), SpeechError>>),
    Stop,
    ProcessAudio(AudioChunk),
    Synthesize {
        text: String,
        is_final: bool,
        voice: Option<Voice>,
        reply: oneshot::Sender<Result<(), SpeechError>>,
    },
    StopSynthesizing,
    PauseSpeaking,
    ResumeSpeaking,
    UpdateVoice(SynthesisSettings),
    ListVoices(oneshot::Sender<Vec<Voice>>),
    Shutdown,
}

enum Wake {
    Command(Option<ChatCommand>),
    Signal(Option<SessionSignal>),
    Recognition(RecognitionEvent),
    Synthesis(SynthesisEvent),
    SynthesisDriven(Result<(), SpeechError>),
    Activity(VoiceActivity),
    DeviceChanged(Option<DeviceChange>),
    RecoveryTimer,
}

struct ChatActor {
    setup: RecognizerSetup,
    options: ChatOptions,
    session: Option<RecognitionSession>,
    recognition_tx: mpsc::UnboundedSender<RecognitionEvent>,
    recognition_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
    synthesizer: Synthesizer,
    synthesis_tx: mpsc::UnboundedSender<SynthesisEvent>,
    synthesis_rx: mpsc::UnboundedReceiver<SynthesisEvent>,
    activity_tx: mpsc::UnboundedSender<VoiceActivity>,
    activity_rx: mpsc::UnboundedReceiver<VoiceActivity>,
    monitor: Option<Box<dyn DeviceMonitor>>,
    device_changes: Option<mpsc::UnboundedReceiver<DeviceChange>>,
    recovery: DeviceRecovery,
    /// Replace policy: every engine final is a turn of its own.
    accumulator: TranscriptAccumulator,
    listening: bool,
    results: mpsc::UnboundedSender<Result<SpeechTurn, SpeechError>>,
    events: mpsc::UnboundedSender<SpeechEvent>,
}

impl ChatActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChatCommand>) {
        loop {
            let deadline = self.recovery.next_deadline();
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(event) = self.recognition_rx.recv() => Wake::Recognition(event),
                Some(event) = self.synthesis_rx.recv() => Wake::Synthesis(event),
                Some(activity) = self.activity_rx.recv() => Wake::Activity(activity),
                signal = drive_session(&mut self.session) => Wake::Signal(signal),
                result = drive_synthesizer(&mut self.synthesizer) => Wake::SynthesisDriven(result),
                change = next_change(&mut self.device_changes) => Wake::DeviceChanged(change),
                _ = sleep_until(deadline) => Wake::RecoveryTimer,
            };
            match wake {
                Wake::Command(None) | Wake::Command(Some(ChatCommand::Shutdown)) => break,
                Wake::Command(Some(command)) => self.on_command(command).await,
                Wake::Signal(Some(SessionSignal::InactivityElapsed)) => self.on_silence().await,
                Wake::Signal(None) => {}
                Wake::Recognition(event) => self.on_recognition(event).await,
                Wake::Synthesis(event) => self.on_synthesis(event),
                Wake::SynthesisDriven(Err(e)) => {
                    tracing::warn!("synthesis failed: {e}");
                }
                Wake::SynthesisDriven(Ok(())) => {}
                Wake::Activity(activity) => self.on_activity(activity),
                Wake::DeviceChanged(Some(change)) => self.on_device_change(change),
                Wake::DeviceChanged(None) => {
                    tracing::debug!("device monitor closed");
                    self.device_changes = None;
                }
                Wake::RecoveryTimer => self.on_recovery_timer().await,
            }
        }

        self.listening = false;
        self.recovery.cancel();
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        self.synthesizer.stop();
        while let Ok(event) = self.recognition_rx.try_recv() {
            self.on_recognition(event).await;
        }
        while let Ok(event) = self.synthesis_rx.try_recv() {
            self.on_synthesis(event);
        }
        tracing::debug!("chat shut down");
    }

    async fn on_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            ChatCommand::Stop => self.stop(),
            ChatCommand::ProcessAudio(chunk) => {
                if let Some(session) = &self.session {
                    session.process_audio(chunk);
                }
            }
            ChatCommand::Synthesize {
                text,
                is_final,
                voice,
                reply,
            } => {
                let result = match self.synthesizer.session(&self.synthesis_tx) {
                    Some(session) => session.speak(&text, is_final, voice.as_ref()),
                    None => Err(SpeechError::Synthesis("synthesis unavailable".to_string())),
                };
                let _ = reply.send(result);
            }
            ChatCommand::StopSynthesizing => self.synthesizer.stop(),
            ChatCommand::PauseSpeaking => {
                if let Synthesizer::Ready(session) = &mut self.synthesizer {
                    session.pause();
                }
            }
            ChatCommand::ResumeSpeaking => {
                if let Synthesizer::Ready(session) = &mut self.synthesizer {
                    if let Err(e) = session.resume() {
                        tracing::warn!("synthesis resume failed: {e}");
                    }
                }
            }
            ChatCommand::UpdateVoice(settings) => {
                tracing::info!(voice = ?settings.voice, rate = settings.rate, "synthesis voice updated");
                self.synthesizer.update(settings);
            }
            ChatCommand::ListVoices(reply) => {
                let _ = reply.send(self.synthesizer.voices());
            }
            ChatCommand::Shutdown => {}
        }
    }

    fn current_device(&self) -> Option<String> {
        self.monitor.as_ref().and_then(|m| m.current_input_device())
    }

    fn open_session(&mut self) -> Result<(), SpeechError> {
        let device = self.current_device();
        let session = self.setup.open(
            device.as_deref(),
            Some(self.activity_tx.clone()),
            self.recognition_tx.clone(),
        )?;
        tracing::debug!(device = ?device, input = session.input_name(), "recognition input opened");
        if let Some(mut previous) = self.session.take() {
            previous.stop();
        }
        self.recovery.bind(device);
        self.session = Some(session);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SpeechError> {
        // An explicit start supersedes a pending device recovery.
        if self.recovery.is_settling() {
            self.recovery.cancel();
        }
        if self.session.is_none() {
            self.open_session()?;
        }
        self.accumulator.clear();
        let Some(session) = self.session.as_mut() else {
            return Err(chat_gone());
        };
        session.start().await?;
        self.listening = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.listening = false;
        self.recovery.cancel();
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }

    fn send_turn(&self, text: String, is_final: bool) {
        let _ = self.results.send(Ok(SpeechTurn { text, is_final }));
    }

    fn emit(&self, event: SpeechEvent) {
        let _ = self.events.send(event);
    }

    async fn on_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => self.emit(SpeechEvent::StartedListening),
            RecognitionEvent::PartialResult(text) => {
                self.interrupt_synthesis();
                self.emit(SpeechEvent::DetectedSpeaking);
                let text = self.accumulator.apply(&text, false);
                self.send_turn(text, false);
            }
            RecognitionEvent::FinalResult(text) => {
                let text = self.accumulator.apply(&text, true);
                self.accumulator.clear();
                self.send_turn(text, true);
            }
            RecognitionEvent::Error(e) => {
                let _ = self.results.send(Err(e));
            }
            RecognitionEvent::Finished => {
                self.emit(SpeechEvent::StoppedListening);
                self.after_finished().await;
            }
            RecognitionEvent::AvailabilityChanged(available) => {
                tracing::info!(available, "chat recognizer availability changed");
            }
        }
    }

    async fn after_finished(&mut self) {
        if self.recovery.is_settling() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.is_running() {
            return;
        }
        if self.listening && session.ended_by_inactivity() {
            tracing::info!("chat restarting after inactivity timeout");
            if let Err(e) = session.start().await {
                self.listening = false;
                let _ = self.results.send(Err(e));
            }
            return;
        }
        self.listening = false;
    }

    async fn on_silence(&mut self) {
        if !self.options.finalize_on_silence {
            return;
        }
        let text = self.accumulator.last_text().trim().to_string();
        if text.is_empty() {
            return;
        }
        tracing::debug!("committing turn after silence");
        self.accumulator.clear();
        self.send_turn(text, true);
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.start().await {
                self.listening = false;
                let _ = self.results.send(Err(e));
            }
        }
    }

    fn on_synthesis(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Started => self.emit(SpeechEvent::StartedSpeaking),
            SynthesisEvent::Finished => self.emit(SpeechEvent::StoppedSpeaking),
            SynthesisEvent::Range(range) => self.emit(SpeechEvent::SynthesizingRange(range)),
        }
    }

    fn on_activity(&mut self, activity: VoiceActivity) {
        tracing::trace!(?activity, "voice activity");
        if activity == VoiceActivity::SpeechStarted && self.options.barge_in_on_voice_activity {
            self.interrupt_synthesis();
            self.emit(SpeechEvent::DetectedSpeaking);
        }
    }

    /// Stop synthesis and surface its events before anything that follows.
    fn interrupt_synthesis(&mut self) {
        self.synthesizer.stop();
        while let Ok(event) = self.synthesis_rx.try_recv() {
            self.on_synthesis(event);
        }
    }

    fn on_device_change(&mut self, change: DeviceChange) {
        tracing::debug!(device = ?change.input_device, "input device change");
        if self.recovery.on_change(self.listening, Instant::now()) {
            self.release_for_recovery();
        }
    }

    fn release_for_recovery(&mut self) {
        tracing::info!("input device changed, restarting recognition");
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    async fn on_recovery_timer(&mut self) {
        let outcome = self.recovery.on_timer(Instant::now());
        if outcome.restart && self.listening {
            if let Err(e) = self.restart_on_current_device().await {
                tracing::warn!("recovery failed: {e}");
                self.listening = false;
                let _ = self.results.send(Err(e));
            }
        }
        if outcome.recheck
            && self.listening
            && self.current_device().as_deref() != self.recovery.bound_device()
        {
            self.recovery.begin(Instant::now());
            self.release_for_recovery();
        }
    }

    async fn restart_on_current_device(&mut self) -> Result<(), SpeechError> {
        self.open_session()?;
        self.accumulator.clear();
        match self.session.as_mut() {
            Some(session) => session.start().await,
            None => Err(chat_gone()),
        }
    }
}

// ── Handle ────────────────────────────────────────────────────

/// A spoken dialogue loop in which the user can always interrupt.
///
/// Recognition runs continuously; any partial transcript cancels synthesis
/// before the turn is delivered. When a device monitor is attached, input
/// device changes restart recognition on the new device.
pub struct InterruptibleChat {
    commands: mpsc::UnboundedSender<ChatCommand>,
    results: Option<mpsc::UnboundedReceiver<Result<SpeechTurn, SpeechError>>>,
    events: Option<mpsc::UnboundedReceiver<SpeechEvent>>,
    task: Option<JoinHandle<()>>,
}

impl InterruptibleChat {
    /// Spawns the chat task; must be called inside a tokio runtime.
    pub fn spawn(
        setup: RecognizerSetup,
        synthesis: SynthesisSetup,
        monitor: Option<Box<dyn DeviceMonitor>>,
        options: ChatOptions,
    ) -> Self {
        let mut monitor = monitor;
        let device_changes = monitor.as_mut().and_then(|m| m.take_change_receiver());
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (results_tx, results) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
        let (synthesis_tx, synthesis_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();

        let actor = ChatActor {
            setup,
            options,
            session: None,
            recognition_tx,
            recognition_rx,
            synthesizer: Synthesizer::Pending(synthesis),
            synthesis_tx,
            synthesis_rx,
            activity_tx,
            activity_rx,
            monitor,
            device_changes,
            recovery: DeviceRecovery::new(options.recovery),
            accumulator: TranscriptAccumulator::default(),
            listening: false,
            results: results_tx,
            events: events_tx,
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
        self.send(ChatCommand::Start(reply))?;
        done.await.map_err(|_| chat_gone())?
    }

    pub fn stop(&self) {
        let _ = self.send(ChatCommand::Stop);
    }

    pub fn process_audio(&self, chunk: AudioChunk) {
        let _ = self.send(ChatCommand::ProcessAudio(chunk));
    }

    /// Queue text to speak. The synthesis session is created on first use;
    /// `voice` overrides the configured voice from here on.
    pub async fn synthesize(
        &self,
        text: &str,
        is_final: bool,
        voice: Option<Voice>,
    ) -> Result<(), SpeechError> {
        let (reply, done) = oneshot::channel();
        self.send(ChatCommand::Synthesize {
            text: text.to_string(),
            is_final,
            voice,
            reply,
        })?;
        done.await.map_err(|_| chat_gone())?
    }

    pub fn stop_synthesizing(&self) {
        let _ = self.send(ChatCommand::StopSynthesizing);
    }

    pub fn pause_speaking(&self) {
        let _ = self.send(ChatCommand::PauseSpeaking);
    }

    pub fn resume_speaking(&self) {
        let _ = self.send(ChatCommand::ResumeSpeaking);
    }

    pub fn update_voice(&self, settings: SynthesisSettings) {
        let _ = self.send(ChatCommand::UpdateVoice(settings));
    }

    pub async fn list_voices(&self) -> Vec<Voice> {
        let (reply, done) = oneshot::channel();
        if self.send(ChatCommand::ListVoices(reply)).is_err() {
            return Vec::new();
        }
        done.await.unwrap_or_default()
    }

    pub fn take_result_receiver(
        &mut self,
    ) -> Option<mpsc::UnboundedReceiver<Result<SpeechTurn, SpeechError>>> {
        self.results.take()
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SpeechEvent>> {
        self.events.take()
    }

    pub async fn shutdown(mut self) {
        let _ = self.send(ChatCommand::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: ChatCommand) -> Result<(), SpeechError> {
        self.commands.send(command).map_err(|_| chat_gone())
    }
}
