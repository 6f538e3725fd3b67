use crate::buffer::{FlushPolicy, TextChunkBuffer};
use crate::engine_trait::{SpeechBoundary, SynthesisEngine, SynthesisNotification, Utterance};
use std::ops::Range;
use tokio::sync::mpsc;
use voxtalk_core::{SpeechError, SynthesisConfig, Voice};

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSettings {
    pub language: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub min_flush_length: usize,
    pub markup: bool,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            voice: None,
            rate: 0.5,
            pitch: 1.0,
            min_flush_length: 10,
            markup: false,
        }
    }
}

impl SynthesisSettings {
    pub fn from_config(locale: &str, config: &SynthesisConfig) -> Self {
        Self {
            language: locale.to_string(),
            voice: config.voice.clone(),
            rate: config.rate,
            pitch: config.pitch,
            min_flush_length: config.min_flush_length,
            markup: config.markup,
        }
    }

    /// Take language, identifier and any rate/pitch the voice carries.
    pub fn apply_voice(&mut self, voice: &Voice) {
        self.language = voice.language.clone();
        self.voice = Some(voice.identifier.clone());
        if let Some(rate) = voice.rate {
            self.rate = rate;
        }
        if let Some(pitch) = voice.pitch_multiplier {
            self.pitch = pitch;
        }
    }

    fn flush_policy(&self) -> FlushPolicy {
        if self.markup {
            FlushPolicy::ssml()
        } else {
            FlushPolicy::Punctuation
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// First utterance of a stream went to the engine.
    Started,
    /// The stream was spoken to the end or stopped.
    Finished,
    /// Byte range within the current utterance about to be spoken.
    Range(Range<usize>),
}

struct InFlight {
    id: u64,
    text: String,
    spoken_from: usize,
}

/// Speaks streamed text one flushed chunk at a time.
///
/// At most one utterance is with the engine; the next chunk is only handed
/// over after the engine reports the previous one finished.
pub struct SynthesisSession {
    engine: Box<dyn SynthesisEngine>,
    notifications: mpsc::UnboundedReceiver<SynthesisNotification>,
    buffer: TextChunkBuffer,
    settings: SynthesisSettings,
    in_flight: Option<InFlight>,
    is_final: bool,
    paused: bool,
    streaming: bool,
    next_id: u64,
    events: mpsc::UnboundedSender<SynthesisEvent>,
}

impl SynthesisSession {
    pub fn new(
        mut engine: Box<dyn SynthesisEngine>,
        settings: SynthesisSettings,
        events: mpsc::UnboundedSender<SynthesisEvent>,
    ) -> Self {
        let (tx, notifications) = mpsc::unbounded_channel();
        engine.set_notification_sender(tx);
        let buffer = TextChunkBuffer::new(settings.flush_policy(), settings.min_flush_length);
        Self {
            engine,
            notifications,
            buffer,
            settings,
            in_flight: None,
            is_final: false,
            paused: false,
            streaming: false,
            next_id: 1,
            events,
        }
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    /// Replace voice settings for utterances not yet handed to the engine.
    /// The flush policy stays as constructed.
    pub fn update_settings(&mut self, settings: SynthesisSettings) {
        self.buffer.set_min_flush_length(settings.min_flush_length);
        self.settings = SynthesisSettings {
            markup: self.settings.markup,
            ..settings
        };
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pending_text(&self) -> &str {
        self.buffer.pending_text()
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.engine.available_voices()
    }

    /// Queue `text`; `is_final` marks the last piece of the stream. A voice
    /// overrides the session voice, rate and pitch from here on.
    pub fn speak(
        &mut self,
        text: &str,
        is_final: bool,
        voice: Option<&Voice>,
    ) -> Result<(), SpeechError> {
        if let Some(voice) = voice {
            self.settings.apply_voice(voice);
        }
        self.buffer.on_message_received(text);
        self.is_final = is_final;
        self.try_speak()
    }

    /// Cut off the current utterance and drop everything pending.
    pub fn stop(&mut self) {
        if self.in_flight.take().is_some() || self.engine.is_speaking() {
            self.engine.stop_speaking(SpeechBoundary::Immediate);
        }
        self.buffer.reset();
        self.is_final = false;
        self.paused = false;
        if self.streaming {
            self.streaming = false;
            tracing::debug!(engine = self.engine.name(), "synthesis stopped");
            self.emit(SynthesisEvent::Finished);
        }
    }

    /// Stop at the next word boundary, keeping the unspoken rest for `resume`.
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        if let Some(in_flight) = &self.in_flight {
            self.engine.stop_speaking(SpeechBoundary::Word);
            let rest = &in_flight.text[in_flight.spoken_from..];
            self.buffer.requeue_front(rest);
            tracing::debug!(requeued = rest.len(), "synthesis paused");
        }
    }

    pub fn resume(&mut self) -> Result<(), SpeechError> {
        if !self.paused {
            return Ok(());
        }
        self.paused = false;
        self.try_speak()
    }

    /// Wait for the next engine notification and act on it. Cancel safe.
    pub async fn drive(&mut self) -> Result<(), SpeechError> {
        match self.notifications.recv().await {
            Some(notification) => self.handle_notification(notification),
            None => std::future::pending().await,
        }
    }

    pub fn handle_notification(
        &mut self,
        notification: SynthesisNotification,
    ) -> Result<(), SpeechError> {
        let current = self.in_flight.as_ref().map(|f| f.id);
        if current != Some(notification.utterance_id()) {
            tracing::trace!(?notification, "stale synthesis notification");
            return Ok(());
        }
        match notification {
            SynthesisNotification::Started(id) => {
                tracing::trace!(id, "utterance started");
                Ok(())
            }
            SynthesisNotification::WillSpeak { range, .. } => {
                if let Some(in_flight) = self.in_flight.as_mut() {
                    in_flight.spoken_from = range.start;
                }
                self.emit(SynthesisEvent::Range(range));
                Ok(())
            }
            SynthesisNotification::Finished(_) | SynthesisNotification::Cancelled(_) => {
                self.in_flight = None;
                self.try_speak()
            }
        }
    }

    fn try_speak(&mut self) -> Result<(), SpeechError> {
        if self.paused || self.in_flight.is_some() || self.engine.is_speaking() {
            return Ok(());
        }
        loop {
            let Some(chunk) = self.next_chunk() else {
                if self.is_final && self.buffer.is_empty() {
                    self.finish_stream();
                }
                return Ok(());
            };
            if chunk.trim().is_empty() {
                continue;
            }
            return self.utter(chunk);
        }
    }

    fn next_chunk(&mut self) -> Option<String> {
        if let Some(chunk) = self.buffer.flush(false) {
            return Some(chunk);
        }
        if self.is_final && !self.buffer.is_empty() {
            return self.buffer.flush(true);
        }
        None
    }

    fn utter(&mut self, text: String) -> Result<(), SpeechError> {
        let id = self.next_id;
        self.next_id += 1;
        let utterance = Utterance {
            id,
            text: text.clone(),
            language: self.settings.language.clone(),
            voice: self.settings.voice.clone(),
            rate: self.settings.rate,
            pitch: self.settings.pitch,
            is_markup: self.settings.markup,
        };
        self.engine.speak(utterance)?;
        self.in_flight = Some(InFlight {
            id,
            text,
            spoken_from: 0,
        });
        if !self.streaming {
            self.streaming = true;
            tracing::debug!(engine = self.engine.name(), "synthesis started");
            self.emit(SynthesisEvent::Started);
        }
        Ok(())
    }

    fn finish_stream(&mut self) {
        self.is_final = false;
        if self.streaming {
            self.streaming = false;
            tracing::debug!(engine = self.engine.name(), "synthesis finished");
            self.emit(SynthesisEvent::Finished);
        }
    }

    fn emit(&self, event: SynthesisEvent) {
        let _ = self.events.send(event);
    }
}
