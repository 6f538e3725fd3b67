use crate::engine_trait::{SpeechBoundary, SynthesisEngine, SynthesisNotification, Utterance};
use async_trait::async_trait;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voxtalk_core::{SpeechError, Voice, VoiceGender, VoiceQuality};

struct Playback {
    id: u64,
    handle: JoinHandle<()>,
    stop_at_word: Arc<AtomicBool>,
}

type SharedPlayback = Arc<Mutex<Option<Playback>>>;

/// Utterances handed to a [`NullSynthesisEngine`], oldest first.
#[derive(Clone, Default)]
pub struct SpokenLog(Arc<Mutex<Vec<Utterance>>>);

impl SpokenLog {
    pub fn utterances(&self) -> Vec<Utterance> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.utterances().into_iter().map(|u| u.text).collect()
    }

    fn push(&self, utterance: Utterance) {
        if let Ok(mut log) = self.0.lock() {
            log.push(utterance);
        }
    }
}

/// Speaks silently: walks the utterance word by word on a timer and reports
/// the same notifications a real engine would.
pub struct NullSynthesisEngine {
    word_duration: Duration,
    voices: Vec<Voice>,
    notifications: Option<mpsc::UnboundedSender<SynthesisNotification>>,
    current: SharedPlayback,
    spoken: SpokenLog,
}

impl NullSynthesisEngine {
    pub fn new() -> Self {
        Self {
            word_duration: Duration::from_millis(60),
            voices: default_voices(),
            notifications: None,
            current: Arc::new(Mutex::new(None)),
            spoken: SpokenLog::default(),
        }
    }

    pub fn with_word_duration(mut self, duration: Duration) -> Self {
        self.word_duration = duration;
        self
    }

    pub fn spoken_log(&self) -> SpokenLog {
        self.spoken.clone()
    }
}

impl Default for NullSynthesisEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn default_voices() -> Vec<Voice> {
    let voice = |language: &str, name: &str, gender: VoiceGender, quality: VoiceQuality| Voice {
        gender,
        quality,
        ..Voice::new(
            language,
            &format!("null.{language}.{}", name.to_lowercase()),
            name,
        )
    };
    vec![
        voice("en-US", "Ava", VoiceGender::Female, VoiceQuality::Enhanced),
        voice("en-US", "Tom", VoiceGender::Male, VoiceQuality::Default),
        voice("en-GB", "Oliver", VoiceGender::Male, VoiceQuality::Default),
        voice("es-ES", "Lucia", VoiceGender::Female, VoiceQuality::Premium),
    ]
}

fn word_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = None;
    for (idx, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                ranges.push(s..idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push(s..text.len());
    }
    ranges
}

fn clear_playback(current: &SharedPlayback, id: u64) {
    if let Ok(mut current) = current.lock() {
        if current.as_ref().is_some_and(|p| p.id == id) {
            *current = None;
        }
    }
}

#[async_trait]
impl SynthesisEngine for NullSynthesisEngine {
    fn name(&self) -> &str {
        "null"
    }

    async fn initialize(&mut self, config: toml::Value) -> Result<(), SpeechError> {
        if let Some(ms) = config.get("word_ms").and_then(|v| v.as_integer()) {
            self.word_duration = Duration::from_millis(ms.max(0) as u64);
        }
        Ok(())
    }

    fn set_notification_sender(&mut self, sender: mpsc::UnboundedSender<SynthesisNotification>) {
        self.notifications = Some(sender);
    }

    fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        let tx = self
            .notifications
            .clone()
            .ok_or_else(|| SpeechError::Synthesis("no notification sender attached".to_string()))?;
        let mut current = self
            .current
            .lock()
            .map_err(|_| SpeechError::Synthesis("playback state poisoned".to_string()))?;
        if current.is_some() {
            return Err(SpeechError::Synthesis("already speaking".to_string()));
        }

        let id = utterance.id;
        let ranges = word_ranges(&utterance.text);
        let word_duration = self.word_duration;
        let stop_at_word = Arc::new(AtomicBool::new(false));
        let task_stop = Arc::clone(&stop_at_word);
        let task_current = Arc::clone(&self.current);
        tracing::trace!(id, words = ranges.len(), "null synthesis speaking");
        self.spoken.push(utterance);

        let handle = tokio::spawn(async move {
            let _ = tx.send(SynthesisNotification::Started(id));
            for range in ranges {
                if task_stop.load(Ordering::Relaxed) {
                    clear_playback(&task_current, id);
                    let _ = tx.send(SynthesisNotification::Cancelled(id));
                    return;
                }
                let _ = tx.send(SynthesisNotification::WillSpeak { id, range });
                if !word_duration.is_zero() {
                    tokio::time::sleep(word_duration).await;
                }
            }
            clear_playback(&task_current, id);
            let _ = tx.send(SynthesisNotification::Finished(id));
        });

        *current = Some(Playback {
            id,
            handle,
            stop_at_word,
        });
        Ok(())
    }

    fn stop_speaking(&self, boundary: SpeechBoundary) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        match boundary {
            SpeechBoundary::Immediate => {
                if let Some(playback) = current.take() {
                    playback.handle.abort();
                    if let Some(tx) = &self.notifications {
                        let _ = tx.send(SynthesisNotification::Cancelled(playback.id));
                    }
                }
            }
            SpeechBoundary::Word => {
                if let Some(playback) = current.as_ref() {
                    playback.stop_at_word.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    fn is_speaking(&self) -> bool {
        self.current.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    fn available_voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }
}
