use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voxtalk_audio::InputSourceFactory;
use voxtalk_core::{
    AudioChunk, InputProvider, InputSourceKind, RecognitionEvent, SpeechError, TaskHint,
};
use voxtalk_engine::{EngineRegistry, RecognitionSession, RecognitionSettings};

async fn collect_until_finished(
    rx: &mut mpsc::UnboundedReceiver<RecognitionEvent>,
    session: &mut RecognitionSession,
) -> Vec<RecognitionEvent> {
    while session.is_running() {
        session.drive().await;
    }
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn scripted_config(transcript: &str) -> toml::Value {
    let mut table = toml::Table::new();
    table.insert("transcript".into(), toml::Value::String(transcript.into()));
    toml::Value::Table(table)
}

#[tokio::test]
async fn test_null_engine_over_custom_stream() {
    let registry = EngineRegistry::new();
    let engine = registry
        .build("null", toml::Value::Table(Default::default()))
        .await
        .unwrap();
    let input = InputSourceFactory::new(InputSourceKind::CustomStream)
        .create(None, None)
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session =
        RecognitionSession::new(engine, input, RecognitionSettings::default(), tx).unwrap();

    session.start().await.unwrap();
    assert!(session.process_audio(AudioChunk {
        samples: vec![0.0; 480],
        sample_rate: 48000,
        channels: 1,
    }));

    session.drive().await;
    assert_eq!(rx.recv().await, Some(RecognitionEvent::Started));
    assert_eq!(
        rx.recv().await,
        Some(RecognitionEvent::PartialResult("[null] 480 samples".to_string()))
    );

    session.stop();
    assert_eq!(rx.recv().await, Some(RecognitionEvent::Finished));
}

#[tokio::test]
async fn test_file_input_reproduces_transcript_across_runs() {
    let dir = std::env::temp_dir().join("voxtalk-engine-it");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("utterance.wav");
    std::fs::write(&path, b"RIFF").unwrap();

    let registry = EngineRegistry::new();
    let engine = registry
        .build("scripted", scripted_config("what is the weather tomorrow"))
        .await
        .unwrap();
    let provider = InputSourceFactory::new(InputSourceKind::AudioFile(path));

    let mut finals = Vec::new();
    for _ in 0..3 {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = RecognitionSession::new(
            Arc::clone(&engine),
            provider.create(None, None).unwrap(),
            RecognitionSettings {
                task_hint: TaskHint::Query,
                ..RecognitionSettings::default()
            },
            tx,
        )
        .unwrap();
        session.start().await.unwrap();
        let events = tokio::time::timeout(
            Duration::from_secs(2),
            collect_until_finished(&mut rx, &mut session),
        )
        .await
        .expect("timed out");

        assert_eq!(events.first(), Some(&RecognitionEvent::Started));
        assert_eq!(events.last(), Some(&RecognitionEvent::Finished));
        finals.extend(events.into_iter().filter_map(|e| match e {
            RecognitionEvent::FinalResult(text) => Some(text),
            _ => None,
        }));
    }
    assert_eq!(finals, vec!["what is the weather tomorrow"; 3]);
}

#[tokio::test]
async fn test_missing_audio_file_fails_start() {
    let registry = EngineRegistry::new();
    let engine = registry
        .build("scripted", scripted_config("hello"))
        .await
        .unwrap();
    let input = InputSourceFactory::new(InputSourceKind::AudioFile(
        "/nonexistent/voxtalk/missing.wav".into(),
    ))
    .create(None, None)
    .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session =
        RecognitionSession::new(engine, input, RecognitionSettings::default(), tx).unwrap();

    assert!(matches!(
        session.start().await,
        Err(SpeechError::NoAudioInput(_))
    ));
    assert!(rx.try_recv().is_err());
}
