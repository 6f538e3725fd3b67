use crate::engine_trait::SpeechEngine;
use std::collections::HashMap;
use std::sync::Arc;
use voxtalk_core::SpeechError;

pub struct EngineRegistry {
    factories: HashMap<String, fn() -> Box<dyn SpeechEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("null", || {
            Box::new(crate::null_engine::NullSpeechEngine::new())
        });
        registry.register("scripted", || {
            Box::new(crate::scripted_engine::ScriptedSpeechEngine::default())
        });
        registry
    }

    pub fn register(&mut self, name: &str, factory: fn() -> Box<dyn SpeechEngine>) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn SpeechEngine>, SpeechError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| SpeechError::EngineNotFound(name.to_string()))
    }

    /// Create and initialize an engine, ready to be shared between sessions.
    pub async fn build(
        &self,
        name: &str,
        config: toml::Value,
    ) -> Result<Arc<dyn SpeechEngine>, SpeechError> {
        let mut engine = self.create(name)?;
        engine.initialize(config).await?;
        tracing::info!(engine = name, "speech engine ready");
        Ok(Arc::from(engine))
    }

    pub fn list_engines(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
