use crate::engine_trait::SynthesisEngine;
use std::collections::HashMap;
use voxtalk_core::SpeechError;

pub struct SynthesisRegistry {
    factories: HashMap<String, fn() -> Box<dyn SynthesisEngine>>,
}

impl SynthesisRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("null", || {
            Box::new(crate::null_engine::NullSynthesisEngine::new())
        });
        registry
    }

    pub fn register(&mut self, name: &str, factory: fn() -> Box<dyn SynthesisEngine>) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn SynthesisEngine>, SpeechError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| SpeechError::EngineNotFound(name.to_string()))
    }

    /// Create and initialize an engine.
    pub async fn build(
        &self,
        name: &str,
        config: toml::Value,
    ) -> Result<Box<dyn SynthesisEngine>, SpeechError> {
        let mut engine = self.create(name)?;
        engine.initialize(config).await?;
        tracing::info!(engine = name, "synthesis engine ready");
        Ok(engine)
    }

    pub fn list_engines(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for SynthesisRegistry {
    fn default() -> Self {
        Self::new()
    }
}
