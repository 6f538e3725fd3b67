use serde::Deserialize;

/// How partial results relate to what was recognized before them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialPolicy {
    /// Every result is the full replacement text.
    #[default]
    Replace,
    /// Results are appended to the finals committed so far.
    Accumulate,
}

/// Tracks the last known transcript under a [`PartialPolicy`].
#[derive(Debug, Clone, Default)]
pub struct TranscriptAccumulator {
    policy: PartialPolicy,
    committed: String,
    last: String,
}

impl TranscriptAccumulator {
    pub fn new(policy: PartialPolicy) -> Self {
        Self {
            policy,
            committed: String::new(),
            last: String::new(),
        }
    }

    /// Apply one result and return the text to surface.
    pub fn apply(&mut self, text: &str, is_final: bool) -> String {
        let surfaced = match self.policy {
            PartialPolicy::Replace => text.to_string(),
            PartialPolicy::Accumulate => join(&self.committed, text),
        };
        if is_final && self.policy == PartialPolicy::Accumulate {
            self.committed = surfaced.clone();
        }
        self.last = surfaced.clone();
        surfaced
    }

    /// Text of the most recent result, empty when nothing arrived yet.
    pub fn last_text(&self) -> &str {
        &self.last
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.last.clear();
    }
}

fn join(prefix: &str, text: &str) -> String {
    let text = text.trim();
    if prefix.is_empty() {
        return text.to_string();
    }
    if text.is_empty() {
        return prefix.to_string();
    }
    format!("{prefix} {text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_surfaces_engine_text() {
        let mut acc = TranscriptAccumulator::new(PartialPolicy::Replace);
        assert_eq!(acc.apply("hello", false), "hello");
        assert_eq!(acc.apply("hello there", true), "hello there");
        assert_eq!(acc.apply("next", false), "next");
        assert_eq!(acc.last_text(), "next");
    }

    #[test]
    fn test_accumulate_prefixes_committed_finals() {
        let mut acc = TranscriptAccumulator::new(PartialPolicy::Accumulate);
        assert_eq!(acc.apply("hello", false), "hello");
        assert_eq!(acc.apply("hello there", true), "hello there");
        assert_eq!(acc.apply("how", false), "hello there how");
        assert_eq!(acc.apply("how are you", true), "hello there how are you");
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut acc = TranscriptAccumulator::new(PartialPolicy::Accumulate);
        acc.apply("one", true);
        acc.clear();
        assert_eq!(acc.last_text(), "");
        assert_eq!(acc.apply("two", false), "two");
    }
}
