use crate::config::{AppConfig, SynthesisConfig};

/// Describes runtime-safe changes between two configs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDiff {
    /// New synthesis settings when the voice, rate, pitch or flush length changed.
    pub synthesis_change: Option<SynthesisConfig>,
    pub non_reloadable: Vec<String>,
}

impl ConfigDiff {
    /// Compare two configs and return the diff.
    /// Reloadable: synthesis voice, rate, pitch, min_flush_length.
    /// Non-reloadable: locale, input source, engines, partial policy, markup.
    pub fn diff(old: &AppConfig, new: &AppConfig) -> Self {
        let mut result = Self::default();

        if old.general.locale != new.general.locale {
            result.non_reloadable.push(format!(
                "locale changed ('{}' → '{}'), requires restart",
                old.general.locale, new.general.locale
            ));
        }

        if old.input != new.input {
            result
                .non_reloadable
                .push("input settings changed, requires restart".to_string());
        }

        if old.recognition.engine != new.recognition.engine {
            result.non_reloadable.push(format!(
                "recognition engine changed ('{}' → '{}'), requires restart",
                old.recognition.engine, new.recognition.engine
            ));
        }
        if old.recognition.partial_policy != new.recognition.partial_policy {
            result
                .non_reloadable
                .push("partial_policy changed, requires restart".to_string());
        }

        let (old_syn, new_syn) = (&old.synthesis, &new.synthesis);
        if old_syn.engine != new_syn.engine {
            result.non_reloadable.push(format!(
                "synthesis engine changed ('{}' → '{}'), requires restart",
                old_syn.engine, new_syn.engine
            ));
        }
        if old_syn.markup != new_syn.markup {
            result
                .non_reloadable
                .push("synthesis markup changed, requires restart".to_string());
        }

        let voice_changed = old_syn.voice != new_syn.voice
            || (old_syn.rate - new_syn.rate).abs() > f32::EPSILON
            || (old_syn.pitch - new_syn.pitch).abs() > f32::EPSILON
            || old_syn.min_flush_length != new_syn.min_flush_length;
        if voice_changed {
            result.synthesis_change = Some(new_syn.clone());
        }

        result
    }

    pub fn is_empty(&self) -> bool {
        self.synthesis_change.is_none() && self.non_reloadable.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::from_toml_str(
            r#"
[general]
locale = "en-US"

[input]
device_name = "USB Mic"

[synthesis]
voice = "com.example.samantha"
rate = 0.5
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_config_diff_rate_change() {
        let old = base_config();
        let new = AppConfig::from_toml_str(
            r#"
[general]
locale = "en-US"

[input]
device_name = "USB Mic"

[synthesis]
voice = "com.example.samantha"
rate = 0.7
"#,
        )
        .unwrap();

        let diff = ConfigDiff::diff(&old, &new);
        let change = diff.synthesis_change.expect("rate change is reloadable");
        assert_eq!(change.rate, 0.7);
        assert!(diff.non_reloadable.is_empty());
    }

    #[test]
    fn test_config_diff_voice_change() {
        let old = base_config();
        let mut new = base_config();
        new.synthesis.voice = Some("com.example.daniel".to_string());

        let diff = ConfigDiff::diff(&old, &new);
        assert_eq!(
            diff.synthesis_change.and_then(|s| s.voice).as_deref(),
            Some("com.example.daniel")
        );
    }

    #[test]
    fn test_config_diff_no_change() {
        let diff = ConfigDiff::diff(&base_config(), &base_config());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_config_diff_device_change_requires_restart() {
        let old = base_config();
        let mut new = base_config();
        new.input.device_name = "New Device".to_string();

        let diff = ConfigDiff::diff(&old, &new);
        assert!(diff.synthesis_change.is_none());
        assert_eq!(diff.non_reloadable.len(), 1);
        assert!(diff.non_reloadable[0].contains("input settings changed"));
    }

    #[test]
    fn test_config_diff_locale_change_requires_restart() {
        let old = base_config();
        let mut new = base_config();
        new.general.locale = "es-ES".to_string();

        let diff = ConfigDiff::diff(&old, &new);
        assert_eq!(diff.non_reloadable.len(), 1);
        assert!(diff.non_reloadable[0].contains("es-ES"));
    }
}
