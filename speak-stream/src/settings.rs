//! Layered configuration.
//!
//! Settings resolve in three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A YAML file (an explicit path, or `<config_dir>/read-aloud/config.yaml`)
//! 3. `TTS_*` environment variables
//!
//! ## Examples
//!
//! ```yaml
//! output_directory: /tmp/read-aloud
//! special_characters: [".", "?", "!", "\n"]
//! tts_voice: en-us
//! concurrency: 4
//! provider: gtts
//! translate_url: http://localhost:5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatcher::DEFAULT_CONCURRENCY;
use crate::errors::SettingsError;
use crate::providers::ProviderKind;
use crate::resources::DEFAULT_FILE_PREFIX;
use crate::segmenter::{DEFAULT_BOUNDARIES, SegmenterConfig};

pub const ENV_OUTPUT_DIRECTORY: &str = "TTS_OUTPUT_DIRECTORY";
pub const ENV_VOICE: &str = "TTS_VOICE";
pub const ENV_MAX_TRANSLATE_CHARS: &str = "TTS_MAX_TRANSLATE_CHARS";
pub const ENV_SPECIAL_CHARACTERS: &str = "TTS_SPECIAL_CHARACTERS";
pub const ENV_CONCURRENCY: &str = "TTS_CONCURRENCY";
pub const ENV_MAX_CHUNK_CHARS: &str = "TTS_MAX_CHUNK_CHARS";
pub const ENV_PROVIDER: &str = "TTS_PROVIDER";
pub const ENV_TRANSLATE_URL: &str = "TTS_TRANSLATE_URL";
pub const ENV_TRANSLATE_API_KEY: &str = "TTS_TRANSLATE_API_KEY";
pub const ENV_SYNTHESIS_TIMEOUT_SECS: &str = "TTS_SYNTHESIS_TIMEOUT_SECS";

/// Largest batch sent to the translator in one request.
pub const DEFAULT_MAX_TRANSLATE_CHARS: usize = 5000;

/// Everything a session needs that is not per-request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Root directory for per-session audio.
    pub output_directory: PathBuf,
    /// Sentence boundary characters.
    pub special_characters: Vec<char>,
    /// Default voice; empty means provider default.
    pub tts_voice: Option<String>,
    pub max_translate_chars: usize,
    pub max_chunk_chars: Option<usize>,
    pub concurrency: usize,
    pub provider: ProviderKind,
    /// Base URL of a LibreTranslate-compatible service.
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    pub synthesis_timeout_secs: Option<u64>,
    pub file_prefix: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
            special_characters: DEFAULT_BOUNDARIES.to_vec(),
            tts_voice: None,
            max_translate_chars: DEFAULT_MAX_TRANSLATE_CHARS,
            max_chunk_chars: None,
            concurrency: DEFAULT_CONCURRENCY,
            provider: ProviderKind::default(),
            translate_url: None,
            translate_api_key: None,
            synthesis_timeout_secs: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("read-aloud")
}

impl StreamSettings {
    /// `<config_dir>/read-aloud/config.yaml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("read-aloud").join("config.yaml"))
    }

    /// Load from the process environment.
    ///
    /// ## Errors
    ///
    /// See [`load_with`](StreamSettings::load_with).
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// Load defaults, then the YAML file, then overrides from `env`.
    ///
    /// An explicit path must exist; a missing default file is skipped.
    ///
    /// ## Errors
    ///
    /// Returns a [`SettingsError`] for an unreadable or malformed file, an
    /// unparsable environment value, or settings that fail validation.
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read a YAML settings file. Keys that are absent keep their defaults.
    ///
    /// ## Errors
    ///
    /// [`SettingsError::Read`] or [`SettingsError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded settings file");
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TTS_*` overrides. Empty values are ignored.
    ///
    /// ## Errors
    ///
    /// [`SettingsError::InvalidEnv`] when a value cannot be parsed.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), SettingsError> {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_OUTPUT_DIRECTORY) {
            self.output_directory = PathBuf::from(dir);
        }
        if let Some(voice) = get(ENV_VOICE) {
            self.tts_voice = Some(voice);
        }
        if let Some(value) = get(ENV_MAX_TRANSLATE_CHARS) {
            self.max_translate_chars = parse_number(ENV_MAX_TRANSLATE_CHARS, &value)?;
        }
        if let Some(value) = get(ENV_SPECIAL_CHARACTERS) {
            self.special_characters = parse_characters(&value)?;
        }
        if let Some(value) = get(ENV_CONCURRENCY) {
            self.concurrency = parse_number(ENV_CONCURRENCY, &value)?;
        }
        if let Some(value) = get(ENV_MAX_CHUNK_CHARS) {
            self.max_chunk_chars = Some(parse_number(ENV_MAX_CHUNK_CHARS, &value)?);
        }
        if let Some(value) = get(ENV_PROVIDER) {
            self.provider = value.parse().map_err(|_| SettingsError::InvalidEnv {
                key: ENV_PROVIDER,
                value,
            })?;
        }
        if let Some(url) = get(ENV_TRANSLATE_URL) {
            self.translate_url = Some(url);
        }
        if let Some(key) = get(ENV_TRANSLATE_API_KEY) {
            self.translate_api_key = Some(key);
        }
        if let Some(value) = get(ENV_SYNTHESIS_TIMEOUT_SECS) {
            self.synthesis_timeout_secs = Some(parse_number(ENV_SYNTHESIS_TIMEOUT_SECS, &value)?);
        }
        Ok(())
    }

    /// ## Errors
    ///
    /// [`SettingsError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |reason: &str| {
            Err(SettingsError::Invalid {
                reason: reason.to_string(),
            })
        };
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.special_characters.is_empty() {
            return invalid("special_characters must not be empty");
        }
        if self.max_chunk_chars == Some(0) {
            return invalid("max_chunk_chars must be at least 1");
        }
        if self.max_translate_chars == 0 {
            return invalid("max_translate_chars must be at least 1");
        }
        if self.synthesis_timeout_secs == Some(0) {
            return invalid("synthesis_timeout_secs must be at least 1");
        }
        if self.file_prefix.is_empty() || self.file_prefix.contains(['/', '\\']) {
            return invalid("file_prefix must be a non-empty file name");
        }
        Ok(())
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig::new(self.special_characters.iter().copied())
            .with_max_chunk_chars(self.max_chunk_chars)
    }

    /// The configured voice, treating an empty string as "provider default".
    pub fn voice(&self) -> Option<&str> {
        self.tts_voice.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn synthesis_timeout(&self) -> Option<Duration> {
        self.synthesis_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}

/// Parse a comma separated character list. `\n`, `\t` and `\r` are accepted
/// as escapes.
fn parse_characters(value: &str) -> Result<Vec<char>, SettingsError> {
    let invalid = || SettingsError::InvalidEnv {
        key: ENV_SPECIAL_CHARACTERS,
        value: value.to_string(),
    };

    let mut characters = Vec::new();
    for item in value.split(',') {
        let ch = match item {
            "\\n" => '\n',
            "\\t" => '\t',
            "\\r" => '\r',
            "" => continue,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => ch,
                    _ => return Err(invalid()),
                }
            }
        };
        characters.push(ch);
    }

    if characters.is_empty() {
        return Err(invalid());
    }
    Ok(characters)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.special_characters, ['.', '?', '!', ';', ':', '\n']);
        assert_eq!(settings.max_translate_chars, 5000);
        assert_eq!(settings.concurrency, 3);
        assert_eq!(settings.provider, ProviderKind::Espeak);
        assert!(settings.voice().is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides_defaults_and_keeps_the_rest() {
        let file = yaml_file(
            "output_directory: /srv/tts\nspecial_characters: ['.', \"\\n\"]\ntts_voice: en-gb\nconcurrency: 5\n",
        );
        let settings = StreamSettings::load_with(Some(file.path()), env_from(&[])).unwrap();
        assert_eq!(settings.output_directory, PathBuf::from("/srv/tts"));
        assert_eq!(settings.special_characters, ['.', '\n']);
        assert_eq!(settings.voice(), Some("en-gb"));
        assert_eq!(settings.concurrency, 5);
        assert_eq!(settings.max_translate_chars, DEFAULT_MAX_TRANSLATE_CHARS);
    }

    #[test]
    fn test_env_overrides_yaml() {
        let file = yaml_file("tts_voice: en-gb\nconcurrency: 5\n");
        let env = env_from(&[
            (ENV_VOICE, "fr"),
            (ENV_CONCURRENCY, "2"),
            (ENV_MAX_TRANSLATE_CHARS, "1200"),
            (ENV_SPECIAL_CHARACTERS, ".,!,\\n"),
            (ENV_PROVIDER, "gtts"),
            (ENV_SYNTHESIS_TIMEOUT_SECS, "30"),
        ]);
        let settings = StreamSettings::load_with(Some(file.path()), env).unwrap();
        assert_eq!(settings.voice(), Some("fr"));
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.max_translate_chars, 1200);
        assert_eq!(settings.special_characters, ['.', '!', '\n']);
        assert_eq!(settings.provider, ProviderKind::Gtts);
        assert_eq!(settings.synthesis_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut settings = StreamSettings::default();
        settings.apply_env(env_from(&[(ENV_VOICE, ""), (ENV_CONCURRENCY, "  ")])).unwrap();
        assert_eq!(settings, StreamSettings::default());
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut settings = StreamSettings::default();
        let err = settings
            .apply_env(env_from(&[(ENV_CONCURRENCY, "many")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidEnv { key: ENV_CONCURRENCY, .. }));

        let err = settings
            .apply_env(env_from(&[(ENV_SPECIAL_CHARACTERS, "..,!")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidEnv { key: ENV_SPECIAL_CHARACTERS, .. }));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let file = yaml_file("concurrency: [not, a, number]\n");
        assert!(matches!(
            StreamSettings::from_file(file.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_file_means_defaults() {
        let file = yaml_file("\n");
        assert_eq!(StreamSettings::from_file(file.path()).unwrap(), StreamSettings::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = StreamSettings::load_with(Some(Path::new("/no/such/config.yaml")), env_from(&[]));
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let env = env_from(&[(ENV_CONCURRENCY, "0")]);
        let file = yaml_file("");
        assert!(matches!(
            StreamSettings::load_with(Some(file.path()), env),
            Err(SettingsError::Invalid { .. })
        ));
    }

    #[test]
    fn test_segmenter_config_reflects_settings() {
        let settings = StreamSettings {
            special_characters: vec!['!', '.'],
            max_chunk_chars: Some(80),
            ..Default::default()
        };
        let config = settings.segmenter_config();
        assert_eq!(config.boundaries(), ['!', '.']);
        assert_eq!(config.max_chunk_chars(), Some(80));
    }
}
