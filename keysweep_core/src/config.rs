use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct WordlistSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub suffixes: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "strategy")]
pub enum GeneratorSettings {
    Wordlist(WordlistSettings),
    Exhaustive(ExhaustiveSettings),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExhaustiveSettings {
    /// Characters to enumerate, in order. Must not repeat.
    #[serde(default = "default_alphabet")]
    pub alphabet: String,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

pub fn default_alphabet() -> String {
    "abcdefghijklmnopqrstuvwxyz".to_string()
}

pub fn default_max_length() -> usize {
    4
}

impl Default for ExhaustiveSettings {
    fn default() -> Self {
        Self {
            alphabet: default_alphabet(),
            max_length: default_max_length(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings::Exhaustive(ExhaustiveSettings::default())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExecutorSettings {
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Attempts still running after this long are killed and count as failures.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub fn default_command() -> Vec<String> {
    vec!["veracrypt".to_string()]
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_ms: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

pub fn default_progress_interval() -> u64 {
    100
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct KeysweepConfig {
    #[serde(default)]
    pub executor: ExecutorSettings,
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

impl KeysweepConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_uses_defaults() {
        let config = KeysweepConfig::from_toml("").unwrap();
        assert_eq!(config, KeysweepConfig::default());
        assert_eq!(config.executor.command, vec!["veracrypt"]);
        assert_eq!(config.executor.timeout_ms, None);
        assert_eq!(config.search.progress_interval, 100);
    }

    #[test]
    fn parses_wordlist_generator() {
        let config = KeysweepConfig::from_toml(
            r#"
            [executor]
            command = ["sudo", "veracrypt"]
            timeout-ms = 2000

            [generator]
            strategy = "wordlist"
            path = "eff_large.wordlist"
            marker = "c"
            suffixes = [" horse battery staple"]
            "#,
        )
        .unwrap();

        assert_eq!(config.executor.command, vec!["sudo", "veracrypt"]);
        assert_eq!(config.executor.timeout_ms, Some(2000));
        assert_eq!(
            config.generator,
            GeneratorSettings::Wordlist(WordlistSettings {
                path: PathBuf::from("eff_large.wordlist"),
                marker: Some("c".to_string()),
                suffixes: vec![" horse battery staple".to_string()],
            })
        );
    }

    #[test]
    fn parses_exhaustive_generator_with_partial_fields() {
        let config = KeysweepConfig::from_toml(
            r#"
            [generator]
            strategy = "exhaustive"
            max-length = 6

            [search]
            progress-interval = 10
            "#,
        )
        .unwrap();

        assert_eq!(
            config.generator,
            GeneratorSettings::Exhaustive(ExhaustiveSettings {
                alphabet: default_alphabet(),
                max_length: 6,
            })
        );
        assert_eq!(config.search.progress_interval, 10);
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = KeysweepConfig::from_toml(
            r#"
            [executor]
            comand = ["veracrypt"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_fields_in_exhaustive_generator() {
        let result = KeysweepConfig::from_toml(
            r#"
            [generator]
            strategy = "exhaustive"
            max-lenght = 10
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = KeysweepConfig::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
