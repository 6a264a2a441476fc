//! Configuration management for Relaybot
//!
//! This module provides configuration loading and saving.
//! Configuration is loaded from `~/.relaybot/config.json` with environment variable overrides.
//! There is no global instance: the composition root loads a [`Config`] and
//! hands the relevant sections to the runtime and driver it builds.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{RelayError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the Relaybot configuration directory path (~/.relaybot)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relaybot")
    }

    /// Returns the path to the config file (~/.relaybot/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `RELAYBOT_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: RELAYBOT_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        // Runtime
        if let Ok(val) = std::env::var("RELAYBOT_RUNTIME_MAX_TOOL_ITERATIONS") {
            if let Ok(v) = val.parse() {
                self.runtime.max_tool_iterations = v;
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_RUNTIME_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.runtime.timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_RUNTIME_MIN_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.runtime.min_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_RUNTIME_ALLOW_SYSTEM_INSERTS") {
            if let Ok(v) = val.parse() {
                self.runtime.allow_system_inserts = v;
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_RUNTIME_MANAGED_FILES_ROOT") {
            self.runtime.managed_files_root = Some(val);
        }
        if let Ok(val) = std::env::var("RELAYBOT_RUNTIME_PARALLEL_TOOL_CALLS") {
            if let Ok(v) = val.parse() {
                self.runtime.parallel_tool_calls = v;
            }
        }

        // LLM
        if let Ok(val) = std::env::var("RELAYBOT_LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("RELAYBOT_LLM_SYSTEM_PROMPT_FILE") {
            self.llm.system_prompt_file = Some(val);
        }
        if let Ok(val) = std::env::var("RELAYBOT_LLM_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                self.llm.temperature = Some(v);
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_LLM_MAX_OUTPUT_TOKENS") {
            if let Ok(v) = val.parse() {
                self.llm.max_output_tokens = Some(v);
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_LLM_API_MODE") {
            if let Ok(v) = serde_json::from_value(serde_json::Value::String(val)) {
                self.llm.api_mode = v;
            }
        }
        if let Ok(val) = std::env::var("RELAYBOT_LLM_REASONING_EFFORT") {
            self.llm.reasoning_effort = Some(val);
        }

        // Logging
        if let Ok(val) = std::env::var("RELAYBOT_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the system prompt.
    ///
    /// A non-blank `system_prompt_file` wins and must point at an existing,
    /// non-empty regular file; otherwise the inline prompt is used.
    pub fn system_prompt(&self) -> Result<String> {
        let Some(file) = self
            .llm
            .system_prompt_file
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
        else {
            return Ok(self.llm.system_prompt.clone());
        };

        let path = expand_home(file);
        if !path.exists() {
            return Err(RelayError::Config(format!(
                "system_prompt_file configured but file not found: {}",
                file
            )));
        }
        if !path.is_file() {
            return Err(RelayError::Config(format!(
                "system_prompt_file configured but path is not a file: {}",
                file
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(RelayError::Config(format!(
                "system_prompt_file configured but file is empty: {}",
                file
            )));
        }
        Ok(content.to_string())
    }

    /// Expanded managed-files root, if configured.
    pub fn managed_files_root(&self) -> Option<PathBuf> {
        self.runtime
            .managed_files_root
            .as_deref()
            .filter(|root| !root.trim().is_empty())
            .map(expand_home)
    }
}

/// Expand ~ to home directory in a path string
fn expand_home(path: &str) -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        if path == "~" {
            return home;
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ApiMode;
    use std::env;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.runtime.max_tool_iterations, 8);
        assert_eq!(config.runtime.timeout_secs, 60);
        assert_eq!(config.llm.api_mode, ApiMode::ChatCompletions);
        assert_eq!(config.logging.format, LogFormat::Component);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{"runtime": {"allowed_append_message_tools": ["file_storage"], "timeout_secs": 90}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.runtime.allowed_append_message_tools, vec!["file_storage"]);
        assert_eq!(config.runtime.timeout_secs, 90);
        assert_eq!(config.runtime.min_timeout_secs, 30);
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();

        assert_eq!(expand_home("~/.relaybot"), home.join(".relaybot"));
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
        assert_eq!(expand_home(""), PathBuf::from(""));
    }

    #[test]
    fn test_config_path() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(Config::dir(), home.join(".relaybot"));
        assert_eq!(Config::path(), home.join(".relaybot/config.json"));
    }

    #[test]
    fn test_env_override() {
        env::set_var("RELAYBOT_RUNTIME_MAX_TOOL_ITERATIONS", "4");
        env::set_var("RELAYBOT_LLM_API_MODE", "responses");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.runtime.max_tool_iterations, 4);
        assert_eq!(config.llm.api_mode, ApiMode::Responses);

        env::remove_var("RELAYBOT_RUNTIME_MAX_TOOL_ITERATIONS");
        env::remove_var("RELAYBOT_LLM_API_MODE");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.llm.model = "test-model".to_string();
        config.runtime.parallel_tool_calls = true;
        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();
        assert_eq!(loaded.llm.model, "test-model");
        assert!(loaded.runtime.parallel_tool_calls);
    }

    #[test]
    fn test_load_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.json")).unwrap();
        assert_eq!(config.runtime.max_tool_iterations, 8);
    }

    #[test]
    fn test_system_prompt_inline() {
        let config = Config::default();
        assert_eq!(config.system_prompt().unwrap(), DEFAULT_SYSTEM_PROMPT);

        let mut config = Config::default();
        config.llm.system_prompt_file = Some("   ".into());
        assert_eq!(config.system_prompt().unwrap(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_system_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("prompt.md");
        std::fs::write(&prompt, "  Be terse.\n").unwrap();

        let mut config = Config::default();
        config.llm.system_prompt_file = Some(prompt.to_string_lossy().into_owned());
        assert_eq!(config.system_prompt().unwrap(), "Be terse.");
    }

    #[test]
    fn test_system_prompt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();

        config.llm.system_prompt_file = Some(dir.path().join("missing.md").to_string_lossy().into_owned());
        let err = config.system_prompt().unwrap_err();
        assert!(err.to_string().contains("file not found"));

        config.llm.system_prompt_file = Some(dir.path().to_string_lossy().into_owned());
        let err = config.system_prompt().unwrap_err();
        assert!(err.to_string().contains("not a file"));

        let empty = dir.path().join("empty.md");
        std::fs::write(&empty, "\n\n").unwrap();
        config.llm.system_prompt_file = Some(empty.to_string_lossy().into_owned());
        let err = config.system_prompt().unwrap_err();
        assert!(err.to_string().contains("file is empty"));
    }

    #[test]
    fn test_managed_files_root() {
        let mut config = Config::default();
        assert!(config.managed_files_root().is_none());
        config.runtime.managed_files_root = Some("/srv/files".into());
        assert_eq!(config.managed_files_root(), Some(PathBuf::from("/srv/files")));
    }
}
