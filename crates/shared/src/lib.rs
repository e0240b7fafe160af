pub mod events;
pub mod progress;
pub mod request;

pub mod settings {
    use serde::{Deserialize, Serialize};

    pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

    fn default_url() -> String {
        DEFAULT_OLLAMA_URL.to_string()
    }

    fn default_true() -> bool {
        true
    }

    /// User-facing configuration for talking to the local model server.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Settings {
        #[serde(default = "default_url")]
        pub url: String,
        /// Empty until the user picks one.
        #[serde(default)]
        pub model: String,
        /// Instruction prepended to selections when no custom prompt is given.
        #[serde(default)]
        pub prompt_template: String,
        #[serde(default = "default_true")]
        pub auto_show: bool,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                url: default_url(),
                model: String::new(),
                prompt_template: String::new(),
                auto_show: true,
            }
        }
    }

    /// The validated `{url, model}` pair every model call needs.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ModelTarget {
        pub url: String,
        pub model: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum SettingsError {
        #[error("No model selected. Set one with `xandai config set-model <name>` or pass --model.")]
        ModelNotSelected,

        #[error("Invalid server URL '{url}': {reason}")]
        InvalidUrl { url: String, reason: String },
    }

    impl Settings {
        /// Apply `OLLAMA_BASE_URL` / `OLLAMA_MODEL` from the environment.
        pub fn with_env_overrides(self) -> Self {
            self.with_overrides(
                std::env::var("OLLAMA_BASE_URL").ok(),
                std::env::var("OLLAMA_MODEL").ok(),
            )
        }

        /// Replace url/model with the given values when they are non-blank.
        pub fn with_overrides(mut self, url: Option<String>, model: Option<String>) -> Self {
            if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
                self.url = url;
            }
            if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
                self.model = model;
            }
            self
        }

        /// Base URL with surrounding whitespace and trailing slashes removed,
        /// falling back to the default when blank.
        pub fn base_url(&self) -> String {
            let trimmed = self.url.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                default_url()
            } else {
                trimmed.to_string()
            }
        }

        /// Validate the settings before any network call is made.
        pub fn resolve(&self) -> Result<ModelTarget, SettingsError> {
            let model = self.model.trim();
            if model.is_empty() {
                return Err(SettingsError::ModelNotSelected);
            }

            let url = self.base_url();
            if let Err(e) = url::Url::parse(&url) {
                return Err(SettingsError::InvalidUrl {
                    url,
                    reason: e.to_string(),
                });
            }

            Ok(ModelTarget {
                url,
                model: model.to_string(),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_missing_fields_take_defaults() {
            let settings: Settings = serde_json::from_str(r#"{"model":"llama3.2"}"#).unwrap();
            assert_eq!(settings.url, DEFAULT_OLLAMA_URL);
            assert_eq!(settings.model, "llama3.2");
            assert!(settings.auto_show);
            assert!(settings.prompt_template.is_empty());
        }

        #[test]
        fn test_blank_model_is_rejected() {
            let settings = Settings {
                model: "   ".into(),
                ..Settings::default()
            };
            assert_eq!(settings.resolve(), Err(SettingsError::ModelNotSelected));
        }

        #[test]
        fn test_resolve_normalizes_url() {
            let settings = Settings {
                url: " http://127.0.0.1:11434/ ".into(),
                model: "qwen2.5:7b".into(),
                ..Settings::default()
            };
            let target = settings.resolve().unwrap();
            assert_eq!(target.url, "http://127.0.0.1:11434");
            assert_eq!(target.model, "qwen2.5:7b");
        }

        #[test]
        fn test_blank_url_falls_back_to_default() {
            let settings = Settings {
                url: "".into(),
                model: "llama3.2".into(),
                ..Settings::default()
            };
            assert_eq!(settings.resolve().unwrap().url, DEFAULT_OLLAMA_URL);
        }

        #[test]
        fn test_unparseable_url_is_rejected() {
            let settings = Settings {
                url: "not a url".into(),
                model: "llama3.2".into(),
                ..Settings::default()
            };
            assert!(matches!(
                settings.resolve(),
                Err(SettingsError::InvalidUrl { .. })
            ));
        }

        #[test]
        fn test_overrides_ignore_blank_values() {
            let settings = Settings {
                model: "stored".into(),
                ..Settings::default()
            }
            .with_overrides(Some("http://gpu-box:11434".into()), Some("  ".into()));
            assert_eq!(settings.url, "http://gpu-box:11434");
            assert_eq!(settings.model, "stored");
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".into(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".into(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".into(),
                content: content.into(),
            }
        }
    }

    /// Incremental output of a streaming chat call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StreamChunk {
        /// Newly received text (the delta, not the accumulated message).
        Text(String),
        Done,
    }
}
