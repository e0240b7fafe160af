//! Local services around the model calls: persisted settings and prompt
//! composition.

pub mod prompt;
pub mod settings_store;

pub use prompt::{compose_prompt, prepare_chat_messages, ChatSession, ComposedPrompt};
pub use settings_store::{FileSettingsStore, LayeredSettings, SettingsProvider};
