//! Prompt composition for one-shot generation and chat.

use shared::agent_api::ChatMessage;
use shared::request::GenerationRequest;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Most recent non-system messages sent along with each chat turn.
pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub prompt: String,
    /// The instruction that was applied, if any
    pub instruction: Option<String>,
}

/// Build the final prompt for a request.
///
/// Priority: the request's custom prompt, then the stored template, then the
/// bare content. Whitespace-only instructions count as absent.
pub fn compose_prompt(request: &GenerationRequest, template: &str) -> ComposedPrompt {
    let instruction = [request.custom_prompt.trim(), template.trim()]
        .into_iter()
        .find(|s| !s.is_empty());

    match instruction {
        Some(instruction) => ComposedPrompt {
            prompt: format!(
                "{}\n\n{}:\n{}",
                instruction,
                request.content_type.label(),
                request.content_text
            ),
            instruction: Some(instruction.to_string()),
        },
        None => ComposedPrompt {
            prompt: request.content_text.clone(),
            instruction: None,
        },
    }
}

/// System message plus the tail of the conversation.
pub fn prepare_chat_messages(history: &[ChatMessage], page_context: Option<&str>) -> Vec<ChatMessage> {
    let system = match page_context.filter(|p| !p.trim().is_empty()) {
        Some(page) => format!(
            "{} Here is the current page content for context:\n\n{}",
            DEFAULT_SYSTEM_PROMPT, page
        ),
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let start = history.len().saturating_sub(HISTORY_LIMIT);
    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(
        history[start..]
            .iter()
            .filter(|m| m.role != "system")
            .cloned(),
    );
    messages
}

/// In-memory conversation for an interactive chat.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
    page_context: Option<String>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_context(mut self, page: impl Into<String>) -> Self {
        self.page_context = Some(page.into());
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Record the user's turn and return the messages to send for it.
    pub fn user_turn(&mut self, content: impl Into<String>) -> Vec<ChatMessage> {
        self.history.push(ChatMessage::user(content));
        prepare_chat_messages(&self.history, self.page_context.as_deref())
    }

    /// Record the assistant's reply. Empty replies (e.g. cancelled before
    /// any text arrived) are not kept.
    pub fn assistant_reply(&mut self, content: impl Into<String>) {
        let content = content.into();
        if !content.is_empty() {
            self.history.push(ChatMessage::assistant(content));
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::request::ContentType;

    #[test]
    fn test_custom_prompt_wins_over_template() {
        let request = GenerationRequest::text("The quick brown fox.").with_prompt("Translate to French");
        let composed = compose_prompt(&request, "Summarize");
        assert_eq!(
            composed.prompt,
            "Translate to French\n\nText:\nThe quick brown fox."
        );
        assert_eq!(composed.instruction.as_deref(), Some("Translate to French"));
    }

    #[test]
    fn test_template_used_when_no_custom_prompt() {
        let request = GenerationRequest::new("<p>hi</p>", ContentType::Html).with_prompt("   ");
        let composed = compose_prompt(&request, "Explain this markup");
        assert_eq!(composed.prompt, "Explain this markup\n\nHTML:\n<p>hi</p>");
    }

    #[test]
    fn test_bare_text_without_instruction() {
        let request = GenerationRequest::new("whole page", ContentType::Page);
        let composed = compose_prompt(&request, "");
        assert_eq!(composed.prompt, "whole page");
        assert_eq!(composed.instruction, None);
    }

    #[test]
    fn test_chat_messages_keep_last_twenty() {
        let history: Vec<ChatMessage> = (0..25).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let messages = prepare_chat_messages(&history, None);
        assert_eq!(messages.len(), 21);
        assert_eq!(messages[0], ChatMessage::system(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(messages[1].content, "m5");
        assert_eq!(messages[20].content, "m24");
    }

    #[test]
    fn test_page_context_goes_into_system_message() {
        let messages = prepare_chat_messages(&[ChatMessage::system("old")], Some("Page body"));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.ends_with("context:\n\nPage body"));
    }

    #[test]
    fn test_session_records_turns() {
        let mut session = ChatSession::new().with_page_context("docs");
        let sent = session.user_turn("What is this?");
        assert_eq!(sent.len(), 2);
        session.assistant_reply("A doc page.");
        session.assistant_reply("");
        assert_eq!(session.history().len(), 2);

        let sent = session.user_turn("Thanks");
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[2].role, "assistant");

        session.clear();
        assert!(session.history().is_empty());
    }
}
