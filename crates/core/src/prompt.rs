//! Prompt assembly
//!
//! Pure and deterministic: identical inputs always render the identical
//! string. History truncation happens here, at read time; stored history is
//! never trimmed.

use crate::message::ChatMessage;

/// Number of history entries rendered into a prompt by default
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

const INSTRUCTIONS: &str = "You are a helpful assistant with access to tools. \
Use a tool whenever it helps you answer accurately, and answer in plain language once you have what you need.";

/// Renders the user message and recent history into one prompt string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl PromptBuilder {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Build a prompt from the new message and the prior conversation.
    ///
    /// Only the last `window` entries of `history` are rendered. An empty
    /// history omits the history section entirely.
    pub fn build(&self, message: &str, history: &[ChatMessage]) -> String {
        let start = history.len().saturating_sub(self.window);
        let recent = &history[start..];

        let mut prompt = String::from(INSTRUCTIONS);
        prompt.push_str("\n\n");

        if !recent.is_empty() {
            prompt.push_str("Previous conversation:\n");
            prompt.push_str(&render_transcript(recent));
            prompt.push_str("\n\n");
        }

        prompt.push_str("Current message: ");
        prompt.push_str(message);
        prompt
    }
}

/// Build a prompt with the default history window
pub fn build_prompt(message: &str, history: &[ChatMessage]) -> String {
    PromptBuilder::default().build(message, history)
}

/// Render messages as `ROLE: content` lines
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|message| format!("{}: {}", message.role.label(), message.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;

    fn history(len: usize) -> Vec<ChatMessage> {
        (0..len)
            .map(|i| {
                let role = if i % 2 == 0 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                };
                ChatMessage::with_id(format!("m{}", i), role, format!("turn {}", i))
            })
            .collect()
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let history = history(4);
        let first = build_prompt("what's next?", &history);
        let second = build_prompt("what's next?", &history);

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_history_omits_section() {
        let prompt = build_prompt("hello", &[]);

        assert!(!prompt.contains("Previous conversation"));
        assert!(prompt.ends_with("Current message: hello"));
    }

    #[test]
    fn test_history_rendered_with_roles() {
        let prompt = build_prompt("and now?", &history(2));

        assert!(prompt.contains("Previous conversation:\nUSER: turn 0\nASSISTANT: turn 1\n\n"));
        assert!(prompt.contains("Current message: and now?"));
    }

    #[test]
    fn test_only_last_window_entries_rendered() {
        let builder = PromptBuilder::new(3);
        let prompt = builder.build("q", &history(12));

        assert!(!prompt.contains("turn 8"));
        assert!(prompt.contains("turn 9"));
        assert!(prompt.contains("turn 10"));
        assert!(prompt.contains("turn 11"));
    }

    #[test]
    fn test_zero_window_behaves_like_empty_history() {
        let builder = PromptBuilder::new(0);

        assert_eq!(builder.build("q", &history(5)), builder.build("q", &[]));
    }
}
