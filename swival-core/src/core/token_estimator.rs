//! Deterministic token estimation.
//!
//! A real tokenizer is deliberately avoided: the estimate only has to be
//! stable within a run and conservative enough that the safety margin
//! absorbs the error. Roughly four characters per token plus a fixed
//! framing overhead per message.

use crate::llm::Message;

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;
/// Framing overhead charged per message (role, separators).
const MESSAGE_OVERHEAD: usize = 8;
/// Flat overhead for the request envelope.
const PROMPT_OVERHEAD: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn estimate_text(&self, text: &str) -> usize {
        text.len().div_ceil(CHARS_PER_TOKEN)
    }

    pub fn estimate_message(&self, message: &Message) -> usize {
        let mut chars = message.content.len();
        for call in &message.tool_calls {
            chars += call.name.len();
            if let Some(args) = &call.arguments {
                chars += args.to_string().len();
            }
        }
        chars.div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD
    }

    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .sum::<usize>()
            + PROMPT_OVERHEAD
    }

    /// Estimated cost of a block of schema JSON.
    pub fn estimate_schema(&self, schema: &serde_json::Value) -> usize {
        self.estimate_text(&schema.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn estimate_is_stable_and_monotonic() {
        let est = TokenEstimator;
        let short = Message::user("hello", 1);
        let long = Message::user("hello world, this is a longer message", 1);
        assert_eq!(est.estimate_message(&short), est.estimate_message(&short));
        assert!(est.estimate_message(&long) > est.estimate_message(&short));
    }

    #[test]
    fn empty_text_estimates_zero() {
        assert_eq!(TokenEstimator.estimate_text(""), 0);
    }
}
