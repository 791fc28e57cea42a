use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Streaming chat request handed to a generation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Target model identifier
    pub model: String,
    /// Prior conversation turns, oldest first
    pub messages: Vec<Message>,
    /// Language/locale hint; empty means no preference
    #[serde(default)]
    pub language: String,
}

impl ChatRequest {
    /// Create a new chat request
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            language: String::new(),
        }
    }

    /// Add a message to the request
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add multiple messages
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set the language hint
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Language hint, if one was given
    pub fn language_hint(&self) -> Option<&str> {
        let language = self.language.trim();
        (!language.is_empty()).then_some(language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let request = ChatRequest::new("m1")
            .with_message(Message::user("hi"))
            .with_language("en");
        assert_eq!(request.model, "m1");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.language_hint(), Some("en"));
    }

    #[test]
    fn test_language_defaults_to_empty() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"model":"m1","messages":[]}"#).unwrap();
        assert_eq!(request.language, "");
        assert_eq!(request.language_hint(), None);
    }

    #[test]
    fn test_model_is_required() {
        let result = serde_json::from_str::<ChatRequest>(r#"{"messages":[],"language":"en"}"#);
        assert!(result.is_err());
    }
}
