use serde::{Deserialize, Serialize};

use crate::types::content::Content;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A role-tagged conversation turn as supplied by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::text(content),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(content),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(content),
        }
    }

    /// Create a message from parts (multimodal content)
    pub fn from_parts(role: Role, parts: Vec<crate::types::content::ContentPart>) -> Self {
        Self {
            role,
            content: Content::parts(parts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::content::ContentPart;

    #[test]
    fn test_user_message() {
        let msg = Message::user("Hello!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, Content::text("Hello!"));
    }

    #[test]
    fn test_wire_shape() {
        let msg: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"hi there"}"#).unwrap();
        assert_eq!(msg, Message::assistant("hi there"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = serde_json::from_str::<Message>(r#"{"role":"robot","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_multimodal_message() {
        let msg = Message::from_parts(
            Role::User,
            vec![
                ContentPart::text("Describe "),
                ContentPart::image_url("/api/images/1"),
                ContentPart::text("please"),
            ],
        );
        assert_eq!(
            serde_json::to_value(&msg).unwrap()["content"][1]["image_url"]["url"],
            "/api/images/1"
        );
    }
}
