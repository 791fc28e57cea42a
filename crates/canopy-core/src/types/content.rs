use serde::{Deserialize, Serialize};

/// Content of a conversation turn
///
/// Clients send either a bare string or an ordered list of parts; both
/// shapes are kept as-is so they reach the engine unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Content {
    /// Simple text content
    Text(String),
    /// Multimodal content parts
    Parts(Vec<ContentPart>),
}

/// Individual content part (for multimodal messages)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content
    Text { text: String },
    /// Image referenced by URL, usually a staged image path
    ImageUrl { image_url: ImageUrl },
}

/// Image reference inside an `image_url` part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create content from parts
    pub fn parts(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

impl ContentPart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image part from URL
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_content_from_bare_string() {
        let content: Content = serde_json::from_value(json!("Hello")).unwrap();
        assert_eq!(content, Content::text("Hello"));
        assert_eq!(serde_json::to_value(&content).unwrap(), json!("Hello"));
    }

    #[test]
    fn test_parts_content() {
        let content: Content = serde_json::from_value(json!([
            {"type": "text", "text": "What is this?"},
            {"type": "image_url", "image_url": {"url": "/api/images/abc"}}
        ]))
        .unwrap();

        match &content {
            Content::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[1], ContentPart::image_url("/api/images/abc"));
            }
            _ => panic!("Expected parts content"),
        }
    }

    #[test]
    fn test_image_detail_is_kept() {
        let part: ContentPart = serde_json::from_value(json!(
            {"type": "image_url", "image_url": {"url": "https://example.com/a.png", "detail": "low"}}
        ))
        .unwrap();
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["image_url"]["detail"], "low");
    }
}
