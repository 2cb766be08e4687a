//! The outward contract of one orchestration call.
//!
//! A tagged union keyed by `type`, so each variant's fields are
//! statically known. The search/function side channels may accompany
//! either variant without changing the tag.

use schemars::JsonSchema;
use serde::Serialize;

use crate::ai::core::providers::{
    FileSearchCall, FunctionCall, ImageLocator, Usage, WebSearchCall,
};

#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct SideChannels {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub web_search_calls: Vec<WebSearchCall>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_search_calls: Vec<FileSearchCall>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Text {
        content: String,
        #[serde(flatten)]
        side: SideChannels,
    },
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_data: Option<String>,
        enhanced_prompt: String,
        #[serde(flatten)]
        side: SideChannels,
    },
}

impl Envelope {
    pub fn text(content: impl Into<String>, side: SideChannels) -> Self {
        Self::Text {
            content: content.into(),
            side,
        }
    }

    pub fn image(image: &ImageLocator, enhanced_prompt: impl Into<String>, side: SideChannels) -> Self {
        let (image_url, image_data) = match image {
            ImageLocator::Url { url } => (Some(url.clone()), None),
            ImageLocator::Inline { data, .. } => (None, Some(data.clone())),
        };
        Self::Image {
            image_url,
            image_data,
            enhanced_prompt: enhanced_prompt.into(),
            side,
        }
    }

    /// The assistant-turn content recorded in history for this envelope.
    pub fn assistant_content(&self) -> String {
        match self {
            Envelope::Text { content, .. } => content.clone(),
            Envelope::Image {
                image_url,
                enhanced_prompt,
                ..
            } => image_url
                .clone()
                .unwrap_or_else(|| enhanced_prompt.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Envelope::Text { .. } => "text",
            Envelope::Image { .. } => "image",
        }
    }
}
