use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

// ============================================================================
// Responses API Result Models
// ============================================================================

/// Single summary block inside a reasoning output item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryText {
    /// Always "summary_text".
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl SummaryText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "summary_text".to_string(),
            text: text.into(),
        }
    }
}

/// Single text block inside a message output item.
///
/// `annotations` and `logprobs` are always emitted (empty arrays) to match
/// the wire shape clients deserialize against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputText {
    /// Always "output_text".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
    #[serde(default)]
    pub logprobs: Vec<serde_json::Value>,
    pub text: String,
}

impl OutputText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "output_text".to_string(),
            annotations: Vec::new(),
            logprobs: Vec::new(),
            text: text.into(),
        }
    }
}

/// Output item types in a Responses API result.
///
/// Ordering within `ResponsesResponse::output` is a contract: reasoning
/// item(s) first, then function calls in source order, then the assistant
/// message last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Reasoning {
        id: String,
        summary: Vec<SummaryText>,
    },
    FunctionCall {
        id: String,
        arguments: String,
        call_id: String,
        name: String,
    },
    Message {
        id: String,
        role: String, // "assistant"
        content: Vec<OutputText>,
    },
}

/// Usage statistics in a Responses API result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Complete Responses API result document
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub object: String, // "response"
    pub created_at: u64,
    pub status: String, // "completed"
    /// Forwarded from the source document unchanged; omitted when absent.
    #[serde(default)]
    pub model: Option<serde_json::Value>,
    pub output: Vec<OutputItem>,
    pub usage: ResponsesUsage,
}
