use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::conversion::{self, Clock, SystemClock};
use crate::models::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatResponseMessage, FunctionCall,
    ToolCall,
};
use crate::upstream::UpstreamBody;

/// Aggregation failure: the stream could not be read, or it carried nothing
/// decodable. Never partially recovered.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("failed to read upstream event stream: {0}")]
    Read(#[from] std::io::Error),
    #[error("event stream contained no decodable completion chunks")]
    Empty,
}

/// Seam that turns a streamed upstream body into one complete Responses-shaped
/// document.
#[async_trait]
pub trait StreamAggregator: Send + Sync {
    async fn aggregate(&self, body: UpstreamBody) -> Result<Value, AggregateError>;
}

/// Production aggregator for Chat Completions SSE.
///
/// Buffers the stream to completion, folds `chat.completion.chunk` frames
/// into one finished Chat Completions document, and emits the Responses
/// shape through the schema converter. Frames that fail to decode are
/// skipped; the fold only fails when no frame decoded at all.
pub struct SseAggregator {
    clock: Box<dyn Clock>,
}

impl SseAggregator {
    pub fn new() -> Self {
        Self {
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for SseAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamAggregator for SseAggregator {
    async fn aggregate(&self, body: UpstreamBody) -> Result<Value, AggregateError> {
        let bytes = body.collect().await?;
        let text = String::from_utf8_lossy(&bytes);

        let completed = fold_chunks(data_payloads(&text)).ok_or(AggregateError::Empty)?;
        let document = serde_json::to_value(completed).map_err(|_| AggregateError::Empty)?;
        Ok(conversion::convert(document, self.clock.as_ref()))
    }
}

/// Extract the `data:` payloads from an SSE body, stopping at `[DONE]`.
fn data_payloads(body: &str) -> impl Iterator<Item = &str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .take_while(|payload| *payload != "[DONE]")
        .filter(|payload| !payload.is_empty())
}

#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Fold streaming chunks into one completed Chat Completions response.
/// Returns `None` when no payload decoded as a chunk.
fn fold_chunks<'a>(payloads: impl Iterator<Item = &'a str>) -> Option<ChatCompletionResponse> {
    let mut id = String::new();
    let mut model = String::new();
    let mut created = 0u64;
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut calls: BTreeMap<u32, PartialCall> = BTreeMap::new();
    let mut usage = None;
    let mut finish_reason = None;
    let mut decoded_any = false;

    for payload in payloads {
        let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(payload) else {
            continue;
        };
        decoded_any = true;

        if id.is_empty() && !chunk.id.is_empty() {
            id = chunk.id;
        }
        if model.is_empty() && !chunk.model.is_empty() {
            model = chunk.model;
        }
        if created == 0 {
            created = chunk.created;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };
        if choice.finish_reason.is_some() {
            finish_reason = choice.finish_reason;
        }
        if let Some(delta) = choice.delta.content {
            content.push_str(&delta);
        }
        if let Some(delta) = choice.delta.reasoning_content {
            reasoning.push_str(&delta);
        }
        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            let call = calls.entry(fragment.index).or_default();
            if let Some(call_id) = fragment.id.filter(|s| !s.is_empty()) {
                call.id = Some(call_id);
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name.filter(|s| !s.is_empty()) {
                    call.name = name;
                }
                if let Some(arguments) = function.arguments {
                    call.arguments.push_str(&arguments);
                }
            }
        }
    }

    if !decoded_any {
        return None;
    }

    let tool_calls: Vec<ToolCall> = calls
        .into_values()
        .map(|call| ToolCall {
            id: call.id.unwrap_or_default(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: call.name,
                arguments: call.arguments,
            },
        })
        .collect();

    let message = ChatResponseMessage {
        role: "assistant".to_string(),
        content: (!content.is_empty()).then_some(content),
        reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
    };

    Some(ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model,
        choices: vec![ChatChoice {
            index: 0,
            message,
            finish_reason,
            logprobs: None,
        }],
        usage,
        system_fingerprint: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_payloads_stop_at_done_and_skip_blanks() {
        let body = "data: {\"a\":1}\n\ndata:\ndata: {\"b\":2}\ndata: [DONE]\ndata: {\"c\":3}\n";
        let collected: Vec<&str> = data_payloads(body).collect();
        assert_eq!(collected, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn fold_returns_none_without_decodable_chunks() {
        assert!(fold_chunks(["not json", "{\"still\": \"wrong\""].into_iter()).is_none());
    }

    #[test]
    fn fold_accumulates_split_tool_call_arguments() {
        let frames = [
            r#"{"id":"c1","object":"chat.completion.chunk","created":5,"model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_9","type":"function","function":{"name":"lookup","arguments":"{\"q\":"}}]}}]}"#,
            r#"{"id":"c1","object":"chat.completion.chunk","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        ];
        let folded = fold_chunks(frames.into_iter()).expect("should fold");
        let calls = folded.choices[0]
            .message
            .tool_calls
            .as_ref()
            .expect("tool calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].function.name, "lookup");
        assert_eq!(calls[0].function.arguments, "{\"q\":\"rust\"}");
        assert_eq!(folded.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }
}
