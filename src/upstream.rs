use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use http::{header, HeaderMap, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::reconcile::{classify_transport, Transport};

/// Boxed byte stream used for event-stream upstream bodies.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Upstream response body: either fully buffered bytes or a live byte stream.
///
/// `Bytes` duplication is cheap, which is what lets the reconciler inspect a
/// buffered body without consuming the copy it may still pass through.
pub enum UpstreamBody {
    Buffered(Bytes),
    Stream(ByteStream),
}

impl UpstreamBody {
    pub fn from_json(value: &Value) -> Self {
        UpstreamBody::Buffered(Bytes::from(value.to_string()))
    }

    /// Drain the body into one buffer (used by aggregation and tests).
    pub async fn collect(self) -> Result<Bytes, std::io::Error> {
        match self {
            UpstreamBody::Buffered(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.try_next().await? {
                    buf.extend_from_slice(&chunk);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl std::fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            UpstreamBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Response handed back by an [`UpstreamInvoker`].
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    /// The `Content-Type` header value, or the empty string when absent.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// Failure reported by the upstream layer itself (connection refused, DNS,
/// timeout). HTTP-level error documents are *not* represented here; they
/// travel as ordinary [`UpstreamResponse`]s so the reconciler can tunnel
/// them byte-for-byte.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: StatusCode,
    pub message: String,
}

/// Per-request metadata threaded through to the upstream call.
///
/// `provider` feeds transport classification; `bearer` is forwarded as-is.
/// Cancellation is carried by task drop and never interpreted here.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub provider: String,
    pub bearer: Option<String>,
}

/// Seam for the single upstream call the reconciler makes per request.
#[async_trait]
pub trait UpstreamInvoker: Send + Sync {
    async fn invoke(
        &self,
        payload: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Production invoker: POST the rewritten payload to
/// `{base_url}/chat/completions` over the shared reqwest client.
///
/// Deliberately thin: bearer passthrough only, no retries, no credential
/// refresh. Non-2xx upstream replies are buffered and returned as responses.
pub struct HttpUpstreamInvoker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstreamInvoker {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UpstreamInvoker for HttpUpstreamInvoker {
    async fn invoke(
        &self,
        payload: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let body = chat_payload_from(payload);
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let wants_sse = body.get("stream") == Some(&Value::Bool(true));

        let mut rb = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if wants_sse {
            rb = rb.header(header::ACCEPT, "text/event-stream");
        }
        if let Some(token) = ctx.bearer.as_deref().filter(|t| !t.is_empty()) {
            rb = rb.bearer_auth(token);
        }

        let resp = rb.send().await.map_err(|e| UpstreamError {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        // Materialize the body the same way the reconciler will classify it,
        // so a forced event-stream stays incrementally readable.
        let body = match classify_transport(content_type, &ctx.provider) {
            Transport::Streaming => UpstreamBody::Stream(
                resp.bytes_stream()
                    .map_err(|e| std::io::Error::other(e.to_string()))
                    .boxed(),
            ),
            Transport::Buffered => {
                let bytes = resp.bytes().await.map_err(|e| UpstreamError {
                    status: StatusCode::BAD_GATEWAY,
                    message: e.to_string(),
                })?;
                UpstreamBody::Buffered(bytes)
            }
        };

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Rewrite a Responses-shaped request payload into Chat Completions JSON.
///
/// - `input` becomes `messages` (an array is forwarded as-is, a string wraps
///   into a single user message),
/// - `instructions` becomes a leading system message,
/// - `max_output_tokens` is renamed to `max_tokens`,
/// - Responses-only fields (`conversation`) are removed,
/// - `stream` is left exactly as the reconciler normalized it.
pub fn chat_payload_from(payload: &Value) -> Value {
    let mut body = payload.clone();

    if let Some(obj) = body.as_object_mut() {
        if obj.get("messages").is_none() {
            if let Some(input) = obj.remove("input") {
                match input {
                    Value::Array(_) => {
                        obj.insert("messages".to_string(), input);
                    }
                    Value::String(s) => {
                        obj.insert(
                            "messages".to_string(),
                            serde_json::json!([{"role": "user", "content": s}]),
                        );
                    }
                    _ => {}
                }
            }
        }

        if let Some(instructions) = obj.remove("instructions") {
            if let Some(text) = instructions.as_str().filter(|s| !s.is_empty()) {
                let system = serde_json::json!({"role": "system", "content": text});
                match obj.get_mut("messages").and_then(|m| m.as_array_mut()) {
                    Some(messages) => messages.insert(0, system),
                    None => {
                        obj.insert("messages".to_string(), Value::Array(vec![system]));
                    }
                }
            }
        }

        if let Some(max_out) = obj.remove("max_output_tokens") {
            obj.insert("max_tokens".to_string(), max_out);
        }
        obj.remove("conversation");
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_input_becomes_user_message() {
        let out = chat_payload_from(&json!({"model": "m", "input": "hello"}));
        assert_eq!(
            out["messages"],
            json!([{"role": "user", "content": "hello"}])
        );
        assert!(out.get("input").is_none());
    }

    #[test]
    fn array_input_is_forwarded_as_messages() {
        let msgs = json!([{"role": "user", "content": "hi"}]);
        let out = chat_payload_from(&json!({"model": "m", "input": msgs.clone()}));
        assert_eq!(out["messages"], msgs);
    }

    #[test]
    fn instructions_become_leading_system_message() {
        let out = chat_payload_from(&json!({
            "model": "m",
            "instructions": "be brief",
            "input": [{"role": "user", "content": "hi"}]
        }));
        assert_eq!(out["messages"][0]["role"], "system");
        assert_eq!(out["messages"][0]["content"], "be brief");
        assert_eq!(out["messages"][1]["role"], "user");
    }

    #[test]
    fn max_output_tokens_renamed_and_conversation_dropped() {
        let out = chat_payload_from(&json!({
            "model": "m",
            "max_output_tokens": 64,
            "conversation": "conv-1",
            "input": "x"
        }));
        assert_eq!(out["max_tokens"], 64);
        assert!(out.get("max_output_tokens").is_none());
        assert!(out.get("conversation").is_none());
    }

    #[test]
    fn existing_messages_are_left_alone() {
        let payload = json!({
            "model": "m",
            "messages": [{"role": "user", "content": "already chat-shaped"}],
            "input": "ignored"
        });
        let out = chat_payload_from(&payload);
        assert_eq!(out["messages"], payload["messages"]);
    }
}
